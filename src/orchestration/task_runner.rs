//! # Registration Task Runner
//!
//! Entry points for the task queue. Every entry point claims the submission
//! through the store first; a concurrent request for the same submission,
//! from this runner or any other sharing the store, is coalesced.
//!
//! Phase functions return recorded failures as values. The runner applies the
//! trigger policy: on [`Trigger::OnRetry`] a recorded failure becomes an
//! `Err` so the queue's retry machinery sees it, otherwise it is logged and
//! reported as [`TaskOutcome::Failed`] so the submitter is never blocked.
//! Store and state machine errors always propagate.

use super::payment;
use super::pre_registration::pre_register;
use super::registration::register;
use super::services::RegistrationServices;
use super::submission_claimer::SubmissionClaimer;
use super::types::{Phase, PhaseError, PhaseOutcome, RegistrationJob, TaskOutcome, Trigger};
use crate::error::{RegistrationError, Result};
use crate::logging::{log_error, log_registration_operation};
use crate::registry::DynRegistrationPlugin;
use crate::state_machine::RegistrationStatus;
use std::future::Future;
use tracing::{info, instrument};
use uuid::Uuid;

#[derive(Debug, Clone)]
pub struct RegistrationTaskRunner {
    services: RegistrationServices,
    claimer: SubmissionClaimer,
}

impl RegistrationTaskRunner {
    /// A runner with its own claimer identity. Claims are still shared with
    /// every other runner on the same store.
    pub fn new(services: RegistrationServices) -> Self {
        let claimer = SubmissionClaimer::new(
            services.store.clone(),
            format!("runner-{}", Uuid::new_v4()),
            services.config.claim_timeout(),
        );
        Self::with_claimer(services, claimer)
    }

    pub fn with_claimer(services: RegistrationServices, claimer: SubmissionClaimer) -> Self {
        Self { services, claimer }
    }

    pub fn services(&self) -> &RegistrationServices {
        &self.services
    }

    pub fn claimer(&self) -> &SubmissionClaimer {
        &self.claimer
    }

    #[instrument(skip(self, trigger), fields(trigger = %trigger))]
    pub async fn run_pre_registration(
        &self,
        submission_id: Uuid,
        trigger: Trigger,
    ) -> Result<TaskOutcome> {
        self.claimed(submission_id, Phase::PreRegistration, async {
            let result = pre_register(&self.services, submission_id, trigger).await;
            apply_trigger_policy(Phase::PreRegistration, submission_id, trigger, result)
        })
        .await
    }

    #[instrument(skip(self, trigger), fields(trigger = %trigger))]
    pub async fn run_registration(
        &self,
        submission_id: Uuid,
        trigger: Trigger,
    ) -> Result<TaskOutcome> {
        self.claimed(submission_id, Phase::Registration, async {
            let result = register(&self.services, submission_id, trigger).await;
            apply_trigger_policy(Phase::Registration, submission_id, trigger, result)
        })
        .await
    }

    /// Pre-registration, report generation and registration, in order.
    pub async fn on_submission_completed(&self, submission_id: Uuid) -> Result<TaskOutcome> {
        self.run_chain(submission_id, Trigger::OnCompletion).await
    }

    /// The completion chain as an explicit retry; recorded failures propagate.
    pub async fn retry_submission(&self, submission_id: Uuid) -> Result<TaskOutcome> {
        self.run_chain(submission_id, Trigger::OnRetry).await
    }

    /// A payment completed. Runs the deferred registration when registration
    /// waits for payment, otherwise forwards the payment to the backend of an
    /// already registered submission.
    #[instrument(skip(self))]
    pub async fn on_payment_complete(&self, submission_id: Uuid) -> Result<TaskOutcome> {
        let submission = self.services.store.load(submission_id).await?;
        if submission.registration_status != RegistrationStatus::Success
            && self.services.config.wait_for_payment_to_register
        {
            return self
                .run_chain(submission_id, Trigger::OnPaymentComplete)
                .await;
        }
        self.update_payment_status(submission_id).await
    }

    #[instrument(skip(self))]
    pub async fn update_payment_status(&self, submission_id: Uuid) -> Result<TaskOutcome> {
        self.claimed(submission_id, Phase::PaymentUpdate, async {
            match payment::update_payment_status(&self.services, submission_id).await {
                Ok(outcome) => Ok(task_outcome(Phase::PaymentUpdate, submission_id, outcome)),
                Err(error) => Err(into_registration_error(
                    Phase::PaymentUpdate,
                    submission_id,
                    error,
                )),
            }
        })
        .await
    }

    /// Caseworker-facing reference of a registered submission. `None` when
    /// there is no backend or the backend has no reference for this result.
    pub async fn registration_reference(&self, submission_id: Uuid) -> Result<Option<String>> {
        let submission = self.services.store.load(submission_id).await?;
        let Some(selection) = submission.registration_backend.as_ref() else {
            return Ok(None);
        };
        if submission.registration_status != RegistrationStatus::Success {
            return Ok(None);
        }
        let plugin = self.services.registry.resolve(&selection.backend)?;
        Ok(plugin
            .plugin()
            .get_reference_from_result(&submission.registration_result)
            .ok())
    }

    /// Dispatch a queued job by its trigger.
    pub async fn run_job(&self, job: &RegistrationJob) -> Result<TaskOutcome> {
        match job.trigger {
            Trigger::OnCompletion => self.on_submission_completed(job.submission_id).await,
            Trigger::OnRetry => self.retry_submission(job.submission_id).await,
            Trigger::OnPaymentComplete => self.on_payment_complete(job.submission_id).await,
        }
    }

    /// Run `work` under the submission's claim, or coalesce when it is held.
    async fn claimed<F>(&self, submission_id: Uuid, phase: Phase, work: F) -> Result<TaskOutcome>
    where
        F: Future<Output = Result<TaskOutcome>>,
    {
        let Some(claim) = self.claimer.try_claim(submission_id).await? else {
            return Ok(coalesced(submission_id, phase));
        };
        let result = work.await;
        claim.release().await;
        result
    }

    #[instrument(skip(self, trigger), fields(trigger = %trigger))]
    async fn run_chain(&self, submission_id: Uuid, trigger: Trigger) -> Result<TaskOutcome> {
        self.claimed(
            submission_id,
            Phase::Registration,
            self.run_chain_claimed(submission_id, trigger),
        )
        .await
    }

    async fn run_chain_claimed(&self, submission_id: Uuid, trigger: Trigger) -> Result<TaskOutcome> {
        let pre = pre_register(&self.services, submission_id, trigger).await;
        if let TaskOutcome::Failed(failure) =
            apply_trigger_policy(Phase::PreRegistration, submission_id, trigger, pre)?
        {
            return Ok(TaskOutcome::Failed(failure));
        }

        let submission = self.services.store.load(submission_id).await?;
        if submission.pre_registration_completed
            && submission.registration_status != RegistrationStatus::Success
        {
            self.services
                .reports
                .generate_report(&submission)
                .await
                .map_err(|e| RegistrationError::ReportGeneration {
                    submission_id,
                    reason: format!("{e:#}"),
                })?;
        }

        let result = register(&self.services, submission_id, trigger).await;
        apply_trigger_policy(Phase::Registration, submission_id, trigger, result)
    }
}

fn coalesced(submission_id: Uuid, phase: Phase) -> TaskOutcome {
    info!(
        submission_id = %submission_id,
        phase = %phase,
        "Execution already in flight for submission, coalescing"
    );
    TaskOutcome::Coalesced
}

fn task_outcome(phase: Phase, submission_id: Uuid, outcome: PhaseOutcome) -> TaskOutcome {
    let phase_name = phase.to_string();
    match outcome {
        PhaseOutcome::Completed => {
            log_registration_operation(
                "run_phase",
                Some(submission_id),
                Some(&phase_name),
                "completed",
                None,
            );
            TaskOutcome::Completed
        }
        PhaseOutcome::Skipped(reason) => {
            let details = format!("{reason:?}");
            log_registration_operation(
                "run_phase",
                Some(submission_id),
                Some(&phase_name),
                "skipped",
                Some(&details),
            );
            TaskOutcome::Skipped(reason)
        }
    }
}

fn apply_trigger_policy(
    phase: Phase,
    submission_id: Uuid,
    trigger: Trigger,
    result: std::result::Result<PhaseOutcome, PhaseError>,
) -> Result<TaskOutcome> {
    match result {
        Ok(outcome) => Ok(task_outcome(phase, submission_id, outcome)),
        Err(PhaseError::Failed(failure)) if !trigger.propagates_failures() => {
            let context = format!("submission {submission_id}, trigger {trigger}");
            log_error(
                &phase.to_string(),
                "run_phase",
                &failure.to_string(),
                Some(&context),
            );
            Ok(TaskOutcome::Failed(failure))
        }
        Err(error) => Err(into_registration_error(phase, submission_id, error)),
    }
}

fn into_registration_error(
    phase: Phase,
    submission_id: Uuid,
    error: PhaseError,
) -> RegistrationError {
    match error {
        PhaseError::Failed(failure) => RegistrationError::PhaseFailed {
            phase,
            submission_id,
            failure,
        },
        PhaseError::Store(e) => e.into(),
        PhaseError::StateMachine(e) => e.into(),
        PhaseError::Ledger(e) => e.into(),
        PhaseError::Reference(e) => e.into(),
    }
}
