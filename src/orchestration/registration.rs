//! # Registration Phase
//!
//! Hands a pre-registered submission to its backend.
//!
//! Attempt bookkeeping (status `in_progress`, attempt counter, timestamp) is
//! persisted in its own write before the plugin runs, so a crash during the
//! external calls leaves the submission observably in progress. The plugin
//! call itself runs outside any transaction; every side effect inside it is
//! recorded by the guard as it happens.

use super::binding::{bind_relaxed, resolve_enabled};
use super::services::RegistrationServices;
use super::types::{PhaseError, PhaseOutcome, RegistrationFailure, SkipReason, Trigger};
use crate::ledger::{JsonMap, SubmissionContext};
use crate::models::{BackendSelection, Submission};
use crate::state_machine::{RegistrationEvent, RegistrationStatus};
use chrono::Utc;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

#[instrument(skip_all, fields(submission_id = %submission_id, trigger = %trigger))]
pub async fn register(
    services: &RegistrationServices,
    submission_id: Uuid,
    trigger: Trigger,
) -> Result<PhaseOutcome, PhaseError> {
    let mut submission = services.store.load(submission_id).await?;

    if let Some(reason) = skip_reason(services, &submission) {
        debug!(reason = ?reason, "Registration skipped");
        return Ok(PhaseOutcome::Skipped(reason));
    }

    submission.begin_attempt(Utc::now())?;
    services.store.save(&submission).await?;

    let Some(selection) = submission.registration_backend.clone() else {
        let ctx = SubmissionContext::new(submission, services.store.clone());
        succeed(services, ctx, JsonMap::new(), trigger).await?;
        info!("No registration backend, marked as registered");
        return Ok(PhaseOutcome::Completed);
    };

    let mut ctx = SubmissionContext::new(submission, services.store.clone());
    match invoke_plugin(services, &mut ctx, &selection).await {
        Ok(result) => {
            let attempts = ctx.submission().registration_attempts;
            succeed(services, ctx, result, trigger).await?;
            info!(plugin = %selection.backend, attempts, "Registration succeeded");
            Ok(PhaseOutcome::Completed)
        }
        Err(failure) => {
            record_failure(&mut ctx, &failure).await?;
            warn!(
                plugin = %selection.backend,
                attempts = ctx.submission().registration_attempts,
                failure = %failure,
                "Registration failed"
            );
            Err(PhaseError::Failed(failure))
        }
    }
}

/// Guards evaluated in order; none of them touches the submission.
fn skip_reason(services: &RegistrationServices, submission: &Submission) -> Option<SkipReason> {
    if submission.registration_status == RegistrationStatus::Success {
        return Some(SkipReason::AlreadyRegistered);
    }
    if submission.completed_on.is_none() {
        warn!("Registration invoked for a submission that is not completed");
        return Some(SkipReason::NotCompleted);
    }
    if !submission.pre_registration_completed {
        return Some(SkipReason::PreRegistrationIncomplete);
    }
    if submission.cosign.is_waiting() {
        return Some(SkipReason::AwaitingCosign);
    }
    if services.config.wait_for_payment_to_register && submission.payment.is_required_and_unpaid()
    {
        return Some(SkipReason::AwaitingPayment);
    }
    let limit = services.config.registration_attempt_limit;
    if submission.registration_attempts >= limit {
        return Some(SkipReason::AttemptLimitReached {
            attempts: submission.registration_attempts,
            limit,
        });
    }
    None
}

async fn invoke_plugin(
    services: &RegistrationServices,
    ctx: &mut SubmissionContext,
    selection: &BackendSelection,
) -> Result<JsonMap, RegistrationFailure> {
    let plugin = resolve_enabled(&services.registry, selection)?;
    let bound = bind_relaxed(plugin, selection)?;
    bound
        .register_submission(ctx)
        .await
        .map_err(|error| RegistrationFailure::from_plugin_error(&error))
}

async fn succeed(
    services: &RegistrationServices,
    mut ctx: SubmissionContext,
    result: JsonMap,
    trigger: Trigger,
) -> Result<(), PhaseError> {
    if services.config.wait_for_payment_to_register && trigger == Trigger::OnPaymentComplete {
        services.payments.mark_registered(ctx.submission_mut()).await?;
    }

    let submission = ctx.submission_mut();
    submission.transition(&RegistrationEvent::Succeed)?;
    submission.registration_result.finalize(result);
    submission.needs_on_completion_retry = false;
    ctx.persist().await?;
    Ok(())
}

async fn record_failure(
    ctx: &mut SubmissionContext,
    failure: &RegistrationFailure,
) -> Result<(), PhaseError> {
    let submission = ctx.submission_mut();
    submission
        .registration_result
        .set_traceback(failure.traceback.clone());
    submission.transition(&RegistrationEvent::Fail(failure.message.clone()))?;
    submission.needs_on_completion_retry = true;
    ctx.persist().await?;
    Ok(())
}
