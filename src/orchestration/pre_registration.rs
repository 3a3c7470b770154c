//! # Pre-Registration Phase
//!
//! Reserves the parent resource at the backend and settles the submission's
//! public reference before any expensive registration work happens, so that
//! retries of the registration phase reuse the same parent resource.
//!
//! ```text
//! not-started ──► reference-pending ──► reference-assigned
//!                        │
//!                        └──► aborted (failure recorded, traceback in ledger)
//! ```

use super::binding::{bind_relaxed, resolve_enabled};
use super::services::RegistrationServices;
use super::types::{PhaseError, PhaseOutcome, RegistrationFailure, SkipReason, Trigger};
use crate::constants::ledger_keys;
use crate::ledger::SubmissionContext;
use crate::models::BackendSelection;
use crate::registry::PreRegistrationResult;
use crate::state_machine::RegistrationEvent;
use serde_json::Value;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

/// Run the pre-registration phase for one submission.
///
/// Recorded failures come back as [`PhaseError::Failed`]; whether to surface
/// them is up to the caller.
#[instrument(skip_all, fields(submission_id = %submission_id, trigger = %trigger))]
pub async fn pre_register(
    services: &RegistrationServices,
    submission_id: Uuid,
    trigger: Trigger,
) -> Result<PhaseOutcome, PhaseError> {
    let mut submission = services.store.load(submission_id).await?;

    if submission.completed_on.is_none() {
        warn!("Pre-registration invoked for a submission that is not completed");
        return Ok(PhaseOutcome::Skipped(SkipReason::NotCompleted));
    }
    if submission.pre_registration_completed {
        debug!("Pre-registration already completed");
        return Ok(PhaseOutcome::Skipped(SkipReason::AlreadyPreRegistered));
    }
    let limit = services.config.registration_attempt_limit;
    if submission.registration_attempts >= limit {
        debug!(
            attempts = submission.registration_attempts,
            limit, "Attempt limit reached, skipping pre-registration"
        );
        return Ok(PhaseOutcome::Skipped(SkipReason::AttemptLimitReached {
            attempts: submission.registration_attempts,
            limit,
        }));
    }

    let Some(selection) = submission.registration_backend.clone() else {
        if !submission.has_public_reference() {
            submission.public_registration_reference =
                services.references.generate(&submission).await?;
        }
        submission.pre_registration_completed = true;
        services.store.save(&submission).await?;
        info!(
            reference = %submission.public_registration_reference,
            "No registration backend, reference assigned"
        );
        return Ok(PhaseOutcome::Completed);
    };

    let mut ctx = SubmissionContext::new(submission, services.store.clone());
    match run_plugin(services, &mut ctx, &selection, trigger).await? {
        Ok(result) => {
            complete(services, &mut ctx, result).await?;
            info!(
                plugin = %selection.backend,
                reference = %ctx.submission().public_registration_reference,
                "Pre-registration completed"
            );
            Ok(PhaseOutcome::Completed)
        }
        Err(failure) => {
            record_failure(services, &mut ctx, &failure).await?;
            warn!(plugin = %selection.backend, failure = %failure, "Pre-registration failed");
            Err(PhaseError::Failed(failure))
        }
    }
}

/// The outer `Result` carries errors that abort the phase outright; the inner
/// one carries failures to record.
async fn run_plugin(
    services: &RegistrationServices,
    ctx: &mut SubmissionContext,
    selection: &BackendSelection,
    trigger: Trigger,
) -> Result<Result<PreRegistrationResult, RegistrationFailure>, PhaseError> {
    let plugin = match resolve_enabled(&services.registry, selection) {
        Ok(plugin) => plugin,
        Err(failure) => return Ok(Err(failure)),
    };
    let bound = match bind_relaxed(plugin, selection) {
        Ok(bound) => bound,
        Err(failure) => return Ok(Err(failure)),
    };

    if trigger.is_retry() {
        snapshot_reference(ctx).await?;
    }

    if ctx.submission().initial_data_reference.is_some() {
        // Audit entries written by the ownership check are not rolled back
        // when the phase aborts afterwards.
        if let Err(error) = bound.verify_initial_data_ownership(ctx).await {
            return Ok(Err(RegistrationFailure::from_plugin_error(&error)));
        }
    }

    Ok(bound
        .pre_register_submission(ctx)
        .await
        .map_err(|error| RegistrationFailure::from_plugin_error(&error)))
}

/// On a retry with an existing ledger, keep the reference this retry started
/// from so backends can recognise a reservation made by an earlier attempt.
async fn snapshot_reference(ctx: &mut SubmissionContext) -> Result<(), PhaseError> {
    let submission = ctx.submission_mut();
    if submission.registration_result.is_empty() || !submission.has_public_reference() {
        return Ok(());
    }
    let reference = Value::String(submission.public_registration_reference.clone());
    submission
        .registration_result
        .assign(ledger_keys::TEMPORARY_INTERNAL_REFERENCE, reference)?;
    ctx.persist_ledger().await?;
    Ok(())
}

async fn complete(
    services: &RegistrationServices,
    ctx: &mut SubmissionContext,
    result: PreRegistrationResult,
) -> Result<(), PhaseError> {
    match result.reference.filter(|reference| !reference.trim().is_empty()) {
        Some(reference) => ctx.submission_mut().public_registration_reference = reference,
        // A reference assigned after an earlier failure stays
        None if ctx.submission().has_public_reference() => {}
        None => {
            let reference = services.references.generate(ctx.submission()).await?;
            ctx.submission_mut().public_registration_reference = reference;
        }
    }

    let submission = ctx.submission_mut();
    submission.registration_result.clear_traceback();
    if let Some(data) = result.data {
        submission.registration_result.merge(data);
    }
    submission.pre_registration_completed = true;
    ctx.persist().await?;
    Ok(())
}

async fn record_failure(
    services: &RegistrationServices,
    ctx: &mut SubmissionContext,
    failure: &RegistrationFailure,
) -> Result<(), PhaseError> {
    if !ctx.submission().has_public_reference() {
        let reference = services.references.generate(ctx.submission()).await?;
        ctx.submission_mut().public_registration_reference = reference;
    }

    let submission = ctx.submission_mut();
    submission
        .registration_result
        .set_traceback(failure.traceback.clone());
    submission.transition(&RegistrationEvent::Fail(failure.message.clone()))?;
    submission.needs_on_completion_retry = true;
    ctx.persist().await?;
    Ok(())
}
