//! Payment status update for submissions that were registered before their
//! payment completed.
//!
//! Failures here are never swallowed: nothing is recorded in the (already
//! final) ledger, so the queue is the only place the failure can surface.
//! Plugins must tolerate being called again for the same submission.

use super::binding::{bind_relaxed, resolve_enabled};
use super::services::RegistrationServices;
use super::types::{PhaseError, PhaseOutcome, RegistrationFailure, SkipReason};
use crate::ledger::SubmissionContext;
use crate::state_machine::RegistrationStatus;
use tracing::{debug, info, instrument};
use uuid::Uuid;

#[instrument(skip_all, fields(submission_id = %submission_id))]
pub async fn update_payment_status(
    services: &RegistrationServices,
    submission_id: Uuid,
) -> Result<PhaseOutcome, PhaseError> {
    let submission = services.store.load(submission_id).await?;

    if submission.registration_status != RegistrationStatus::Success {
        debug!(status = %submission.registration_status, "Not registered yet, payment update skipped");
        return Ok(PhaseOutcome::Skipped(SkipReason::NotRegistered));
    }
    if !submission.payment.required || !submission.payment.paid {
        return Ok(PhaseOutcome::Skipped(SkipReason::AwaitingPayment));
    }
    if submission.payment.registered {
        return Ok(PhaseOutcome::Skipped(SkipReason::PaymentAlreadyRegistered));
    }

    let selection = submission.registration_backend.clone();
    let mut ctx = SubmissionContext::new(submission, services.store.clone());

    if let Some(selection) = selection {
        let plugin = resolve_enabled(&services.registry, &selection).map_err(PhaseError::Failed)?;
        let bound = bind_relaxed(plugin, &selection).map_err(PhaseError::Failed)?;
        bound
            .update_payment_status(&mut ctx)
            .await
            .map_err(|error| PhaseError::Failed(RegistrationFailure::from_plugin_error(&error)))?;
        info!(plugin = %selection.backend, "Payment status forwarded to backend");
    }

    services.payments.mark_registered(ctx.submission_mut()).await?;
    ctx.persist().await?;
    Ok(PhaseOutcome::Completed)
}
