//! # Orchestration Types
//!
//! Triggers, phase outcomes and recorded failures shared by the phases and the
//! task runner.

use super::collaborators::ReferenceError;
use crate::ledger::LedgerError;
use crate::registry::PluginError;
use crate::state_machine::StateMachineError;
use crate::store::StoreError;
use serde::{Deserialize, Serialize};
use std::error::Error as StdError;
use std::fmt;
use thiserror::Error;
use uuid::Uuid;

/// Why a phase is being run. Only changes whether recorded failures are
/// surfaced and whether payments get marked; never the shape of a phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Trigger {
    OnCompletion,
    OnRetry,
    OnPaymentComplete,
}

impl Trigger {
    pub fn is_retry(&self) -> bool {
        matches!(self, Self::OnRetry)
    }

    /// Recorded failures are handed back to the queue only on an explicit
    /// retry, so the first attempt never blocks the submitter.
    pub fn propagates_failures(&self) -> bool {
        self.is_retry()
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::OnCompletion => "on-completion",
            Self::OnRetry => "on-retry",
            Self::OnPaymentComplete => "on-payment-complete",
        }
    }
}

impl fmt::Display for Trigger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Phase {
    PreRegistration,
    Registration,
    PaymentUpdate,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::PreRegistration => "pre-registration",
            Self::Registration => "registration",
            Self::PaymentUpdate => "payment status update",
        })
    }
}

/// Guards that short-circuit a phase without touching the submission.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "reason")]
pub enum SkipReason {
    /// `completed_on` is unset; should never happen
    NotCompleted,
    AlreadyPreRegistered,
    AlreadyRegistered,
    PreRegistrationIncomplete,
    AwaitingCosign,
    AwaitingPayment,
    AttemptLimitReached { attempts: u32, limit: u32 },
    /// Payment update requested before registration succeeded
    NotRegistered,
    PaymentAlreadyRegistered,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PhaseOutcome {
    Completed,
    Skipped(SkipReason),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    PluginNotFound,
    PluginDisabled,
    InvalidOptions,
    OwnershipDenied,
    /// The plugin signalled that it could not complete
    Declared,
    Unexpected,
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::PluginNotFound => "PluginNotFound",
            Self::PluginDisabled => "PluginDisabled",
            Self::InvalidOptions => "InvalidOptions",
            Self::OwnershipDenied => "OwnershipDenied",
            Self::Declared => "RegistrationFailed",
            Self::Unexpected => "UnexpectedError",
        })
    }
}

/// A failure that was written to the ledger's `traceback`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegistrationFailure {
    pub kind: FailureKind,
    pub message: String,
    /// Rendered kind, message and cause chain, as stored in the ledger
    pub traceback: String,
}

impl RegistrationFailure {
    pub fn new(kind: FailureKind, message: impl Into<String>) -> Self {
        let message = message.into();
        let traceback = format!("{kind}: {message}");
        Self {
            kind,
            message,
            traceback,
        }
    }

    /// Build from an error, rendering its full `source()` chain.
    pub fn from_error(kind: FailureKind, error: &(dyn StdError + 'static)) -> Self {
        let message = error.to_string();
        let mut traceback = format!("{kind}: {message}");
        let mut source = error.source();
        while let Some(cause) = source {
            traceback.push_str("\n  caused by: ");
            traceback.push_str(&cause.to_string());
            source = cause.source();
        }
        Self {
            kind,
            message,
            traceback,
        }
    }

    /// Classify a plugin error. Declared and unexpected failures are handled
    /// the same way; the kind only keeps them apart in the traceback.
    pub fn from_plugin_error(error: &PluginError) -> Self {
        let kind = match error {
            PluginError::RegistrationFailed { .. } => FailureKind::Declared,
            PluginError::PermissionDenied(_) => FailureKind::OwnershipDenied,
            _ => FailureKind::Unexpected,
        };
        Self::from_error(kind, error)
    }
}

impl fmt::Display for RegistrationFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.kind, self.message)
    }
}

/// Errors out of a phase function. `Failed` has already been recorded on the
/// submission; the task runner decides whether to surface it.
#[derive(Debug, Error)]
pub enum PhaseError {
    #[error("{0}")]
    Failed(RegistrationFailure),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    StateMachine(#[from] StateMachineError),

    #[error(transparent)]
    Ledger(#[from] LedgerError),

    #[error(transparent)]
    Reference(#[from] ReferenceError),
}

/// What the task queue sees for one task invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskOutcome {
    Completed,
    Skipped(SkipReason),
    /// Recorded and swallowed (non-retry trigger)
    Failed(RegistrationFailure),
    /// Another execution for the same submission was in flight
    Coalesced,
}

impl TaskOutcome {
    pub fn is_completed(&self) -> bool {
        matches!(self, Self::Completed)
    }
}

/// A unit of work for the worker pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegistrationJob {
    pub submission_id: Uuid,
    pub trigger: Trigger,
    /// 1 for the first delivery
    pub delivery: u32,
}

impl RegistrationJob {
    pub fn new(submission_id: Uuid, trigger: Trigger) -> Self {
        Self {
            submission_id,
            trigger,
            delivery: 1,
        }
    }

    pub fn on_completion(submission_id: Uuid) -> Self {
        Self::new(submission_id, Trigger::OnCompletion)
    }

    pub fn retry(submission_id: Uuid) -> Self {
        Self::new(submission_id, Trigger::OnRetry)
    }

    pub fn payment_complete(submission_id: Uuid) -> Self {
        Self::new(submission_id, Trigger::OnPaymentComplete)
    }

    /// The next delivery of this job. A redelivered completion job runs as an
    /// explicit retry.
    pub fn redelivery(&self) -> Self {
        let trigger = match self.trigger {
            Trigger::OnCompletion => Trigger::OnRetry,
            other => other,
        };
        Self {
            submission_id: self.submission_id,
            trigger,
            delivery: self.delivery.saturating_add(1),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Error)]
    #[error("connection reset")]
    struct Reset;

    #[derive(Debug, Error)]
    #[error("POST /zaken failed")]
    struct ApiError(#[source] Reset);

    #[test]
    fn test_traceback_renders_cause_chain() {
        let error = PluginError::Unexpected(anyhow::Error::new(ApiError(Reset)));
        let failure = RegistrationFailure::from_plugin_error(&error);

        assert_eq!(failure.kind, FailureKind::Unexpected);
        assert!(failure.traceback.starts_with("UnexpectedError: POST /zaken failed"));
        assert!(failure.traceback.contains("caused by: connection reset"));
    }

    #[test]
    fn test_declared_failures_are_classified() {
        let failure =
            RegistrationFailure::from_plugin_error(&PluginError::registration_failed("HTTP 502"));
        assert_eq!(failure.kind, FailureKind::Declared);
        assert_eq!(failure.traceback, "RegistrationFailed: Registration failed: HTTP 502");
    }

    #[test]
    fn test_only_retry_propagates() {
        assert!(Trigger::OnRetry.propagates_failures());
        assert!(!Trigger::OnCompletion.propagates_failures());
        assert!(!Trigger::OnPaymentComplete.propagates_failures());
        assert_eq!(
            serde_json::to_value(Trigger::OnPaymentComplete).unwrap(),
            "on-payment-complete"
        );
    }

    #[test]
    fn test_redelivery_turns_completion_into_retry() {
        let id = Uuid::new_v4();
        let job = RegistrationJob::on_completion(id).redelivery();
        assert_eq!(job.trigger, Trigger::OnRetry);
        assert_eq!(job.delivery, 2);

        let payment = RegistrationJob::payment_complete(id).redelivery();
        assert_eq!(payment.trigger, Trigger::OnPaymentComplete);
    }
}
