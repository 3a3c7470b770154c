//! Crate-level error type.
//!
//! Each layer owns a focused `thiserror` enum (ledger, store, registry, plugin,
//! state machine, configuration, reference generation). [`RegistrationError`]
//! is what the task runner hands back to its caller, i.e. the task queue.

use crate::config::ConfigurationError;
use crate::ledger::LedgerError;
use crate::orchestration::collaborators::ReferenceError;
use crate::orchestration::types::{Phase, RegistrationFailure};
use crate::registry::RegistryError;
use crate::state_machine::StateMachineError;
use crate::store::StoreError;
use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum RegistrationError {
    /// A phase recorded a failure and the trigger asks for it to be surfaced.
    #[error("{phase} failed for submission {submission_id}: {failure}")]
    PhaseFailed {
        phase: Phase,
        submission_id: Uuid,
        failure: RegistrationFailure,
    },

    #[error("Report generation failed for submission {submission_id}: {reason}")]
    ReportGeneration { submission_id: Uuid, reason: String },

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Ledger(#[from] LedgerError),

    #[error(transparent)]
    Registry(#[from] RegistryError),

    #[error(transparent)]
    Reference(#[from] ReferenceError),

    #[error(transparent)]
    StateMachine(#[from] StateMachineError),

    #[error(transparent)]
    Configuration(#[from] ConfigurationError),

    #[error("Worker pool error: {0}")]
    Worker(String),
}

impl RegistrationError {
    /// Whether a task queue redelivery could plausibly succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::PhaseFailed { .. }
            | Self::ReportGeneration { .. }
            | Self::Store(_)
            | Self::Reference(_) => true,
            Self::Ledger(_)
            | Self::Registry(_)
            | Self::StateMachine(_)
            | Self::Configuration(_)
            | Self::Worker(_) => false,
        }
    }
}

pub type Result<T> = std::result::Result<T, RegistrationError>;
