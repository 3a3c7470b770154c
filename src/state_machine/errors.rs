use thiserror::Error;

/// Errors raised by registration status transitions
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StateMachineError {
    #[error("Invalid state transition from {from} on event {event}")]
    InvalidTransition { from: String, event: String },
}

/// Result type alias for state machine operations
pub type StateMachineResult<T> = Result<T, StateMachineError>;
