use serde::{Deserialize, Serialize};

/// Events that can trigger registration status transitions
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum RegistrationEvent {
    /// A registration attempt begins
    Start,
    /// The attempt finished and the result was stored
    Succeed,
    /// The attempt (or pre-registration) failed with the given message
    Fail(String),
    /// Operator reset, the only way out of `success`
    Reset,
}

impl RegistrationEvent {
    /// Get a string representation of the event type for logging
    pub fn event_type(&self) -> &'static str {
        match self {
            Self::Start => "start",
            Self::Succeed => "succeed",
            Self::Fail(_) => "fail",
            Self::Reset => "reset",
        }
    }

    /// Extract error message if this is a failure event
    pub fn error_message(&self) -> Option<&str> {
        match self {
            Self::Fail(msg) => Some(msg),
            _ => None,
        }
    }

    /// Create a failure event with the given error message
    pub fn fail_with_error(error: impl Into<String>) -> Self {
        Self::Fail(error.into())
    }
}
