use serde::{Deserialize, Serialize};
use std::fmt;

/// Registration status of a submission.
///
/// `Success` is monotonic: once reached it is only left through an explicit
/// [`RegistrationEvent::Reset`](super::events::RegistrationEvent::Reset).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RegistrationStatus {
    /// Initial state, nothing attempted yet
    #[default]
    Pending,
    /// A registration attempt started and has not finished
    InProgress,
    /// Registration completed; the ledger is frozen
    Success,
    /// The last attempt failed; a traceback is recorded in the ledger
    Failed,
}

impl RegistrationStatus {
    /// Check if this is a terminal state (no further transitions allowed)
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Success)
    }

    /// Check if this is an error state that may allow recovery
    pub fn is_error(&self) -> bool {
        matches!(self, Self::Failed)
    }

    /// Check if an attempt is currently running (or crashed mid-flight)
    pub fn is_active(&self) -> bool {
        matches!(self, Self::InProgress)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::InProgress => "in_progress",
            Self::Success => "success",
            Self::Failed => "failed",
        }
    }
}

impl fmt::Display for RegistrationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for RegistrationStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "in_progress" => Ok(Self::InProgress),
            "success" => Ok(Self::Success),
            "failed" => Ok(Self::Failed),
            _ => Err(format!("Invalid registration status: {s}")),
        }
    }
}
