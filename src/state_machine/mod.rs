//! Registration status state machine.
//!
//! Status changes on a [`Submission`](crate::models::Submission) go through
//! [`RegistrationStateMachine`] so that `success` can never be silently
//! downgraded by a late or duplicated attempt.

pub mod errors;
pub mod events;
pub mod registration_state_machine;
pub mod states;

pub use errors::{StateMachineError, StateMachineResult};
pub use events::RegistrationEvent;
pub use registration_state_machine::RegistrationStateMachine;
pub use states::RegistrationStatus;
