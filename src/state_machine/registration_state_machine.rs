use super::errors::{StateMachineError, StateMachineResult};
use super::events::RegistrationEvent;
use super::states::RegistrationStatus;
use tracing::debug;

/// Transition table for [`RegistrationStatus`].
///
/// Persistence is not handled here: callers apply the returned state to the
/// submission and write it through their store.
#[derive(Debug, Clone, Copy, Default)]
pub struct RegistrationStateMachine;

impl RegistrationStateMachine {
    /// Determine the target state based on current state and event
    pub fn determine_target_state(
        current_state: RegistrationStatus,
        event: &RegistrationEvent,
    ) -> StateMachineResult<RegistrationStatus> {
        use RegistrationEvent as E;
        use RegistrationStatus as S;

        let target = match (current_state, event) {
            // A crashed attempt leaves `in_progress` behind; the next attempt restarts it.
            (S::Pending | S::Failed | S::InProgress, E::Start) => S::InProgress,

            (S::InProgress, E::Succeed) => S::Success,

            // Pre-registration failures land here without an attempt having started.
            (S::Pending | S::InProgress | S::Failed, E::Fail(_)) => S::Failed,

            (_, E::Reset) => S::Pending,

            (from_state, _) => {
                return Err(StateMachineError::InvalidTransition {
                    from: from_state.to_string(),
                    event: event.event_type().to_string(),
                })
            }
        };

        debug!(
            from = %current_state,
            to = %target,
            event = event.event_type(),
            "Registration status transition"
        );

        Ok(target)
    }

    /// Apply `event` to `status` in place, returning the new state.
    pub fn transition(
        status: &mut RegistrationStatus,
        event: &RegistrationEvent,
    ) -> StateMachineResult<RegistrationStatus> {
        let target = Self::determine_target_state(*status, event)?;
        *status = target;
        Ok(target)
    }
}
