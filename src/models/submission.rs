//! # Submission Model
//!
//! ## Registration bookkeeping
//!
//! - `public_registration_reference`: empty until pre-registration assigns it
//! - `registration_status`: see [`RegistrationStatus`]
//! - `registration_attempts`: incremented once per registration-phase attempt
//! - `pre_registration_completed`: gates the registration phase
//! - `registration_result`: the [`Ledger`]
//!
//! ## Database Schema
//!
//! Maps to the `registration_submissions` table (see `migrations/`), with the
//! backend options, ledger and gating state stored as JSONB.

use crate::ledger::Ledger;
use crate::state_machine::{
    RegistrationEvent, RegistrationStateMachine, RegistrationStatus, StateMachineResult,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

/// Which registration backend handles a submission, with its raw options.
///
/// The options are unvalidated; they go through the plugin's options schema
/// before every use.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BackendSelection {
    /// Plugin identifier in the plugin registry
    pub backend: String,
    /// Raw options blob
    #[serde(default)]
    pub options: Value,
}

impl BackendSelection {
    pub fn new(backend: impl Into<String>, options: Value) -> Self {
        Self {
            backend: backend.into(),
            options,
        }
    }
}

/// Co-signature gating.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CosignState {
    pub required: bool,
    pub completed: bool,
}

impl CosignState {
    /// Registration must wait for a co-signer.
    pub fn is_waiting(&self) -> bool {
        self.required && !self.completed
    }
}

/// Payment gating and bookkeeping.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PaymentState {
    pub required: bool,
    pub paid: bool,
    /// Set once the payment has been reported to the registration backend
    pub registered: bool,
}

impl PaymentState {
    pub fn is_required_and_unpaid(&self) -> bool {
        self.required && !self.paid
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Submission {
    pub uuid: Uuid,
    /// Unset means the submission is not eligible for registration.
    pub completed_on: Option<DateTime<Utc>>,
    #[serde(default)]
    pub public_registration_reference: String,
    #[serde(default)]
    pub registration_status: RegistrationStatus,
    #[serde(default)]
    pub registration_attempts: u32,
    pub last_register_date: Option<DateTime<Utc>>,
    #[serde(default)]
    pub pre_registration_completed: bool,
    #[serde(default)]
    pub registration_result: Ledger,
    #[serde(default)]
    pub needs_on_completion_retry: bool,
    pub registration_backend: Option<BackendSelection>,
    /// Reference to a pre-existing external object the user claims to own.
    pub initial_data_reference: Option<String>,
    #[serde(default)]
    pub cosign: CosignState,
    #[serde(default)]
    pub payment: PaymentState,
}

impl Submission {
    /// A fresh, not yet completed submission.
    pub fn new(uuid: Uuid) -> Self {
        Self {
            uuid,
            completed_on: None,
            public_registration_reference: String::new(),
            registration_status: RegistrationStatus::Pending,
            registration_attempts: 0,
            last_register_date: None,
            pre_registration_completed: false,
            registration_result: Ledger::new(),
            needs_on_completion_retry: false,
            registration_backend: None,
            initial_data_reference: None,
            cosign: CosignState::default(),
            payment: PaymentState::default(),
        }
    }

    /// A submission completed now, ready for registration.
    pub fn completed(uuid: Uuid) -> Self {
        Self {
            completed_on: Some(Utc::now()),
            ..Self::new(uuid)
        }
    }

    pub fn with_backend(mut self, backend: impl Into<String>, options: Value) -> Self {
        self.registration_backend = Some(BackendSelection::new(backend, options));
        self
    }

    pub fn has_public_reference(&self) -> bool {
        !self.public_registration_reference.is_empty()
    }

    /// Apply a status event through the registration state machine.
    pub fn transition(&mut self, event: &RegistrationEvent) -> StateMachineResult<RegistrationStatus> {
        RegistrationStateMachine::transition(&mut self.registration_status, event)
    }

    /// Bookkeeping at the start of a registration attempt.
    pub fn begin_attempt(&mut self, now: DateTime<Utc>) -> StateMachineResult<()> {
        self.transition(&RegistrationEvent::Start)?;
        self.registration_attempts += 1;
        self.last_register_date = Some(now);
        Ok(())
    }
}
