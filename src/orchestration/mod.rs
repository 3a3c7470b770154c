//! # Registration Orchestration
//!
//! Drives a completed submission through pre-registration and registration
//! against its selected backend plugin.
//!
//! ## Core Components
//!
//! - **pre_register / register**: the two phases. Each loads the submission,
//!   checks its guards, invokes the plugin and persists the outcome. Plugin
//!   failures are recorded on the submission and returned as
//!   [`PhaseError::Failed`].
//! - **RegistrationTaskRunner**: queue entry points. Applies the trigger
//!   policy and the per-submission claim.
//! - **RegistrationWorkerPool**: tokio workers with backoff redelivery.
//! - **ResendSweeper**: re-enqueues failed submissions inside the retry window.
//! - **RegistrationServices**: the store, plugin registry and collaborators
//!   the phases depend on.

mod binding;
pub mod collaborators;
pub mod payment;
pub mod pre_registration;
pub mod registration;
pub mod resend;
pub mod services;
pub mod submission_claimer;
pub mod task_runner;
pub mod types;
pub mod worker;

pub use collaborators::{
    DefaultReferenceGenerator, NoopReportGenerator, PaymentRecords, ReferenceError,
    ReferenceGenerator, ReportGenerator, SubmissionPaymentRecords,
};
pub use payment::update_payment_status;
pub use pre_registration::pre_register;
pub use registration::register;
pub use resend::ResendSweeper;
pub use services::RegistrationServices;
pub use submission_claimer::{SubmissionClaim, SubmissionClaimer};
pub use task_runner::RegistrationTaskRunner;
pub use types::{
    FailureKind, Phase, PhaseError, PhaseOutcome, RegistrationFailure, RegistrationJob,
    SkipReason, TaskOutcome, Trigger,
};
pub use worker::{JobQueue, RegistrationWorkerPool, WorkerStats, WorkerStatsSnapshot};
