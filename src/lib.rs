#![allow(clippy::doc_markdown)] // Allow technical terms like PostgreSQL, SQLx in docs
#![allow(clippy::missing_errors_doc)] // Allow public functions without # Errors sections
#![allow(clippy::must_use_candidate)] // Allow methods without must_use when context is clear

//! # Registration Core
//!
//! Idempotent registration of completed form submissions with external
//! backends (case management systems, document stores, mail).
//!
//! ## Overview
//!
//! A completed submission is handed to the plugin selected on its form. The
//! plugin talks to an external system that is not transactional with our
//! database, so every side effect is recorded in a per-submission ledger and
//! skipped when the task runs again. Tasks can be retried any number of times
//! without duplicating cases, documents or emails.
//!
//! ## Module Organization
//!
//! - [`ledger`] - The `registration_result` document and the guard around side effects
//! - [`registry`] - Plugin contract and plugin registry
//! - [`orchestration`] - Pre-registration, registration, task runner and worker pool
//! - [`state_machine`] - Registration status transitions
//! - [`models`] - The submission row as seen by registration
//! - [`store`] - Submission persistence (PostgreSQL and in-memory)
//! - [`config`] - Layered configuration
//! - [`error`] - Structured error handling
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use registration_core::config::RegistrationConfig;
//! use registration_core::orchestration::{RegistrationServices, RegistrationTaskRunner};
//! use registration_core::registry::PluginRegistry;
//! use registration_core::store::InMemorySubmissionStore;
//! use std::sync::Arc;
//!
//! # async fn example(submission_id: uuid::Uuid) -> registration_core::Result<()> {
//! let services = RegistrationServices::new(
//!     Arc::new(InMemorySubmissionStore::new()),
//!     Arc::new(PluginRegistry::empty()),
//!     RegistrationConfig::default(),
//! );
//! let runner = RegistrationTaskRunner::new(services);
//! let outcome = runner.on_submission_completed(submission_id).await?;
//! println!("{outcome:?}");
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod constants;
pub mod error;
pub mod ledger;
pub mod logging;
pub mod models;
pub mod orchestration;
pub mod registry;
pub mod state_machine;
pub mod store;

pub use config::{ConfigManager, RegistrationConfig};
pub use error::{RegistrationError, Result};
pub use ledger::{execute_unless_exists, Ledger, SubmissionContext};
pub use models::Submission;
pub use orchestration::{
    RegistrationJob, RegistrationServices, RegistrationTaskRunner, RegistrationWorkerPool,
    TaskOutcome, Trigger,
};
pub use registry::{PluginRegistry, RegistrationPlugin};
pub use state_machine::RegistrationStatus;
pub use store::SubmissionStore;
