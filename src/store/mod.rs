//! # Submission Persistence
//!
//! The registration core only needs a handful of operations on the submission
//! row. Every write is a single statement; no transaction is held open while
//! a plugin talks to an external system.
//!
//! The per-submission execution claim lives here as well, so every runner and
//! every process sharing a store sees the same claims.

pub mod memory;
#[cfg(feature = "postgres")]
pub mod postgres;

pub use memory::InMemorySubmissionStore;
#[cfg(feature = "postgres")]
pub use postgres::PgSubmissionStore;

use crate::ledger::Ledger;
use crate::models::Submission;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::time::Duration;
use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Submission {0} not found")]
    NotFound(Uuid),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Corrupt submission row {submission_id}: {reason}")]
    CorruptRow { submission_id: Uuid, reason: String },

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Store backend error: {0}")]
    Backend(String),
}

pub type StoreResult<T> = Result<T, StoreError>;

#[async_trait]
pub trait SubmissionStore: Send + Sync {
    async fn load(&self, submission_id: Uuid) -> StoreResult<Submission>;

    /// Persist every registration-owned field of the submission.
    async fn save(&self, submission: &Submission) -> StoreResult<()>;

    /// Persist only the ledger. Used by the guard after each side effect.
    async fn save_registration_result(
        &self,
        submission_id: Uuid,
        ledger: &Ledger,
    ) -> StoreResult<()>;

    /// Whether any submission already carries `reference`.
    async fn reference_exists(&self, reference: &str) -> StoreResult<bool>;

    /// Failed submissions flagged for retry, completed after `completed_after`
    /// and with fewer than `attempt_limit` attempts.
    async fn list_retryable(
        &self,
        completed_after: DateTime<Utc>,
        attempt_limit: u32,
    ) -> StoreResult<Vec<Uuid>>;

    /// Claim `submission_id` for `claimant` unless a live claim exists. A
    /// claim older than `timeout` is considered abandoned and taken over.
    /// Returns `false` when another claim is live.
    async fn try_claim(
        &self,
        submission_id: Uuid,
        claimant: &str,
        timeout: Duration,
    ) -> StoreResult<bool>;

    /// Drop the claim if `claimant` still holds it.
    async fn release_claim(&self, submission_id: Uuid, claimant: &str) -> StoreResult<()>;
}
