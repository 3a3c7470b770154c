//! Periodic resend of failed registrations.

use super::types::RegistrationJob;
use super::worker::JobQueue;
use crate::config::RegistrationConfig;
use crate::error::Result;
use crate::store::SubmissionStore;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tracing::{info, instrument};
use uuid::Uuid;

/// Enqueues retry jobs for failed submissions that still need one.
pub struct ResendSweeper {
    store: Arc<dyn SubmissionStore>,
    config: Arc<RegistrationConfig>,
    queue: JobQueue,
}

impl ResendSweeper {
    pub fn new(
        store: Arc<dyn SubmissionStore>,
        config: Arc<RegistrationConfig>,
        queue: JobQueue,
    ) -> Self {
        Self {
            store,
            config,
            queue,
        }
    }

    /// Enqueue a retry for every failed submission completed within the
    /// retry window and still below the attempt limit. Returns the enqueued
    /// submission ids, oldest first.
    #[instrument(skip(self))]
    pub async fn sweep(&self, now: DateTime<Utc>) -> Result<Vec<Uuid>> {
        let cutoff = now - self.config.retry_window();
        let submission_ids = self
            .store
            .list_retryable(cutoff, self.config.registration_attempt_limit)
            .await?;

        for submission_id in &submission_ids {
            self.queue.enqueue(RegistrationJob::retry(*submission_id))?;
        }

        info!(
            cutoff = %cutoff,
            enqueued = submission_ids.len(),
            "Resend sweep finished"
        );
        Ok(submission_ids)
    }
}
