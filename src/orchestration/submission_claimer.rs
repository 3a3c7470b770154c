//! # Submission Claimer
//!
//! At most one in-flight execution per submission. Two executions racing
//! through the guard could both see a ledger path absent and create the same
//! external resource twice, so a second request for a claimed submission is
//! coalesced instead of run.
//!
//! Claims are stored through [`SubmissionStore::try_claim`], so they hold
//! across runners and across processes sharing the store. A claim left behind
//! by a crashed process is taken over once it is older than the claim timeout.
//!
//! ```rust,ignore
//! let claimer = SubmissionClaimer::new(store, "orchestrator-host123", timeout);
//! if let Some(claim) = claimer.try_claim(submission_id).await? {
//!     // ... run phases
//!     claim.release().await;
//! }
//! ```

use crate::store::{StoreResult, SubmissionStore};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};
use uuid::Uuid;

#[derive(Clone)]
pub struct SubmissionClaimer {
    store: Arc<dyn SubmissionStore>,
    claimer_id: String,
    timeout: Duration,
}

impl SubmissionClaimer {
    pub fn new(
        store: Arc<dyn SubmissionStore>,
        claimer_id: impl Into<String>,
        timeout: Duration,
    ) -> Self {
        Self {
            store,
            claimer_id: claimer_id.into(),
            timeout,
        }
    }

    pub fn claimer_id(&self) -> &str {
        &self.claimer_id
    }

    /// Claim `submission_id`, or `None` when another execution holds it.
    pub async fn try_claim(&self, submission_id: Uuid) -> StoreResult<Option<SubmissionClaim>> {
        // Unique per claim so a stale release never drops a newer claim
        let claimant = format!("{}/{}", self.claimer_id, Uuid::new_v4());
        if !self
            .store
            .try_claim(submission_id, &claimant, self.timeout)
            .await?
        {
            debug!(
                submission_id = %submission_id,
                claimer_id = %self.claimer_id,
                "Submission already claimed"
            );
            return Ok(None);
        }
        Ok(Some(SubmissionClaim {
            submission_id,
            claimant,
            store: Some(Arc::clone(&self.store)),
        }))
    }
}

impl std::fmt::Debug for SubmissionClaimer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SubmissionClaimer")
            .field("claimer_id", &self.claimer_id)
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

/// A held claim. [`SubmissionClaim::release`] gives it back; dropping it
/// unreleased (panic, cancellation) spawns the release on the current runtime.
pub struct SubmissionClaim {
    submission_id: Uuid,
    claimant: String,
    store: Option<Arc<dyn SubmissionStore>>,
}

impl SubmissionClaim {
    pub fn submission_id(&self) -> Uuid {
        self.submission_id
    }

    pub fn claimant(&self) -> &str {
        &self.claimant
    }

    pub async fn release(mut self) {
        if let Some(store) = self.store.take() {
            let claimant = std::mem::take(&mut self.claimant);
            release_claim(store, self.submission_id, claimant).await;
        }
    }
}

impl std::fmt::Debug for SubmissionClaim {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SubmissionClaim")
            .field("submission_id", &self.submission_id)
            .field("claimant", &self.claimant)
            .finish_non_exhaustive()
    }
}

impl Drop for SubmissionClaim {
    fn drop(&mut self) {
        let Some(store) = self.store.take() else {
            return;
        };
        let claimant = std::mem::take(&mut self.claimant);
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn(release_claim(store, self.submission_id, claimant));
            }
            Err(_) => warn!(
                submission_id = %self.submission_id,
                "No runtime to release claim, it expires after the claim timeout"
            ),
        }
    }
}

async fn release_claim(store: Arc<dyn SubmissionStore>, submission_id: Uuid, claimant: String) {
    if let Err(e) = store.release_claim(submission_id, &claimant).await {
        warn!(
            submission_id = %submission_id,
            error = %e,
            "Failed to release claim, it expires after the claim timeout"
        );
    }
}
