//! In-process submission store, used for tests and for embedding the
//! orchestrator without a database.

use super::{StoreError, StoreResult, SubmissionStore};
use crate::ledger::Ledger;
use crate::models::Submission;
use crate::state_machine::RegistrationStatus;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::time::Duration;
use uuid::Uuid;

#[derive(Debug, Clone)]
struct Claim {
    claimant: String,
    claimed_at: DateTime<Utc>,
}

impl Claim {
    fn is_live(&self, timeout: Duration) -> bool {
        let age = Utc::now().signed_duration_since(self.claimed_at);
        age.to_std().map_or(true, |age| age < timeout)
    }
}

#[derive(Debug, Default)]
pub struct InMemorySubmissionStore {
    submissions: RwLock<HashMap<Uuid, Submission>>,
    claims: DashMap<Uuid, Claim>,
}

impl InMemorySubmissionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace a submission.
    pub fn insert(&self, submission: Submission) {
        self.submissions.write().insert(submission.uuid, submission);
    }

    /// Snapshot of the stored row.
    pub fn get(&self, submission_id: Uuid) -> Option<Submission> {
        self.submissions.read().get(&submission_id).cloned()
    }

    pub fn len(&self) -> usize {
        self.submissions.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.submissions.read().is_empty()
    }

    pub fn is_claimed(&self, submission_id: Uuid) -> bool {
        self.claims.contains_key(&submission_id)
    }

    /// Current claimant of `submission_id`, expired claims included.
    pub fn claimant(&self, submission_id: Uuid) -> Option<String> {
        self.claims
            .get(&submission_id)
            .map(|claim| claim.claimant.clone())
    }
}

#[async_trait]
impl SubmissionStore for InMemorySubmissionStore {
    async fn load(&self, submission_id: Uuid) -> StoreResult<Submission> {
        self.get(submission_id)
            .ok_or(StoreError::NotFound(submission_id))
    }

    async fn save(&self, submission: &Submission) -> StoreResult<()> {
        let mut submissions = self.submissions.write();
        match submissions.get_mut(&submission.uuid) {
            // Same column set as the Postgres store: gating fields stay owned
            // by whoever inserted the row.
            Some(row) => {
                row.public_registration_reference = submission.public_registration_reference.clone();
                row.registration_status = submission.registration_status;
                row.registration_attempts = submission.registration_attempts;
                row.last_register_date = submission.last_register_date;
                row.pre_registration_completed = submission.pre_registration_completed;
                row.registration_result = submission.registration_result.clone();
                row.needs_on_completion_retry = submission.needs_on_completion_retry;
                row.payment = submission.payment;
                Ok(())
            }
            None => Err(StoreError::NotFound(submission.uuid)),
        }
    }

    async fn save_registration_result(
        &self,
        submission_id: Uuid,
        ledger: &Ledger,
    ) -> StoreResult<()> {
        let mut submissions = self.submissions.write();
        let row = submissions
            .get_mut(&submission_id)
            .ok_or(StoreError::NotFound(submission_id))?;
        row.registration_result = ledger.clone();
        Ok(())
    }

    async fn reference_exists(&self, reference: &str) -> StoreResult<bool> {
        Ok(self
            .submissions
            .read()
            .values()
            .any(|s| s.public_registration_reference == reference))
    }

    async fn list_retryable(
        &self,
        completed_after: DateTime<Utc>,
        attempt_limit: u32,
    ) -> StoreResult<Vec<Uuid>> {
        let mut candidates: Vec<(DateTime<Utc>, Uuid)> = self
            .submissions
            .read()
            .values()
            .filter(|s| s.needs_on_completion_retry)
            .filter(|s| s.registration_status == RegistrationStatus::Failed)
            .filter(|s| s.registration_attempts < attempt_limit)
            .filter_map(|s| {
                s.completed_on
                    .filter(|completed_on| *completed_on >= completed_after)
                    .map(|completed_on| (completed_on, s.uuid))
            })
            .collect();
        candidates.sort();
        Ok(candidates.into_iter().map(|(_, uuid)| uuid).collect())
    }

    async fn try_claim(
        &self,
        submission_id: Uuid,
        claimant: &str,
        timeout: Duration,
    ) -> StoreResult<bool> {
        if !self.submissions.read().contains_key(&submission_id) {
            return Err(StoreError::NotFound(submission_id));
        }
        let claim = Claim {
            claimant: claimant.to_string(),
            claimed_at: Utc::now(),
        };
        match self.claims.entry(submission_id) {
            Entry::Occupied(entry) if entry.get().is_live(timeout) => Ok(false),
            Entry::Occupied(mut entry) => {
                entry.insert(claim);
                Ok(true)
            }
            Entry::Vacant(entry) => {
                entry.insert(claim);
                Ok(true)
            }
        }
    }

    async fn release_claim(&self, submission_id: Uuid, claimant: &str) -> StoreResult<()> {
        self.claims
            .remove_if(&submission_id, |_, claim| claim.claimant == claimant);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use serde_json::json;

    #[tokio::test]
    async fn test_ledger_only_write_keeps_other_fields() {
        let store = InMemorySubmissionStore::new();
        let mut submission = Submission::completed(Uuid::new_v4());
        submission.public_registration_reference = "OF-ABCDEF".into();
        store.insert(submission.clone());

        let ledger = Ledger::from_value(json!({"intermediate": {"zaak": "z"}}));
        store
            .save_registration_result(submission.uuid, &ledger)
            .await
            .unwrap();

        let stored = store.load(submission.uuid).await.unwrap();
        assert_eq!(stored.registration_result, ledger);
        assert_eq!(stored.public_registration_reference, "OF-ABCDEF");
    }

    #[tokio::test]
    async fn test_missing_submission_is_reported() {
        let store = InMemorySubmissionStore::new();
        let id = Uuid::new_v4();
        assert!(matches!(store.load(id).await, Err(StoreError::NotFound(missing)) if missing == id));
        assert!(store.save(&Submission::new(id)).await.is_err());
    }

    #[tokio::test]
    async fn test_list_retryable_filters() {
        let store = InMemorySubmissionStore::new();
        let now = Utc::now();

        let mut retryable = Submission::completed(Uuid::new_v4());
        retryable.registration_status = RegistrationStatus::Failed;
        retryable.needs_on_completion_retry = true;
        retryable.registration_attempts = 1;

        let mut exhausted = retryable.clone();
        exhausted.uuid = Uuid::new_v4();
        exhausted.registration_attempts = 5;

        let mut too_old = retryable.clone();
        too_old.uuid = Uuid::new_v4();
        too_old.completed_on = Some(now - Duration::hours(72));

        let mut succeeded = retryable.clone();
        succeeded.uuid = Uuid::new_v4();
        succeeded.registration_status = RegistrationStatus::Success;

        for s in [&retryable, &exhausted, &too_old, &succeeded] {
            store.insert(s.clone());
        }

        let ids = store
            .list_retryable(now - Duration::hours(48), 5)
            .await
            .unwrap();
        assert_eq!(ids, vec![retryable.uuid]);
    }

    #[tokio::test]
    async fn test_claims_exclude_other_claimants() {
        let store = InMemorySubmissionStore::new();
        let submission = Submission::completed(Uuid::new_v4());
        let id = submission.uuid;
        store.insert(submission);
        let timeout = std::time::Duration::from_secs(300);

        assert!(store.try_claim(id, "runner-a", timeout).await.unwrap());
        assert!(!store.try_claim(id, "runner-b", timeout).await.unwrap());

        // Only the holder releases
        store.release_claim(id, "runner-b").await.unwrap();
        assert_eq!(store.claimant(id).as_deref(), Some("runner-a"));
        store.release_claim(id, "runner-a").await.unwrap();
        assert!(!store.is_claimed(id));
        assert!(store.try_claim(id, "runner-b", timeout).await.unwrap());
    }

    #[tokio::test]
    async fn test_expired_claim_is_taken_over() {
        let store = InMemorySubmissionStore::new();
        let submission = Submission::completed(Uuid::new_v4());
        let id = submission.uuid;
        store.insert(submission);

        assert!(store
            .try_claim(id, "crashed", std::time::Duration::ZERO)
            .await
            .unwrap());
        assert!(store
            .try_claim(id, "runner-b", std::time::Duration::ZERO)
            .await
            .unwrap());
        assert_eq!(store.claimant(id).as_deref(), Some("runner-b"));

        // A late release from the previous holder leaves the new claim alone
        store.release_claim(id, "crashed").await.unwrap();
        assert!(store.is_claimed(id));
    }

    #[tokio::test]
    async fn test_claiming_missing_submission_fails() {
        let store = InMemorySubmissionStore::new();
        let id = Uuid::new_v4();
        let result = store
            .try_claim(id, "runner-a", std::time::Duration::from_secs(1))
            .await;
        assert!(matches!(result, Err(StoreError::NotFound(missing)) if missing == id));
    }
}
