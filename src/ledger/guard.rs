//! # Execute-Unless-Exists Guard
//!
//! At-most-once execution of side-effecting calls, keyed by a ledger path.
//!
//! The guard looks the path up in the submission's ledger. A truthy value means
//! the effect already ran on an earlier attempt and its stored result is returned
//! without invoking the effect again. Otherwise the effect runs, its result is
//! written at the path and the ledger is persisted *before* the guard returns, so
//! the next side effect only starts once this one is durably recorded.
//!
//! If the effect fails nothing is written and the error propagates; the next
//! attempt sees the path absent and runs the same effect again.
//!
//! A falsy result (`null`, `0`, `""`, ...) is stored but still counts as "not
//! done": effects must not report success through a falsy value.

use super::{Ledger, LedgerError};
use crate::models::Submission;
use crate::registry::PluginError;
use crate::store::{StoreError, SubmissionStore};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::future::Future;
use std::sync::Arc;
use tracing::debug;
use uuid::Uuid;

/// Run `effect` unless `path` already holds a truthy result.
pub async fn execute_unless_exists<T, F, Fut>(
    submission: &mut Submission,
    store: &dyn SubmissionStore,
    path: &str,
    effect: F,
) -> Result<T, PluginError>
where
    T: Serialize + DeserializeOwned,
    F: FnOnce() -> Fut,
    Fut: Future<Output = Result<T, PluginError>>,
{
    if let Some(existing) = submission
        .registration_result
        .get(path)
        .filter(|value| super::is_truthy(value))
    {
        debug!(
            submission_id = %submission.uuid,
            path = %path,
            "Ledger entry present, skipping side effect"
        );
        return serde_json::from_value(existing.clone()).map_err(|source| {
            LedgerError::Decode {
                path: path.to_string(),
                source,
            }
            .into()
        });
    }

    let result = effect().await?;

    let encoded = serde_json::to_value(&result).map_err(|source| LedgerError::Encode {
        path: path.to_string(),
        source,
    })?;
    submission.registration_result.assign(path, encoded)?;
    store
        .save_registration_result(submission.uuid, &submission.registration_result)
        .await?;

    debug!(
        submission_id = %submission.uuid,
        path = %path,
        "Side effect recorded in ledger"
    );

    Ok(result)
}

/// A loaded submission plus the store it is persisted to.
///
/// Handed to plugins for the duration of a phase; it is the only way for a
/// plugin to reach the guard.
pub struct SubmissionContext {
    submission: Submission,
    store: Arc<dyn SubmissionStore>,
}

impl SubmissionContext {
    pub fn new(submission: Submission, store: Arc<dyn SubmissionStore>) -> Self {
        Self { submission, store }
    }

    pub fn submission(&self) -> &Submission {
        &self.submission
    }

    pub fn submission_mut(&mut self) -> &mut Submission {
        &mut self.submission
    }

    pub fn submission_id(&self) -> Uuid {
        self.submission.uuid
    }

    pub fn ledger(&self) -> &Ledger {
        &self.submission.registration_result
    }

    pub fn ledger_mut(&mut self) -> &mut Ledger {
        &mut self.submission.registration_result
    }

    /// See [`execute_unless_exists`].
    pub async fn execute_unless_exists<T, F, Fut>(
        &mut self,
        path: &str,
        effect: F,
    ) -> Result<T, PluginError>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, PluginError>>,
    {
        execute_unless_exists(&mut self.submission, self.store.as_ref(), path, effect).await
    }

    /// Persist only the ledger.
    pub async fn persist_ledger(&self) -> Result<(), StoreError> {
        self.store
            .save_registration_result(self.submission.uuid, &self.submission.registration_result)
            .await
    }

    /// Persist the whole submission row.
    pub async fn persist(&self) -> Result<(), StoreError> {
        self.store.save(&self.submission).await
    }

    pub fn into_submission(self) -> Submission {
        self.submission
    }
}
