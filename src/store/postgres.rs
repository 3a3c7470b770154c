//! # PostgreSQL Submission Store
//!
//! Stores registration bookkeeping in the `registration_submissions` table.
//! The ledger lives in a JSONB column and is written on its own by
//! [`SubmissionStore::save_registration_result`], so the guard never rewrites
//! the rest of the row between side effects.
//!
//! Execution claims use the `claimed_by`/`claimed_at` columns. A claim is taken
//! by one conditional `UPDATE`, so concurrent claimants serialize on the row
//! lock and at most one of them sees its update applied.

use super::{StoreError, StoreResult, SubmissionStore};
use crate::ledger::Ledger;
use crate::models::{BackendSelection, CosignState, PaymentState, Submission};
use crate::state_machine::RegistrationStatus;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;
use sqlx::types::Json;
use sqlx::{FromRow, PgPool};
use std::time::Duration;
use tracing::{debug, instrument};
use uuid::Uuid;

const SELECT_COLUMNS: &str = r#"
    SELECT uuid, completed_on, public_registration_reference, registration_status,
           registration_attempts, last_register_date, pre_registration_completed,
           registration_result, needs_on_completion_retry, registration_backend,
           initial_data_reference, cosign, payment
    FROM registration_submissions
"#;

#[derive(Debug, FromRow)]
struct SubmissionRow {
    uuid: Uuid,
    completed_on: Option<DateTime<Utc>>,
    public_registration_reference: String,
    registration_status: String,
    registration_attempts: i32,
    last_register_date: Option<DateTime<Utc>>,
    pre_registration_completed: bool,
    registration_result: Value,
    needs_on_completion_retry: bool,
    registration_backend: Option<Json<BackendSelection>>,
    initial_data_reference: Option<String>,
    cosign: Json<CosignState>,
    payment: Json<PaymentState>,
}

impl TryFrom<SubmissionRow> for Submission {
    type Error = StoreError;

    fn try_from(row: SubmissionRow) -> Result<Self, Self::Error> {
        let registration_status =
            row.registration_status
                .parse::<RegistrationStatus>()
                .map_err(|reason| StoreError::CorruptRow {
                    submission_id: row.uuid,
                    reason,
                })?;
        let registration_attempts =
            u32::try_from(row.registration_attempts).map_err(|_| StoreError::CorruptRow {
                submission_id: row.uuid,
                reason: format!(
                    "negative registration_attempts: {}",
                    row.registration_attempts
                ),
            })?;

        Ok(Submission {
            uuid: row.uuid,
            completed_on: row.completed_on,
            public_registration_reference: row.public_registration_reference,
            registration_status,
            registration_attempts,
            last_register_date: row.last_register_date,
            pre_registration_completed: row.pre_registration_completed,
            registration_result: Ledger::from_value(row.registration_result),
            needs_on_completion_retry: row.needs_on_completion_retry,
            registration_backend: row.registration_backend.map(|json| json.0),
            initial_data_reference: row.initial_data_reference,
            cosign: row.cosign.0,
            payment: row.payment.0,
        })
    }
}

fn attempts_param(attempts: u32) -> i32 {
    i32::try_from(attempts).unwrap_or(i32::MAX)
}

#[derive(Debug, Clone)]
pub struct PgSubmissionStore {
    pool: PgPool,
}

impl PgSubmissionStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Apply the embedded migrations.
    pub async fn migrate(&self) -> StoreResult<()> {
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| StoreError::Backend(format!("migration failed: {e}")))
    }

    /// Insert a new submission row, or replace an existing one.
    #[instrument(skip(self, submission), fields(submission_id = %submission.uuid))]
    pub async fn upsert(&self, submission: &Submission) -> StoreResult<()> {
        sqlx::query(
            r#"
            INSERT INTO registration_submissions
                (uuid, completed_on, public_registration_reference, registration_status,
                 registration_attempts, last_register_date, pre_registration_completed,
                 registration_result, needs_on_completion_retry, registration_backend,
                 initial_data_reference, cosign, payment)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)
            ON CONFLICT (uuid) DO UPDATE SET
                completed_on = EXCLUDED.completed_on,
                public_registration_reference = EXCLUDED.public_registration_reference,
                registration_status = EXCLUDED.registration_status,
                registration_attempts = EXCLUDED.registration_attempts,
                last_register_date = EXCLUDED.last_register_date,
                pre_registration_completed = EXCLUDED.pre_registration_completed,
                registration_result = EXCLUDED.registration_result,
                needs_on_completion_retry = EXCLUDED.needs_on_completion_retry,
                registration_backend = EXCLUDED.registration_backend,
                initial_data_reference = EXCLUDED.initial_data_reference,
                cosign = EXCLUDED.cosign,
                payment = EXCLUDED.payment
            "#,
        )
        .bind(submission.uuid)
        .bind(submission.completed_on)
        .bind(&submission.public_registration_reference)
        .bind(submission.registration_status.as_str())
        .bind(attempts_param(submission.registration_attempts))
        .bind(submission.last_register_date)
        .bind(submission.pre_registration_completed)
        .bind(submission.registration_result.to_value())
        .bind(submission.needs_on_completion_retry)
        .bind(submission.registration_backend.as_ref().map(Json))
        .bind(&submission.initial_data_reference)
        .bind(Json(submission.cosign))
        .bind(Json(submission.payment))
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

#[async_trait]
impl SubmissionStore for PgSubmissionStore {
    #[instrument(skip(self))]
    async fn load(&self, submission_id: Uuid) -> StoreResult<Submission> {
        let query = format!("{SELECT_COLUMNS} WHERE uuid = $1");
        let row: Option<SubmissionRow> = sqlx::query_as(&query)
            .bind(submission_id)
            .fetch_optional(&self.pool)
            .await?;

        row.ok_or(StoreError::NotFound(submission_id))?.try_into()
    }

    /// Registration-owned columns only; the surrounding application owns the
    /// gating fields (completion, backend selection, cosign) and may change
    /// them concurrently.
    #[instrument(skip(self, submission), fields(submission_id = %submission.uuid))]
    async fn save(&self, submission: &Submission) -> StoreResult<()> {
        let result = sqlx::query(
            r#"
            UPDATE registration_submissions SET
                public_registration_reference = $2,
                registration_status = $3,
                registration_attempts = $4,
                last_register_date = $5,
                pre_registration_completed = $6,
                registration_result = $7,
                needs_on_completion_retry = $8,
                payment = $9
            WHERE uuid = $1
            "#,
        )
        .bind(submission.uuid)
        .bind(&submission.public_registration_reference)
        .bind(submission.registration_status.as_str())
        .bind(attempts_param(submission.registration_attempts))
        .bind(submission.last_register_date)
        .bind(submission.pre_registration_completed)
        .bind(submission.registration_result.to_value())
        .bind(submission.needs_on_completion_retry)
        .bind(Json(submission.payment))
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound(submission.uuid));
        }
        debug!(status = %submission.registration_status, "Submission saved");
        Ok(())
    }

    async fn save_registration_result(
        &self,
        submission_id: Uuid,
        ledger: &Ledger,
    ) -> StoreResult<()> {
        let result = sqlx::query(
            "UPDATE registration_submissions SET registration_result = $2 WHERE uuid = $1",
        )
        .bind(submission_id)
        .bind(ledger.to_value())
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound(submission_id));
        }
        Ok(())
    }

    async fn reference_exists(&self, reference: &str) -> StoreResult<bool> {
        let exists: bool = sqlx::query_scalar(
            "SELECT EXISTS(SELECT 1 FROM registration_submissions WHERE public_registration_reference = $1)",
        )
        .bind(reference)
        .fetch_one(&self.pool)
        .await?;
        Ok(exists)
    }

    async fn list_retryable(
        &self,
        completed_after: DateTime<Utc>,
        attempt_limit: u32,
    ) -> StoreResult<Vec<Uuid>> {
        let ids: Vec<Uuid> = sqlx::query_scalar(
            r#"
            SELECT uuid FROM registration_submissions
            WHERE needs_on_completion_retry
              AND registration_status = 'failed'
              AND registration_attempts < $1
              AND completed_on >= $2
            ORDER BY completed_on
            "#,
        )
        .bind(attempts_param(attempt_limit))
        .bind(completed_after)
        .fetch_all(&self.pool)
        .await?;
        Ok(ids)
    }

    #[instrument(skip(self, timeout))]
    async fn try_claim(
        &self,
        submission_id: Uuid,
        claimant: &str,
        timeout: Duration,
    ) -> StoreResult<bool> {
        let claimed: Option<Uuid> = sqlx::query_scalar(
            r#"
            UPDATE registration_submissions
            SET claimed_by = $2, claimed_at = NOW()
            WHERE uuid = $1
              AND (claimed_at IS NULL
                   OR claimed_at < NOW() - make_interval(secs => $3::float8))
            RETURNING uuid
            "#,
        )
        .bind(submission_id)
        .bind(claimant)
        .bind(timeout.as_secs_f64())
        .fetch_optional(&self.pool)
        .await?;

        if claimed.is_some() {
            return Ok(true);
        }

        let exists: bool = sqlx::query_scalar(
            "SELECT EXISTS(SELECT 1 FROM registration_submissions WHERE uuid = $1)",
        )
        .bind(submission_id)
        .fetch_one(&self.pool)
        .await?;
        if !exists {
            return Err(StoreError::NotFound(submission_id));
        }
        debug!("Submission claimed elsewhere");
        Ok(false)
    }

    #[instrument(skip(self))]
    async fn release_claim(&self, submission_id: Uuid, claimant: &str) -> StoreResult<()> {
        sqlx::query(
            r#"
            UPDATE registration_submissions
            SET claimed_by = NULL, claimed_at = NULL
            WHERE uuid = $1 AND claimed_by = $2
            "#,
        )
        .bind(submission_id)
        .bind(claimant)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn row() -> SubmissionRow {
        SubmissionRow {
            uuid: Uuid::new_v4(),
            completed_on: Some(Utc::now()),
            public_registration_reference: "OF-7QK2PX".into(),
            registration_status: "failed".into(),
            registration_attempts: 2,
            last_register_date: None,
            pre_registration_completed: true,
            registration_result: json!({"traceback": "boom"}),
            needs_on_completion_retry: true,
            registration_backend: Some(Json(BackendSelection::new("email", json!({})))),
            initial_data_reference: None,
            cosign: Json(CosignState::default()),
            payment: Json(PaymentState::default()),
        }
    }

    #[test]
    fn test_row_conversion() {
        let submission = Submission::try_from(row()).unwrap();
        assert_eq!(submission.registration_status, RegistrationStatus::Failed);
        assert_eq!(submission.registration_attempts, 2);
        assert_eq!(submission.registration_result.traceback(), Some("boom"));
        assert_eq!(submission.registration_backend.unwrap().backend, "email");
    }

    #[test]
    fn test_corrupt_rows_are_rejected() {
        let mut bad_status = row();
        bad_status.registration_status = "complete".into();
        assert!(matches!(
            Submission::try_from(bad_status),
            Err(StoreError::CorruptRow { .. })
        ));

        let mut bad_attempts = row();
        bad_attempts.registration_attempts = -1;
        assert!(matches!(
            Submission::try_from(bad_attempts),
            Err(StoreError::CorruptRow { .. })
        ));
    }
}
