//! External collaborators of the orchestrator: reference generation, payment
//! bookkeeping and report generation.

use crate::config::ReferenceConfig;
use crate::constants::REFERENCE_ALPHABET;
use crate::models::Submission;
use crate::store::{StoreError, SubmissionStore};
use async_trait::async_trait;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, warn};
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum ReferenceError {
    #[error("No unique reference found after {attempts} attempts")]
    Exhausted { attempts: u32 },

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Produces a public reference when the plugin does not hand one out.
#[async_trait]
pub trait ReferenceGenerator: Send + Sync {
    async fn generate(&self, submission: &Submission) -> Result<String, ReferenceError>;
}

/// `<prefix>-<random>` references, checked for uniqueness against the store.
pub struct DefaultReferenceGenerator {
    store: Arc<dyn SubmissionStore>,
    config: ReferenceConfig,
}

impl DefaultReferenceGenerator {
    pub fn new(store: Arc<dyn SubmissionStore>, config: ReferenceConfig) -> Self {
        Self { store, config }
    }

    fn candidate(&self) -> String {
        let mut suffix = String::with_capacity(self.config.length);
        while suffix.len() < self.config.length {
            for byte in Uuid::new_v4().into_bytes() {
                if suffix.len() == self.config.length {
                    break;
                }
                if let Some(index) = alphabet_index(byte) {
                    suffix.push(char::from(REFERENCE_ALPHABET[index]));
                }
            }
        }
        format!("{}-{}", self.config.prefix, suffix)
    }
}

/// Bytes at or above the largest multiple of the alphabet size are rejected so
/// every character is equally likely.
fn alphabet_index(byte: u8) -> Option<usize> {
    let alphabet = REFERENCE_ALPHABET.len();
    let limit = 256 - 256 % alphabet;
    let byte = usize::from(byte);
    (byte < limit).then(|| byte % alphabet)
}

#[async_trait]
impl ReferenceGenerator for DefaultReferenceGenerator {
    async fn generate(&self, submission: &Submission) -> Result<String, ReferenceError> {
        let attempts = self.config.max_collision_retries.saturating_add(1);
        for attempt in 1..=attempts {
            let reference = self.candidate();
            if !self.store.reference_exists(&reference).await? {
                debug!(submission_id = %submission.uuid, reference = %reference, "Generated public reference");
                return Ok(reference);
            }
            warn!(attempt, reference = %reference, "Generated reference already in use");
        }
        Err(ReferenceError::Exhausted { attempts })
    }
}

/// Payment records attached to a submission.
#[async_trait]
pub trait PaymentRecords: Send + Sync {
    /// Mark the submission's payments as forwarded to the backend. The caller
    /// persists `submission` afterwards.
    async fn mark_registered(&self, submission: &mut Submission) -> Result<(), StoreError>;
}

/// Payment state kept on the submission row itself.
#[derive(Debug, Default, Clone, Copy)]
pub struct SubmissionPaymentRecords;

#[async_trait]
impl PaymentRecords for SubmissionPaymentRecords {
    async fn mark_registered(&self, submission: &mut Submission) -> Result<(), StoreError> {
        submission.payment.registered = true;
        Ok(())
    }
}

/// Renders the submission report (PDF) between the two phases.
#[async_trait]
pub trait ReportGenerator: Send + Sync {
    async fn generate_report(&self, submission: &Submission) -> anyhow::Result<()>;
}

/// For deployments where report rendering lives elsewhere.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopReportGenerator;

#[async_trait]
impl ReportGenerator for NoopReportGenerator {
    async fn generate_report(&self, _submission: &Submission) -> anyhow::Result<()> {
        Ok(())
    }
}
