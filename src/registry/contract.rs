//! # Registration Plugin Contract
//!
//! Every registration backend implements [`RegistrationPlugin`]. The primary
//! callbacks always receive exactly the submission (through its
//! [`SubmissionContext`]) and the plugin's validated options; the signature is
//! fixed by the trait, so a backend with a different shape does not compile.
//!
//! Options arrive as an unvalidated JSON blob and go through the plugin's
//! [`PluginOptions`] schema before every call. The orchestrator uses
//! [`ValidationMode::Relaxed`], which only checks shape and types; cross-field
//! business rules run in [`ValidationMode::Strict`], used when an operator
//! edits the configuration.
//!
//! All side effects should go through
//! [`SubmissionContext::execute_unless_exists`] so that retries never repeat
//! them.

use crate::ledger::{JsonMap, Ledger, LedgerError, SubmissionContext};
use crate::store::StoreError;
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

/// Failures a plugin can report.
#[derive(Debug, Error)]
pub enum PluginError {
    /// Declared failure: the backend could not complete (for example a 5xx
    /// from a downstream API).
    #[error("Registration failed: {message}")]
    RegistrationFailed { message: String },

    /// Ownership verification of an initial data reference was denied.
    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    /// The backend cannot currently operate.
    #[error("Invalid plugin configuration: {0}")]
    Configuration(String),

    #[error(transparent)]
    Ledger(#[from] LedgerError),

    #[error(transparent)]
    Store(#[from] StoreError),

    /// Anything the plugin did not anticipate.
    #[error(transparent)]
    Unexpected(#[from] anyhow::Error),
}

impl PluginError {
    pub fn registration_failed(message: impl Into<String>) -> Self {
        Self::RegistrationFailed {
            message: message.into(),
        }
    }

    pub fn is_declared_failure(&self) -> bool {
        matches!(self, Self::RegistrationFailed { .. })
    }
}

/// The backend has no caseworker-facing reference for this result.
///
/// An expected outcome for some backends, not an error condition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("No submission reference available from the registration result")]
pub struct NoSubmissionReference;

/// Options failed their schema.
#[derive(Debug, Error)]
pub enum OptionsError {
    #[error("Options do not match the schema of '{plugin}': {source}")]
    Schema {
        plugin: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("Options of '{plugin}' violate a business rule: {reason}")]
    BusinessRule { plugin: String, reason: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValidationMode {
    /// Schema only; used by the orchestrator.
    #[default]
    Relaxed,
    /// Schema plus cross-field business rules.
    Strict,
}

/// Options schema of a plugin.
pub trait PluginOptions: DeserializeOwned + Send + Sync + 'static {
    /// Cross-field business rules, only checked in [`ValidationMode::Strict`].
    fn validate_business_rules(&self) -> Result<(), String> {
        Ok(())
    }
}

/// Schema-less options: any JSON object is accepted as-is.
impl PluginOptions for JsonMap {}

/// Deserialize `raw` through the options schema `O`.
pub fn deserialize_options<O: PluginOptions>(
    plugin: &str,
    raw: &Value,
    mode: ValidationMode,
) -> Result<O, OptionsError> {
    // A backend selected without options behaves as if configured with `{}`.
    let raw = match raw {
        Value::Null => Value::Object(JsonMap::new()),
        other => other.clone(),
    };
    let options: O = serde_json::from_value(raw).map_err(|source| OptionsError::Schema {
        plugin: plugin.to_string(),
        source,
    })?;

    if mode == ValidationMode::Strict {
        options
            .validate_business_rules()
            .map_err(|reason| OptionsError::BusinessRule {
                plugin: plugin.to_string(),
                reason,
            })?;
    }

    Ok(options)
}

/// Outcome of a plugin's pre-registration step.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PreRegistrationResult {
    /// Becomes the submission's public reference when present.
    pub reference: Option<String>,
    /// Merged (shallow) into the ledger when present.
    pub data: Option<JsonMap>,
}

impl PreRegistrationResult {
    pub fn with_reference(reference: impl Into<String>) -> Self {
        Self {
            reference: Some(reference.into()),
            data: None,
        }
    }

    pub fn with_data(mut self, data: JsonMap) -> Self {
        self.data = Some(data);
        self
    }
}

#[async_trait]
pub trait RegistrationPlugin: Send + Sync + 'static {
    type Options: PluginOptions;

    /// Unique, non-empty identifier in the plugin registry.
    fn identifier(&self) -> &'static str;

    /// Human readable name for operator tooling.
    fn verbose_name(&self) -> &str {
        self.identifier()
    }

    /// Reserve or create the parent resource and optionally hand out the
    /// public reference. Must be idempotent.
    async fn pre_register_submission(
        &self,
        _ctx: &mut SubmissionContext,
        _options: &Self::Options,
    ) -> Result<PreRegistrationResult, PluginError> {
        Ok(PreRegistrationResult::default())
    }

    /// Perform the remaining side effects. The returned mapping becomes the
    /// public registration result.
    async fn register_submission(
        &self,
        ctx: &mut SubmissionContext,
        options: &Self::Options,
    ) -> Result<Option<JsonMap>, PluginError>;

    /// Report a payment completed after registration. May be called more than
    /// once for the same submission.
    async fn update_payment_status(
        &self,
        ctx: &mut SubmissionContext,
        options: &Self::Options,
    ) -> Result<(), PluginError>;

    /// Check whether the backend can currently operate.
    async fn check_config(&self) -> Result<(), PluginError> {
        Ok(())
    }

    /// Caseworker-facing reference from a successful result.
    fn get_reference_from_result(&self, _result: &Ledger) -> Result<String, NoSubmissionReference> {
        Err(NoSubmissionReference)
    }

    /// Verify that the submitter owns the object behind
    /// `initial_data_reference`. Denial should be reported as
    /// [`PluginError::PermissionDenied`].
    async fn verify_initial_data_ownership(
        &self,
        _ctx: &SubmissionContext,
        _options: &Self::Options,
    ) -> Result<(), PluginError> {
        Ok(())
    }

    /// Result schema: shape the raw callback result before it is stored.
    fn serialize_result(&self, raw: JsonMap) -> Result<JsonMap, PluginError> {
        Ok(raw)
    }
}
