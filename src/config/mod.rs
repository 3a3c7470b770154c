//! # Registration Configuration
//!
//! Runtime policy for the orchestrator: attempt limits, payment gating, retry
//! backoff, worker pool sizing and the default reference format.
//!
//! Every field has a serde default, so an empty configuration file (or no
//! file at all) yields [`RegistrationConfig::default`]. See [`ConfigManager`]
//! for source precedence.
//!
//! ```toml
//! registration_attempt_limit = 5
//! wait_for_payment_to_register = false
//! retry_window_hours = 48
//! claim_timeout_seconds = 300
//!
//! [backoff]
//! base_delay_ms = 1000
//! max_delay_ms = 60000
//! multiplier = 2.0
//! max_deliveries = 5
//!
//! [worker]
//! concurrency = 4
//!
//! [reference]
//! prefix = "OF"
//! length = 6
//! max_collision_retries = 10
//! ```

pub mod error;
pub mod loader;

pub use error::{ConfigResult, ConfigurationError};
pub use loader::ConfigManager;

use crate::constants::defaults;
use serde::{Deserialize, Serialize};
use std::time::Duration;

const REFERENCE_LENGTH_RANGE: std::ops::RangeInclusive<usize> = 4..=32;

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct RegistrationConfig {
    /// Attempts after which a failed submission is no longer retried
    pub registration_attempt_limit: u32,
    /// Defer registration of payment-required submissions until paid
    pub wait_for_payment_to_register: bool,
    /// How far back the resend sweep looks for failed submissions
    pub retry_window_hours: u64,
    /// Age after which an execution claim counts as abandoned
    pub claim_timeout_seconds: u64,
    pub backoff: BackoffConfig,
    pub worker: WorkerConfig,
    pub reference: ReferenceConfig,
}

impl Default for RegistrationConfig {
    fn default() -> Self {
        Self {
            registration_attempt_limit: defaults::REGISTRATION_ATTEMPT_LIMIT,
            wait_for_payment_to_register: false,
            retry_window_hours: defaults::RETRY_WINDOW_HOURS,
            claim_timeout_seconds: defaults::CLAIM_TIMEOUT_SECONDS,
            backoff: BackoffConfig::default(),
            worker: WorkerConfig::default(),
            reference: ReferenceConfig::default(),
        }
    }
}

/// Redelivery backoff for failed registration jobs
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct BackoffConfig {
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
    pub multiplier: f64,
    /// Total deliveries of one job, the first included
    pub max_deliveries: u32,
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            base_delay_ms: defaults::BACKOFF_BASE_DELAY_MS,
            max_delay_ms: defaults::BACKOFF_MAX_DELAY_MS,
            multiplier: defaults::BACKOFF_MULTIPLIER,
            max_deliveries: defaults::BACKOFF_MAX_DELIVERIES,
        }
    }
}

impl BackoffConfig {
    /// Delay before redelivery number `delivery` (1 for the first retry).
    pub fn delay_for(&self, delivery: u32) -> Duration {
        let exponent = delivery.saturating_sub(1).min(32) as i32;
        let delay = self.base_delay_ms as f64 * self.multiplier.powi(exponent);
        let capped = delay.min(self.max_delay_ms as f64);
        Duration::from_millis(capped as u64)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct WorkerConfig {
    pub concurrency: usize,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            concurrency: defaults::WORKER_CONCURRENCY,
        }
    }
}

/// Format of generated public references: `<prefix>-<length chars>`
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct ReferenceConfig {
    pub prefix: String,
    pub length: usize,
    pub max_collision_retries: u32,
}

impl Default for ReferenceConfig {
    fn default() -> Self {
        Self {
            prefix: defaults::REFERENCE_PREFIX.to_string(),
            length: defaults::REFERENCE_LENGTH,
            max_collision_retries: defaults::REFERENCE_MAX_COLLISION_RETRIES,
        }
    }
}

impl RegistrationConfig {
    pub fn retry_window(&self) -> chrono::Duration {
        // Capped at a century so the conversion cannot overflow
        chrono::Duration::hours(self.retry_window_hours.min(876_000) as i64)
    }

    pub fn claim_timeout(&self) -> Duration {
        Duration::from_secs(self.claim_timeout_seconds)
    }

    pub fn validate(&self) -> Result<(), ConfigurationError> {
        if self.registration_attempt_limit == 0 {
            return Err(ConfigurationError::invalid_value(
                "registration_attempt_limit",
                "0",
                "attempt limit must be greater than 0",
            ));
        }

        if self.retry_window_hours == 0 {
            return Err(ConfigurationError::invalid_value(
                "retry_window_hours",
                "0",
                "retry window must be greater than 0",
            ));
        }

        if self.claim_timeout_seconds == 0 {
            return Err(ConfigurationError::invalid_value(
                "claim_timeout_seconds",
                "0",
                "claim timeout must be greater than 0",
            ));
        }

        // Backoff configuration validation
        if self.backoff.max_deliveries == 0 {
            return Err(ConfigurationError::invalid_value(
                "backoff.max_deliveries",
                "0",
                "a job must be delivered at least once",
            ));
        }

        if self.backoff.multiplier.is_nan() || self.backoff.multiplier < 1.0 {
            return Err(ConfigurationError::invalid_value(
                "backoff.multiplier",
                self.backoff.multiplier.to_string(),
                "multiplier must be at least 1.0",
            ));
        }

        if self.backoff.base_delay_ms > self.backoff.max_delay_ms {
            return Err(ConfigurationError::invalid_value(
                "backoff.base_delay_ms",
                self.backoff.base_delay_ms.to_string(),
                "base delay must not exceed backoff.max_delay_ms",
            ));
        }

        if self.worker.concurrency == 0 {
            return Err(ConfigurationError::invalid_value(
                "worker.concurrency",
                "0",
                "concurrency must be greater than 0",
            ));
        }

        // Reference format validation
        if self.reference.prefix.trim().is_empty() {
            return Err(ConfigurationError::missing_required_field(
                "reference.prefix",
                "reference configuration",
            ));
        }

        if !REFERENCE_LENGTH_RANGE.contains(&self.reference.length) {
            return Err(ConfigurationError::invalid_value(
                "reference.length",
                self.reference.length.to_string(),
                format!(
                    "length must be between {} and {}",
                    REFERENCE_LENGTH_RANGE.start(),
                    REFERENCE_LENGTH_RANGE.end()
                ),
            ));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = RegistrationConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.registration_attempt_limit, 5);
        assert!(!config.wait_for_payment_to_register);
        assert_eq!(config.reference.prefix, "OF");
        assert_eq!(config.retry_window(), chrono::Duration::hours(48));
        assert_eq!(config.claim_timeout(), Duration::from_secs(300));
    }

    #[test]
    fn test_validation_rejects_bad_values() {
        let mut config = RegistrationConfig::default();
        config.registration_attempt_limit = 0;
        assert!(config.validate().is_err());

        let mut config = RegistrationConfig::default();
        config.worker.concurrency = 0;
        assert!(config.validate().is_err());

        let mut config = RegistrationConfig::default();
        config.claim_timeout_seconds = 0;
        assert!(config.validate().is_err());

        let mut config = RegistrationConfig::default();
        config.backoff.multiplier = 0.5;
        assert!(config.validate().is_err());

        let mut config = RegistrationConfig::default();
        config.backoff.multiplier = f64::NAN;
        assert!(config.validate().is_err());

        let mut config = RegistrationConfig::default();
        config.reference.prefix = " ".into();
        assert!(matches!(
            config.validate(),
            Err(ConfigurationError::MissingRequiredField { .. })
        ));

        let mut config = RegistrationConfig::default();
        config.reference.length = 3;
        assert!(config.validate().is_err());
        config.reference.length = 33;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_backoff_delays_grow_and_cap() {
        let backoff = BackoffConfig {
            base_delay_ms: 100,
            max_delay_ms: 1000,
            multiplier: 2.0,
            max_deliveries: 10,
        };
        assert_eq!(backoff.delay_for(1), Duration::from_millis(100));
        assert_eq!(backoff.delay_for(2), Duration::from_millis(200));
        assert_eq!(backoff.delay_for(4), Duration::from_millis(800));
        assert_eq!(backoff.delay_for(5), Duration::from_millis(1000));
        assert_eq!(backoff.delay_for(u32::MAX), Duration::from_millis(1000));
    }

    #[test]
    fn test_partial_document_falls_back_to_defaults() {
        let config: RegistrationConfig =
            serde_json::from_str(r#"{"backoff": {"multiplier": 3.0}}"#).unwrap();
        assert_eq!(config.backoff.multiplier, 3.0);
        assert_eq!(config.backoff.base_delay_ms, 1000);
        assert_eq!(config.worker.concurrency, 4);
    }
}
