//! # Structured Logging Module
//!
//! Environment-aware structured logging for the registration orchestrator.
//! Human-readable output by default; set `REGISTRATION_LOG_FORMAT=json` for
//! one JSON object per event.

use chrono::Utc;
use std::sync::OnceLock;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};
use uuid::Uuid;

static LOGGER_INITIALIZED: OnceLock<()> = OnceLock::new();

/// Initialize structured logging with environment-specific configuration.
///
/// `RUST_LOG` takes precedence over the environment-derived level. Safe to
/// call more than once, and tolerates a subscriber installed by the host.
pub fn init_structured_logging() {
    LOGGER_INITIALIZED.get_or_init(|| {
        let environment = get_environment();
        let log_level = get_log_level(&environment);
        let json = use_json_format();

        let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level));
        let registry = tracing_subscriber::registry().with(filter);

        let result = if json {
            registry
                .with(
                    fmt::layer()
                        .json()
                        .with_target(true)
                        .with_thread_ids(true)
                        .with_current_span(true),
                )
                .try_init()
        } else {
            registry
                .with(
                    fmt::layer()
                        .with_target(true)
                        .with_thread_ids(true)
                        .with_level(true)
                        .with_ansi(true),
                )
                .try_init()
        };

        if result.is_err() {
            tracing::debug!(
                "Global tracing subscriber already initialized - continuing with existing subscriber"
            );
        }

        tracing::info!(
            environment = %environment,
            json = json,
            "🔧 STRUCTURED LOGGING: Initialized"
        );
    });
}

/// Get current environment from environment variables
fn get_environment() -> String {
    std::env::var("REGISTRATION_ENV")
        .or_else(|_| std::env::var("APP_ENV"))
        .unwrap_or_else(|_| "development".to_string())
}

/// Get log level based on environment
fn get_log_level(environment: &str) -> &'static str {
    match environment {
        "production" => "info",
        "test" => "warn",
        _ => "debug",
    }
}

fn use_json_format() -> bool {
    std::env::var("REGISTRATION_LOG_FORMAT")
        .map(|format| format.eq_ignore_ascii_case("json"))
        .unwrap_or(false)
}

/// Log structured data for a registration operation
pub fn log_registration_operation(
    operation: &str,
    submission_id: Option<Uuid>,
    phase: Option<&str>,
    status: &str,
    details: Option<&str>,
) {
    tracing::info!(
        operation = %operation,
        submission_id = submission_id.map(|id| id.to_string()).as_deref(),
        phase = phase,
        status = %status,
        details = details,
        timestamp = %Utc::now().to_rfc3339(),
        "📋 REGISTRATION_OPERATION"
    );
}

/// Log structured data for plugin administration
pub fn log_plugin_operation(plugin: &str, operation: &str, status: &str, details: Option<&str>) {
    tracing::info!(
        plugin = %plugin,
        operation = %operation,
        status = %status,
        details = details,
        timestamp = %Utc::now().to_rfc3339(),
        "📚 PLUGIN_OPERATION"
    );
}

/// Log error with full context
pub fn log_error(component: &str, operation: &str, error: &str, context: Option<&str>) {
    tracing::error!(
        component = %component,
        operation = %operation,
        error = %error,
        context = context,
        timestamp = %Utc::now().to_rfc3339(),
        "❌ ERROR"
    );
}
