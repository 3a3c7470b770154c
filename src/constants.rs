//! Shared constants: ledger key layout, plugin identifier bounds and defaults.

/// Ledger layout. Paths are `.`-delimited; everything under [`INTERMEDIATE`]
/// is private scratch space for in-flight side effects.
pub mod ledger_keys {
    /// Root of the intermediate (per side-effect) region.
    pub const INTERMEDIATE: &str = "intermediate";

    /// Top-level key holding the rendered failure of the last attempt.
    pub const TRACEBACK: &str = "traceback";

    /// Snapshot of the public reference taken when pre-registration is retried.
    pub const TEMPORARY_INTERNAL_REFERENCE: &str = "intermediate.temporary_internal_reference";
}

/// Plugin directory constraints, checked when a plugin is registered.
pub mod plugins {
    /// Maximum length of a plugin identifier.
    pub const MAX_IDENTIFIER_LENGTH: usize = 50;
}

/// Default values used when the configuration does not provide them.
pub mod defaults {
    pub const REGISTRATION_ATTEMPT_LIMIT: u32 = 5;
    pub const RETRY_WINDOW_HOURS: u64 = 48;
    pub const WORKER_CONCURRENCY: usize = 4;
    pub const CLAIM_TIMEOUT_SECONDS: u64 = 300;

    pub const BACKOFF_BASE_DELAY_MS: u64 = 1_000;
    pub const BACKOFF_MAX_DELAY_MS: u64 = 60_000;
    pub const BACKOFF_MULTIPLIER: f64 = 2.0;
    pub const BACKOFF_MAX_DELIVERIES: u32 = 5;

    pub const REFERENCE_PREFIX: &str = "OF";
    pub const REFERENCE_LENGTH: usize = 6;
    pub const REFERENCE_MAX_COLLISION_RETRIES: u32 = 10;
}

/// Alphabet for generated references. Omits characters that are easily
/// confused when read back over the phone (0/O, 1/I/L).
pub const REFERENCE_ALPHABET: &[u8] = b"ABCDEFGHJKMNPQRSTUVWXYZ23456789";
