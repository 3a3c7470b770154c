//! # Idempotency Ledger
//!
//! The `registration_result` document attached to every submission.
//!
//! ## Layout
//!
//! ```text
//! {
//!   "intermediate": {                  <- private scratch area, written per side effect
//!     "zaak": {...},
//!     "documents": {"<file-id>": {"document": {...}}},
//!     "temporary_internal_reference": "OF-ABC123"
//!   },
//!   "traceback": "...",                <- last recorded failure, cleared on success
//!   "<plugin result keys>": ...        <- public result, replaced on success
//! }
//! ```
//!
//! Paths are `.`-delimited and must be stable across retries of the same logical
//! step. Loop items are keyed by a durable identifier (an attachment id), never by
//! their position in the loop.

pub mod guard;

pub use guard::{execute_unless_exists, SubmissionContext};

use crate::constants::ledger_keys;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

/// JSON object type used for plugin results and ledger regions.
pub type JsonMap = Map<String, Value>;

#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("Invalid ledger path '{path}': {reason}")]
    InvalidPath { path: String, reason: &'static str },

    #[error("Ledger path '{path}' crosses non-object value at segment '{segment}'")]
    PathConflict { path: String, segment: String },

    #[error("Stored value at '{path}' could not be decoded: {source}")]
    Decode {
        path: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("Value for '{path}' could not be encoded: {source}")]
    Encode {
        path: String,
        #[source]
        source: serde_json::Error,
    },
}

/// Python-style truthiness of a JSON value.
///
/// `null`, `false`, `0`, `""`, `[]` and `{}` are falsy. The guard treats a falsy
/// stored value as "not done yet".
pub fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().map(|f| f != 0.0).unwrap_or(true),
        Value::String(s) => !s.is_empty(),
        Value::Array(a) => !a.is_empty(),
        Value::Object(o) => !o.is_empty(),
    }
}

/// The registration result document of a single submission.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Ledger(JsonMap);

impl Ledger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_map(map: JsonMap) -> Self {
        Self(map)
    }

    /// Build a ledger from an arbitrary JSON value; non-objects (including the
    /// `null` written by older rows) yield an empty ledger.
    pub fn from_value(value: Value) -> Self {
        match value {
            Value::Object(map) => Self(map),
            _ => Self::default(),
        }
    }

    pub fn as_map(&self) -> &JsonMap {
        &self.0
    }

    pub fn to_value(&self) -> Value {
        Value::Object(self.0.clone())
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Look up a `.`-delimited path.
    pub fn get(&self, path: &str) -> Option<&Value> {
        let mut segments = path.split('.');
        let first = segments.next()?;
        let mut current = self.0.get(first)?;
        for segment in segments {
            current = current.as_object()?.get(segment)?;
        }
        Some(current)
    }

    /// Whether `path` holds a truthy value.
    pub fn contains_truthy(&self, path: &str) -> bool {
        self.get(path).map(is_truthy).unwrap_or(false)
    }

    /// Assign `value` at `path`, creating missing intermediate objects.
    pub fn assign(&mut self, path: &str, value: Value) -> Result<(), LedgerError> {
        let segments = split_path(path)?;
        let (last, parents) = segments
            .split_last()
            .ok_or_else(|| LedgerError::InvalidPath {
                path: path.to_string(),
                reason: "path is empty",
            })?;

        let mut current = &mut self.0;
        for segment in parents {
            let entry = current
                .entry((*segment).to_string())
                .or_insert_with(|| Value::Object(JsonMap::new()));
            current = match entry {
                Value::Object(map) => map,
                _ => {
                    return Err(LedgerError::PathConflict {
                        path: path.to_string(),
                        segment: (*segment).to_string(),
                    })
                }
            };
        }
        current.insert((*last).to_string(), value);
        Ok(())
    }

    /// Remove a top-level key.
    pub fn remove(&mut self, key: &str) -> Option<Value> {
        self.0.remove(key)
    }

    pub fn traceback(&self) -> Option<&str> {
        self.0.get(ledger_keys::TRACEBACK).and_then(Value::as_str)
    }

    pub fn set_traceback(&mut self, traceback: impl Into<String>) {
        self.0.insert(
            ledger_keys::TRACEBACK.to_string(),
            Value::String(traceback.into()),
        );
    }

    pub fn clear_traceback(&mut self) {
        self.0.remove(ledger_keys::TRACEBACK);
    }

    /// The `intermediate` region, if any side effect has been recorded.
    pub fn intermediate(&self) -> Option<&JsonMap> {
        self.0
            .get(ledger_keys::INTERMEDIATE)
            .and_then(Value::as_object)
    }

    /// Shallow merge: every key of `data` overwrites the same top-level key.
    pub fn merge(&mut self, data: JsonMap) {
        for (key, value) in data {
            self.0.insert(key, value);
        }
    }

    /// Replace the public (top-level) shape with `result`.
    ///
    /// The intermediate region survives so the record of performed side effects
    /// stays with the frozen result; any `traceback` is dropped.
    pub fn finalize(&mut self, mut result: JsonMap) {
        result.remove(ledger_keys::TRACEBACK);
        if let Some(intermediate) = self.0.remove(ledger_keys::INTERMEDIATE) {
            result
                .entry(ledger_keys::INTERMEDIATE.to_string())
                .or_insert(intermediate);
        }
        self.0 = result;
    }
}

fn split_path(path: &str) -> Result<Vec<&str>, LedgerError> {
    if path.is_empty() {
        return Err(LedgerError::InvalidPath {
            path: path.to_string(),
            reason: "path is empty",
        });
    }
    let segments: Vec<&str> = path.split('.').collect();
    if segments.iter().any(|segment| segment.is_empty()) {
        return Err(LedgerError::InvalidPath {
            path: path.to_string(),
            reason: "path contains an empty segment",
        });
    }
    Ok(segments)
}
