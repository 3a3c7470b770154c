use proptest::prelude::*;
use serde_json::Value;

/// A single non-empty path segment without dots.
pub fn segment_strategy() -> impl Strategy<Value = String> {
    "[a-z][a-z0-9_-]{0,15}"
}

/// `.`-delimited ledger paths of one to four segments.
pub fn ledger_path_strategy() -> impl Strategy<Value = String> {
    prop::collection::vec(segment_strategy(), 1..=4).prop_map(|segments| segments.join("."))
}

/// Values a side effect would report on success.
pub fn truthy_value_strategy() -> impl Strategy<Value = Value> {
    prop_oneof![
        Just(Value::Bool(true)),
        (1i64..i64::MAX).prop_map(Value::from),
        "[a-zA-Z0-9:/.]{1,40}".prop_map(Value::String),
        "[a-z]{1,10}".prop_map(|url| serde_json::json!({ "url": url })),
    ]
}

pub fn falsy_value_strategy() -> impl Strategy<Value = Value> {
    prop_oneof![
        Just(Value::Null),
        Just(Value::Bool(false)),
        Just(Value::from(0)),
        Just(Value::String(String::new())),
        Just(Value::Array(Vec::new())),
        Just(serde_json::json!({})),
    ]
}
