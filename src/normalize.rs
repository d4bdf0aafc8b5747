//! Extracts the user-facing reply from the upstream's JSON.
//!
//! The upstream overloads its `error` field: a `success: false` payload
//! often carries the real answer in `error`, while `success: true` with an
//! `error` string is a genuine failure. The rules below are tried in a
//! fixed order and the first match wins. Do not reorder them.
//!
//! 1. `success == false` and string `error` → [`Outcome::Text`]
//! 2. string `response` → [`Outcome::Text`]
//! 3. string `output` → [`Outcome::Text`]
//! 4. `success == true` and string `error` → [`Outcome::UpstreamError`]
//! 5. first string field longer than [`FALLBACK_MIN_CHARS`], in received
//!    order → [`Outcome::Text`]
//! 6. anything else → [`Outcome::Unrecognized`]
//!
//! Rule 5 is a best-effort guess, not a guarantee. It relies on
//! `serde_json`'s `preserve_order` feature for field order.

use serde_json::{Map, Value};

/// A string must be strictly longer than this (in chars) to be picked up
/// by the fallback scan.
pub const FALLBACK_MIN_CHARS: usize = 20;

/// What an upstream payload means.
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    Text(String),
    UpstreamError(String),
    Unrecognized(Value),
}

pub fn normalize(raw: &Value) -> Outcome {
    let Some(obj) = raw.as_object() else {
        return Outcome::Unrecognized(raw.clone());
    };

    let success = obj.get("success").and_then(Value::as_bool);
    let error = str_field(obj, "error");

    if let (Some(false), Some(text)) = (success, error) {
        return Outcome::Text(text.to_string());
    }
    if let Some(text) = str_field(obj, "response") {
        return Outcome::Text(text.to_string());
    }
    if let Some(text) = str_field(obj, "output") {
        return Outcome::Text(text.to_string());
    }
    if let (Some(true), Some(msg)) = (success, error) {
        return Outcome::UpstreamError(msg.to_string());
    }

    obj.values()
        .filter_map(Value::as_str)
        .find(|s| s.chars().count() > FALLBACK_MIN_CHARS)
        .map(|s| Outcome::Text(s.to_string()))
        .unwrap_or_else(|| Outcome::Unrecognized(raw.clone()))
}

fn str_field<'a>(obj: &'a Map<String, Value>, key: &str) -> Option<&'a str> {
    obj.get(key).and_then(Value::as_str)
}
