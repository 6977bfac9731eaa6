//! Loosely-typed command parameters
//!
//! Persisted pipelines store parameter values as whatever the writer had at
//! hand: native booleans, numbers, or text such as `"yes"`, `"1"` or `"On"`.
//! These helpers interpret such values without failing; an unrecognized value
//! is reported as "not found" so the caller can fall back to a default.

use serde_json::{Map, Value};

/// Mapping of parameter name to loosely-typed value
pub type ParameterBag = Map<String, Value>;

const TRUE_WORDS: [&str; 3] = ["yes", "y", "on"];
const FALSE_WORDS: [&str; 3] = ["no", "n", "off"];

/// Interpret `bag[key]` as a boolean.
///
/// Returns `None` when the key is absent, the value is null, or no
/// recognized form matches.
pub fn try_get_bool(bag: &ParameterBag, key: &str) -> Option<bool> {
    match bag.get(key)? {
        Value::Null => None,
        Value::Bool(b) => Some(*b),
        Value::Number(n) => number_truthiness(n),
        Value::String(s) => text_truthiness(s),
        Value::Array(_) | Value::Object(_) => None,
    }
}

/// Like [`try_get_bool`], falling back to `default`.
pub fn get_bool_or_default(bag: &ParameterBag, key: &str, default: bool) -> bool {
    try_get_bool(bag, key).unwrap_or(default)
}

fn number_truthiness(n: &serde_json::Number) -> Option<bool> {
    if let Some(i) = n.as_i64() {
        return Some(i != 0);
    }
    if let Some(u) = n.as_u64() {
        return Some(u != 0);
    }
    n.as_f64().map(float_truthiness)
}

fn float_truthiness(f: f64) -> bool {
    !f.is_nan() && f != 0.0
}

fn text_truthiness(raw: &str) -> Option<bool> {
    let text = raw.trim();
    if text.eq_ignore_ascii_case("true") {
        return Some(true);
    }
    if text.eq_ignore_ascii_case("false") {
        return Some(false);
    }
    if let Ok(i) = text.parse::<i64>() {
        return Some(i != 0);
    }
    let lower = text.to_ascii_lowercase();
    if TRUE_WORDS.contains(&lower.as_str()) {
        return Some(true);
    }
    if FALSE_WORDS.contains(&lower.as_str()) {
        return Some(false);
    }
    // Generic conversion: any numeric text, including decimals.
    match text.parse::<f64>() {
        Ok(f) if !f.is_nan() => Some(f != 0.0),
        _ => None,
    }
}

/// Interpret `bag[key]` as a floating point number (native or numeric text).
pub fn try_get_f64(bag: &ParameterBag, key: &str) -> Option<f64> {
    match bag.get(key)? {
        Value::Number(n) => n.as_f64().filter(|f| f.is_finite()),
        Value::String(s) => s.trim().parse::<f64>().ok().filter(|f| f.is_finite()),
        Value::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
        _ => None,
    }
}

pub fn get_f64_or_default(bag: &ParameterBag, key: &str, default: f64) -> f64 {
    try_get_f64(bag, key).unwrap_or(default)
}

/// Interpret `bag[key]` as a non-negative integer. Fractions are rounded.
pub fn try_get_u32(bag: &ParameterBag, key: &str) -> Option<u32> {
    let value = try_get_f64(bag, key)?;
    if value < 0.0 || value > u32::MAX as f64 {
        return None;
    }
    Some(value.round() as u32)
}

pub fn get_u32_or_default(bag: &ParameterBag, key: &str, default: u32) -> u32 {
    try_get_u32(bag, key).unwrap_or(default)
}

/// Text value of `bag[key]`; numbers and booleans are rendered as text.
pub fn try_get_string(bag: &ParameterBag, key: &str) -> Option<String> {
    match bag.get(key)? {
        Value::String(s) => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

/// Parse a `key=value` pair as given on the command line.
///
/// Values that look like JSON scalars (numbers, `true`, `null`) keep their
/// native type; everything else is stored as text.
pub fn parse_assignment(raw: &str) -> Option<(String, Value)> {
    let (key, value) = raw.split_once('=')?;
    let key = key.trim();
    if key.is_empty() {
        return None;
    }
    let value = value.trim();
    let parsed = match serde_json::from_str::<Value>(value) {
        Ok(v @ (Value::Number(_) | Value::Bool(_) | Value::Null)) => v,
        _ => Value::String(value.to_string()),
    };
    Some((key.to_string(), parsed))
}
