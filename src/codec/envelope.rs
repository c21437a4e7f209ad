//! The tagged envelope carrying special scalar types through flat files.
//!
//! An envelope is the string `{"type":"<prefix>","data":<payload>}`. The key
//! order is fixed so that a cheap prefix test identifies the type without
//! parsing the whole cell.

use crate::{Error, Result};
use serde::Deserialize;
use serde_json::Value;

#[derive(Debug, Deserialize)]
struct Envelope {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    data: Value,
}

/// Serializes an envelope for the given type prefix and optional payload.
#[must_use]
pub fn wrap(prefix: &str, data: Option<&Value>) -> String {
    match data {
        Some(data) => format!(r#"{{"type":"{prefix}","data":{data}}}"#),
        None => format!(r#"{{"type":"{prefix}"}}"#),
    }
}

/// Returns whether the value is a string carrying the given type tag.
#[must_use]
pub fn has_tag(value: &Value, prefix: &str) -> bool {
    value.as_str().is_some_and(|s| str_has_tag(s, prefix))
}

/// Returns whether the string starts with the given type tag.
#[must_use]
pub fn str_has_tag(s: &str, prefix: &str) -> bool {
    s.strip_prefix(r#"{"type":""#)
        .and_then(|rest| rest.strip_prefix(prefix))
        .is_some_and(|rest| rest.starts_with('"'))
}

/// Parses an envelope and returns its payload.
///
/// # Errors
///
/// Returns [`Error::InvalidInput`] naming the field when the string carries the
/// tag but is not valid envelope JSON, or when the tag does not match.
pub fn unwrap(key: &str, raw: &str, prefix: &str) -> Result<Value> {
    let envelope: Envelope = serde_json::from_str(raw).map_err(|e| {
        Error::InvalidInput(format!("field '{key}': malformed {prefix} value: {e}"))
    })?;
    if envelope.kind != prefix {
        return Err(Error::InvalidInput(format!(
            "field '{key}': expected {prefix} value, found {}",
            envelope.kind
        )));
    }
    Ok(envelope.data)
}

/// Encodes a double as a JSON payload, carrying non-finite values as strings.
#[must_use]
pub fn double_payload(d: f64) -> Value {
    serde_json::Number::from_f64(d).map_or_else(
        || {
            let s = if d.is_nan() {
                "NaN"
            } else if d.is_sign_positive() {
                "Infinity"
            } else {
                "-Infinity"
            };
            Value::String(s.to_string())
        },
        Value::Number,
    )
}

/// A number parsed out of a cell or payload.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ParsedNumber {
    /// Integral value within `i64`.
    Integer(i64),
    /// Any other value.
    Double(f64),
}

/// Parses a bare numeric-looking string: optional sign, digits, optional
/// fraction and exponent. Empty and whitespace-only strings are not numbers.
#[must_use]
pub fn parse_numeric(s: &str) -> Option<ParsedNumber> {
    let s = s.trim();
    if s.is_empty()
        || !s.bytes().any(|b| b.is_ascii_digit())
        || !s
            .bytes()
            .all(|b| b.is_ascii_digit() || matches!(b, b'+' | b'-' | b'.' | b'e' | b'E'))
    {
        return None;
    }
    if let Ok(i) = s.parse::<i64>() {
        return Some(ParsedNumber::Integer(i));
    }
    s.parse::<f64>()
        .ok()
        .filter(|d| d.is_finite())
        .map(ParsedNumber::Double)
}

/// Parses a payload that carries a number: a JSON number, a numeric string,
/// or one of the non-finite markers.
#[must_use]
pub fn number_from_payload(data: &Value) -> Option<ParsedNumber> {
    match data {
        Value::Number(n) => n.as_i64().map_or_else(
            || n.as_f64().map(ParsedNumber::Double),
            |i| Some(ParsedNumber::Integer(i)),
        ),
        Value::String(s) => match s.as_str() {
            "NaN" => Some(ParsedNumber::Double(f64::NAN)),
            "Infinity" => Some(ParsedNumber::Double(f64::INFINITY)),
            "-Infinity" => Some(ParsedNumber::Double(f64::NEG_INFINITY)),
            other => parse_numeric(other),
        },
        _ => None,
    }
}
