//! Field codec: native database values to and from portable scalars.
//!
//! Every field (and every nested field) is matched against [`HANDLER_CHAIN`]
//! in order and the first matching handler wins. Specific types come first;
//! [`FieldHandler::Nested`] matches any array or object and must stay last,
//! otherwise it would shadow the structured encodings before it.
//!
//! Decoding runs once per document on export, turning native values into
//! envelope strings that survive a spreadsheet cell. Encoding runs once per
//! document on import and turns those strings back into native values.

pub mod envelope;

use crate::models::{Document, FieldValue, GeoPoint, path};
use crate::{Error, Result};
use chrono::{DateTime, SecondsFormat, Timelike, Utc};
use envelope::{ParsedNumber, double_payload, has_tag, number_from_payload, parse_numeric};
use serde_json::{Map, Value, json};

/// A portable document: field name to JSON value.
pub type PortableDocument = Map<String, Value>;

/// A field type handler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FieldHandler {
    /// Geographic point.
    GeoPoint,
    /// Boolean, kept apart from numbers.
    Boolean,
    /// Timestamp.
    Timestamp,
    /// Integer or double. Also accepts bare numeric strings on encode.
    Number,
    /// Document reference.
    Reference,
    /// Explicit null.
    Null,
    /// Arrays and plain objects, recursed field by field.
    Nested,
}

/// Handlers in priority order. First match wins.
pub const HANDLER_CHAIN: [FieldHandler; 7] = [
    FieldHandler::GeoPoint,
    FieldHandler::Boolean,
    FieldHandler::Timestamp,
    FieldHandler::Number,
    FieldHandler::Reference,
    FieldHandler::Null,
    FieldHandler::Nested,
];

impl FieldHandler {
    /// Position of the handler in [`HANDLER_CHAIN`].
    #[must_use]
    pub const fn priority(self) -> usize {
        match self {
            Self::GeoPoint => 0,
            Self::Boolean => 1,
            Self::Timestamp => 2,
            Self::Number => 3,
            Self::Reference => 4,
            Self::Null => 5,
            Self::Nested => 6,
        }
    }

    /// The envelope type tag. `Nested` values are never wrapped.
    #[must_use]
    pub const fn prefix(self) -> Option<&'static str> {
        match self {
            Self::GeoPoint => Some("geopoint"),
            Self::Boolean => Some("bool"),
            Self::Timestamp => Some("timestamp"),
            Self::Number => Some("number"),
            Self::Reference => Some("ref"),
            Self::Null => Some("null"),
            Self::Nested => None,
        }
    }

    /// Returns whether this handler decodes the native value.
    #[must_use]
    pub const fn is_decode_type(self, value: &FieldValue) -> bool {
        match self {
            Self::GeoPoint => matches!(value, FieldValue::GeoPoint(_)),
            Self::Boolean => matches!(value, FieldValue::Boolean(_)),
            Self::Timestamp => matches!(value, FieldValue::Timestamp(_)),
            Self::Number => matches!(value, FieldValue::Integer(_) | FieldValue::Double(_)),
            Self::Reference => matches!(value, FieldValue::Reference(_)),
            Self::Null => matches!(value, FieldValue::Null),
            Self::Nested => matches!(value, FieldValue::Array(_) | FieldValue::Map(_)),
        }
    }

    /// Decodes a native value into its portable form.
    #[must_use]
    pub fn decode(self, key: &str, value: &FieldValue) -> Value {
        let tagged = |data: Option<Value>| {
            Value::String(envelope::wrap(
                self.prefix().unwrap_or_default(),
                data.as_ref(),
            ))
        };
        match (self, value) {
            (Self::GeoPoint, FieldValue::GeoPoint(p)) => tagged(Some(json!({
                "_latitude": p.latitude,
                "_longitude": p.longitude,
            }))),
            (Self::Boolean, FieldValue::Boolean(b)) => tagged(Some(Value::Bool(*b))),
            (Self::Timestamp, FieldValue::Timestamp(t)) => {
                tagged(Some(Value::String(format_timestamp(t))))
            },
            (Self::Number, FieldValue::Integer(i)) => tagged(Some(Value::from(*i))),
            (Self::Number, FieldValue::Double(d)) => tagged(Some(double_payload(*d))),
            (Self::Reference, FieldValue::Reference(p)) => tagged(Some(Value::String(p.clone()))),
            (Self::Null, FieldValue::Null) => tagged(None),
            (Self::Nested, FieldValue::Array(items)) => Value::Array(
                items
                    .iter()
                    .enumerate()
                    .map(|(i, item)| decode_value(&format!("{key}.{i}"), item))
                    .collect(),
            ),
            (Self::Nested, FieldValue::Map(fields)) => Value::Object(decode_document(fields)),
            // Not this handler's type: route through the chain instead.
            (_, other) => decode_value(key, other),
        }
    }

    /// Returns whether this handler encodes the portable value.
    #[must_use]
    pub fn is_encode_type(self, value: &Value) -> bool {
        match self {
            Self::Nested => value.is_array() || value.is_object(),
            Self::Number => {
                value.is_number()
                    || value.as_str().is_some_and(|s| parse_numeric(s).is_some())
                    || has_tag(value, "number")
            },
            Self::Boolean => value.is_boolean() || has_tag(value, "bool"),
            Self::Null => value.is_null() || has_tag(value, "null"),
            Self::GeoPoint | Self::Timestamp | Self::Reference => {
                self.prefix().is_some_and(|prefix| has_tag(value, prefix))
            },
        }
    }

    /// Encodes a portable value back into a native value.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidInput`] when an envelope is malformed or its
    /// payload has the wrong shape.
    pub fn encode(self, key: &str, value: &Value) -> Result<FieldValue> {
        match self {
            Self::Nested => encode_nested(key, value),
            Self::Null => Ok(FieldValue::Null),
            Self::Boolean => match value {
                Value::Bool(b) => Ok(FieldValue::Boolean(*b)),
                _ => match self.payload(key, value)? {
                    Value::Bool(b) => Ok(FieldValue::Boolean(b)),
                    Value::String(s) if s == "true" || s == "false" => {
                        Ok(FieldValue::Boolean(s == "true"))
                    },
                    other => Err(payload_error(key, "bool", &other)),
                },
            },
            Self::Number => {
                let parsed = match value {
                    Value::Number(_) => number_from_payload(value),
                    Value::String(s) => match parse_numeric(s) {
                        Some(n) => Some(n),
                        None => number_from_payload(&self.payload(key, value)?),
                    },
                    _ => None,
                };
                parsed
                    .map(|n| match n {
                        ParsedNumber::Integer(i) => FieldValue::Integer(i),
                        ParsedNumber::Double(d) => FieldValue::Double(d),
                    })
                    .ok_or_else(|| payload_error(key, "number", value))
            },
            Self::Timestamp => {
                let data = self.payload(key, value)?;
                parse_timestamp(&data)
                    .map(FieldValue::Timestamp)
                    .ok_or_else(|| payload_error(key, "timestamp", &data))
            },
            Self::Reference => {
                let data = self.payload(key, value)?;
                let target = data
                    .as_str()
                    .map(path::normalize)
                    .filter(|p| path::is_document_path(p))
                    .ok_or_else(|| payload_error(key, "ref", &data))?;
                Ok(FieldValue::Reference(target))
            },
            Self::GeoPoint => {
                let data = self.payload(key, value)?;
                let coordinate = |names: &[&str]| {
                    names
                        .iter()
                        .find_map(|name| data.get(*name).and_then(Value::as_f64))
                };
                match (
                    coordinate(&["_latitude", "latitude", "lat"]),
                    coordinate(&["_longitude", "longitude", "lon"]),
                ) {
                    (Some(lat), Some(lon)) => Ok(FieldValue::GeoPoint(GeoPoint::new(lat, lon))),
                    _ => Err(payload_error(key, "geopoint", &data)),
                }
            },
        }
    }

    /// Extracts the envelope payload of a tagged string.
    fn payload(self, key: &str, value: &Value) -> Result<Value> {
        let prefix = self.prefix().unwrap_or_default();
        let raw = value
            .as_str()
            .ok_or_else(|| payload_error(key, prefix, value))?;
        envelope::unwrap(key, raw, prefix)
    }
}

/// Finds the first handler that decodes the value.
#[must_use]
pub fn decode_handler(value: &FieldValue) -> Option<FieldHandler> {
    HANDLER_CHAIN
        .into_iter()
        .find(|handler| handler.is_decode_type(value))
}

/// Finds the first handler that encodes the value.
#[must_use]
pub fn encode_handler(value: &Value) -> Option<FieldHandler> {
    HANDLER_CHAIN
        .into_iter()
        .find(|handler| handler.is_encode_type(value))
}

/// Decodes one native value. Strings pass through unchanged.
#[must_use]
pub fn decode_value(key: &str, value: &FieldValue) -> Value {
    match (decode_handler(value), value) {
        (Some(handler), _) => handler.decode(key, value),
        (None, FieldValue::String(s)) => Value::String(s.clone()),
        // Every non-string variant has a handler.
        (None, _) => Value::Null,
    }
}

/// Decodes a native document into a portable one.
#[must_use]
pub fn decode_document(document: &Document) -> PortableDocument {
    document
        .iter()
        .map(|(key, value)| (key.clone(), decode_value(key, value)))
        .collect()
}

/// Encodes one portable value. Unmatched strings stay strings.
///
/// # Errors
///
/// Returns [`Error::InvalidInput`] when a tagged value cannot be decoded.
pub fn encode_value(key: &str, value: &Value) -> Result<FieldValue> {
    match encode_handler(value) {
        Some(handler) => handler.encode(key, value),
        None => Ok(FieldValue::String(value.as_str().unwrap_or_default().to_string())),
    }
}

/// Encodes a portable document into a native one.
///
/// # Errors
///
/// Returns [`Error::InvalidInput`] when any field fails to encode.
pub fn encode_document(document: &PortableDocument) -> Result<Document> {
    document
        .iter()
        .map(|(key, value)| Ok((key.clone(), encode_value(key, value)?)))
        .collect()
}

fn encode_nested(key: &str, value: &Value) -> Result<FieldValue> {
    match value {
        Value::Array(items) => items
            .iter()
            .enumerate()
            .map(|(i, item)| encode_value(&format!("{key}.{i}"), item))
            .collect::<Result<Vec<_>>>()
            .map(FieldValue::Array),
        Value::Object(fields) => fields
            .iter()
            .map(|(name, item)| Ok((name.clone(), encode_value(&format!("{key}.{name}"), item)?)))
            .collect::<Result<Document>>()
            .map(FieldValue::Map),
        other => Err(payload_error(key, "nested", other)),
    }
}

/// Formats a timestamp as RFC 3339 UTC, with millisecond precision unless
/// finer digits are present.
#[must_use]
pub fn format_timestamp(t: &DateTime<Utc>) -> String {
    if t.nanosecond() % 1_000_000 == 0 {
        t.to_rfc3339_opts(SecondsFormat::Millis, true)
    } else {
        t.to_rfc3339_opts(SecondsFormat::AutoSi, true)
    }
}

/// Parses an RFC 3339 string or epoch milliseconds.
#[must_use]
pub fn parse_timestamp(data: &Value) -> Option<DateTime<Utc>> {
    match data {
        Value::String(s) => DateTime::parse_from_rfc3339(s)
            .map(|t| t.with_timezone(&Utc))
            .ok()
            .or_else(|| s.trim().parse::<i64>().ok().and_then(DateTime::from_timestamp_millis)),
        Value::Number(n) => n.as_i64().and_then(DateTime::from_timestamp_millis),
        _ => None,
    }
}

fn payload_error(key: &str, kind: &str, value: &Value) -> Error {
    Error::InvalidInput(format!("field '{key}': invalid {kind} value: {value}"))
}
