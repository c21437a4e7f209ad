//! Firestore REST value JSON.
//!
//! Shared by the Firestore backend (on the wire) and the filesystem backend
//! (on disk), so a directory dump reads like an API response.

use crate::codec::format_timestamp;
use crate::models::{Document, FieldValue, GeoPoint, path};
use crate::{Error, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// Map of field name to wire value.
pub type WireFields = BTreeMap<String, WireValue>;

/// One typed value, externally tagged by its kind.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum WireValue {
    /// `{"nullValue": null}`
    NullValue(()),
    /// `{"booleanValue": true}`
    BooleanValue(bool),
    /// Integers travel as decimal strings.
    IntegerValue(String),
    /// A JSON number, or `"NaN"`, `"Infinity"`, `"-Infinity"`.
    DoubleValue(Value),
    /// RFC 3339 timestamp.
    TimestampValue(String),
    /// `{"stringValue": "..."}`
    StringValue(String),
    /// Base64 bytes.
    BytesValue(String),
    /// Full resource name of the referenced document.
    ReferenceValue(String),
    /// `{"geoPointValue": {"latitude": .., "longitude": ..}}`
    GeoPointValue(WireGeoPoint),
    /// `{"arrayValue": {"values": [..]}}`
    ArrayValue(WireArray),
    /// `{"mapValue": {"fields": {..}}}`
    MapValue(WireMap),
}

/// Geographic point. Zero coordinates are omitted on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct WireGeoPoint {
    /// Latitude.
    #[serde(default)]
    pub latitude: f64,
    /// Longitude.
    #[serde(default)]
    pub longitude: f64,
}

/// Array payload.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct WireArray {
    /// Elements. Omitted when empty.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub values: Vec<WireValue>,
}

/// Map payload.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct WireMap {
    /// Entries. Omitted when empty.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub fields: WireFields,
}

/// Converts a native value to its wire form.
///
/// References are prefixed with `reference_root`, the resource name of the
/// database's document root, when one is given.
#[must_use]
pub fn to_wire(value: &FieldValue, reference_root: &str) -> WireValue {
    match value {
        FieldValue::Null => WireValue::NullValue(()),
        FieldValue::Boolean(b) => WireValue::BooleanValue(*b),
        FieldValue::Integer(i) => WireValue::IntegerValue(i.to_string()),
        FieldValue::Double(d) => WireValue::DoubleValue(crate::codec::envelope::double_payload(*d)),
        FieldValue::Timestamp(t) => WireValue::TimestampValue(format_timestamp(t)),
        FieldValue::String(s) => WireValue::StringValue(s.clone()),
        FieldValue::Reference(p) => WireValue::ReferenceValue(if reference_root.is_empty() {
            p.clone()
        } else {
            format!("{reference_root}/{p}")
        }),
        FieldValue::GeoPoint(p) => WireValue::GeoPointValue(WireGeoPoint {
            latitude: p.latitude,
            longitude: p.longitude,
        }),
        FieldValue::Array(items) => WireValue::ArrayValue(WireArray {
            values: items.iter().map(|v| to_wire(v, reference_root)).collect(),
        }),
        FieldValue::Map(fields) => WireValue::MapValue(WireMap {
            fields: document_to_wire(fields, reference_root),
        }),
    }
}

/// Converts a wire value to its native form.
///
/// # Errors
///
/// Returns [`Error::InvalidInput`] for unparseable integers, doubles or
/// timestamps.
pub fn from_wire(value: WireValue, reference_root: &str) -> Result<FieldValue> {
    Ok(match value {
        WireValue::NullValue(()) => FieldValue::Null,
        WireValue::BooleanValue(b) => FieldValue::Boolean(b),
        WireValue::IntegerValue(s) => FieldValue::Integer(
            s.parse()
                .map_err(|e| Error::InvalidInput(format!("integerValue '{s}': {e}")))?,
        ),
        WireValue::DoubleValue(v) => FieldValue::Double(wire_double(&v)?),
        WireValue::TimestampValue(s) => FieldValue::Timestamp(
            DateTime::parse_from_rfc3339(&s)
                .map(|t| t.with_timezone(&Utc))
                .map_err(|e| Error::InvalidInput(format!("timestampValue '{s}': {e}")))?,
        ),
        WireValue::StringValue(s) | WireValue::BytesValue(s) => FieldValue::String(s),
        WireValue::ReferenceValue(s) => FieldValue::Reference(strip_reference(&s, reference_root)),
        WireValue::GeoPointValue(p) => FieldValue::GeoPoint(GeoPoint::new(p.latitude, p.longitude)),
        WireValue::ArrayValue(a) => FieldValue::Array(
            a.values
                .into_iter()
                .map(|v| from_wire(v, reference_root))
                .collect::<Result<_>>()?,
        ),
        WireValue::MapValue(m) => FieldValue::Map(document_from_wire(m.fields, reference_root)?),
    })
}

/// Converts a native document to wire fields.
#[must_use]
pub fn document_to_wire(document: &Document, reference_root: &str) -> WireFields {
    document
        .iter()
        .map(|(k, v)| (k.clone(), to_wire(v, reference_root)))
        .collect()
}

/// Converts wire fields to a native document.
///
/// # Errors
///
/// Returns an error if any value fails to convert.
pub fn document_from_wire(fields: WireFields, reference_root: &str) -> Result<Document> {
    fields
        .into_iter()
        .map(|(k, v)| Ok((k, from_wire(v, reference_root)?)))
        .collect()
}

fn wire_double(value: &Value) -> Result<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => match s.as_str() {
            "NaN" => Some(f64::NAN),
            "Infinity" => Some(f64::INFINITY),
            "-Infinity" => Some(f64::NEG_INFINITY),
            other => other.parse().ok(),
        },
        _ => None,
    }
    .ok_or_else(|| Error::InvalidInput(format!("doubleValue {value}")))
}

/// Strips the document root from a reference resource name.
fn strip_reference(name: &str, reference_root: &str) -> String {
    let relative = if reference_root.is_empty() {
        name
    } else {
        name.strip_prefix(reference_root)
            .or_else(|| name.split_once("/documents/").map(|(_, rest)| rest))
            .unwrap_or(name)
    };
    path::normalize(relative)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;

    const ROOT: &str = "projects/demo/databases/(default)/documents";

    #[test]
    fn test_wire_json_shape() {
        let wire = to_wire(&FieldValue::Integer(42), ROOT);
        assert_eq!(serde_json::to_value(&wire).unwrap(), json!({"integerValue": "42"}));

        let wire = to_wire(&FieldValue::Null, ROOT);
        assert_eq!(serde_json::to_value(&wire).unwrap(), json!({"nullValue": null}));

        let wire = to_wire(&FieldValue::Reference("users/u1".into()), ROOT);
        assert_eq!(
            serde_json::to_value(&wire).unwrap(),
            json!({"referenceValue": format!("{ROOT}/users/u1")})
        );
    }

    #[test]
    fn test_parse_api_document_fields() {
        let raw = json!({
            "age": {"integerValue": "36"},
            "score": {"doubleValue": 1.5},
            "weird": {"doubleValue": "NaN"},
            "home": {"geoPointValue": {"latitude": 59.9}},
            "born": {"timestampValue": "2020-01-02T03:04:05.678Z"},
            "tags": {"arrayValue": {}},
            "meta": {"mapValue": {"fields": {"ok": {"booleanValue": true}}}},
            "boss": {"referenceValue": format!("{ROOT}/users/u2")},
            "blob": {"bytesValue": "AAE="}
        });
        let fields: WireFields = serde_json::from_value(raw).unwrap();
        let doc = document_from_wire(fields, ROOT).unwrap();

        assert_eq!(doc["age"], FieldValue::Integer(36));
        assert_eq!(doc["score"], FieldValue::Double(1.5));
        assert!(matches!(doc["weird"], FieldValue::Double(d) if d.is_nan()));
        assert_eq!(doc["home"], FieldValue::GeoPoint(GeoPoint::new(59.9, 0.0)));
        assert_eq!(
            doc["born"],
            FieldValue::Timestamp(
                Utc.with_ymd_and_hms(2020, 1, 2, 3, 4, 5).unwrap()
                    + chrono::Duration::milliseconds(678)
            )
        );
        assert_eq!(doc["tags"], FieldValue::Array(vec![]));
        assert_eq!(doc["boss"], FieldValue::Reference("users/u2".into()));
        assert_eq!(doc["blob"], FieldValue::from("AAE="));
    }

    #[test]
    fn test_round_trip_without_reference_root() {
        let mut doc = Document::new();
        doc.insert("r".into(), FieldValue::Reference("a/b".into()));
        doc.insert("d".into(), FieldValue::Double(f64::INFINITY));
        let back = document_from_wire(document_to_wire(&doc, ""), "").unwrap();
        assert_eq!(back, doc);
    }

    #[test]
    fn test_bad_integer_is_error() {
        assert!(from_wire(WireValue::IntegerValue("x".into()), "").is_err());
    }
}
