//! Native field values as stored in the database.

use chrono::{DateTime, Utc};
use std::collections::BTreeMap;

/// A document body: field name to value.
pub type Document = BTreeMap<String, FieldValue>;

/// A geographic point.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GeoPoint {
    /// Latitude in degrees.
    pub latitude: f64,
    /// Longitude in degrees.
    pub longitude: f64,
}

impl GeoPoint {
    /// Creates a new geographic point.
    #[must_use]
    pub const fn new(latitude: f64, longitude: f64) -> Self {
        Self {
            latitude,
            longitude,
        }
    }
}

/// A native database field value.
///
/// Special scalar types (geopoint, timestamp, reference, null) have no
/// direct spreadsheet representation and go through the field codec.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    /// Explicit null.
    Null,
    /// Boolean.
    Boolean(bool),
    /// 64-bit signed integer.
    Integer(i64),
    /// Double precision float.
    Double(f64),
    /// Point in time, UTC.
    Timestamp(DateTime<Utc>),
    /// UTF-8 string.
    String(String),
    /// Reference to another document, by normalized document path.
    Reference(String),
    /// Geographic point.
    GeoPoint(GeoPoint),
    /// Ordered list of values.
    Array(Vec<FieldValue>),
    /// Nested map.
    Map(Document),
}

impl FieldValue {
    /// Returns the type name used in log and error messages.
    #[must_use]
    pub const fn type_name(&self) -> &'static str {
        match self {
            Self::Null => "null",
            Self::Boolean(_) => "boolean",
            Self::Integer(_) => "integer",
            Self::Double(_) => "double",
            Self::Timestamp(_) => "timestamp",
            Self::String(_) => "string",
            Self::Reference(_) => "reference",
            Self::GeoPoint(_) => "geopoint",
            Self::Array(_) => "array",
            Self::Map(_) => "map",
        }
    }

    /// Returns the nested map, if this is a map value.
    #[must_use]
    pub const fn as_map(&self) -> Option<&Document> {
        match self {
            Self::Map(map) => Some(map),
            _ => None,
        }
    }
}

impl From<&str> for FieldValue {
    fn from(s: &str) -> Self {
        Self::String(s.to_string())
    }
}

impl From<String> for FieldValue {
    fn from(s: String) -> Self {
        Self::String(s)
    }
}

impl From<bool> for FieldValue {
    fn from(b: bool) -> Self {
        Self::Boolean(b)
    }
}

impl From<i64> for FieldValue {
    fn from(i: i64) -> Self {
        Self::Integer(i)
    }
}

impl From<f64> for FieldValue {
    fn from(d: f64) -> Self {
        Self::Double(d)
    }
}

impl From<GeoPoint> for FieldValue {
    fn from(p: GeoPoint) -> Self {
        Self::GeoPoint(p)
    }
}

impl From<DateTime<Utc>> for FieldValue {
    fn from(t: DateTime<Utc>) -> Self {
        Self::Timestamp(t)
    }
}

/// Deep-merges `incoming` into `existing`.
///
/// Nested maps present on both sides merge recursively; every other value in
/// `incoming` replaces the existing one.
pub fn merge_documents(existing: &mut Document, incoming: Document) {
    for (key, value) in incoming {
        match (existing.get_mut(&key), value) {
            (Some(FieldValue::Map(current)), FieldValue::Map(nested)) => {
                merge_documents(current, nested);
            },
            (_, value) => {
                existing.insert(key, value);
            },
        }
    }
}
