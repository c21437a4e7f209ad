//! Property-based tests.
//!
//! Uses proptest to verify invariants across random inputs:
//! - Every non-root path is exactly one of collection or document
//! - Normalization is idempotent
//! - Decoding then encoding a document restores it
//! - Flattening then unflattening a document restores it

// Property tests use expect/unwrap for simplicity - panics are acceptable in tests
#![allow(clippy::expect_used, clippy::unwrap_used)]

use chrono::DateTime;
use fire_migrate::io::tabular::{flatten, unflatten};
use fire_migrate::models::path;
use fire_migrate::{Document, FieldValue, GeoPoint, decode_document, encode_document};
use proptest::prelude::*;
use serde_json::{Map, Value};

// ============================================================================
// Strategies
// ============================================================================

fn segment() -> impl Strategy<Value = String> {
    "[a-zA-Z0-9_-]{1,10}"
}

fn raw_path() -> impl Strategy<Value = String> {
    prop::collection::vec(("/{0,2}", segment()), 0..8).prop_map(|parts| {
        let mut raw: String = parts.into_iter().map(|(slashes, seg)| format!("{slashes}{seg}/")).collect();
        if raw.len() % 3 == 0 {
            raw.push('/');
        }
        raw
    })
}

fn scalar_field() -> impl Strategy<Value = FieldValue> {
    prop_oneof![
        Just(FieldValue::Null),
        any::<bool>().prop_map(FieldValue::Boolean),
        any::<i64>().prop_map(FieldValue::Integer),
        (-1.0e9..1.0e9f64).prop_map(FieldValue::Double),
        (0_i64..4_000_000_000_000).prop_map(|ms| {
            FieldValue::Timestamp(DateTime::from_timestamp_millis(ms).unwrap())
        }),
        "[a-z ]{0,12}".prop_map(FieldValue::String),
        ("[a-z]{1,8}", "[a-z0-9]{1,8}").prop_map(|(c, d)| FieldValue::Reference(format!("{c}/{d}"))),
        (-90.0..90.0f64, -180.0..180.0f64)
            .prop_map(|(lat, lon)| FieldValue::GeoPoint(GeoPoint::new(lat, lon))),
    ]
}

fn field_value() -> impl Strategy<Value = FieldValue> {
    scalar_field().prop_recursive(3, 24, 4, |inner| {
        prop_oneof![
            prop::collection::vec(inner.clone(), 0..4).prop_map(FieldValue::Array),
            prop::collection::btree_map("[a-z]{1,6}", inner, 0..4).prop_map(FieldValue::Map),
        ]
    })
}

fn document() -> impl Strategy<Value = Document> {
    prop::collection::btree_map("[a-z]{1,8}", field_value(), 0..6)
}

fn portable_value() -> impl Strategy<Value = Value> {
    let leaf = prop_oneof![
        any::<bool>().prop_map(Value::Bool),
        any::<i64>().prop_map(Value::from),
        "[a-z ]{1,10}".prop_map(Value::String),
    ];
    leaf.prop_recursive(3, 24, 4, |inner| {
        prop_oneof![
            prop::collection::vec(inner.clone(), 1..4).prop_map(Value::Array),
            prop::collection::btree_map("[a-z]{1,6}", inner, 1..4)
                .prop_map(|m| Value::Object(m.into_iter().collect())),
        ]
    })
}

// ============================================================================
// Paths
// ============================================================================

proptest! {
    /// Property: a non-root path is a collection or a document, never both.
    #[test]
    fn prop_path_parity_is_exclusive(raw in raw_path()) {
        let p = path::normalize(&raw);
        if path::is_root(&p) {
            prop_assert!(path::is_collection_path(&p));
            prop_assert!(!path::is_document_path(&p));
        } else {
            prop_assert!(path::is_collection_path(&p) ^ path::is_document_path(&p));
        }
    }

    /// Property: normalization is idempotent and strips stray separators.
    #[test]
    fn prop_normalize_idempotent(raw in raw_path()) {
        let once = path::normalize(&raw);
        prop_assert_eq!(path::normalize(&once), once.clone());
        prop_assert!(!once.contains("//"));
        if !path::is_root(&once) {
            prop_assert!(!once.starts_with('/'));
            prop_assert!(!once.ends_with('/'));
        }
    }

    /// Property: joining a segment flips the parity.
    #[test]
    fn prop_join_flips_parity(raw in raw_path(), seg in segment()) {
        let p = path::normalize(&raw);
        let child = path::join(&p, &seg);
        prop_assert_eq!(path::depth(&child), path::depth(&p) + 1);
        if !path::is_root(&p) {
            prop_assert_eq!(path::is_document_path(&child), path::is_collection_path(&p));
        }
    }
}

// ============================================================================
// Codec
// ============================================================================

proptest! {
    /// Property: decoding then encoding a document restores every field.
    #[test]
    fn prop_codec_round_trip(doc in document()) {
        let portable = decode_document(&doc);
        let restored = encode_document(&portable).unwrap();
        prop_assert_eq!(restored, doc);
    }

    /// Property: the portable form survives JSON text.
    #[test]
    fn prop_codec_round_trip_through_text(doc in document()) {
        let text = serde_json::to_string(&decode_document(&doc)).unwrap();
        let parsed: Map<String, Value> = serde_json::from_str(&text).unwrap();
        prop_assert_eq!(encode_document(&parsed).unwrap(), doc);
    }

    /// Property: a boolean is always encoded as a boolean.
    #[test]
    fn prop_boolean_never_nested(b in any::<bool>()) {
        let mut portable = Map::new();
        portable.insert("flag".to_string(), Value::Bool(b));
        let doc = encode_document(&portable).unwrap();
        prop_assert_eq!(doc.get("flag"), Some(&FieldValue::Boolean(b)));
    }
}

// ============================================================================
// Tabular
// ============================================================================

proptest! {
    /// Property: flattening then unflattening restores a document whose
    /// containers are non-empty.
    #[test]
    fn prop_flatten_round_trip(fields in prop::collection::btree_map("[a-z]{1,6}", portable_value(), 0..6)) {
        let document: Map<String, Value> = fields.into_iter().collect();
        let cells = flatten(&document);
        let restored = unflatten(cells.iter().map(|(k, v)| (k.as_str(), v.clone())));
        prop_assert_eq!(restored, document);
    }

    /// Property: every flattened cell is a scalar.
    #[test]
    fn prop_flatten_yields_scalars(value in portable_value()) {
        let mut document = Map::new();
        document.insert("root".to_string(), value);
        for (column, cell) in flatten(&document) {
            prop_assert!(column.starts_with("root"));
            prop_assert!(!cell.is_object() && !cell.is_array());
        }
    }
}
