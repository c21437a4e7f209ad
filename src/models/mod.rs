//! Data models for fire-migrate.
//!
//! This module contains the path conventions, the native field value model
//! and the labelled sub-collection key convention shared by export and import.

mod label;
pub mod path;
mod value;

pub use label::{CollectionPrefix, DEFAULT_COLLECTION_PREFIX};
pub use value::{Document, FieldValue, GeoPoint, merge_documents};
