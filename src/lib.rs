//! # fire-migrate
//!
//! Bidirectional migration between a hierarchical document database and flat
//! file formats (JSON, CSV, XLSX workbooks).
//!
//! A database is a tree: collections hold documents, documents may hold
//! nested sub-collections. Export flattens that tree into a single keyed
//! object (JSON) or into one sheet per collection plus an index sheet
//! (CSV/XLSX). Import reverses the projection and writes the documents back
//! in atomic batches.
//!
//! ## Pipeline
//!
//! ```text
//! export: DocumentStore -> TreeReader + codec::decode -> labelled tree -> projector -> file
//! import: file -> projector (inverse) -> labelled tree -> TreeWriter + codec::encode -> DocumentStore
//! ```
//!
//! ## Example
//!
//! ```rust,ignore
//! use fire_migrate::io::{ExportOptions, ExportService};
//! use fire_migrate::storage::MemoryStore;
//! use std::sync::Arc;
//!
//! let service = ExportService::new(Arc::new(MemoryStore::new()));
//! let result = service.export_to_file("dump.xlsx".as_ref(), &[], &ExportOptions::default())?;
//! println!("Exported {} documents", result.documents);
//! ```

#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]
#![warn(missing_docs)]
#![forbid(unsafe_code)]
#![allow(clippy::multiple_crate_versions)]

use thiserror::Error as ThisError;

// Module declarations
pub mod codec;
pub mod config;
pub mod io;
pub mod models;
pub mod observability;
pub mod storage;

// Re-exports for convenience
pub use codec::{FieldHandler, HANDLER_CHAIN, decode_document, encode_document};
pub use config::MigrateConfig;
pub use models::{CollectionPrefix, Document, FieldValue, GeoPoint};
pub use storage::{DocumentStore, StoredDocument, WriteOp};

/// Error type for fire-migrate operations.
///
/// # Error Variant Triggers
///
/// | Variant | Raised When |
/// |---------|-------------|
/// | `InvalidInput` | Ambiguous or missing collection paths, document path where a collection is required, malformed field envelopes |
/// | `NotFound` | Requested collection absent from the source file or index, empty collection on export |
/// | `UnsupportedFormat` | File extension is not `.json`, `.csv` or `.xlsx` |
/// | `OperationFailed` | Database reads/writes, filesystem I/O, parse failures of whole files |
/// | `FeatureNotEnabled` | XLSX requested from a build without the `xlsx` feature |
#[derive(Debug, ThisError)]
pub enum Error {
    /// Invalid input or configuration was provided.
    ///
    /// Raised when:
    /// - Multiple collections are requested from a non-indexed file
    /// - A document path is given where a collection path is required
    /// - A field value carries a type tag but is not a valid envelope
    /// - An imported document is not an object
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// A requested collection, sheet or file does not exist.
    ///
    /// Raised when:
    /// - The index contains no path matching the requested collection
    /// - A JSON source has no collection under the requested labelled path
    /// - An exported collection has zero documents (likely a path typo)
    #[error("not found: {0}")]
    NotFound(String),

    /// The file extension is not recognized.
    #[error("unsupported format: {0}")]
    UnsupportedFormat(String),

    /// An operation failed.
    ///
    /// Raised when:
    /// - Database list/commit calls fail (network, permissions)
    /// - Files cannot be read, written or parsed
    #[error("operation '{operation}' failed: {cause}")]
    OperationFailed {
        /// The operation that failed.
        operation: String,
        /// The underlying cause.
        cause: String,
    },

    /// Feature not enabled (requires feature flag).
    #[error("feature not enabled: {0} (compile with --features {0})")]
    FeatureNotEnabled(String),
}

impl Error {
    /// Builds an [`Error::OperationFailed`] from an operation name and any displayable cause.
    pub fn operation(operation: &str, cause: impl std::fmt::Display) -> Self {
        Self::OperationFailed {
            operation: operation.to_string(),
            cause: cause.to_string(),
        }
    }
}

/// Result type alias for fire-migrate operations.
pub type Result<T> = std::result::Result<T, Error>;
