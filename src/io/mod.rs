//! Import/export I/O subsystem.
//!
//! Moves collection trees between a [`DocumentStore`](crate::storage::DocumentStore)
//! and files.
//!
//! # Architecture
//!
//! - **Tabular layer** flattens documents into sheet rows and back
//! - **Projector** maps a collection tree onto sheets plus an index
//! - **Format adapters** read and write JSON, CSV and XLSX files
//! - **Services** orchestrate reading, projection and batched writes
//!
//! # Supported Formats
//!
//! | Format | Import | Export | Notes |
//! |--------|--------|--------|-------|
//! | JSON | ✓ | ✓ | Labelled tree, bare array or keyed object |
//! | CSV | ✓ | ✓ | Single sheet, or `*.INDEX.csv` plus one file per sheet |
//! | XLSX | ✓ | ✓ | `INDEX` sheet plus one sheet per collection; `xlsx` feature |
//!
//! # Examples
//!
//! ## Import a workbook
//!
//! ```rust,ignore
//! use fire_migrate::io::{ImportOptions, ImportService};
//!
//! let result = service.import_from_file(
//!     "dump.xlsx".as_ref(),
//!     &["users".to_string()],
//!     &ImportOptions::default().with_truncate(true),
//! )?;
//! println!("Wrote {} documents", result.written);
//! ```
//!
//! ## Export to CSV
//!
//! ```rust,ignore
//! use fire_migrate::io::{ExportOptions, ExportService};
//!
//! let result = service.export_to_file("dump.csv".as_ref(), &[], &ExportOptions::default())?;
//! for file in &result.files {
//!     println!("{}", file.display());
//! }
//! ```

pub mod formats;
pub mod projector;
pub mod services;
pub mod tabular;

// Re-exports for convenience
pub use formats::Format;
pub use projector::{Projector, SheetIndexEntry, Workbook};
pub use services::batch::{BatchStats, BatchWriter};
pub use services::export::{
    CollectionSnapshot, DocumentSnapshot, ExportOptions, ExportResult, ExportService, TreeReader,
};
pub use services::import::{ImportOptions, ImportResult, ImportService, SourceCollection};
pub use services::writer::{CollectionData, TreeWriter, WriteOptions};
pub use tabular::Sheet;
