//! Import and export service implementations.
//!
//! Export reads a tree out of the store; import writes one back through
//! chunked batches.

pub mod batch;
pub mod export;
pub mod import;
pub mod writer;

pub use batch::{BatchStats, BatchWriter};
pub use export::{ExportOptions, ExportResult, ExportService, TreeReader};
pub use import::{ImportOptions, ImportResult, ImportService};
pub use writer::{CollectionData, TreeWriter, WriteOptions};
