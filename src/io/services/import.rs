//! Import service.
//!
//! Picks the collections to write out of a JSON tree, a CSV file (single
//! sheet or index plus sheet files) or an XLSX workbook, then hands them to
//! a [`TreeWriter`].

use super::batch::BatchWriter;
use super::writer::{CollectionData, TreeWriter, WriteOptions};
use crate::config::{DEFAULT_AUTO_ID, DEFAULT_ID_FIELD, ImportDefaults, MAX_CHUNK, clamp_chunk};
use crate::io::formats::{self, Format, csv, json};
use crate::io::projector::{INDEX_SHEET, parse_index, select_entries};
use crate::io::tabular::Sheet;
use crate::models::{CollectionPrefix, path};
use crate::storage::DocumentStore;
use crate::{Error, Result};
use serde_json::{Map, Value};
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;
use tracing::instrument;

/// Options for import.
#[derive(Debug, Clone)]
pub struct ImportOptions {
    /// Field consumed as the document ID.
    pub id_field: String,
    /// Key that requests a generated ID.
    pub auto_id: String,
    /// Merge into existing documents instead of replacing them.
    pub merge: bool,
    /// Operations per committed batch, `1..=500`.
    pub chunk: usize,
    /// Label prefix for sub-collection keys.
    pub prefix: CollectionPrefix,
    /// 1-based sheet to read from a workbook, bypassing the index.
    pub sheet: Option<usize>,
    /// Delete existing documents of each target collection first.
    pub truncate: bool,
    /// Count and log writes without committing them.
    pub dry_run: bool,
    /// Log every document at info level.
    pub verbose: bool,
}

impl Default for ImportOptions {
    fn default() -> Self {
        Self {
            id_field: DEFAULT_ID_FIELD.to_string(),
            auto_id: DEFAULT_AUTO_ID.to_string(),
            merge: false,
            chunk: MAX_CHUNK,
            prefix: CollectionPrefix::default(),
            sheet: None,
            truncate: false,
            dry_run: false,
            verbose: false,
        }
    }
}

impl From<&ImportDefaults> for ImportOptions {
    fn from(defaults: &ImportDefaults) -> Self {
        Self {
            id_field: defaults.id_field.clone(),
            auto_id: defaults.auto_id.clone(),
            merge: defaults.merge,
            chunk: clamp_chunk(defaults.chunk),
            prefix: CollectionPrefix::new(defaults.collection_prefix.clone()),
            ..Self::default()
        }
    }
}

impl ImportOptions {
    /// Sets the ID field.
    #[must_use]
    pub fn with_id_field(mut self, id_field: impl Into<String>) -> Self {
        self.id_field = id_field.into();
        self
    }

    /// Sets the generated-ID sentinel.
    #[must_use]
    pub fn with_auto_id(mut self, auto_id: impl Into<String>) -> Self {
        self.auto_id = auto_id.into();
        self
    }

    /// Enables or disables merge writes.
    #[must_use]
    pub const fn with_merge(mut self, merge: bool) -> Self {
        self.merge = merge;
        self
    }

    /// Sets the chunk size, clamped to `1..=500`.
    #[must_use]
    pub fn with_chunk(mut self, chunk: usize) -> Self {
        self.chunk = clamp_chunk(chunk);
        self
    }

    /// Sets the label prefix.
    #[must_use]
    pub fn with_prefix(mut self, prefix: CollectionPrefix) -> Self {
        self.prefix = prefix;
        self
    }

    /// Selects a single workbook sheet by 1-based number.
    #[must_use]
    pub const fn with_sheet(mut self, sheet: Option<usize>) -> Self {
        self.sheet = sheet;
        self
    }

    /// Enables or disables truncation.
    #[must_use]
    pub const fn with_truncate(mut self, truncate: bool) -> Self {
        self.truncate = truncate;
        self
    }

    /// Enables or disables dry run mode.
    #[must_use]
    pub const fn with_dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    /// Enables or disables verbose logging.
    #[must_use]
    pub const fn with_verbose(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self
    }

    fn write_options(&self) -> WriteOptions {
        WriteOptions {
            id_field: self.id_field.clone(),
            auto_id: self.auto_id.clone(),
            merge: self.merge,
            truncate: self.truncate,
            prefix: self.prefix.clone(),
            verbose: self.verbose || self.dry_run,
        }
    }
}

/// Result of an import operation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ImportResult {
    /// Documents written, or that would have been in a dry run.
    pub written: usize,
    /// Documents deleted by truncation.
    pub deleted: usize,
    /// Batches committed.
    pub commits: usize,
    /// Target collection paths, in write order.
    pub collections: Vec<String>,
    /// Whether this was a dry run.
    pub dry_run: bool,
}

impl ImportResult {
    /// Returns whether any documents were written.
    #[must_use]
    pub const fn has_imports(&self) -> bool {
        self.written > 0
    }
}

/// One collection selected from a source file.
#[derive(Debug, Clone, PartialEq)]
pub struct SourceCollection {
    /// Target collection path.
    pub path: String,
    /// Its documents.
    pub data: CollectionData,
}

/// Service for importing files into a store.
pub struct ImportService {
    store: Arc<dyn DocumentStore>,
}

impl ImportService {
    /// Creates a new import service.
    #[must_use]
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self { store }
    }

    /// Imports a file into the requested collections. The format follows
    /// the extension.
    ///
    /// # Errors
    ///
    /// Returns an error if the format is unsupported, the requested
    /// collections cannot be resolved from the file, a document is
    /// invalid, or a commit fails.
    #[instrument(skip(self, options), fields(operation = "import", path = %path.display()))]
    pub fn import_from_file(
        &self,
        path: &Path,
        collections: &[String],
        options: &ImportOptions,
    ) -> Result<ImportResult> {
        let start = Instant::now();
        let format = Format::from_path(path)?.ensure_enabled()?;
        let requested = requested_paths(collections);

        let sources = match format {
            Format::Json => json_sources(json::read_file(path)?, &requested, &options.prefix)?,
            Format::Csv => csv_sources(path, &requested)?,
            Format::Xlsx => {
                workbook_sources(formats::read_workbook(path)?, &requested, options.sheet)?
            },
        };

        let result = self.write_sources(sources, options)?;

        #[allow(clippy::cast_precision_loss)]
        let elapsed = start.elapsed().as_millis() as f64;
        metrics::histogram!("import_duration_ms", "format" => format.extension()).record(elapsed);
        Ok(result)
    }

    /// Writes already selected collections.
    ///
    /// # Errors
    ///
    /// Returns an error if a document is invalid or a commit fails.
    pub fn write_sources(
        &self,
        sources: Vec<SourceCollection>,
        options: &ImportOptions,
    ) -> Result<ImportResult> {
        let batch = BatchWriter::new(Arc::clone(&self.store), options.chunk)
            .with_dry_run(options.dry_run);
        let mut writer = TreeWriter::new(Arc::clone(&self.store), batch, options.write_options());

        let mut collections = Vec::with_capacity(sources.len());
        for source in sources {
            tracing::info!(
                collection = %source.path,
                documents = source.data.len(),
                dry_run = options.dry_run,
                "Importing collection"
            );
            writer.write_collection(&source.path, source.data)?;
            collections.push(source.path);
        }
        let stats = writer.finish()?;

        Ok(ImportResult {
            written: stats.written,
            deleted: stats.deleted,
            commits: stats.commits,
            collections,
            dry_run: options.dry_run,
        })
    }
}

/// Normalizes requested collection paths. No request means the root; the
/// root overrides everything else. Paths beneath another requested path
/// are dropped.
#[must_use]
pub fn requested_paths(collections: &[String]) -> Vec<String> {
    let normalized: Vec<String> = collections.iter().map(|c| path::normalize(c)).collect();
    if normalized.is_empty() || normalized.iter().any(|p| path::is_root(p)) {
        return vec![path::ROOT.to_string()];
    }
    let mut kept: Vec<String> = Vec::with_capacity(normalized.len());
    for candidate in &normalized {
        let covered = normalized
            .iter()
            .any(|other| other != candidate && path::is_within(candidate, other));
        if !covered && !kept.contains(candidate) {
            kept.push(candidate.clone());
        }
    }
    kept
}

/// The single target collection of a non-indexed source.
fn single_target(requested: &[String], source: &str) -> Result<String> {
    match requested {
        [only] if !path::is_root(only) => {
            if path::is_document_path(only) {
                Err(Error::InvalidInput(format!(
                    "'{only}' is a document path, a collection path is required"
                )))
            } else {
                Ok(only.clone())
            }
        },
        [only] => Err(Error::InvalidInput(format!(
            "{source} holds a single collection, name the target collection (got '{only}')"
        ))),
        _ => Err(Error::InvalidInput(format!(
            "{source} holds a single collection, {} collections were requested",
            requested.len()
        ))),
    }
}

/// Selects collections from a JSON document.
///
/// # Errors
///
/// Returns [`Error::InvalidInput`] when the shape and the request do not
/// fit together and [`Error::NotFound`] for a missing labelled path.
pub fn json_sources(
    value: Value,
    requested: &[String],
    prefix: &CollectionPrefix,
) -> Result<Vec<SourceCollection>> {
    let tree = match value {
        Value::Array(items) => {
            let target = single_target(requested, "a JSON array")?;
            return Ok(vec![SourceCollection {
                path: target,
                data: CollectionData::Array(items),
            }]);
        },
        Value::Object(map) if !map.keys().any(|k| prefix.is_label(k)) => {
            let target = single_target(requested, "a JSON object without labelled collections")?;
            return Ok(vec![SourceCollection {
                path: target,
                data: CollectionData::Keyed(map),
            }]);
        },
        Value::Object(map) => map,
        other => {
            return Err(Error::InvalidInput(format!(
                "a JSON import must be an object or an array, found {other}"
            )));
        },
    };

    if requested.iter().any(|p| path::is_root(p)) {
        return tree
            .into_iter()
            .filter_map(|(key, value)| {
                let name = prefix.strip(&key).map(str::to_string);
                if name.is_none() {
                    tracing::warn!("Skipping unlabelled top-level key '{key}'");
                }
                name.map(|name| {
                    CollectionData::from_value(&name, value).map(|data| SourceCollection {
                        path: name,
                        data,
                    })
                })
            })
            .collect();
    }

    requested
        .iter()
        .map(|collection_path| {
            if path::is_document_path(collection_path) {
                return Err(Error::InvalidInput(format!(
                    "'{collection_path}' is a document path, a collection path is required"
                )));
            }
            let value = lookup_labelled(&tree, &prefix.labelled_keys(collection_path))
                .ok_or_else(|| {
                    Error::NotFound(format!("collection '{collection_path}' in the JSON file"))
                })?;
            Ok(SourceCollection {
                path: collection_path.clone(),
                data: CollectionData::from_value(collection_path, value.clone())?,
            })
        })
        .collect()
}

fn lookup_labelled<'a>(tree: &'a Map<String, Value>, keys: &[String]) -> Option<&'a Value> {
    let (first, rest) = keys.split_first()?;
    let mut node = tree.get(first)?;
    for key in rest {
        node = node.as_object()?.get(key)?;
    }
    Some(node)
}

/// Selects collections from a CSV file: a single sheet, or an index file
/// whose entries name sibling sheet files.
///
/// # Errors
///
/// Returns an error if the request cannot be resolved or a file is missing.
pub fn csv_sources(file: &Path, requested: &[String]) -> Result<Vec<SourceCollection>> {
    if !csv::is_index_file(file) {
        let target = single_target(requested, "a CSV file without an index")?;
        let sheet = csv::read_file(file)?;
        return Ok(vec![sheet_source(target, &sheet)]);
    }

    let index = parse_index(&csv::read_file(file)?)?;
    select_entries(&index, requested)?
        .into_iter()
        .map(|entry| {
            let sheet = csv::read_file(&csv::sheet_file(file, &entry.sheet_name))?;
            Ok(sheet_source(entry.collection_path, &sheet))
        })
        .collect()
}

/// Selects collections from workbook sheets: a chosen or only sheet, or
/// the index sheet's entries.
///
/// # Errors
///
/// Returns [`Error::NotFound`] for a missing sheet and
/// [`Error::InvalidInput`] when the request cannot be resolved.
pub fn workbook_sources(
    sheets: Vec<Sheet>,
    requested: &[String],
    sheet_number: Option<usize>,
) -> Result<Vec<SourceCollection>> {
    if let Some(number) = sheet_number {
        let target = single_target(requested, "a selected sheet")?;
        let sheet = number
            .checked_sub(1)
            .and_then(|i| sheets.get(i))
            .ok_or_else(|| {
                Error::NotFound(format!("sheet {number} (the workbook has {})", sheets.len()))
            })?;
        return Ok(vec![sheet_source(target, sheet)]);
    }

    if let [only] = sheets.as_slice() {
        if only.name != INDEX_SHEET {
            let target = single_target(requested, "a single-sheet workbook")?;
            return Ok(vec![sheet_source(target, only)]);
        }
    }

    let index_sheet = sheets
        .iter()
        .find(|s| s.name == INDEX_SHEET)
        .ok_or_else(|| Error::NotFound(format!("'{INDEX_SHEET}' sheet in the workbook")))?;
    let index = parse_index(index_sheet)?;
    select_entries(&index, requested)?
        .into_iter()
        .map(|entry| {
            let sheet = sheets
                .iter()
                .find(|s| s.name == entry.sheet_name)
                .ok_or_else(|| {
                    Error::NotFound(format!("sheet '{}' listed in the index", entry.sheet_name))
                })?;
            Ok(sheet_source(entry.collection_path, sheet))
        })
        .collect()
}

fn sheet_source(path: String, sheet: &Sheet) -> SourceCollection {
    SourceCollection {
        path,
        data: CollectionData::Array(sheet.documents()),
    }
}
