//! Export service.
//!
//! Reads collections out of a [`DocumentStore`] into snapshots, decodes
//! every field into its portable form and writes the result as a labelled
//! JSON tree or as projected sheets.

use crate::codec::{PortableDocument, decode_document};
use crate::config::{DEFAULT_ID_FIELD, ExportDefaults};
use crate::io::formats::{self, Format, csv, json};
use crate::io::projector::{Projector, Workbook};
use crate::models::{CollectionPrefix, path};
use crate::observability::DOCUMENTS_READ;
use crate::storage::{DocumentStore, StoredDocument};
use crate::{Error, Result};
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Instant;
use tracing::instrument;

/// Options for export.
#[derive(Debug, Clone)]
pub struct ExportOptions {
    /// Descend into sub-collections.
    pub include_subcollections: bool,
    /// Label prefix for sub-collection keys.
    pub prefix: CollectionPrefix,
    /// Name of the document ID column in sheets.
    pub id_field: String,
    /// Maximum store calls in flight during traversal.
    pub concurrency: usize,
    /// Log every traversed document at info level.
    pub verbose: bool,
}

impl Default for ExportOptions {
    fn default() -> Self {
        Self {
            include_subcollections: true,
            prefix: CollectionPrefix::default(),
            id_field: DEFAULT_ID_FIELD.to_string(),
            concurrency: 1,
            verbose: false,
        }
    }
}

impl From<&ExportDefaults> for ExportOptions {
    fn from(defaults: &ExportDefaults) -> Self {
        Self {
            include_subcollections: defaults.include_subcollections,
            prefix: CollectionPrefix::new(defaults.collection_prefix.clone()),
            id_field: defaults.id_field.clone(),
            concurrency: defaults.concurrency.max(1),
            verbose: false,
        }
    }
}

impl ExportOptions {
    /// Enables or disables sub-collection traversal.
    #[must_use]
    pub const fn with_subcollections(mut self, include: bool) -> Self {
        self.include_subcollections = include;
        self
    }

    /// Sets the label prefix.
    #[must_use]
    pub fn with_prefix(mut self, prefix: CollectionPrefix) -> Self {
        self.prefix = prefix;
        self
    }

    /// Sets the ID column name.
    #[must_use]
    pub fn with_id_field(mut self, id_field: impl Into<String>) -> Self {
        self.id_field = id_field.into();
        self
    }

    /// Sets the fetch concurrency; zero is treated as one.
    #[must_use]
    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    /// Enables or disables verbose traversal logging.
    #[must_use]
    pub const fn with_verbose(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self
    }
}

/// Result of an export operation.
#[derive(Debug, Clone)]
pub struct ExportResult {
    /// Output format.
    pub format: Format,
    /// Top-level collection paths exported.
    pub collections: Vec<String>,
    /// Documents exported, sub-collections included.
    pub documents: usize,
    /// Collection sheets written (zero for JSON).
    pub sheets: usize,
    /// Files written.
    pub files: Vec<PathBuf>,
}

impl ExportResult {
    /// Creates an empty result.
    #[must_use]
    pub const fn new(format: Format) -> Self {
        Self {
            format,
            collections: Vec::new(),
            documents: 0,
            sheets: 0,
            files: Vec::new(),
        }
    }

    /// Returns whether any documents were exported.
    #[must_use]
    pub const fn has_exports(&self) -> bool {
        self.documents > 0
    }
}

/// A document read from the store, fields already decoded.
#[derive(Debug, Clone, PartialEq)]
pub struct DocumentSnapshot {
    /// Document ID.
    pub id: String,
    /// Full document path.
    pub path: String,
    /// Portable field values.
    pub fields: PortableDocument,
    /// Non-empty sub-collections.
    pub subcollections: Vec<CollectionSnapshot>,
}

/// A collection read from the store.
#[derive(Debug, Clone, PartialEq)]
pub struct CollectionSnapshot {
    /// Full collection path.
    pub path: String,
    /// Documents in store order.
    pub documents: Vec<DocumentSnapshot>,
}

impl CollectionSnapshot {
    /// Returns the collection name.
    #[must_use]
    pub fn name(&self) -> &str {
        path::last_segment(&self.path)
    }

    /// Counts documents here and in every sub-collection.
    #[must_use]
    pub fn document_count(&self) -> usize {
        self.documents
            .iter()
            .map(|d| 1 + d.subcollections.iter().map(Self::document_count).sum::<usize>())
            .sum()
    }

    /// Builds the documents keyed by ID, sub-collections under labelled keys.
    #[must_use]
    pub fn to_documents(&self, prefix: &CollectionPrefix) -> Map<String, Value> {
        self.documents
            .iter()
            .map(|document| {
                let mut fields = document.fields.clone();
                for sub in &document.subcollections {
                    fields.insert(prefix.label(sub.name()), Value::Object(sub.to_documents(prefix)));
                }
                (document.id.clone(), Value::Object(fields))
            })
            .collect()
    }
}

/// Reads collection trees out of a store.
pub struct TreeReader {
    store: Arc<dyn DocumentStore>,
    prefix: CollectionPrefix,
    include_subcollections: bool,
    concurrency: usize,
    verbose: bool,
}

impl TreeReader {
    /// Creates a reader using the export options.
    #[must_use]
    pub fn new(store: Arc<dyn DocumentStore>, options: &ExportOptions) -> Self {
        Self {
            store,
            prefix: options.prefix.clone(),
            include_subcollections: options.include_subcollections,
            concurrency: options.concurrency.max(1),
            verbose: options.verbose,
        }
    }

    /// Normalizes requested paths. No request, or the root among them,
    /// means every root collection.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidInput`] for a document path.
    pub fn resolve_paths(&self, requested: &[String]) -> Result<Vec<String>> {
        let normalized: Vec<String> = requested.iter().map(|p| path::normalize(p)).collect();
        if requests_root(requested) {
            return self.store.list_root_collections();
        }

        let mut resolved: Vec<String> = Vec::with_capacity(normalized.len());
        for p in normalized {
            if path::is_document_path(&p) {
                return Err(Error::InvalidInput(format!(
                    "'{p}' is a document path, a collection path is required"
                )));
            }
            if !resolved.contains(&p) {
                resolved.push(p);
            }
        }
        Ok(resolved)
    }

    /// Reads the requested collections in order. Root collections found by
    /// listing are skipped when they have no documents of their own.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotFound`] when an explicitly requested collection
    /// has no documents, and propagates store errors.
    pub fn read_collections(&self, requested: &[String]) -> Result<Vec<CollectionSnapshot>> {
        let listed = requests_root(requested);
        let paths = self.resolve_paths(requested)?;
        let snapshots = self.read_many(&paths, !listed)?;
        Ok(snapshots
            .into_iter()
            .filter(|snapshot| !listed || !snapshot.documents.is_empty())
            .collect())
    }

    /// Reads one collection and, when enabled, its sub-collections.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotFound`] when the collection has no documents.
    pub fn read_collection(&self, collection_path: &str) -> Result<CollectionSnapshot> {
        let collection_path = path::normalize(collection_path);
        self.read_many(std::slice::from_ref(&collection_path), true)?
            .pop()
            .ok_or_else(|| Error::NotFound(format!("collection '{collection_path}'")))
    }

    /// Builds the labelled tree: `{"<prefix>:<name>": {id: document}}`.
    #[must_use]
    pub fn to_tree(&self, snapshots: &[CollectionSnapshot]) -> Map<String, Value> {
        let mut tree = Map::new();
        for snapshot in snapshots {
            let key = self.prefix.label_path(&snapshot.path);
            if tree.contains_key(&key) {
                tracing::warn!(
                    collection = %snapshot.path,
                    "Top-level key '{key}' already exported, replacing it"
                );
            }
            tree.insert(key, Value::Object(snapshot.to_documents(&self.prefix)));
        }
        tree
    }

    /// Walks the tree level by level. Every level is drained by at most
    /// `concurrency` workers, so no more than that many store calls are in
    /// flight across the whole traversal.
    fn read_many(&self, paths: &[String], required: bool) -> Result<Vec<CollectionSnapshot>> {
        let mut fetched: HashMap<String, FetchedCollection> = HashMap::new();
        let mut frontier: Vec<String> = paths.to_vec();
        let mut top_level = true;

        while !frontier.is_empty() {
            let results = self.fetch_all(&frontier)?;
            let mut next = Vec::new();
            for (collection_path, collection) in frontier.into_iter().zip(results) {
                if top_level && required && collection.documents.is_empty() {
                    return Err(Error::NotFound(format!(
                        "collection '{collection_path}' has no documents"
                    )));
                }
                for sub in collection.subcollections.iter().flatten() {
                    if !fetched.contains_key(sub) && !next.contains(sub) {
                        next.push(sub.clone());
                    }
                }
                fetched.insert(collection_path, collection);
            }
            next.retain(|sub| !fetched.contains_key(sub));
            frontier = next;
            top_level = false;
        }

        Ok(paths.iter().map(|p| self.assemble(p, &fetched)).collect())
    }

    /// Fetches one level of collections, keeping their order.
    fn fetch_all(&self, paths: &[String]) -> Result<Vec<FetchedCollection>> {
        let workers = self.concurrency.min(paths.len());
        if workers <= 1 {
            return paths.iter().map(|p| self.fetch(p)).collect();
        }

        let cursor = AtomicUsize::new(0);
        let mut slots: Vec<Option<Result<FetchedCollection>>> = Vec::new();
        slots.resize_with(paths.len(), || None);

        std::thread::scope(|scope| {
            let handles: Vec<_> = (0..workers)
                .map(|_| {
                    scope.spawn(|| {
                        let mut done = Vec::new();
                        loop {
                            let i = cursor.fetch_add(1, Ordering::Relaxed);
                            let Some(collection_path) = paths.get(i) else {
                                break;
                            };
                            done.push((i, self.fetch(collection_path)));
                        }
                        done
                    })
                })
                .collect();
            for handle in handles {
                if let Ok(done) = handle.join() {
                    for (i, result) in done {
                        slots[i] = Some(result);
                    }
                }
            }
        });

        slots
            .into_iter()
            .map(|slot| {
                slot.unwrap_or_else(|| {
                    Err(Error::operation("read_collection", "reader thread panicked"))
                })
            })
            .collect()
    }

    /// Lists one collection's documents and, when enabled, the
    /// sub-collection paths under each of them.
    fn fetch(&self, collection_path: &str) -> Result<FetchedCollection> {
        let documents = self.store.list_documents(collection_path)?;
        let mut subcollections = Vec::with_capacity(documents.len());
        for document in &documents {
            if self.verbose {
                tracing::info!(document = %document.path, "Reading document");
            } else {
                tracing::debug!(document = %document.path, "Reading document");
            }
            metrics::counter!(DOCUMENTS_READ, "backend" => self.store.name()).increment(1);

            subcollections.push(if self.include_subcollections {
                self.store.list_subcollections(&document.path)?
            } else {
                Vec::new()
            });
        }
        Ok(FetchedCollection {
            documents,
            subcollections,
        })
    }

    fn assemble(
        &self,
        collection_path: &str,
        fetched: &HashMap<String, FetchedCollection>,
    ) -> CollectionSnapshot {
        let documents = fetched
            .get(collection_path)
            .map(|collection| {
                collection
                    .documents
                    .iter()
                    .zip(&collection.subcollections)
                    .map(|(document, subs)| DocumentSnapshot {
                        id: document.id.clone(),
                        path: document.path.clone(),
                        fields: decode_document(&document.fields),
                        subcollections: subs
                            .iter()
                            .map(|sub| self.assemble(sub, fetched))
                            .filter(|sub| !sub.documents.is_empty())
                            .collect(),
                    })
                    .collect()
            })
            .unwrap_or_default();
        CollectionSnapshot {
            path: collection_path.to_string(),
            documents,
        }
    }
}

/// Raw listing of one collection, before decoding.
struct FetchedCollection {
    documents: Vec<StoredDocument>,
    /// Sub-collection paths, parallel to `documents`.
    subcollections: Vec<Vec<String>>,
}

fn requests_root(requested: &[String]) -> bool {
    requested.is_empty() || requested.iter().any(|p| path::is_root(&path::normalize(p)))
}

/// Service for exporting collections to files.
pub struct ExportService {
    store: Arc<dyn DocumentStore>,
}

impl ExportService {
    /// Creates a new export service.
    #[must_use]
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self { store }
    }

    /// Exports collections to a file. The format follows the extension.
    ///
    /// # Errors
    ///
    /// Returns an error if the format is unsupported, a requested
    /// collection is empty or missing, or the output cannot be written.
    #[instrument(skip(self, options), fields(operation = "export", path = %path.display()))]
    pub fn export_to_file(
        &self,
        path: &Path,
        collections: &[String],
        options: &ExportOptions,
    ) -> Result<ExportResult> {
        let start = Instant::now();
        let format = Format::from_path(path)?.ensure_enabled()?;

        let reader = TreeReader::new(Arc::clone(&self.store), options);
        let snapshots = reader.read_collections(collections)?;

        let mut result = ExportResult::new(format);
        result.collections = snapshots.iter().map(|s| s.path.clone()).collect();
        result.documents = snapshots.iter().map(CollectionSnapshot::document_count).sum();

        match format {
            Format::Json => {
                let tree = reader.to_tree(&snapshots);
                json::write_file(path, &Value::Object(tree))?;
                result.files.push(path.to_path_buf());
            },
            Format::Csv => {
                let workbook = Self::project(&snapshots, options)?;
                result.sheets = workbook.sheets.len();
                result.files = write_csv(path, &workbook)?;
            },
            Format::Xlsx => {
                let workbook = Self::project(&snapshots, options)?;
                result.sheets = workbook.sheets.len();
                formats::write_workbook(path, &workbook)?;
                result.files.push(path.to_path_buf());
            },
        }

        #[allow(clippy::cast_precision_loss)]
        let elapsed = start.elapsed().as_millis() as f64;
        metrics::histogram!("export_duration_ms", "format" => format.extension()).record(elapsed);
        tracing::info!(
            documents = result.documents,
            collections = result.collections.len(),
            files = result.files.len(),
            "Export complete"
        );
        Ok(result)
    }

    /// Projects snapshots onto sheets, each top-level collection at its
    /// real path.
    ///
    /// # Errors
    ///
    /// Returns an error if a document cannot be projected.
    pub fn project(snapshots: &[CollectionSnapshot], options: &ExportOptions) -> Result<Workbook> {
        let documents: Vec<(&str, Map<String, Value>)> = snapshots
            .iter()
            .map(|s| (s.path.as_str(), s.to_documents(&options.prefix)))
            .collect();
        Projector::new(options.prefix.clone(), options.id_field.clone())
            .project(documents.iter().map(|(p, docs)| (*p, docs)))
    }
}

/// Writes a workbook as CSV: one file for a single sheet, otherwise an
/// index file plus one file per sheet.
fn write_csv(path: &Path, workbook: &Workbook) -> Result<Vec<PathBuf>> {
    if let [sheet] = workbook.sheets.as_slice() {
        csv::write_file(path, sheet)?;
        return Ok(vec![path.to_path_buf()]);
    }

    let index_path = csv::index_path_for(path);
    csv::write_file(&index_path, &workbook.index_sheet())?;
    let mut files = vec![index_path];
    for sheet in &workbook.sheets {
        let sheet_path = csv::sheet_path_for(path, &sheet.name);
        csv::write_file(&sheet_path, sheet)?;
        files.push(sheet_path);
    }
    Ok(files)
}
