//! Tabular projection of a collection tree.
//!
//! Export turns every collection, at any depth, into its own sheet: one row
//! per document, the ID column first, nested fields flattened into dotted
//! columns. Labelled sub-collection fields are peeled off into sheets of
//! their own, and an index records which sheet holds which collection path.
//!
//! Import reads the index back, selects the requested collections and
//! unflattens their rows.

use super::tabular::{Sheet, cell_text, flatten};
use crate::models::{CollectionPrefix, path};
use crate::{Error, Result};
use serde_json::{Map, Value};
use std::collections::{BTreeMap, HashSet};

/// Name of the index sheet.
pub const INDEX_SHEET: &str = "INDEX";

/// Index sheet columns.
pub const INDEX_COLUMNS: [&str; 4] = ["Sheet Name", "Collection", "Depth", "Documents"];

/// Longest sheet name spreadsheet applications accept.
pub const MAX_SHEET_NAME: usize = 31;

/// One index row: which sheet holds which collection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SheetIndexEntry {
    /// Generated sheet token.
    pub sheet_name: String,
    /// Full collection path.
    pub collection_path: String,
    /// Segment count of the collection path.
    pub depth: usize,
    /// Number of documents in the sheet.
    pub document_count: usize,
}

impl SheetIndexEntry {
    fn sort_key(&self) -> (usize, &str) {
        (self.depth, self.collection_path.as_str())
    }
}

/// Projected sheets plus their index. Sheets follow index order.
#[derive(Debug, Clone, Default)]
pub struct Workbook {
    /// Index entries, sorted by depth then path.
    pub index: Vec<SheetIndexEntry>,
    /// Collection sheets.
    pub sheets: Vec<Sheet>,
}

impl Workbook {
    /// Looks up a collection sheet by name.
    #[must_use]
    pub fn sheet(&self, name: &str) -> Option<&Sheet> {
        self.sheets.iter().find(|s| s.name == name)
    }

    /// Returns the total number of documents across sheets.
    #[must_use]
    pub fn document_count(&self) -> usize {
        self.index.iter().map(|e| e.document_count).sum()
    }

    /// Builds the index as a sheet of its own.
    #[must_use]
    pub fn index_sheet(&self) -> Sheet {
        let mut sheet = Sheet::new(INDEX_SHEET);
        for entry in &self.index {
            sheet.push(vec![
                (INDEX_COLUMNS[0].to_string(), Value::from(entry.sheet_name.clone())),
                (INDEX_COLUMNS[1].to_string(), Value::from(entry.collection_path.clone())),
                (INDEX_COLUMNS[2].to_string(), Value::from(entry.depth)),
                (INDEX_COLUMNS[3].to_string(), Value::from(entry.document_count)),
            ]);
        }
        sheet
    }
}

/// Sorts index entries by depth, then path.
pub fn sort_index(entries: &mut [SheetIndexEntry]) {
    entries.sort_by(|a, b| a.sort_key().cmp(&b.sort_key()));
}

/// Reads index entries back from an index sheet.
///
/// # Errors
///
/// Returns [`Error::InvalidInput`] when a row lacks a sheet name or a
/// collection path.
pub fn parse_index(sheet: &Sheet) -> Result<Vec<SheetIndexEntry>> {
    let mut entries = sheet
        .rows()
        .iter()
        .enumerate()
        .map(|(i, row)| {
            let text = |column: &str| row.get(column).map(cell_text).filter(|s| !s.is_empty());
            let sheet_name = text(INDEX_COLUMNS[0]).ok_or_else(|| {
                Error::InvalidInput(format!("index row {} has no '{}'", i + 1, INDEX_COLUMNS[0]))
            })?;
            let collection_path = text(INDEX_COLUMNS[1])
                .map(|p| path::normalize(&p))
                .ok_or_else(|| {
                    Error::InvalidInput(format!(
                        "index row {} has no '{}'",
                        i + 1,
                        INDEX_COLUMNS[1]
                    ))
                })?;
            let depth = text(INDEX_COLUMNS[2])
                .and_then(|d| d.parse().ok())
                .unwrap_or_else(|| path::depth(&collection_path));
            let document_count = text(INDEX_COLUMNS[3])
                .and_then(|d| d.parse().ok())
                .unwrap_or_default();
            Ok(SheetIndexEntry {
                sheet_name,
                collection_path,
                depth,
                document_count,
            })
        })
        .collect::<Result<Vec<_>>>()?;
    sort_index(&mut entries);
    Ok(entries)
}

/// Selects the index entries for the requested collection paths.
///
/// A request matches its own collection and everything beneath it, compared
/// segment by segment. No request, or the root among them, selects all.
///
/// # Errors
///
/// Returns [`Error::InvalidInput`] for a document path and
/// [`Error::NotFound`] for a path that matches nothing.
pub fn select_entries(
    index: &[SheetIndexEntry],
    requested: &[String],
) -> Result<Vec<SheetIndexEntry>> {
    let requested: Vec<String> = requested.iter().map(|p| path::normalize(p)).collect();
    if requested.is_empty() || requested.iter().any(|p| path::is_root(p)) {
        let mut all = index.to_vec();
        sort_index(&mut all);
        return Ok(all);
    }

    let mut selected: BTreeMap<(usize, String), SheetIndexEntry> = BTreeMap::new();
    for request in &requested {
        if path::is_document_path(request) {
            return Err(Error::InvalidInput(format!(
                "'{request}' is a document path, a collection path is required"
            )));
        }
        let mut found = false;
        for entry in index.iter().filter(|e| path::is_within(&e.collection_path, request)) {
            found = true;
            selected
                .entry((entry.depth, entry.collection_path.clone()))
                .or_insert_with(|| entry.clone());
        }
        if !found {
            return Err(Error::NotFound(format!(
                "collection '{request}' is not in the index"
            )));
        }
    }
    Ok(selected.into_values().collect())
}

/// Generates a sheet token from a collection name and a running counter.
#[must_use]
pub fn sheet_token(collection_name: &str, counter: usize) -> String {
    let suffix = format!("_{counter}");
    let base: String = collection_name
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .take(MAX_SHEET_NAME.saturating_sub(suffix.len()))
        .collect();
    if base.is_empty() {
        format!("sheet{suffix}")
    } else {
        format!("{base}{suffix}")
    }
}

/// Projects collection trees onto sheets and back.
#[derive(Debug, Clone)]
pub struct Projector {
    prefix: CollectionPrefix,
    id_field: String,
}

struct Collected {
    path: String,
    sheet: Sheet,
}

impl Projector {
    /// Creates a projector using the label prefix and the ID column name.
    #[must_use]
    pub fn new(prefix: CollectionPrefix, id_field: impl Into<String>) -> Self {
        Self {
            prefix,
            id_field: id_field.into(),
        }
    }

    /// Projects collections, each given by its full path and its documents
    /// keyed by ID, into a workbook.
    ///
    /// A collection reached twice (overlapping selections) is projected once.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidInput`] when a document or a labelled
    /// sub-collection is not an object.
    pub fn project<'a>(
        &self,
        collections: impl IntoIterator<Item = (&'a str, &'a Map<String, Value>)>,
    ) -> Result<Workbook> {
        let mut collected = Vec::new();
        let mut seen = HashSet::new();
        for (collection_path, documents) in collections {
            self.walk(&path::normalize(collection_path), documents, &mut collected, &mut seen)?;
        }
        collected.sort_by(|a, b| {
            (path::depth(&a.path), &a.path).cmp(&(path::depth(&b.path), &b.path))
        });

        let mut workbook = Workbook::default();
        for (i, Collected { path: collection_path, mut sheet }) in collected.into_iter().enumerate() {
            sheet.name = sheet_token(path::last_segment(&collection_path), i + 1);
            workbook.index.push(SheetIndexEntry {
                sheet_name: sheet.name.clone(),
                depth: path::depth(&collection_path),
                document_count: sheet.len(),
                collection_path,
            });
            workbook.sheets.push(sheet);
        }
        metrics::counter!(crate::observability::SHEETS_PROJECTED)
            .increment(workbook.sheets.len() as u64);
        Ok(workbook)
    }

    /// Projects a labelled tree. Top-level collections are placed at the
    /// root, named by their labels.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidInput`] for unlabelled top-level keys or
    /// non-object values.
    pub fn project_tree(&self, tree: &Map<String, Value>) -> Result<Workbook> {
        let roots = tree
            .iter()
            .map(|(key, value)| {
                let name = self.prefix.strip(key).ok_or_else(|| {
                    Error::InvalidInput(format!("top-level key '{key}' is not a labelled collection"))
                })?;
                let documents = value.as_object().ok_or_else(|| {
                    Error::InvalidInput(format!("collection '{name}' is not an object"))
                })?;
                Ok((name, documents))
            })
            .collect::<Result<Vec<_>>>()?;
        self.project(roots)
    }

    fn walk(
        &self,
        collection_path: &str,
        documents: &Map<String, Value>,
        collected: &mut Vec<Collected>,
        seen: &mut HashSet<String>,
    ) -> Result<()> {
        if !seen.insert(collection_path.to_string()) {
            tracing::debug!(collection = collection_path, "Collection already projected");
            return Ok(());
        }

        let mut sheet = Sheet::default();
        for (id, document) in documents {
            let document_path = path::join(collection_path, id);
            let fields = document.as_object().ok_or_else(|| {
                Error::InvalidInput(format!("document '{document_path}' is not an object"))
            })?;

            let mut plain = Map::new();
            for (key, value) in fields {
                if let Some(name) = self.prefix.strip(key) {
                    let sub = value.as_object().ok_or_else(|| {
                        Error::InvalidInput(format!(
                            "sub-collection '{key}' of '{document_path}' is not an object"
                        ))
                    })?;
                    self.walk(&path::join(&document_path, name), sub, collected, seen)?;
                } else if key == &self.id_field {
                    tracing::warn!(
                        document = %document_path,
                        "Field '{key}' collides with the ID column and is dropped"
                    );
                } else {
                    plain.insert(key.clone(), value.clone());
                }
            }

            let mut cells = vec![(self.id_field.clone(), Value::String(id.clone()))];
            cells.extend(flatten(&plain));
            sheet.push(cells);
        }

        collected.push(Collected {
            path: collection_path.to_string(),
            sheet,
        });
        Ok(())
    }

    /// Reassembles a workbook into a labelled tree, keyed by the ID column.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotFound`] when an indexed sheet is missing and
    /// [`Error::InvalidInput`] when a row has no ID or a collection would
    /// nest under a non-object field.
    pub fn assemble(&self, workbook: &Workbook) -> Result<Map<String, Value>> {
        let mut entries = workbook.index.clone();
        sort_index(&mut entries);

        let mut tree = Map::new();
        for entry in &entries {
            let sheet = workbook.sheet(&entry.sheet_name).ok_or_else(|| {
                Error::NotFound(format!("sheet '{}' listed in the index", entry.sheet_name))
            })?;

            let mut documents = Map::new();
            for (i, document) in sheet.documents().into_iter().enumerate() {
                let Value::Object(mut fields) = document else {
                    continue;
                };
                let id = fields
                    .remove(&self.id_field)
                    .map(|v| cell_text(&v))
                    .filter(|id| !id.is_empty())
                    .ok_or_else(|| {
                        Error::InvalidInput(format!(
                            "row {} of sheet '{}' has no '{}'",
                            i + 1,
                            sheet.name,
                            self.id_field
                        ))
                    })?;
                documents.insert(id, Value::Object(fields));
            }

            let keys = self.prefix.labelled_keys(&entry.collection_path);
            let Some((last, parents)) = keys.split_last() else {
                continue;
            };
            descend(&mut tree, parents)
                .ok_or_else(|| {
                    Error::InvalidInput(format!(
                        "collection '{}' nests under a non-object field",
                        entry.collection_path
                    ))
                })?
                .insert(last.clone(), Value::Object(documents));
        }
        Ok(tree)
    }
}

/// Walks down `keys`, creating missing objects on the way.
fn descend<'a>(
    mut node: &'a mut Map<String, Value>,
    keys: &[String],
) -> Option<&'a mut Map<String, Value>> {
    for key in keys {
        let slot = node
            .entry(key.clone())
            .or_insert_with(|| Value::Object(Map::new()));
        match slot {
            Value::Object(next) => node = next,
            _ => return None,
        }
    }
    Some(node)
}
