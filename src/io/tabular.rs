//! Dot-notation flattening and the sheet model.
//!
//! A nested document becomes one row: `{"a": {"b": 1}, "c": [x, y]}` turns
//! into the columns `a.b`, `c.0` and `c.1`. Unflattening reverses it; a map
//! whose keys are exactly `0..n` comes back as an array.

use serde_json::{Map, Value};
use std::collections::{BTreeMap, HashSet};

/// Separator between nested key segments in a column name.
pub const KEY_SEPARATOR: char = '.';

/// One row of a sheet: column name to scalar cell.
pub type Row = BTreeMap<String, Value>;

/// A named table with columns in order of first appearance.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Sheet {
    /// Sheet name.
    pub name: String,
    columns: Vec<String>,
    rows: Vec<Row>,
}

impl Sheet {
    /// Creates an empty sheet.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    /// Builds a sheet from a header and positional records, as read from a
    /// file. Empty cells are dropped.
    #[must_use]
    pub fn from_records(
        name: impl Into<String>,
        header: Vec<String>,
        records: impl IntoIterator<Item = Vec<Value>>,
    ) -> Self {
        let mut sheet = Self::new(name);
        sheet.columns = header;
        for record in records {
            let row: Row = sheet
                .columns
                .iter()
                .zip(record)
                .filter(|(column, cell)| !column.is_empty() && !is_empty_cell(cell))
                .map(|(column, cell)| (column.clone(), cell))
                .collect();
            // Trailing blank lines in spreadsheets come through as empty records.
            if !row.is_empty() {
                sheet.rows.push(row);
            }
        }
        sheet
    }

    /// Appends a row given as ordered cells; unseen columns are added in order.
    pub fn push(&mut self, cells: Vec<(String, Value)>) {
        let mut row = Row::new();
        for (column, value) in cells {
            if !self.columns.contains(&column) {
                self.columns.push(column.clone());
            }
            row.insert(column, value);
        }
        self.rows.push(row);
    }

    /// Returns the column names.
    #[must_use]
    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    /// Returns the rows.
    #[must_use]
    pub fn rows(&self) -> &[Row] {
        &self.rows
    }

    /// Returns the number of rows.
    #[must_use]
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// Returns whether the sheet has no rows.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Iterates over rows as cells aligned to [`Sheet::columns`].
    pub fn records(&self) -> impl Iterator<Item = Vec<Option<&Value>>> + '_ {
        self.rows
            .iter()
            .map(|row| self.columns.iter().map(|c| row.get(c)).collect())
    }

    /// Unflattens every row into a document.
    #[must_use]
    pub fn documents(&self) -> Vec<Value> {
        self.rows
            .iter()
            .map(|row| Value::Object(unflatten(row.iter().map(|(k, v)| (k.as_str(), v.clone())))))
            .collect()
    }
}

/// Renders a cell as text: strings as-is, other scalars in JSON notation.
#[must_use]
pub fn cell_text(cell: &Value) -> String {
    match cell {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

fn is_empty_cell(cell: &Value) -> bool {
    match cell {
        Value::Null => true,
        Value::String(s) => s.is_empty(),
        _ => false,
    }
}

/// Flattens a document into ordered `(column, scalar)` pairs.
///
/// Empty objects and arrays have no leaf and produce no column.
#[must_use]
pub fn flatten(document: &Map<String, Value>) -> Vec<(String, Value)> {
    let mut out = Vec::new();
    for (key, value) in document {
        flatten_into(key.clone(), value, &mut out);
    }
    out
}

fn flatten_into(prefix: String, value: &Value, out: &mut Vec<(String, Value)>) {
    match value {
        Value::Object(map) => {
            for (key, nested) in map {
                flatten_into(format!("{prefix}{KEY_SEPARATOR}{key}"), nested, out);
            }
        },
        Value::Array(items) => {
            for (i, nested) in items.iter().enumerate() {
                flatten_into(format!("{prefix}{KEY_SEPARATOR}{i}"), nested, out);
            }
        },
        scalar => out.push((prefix, scalar.clone())),
    }
}

/// Rebuilds a nested document from flattened pairs.
///
/// When a column and a longer column share a prefix (`a` and `a.b`), the
/// nested one wins.
#[must_use]
pub fn unflatten<'a>(cells: impl IntoIterator<Item = (&'a str, Value)>) -> Map<String, Value> {
    let mut root = Map::new();
    for (column, value) in cells {
        let mut parts = column.split(KEY_SEPARATOR).peekable();
        let mut node = &mut root;
        while let Some(part) = parts.next() {
            if parts.peek().is_none() {
                if !node.get(part).is_some_and(Value::is_object) {
                    node.insert(part.to_string(), value);
                }
                break;
            }
            let slot = node
                .entry(part.to_string())
                .or_insert_with(|| Value::Object(Map::new()));
            if !slot.is_object() {
                *slot = Value::Object(Map::new());
            }
            let Value::Object(next) = slot else {
                break;
            };
            node = next;
        }
    }
    root.into_iter()
        .map(|(k, v)| (k, restore_arrays(v)))
        .collect()
}

/// Converts maps keyed exactly `0..n` back into arrays, recursively.
fn restore_arrays(value: Value) -> Value {
    match value {
        Value::Object(map) => {
            let map: Map<String, Value> = map
                .into_iter()
                .map(|(k, v)| (k, restore_arrays(v)))
                .collect();
            if is_index_keyed(&map) {
                let mut items: Vec<(usize, Value)> = map
                    .into_iter()
                    .filter_map(|(k, v)| k.parse().ok().map(|i| (i, v)))
                    .collect();
                items.sort_by_key(|(i, _)| *i);
                Value::Array(items.into_iter().map(|(_, v)| v).collect())
            } else {
                Value::Object(map)
            }
        },
        other => other,
    }
}

fn is_index_keyed(map: &Map<String, Value>) -> bool {
    if map.is_empty() {
        return false;
    }
    let indices: HashSet<usize> = map
        .keys()
        .filter(|k| k.as_str() == "0" || !k.starts_with('0'))
        .filter_map(|k| k.parse().ok())
        .collect();
    indices.len() == map.len() && (0..map.len()).all(|i| indices.contains(&i))
}
