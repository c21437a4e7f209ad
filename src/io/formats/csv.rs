//! CSV sheets.
//!
//! A single collection is one flat file. Several collections are an index
//! file, `<stem>.INDEX.csv`, plus one `<stem>.<sheet>.csv` per collection.

use crate::io::projector::INDEX_SHEET;
use crate::io::tabular::{Sheet, cell_text};
use crate::{Error, Result};
use serde_json::Value;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};

/// Reads a sheet from CSV. Every cell is read as a string.
///
/// # Errors
///
/// Returns an error if the input is not valid CSV.
pub fn read_sheet<R: Read>(reader: R, name: &str) -> Result<Sheet> {
    let mut csv_reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .from_reader(reader);

    let header: Vec<String> = csv_reader
        .headers()
        .map_err(|e| Error::operation("read_csv_header", e))?
        .iter()
        .map(ToString::to_string)
        .collect();

    let mut records = Vec::new();
    for record in csv_reader.records() {
        let record = record.map_err(|e| Error::operation("read_csv", e))?;
        records.push(
            record
                .iter()
                .map(|cell| Value::String(cell.to_string()))
                .collect(),
        );
    }
    Ok(Sheet::from_records(name, header, records))
}

/// Writes a sheet as CSV, header first.
///
/// # Errors
///
/// Returns an error if writing fails.
pub fn write_sheet<W: Write>(writer: W, sheet: &Sheet) -> Result<()> {
    let mut csv_writer = csv::Writer::from_writer(writer);
    csv_writer
        .write_record(sheet.columns())
        .map_err(|e| Error::operation("write_csv", e))?;
    for record in sheet.records() {
        let cells: Vec<String> = record
            .into_iter()
            .map(|cell| cell.map(cell_text).unwrap_or_default())
            .collect();
        csv_writer
            .write_record(&cells)
            .map_err(|e| Error::operation("write_csv", e))?;
    }
    csv_writer.flush().map_err(|e| Error::operation("write_csv", e))
}

/// Reads a sheet from a CSV file, named after the file stem.
///
/// # Errors
///
/// Returns an error if the file cannot be opened or parsed.
pub fn read_file(path: &Path) -> Result<Sheet> {
    let name = path
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or_default()
        .to_string();
    read_sheet(super::open_file(path)?, &name)
}

/// Writes a sheet to a CSV file.
///
/// # Errors
///
/// Returns an error if the file cannot be written.
pub fn write_file(path: &Path, sheet: &Sheet) -> Result<()> {
    write_sheet(super::create_file(path)?, sheet)
}

/// Returns whether the file is an index file (`*.INDEX.csv`).
#[must_use]
pub fn is_index_file(path: &Path) -> bool {
    path.file_name()
        .and_then(|n| n.to_str())
        .is_some_and(|n| n.ends_with(&format!("{INDEX_SHEET}.csv")))
}

/// Resolves a sheet file next to an index file by swapping the `INDEX`
/// component of the file name for the sheet name.
#[must_use]
pub fn sheet_file(index_path: &Path, sheet_name: &str) -> PathBuf {
    let file_name = index_path
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or_default();
    let mut parts: Vec<&str> = file_name.split('.').collect();
    let replaced = match parts.len() {
        0 | 1 => format!("{sheet_name}.csv"),
        n => {
            parts[n - 2] = sheet_name;
            parts.join(".")
        },
    };
    index_path.with_file_name(replaced)
}

fn output_stem(output: &Path) -> String {
    let stem = output
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("export");
    stem.strip_suffix(&format!(".{INDEX_SHEET}"))
        .unwrap_or(stem)
        .to_string()
}

/// Index file written for a multi-sheet export to `output`.
#[must_use]
pub fn index_path_for(output: &Path) -> PathBuf {
    output.with_file_name(format!("{}.{INDEX_SHEET}.csv", output_stem(output)))
}

/// Sheet file written for a multi-sheet export to `output`.
#[must_use]
pub fn sheet_path_for(output: &Path, sheet_name: &str) -> PathBuf {
    output.with_file_name(format!("{}.{sheet_name}.csv", output_stem(output)))
}
