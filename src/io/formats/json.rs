//! JSON documents.

use crate::{Error, Result};
use serde_json::Value;
use std::io::{Read, Write};
use std::path::Path;

/// Reads one JSON value from a reader.
///
/// # Errors
///
/// Returns an error if the input is not valid JSON.
pub fn read_value<R: Read>(reader: R) -> Result<Value> {
    serde_json::from_reader(reader).map_err(|e| Error::OperationFailed {
        operation: "read_json".to_string(),
        cause: e.to_string(),
    })
}

/// Writes one JSON value, pretty printed, followed by a newline.
///
/// # Errors
///
/// Returns an error if writing fails.
pub fn write_value<W: Write>(mut writer: W, value: &Value) -> Result<()> {
    serde_json::to_writer_pretty(&mut writer, value)
        .map_err(|e| e.to_string())
        .and_then(|()| writeln!(writer).map_err(|e| e.to_string()))
        .and_then(|()| writer.flush().map_err(|e| e.to_string()))
        .map_err(|cause| Error::OperationFailed {
            operation: "write_json".to_string(),
            cause,
        })
}

/// Reads a JSON file.
///
/// # Errors
///
/// Returns an error if the file cannot be opened or parsed.
pub fn read_file(path: &Path) -> Result<Value> {
    read_value(super::open_file(path)?)
}

/// Writes a JSON file.
///
/// # Errors
///
/// Returns an error if the file cannot be written.
pub fn write_file(path: &Path, value: &Value) -> Result<()> {
    write_value(super::create_file(path)?, value)
}
