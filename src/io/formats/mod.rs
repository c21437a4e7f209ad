//! File format adapters.
//!
//! JSON carries the labelled tree as-is. CSV and XLSX carry projected
//! sheets: CSV as one file per sheet, XLSX as one workbook.

pub mod csv;
pub mod json;
#[cfg(feature = "xlsx")]
pub mod xlsx;

use crate::{Error, Result};
use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::Path;
use std::str::FromStr;

/// Supported file formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Format {
    /// Labelled JSON tree.
    Json,
    /// Comma-separated sheets with an optional index file.
    Csv,
    /// Spreadsheet workbook with an index sheet.
    Xlsx,
}

impl Format {
    /// Returns the file extension for this format.
    #[must_use]
    pub const fn extension(&self) -> &'static str {
        match self {
            Self::Json => "json",
            Self::Csv => "csv",
            Self::Xlsx => "xlsx",
        }
    }

    /// Returns whether this format stores sheets rather than a tree.
    #[must_use]
    pub const fn is_tabular(&self) -> bool {
        matches!(self, Self::Csv | Self::Xlsx)
    }

    /// Detects format from file extension.
    ///
    /// # Errors
    ///
    /// Returns [`Error::UnsupportedFormat`] if the extension is not recognized.
    pub fn from_path(path: &Path) -> Result<Self> {
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_lowercase);

        match ext.as_deref() {
            Some(ext) => Self::from_str(ext),
            None => Err(Error::UnsupportedFormat(format!(
                "cannot determine format, file has no extension: {}",
                path.display()
            ))),
        }
    }

    /// Fails unless support for this format was compiled in.
    ///
    /// # Errors
    ///
    /// Returns [`Error::FeatureNotEnabled`] for XLSX without the `xlsx` feature.
    pub fn ensure_enabled(self) -> Result<Self> {
        if self == Self::Xlsx && !cfg!(feature = "xlsx") {
            return Err(Error::FeatureNotEnabled("xlsx".to_string()));
        }
        Ok(self)
    }
}

impl FromStr for Format {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "json" => Ok(Self::Json),
            "csv" => Ok(Self::Csv),
            "xlsx" => Ok(Self::Xlsx),
            other => Err(Error::UnsupportedFormat(format!(".{other}"))),
        }
    }
}

impl std::fmt::Display for Format {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.extension())
    }
}

/// Opens a file for buffered reading.
///
/// # Errors
///
/// Returns [`Error::NotFound`] for a missing file, otherwise
/// [`Error::OperationFailed`].
pub fn open_file(path: &Path) -> Result<BufReader<File>> {
    File::open(path).map(BufReader::new).map_err(|e| {
        if e.kind() == std::io::ErrorKind::NotFound {
            Error::NotFound(format!("file {}", path.display()))
        } else {
            Error::OperationFailed {
                operation: "open_file".to_string(),
                cause: format!("{}: {e}", path.display()),
            }
        }
    })
}

/// Creates (or truncates) a file for buffered writing, creating parent
/// directories as needed.
///
/// # Errors
///
/// Returns an error if the file cannot be created.
pub fn create_file(path: &Path) -> Result<BufWriter<File>> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).map_err(|e| Error::OperationFailed {
            operation: "create_output_dir".to_string(),
            cause: e.to_string(),
        })?;
    }
    File::create(path).map(BufWriter::new).map_err(|e| Error::OperationFailed {
        operation: "create_file".to_string(),
        cause: format!("{}: {e}", path.display()),
    })
}

/// Reads every sheet of an XLSX workbook.
///
/// # Errors
///
/// Returns [`Error::FeatureNotEnabled`] without the `xlsx` feature, or a
/// read error.
pub fn read_workbook(path: &Path) -> Result<Vec<crate::io::tabular::Sheet>> {
    #[cfg(feature = "xlsx")]
    {
        xlsx::read_file(path)
    }
    #[cfg(not(feature = "xlsx"))]
    {
        let _ = path;
        Err(Error::FeatureNotEnabled("xlsx".to_string()))
    }
}

/// Writes a projected workbook as XLSX.
///
/// # Errors
///
/// Returns [`Error::FeatureNotEnabled`] without the `xlsx` feature, or a
/// write error.
pub fn write_workbook(path: &Path, workbook: &crate::io::projector::Workbook) -> Result<()> {
    #[cfg(feature = "xlsx")]
    {
        xlsx::write_file(path, workbook)
    }
    #[cfg(not(feature = "xlsx"))]
    {
        let _ = (path, workbook);
        Err(Error::FeatureNotEnabled("xlsx".to_string()))
    }
}
