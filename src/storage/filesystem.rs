//! Filesystem document store.
//!
//! Lays the database out as a directory tree:
//!
//! ```text
//! <root>/users/u1/__document__.json
//! <root>/users/u1/posts/p1/__document__.json
//! ```
//!
//! A collection is a directory, a document is a directory holding a
//! `__document__.json` file with its fields in Firestore REST value JSON.
//! Sub-collections sit next to that file.
//!
//! # Security
//!
//! Every path segment is validated before it touches the filesystem, so a
//! crafted document ID cannot escape the root directory.

use super::traits::{DocumentStore, StoredDocument, WriteOp};
use super::wire::{WireFields, document_from_wire, document_to_wire};
use crate::models::{Document, merge_documents, path};
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// File holding a document's fields.
pub const DOCUMENT_FILE: &str = "__document__.json";

/// Maximum size of a document file (4 MiB).
/// Database documents are capped at 1 MiB; the JSON encoding is wordier.
const MAX_FILE_SIZE: u64 = 4 * 1024 * 1024;

#[derive(Debug, Default, Serialize, Deserialize)]
struct DocumentFile {
    #[serde(default)]
    fields: WireFields,
}

/// Filesystem document store.
#[derive(Debug)]
pub struct FilesystemStore {
    root: PathBuf,
}

impl FilesystemStore {
    /// Opens a store rooted at the directory, creating it if needed.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory cannot be created.
    pub fn with_create(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        fs::create_dir_all(&root).map_err(|e| Error::OperationFailed {
            operation: "create_store_dir".to_string(),
            cause: format!("{}: {e}", root.display()),
        })?;
        Ok(Self { root })
    }

    /// Returns the root directory.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Maps a database path onto a directory under the root.
    fn dir_for(&self, db_path: &str) -> Result<PathBuf> {
        let mut dir = self.root.clone();
        for segment in path::segments(db_path) {
            if !is_safe_segment(segment) {
                return Err(Error::InvalidInput(format!(
                    "path segment not allowed: {segment:?} in {db_path}"
                )));
            }
            dir.push(segment);
        }
        Ok(dir)
    }

    fn document_file(&self, document_path: &str) -> Result<PathBuf> {
        if !path::is_document_path(document_path) {
            return Err(Error::InvalidInput(format!(
                "not a document path: {document_path}"
            )));
        }
        Ok(self.dir_for(document_path)?.join(DOCUMENT_FILE))
    }

    fn read_document(file: &Path) -> Result<Option<Document>> {
        if !file.is_file() {
            return Ok(None);
        }
        let metadata = fs::metadata(file).map_err(|e| Error::OperationFailed {
            operation: "read_file_metadata".to_string(),
            cause: e.to_string(),
        })?;
        if metadata.len() > MAX_FILE_SIZE {
            return Err(Error::InvalidInput(format!(
                "document file exceeds maximum size of {MAX_FILE_SIZE} bytes: {}",
                file.display()
            )));
        }
        let raw = fs::read_to_string(file).map_err(|e| Error::OperationFailed {
            operation: "read_document_file".to_string(),
            cause: format!("{}: {e}", file.display()),
        })?;
        let stored: DocumentFile =
            serde_json::from_str(&raw).map_err(|e| Error::OperationFailed {
                operation: "deserialize_document".to_string(),
                cause: format!("{}: {e}", file.display()),
            })?;
        document_from_wire(stored.fields, "").map(Some)
    }

    fn write_document(file: &Path, fields: &Document) -> Result<()> {
        if let Some(dir) = file.parent() {
            fs::create_dir_all(dir).map_err(|e| Error::OperationFailed {
                operation: "create_document_dir".to_string(),
                cause: e.to_string(),
            })?;
        }
        let stored = DocumentFile {
            fields: document_to_wire(fields, ""),
        };
        let json = serde_json::to_string_pretty(&stored).map_err(|e| Error::OperationFailed {
            operation: "serialize_document".to_string(),
            cause: e.to_string(),
        })?;

        // Write then rename.
        let tmp = file.with_extension("json.tmp");
        fs::write(&tmp, json).map_err(|e| Error::OperationFailed {
            operation: "write_document_file".to_string(),
            cause: e.to_string(),
        })?;
        fs::rename(&tmp, file).map_err(|e| Error::OperationFailed {
            operation: "write_document_file".to_string(),
            cause: e.to_string(),
        })
    }

    fn delete_document(&self, file: &Path) -> Result<()> {
        if file.is_file() {
            fs::remove_file(file).map_err(|e| Error::OperationFailed {
                operation: "delete_document_file".to_string(),
                cause: e.to_string(),
            })?;
        }
        // Prune directories left empty, stopping at the root.
        let mut dir = file.parent();
        while let Some(d) = dir {
            if d == self.root || fs::remove_dir(d).is_err() {
                break;
            }
            dir = d.parent();
        }
        Ok(())
    }

    /// Lists sub-directory names of a directory, sorted.
    fn child_dirs(dir: &Path) -> Result<Vec<String>> {
        if !dir.is_dir() {
            return Ok(Vec::new());
        }
        let entries = fs::read_dir(dir).map_err(|e| Error::OperationFailed {
            operation: "read_dir".to_string(),
            cause: format!("{}: {e}", dir.display()),
        })?;
        let mut names: Vec<String> = entries
            .filter_map(std::result::Result::ok)
            .filter(|entry| entry.path().is_dir())
            .filter_map(|entry| entry.file_name().into_string().ok())
            .filter(|name| is_safe_segment(name))
            .collect();
        names.sort();
        Ok(names)
    }
}

impl DocumentStore for FilesystemStore {
    fn name(&self) -> &'static str {
        "filesystem"
    }

    fn list_root_collections(&self) -> Result<Vec<String>> {
        Self::child_dirs(&self.root)
    }

    fn list_documents(&self, collection_path: &str) -> Result<Vec<StoredDocument>> {
        let collection_path = path::normalize(collection_path);
        let dir = self.dir_for(&collection_path)?;
        let mut documents = Vec::new();
        for id in Self::child_dirs(&dir)? {
            if let Some(fields) = Self::read_document(&dir.join(&id).join(DOCUMENT_FILE))? {
                documents.push(StoredDocument::new(
                    &path::join(&collection_path, &id),
                    fields,
                ));
            }
        }
        Ok(documents)
    }

    fn list_subcollections(&self, document_path: &str) -> Result<Vec<String>> {
        let document_path = path::normalize(document_path);
        let dir = self.dir_for(&document_path)?;
        Ok(Self::child_dirs(&dir)?
            .into_iter()
            .map(|name| path::join(&document_path, &name))
            .collect())
    }

    fn commit(&self, writes: &[WriteOp]) -> Result<()> {
        // Resolve every target first so a bad path rejects the whole batch.
        let files = writes
            .iter()
            .map(|op| self.document_file(&path::normalize(op.path())))
            .collect::<Result<Vec<_>>>()?;

        for (op, file) in writes.iter().zip(&files) {
            match op {
                WriteOp::Set {
                    fields,
                    merge: true,
                    ..
                } => {
                    let mut current = Self::read_document(file)?.unwrap_or_default();
                    merge_documents(&mut current, fields.clone());
                    Self::write_document(file, &current)?;
                },
                WriteOp::Set { fields, .. } => Self::write_document(file, fields)?,
                WriteOp::Delete { .. } => self.delete_document(file)?,
            }
        }
        Ok(())
    }
}

/// Checks that a segment is a plain directory name.
fn is_safe_segment(segment: &str) -> bool {
    !segment.is_empty()
        && segment.len() <= 1500
        && segment != "."
        && segment != ".."
        && !(segment.starts_with("__") && segment.ends_with("__"))
        && !segment.contains(['\\', '\0'])
}
