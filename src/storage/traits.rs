//! The document database seam.

use crate::Result;
use crate::models::{Document, path};
use uuid::Uuid;

/// Characters used in generated document IDs.
const AUTO_ID_ALPHABET: &[u8; 62] =
    b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789";

/// Length of generated document IDs.
pub const AUTO_ID_LENGTH: usize = 20;

/// A document read from the database.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredDocument {
    /// Document ID, the last path segment.
    pub id: String,
    /// Full normalized document path.
    pub path: String,
    /// Field values.
    pub fields: Document,
}

impl StoredDocument {
    /// Creates a stored document from its full path.
    #[must_use]
    pub fn new(document_path: &str, fields: Document) -> Self {
        let path = path::normalize(document_path);
        Self {
            id: path::last_segment(&path).to_string(),
            path,
            fields,
        }
    }
}

/// A single write inside an atomic batch.
#[derive(Debug, Clone, PartialEq)]
pub enum WriteOp {
    /// Create or overwrite a document. With `merge`, nested maps are merged
    /// into the existing document instead of replacing it.
    Set {
        /// Document path.
        path: String,
        /// Field values.
        fields: Document,
        /// Merge into an existing document.
        merge: bool,
    },
    /// Delete a document. Its sub-collections are left alone.
    Delete {
        /// Document path.
        path: String,
    },
}

impl WriteOp {
    /// Returns the target document path.
    #[must_use]
    pub fn path(&self) -> &str {
        match self {
            Self::Set { path, .. } | Self::Delete { path } => path,
        }
    }

    /// Returns whether this is a delete.
    #[must_use]
    pub const fn is_delete(&self) -> bool {
        matches!(self, Self::Delete { .. })
    }
}

/// Trait for document database backends.
///
/// Paths passed in and returned are normalized. Listing calls return results
/// ordered by path.
pub trait DocumentStore: Send + Sync {
    /// Returns the backend name for logging.
    fn name(&self) -> &'static str;

    /// Lists the top-level collection paths.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend cannot be read.
    fn list_root_collections(&self) -> Result<Vec<String>>;

    /// Lists the documents directly inside a collection.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend cannot be read.
    fn list_documents(&self, collection_path: &str) -> Result<Vec<StoredDocument>>;

    /// Lists the sub-collection paths directly beneath a document.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend cannot be read.
    fn list_subcollections(&self, document_path: &str) -> Result<Vec<String>>;

    /// Generates a fresh document ID.
    fn new_document_id(&self) -> String {
        auto_id()
    }

    /// Applies a batch of writes atomically.
    ///
    /// # Errors
    ///
    /// Returns an error if any write is rejected. No write is applied then.
    fn commit(&self, writes: &[WriteOp]) -> Result<()>;
}

/// Generates a 20 character alphanumeric document ID.
#[must_use]
pub fn auto_id() -> String {
    let base = AUTO_ID_ALPHABET.len() as u128;
    let mut id = String::with_capacity(AUTO_ID_LENGTH);
    for _ in 0..2 {
        let mut entropy = Uuid::new_v4().as_u128();
        for _ in 0..AUTO_ID_LENGTH / 2 {
            let index = usize::try_from(entropy % base).unwrap_or_default();
            id.push(char::from(AUTO_ID_ALPHABET[index]));
            entropy /= base;
        }
    }
    id
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_auto_id_shape() {
        let id = auto_id();
        assert_eq!(id.len(), AUTO_ID_LENGTH);
        assert!(id.chars().all(|c| c.is_ascii_alphanumeric()));
    }

    #[test]
    fn test_auto_id_unique() {
        let ids: HashSet<String> = (0..1000).map(|_| auto_id()).collect();
        assert_eq!(ids.len(), 1000);
    }

    #[test]
    fn test_stored_document_id_from_path() {
        let doc = StoredDocument::new("/users/u1/posts/p9/", Document::new());
        assert_eq!(doc.id, "p9");
        assert_eq!(doc.path, "users/u1/posts/p9");
    }

    #[test]
    fn test_write_op_path() {
        let op = WriteOp::Delete {
            path: "users/u1".to_string(),
        };
        assert_eq!(op.path(), "users/u1");
        assert!(op.is_delete());
    }
}
