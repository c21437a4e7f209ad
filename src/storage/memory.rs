//! In-memory document store.
//!
//! Holds every document in one ordered map keyed by path. Used by tests and
//! for dry runs against a throwaway database.

use super::traits::{DocumentStore, StoredDocument, WriteOp};
use crate::models::{Document, merge_documents, path};
use crate::{Error, Result};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::RwLock;
use std::sync::atomic::{AtomicUsize, Ordering};

/// In-memory document store.
#[derive(Debug, Default)]
pub struct MemoryStore {
    documents: RwLock<BTreeMap<String, Document>>,
    commits: AtomicUsize,
}

impl MemoryStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts a document directly, bypassing batches.
    ///
    /// # Errors
    ///
    /// Returns an error if the path is not a document path.
    pub fn insert(&self, document_path: &str, fields: Document) -> Result<()> {
        let document_path = checked_document_path(document_path)?;
        self.write_lock()?.insert(document_path, fields);
        Ok(())
    }

    /// Returns a copy of the document at the path.
    #[must_use]
    pub fn get(&self, document_path: &str) -> Option<Document> {
        self.documents
            .read()
            .ok()
            .and_then(|docs| docs.get(&path::normalize(document_path)).cloned())
    }

    /// Returns every stored document path.
    #[must_use]
    pub fn paths(&self) -> Vec<String> {
        self.documents
            .read()
            .map(|docs| docs.keys().cloned().collect())
            .unwrap_or_default()
    }

    /// Returns the number of stored documents.
    #[must_use]
    pub fn len(&self) -> usize {
        self.documents.read().map(|d| d.len()).unwrap_or(0)
    }

    /// Returns whether the store holds no documents.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns the number of committed batches.
    #[must_use]
    pub fn commit_count(&self) -> usize {
        self.commits.load(Ordering::Relaxed)
    }

    fn write_lock(&self) -> Result<std::sync::RwLockWriteGuard<'_, BTreeMap<String, Document>>> {
        self.documents.write().map_err(|_| Error::OperationFailed {
            operation: "memory_store_write".to_string(),
            cause: "Lock poisoned".to_string(),
        })
    }

    fn read_lock(&self) -> Result<std::sync::RwLockReadGuard<'_, BTreeMap<String, Document>>> {
        self.documents.read().map_err(|_| Error::OperationFailed {
            operation: "memory_store_read".to_string(),
            cause: "Lock poisoned".to_string(),
        })
    }
}

impl DocumentStore for MemoryStore {
    fn name(&self) -> &'static str {
        "memory"
    }

    fn list_root_collections(&self) -> Result<Vec<String>> {
        let docs = self.read_lock()?;
        let roots: BTreeSet<String> = docs
            .keys()
            .filter_map(|p| path::segments(p).next().map(str::to_string))
            .collect();
        Ok(roots.into_iter().collect())
    }

    fn list_documents(&self, collection_path: &str) -> Result<Vec<StoredDocument>> {
        let collection_path = path::normalize(collection_path);
        let depth = path::depth(&collection_path) + 1;
        let docs = self.read_lock()?;
        Ok(docs
            .iter()
            .filter(|(p, _)| {
                path::depth(p) == depth && path::parent(p).as_deref() == Some(collection_path.as_str())
            })
            .map(|(p, fields)| StoredDocument::new(p, fields.clone()))
            .collect())
    }

    fn list_subcollections(&self, document_path: &str) -> Result<Vec<String>> {
        let document_path = path::normalize(document_path);
        let depth = path::depth(&document_path);
        let docs = self.read_lock()?;
        let children: BTreeSet<String> = docs
            .keys()
            .filter(|p| path::depth(p) > depth + 1 && path::is_within(p, &document_path))
            .filter_map(|p| {
                path::segments(p)
                    .nth(depth)
                    .map(|name| path::join(&document_path, name))
            })
            .collect();
        Ok(children.into_iter().collect())
    }

    fn commit(&self, writes: &[WriteOp]) -> Result<()> {
        let targets = writes
            .iter()
            .map(|op| checked_document_path(op.path()))
            .collect::<Result<Vec<_>>>()?;

        let mut docs = self.write_lock()?;
        for (op, target) in writes.iter().zip(targets) {
            match op {
                WriteOp::Set {
                    fields,
                    merge: true,
                    ..
                } => merge_documents(docs.entry(target).or_default(), fields.clone()),
                WriteOp::Set { fields, .. } => {
                    docs.insert(target, fields.clone());
                },
                WriteOp::Delete { .. } => {
                    docs.remove(&target);
                },
            }
        }
        drop(docs);
        self.commits.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }
}

fn checked_document_path(document_path: &str) -> Result<String> {
    let normalized = path::normalize(document_path);
    if path::is_document_path(&normalized) {
        Ok(normalized)
    } else {
        Err(Error::InvalidInput(format!(
            "not a document path: {document_path}"
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::FieldValue;

    fn doc(name: &str) -> Document {
        let mut d = Document::new();
        d.insert("name".to_string(), FieldValue::from(name));
        d
    }

    fn seeded() -> MemoryStore {
        let store = MemoryStore::new();
        store.insert("users/u1", doc("Ada")).unwrap();
        store.insert("users/u2", doc("Alan")).unwrap();
        store.insert("users/u1/posts/p1", doc("hello")).unwrap();
        store.insert("users/u1/likes/l1", doc("like")).unwrap();
        store.insert("users2/x", doc("other")).unwrap();
        store
    }

    #[test]
    fn test_list_root_collections() {
        let store = seeded();
        assert_eq!(store.list_root_collections().unwrap(), vec!["users", "users2"]);
    }

    #[test]
    fn test_list_documents_only_direct_children() {
        let store = seeded();
        let docs = store.list_documents("users").unwrap();
        let ids: Vec<&str> = docs.iter().map(|d| d.id.as_str()).collect();
        assert_eq!(ids, vec!["u1", "u2"]);
        assert_eq!(docs[0].path, "users/u1");
    }

    #[test]
    fn test_list_subcollections() {
        let store = seeded();
        assert_eq!(
            store.list_subcollections("users/u1").unwrap(),
            vec!["users/u1/likes", "users/u1/posts"]
        );
        assert!(store.list_subcollections("users/u2").unwrap().is_empty());
    }

    #[test]
    fn test_commit_set_merge_delete() {
        let store = seeded();
        let mut patch = Document::new();
        patch.insert("age".to_string(), FieldValue::Integer(36));

        store
            .commit(&[
                WriteOp::Set {
                    path: "users/u1".to_string(),
                    fields: patch.clone(),
                    merge: true,
                },
                WriteOp::Set {
                    path: "users/u2".to_string(),
                    fields: patch,
                    merge: false,
                },
                WriteOp::Delete {
                    path: "users2/x".to_string(),
                },
            ])
            .unwrap();

        let u1 = store.get("users/u1").unwrap();
        assert_eq!(u1.len(), 2);
        let u2 = store.get("users/u2").unwrap();
        assert_eq!(u2.len(), 1);
        assert!(store.get("users2/x").is_none());
        assert_eq!(store.commit_count(), 1);
    }

    #[test]
    fn test_commit_rejects_collection_path_atomically() {
        let store = MemoryStore::new();
        let result = store.commit(&[
            WriteOp::Set {
                path: "a/b".to_string(),
                fields: Document::new(),
                merge: false,
            },
            WriteOp::Delete {
                path: "a".to_string(),
            },
        ]);
        assert!(result.is_err());
        assert!(store.is_empty());
        assert_eq!(store.commit_count(), 0);
    }
}
