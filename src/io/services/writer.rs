//! Tree writer.
//!
//! Writes a labelled collection tree into a [`DocumentStore`]: resolves
//! document IDs, peels labelled sub-collections off each document and
//! writes them beneath it, encodes the remaining fields and enqueues a set
//! into the shared batch. Optionally truncates each target collection first.

use super::batch::{BatchStats, BatchWriter};
use crate::codec::encode_document;
use crate::config::{DEFAULT_AUTO_ID, DEFAULT_ID_FIELD};
use crate::io::tabular::cell_text;
use crate::models::{CollectionPrefix, path};
use crate::storage::DocumentStore;
use crate::{Error, Result};
use serde_json::{Map, Value};
use std::collections::HashSet;
use std::sync::Arc;

/// Documents of one collection as they arrive from a file.
#[derive(Debug, Clone, PartialEq)]
pub enum CollectionData {
    /// Documents keyed by ID (JSON object form).
    Keyed(Map<String, Value>),
    /// Positional documents (JSON array or sheet rows).
    Array(Vec<Value>),
}

impl CollectionData {
    /// Interprets a JSON value as a collection.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidInput`] unless the value is an object or an array.
    pub fn from_value(collection_path: &str, value: Value) -> Result<Self> {
        match value {
            Value::Object(map) => Ok(Self::Keyed(map)),
            Value::Array(items) => Ok(Self::Array(items)),
            other => Err(Error::InvalidInput(format!(
                "collection '{collection_path}' must be an object or an array, found {}",
                json_type(&other)
            ))),
        }
    }

    /// Returns the number of documents.
    #[must_use]
    pub fn len(&self) -> usize {
        match self {
            Self::Keyed(map) => map.len(),
            Self::Array(items) => items.len(),
        }
    }

    /// Returns whether there are no documents.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Settings for a [`TreeWriter`].
#[derive(Debug, Clone)]
pub struct WriteOptions {
    /// Field consumed as the document ID when present.
    pub id_field: String,
    /// Key that requests a generated ID, compared case-insensitively.
    pub auto_id: String,
    /// Merge into existing documents instead of replacing them.
    pub merge: bool,
    /// Delete existing documents of each target collection first.
    pub truncate: bool,
    /// Label prefix for sub-collection keys.
    pub prefix: CollectionPrefix,
    /// Log every document path at info level.
    pub verbose: bool,
}

impl Default for WriteOptions {
    fn default() -> Self {
        Self {
            id_field: DEFAULT_ID_FIELD.to_string(),
            auto_id: DEFAULT_AUTO_ID.to_string(),
            merge: false,
            truncate: false,
            prefix: CollectionPrefix::default(),
            verbose: false,
        }
    }
}

/// Writes collection trees through a chunked batch.
pub struct TreeWriter {
    store: Arc<dyn DocumentStore>,
    batch: BatchWriter,
    options: WriteOptions,
    truncated: HashSet<String>,
}

impl TreeWriter {
    /// Creates a writer over the store, committing through `batch`.
    #[must_use]
    pub fn new(store: Arc<dyn DocumentStore>, batch: BatchWriter, options: WriteOptions) -> Self {
        Self {
            store,
            batch,
            options,
            truncated: HashSet::new(),
        }
    }

    /// Writes every document of a collection, truncating it first when
    /// enabled. Returns the number of documents enqueued at this level.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidInput`] for a root or document path, a
    /// non-object document or an invalid ID, and propagates store errors.
    pub fn write_collection(&mut self, collection_path: &str, data: CollectionData) -> Result<usize> {
        let collection_path = path::normalize(collection_path);
        if path::is_root(&collection_path) || !path::is_collection_path(&collection_path) {
            return Err(Error::InvalidInput(format!(
                "'{collection_path}' is not a collection path"
            )));
        }
        if self.options.truncate {
            self.truncate(&collection_path)?;
        }

        let count = data.len();
        match data {
            CollectionData::Keyed(map) => {
                for (key, document) in map {
                    self.write_document(&collection_path, Some(&key), document)?;
                }
            },
            CollectionData::Array(items) => {
                for document in items {
                    self.write_document(&collection_path, None, document)?;
                }
            },
        }
        Ok(count)
    }

    /// Writes one document and its labelled sub-collections. Returns the
    /// document path.
    ///
    /// Sub-collections are enqueued before the parent document.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidInput`] when the document is not an object,
    /// the ID is invalid or a field cannot be encoded.
    pub fn write_document(
        &mut self,
        collection_path: &str,
        key: Option<&str>,
        document: Value,
    ) -> Result<String> {
        let mut fields = match document {
            Value::Object(map) => map,
            other => {
                return Err(Error::InvalidInput(format!(
                    "document in '{collection_path}' must be an object, found {}",
                    json_type(&other)
                )));
            },
        };

        let id = self.resolve_id(collection_path, &mut fields, key)?;
        let document_path = path::join(collection_path, &id);

        let mut plain = Map::new();
        let mut subcollections = Vec::new();
        for (field, value) in fields {
            match self.options.prefix.strip(&field) {
                Some(name) => subcollections.push((path::join(&document_path, name), value)),
                None => {
                    plain.insert(field, value);
                },
            }
        }

        for (sub_path, value) in subcollections {
            let data = CollectionData::from_value(&sub_path, value)?;
            self.write_collection(&sub_path, data)?;
        }

        let encoded = encode_document(&plain)?;
        if self.options.verbose {
            tracing::info!(document = %document_path, "Writing document");
        } else {
            tracing::debug!(document = %document_path, "Writing document");
        }
        self.batch.set(document_path.clone(), encoded, self.options.merge)?;
        Ok(document_path)
    }

    /// Resolves the document ID: the ID field, then the object key, then a
    /// generated ID. The ID field is removed from the document.
    fn resolve_id(
        &self,
        collection_path: &str,
        fields: &mut Map<String, Value>,
        key: Option<&str>,
    ) -> Result<String> {
        let from_field = match fields.remove(&self.options.id_field) {
            Some(value @ (Value::Object(_) | Value::Array(_))) => {
                return Err(Error::InvalidInput(format!(
                    "field '{}' in '{collection_path}' must be a scalar, found {}",
                    self.options.id_field,
                    json_type(&value)
                )));
            },
            Some(value) => Some(cell_text(&value)),
            None => None,
        };

        let usable = |id: &str| !id.trim().is_empty() && !id.eq_ignore_ascii_case(&self.options.auto_id);
        let id = from_field
            .filter(|id| usable(id))
            .or_else(|| key.filter(|k| usable(k)).map(str::to_string))
            .unwrap_or_else(|| self.store.new_document_id());

        if id.contains(path::SEPARATOR) {
            return Err(Error::InvalidInput(format!(
                "document ID '{id}' in '{collection_path}' contains '{}'",
                path::SEPARATOR
            )));
        }
        Ok(id)
    }

    /// Deletes every document under the collection, deepest first. Each
    /// collection is truncated at most once per writer; collections
    /// reached while truncating count as truncated. Returns the number of
    /// deletes enqueued.
    ///
    /// # Errors
    ///
    /// Propagates store errors.
    pub fn truncate(&mut self, collection_path: &str) -> Result<usize> {
        let collection_path = path::normalize(collection_path);
        if !self.truncated.insert(collection_path.clone()) {
            tracing::debug!(collection = %collection_path, "Collection already truncated");
            return Ok(0);
        }

        let mut deleted = 0;
        for document in self.store.list_documents(&collection_path)? {
            for sub in self.store.list_subcollections(&document.path)? {
                deleted += self.truncate(&sub)?;
            }
            if self.options.verbose {
                tracing::info!(document = %document.path, "Deleting document");
            } else {
                tracing::debug!(document = %document.path, "Deleting document");
            }
            self.batch.delete(document.path)?;
            deleted += 1;
        }
        Ok(deleted)
    }

    /// Returns the counts so far.
    #[must_use]
    pub const fn stats(&self) -> BatchStats {
        self.batch.stats()
    }

    /// Flushes the batch and returns the final counts.
    ///
    /// # Errors
    ///
    /// Returns an error if the final commit fails.
    pub fn finish(self) -> Result<BatchStats> {
        self.batch.finish()
    }
}

const fn json_type(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Document, FieldValue};
    use crate::storage::{MemoryStore, StoredDocument, WriteOp};
    use serde_json::json;
    use std::sync::Mutex;

    fn writer_with(store: &Arc<MemoryStore>, chunk: usize, options: WriteOptions) -> TreeWriter {
        let store = Arc::clone(store) as Arc<dyn DocumentStore>;
        TreeWriter::new(Arc::clone(&store), BatchWriter::new(store, chunk), options)
    }

    fn writer(store: &Arc<MemoryStore>) -> TreeWriter {
        writer_with(store, 500, WriteOptions::default())
    }

    fn keyed(value: Value) -> CollectionData {
        CollectionData::from_value("test", value).unwrap()
    }

    #[test]
    fn test_keyed_documents_use_their_keys() {
        let store = Arc::new(MemoryStore::new());
        let mut w = writer(&store);
        w.write_collection("users", keyed(json!({"u1": {"name": "Ada"}, "u2": {"name": "Bob"}})))
            .unwrap();
        w.finish().unwrap();

        assert_eq!(store.paths(), vec!["users/u1", "users/u2"]);
        assert_eq!(
            store.get("users/u1").unwrap().get("name"),
            Some(&FieldValue::from("Ada"))
        );
    }

    #[test]
    fn test_id_field_wins_and_is_removed() {
        let store = Arc::new(MemoryStore::new());
        let mut w = writer(&store);
        w.write_collection("users", keyed(json!({"k": {"doc_id": "real", "name": "Ada"}})))
            .unwrap();
        w.finish().unwrap();

        let doc = store.get("users/real").unwrap();
        assert!(!doc.contains_key("doc_id"));
        assert!(store.get("users/k").is_none());
    }

    #[test]
    fn test_array_and_auto_id_get_generated_ids() {
        let store = Arc::new(MemoryStore::new());
        let mut w = writer(&store);
        w.write_collection("items", keyed(json!([{"n": 1}, {"n": 2}]))).unwrap();
        w.write_collection("more", keyed(json!({"auto-id": {"n": 3}}))).unwrap();
        w.finish().unwrap();

        let paths = store.paths();
        assert_eq!(paths.len(), 3);
        assert!(paths.iter().all(|p| !p.ends_with("auto-id")));
        assert!(paths.iter().all(|p| path::is_document_path(p)));
    }

    #[test]
    fn test_numeric_id_field() {
        let store = Arc::new(MemoryStore::new());
        let mut w = writer(&store);
        w.write_collection("items", keyed(json!([{"doc_id": 42, "n": 1}]))).unwrap();
        w.finish().unwrap();
        assert!(store.get("items/42").is_some());
    }

    #[test]
    fn test_id_with_separator_is_rejected() {
        let store = Arc::new(MemoryStore::new());
        let mut w = writer(&store);
        let err = w
            .write_collection("items", keyed(json!([{"doc_id": "a/b"}])))
            .unwrap_err();
        assert!(matches!(err, Error::InvalidInput(_)));
    }

    #[test]
    fn test_subcollections_written_beneath_parent_and_before_it() {
        let store = Arc::new(RecordingStore::default());
        let dyn_store = Arc::clone(&store) as Arc<dyn DocumentStore>;
        let mut w = TreeWriter::new(
            Arc::clone(&dyn_store),
            BatchWriter::new(dyn_store, 500),
            WriteOptions::default(),
        );
        w.write_collection(
            "users",
            keyed(json!({
                "u1": {
                    "name": "Ada",
                    "collection:posts": {"p1": {"title": "Hi"}}
                }
            })),
        )
        .unwrap();
        w.finish().unwrap();

        let ops = store.ops();
        let paths: Vec<&str> = ops.iter().map(WriteOp::path).collect();
        assert_eq!(paths, ["users/u1/posts/p1", "users/u1"]);
        let WriteOp::Set { fields, .. } = &ops[1] else {
            unreachable!()
        };
        assert!(!fields.contains_key("collection:posts"));
    }

    #[test]
    fn test_codec_runs_on_write() {
        let store = Arc::new(MemoryStore::new());
        let mut w = writer(&store);
        w.write_collection(
            "users",
            keyed(json!({"u1": {"active": r#"{"type":"bool","data":true}"#, "age": "36"}})),
        )
        .unwrap();
        w.finish().unwrap();

        let doc = store.get("users/u1").unwrap();
        assert_eq!(doc.get("active"), Some(&FieldValue::Boolean(true)));
        assert_eq!(doc.get("age"), Some(&FieldValue::Integer(36)));
    }

    #[test]
    fn test_rejects_document_path_and_scalar_documents() {
        let store = Arc::new(MemoryStore::new());
        let mut w = writer(&store);
        assert!(matches!(
            w.write_collection("users/u1", keyed(json!({}))),
            Err(Error::InvalidInput(_))
        ));
        assert!(matches!(
            w.write_collection("users", keyed(json!({"u1": 5}))),
            Err(Error::InvalidInput(_))
        ));
        assert!(matches!(
            CollectionData::from_value("users", json!("x")),
            Err(Error::InvalidInput(_))
        ));
    }

    #[test]
    fn test_truncate_deletes_leaves_first_and_once_per_path() {
        let store = Arc::new(RecordingStore::default());
        store.seed(&[
            "users/u1",
            "users/u1/posts/p1",
            "users/u2",
            "users/u2/posts/p2",
        ]);
        let dyn_store = Arc::clone(&store) as Arc<dyn DocumentStore>;
        let options = WriteOptions {
            truncate: true,
            ..WriteOptions::default()
        };
        let mut w = TreeWriter::new(Arc::clone(&dyn_store), BatchWriter::new(dyn_store, 500), options);

        assert_eq!(w.truncate("users").unwrap(), 4);
        assert_eq!(w.truncate("users").unwrap(), 0);
        assert_eq!(w.truncate("users/u1/posts").unwrap(), 0);
        w.finish().unwrap();

        let deletes: Vec<String> = store
            .ops()
            .iter()
            .filter(|op| op.is_delete())
            .map(|op| op.path().to_string())
            .collect();
        assert_eq!(
            deletes,
            ["users/u1/posts/p1", "users/u1", "users/u2/posts/p2", "users/u2"]
        );
    }

    #[test]
    fn test_truncate_then_write_replaces_collection() {
        let store = Arc::new(MemoryStore::new());
        store.insert("users/old", Document::new()).unwrap();
        store.insert("users/old/posts/p", Document::new()).unwrap();
        let options = WriteOptions {
            truncate: true,
            ..WriteOptions::default()
        };
        let mut w = writer_with(&store, 2, options);
        w.write_collection(
            "users",
            keyed(json!({"new": {"collection:posts": {"p": {"t": "x"}}}})),
        )
        .unwrap();
        let stats = w.finish().unwrap();

        assert_eq!(store.paths(), vec!["users/new", "users/new/posts/p"]);
        assert_eq!((stats.deleted, stats.written), (2, 2));
        assert_eq!(stats.commits, 2);
    }

    /// Store that records every committed operation in order.
    #[derive(Default)]
    struct RecordingStore {
        inner: MemoryStore,
        ops: Mutex<Vec<WriteOp>>,
    }

    impl RecordingStore {
        fn seed(&self, paths: &[&str]) {
            for p in paths {
                self.inner.insert(p, Document::new()).unwrap();
            }
        }

        fn ops(&self) -> Vec<WriteOp> {
            self.ops.lock().unwrap().clone()
        }
    }

    impl DocumentStore for RecordingStore {
        fn name(&self) -> &'static str {
            "recording"
        }

        fn list_root_collections(&self) -> Result<Vec<String>> {
            self.inner.list_root_collections()
        }

        fn list_documents(&self, collection_path: &str) -> Result<Vec<StoredDocument>> {
            self.inner.list_documents(collection_path)
        }

        fn list_subcollections(&self, document_path: &str) -> Result<Vec<String>> {
            self.inner.list_subcollections(document_path)
        }

        fn commit(&self, writes: &[WriteOp]) -> Result<()> {
            self.ops.lock().unwrap().extend_from_slice(writes);
            self.inner.commit(writes)
        }
    }
}
