//! End-to-end export and import tests.
//!
//! Every test runs against an in-memory store and writes real files into a
//! temporary directory:
//! - JSON, CSV and XLSX round trips preserve every field type
//! - Sub-collections travel as labelled fields or as their own sheets
//! - Batching, dry run and truncation behave as documented

// Integration tests use expect/unwrap for simplicity - panics are acceptable in tests
#![allow(clippy::expect_used, clippy::unwrap_used)]

use chrono::DateTime;
use fire_migrate::io::{ExportOptions, ExportService, ImportOptions, ImportService};
use fire_migrate::io::formats::json;
use fire_migrate::storage::{DocumentStore, MemoryStore, StoredDocument, WriteOp};
use fire_migrate::{Document, Error, FieldValue, GeoPoint, Result};
use serde_json::{Value, json};
use std::path::Path;
use std::sync::{Arc, Mutex};
use tempfile::TempDir;

// ============================================================================
// Test Helpers
// ============================================================================

fn field_map(pairs: Vec<(&str, FieldValue)>) -> Document {
    pairs
        .into_iter()
        .map(|(k, v)| (k.to_string(), v))
        .collect()
}

/// A document holding one field of every special type.
fn rich_document(n: i64) -> Document {
    field_map(vec![
        ("name", FieldValue::from(format!("user {n}").as_str())),
        ("age", FieldValue::Integer(30 + n)),
        ("score", FieldValue::Double(0.5 + f64::from(u8::try_from(n).unwrap()))),
        ("active", FieldValue::Boolean(n % 2 == 0)),
        ("nothing", FieldValue::Null),
        (
            "joined",
            FieldValue::Timestamp(DateTime::from_timestamp_millis(1_700_000_000_123 + n).unwrap()),
        ),
        ("home", FieldValue::GeoPoint(GeoPoint::new(52.52, 13.405))),
        ("manager", FieldValue::Reference("users/u0".to_string())),
        (
            "address",
            FieldValue::Map(field_map(vec![
                ("city", FieldValue::from("Berlin")),
                ("zip", FieldValue::Integer(10_115)),
            ])),
        ),
        (
            "tags",
            FieldValue::Array(vec![FieldValue::from("a"), FieldValue::Boolean(true)]),
        ),
    ])
}

fn seeded_store() -> Arc<MemoryStore> {
    let store = MemoryStore::new();
    for n in 1..=3 {
        store.insert(&format!("users/u{n}"), rich_document(n)).unwrap();
    }
    store
        .insert("users/u1/posts/p1", field_map(vec![("title", FieldValue::from("Hello"))]))
        .unwrap();
    store
        .insert("users/u2/posts/p2", field_map(vec![("title", FieldValue::from("World"))]))
        .unwrap();
    store
        .insert(
            "users/u1/posts/p1/comments/c1",
            field_map(vec![("text", FieldValue::from("Nice"))]),
        )
        .unwrap();
    store
        .insert("teams/t1", field_map(vec![("name", FieldValue::from("Core"))]))
        .unwrap();
    Arc::new(store)
}

fn as_dyn(store: &Arc<MemoryStore>) -> Arc<dyn DocumentStore> {
    Arc::clone(store) as Arc<dyn DocumentStore>
}

fn export(store: &Arc<MemoryStore>, path: &Path, collections: &[&str]) {
    let collections: Vec<String> = collections.iter().map(ToString::to_string).collect();
    ExportService::new(as_dyn(store))
        .export_to_file(path, &collections, &ExportOptions::default())
        .unwrap();
}

fn import(
    store: &Arc<MemoryStore>,
    path: &Path,
    collections: &[&str],
    options: &ImportOptions,
) -> Result<fire_migrate::io::ImportResult> {
    let collections: Vec<String> = collections.iter().map(ToString::to_string).collect();
    ImportService::new(as_dyn(store)).import_from_file(path, &collections, options)
}

fn assert_same_documents(expected: &MemoryStore, actual: &MemoryStore) {
    assert_eq!(expected.paths(), actual.paths());
    for path in expected.paths() {
        assert_eq!(expected.get(&path), actual.get(&path), "document {path}");
    }
}

/// Store that records every committed operation in order.
#[derive(Default)]
struct RecordingStore {
    inner: MemoryStore,
    batches: Mutex<Vec<Vec<WriteOp>>>,
}

impl RecordingStore {
    fn deletes(&self) -> Vec<String> {
        self.batches
            .lock()
            .unwrap()
            .iter()
            .flatten()
            .filter(|op| op.is_delete())
            .map(|op| op.path().to_string())
            .collect()
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
        self.batches.lock().unwrap().push(writes.to_vec());
        self.inner.commit(writes)
    }
}

// ============================================================================
// Export
// ============================================================================

#[test]
fn test_export_users_to_json() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("users.json");
    let store = seeded_store();
    let result = ExportService::new(as_dyn(&store))
        .export_to_file(
            &path,
            &["users".to_string()],
            &ExportOptions::default().with_subcollections(false),
        )
        .unwrap();

    assert_eq!(result.documents, 3);
    let written = json::read_file(&path).unwrap();
    let users = written["collection:users"].as_object().unwrap();
    assert_eq!(written.as_object().unwrap().len(), 1);
    assert_eq!(
        users.keys().collect::<Vec<_>>(),
        ["u1", "u2", "u3"]
    );
    assert_eq!(users["u1"]["name"], json!("user 1"));
    assert_eq!(users["u1"]["age"], json!(r#"{"type":"number","data":31}"#));
    assert_eq!(users["u2"]["active"], json!(r#"{"type":"bool","data":true}"#));
    assert_eq!(users["u1"]["nothing"], json!(r#"{"type":"null"}"#));
}

#[test]
fn test_export_labels_subcollections() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("users.json");
    export(&seeded_store(), &path, &["users"]);

    let written = json::read_file(&path).unwrap();
    let posts = &written["collection:users"]["u1"]["collection:posts"];
    assert_eq!(posts["p1"]["title"], json!("Hello"));
    assert_eq!(
        posts["p1"]["collection:comments"]["c1"]["text"],
        json!("Nice")
    );
    assert!(written["collection:users"]["u3"].get("collection:posts").is_none());
}

#[test]
fn test_export_empty_collection_fails() {
    let dir = TempDir::new().unwrap();
    let err = ExportService::new(as_dyn(&seeded_store()))
        .export_to_file(
            &dir.path().join("x.json"),
            &["usres".to_string()],
            &ExportOptions::default(),
        )
        .unwrap_err();
    assert!(matches!(err, Error::NotFound(_)));
}

#[test]
fn test_export_csv_writes_index_and_sheets() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("dump.csv");
    export(&seeded_store(), &path, &["/"]);

    let index = std::fs::read_to_string(dir.path().join("dump.INDEX.csv")).unwrap();
    let lines: Vec<&str> = index.lines().collect();
    assert_eq!(lines[0], "Sheet Name,Collection,Depth,Documents");
    assert_eq!(lines[1], "teams_1,teams,1,1");
    assert_eq!(lines[2], "users_2,users,1,3");
    assert_eq!(lines[3], "posts_3,users/u1/posts,3,1");
    assert_eq!(lines[4], "posts_4,users/u2/posts,3,1");
    assert_eq!(lines[5], "comments_5,users/u1/posts/p1/comments,5,1");
    assert!(dir.path().join("dump.users_2.csv").exists());

    let users = std::fs::read_to_string(dir.path().join("dump.users_2.csv")).unwrap();
    assert!(users.starts_with("doc_id,"));
    assert!(users.contains("address.city"));
    assert!(users.contains("tags.0"));
}

// ============================================================================
// Round trips
// ============================================================================

#[test]
fn test_json_round_trip() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("dump.json");
    let source = seeded_store();
    export(&source, &path, &[]);

    let target = Arc::new(MemoryStore::new());
    let result = import(&target, &path, &[], &ImportOptions::default()).unwrap();

    assert_eq!(result.written, source.len());
    assert_same_documents(&source, &target);
}

#[test]
fn test_csv_round_trip() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("dump.csv");
    let source = seeded_store();
    export(&source, &path, &[]);

    let target = Arc::new(MemoryStore::new());
    import(&target, &dir.path().join("dump.INDEX.csv"), &["/"], &ImportOptions::default())
        .unwrap();
    assert_same_documents(&source, &target);
}

#[cfg(feature = "xlsx")]
#[test]
fn test_xlsx_round_trip() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("dump.xlsx");
    let source = seeded_store();
    export(&source, &path, &[]);

    let target = Arc::new(MemoryStore::new());
    import(&target, &path, &[], &ImportOptions::default()).unwrap();
    assert_same_documents(&source, &target);
}

#[cfg(feature = "xlsx")]
#[test]
fn test_xlsx_import_selected_subtree() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("dump.xlsx");
    export(&seeded_store(), &path, &[]);

    let target = Arc::new(MemoryStore::new());
    import(&target, &path, &["users/u1/posts"], &ImportOptions::default()).unwrap();
    assert_eq!(
        target.paths(),
        ["users/u1/posts/p1", "users/u1/posts/p1/comments/c1"]
    );
}

#[test]
fn test_json_import_into_renamed_collection() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("people.json");
    std::fs::write(
        &path,
        r#"[{"doc_id": "ada", "name": "Ada"}, {"doc_id": "Auto-ID", "name": "Anon"}]"#,
    )
    .unwrap();

    let target = Arc::new(MemoryStore::new());
    import(&target, &path, &["people"], &ImportOptions::default()).unwrap();

    let paths = target.paths();
    assert_eq!(paths.len(), 2);
    assert!(paths.contains(&"people/ada".to_string()));
    assert!(paths.iter().all(|p| p.starts_with("people/")));
}

// ============================================================================
// Batching and dry run
// ============================================================================

fn write_items_csv(path: &Path, rows: usize) {
    let mut text = String::from("doc_id,n\n");
    for i in 0..rows {
        text.push_str(&format!("item{i},{i}\n"));
    }
    std::fs::write(path, text).unwrap();
}

#[test]
fn test_single_sheet_csv_one_commit() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("items.csv");
    write_items_csv(&path, 500);

    let target = Arc::new(MemoryStore::new());
    let result = import(&target, &path, &["items"], &ImportOptions::default().with_chunk(500)).unwrap();

    assert_eq!(result.commits, 1);
    assert_eq!(result.written, 500);
    assert_eq!(target.commit_count(), 1);
    assert_eq!(
        target.get("items/item7").unwrap().get("n"),
        Some(&FieldValue::Integer(7))
    );
}

#[test]
fn test_chunking_commits() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("items.csv");
    write_items_csv(&path, 5);

    let target = Arc::new(MemoryStore::new());
    let result = import(&target, &path, &["items"], &ImportOptions::default().with_chunk(2)).unwrap();
    assert_eq!(result.commits, 3);
    assert_eq!(target.len(), 5);
}

#[test]
fn test_dry_run_writes_nothing() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("items.csv");
    write_items_csv(&path, 10);

    let target = Arc::new(MemoryStore::new());
    let result = import(
        &target,
        &path,
        &["items"],
        &ImportOptions::default().with_chunk(3).with_dry_run(true),
    )
    .unwrap();

    assert_eq!(result.commits, 0);
    assert_eq!(result.written, 10);
    assert!(target.is_empty());
}

#[test]
fn test_single_sheet_csv_rejects_ambiguous_targets() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("items.csv");
    write_items_csv(&path, 1);
    let target = Arc::new(MemoryStore::new());

    assert!(matches!(
        import(&target, &path, &["a", "b"], &ImportOptions::default()),
        Err(Error::InvalidInput(_))
    ));
    assert!(matches!(
        import(&target, &path, &[], &ImportOptions::default()),
        Err(Error::InvalidInput(_))
    ));
}

// ============================================================================
// Truncate
// ============================================================================

#[test]
fn test_truncate_deletes_leaves_first_once_per_path() {
    let store = Arc::new(RecordingStore::default());
    for p in ["users/u1", "users/u1/posts/p1", "users/u2", "users/u2/posts/p2"] {
        store.inner.insert(p, Document::new()).unwrap();
    }

    let dir = TempDir::new().unwrap();
    let path = dir.path().join("users.json");
    std::fs::write(
        &path,
        json!({
            "collection:users": {
                "u1": {"name": "Ada", "collection:posts": {"p9": {"t": "new"}}},
                "u3": {"name": "Cy"}
            }
        })
        .to_string(),
    )
    .unwrap();

    let service = ImportService::new(Arc::clone(&store) as Arc<dyn DocumentStore>);
    let result = service
        .import_from_file(
            &path,
            &["users".to_string(), "users/u1/posts".to_string()],
            &ImportOptions::default().with_truncate(true),
        )
        .unwrap();

    assert_eq!(
        store.deletes(),
        ["users/u1/posts/p1", "users/u1", "users/u2/posts/p2", "users/u2"]
    );
    assert_eq!(result.deleted, 4);
    assert_eq!(result.written, 3);
    assert_eq!(
        store.inner.paths(),
        ["users/u1", "users/u1/posts/p9", "users/u3"]
    );
}

#[test]
fn test_unsupported_extension() {
    let target = Arc::new(MemoryStore::new());
    let err = import(&target, Path::new("dump.txt"), &[], &ImportOptions::default()).unwrap_err();
    assert!(matches!(err, Error::UnsupportedFormat(_)));
}

#[test]
fn test_missing_file() {
    let dir = TempDir::new().unwrap();
    let target = Arc::new(MemoryStore::new());
    let err = import(
        &target,
        &dir.path().join("absent.json"),
        &["x"],
        &ImportOptions::default(),
    )
    .unwrap_err();
    assert!(matches!(err, Error::NotFound(_)));
}

#[test]
fn test_json_value_shape_is_validated() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("bad.json");
    std::fs::write(&path, Value::from(5).to_string()).unwrap();
    let target = Arc::new(MemoryStore::new());
    assert!(matches!(
        import(&target, &path, &["x"], &ImportOptions::default()),
        Err(Error::InvalidInput(_))
    ));
}

// ============================================================================
// Filesystem backend
// ============================================================================

#[test]
fn test_filesystem_store_round_trip() {
    use fire_migrate::storage::FilesystemStore;

    let dir = TempDir::new().unwrap();
    let exported = dir.path().join("first.json");
    export(&seeded_store(), &exported, &[]);

    let fs_store: Arc<dyn DocumentStore> =
        Arc::new(FilesystemStore::with_create(dir.path().join("db")).unwrap());
    ImportService::new(Arc::clone(&fs_store))
        .import_from_file(&exported, &[], &ImportOptions::default())
        .unwrap();

    let again = dir.path().join("second.json");
    ExportService::new(fs_store)
        .export_to_file(&again, &[], &ExportOptions::default())
        .unwrap();

    assert_eq!(json::read_file(&exported).unwrap(), json::read_file(&again).unwrap());
}
