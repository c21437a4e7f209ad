//! Firestore REST backend.
//!
//! Talks to the Firestore v1 REST API with a blocking HTTP client. Points at
//! the local emulator when an emulator host is configured.

use super::traits::{DocumentStore, StoredDocument, WriteOp};
use super::wire::{WireFields, document_from_wire, document_to_wire};
use crate::models::{Document, FieldValue, path};
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Page size for listing calls.
const PAGE_SIZE: u32 = 300;

/// Firestore connection settings.
#[derive(Debug, Clone, Default)]
pub struct FirestoreConfig {
    /// Google Cloud project ID.
    pub project_id: String,
    /// Database ID. Defaults to `(default)`.
    pub database: Option<String>,
    /// Emulator `host:port`.
    pub emulator_host: Option<String>,
    /// OAuth2 bearer token.
    pub access_token: Option<String>,
    /// Request timeout in milliseconds. Zero disables it.
    pub timeout_ms: u64,
}

/// Firestore REST backend.
pub struct FirestoreStore {
    client: reqwest::blocking::Client,
    endpoint: String,
    /// `projects/{p}/databases/{d}/documents`
    documents_root: String,
    token: Option<String>,
}

impl FirestoreStore {
    /// Production API endpoint.
    pub const DEFAULT_ENDPOINT: &'static str = "https://firestore.googleapis.com/v1";

    /// Creates a client for the configured project.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidInput`] when no project ID is configured.
    pub fn new(config: &FirestoreConfig) -> Result<Self> {
        if config.project_id.is_empty() {
            return Err(Error::InvalidInput(
                "Firestore project ID not set (FIRESTORE_PROJECT_ID or store.project_id)"
                    .to_string(),
            ));
        }
        let database = config.database.as_deref().unwrap_or("(default)");
        let (endpoint, token) = config.emulator_host.as_ref().map_or_else(
            || (Self::DEFAULT_ENDPOINT.to_string(), config.access_token.clone()),
            |host| (format!("http://{host}/v1"), Some("owner".to_string())),
        );

        let mut builder = reqwest::blocking::Client::builder();
        if config.timeout_ms > 0 {
            builder = builder.timeout(Duration::from_millis(config.timeout_ms));
        }
        let client = builder.build().unwrap_or_else(|err| {
            tracing::warn!("Failed to build Firestore HTTP client: {err}");
            reqwest::blocking::Client::new()
        });

        Ok(Self {
            client,
            endpoint,
            documents_root: format!(
                "projects/{}/databases/{database}/documents",
                config.project_id
            ),
            token,
        })
    }

    /// Returns the resource name of a document.
    fn resource_name(&self, document_path: &str) -> String {
        format!("{}/{document_path}", self.documents_root)
    }

    fn url(&self, suffix: &str) -> String {
        if suffix.is_empty() {
            format!("{}/{}", self.endpoint, self.documents_root)
        } else {
            format!("{}/{}/{suffix}", self.endpoint, self.documents_root)
        }
    }

    fn send<T: for<'de> Deserialize<'de>>(
        &self,
        operation: &str,
        request: reqwest::blocking::RequestBuilder,
    ) -> Result<T> {
        let request = match &self.token {
            Some(token) => request.bearer_auth(token),
            None => request,
        };
        let response = request.send().map_err(|e| Error::OperationFailed {
            operation: operation.to_string(),
            cause: e.to_string(),
        })?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().unwrap_or_default();
            return Err(Error::OperationFailed {
                operation: operation.to_string(),
                cause: format!("API returned status: {status} - {body}"),
            });
        }

        response.json().map_err(|e| Error::OperationFailed {
            operation: operation.to_string(),
            cause: e.to_string(),
        })
    }

    fn list_collection_ids(&self, parent: &str) -> Result<Vec<String>> {
        let url = if parent.is_empty() {
            format!("{}:listCollectionIds", self.url(""))
        } else {
            format!("{}:listCollectionIds", self.url(parent))
        };
        let mut ids = Vec::new();
        let mut page_token: Option<String> = None;
        loop {
            let body = ListCollectionIdsRequest {
                page_size: PAGE_SIZE,
                page_token: page_token.take(),
            };
            let page: ListCollectionIdsResponse =
                self.send("list_collection_ids", self.client.post(&url).json(&body))?;
            ids.extend(page.collection_ids);
            match page.next_page_token.filter(|t| !t.is_empty()) {
                Some(token) => page_token = Some(token),
                None => break,
            }
        }
        ids.sort();
        Ok(ids
            .into_iter()
            .map(|id| path::join(if parent.is_empty() { path::ROOT } else { parent }, &id))
            .collect())
    }
}

impl DocumentStore for FirestoreStore {
    fn name(&self) -> &'static str {
        "firestore"
    }

    fn list_root_collections(&self) -> Result<Vec<String>> {
        self.list_collection_ids("")
    }

    fn list_documents(&self, collection_path: &str) -> Result<Vec<StoredDocument>> {
        let collection_path = path::normalize(collection_path);
        let url = self.url(&collection_path);
        let mut documents = Vec::new();
        let mut page_token = String::new();
        loop {
            let request = self.client.get(&url).query(&[
                ("pageSize", PAGE_SIZE.to_string()),
                ("pageToken", page_token.clone()),
            ]);
            let page: ListDocumentsResponse = self.send("list_documents", request)?;
            for doc in page.documents {
                let relative = doc
                    .name
                    .strip_prefix(&self.documents_root)
                    .unwrap_or(&doc.name)
                    .to_string();
                let fields = document_from_wire(doc.fields, &self.documents_root)?;
                documents.push(StoredDocument::new(&relative, fields));
            }
            match page.next_page_token.filter(|t| !t.is_empty()) {
                Some(token) => page_token = token,
                None => break,
            }
        }
        Ok(documents)
    }

    fn list_subcollections(&self, document_path: &str) -> Result<Vec<String>> {
        self.list_collection_ids(&path::normalize(document_path))
    }

    fn commit(&self, writes: &[WriteOp]) -> Result<()> {
        if writes.is_empty() {
            return Ok(());
        }
        let writes = writes
            .iter()
            .map(|op| self.to_write(op))
            .collect::<Result<Vec<_>>>()?;
        let _: serde_json::Value = self.send(
            "commit_batch",
            self.client
                .post(format!("{}:commit", self.url("")))
                .json(&CommitRequest { writes }),
        )?;
        Ok(())
    }
}

impl FirestoreStore {
    fn to_write(&self, op: &WriteOp) -> Result<Write> {
        let target = path::normalize(op.path());
        if !path::is_document_path(&target) {
            return Err(Error::InvalidInput(format!("not a document path: {target}")));
        }
        let name = self.resource_name(&target);
        Ok(match op {
            WriteOp::Delete { .. } => Write {
                delete: Some(name),
                update: None,
                update_mask: None,
            },
            WriteOp::Set {
                fields, merge, ..
            } => Write {
                delete: None,
                update_mask: merge.then(|| UpdateMask {
                    field_paths: field_mask(fields),
                }),
                update: Some(ApiDocument {
                    name,
                    fields: document_to_wire(fields, &self.documents_root),
                }),
            },
        })
    }
}

/// Collects the leaf field paths of a document for a merge mask.
///
/// Nested maps contribute their leaves; an empty map is a leaf itself.
#[must_use]
pub fn field_mask(document: &Document) -> Vec<String> {
    fn walk(prefix: Option<&str>, document: &Document, out: &mut Vec<String>) {
        for (key, value) in document {
            let segment = quote_field_name(key);
            let full = prefix.map_or_else(|| segment.clone(), |p| format!("{p}.{segment}"));
            match value {
                FieldValue::Map(nested) if !nested.is_empty() => walk(Some(&full), nested, out),
                _ => out.push(full),
            }
        }
    }
    let mut out = Vec::new();
    walk(None, document, &mut out);
    out
}

/// Quotes a field name for use in a field path when it is not a simple
/// identifier.
fn quote_field_name(name: &str) -> String {
    let simple = name
        .chars()
        .next()
        .is_some_and(|c| c.is_ascii_alphabetic() || c == '_')
        && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_');
    if simple {
        name.to_string()
    } else {
        format!("`{}`", name.replace('\\', "\\\\").replace('`', "\\`"))
    }
}

#[derive(Debug, Deserialize)]
struct ApiDocumentIn {
    name: String,
    #[serde(default)]
    fields: WireFields,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ListDocumentsResponse {
    #[serde(default)]
    documents: Vec<ApiDocumentIn>,
    next_page_token: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ListCollectionIdsRequest {
    page_size: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    page_token: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ListCollectionIdsResponse {
    #[serde(default)]
    collection_ids: Vec<String>,
    next_page_token: Option<String>,
}

#[derive(Debug, Serialize)]
struct ApiDocument {
    name: String,
    fields: WireFields,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct UpdateMask {
    field_paths: Vec<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct Write {
    #[serde(skip_serializing_if = "Option::is_none")]
    update: Option<ApiDocument>,
    #[serde(skip_serializing_if = "Option::is_none")]
    delete: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    update_mask: Option<UpdateMask>,
}

#[derive(Debug, Serialize)]
struct CommitRequest {
    writes: Vec<Write>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn store() -> FirestoreStore {
        FirestoreStore::new(&FirestoreConfig {
            project_id: "demo".to_string(),
            emulator_host: Some("localhost:8080".to_string()),
            ..FirestoreConfig::default()
        })
        .unwrap()
    }

    #[test]
    fn test_requires_project_id() {
        assert!(FirestoreStore::new(&FirestoreConfig::default()).is_err());
    }

    #[test]
    fn test_emulator_endpoint() {
        let store = store();
        assert_eq!(
            store.url("users"),
            "http://localhost:8080/v1/projects/demo/databases/(default)/documents/users"
        );
        assert_eq!(store.token.as_deref(), Some("owner"));
    }

    #[test]
    fn test_field_mask_leaves() {
        let mut inner = Document::new();
        inner.insert("city".to_string(), "Oslo".into());
        let mut doc = Document::new();
        doc.insert("address".to_string(), FieldValue::Map(inner));
        doc.insert("name".to_string(), "Ada".into());
        doc.insert("first-name".to_string(), "Ada".into());
        doc.insert("empty".to_string(), FieldValue::Map(Document::new()));

        assert_eq!(
            field_mask(&doc),
            vec!["address.city", "empty", "`first-name`", "name"]
        );
    }

    #[test]
    fn test_write_serialization() {
        let store = store();
        let mut fields = Document::new();
        fields.insert("n".to_string(), FieldValue::Integer(1));
        let write = store
            .to_write(&WriteOp::Set {
                path: "users/u1".to_string(),
                fields,
                merge: true,
            })
            .unwrap();
        assert_eq!(
            serde_json::to_value(&write).unwrap(),
            json!({
                "update": {
                    "name": "projects/demo/databases/(default)/documents/users/u1",
                    "fields": {"n": {"integerValue": "1"}}
                },
                "updateMask": {"fieldPaths": ["n"]}
            })
        );

        let delete = store
            .to_write(&WriteOp::Delete {
                path: "users/u1".to_string(),
            })
            .unwrap();
        assert_eq!(
            serde_json::to_value(&delete).unwrap(),
            json!({"delete": "projects/demo/databases/(default)/documents/users/u1"})
        );
    }

    #[test]
    fn test_write_rejects_collection_path() {
        let store = store();
        assert!(store.to_write(&WriteOp::Delete { path: "users".to_string() }).is_err());
    }
}
