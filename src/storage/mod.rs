//! Document database backends.
//!
//! Everything that reads or writes the database goes through
//! [`DocumentStore`]. Three backends ship with the crate:
//! - **Firestore**: the REST API, or the local emulator
//! - **Filesystem**: a directory tree of JSON files
//! - **Memory**: an in-process map, for tests and dry runs

mod filesystem;
mod firestore;
mod memory;
mod traits;
pub mod wire;

pub use filesystem::{DOCUMENT_FILE, FilesystemStore};
pub use firestore::{FirestoreConfig, FirestoreStore, field_mask};
pub use memory::MemoryStore;
pub use traits::{AUTO_ID_LENGTH, DocumentStore, StoredDocument, WriteOp, auto_id};

use crate::Result;
use crate::config::{StoreBackend, StoreConfig};
use std::sync::Arc;

/// Opens the backend selected by the store configuration.
///
/// # Errors
///
/// Returns an error if the backend cannot be initialized, e.g. a missing
/// project ID or an uncreatable data directory.
pub fn open_store(config: &StoreConfig) -> Result<Arc<dyn DocumentStore>> {
    let store: Arc<dyn DocumentStore> = match config.backend {
        StoreBackend::Memory => Arc::new(MemoryStore::new()),
        StoreBackend::Filesystem => Arc::new(FilesystemStore::with_create(&config.data_dir)?),
        StoreBackend::Firestore => Arc::new(FirestoreStore::new(&FirestoreConfig {
            project_id: config.project_id.clone().unwrap_or_default(),
            database: config.database.clone(),
            emulator_host: config.emulator_host.clone(),
            access_token: config.access_token.clone(),
            timeout_ms: config.timeout_ms,
        })?),
    };
    tracing::debug!(backend = store.name(), "Opened document store");
    Ok(store)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_open_memory_store() {
        let config = StoreConfig {
            backend: StoreBackend::Memory,
            ..StoreConfig::default()
        };
        assert_eq!(open_store(&config).unwrap().name(), "memory");
    }

    #[test]
    fn test_open_filesystem_store() {
        let dir = TempDir::new().unwrap();
        let config = StoreConfig {
            backend: StoreBackend::Filesystem,
            data_dir: dir.path().join("db"),
            ..StoreConfig::default()
        };
        assert_eq!(open_store(&config).unwrap().name(), "filesystem");
        assert!(dir.path().join("db").is_dir());
    }

    #[test]
    fn test_firestore_without_project_fails() {
        let config = StoreConfig {
            backend: StoreBackend::Firestore,
            project_id: None,
            ..StoreConfig::default()
        };
        assert!(open_store(&config).is_err());
    }
}
