//! Configuration management.
//!
//! Settings come from three layers, later ones winning: built-in defaults,
//! a TOML config file, then environment variables. Command-line flags are
//! applied on top by the CLI.
//!
//! ```toml
//! [store]
//! backend = "firestore"
//! project_id = "my-project"
//! emulator_host = "localhost:8080"
//!
//! [import]
//! id_field = "doc_id"
//! chunk = 250
//!
//! [export]
//! include_subcollections = true
//!
//! [logging]
//! level = "info"
//! format = "json"
//! ```

use crate::{Error, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Default name of the document ID field/column.
pub const DEFAULT_ID_FIELD: &str = "doc_id";

/// Default sentinel key that asks for a generated document ID.
pub const DEFAULT_AUTO_ID: &str = "Auto-ID";

/// Largest number of writes the database accepts in one atomic batch.
pub const MAX_CHUNK: usize = 500;

/// Clamps a batch chunk size to `1..=MAX_CHUNK`.
#[must_use]
pub fn clamp_chunk(chunk: usize) -> usize {
    chunk.clamp(1, MAX_CHUNK)
}

/// Main configuration for fire-migrate.
#[derive(Debug, Clone, Default)]
pub struct MigrateConfig {
    /// Database backend settings.
    pub store: StoreConfig,
    /// Import defaults.
    pub import: ImportDefaults,
    /// Export defaults.
    pub export: ExportDefaults,
    /// Logging settings.
    pub logging: LoggingSettings,
}

/// Which database backend to talk to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StoreBackend {
    /// Firestore REST API or emulator.
    #[default]
    Firestore,
    /// Directory of JSON files.
    Filesystem,
    /// In-process map, discarded on exit.
    Memory,
}

impl StoreBackend {
    /// Parses a backend name.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "firestore" | "firebase" => Some(Self::Firestore),
            "filesystem" | "fs" | "file" => Some(Self::Filesystem),
            "memory" | "mem" => Some(Self::Memory),
            _ => None,
        }
    }
}

/// Database backend settings.
#[derive(Debug, Clone)]
pub struct StoreConfig {
    /// Selected backend.
    pub backend: StoreBackend,
    /// Root directory for the filesystem backend.
    pub data_dir: PathBuf,
    /// Firestore project ID.
    pub project_id: Option<String>,
    /// Firestore database ID.
    pub database: Option<String>,
    /// Firestore emulator `host:port`.
    pub emulator_host: Option<String>,
    /// OAuth2 bearer token for the Firestore API.
    pub access_token: Option<String>,
    /// HTTP request timeout in milliseconds.
    pub timeout_ms: u64,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            backend: StoreBackend::default(),
            data_dir: PathBuf::from(".fire-migrate"),
            project_id: None,
            database: None,
            emulator_host: None,
            access_token: None,
            timeout_ms: 30_000,
        }
    }
}

/// Defaults for the `import` command.
#[derive(Debug, Clone)]
pub struct ImportDefaults {
    /// Field holding the document ID.
    pub id_field: String,
    /// Key that requests a generated ID.
    pub auto_id: String,
    /// Batch chunk size, already clamped.
    pub chunk: usize,
    /// Label prefix for sub-collection keys.
    pub collection_prefix: String,
    /// Merge into existing documents instead of replacing them.
    pub merge: bool,
}

impl Default for ImportDefaults {
    fn default() -> Self {
        Self {
            id_field: DEFAULT_ID_FIELD.to_string(),
            auto_id: DEFAULT_AUTO_ID.to_string(),
            chunk: MAX_CHUNK,
            collection_prefix: crate::models::DEFAULT_COLLECTION_PREFIX.to_string(),
            merge: false,
        }
    }
}

/// Defaults for the `export` command.
#[derive(Debug, Clone)]
pub struct ExportDefaults {
    /// Name of the document ID column.
    pub id_field: String,
    /// Label prefix for sub-collection keys.
    pub collection_prefix: String,
    /// Descend into sub-collections.
    pub include_subcollections: bool,
    /// Maximum store calls in flight while exporting.
    pub concurrency: usize,
}

impl Default for ExportDefaults {
    fn default() -> Self {
        Self {
            id_field: DEFAULT_ID_FIELD.to_string(),
            collection_prefix: crate::models::DEFAULT_COLLECTION_PREFIX.to_string(),
            include_subcollections: true,
            concurrency: 1,
        }
    }
}

/// Logging settings from the config file.
#[derive(Debug, Clone, Default)]
pub struct LoggingSettings {
    /// Filter directive, e.g. `info` or `fire_migrate=debug`.
    pub level: Option<String>,
    /// `pretty` or `json`.
    pub format: Option<String>,
    /// Append logs to this file instead of stderr.
    pub file: Option<PathBuf>,
}

/// Configuration file structure (for TOML parsing).
#[derive(Debug, Deserialize, Default)]
pub struct ConfigFile {
    /// Store section.
    pub store: Option<ConfigFileStore>,
    /// Import section.
    pub import: Option<ConfigFileImport>,
    /// Export section.
    pub export: Option<ConfigFileExport>,
    /// Logging section.
    pub logging: Option<ConfigFileLogging>,
}

/// Store section in config file.
#[derive(Debug, Deserialize, Default)]
pub struct ConfigFileStore {
    /// Backend name.
    pub backend: Option<String>,
    /// Filesystem backend root.
    pub data_dir: Option<String>,
    /// Firestore project ID.
    pub project_id: Option<String>,
    /// Firestore database ID.
    pub database: Option<String>,
    /// Emulator host.
    pub emulator_host: Option<String>,
    /// Bearer token.
    pub access_token: Option<String>,
    /// Request timeout.
    pub timeout_ms: Option<u64>,
}

/// Import section in config file.
#[derive(Debug, Deserialize, Default)]
pub struct ConfigFileImport {
    /// ID field.
    pub id_field: Option<String>,
    /// Auto-ID sentinel.
    pub auto_id: Option<String>,
    /// Chunk size.
    pub chunk: Option<usize>,
    /// Collection prefix.
    pub collection_prefix: Option<String>,
    /// Merge mode.
    pub merge: Option<bool>,
}

/// Export section in config file.
#[derive(Debug, Deserialize, Default)]
pub struct ConfigFileExport {
    /// ID column.
    pub id_field: Option<String>,
    /// Collection prefix.
    pub collection_prefix: Option<String>,
    /// Include sub-collections.
    pub include_subcollections: Option<bool>,
    /// Fetch concurrency.
    pub concurrency: Option<usize>,
}

/// Logging section in config file.
#[derive(Debug, Deserialize, Default)]
pub struct ConfigFileLogging {
    /// Filter directive.
    pub level: Option<String>,
    /// Output format.
    pub format: Option<String>,
    /// Log file.
    pub file: Option<String>,
}

impl MigrateConfig {
    /// Creates a new configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Parses configuration from TOML text.
    ///
    /// # Errors
    ///
    /// Returns an error if the text is not valid configuration TOML.
    pub fn from_toml(contents: &str) -> Result<Self> {
        let file: ConfigFile = toml::from_str(contents).map_err(|e| Error::OperationFailed {
            operation: "parse_config_file".to_string(),
            cause: e.to_string(),
        })?;
        Self::from_config_file(file)
    }

    /// Loads configuration from a file path.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn load_from_file(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path).map_err(|e| Error::OperationFailed {
            operation: "read_config_file".to_string(),
            cause: format!("{}: {e}", path.display()),
        })?;
        Self::from_toml(&contents)
    }

    /// Loads configuration from the default location.
    ///
    /// Checks the following paths in order:
    /// 1. Platform-specific config dir (`~/Library/Application Support/fire-migrate/` on macOS)
    /// 2. XDG config dir (`~/.config/fire-migrate/` for Unix compatibility)
    ///
    /// Returns default configuration if no config file is found.
    #[must_use]
    pub fn load_default() -> Self {
        let Some(base_dirs) = directories::BaseDirs::new() else {
            return Self::default();
        };

        let candidates = [
            base_dirs.config_dir().join("fire-migrate").join("config.toml"),
            base_dirs
                .home_dir()
                .join(".config")
                .join("fire-migrate")
                .join("config.toml"),
        ];
        for candidate in &candidates {
            if !candidate.exists() {
                continue;
            }
            match Self::load_from_file(candidate) {
                Ok(config) => return config,
                Err(e) => tracing::warn!("Ignoring config file {}: {e}", candidate.display()),
            }
        }

        Self::default()
    }

    /// Resolves configuration: an explicit path, then `FIRE_MIGRATE_CONFIG_PATH`,
    /// then the default locations. Environment overrides are applied last.
    ///
    /// # Errors
    ///
    /// Returns an error if an explicitly named config file cannot be loaded.
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        let from_env = std::env::var("FIRE_MIGRATE_CONFIG_PATH")
            .ok()
            .filter(|p| !p.is_empty())
            .map(PathBuf::from);
        let config = match explicit.map(Path::to_path_buf).or(from_env) {
            Some(path) => Self::load_from_file(&path)?,
            None => Self::load_default(),
        };
        Ok(config.with_env_overrides())
    }

    /// Applies environment variable overrides.
    #[must_use]
    pub fn with_env_overrides(self) -> Self {
        self.with_overrides_from(|key| std::env::var(key).ok())
    }

    /// Applies overrides from an arbitrary variable lookup.
    #[must_use]
    pub fn with_overrides_from(mut self, lookup: impl Fn(&str) -> Option<String>) -> Self {
        let var = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(v) = var("FIRE_MIGRATE_STORE") {
            match StoreBackend::parse(&v) {
                Some(backend) => self.store.backend = backend,
                None => tracing::warn!("Unknown FIRE_MIGRATE_STORE value: {v}"),
            }
        }
        if let Some(v) = var("FIRE_MIGRATE_DATA_DIR") {
            self.store.data_dir = PathBuf::from(v);
        }
        if let Some(v) = var("FIRESTORE_PROJECT_ID").or_else(|| var("GOOGLE_CLOUD_PROJECT")) {
            self.store.project_id = Some(v);
        }
        if let Some(v) = var("FIRESTORE_EMULATOR_HOST") {
            self.store.emulator_host = Some(v);
        }
        if let Some(v) = var("FIRESTORE_ACCESS_TOKEN") {
            self.store.access_token = Some(v);
        }
        self
    }

    /// Converts a `ConfigFile` to `MigrateConfig`.
    fn from_config_file(file: ConfigFile) -> Result<Self> {
        let mut config = Self::default();

        if let Some(store) = file.store {
            if let Some(backend) = store.backend {
                config.store.backend = StoreBackend::parse(&backend).ok_or_else(|| {
                    Error::InvalidInput(format!("unknown store backend: {backend}"))
                })?;
            }
            if let Some(data_dir) = store.data_dir {
                config.store.data_dir = PathBuf::from(data_dir);
            }
            if let Some(timeout_ms) = store.timeout_ms {
                config.store.timeout_ms = timeout_ms;
            }
            config.store.project_id = store.project_id;
            config.store.database = store.database;
            config.store.emulator_host = store.emulator_host;
            config.store.access_token = store.access_token;
        }
        if let Some(import) = file.import {
            if let Some(v) = import.id_field {
                config.import.id_field = v;
            }
            if let Some(v) = import.auto_id {
                config.import.auto_id = v;
            }
            if let Some(v) = import.chunk {
                config.import.chunk = clamp_chunk(v);
            }
            if let Some(v) = import.collection_prefix {
                config.import.collection_prefix = v;
            }
            if let Some(v) = import.merge {
                config.import.merge = v;
            }
        }
        if let Some(export) = file.export {
            if let Some(v) = export.id_field {
                config.export.id_field = v;
            }
            if let Some(v) = export.collection_prefix {
                config.export.collection_prefix = v;
            }
            if let Some(v) = export.include_subcollections {
                config.export.include_subcollections = v;
            }
            if let Some(v) = export.concurrency {
                config.export.concurrency = v.max(1);
            }
        }
        if let Some(logging) = file.logging {
            config.logging.level = logging.level;
            config.logging.format = logging.format;
            config.logging.file = logging.file.map(PathBuf::from);
        }

        Ok(config)
    }
}
