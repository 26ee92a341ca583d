//! Runtime configuration schema.
//!
//! `CaravelConfig` is deserialized from TOML. Every section and field has a
//! default, so an empty document is a valid configuration:
//!
//! ```toml
//! [storage]
//! backend = "memory"          # or "sqlite"
//! path = "caravel.db"         # sqlite only
//!
//! [artifacts]
//! root = "artifacts_storage"
//!
//! [approval]
//! trusted_channels = ["web"]
//!
//! [logging]
//! filter = "warn"
//! ```
//!
//! Environment overrides are applied afterwards by [`CaravelConfig::apply_env`].

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::debug;

use caravel_contracts::{
    error::{CaravelError, CaravelResult},
    records::Channel,
};

/// Overrides `artifacts.root`.
pub const ENV_ARTIFACTS_DIR: &str = "ARTIFACTS_DIR";

/// Overrides `storage.path` and selects the sqlite backend.
pub const ENV_DB_PATH: &str = "CARAVEL_DB_PATH";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    #[default]
    Memory,
    Sqlite,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub backend: StorageBackend,
    /// Database file. Ignored by the memory backend.
    pub path: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: StorageBackend::Memory,
            path: PathBuf::from("caravel.db"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ArtifactsConfig {
    /// Directory under which artifact bytes are written.
    pub root: PathBuf,
}

impl Default for ArtifactsConfig {
    fn default() -> Self {
        Self {
            root: PathBuf::from("artifacts_storage"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ApprovalConfig {
    /// Channels approvals are accepted from. Everything else is denied.
    pub trusted_channels: Vec<Channel>,
}

impl Default for ApprovalConfig {
    fn default() -> Self {
        Self {
            trusted_channels: vec![Channel::Web],
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// `tracing_subscriber::EnvFilter` directive used when `RUST_LOG` is unset.
    pub filter: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            filter: "warn".to_string(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CaravelConfig {
    pub storage: StorageConfig,
    pub artifacts: ArtifactsConfig,
    pub approval: ApprovalConfig,
    pub logging: LoggingConfig,
}

impl CaravelConfig {
    /// Parse `s` as TOML.
    ///
    /// Returns `CaravelError::ConfigError` if the TOML is malformed or a value
    /// has the wrong shape (e.g. an unknown backend or channel).
    pub fn from_toml_str(s: &str) -> CaravelResult<Self> {
        toml::from_str(s).map_err(|e| CaravelError::ConfigError {
            reason: format!("failed to parse config TOML: {e}"),
        })
    }

    /// Read and parse the TOML file at `path`.
    pub fn from_file(path: &Path) -> CaravelResult<Self> {
        let contents = std::fs::read_to_string(path).map_err(|e| CaravelError::ConfigError {
            reason: format!("failed to read config file '{}': {e}", path.display()),
        })?;
        Self::from_toml_str(&contents)
    }

    /// Load from `path` if given, else defaults, then apply the process
    /// environment.
    pub fn load(path: Option<&Path>) -> CaravelResult<Self> {
        let config = match path {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };
        Ok(config.apply_env(|key| std::env::var(key).ok()))
    }

    /// Apply environment overrides read through `lookup`.
    ///
    /// Empty values are ignored.
    pub fn apply_env(mut self, lookup: impl Fn(&str) -> Option<String>) -> Self {
        let read = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(root) = read(ENV_ARTIFACTS_DIR) {
            debug!(root = %root, "artifacts root overridden from environment");
            self.artifacts.root = PathBuf::from(root);
        }
        if let Some(path) = read(ENV_DB_PATH) {
            debug!(path = %path, "sqlite storage selected from environment");
            self.storage.backend = StorageBackend::Sqlite;
            self.storage.path = PathBuf::from(path);
        }
        self
    }
}
