//! # caravel-config
//!
//! TOML configuration for the caravel runtime and the [`ApprovalGate`]
//! built from its `[approval]` section.
//!
//! ```rust,ignore
//! use caravel_config::{ApprovalGate, CaravelConfig};
//!
//! let config = CaravelConfig::load(Some(Path::new("caravel.toml")))?;
//! let gate = ApprovalGate::from_config(&config.approval);
//! gate.check(Channel::Web)?;
//! ```

pub mod approval;
pub mod config;

pub use approval::ApprovalGate;
pub use config::{
    ApprovalConfig, ArtifactsConfig, CaravelConfig, LoggingConfig, StorageBackend, StorageConfig,
    ENV_ARTIFACTS_DIR, ENV_DB_PATH,
};
