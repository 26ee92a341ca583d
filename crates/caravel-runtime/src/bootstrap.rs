//! Builds an [`ActionService`] from a [`CaravelConfig`].

use std::sync::Arc;

use tracing::info;

use caravel_artifacts::{ArtifactStoreHandler, FsArtifactStore, ARTIFACT_STORE};
use caravel_config::{ApprovalGate, CaravelConfig, StorageBackend, StorageConfig};
use caravel_contracts::error::CaravelResult;
use caravel_core::{ActionEngine, ArtifactStore, ExecutorRegistry, RecordStore};
use caravel_store::{MemoryStore, SqliteStore};

use crate::service::ActionService;

/// Open the record store the config selects.
pub fn open_record_store(config: &StorageConfig) -> CaravelResult<Arc<dyn RecordStore>> {
    match config.backend {
        StorageBackend::Memory => Ok(Arc::new(MemoryStore::new())),
        StorageBackend::Sqlite => Ok(Arc::new(SqliteStore::open(&config.path)?)),
    }
}

/// The built-in handlers plus `artifact.store` bound to `artifacts`.
pub fn default_registry(artifacts: Arc<dyn ArtifactStore>) -> ExecutorRegistry {
    let mut registry = ExecutorRegistry::with_builtins();
    registry.register(ARTIFACT_STORE, ArtifactStoreHandler::new(artifacts));
    registry
}

impl ActionService {
    pub fn from_config(config: &CaravelConfig) -> CaravelResult<Self> {
        let records = open_record_store(&config.storage)?;
        let artifacts: Arc<dyn ArtifactStore> =
            Arc::new(FsArtifactStore::new(config.artifacts.root.clone(), Arc::clone(&records)));
        let registry = default_registry(Arc::clone(&artifacts));
        let gate = ApprovalGate::from_config(&config.approval);

        info!(
            backend = ?config.storage.backend,
            artifacts_root = %config.artifacts.root.display(),
            handlers = registry.list_handlers().len(),
            "action service ready"
        );

        let engine = ActionEngine::new(records, Arc::new(registry));
        Ok(Self::new(engine, artifacts, gate))
    }
}
