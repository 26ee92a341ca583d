use std::path::{Path, PathBuf};

use caravel_config::{CaravelConfig, StorageBackend};
use caravel_contracts::records::Channel;

use crate::service::ActionService;

/// A service built from config, with its files in a temp dir.
pub(crate) struct TestRuntime {
    _dir: tempfile::TempDir,
    root: PathBuf,
    pub service: ActionService,
}

impl TestRuntime {
    pub fn new() -> Self {
        Self::build(|_| {})
    }

    pub fn sqlite() -> Self {
        Self::build(|config| config.storage.backend = StorageBackend::Sqlite)
    }

    pub fn with_channels(channels: Vec<Channel>) -> Self {
        Self::build(move |config| config.approval.trusted_channels = channels)
    }

    fn build(adjust: impl FnOnce(&mut CaravelConfig)) -> Self {
        let dir = tempfile::tempdir().unwrap();
        let mut config = CaravelConfig::default();
        config.storage.path = dir.path().join("caravel.db");
        config.artifacts.root = dir.path().join("artifacts_storage");
        adjust(&mut config);

        let service = ActionService::from_config(&config).unwrap();
        Self {
            root: config.artifacts.root,
            _dir: dir,
            service,
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}
