//! Local filesystem artifact store.
//!
//! Bytes live under `<root>/artifacts/<project_id>/<artifact_id>/<filename>`;
//! metadata lives in the record store. `storage_path` is recorded relative
//! to `root`, so a root can be moved without rewriting rows.

use std::{
    fs,
    path::{Path, PathBuf},
    sync::Arc,
};

use chrono::Utc;
use tracing::{info, warn};

use caravel_contracts::{
    error::{CaravelError, CaravelResult},
    ids::ArtifactId,
    records::{Artifact, ArtifactFilter, NewArtifact},
};
use caravel_core::{ArtifactStore, RecordStore};

/// First path segment of every `storage_path`.
pub const ARTIFACTS_PREFIX: &str = "artifacts";

/// Artifact versions start here and nothing increments them yet.
pub const INITIAL_VERSION: u32 = 1;

pub struct FsArtifactStore {
    root: PathBuf,
    records: Arc<dyn RecordStore>,
}

impl FsArtifactStore {
    pub fn new(root: impl Into<PathBuf>, records: Arc<dyn RecordStore>) -> Self {
        Self {
            root: root.into(),
            records,
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn absolute(&self, storage_path: &str) -> PathBuf {
        self.root.join(storage_path)
    }

    /// Fail with `NotFound` unless every referenced row exists.
    fn check_references(&self, request: &NewArtifact) -> CaravelResult<()> {
        if self.records.project(&request.project_id)?.is_none() {
            return Err(CaravelError::not_found("project", request.project_id));
        }
        if let Some(thread_id) = request.thread_id {
            if self.records.thread(&thread_id)?.is_none() {
                return Err(CaravelError::not_found("thread", thread_id));
            }
        }
        if let Some(action_id) = request.action_id {
            if self.records.action(&action_id)?.is_none() {
                return Err(CaravelError::not_found("action", action_id));
            }
        }
        Ok(())
    }
}

impl std::fmt::Debug for FsArtifactStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FsArtifactStore")
            .field("root", &self.root)
            .finish_non_exhaustive()
    }
}

/// The final path component of `filename`, with either separator.
///
/// Rejects names that would escape the artifact directory.
pub fn safe_filename(filename: &str) -> CaravelResult<String> {
    let base = filename
        .rsplit(|c: char| c == '/' || c == '\\')
        .next()
        .unwrap_or_default()
        .trim();
    if base.is_empty() || base == "." || base == ".." {
        return Err(CaravelError::InvalidInput {
            reason: format!("unusable artifact filename '{filename}'"),
        });
    }
    Ok(base.to_string())
}

fn io_error(context: &str, path: &Path, e: std::io::Error) -> CaravelError {
    CaravelError::ArtifactIo {
        reason: format!("{context} {}: {e}", path.display()),
    }
}

impl ArtifactStore for FsArtifactStore {
    fn create(&self, request: NewArtifact) -> CaravelResult<Artifact> {
        if request.artifact_type.trim().is_empty() {
            return Err(CaravelError::InvalidInput {
                reason: "artifact type must not be empty".to_string(),
            });
        }
        let filename = safe_filename(&request.filename)?;
        self.check_references(&request)?;

        let id = ArtifactId::new();
        let storage_path = format!("{ARTIFACTS_PREFIX}/{}/{id}/{filename}", request.project_id);
        let path = self.absolute(&storage_path);

        if let Some(dir) = path.parent() {
            fs::create_dir_all(dir).map_err(|e| io_error("failed to create", dir, e))?;
        }
        fs::write(&path, &request.content).map_err(|e| io_error("failed to write", &path, e))?;

        let artifact = Artifact {
            id,
            project_id: request.project_id,
            thread_id: request.thread_id,
            action_id: request.action_id,
            artifact_type: request.artifact_type,
            storage_path,
            filename,
            metadata: request.metadata,
            version: INITIAL_VERSION,
            created_at: Utc::now(),
        };

        if let Err(e) = self.records.insert_artifact(&artifact) {
            if let Err(cleanup) = fs::remove_file(&path) {
                warn!(path = %path.display(), error = %cleanup, "orphaned artifact bytes");
            }
            return Err(e);
        }

        info!(
            artifact_id = %artifact.id,
            project_id = %artifact.project_id,
            bytes = request.content.len(),
            "artifact stored"
        );
        Ok(artifact)
    }

    fn get(&self, id: &ArtifactId) -> CaravelResult<Option<Artifact>> {
        self.records.artifact(id)
    }

    fn list(&self, filter: &ArtifactFilter) -> CaravelResult<Vec<Artifact>> {
        self.records.artifacts(filter)
    }

    fn read_bytes(&self, artifact: &Artifact) -> CaravelResult<Vec<u8>> {
        let path = self.absolute(&artifact.storage_path);
        fs::read(&path).map_err(|e| io_error("failed to read", &path, e))
    }
}
