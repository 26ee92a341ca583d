//! The `artifact.store` action handler.
//!
//! Payload:
//!
//! ```json
//! {
//!   "type": "report",
//!   "filename": "summary.txt",
//!   "content_base64": "aGVsbG8=",
//!   "metadata": { "optional": true },
//!   "project_id": "optional, defaults to the thread's project",
//!   "thread_id": "optional, defaults to the action's thread",
//!   "action_id": "optional, defaults to the action itself"
//! }
//! ```
//!
//! Result data: `{"artifact_id": "...", "storage_path": "..."}`.

use std::sync::Arc;

use base64::{engine::general_purpose::STANDARD, Engine as _};
use serde::Deserialize;
use serde_json::{json, Value};

use caravel_contracts::{
    action::Action,
    execution::{HandlerError, HandlerResult},
    ids::{ActionId, ProjectId, ThreadId},
    records::NewArtifact,
};
use caravel_core::{ActionHandler, ArtifactStore, HandlerContext};

/// Type name the handler is registered under.
pub const ARTIFACT_STORE: &str = "artifact.store";

#[derive(Debug, Deserialize)]
struct StorePayload {
    #[serde(rename = "type")]
    artifact_type: String,
    filename: String,
    content_base64: String,
    #[serde(default)]
    metadata: Option<Value>,
    #[serde(default)]
    project_id: Option<ProjectId>,
    #[serde(default)]
    thread_id: Option<ThreadId>,
    #[serde(default)]
    action_id: Option<ActionId>,
}

/// Decodes the payload and stores it through an [`ArtifactStore`].
pub struct ArtifactStoreHandler {
    store: Arc<dyn ArtifactStore>,
}

impl ArtifactStoreHandler {
    pub fn new(store: Arc<dyn ArtifactStore>) -> Self {
        Self { store }
    }
}

impl ActionHandler for ArtifactStoreHandler {
    fn handle(&self, ctx: &HandlerContext<'_>, action: &Action) -> HandlerResult {
        let payload: StorePayload = serde_json::from_value(action.payload.clone())
            .map_err(|e| HandlerError::new(format!("invalid {ARTIFACT_STORE} payload: {e}")))?;

        let content = STANDARD
            .decode(payload.content_base64.as_bytes())
            .map_err(|e| HandlerError::new(format!("content_base64 is not valid base64: {e}")))?;

        let project_id = payload
            .project_id
            .or(ctx.project_id)
            .ok_or_else(|| HandlerError::new("no project_id given and the action's thread has none"))?;

        let artifact = self
            .store
            .create(NewArtifact {
                project_id,
                thread_id: Some(payload.thread_id.unwrap_or(action.thread_id)),
                action_id: Some(payload.action_id.unwrap_or(action.id)),
                artifact_type: payload.artifact_type,
                filename: payload.filename,
                metadata: payload.metadata.unwrap_or_else(|| json!({})),
                content,
            })
            .map_err(|e| HandlerError::new(e.to_string()))?;

        Ok(json!({
            "artifact_id": artifact.id.to_string(),
            "storage_path": artifact.storage_path,
        }))
    }
}
