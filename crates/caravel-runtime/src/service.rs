//! `ActionService`: the surface an API layer talks to.
//!
//! Thin record CRUD plus the engine operations. The only rule that lives
//! here rather than in the engine is the approval channel gate, which runs
//! before the engine sees an approval.

use std::sync::Arc;

use serde_json::Value;
use tracing::info;

use caravel_audit::{AuditEvent, AuditFilter};
use caravel_config::ApprovalGate;
use caravel_contracts::{
    action::{Action, NewAction},
    error::{CaravelError, CaravelResult},
    ids::{ActionId, ArtifactId, ProjectId, ThreadId},
    records::{Artifact, ArtifactFilter, Channel, Message, Project, Role, Thread},
};
use caravel_core::{ActionEngine, ArtifactStore, RecordStore};

#[derive(Clone)]
pub struct ActionService {
    engine: ActionEngine,
    artifacts: Arc<dyn ArtifactStore>,
    gate: ApprovalGate,
}

impl ActionService {
    pub fn new(engine: ActionEngine, artifacts: Arc<dyn ArtifactStore>, gate: ApprovalGate) -> Self {
        Self {
            engine,
            artifacts,
            gate,
        }
    }

    pub fn engine(&self) -> &ActionEngine {
        &self.engine
    }

    pub fn records(&self) -> &Arc<dyn RecordStore> {
        self.engine.store()
    }

    pub fn gate(&self) -> &ApprovalGate {
        &self.gate
    }

    // ── Projects, threads, messages ───────────────────────────────────────────

    /// Fails with `AlreadyExists` if `slug` is taken.
    pub fn create_project(&self, slug: &str, name: &str, settings: Value) -> CaravelResult<Project> {
        require("slug", slug)?;
        require("name", name)?;
        let project = Project::new(slug.trim(), name, settings);
        self.records().insert_project(&project)?;
        info!(project_id = %project.id, slug = %project.slug, "project created");
        Ok(project)
    }

    pub fn get_project(&self, id: &ProjectId) -> CaravelResult<Project> {
        self.records()
            .project(id)?
            .ok_or_else(|| CaravelError::not_found("project", id))
    }

    /// Fails with `NotFound` if the project does not exist.
    pub fn create_thread(&self, project_id: &ProjectId, title: &str, tags: Value) -> CaravelResult<Thread> {
        require("title", title)?;
        let thread = Thread::new(*project_id, title, tags);
        self.records().insert_thread(&thread)?;
        info!(thread_id = %thread.id, project_id = %project_id, "thread created");
        Ok(thread)
    }

    pub fn get_thread(&self, id: &ThreadId) -> CaravelResult<Thread> {
        self.records()
            .thread(id)?
            .ok_or_else(|| CaravelError::not_found("thread", id))
    }

    pub fn post_message(
        &self,
        thread_id: &ThreadId,
        channel: Channel,
        role: Role,
        content: &str,
        meta: Value,
    ) -> CaravelResult<Message> {
        let message = Message::new(*thread_id, channel, role, content, meta);
        self.records().insert_message(&message)?;
        Ok(message)
    }

    /// Oldest first. Fails with `NotFound` if the thread does not exist.
    pub fn list_messages(&self, thread_id: &ThreadId) -> CaravelResult<Vec<Message>> {
        self.get_thread(thread_id)?;
        self.records().messages_for_thread(thread_id)
    }

    // ── Actions ───────────────────────────────────────────────────────────────

    /// Returns the action and whether this call created it (`false` on an
    /// idempotent replay).
    pub fn create_action(&self, request: NewAction) -> CaravelResult<(Action, bool)> {
        self.engine.create_action(request)
    }

    pub fn get_action(&self, id: &ActionId) -> CaravelResult<Action> {
        self.engine.get_action(id)
    }

    /// Oldest first.
    pub fn list_actions(&self, thread_id: &ThreadId) -> CaravelResult<Vec<Action>> {
        self.engine.list_actions(thread_id)
    }

    /// Checks the channel against the approval gate, then approves.
    ///
    /// An untrusted channel fails with `ChannelNotAllowed` whatever state the
    /// action is in, and nothing is written.
    pub fn approve_action(&self, id: &ActionId, approved_by: &str, channel: Channel) -> CaravelResult<Action> {
        self.gate.check(channel)?;
        self.engine.approve_action(id, approved_by)
    }

    pub fn cancel_action(&self, id: &ActionId, actor: &str) -> CaravelResult<Action> {
        self.engine.cancel_action(id, actor)
    }

    pub fn execute_action(&self, id: &ActionId) -> CaravelResult<Action> {
        self.engine.execute_action(id)
    }

    pub fn list_handlers(&self) -> Vec<String> {
        self.engine.list_handlers()
    }

    // ── Audit ─────────────────────────────────────────────────────────────────

    pub fn list_audit(&self, filter: &AuditFilter) -> CaravelResult<Vec<AuditEvent>> {
        self.records().audit_events(filter)
    }

    pub fn verify_audit_chain(&self) -> CaravelResult<bool> {
        self.records().verify_audit_chain()
    }

    // ── Artifacts ─────────────────────────────────────────────────────────────

    /// Newest first.
    pub fn list_artifacts(&self, filter: &ArtifactFilter) -> CaravelResult<Vec<Artifact>> {
        self.artifacts.list(filter)
    }

    pub fn get_artifact(&self, id: &ArtifactId) -> CaravelResult<Artifact> {
        self.artifacts
            .get(id)?
            .ok_or_else(|| CaravelError::not_found("artifact", id))
    }

    pub fn read_artifact(&self, artifact: &Artifact) -> CaravelResult<Vec<u8>> {
        self.artifacts.read_bytes(artifact)
    }
}

impl std::fmt::Debug for ActionService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ActionService")
            .field("engine", &self.engine)
            .field("gate", &self.gate)
            .finish_non_exhaustive()
    }
}

fn require(field: &str, value: &str) -> CaravelResult<()> {
    if value.trim().is_empty() {
        return Err(CaravelError::InvalidInput {
            reason: format!("{field} must not be empty"),
        });
    }
    Ok(())
}
