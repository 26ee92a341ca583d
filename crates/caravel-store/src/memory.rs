//! Mutex-guarded in-memory record store.
//!
//! One lock covers every table and the audit ledger, so a committed unit of
//! work and its audit events become visible in a single step. Intended for
//! tests, demos and single-process deployments.

use std::{
    collections::HashMap,
    sync::{Mutex, MutexGuard},
};

use tracing::debug;

use caravel_audit::{AuditEvent, AuditFilter, AuditLedger};
use caravel_contracts::{
    action::Action,
    error::{CaravelError, CaravelResult},
    ids::{ActionId, ArtifactId, ProjectId, ThreadId},
    records::{Artifact, ArtifactFilter, Message, Project, Thread},
};
use caravel_core::{ActionWrite, RecordStore, UnitOfWork};

#[derive(Default)]
struct MemoryState {
    projects: HashMap<ProjectId, Project>,
    slugs: HashMap<String, ProjectId>,
    threads: HashMap<ThreadId, Thread>,
    messages: Vec<Message>,
    actions: HashMap<ActionId, Action>,
    /// Insertion order of `actions`.
    action_order: Vec<ActionId>,
    /// idempotency_key -> action id. The uniqueness index.
    keys: HashMap<String, ActionId>,
    artifacts: Vec<Artifact>,
    ledger: AuditLedger,
}

#[derive(Default)]
pub struct MemoryStore {
    state: Mutex<MemoryState>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> CaravelResult<MutexGuard<'_, MemoryState>> {
        self.state.lock().map_err(|e| CaravelError::Storage {
            reason: format!("memory store lock poisoned: {e}"),
        })
    }
}

impl std::fmt::Debug for MemoryStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryStore").finish_non_exhaustive()
    }
}

impl RecordStore for MemoryStore {
    fn insert_project(&self, project: &Project) -> CaravelResult<()> {
        let mut state = self.lock()?;
        if state.slugs.contains_key(&project.slug) {
            return Err(CaravelError::AlreadyExists {
                kind: "project",
                id: project.slug.clone(),
            });
        }
        state.slugs.insert(project.slug.clone(), project.id);
        state.projects.insert(project.id, project.clone());
        Ok(())
    }

    fn project(&self, id: &ProjectId) -> CaravelResult<Option<Project>> {
        Ok(self.lock()?.projects.get(id).cloned())
    }

    fn insert_thread(&self, thread: &Thread) -> CaravelResult<()> {
        let mut state = self.lock()?;
        if !state.projects.contains_key(&thread.project_id) {
            return Err(CaravelError::not_found("project", thread.project_id));
        }
        state.threads.insert(thread.id, thread.clone());
        Ok(())
    }

    fn thread(&self, id: &ThreadId) -> CaravelResult<Option<Thread>> {
        Ok(self.lock()?.threads.get(id).cloned())
    }

    fn insert_message(&self, message: &Message) -> CaravelResult<()> {
        let mut state = self.lock()?;
        if !state.threads.contains_key(&message.thread_id) {
            return Err(CaravelError::not_found("thread", message.thread_id));
        }
        state.messages.push(message.clone());
        Ok(())
    }

    fn messages_for_thread(&self, thread_id: &ThreadId) -> CaravelResult<Vec<Message>> {
        let state = self.lock()?;
        Ok(state
            .messages
            .iter()
            .filter(|m| m.thread_id == *thread_id)
            .cloned()
            .collect())
    }

    fn action(&self, id: &ActionId) -> CaravelResult<Option<Action>> {
        Ok(self.lock()?.actions.get(id).cloned())
    }

    fn action_by_idempotency_key(&self, key: &str) -> CaravelResult<Option<Action>> {
        let state = self.lock()?;
        Ok(state.keys.get(key).and_then(|id| state.actions.get(id)).cloned())
    }

    fn actions_for_thread(&self, thread_id: &ThreadId) -> CaravelResult<Vec<Action>> {
        let state = self.lock()?;
        Ok(state
            .action_order
            .iter()
            .filter_map(|id| state.actions.get(id))
            .filter(|a| a.thread_id == *thread_id)
            .cloned()
            .collect())
    }

    fn commit(&self, work: UnitOfWork) -> CaravelResult<Vec<AuditEvent>> {
        work.validate_audit()?;
        let (writes, records) = work.into_parts();
        let mut state = self.lock()?;

        // Validate every write against the committed rows plus the ones staged
        // so far. Nothing is applied until the whole unit checks out.
        let mut staged: HashMap<ActionId, Action> = HashMap::new();
        let mut inserted: Vec<ActionId> = Vec::new();
        for write in writes {
            match write {
                ActionWrite::Insert(action) => {
                    let key_taken = state.keys.contains_key(&action.idempotency_key)
                        || staged
                            .values()
                            .any(|a| a.idempotency_key == action.idempotency_key);
                    if key_taken {
                        return Err(CaravelError::DuplicateIdempotencyKey {
                            key: action.idempotency_key,
                        });
                    }
                    if state.actions.contains_key(&action.id) || staged.contains_key(&action.id) {
                        return Err(CaravelError::AlreadyExists {
                            kind: "action",
                            id: action.id.to_string(),
                        });
                    }
                    if !state.threads.contains_key(&action.thread_id) {
                        return Err(CaravelError::not_found("thread", action.thread_id));
                    }
                    inserted.push(action.id);
                    staged.insert(action.id, action);
                }
                ActionWrite::Update {
                    action,
                    expected_status,
                } => {
                    let current = staged
                        .get(&action.id)
                        .or_else(|| state.actions.get(&action.id))
                        .ok_or_else(|| CaravelError::not_found("action", action.id))?;
                    if current.status != expected_status {
                        return Err(CaravelError::StaleStatus {
                            action_id: action.id.to_string(),
                            expected: expected_status,
                            actual: current.status,
                        });
                    }
                    staged.insert(action.id, action);
                }
            }
        }

        let sealed = state.ledger.seal(&records);

        let state = &mut *state;
        state.action_order.extend(inserted);
        for (id, action) in staged {
            state.keys.insert(action.idempotency_key.clone(), id);
            state.actions.insert(id, action);
        }
        state.ledger.extend(sealed.clone());

        debug!(events = sealed.len(), "memory store committed unit of work");
        Ok(sealed)
    }

    fn insert_artifact(&self, artifact: &Artifact) -> CaravelResult<()> {
        let mut state = self.lock()?;
        if !state.projects.contains_key(&artifact.project_id) {
            return Err(CaravelError::not_found("project", artifact.project_id));
        }
        if let Some(thread_id) = artifact.thread_id {
            if !state.threads.contains_key(&thread_id) {
                return Err(CaravelError::not_found("thread", thread_id));
            }
        }
        if let Some(action_id) = artifact.action_id {
            if !state.actions.contains_key(&action_id) {
                return Err(CaravelError::not_found("action", action_id));
            }
        }
        if state.artifacts.iter().any(|a| a.id == artifact.id) {
            return Err(CaravelError::AlreadyExists {
                kind: "artifact",
                id: artifact.id.to_string(),
            });
        }
        state.artifacts.push(artifact.clone());
        Ok(())
    }

    fn artifact(&self, id: &ArtifactId) -> CaravelResult<Option<Artifact>> {
        let state = self.lock()?;
        Ok(state.artifacts.iter().find(|a| a.id == *id).cloned())
    }

    fn artifacts(&self, filter: &ArtifactFilter) -> CaravelResult<Vec<Artifact>> {
        let state = self.lock()?;
        Ok(state
            .artifacts
            .iter()
            .rev()
            .filter(|a| filter.matches(a))
            .take(filter.limit.unwrap_or(usize::MAX))
            .cloned()
            .collect())
    }

    fn audit_events(&self, filter: &AuditFilter) -> CaravelResult<Vec<AuditEvent>> {
        Ok(self.lock()?.ledger.query(filter))
    }

    fn verify_audit_chain(&self) -> CaravelResult<bool> {
        Ok(self.lock()?.ledger.verify_integrity())
    }
}
