//! In-crate test double for `RecordStore`.
//!
//! Enforces the same commit contract as the real stores (unique keys,
//! guarded updates, all-or-nothing) and can inject the two races the engine
//! has to resolve: a concurrent insert under the same idempotency key and a
//! concurrent approval.

use std::{collections::HashMap, sync::Mutex};

use caravel_audit::{AuditEvent, AuditFilter, AuditLedger};
use caravel_contracts::{
    action::{Action, ActionStatus},
    error::{CaravelError, CaravelResult},
    ids::{ActionId, ArtifactId, ProjectId, ThreadId},
    records::{Artifact, ArtifactFilter, Message, Project, Thread},
};
use serde_json::json;

use crate::{
    traits::RecordStore,
    unit_of_work::{ActionWrite, UnitOfWork},
};

#[derive(Default)]
struct MockState {
    projects: HashMap<ProjectId, Project>,
    threads: HashMap<ThreadId, Thread>,
    messages: Vec<Message>,
    actions: Vec<Action>,
    artifacts: Vec<Artifact>,
    ledger: AuditLedger,
    /// Committed by "another caller" but not yet visible to lookups.
    hidden_winner: Option<Action>,
    /// Approve the target of the next guarded update as this user first.
    rival_approver: Option<String>,
}

#[derive(Default)]
pub struct MockStore {
    state: Mutex<MockState>,
}

impl MockStore {
    /// A store with one project and one thread; returns both ids.
    pub fn seeded() -> (Self, ProjectId, ThreadId) {
        let store = Self::default();
        let project = Project::new("acme", "Acme", json!({}));
        let thread = Thread::new(project.id, "ops", json!([]));
        let ids = (project.id, thread.id);
        store.insert_project(&project).unwrap();
        store.insert_thread(&thread).unwrap();
        (store, ids.0, ids.1)
    }

    pub fn hide_winner(&self, action: Action) {
        self.state.lock().unwrap().hidden_winner = Some(action);
    }

    pub fn approve_concurrently_as(&self, approver: &str) {
        self.state.lock().unwrap().rival_approver = Some(approver.to_string());
    }

    pub fn audit_types(&self, action_id: ActionId) -> Vec<String> {
        self.state
            .lock()
            .unwrap()
            .ledger
            .query(&AuditFilter::for_action(action_id))
            .into_iter()
            .map(|e| e.record.event_type)
            .collect()
    }
}

impl RecordStore for MockStore {
    fn insert_project(&self, project: &Project) -> CaravelResult<()> {
        self.state.lock().unwrap().projects.insert(project.id, project.clone());
        Ok(())
    }

    fn project(&self, id: &ProjectId) -> CaravelResult<Option<Project>> {
        Ok(self.state.lock().unwrap().projects.get(id).cloned())
    }

    fn insert_thread(&self, thread: &Thread) -> CaravelResult<()> {
        self.state.lock().unwrap().threads.insert(thread.id, thread.clone());
        Ok(())
    }

    fn thread(&self, id: &ThreadId) -> CaravelResult<Option<Thread>> {
        Ok(self.state.lock().unwrap().threads.get(id).cloned())
    }

    fn insert_message(&self, message: &Message) -> CaravelResult<()> {
        self.state.lock().unwrap().messages.push(message.clone());
        Ok(())
    }

    fn messages_for_thread(&self, thread_id: &ThreadId) -> CaravelResult<Vec<Message>> {
        let state = self.state.lock().unwrap();
        Ok(state.messages.iter().filter(|m| m.thread_id == *thread_id).cloned().collect())
    }

    fn action(&self, id: &ActionId) -> CaravelResult<Option<Action>> {
        let state = self.state.lock().unwrap();
        Ok(state.actions.iter().find(|a| a.id == *id).cloned())
    }

    fn action_by_idempotency_key(&self, key: &str) -> CaravelResult<Option<Action>> {
        let state = self.state.lock().unwrap();
        Ok(state.actions.iter().find(|a| a.idempotency_key == key).cloned())
    }

    fn actions_for_thread(&self, thread_id: &ThreadId) -> CaravelResult<Vec<Action>> {
        let state = self.state.lock().unwrap();
        Ok(state.actions.iter().filter(|a| a.thread_id == *thread_id).cloned().collect())
    }

    fn commit(&self, work: UnitOfWork) -> CaravelResult<Vec<AuditEvent>> {
        work.validate_audit()?;
        let mut state = self.state.lock().unwrap();
        let (writes, records) = work.into_parts();

        if let Some(approver) = state.rival_approver.take() {
            if let Some(ActionWrite::Update { action, expected_status }) = writes.first() {
                let stored = state
                    .actions
                    .iter_mut()
                    .find(|a| a.id == action.id)
                    .ok_or_else(|| CaravelError::not_found("action", action.id))?;
                stored.status = ActionStatus::Approved;
                stored.approved_by = Some(approver);
                return Err(CaravelError::StaleStatus {
                    action_id: action.id.to_string(),
                    expected: *expected_status,
                    actual: ActionStatus::Approved,
                });
            }
        }

        let mut staged = state.actions.clone();
        for write in writes {
            match write {
                ActionWrite::Insert(action) => {
                    let hidden_clash = state
                        .hidden_winner
                        .as_ref()
                        .is_some_and(|w| w.idempotency_key == action.idempotency_key);
                    if hidden_clash {
                        if let Some(winner) = state.hidden_winner.take() {
                            state.actions.push(winner);
                        }
                    }
                    if hidden_clash
                        || staged.iter().any(|a| a.idempotency_key == action.idempotency_key)
                    {
                        return Err(CaravelError::DuplicateIdempotencyKey {
                            key: action.idempotency_key,
                        });
                    }
                    staged.push(action);
                }
                ActionWrite::Update { action, expected_status } => {
                    let slot = staged
                        .iter_mut()
                        .find(|a| a.id == action.id)
                        .ok_or_else(|| CaravelError::not_found("action", action.id))?;
                    if slot.status != expected_status {
                        return Err(CaravelError::StaleStatus {
                            action_id: action.id.to_string(),
                            expected: expected_status,
                            actual: slot.status,
                        });
                    }
                    *slot = action;
                }
            }
        }

        let sealed = state.ledger.seal(&records);
        state.actions = staged;
        state.ledger.extend(sealed.clone());
        Ok(sealed)
    }

    fn insert_artifact(&self, artifact: &Artifact) -> CaravelResult<()> {
        self.state.lock().unwrap().artifacts.push(artifact.clone());
        Ok(())
    }

    fn artifact(&self, id: &ArtifactId) -> CaravelResult<Option<Artifact>> {
        let state = self.state.lock().unwrap();
        Ok(state.artifacts.iter().find(|a| a.id == *id).cloned())
    }

    fn artifacts(&self, filter: &ArtifactFilter) -> CaravelResult<Vec<Artifact>> {
        let state = self.state.lock().unwrap();
        Ok(state.artifacts.iter().rev().filter(|a| filter.matches(a)).cloned().collect())
    }

    fn audit_events(&self, filter: &AuditFilter) -> CaravelResult<Vec<AuditEvent>> {
        Ok(self.state.lock().unwrap().ledger.query(filter))
    }

    fn verify_audit_chain(&self) -> CaravelResult<bool> {
        Ok(self.state.lock().unwrap().ledger.verify_integrity())
    }
}
