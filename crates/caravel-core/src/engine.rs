//! The action engine: idempotent creation, approval, cancellation and
//! execution of governed actions.
//!
//! The engine is the only writer of action status. Every step it takes is
//! one `UnitOfWork` holding the guarded action write and its audit records,
//! so no transition is ever visible without its audit event:
//!
//!   create   → INSERT DRAFT                         + action.created
//!   approve  → DRAFT → APPROVED                     + action.approved
//!   cancel   → DRAFT|APPROVED → CANCELED            + action.canceled
//!   execute  → action.execute_attempt + APPROVED → EXECUTING + action.executing
//!              [handler runs, no transaction open]
//!              EXECUTING → DONE|FAILED + action.done|action.failed
//!                        + action.execute_succeeded|action.execute_failed
//!
//! Concurrency is resolved by the store, never by in-process locks: a
//! duplicate idempotency key and a stale guarded update come back as
//! storage-level errors that the engine translates into the caller-facing
//! taxonomy.

use std::{
    any::Any,
    panic::{self, AssertUnwindSafe},
    sync::Arc,
};

use serde_json::json;
use tracing::{debug, info, warn};

use caravel_contracts::{
    action::{Action, ActionStatus, NewAction, PolicyMode},
    audit::{event_types, AuditRecord, SYSTEM_ACTOR},
    error::{CaravelError, CaravelResult},
    execution::{HandlerError, HandlerResult},
    ids::{ActionId, ProjectId, ThreadId},
};

use crate::{
    lifecycle::{advance, stage_transition},
    registry::ExecutorRegistry,
    traits::{HandlerContext, RecordStore},
    unit_of_work::UnitOfWork,
};

/// Drives actions through their lifecycle against a [`RecordStore`].
///
/// Cheap to clone and safe to share across threads; every operation is a
/// short sequence of store calls.
#[derive(Clone)]
pub struct ActionEngine {
    store: Arc<dyn RecordStore>,
    registry: Arc<ExecutorRegistry>,
}

impl ActionEngine {
    pub fn new(store: Arc<dyn RecordStore>, registry: Arc<ExecutorRegistry>) -> Self {
        Self { store, registry }
    }

    pub fn store(&self) -> &Arc<dyn RecordStore> {
        &self.store
    }

    pub fn registry(&self) -> &ExecutorRegistry {
        &self.registry
    }

    // ── Create ────────────────────────────────────────────────────────────────

    /// Create a DRAFT action, or replay the one already holding the key.
    ///
    /// Returns `(action, created)`. `created` is false on a replay, including
    /// when this call lost a concurrent race for the same key.
    ///
    /// # Errors
    ///
    /// - `NotFound` if the thread does not exist
    /// - `IdempotencyConflict` if the key is held by an action that differs
    ///   in thread, type, policy mode or payload
    pub fn create_action(&self, request: NewAction) -> CaravelResult<(Action, bool)> {
        if request.idempotency_key.trim().is_empty() {
            return Err(CaravelError::InvalidInput {
                reason: "idempotency_key must not be empty".to_string(),
            });
        }
        if request.action_type.trim().is_empty() {
            return Err(CaravelError::InvalidInput {
                reason: "action type must not be empty".to_string(),
            });
        }

        let thread = self
            .store
            .thread(&request.thread_id)?
            .ok_or_else(|| CaravelError::not_found("thread", request.thread_id))?;

        if let Some(existing) = self.store.action_by_idempotency_key(&request.idempotency_key)? {
            let replayed = replay_or_conflict(existing, &request)?;
            debug!(
                action_id = %replayed.id,
                idempotency_key = %request.idempotency_key,
                "create replayed existing action"
            );
            return Ok((replayed, false));
        }

        let now = chrono::Utc::now();
        let action = Action {
            id: ActionId::new(),
            thread_id: request.thread_id,
            action_type: request.action_type.clone(),
            policy_mode: request.policy_mode,
            status: ActionStatus::Draft,
            payload: request.payload.clone(),
            result: None,
            approved_by: None,
            approved_at: None,
            idempotency_key: request.idempotency_key.clone(),
            created_at: now,
            updated_at: now,
        };

        let mut work = UnitOfWork::new();
        work.insert_action(action.clone());
        work.audit(
            AuditRecord::with_status(
                request.actor.as_str(),
                event_types::ACTION_CREATED,
                ActionStatus::Draft,
            )
            .project(Some(thread.project_id))
            .thread(thread.id)
            .action(action.id),
        );

        match self.store.commit(work) {
            Ok(_) => {
                info!(
                    action_id = %action.id,
                    action_type = %action.action_type,
                    idempotency_key = %action.idempotency_key,
                    "action created"
                );
                Ok((action, true))
            }
            Err(CaravelError::DuplicateIdempotencyKey { key }) => {
                // Lost the race: another caller committed the key between our
                // lookup and our insert. Resolve against the winning row.
                debug!(idempotency_key = %key, "create lost race, resolving against winner");
                let winner = self.store.action_by_idempotency_key(&key)?.ok_or_else(|| {
                    CaravelError::Storage {
                        reason: format!("idempotency key '{key}' reported taken but not found"),
                    }
                })?;
                Ok((replay_or_conflict(winner, &request)?, false))
            }
            Err(e) => Err(e),
        }
    }

    // ── Approve ───────────────────────────────────────────────────────────────

    /// Move a DRAFT action to APPROVED on behalf of `approved_by`.
    ///
    /// Approving an already-APPROVED action is a no-op for the same approver
    /// and returns the action unchanged, with no new audit event.
    ///
    /// The channel guardrail is not checked here; callers at the service
    /// boundary apply it first.
    ///
    /// # Errors
    ///
    /// - `AlreadyApprovedByOther` if a different user already approved it
    /// - `InvalidTransition` from any status other than DRAFT or APPROVED
    pub fn approve_action(&self, action_id: &ActionId, approved_by: &str) -> CaravelResult<Action> {
        if approved_by.trim().is_empty() {
            return Err(CaravelError::InvalidInput {
                reason: "approved_by must not be empty".to_string(),
            });
        }

        let action = self.load(action_id)?;
        if action.status == ActionStatus::Approved {
            return reapprove(action, approved_by);
        }

        let mut next = advance(&action, ActionStatus::Approved)?;
        next.approved_by = Some(approved_by.to_string());
        next.approved_at = Some(next.updated_at);

        let project_id = self.project_of(&action.thread_id)?;
        let mut work = UnitOfWork::new();
        stage_transition(&mut work, action.status, &next, approved_by, project_id);

        match self.commit_transition(work, &next) {
            Ok(()) => {
                info!(action_id = %next.id, approved_by = %approved_by, "action approved");
                Ok(next)
            }
            Err(CaravelError::InvalidTransition {
                from: ActionStatus::Approved,
                ..
            }) => {
                // A concurrent approval landed first; apply the same-approver rule to it.
                let current = self.load(action_id)?;
                reapprove(current, approved_by)
            }
            Err(e) => Err(e),
        }
    }

    // ── Cancel ────────────────────────────────────────────────────────────────

    /// Move a DRAFT or APPROVED action to CANCELED.
    ///
    /// # Errors
    ///
    /// `InvalidTransition` once execution has started or the action is terminal.
    pub fn cancel_action(&self, action_id: &ActionId, actor: &str) -> CaravelResult<Action> {
        let action = self.load(action_id)?;
        let next = advance(&action, ActionStatus::Canceled)?;

        let project_id = self.project_of(&action.thread_id)?;
        let mut work = UnitOfWork::new();
        stage_transition(&mut work, action.status, &next, actor, project_id);
        self.commit_transition(work, &next)?;

        info!(action_id = %next.id, actor = %actor, from = %action.status, "action canceled");
        Ok(next)
    }

    // ── Execute ───────────────────────────────────────────────────────────────

    /// Run an APPROVED, EXECUTE-mode action through its handler.
    ///
    /// A handler failure is not an error of this call: the action ends FAILED
    /// with `{"error": <message>}` as its result and is returned as `Ok`.
    ///
    /// # Errors
    ///
    /// - `NotApproved` unless the action is APPROVED (checked first)
    /// - `PolicyModeNotExecutable` unless its policy mode is EXECUTE
    /// - `InvalidTransition` if a concurrent execute moved it first
    pub fn execute_action(&self, action_id: &ActionId) -> CaravelResult<Action> {
        let action = self.load(action_id)?;

        // ── Preconditions ────────────────────────────────────────────────────
        if action.status != ActionStatus::Approved {
            warn!(action_id = %action.id, status = %action.status, "execute refused: not approved");
            return Err(CaravelError::NotApproved { status: action.status });
        }
        if action.policy_mode != PolicyMode::Execute {
            warn!(
                action_id = %action.id,
                policy_mode = %action.policy_mode,
                "execute refused: policy mode not executable"
            );
            return Err(CaravelError::PolicyModeNotExecutable {
                policy_mode: action.policy_mode,
            });
        }

        let project_id = self.project_of(&action.thread_id)?;

        // ── Unit 1: attempt + APPROVED → EXECUTING ───────────────────────────
        let executing = advance(&action, ActionStatus::Executing)?;
        let mut work = UnitOfWork::new();
        work.audit(
            AuditRecord::with_status(SYSTEM_ACTOR, event_types::ACTION_EXECUTE_ATTEMPT, action.status)
                .project(project_id)
                .thread(action.thread_id)
                .action(action.id),
        );
        stage_transition(&mut work, action.status, &executing, SYSTEM_ACTOR, project_id);
        self.commit_transition(work, &executing)?;

        debug!(action_id = %action.id, handler = %action.action_type, "dispatching handler");

        // ── Handler, outside any unit ────────────────────────────────────────
        let outcome = self.dispatch(&executing, project_id);

        // ── Unit 2: result + EXECUTING → DONE | FAILED ───────────────────────
        let mut work = UnitOfWork::new();
        let finished = match outcome {
            Ok(result) => {
                let mut done = advance(&executing, ActionStatus::Done)?;
                done.result = Some(result);
                stage_transition(&mut work, executing.status, &done, SYSTEM_ACTOR, project_id);
                work.audit(
                    AuditRecord::with_status(
                        SYSTEM_ACTOR,
                        event_types::ACTION_EXECUTE_SUCCEEDED,
                        ActionStatus::Done,
                    )
                    .project(project_id)
                    .thread(done.thread_id)
                    .action(done.id),
                );
                done
            }
            Err(err) => {
                warn!(
                    action_id = %executing.id,
                    handler = %executing.action_type,
                    error = %err,
                    "handler failed"
                );
                let mut failed = advance(&executing, ActionStatus::Failed)?;
                failed.result = Some(json!({ "error": err.message }));
                stage_transition(&mut work, executing.status, &failed, SYSTEM_ACTOR, project_id);
                work.audit(
                    AuditRecord::new(
                        SYSTEM_ACTOR,
                        event_types::ACTION_EXECUTE_FAILED,
                        json!({ "status": ActionStatus::Failed.as_str(), "error": err.message }),
                    )
                    .project(project_id)
                    .thread(failed.thread_id)
                    .action(failed.id),
                );
                failed
            }
        };
        self.commit_transition(work, &finished)?;

        info!(action_id = %finished.id, status = %finished.status, "execution finished");
        Ok(finished)
    }

    // ── Reads ─────────────────────────────────────────────────────────────────

    pub fn get_action(&self, action_id: &ActionId) -> CaravelResult<Action> {
        self.load(action_id)
    }

    /// Actions of a thread, oldest first. `NotFound` if the thread is unknown.
    pub fn list_actions(&self, thread_id: &ThreadId) -> CaravelResult<Vec<Action>> {
        if self.store.thread(thread_id)?.is_none() {
            return Err(CaravelError::not_found("thread", thread_id));
        }
        self.store.actions_for_thread(thread_id)
    }

    pub fn list_handlers(&self) -> Vec<String> {
        self.registry.list_handlers()
    }

    // ── Internals ─────────────────────────────────────────────────────────────

    fn load(&self, action_id: &ActionId) -> CaravelResult<Action> {
        self.store
            .action(action_id)?
            .ok_or_else(|| CaravelError::not_found("action", action_id))
    }

    fn project_of(&self, thread_id: &ThreadId) -> CaravelResult<Option<ProjectId>> {
        Ok(self.store.thread(thread_id)?.map(|t| t.project_id))
    }

    /// Commit a unit whose guarded write moves an action to `next.status`.
    ///
    /// A stale guard means another caller moved the action first; that is
    /// reported as `InvalidTransition` from the status it actually holds.
    fn commit_transition(&self, work: UnitOfWork, next: &Action) -> CaravelResult<()> {
        match self.store.commit(work) {
            Ok(_) => Ok(()),
            Err(CaravelError::StaleStatus { action_id, expected, actual }) => {
                debug!(
                    action_id = %action_id,
                    expected = %expected,
                    actual = %actual,
                    "guarded update lost to a concurrent transition"
                );
                Err(CaravelError::InvalidTransition {
                    from: actual,
                    to: next.status,
                })
            }
            Err(e) => Err(e),
        }
    }

    fn dispatch(&self, action: &Action, project_id: Option<ProjectId>) -> HandlerResult {
        let ctx = HandlerContext {
            store: self.store.as_ref(),
            project_id,
        };
        match panic::catch_unwind(AssertUnwindSafe(|| self.registry.dispatch(&ctx, action))) {
            Ok(outcome) => outcome,
            Err(payload) => Err(HandlerError::new(format!(
                "handler panicked: {}",
                panic_message(payload.as_ref())
            ))),
        }
    }
}

impl std::fmt::Debug for ActionEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ActionEngine")
            .field("registry", &self.registry)
            .finish_non_exhaustive()
    }
}

/// Return `existing` if it was created from an identical request.
fn replay_or_conflict(existing: Action, request: &NewAction) -> CaravelResult<Action> {
    let field = if existing.thread_id != request.thread_id {
        Some("thread_id")
    } else if existing.action_type != request.action_type {
        Some("type")
    } else if existing.policy_mode != request.policy_mode {
        Some("policy_mode")
    } else if existing.payload != request.payload {
        Some("payload")
    } else {
        None
    };

    match field {
        None => Ok(existing),
        Some(field) => {
            warn!(
                idempotency_key = %request.idempotency_key,
                field = field,
                "idempotency key reused with a different request"
            );
            Err(CaravelError::IdempotencyConflict {
                key: request.idempotency_key.clone(),
                field,
            })
        }
    }
}

/// Same approver: unchanged action. Different approver: conflict.
fn reapprove(action: Action, approved_by: &str) -> CaravelResult<Action> {
    match action.approved_by.as_deref() {
        Some(existing) if existing == approved_by => Ok(action),
        Some(existing) => Err(CaravelError::AlreadyApprovedByOther {
            approved_by: existing.to_string(),
            requested_by: approved_by.to_string(),
        }),
        None => Err(CaravelError::InvalidTransition {
            from: action.status,
            to: ActionStatus::Approved,
        }),
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
