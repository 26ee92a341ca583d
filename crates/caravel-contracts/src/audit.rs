//! The unsealed audit record and the event-type vocabulary.
//!
//! `AuditRecord` is what the engine produces for every lifecycle step.
//! caravel-audit wraps it in a sealed, hash-chained `AuditEvent` when the
//! store commits it.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{
    action::ActionStatus,
    ids::{ActionId, ProjectId, ThreadId},
};

/// Actor name used when the runtime itself causes an event.
pub const SYSTEM_ACTOR: &str = "system";

/// Dotted event-type names written by the action lifecycle.
pub mod event_types {
    use crate::action::ActionStatus;

    pub const ACTION_CREATED: &str = "action.created";
    pub const ACTION_APPROVED: &str = "action.approved";
    pub const ACTION_EXECUTING: &str = "action.executing";
    pub const ACTION_DONE: &str = "action.done";
    pub const ACTION_FAILED: &str = "action.failed";
    pub const ACTION_CANCELED: &str = "action.canceled";
    pub const ACTION_EXECUTE_ATTEMPT: &str = "action.execute_attempt";
    pub const ACTION_EXECUTE_SUCCEEDED: &str = "action.execute_succeeded";
    pub const ACTION_EXECUTE_FAILED: &str = "action.execute_failed";

    /// `action.<status lowercased>`, the event written by a transition into `status`.
    pub fn for_status(status: ActionStatus) -> String {
        format!("action.{}", status.as_str().to_lowercase())
    }
}

/// One immutable audit entry, before sealing.
///
/// The project/thread/action references are denormalized for querying only;
/// nothing in the runtime relies on them for correctness.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditRecord {
    /// A user identifier, or [`SYSTEM_ACTOR`].
    pub actor: String,
    pub event_type: String,
    /// Free-form context. Lifecycle events always carry `status`.
    pub payload: Value,
    pub project_id: Option<ProjectId>,
    pub thread_id: Option<ThreadId>,
    pub action_id: Option<ActionId>,
    pub timestamp: DateTime<Utc>,
}

impl AuditRecord {
    pub fn new(actor: impl Into<String>, event_type: impl Into<String>, payload: Value) -> Self {
        Self {
            actor: actor.into(),
            event_type: event_type.into(),
            payload,
            project_id: None,
            thread_id: None,
            action_id: None,
            timestamp: Utc::now(),
        }
    }

    /// A record whose payload is `{"status": <status>}`.
    pub fn with_status(
        actor: impl Into<String>,
        event_type: impl Into<String>,
        status: ActionStatus,
    ) -> Self {
        Self::new(actor, event_type, serde_json::json!({ "status": status.as_str() }))
    }

    pub fn project(mut self, project_id: Option<ProjectId>) -> Self {
        self.project_id = project_id;
        self
    }

    pub fn thread(mut self, thread_id: ThreadId) -> Self {
        self.thread_id = Some(thread_id);
        self
    }

    pub fn action(mut self, action_id: ActionId) -> Self {
        self.action_id = Some(action_id);
        self
    }
}
