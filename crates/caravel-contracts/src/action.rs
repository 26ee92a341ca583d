//! The governed action and its two enums.
//!
//! An `Action` is created in `Draft`, approved by a person, and only then
//! executed. `status` is the state-machine field; the allowed edges are
//! exposed here so every crate agrees on them, while the engine in
//! caravel-core is the only code that actually moves an action along them.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{
    error::CaravelError,
    ids::{ActionId, ThreadId},
};

/// How far an action is permitted to go. Fixed at creation.
///
/// Only `Execute` allows the execute operation; `Read` and `Draft` actions
/// can be approved and canceled but never run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PolicyMode {
    Read,
    Draft,
    Execute,
}

impl PolicyMode {
    pub fn as_str(self) -> &'static str {
        match self {
            PolicyMode::Read => "READ",
            PolicyMode::Draft => "DRAFT",
            PolicyMode::Execute => "EXECUTE",
        }
    }
}

impl fmt::Display for PolicyMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PolicyMode {
    type Err = CaravelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "READ" => Ok(PolicyMode::Read),
            "DRAFT" => Ok(PolicyMode::Draft),
            "EXECUTE" => Ok(PolicyMode::Execute),
            other => Err(CaravelError::InvalidInput {
                reason: format!("unknown policy mode '{other}'"),
            }),
        }
    }
}

/// Lifecycle status of an action.
///
/// ```text
/// Draft     -> Approved | Canceled
/// Approved  -> Executing | Canceled
/// Executing -> Done | Failed
/// ```
///
/// `Done`, `Failed` and `Canceled` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ActionStatus {
    Draft,
    Approved,
    Executing,
    Done,
    Failed,
    Canceled,
}

impl ActionStatus {
    /// Every status, in lifecycle order.
    pub const ALL: [ActionStatus; 6] = [
        ActionStatus::Draft,
        ActionStatus::Approved,
        ActionStatus::Executing,
        ActionStatus::Done,
        ActionStatus::Failed,
        ActionStatus::Canceled,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            ActionStatus::Draft => "DRAFT",
            ActionStatus::Approved => "APPROVED",
            ActionStatus::Executing => "EXECUTING",
            ActionStatus::Done => "DONE",
            ActionStatus::Failed => "FAILED",
            ActionStatus::Canceled => "CANCELED",
        }
    }

    /// The statuses this one may move to. Empty for terminal statuses.
    pub fn allowed_transitions(self) -> &'static [ActionStatus] {
        match self {
            ActionStatus::Draft => &[ActionStatus::Approved, ActionStatus::Canceled],
            ActionStatus::Approved => &[ActionStatus::Executing, ActionStatus::Canceled],
            ActionStatus::Executing => &[ActionStatus::Done, ActionStatus::Failed],
            ActionStatus::Done | ActionStatus::Failed | ActionStatus::Canceled => &[],
        }
    }

    pub fn can_transition_to(self, next: ActionStatus) -> bool {
        self.allowed_transitions().contains(&next)
    }

    pub fn is_terminal(self) -> bool {
        self.allowed_transitions().is_empty()
    }
}

impl fmt::Display for ActionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ActionStatus {
    type Err = CaravelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ActionStatus::ALL
            .into_iter()
            .find(|status| status.as_str() == s)
            .ok_or_else(|| CaravelError::InvalidInput {
                reason: format!("unknown action status '{s}'"),
            })
    }
}

/// A governed action owned by a thread.
///
/// `thread_id`, `action_type`, `policy_mode`, `payload` and
/// `idempotency_key` never change after creation. `result` is written once,
/// when an execution attempt finishes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Action {
    pub id: ActionId,
    pub thread_id: ThreadId,
    /// Selects the executor handler. Free-form, matched exactly.
    #[serde(rename = "type")]
    pub action_type: String,
    pub policy_mode: PolicyMode,
    pub status: ActionStatus,
    /// Passed untouched to the executor handler.
    pub payload: Value,
    pub result: Option<Value>,
    pub approved_by: Option<String>,
    pub approved_at: Option<DateTime<Utc>>,
    /// Globally unique across all actions, for the action's whole lifetime.
    pub idempotency_key: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A request to create an action. Compared field-for-field on replays.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewAction {
    pub thread_id: ThreadId,
    #[serde(rename = "type")]
    pub action_type: String,
    pub policy_mode: PolicyMode,
    #[serde(default = "empty_object")]
    pub payload: Value,
    pub idempotency_key: String,
    /// Who is asking. Recorded on the `action.created` audit event.
    #[serde(default = "system_actor")]
    pub actor: String,
}

impl NewAction {
    /// Build a request with `actor` defaulted to [`crate::audit::SYSTEM_ACTOR`].
    pub fn new(
        thread_id: ThreadId,
        action_type: impl Into<String>,
        policy_mode: PolicyMode,
        payload: Value,
        idempotency_key: impl Into<String>,
    ) -> Self {
        Self {
            thread_id,
            action_type: action_type.into(),
            policy_mode,
            payload,
            idempotency_key: idempotency_key.into(),
            actor: system_actor(),
        }
    }

    pub fn with_actor(mut self, actor: impl Into<String>) -> Self {
        self.actor = actor.into();
        self
    }
}

fn empty_object() -> Value {
    Value::Object(Default::default())
}

fn system_actor() -> String {
    crate::audit::SYSTEM_ACTOR.to_string()
}
