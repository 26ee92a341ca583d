//! Runtime error types for the caravel action lifecycle.
//!
//! All fallible operations return `CaravelResult<T>`. Conflict variants carry
//! the attempted and actual values so a caller can decide what to do next;
//! the runtime never retries on a caller's behalf.

use thiserror::Error;

use crate::action::{ActionStatus, PolicyMode};
use crate::records::Channel;

/// The unified error type for the caravel runtime.
#[derive(Debug, Error)]
pub enum CaravelError {
    /// A referenced project, thread, action or artifact does not exist.
    #[error("{kind} not found: {id}")]
    NotFound { kind: &'static str, id: String },

    /// A record with the same unique value already exists (e.g. project slug).
    #[error("{kind} already exists: {id}")]
    AlreadyExists { kind: &'static str, id: String },

    /// The requested status change is not an edge of the lifecycle.
    #[error("invalid transition from {from} to {to}")]
    InvalidTransition { from: ActionStatus, to: ActionStatus },

    /// An idempotency key was reused for a different logical request.
    #[error("idempotency key '{key}' already used with a different {field}")]
    IdempotencyConflict { key: String, field: &'static str },

    /// The action is already approved, by someone else.
    #[error("action already approved by '{approved_by}', not '{requested_by}'")]
    AlreadyApprovedByOther {
        approved_by: String,
        requested_by: String,
    },

    /// Execution requires an APPROVED action.
    #[error("action must be APPROVED before execution (status is {status})")]
    NotApproved { status: ActionStatus },

    /// Execution requires policy_mode EXECUTE.
    #[error("action policy_mode must be EXECUTE to run (policy_mode is {policy_mode})")]
    PolicyModeNotExecutable { policy_mode: PolicyMode },

    /// Approval arrived through a channel that may not approve.
    #[error("approval is not allowed from channel '{channel}'")]
    ChannelNotAllowed { channel: Channel },

    /// The store refused an insert because the idempotency key is taken.
    ///
    /// Consumed by the engine, which re-reads the winning row.
    #[error("idempotency key '{key}' is already in use")]
    DuplicateIdempotencyKey { key: String },

    /// The store refused a guarded update because the status moved underneath it.
    ///
    /// Consumed by the engine and reported as a lifecycle conflict.
    #[error("action {action_id} status is {actual}, expected {expected}")]
    StaleStatus {
        action_id: String,
        expected: ActionStatus,
        actual: ActionStatus,
    },

    /// A request value is malformed.
    #[error("invalid input: {reason}")]
    InvalidInput { reason: String },

    /// The audit record could not be written; the whole unit was rolled back.
    #[error("audit write failed: {reason}")]
    AuditWriteFailed { reason: String },

    /// The record store failed.
    #[error("storage error: {reason}")]
    Storage { reason: String },

    /// Artifact bytes could not be written or read.
    #[error("artifact io error: {reason}")]
    ArtifactIo { reason: String },

    /// A required configuration value is missing or invalid.
    #[error("configuration error: {reason}")]
    ConfigError { reason: String },
}

impl CaravelError {
    /// True for the caller-facing conflict class: the request is well-formed
    /// but the current state does not allow it.
    pub fn is_conflict(&self) -> bool {
        matches!(
            self,
            CaravelError::InvalidTransition { .. }
                | CaravelError::IdempotencyConflict { .. }
                | CaravelError::AlreadyApprovedByOther { .. }
                | CaravelError::NotApproved { .. }
                | CaravelError::PolicyModeNotExecutable { .. }
                | CaravelError::ChannelNotAllowed { .. }
                | CaravelError::AlreadyExists { .. }
        )
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, CaravelError::NotFound { .. })
    }

    pub fn not_found(kind: &'static str, id: impl ToString) -> Self {
        CaravelError::NotFound {
            kind,
            id: id.to_string(),
        }
    }
}

/// Convenience alias used throughout the caravel crates.
pub type CaravelResult<T> = Result<T, CaravelError>;
