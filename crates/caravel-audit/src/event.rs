//! Sealed audit events, query filters, and exported logs.
//!
//! `AuditEvent` wraps an `AuditRecord` with its position in the global chain
//! and the SHA-256 hashes that make tampering detectable.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use caravel_contracts::{
    audit::AuditRecord,
    ids::{ActionId, ProjectId, ThreadId},
};

/// A single entry in the audit hash chain.
///
/// Each event commits to the previous one via `prev_hash`. Modifying any
/// field, including those of the embedded `record`, invalidates `this_hash`
/// and every later `prev_hash`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditEvent {
    /// Position in the chain, starting at 0, with no gaps.
    pub sequence: u64,

    /// The immutable record produced by the engine.
    pub record: AuditRecord,

    /// Hash of the previous event, or `GENESIS_HASH` for the first one.
    pub prev_hash: String,

    /// SHA-256 (hex) over (sequence, prev_hash, canonical JSON of record).
    pub this_hash: String,
}

impl AuditEvent {
    /// The `prev_hash` of the first event in every chain.
    pub const GENESIS_HASH: &'static str =
        "0000000000000000000000000000000000000000000000000000000000000000";

    pub fn event_type(&self) -> &str {
        &self.record.event_type
    }
}

/// Narrows an audit listing. Unset fields match everything.
///
/// `limit` keeps the most recent matching events; results are always
/// returned in chain order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AuditFilter {
    pub project_id: Option<ProjectId>,
    pub thread_id: Option<ThreadId>,
    pub action_id: Option<ActionId>,
    pub limit: Option<usize>,
}

impl AuditFilter {
    pub fn for_action(action_id: ActionId) -> Self {
        Self {
            action_id: Some(action_id),
            ..Self::default()
        }
    }

    pub fn for_project(project_id: ProjectId) -> Self {
        Self {
            project_id: Some(project_id),
            ..Self::default()
        }
    }

    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn matches(&self, event: &AuditEvent) -> bool {
        let record = &event.record;
        self.project_id.map_or(true, |id| record.project_id == Some(id))
            && self.thread_id.map_or(true, |id| record.thread_id == Some(id))
            && self.action_id.map_or(true, |id| record.action_id == Some(id))
    }

    /// Apply the filter to events already in chain order.
    pub fn apply<'a>(&self, events: impl IntoIterator<Item = &'a AuditEvent>) -> Vec<AuditEvent> {
        let mut matched: Vec<AuditEvent> =
            events.into_iter().filter(|e| self.matches(e)).cloned().collect();
        if let Some(limit) = self.limit {
            let skip = matched.len().saturating_sub(limit);
            matched.drain(..skip);
        }
        matched
    }
}

/// A snapshot of the whole chain.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditLog {
    /// All events in chain order (sequence 0 first).
    pub events: Vec<AuditEvent>,

    /// Wall-clock time (UTC) the snapshot was taken.
    pub exported_at: DateTime<Utc>,

    /// `this_hash` of the last event. Empty string if the log is empty.
    pub terminal_hash: String,
}
