//! The unit of work a store commits atomically.
//!
//! A lifecycle step is never written piecemeal. The engine stages the action
//! writes and the audit records that describe them, then hands the whole unit
//! to `RecordStore::commit()`. Either every write and every audit event lands,
//! or none does.

use caravel_contracts::{
    action::{Action, ActionStatus},
    audit::AuditRecord,
    error::{CaravelError, CaravelResult},
};

/// One staged write to the actions table.
#[derive(Debug, Clone, PartialEq)]
pub enum ActionWrite {
    /// Insert a new action. Fails on a duplicate idempotency key.
    Insert(Action),
    /// Replace an action, only if its stored status is still `expected_status`.
    Update {
        action: Action,
        expected_status: ActionStatus,
    },
}

#[derive(Debug, Clone, Default)]
pub struct UnitOfWork {
    writes: Vec<ActionWrite>,
    audit: Vec<AuditRecord>,
}

impl UnitOfWork {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert_action(&mut self, action: Action) {
        self.writes.push(ActionWrite::Insert(action));
    }

    pub fn update_action(&mut self, action: Action, expected_status: ActionStatus) {
        self.writes.push(ActionWrite::Update {
            action,
            expected_status,
        });
    }

    /// Append an audit record. Records are sealed in staging order.
    pub fn audit(&mut self, record: AuditRecord) {
        self.audit.push(record);
    }

    pub fn writes(&self) -> &[ActionWrite] {
        &self.writes
    }

    pub fn audit_records(&self) -> &[AuditRecord] {
        &self.audit
    }

    pub fn is_empty(&self) -> bool {
        self.writes.is_empty() && self.audit.is_empty()
    }

    pub fn into_parts(self) -> (Vec<ActionWrite>, Vec<AuditRecord>) {
        (self.writes, self.audit)
    }

    /// Reject audit records no sink would accept.
    ///
    /// Stores call this before applying anything, so a bad record aborts the
    /// whole unit with `AuditWriteFailed`.
    pub fn validate_audit(&self) -> CaravelResult<()> {
        for record in &self.audit {
            if record.event_type.trim().is_empty() {
                return Err(CaravelError::AuditWriteFailed {
                    reason: "audit record has an empty event_type".to_string(),
                });
            }
            if record.actor.trim().is_empty() {
                return Err(CaravelError::AuditWriteFailed {
                    reason: format!("audit record '{}' has an empty actor", record.event_type),
                });
            }
        }
        Ok(())
    }
}
