//! In-memory audit ledger.
//!
//! `AuditLedger` keeps the sealed chain in a `Vec`. It is not synchronized
//! itself: the owner (the in-memory record store) keeps it behind the same
//! lock as the rows it audits, so a unit of work and its audit events become
//! visible together.
//!
//! Sealing is split from appending. `seal()` computes events without
//! touching the ledger so a store can validate the rest of its unit first,
//! then `extend()` the ledger only once the unit is known to succeed.

use chrono::Utc;
use tracing::debug;

use caravel_contracts::audit::AuditRecord;

use crate::{
    chain::{seal_records, verify_chain},
    event::{AuditEvent, AuditFilter, AuditLog},
};

/// An append-only, hash-chained sequence of audit events.
#[derive(Debug, Clone)]
pub struct AuditLedger {
    events: Vec<AuditEvent>,

    /// `this_hash` of the last event, or `GENESIS_HASH` before the first.
    last_hash: String,
}

impl AuditLedger {
    pub fn new() -> Self {
        Self {
            events: Vec::new(),
            last_hash: AuditEvent::GENESIS_HASH.to_string(),
        }
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// Seal `records` as the next events of this ledger without appending them.
    pub fn seal(&self, records: &[AuditRecord]) -> Vec<AuditEvent> {
        seal_records(self.events.len() as u64, &self.last_hash, records)
    }

    /// Append events previously produced by [`AuditLedger::seal`].
    ///
    /// The events must continue this ledger exactly; a store seals and
    /// extends under one lock, so nothing can be appended in between.
    pub fn extend(&mut self, sealed: Vec<AuditEvent>) {
        for event in sealed {
            debug!(
                sequence = event.sequence,
                event_type = %event.record.event_type,
                "audit event appended"
            );
            self.last_hash = event.this_hash.clone();
            self.events.push(event);
        }
    }

    /// Seal and append a single record.
    pub fn append(&mut self, record: AuditRecord) -> AuditEvent {
        let mut sealed = self.seal(std::slice::from_ref(&record));
        let event = sealed.remove(0);
        self.extend(vec![event.clone()]);
        event
    }

    pub fn events(&self) -> &[AuditEvent] {
        &self.events
    }

    pub fn query(&self, filter: &AuditFilter) -> Vec<AuditEvent> {
        filter.apply(&self.events)
    }

    /// Recompute the whole chain.
    pub fn verify_integrity(&self) -> bool {
        verify_chain(&self.events)
    }

    pub fn export_log(&self) -> AuditLog {
        AuditLog {
            events: self.events.clone(),
            exported_at: Utc::now(),
            terminal_hash: self
                .events
                .last()
                .map(|e| e.this_hash.clone())
                .unwrap_or_default(),
        }
    }

    #[cfg(test)]
    pub(crate) fn events_mut(&mut self) -> &mut Vec<AuditEvent> {
        &mut self.events
    }
}

impl Default for AuditLedger {
    fn default() -> Self {
        Self::new()
    }
}
