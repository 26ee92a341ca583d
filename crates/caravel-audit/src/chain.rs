//! Hash-chain primitives: hashing, sealing, and chain verification.
//!
//! Hash input layout (bytes, in order):
//!   1. sequence as 8-byte little-endian
//!   2. prev_hash as UTF-8 bytes (64 ASCII hex chars)
//!   3. canonical JSON of the record (serde_json, no pretty-printing)
//!
//! Record payloads are `serde_json::Value` maps, which serialize with sorted
//! keys, so the JSON is stable across a store round-trip.

use sha2::{Digest, Sha256};

use caravel_contracts::audit::AuditRecord;

use crate::event::AuditEvent;

/// Compute the SHA-256 hash for a single audit event.
///
/// Returns a lowercase 64-character hex string.
///
/// # Panics
///
/// Panics if `record` cannot be serialized to JSON, which cannot happen for
/// `AuditRecord`: every field is a string, id, timestamp or JSON value.
pub fn hash_event(sequence: u64, record: &AuditRecord, prev_hash: &str) -> String {
    let record_json =
        serde_json::to_vec(record).expect("AuditRecord must always be serializable to JSON");

    let mut hasher = Sha256::new();
    hasher.update(sequence.to_le_bytes());
    hasher.update(prev_hash.as_bytes());
    hasher.update(&record_json);

    hex::encode(hasher.finalize())
}

/// Seal `records` as the continuation of a chain whose next sequence is
/// `next_sequence` and whose last hash is `prev_hash`.
///
/// Pure: nothing is appended anywhere. Stores call this inside their commit
/// and persist the returned events together with the rest of the unit.
pub fn seal_records(next_sequence: u64, prev_hash: &str, records: &[AuditRecord]) -> Vec<AuditEvent> {
    let mut prev = prev_hash.to_string();
    records
        .iter()
        .enumerate()
        .map(|(offset, record)| {
            let sequence = next_sequence + offset as u64;
            let this_hash = hash_event(sequence, record, &prev);
            AuditEvent {
                sequence,
                record: record.clone(),
                prev_hash: std::mem::replace(&mut prev, this_hash.clone()),
                this_hash,
            }
        })
        .collect()
}

/// Verify the integrity of a full chain.
///
/// Valid when every event:
///
/// 1. sits at the sequence equal to its index,
/// 2. links to the preceding event's `this_hash` (or `GENESIS_HASH`), and
/// 3. carries a `this_hash` matching the value recomputed from its fields.
///
/// An empty chain is valid.
pub fn verify_chain(events: &[AuditEvent]) -> bool {
    let mut expected_prev = AuditEvent::GENESIS_HASH.to_string();

    for (index, event) in events.iter().enumerate() {
        if event.sequence != index as u64 || event.prev_hash != expected_prev {
            return false;
        }

        let recomputed = hash_event(event.sequence, &event.record, &event.prev_hash);
        if event.this_hash != recomputed {
            return false;
        }

        expected_prev = event.this_hash.clone();
    }

    true
}
