//! # caravel-audit
//!
//! Append-only, SHA-256 hash-chained audit sink for the caravel runtime.
//!
//! ## Overview
//!
//! Every lifecycle step the engine commits carries one or more
//! `AuditRecord`s. The store seals them into `AuditEvent`s that link to the
//! previous event by hash, in the same commit as the state change they
//! describe. Tampering with any event breaks the chain and is detected by
//! `verify_chain`.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use caravel_audit::AuditLedger;
//!
//! let mut ledger = AuditLedger::new();
//! let sealed = ledger.seal(&records);
//! // ... validate the rest of the unit of work ...
//! ledger.extend(sealed);
//! assert!(ledger.verify_integrity());
//! ```

pub mod chain;
pub mod event;
pub mod ledger;

pub use chain::{hash_event, seal_records, verify_chain};
pub use event::{AuditEvent, AuditFilter, AuditLog};
pub use ledger::AuditLedger;

// ── Tests ─────────────────────────────────────────────────────────────────────
