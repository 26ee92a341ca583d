//! # caravel-store
//!
//! Record stores for the caravel action runtime.
//!
//! - [`MemoryStore`]: every table behind one mutex, audit chain in an
//!   in-process [`caravel_audit::AuditLedger`]
//! - [`SqliteStore`]: rusqlite with a UNIQUE index on `idempotency_key`,
//!   guarded `UPDATE ... WHERE status = ?` and one transaction per unit of work
//!
//! Both implement [`caravel_core::RecordStore`] with the same observable
//! behavior; the tests below run against each of them.

pub mod db;
pub mod memory;
pub mod migrations;
mod rows;
pub mod sqlite;

pub use memory::MemoryStore;
pub use sqlite::SqliteStore;
