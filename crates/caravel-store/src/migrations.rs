//! Database schema migrations.
//!
//! Timestamps are stored as fixed-width RFC 3339 UTC strings with nanosecond
//! precision, so text order equals time order. JSON columns hold compact
//! serde_json text.

use rusqlite::Connection;
use tracing::info;

use caravel_contracts::error::CaravelResult;

use crate::db::storage;

/// Run all pending migrations.
pub fn run_migrations(conn: &Connection) -> CaravelResult<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS schema_migrations (
            version     INTEGER PRIMARY KEY NOT NULL,
            name        TEXT NOT NULL,
            applied_at  INTEGER NOT NULL DEFAULT (strftime('%s', 'now'))
        );",
    )
    .map_err(storage("failed to create migrations table"))?;

    let current_version: i64 = conn
        .query_row(
            "SELECT COALESCE(MAX(version), 0) FROM schema_migrations",
            [],
            |row| row.get(0),
        )
        .map_err(storage("failed to query migration version"))?;

    if current_version < 1 {
        apply_v1(conn)?;
        info!("applied migration v1: initial_schema");
    }

    Ok(())
}

/// Version 1: initial schema.
fn apply_v1(conn: &Connection) -> CaravelResult<()> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS projects (
            id          TEXT PRIMARY KEY NOT NULL,
            slug        TEXT NOT NULL UNIQUE,
            name        TEXT NOT NULL,
            settings    TEXT NOT NULL DEFAULT '{}',
            created_at  TEXT NOT NULL,
            updated_at  TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS threads (
            id          TEXT PRIMARY KEY NOT NULL,
            project_id  TEXT NOT NULL REFERENCES projects (id) ON DELETE CASCADE,
            title       TEXT NOT NULL,
            tags        TEXT NOT NULL DEFAULT '[]',
            created_at  TEXT NOT NULL,
            updated_at  TEXT NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_threads_project
            ON threads (project_id);

        CREATE TABLE IF NOT EXISTS messages (
            id          TEXT PRIMARY KEY NOT NULL,
            thread_id   TEXT NOT NULL REFERENCES threads (id) ON DELETE CASCADE,
            channel     TEXT NOT NULL CHECK (channel IN ('web', 'telegram')),
            role        TEXT NOT NULL CHECK (role IN ('user', 'assistant', 'system')),
            content     TEXT NOT NULL,
            meta        TEXT NOT NULL DEFAULT '{}',
            created_at  TEXT NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_messages_thread
            ON messages (thread_id, created_at);

        CREATE TABLE IF NOT EXISTS actions (
            id               TEXT PRIMARY KEY NOT NULL,
            thread_id        TEXT NOT NULL REFERENCES threads (id) ON DELETE CASCADE,
            type             TEXT NOT NULL,
            policy_mode      TEXT NOT NULL
                             CHECK (policy_mode IN ('READ', 'DRAFT', 'EXECUTE')),
            status           TEXT NOT NULL
                             CHECK (status IN ('DRAFT', 'APPROVED', 'EXECUTING', 'DONE', 'FAILED', 'CANCELED')),
            payload          TEXT NOT NULL DEFAULT '{}',
            result           TEXT,
            approved_by      TEXT,
            approved_at      TEXT,
            idempotency_key  TEXT NOT NULL,
            created_at       TEXT NOT NULL,
            updated_at       TEXT NOT NULL
        );

        CREATE UNIQUE INDEX IF NOT EXISTS idx_actions_idempotency_key
            ON actions (idempotency_key);

        CREATE INDEX IF NOT EXISTS idx_actions_thread
            ON actions (thread_id, created_at);

        CREATE TABLE IF NOT EXISTS artifacts (
            id            TEXT PRIMARY KEY NOT NULL,
            project_id    TEXT NOT NULL REFERENCES projects (id) ON DELETE CASCADE,
            thread_id     TEXT REFERENCES threads (id) ON DELETE SET NULL,
            action_id     TEXT REFERENCES actions (id) ON DELETE SET NULL,
            type          TEXT NOT NULL,
            storage_path  TEXT NOT NULL,
            filename      TEXT NOT NULL,
            metadata      TEXT NOT NULL DEFAULT '{}',
            version       INTEGER NOT NULL DEFAULT 1,
            created_at    TEXT NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_artifacts_project
            ON artifacts (project_id, created_at DESC);

        -- No foreign keys: audit history outlives the rows it references.
        CREATE TABLE IF NOT EXISTS audit_events (
            sequence    INTEGER PRIMARY KEY NOT NULL,
            event_type  TEXT NOT NULL,
            actor       TEXT NOT NULL,
            project_id  TEXT,
            thread_id   TEXT,
            action_id   TEXT,
            record      TEXT NOT NULL,
            prev_hash   TEXT NOT NULL,
            this_hash   TEXT NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_audit_project ON audit_events (project_id);
        CREATE INDEX IF NOT EXISTS idx_audit_thread ON audit_events (thread_id);
        CREATE INDEX IF NOT EXISTS idx_audit_action ON audit_events (action_id);

        INSERT INTO schema_migrations (version, name) VALUES (1, 'initial_schema');
        ",
    )
    .map_err(storage("failed to apply migration v1"))?;

    Ok(())
}
