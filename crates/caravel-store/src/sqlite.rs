//! SQLite-backed record store.
//!
//! Uniqueness of `idempotency_key` is a UNIQUE index and guarded updates are
//! `UPDATE ... WHERE id = ? AND status = ?`, so the database itself decides
//! every race. Each unit of work runs in one IMMEDIATE transaction; audit
//! events are sealed against the last stored event inside it.

use std::path::Path;

use rusqlite::{params, Connection, ErrorCode, OptionalExtension, Params, Row, TransactionBehavior};
use tracing::debug;

use caravel_audit::{seal_records, AuditEvent, AuditFilter, verify_chain};
use caravel_contracts::{
    action::{Action, ActionStatus},
    error::{CaravelError, CaravelResult},
    ids::{ActionId, ArtifactId, ProjectId, ThreadId},
    records::{Artifact, ArtifactFilter, Message, Project, Thread},
};
use caravel_core::{ActionWrite, RecordStore, UnitOfWork};

use crate::{
    db::{storage, Database},
    rows::{
        action_from_row, artifact_from_row, audit_event_from_row, json_text, message_from_row,
        project_from_row, thread_from_row, ts, ACTION_COLUMNS, ARTIFACT_COLUMNS, AUDIT_COLUMNS,
        MESSAGE_COLUMNS, PROJECT_COLUMNS, THREAD_COLUMNS,
    },
};

#[derive(Debug)]
pub struct SqliteStore {
    db: Database,
}

impl SqliteStore {
    /// Open (or create) the database file at `path`.
    pub fn open(path: impl AsRef<Path>) -> CaravelResult<Self> {
        Ok(Self {
            db: Database::open(path.as_ref())?,
        })
    }

    /// A private in-memory database, gone when the store is dropped.
    pub fn in_memory() -> CaravelResult<Self> {
        Ok(Self {
            db: Database::in_memory()?,
        })
    }
}

// ── Query helpers ─────────────────────────────────────────────────────────────

fn query_all<T, P>(
    conn: &Connection,
    sql: &str,
    params: P,
    decode: fn(&Row<'_>) -> CaravelResult<T>,
) -> CaravelResult<Vec<T>>
where
    P: Params,
{
    let mut stmt = conn.prepare(sql).map_err(storage("failed to prepare query"))?;
    let rows = stmt
        .query_map(params, |row| Ok(decode(row)))
        .map_err(storage("failed to run query"))?;

    let mut out = Vec::new();
    for row in rows {
        out.push(row.map_err(storage("failed to read row"))??);
    }
    Ok(out)
}

fn query_one<T, P>(
    conn: &Connection,
    sql: &str,
    params: P,
    decode: fn(&Row<'_>) -> CaravelResult<T>,
) -> CaravelResult<Option<T>>
where
    P: Params,
{
    conn.query_row(sql, params, |row| Ok(decode(row)))
        .optional()
        .map_err(storage("failed to run query"))?
        .transpose()
}

/// `table` is always one of this module's literal table names.
fn exists(conn: &Connection, table: &str, id: String) -> CaravelResult<bool> {
    conn.query_row(
        &format!("SELECT EXISTS (SELECT 1 FROM {table} WHERE id = ?1)"),
        params![id],
        |row| row.get(0),
    )
    .map_err(storage("failed to check existence"))
}

fn is_unique_violation(err: &rusqlite::Error, column: &str) -> bool {
    match err {
        rusqlite::Error::SqliteFailure(e, Some(message)) => {
            e.code == ErrorCode::ConstraintViolation && message.contains(column)
        }
        _ => false,
    }
}

fn opt_id(id: Option<impl ToString>) -> Option<String> {
    id.map(|id| id.to_string())
}

// ── Action writes ─────────────────────────────────────────────────────────────

fn insert_action(conn: &Connection, action: &Action) -> CaravelResult<()> {
    let key_taken: bool = conn
        .query_row(
            "SELECT EXISTS (SELECT 1 FROM actions WHERE idempotency_key = ?1)",
            params![action.idempotency_key],
            |row| row.get(0),
        )
        .map_err(storage("failed to check idempotency key"))?;
    if key_taken {
        return Err(CaravelError::DuplicateIdempotencyKey {
            key: action.idempotency_key.clone(),
        });
    }
    if !exists(conn, "threads", action.thread_id.to_string())? {
        return Err(CaravelError::not_found("thread", action.thread_id));
    }

    conn.execute(
        &format!("INSERT INTO actions ({ACTION_COLUMNS}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)"),
        params![
            action.id.to_string(),
            action.thread_id.to_string(),
            action.action_type,
            action.policy_mode.as_str(),
            action.status.as_str(),
            json_text(&action.payload),
            action.result.as_ref().map(json_text),
            action.approved_by,
            action.approved_at.as_ref().map(ts),
            action.idempotency_key,
            ts(&action.created_at),
            ts(&action.updated_at),
        ],
    )
    .map_err(|e| {
        if is_unique_violation(&e, "idempotency_key") {
            CaravelError::DuplicateIdempotencyKey {
                key: action.idempotency_key.clone(),
            }
        } else {
            CaravelError::Storage {
                reason: format!("failed to insert action: {e}"),
            }
        }
    })?;
    Ok(())
}

fn update_action(conn: &Connection, action: &Action, expected: ActionStatus) -> CaravelResult<()> {
    let changed = conn
        .execute(
            "UPDATE actions
             SET status = ?1, result = ?2, approved_by = ?3, approved_at = ?4, updated_at = ?5
             WHERE id = ?6 AND status = ?7",
            params![
                action.status.as_str(),
                action.result.as_ref().map(json_text),
                action.approved_by,
                action.approved_at.as_ref().map(ts),
                ts(&action.updated_at),
                action.id.to_string(),
                expected.as_str(),
            ],
        )
        .map_err(storage("failed to update action"))?;

    if changed == 1 {
        return Ok(());
    }

    let actual: Option<String> = conn
        .query_row(
            "SELECT status FROM actions WHERE id = ?1",
            params![action.id.to_string()],
            |row| row.get(0),
        )
        .optional()
        .map_err(storage("failed to read action status"))?;

    match actual {
        None => Err(CaravelError::not_found("action", action.id)),
        Some(actual) => Err(CaravelError::StaleStatus {
            action_id: action.id.to_string(),
            expected,
            actual: actual.parse()?,
        }),
    }
}

// ── Audit chain ───────────────────────────────────────────────────────────────

fn chain_tail(conn: &Connection) -> CaravelResult<(u64, String)> {
    let tail: Option<(i64, String)> = conn
        .query_row(
            "SELECT sequence, this_hash FROM audit_events ORDER BY sequence DESC LIMIT 1",
            [],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )
        .optional()
        .map_err(storage("failed to read audit chain tail"))?;

    Ok(match tail {
        Some((sequence, hash)) => (sequence as u64 + 1, hash),
        None => (0, AuditEvent::GENESIS_HASH.to_string()),
    })
}

fn insert_audit_event(conn: &Connection, event: &AuditEvent) -> CaravelResult<()> {
    let record = serde_json::to_string(&event.record).map_err(|e| CaravelError::AuditWriteFailed {
        reason: format!("failed to serialize audit record: {e}"),
    })?;

    conn.execute(
        "INSERT INTO audit_events
             (sequence, event_type, actor, project_id, thread_id, action_id, record, prev_hash, this_hash)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
        params![
            event.sequence as i64,
            event.record.event_type,
            event.record.actor,
            opt_id(event.record.project_id),
            opt_id(event.record.thread_id),
            opt_id(event.record.action_id),
            record,
            event.prev_hash,
            event.this_hash,
        ],
    )
    .map_err(|e| CaravelError::AuditWriteFailed {
        reason: format!("failed to insert audit event: {e}"),
    })?;
    Ok(())
}

// ── RecordStore ───────────────────────────────────────────────────────────────

impl RecordStore for SqliteStore {
    fn insert_project(&self, project: &Project) -> CaravelResult<()> {
        self.db.with_conn(|conn| {
            let slug_taken: bool = conn
                .query_row(
                    "SELECT EXISTS (SELECT 1 FROM projects WHERE slug = ?1)",
                    params![project.slug],
                    |row| row.get(0),
                )
                .map_err(storage("failed to check project slug"))?;
            if slug_taken {
                return Err(CaravelError::AlreadyExists {
                    kind: "project",
                    id: project.slug.clone(),
                });
            }

            conn.execute(
                &format!("INSERT INTO projects ({PROJECT_COLUMNS}) VALUES (?1, ?2, ?3, ?4, ?5, ?6)"),
                params![
                    project.id.to_string(),
                    project.slug,
                    project.name,
                    json_text(&project.settings),
                    ts(&project.created_at),
                    ts(&project.updated_at),
                ],
            )
            .map_err(|e| {
                if is_unique_violation(&e, "slug") {
                    CaravelError::AlreadyExists {
                        kind: "project",
                        id: project.slug.clone(),
                    }
                } else {
                    CaravelError::Storage {
                        reason: format!("failed to insert project: {e}"),
                    }
                }
            })?;
            Ok(())
        })
    }

    fn project(&self, id: &ProjectId) -> CaravelResult<Option<Project>> {
        self.db.with_conn(|conn| {
            query_one(
                conn,
                &format!("SELECT {PROJECT_COLUMNS} FROM projects WHERE id = ?1"),
                params![id.to_string()],
                project_from_row,
            )
        })
    }

    fn insert_thread(&self, thread: &Thread) -> CaravelResult<()> {
        self.db.with_conn(|conn| {
            if !exists(conn, "projects", thread.project_id.to_string())? {
                return Err(CaravelError::not_found("project", thread.project_id));
            }
            conn.execute(
                &format!("INSERT INTO threads ({THREAD_COLUMNS}) VALUES (?1, ?2, ?3, ?4, ?5, ?6)"),
                params![
                    thread.id.to_string(),
                    thread.project_id.to_string(),
                    thread.title,
                    json_text(&thread.tags),
                    ts(&thread.created_at),
                    ts(&thread.updated_at),
                ],
            )
            .map_err(storage("failed to insert thread"))?;
            Ok(())
        })
    }

    fn thread(&self, id: &ThreadId) -> CaravelResult<Option<Thread>> {
        self.db.with_conn(|conn| {
            query_one(
                conn,
                &format!("SELECT {THREAD_COLUMNS} FROM threads WHERE id = ?1"),
                params![id.to_string()],
                thread_from_row,
            )
        })
    }

    fn insert_message(&self, message: &Message) -> CaravelResult<()> {
        self.db.with_conn(|conn| {
            if !exists(conn, "threads", message.thread_id.to_string())? {
                return Err(CaravelError::not_found("thread", message.thread_id));
            }
            conn.execute(
                &format!("INSERT INTO messages ({MESSAGE_COLUMNS}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)"),
                params![
                    message.id.to_string(),
                    message.thread_id.to_string(),
                    message.channel.as_str(),
                    message.role.as_str(),
                    message.content,
                    json_text(&message.meta),
                    ts(&message.created_at),
                ],
            )
            .map_err(storage("failed to insert message"))?;
            Ok(())
        })
    }

    fn messages_for_thread(&self, thread_id: &ThreadId) -> CaravelResult<Vec<Message>> {
        self.db.with_conn(|conn| {
            query_all(
                conn,
                &format!(
                    "SELECT {MESSAGE_COLUMNS} FROM messages WHERE thread_id = ?1 \
                     ORDER BY created_at ASC, rowid ASC"
                ),
                params![thread_id.to_string()],
                message_from_row,
            )
        })
    }

    fn action(&self, id: &ActionId) -> CaravelResult<Option<Action>> {
        self.db.with_conn(|conn| {
            query_one(
                conn,
                &format!("SELECT {ACTION_COLUMNS} FROM actions WHERE id = ?1"),
                params![id.to_string()],
                action_from_row,
            )
        })
    }

    fn action_by_idempotency_key(&self, key: &str) -> CaravelResult<Option<Action>> {
        self.db.with_conn(|conn| {
            query_one(
                conn,
                &format!("SELECT {ACTION_COLUMNS} FROM actions WHERE idempotency_key = ?1"),
                params![key],
                action_from_row,
            )
        })
    }

    fn actions_for_thread(&self, thread_id: &ThreadId) -> CaravelResult<Vec<Action>> {
        self.db.with_conn(|conn| {
            query_all(
                conn,
                &format!(
                    "SELECT {ACTION_COLUMNS} FROM actions WHERE thread_id = ?1 \
                     ORDER BY created_at ASC, rowid ASC"
                ),
                params![thread_id.to_string()],
                action_from_row,
            )
        })
    }

    fn commit(&self, work: UnitOfWork) -> CaravelResult<Vec<AuditEvent>> {
        work.validate_audit()?;
        let (writes, records) = work.into_parts();

        self.db.with_conn(|conn| {
            // Dropping `tx` without commit rolls everything back.
            let tx = conn
                .transaction_with_behavior(TransactionBehavior::Immediate)
                .map_err(storage("failed to begin transaction"))?;

            for write in &writes {
                match write {
                    ActionWrite::Insert(action) => insert_action(&tx, action)?,
                    ActionWrite::Update {
                        action,
                        expected_status,
                    } => update_action(&tx, action, *expected_status)?,
                }
            }

            let (next_sequence, prev_hash) = chain_tail(&tx)?;
            let sealed = seal_records(next_sequence, &prev_hash, &records);
            for event in &sealed {
                insert_audit_event(&tx, event)?;
            }

            tx.commit().map_err(storage("failed to commit transaction"))?;
            debug!(
                writes = writes.len(),
                events = sealed.len(),
                "sqlite store committed unit of work"
            );
            Ok(sealed)
        })
    }

    fn insert_artifact(&self, artifact: &Artifact) -> CaravelResult<()> {
        self.db.with_conn(|conn| {
            if !exists(conn, "projects", artifact.project_id.to_string())? {
                return Err(CaravelError::not_found("project", artifact.project_id));
            }
            if let Some(thread_id) = artifact.thread_id {
                if !exists(conn, "threads", thread_id.to_string())? {
                    return Err(CaravelError::not_found("thread", thread_id));
                }
            }
            if let Some(action_id) = artifact.action_id {
                if !exists(conn, "actions", action_id.to_string())? {
                    return Err(CaravelError::not_found("action", action_id));
                }
            }

            conn.execute(
                &format!(
                    "INSERT INTO artifacts ({ARTIFACT_COLUMNS}) \
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)"
                ),
                params![
                    artifact.id.to_string(),
                    artifact.project_id.to_string(),
                    opt_id(artifact.thread_id),
                    opt_id(artifact.action_id),
                    artifact.artifact_type,
                    artifact.storage_path,
                    artifact.filename,
                    json_text(&artifact.metadata),
                    artifact.version,
                    ts(&artifact.created_at),
                ],
            )
            .map_err(|e| {
                if is_unique_violation(&e, "artifacts.id") {
                    CaravelError::AlreadyExists {
                        kind: "artifact",
                        id: artifact.id.to_string(),
                    }
                } else {
                    CaravelError::Storage {
                        reason: format!("failed to insert artifact: {e}"),
                    }
                }
            })?;
            Ok(())
        })
    }

    fn artifact(&self, id: &ArtifactId) -> CaravelResult<Option<Artifact>> {
        self.db.with_conn(|conn| {
            query_one(
                conn,
                &format!("SELECT {ARTIFACT_COLUMNS} FROM artifacts WHERE id = ?1"),
                params![id.to_string()],
                artifact_from_row,
            )
        })
    }

    fn artifacts(&self, filter: &ArtifactFilter) -> CaravelResult<Vec<Artifact>> {
        let limit = filter.limit.map_or(-1, |l| l as i64);
        self.db.with_conn(|conn| {
            query_all(
                conn,
                &format!(
                    "SELECT {ARTIFACT_COLUMNS} FROM artifacts
                     WHERE (?1 IS NULL OR project_id = ?1)
                       AND (?2 IS NULL OR thread_id = ?2)
                       AND (?3 IS NULL OR action_id = ?3)
                     ORDER BY created_at DESC, rowid DESC
                     LIMIT ?4"
                ),
                params![
                    opt_id(filter.project_id),
                    opt_id(filter.thread_id),
                    opt_id(filter.action_id),
                    limit,
                ],
                artifact_from_row,
            )
        })
    }

    fn audit_events(&self, filter: &AuditFilter) -> CaravelResult<Vec<AuditEvent>> {
        let limit = filter.limit.map_or(-1, |l| l as i64);
        let mut events = self.db.with_conn(|conn| {
            query_all(
                conn,
                &format!(
                    "SELECT {AUDIT_COLUMNS} FROM audit_events
                     WHERE (?1 IS NULL OR project_id = ?1)
                       AND (?2 IS NULL OR thread_id = ?2)
                       AND (?3 IS NULL OR action_id = ?3)
                     ORDER BY sequence DESC
                     LIMIT ?4"
                ),
                params![
                    opt_id(filter.project_id),
                    opt_id(filter.thread_id),
                    opt_id(filter.action_id),
                    limit,
                ],
                audit_event_from_row,
            )
        })?;
        // Most recent N, returned in chain order.
        events.reverse();
        Ok(events)
    }

    fn verify_audit_chain(&self) -> CaravelResult<bool> {
        let events = self.db.with_conn(|conn| {
            query_all(
                conn,
                &format!("SELECT {AUDIT_COLUMNS} FROM audit_events ORDER BY sequence ASC"),
                [],
                audit_event_from_row,
            )
        })?;
        Ok(verify_chain(&events))
    }
}
