//! Column codecs and row decoders for the SQLite store.

use std::{fmt::Display, str::FromStr};

use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::{types::FromSql, Row};
use serde_json::Value;

use caravel_audit::AuditEvent;
use caravel_contracts::{
    action::Action,
    audit::AuditRecord,
    error::{CaravelError, CaravelResult},
    records::{Artifact, Message, Project, Thread},
};

pub(crate) fn ts(time: &DateTime<Utc>) -> String {
    time.to_rfc3339_opts(SecondsFormat::Nanos, true)
}

pub(crate) fn json_text(value: &Value) -> String {
    value.to_string()
}

fn corrupt(what: &str, detail: impl Display) -> CaravelError {
    CaravelError::Storage {
        reason: format!("corrupt {what} column: {detail}"),
    }
}

fn col<T: FromSql>(row: &Row<'_>, idx: usize) -> CaravelResult<T> {
    row.get(idx).map_err(|e| CaravelError::Storage {
        reason: format!("failed to read column {idx}: {e}"),
    })
}

fn parsed<T>(row: &Row<'_>, idx: usize, what: &str) -> CaravelResult<T>
where
    T: FromStr,
    T::Err: Display,
{
    let raw: String = col(row, idx)?;
    raw.parse().map_err(|e| corrupt(what, e))
}

fn parsed_opt<T>(row: &Row<'_>, idx: usize, what: &str) -> CaravelResult<Option<T>>
where
    T: FromStr,
    T::Err: Display,
{
    let raw: Option<String> = col(row, idx)?;
    raw.map(|s| s.parse().map_err(|e| corrupt(what, e))).transpose()
}

fn json(row: &Row<'_>, idx: usize, what: &str) -> CaravelResult<Value> {
    let raw: String = col(row, idx)?;
    serde_json::from_str(&raw).map_err(|e| corrupt(what, e))
}

fn json_opt(row: &Row<'_>, idx: usize, what: &str) -> CaravelResult<Option<Value>> {
    let raw: Option<String> = col(row, idx)?;
    raw.map(|s| serde_json::from_str(&s).map_err(|e| corrupt(what, e)))
        .transpose()
}

fn time(row: &Row<'_>, idx: usize, what: &str) -> CaravelResult<DateTime<Utc>> {
    let raw: String = col(row, idx)?;
    DateTime::parse_from_rfc3339(&raw)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| corrupt(what, e))
}

fn time_opt(row: &Row<'_>, idx: usize, what: &str) -> CaravelResult<Option<DateTime<Utc>>> {
    let raw: Option<String> = col(row, idx)?;
    raw.map(|s| {
        DateTime::parse_from_rfc3339(&s)
            .map(|t| t.with_timezone(&Utc))
            .map_err(|e| corrupt(what, e))
    })
    .transpose()
}

pub(crate) const PROJECT_COLUMNS: &str = "id, slug, name, settings, created_at, updated_at";

pub(crate) fn project_from_row(row: &Row<'_>) -> CaravelResult<Project> {
    Ok(Project {
        id: parsed(row, 0, "project.id")?,
        slug: col(row, 1)?,
        name: col(row, 2)?,
        settings: json(row, 3, "project.settings")?,
        created_at: time(row, 4, "project.created_at")?,
        updated_at: time(row, 5, "project.updated_at")?,
    })
}

pub(crate) const THREAD_COLUMNS: &str = "id, project_id, title, tags, created_at, updated_at";

pub(crate) fn thread_from_row(row: &Row<'_>) -> CaravelResult<Thread> {
    Ok(Thread {
        id: parsed(row, 0, "thread.id")?,
        project_id: parsed(row, 1, "thread.project_id")?,
        title: col(row, 2)?,
        tags: json(row, 3, "thread.tags")?,
        created_at: time(row, 4, "thread.created_at")?,
        updated_at: time(row, 5, "thread.updated_at")?,
    })
}

pub(crate) const MESSAGE_COLUMNS: &str = "id, thread_id, channel, role, content, meta, created_at";

pub(crate) fn message_from_row(row: &Row<'_>) -> CaravelResult<Message> {
    Ok(Message {
        id: parsed(row, 0, "message.id")?,
        thread_id: parsed(row, 1, "message.thread_id")?,
        channel: parsed(row, 2, "message.channel")?,
        role: parsed(row, 3, "message.role")?,
        content: col(row, 4)?,
        meta: json(row, 5, "message.meta")?,
        created_at: time(row, 6, "message.created_at")?,
    })
}

pub(crate) const ACTION_COLUMNS: &str = "id, thread_id, type, policy_mode, status, payload, result, \
     approved_by, approved_at, idempotency_key, created_at, updated_at";

pub(crate) fn action_from_row(row: &Row<'_>) -> CaravelResult<Action> {
    Ok(Action {
        id: parsed(row, 0, "action.id")?,
        thread_id: parsed(row, 1, "action.thread_id")?,
        action_type: col(row, 2)?,
        policy_mode: parsed(row, 3, "action.policy_mode")?,
        status: parsed(row, 4, "action.status")?,
        payload: json(row, 5, "action.payload")?,
        result: json_opt(row, 6, "action.result")?,
        approved_by: col(row, 7)?,
        approved_at: time_opt(row, 8, "action.approved_at")?,
        idempotency_key: col(row, 9)?,
        created_at: time(row, 10, "action.created_at")?,
        updated_at: time(row, 11, "action.updated_at")?,
    })
}

pub(crate) const ARTIFACT_COLUMNS: &str = "id, project_id, thread_id, action_id, type, storage_path, \
     filename, metadata, version, created_at";

pub(crate) fn artifact_from_row(row: &Row<'_>) -> CaravelResult<Artifact> {
    Ok(Artifact {
        id: parsed(row, 0, "artifact.id")?,
        project_id: parsed(row, 1, "artifact.project_id")?,
        thread_id: parsed_opt(row, 2, "artifact.thread_id")?,
        action_id: parsed_opt(row, 3, "artifact.action_id")?,
        artifact_type: col(row, 4)?,
        storage_path: col(row, 5)?,
        filename: col(row, 6)?,
        metadata: json(row, 7, "artifact.metadata")?,
        version: col(row, 8)?,
        created_at: time(row, 9, "artifact.created_at")?,
    })
}

pub(crate) const AUDIT_COLUMNS: &str = "sequence, record, prev_hash, this_hash";

pub(crate) fn audit_event_from_row(row: &Row<'_>) -> CaravelResult<AuditEvent> {
    let sequence: i64 = col(row, 0)?;
    let raw: String = col(row, 1)?;
    let record: AuditRecord =
        serde_json::from_str(&raw).map_err(|e| corrupt("audit_events.record", e))?;
    Ok(AuditEvent {
        sequence: sequence as u64,
        record,
        prev_hash: col(row, 2)?,
        this_hash: col(row, 3)?,
    })
}
