//! # caravel-runtime
//!
//! Wires the caravel crates together from a [`caravel_config::CaravelConfig`]
//! and exposes them as one [`ActionService`].
//!
//! ```rust,ignore
//! let config = CaravelConfig::load(None)?;
//! let service = ActionService::from_config(&config)?;
//!
//! let project = service.create_project("acme", "Acme", json!({}))?;
//! let thread = service.create_thread(&project.id, "ops", json!([]))?;
//! let (action, _) = service.create_action(NewAction::new(
//!     thread.id, "stub.echo", PolicyMode::Execute, json!({"text": "hi"}), "key-1",
//! ))?;
//! service.approve_action(&action.id, "alice", Channel::Web)?;
//! let done = service.execute_action(&action.id)?;
//! ```
//!
//! [`scenarios`] holds the end-to-end runs the demo binary prints.

pub mod bootstrap;
pub mod scenarios;
pub mod service;

#[cfg(test)]
mod test_support;

pub use bootstrap::{default_registry, open_record_store};
pub use service::ActionService;

#[cfg(test)]
mod tests {
    use serde_json::json;

    use caravel_audit::AuditFilter;
    use caravel_config::{CaravelConfig, StorageBackend};
    use caravel_contracts::{
        action::{ActionStatus, NewAction, PolicyMode},
        error::CaravelError,
        ids::{ActionId, ProjectId, ThreadId},
        records::{Channel, Role},
    };

    use super::ActionService;
    use crate::test_support::TestRuntime;

    fn seeded(rt: &TestRuntime) -> ThreadId {
        let project = rt.service.create_project("acme", "Acme", json!({})).unwrap();
        rt.service.create_thread(&project.id, "ops", json!(["ops"])).unwrap().id
    }

    fn echo(thread_id: ThreadId, key: &str) -> NewAction {
        NewAction::new(thread_id, "stub.echo", PolicyMode::Execute, json!({ "n": 1 }), key)
    }

    // ── Wiring ────────────────────────────────────────────────────────────────

    #[test]
    fn test_handlers_include_artifact_store() {
        let rt = TestRuntime::new();
        assert_eq!(rt.service.list_handlers(), vec!["artifact.store", "stub.echo"]);
    }

    #[test]
    fn test_sqlite_state_survives_restart() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = CaravelConfig::default();
        config.storage.backend = StorageBackend::Sqlite;
        config.storage.path = dir.path().join("state.db");
        config.artifacts.root = dir.path().join("blobs");

        let action_id = {
            let service = ActionService::from_config(&config).unwrap();
            let project = service.create_project("acme", "Acme", json!({})).unwrap();
            let thread = service.create_thread(&project.id, "ops", json!([])).unwrap();
            let (action, _) = service.create_action(echo(thread.id, "persist")).unwrap();
            service.approve_action(&action.id, "alice", Channel::Web).unwrap();
            action.id
        };

        let service = ActionService::from_config(&config).unwrap();
        let done = service.execute_action(&action_id).unwrap();
        assert_eq!(done.status, ActionStatus::Done);
        assert_eq!(service.list_audit(&AuditFilter::for_action(action_id)).unwrap().len(), 6);
        assert!(service.verify_audit_chain().unwrap());
    }

    #[test]
    fn test_unreadable_database_path_is_storage_error() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = CaravelConfig::default();
        config.storage.backend = StorageBackend::Sqlite;
        // A directory cannot be opened as a database file.
        config.storage.path = dir.path().to_path_buf();

        let err = ActionService::from_config(&config).unwrap_err();
        assert!(matches!(err, CaravelError::Storage { .. }), "{err}");
    }

    // ── Records ───────────────────────────────────────────────────────────────

    #[test]
    fn test_project_slug_is_unique() {
        let rt = TestRuntime::new();
        rt.service.create_project("acme", "Acme", json!({})).unwrap();
        let err = rt.service.create_project("acme", "Other", json!({})).unwrap_err();
        assert!(matches!(err, CaravelError::AlreadyExists { .. }));
        assert!(err.is_conflict());
    }

    #[test]
    fn test_empty_slug_rejected() {
        let rt = TestRuntime::new();
        let err = rt.service.create_project("  ", "Acme", json!({})).unwrap_err();
        assert!(matches!(err, CaravelError::InvalidInput { .. }));
    }

    #[test]
    fn test_thread_requires_project() {
        let rt = TestRuntime::new();
        let err = rt.service.create_thread(&ProjectId::new(), "ops", json!([])).unwrap_err();
        assert!(err.is_not_found());
    }

    #[test]
    fn test_messages_in_posting_order() {
        let rt = TestRuntime::new();
        let thread = seeded(&rt);
        rt.service
            .post_message(&thread, Channel::Telegram, Role::User, "first", json!({}))
            .unwrap();
        rt.service
            .post_message(&thread, Channel::Web, Role::Assistant, "second", json!({ "model": "x" }))
            .unwrap();

        let contents: Vec<String> = rt
            .service
            .list_messages(&thread)
            .unwrap()
            .into_iter()
            .map(|m| m.content)
            .collect();
        assert_eq!(contents, vec!["first", "second"]);

        let missing = rt.service.list_messages(&ThreadId::new()).unwrap_err();
        assert!(missing.is_not_found());
    }

    // ── Actions ───────────────────────────────────────────────────────────────

    #[test]
    fn test_create_action_unknown_thread() {
        let rt = TestRuntime::new();
        let err = rt.service.create_action(echo(ThreadId::new(), "k")).unwrap_err();
        assert!(matches!(err, CaravelError::NotFound { kind: "thread", .. }));
    }

    #[test]
    fn test_untrusted_channel_checked_before_lookup() {
        let rt = TestRuntime::new();
        let err = rt
            .service
            .approve_action(&ActionId::new(), "alice", Channel::Telegram)
            .unwrap_err();
        assert!(matches!(err, CaravelError::ChannelNotAllowed { channel: Channel::Telegram }));

        let err = rt.service.approve_action(&ActionId::new(), "alice", Channel::Web).unwrap_err();
        assert!(err.is_not_found());
    }

    #[test]
    fn test_untrusted_channel_writes_nothing() {
        let rt = TestRuntime::new();
        let thread = seeded(&rt);
        let (action, _) = rt.service.create_action(echo(thread, "k")).unwrap();

        rt.service
            .approve_action(&action.id, "alice", Channel::Telegram)
            .unwrap_err();

        assert_eq!(rt.service.get_action(&action.id).unwrap(), action);
        assert_eq!(rt.service.list_audit(&AuditFilter::for_action(action.id)).unwrap().len(), 1);
    }

    #[test]
    fn test_list_audit_by_project_and_limit() {
        let rt = TestRuntime::new();
        let thread = seeded(&rt);
        let project_id = rt.service.get_thread(&thread).unwrap().project_id;
        let (action, _) = rt.service.create_action(echo(thread, "k")).unwrap();
        rt.service.approve_action(&action.id, "alice", Channel::Web).unwrap();
        rt.service.execute_action(&action.id).unwrap();

        let all = rt.service.list_audit(&AuditFilter::for_project(project_id)).unwrap();
        assert_eq!(all.len(), 6);

        let last_two = rt
            .service
            .list_audit(&AuditFilter::for_project(project_id).with_limit(2))
            .unwrap();
        let types: Vec<&str> = last_two.iter().map(|e| e.event_type()).collect();
        assert_eq!(types, vec!["action.done", "action.execute_succeeded"]);
        assert!(last_two[0].sequence < last_two[1].sequence);

        let other = rt.service.list_audit(&AuditFilter::for_project(ProjectId::new())).unwrap();
        assert!(other.is_empty());
    }

    #[test]
    fn test_get_missing_artifact() {
        let rt = TestRuntime::new();
        let err = rt
            .service
            .get_artifact(&caravel_contracts::ids::ArtifactId::new())
            .unwrap_err();
        assert!(matches!(err, CaravelError::NotFound { kind: "artifact", .. }));
    }

    // ── Scenarios ─────────────────────────────────────────────────────────────

    #[test]
    fn test_run_all_twice_on_one_database() {
        let rt = TestRuntime::sqlite();
        crate::scenarios::run_all(&rt.service).unwrap();
        crate::scenarios::run_all(&rt.service).unwrap();
        assert!(rt.service.verify_audit_chain().unwrap());
    }
}
