//! # caravel-artifacts
//!
//! Keyed blob storage for action outputs.
//!
//! [`FsArtifactStore`] writes bytes to the local filesystem and records
//! their metadata through a [`caravel_core::RecordStore`].
//! [`ArtifactStoreHandler`] exposes it to approved actions of type
//! `artifact.store`.

pub mod fs;
pub mod handler;

pub use fs::{safe_filename, FsArtifactStore, ARTIFACTS_PREFIX};
pub use handler::{ArtifactStoreHandler, ARTIFACT_STORE};

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use base64::{engine::general_purpose::STANDARD, Engine as _};
    use serde_json::json;

    use caravel_audit::AuditFilter;
    use caravel_contracts::{
        action::{ActionStatus, NewAction, PolicyMode},
        ids::{ProjectId, ThreadId},
        records::{ArtifactFilter, Project, Thread},
    };
    use caravel_core::{ActionEngine, ArtifactStore, ExecutorRegistry, RecordStore};
    use caravel_store::MemoryStore;

    use super::{ArtifactStoreHandler, FsArtifactStore, ARTIFACT_STORE};

    struct Fixture {
        _dir: tempfile::TempDir,
        records: Arc<MemoryStore>,
        artifacts: Arc<FsArtifactStore>,
        engine: ActionEngine,
        project_id: ProjectId,
        thread_id: ThreadId,
    }

    fn fixture() -> Fixture {
        let dir = tempfile::tempdir().unwrap();
        let records = Arc::new(MemoryStore::new());
        let project = Project::new("acme", "Acme", json!({}));
        let thread = Thread::new(project.id, "ops", json!([]));
        records.insert_project(&project).unwrap();
        records.insert_thread(&thread).unwrap();

        let artifacts = Arc::new(FsArtifactStore::new(dir.path(), records.clone()));
        let mut registry = ExecutorRegistry::with_builtins();
        registry.register(ARTIFACT_STORE, ArtifactStoreHandler::new(artifacts.clone()));
        let engine = ActionEngine::new(records.clone(), Arc::new(registry));

        Fixture {
            _dir: dir,
            records,
            artifacts,
            engine,
            project_id: project.id,
            thread_id: thread.id,
        }
    }

    fn run(fx: &Fixture, payload: serde_json::Value) -> caravel_contracts::action::Action {
        let request = NewAction::new(fx.thread_id, ARTIFACT_STORE, PolicyMode::Execute, payload, "store-1");
        let (action, _) = fx.engine.create_action(request).unwrap();
        fx.engine.approve_action(&action.id, "alice").unwrap();
        fx.engine.execute_action(&action.id).unwrap()
    }

    #[test]
    fn test_store_action_links_artifact_to_action() {
        let fx = fixture();
        let done = run(
            &fx,
            json!({
                "type": "report",
                "filename": "summary.txt",
                "content_base64": STANDARD.encode("quarterly numbers"),
            }),
        );

        assert_eq!(done.status, ActionStatus::Done);
        let result = done.result.unwrap();
        assert_eq!(result["type"], ARTIFACT_STORE);
        let artifact_id = result["data"]["artifact_id"].as_str().unwrap().parse().unwrap();

        let artifact = fx.artifacts.get(&artifact_id).unwrap().unwrap();
        assert_eq!(artifact.project_id, fx.project_id);
        assert_eq!(artifact.thread_id, Some(fx.thread_id));
        assert_eq!(artifact.action_id, Some(done.id));
        assert_eq!(artifact.metadata, json!({}));
        assert_eq!(result["data"]["storage_path"], artifact.storage_path.as_str());
        assert_eq!(fx.artifacts.read_bytes(&artifact).unwrap(), b"quarterly numbers");

        let linked = fx.artifacts.list(&ArtifactFilter::for_action(done.id)).unwrap();
        assert_eq!(linked, vec![artifact]);
    }

    #[test]
    fn test_invalid_base64_fails_action() {
        let fx = fixture();
        let failed = run(
            &fx,
            json!({ "type": "report", "filename": "a.txt", "content_base64": "%%% not base64 %%%" }),
        );

        assert_eq!(failed.status, ActionStatus::Failed);
        let error = failed.result.unwrap()["error"].as_str().unwrap().to_string();
        assert!(error.contains("base64"), "unexpected error: {error}");
        assert!(fx.artifacts.list(&ArtifactFilter::default()).unwrap().is_empty());
    }

    #[test]
    fn test_missing_field_fails_action() {
        let fx = fixture();
        let failed = run(&fx, json!({ "type": "report", "content_base64": "aGk=" }));

        assert_eq!(failed.status, ActionStatus::Failed);
        let error = failed.result.unwrap()["error"].as_str().unwrap().to_string();
        assert!(error.contains("filename"), "unexpected error: {error}");

        let last = fx
            .records
            .audit_events(&AuditFilter::for_action(failed.id))
            .unwrap()
            .pop()
            .unwrap();
        assert_eq!(last.record.event_type, "action.execute_failed");
    }

    #[test]
    fn test_unknown_project_fails_action() {
        let fx = fixture();
        let failed = run(
            &fx,
            json!({
                "type": "report",
                "filename": "a.txt",
                "content_base64": "aGk=",
                "project_id": ProjectId::new().to_string(),
                "metadata": { "k": "v" },
            }),
        );

        assert_eq!(failed.status, ActionStatus::Failed);
        let error = failed.result.unwrap()["error"].as_str().unwrap().to_string();
        assert!(error.contains("not found"), "unexpected error: {error}");
    }
}
