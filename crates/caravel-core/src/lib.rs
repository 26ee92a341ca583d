//! # caravel-core
//!
//! The action lifecycle engine.
//!
//! ## Overview
//!
//! An action is a governed side effect attached to a conversation thread.
//! It is created as a DRAFT under a caller-chosen idempotency key, approved
//! by a user, and only then executed by the handler registered for its type:
//!
//! ```text
//! DRAFT ──approve──▶ APPROVED ──execute──▶ EXECUTING ──▶ DONE | FAILED
//!   │                   │
//!   └──────cancel───────┴──────▶ CANCELED
//! ```
//!
//! [`ActionEngine`] owns every transition. It commits each step as one
//! [`UnitOfWork`] through a [`RecordStore`], so the status change and its
//! audit event are written together or not at all.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use caravel_core::{ActionEngine, ExecutorRegistry};
//!
//! let engine = ActionEngine::new(store, Arc::new(ExecutorRegistry::with_builtins()));
//! let (action, _created) = engine.create_action(request)?;
//! engine.approve_action(&action.id, "alice")?;
//! let finished = engine.execute_action(&action.id)?;
//! ```

pub mod engine;
pub mod lifecycle;
pub mod registry;
pub mod traits;
pub mod unit_of_work;

#[cfg(test)]
mod test_support;

pub use engine::ActionEngine;
pub use registry::{result_envelope, EchoHandler, ExecutorRegistry, STUB_ECHO};
pub use traits::{ActionHandler, ArtifactStore, HandlerContext, RecordStore};
pub use unit_of_work::{ActionWrite, UnitOfWork};

#[cfg(test)]
mod tests {
    use std::{sync::Arc, thread};

    use serde_json::json;

    use caravel_contracts::{
        action::{Action, ActionStatus, NewAction, PolicyMode},
        audit::AuditRecord,
        error::CaravelError,
        ids::ActionId,
    };

    use super::*;
    use crate::test_support::MockStore;

    #[test]
    fn engine_is_send_and_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<ActionEngine>();
        assert_send_sync::<ExecutorRegistry>();
    }

    #[test]
    fn engine_shares_across_threads() {
        let (store, _project, thread_id) = MockStore::seeded();
        let engine = ActionEngine::new(Arc::new(store), Arc::new(ExecutorRegistry::with_builtins()));

        let handles: Vec<_> = (0..4)
            .map(|i| {
                let engine = engine.clone();
                thread::spawn(move || {
                    let request = NewAction::new(
                        thread_id,
                        "stub.echo",
                        PolicyMode::Execute,
                        json!({ "n": i }),
                        format!("key-{i}"),
                    );
                    engine.create_action(request).unwrap().0
                })
            })
            .collect();

        for handle in handles {
            assert_eq!(handle.join().unwrap().status, ActionStatus::Draft);
        }
        assert_eq!(engine.list_actions(&thread_id).unwrap().len(), 4);
    }

    #[test]
    fn invalid_audit_record_aborts_unit() {
        let (store, _project, thread_id) = MockStore::seeded();
        let now = chrono::Utc::now();
        let action = Action {
            id: ActionId::new(),
            thread_id,
            action_type: "x.op".to_string(),
            policy_mode: PolicyMode::Read,
            status: ActionStatus::Draft,
            payload: json!({}),
            result: None,
            approved_by: None,
            approved_at: None,
            idempotency_key: "k".to_string(),
            created_at: now,
            updated_at: now,
        };

        let mut work = UnitOfWork::new();
        work.insert_action(action.clone());
        work.audit(AuditRecord::new("", "action.created", json!({})));

        assert!(matches!(
            store.commit(work),
            Err(CaravelError::AuditWriteFailed { .. })
        ));
        assert!(store.action(&action.id).unwrap().is_none(), "nothing may be applied");
        assert!(store.action_by_idempotency_key("k").unwrap().is_none());
    }
}
