//! The action state machine.
//!
//! ```text
//! DRAFT     -> APPROVED | CANCELED
//! APPROVED  -> EXECUTING | CANCELED
//! EXECUTING -> DONE | FAILED
//! ```
//!
//! Every accepted transition is staged as a guarded update plus exactly one
//! `action.<status>` audit record in the same unit of work.

use chrono::Utc;

use caravel_contracts::{
    action::{Action, ActionStatus},
    audit::{event_types, AuditRecord},
    error::{CaravelError, CaravelResult},
    ids::ProjectId,
};

use crate::unit_of_work::UnitOfWork;

/// Check that `from -> to` is an edge of the lifecycle.
pub fn validate_transition(from: ActionStatus, to: ActionStatus) -> CaravelResult<()> {
    if from.can_transition_to(to) {
        Ok(())
    } else {
        Err(CaravelError::InvalidTransition { from, to })
    }
}

/// Return a copy of `action` moved to `to`, with `updated_at` refreshed.
///
/// Pure: nothing is written until the copy is staged and committed.
pub fn advance(action: &Action, to: ActionStatus) -> CaravelResult<Action> {
    validate_transition(action.status, to)?;
    Ok(Action {
        status: to,
        updated_at: Utc::now(),
        ..action.clone()
    })
}

/// Stage `next` as an update guarded on `from`, plus its transition record.
pub fn stage_transition(
    work: &mut UnitOfWork,
    from: ActionStatus,
    next: &Action,
    actor: &str,
    project_id: Option<ProjectId>,
) {
    work.update_action(next.clone(), from);
    work.audit(
        AuditRecord::with_status(actor, event_types::for_status(next.status), next.status)
            .project(project_id)
            .thread(next.thread_id)
            .action(next.id),
    );
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use caravel_contracts::{
        action::PolicyMode,
        ids::{ActionId, ThreadId},
    };

    use super::*;
    use crate::unit_of_work::ActionWrite;

    fn action_in(status: ActionStatus) -> Action {
        let now = Utc::now();
        Action {
            id: ActionId::new(),
            thread_id: ThreadId::new(),
            action_type: "stub.echo".to_string(),
            policy_mode: PolicyMode::Execute,
            status,
            payload: json!({ "x": 1 }),
            result: None,
            approved_by: None,
            approved_at: None,
            idempotency_key: "k".to_string(),
            created_at: now,
            updated_at: now,
        }
    }

    const ALLOWED: [(ActionStatus, ActionStatus); 6] = [
        (ActionStatus::Draft, ActionStatus::Approved),
        (ActionStatus::Draft, ActionStatus::Canceled),
        (ActionStatus::Approved, ActionStatus::Executing),
        (ActionStatus::Approved, ActionStatus::Canceled),
        (ActionStatus::Executing, ActionStatus::Done),
        (ActionStatus::Executing, ActionStatus::Failed),
    ];

    #[test]
    fn allowed_edges_validate() {
        for (from, to) in ALLOWED {
            assert!(validate_transition(from, to).is_ok(), "{from} -> {to} must be allowed");
        }
    }

    #[test]
    fn every_other_pair_is_invalid_transition() {
        for from in ActionStatus::ALL {
            for to in ActionStatus::ALL {
                if ALLOWED.contains(&(from, to)) {
                    continue;
                }
                match validate_transition(from, to) {
                    Err(CaravelError::InvalidTransition { from: f, to: t }) => {
                        assert_eq!((f, t), (from, to));
                    }
                    other => panic!("{from} -> {to} must be rejected, got {:?}", other),
                }
            }
        }
    }

    #[test]
    fn advance_leaves_original_untouched() {
        let draft = action_in(ActionStatus::Draft);
        let approved = advance(&draft, ActionStatus::Approved).unwrap();

        assert_eq!(draft.status, ActionStatus::Draft);
        assert_eq!(approved.status, ActionStatus::Approved);
        assert_eq!(approved.id, draft.id);
        assert!(approved.updated_at >= draft.updated_at);
    }

    #[test]
    fn advance_rejects_back_edge() {
        let done = action_in(ActionStatus::Done);
        assert!(matches!(
            advance(&done, ActionStatus::Executing),
            Err(CaravelError::InvalidTransition { .. })
        ));
    }

    #[test]
    fn stage_transition_writes_guarded_update_and_one_record() {
        let draft = action_in(ActionStatus::Draft);
        let next = advance(&draft, ActionStatus::Canceled).unwrap();
        let project = ProjectId::new();

        let mut work = UnitOfWork::new();
        stage_transition(&mut work, draft.status, &next, "alice", Some(project));

        match &work.writes()[0] {
            ActionWrite::Update { action, expected_status } => {
                assert_eq!(*expected_status, ActionStatus::Draft);
                assert_eq!(action.status, ActionStatus::Canceled);
            }
            other => panic!("expected guarded update, got {:?}", other),
        }

        let records = work.audit_records();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].event_type, "action.canceled");
        assert_eq!(records[0].actor, "alice");
        assert_eq!(records[0].payload, json!({ "status": "CANCELED" }));
        assert_eq!(records[0].project_id, Some(project));
        assert_eq!(records[0].action_id, Some(draft.id));
    }
}
