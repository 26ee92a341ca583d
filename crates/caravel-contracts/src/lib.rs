//! # caravel-contracts
//!
//! Shared types, records, and error contracts for the caravel action runtime.
//!
//! All crates in the workspace import from here. No business logic lives in
//! this crate, only data definitions, the lifecycle edge table, and error
//! types.

pub mod action;
pub mod audit;
pub mod error;
pub mod execution;
pub mod ids;
pub mod records;

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use action::{ActionStatus, NewAction, PolicyMode};
    use audit::{event_types, AuditRecord, SYSTEM_ACTOR};
    use error::CaravelError;
    use ids::{ActionId, ThreadId};
    use records::{Channel, Role};

    // ── Lifecycle edge table ─────────────────────────────────────────────────

    #[test]
    fn draft_and_approved_can_be_canceled() {
        assert!(ActionStatus::Draft.can_transition_to(ActionStatus::Canceled));
        assert!(ActionStatus::Approved.can_transition_to(ActionStatus::Canceled));
        assert!(!ActionStatus::Executing.can_transition_to(ActionStatus::Canceled));
    }

    #[test]
    fn terminal_statuses_have_no_edges() {
        for status in [ActionStatus::Done, ActionStatus::Failed, ActionStatus::Canceled] {
            assert!(status.is_terminal(), "{status} must be terminal");
            for next in ActionStatus::ALL {
                assert!(!status.can_transition_to(next));
            }
        }
        assert!(!ActionStatus::Draft.is_terminal());
    }

    #[test]
    fn no_status_transitions_to_itself() {
        for status in ActionStatus::ALL {
            assert!(!status.can_transition_to(status));
        }
    }

    // ── Wire names ───────────────────────────────────────────────────────────

    #[test]
    fn enums_use_upper_case_wire_names() {
        assert_eq!(serde_json::to_value(ActionStatus::Executing).unwrap(), json!("EXECUTING"));
        assert_eq!(serde_json::to_value(PolicyMode::Execute).unwrap(), json!("EXECUTE"));
        assert_eq!(serde_json::to_value(Channel::Telegram).unwrap(), json!("telegram"));

        assert_eq!("CANCELED".parse::<ActionStatus>().unwrap(), ActionStatus::Canceled);
        assert_eq!("READ".parse::<PolicyMode>().unwrap(), PolicyMode::Read);
        assert_eq!("assistant".parse::<Role>().unwrap(), Role::Assistant);
        assert!("approved".parse::<ActionStatus>().is_err());
    }

    #[test]
    fn new_action_defaults_payload_and_actor() {
        let thread_id = ThreadId::new();
        let request: NewAction = serde_json::from_value(json!({
            "thread_id": thread_id,
            "type": "stub.echo",
            "policy_mode": "DRAFT",
            "idempotency_key": "k-1",
        }))
        .unwrap();

        assert_eq!(request.thread_id, thread_id);
        assert_eq!(request.payload, json!({}));
        assert_eq!(request.actor, SYSTEM_ACTOR);
    }

    #[test]
    fn ids_parse_from_their_display_form() {
        let id = ActionId::new();
        let parsed: ActionId = id.to_string().parse().unwrap();
        assert_eq!(parsed, id);
        assert!("not-a-uuid".parse::<ActionId>().is_err());
    }

    // ── Audit vocabulary ─────────────────────────────────────────────────────

    #[test]
    fn transition_event_type_is_lowercased_status() {
        assert_eq!(event_types::for_status(ActionStatus::Approved), event_types::ACTION_APPROVED);
        assert_eq!(event_types::for_status(ActionStatus::Executing), event_types::ACTION_EXECUTING);
        assert_eq!(event_types::for_status(ActionStatus::Canceled), event_types::ACTION_CANCELED);
    }

    #[test]
    fn status_record_carries_status_payload() {
        let action_id = ActionId::new();
        let record = AuditRecord::with_status("alice", event_types::ACTION_APPROVED, ActionStatus::Approved)
            .action(action_id);

        assert_eq!(record.payload, json!({ "status": "APPROVED" }));
        assert_eq!(record.action_id, Some(action_id));
        assert_eq!(record.project_id, None);
    }

    // ── CaravelError ─────────────────────────────────────────────────────────

    #[test]
    fn invalid_transition_names_both_statuses() {
        let err = CaravelError::InvalidTransition {
            from: ActionStatus::Done,
            to: ActionStatus::Approved,
        };
        let msg = err.to_string();
        assert!(msg.contains("DONE"));
        assert!(msg.contains("APPROVED"));
        assert!(err.is_conflict());
    }

    #[test]
    fn idempotency_conflict_names_key_and_field() {
        let err = CaravelError::IdempotencyConflict {
            key: "idem-7".to_string(),
            field: "payload",
        };
        let msg = err.to_string();
        assert!(msg.contains("idem-7"));
        assert!(msg.contains("payload"));
        assert!(err.is_conflict());
    }

    #[test]
    fn storage_level_errors_are_not_conflicts() {
        let duplicate = CaravelError::DuplicateIdempotencyKey { key: "k".to_string() };
        let storage = CaravelError::Storage { reason: "disk full".to_string() };
        let missing = CaravelError::not_found("thread", ThreadId::new());

        assert!(!duplicate.is_conflict());
        assert!(!storage.is_conflict());
        assert!(!missing.is_conflict());
        assert!(missing.is_not_found());
        assert!(missing.to_string().starts_with("thread not found"));
    }

    #[test]
    fn channel_not_allowed_display() {
        let err = CaravelError::ChannelNotAllowed { channel: Channel::Telegram };
        assert!(err.to_string().contains("telegram"));
        assert!(err.is_conflict());
    }
}
