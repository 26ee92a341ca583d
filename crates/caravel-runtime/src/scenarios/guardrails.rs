//! Guardrails scenario: every rejection the lifecycle enforces.
//!
//! | Attempt                                  | Outcome                      |
//! |------------------------------------------|------------------------------|
//! | approve from an untrusted channel        | `ChannelNotAllowed`          |
//! | execute a DRAFT action                   | `NotApproved`                |
//! | execute an approved non-EXECUTE action   | `PolicyModeNotExecutable`    |
//! | approve again as someone else            | `AlreadyApprovedByOther`     |
//! | approve again as the same approver       | accepted, nothing written    |
//! | execute a DONE action                    | `NotApproved`                |
//! | cancel a DONE action                     | `InvalidTransition`          |

use serde_json::json;

use caravel_contracts::{
    action::{NewAction, PolicyMode},
    error::{CaravelError, CaravelResult},
    records::{Channel, Thread},
};
use caravel_core::STUB_ECHO;

use super::{print_action, print_audit_trail, print_chain_integrity, print_rejection, Workspace};
use crate::service::ActionService;

/// Returns the thread the scenario ran in.
pub fn run_scenario(service: &ActionService) -> CaravelResult<Thread> {
    println!("=== Scenario: Guardrails ===");
    println!();

    let ws = Workspace::open(service, "guardrails")?;
    let trusted: Vec<&str> = service.gate().trusted_channels().iter().map(|c| c.as_str()).collect();
    println!("  Trusted approval channels:   {}", trusted.join(", "));

    let echo = |label: &str, mode: PolicyMode| {
        NewAction::new(
            ws.thread.id,
            STUB_ECHO,
            mode,
            json!({ "text": label }),
            ws.key(label),
        )
    };

    // ── Approval channel ──────────────────────────────────────────────────────

    let (action, _) = service.create_action(echo("channel", PolicyMode::Execute))?;
    print_rejection(
        "Approve via telegram:",
        service.approve_action(&action.id, "alice", Channel::Telegram),
        |e| matches!(e, CaravelError::ChannelNotAllowed { .. }),
    );
    print_rejection("Execute while DRAFT:", service.execute_action(&action.id), |e| {
        matches!(e, CaravelError::NotApproved { .. })
    });

    // ── Policy mode ───────────────────────────────────────────────────────────

    let (draft_only, _) = service.create_action(echo("draft-only", PolicyMode::Draft))?;
    service.approve_action(&draft_only.id, "alice", Channel::Web)?;
    print_rejection(
        "Execute policy_mode DRAFT:",
        service.execute_action(&draft_only.id),
        |e| matches!(e, CaravelError::PolicyModeNotExecutable { .. }),
    );

    // ── Approver conflicts ────────────────────────────────────────────────────

    let (action, _) = service.create_action(echo("approvers", PolicyMode::Execute))?;
    service.approve_action(&action.id, "alice", Channel::Web)?;
    print_rejection(
        "Approve again as bob:",
        service.approve_action(&action.id, "bob", Channel::Web),
        |e| matches!(e, CaravelError::AlreadyApprovedByOther { .. }),
    );
    let again = service.approve_action(&action.id, "alice", Channel::Web)?;
    print_action("Approve again as alice:", &again);

    // ── Terminal states ───────────────────────────────────────────────────────

    let done = service.execute_action(&action.id)?;
    print_action("Executed:", &done);
    print_rejection("Execute a DONE action:", service.execute_action(&action.id), |e| {
        matches!(e, CaravelError::NotApproved { .. })
    });
    print_rejection("Cancel a DONE action:", service.cancel_action(&action.id, "alice"), |e| {
        matches!(e, CaravelError::InvalidTransition { .. })
    });
    print_audit_trail(service, &done)?;

    print_chain_integrity(service)?;
    println!();
    Ok(ws.thread)
}

#[cfg(test)]
mod tests {
    use caravel_audit::AuditFilter;
    use caravel_contracts::action::ActionStatus;

    use super::*;
    use crate::test_support::TestRuntime;

    #[test]
    fn test_guardrails_scenario_outcomes() {
        let rt = TestRuntime::new();
        let thread = run_scenario(&rt.service).unwrap();

        let actions = rt.service.list_actions(&thread.id).unwrap();
        let summary: Vec<(ActionStatus, Option<&str>)> = actions
            .iter()
            .map(|a| (a.status, a.approved_by.as_deref()))
            .collect();
        assert_eq!(
            summary,
            vec![
                (ActionStatus::Draft, None),
                (ActionStatus::Approved, Some("alice")),
                (ActionStatus::Done, Some("alice")),
            ]
        );

        // Rejections and the repeated approval write nothing.
        let counts: Vec<usize> = actions
            .iter()
            .map(|a| rt.service.list_audit(&AuditFilter::for_action(a.id)).unwrap().len())
            .collect();
        assert_eq!(counts, vec![1, 2, 6]);
        assert!(rt.service.verify_audit_chain().unwrap());
    }

    #[test]
    fn test_trusted_telegram_allows_approval() {
        let rt = TestRuntime::with_channels(vec![Channel::Web, Channel::Telegram]);
        let thread = run_scenario(&rt.service).unwrap();

        // Approved over telegram, so the "execute while DRAFT" step runs it.
        let first = &rt.service.list_actions(&thread.id).unwrap()[0];
        assert_eq!(first.status, ActionStatus::Done);
        assert_eq!(first.approved_by.as_deref(), Some("alice"));
    }
}
