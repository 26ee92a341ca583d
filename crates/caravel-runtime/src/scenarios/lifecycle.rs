//! Lifecycle scenario: `stub.echo` from DRAFT to DONE.
//!
//! Also runs an action type with no registered handler through the default
//! handler, and cancels a DRAFT action.

use serde_json::json;

use caravel_contracts::{
    action::{NewAction, PolicyMode},
    error::CaravelResult,
    records::{Channel, Role, Thread},
};
use caravel_core::STUB_ECHO;

use super::{print_action, print_audit_trail, print_chain_integrity, Workspace};
use crate::service::ActionService;

/// Action type with no handler, served by the default handler.
pub const UNHANDLED_TYPE: &str = "report.generate";

/// Returns the thread the scenario ran in.
pub fn run_scenario(service: &ActionService) -> CaravelResult<Thread> {
    println!("=== Scenario: Action lifecycle ===");
    println!();

    let ws = Workspace::open(service, "lifecycle")?;
    service.post_message(
        &ws.thread.id,
        Channel::Web,
        Role::User,
        "Please echo a greeting back to me.",
        json!({}),
    )?;

    // ── Echo: DRAFT → APPROVED → EXECUTING → DONE ─────────────────────────────

    let request = NewAction::new(
        ws.thread.id,
        STUB_ECHO,
        PolicyMode::Execute,
        json!({ "text": "hello from caravel" }),
        ws.key("echo"),
    )
    .with_actor("alice");
    let (action, _) = service.create_action(request)?;
    print_action("Created:", &action);

    let approved = service.approve_action(&action.id, "alice", Channel::Web)?;
    print_action("Approved by alice (web):", &approved);

    let done = service.execute_action(&action.id)?;
    print_action("Executed:", &done);
    if let Some(result) = &done.result {
        println!("  Result:                      {result}");
    }
    print_audit_trail(service, &done)?;
    println!();

    // ── No handler registered: default handler ────────────────────────────────

    let request = NewAction::new(
        ws.thread.id,
        UNHANDLED_TYPE,
        PolicyMode::Execute,
        json!({ "period": "2024-Q4" }),
        ws.key("default"),
    );
    let (action, _) = service.create_action(request)?;
    service.approve_action(&action.id, "alice", Channel::Web)?;
    let done = service.execute_action(&action.id)?;
    print_action("Default handler:", &done);
    if let Some(note) = done.result.as_ref().and_then(|r| r.get("note")) {
        println!("  Note:                        {note}");
    }
    println!();

    // ── Cancel a draft ────────────────────────────────────────────────────────

    let request = NewAction::new(
        ws.thread.id,
        STUB_ECHO,
        PolicyMode::Execute,
        json!({ "text": "never sent" }),
        ws.key("cancel"),
    );
    let (action, _) = service.create_action(request)?;
    let canceled = service.cancel_action(&action.id, "alice")?;
    print_action("Canceled by alice:", &canceled);
    print_audit_trail(service, &canceled)?;

    let actions = service.list_actions(&ws.thread.id)?;
    println!("  Actions on thread:           {}", actions.len());
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
    fn test_lifecycle_scenario_outcomes() {
        let rt = TestRuntime::new();
        let thread = run_scenario(&rt.service).unwrap().id;

        let actions = rt.service.list_actions(&thread).unwrap();
        let statuses: Vec<ActionStatus> = actions.iter().map(|a| a.status).collect();
        assert_eq!(
            statuses,
            vec![ActionStatus::Done, ActionStatus::Done, ActionStatus::Canceled]
        );

        let echo = &actions[0];
        assert_eq!(echo.approved_by.as_deref(), Some("alice"));
        assert_eq!(
            echo.result.as_ref().unwrap()["data"]["echo"]["text"],
            "hello from caravel"
        );
        assert!(actions[1].result.as_ref().unwrap()["note"]
            .as_str()
            .unwrap()
            .contains(UNHANDLED_TYPE));

        let types: Vec<String> = rt
            .service
            .list_audit(&AuditFilter::for_action(echo.id))
            .unwrap()
            .into_iter()
            .map(|e| e.record.event_type)
            .collect();
        assert_eq!(
            types,
            vec![
                "action.created",
                "action.approved",
                "action.execute_attempt",
                "action.executing",
                "action.done",
                "action.execute_succeeded",
            ]
        );
        assert_eq!(rt.service.list_messages(&thread).unwrap().len(), 1);
        assert!(rt.service.verify_audit_chain().unwrap());
    }
}
