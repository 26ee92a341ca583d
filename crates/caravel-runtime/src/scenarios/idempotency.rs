//! Idempotency scenario: replay, conflict and a concurrent race on one key.

use std::{collections::HashSet, sync::Barrier, thread};

use serde_json::json;

use caravel_audit::AuditFilter;
use caravel_contracts::{
    action::{Action, NewAction, PolicyMode},
    audit::event_types,
    error::{CaravelError, CaravelResult},
    records::Thread,
};
use caravel_core::STUB_ECHO;

use super::{print_action, print_audit_trail, print_chain_integrity, print_rejection, Workspace};
use crate::service::ActionService;

/// Concurrent creators in the race step.
pub const RACERS: usize = 8;

/// Returns the thread the scenario ran in.
pub fn run_scenario(service: &ActionService) -> CaravelResult<Thread> {
    println!("=== Scenario: Idempotent creation ===");
    println!();

    let ws = Workspace::open(service, "idempotency")?;
    let request = NewAction::new(
        ws.thread.id,
        STUB_ECHO,
        PolicyMode::Execute,
        json!({ "text": "once" }),
        ws.key("replay"),
    );

    let (first, created) = service.create_action(request.clone())?;
    print_action("First request:", &first);
    println!("  Created:                     {created}");

    let (replayed, created) = service.create_action(request.clone())?;
    println!(
        "  Replay:                      same id = {}, created = {created}",
        replayed.id == first.id
    );

    let mut changed = request;
    changed.payload = json!({ "text": "twice" });
    print_rejection("Same key, different payload:", service.create_action(changed), |e| {
        matches!(e, CaravelError::IdempotencyConflict { field: "payload", .. })
    });
    print_audit_trail(service, &first)?;

    // ── Race ──────────────────────────────────────────────────────────────────

    let race = NewAction::new(
        ws.thread.id,
        STUB_ECHO,
        PolicyMode::Execute,
        json!({ "text": "race" }),
        ws.key("race"),
    );
    let barrier = Barrier::new(RACERS);
    let outcomes: Vec<CaravelResult<(Action, bool)>> = thread::scope(|s| {
        let handles: Vec<_> = (0..RACERS)
            .map(|_| {
                let request = race.clone();
                let barrier = &barrier;
                s.spawn(move || {
                    barrier.wait();
                    service.create_action(request)
                })
            })
            .collect();
        handles
            .into_iter()
            .map(|h| {
                h.join().unwrap_or_else(|_| {
                    Err(CaravelError::Storage {
                        reason: "racing creator panicked".to_string(),
                    })
                })
            })
            .collect()
    });

    let mut winners = 0;
    let mut ids = HashSet::new();
    for outcome in outcomes {
        let (action, created) = outcome?;
        winners += usize::from(created);
        ids.insert(action.id);
    }
    let created_events = service
        .list_audit(&AuditFilter {
            thread_id: Some(ws.thread.id),
            ..AuditFilter::default()
        })?
        .into_iter()
        .filter(|e| {
            e.record.event_type == event_types::ACTION_CREATED
                && e.record.action_id.is_some_and(|id| ids.contains(&id))
        })
        .count();
    println!("  Concurrent creators:         {RACERS}");
    println!("  Distinct actions:            {}", ids.len());
    println!("  Reported as created:         {winners}");
    println!("  action.created events:       {created_events}");

    print_chain_integrity(service)?;
    println!();
    Ok(ws.thread)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::TestRuntime;

    #[test]
    fn test_idempotency_scenario_outcomes() {
        let rt = TestRuntime::new();
        let thread = run_scenario(&rt.service).unwrap();

        // One replayed action and one raced action, nothing else.
        let actions = rt.service.list_actions(&thread.id).unwrap();
        assert_eq!(actions.len(), 2);
        assert_eq!(actions[0].payload, json!({ "text": "once" }));
        assert_eq!(actions[1].payload, json!({ "text": "race" }));

        for action in &actions {
            let events = rt.service.list_audit(&AuditFilter::for_action(action.id)).unwrap();
            assert_eq!(events.len(), 1, "exactly one action.created per key");
        }
    }

    #[test]
    fn test_idempotency_scenario_on_sqlite() {
        let rt = TestRuntime::sqlite();
        let thread = run_scenario(&rt.service).unwrap();
        assert_eq!(rt.service.list_actions(&thread.id).unwrap().len(), 2);
        assert!(rt.service.verify_audit_chain().unwrap());
    }
}
