//! Runnable end-to-end scenarios.
//!
//! Each scenario works against a live [`ActionService`] in its own project,
//! prints the action states and audit trail it produces, and finishes by
//! verifying the audit chain. Slugs and idempotency keys carry a per-run
//! suffix so scenarios can be re-run against a persistent database.

pub mod artifact;
pub mod guardrails;
pub mod idempotency;
pub mod lifecycle;

use serde_json::json;

use caravel_audit::AuditFilter;
use caravel_contracts::{
    action::Action,
    error::{CaravelError, CaravelResult},
    records::{Project, Thread},
};

use crate::service::ActionService;

/// Run every scenario in order.
pub fn run_all(service: &ActionService) -> CaravelResult<()> {
    lifecycle::run_scenario(service)?;
    artifact::run_scenario(service)?;
    idempotency::run_scenario(service)?;
    guardrails::run_scenario(service)?;
    Ok(())
}

// ── Shared helpers ────────────────────────────────────────────────────────────

/// The project and thread a scenario runs in.
///
/// Scenarios return the thread so callers can inspect what they left behind.
pub(crate) struct Workspace {
    pub project: Project,
    pub thread: Thread,
    run: String,
}

impl Workspace {
    pub fn open(service: &ActionService, scenario: &str) -> CaravelResult<Self> {
        let run = uuid::Uuid::new_v4().simple().to_string()[..8].to_string();
        let project = service.create_project(
            &format!("{scenario}-{run}"),
            &format!("{scenario} scenario"),
            json!({ "scenario": scenario }),
        )?;
        let thread = service.create_thread(&project.id, &format!("{scenario} thread"), json!([scenario]))?;
        Ok(Self { project, thread, run })
    }

    /// An idempotency key unique to this run.
    pub fn key(&self, label: &str) -> String {
        format!("{}-{label}", self.run)
    }
}

pub(crate) fn print_action(label: &str, action: &Action) {
    println!(
        "  {label:<28} {} [{}] type={} mode={}",
        action.id, action.status, action.action_type, action.policy_mode
    );
}

pub(crate) fn print_audit_trail(service: &ActionService, action: &Action) -> CaravelResult<()> {
    let events = service.list_audit(&AuditFilter::for_action(action.id))?;
    println!("  Audit trail for {}:", action.id);
    for event in &events {
        println!(
            "    #{:<4} {:<26} actor={:<8} {}",
            event.sequence, event.record.event_type, event.record.actor, event.record.payload
        );
    }
    Ok(())
}

pub(crate) fn print_chain_integrity(service: &ActionService) -> CaravelResult<()> {
    let intact = service.verify_audit_chain()?;
    println!(
        "  Audit chain integrity:       {}",
        if intact { "VERIFIED" } else { "BROKEN" }
    );
    Ok(())
}

/// Print whether `result` was rejected the way `expected` describes.
pub(crate) fn print_rejection<T>(
    label: &str,
    result: CaravelResult<T>,
    expected: impl Fn(&CaravelError) -> bool,
) {
    match result {
        Err(e) if expected(&e) => println!("  {label:<40} REJECTED: {e}"),
        Err(e) => println!("  {label:<40} unexpected error: {e}"),
        Ok(_) => println!("  {label:<40} unexpectedly succeeded"),
    }
}
