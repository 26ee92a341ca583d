//! Artifact scenario: an approved `artifact.store` action writes a blob.
//!
//! The second action carries content that is not base64 and ends FAILED
//! without writing anything.

use base64::{engine::general_purpose::STANDARD, Engine as _};
use serde_json::json;

use caravel_artifacts::ARTIFACT_STORE;
use caravel_contracts::{
    action::{NewAction, PolicyMode},
    error::{CaravelError, CaravelResult},
    records::{ArtifactFilter, Channel, Thread},
};

use super::{print_action, print_audit_trail, print_chain_integrity, Workspace};
use crate::service::ActionService;

const REPORT: &str = "Weekly operations summary\n- 3 incidents closed\n- 0 open\n";

/// Returns the thread the scenario ran in.
pub fn run_scenario(service: &ActionService) -> CaravelResult<Thread> {
    println!("=== Scenario: Artifact storage ===");
    println!();

    let ws = Workspace::open(service, "artifact")?;

    let request = NewAction::new(
        ws.thread.id,
        ARTIFACT_STORE,
        PolicyMode::Execute,
        json!({
            "type": "report",
            "filename": "reports/weekly.txt",
            "content_base64": STANDARD.encode(REPORT),
            "metadata": { "week": 42 },
        }),
        ws.key("store"),
    )
    .with_actor("alice");
    let (action, _) = service.create_action(request)?;
    service.approve_action(&action.id, "alice", Channel::Web)?;
    let done = service.execute_action(&action.id)?;
    print_action("Store action:", &done);

    let artifacts = service.list_artifacts(&ArtifactFilter::for_action(done.id))?;
    let artifact = artifacts
        .first()
        .ok_or_else(|| CaravelError::not_found("artifact for action", done.id))?;
    let bytes = service.read_artifact(artifact)?;
    println!("  Artifact:                    {} ({})", artifact.id, artifact.artifact_type);
    println!("  Project:                     {}", ws.project.slug);
    println!("  Storage path:                {}", artifact.storage_path);
    println!("  Size:                        {} byte(s)", bytes.len());
    println!(
        "  Content matches:             {}",
        if bytes == REPORT.as_bytes() { "YES" } else { "NO" }
    );
    print_audit_trail(service, &done)?;
    println!();

    let request = NewAction::new(
        ws.thread.id,
        ARTIFACT_STORE,
        PolicyMode::Execute,
        json!({ "type": "report", "filename": "broken.txt", "content_base64": "@@not-base64@@" }),
        ws.key("broken"),
    );
    let (action, _) = service.create_action(request)?;
    service.approve_action(&action.id, "alice", Channel::Web)?;
    let failed = service.execute_action(&action.id)?;
    print_action("Invalid content:", &failed);
    if let Some(error) = failed.result.as_ref().and_then(|r| r.get("error")) {
        println!("  Error:                       {error}");
    }

    print_chain_integrity(service)?;
    println!();
    Ok(ws.thread)
}
