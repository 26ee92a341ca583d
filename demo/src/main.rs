//! caravel demo CLI
//!
//! Runs one or all of the action runtime scenarios against a service built
//! from configuration.
//!
//! Usage:
//!   cargo run -p demo -- run-all
//!   cargo run -p demo -- --config caravel.toml lifecycle
//!   cargo run -p demo -- handlers

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tracing::debug;
use tracing_subscriber::EnvFilter;

use caravel_config::CaravelConfig;
use caravel_contracts::error::CaravelResult;
use caravel_runtime::{
    scenarios::{self, artifact, guardrails, idempotency, lifecycle},
    ActionService,
};

// ── CLI definition ────────────────────────────────────────────────────────────

/// caravel: approval-gated action runtime demo.
#[derive(Parser)]
#[command(
    name = "demo",
    about = "caravel action runtime demo",
    long_about = "Runs caravel scenarios showing the action lifecycle, idempotent creation,\n\
                  approval guardrails, artifact storage and audit chain integrity."
)]
struct Cli {
    /// TOML configuration file. Defaults apply when omitted.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run every scenario in sequence.
    RunAll,
    /// stub.echo from DRAFT to DONE, the default handler, and a cancel.
    Lifecycle,
    /// artifact.store end to end.
    Artifact,
    /// Replay, conflict and a concurrent race on one idempotency key.
    Idempotency,
    /// Channel, policy mode and status rejections.
    Guardrails,
    /// List registered handler types.
    Handlers,
}

// ── Entry point ───────────────────────────────────────────────────────────────

fn main() {
    let cli = Cli::parse();

    let config = match CaravelConfig::load(cli.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Demo error: {}", e);
            std::process::exit(2);
        }
    };

    // RUST_LOG wins over the configured filter.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.logging.filter)),
        )
        .with_target(false)
        .compact()
        .init();
    debug!(?config, "configuration loaded");

    print_banner(&config);

    match run(&config, cli.command) {
        Ok(()) => {
            println!("All selected scenarios completed successfully.");
        }
        Err(e) => {
            eprintln!("Demo error: {}", e);
            std::process::exit(1);
        }
    }
}

// ── Scenario dispatch ─────────────────────────────────────────────────────────

fn run(config: &CaravelConfig, command: Command) -> CaravelResult<()> {
    let service = ActionService::from_config(config)?;
    match command {
        Command::RunAll => scenarios::run_all(&service),
        Command::Lifecycle => lifecycle::run_scenario(&service).map(drop),
        Command::Artifact => artifact::run_scenario(&service).map(drop),
        Command::Idempotency => idempotency::run_scenario(&service).map(drop),
        Command::Guardrails => guardrails::run_scenario(&service).map(drop),
        Command::Handlers => {
            println!("Registered handlers:");
            for handler in service.list_handlers() {
                println!("  {handler}");
            }
            println!("  (any other type runs the default handler)");
            println!();
            Ok(())
        }
    }
}

// ── Banner ────────────────────────────────────────────────────────────────────

fn print_banner(config: &CaravelConfig) {
    println!();
    println!("caravel: approval-gated action runtime");
    println!("======================================");
    println!();
    println!("Lifecycle: DRAFT -> APPROVED -> EXECUTING -> DONE | FAILED, DRAFT|APPROVED -> CANCELED");
    println!("  storage backend:    {:?}", config.storage.backend);
    println!("  artifacts root:     {}", config.artifacts.root.display());
    let channels: Vec<&str> = config.approval.trusted_channels.iter().map(|c| c.as_str()).collect();
    println!("  approval channels:  {}", channels.join(", "));
    println!();
}
