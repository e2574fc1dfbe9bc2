//! Caduceus Provider Verification Engine: Demo CLI
//!
//! Runs one or all of the nine verification scenarios. Every collaborator
//! is offline: fixture registries stand in for NPPES, a scripted client
//! stands in for the model provider, and results persist to an in-memory
//! store. No traffic leaves the process.
//!
//! Usage:
//!   cargo run -p demo -- run-all
//!   cargo run -p demo -- exact-match
//!   cargo run -p demo -- conflict
//!   cargo run -p demo -- cache-reuse

mod fixtures;
mod scenarios;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use crate::scenarios::Scenario;

// ── CLI definition ────────────────────────────────────────────────────────────

/// Caduceus healthcare provider verification demo.
///
/// Each subcommand runs one or all of the nine scenarios, demonstrating
/// registry adapters, AI document verdicts, the prompt guard, verdict
/// caching, budget enforcement, and audit chain integrity.
#[derive(Parser)]
#[command(
    name = "demo",
    about = "Caduceus provider verification engine demo",
    long_about = "Runs Caduceus verification scenarios showing registry lookups,\n\
                  AI document verdicts, conflict escalation, the prompt guard,\n\
                  verdict caching, budget enforcement, and audit chain integrity."
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run all nine scenarios in sequence against one shared audit log.
    RunAll,
    /// Scenario 1: an exact registry match auto-verifies.
    ExactMatch,
    /// Scenario 2: a close-but-inexact name routes to manual review.
    NameDrift,
    /// Scenario 3: the no-API jurisdiction links out to the GMC register.
    GmcLinkOut,
    /// Scenario 4: an unsupported country without documents rejects.
    UnsupportedCountry,
    /// Scenario 5: the AI verdict stands for an uncovered country.
    AiDocument,
    /// Scenario 6: registry rejection against an AI pass escalates to a human.
    Conflict,
    /// Scenario 7: prompt injection is stopped before any model call.
    Injection,
    /// Scenario 8: byte-identical documents reuse the cached verdict.
    CacheReuse,
    /// Scenario 9: the operator kill switch blocks every model call.
    BudgetStop,
}

// ── Entry point ───────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() {
    // Initialize structured logging. Set RUST_LOG=debug for verbose output.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_target(false)
        .compact()
        .init();

    let cli = Cli::parse();

    print_banner();

    let selected: &[Scenario] = match cli.command {
        Command::RunAll => &Scenario::ALL,
        Command::ExactMatch => &[Scenario::ExactMatch],
        Command::NameDrift => &[Scenario::NameDrift],
        Command::GmcLinkOut => &[Scenario::GmcLinkOut],
        Command::UnsupportedCountry => &[Scenario::UnsupportedCountry],
        Command::AiDocument => &[Scenario::AiDocument],
        Command::Conflict => &[Scenario::Conflict],
        Command::Injection => &[Scenario::Injection],
        Command::CacheReuse => &[Scenario::CacheReuse],
        Command::BudgetStop => &[Scenario::BudgetStop],
    };

    match scenarios::run(selected).await {
        Ok(()) => {
            println!("All selected scenarios completed.");
        }
        Err(e) => {
            eprintln!("Demo error: {}", e);
            std::process::exit(1);
        }
    }
}

// ── Banner ────────────────────────────────────────────────────────────────────

fn print_banner() {
    println!();
    println!("Caduceus: Healthcare Provider Verification Engine");
    println!("Registry + AI Document Demo (fully offline)");
    println!("=================================================");
    println!();
    println!("Decision cascade per request:");
    println!("  [1] Registry adapter selected by country checks the license claim");
    println!("  [2] AI document inspection runs when the registry cannot conclude");
    println!("      (guarded: injection scan, verdict cache, budget ceiling)");
    println!("  [3] Merge + confidence gate: disagreeing evidence lands with a human");
    println!("  [4] Result persisted; AI decisions appended to a SHA-256 hash chain");
    println!();
}
