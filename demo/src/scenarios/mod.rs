//! Demo scenarios.
//!
//! Each scenario wires a full engine from offline collaborators (fixture
//! registries, a scripted model client, an in-memory store) and narrates
//! one decision path. `run` executes a selection against one shared
//! decision log, then dumps the audit chain and the bias report.

pub mod documents;
pub mod registry;

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;

use caduceus_ai::{AiDocumentVerifier, BudgetMonitor, MemoryVerdictCache, ScriptedModelClient,
    StaticRegulationIndex};
use caduceus_audit::{bias_report, InMemoryDecisionLog};
use caduceus_contracts::{
    error::CaduceusResult,
    request::{AttachedDocument, CountryCode, ProviderAttributes, ProviderId, VerificationRequest},
    result::VerificationResult,
};
use caduceus_core::traits::{AuditSink, RegistryAdapter};
use caduceus_core::{EngineConfig, Orchestrator};

use crate::fixtures::{FixtureRegistryAdapter, InMemoryRepository};

/// Embedded demo configuration; parsed on every engine build to exercise
/// the loader.
const ENGINE_TOML: &str = include_str!("../../engine.toml");

// ── Scenario selection ────────────────────────────────────────────────────────

/// One runnable demo scenario.
#[derive(Clone, Copy)]
pub enum Scenario {
    ExactMatch,
    NameDrift,
    GmcLinkOut,
    UnsupportedCountry,
    AiDocument,
    Conflict,
    Injection,
    CacheReuse,
    BudgetStop,
}

impl Scenario {
    /// Every scenario, in presentation order.
    pub const ALL: [Scenario; 9] = [
        Scenario::ExactMatch,
        Scenario::NameDrift,
        Scenario::GmcLinkOut,
        Scenario::UnsupportedCountry,
        Scenario::AiDocument,
        Scenario::Conflict,
        Scenario::Injection,
        Scenario::CacheReuse,
        Scenario::BudgetStop,
    ];

    async fn run(self, audit: &Arc<InMemoryDecisionLog>) -> CaduceusResult<()> {
        match self {
            Scenario::ExactMatch => registry::exact_match(audit).await,
            Scenario::NameDrift => registry::name_drift(audit).await,
            Scenario::GmcLinkOut => registry::gmc_link_out(audit).await,
            Scenario::UnsupportedCountry => registry::unsupported_country(audit).await,
            Scenario::AiDocument => documents::ai_document(audit).await,
            Scenario::Conflict => documents::conflict(audit).await,
            Scenario::Injection => documents::injection(audit).await,
            Scenario::CacheReuse => documents::cache_reuse(audit).await,
            Scenario::BudgetStop => documents::budget_stop(audit).await,
        }
    }
}

/// Run the selected scenarios against one shared decision log, then print
/// the audit summary.
pub async fn run(selected: &[Scenario]) -> CaduceusResult<()> {
    let audit = Arc::new(InMemoryDecisionLog::new());
    for scenario in selected {
        scenario.run(&audit).await?;
    }
    audit_summary(&audit).await;
    Ok(())
}

// ── Engine wiring ─────────────────────────────────────────────────────────────

pub(crate) fn demo_config() -> CaduceusResult<EngineConfig> {
    EngineConfig::from_toml_str(ENGINE_TOML)
}

/// A wired orchestrator plus the handles scenarios inspect afterwards.
pub(crate) struct DemoEngine {
    pub orchestrator: Orchestrator,
    pub repository: Arc<InMemoryRepository>,
    pub model: Arc<ScriptedModelClient>,
    pub budget: Arc<BudgetMonitor>,
}

/// Wire an orchestrator from fixture collaborators and `engine.toml`.
///
/// `model` is the scripted reply queue standing in for the provider;
/// `kill_switch` arms the operator hard stop.
pub(crate) fn build_engine(
    adapters: Vec<Arc<dyn RegistryAdapter>>,
    model: Arc<ScriptedModelClient>,
    kill_switch: bool,
    audit: &Arc<InMemoryDecisionLog>,
) -> CaduceusResult<DemoEngine> {
    let config = demo_config()?;
    let repository = Arc::new(InMemoryRepository::new());
    let budget = Arc::new(BudgetMonitor::new(config.ai.daily_budget_usd, kill_switch));
    let verifier = Arc::new(AiDocumentVerifier::new(
        model.clone(),
        Arc::new(MemoryVerdictCache::new(
            config.ai.cache_capacity,
            config.ai.cache_ttl_hours,
        )),
        budget.clone(),
        Arc::new(StaticRegulationIndex),
        config.ai.model.clone(),
        config.ai.simple_model.clone(),
    ));
    let orchestrator = Orchestrator::new(
        adapters,
        verifier,
        repository.clone(),
        config.confidence_threshold,
    )
    .with_audit(Arc::clone(audit) as Arc<dyn AuditSink>);

    Ok(DemoEngine {
        orchestrator,
        repository,
        model,
        budget,
    })
}

/// The demo's US register: three providers keyed by NPI.
pub(crate) fn us_fixture() -> FixtureRegistryAdapter {
    FixtureRegistryAdapter::new(
        "US",
        "US_NPI_FIXTURE",
        &[
            ("1234567893", "GREGORY HOUSE"),
            ("1679576722", "LISA CUDDY"),
            ("1245319599", "JAMES WILSON"),
        ],
    )
}

// ── Request helpers ───────────────────────────────────────────────────────────

/// Claimed-identity request with no documents attached.
pub(crate) fn claim(
    provider_id: &str,
    country: &str,
    first_name: &str,
    last_name: &str,
    license_number: &str,
) -> VerificationRequest {
    VerificationRequest {
        provider_id: ProviderId(provider_id.to_string()),
        country_code: CountryCode::new(country),
        attributes: ProviderAttributes {
            first_name: first_name.to_string(),
            last_name: last_name.to_string(),
            license_number: license_number.to_string(),
            date_of_birth: None,
        },
        documents: vec![],
        id_document: None,
    }
}

/// Stand-in license scan. The scripted model never reads the bytes; the
/// seed only keeps document digests distinct across scenarios.
pub(crate) fn license_scan(seed: u8) -> AttachedDocument {
    AttachedDocument {
        bytes: vec![seed; 64],
        mime_type: "image/png".to_string(),
    }
}

// ── Output helpers ────────────────────────────────────────────────────────────

/// Wire-format label for a status or method (VERIFIED, API_REGISTRY, ...).
pub(crate) fn label(value: impl serde::Serialize) -> String {
    serde_json::to_value(value)
        .ok()
        .and_then(|v| v.as_str().map(str::to_string))
        .unwrap_or_else(|| "?".to_string())
}

/// Two-column result summary shared by every scenario.
pub(crate) fn print_result(result: &VerificationResult) {
    println!("  Status:      {}", label(result.status));
    println!("  Method:      {}", label(result.method));
    println!("  Confidence:  {:.2}", result.confidence_score);
    if let Some(reason) = result.reason() {
        println!("  Reason:      {reason}");
    }
    if let Some(transaction_id) = result.transaction_id {
        println!("  Transaction: {transaction_id}");
    }
}

/// Print one metadata entry as "key: value" when present.
pub(crate) fn print_metadata(result: &VerificationResult, key: &str) {
    if let Some(value) = result.metadata.get(key) {
        match value.as_str() {
            Some(text) => println!("  {key}: {text}"),
            None => println!("  {key}: {value}"),
        }
    }
}

// ── Audit summary ─────────────────────────────────────────────────────────────

/// Dump the decision chain and the bias report.
///
/// Audit records are emitted from detached tasks; the short sleep lets the
/// last of them land before the chain is read.
async fn audit_summary(audit: &InMemoryDecisionLog) {
    tokio::time::sleep(Duration::from_millis(50)).await;

    println!("=== AI Decision Audit ===");
    println!();

    let events = audit.events();
    if events.is_empty() {
        println!("  No AI-derived decisions were recorded by this run.");
        println!();
        return;
    }

    let integrity = if audit.verify_integrity() {
        "VERIFIED"
    } else {
        "BROKEN"
    };
    println!(
        "  Chain integrity: {} ({} event(s), genesis-linked SHA-256)",
        integrity,
        events.len()
    );
    for event in &events {
        println!(
            "    [{}] {} {} {} conf={:.2} model={} cache={} hash={}",
            event.sequence,
            event.record.provider_id.0,
            event.record.country_code,
            label(event.record.status),
            event.record.confidence_score,
            event.record.model,
            event.record.from_cache,
            &event.this_hash[..16],
        );
    }

    let now = Utc::now();
    let report = bias_report(&events, now - chrono::Duration::hours(1), now);
    println!();
    println!(
        "  Bias report ({} decision(s) in the last hour):",
        report.total_decisions
    );
    let mut countries: Vec<_> = report.by_country.iter().collect();
    countries.sort_by(|a, b| a.0.cmp(b.0));
    for (country, outcomes) in countries {
        let average = report
            .average_confidence_by_country
            .get(country)
            .copied()
            .unwrap_or(0.0);
        println!(
            "    {}: approved={} rejected={} manual_review={} avg_confidence={:.2}",
            country, outcomes.approved, outcomes.rejected, outcomes.manual_review, average
        );
    }
    let mut models: Vec<_> = report.model_usage.iter().collect();
    models.sort();
    for (model, count) in models {
        println!("    model {model}: {count} decision(s)");
    }
    println!();
}
