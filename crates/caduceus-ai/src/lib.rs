//! # caduceus-ai
//!
//! AI-backed document verification for the Caduceus engine.
//!
//! This crate provides:
//! - `AiDocumentVerifier`, the guarded pipeline in front of the model
//!   (injection guard, verdict cache, budget/kill-switch, schema-validated
//!   parsing)
//! - The prompt-injection guard and input sanitizer
//! - The content-addressed verdict cache (in-process, optionally tiered)
//! - The spend ledger / budget monitor with an operator kill switch
//! - `ModelClient` implementations: OpenAI-compatible HTTP and a scripted
//!   offline client
//!
//! ## Usage
//!
//! ```rust,ignore
//! use caduceus_ai::document_verifier_from_config;
//!
//! let verifier = document_verifier_from_config(&config)?;
//! ```

use std::sync::Arc;
use std::time::Duration;

use tracing::info;

use caduceus_contracts::error::CaduceusResult;
use caduceus_core::config::EngineConfig;
use caduceus_core::traits::DocumentVerifier;

pub mod budget;
pub mod cache;
pub mod context;
pub mod guard;
pub mod model;
pub mod prompt;
pub mod schema;
pub mod verifier;

pub use budget::{BudgetMonitor, SessionStats};
pub use cache::{document_digest, MemoryVerdictCache, TieredCache, VerdictCache};
pub use context::{ContextProvider, StaticRegulationIndex};
pub use model::{ModelClient, OpenAiClient, ScriptedModelClient};
pub use verifier::{AiDocumentVerifier, UnconfiguredVerifier};

/// Build the document verifier the engine will run with.
///
/// The choice between a live model client and the unconfigured stand-in is
/// made once, here, from config: business logic never branches on key
/// presence at request time.
///
/// # Errors
///
/// `ConfigError` if the HTTP client cannot be constructed.
pub fn document_verifier_from_config(
    config: &EngineConfig,
) -> CaduceusResult<Arc<dyn DocumentVerifier>> {
    let Some(api_key) = config.ai.api_key.clone() else {
        info!("no model API key configured, using manual-review fallback verifier");
        return Ok(Arc::new(UnconfiguredVerifier::new()));
    };

    let client = OpenAiClient::new(api_key, Duration::from_millis(config.ai.model_timeout_ms))?;
    info!(
        model = %config.ai.model,
        simple_model = %config.ai.simple_model,
        daily_budget_usd = config.ai.daily_budget_usd,
        "AI document verifier configured"
    );
    Ok(Arc::new(AiDocumentVerifier::new(
        Arc::new(client),
        Arc::new(MemoryVerdictCache::new(
            config.ai.cache_capacity,
            config.ai.cache_ttl_hours,
        )),
        Arc::new(BudgetMonitor::from_config(&config.ai)),
        Arc::new(StaticRegulationIndex::new()),
        config.ai.model.clone(),
        config.ai.simple_model.clone(),
    )))
}
