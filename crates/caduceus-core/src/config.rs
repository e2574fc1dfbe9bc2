//! Engine configuration.
//!
//! `EngineConfig` is deserialized from TOML (every field has a default, so
//! an empty document is a valid config) and validated before use. Construct
//! via `from_toml_str` or `from_file`; both return
//! `CaduceusError::ConfigError` on malformed input.

use std::path::Path;

use serde::{Deserialize, Serialize};

use caduceus_contracts::error::{CaduceusError, CaduceusResult};

use crate::resilience::BreakerConfig;

fn default_confidence_threshold() -> f64 {
    0.85
}
fn default_model() -> String {
    "gpt-4o-2024-08-06".to_string()
}
fn default_simple_model() -> String {
    "gpt-4o-mini".to_string()
}
fn default_daily_budget_usd() -> f64 {
    5.0
}
fn default_cache_ttl_hours() -> i64 {
    24
}
fn default_cache_capacity() -> usize {
    1_000
}
fn default_model_timeout_ms() -> u64 {
    30_000
}

/// Settings for the AI document-verification subsystem.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AiConfig {
    /// API key for the model provider. Absent key means the AI subsystem is
    /// not configured: the verifier factory then builds an implementation
    /// that resolves every request to manual review.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    /// Strong model, used when an ID document is present or multiple
    /// documents are submitted.
    #[serde(default = "default_model")]
    pub model: String,

    /// Cheaper model for single-document requests.
    #[serde(default = "default_simple_model")]
    pub simple_model: String,

    /// Daily spend ceiling in USD across all model calls.
    #[serde(default = "default_daily_budget_usd")]
    pub daily_budget_usd: f64,

    /// Operator hard stop: blocks every model call regardless of budget.
    #[serde(default)]
    pub kill_switch: bool,

    /// Verdict cache time-to-live.
    #[serde(default = "default_cache_ttl_hours")]
    pub cache_ttl_hours: i64,

    /// Verdict cache size cap (in-process backend, FIFO eviction).
    #[serde(default = "default_cache_capacity")]
    pub cache_capacity: usize,

    /// Client-side timeout for one model call.
    #[serde(default = "default_model_timeout_ms")]
    pub model_timeout_ms: u64,
}

impl Default for AiConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            model: default_model(),
            simple_model: default_simple_model(),
            daily_budget_usd: default_daily_budget_usd(),
            kill_switch: false,
            cache_ttl_hours: default_cache_ttl_hours(),
            cache_capacity: default_cache_capacity(),
            model_timeout_ms: default_model_timeout_ms(),
        }
    }
}

/// Top-level engine configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// AI_DOCUMENT results below this confidence are forced to manual
    /// review (unless already rejected).
    #[serde(default = "default_confidence_threshold")]
    pub confidence_threshold: f64,

    #[serde(default)]
    pub ai: AiConfig,

    #[serde(default)]
    pub breaker: BreakerConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            confidence_threshold: default_confidence_threshold(),
            ai: AiConfig::default(),
            breaker: BreakerConfig::default(),
        }
    }
}

impl EngineConfig {
    /// Parse `s` as TOML and validate the result.
    pub fn from_toml_str(s: &str) -> CaduceusResult<Self> {
        let config: EngineConfig = toml::from_str(s).map_err(|e| CaduceusError::ConfigError {
            reason: format!("failed to parse engine config TOML: {}", e),
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Read the file at `path` and parse it as engine configuration.
    pub fn from_file(path: &Path) -> CaduceusResult<Self> {
        let contents = std::fs::read_to_string(path).map_err(|e| CaduceusError::ConfigError {
            reason: format!("failed to read config file '{}': {}", path.display(), e),
        })?;
        Self::from_toml_str(&contents)
    }

    /// Reject values that would make the engine misbehave silently.
    pub fn validate(&self) -> CaduceusResult<()> {
        if !(0.0..=1.0).contains(&self.confidence_threshold) {
            return Err(CaduceusError::ConfigError {
                reason: format!(
                    "confidence_threshold must be within [0, 1], got {}",
                    self.confidence_threshold
                ),
            });
        }
        if self.ai.daily_budget_usd < 0.0 {
            return Err(CaduceusError::ConfigError {
                reason: format!(
                    "ai.daily_budget_usd must be non-negative, got {}",
                    self.ai.daily_budget_usd
                ),
            });
        }
        if !(0.0..=1.0).contains(&self.breaker.failure_rate) {
            return Err(CaduceusError::ConfigError {
                reason: format!(
                    "breaker.failure_rate must be within [0, 1], got {}",
                    self.breaker.failure_rate
                ),
            });
        }
        Ok(())
    }
}
