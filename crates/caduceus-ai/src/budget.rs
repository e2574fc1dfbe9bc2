//! AI spend accounting, daily budget enforcement, and the kill switch.
//!
//! One `BudgetMonitor` instance is owned by the AI verifier and shared by
//! every concurrent call; the running totals live behind a single mutex so
//! concurrent model calls cannot under-count spend. `check_budget` answers
//! with typed errors: callers must treat both refusal variants as "block
//! the call", never as a transient failure to retry.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use serde::Serialize;
use tracing::{info, warn};

use caduceus_contracts::error::{CaduceusError, CaduceusResult};
use caduceus_core::config::AiConfig;

use crate::model::TokenUsage;

#[derive(Debug, Clone, Copy)]
struct ModelPrice {
    prompt_per_1k: f64,
    completion_per_1k: f64,
}

/// Per-1k-token USD list prices. Longest (most specific) key first:
/// lookup is by substring containment, and "gpt-4o-mini" must not price
/// as "gpt-4o".
const MODEL_PRICES: [(&str, ModelPrice); 4] = [
    (
        "gpt-4o-mini-2024-07-18",
        ModelPrice {
            prompt_per_1k: 0.00015,
            completion_per_1k: 0.0006,
        },
    ),
    (
        "gpt-4o-mini",
        ModelPrice {
            prompt_per_1k: 0.00015,
            completion_per_1k: 0.0006,
        },
    ),
    (
        "gpt-4o-2024-08-06",
        ModelPrice {
            prompt_per_1k: 0.0025,
            completion_per_1k: 0.01,
        },
    ),
    (
        "gpt-4o",
        ModelPrice {
            prompt_per_1k: 0.0025,
            completion_per_1k: 0.01,
        },
    ),
];

/// Conservative rate applied to models missing from the price table.
const DEFAULT_PRICE: ModelPrice = ModelPrice {
    prompt_per_1k: 0.003,
    completion_per_1k: 0.015,
};

fn price_for(model: &str) -> ModelPrice {
    MODEL_PRICES
        .iter()
        .find(|(key, _)| model.contains(key))
        .map(|(_, price)| *price)
        .unwrap_or(DEFAULT_PRICE)
}

/// Accumulated usage for one model.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ModelStats {
    pub calls: u64,
    pub tokens: u64,
    pub cost_usd: f64,
}

/// Accumulated usage for the whole session (since start or last reset).
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionStats {
    pub total_calls: u64,
    pub total_tokens: u64,
    pub total_cost_usd: f64,
    pub by_model: HashMap<String, ModelStats>,
}

/// Spend ledger plus the operator kill switch.
pub struct BudgetMonitor {
    daily_budget_usd: f64,
    kill_switch: AtomicBool,
    ledger: Mutex<SessionStats>,
}

impl BudgetMonitor {
    /// A budget of 0.0 disables enforcement (spend is still tracked).
    pub fn new(daily_budget_usd: f64, kill_switch: bool) -> Self {
        Self {
            daily_budget_usd,
            kill_switch: AtomicBool::new(kill_switch),
            ledger: Mutex::new(SessionStats::default()),
        }
    }

    pub fn from_config(config: &AiConfig) -> Self {
        Self::new(config.daily_budget_usd, config.kill_switch)
    }

    /// USD cost of one call, from the per-model price table.
    pub fn cost_of(model: &str, usage: &TokenUsage) -> f64 {
        let price = price_for(model);
        f64::from(usage.prompt_tokens) / 1000.0 * price.prompt_per_1k
            + f64::from(usage.completion_tokens) / 1000.0 * price.completion_per_1k
    }

    /// Approve or refuse a call whose estimated cost is `estimated_usd`.
    ///
    /// # Errors
    ///
    /// `KillSwitchActive` when the operator switch is set (checked first,
    /// regardless of remaining budget); `BudgetExceeded` when the running
    /// total plus the estimate would cross the daily ceiling.
    pub fn check_budget(&self, estimated_usd: f64) -> CaduceusResult<()> {
        if self.kill_switch.load(Ordering::Relaxed) {
            warn!("kill switch active, blocking model call");
            return Err(CaduceusError::KillSwitchActive);
        }

        let spent = self
            .ledger
            .lock()
            .expect("budget ledger lock poisoned")
            .total_cost_usd;
        if self.daily_budget_usd > 0.0 && spent + estimated_usd > self.daily_budget_usd {
            warn!(
                spent_usd = spent,
                estimated_usd,
                budget_usd = self.daily_budget_usd,
                "daily AI budget exhausted, blocking model call"
            );
            return Err(CaduceusError::BudgetExceeded {
                spent_usd: spent,
                estimated_usd,
                budget_usd: self.daily_budget_usd,
            });
        }
        Ok(())
    }

    /// Record a completed call and return its computed cost.
    pub fn record_usage(&self, model: &str, usage: &TokenUsage) -> f64 {
        let cost = Self::cost_of(model, usage);
        let mut ledger = self.ledger.lock().expect("budget ledger lock poisoned");

        ledger.total_calls += 1;
        ledger.total_tokens += u64::from(usage.total());
        ledger.total_cost_usd += cost;

        let entry = ledger.by_model.entry(model.to_string()).or_default();
        entry.calls += 1;
        entry.tokens += u64::from(usage.total());
        entry.cost_usd += cost;

        info!(
            model,
            prompt_tokens = usage.prompt_tokens,
            completion_tokens = usage.completion_tokens,
            cost_usd = format!("{cost:.6}"),
            "AI usage recorded"
        );
        cost
    }

    pub fn session_stats(&self) -> SessionStats {
        self.ledger
            .lock()
            .expect("budget ledger lock poisoned")
            .clone()
    }

    /// Zero the ledger; called by the host's daily rollover.
    pub fn reset_session(&self) {
        let mut ledger = self.ledger.lock().expect("budget ledger lock poisoned");
        *ledger = SessionStats::default();
        info!("budget session stats reset");
    }

    pub fn set_kill_switch(&self, active: bool) {
        self.kill_switch.store(active, Ordering::Relaxed);
        warn!(active, "kill switch changed");
    }

    pub fn kill_switch_active(&self) -> bool {
        self.kill_switch.load(Ordering::Relaxed)
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
