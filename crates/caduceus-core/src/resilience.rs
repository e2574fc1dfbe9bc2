//! Per-upstream circuit breaking for external calls.
//!
//! `Resilience::execute(key, action)` runs an async closure under the
//! breaker registered for `key`, creating it on first use. The breaker is
//! generic: the closure is a per-call argument, never captured at breaker
//! creation, so one breaker serves every call site that shares an upstream.
//!
//! State machine per breaker:
//!
//!   CLOSED ──(failure rate ≥ threshold over window)──▶ OPEN
//!   OPEN ──(cooldown elapsed, one trial admitted)──▶ HALF_OPEN
//!   HALF_OPEN ──(trial ok)──▶ CLOSED   /   ──(trial fails)──▶ OPEN
//!
//! A call that exceeds the per-call timeout counts as a failure. An open
//! breaker fails fast with `CaduceusError::CircuitOpen` without touching the
//! network, which keeps one flaky registry from starving the orchestrator.

use std::collections::VecDeque;
use std::future::Future;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use caduceus_contracts::error::{CaduceusError, CaduceusResult};

// ── Configuration ─────────────────────────────────────────────────────────────

fn default_failure_rate() -> f64 {
    0.5
}
fn default_window_ms() -> u64 {
    10_000
}
fn default_min_calls() -> u32 {
    4
}
fn default_cooldown_ms() -> u64 {
    10_000
}
fn default_call_timeout_ms() -> u64 {
    5_000
}

/// Breaker tuning knobs, deserializable from the engine's TOML config.
///
/// Durations are plain millisecond integers in TOML.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BreakerConfig {
    /// Fraction of failures within the window that trips the breaker.
    #[serde(default = "default_failure_rate")]
    pub failure_rate: f64,
    /// Length of the rolling outcome window.
    #[serde(default = "default_window_ms")]
    pub window_ms: u64,
    /// Minimum calls inside the window before the rate can trip.
    #[serde(default = "default_min_calls")]
    pub min_calls: u32,
    /// How long an open breaker waits before admitting a trial call.
    #[serde(default = "default_cooldown_ms")]
    pub cooldown_ms: u64,
    /// Per-call timeout; an elapsed timeout is recorded as a failure.
    #[serde(default = "default_call_timeout_ms")]
    pub call_timeout_ms: u64,
}

impl Default for BreakerConfig {
    fn default() -> Self {
        Self {
            failure_rate: default_failure_rate(),
            window_ms: default_window_ms(),
            min_calls: default_min_calls(),
            cooldown_ms: default_cooldown_ms(),
            call_timeout_ms: default_call_timeout_ms(),
        }
    }
}

impl BreakerConfig {
    fn window(&self) -> Duration {
        Duration::from_millis(self.window_ms)
    }

    fn cooldown(&self) -> Duration {
        Duration::from_millis(self.cooldown_ms)
    }

    fn call_timeout(&self) -> Duration {
        Duration::from_millis(self.call_timeout_ms)
    }
}

// ── Breaker internals ─────────────────────────────────────────────────────────

/// Observable breaker state, for logs, monitoring, and tests.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BreakerState {
    Closed,
    Open,
    HalfOpen,
}

enum Phase {
    Closed,
    Open { until: Instant },
    HalfOpen,
}

/// Whether an admitted call is a normal pass-through or the single
/// half-open trial. `record` needs the distinction: a stale outcome from a
/// pre-open call must not close a breaker that is probing.
#[derive(Clone, Copy)]
enum Admitted {
    Normal,
    Probe,
}

struct BreakerInner {
    phase: Phase,
    /// (completion time, success) per call, pruned to the rolling window.
    outcomes: VecDeque<(Instant, bool)>,
}

struct Breaker {
    inner: Mutex<BreakerInner>,
}

impl Breaker {
    fn new() -> Self {
        Self {
            inner: Mutex::new(BreakerInner {
                phase: Phase::Closed,
                outcomes: VecDeque::new(),
            }),
        }
    }

    fn state(&self) -> BreakerState {
        let inner = self.inner.lock().expect("breaker lock poisoned");
        match inner.phase {
            Phase::Closed => BreakerState::Closed,
            Phase::Open { .. } => BreakerState::Open,
            Phase::HalfOpen => BreakerState::HalfOpen,
        }
    }

    /// Decide whether a call may proceed right now.
    ///
    /// Open breakers reject until the cooldown elapses, then admit exactly
    /// one trial; further callers are rejected until the trial resolves.
    fn admit(&self, key: &str) -> CaduceusResult<Admitted> {
        let mut inner = self.inner.lock().expect("breaker lock poisoned");
        match inner.phase {
            Phase::Closed => Ok(Admitted::Normal),
            Phase::Open { until } => {
                if Instant::now() >= until {
                    inner.phase = Phase::HalfOpen;
                    info!(key = %key, "circuit breaker half-open, admitting trial call");
                    Ok(Admitted::Probe)
                } else {
                    Err(CaduceusError::CircuitOpen { key: key.to_string() })
                }
            }
            // A trial is already in flight; everyone else keeps failing fast.
            Phase::HalfOpen => Err(CaduceusError::CircuitOpen { key: key.to_string() }),
        }
    }

    /// Record a call outcome and apply state transitions.
    fn record(&self, key: &str, admitted: Admitted, success: bool, config: &BreakerConfig) {
        let mut inner = self.inner.lock().expect("breaker lock poisoned");
        let now = Instant::now();

        inner.outcomes.push_back((now, success));
        let horizon = now - config.window();
        while matches!(inner.outcomes.front(), Some((at, _)) if *at < horizon) {
            inner.outcomes.pop_front();
        }

        match admitted {
            Admitted::Probe => {
                if success {
                    inner.phase = Phase::Closed;
                    inner.outcomes.clear();
                    info!(key = %key, "circuit breaker closed after successful trial");
                } else {
                    inner.phase = Phase::Open { until: now + config.cooldown() };
                    warn!(key = %key, "circuit breaker reopened after failed trial");
                }
            }
            Admitted::Normal => {
                // Only a closed breaker trips on the rolling rate; outcomes
                // from calls that started before the breaker opened must not
                // disturb an open/half-open phase.
                if matches!(inner.phase, Phase::Closed) {
                    let total = inner.outcomes.len() as u32;
                    let failures = inner.outcomes.iter().filter(|(_, ok)| !ok).count();
                    let rate = failures as f64 / f64::from(total.max(1));
                    if total >= config.min_calls && rate >= config.failure_rate {
                        inner.phase = Phase::Open { until: now + config.cooldown() };
                        warn!(
                            key = %key,
                            failures,
                            total,
                            "circuit breaker opened"
                        );
                    }
                }
            }
        }
    }
}

// ── Public executor ───────────────────────────────────────────────────────────

/// Lazily populated registry of per-upstream circuit breakers.
///
/// One `Resilience` instance is shared by every adapter in the process; the
/// `DashMap` entry API makes first-use breaker creation race-safe under
/// concurrent requests to the same key.
pub struct Resilience {
    breakers: DashMap<String, Arc<Breaker>>,
    config: BreakerConfig,
}

impl Resilience {
    pub fn new(config: BreakerConfig) -> Self {
        Self {
            breakers: DashMap::new(),
            config,
        }
    }

    /// Run `action` under the breaker for `key`, enforcing the per-call
    /// timeout.
    ///
    /// Fails fast with `CircuitOpen` when the breaker for `key` is open.
    /// A timeout is returned as `UpstreamTimeout` and counted as a failure;
    /// an `Err` from the action is passed through unchanged and counted as a
    /// failure; an `Ok` counts as a success.
    pub async fn execute<T, F, Fut>(&self, key: &str, action: F) -> CaduceusResult<T>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = CaduceusResult<T>>,
    {
        let breaker = self
            .breakers
            .entry(key.to_string())
            .or_insert_with(|| Arc::new(Breaker::new()))
            .clone();

        let admitted = breaker.admit(key)?;
        debug!(key = %key, "call admitted through circuit breaker");

        match tokio::time::timeout(self.config.call_timeout(), action()).await {
            Ok(Ok(value)) => {
                breaker.record(key, admitted, true, &self.config);
                Ok(value)
            }
            Ok(Err(err)) => {
                breaker.record(key, admitted, false, &self.config);
                Err(err)
            }
            Err(_) => {
                breaker.record(key, admitted, false, &self.config);
                Err(CaduceusError::UpstreamTimeout {
                    key: key.to_string(),
                    timeout_ms: self.config.call_timeout_ms,
                })
            }
        }
    }

    /// Current state of the breaker for `key`, if one exists yet.
    pub fn breaker_state(&self, key: &str) -> Option<BreakerState> {
        self.breakers.get(key).map(|b| b.state())
    }
}

impl Default for Resilience {
    fn default() -> Self {
        Self::new(BreakerConfig::default())
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    use super::*;

    /// Tight timings so state transitions happen within test time.
    fn fast_config() -> BreakerConfig {
        BreakerConfig {
            failure_rate: 0.5,
            window_ms: 2_000,
            min_calls: 2,
            cooldown_ms: 50,
            call_timeout_ms: 20,
        }
    }

    fn failing() -> CaduceusResult<u32> {
        Err(CaduceusError::RegistryUnreachable {
            registry: "TEST".to_string(),
            reason: "connection refused".to_string(),
        })
    }

    async fn trip(resilience: &Resilience, key: &str) {
        for _ in 0..2 {
            let _ = resilience.execute(key, || async { failing() }).await;
        }
    }

    #[tokio::test]
    async fn closed_breaker_passes_calls_through() {
        let resilience = Resilience::new(fast_config());
        let result = resilience.execute("US_NPI", || async { Ok(42u32) }).await.unwrap();
        assert_eq!(result, 42);
        assert_eq!(resilience.breaker_state("US_NPI"), Some(BreakerState::Closed));
    }

    #[tokio::test]
    async fn failure_rate_opens_breaker_and_fails_fast() {
        let resilience = Resilience::new(fast_config());
        trip(&resilience, "US_NPI").await;
        assert_eq!(resilience.breaker_state("US_NPI"), Some(BreakerState::Open));

        // The next call must fail fast without invoking the action.
        let invoked = Arc::new(AtomicU32::new(0));
        let counter = invoked.clone();
        let result = resilience
            .execute("US_NPI", move || {
                counter.fetch_add(1, Ordering::SeqCst);
                async { Ok(1u32) }
            })
            .await;

        assert!(matches!(result, Err(CaduceusError::CircuitOpen { .. })));
        assert_eq!(invoked.load(Ordering::SeqCst), 0, "open breaker must not invoke the action");
    }

    #[tokio::test]
    async fn successful_trial_closes_breaker_after_cooldown() {
        let resilience = Resilience::new(fast_config());
        trip(&resilience, "FR_ANS").await;
        assert_eq!(resilience.breaker_state("FR_ANS"), Some(BreakerState::Open));

        tokio::time::sleep(Duration::from_millis(60)).await;

        let result = resilience.execute("FR_ANS", || async { Ok(7u32) }).await.unwrap();
        assert_eq!(result, 7);
        assert_eq!(resilience.breaker_state("FR_ANS"), Some(BreakerState::Closed));

        // And normal traffic flows again.
        let again = resilience.execute("FR_ANS", || async { Ok(8u32) }).await.unwrap();
        assert_eq!(again, 8);
    }

    #[tokio::test]
    async fn failed_trial_reopens_breaker() {
        let resilience = Resilience::new(fast_config());
        trip(&resilience, "US_NPI").await;

        tokio::time::sleep(Duration::from_millis(60)).await;

        // Trial call fails: straight back to open, no window accounting.
        let result = resilience.execute("US_NPI", || async { failing() }).await;
        assert!(result.is_err());
        assert_eq!(resilience.breaker_state("US_NPI"), Some(BreakerState::Open));

        let blocked = resilience.execute("US_NPI", || async { Ok(1u32) }).await;
        assert!(matches!(blocked, Err(CaduceusError::CircuitOpen { .. })));
    }

    #[tokio::test]
    async fn timeout_counts_as_failure() {
        let resilience = Resilience::new(fast_config());

        let result: CaduceusResult<u32> = resilience
            .execute("SLOW", || async {
                tokio::time::sleep(Duration::from_millis(200)).await;
                Ok(1u32)
            })
            .await;

        match result {
            Err(CaduceusError::UpstreamTimeout { key, timeout_ms }) => {
                assert_eq!(key, "SLOW");
                assert_eq!(timeout_ms, 20);
            }
            other => panic!("expected UpstreamTimeout, got {:?}", other),
        }

        // A second timeout reaches min_calls and opens the breaker.
        let _ = resilience
            .execute("SLOW", || async {
                tokio::time::sleep(Duration::from_millis(200)).await;
                Ok(1u32)
            })
            .await;
        assert_eq!(resilience.breaker_state("SLOW"), Some(BreakerState::Open));
    }

    #[tokio::test]
    async fn breakers_are_isolated_per_key() {
        let resilience = Resilience::new(fast_config());
        trip(&resilience, "US_NPI").await;
        assert_eq!(resilience.breaker_state("US_NPI"), Some(BreakerState::Open));

        // A different upstream is unaffected.
        let result = resilience.execute("FR_ANS", || async { Ok(3u32) }).await.unwrap();
        assert_eq!(result, 3);
        assert_eq!(resilience.breaker_state("FR_ANS"), Some(BreakerState::Closed));
    }

    #[tokio::test]
    async fn below_min_calls_never_trips() {
        let mut config = fast_config();
        config.min_calls = 5;
        let resilience = Resilience::new(config);

        // Four failures, still under the volume floor.
        for _ in 0..4 {
            let _ = resilience.execute("QUIET", || async { failing() }).await;
        }
        assert_eq!(resilience.breaker_state("QUIET"), Some(BreakerState::Closed));
    }
}
