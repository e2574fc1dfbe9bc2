//! In-memory implementation of `AuditSink`.
//!
//! `InMemoryDecisionLog` keeps all events in a `Vec` protected by a
//! `Mutex`, making it safe to share with the orchestrator's detached audit
//! tasks. Use `events()` to snapshot the chain for reporting and
//! `verify_integrity()` at any time to confirm it has not been tampered
//! with in memory.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tracing::debug;

use caduceus_contracts::{
    decision::DecisionRecord,
    error::{CaduceusError, CaduceusResult},
};
use caduceus_core::traits::AuditSink;

use crate::{
    chain::{hash_event, verify_chain},
    event::DecisionEvent,
};

// ── Internal mutable state ────────────────────────────────────────────────────

pub(crate) struct LogState {
    /// All events recorded so far, in append order.
    pub(crate) events: Vec<DecisionEvent>,

    /// The next sequence number to assign (starts at 0).
    pub(crate) sequence: u64,

    /// The `this_hash` of the last event, or `GENESIS_HASH` before any
    /// event has been recorded.
    pub(crate) last_hash: String,
}

// ── Public sink ───────────────────────────────────────────────────────────────

/// An in-memory, append-only decision log backed by a SHA-256 hash chain.
///
/// # Thread safety
///
/// `log_decision` acquires a `Mutex` internally; concurrent detached audit
/// tasks serialize on it, which fixes each event's position in the chain.
pub struct InMemoryDecisionLog {
    pub(crate) state: Arc<Mutex<LogState>>,
}

impl InMemoryDecisionLog {
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(LogState {
                events: Vec::new(),
                sequence: 0,
                last_hash: DecisionEvent::GENESIS_HASH.to_string(),
            })),
        }
    }

    /// Snapshot of all events in chain order.
    pub fn events(&self) -> Vec<DecisionEvent> {
        self.state
            .lock()
            .expect("decision log lock poisoned")
            .events
            .clone()
    }

    /// Verify that the in-memory chain has not been tampered with.
    pub fn verify_integrity(&self) -> bool {
        let state = self.state.lock().expect("decision log lock poisoned");
        verify_chain(&state.events)
    }
}

impl Default for InMemoryDecisionLog {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl AuditSink for InMemoryDecisionLog {
    /// Append one decision record to the hash chain.
    ///
    /// Computes `this_hash` from (sequence, prev_hash, record), wraps the
    /// record in a `DecisionEvent`, appends it, then advances the sequence
    /// counter and `last_hash`.
    ///
    /// Returns `Err(AuditWriteFailed)` only if the internal mutex is
    /// poisoned, which cannot happen under normal operation.
    async fn log_decision(&self, record: &DecisionRecord) -> CaduceusResult<()> {
        let mut state = self
            .state
            .lock()
            .map_err(|e| CaduceusError::AuditWriteFailed {
                reason: format!("decision log lock poisoned: {}", e),
            })?;

        let prev_hash = state.last_hash.clone();
        let sequence = state.sequence;
        let this_hash = hash_event(sequence, record, &prev_hash);

        state.events.push(DecisionEvent {
            sequence,
            record: record.clone(),
            prev_hash,
            this_hash: this_hash.clone(),
        });
        state.sequence += 1;
        state.last_hash = this_hash;

        debug!(
            provider_id = %record.provider_id.0,
            status = ?record.status,
            country = %record.country_code,
            sequence,
            "AI decision recorded"
        );
        Ok(())
    }
}
