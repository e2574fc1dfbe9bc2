//! Audit event type.
//!
//! `DecisionEvent` is a single entry in the hash chain. It wraps a
//! `DecisionRecord` with sequence numbering and the SHA-256 hashes that
//! make tampering detectable.

use serde::{Deserialize, Serialize};

use caduceus_contracts::decision::DecisionRecord;

/// A single entry in the SHA-256 hash chain of AI decisions.
///
/// Each event commits to the previous event via `prev_hash`, forming an
/// append-only chain. Modifying any field, including those of the embedded
/// `record`, invalidates `this_hash` and every subsequent `prev_hash`,
/// which `verify_chain` detects.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DecisionEvent {
    /// Monotonically increasing position in the chain, starting at 0.
    pub sequence: u64,

    /// The immutable decision record emitted by the orchestrator.
    pub record: DecisionRecord,

    /// SHA-256 hash (hex) of the previous event, or `GENESIS_HASH` for the
    /// first event.
    pub prev_hash: String,

    /// SHA-256 hash (hex) of this event's canonical content.
    ///
    /// Computed by `hash_event()` over (sequence, prev_hash, canonical JSON
    /// of record).
    pub this_hash: String,
}

impl DecisionEvent {
    /// The sentinel `prev_hash` used for the first event in the chain.
    ///
    /// 64 hex zeros, a value that can never be the SHA-256 of real data,
    /// making genesis detection unambiguous.
    pub const GENESIS_HASH: &'static str =
        "0000000000000000000000000000000000000000000000000000000000000000";
}
