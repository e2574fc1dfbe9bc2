//! Verification outcome types.
//!
//! `VerificationResult` is the single value the engine produces. Results are
//! never mutated in place: each decision step builds a new result, carrying
//! forward whatever metadata it wants to keep. This keeps threshold
//! overrides from half-updating an outcome.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// The trust outcome of a verification.
///
/// `ManualReview` is a terminal state for the engine: it means a human makes
/// the final accept/reject call. It is not a failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum VerificationStatus {
    Verified,
    Rejected,
    Pending,
    ManualReview,
}

/// Which evidence path produced the outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum VerificationMethod {
    /// A government registry lookup.
    ApiRegistry,
    /// AI inspection of uploaded documents.
    AiDocument,
    /// A human decision recorded after manual review.
    Manual,
}

/// Identifier issued by the repository when a result is persisted.
///
/// A result carries `None` until `save` succeeds; the engine never returns
/// an unpersisted terminal result to its caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TransactionId(pub uuid::Uuid);

impl TransactionId {
    pub fn new() -> Self {
        Self(uuid::Uuid::new_v4())
    }
}

impl Default for TransactionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for TransactionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

/// The outcome of one verification request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VerificationResult {
    pub status: VerificationStatus,
    pub method: VerificationMethod,
    /// Wall-clock time this result instance was created (UTC).
    pub timestamp: DateTime<Utc>,
    /// How strongly this verdict should be trusted, in [0.0, 1.0].
    /// Deterministic sources default to 1.0; only AI verdicts carry less.
    pub confidence_score: f64,
    /// Free-form JSON object: reasons, provenance, upstream payload extracts.
    /// Keys are camelCase to match the externally observable record shape.
    pub metadata: Value,
    /// Set only after the repository has durably saved this result.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transaction_id: Option<TransactionId>,
}

impl VerificationResult {
    /// A result with default confidence 1.0 and empty metadata.
    pub fn new(status: VerificationStatus, method: VerificationMethod) -> Self {
        Self {
            status,
            method,
            timestamp: Utc::now(),
            confidence_score: 1.0,
            metadata: Value::Object(serde_json::Map::new()),
            transaction_id: None,
        }
    }

    pub fn with_confidence(mut self, confidence_score: f64) -> Self {
        self.confidence_score = confidence_score;
        self
    }

    /// Replace the metadata object wholesale.
    pub fn with_metadata(mut self, metadata: Value) -> Self {
        self.metadata = metadata;
        self
    }

    pub fn with_transaction_id(mut self, transaction_id: TransactionId) -> Self {
        self.transaction_id = Some(transaction_id);
        self
    }

    /// The metadata object with `extra`'s keys merged over it.
    ///
    /// Used when a decision step supersedes a result but must keep the
    /// superseded result's provenance (conflict escalation, confidence gate).
    /// Non-object metadata on either side degrades to whichever side is an
    /// object, preferring `extra`.
    pub fn metadata_merged(&self, extra: Value) -> Value {
        match (self.metadata.as_object(), extra) {
            (Some(base), Value::Object(over)) => {
                let mut merged = base.clone();
                for (k, v) in over {
                    merged.insert(k, v);
                }
                Value::Object(merged)
            }
            (Some(base), _) => Value::Object(base.clone()),
            (None, extra) => extra,
        }
    }

    /// The human-readable `reason` field from metadata, if present.
    pub fn reason(&self) -> Option<&str> {
        self.metadata.get("reason").and_then(Value::as_str)
    }
}
