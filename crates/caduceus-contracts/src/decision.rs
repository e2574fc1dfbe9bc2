//! Audit record for AI-derived decisions.
//!
//! One `DecisionRecord` is emitted (fire-and-forget) for every final result
//! whose method is AI_DOCUMENT. The audit crate chains these records; the
//! report module aggregates them for bias review.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::request::{CountryCode, ProviderId};
use crate::result::VerificationStatus;

/// An immutable record of one AI-derived verification decision.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DecisionRecord {
    pub provider_id: ProviderId,
    pub country_code: CountryCode,
    pub status: VerificationStatus,
    pub confidence_score: f64,
    /// The model that produced the verdict, or "cache"/"none" when no model
    /// ran for this decision.
    pub model: String,
    /// True when the verdict was served from the result cache.
    pub from_cache: bool,
    /// Wall-clock time the decision was recorded (UTC).
    pub timestamp: DateTime<Utc>,
}
