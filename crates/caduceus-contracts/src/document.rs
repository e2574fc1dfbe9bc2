//! AI document-inspection verdict and cache entry types.
//!
//! `ModelVerdict` is the fixed shape the model must answer in. The AI
//! verifier validates raw model output against a JSON Schema before
//! deserializing into this type; anything that does not fit resolves to
//! manual review, never a crash.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::result::VerificationStatus;

/// Identity fields the model extracted from the documents themselves.
///
/// Used to cross-check the claimed identity against what the documents
/// actually say. All fields are optional: a model that cannot read a field
/// reports it absent rather than guessing.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExtractedIdentity {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub license_number: Option<String>,
    /// Whether the secondary ID document matches the primary document.
    /// Only meaningful when an ID document was submitted.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub has_id_match: Option<bool>,
}

/// The parsed, schema-validated verdict from one model call.
///
/// `status` is restricted by the output schema to VERIFIED, REJECTED, or
/// MANUAL_REVIEW; the model is never allowed to answer PENDING.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelVerdict {
    pub status: VerificationStatus,
    /// Model-reported confidence in [0.0, 1.0].
    pub confidence: f64,
    /// The model's one-paragraph justification.
    pub reason: String,
    #[serde(default, rename = "data_extracted", skip_serializing_if = "Option::is_none")]
    pub extracted: Option<ExtractedIdentity>,
}

/// One cached AI verdict, keyed externally by the document's SHA-256 digest.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheEntry {
    pub verdict: ModelVerdict,
    /// When the verdict was produced (not when it was last read).
    pub timestamp: DateTime<Utc>,
    /// Which model produced the verdict; reported in audit records.
    pub model: String,
}

impl CacheEntry {
    /// True once the entry has outlived `ttl`.
    pub fn is_expired(&self, ttl: Duration) -> bool {
        Utc::now() - self.timestamp > ttl
    }
}
