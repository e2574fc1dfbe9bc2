//! Structural validation of raw model output.
//!
//! The model is instructed to answer in a fixed JSON shape; this module is
//! the enforcement side of that instruction. Raw text is parsed as JSON and
//! checked against a JSON Schema before deserialization, so a model that
//! hallucinates extra statuses or out-of-range confidence values is caught
//! here with a precise error instead of surfacing as a serde failure deep
//! in the verifier.

use serde_json::{json, Value};
use tracing::warn;

use caduceus_contracts::document::ModelVerdict;
use caduceus_contracts::error::{CaduceusError, CaduceusResult};

/// JSON Schema for the verdict the model must produce.
///
/// `PENDING` is absent from the status enum: pending is an engine state
/// (registry outage, queued work), never a model opinion.
pub fn verdict_schema() -> Value {
    json!({
        "type": "object",
        "properties": {
            "status": {
                "type": "string",
                "enum": ["VERIFIED", "REJECTED", "MANUAL_REVIEW"]
            },
            "confidence": {
                "type": "number",
                "minimum": 0.0,
                "maximum": 1.0
            },
            "reason": {
                "type": "string",
                "minLength": 1
            },
            "data_extracted": {
                "type": "object",
                "properties": {
                    "name": { "type": ["string", "null"] },
                    "license_number": { "type": ["string", "null"] },
                    "has_id_match": { "type": ["boolean", "null"] }
                }
            }
        },
        "required": ["status", "confidence", "reason"]
    })
}

/// Parse and validate one raw model answer.
///
/// # Errors
///
/// `ModelResponseInvalid` when `content` is not JSON, or is JSON that
/// violates [`verdict_schema`]. The error reason lists every schema
/// violation, not just the first.
pub fn parse_verdict(content: &str) -> CaduceusResult<ModelVerdict> {
    let payload: Value =
        serde_json::from_str(content).map_err(|e| CaduceusError::ModelResponseInvalid {
            reason: format!("model answer is not JSON: {}", e),
        })?;

    let schema = verdict_schema();
    let validator =
        jsonschema::validator_for(&schema).map_err(|e| CaduceusError::ModelResponseInvalid {
            reason: format!("verdict schema failed to compile: {}", e),
        })?;

    let violations: Vec<String> = validator
        .iter_errors(&payload)
        .map(|error| format!("{} at {}", error, error.instance_path))
        .collect();
    if !violations.is_empty() {
        let reason = violations.join("; ");
        warn!(%reason, "model answer violates the verdict schema");
        return Err(CaduceusError::ModelResponseInvalid { reason });
    }

    serde_json::from_value(payload).map_err(|e| CaduceusError::ModelResponseInvalid {
        reason: format!("schema-valid verdict failed to deserialize: {}", e),
    })
}

// ── Tests ─────────────────────────────────────────────────────────────────────
