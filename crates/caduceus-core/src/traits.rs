//! Core trait definitions for the verification pipeline.
//!
//! These four traits define the engine's collaborator boundary:
//!
//! - `RegistryAdapter`:        jurisdiction-specific registry lookup
//! - `DocumentVerifier`:       AI-backed document inspection (untrusted upstream)
//! - `VerificationRepository`: durable result storage
//! - `AuditSink`:              fire-and-forget decision log
//!
//! The orchestrator wires them together. A `DocumentVerifier` cannot fail:
//! its signature returns a plain `VerificationResult`, so every internal
//! failure (guard trip, budget block, model error) must already have been
//! captured into an outcome before it crosses this boundary.

use async_trait::async_trait;
use serde_json::Value;

use caduceus_contracts::{
    decision::DecisionRecord,
    error::CaduceusResult,
    request::{CountryCode, VerificationRequest},
    result::{TransactionId, VerificationResult, VerificationStatus},
};

/// A jurisdiction-specific check of a license number against an
/// authoritative government data source.
///
/// Implementations validate the license format locally first (no network on
/// malformed input), then call their upstream through the resilience
/// executor. A transport failure is the only thing an adapter may return as
/// `Err`; the orchestrator downgrades it to a PENDING result.
#[async_trait]
pub trait RegistryAdapter: Send + Sync {
    /// True if this adapter handles the given country.
    ///
    /// The orchestrator scans its adapter list in order and selects the
    /// first adapter that returns true; at most one adapter runs per
    /// request.
    fn supports(&self, country_code: &CountryCode) -> bool;

    /// Primary ISO 3166-1 alpha-2 code this adapter serves.
    ///
    /// Reported to callers in the `supportedCountries` metadata of
    /// unsupported-country rejections.
    fn jurisdiction(&self) -> &'static str;

    /// Short upstream identifier used in logs and breaker keys (e.g. "US_NPI").
    fn registry_name(&self) -> &'static str;

    /// Check the request against the registry and classify the outcome.
    ///
    /// Returns `Err` only for transport-level failures the adapter cannot
    /// meaningfully classify; every registry answer (found, not found, name
    /// mismatch, auth refused, circuit open) is an `Ok` result.
    async fn verify(&self, request: &VerificationRequest) -> CaduceusResult<VerificationResult>;
}

/// AI-backed inspection of uploaded documents.
///
/// Implementations sit in front of an **untrusted** model upstream: the
/// claimed-identity fields interpolated into prompts are attacker-controlled
/// and the model's answers are unvalidated until parsed against the verdict
/// schema. The signature is infallible: no failure of the AI subsystem may
/// escape as an error, and the worst legal outcome is MANUAL_REVIEW with
/// confidence 0.0.
#[async_trait]
pub trait DocumentVerifier: Send + Sync {
    /// Inspect the request's documents and produce a verdict.
    async fn verify_documents(&self, request: &VerificationRequest) -> VerificationResult;
}

/// Durable storage for verification outcomes.
///
/// The engine treats this as a black box: `save` must be durable before the
/// `TransactionId` is returned, and the engine persists each terminal result
/// exactly once. Storage technology is the host's concern.
#[async_trait]
pub trait VerificationRepository: Send + Sync {
    /// Persist a result and return its transaction id.
    async fn save(
        &self,
        request: &VerificationRequest,
        result: &VerificationResult,
    ) -> CaduceusResult<TransactionId>;

    /// Look up a previously saved result.
    async fn find_by_id(
        &self,
        transaction_id: &TransactionId,
    ) -> CaduceusResult<Option<VerificationResult>>;

    /// Record a later (human) status change, merging `metadata_patch` over
    /// the stored metadata. Used by review tooling, not by the engine itself.
    async fn update_status(
        &self,
        transaction_id: &TransactionId,
        status: VerificationStatus,
        metadata_patch: Value,
    ) -> CaduceusResult<()>;

    /// All requests whose latest result is VERIFIED.
    async fn find_verified_providers(&self) -> CaduceusResult<Vec<VerificationRequest>>;
}

/// Fire-and-forget sink for AI-derived decisions.
///
/// The orchestrator emits records from a detached task; a failing sink is
/// logged and otherwise invisible to the request. Absence of a sink must not
/// change engine behavior.
#[async_trait]
pub trait AuditSink: Send + Sync {
    /// Append one decision record.
    async fn log_decision(&self, record: &DecisionRecord) -> CaduceusResult<()>;
}
