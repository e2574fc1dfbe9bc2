//! The decision orchestrator: the engine's single public operation.
//!
//! `Orchestrator::execute()` composes the registry adapter set and the AI
//! document verifier into one final `VerificationResult`:
//!
//!   Adapter select → Registry check → [AI document check] → Merge →
//!   Confidence gate → Persist → Audit
//!
//! The cascade biases toward MANUAL_REVIEW over false acceptance: whenever
//! the two evidence sources disagree, or AI confidence is marginal, a human
//! gets the case. VERIFIED is a narrow, hard-won state.
//!
//! Nothing request-attributable escapes as an error: registry outages,
//! guard trips, and budget refusals all land in the result. `execute`
//! returns `Err` only for deployment-class defects (persistence failure).

use serde_json::{json, Value};
use std::sync::Arc;
use tracing::{debug, info, warn};

use caduceus_contracts::{
    decision::DecisionRecord,
    error::CaduceusResult,
    request::VerificationRequest,
    result::{VerificationMethod, VerificationResult, VerificationStatus},
};

use crate::traits::{AuditSink, DocumentVerifier, RegistryAdapter, VerificationRepository};

/// The top-level verification decision engine.
///
/// Construct one per process and share it across requests; it holds no
/// request-scoped state. Adapters are scanned in registration order and the
/// first match wins, so at most one registry runs per request.
pub struct Orchestrator {
    adapters: Vec<Arc<dyn RegistryAdapter>>,
    verifier: Arc<dyn DocumentVerifier>,
    repository: Arc<dyn VerificationRepository>,
    audit: Option<Arc<dyn AuditSink>>,
    confidence_threshold: f64,
}

impl Orchestrator {
    pub fn new(
        adapters: Vec<Arc<dyn RegistryAdapter>>,
        verifier: Arc<dyn DocumentVerifier>,
        repository: Arc<dyn VerificationRepository>,
        confidence_threshold: f64,
    ) -> Self {
        Self {
            adapters,
            verifier,
            repository,
            audit: None,
            confidence_threshold,
        }
    }

    /// Attach an audit sink. Decisions whose final method is AI_DOCUMENT are
    /// logged to it fire-and-forget; without a sink the engine behaves
    /// identically.
    pub fn with_audit(mut self, audit: Arc<dyn AuditSink>) -> Self {
        self.audit = Some(audit);
        self
    }

    /// Jurisdictions covered by the registered adapters, in registration
    /// order. Reported to callers on unsupported-country rejections.
    pub fn supported_countries(&self) -> Vec<&'static str> {
        self.adapters.iter().map(|a| a.jurisdiction()).collect()
    }

    /// Run the full verification cascade for one request.
    ///
    /// # Pipeline
    ///
    /// 1. Select the first adapter whose `supports()` matches the country.
    /// 2. If one matched, run it. An adapter error is downgraded to a
    ///    synthetic PENDING/API_REGISTRY result, never propagated.
    /// 3. No adapter and no documents → terminal REJECTED with the supported
    ///    country list; persisted and returned immediately (no AI call).
    /// 4. Unless the registry already said VERIFIED, run the AI document
    ///    verifier.
    /// 5. Merge: AI VERIFIED against a registry REJECTED/PENDING becomes
    ///    MANUAL_REVIEW (sources disagree and a human reconciles; the engine
    ///    never auto-resolves a conflict to VERIFIED). A PENDING registry
    ///    otherwise adopts the AI result. No registry evidence at all means
    ///    the AI result stands on its own.
    /// 6. Confidence gate: an AI_DOCUMENT result below the threshold is
    ///    forced to MANUAL_REVIEW unless already REJECTED.
    /// 7. Persist, attach the transaction id, and (detached) audit
    ///    AI-derived decisions.
    ///
    /// # Errors
    ///
    /// Only repository failures propagate: the engine refuses to return a
    /// terminal result it could not persist.
    pub async fn execute(
        &self,
        request: VerificationRequest,
    ) -> CaduceusResult<VerificationResult> {
        debug!(
            provider_id = %request.provider_id.0,
            country = %request.country_code,
            documents = request.documents.len(),
            "verification starting"
        );

        // ── Steps 1 & 2: registry phase ──────────────────────────────────────
        //
        // `None` means no adapter covers this country; that absence must not
        // later masquerade as registry evidence in the merge step.
        let registry_result = match self
            .adapters
            .iter()
            .find(|a| a.supports(&request.country_code))
        {
            Some(adapter) => {
                info!(
                    registry = adapter.registry_name(),
                    country = %request.country_code,
                    "registry adapter selected"
                );
                match adapter.verify(&request).await {
                    Ok(result) => Some(result),
                    Err(err) => {
                        warn!(
                            registry = adapter.registry_name(),
                            error = %err,
                            "registry verification failed, downgrading to pending"
                        );
                        Some(
                            VerificationResult::new(
                                VerificationStatus::Pending,
                                VerificationMethod::ApiRegistry,
                            )
                            .with_metadata(json!({
                                "error": "Registry unreachable",
                                "details": err.to_string(),
                            })),
                        )
                    }
                }
            }
            None => None,
        };

        // ── Step 3: unsupported country without documents ────────────────────
        if registry_result.is_none() && !request.has_documents() {
            warn!(
                country = %request.country_code,
                "unsupported country and no documents, rejecting"
            );
            let rejected = VerificationResult::new(
                VerificationStatus::Rejected,
                VerificationMethod::AiDocument,
            )
            .with_metadata(json!({
                "reason": "Document required for unsupported country",
                "countryCode": request.country_code.as_str(),
                "supportedCountries": self.supported_countries(),
                "hint": "Upload a license document to enable AI verification",
            }));
            return self.finalize(&request, rejected).await;
        }

        // ── Steps 4 & 5: AI document phase and merge ─────────────────────────
        let working = match registry_result {
            Some(registry) if registry.status == VerificationStatus::Verified => registry,
            registry => {
                let doc_result = self.verifier.verify_documents(&request).await;
                debug!(
                    status = ?doc_result.status,
                    confidence = doc_result.confidence_score,
                    "document verification complete"
                );
                Self::merge(registry, doc_result)
            }
        };

        // ── Step 6: confidence gate ──────────────────────────────────────────
        let working = self.apply_confidence_gate(working);

        // ── Step 7: persist and audit ────────────────────────────────────────
        self.finalize(&request, working).await
    }

    /// Combine registry and AI outcomes per the conflict policy.
    fn merge(
        registry: Option<VerificationResult>,
        doc_result: VerificationResult,
    ) -> VerificationResult {
        let Some(registry) = registry else {
            // No adapter for this country: the AI verdict is the only
            // evidence and stands on its own.
            return doc_result;
        };

        let registry_negative = matches!(
            registry.status,
            VerificationStatus::Rejected | VerificationStatus::Pending
        );

        if doc_result.status == VerificationStatus::Verified && registry_negative {
            // The two sources disagree. Escalate with both sides' evidence;
            // the registry's method and metadata are kept as the primary
            // provenance.
            info!(
                registry_status = ?registry.status,
                doc_confidence = doc_result.confidence_score,
                "registry and document verdicts conflict, escalating to manual review"
            );
            let metadata = registry.metadata_merged(json!({
                "docVerification": "PASSED",
                "docConfidence": doc_result.confidence_score,
                "aiReason": doc_result.reason(),
            }));
            return VerificationResult::new(VerificationStatus::ManualReview, registry.method)
                .with_confidence(doc_result.confidence_score)
                .with_metadata(metadata);
        }

        if registry.status == VerificationStatus::Pending {
            // Registry unreachable and the documents did not verify either:
            // the AI outcome is the more informative of the two.
            return doc_result;
        }

        registry
    }

    /// Force low-confidence AI outcomes to manual review.
    ///
    /// Applies only to AI_DOCUMENT results; deterministic registry outcomes
    /// carry no meaningful confidence. A REJECTED verdict is never upgraded
    /// by low confidence: a confident rejection and an unconfident one are
    /// both rejections.
    fn apply_confidence_gate(&self, result: VerificationResult) -> VerificationResult {
        let gated = result.method == VerificationMethod::AiDocument
            && result.status != VerificationStatus::Rejected
            && result.status != VerificationStatus::ManualReview
            && result.confidence_score < self.confidence_threshold;
        if !gated {
            return result;
        }

        warn!(
            confidence = result.confidence_score,
            threshold = self.confidence_threshold,
            "confidence below threshold, forcing manual review"
        );
        let metadata = result.metadata_merged(json!({
            "confidenceGate": "BELOW_THRESHOLD",
            "confidenceThreshold": self.confidence_threshold,
        }));
        VerificationResult::new(VerificationStatus::ManualReview, result.method)
            .with_confidence(result.confidence_score)
            .with_metadata(metadata)
    }

    /// Persist the result, attach the transaction id, and emit the audit
    /// record for AI-derived decisions.
    async fn finalize(
        &self,
        request: &VerificationRequest,
        result: VerificationResult,
    ) -> CaduceusResult<VerificationResult> {
        let transaction_id = self.repository.save(request, &result).await?;
        let result = result.with_transaction_id(transaction_id);

        if result.method == VerificationMethod::AiDocument {
            self.spawn_audit(request, &result);
        }

        info!(
            provider_id = %request.provider_id.0,
            status = ?result.status,
            method = ?result.method,
            transaction_id = %transaction_id,
            "verification complete"
        );
        Ok(result)
    }

    /// Emit the decision record on a detached task.
    ///
    /// Not awaited: audit failure is logged and must never fail or slow the
    /// request.
    fn spawn_audit(&self, request: &VerificationRequest, result: &VerificationResult) {
        let Some(audit) = self.audit.clone() else {
            return;
        };
        let record = DecisionRecord {
            provider_id: request.provider_id.clone(),
            country_code: request.country_code.clone(),
            status: result.status,
            confidence_score: result.confidence_score,
            model: result
                .metadata
                .get("model")
                .and_then(Value::as_str)
                .unwrap_or("none")
                .to_string(),
            from_cache: result
                .metadata
                .get("fromCache")
                .and_then(Value::as_bool)
                .unwrap_or(false),
            timestamp: chrono::Utc::now(),
        };
        tokio::spawn(async move {
            if let Err(err) = audit.log_decision(&record).await {
                warn!(error = %err, "audit emit failed");
            }
        });
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    use async_trait::async_trait;
    use serde_json::{json, Value};

    use caduceus_contracts::{
        decision::DecisionRecord,
        error::{CaduceusError, CaduceusResult},
        request::{
            AttachedDocument, CountryCode, ProviderAttributes, ProviderId, VerificationRequest,
        },
        result::{TransactionId, VerificationMethod, VerificationResult, VerificationStatus},
    };

    use crate::traits::{AuditSink, DocumentVerifier, RegistryAdapter, VerificationRepository};

    use super::Orchestrator;

    const THRESHOLD: f64 = 0.85;

    // ── Mock helpers ─────────────────────────────────────────────────────────

    fn make_request(country: &str, document_count: usize) -> VerificationRequest {
        let documents = (0..document_count)
            .map(|i| AttachedDocument {
                bytes: vec![i as u8; 16],
                mime_type: "image/png".to_string(),
            })
            .collect();
        VerificationRequest {
            provider_id: ProviderId("prov-001".to_string()),
            country_code: CountryCode::new(country),
            attributes: ProviderAttributes {
                first_name: "Gregory".to_string(),
                last_name: "House".to_string(),
                license_number: "1234567893".to_string(),
                date_of_birth: None,
            },
            documents,
            id_document: None,
        }
    }

    /// An adapter that serves one country with a canned outcome.
    struct StubAdapter {
        country: &'static str,
        outcome: Option<VerificationResult>,
        /// When true, verify() returns a transport error instead.
        fail: bool,
        calls: Arc<Mutex<u32>>,
    }

    impl StubAdapter {
        fn returning(country: &'static str, outcome: VerificationResult) -> Self {
            Self {
                country,
                outcome: Some(outcome),
                fail: false,
                calls: Arc::new(Mutex::new(0)),
            }
        }

        fn failing(country: &'static str) -> Self {
            Self {
                country,
                outcome: None,
                fail: true,
                calls: Arc::new(Mutex::new(0)),
            }
        }
    }

    #[async_trait]
    impl RegistryAdapter for StubAdapter {
        fn supports(&self, country_code: &CountryCode) -> bool {
            country_code.as_str() == self.country
        }

        fn jurisdiction(&self) -> &'static str {
            self.country
        }

        fn registry_name(&self) -> &'static str {
            "STUB_REGISTRY"
        }

        async fn verify(
            &self,
            _request: &VerificationRequest,
        ) -> CaduceusResult<VerificationResult> {
            *self.calls.lock().unwrap() += 1;
            if self.fail {
                return Err(CaduceusError::RegistryUnreachable {
                    registry: "STUB_REGISTRY".to_string(),
                    reason: "connection reset".to_string(),
                });
            }
            Ok(self.outcome.clone().expect("stub adapter outcome not set"))
        }
    }

    /// A verifier that returns a canned result and counts invocations.
    struct StubVerifier {
        result: VerificationResult,
        calls: Arc<Mutex<u32>>,
    }

    impl StubVerifier {
        fn returning(result: VerificationResult) -> Self {
            Self {
                result,
                calls: Arc::new(Mutex::new(0)),
            }
        }
    }

    #[async_trait]
    impl DocumentVerifier for StubVerifier {
        async fn verify_documents(&self, _request: &VerificationRequest) -> VerificationResult {
            *self.calls.lock().unwrap() += 1;
            self.result.clone()
        }
    }

    /// A repository that records saves and can be told to fail.
    struct MockRepository {
        saved: Arc<Mutex<Vec<(ProviderId, VerificationResult)>>>,
        fail: bool,
    }

    impl MockRepository {
        fn new() -> Self {
            Self {
                saved: Arc::new(Mutex::new(vec![])),
                fail: false,
            }
        }

        fn failing() -> Self {
            Self {
                saved: Arc::new(Mutex::new(vec![])),
                fail: true,
            }
        }
    }

    #[async_trait]
    impl VerificationRepository for MockRepository {
        async fn save(
            &self,
            request: &VerificationRequest,
            result: &VerificationResult,
        ) -> CaduceusResult<TransactionId> {
            if self.fail {
                return Err(CaduceusError::RepositoryFailed {
                    reason: "write refused".to_string(),
                });
            }
            self.saved
                .lock()
                .unwrap()
                .push((request.provider_id.clone(), result.clone()));
            Ok(TransactionId::new())
        }

        async fn find_by_id(
            &self,
            _transaction_id: &TransactionId,
        ) -> CaduceusResult<Option<VerificationResult>> {
            Ok(None)
        }

        async fn update_status(
            &self,
            _transaction_id: &TransactionId,
            _status: VerificationStatus,
            _metadata_patch: Value,
        ) -> CaduceusResult<()> {
            Ok(())
        }

        async fn find_verified_providers(&self) -> CaduceusResult<Vec<VerificationRequest>> {
            Ok(vec![])
        }
    }

    /// An audit sink that records every decision for later inspection.
    struct MockAudit {
        records: Arc<Mutex<Vec<DecisionRecord>>>,
    }

    impl MockAudit {
        fn new() -> Self {
            Self {
                records: Arc::new(Mutex::new(vec![])),
            }
        }
    }

    #[async_trait]
    impl AuditSink for MockAudit {
        async fn log_decision(&self, record: &DecisionRecord) -> CaduceusResult<()> {
            self.records.lock().unwrap().push(record.clone());
            Ok(())
        }
    }

    fn registry_result(status: VerificationStatus, reason: &str) -> VerificationResult {
        VerificationResult::new(status, VerificationMethod::ApiRegistry)
            .with_metadata(json!({ "reason": reason }))
    }

    fn ai_result(status: VerificationStatus, confidence: f64) -> VerificationResult {
        VerificationResult::new(status, VerificationMethod::AiDocument)
            .with_confidence(confidence)
            .with_metadata(json!({
                "reason": "document inspection verdict",
                "model": "gpt-4o-mini",
            }))
    }

    fn orchestrator(
        adapters: Vec<Arc<dyn RegistryAdapter>>,
        verifier: Arc<dyn DocumentVerifier>,
        repository: Arc<dyn VerificationRepository>,
    ) -> Orchestrator {
        Orchestrator::new(adapters, verifier, repository, THRESHOLD)
    }

    // ── Test cases ───────────────────────────────────────────────────────────

    /// No adapter and no documents must terminate in REJECTED, never
    /// PENDING, and the AI verifier must not run at all.
    #[tokio::test]
    async fn unsupported_country_without_documents_rejects() {
        let verifier = Arc::new(StubVerifier::returning(ai_result(
            VerificationStatus::Verified,
            0.99,
        )));
        let verifier_calls = verifier.calls.clone();
        let repository = Arc::new(MockRepository::new());
        let saved = repository.saved.clone();

        let us_adapter: Arc<dyn RegistryAdapter> = Arc::new(StubAdapter::returning(
            "US",
            registry_result(VerificationStatus::Verified, "found"),
        ));
        let engine = orchestrator(vec![us_adapter], verifier, repository);

        let result = engine.execute(make_request("XX", 0)).await.unwrap();

        assert_eq!(result.status, VerificationStatus::Rejected);
        assert_eq!(result.method, VerificationMethod::AiDocument);
        assert_eq!(
            result.reason(),
            Some("Document required for unsupported country")
        );
        assert_eq!(result.metadata["supportedCountries"], json!(["US"]));
        assert_eq!(result.metadata["countryCode"], "XX");
        assert!(result.transaction_id.is_some());

        // Persisted exactly once, AI never consulted.
        assert_eq!(saved.lock().unwrap().len(), 1);
        assert_eq!(*verifier_calls.lock().unwrap(), 0);
    }

    /// A definitive registry VERIFIED needs no AI opinion.
    #[tokio::test]
    async fn registry_verified_skips_document_verification() {
        let verifier = Arc::new(StubVerifier::returning(ai_result(
            VerificationStatus::Verified,
            0.99,
        )));
        let verifier_calls = verifier.calls.clone();
        let repository = Arc::new(MockRepository::new());
        let saved = repository.saved.clone();

        let adapter = StubAdapter::returning(
            "US",
            registry_result(VerificationStatus::Verified, "exact registry match"),
        );
        let adapter_calls = adapter.calls.clone();
        let engine = orchestrator(vec![Arc::new(adapter)], verifier, repository);

        let result = engine.execute(make_request("US", 1)).await.unwrap();

        assert_eq!(result.status, VerificationStatus::Verified);
        assert_eq!(result.method, VerificationMethod::ApiRegistry);
        assert!(result.transaction_id.is_some());
        assert_eq!(*adapter_calls.lock().unwrap(), 1);
        assert_eq!(*verifier_calls.lock().unwrap(), 0, "AI must not run after registry VERIFIED");
        assert_eq!(saved.lock().unwrap().len(), 1);
    }

    /// Registry transport failure downgrades to PENDING, the AI runs, and
    /// when the AI cannot conclude either, its result is adopted verbatim.
    #[tokio::test]
    async fn registry_error_downgrades_and_adopts_ai_result() {
        let ai_pending = VerificationResult::new(
            VerificationStatus::Pending,
            VerificationMethod::AiDocument,
        )
        .with_metadata(json!({ "reason": "documents inconclusive" }));
        let verifier = Arc::new(StubVerifier::returning(ai_pending));
        let repository = Arc::new(MockRepository::new());

        let engine = orchestrator(
            vec![Arc::new(StubAdapter::failing("US"))],
            verifier,
            repository,
        );

        let result = engine.execute(make_request("US", 1)).await.unwrap();

        assert_eq!(result.status, VerificationStatus::Pending);
        assert_eq!(result.method, VerificationMethod::AiDocument);
        assert_eq!(result.reason(), Some("documents inconclusive"));
        assert!(result.transaction_id.is_some());
    }

    /// Registry REJECTED + AI VERIFIED is a conflict: a human reconciles.
    /// The merged result keeps the registry's method and reason, and carries
    /// the document evidence alongside.
    #[tokio::test]
    async fn conflicting_verdicts_escalate_to_manual_review() {
        let verifier = Arc::new(StubVerifier::returning(ai_result(
            VerificationStatus::Verified,
            0.95,
        )));
        let repository = Arc::new(MockRepository::new());

        let adapter = StubAdapter::returning(
            "US",
            registry_result(VerificationStatus::Rejected, "NPI not found in CMS registry"),
        );
        let engine = orchestrator(vec![Arc::new(adapter)], verifier, repository);

        let result = engine.execute(make_request("US", 1)).await.unwrap();

        assert_eq!(result.status, VerificationStatus::ManualReview);
        assert_eq!(result.method, VerificationMethod::ApiRegistry);
        assert!((result.confidence_score - 0.95).abs() < 1e-9);
        assert_eq!(result.metadata["docVerification"], "PASSED");
        assert_eq!(result.reason(), Some("NPI not found in CMS registry"));
        assert_eq!(result.metadata["docConfidence"], json!(0.95));
    }

    /// Registry PENDING + AI non-VERIFIED adopts the AI outcome.
    #[tokio::test]
    async fn pending_registry_adopts_ai_outcome() {
        let verifier = Arc::new(StubVerifier::returning(ai_result(
            VerificationStatus::ManualReview,
            0.4,
        )));
        let repository = Arc::new(MockRepository::new());

        let adapter = StubAdapter::returning(
            "US",
            registry_result(VerificationStatus::Pending, "circuit breaker open"),
        );
        let engine = orchestrator(vec![Arc::new(adapter)], verifier, repository);

        let result = engine.execute(make_request("US", 1)).await.unwrap();

        assert_eq!(result.status, VerificationStatus::ManualReview);
        assert_eq!(result.method, VerificationMethod::AiDocument);
    }

    /// With no adapter to conflict with, a confident AI VERIFIED stands.
    #[tokio::test]
    async fn high_confidence_ai_verifies_unsupported_country() {
        let verifier = Arc::new(StubVerifier::returning(ai_result(
            VerificationStatus::Verified,
            0.99,
        )));
        let repository = Arc::new(MockRepository::new());

        let us_adapter: Arc<dyn RegistryAdapter> = Arc::new(StubAdapter::returning(
            "US",
            registry_result(VerificationStatus::Verified, "found"),
        ));
        let engine = orchestrator(vec![us_adapter], verifier, repository);

        let result = engine.execute(make_request("DE", 1)).await.unwrap();

        assert_eq!(result.status, VerificationStatus::Verified);
        assert_eq!(result.method, VerificationMethod::AiDocument);
        assert!((result.confidence_score - 0.99).abs() < 1e-9);
    }

    /// An AI VERIFIED below the threshold is not good enough to stand.
    #[tokio::test]
    async fn low_confidence_ai_is_forced_to_manual_review() {
        let verifier = Arc::new(StubVerifier::returning(ai_result(
            VerificationStatus::Verified,
            0.70,
        )));
        let repository = Arc::new(MockRepository::new());
        let engine = orchestrator(vec![], verifier, repository);

        let result = engine.execute(make_request("DE", 1)).await.unwrap();

        assert_eq!(result.status, VerificationStatus::ManualReview);
        assert_eq!(result.method, VerificationMethod::AiDocument);
        assert!((result.confidence_score - 0.70).abs() < 1e-9);
        assert_eq!(result.metadata["confidenceGate"], "BELOW_THRESHOLD");
        assert_eq!(result.metadata["confidenceThreshold"], json!(THRESHOLD));
    }

    /// A rejection is never "upgraded" by low confidence.
    #[tokio::test]
    async fn low_confidence_rejection_stays_rejected() {
        let verifier = Arc::new(StubVerifier::returning(ai_result(
            VerificationStatus::Rejected,
            0.2,
        )));
        let repository = Arc::new(MockRepository::new());
        let engine = orchestrator(vec![], verifier, repository);

        let result = engine.execute(make_request("DE", 1)).await.unwrap();

        assert_eq!(result.status, VerificationStatus::Rejected);
        assert_eq!(result.method, VerificationMethod::AiDocument);
    }

    /// AI-derived decisions are audited (from a detached task); registry
    /// decisions are not.
    #[tokio::test]
    async fn ai_decisions_are_audited() {
        let verifier = Arc::new(StubVerifier::returning(ai_result(
            VerificationStatus::Verified,
            0.99,
        )));
        let repository = Arc::new(MockRepository::new());
        let audit = Arc::new(MockAudit::new());
        let records = audit.records.clone();

        let engine = orchestrator(vec![], verifier, repository).with_audit(audit);
        engine.execute(make_request("DE", 1)).await.unwrap();

        // Give the detached audit task a chance to run.
        tokio::time::sleep(Duration::from_millis(20)).await;

        let records = records.lock().unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].status, VerificationStatus::Verified);
        assert_eq!(records[0].model, "gpt-4o-mini");
        assert!(!records[0].from_cache);
        assert_eq!(records[0].country_code.as_str(), "DE");
    }

    #[tokio::test]
    async fn registry_decisions_are_not_audited() {
        let verifier = Arc::new(StubVerifier::returning(ai_result(
            VerificationStatus::Verified,
            0.99,
        )));
        let repository = Arc::new(MockRepository::new());
        let audit = Arc::new(MockAudit::new());
        let records = audit.records.clone();

        let adapter = StubAdapter::returning(
            "US",
            registry_result(VerificationStatus::Verified, "exact registry match"),
        );
        let engine =
            orchestrator(vec![Arc::new(adapter)], verifier, repository).with_audit(audit);
        engine.execute(make_request("US", 1)).await.unwrap();

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(records.lock().unwrap().is_empty());
    }

    /// Persistence failure is the one thing the engine refuses to absorb.
    #[tokio::test]
    async fn repository_failure_propagates() {
        let verifier = Arc::new(StubVerifier::returning(ai_result(
            VerificationStatus::Verified,
            0.99,
        )));
        let repository = Arc::new(MockRepository::failing());
        let engine = orchestrator(vec![], verifier, repository);

        let result = engine.execute(make_request("DE", 1)).await;
        assert!(matches!(result, Err(CaduceusError::RepositoryFailed { .. })));
    }
}
