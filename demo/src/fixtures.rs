//! Offline stand-ins for the engine's durable collaborators.
//!
//! The demo runs with no network and no database. `InMemoryRepository`
//! keeps results in a map behind a mutex, and `FixtureRegistryAdapter`
//! serves a small canned register the way the NPPES adapter serves the
//! real one: an unknown license rejects, an exact normalized name match
//! verifies, and anything between routes to manual review with the
//! similarity score attached.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use serde_json::{json, Value};
use tracing::info;

use caduceus_contracts::{
    error::{CaduceusError, CaduceusResult},
    request::{CountryCode, VerificationRequest},
    result::{TransactionId, VerificationMethod, VerificationResult, VerificationStatus},
};
use caduceus_core::matcher;
use caduceus_core::traits::{RegistryAdapter, VerificationRepository};

// ── In-memory repository ──────────────────────────────────────────────────────

/// One persisted verification: the request and its latest result.
pub struct StoredVerification {
    pub request: VerificationRequest,
    pub result: VerificationResult,
}

/// Map-backed [`VerificationRepository`].
#[derive(Default)]
pub struct InMemoryRepository {
    store: Mutex<HashMap<TransactionId, StoredVerification>>,
}

impl InMemoryRepository {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(
        &self,
    ) -> CaduceusResult<std::sync::MutexGuard<'_, HashMap<TransactionId, StoredVerification>>> {
        self.store
            .lock()
            .map_err(|e| CaduceusError::RepositoryFailed {
                reason: format!("repository lock poisoned: {e}"),
            })
    }
}

#[async_trait]
impl VerificationRepository for InMemoryRepository {
    async fn save(
        &self,
        request: &VerificationRequest,
        result: &VerificationResult,
    ) -> CaduceusResult<TransactionId> {
        let transaction_id = TransactionId::new();
        let mut store = self.lock()?;
        store.insert(
            transaction_id,
            StoredVerification {
                request: request.clone(),
                result: result.clone().with_transaction_id(transaction_id),
            },
        );
        Ok(transaction_id)
    }

    async fn find_by_id(
        &self,
        transaction_id: &TransactionId,
    ) -> CaduceusResult<Option<VerificationResult>> {
        let store = self.lock()?;
        Ok(store.get(transaction_id).map(|stored| stored.result.clone()))
    }

    async fn update_status(
        &self,
        transaction_id: &TransactionId,
        status: VerificationStatus,
        metadata_patch: Value,
    ) -> CaduceusResult<()> {
        let mut store = self.lock()?;
        let stored =
            store
                .get_mut(transaction_id)
                .ok_or_else(|| CaduceusError::RepositoryFailed {
                    reason: format!("no verification with transaction id {transaction_id}"),
                })?;

        // A status change through this path is a human decision.
        stored.result.metadata = stored.result.metadata_merged(metadata_patch);
        stored.result.status = status;
        stored.result.method = VerificationMethod::Manual;
        stored.result.timestamp = chrono::Utc::now();
        Ok(())
    }

    async fn find_verified_providers(&self) -> CaduceusResult<Vec<VerificationRequest>> {
        let store = self.lock()?;
        Ok(store
            .values()
            .filter(|stored| stored.result.status == VerificationStatus::Verified)
            .map(|stored| stored.request.clone())
            .collect())
    }
}

// ── Fixture registry adapter ──────────────────────────────────────────────────

/// Serves a canned license register for one jurisdiction.
pub struct FixtureRegistryAdapter {
    jurisdiction: &'static str,
    registry_name: &'static str,
    /// License number to registered holder name.
    records: HashMap<String, String>,
}

impl FixtureRegistryAdapter {
    pub fn new(
        jurisdiction: &'static str,
        registry_name: &'static str,
        records: &[(&str, &str)],
    ) -> Self {
        Self {
            jurisdiction,
            registry_name,
            records: records
                .iter()
                .map(|(license, name)| (license.to_string(), name.to_string()))
                .collect(),
        }
    }
}

#[async_trait]
impl RegistryAdapter for FixtureRegistryAdapter {
    fn supports(&self, country_code: &CountryCode) -> bool {
        country_code.as_str() == self.jurisdiction
    }

    fn jurisdiction(&self) -> &'static str {
        self.jurisdiction
    }

    fn registry_name(&self) -> &'static str {
        self.registry_name
    }

    async fn verify(&self, request: &VerificationRequest) -> CaduceusResult<VerificationResult> {
        let license = request.attributes.license_number.trim();
        let Some(registered) = self.records.get(license) else {
            info!(registry = self.registry_name, license = %license, "license not in register");
            return Ok(VerificationResult::new(
                VerificationStatus::Rejected,
                VerificationMethod::ApiRegistry,
            )
            .with_metadata(json!({
                "source": self.registry_name,
                "reason": "License number not found in registry",
                "provided": license,
            })));
        };

        let claimed = request.attributes.full_name();
        let score = matcher::name_similarity(&claimed, registered);

        if matcher::is_exact_match(&claimed, registered) {
            return Ok(VerificationResult::new(
                VerificationStatus::Verified,
                VerificationMethod::ApiRegistry,
            )
            .with_metadata(json!({
                "source": self.registry_name,
                "licenseNumber": license,
                "providerName": registered,
                "matchScore": score,
            })));
        }

        let reason = if score >= matcher::DEFAULT_MIN_CONFIDENCE {
            "Name differs from registry record"
        } else {
            "Name mismatch with registry"
        };
        Ok(VerificationResult::new(
            VerificationStatus::ManualReview,
            VerificationMethod::ApiRegistry,
        )
        .with_confidence(score)
        .with_metadata(json!({
            "source": self.registry_name,
            "reason": reason,
            "provided": claimed,
            "registry": registered,
            "matchScore": score,
        })))
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
