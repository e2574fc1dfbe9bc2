//! United States: CMS NPPES NPI Registry adapter.
//!
//! The National Provider Identifier is checked in two stages: the check
//! digit is validated locally (Luhn over the ISO 7812 `80840` health
//! industry prefix), then the public NPPES API confirms the record exists
//! and the registered name is scored against the claimed one.
//!
//! Match policy: auto-verification demands an exact normalized name match.
//! Anything else routes to manual review carrying the similarity score; the
//! reason string splits at the 0.6 floor between a likely spelling variant
//! and a different identity.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;
use tracing::{info, warn};

use caduceus_contracts::{
    error::{CaduceusError, CaduceusResult},
    request::{CountryCode, ProviderAttributes, VerificationRequest},
    result::{VerificationMethod, VerificationResult, VerificationStatus},
};
use caduceus_core::matcher;
use caduceus_core::resilience::Resilience;
use caduceus_core::traits::RegistryAdapter;

const NPPES_API_BASE: &str = "https://npiregistry.cms.hhs.gov/api/";
const BREAKER_KEY: &str = "US_NPI";

/// Below this score the registered name is treated as a different identity
/// rather than a spelling variant of the claimed one.
const NAME_MATCH_FLOOR: f64 = matcher::DEFAULT_MIN_CONFIDENCE;

pub struct UsNpiAdapter {
    client: reqwest::Client,
    resilience: Arc<Resilience>,
}

impl UsNpiAdapter {
    pub fn new(resilience: Arc<Resilience>) -> CaduceusResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| CaduceusError::ConfigError {
                reason: format!("http client init failed: {e}"),
            })?;
        Ok(Self { client, resilience })
    }
}

#[async_trait]
impl RegistryAdapter for UsNpiAdapter {
    fn supports(&self, country_code: &CountryCode) -> bool {
        country_code.as_str() == "US"
    }

    fn jurisdiction(&self) -> &'static str {
        "US"
    }

    fn registry_name(&self) -> &'static str {
        BREAKER_KEY
    }

    async fn verify(&self, request: &VerificationRequest) -> CaduceusResult<VerificationResult> {
        let npi = request.attributes.license_number.trim().to_string();
        if !is_valid_npi(&npi) {
            info!(npi = %npi, "NPI failed local checksum validation, rejecting without lookup");
            return Ok(VerificationResult::new(
                VerificationStatus::Rejected,
                VerificationMethod::ApiRegistry,
            )
            .with_metadata(json!({
                "source": "NPPES_API",
                "reason": "Invalid NPI number format. Expected 10 digits with a valid check digit.",
                "npi": npi,
            })));
        }

        info!(npi = %npi, "querying NPPES registry");
        let url = format!("{NPPES_API_BASE}?version=2.1&number={npi}");
        let client = self.client.clone();
        let outcome = self
            .resilience
            .execute(BREAKER_KEY, || async move {
                let response = client
                    .get(&url)
                    .send()
                    .await
                    .map_err(|e| upstream_error(e.to_string()))?
                    .error_for_status()
                    .map_err(|e| upstream_error(e.to_string()))?;
                response
                    .json::<NpiResponse>()
                    .await
                    .map_err(|e| upstream_error(format!("malformed NPPES payload: {e}")))
            })
            .await;

        let response = match outcome {
            Ok(response) => response,
            Err(CaduceusError::CircuitOpen { .. }) => {
                warn!(registry = BREAKER_KEY, "circuit open, degrading to pending");
                return Ok(registry_unavailable());
            }
            Err(err) => return Err(err),
        };

        if response.result_count == 0 || response.results.is_empty() {
            info!(npi = %npi, "NPI not present in NPPES");
            return Ok(VerificationResult::new(
                VerificationStatus::Rejected,
                VerificationMethod::ApiRegistry,
            )
            .with_metadata(json!({
                "source": "NPPES_API",
                "reason": "NPI not found in CMS registry",
                "npi": npi,
            })));
        }

        Ok(classify_record(&request.attributes, &response.results[0]))
    }
}

// ── NPPES wire types ──────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct NpiResponse {
    #[serde(default)]
    result_count: u32,
    #[serde(default)]
    results: Vec<NpiRecord>,
}

#[derive(Debug, Default, Deserialize)]
struct NpiRecord {
    #[serde(default)]
    number: String,
    #[serde(default)]
    basic: NpiBasic,
}

#[derive(Debug, Default, Deserialize)]
struct NpiBasic {
    #[serde(default)]
    first_name: String,
    #[serde(default)]
    last_name: String,
    #[serde(default)]
    last_updated: Option<String>,
}

// ── Classification ────────────────────────────────────────────────────────────

/// Classify a found NPPES record against the claimed identity.
fn classify_record(attributes: &ProviderAttributes, record: &NpiRecord) -> VerificationResult {
    let claimed = attributes.full_name();
    let registered = format!("{} {}", record.basic.first_name, record.basic.last_name);
    let score = matcher::name_similarity(&claimed, &registered);

    if matcher::is_exact_match(&claimed, &registered) {
        return VerificationResult::new(
            VerificationStatus::Verified,
            VerificationMethod::ApiRegistry,
        )
        .with_metadata(json!({
            "source": "NPPES_API",
            "npi": record.number,
            "providerName": registered,
            "matchScore": score,
            "lastUpdated": record.basic.last_updated,
        }));
    }

    let reason = if score >= NAME_MATCH_FLOOR {
        "Name differs from registry record"
    } else {
        "Name mismatch with registry"
    };
    VerificationResult::new(
        VerificationStatus::ManualReview,
        VerificationMethod::ApiRegistry,
    )
    .with_confidence(score)
    .with_metadata(json!({
        "source": "NPPES_API",
        "reason": reason,
        "provided": claimed,
        "registry": registered,
        "matchScore": score,
    }))
}

/// Fail-fast outcome while the NPPES breaker is open. PENDING lets the
/// orchestrator fall through to document verification instead of failing
/// the request.
fn registry_unavailable() -> VerificationResult {
    VerificationResult::new(
        VerificationStatus::Pending,
        VerificationMethod::ApiRegistry,
    )
    .with_confidence(0.0)
    .with_metadata(json!({
        "reason": "Registry temporarily unavailable (circuit breaker open)",
        "retryAfter": "10s",
    }))
}

fn upstream_error(reason: String) -> CaduceusError {
    CaduceusError::RegistryUnreachable {
        registry: BREAKER_KEY.to_string(),
        reason,
    }
}

// ── NPI check digit ───────────────────────────────────────────────────────────

/// NPI format validation: exactly ten digits, Luhn-valid with the `80840`
/// card-issuer prefix prepended.
fn is_valid_npi(npi: &str) -> bool {
    npi.len() == 10 && npi.bytes().all(|b| b.is_ascii_digit()) && luhn_valid(&format!("80840{npi}"))
}

fn luhn_valid(digits: &str) -> bool {
    let mut sum = 0u32;
    for (i, b) in digits.bytes().rev().enumerate() {
        let mut d = u32::from(b - b'0');
        if i % 2 == 1 {
            d *= 2;
            if d > 9 {
                d -= 9;
            }
        }
        sum += d;
    }
    sum % 10 == 0
}

// ── Tests ─────────────────────────────────────────────────────────────────────
