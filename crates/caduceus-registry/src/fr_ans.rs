//! France: Annuaire Santé FHIR adapter (Agence du Numérique en Santé).
//!
//! Looks up the claimed RPPS number (Répertoire Partagé des Professionnels
//! de Santé) on the esante.gouv.fr FHIR R4 gateway. The gateway issues
//! per-consumer API keys; without one, Practitioner reads may come back
//! 401/403, which classifies as "cannot currently confirm" manual review
//! rather than rejection; a possibly-real provider is never rejected for
//! our credential problem.
//!
//! Match policy: auto-verify at 0.85 or better. Registry entries carry
//! diacritics and compound given names, so demanding exact equality would
//! send nearly every legitimate French provider to a human.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;
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

const ANS_API_BASE: &str = "https://gateway.api.esante.gouv.fr/fhir/v1";
const RPPS_OID: &str = "urn:oid:1.2.250.1.71.4.2.1";
const BREAKER_KEY: &str = "FR_ANS";

/// Scores at or above this verify automatically; see module docs.
const AUTO_VERIFY_BAR: f64 = 0.85;
const NAME_MATCH_FLOOR: f64 = matcher::DEFAULT_MIN_CONFIDENCE;

pub struct FrAnsAdapter {
    client: reqwest::Client,
    resilience: Arc<Resilience>,
    api_key: Option<String>,
}

impl FrAnsAdapter {
    pub fn new(resilience: Arc<Resilience>, api_key: Option<String>) -> CaduceusResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| CaduceusError::ConfigError {
                reason: format!("http client init failed: {e}"),
            })?;
        Ok(Self {
            client,
            resilience,
            api_key,
        })
    }
}

#[async_trait]
impl RegistryAdapter for FrAnsAdapter {
    fn supports(&self, country_code: &CountryCode) -> bool {
        country_code.as_str() == "FR"
    }

    fn jurisdiction(&self) -> &'static str {
        "FR"
    }

    fn registry_name(&self) -> &'static str {
        BREAKER_KEY
    }

    async fn verify(&self, request: &VerificationRequest) -> CaduceusResult<VerificationResult> {
        let rpps = request.attributes.license_number.trim().to_string();
        if !is_valid_rpps(&rpps) {
            info!(rpps = %rpps, "RPPS failed local format validation, rejecting without lookup");
            return Ok(VerificationResult::new(
                VerificationStatus::Rejected,
                VerificationMethod::ApiRegistry,
            )
            .with_metadata(json!({
                "source": "ANNUAIRE_SANTE_FHIR",
                "reason": "Invalid RPPS number format. Expected 11 digits.",
                "rppsNumber": rpps,
            })));
        }

        info!(rpps = %rpps, "querying Annuaire Sante FHIR gateway");
        let url = format!("{ANS_API_BASE}/Practitioner?identifier={RPPS_OID}|{rpps}&_format=json");
        let client = self.client.clone();
        let api_key = self.api_key.clone();
        let outcome = self
            .resilience
            .execute(BREAKER_KEY, || async move {
                let mut builder = client.get(&url).header("Accept", "application/fhir+json");
                if let Some(key) = &api_key {
                    builder = builder.header("ESANTE-API-KEY", key);
                }
                let response = builder
                    .send()
                    .await
                    .map_err(|e| upstream_error(e.to_string()))?;

                // 401/403 is an answer from a healthy gateway, not an
                // outage; it must not count against the breaker.
                let status = response.status();
                if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
                    return Ok(AnsResponse::AuthRefused(status.as_u16()));
                }

                let response = response
                    .error_for_status()
                    .map_err(|e| upstream_error(e.to_string()))?;
                let bundle = response
                    .json::<FhirBundle>()
                    .await
                    .map_err(|e| upstream_error(format!("malformed FHIR bundle: {e}")))?;
                Ok(AnsResponse::Bundle(bundle))
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

        let bundle = match response {
            AnsResponse::Bundle(bundle) => bundle,
            AnsResponse::AuthRefused(status) => {
                warn!(registry = BREAKER_KEY, status, "gateway refused credentials");
                return Ok(auth_refused(status, &rpps));
            }
        };

        let Some(practitioner) = bundle.entry.first().map(|e| &e.resource) else {
            info!(rpps = %rpps, "RPPS not present in Annuaire Sante");
            return Ok(VerificationResult::new(
                VerificationStatus::Rejected,
                VerificationMethod::ApiRegistry,
            )
            .with_metadata(json!({
                "source": "ANNUAIRE_SANTE_FHIR",
                "reason": "RPPS number not found in Annuaire Sante",
                "rppsNumber": rpps,
            })));
        };

        Ok(classify_practitioner(&request.attributes, practitioner, &rpps))
    }
}

// ── FHIR wire types ───────────────────────────────────────────────────────────

#[derive(Debug)]
enum AnsResponse {
    Bundle(FhirBundle),
    AuthRefused(u16),
}

#[derive(Debug, Deserialize)]
struct FhirBundle {
    #[serde(default)]
    entry: Vec<BundleEntry>,
}

#[derive(Debug, Deserialize)]
struct BundleEntry {
    resource: Practitioner,
}

#[derive(Debug, Default, Deserialize)]
struct Practitioner {
    #[serde(rename = "resourceType", default)]
    resource_type: String,
    #[serde(default)]
    name: Vec<HumanName>,
}

#[derive(Debug, Default, Deserialize)]
struct HumanName {
    #[serde(default)]
    given: Vec<String>,
    #[serde(default)]
    family: String,
}

// ── Classification ────────────────────────────────────────────────────────────

/// "given... family" from the first name entry; empty when the resource
/// carries no usable name (scores 0.0 and lands in mismatch review).
fn registered_name(practitioner: &Practitioner) -> String {
    practitioner
        .name
        .first()
        .map(|name| {
            let mut parts: Vec<&str> = name.given.iter().map(String::as_str).collect();
            if !name.family.is_empty() {
                parts.push(&name.family);
            }
            parts.join(" ")
        })
        .unwrap_or_default()
}

fn classify_practitioner(
    attributes: &ProviderAttributes,
    practitioner: &Practitioner,
    rpps: &str,
) -> VerificationResult {
    let claimed = attributes.full_name();
    let registered = registered_name(practitioner);
    let score = matcher::name_similarity(&claimed, &registered);

    if score >= AUTO_VERIFY_BAR {
        return VerificationResult::new(
            VerificationStatus::Verified,
            VerificationMethod::ApiRegistry,
        )
        .with_metadata(json!({
            "source": "ANNUAIRE_SANTE_FHIR",
            "rppsNumber": rpps,
            "providerName": registered,
            "resourceType": practitioner.resource_type,
            "matchScore": score,
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
        "source": "ANNUAIRE_SANTE_FHIR",
        "reason": reason,
        "provided": claimed,
        "registry": registered,
        "matchScore": score,
    }))
}

/// "We cannot currently confirm": the gateway is up but refused our
/// credentials. A possibly-real provider is never rejected for that.
fn auth_refused(status: u16, rpps: &str) -> VerificationResult {
    VerificationResult::new(
        VerificationStatus::ManualReview,
        VerificationMethod::ApiRegistry,
    )
    .with_metadata(json!({
        "source": "ANNUAIRE_SANTE_FHIR",
        "reason": "Registry authentication failed; verify RPPS manually",
        "httpStatus": status,
        "rppsNumber": rpps,
    }))
}

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

/// RPPS numbers are exactly 11 digits.
fn is_valid_rpps(rpps: &str) -> bool {
    rpps.len() == 11 && rpps.bytes().all(|b| b.is_ascii_digit())
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn attributes(first: &str, last: &str) -> ProviderAttributes {
        ProviderAttributes {
            first_name: first.to_string(),
            last_name: last.to_string(),
            license_number: "10001234567".to_string(),
            date_of_birth: None,
        }
    }

    fn practitioner(given: &[&str], family: &str) -> Practitioner {
        Practitioner {
            resource_type: "Practitioner".to_string(),
            name: vec![HumanName {
                given: given.iter().map(|s| s.to_string()).collect(),
                family: family.to_string(),
            }],
        }
    }

    #[test]
    fn rpps_format_is_eleven_digits() {
        assert!(is_valid_rpps("10001234567"));
        assert!(!is_valid_rpps("1000123456"), "too short");
        assert!(!is_valid_rpps("100012345678"), "too long");
        assert!(!is_valid_rpps("10001a34567"), "non-digit");
    }

    #[test]
    fn registered_name_joins_given_and_family() {
        let p = practitioner(&["Jean", "Pierre"], "Dupont");
        assert_eq!(registered_name(&p), "Jean Pierre Dupont");

        let nameless = Practitioner::default();
        assert_eq!(registered_name(&nameless), "");
    }

    #[test]
    fn matching_practitioner_verifies() {
        let result = classify_practitioner(
            &attributes("Jean", "Dupont"),
            &practitioner(&["Jean"], "DUPONT"),
            "10001234567",
        );

        assert_eq!(result.status, VerificationStatus::Verified);
        assert_eq!(result.metadata["source"], "ANNUAIRE_SANTE_FHIR");
        assert_eq!(result.metadata["rppsNumber"], "10001234567");
        assert_eq!(result.metadata["resourceType"], "Practitioner");
    }

    #[test]
    fn compound_given_name_clears_the_verify_bar() {
        // Applicant entered only the first given name; the registry carries
        // both. Jaro-Winkler keeps this above 0.85.
        let result = classify_practitioner(
            &attributes("Jean", "Dupont"),
            &practitioner(&["Jean", "Pierre"], "Dupont"),
            "10001234567",
        );
        assert_eq!(result.status, VerificationStatus::Verified);
    }

    #[test]
    fn unrelated_name_lands_in_mismatch_review() {
        let result = classify_practitioner(
            &attributes("Marc", "Leblanc"),
            &practitioner(&["Jean"], "Dupont"),
            "10001234567",
        );

        assert_eq!(result.status, VerificationStatus::ManualReview);
        assert!(result.confidence_score < NAME_MATCH_FLOOR);
        assert_eq!(result.reason(), Some("Name mismatch with registry"));
    }

    #[test]
    fn nameless_record_cannot_verify() {
        let result = classify_practitioner(
            &attributes("Jean", "Dupont"),
            &Practitioner::default(),
            "10001234567",
        );
        assert_eq!(result.status, VerificationStatus::ManualReview);
        assert_eq!(result.confidence_score, 0.0);
    }

    #[test]
    fn auth_refusal_is_manual_review_not_rejection() {
        let result = auth_refused(401, "10001234567");
        assert_eq!(result.status, VerificationStatus::ManualReview);
        assert_eq!(result.metadata["httpStatus"], 401);
        assert_eq!(
            result.reason(),
            Some("Registry authentication failed; verify RPPS manually")
        );
    }

    #[test]
    fn empty_bundle_parses() {
        let parsed: FhirBundle = serde_json::from_str(r#"{"resourceType": "Bundle"}"#).unwrap();
        assert!(parsed.entry.is_empty());
    }

    #[test]
    fn practitioner_bundle_parses() {
        let raw = r#"{
            "resourceType": "Bundle",
            "entry": [{
                "resource": {
                    "resourceType": "Practitioner",
                    "name": [{"family": "DUPONT", "given": ["Jean"]}]
                }
            }]
        }"#;
        let parsed: FhirBundle = serde_json::from_str(raw).unwrap();
        assert_eq!(registered_name(&parsed.entry[0].resource), "Jean DUPONT");
    }

    #[tokio::test]
    async fn invalid_format_rejects_without_network() {
        let adapter = FrAnsAdapter::new(Arc::new(Resilience::default()), None).unwrap();
        let request = VerificationRequest {
            provider_id: caduceus_contracts::request::ProviderId("p-1".to_string()),
            country_code: CountryCode::new("FR"),
            attributes: ProviderAttributes {
                license_number: "12345".to_string(),
                ..attributes("Jean", "Dupont")
            },
            documents: vec![],
            id_document: None,
        };

        let result = adapter.verify(&request).await.unwrap();
        assert_eq!(result.status, VerificationStatus::Rejected);
        assert_eq!(
            result.reason(),
            Some("Invalid RPPS number format. Expected 11 digits.")
        );
    }
}
