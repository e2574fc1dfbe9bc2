//! United Kingdom: General Medical Council adapter.
//!
//! The GMC publishes no public verification API (the register is searchable
//! online; bulk access is a paid subscription). This adapter validates the
//! reference-number format and then answers MANUAL_REVIEW with a prefilled
//! register search link. That is an explicit "I can't automate this"
//! signal, distinct from REJECTED.

use async_trait::async_trait;
use serde_json::json;
use tracing::info;

use caduceus_contracts::{
    error::CaduceusResult,
    request::{CountryCode, VerificationRequest},
    result::{VerificationMethod, VerificationResult, VerificationStatus},
};
use caduceus_core::traits::RegistryAdapter;

const GMC_REGISTER_URL: &str =
    "https://www.gmc-uk.org/registration-and-licensing/the-medical-register";

#[derive(Debug, Default)]
pub struct GbGmcAdapter;

impl GbGmcAdapter {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl RegistryAdapter for GbGmcAdapter {
    fn supports(&self, country_code: &CountryCode) -> bool {
        // "UK" is not the ISO code but shows up constantly in real input.
        matches!(country_code.as_str(), "GB" | "UK")
    }

    fn jurisdiction(&self) -> &'static str {
        "GB"
    }

    fn registry_name(&self) -> &'static str {
        "GB_GMC"
    }

    async fn verify(&self, request: &VerificationRequest) -> CaduceusResult<VerificationResult> {
        let gmc_number = request.attributes.license_number.trim();

        if !is_valid_gmc(gmc_number) {
            info!(gmc = %gmc_number, "GMC reference failed local format validation");
            return Ok(VerificationResult::new(
                VerificationStatus::Rejected,
                VerificationMethod::ApiRegistry,
            )
            .with_metadata(json!({
                "source": "GB_GMC",
                "reason": "Invalid UK GMC reference number format",
                "expectedFormat": "7 digits (e.g., 1234567)",
                "provided": gmc_number,
            })));
        }

        info!(gmc = %gmc_number, "format valid, routing to manual register check");
        Ok(VerificationResult::new(
            VerificationStatus::ManualReview,
            VerificationMethod::ApiRegistry,
        )
        .with_metadata(json!({
            "source": "GB_GMC",
            "reason": "GMC does not provide a public verification API",
            "gmcNumber": gmc_number,
            "providerName": request.attributes.full_name(),
            "verificationUrl": GMC_REGISTER_URL,
            "searchUrl": search_url(&request.attributes.last_name, &request.attributes.first_name),
            "suggestedAction": "Search the GMC Medical Register manually",
        })))
    }
}

/// Register search link prefilled with the claimed surname/forename.
fn search_url(last_name: &str, first_name: &str) -> String {
    reqwest::Url::parse_with_params(
        GMC_REGISTER_URL,
        &[("pc", "*"), ("sn", last_name), ("fn", first_name)],
    )
    .map(|url| url.to_string())
    .unwrap_or_else(|_| GMC_REGISTER_URL.to_string())
}

/// GMC reference numbers are exactly 7 digits, no prefix.
fn is_valid_gmc(reference: &str) -> bool {
    reference.len() == 7 && reference.bytes().all(|b| b.is_ascii_digit())
}

// ── Tests ─────────────────────────────────────────────────────────────────────
