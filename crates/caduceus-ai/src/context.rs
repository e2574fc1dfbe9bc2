//! Per-country regulatory context for the model prompt.
//!
//! Before calling the model, the verifier can enrich the prompt with short
//! regulation snippets for the request's jurisdiction, so the model judges
//! documents against the actual local rules rather than generic intuition.
//! Retrieval is strictly best-effort: a provider that fails (or knows
//! nothing about the country) yields no snippets, and verification proceeds
//! without them.

use async_trait::async_trait;

use caduceus_contracts::request::CountryCode;

/// Source of regulation snippets for one jurisdiction.
///
/// Implementations must never fail: an empty list is the only way to say
/// "no context available".
#[async_trait]
pub trait ContextProvider: Send + Sync {
    async fn regulations_for(&self, country: &CountryCode) -> Vec<String>;
}

/// Render snippets as a delimited prompt block.
///
/// Empty input renders as the empty string so the prompt carries no stray
/// headers when there is nothing to say.
pub fn format_for_prompt(country: &CountryCode, regulations: &[String]) -> String {
    if regulations.is_empty() {
        return String::new();
    }
    let body = regulations
        .iter()
        .enumerate()
        .map(|(i, r)| format!("[{}] {}", i + 1, r))
        .collect::<Vec<_>>()
        .join("\n\n");
    format!("\n### RELEVANT REGULATIONS FOR {country}:\n{body}\n### END OF REGULATIONS\n")
}

/// Built-in curated index covering the registry-backed jurisdictions.
///
/// Deployments with a real retrieval pipeline substitute their own
/// `ContextProvider`; this one answers from a fixed table and knows nothing
/// about other countries.
#[derive(Debug, Default)]
pub struct StaticRegulationIndex;

impl StaticRegulationIndex {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl ContextProvider for StaticRegulationIndex {
    async fn regulations_for(&self, country: &CountryCode) -> Vec<String> {
        let snippets: &[&str] = match country.as_str() {
            "US" => &[
                "US medical licenses are issued by state medical boards; the federal NPI \
                 (National Provider Identifier) is a 10-digit number assigned by CMS and \
                 printed on most credentialing paperwork.",
                "A genuine US state medical license displays the issuing board's seal, the \
                 license type (MD/DO), an expiration date, and a license number in the \
                 board's published format.",
            ],
            "FR" => &[
                "French practitioners are identified by an 11-digit RPPS number managed by \
                 ANS (Agence du Numerique en Sante); the number appears on the CPS card and \
                 on Ordre des Medecins registration certificates.",
                "Official French medical credentials carry the caduceus of the Ordre \
                 National des Medecins and are issued in French.",
            ],
            "GB" | "UK" => &[
                "UK doctors hold a 7-digit GMC (General Medical Council) reference number; \
                 registration status is published on the public GMC medical register.",
                "A UK certificate of registration states the doctor's full name, GMC \
                 reference number, and registration status (with or without a licence to \
                 practise).",
            ],
            _ => &[],
        };
        snippets.iter().map(|s| s.to_string()).collect()
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
