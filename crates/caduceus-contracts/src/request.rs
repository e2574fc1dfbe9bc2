//! Verification request types.
//!
//! A `VerificationRequest` is constructed once at the system boundary and
//! consumed by the orchestrator. Nothing in the engine mutates it.

use serde::{Deserialize, Serialize};

/// Stable, opaque identifier for the provider being verified.
///
/// Assigned by the calling system (typically its user or application key).
/// The engine carries it through to persistence and audit but never
/// interprets it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ProviderId(pub String);

/// ISO 3166-1 alpha-2 country code.
///
/// Registry adapters match on this to decide whether they apply.
/// `CountryCode::new` normalizes to uppercase; adapters compare the
/// normalized form exactly.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CountryCode(pub String);

impl CountryCode {
    /// Create a country code, normalizing to uppercase ASCII.
    pub fn new(code: impl Into<String>) -> Self {
        Self(code.into().trim().to_ascii_uppercase())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for CountryCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// The identity the provider claims, as entered at the boundary.
///
/// These fields are untrusted free text. They are matched against registry
/// records and interpolated (sanitized) into AI prompts; treat them as
/// attacker-controlled until the guard has seen them.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderAttributes {
    pub first_name: String,
    pub last_name: String,
    /// Jurisdiction-specific license number (NPI, RPPS, GMC reference, ...).
    pub license_number: String,
    /// Optional date of birth, carried opaquely for cross-document checks.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date_of_birth: Option<String>,
}

impl ProviderAttributes {
    /// The claimed full name in "first last" order.
    pub fn full_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name)
    }
}

/// An uploaded document: raw bytes plus the MIME type the uploader declared.
///
/// The declared type is not trusted for anything security-relevant; it is
/// only used to label inline image data for the model.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AttachedDocument {
    pub bytes: Vec<u8>,
    pub mime_type: String,
}

/// One verification request, immutable for its whole lifetime.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VerificationRequest {
    pub provider_id: ProviderId,
    pub country_code: CountryCode,
    pub attributes: ProviderAttributes,
    /// Zero or more supporting documents (license scans, certificates).
    #[serde(default)]
    pub documents: Vec<AttachedDocument>,
    /// Optional government ID document for cross-document identity checks.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id_document: Option<AttachedDocument>,
}

impl VerificationRequest {
    /// True if at least one supporting document was uploaded.
    pub fn has_documents(&self) -> bool {
        !self.documents.is_empty()
    }

    /// The first supporting document, which keys the result cache.
    pub fn primary_document(&self) -> Option<&AttachedDocument> {
        self.documents.first()
    }

    /// Total number of attached documents, including the ID document.
    pub fn document_count(&self) -> usize {
        self.documents.len() + usize::from(self.id_document.is_some())
    }
}
