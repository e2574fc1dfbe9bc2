//! # caduceus-registry
//!
//! Country-specific registry adapters for the Caduceus engine. Each adapter
//! implements `caduceus_core::traits::RegistryAdapter` for one jurisdiction
//! and represents one of the three upstream shapes we deal with:
//!
//! - `UsNpiAdapter`: open REST API with fuzzy name classification (NPPES)
//! - `FrAnsAdapter`: authenticated FHIR gateway (Annuaire Santé / RPPS)
//! - `GbGmcAdapter`: no public API; format check plus link-out review (GMC)
//!
//! All network calls go through the shared `Resilience` executor, one
//! breaker key per registry.

use std::sync::Arc;

use caduceus_contracts::error::CaduceusResult;
use caduceus_core::resilience::Resilience;
use caduceus_core::traits::RegistryAdapter;

pub mod fr_ans;
pub mod gb_gmc;
pub mod us_npi;

pub use fr_ans::FrAnsAdapter;
pub use gb_gmc::GbGmcAdapter;
pub use us_npi::UsNpiAdapter;

/// All production adapters, in orchestrator selection order.
///
/// `ans_api_key` is the esante.gouv.fr gateway credential; pass `None` to
/// run the French adapter unauthenticated (lookups will classify as
/// auth-refused manual review if the gateway requires a key).
pub fn standard_adapters(
    resilience: Arc<Resilience>,
    ans_api_key: Option<String>,
) -> CaduceusResult<Vec<Arc<dyn RegistryAdapter>>> {
    Ok(vec![
        Arc::new(UsNpiAdapter::new(resilience.clone())?),
        Arc::new(FrAnsAdapter::new(resilience, ans_api_key)?),
        Arc::new(GbGmcAdapter::new()),
    ])
}
