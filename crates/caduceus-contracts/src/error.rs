//! Error types for the Caduceus verification engine.
//!
//! Almost every failure in this system is captured into a
//! `VerificationResult` rather than surfaced as an error; the variants here
//! exist for the narrow paths that legitimately propagate (deployment
//! defects, persistence failures) and for the typed signals that components
//! exchange internally (circuit state, budget refusal) before downgrading
//! them into results.

use thiserror::Error;

/// The unified error type for the Caduceus crates.
#[derive(Debug, Error)]
pub enum CaduceusError {
    /// A registry upstream could not be reached or answered abnormally.
    ///
    /// The orchestrator downgrades this to a PENDING result; it never
    /// reaches the engine's caller.
    #[error("registry '{registry}' unreachable: {reason}")]
    RegistryUnreachable { registry: String, reason: String },

    /// The circuit breaker for `key` is open; the call was not attempted.
    #[error("circuit breaker open for upstream '{key}'")]
    CircuitOpen { key: String },

    /// A call through the resilience executor exceeded its timeout.
    #[error("upstream '{key}' timed out after {timeout_ms}ms")]
    UpstreamTimeout { key: String, timeout_ms: u64 },

    /// The running AI spend plus the estimated call cost would cross the
    /// configured daily ceiling. Callers must treat this as "block the
    /// call", not as a transient failure to retry.
    #[error("daily AI budget exceeded: ${spent_usd:.4} spent + ${estimated_usd:.4} estimated > ${budget_usd:.2} ceiling")]
    BudgetExceeded {
        spent_usd: f64,
        estimated_usd: f64,
        budget_usd: f64,
    },

    /// The operator kill switch is set; all AI calls are blocked
    /// unconditionally, regardless of remaining budget.
    #[error("AI kill switch active: model calls are blocked")]
    KillSwitchActive,

    /// The model's output did not satisfy the verdict schema.
    ///
    /// Internal to the AI verifier, which resolves it to MANUAL_REVIEW with
    /// confidence 0.0 and the reason captured in metadata.
    #[error("model response invalid: {reason}")]
    ModelResponseInvalid { reason: String },

    /// A verdict cache tier failed a read or write.
    ///
    /// The tiered cache logs this and falls through to the next tier; it
    /// never reaches the verifier's outcome.
    #[error("verdict cache unavailable: {reason}")]
    CacheUnavailable { reason: String },

    /// The verification repository failed to save or read a result.
    ///
    /// Fatal for the request: the engine never returns a terminal result it
    /// could not persist.
    #[error("repository operation failed: {reason}")]
    RepositoryFailed { reason: String },

    /// The audit sink could not persist a decision record.
    #[error("audit write failed: {reason}")]
    AuditWriteFailed { reason: String },

    /// A required configuration value is missing or invalid.
    #[error("configuration error: {reason}")]
    ConfigError { reason: String },
}

/// Convenience alias used throughout the Caduceus crates.
pub type CaduceusResult<T> = Result<T, CaduceusError>;
