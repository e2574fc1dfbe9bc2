//! # caduceus-audit
//!
//! SHA-256 hash-chained log of AI verification decisions, plus bias
//! reporting over it.
//!
//! ## Overview
//!
//! Every AI-derived decision the orchestrator emits is wrapped in a
//! `DecisionEvent` that links to the previous event via its SHA-256 hash.
//! Tampering with any event, even a single byte, breaks the chain and is
//! detected by `verify_chain`. The report module aggregates the chain into
//! per-country approval and confidence breakdowns.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use caduceus_audit::{bias_report, InMemoryDecisionLog};
//! use caduceus_core::traits::AuditSink;
//!
//! let log = InMemoryDecisionLog::new();
//! log.log_decision(&record).await?;
//!
//! assert!(log.verify_integrity());
//! let report = bias_report(&log.events(), start, end);
//! ```

pub mod chain;
pub mod event;
pub mod memory;
pub mod report;

pub use chain::{hash_event, verify_chain};
pub use event::DecisionEvent;
pub use memory::InMemoryDecisionLog;
pub use report::{bias_report, BiasReport};

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use caduceus_contracts::decision::DecisionRecord;
    use caduceus_contracts::request::{CountryCode, ProviderId};
    use caduceus_contracts::result::VerificationStatus;
    use caduceus_core::traits::AuditSink;

    use super::{DecisionEvent, InMemoryDecisionLog};

    fn make_record(provider: &str, status: VerificationStatus) -> DecisionRecord {
        DecisionRecord {
            provider_id: ProviderId(provider.to_string()),
            country_code: CountryCode::new("US"),
            status,
            confidence_score: 0.9,
            model: "gpt-4o-mini".to_string(),
            from_cache: false,
            timestamp: Utc::now(),
        }
    }

    #[tokio::test]
    async fn sequential_writes_form_a_valid_chain() {
        let log = InMemoryDecisionLog::new();
        log.log_decision(&make_record("a", VerificationStatus::Verified))
            .await
            .unwrap();
        log.log_decision(&make_record("b", VerificationStatus::Rejected))
            .await
            .unwrap();
        log.log_decision(&make_record("c", VerificationStatus::ManualReview))
            .await
            .unwrap();

        assert!(log.verify_integrity());
    }

    #[tokio::test]
    async fn tampering_with_a_stored_record_is_detected() {
        let log = InMemoryDecisionLog::new();
        log.log_decision(&make_record("a", VerificationStatus::Rejected))
            .await
            .unwrap();
        log.log_decision(&make_record("b", VerificationStatus::Rejected))
            .await
            .unwrap();

        // Mutate the internal state directly to simulate tampering: flip
        // the first decision from REJECTED to VERIFIED.
        {
            let mut state = log.state.lock().unwrap();
            state.events[0].record.status = VerificationStatus::Verified;
        }

        assert!(!log.verify_integrity());
    }

    #[tokio::test]
    async fn first_event_links_to_the_genesis_hash() {
        let log = InMemoryDecisionLog::new();
        log.log_decision(&make_record("a", VerificationStatus::Verified))
            .await
            .unwrap();

        let events = log.events();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].prev_hash, DecisionEvent::GENESIS_HASH);
    }

    #[tokio::test]
    async fn sequence_numbers_are_gapless() {
        let log = InMemoryDecisionLog::new();
        for provider in ["a", "b", "c", "d"] {
            log.log_decision(&make_record(provider, VerificationStatus::Verified))
                .await
                .unwrap();
        }

        for (index, event) in log.events().iter().enumerate() {
            assert_eq!(event.sequence, index as u64);
        }
    }

    #[tokio::test]
    async fn empty_chain_is_valid() {
        let log = InMemoryDecisionLog::new();
        assert!(log.verify_integrity());
        assert!(super::verify_chain(&[]));
    }
}
