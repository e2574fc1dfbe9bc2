//! Bias reporting over the decision log.
//!
//! Aggregates AI decisions per country so reviewers can spot skew: a
//! jurisdiction whose approval rate or average confidence drifts from the
//! others is a signal that prompts, regulations context, or document
//! quality differ in a way that needs human eyes.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::info;

use caduceus_contracts::result::VerificationStatus;

use crate::event::DecisionEvent;

/// Per-country outcome counts.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CountryOutcomes {
    pub approved: u64,
    pub rejected: u64,
    pub manual_review: u64,
}

/// The reporting window, inclusive on both ends.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportPeriod {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

/// Aggregated view of AI decisions for bias review.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BiasReport {
    pub period: ReportPeriod,
    pub total_decisions: u64,
    pub by_country: HashMap<String, CountryOutcomes>,
    pub average_confidence_by_country: HashMap<String, f64>,
    pub model_usage: HashMap<String, u64>,
}

/// Build a bias report from the events whose records fall inside
/// `[start, end]`.
pub fn bias_report(
    events: &[DecisionEvent],
    start: DateTime<Utc>,
    end: DateTime<Utc>,
) -> BiasReport {
    let mut by_country: HashMap<String, CountryOutcomes> = HashMap::new();
    let mut confidence_sums: HashMap<String, (f64, u64)> = HashMap::new();
    let mut model_usage: HashMap<String, u64> = HashMap::new();
    let mut total = 0u64;

    for event in events {
        let record = &event.record;
        if record.timestamp < start || record.timestamp > end {
            continue;
        }
        total += 1;

        let country = record.country_code.as_str().to_string();
        let outcomes = by_country.entry(country.clone()).or_default();
        match record.status {
            VerificationStatus::Verified => outcomes.approved += 1,
            VerificationStatus::Rejected => outcomes.rejected += 1,
            // The verifier never emits PENDING; anything else lands in the
            // manual-review bucket.
            _ => outcomes.manual_review += 1,
        }

        let (sum, count) = confidence_sums.entry(country).or_insert((0.0, 0));
        *sum += record.confidence_score;
        *count += 1;

        *model_usage.entry(record.model.clone()).or_insert(0) += 1;
    }

    let average_confidence_by_country = confidence_sums
        .into_iter()
        .map(|(country, (sum, count))| (country, sum / count as f64))
        .collect();

    info!(total_decisions = total, "bias report generated");
    BiasReport {
        period: ReportPeriod { start, end },
        total_decisions: total,
        by_country,
        average_confidence_by_country,
        model_usage,
    }
}
