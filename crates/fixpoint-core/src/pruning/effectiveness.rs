//! Pattern effectiveness analysis
//!
//! Derived per pruning run, never persisted. Effectiveness tells the
//! pruner which patterns the system already catches reliably; those are
//! the ones that can be compressed aggressively without losing signal.

use std::collections::HashMap;

use chrono::{DateTime, Duration, Utc};

use crate::memory::MemoryRecord;

/// Window inside which a record counts as recent activity
const RECENT_WINDOW_DAYS: i64 = 30;

/// Share of a namespace beyond which a pattern is dominance-checked
const OVER_REPRESENTATION_RATIO: f64 = 0.2;

/// Minimum instances before a pattern can be over-represented
const OVER_REPRESENTATION_COUNT: usize = 10;

/// Effectiveness floor for the over-represented flag
const OVER_REPRESENTATION_EFFECTIVENESS: f64 = 0.7;

/// Per-pattern-type effectiveness metrics for one namespace
#[derive(Debug, Clone, Default)]
pub struct PatternEffectiveness {
    /// Pattern (issue) type
    pub pattern_type: String,
    /// Instances of this pattern in the namespace
    pub count: usize,
    /// Mean stored confidence
    pub avg_confidence: f64,
    /// Share flagged as false positives
    pub false_positive_rate: f64,
    /// Share validated by a user
    pub user_validation_rate: f64,
    /// Share created within the recent window
    pub recent_activity_rate: f64,
    /// Blended effectiveness score in [0, 1]
    pub effectiveness_score: f64,
    /// Whether the pattern dominates the namespace and is caught reliably
    pub is_over_represented: bool,
}

/// Analyze pattern effectiveness across a namespace's records
///
/// Effectiveness blends confidence, inverse false-positive rate, user
/// validation, and recency:
/// `0.3·conf + 0.4·(1 − fp) + 0.2·validated + 0.1·min(1, 2·recent)`.
/// A pattern is over-represented when it holds more than 20% of the
/// namespace with at least 10 instances and effectiveness >= 0.7.
pub fn analyze_effectiveness(
    records: &[MemoryRecord],
    now: DateTime<Utc>,
) -> HashMap<String, PatternEffectiveness> {
    #[derive(Default)]
    struct Tally {
        count: usize,
        total_confidence: f64,
        false_positives: usize,
        user_validated: usize,
        recent: usize,
    }

    let total = records.len();
    let recent_cutoff = now - Duration::days(RECENT_WINDOW_DAYS);
    let recent_cutoff_ts = recent_cutoff.timestamp_micros() as f64 / 1_000_000.0;

    let mut tallies: HashMap<String, Tally> = HashMap::new();
    for record in records {
        let tally = tallies.entry(record.issue_type().to_string()).or_default();
        tally.count += 1;
        tally.total_confidence += record.confidence();
        if record.meta_bool("is_false_positive").unwrap_or(false) {
            tally.false_positives += 1;
        }
        if record.meta_bool("user_validated").unwrap_or(false) {
            tally.user_validated += 1;
        }
        if record.timestamp >= recent_cutoff_ts {
            tally.recent += 1;
        }
    }

    tallies
        .into_iter()
        .map(|(pattern_type, tally)| {
            let count = tally.count as f64;
            let avg_confidence = tally.total_confidence / count;
            let false_positive_rate = tally.false_positives as f64 / count;
            let user_validation_rate = tally.user_validated as f64 / count;
            let recent_activity_rate = tally.recent as f64 / count;

            let effectiveness_score = avg_confidence * 0.3
                + (1.0 - false_positive_rate) * 0.4
                + user_validation_rate * 0.2
                + (recent_activity_rate * 2.0).min(1.0) * 0.1;

            let representation_ratio = if total > 0 { count / total as f64 } else { 0.0 };
            let is_over_represented = representation_ratio > OVER_REPRESENTATION_RATIO
                && tally.count >= OVER_REPRESENTATION_COUNT
                && effectiveness_score >= OVER_REPRESENTATION_EFFECTIVENESS;

            let stats = PatternEffectiveness {
                pattern_type: pattern_type.clone(),
                count: tally.count,
                avg_confidence,
                false_positive_rate,
                user_validation_rate,
                recent_activity_rate,
                effectiveness_score,
                is_over_represented,
            };
            (pattern_type, stats)
        })
        .collect()
}
