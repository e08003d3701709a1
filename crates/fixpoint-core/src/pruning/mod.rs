//! Pruning module - eviction and consolidation of learned patterns
//!
//! The pruner is the only writer that mutates existing memory records.
//! It balances two pressures: keep the store small enough to stay fast,
//! and keep the diversity that makes recall useful. Patterns the system
//! already catches reliably are compressed hard; rare and user-validated
//! patterns are preserved.

mod effectiveness;
mod pruner;

pub use effectiveness::{analyze_effectiveness, PatternEffectiveness};
pub use pruner::MemoryPruner;

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::storage::StorageError;

// ============================================================================
// ERROR TYPES
// ============================================================================

/// Pruning error type
#[non_exhaustive]
#[derive(Debug, thiserror::Error)]
pub enum PruningError {
    /// Underlying storage failure
    #[error("Storage error during pruning: {0}")]
    Storage(#[from] StorageError),
}

/// Pruning result type
pub type Result<T> = std::result::Result<T, PruningError>;

// ============================================================================
// STRATEGY & CONFIG
// ============================================================================

/// Selectable pruning strategies
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum PruningStrategy {
    /// Evict records past their (confidence-extended) retention window
    AgeBased,
    /// Cluster similar records; consolidate or thin the clusters
    RedundancyBased,
    /// Evict records scoring below the quality threshold
    QualityBased,
    /// Union of all strategies
    #[default]
    Hybrid,
}

impl PruningStrategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            PruningStrategy::AgeBased => "age_based",
            PruningStrategy::RedundancyBased => "redundancy_based",
            PruningStrategy::QualityBased => "quality_based",
            PruningStrategy::Hybrid => "hybrid",
        }
    }

    /// Parse a CLI strategy name; unknown names fall back to hybrid
    pub fn parse_name(s: &str) -> Self {
        match s {
            "age_based" => PruningStrategy::AgeBased,
            "redundancy_based" => PruningStrategy::RedundancyBased,
            "quality_based" => PruningStrategy::QualityBased,
            _ => PruningStrategy::Hybrid,
        }
    }
}

impl std::fmt::Display for PruningStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Configuration for memory pruning
#[derive(Debug, Clone)]
pub struct PruningConfig {
    /// Base retention window in days (doubled for protected namespaces)
    pub max_age_days: i64,
    /// Enhanced-similarity threshold for clustering
    pub similarity_threshold: f64,
    /// Cluster size at which standard consolidation kicks in
    pub consolidation_threshold: usize,
    /// Quality score below which a record is an eviction candidate
    pub quality_score_threshold: f64,
    /// Whether over-represented patterns get the aggressive policy
    pub aggressive: bool,
    /// Plan without applying
    pub dry_run: bool,
}

impl Default for PruningConfig {
    fn default() -> Self {
        Self {
            max_age_days: 365,
            similarity_threshold: 0.9,
            consolidation_threshold: 5,
            quality_score_threshold: 0.5,
            aggressive: true,
            dry_run: false,
        }
    }
}

// ============================================================================
// RESULTS
// ============================================================================

/// Outcome for one namespace
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct NamespaceOutcome {
    /// Records before pruning
    pub initial_count: usize,
    /// Records after pruning
    pub final_count: usize,
    /// Records deleted
    pub memories_removed: usize,
    /// Consolidation groups collapsed into summary records
    pub memories_consolidated: usize,
}

/// Result of a pruning run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PruningResult {
    /// Total records before
    pub total_memories_before: usize,
    /// Total records after
    pub total_memories_after: usize,
    /// Records deleted across all namespaces
    pub memories_removed: usize,
    /// Consolidation groups collapsed across all namespaces
    pub memories_consolidated: usize,
    /// Rough space estimate
    pub space_saved_mb: f64,
    /// Wall-clock duration
    pub pruning_time_seconds: f64,
    /// Strategy that ran
    pub strategy_used: PruningStrategy,
    /// Per-namespace breakdown
    pub namespace_results: HashMap<String, NamespaceOutcome>,
}

/// Rough space estimate: ~2 KiB per record, consolidations fold ~4:1
pub(crate) fn estimate_space_saved_mb(removed: usize, consolidated: usize) -> f64 {
    const AVG_RECORD_KB: f64 = 2.0;
    let consolidation_savings = consolidated as f64 * 3.0 * AVG_RECORD_KB;
    let removal_savings = removed as f64 * AVG_RECORD_KB;
    (consolidation_savings + removal_savings) / 1024.0
}
