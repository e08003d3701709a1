//! Memory pruner
//!
//! Plans and applies eviction/consolidation per namespace. Planning is
//! pure over a snapshot of the namespace's records; application goes
//! through [`MemoryStore::apply_prune_plan`] so each namespace commits
//! atomically.

use std::collections::{HashMap, HashSet};
use std::time::Instant;

use chrono::{DateTime, Duration, Utc};
use serde_json::json;

use crate::memory::{is_protected_namespace, MemoryRecord, StoreInput};
use crate::storage::{MemoryStore, PrunePlan};

use super::effectiveness::{analyze_effectiveness, PatternEffectiveness};
use super::{
    estimate_space_saved_mb, NamespaceOutcome, PruningConfig, PruningResult, PruningStrategy,
    Result,
};

/// Retention extension for high-confidence records
const HIGH_CONFIDENCE_EXTENSION_DAYS: i64 = 180;

/// Retention extension for moderately confident records
const MID_CONFIDENCE_EXTENSION_DAYS: i64 = 90;

/// Quality indicator keys consulted per memory type
fn quality_indicators(memory_type: &str) -> &'static [&'static str] {
    match memory_type {
        "user_feedback" => &["confidence", "user_validated"],
        "false_positive_pattern" => &["confidence", "similarity_score"],
        "fp_analysis" => &["confidence", "cross_project_validation"],
        "context_rule" => &["effectiveness", "usage_count"],
        _ => &[],
    }
}

/// Intelligent memory pruner
///
/// Uses multiple strategies to remove low-value records while preserving
/// user feedback, validated patterns, and diversity. Over-represented
/// patterns the system catches reliably are compressed hardest.
pub struct MemoryPruner<'a> {
    store: &'a MemoryStore,
    config: PruningConfig,
}

impl<'a> MemoryPruner<'a> {
    pub fn new(store: &'a MemoryStore, config: PruningConfig) -> Self {
        Self { store, config }
    }

    pub fn config(&self) -> &PruningConfig {
        &self.config
    }

    // ========================================================================
    // DRIVERS
    // ========================================================================

    /// Prune every namespace with the given strategy
    pub fn prune_all(&self, strategy: PruningStrategy) -> Result<PruningResult> {
        let started = Instant::now();
        let before = self.store.total_count()?;

        let mut namespace_results = HashMap::new();
        let mut total_removed = 0;
        let mut total_consolidated = 0;

        for namespace in self.store.list_namespaces()? {
            tracing::info!(namespace = %namespace, strategy = %strategy, "pruning namespace");
            let outcome = self.prune_namespace(&namespace, strategy)?;
            total_removed += outcome.memories_removed;
            total_consolidated += outcome.memories_consolidated;
            namespace_results.insert(namespace, outcome);
        }

        let after = self.store.total_count()?;

        Ok(PruningResult {
            total_memories_before: before,
            total_memories_after: after,
            memories_removed: total_removed,
            memories_consolidated: total_consolidated,
            space_saved_mb: estimate_space_saved_mb(total_removed, total_consolidated),
            pruning_time_seconds: started.elapsed().as_secs_f64(),
            strategy_used: strategy,
            namespace_results,
        })
    }

    /// Prune a single namespace; atomic with respect to that namespace
    pub fn prune_namespace(
        &self,
        namespace: &str,
        strategy: PruningStrategy,
    ) -> Result<NamespaceOutcome> {
        let records = self.store.records(namespace)?;
        let initial_count = records.len();
        let now = Utc::now();

        let (plan, removed, consolidated) = self.plan_namespace(namespace, strategy, &records, now);

        if self.config.dry_run {
            return Ok(NamespaceOutcome {
                initial_count,
                final_count: initial_count.saturating_sub(plan.remove_ids.len())
                    + plan.consolidations.len(),
                memories_removed: removed,
                memories_consolidated: consolidated,
            });
        }

        self.store.apply_prune_plan(namespace, &plan)?;
        let final_count = self.store.count(namespace)?;

        tracing::info!(
            namespace = %namespace,
            removed,
            consolidated,
            initial_count,
            final_count,
            "namespace pruned"
        );

        Ok(NamespaceOutcome {
            initial_count,
            final_count,
            memories_removed: removed,
            memories_consolidated: consolidated,
        })
    }

    // ========================================================================
    // PLANNING
    // ========================================================================

    /// Build a prune plan; returns (plan, plain removals, consolidation groups)
    fn plan_namespace(
        &self,
        namespace: &str,
        strategy: PruningStrategy,
        records: &[MemoryRecord],
        now: DateTime<Utc>,
    ) -> (PrunePlan, usize, usize) {
        let protected = is_protected_namespace(namespace);

        let mut removal_ids: HashSet<i64> = HashSet::new();
        let mut consolidation_groups: Vec<Vec<&MemoryRecord>> = Vec::new();

        if matches!(strategy, PruningStrategy::AgeBased | PruningStrategy::Hybrid) {
            removal_ids.extend(self.aged_candidates(records, protected, now));
        }

        if matches!(strategy, PruningStrategy::RedundancyBased | PruningStrategy::Hybrid) {
            let (redundant, groups) = self.redundancy_plan(records, now);
            removal_ids.extend(redundant);
            consolidation_groups = groups;
        }

        if matches!(strategy, PruningStrategy::QualityBased | PruningStrategy::Hybrid) {
            let low_quality = self.low_quality_candidates(records, protected);
            // Only remove half of the low-quality set per run, guarding
            // against over-pruning a namespace that is merely unrated.
            removal_ids.extend(low_quality.iter().take(low_quality.len() / 2));
        }

        // Records scheduled for consolidation leave via their group, not
        // the plain removal set.
        let consolidated_members: HashSet<i64> = consolidation_groups
            .iter()
            .flat_map(|group| group.iter().map(|record| record.id))
            .collect();
        removal_ids.retain(|id| !consolidated_members.contains(id));

        let removed = removal_ids.len();
        let consolidated = consolidation_groups.len();

        let mut plan = PrunePlan {
            remove_ids: removal_ids.into_iter().collect(),
            consolidations: Vec::with_capacity(consolidation_groups.len()),
        };
        for group in &consolidation_groups {
            plan.remove_ids.extend(group.iter().map(|record| record.id));
            plan.consolidations.push(self.consolidated_record(namespace, group, now));
        }

        (plan, removed, consolidated)
    }

    /// Records past their retention window, extended for confidence and
    /// doubled for protected namespaces
    fn aged_candidates(
        &self,
        records: &[MemoryRecord],
        protected: bool,
        now: DateTime<Utc>,
    ) -> Vec<i64> {
        let base_days = if protected {
            self.config.max_age_days * 2
        } else {
            self.config.max_age_days
        };

        records
            .iter()
            .filter(|record| {
                let confidence = record.confidence();
                let extension = if confidence > 0.8 {
                    HIGH_CONFIDENCE_EXTENSION_DAYS
                } else if confidence > 0.6 {
                    MID_CONFIDENCE_EXTENSION_DAYS
                } else {
                    0
                };
                let cutoff = now - Duration::days(base_days + extension);
                record.timestamp < cutoff.timestamp_micros() as f64 / 1_000_000.0
            })
            .map(|record| record.id)
            .collect()
    }

    /// Records scoring under the quality threshold (lowered for protected
    /// namespaces), worst first
    fn low_quality_candidates(&self, records: &[MemoryRecord], protected: bool) -> Vec<i64> {
        let threshold = if protected {
            self.config.quality_score_threshold * 0.7
        } else {
            self.config.quality_score_threshold
        };

        let mut scored: Vec<(i64, f64)> = records
            .iter()
            .map(|record| (record.id, quality_score(record)))
            .filter(|(_, score)| *score < threshold)
            .collect();
        scored.sort_by(|a, b| a.1.partial_cmp(&b.1).unwrap_or(std::cmp::Ordering::Equal));
        scored.into_iter().map(|(id, _)| id).collect()
    }

    /// Cluster similar records and decide removals/consolidations per cluster
    fn redundancy_plan<'r>(
        &self,
        records: &'r [MemoryRecord],
        now: DateTime<Utc>,
    ) -> (Vec<i64>, Vec<Vec<&'r MemoryRecord>>) {
        if records.len() < 2 {
            return (vec![], vec![]);
        }

        let effectiveness = analyze_effectiveness(records, now);

        // Greedy similarity grouping
        let mut groups: Vec<Vec<&MemoryRecord>> = Vec::new();
        let mut grouped: HashSet<i64> = HashSet::new();

        for (i, a) in records.iter().enumerate() {
            if grouped.contains(&a.id) {
                continue;
            }
            let mut group = vec![a];
            grouped.insert(a.id);

            for b in records.iter().skip(i + 1) {
                if grouped.contains(&b.id) {
                    continue;
                }
                if enhanced_similarity(a, b, &effectiveness) > self.config.similarity_threshold {
                    group.push(b);
                    grouped.insert(b.id);
                }
            }

            if group.len() > 1 {
                groups.push(group);
            }
        }

        let mut to_remove = Vec::new();
        let mut to_consolidate = Vec::new();

        for group in groups {
            let pattern_type = group[0].issue_type().to_string();
            let stats = effectiveness.get(&pattern_type);
            let over_represented = stats.map(|s| s.is_over_represented).unwrap_or(false);

            if self.config.aggressive && over_represented {
                let effectiveness_score =
                    stats.map(|s| s.effectiveness_score).unwrap_or(0.5);
                let (removals, consolidations) =
                    self.aggressive_plan(group, effectiveness_score, &effectiveness);
                to_remove.extend(removals);
                to_consolidate.extend(consolidations);
            } else if group.len() >= self.config.consolidation_threshold {
                to_consolidate.push(group);
            } else if should_remove_duplicates(&group, &effectiveness) {
                let mut sorted = group;
                sort_by_quality(&mut sorted, &effectiveness);
                to_remove.extend(sorted.into_iter().skip(1).map(|record| record.id));
            }
        }

        (to_remove, to_consolidate)
    }

    /// Aggressive policy for over-represented, reliably-caught patterns
    ///
    /// Keeps the best few exemplars; the rest is either dropped outright
    /// (very effective, highly duplicated patterns) or folded into one
    /// summary record so the history is not lost entirely.
    fn aggressive_plan<'r>(
        &self,
        mut group: Vec<&'r MemoryRecord>,
        effectiveness_score: f64,
        effectiveness: &HashMap<String, PatternEffectiveness>,
    ) -> (Vec<i64>, Vec<Vec<&'r MemoryRecord>>) {
        let n = group.len();
        sort_by_quality(&mut group, effectiveness);

        if effectiveness_score > 0.8 && n > 20 {
            // Very effective with heavy duplication: keep ~12.5%, min 3
            let keep = std::cmp::max(3, n / 8);
            let removals = group.split_off(keep).iter().map(|r| r.id).collect();
            tracing::info!(
                pattern = %group[0].issue_type(),
                kept = keep,
                total = n,
                "aggressive prune of saturated pattern"
            );
            (removals, vec![])
        } else if effectiveness_score > 0.7 && n > 10 {
            // Effective, moderately duplicated: keep the best exemplars and
            // collapse the remainder into a single summary
            let keep = std::cmp::max(2, n / 8);
            let remainder = group.split_off(keep);
            tracing::info!(
                pattern = %remainder[0].issue_type(),
                kept = keep,
                consolidated = remainder.len(),
                "consolidating over-represented pattern"
            );
            (vec![], vec![remainder])
        } else {
            // Moderately effective: halve, min 5 kept
            let keep = std::cmp::max(5, n / 2);
            if keep >= n {
                (vec![], vec![])
            } else {
                let removals = group.split_off(keep).iter().map(|r| r.id).collect();
                (removals, vec![])
            }
        }
    }

    /// Build the synthetic summary record for a consolidation group
    fn consolidated_record(
        &self,
        namespace: &str,
        group: &[&MemoryRecord],
        now: DateTime<Utc>,
    ) -> StoreInput {
        let sample: Vec<&str> = group.iter().take(3).map(|r| r.content.as_str()).collect();
        let content = format!(
            "Consolidated pattern from {} similar memories: {}",
            group.len(),
            sample.join("; ")
        );

        let total_confidence: f64 = group.iter().map(|r| r.confidence()).sum();
        let user_validated = group
            .iter()
            .filter(|r| r.meta_bool("user_validated").unwrap_or(false))
            .count();

        // Most common issue type among the members
        let mut type_counts: HashMap<&str, usize> = HashMap::new();
        for record in group {
            *type_counts.entry(record.issue_type()).or_default() += 1;
        }
        let issue_type = type_counts
            .into_iter()
            .max_by_key(|(_, count)| *count)
            .map(|(t, _)| t.to_string())
            .unwrap_or_else(|| "unknown".to_string());

        let metadata = json!({
            "memory_type": "consolidated_pattern",
            "issue_type": issue_type,
            "original_count": group.len(),
            "original_memory_ids": group.iter().map(|r| r.id).collect::<Vec<_>>(),
            "consolidated_date": now.to_rfc3339(),
            "confidence": total_confidence / group.len() as f64,
            "user_validated": user_validated * 2 > group.len(),
            "consolidation_source": "memory_pruner",
        });

        StoreInput::new(namespace, content).with_metadata(metadata)
    }
}

// ============================================================================
// SCORING & SIMILARITY
// ============================================================================

/// Quality score for a record: stored confidence plus type-specific
/// indicator bonuses and validation boosts, clamped to [0, 1]
pub(crate) fn quality_score(record: &MemoryRecord) -> f64 {
    let mut score = record.confidence();

    let memory_type = record.meta_str("memory_type").unwrap_or("unknown");
    for indicator in quality_indicators(memory_type) {
        match record.metadata.get(*indicator) {
            Some(v) if v.is_boolean() => {
                if v.as_bool() == Some(true) {
                    score += 0.2;
                }
            }
            Some(v) => {
                if let Some(n) = v.as_f64() {
                    score += n * 0.1;
                }
            }
            None => {}
        }
    }

    if record.meta_bool("user_validated").unwrap_or(false) {
        score += 0.3;
    }
    if record.meta_bool("cross_project_validation").unwrap_or(false) {
        score += 0.2;
    }
    if record.meta_f64("usage_count") == Some(0.0) {
        score -= 0.3;
    }

    score.clamp(0.0, 1.0)
}

/// Quality with an effectiveness boost and a mild penalty for dominance
fn quality_with_effectiveness(
    record: &MemoryRecord,
    effectiveness: &HashMap<String, PatternEffectiveness>,
) -> f64 {
    let base = quality_score(record);
    let stats = effectiveness.get(record.issue_type());
    let boost = stats.map(|s| s.effectiveness_score).unwrap_or(0.5) * 0.1;
    let penalty = if stats.map(|s| s.is_over_represented).unwrap_or(false) {
        -0.05
    } else {
        0.0
    };
    (base + boost + penalty).clamp(0.0, 1.0)
}

fn sort_by_quality(
    group: &mut [&MemoryRecord],
    effectiveness: &HashMap<String, PatternEffectiveness>,
) {
    group.sort_by(|a, b| {
        quality_with_effectiveness(b, effectiveness)
            .partial_cmp(&quality_with_effectiveness(a, effectiveness))
            .unwrap_or(std::cmp::Ordering::Equal)
    });
}

/// Word-overlap (Jaccard) similarity between two contents
fn text_similarity(a: &str, b: &str) -> f64 {
    let words_a: HashSet<String> = a.to_lowercase().split_whitespace().map(String::from).collect();
    let words_b: HashSet<String> = b.to_lowercase().split_whitespace().map(String::from).collect();
    let union = words_a.union(&words_b).count();
    if union == 0 {
        return 0.0;
    }
    words_a.intersection(&words_b).count() as f64 / union as f64
}

/// Similarity adjusted for pattern type and over-representation
///
/// Different pattern types are discounted; over-represented patterns are
/// boosted so their duplicates group (and prune) more readily.
fn enhanced_similarity(
    a: &MemoryRecord,
    b: &MemoryRecord,
    effectiveness: &HashMap<String, PatternEffectiveness>,
) -> f64 {
    let mut similarity = text_similarity(&a.content, &b.content);

    if a.issue_type() != b.issue_type() {
        similarity *= 0.7;
    }

    if effectiveness
        .get(a.issue_type())
        .map(|s| s.is_over_represented)
        .unwrap_or(false)
    {
        similarity *= 1.2;
    }

    similarity.min(1.0)
}

/// Whether a small duplicate group is safe to thin down to its best member
fn should_remove_duplicates(
    group: &[&MemoryRecord],
    effectiveness: &HashMap<String, PatternEffectiveness>,
) -> bool {
    if group.len() <= 3 {
        return false;
    }
    let stats = match effectiveness.get(group[0].issue_type()) {
        Some(stats) => stats,
        None => return false,
    };

    let mut qualities: Vec<f64> = group.iter().map(|r| quality_score(r)).collect();
    qualities.sort_by(|a, b| b.partial_cmp(a).unwrap_or(std::cmp::Ordering::Equal));
    let spread = qualities.first().unwrap_or(&0.0) - qualities.last().unwrap_or(&0.0);

    stats.effectiveness_score > 0.6 && stats.false_positive_rate < 0.4 && spread > 0.2
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::StoreInput;
    use crate::pruning::PruningStrategy;
    use crate::storage::MemoryStore;

    fn seed_debugging_patterns(store: &MemoryStore, count: usize) {
        for i in 0..count {
            store
                .store(
                    StoreInput::new(
                        "patterns",
                        format!("Debug print statement found in module handler {i}"),
                    )
                    .with_metadata(json!({
                        "issue_type": "debugging",
                        "confidence": 0.9,
                    })),
                )
                .unwrap();
        }
    }

    #[test]
    fn test_hybrid_consolidates_saturated_namespace() {
        let store = MemoryStore::in_memory().unwrap();
        seed_debugging_patterns(&store, 30);

        let pruner = MemoryPruner::new(&store, PruningConfig::default());
        let outcome = pruner.prune_namespace("patterns", PruningStrategy::Hybrid).unwrap();

        assert_eq!(outcome.initial_count, 30);
        assert!(outcome.final_count <= 5, "expected <= 5, got {}", outcome.final_count);
        assert_eq!(outcome.memories_consolidated, 1);

        // The summary record survives and references its sources
        let survivors = store.records("patterns").unwrap();
        let summary = survivors
            .iter()
            .find(|r| r.meta_str("memory_type") == Some("consolidated_pattern"))
            .expect("a consolidated record should exist");
        assert!(summary.content.starts_with("Consolidated pattern from"));
        let ids = summary.metadata["original_memory_ids"].as_array().unwrap();
        assert!(ids.len() > 10);
    }

    #[test]
    fn test_pruning_is_idempotent() {
        let store = MemoryStore::in_memory().unwrap();
        seed_debugging_patterns(&store, 30);

        let pruner = MemoryPruner::new(&store, PruningConfig::default());
        pruner.prune_namespace("patterns", PruningStrategy::Hybrid).unwrap();
        let after_first = store.count("patterns").unwrap();

        let outcome = pruner.prune_namespace("patterns", PruningStrategy::Hybrid).unwrap();
        assert_eq!(outcome.memories_removed, 0);
        assert_eq!(outcome.memories_consolidated, 0);
        assert_eq!(store.count("patterns").unwrap(), after_first);
    }

    #[test]
    fn test_invariant_before_after_accounting() {
        let store = MemoryStore::in_memory().unwrap();
        seed_debugging_patterns(&store, 30);

        let pruner = MemoryPruner::new(&store, PruningConfig::default());
        let result = pruner.prune_all(PruningStrategy::Hybrid).unwrap();

        // before >= after + removed - consolidations created
        assert!(
            result.total_memories_before
                >= result.total_memories_after + result.memories_removed
                    - result.memories_consolidated
        );
    }

    #[test]
    fn test_dry_run_leaves_store_untouched() {
        let store = MemoryStore::in_memory().unwrap();
        seed_debugging_patterns(&store, 30);

        let config = PruningConfig {
            dry_run: true,
            ..PruningConfig::default()
        };
        let pruner = MemoryPruner::new(&store, config);
        let outcome = pruner.prune_namespace("patterns", PruningStrategy::Hybrid).unwrap();

        assert!(outcome.memories_consolidated > 0);
        assert_eq!(store.count("patterns").unwrap(), 30);
    }

    #[test]
    fn test_age_based_respects_confidence_extension() {
        let store = MemoryStore::in_memory().unwrap();
        let pruner = MemoryPruner::new(&store, PruningConfig::default());

        let old = Utc::now() - Duration::days(400);
        let make = |id: i64, confidence: f64| MemoryRecord {
            id,
            namespace: "ns".into(),
            content: format!("r{id}"),
            metadata: json!({"confidence": confidence}),
            timestamp: old.timestamp_micros() as f64 / 1_000_000.0,
            vector_id: None,
            created_at: old,
        };

        // 400 days old: past the 365-day window, but inside the extended
        // window for high-confidence records
        let records = vec![make(1, 0.3), make(2, 0.7), make(3, 0.95)];
        let aged = pruner.aged_candidates(&records, false, Utc::now());
        assert_eq!(aged, vec![1]);
    }

    #[test]
    fn test_age_based_protected_namespace_doubles_window() {
        let store = MemoryStore::in_memory().unwrap();
        let pruner = MemoryPruner::new(&store, PruningConfig::default());

        let old = Utc::now() - Duration::days(400);
        let record = MemoryRecord {
            id: 1,
            namespace: "user_feedback".into(),
            content: "feedback".into(),
            metadata: json!({"confidence": 0.3}),
            timestamp: old.timestamp_micros() as f64 / 1_000_000.0,
            vector_id: None,
            created_at: old,
        };

        assert!(pruner.aged_candidates(std::slice::from_ref(&record), true, Utc::now()).is_empty());
        assert_eq!(pruner.aged_candidates(&[record], false, Utc::now()), vec![1]);
    }

    #[test]
    fn test_quality_score_bonuses() {
        let base = MemoryRecord {
            id: 1,
            namespace: "ns".into(),
            content: "r".into(),
            metadata: json!({"confidence": 0.4}),
            timestamp: 0.0,
            vector_id: None,
            created_at: Utc::now(),
        };
        assert!((quality_score(&base) - 0.4).abs() < 1e-9);

        let mut validated = base.clone();
        validated.metadata = json!({"confidence": 0.4, "user_validated": true});
        assert!((quality_score(&validated) - 0.7).abs() < 1e-9);

        let mut unused = base.clone();
        unused.metadata = json!({"confidence": 0.4, "usage_count": 0});
        assert!((quality_score(&unused) - 0.1).abs() < 1e-9);

        let mut stacked = base.clone();
        stacked.metadata = json!({"confidence": 0.9, "user_validated": true, "cross_project_validation": true});
        assert_eq!(quality_score(&stacked), 1.0);
    }

    #[test]
    fn test_quality_based_halves_candidates() {
        let store = MemoryStore::in_memory().unwrap();
        for i in 0..10 {
            store
                .store(
                    StoreInput::new("ns", format!("weak pattern number {i} entirely distinct words {i}"))
                        .with_metadata(json!({"confidence": 0.1, "issue_type": format!("t{i}")})),
                )
                .unwrap();
        }

        let pruner = MemoryPruner::new(&store, PruningConfig::default());
        let outcome = pruner.prune_namespace("ns", PruningStrategy::QualityBased).unwrap();

        // Only half of the low-quality records go per run
        assert_eq!(outcome.memories_removed, 5);
        assert_eq!(store.count("ns").unwrap(), 5);
    }

    #[test]
    fn test_text_similarity() {
        assert!(text_similarity("debug print in handler", "debug print in handler") > 0.99);
        assert!(text_similarity("debug print in handler", "sql injection risk") < 0.2);
    }

    #[test]
    fn test_enhanced_similarity_discounts_type_mismatch() {
        let a = MemoryRecord {
            id: 1,
            namespace: "ns".into(),
            content: "same words here".into(),
            metadata: json!({"issue_type": "debugging"}),
            timestamp: 0.0,
            vector_id: None,
            created_at: Utc::now(),
        };
        let mut b = a.clone();
        b.id = 2;
        b.metadata = json!({"issue_type": "security"});

        let eff = HashMap::new();
        let same_type_sim = enhanced_similarity(&a, &a, &eff);
        let cross_type_sim = enhanced_similarity(&a, &b, &eff);
        assert!(cross_type_sim < same_type_sim);
        assert!((cross_type_sim - 0.7).abs() < 1e-9);
    }
}
