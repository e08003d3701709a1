//! Improvement-cycle tracking
//!
//! Compares successive scans of a project to work out what got fixed,
//! who fixed it (a human or the pipeline), and which issue types keep
//! being fixed by hand - those are the automation opportunities. All
//! state lives in memory-store records, keyed by ids, never by pointers.

use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::memory::{StoreInput, CYCLE_NAMESPACE};
use crate::storage::{MemoryStore, Result};

use super::Issue;

/// Namespace holding one record per detected manual fix
pub const MANUAL_FIX_NAMESPACE: &str = "manual_fixes";

/// Issue types the proposal generator can fix mechanically; resolved
/// issues of these types are credited to the pipeline
const AUTOMATABLE_TYPES: &[&str] = &["bare_except", "debugging", "security_eval", "cpp_missing_include"];

/// Manual fixes of one type seen at least this often become an
/// automation opportunity
const OPPORTUNITY_THRESHOLD: usize = 3;

// ============================================================================
// RESULTS
// ============================================================================

/// Outcome of comparing two scans
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScanComparison {
    pub previous_issues_count: usize,
    pub current_issues_count: usize,
    /// Issues present before and gone now
    pub total_resolved: usize,
    /// Resolved issues credited to humans
    pub manual_fixes_detected: usize,
    /// Resolved issues the pipeline could have produced
    pub automated_fixes_estimated: usize,
    pub manual_fix_rate: f64,
    pub automated_fix_rate: f64,
    /// Manual fixes per issue type
    pub manual_fix_types_breakdown: HashMap<String, usize>,
}

/// Aggregated manual-fix patterns
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ManualFixPatterns {
    pub total_manual_fixes: usize,
    /// Per issue type: occurrence count and the contexts it appeared in
    pub issue_types: HashMap<String, ManualFixTypeStats>,
    pub automation_opportunities: Vec<AutomationOpportunity>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ManualFixTypeStats {
    pub count: usize,
    pub contexts: Vec<String>,
}

/// An issue type worth teaching the generator about
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AutomationOpportunity {
    pub issue_type: String,
    pub frequency: usize,
    pub recommendation: String,
}

/// Aggregate metrics across recorded cycles
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CycleMetrics {
    pub total_cycles: usize,
    pub completed_cycles: usize,
    pub success_rate: f64,
    /// Share of resolved issues that went through the pipeline
    pub fix_application_rate: f64,
}

// ============================================================================
// TRACKER
// ============================================================================

/// Tracks improvement cycles through the memory store
pub struct CycleTracker<'a> {
    memory: &'a MemoryStore,
}

impl<'a> CycleTracker<'a> {
    pub fn new(memory: &'a MemoryStore) -> Self {
        Self { memory }
    }

    /// Issues present in the previous scan and absent now, credited to
    /// manual work; each detection is recorded for pattern analysis
    pub fn detect_manual_fixes(
        &self,
        previous: &[Issue],
        current: &[Issue],
        project_path: &str,
    ) -> Result<Vec<Issue>> {
        let current_keys: HashSet<_> = current.iter().map(|issue| issue.dedup_key()).collect();

        let manual: Vec<Issue> = previous
            .iter()
            .filter(|issue| !current_keys.contains(&issue.dedup_key()))
            .filter(|issue| !AUTOMATABLE_TYPES.contains(&issue.issue_type.as_str()))
            .cloned()
            .collect();

        for fix in &manual {
            self.memory.store(
                StoreInput::new(
                    MANUAL_FIX_NAMESPACE,
                    format!("Manual fix: {} in {}", fix.issue_type, fix.file_path),
                )
                .with_metadata(json!({
                    "issue_type": fix.issue_type,
                    "file_path": fix.file_path,
                    "file_context": fix.context.as_str(),
                    "project_path": project_path,
                    "memory_type": "manual_fix",
                })),
            )?;
        }

        Ok(manual)
    }

    /// Compare two scans and record the cycle
    pub fn compare_scans(
        &self,
        previous: &[Issue],
        current: &[Issue],
        project_path: &str,
    ) -> Result<ScanComparison> {
        let current_keys: HashSet<_> = current.iter().map(|issue| issue.dedup_key()).collect();
        let resolved: Vec<&Issue> = previous
            .iter()
            .filter(|issue| !current_keys.contains(&issue.dedup_key()))
            .collect();

        let (automated, manual): (Vec<&&Issue>, Vec<&&Issue>) = resolved
            .iter()
            .partition(|issue| AUTOMATABLE_TYPES.contains(&issue.issue_type.as_str()));

        let mut breakdown: HashMap<String, usize> = HashMap::new();
        for issue in &manual {
            *breakdown.entry(issue.issue_type.clone()).or_default() += 1;
        }

        let total_resolved = resolved.len();
        let comparison = ScanComparison {
            previous_issues_count: previous.len(),
            current_issues_count: current.len(),
            total_resolved,
            manual_fixes_detected: manual.len(),
            automated_fixes_estimated: automated.len(),
            manual_fix_rate: rate(manual.len(), total_resolved),
            automated_fix_rate: rate(automated.len(), total_resolved),
            manual_fix_types_breakdown: breakdown,
        };

        self.memory.store(
            StoreInput::new(
                CYCLE_NAMESPACE,
                format!(
                    "Scan comparison for {project_path}: {total_resolved} resolved"
                ),
            )
            .with_metadata(json!({
                "memory_type": "cycle_record",
                "project_path": project_path,
                "previous_count": comparison.previous_issues_count,
                "current_count": comparison.current_issues_count,
                "total_resolved": total_resolved,
                "manual_fixes": comparison.manual_fixes_detected,
                "automated_fixes": comparison.automated_fixes_estimated,
                "completed": true,
            })),
        )?;

        Ok(comparison)
    }

    /// Aggregate recorded manual fixes into per-type patterns
    pub fn manual_fix_patterns(&self) -> Result<ManualFixPatterns> {
        let records = self.memory.records(MANUAL_FIX_NAMESPACE)?;

        let mut issue_types: HashMap<String, ManualFixTypeStats> = HashMap::new();
        for record in &records {
            let issue_type = record.issue_type().to_string();
            let stats = issue_types.entry(issue_type).or_default();
            stats.count += 1;
            if let Some(context) = record.meta_str("file_context") {
                if !stats.contexts.iter().any(|c| c == context) {
                    stats.contexts.push(context.to_string());
                }
            }
        }

        let mut automation_opportunities: Vec<AutomationOpportunity> = issue_types
            .iter()
            .filter(|(_, stats)| stats.count >= OPPORTUNITY_THRESHOLD)
            .map(|(issue_type, stats)| AutomationOpportunity {
                issue_type: issue_type.clone(),
                frequency: stats.count,
                recommendation: format!(
                    "{} was fixed by hand {} times; a generator rule would pay for itself",
                    issue_type, stats.count
                ),
            })
            .collect();
        automation_opportunities.sort_by(|a, b| b.frequency.cmp(&a.frequency));

        Ok(ManualFixPatterns {
            total_manual_fixes: records.len(),
            issue_types,
            automation_opportunities,
        })
    }

    /// Aggregate cycle metrics from recorded comparisons
    pub fn cycle_metrics(&self) -> Result<CycleMetrics> {
        let records = self.memory.records(CYCLE_NAMESPACE)?;
        let cycles: Vec<_> = records
            .iter()
            .filter(|record| record.meta_str("memory_type") == Some("cycle_record"))
            .collect();

        let completed = cycles
            .iter()
            .filter(|record| record.meta_bool("completed").unwrap_or(false))
            .count();

        let (resolved_total, automated_total) = cycles.iter().fold((0f64, 0f64), |acc, record| {
            (
                acc.0 + record.meta_f64("total_resolved").unwrap_or(0.0),
                acc.1 + record.meta_f64("automated_fixes").unwrap_or(0.0),
            )
        });

        Ok(CycleMetrics {
            total_cycles: cycles.len(),
            completed_cycles: completed,
            success_rate: rate(completed, cycles.len()),
            fix_application_rate: if resolved_total > 0.0 {
                automated_total / resolved_total
            } else {
                0.0
            },
        })
    }
}

fn rate(part: usize, whole: usize) -> f64 {
    if whole == 0 {
        0.0
    } else {
        part as f64 / whole as f64
    }
}
