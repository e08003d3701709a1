//! Integration-map execution contract
//!
//! An upstream planner (outside this crate) produces multi-step plans of
//! file modifications. They enter the safety pipeline here and flow
//! through the same emergency/sandbox/applier path as single fixes, with
//! one addition: a full project backup is taken before the first step,
//! and any failed step rolls the whole map back file by file.

use std::path::{Path, PathBuf};
use std::time::Instant;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::analysis::{FileContext, Severity};

use super::applier::{ApplierConfig, FixApplier};
use super::{FixError, FixProposal, Result};

// ============================================================================
// CONTRACT TYPES
// ============================================================================

/// Kinds of modification a planner may request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModificationKind {
    /// Replace `original` with `replacement` on `line`
    Replace,
    /// Insert `replacement` as a new line after the last import/include
    AddImport,
    /// Prepend `replacement` as a comment above `line`
    AddComment,
}

/// One concrete edit inside an integration step
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileModification {
    /// Target file, relative to the project root
    pub target_file: String,
    /// What kind of edit this is
    pub kind: ModificationKind,
    /// Exact slice to replace (empty for insertions)
    #[serde(default)]
    pub original: String,
    /// Replacement or inserted text
    pub replacement: String,
    /// 1-based anchor line
    pub line: u32,
    /// Issue type the step addresses, for policy decisions downstream
    #[serde(default = "default_issue_type")]
    pub issue_type: String,
}

fn default_issue_type() -> String {
    "integration_step".to_string()
}

/// One step of an integration map
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IntegrationStep {
    /// Human-readable description
    pub description: String,
    /// Edits applied by this step
    pub modifications: Vec<FileModification>,
}

/// A full multi-step plan
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IntegrationMap {
    /// Plan identifier assigned by the planner
    pub map_id: String,
    /// Steps in execution order
    pub steps: Vec<IntegrationStep>,
}

// ============================================================================
// EXECUTION
// ============================================================================

/// How a run ended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionStatus {
    /// Every step applied
    Completed,
    /// A step was rejected; the tree was rolled back
    RolledBack,
    /// A step was rejected and the rollback also failed
    RollbackFailed,
}

/// Record of one executed (or attempted) step
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepOutcome {
    pub description: String,
    pub modifications_applied: usize,
    pub succeeded: bool,
    pub failure: Option<String>,
    pub execution_time_seconds: f64,
}

/// Summary of an integration-map run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionSummary {
    pub map_id: String,
    pub status: ExecutionStatus,
    pub steps: Vec<StepOutcome>,
    /// Where the pre-execution backup lives; retained on every outcome
    pub backup_dir: PathBuf,
    pub total_time_seconds: f64,
}

/// Ephemeral per-run state
///
/// Lives for one map execution; the temp directory is removed at the
/// end, the backup directory is always retained.
struct ExecutionContext {
    backup_dir: PathBuf,
    temp_dir: PathBuf,
    log: Vec<StepOutcome>,
}

impl ExecutionContext {
    fn new() -> std::io::Result<Self> {
        let run_id = Uuid::new_v4();
        let backup_dir = std::env::temp_dir().join(format!("fixpoint_map_backup_{run_id}"));
        let temp_dir = std::env::temp_dir().join(format!("fixpoint_map_work_{run_id}"));
        std::fs::create_dir_all(&backup_dir)?;
        std::fs::create_dir_all(&temp_dir)?;
        Ok(Self {
            backup_dir,
            temp_dir,
            log: Vec::new(),
        })
    }

    fn cleanup(&self) {
        // Backup stays for forensics; only the scratch space goes
        if let Err(e) = std::fs::remove_dir_all(&self.temp_dir) {
            tracing::warn!(dir = %self.temp_dir.display(), error = %e, "temp dir cleanup failed");
        }
    }
}

/// Executes integration maps through the fix pipeline
pub struct IntegrationExecutor {
    project_root: PathBuf,
    applier_config: ApplierConfig,
}

impl IntegrationExecutor {
    pub fn new(project_root: impl Into<PathBuf>) -> Self {
        Self {
            project_root: project_root.into(),
            applier_config: ApplierConfig::default(),
        }
    }

    pub fn with_applier_config(mut self, config: ApplierConfig) -> Self {
        self.applier_config = config;
        self
    }

    /// Run a map: backup, then steps in order, rolling back on the
    /// first rejection
    pub fn execute(&self, map: &IntegrationMap) -> Result<ExecutionSummary> {
        if map.steps.is_empty() {
            return Err(FixError::Backup("integration map has no steps".to_string()));
        }

        let started = Instant::now();
        let mut context = ExecutionContext::new()
            .map_err(|e| FixError::Backup(format!("cannot create execution context: {e}")))?;

        let applier = FixApplier::with_config(
            &self.project_root,
            ApplierConfig {
                run_sandbox: self.applier_config.run_sandbox,
            },
        );
        applier.create_project_backup(&context.backup_dir)?;

        let mut status = ExecutionStatus::Completed;

        for step in &map.steps {
            let step_started = Instant::now();
            let outcome = self.execute_step(&applier, step);
            let succeeded = outcome.is_ok();
            let applied = match &outcome {
                Ok(count) => *count,
                Err(_) => 0,
            };

            context.log.push(StepOutcome {
                description: step.description.clone(),
                modifications_applied: applied,
                succeeded,
                failure: outcome.as_ref().err().map(|e| e.to_string()),
                execution_time_seconds: step_started.elapsed().as_secs_f64(),
            });

            if let Err(step_error) = outcome {
                tracing::warn!(
                    step = %step.description,
                    error = %step_error,
                    "integration step rejected, rolling back"
                );
                status = match applier.restore_project_backup(&context.backup_dir) {
                    Ok(_) => ExecutionStatus::RolledBack,
                    Err(rollback_error) => {
                        context.cleanup();
                        return Err(rollback_error);
                    }
                };
                break;
            }
        }

        context.cleanup();

        Ok(ExecutionSummary {
            map_id: map.map_id.clone(),
            status,
            steps: context.log,
            backup_dir: context.backup_dir,
            total_time_seconds: started.elapsed().as_secs_f64(),
        })
    }

    /// Apply one step's modifications through the single-fix path
    fn execute_step(&self, applier: &FixApplier, step: &IntegrationStep) -> Result<usize> {
        let mut applied = 0usize;
        for modification in &step.modifications {
            let proposal = self.modification_to_proposal(modification)?;
            applier.apply(&proposal)?;
            applied += 1;
        }
        Ok(applied)
    }

    /// Lower a planner modification onto the FixProposal contract
    fn modification_to_proposal(&self, modification: &FileModification) -> Result<FixProposal> {
        let path = self.project_root.join(&modification.target_file);
        let content = std::fs::read_to_string(&path)
            .map_err(|_| FixError::FileNotFound(modification.target_file.clone()))?;
        let lines: Vec<&str> = content.split('\n').collect();

        let (original_code, proposed_fix, line_number) = match modification.kind {
            ModificationKind::Replace => (
                modification.original.clone(),
                modification.replacement.clone(),
                modification.line,
            ),
            ModificationKind::AddImport => {
                // Anchor on the last existing import/include line
                let anchor_line = lines
                    .iter()
                    .enumerate()
                    .filter(|(_, l)| {
                        let t = l.trim_start();
                        t.starts_with("import ")
                            || t.starts_with("from ")
                            || t.starts_with("#include")
                    })
                    .map(|(i, _)| i + 1)
                    .next_back()
                    .unwrap_or(1);
                let anchor = lines.get(anchor_line - 1).copied().unwrap_or_default();
                (
                    anchor.to_string(),
                    format!("{anchor}\n{}", modification.replacement),
                    anchor_line as u32,
                )
            }
            ModificationKind::AddComment => {
                let index = modification.line.max(1) as usize - 1;
                let anchor = lines
                    .get(index)
                    .copied()
                    .ok_or(FixError::LineOutOfBounds {
                        file: modification.target_file.clone(),
                        line: modification.line,
                        len: content.lines().count(),
                    })?;
                let indent: String = anchor.chars().take_while(|c| c.is_whitespace()).collect();
                (
                    anchor.to_string(),
                    format!("{indent}# {}\n{anchor}", modification.replacement.trim()),
                    modification.line,
                )
            }
        };

        Ok(FixProposal {
            file_path: modification.target_file.clone(),
            issue_type: modification.issue_type.clone(),
            severity: Severity::Low,
            description: format!("integration step edit in {}", modification.target_file),
            original_code,
            proposed_fix,
            line_number,
            educational_explanation: String::new(),
            safety_score: 50,
            context: FileContext::classify(Path::new(&modification.target_file)),
            auto_approvable: false,
        })
    }
}
