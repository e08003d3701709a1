//! Fixing module - the defense-in-depth fix pipeline
//!
//! Issues become proposals, proposals run a gauntlet: deterministic
//! safety scoring, approval, the emergency pattern validator, sandboxed
//! build/run validation, and finally atomic application with rollback.
//! Every ambiguous branch on this path fails closed.

pub mod applier;
pub mod approval;
pub mod emergency;
pub mod generator;
pub mod integration;
pub mod safety;
pub mod sandbox;

pub use applier::FixApplier;
pub use approval::{ApprovalDecision, ApprovalMode, ApprovalPrompt, InteractiveApproval};
pub use emergency::{validate_fix_application, EmergencyLog};
pub use generator::generate_proposals;
pub use integration::{
    ExecutionStatus, ExecutionSummary, FileModification, IntegrationExecutor, IntegrationMap,
    IntegrationStep,
};
pub use safety::{calculate_safety_score, dangerous_patterns_in, SecurityAudit};
pub use sandbox::{SandboxResult, SandboxValidator};

use serde::{Deserialize, Serialize};

use crate::analysis::{FileContext, Severity};

// ============================================================================
// ERROR TYPES
// ============================================================================

/// Fix pipeline error type
///
/// Safety rejections are errors here so a blocked fix can never be
/// mistaken for an applied one; the batch driver logs them and moves on.
#[non_exhaustive]
#[derive(Debug, thiserror::Error)]
pub enum FixError {
    /// Target file missing
    #[error("File not found: {0}")]
    FileNotFound(String),
    /// Proposal line number beyond the end of the file
    #[error("Line {line} out of bounds for {file} ({len} lines)")]
    LineOutOfBounds { file: String, line: u32, len: usize },
    /// Pre-image no longer matches the proposal
    #[error("Original code not found at {file}:{line}")]
    OriginalNotFound { file: String, line: u32 },
    /// Blocked by the emergency pattern validator
    #[error("Emergency block: {reason}")]
    EmergencyBlock { reason: String },
    /// Blocked by sandbox validation
    #[error("Sandbox block: {reason}")]
    SandboxBlock { reason: String },
    /// Sandbox infrastructure failed; treated as a rejection
    #[error("Sandbox failure: {0}")]
    SandboxFailure(String),
    /// Backup refused or failed
    #[error("Backup error: {0}")]
    Backup(String),
    /// Restoring a backup failed; the tree may be inconsistent
    #[error("Rollback failed: {0}")]
    RollbackFailed(String),
    /// IO error
    #[error("IO error for {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

impl FixError {
    pub(crate) fn io(path: impl Into<String>, source: std::io::Error) -> Self {
        FixError::Io {
            path: path.into(),
            source,
        }
    }

    /// Whether this error means the safety pipeline rejected the fix
    /// (as opposed to an infrastructure fault)
    pub fn is_safety_rejection(&self) -> bool {
        matches!(
            self,
            FixError::EmergencyBlock { .. }
                | FixError::SandboxBlock { .. }
                | FixError::SandboxFailure(_)
        )
    }
}

/// Fix pipeline result type
pub type Result<T> = std::result::Result<T, FixError>;

// ============================================================================
// FIX PROPOSAL
// ============================================================================

/// A candidate edit
///
/// `original_code` must appear textually on `line_number` of the current
/// file; the applier re-verifies this immediately before writing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FixProposal {
    /// File to edit, relative to the project root
    pub file_path: String,
    /// Issue type this fix addresses
    pub issue_type: String,
    /// Severity inherited from the issue
    pub severity: Severity,
    /// Human-readable description
    pub description: String,
    /// Exact slice to replace
    pub original_code: String,
    /// Replacement text
    pub proposed_fix: String,
    /// 1-based line carrying `original_code`
    pub line_number: u32,
    /// Teaching notes shown at approval time
    pub educational_explanation: String,
    /// Upstream safety estimate on a 0-100 scale
    pub safety_score: u32,
    /// File context classification
    #[serde(default)]
    pub context: FileContext,
    /// Whether the proposal may be auto-approved (re-evaluated by scoring)
    #[serde(default)]
    pub auto_approvable: bool,
}

impl FixProposal {
    /// Unified diff of the proposed change, for display
    pub fn render_diff(&self) -> String {
        use similar::TextDiff;
        let diff = TextDiff::from_lines(&self.original_code, &self.proposed_fix);
        let mut rendered = String::new();
        for change in diff.iter_all_changes() {
            let sign = match change.tag() {
                similar::ChangeTag::Delete => "-",
                similar::ChangeTag::Insert => "+",
                similar::ChangeTag::Equal => " ",
            };
            rendered.push_str(sign);
            rendered.push_str(change.value());
            if !change.value().ends_with('\n') {
                rendered.push('\n');
            }
        }
        rendered
    }
}
