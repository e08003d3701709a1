//! Interactive approval
//!
//! Batched human-in-the-loop gate. Auto-approval is reserved for the
//! provably boring: cosmetic severity, a high deterministic score, and a
//! clean dangerous-pattern scan. Everything else is either shown to a
//! human or rejected outright - the default answer is no.

use crate::analysis::Severity;

use super::safety::{dangerous_patterns_in, score_proposal, SecurityAudit};
use super::FixProposal;

/// Conservative floor for auto-approval; user settings can only raise it
pub const AUTO_APPROVE_FLOOR: f64 = 0.9;

// ============================================================================
// MODES & DECISIONS
// ============================================================================

/// How a batch is processed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApprovalMode {
    /// Auto-approve the safe class, reject the rest
    AutoApproveSafe,
    /// Auto-approve the safe class, ask a human about the rest
    Interactive,
}

/// A reviewer's verdict on one proposal
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApprovalDecision {
    Approve,
    Reject,
    /// Deferred; treated as not approved for this run
    Skip,
}

/// Source of interactive decisions (a terminal prompt in the CLI, a
/// scripted reviewer in tests)
pub trait ApprovalPrompt {
    fn review(&mut self, proposal: &FixProposal, score: f64, diff: &str) -> ApprovalDecision;
}

// ============================================================================
// APPROVAL SYSTEM
// ============================================================================

/// Batched approval gate
pub struct InteractiveApproval {
    mode: ApprovalMode,
    auto_threshold: f64,
}

impl InteractiveApproval {
    pub fn new(mode: ApprovalMode) -> Self {
        Self {
            mode,
            auto_threshold: AUTO_APPROVE_FLOOR,
        }
    }

    /// Raise the auto-approval threshold; values below the floor are
    /// clamped up to it, never down
    pub fn with_threshold(mut self, threshold: f64) -> Self {
        self.auto_threshold = threshold.max(AUTO_APPROVE_FLOOR);
        self
    }

    pub fn auto_threshold(&self) -> f64 {
        self.auto_threshold
    }

    /// Partition a batch into (approved, rejected)
    ///
    /// Skipped proposals land in the rejected partition: a fix that was
    /// not explicitly approved does not get applied.
    pub fn process_batch(
        &self,
        proposals: Vec<FixProposal>,
        audit: Option<&SecurityAudit>,
        mut prompt: Option<&mut dyn ApprovalPrompt>,
    ) -> (Vec<FixProposal>, Vec<FixProposal>) {
        let mut approved = Vec::new();
        let mut rejected = Vec::new();

        for proposal in proposals {
            let score = score_proposal(&proposal, audit);

            if self.auto_approvable(&proposal, score) {
                tracing::info!(
                    file = %proposal.file_path,
                    issue_type = %proposal.issue_type,
                    score,
                    "auto-approved"
                );
                approved.push(proposal);
                continue;
            }

            if self.mode == ApprovalMode::Interactive {
                if let Some(prompt) = prompt.as_deref_mut() {
                    let diff = proposal.render_diff();
                    match prompt.review(&proposal, score, &diff) {
                        ApprovalDecision::Approve => {
                            approved.push(proposal);
                            continue;
                        }
                        ApprovalDecision::Reject | ApprovalDecision::Skip => {
                            rejected.push(proposal);
                            continue;
                        }
                    }
                }
            }

            // Fail closed: no reviewer, no approval
            tracing::debug!(
                file = %proposal.file_path,
                issue_type = %proposal.issue_type,
                score,
                "rejected by default"
            );
            rejected.push(proposal);
        }

        (approved, rejected)
    }

    fn auto_approvable(&self, proposal: &FixProposal, score: f64) -> bool {
        proposal.auto_approvable
            && score >= self.auto_threshold
            && matches!(proposal.severity, Severity::Low | Severity::Cosmetic)
            && dangerous_patterns_in(&proposal.proposed_fix).is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::FileContext;

    fn proposal(issue_type: &str, severity: Severity) -> FixProposal {
        FixProposal {
            file_path: "app.py".into(),
            issue_type: issue_type.into(),
            severity,
            description: "test".into(),
            original_code: "trailing-x".into(),
            proposed_fix: "trailing-y".into(),
            line_number: 1,
            educational_explanation: String::new(),
            safety_score: 100,
            context: FileContext::Unknown,
            auto_approvable: true,
        }
    }

    struct ScriptedReviewer(Vec<ApprovalDecision>);

    impl ApprovalPrompt for ScriptedReviewer {
        fn review(&mut self, _: &FixProposal, _: f64, _: &str) -> ApprovalDecision {
            self.0.remove(0)
        }
    }

    #[test]
    fn test_threshold_floor_is_enforced() {
        let gate = InteractiveApproval::new(ApprovalMode::AutoApproveSafe).with_threshold(0.5);
        assert_eq!(gate.auto_threshold(), AUTO_APPROVE_FLOOR);

        let raised = InteractiveApproval::new(ApprovalMode::AutoApproveSafe).with_threshold(0.95);
        assert_eq!(raised.auto_threshold(), 0.95);
    }

    #[test]
    fn test_fail_closed_without_reviewer() {
        let gate = InteractiveApproval::new(ApprovalMode::AutoApproveSafe);
        let (approved, rejected) =
            gate.process_batch(vec![proposal("whitespace_cleanup", Severity::Cosmetic)], None, None);

        // A clean cosmetic fix still scores well under 0.9: rejected
        assert!(approved.is_empty());
        assert_eq!(rejected.len(), 1);
    }

    #[test]
    fn test_risky_severity_never_auto_approved() {
        let gate = InteractiveApproval::new(ApprovalMode::AutoApproveSafe);
        let (approved, _) =
            gate.process_batch(vec![proposal("whitespace_cleanup", Severity::High)], None, None);
        assert!(approved.is_empty());
    }

    #[test]
    fn test_interactive_reviewer_decides() {
        let gate = InteractiveApproval::new(ApprovalMode::Interactive);
        let mut reviewer = ScriptedReviewer(vec![
            ApprovalDecision::Approve,
            ApprovalDecision::Reject,
            ApprovalDecision::Skip,
        ]);

        let batch = vec![
            proposal("whitespace_cleanup", Severity::Cosmetic),
            proposal("whitespace_cleanup", Severity::Cosmetic),
            proposal("whitespace_cleanup", Severity::Cosmetic),
        ];
        let (approved, rejected) = gate.process_batch(batch, None, Some(&mut reviewer));

        assert_eq!(approved.len(), 1);
        assert_eq!(rejected.len(), 2, "skip counts as not approved");
    }

    #[test]
    fn test_dangerous_proposal_rejected_even_in_interactive_auto_path() {
        let gate = InteractiveApproval::new(ApprovalMode::AutoApproveSafe);
        let mut p = proposal("whitespace_cleanup", Severity::Cosmetic);
        p.proposed_fix = "user.role = 'admin'".into();

        let (approved, rejected) = gate.process_batch(vec![p], None, None);
        assert!(approved.is_empty());
        assert_eq!(rejected.len(), 1);
    }
}
