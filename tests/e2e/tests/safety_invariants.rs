//! Safety pipeline invariants
//!
//! The properties every proposal must satisfy before the applier will
//! touch a file: zero-scored proposals are never applied, high/critical
//! severity always scores zero, and dangerous patterns score zero with
//! an audit record.

use fixpoint_core::analysis::{FileContext, Severity};
use fixpoint_core::fixing::safety::{
    calculate_safety_score, dangerous_patterns_in, score_proposal, SecurityAudit,
    DANGEROUS_PATTERNS,
};
use fixpoint_core::fixing::{ApprovalMode, InteractiveApproval};
use fixpoint_e2e::{proposal, TestProject};

#[test]
fn high_and_critical_proposals_always_score_zero() {
    for severity in [Severity::High, Severity::Critical] {
        for issue_type in ["whitespace_cleanup", "typo_corrections", "maintenance"] {
            let p = proposal("app.py", issue_type, severity);
            assert_eq!(
                calculate_safety_score(&p),
                0.0,
                "severity {severity} with type {issue_type}"
            );
        }
    }
}

#[test]
fn every_dangerous_pattern_token_forces_zero() {
    for token in DANGEROUS_PATTERNS {
        let mut p = proposal("app.py", "whitespace_cleanup", Severity::Cosmetic);
        p.proposed_fix = format!("safe prefix {token} safe suffix");
        assert_eq!(calculate_safety_score(&p), 0.0, "token {token:?}");
    }
}

#[test]
fn gray_hat_refusal_scores_zero_and_audits() {
    let project = TestProject::new();
    let audit = SecurityAudit::in_dir(project.root());

    // A "security fix" that actually grants admin: refused on two
    // independent grounds (risky category, dangerous tokens)
    let mut p = proposal("auth.py", "security", Severity::Medium);
    p.proposed_fix = "user.role = 'admin'".to_string();

    assert_eq!(score_proposal(&p, Some(&audit)), 0.0);

    // Risky category short-circuits before the pattern scan; run the
    // scan path too by downgrading the type
    let mut cosmetic = p.clone();
    cosmetic.issue_type = "typo_corrections".to_string();
    cosmetic.severity = Severity::Cosmetic;
    assert_eq!(score_proposal(&cosmetic, Some(&audit)), 0.0);

    let log = project.read("security_audit.log");
    assert!(log.contains("dangerous patterns detected:"));
    assert!(log.contains("user.role ="));
    assert!(log.contains("admin"));
}

#[test]
fn zero_scored_proposals_never_pass_approval() {
    let project = TestProject::new();
    project.file("app.py", "original content\n");
    let audit = SecurityAudit::in_dir(project.root());

    let mut dangerous = proposal("app.py", "whitespace_cleanup", Severity::Cosmetic);
    dangerous.original_code = "original content".to_string();
    dangerous.proposed_fix = "subprocess.call(['curl', 'evil'])".to_string();

    let gate = InteractiveApproval::new(ApprovalMode::AutoApproveSafe);
    let (approved, rejected) = gate.process_batch(vec![dangerous], Some(&audit), None);

    assert!(approved.is_empty(), "invariant 1: zero score is never applied");
    assert_eq!(rejected.len(), 1);
    // The file was never touched because the applier was never invoked
    assert_eq!(project.read("app.py"), "original content\n");
}

#[test]
fn risky_issue_categories_are_disqualified() {
    for issue_type in [
        "security",
        "exception_handling",
        "missing_imports",
        "cpp_missing_include",
        "bare_except",
        "sql_injection",
    ] {
        let p = proposal("app.py", issue_type, Severity::Low);
        assert_eq!(calculate_safety_score(&p), 0.0, "type {issue_type}");
    }
}

#[test]
fn conservative_floor_cannot_be_lowered() {
    let lenient = InteractiveApproval::new(ApprovalMode::AutoApproveSafe).with_threshold(0.1);
    assert!(lenient.auto_threshold() >= 0.9);
}

#[test]
fn dangerous_pattern_scan_reports_all_hits() {
    let found = dangerous_patterns_in("user.role = 'admin' if auth else root");
    for expected in ["user.role =", ".role =", "admin", "auth", "root", "if "] {
        assert!(found.contains(&expected), "missing {expected:?} in {found:?}");
    }
}

#[test]
fn scores_are_deterministic() {
    let p = proposal("app.py", "whitespace_cleanup", Severity::Cosmetic);
    let first = calculate_safety_score(&p);
    for _ in 0..10 {
        assert_eq!(calculate_safety_score(&p), first);
    }
}

#[test]
fn context_and_severity_penalties_stack_conservatively() {
    let mut p = proposal("config/settings.py", "whitespace_cleanup", Severity::Medium);
    p.context = FileContext::Config;
    p.original_code = "spacing-a".to_string();
    p.proposed_fix = "spacing-b".to_string();

    // 0.1 base + 0.4 ultra-safe - 0.3 config - 0.2 medium = 0.0
    assert_eq!(calculate_safety_score(&p), 0.0);
}
