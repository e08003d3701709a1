//! Applier backup and rollback behavior
//!
//! Every applied fix leaves a `.bak` sibling equal to the pre-image;
//! failed sequences restore the tree byte-for-byte from the project
//! backup, file by file.

use fixpoint_core::analysis::Severity;
use fixpoint_core::fixing::applier::ApplierConfig;
use fixpoint_core::fixing::{FixApplier, FixError};
use fixpoint_e2e::{proposal, TestProject};
use tempfile::TempDir;

fn applier(project: &TestProject) -> FixApplier {
    // Sandbox validation is exercised in its own target; these tests
    // focus on the write path
    FixApplier::with_config(project.root(), ApplierConfig { run_sandbox: false })
}

#[test]
fn applied_fix_leaves_bak_with_pre_image() {
    let project = TestProject::new();
    project.file("app.py", "line one\nline two\nline three\n");

    let mut p = proposal("app.py", "whitespace_cleanup", Severity::Cosmetic);
    p.line_number = 2;
    p.original_code = "line two".to_string();
    p.proposed_fix = "line 2".to_string();

    applier(&project).apply(&p).unwrap();

    assert_eq!(project.read("app.py"), "line one\nline 2\nline three\n");
    // Invariant 4: the .bak sibling holds the exact pre-image
    assert_eq!(project.read("app.py.bak"), "line one\nline two\nline three\n");
}

#[test]
fn line_number_boundaries() {
    let project = TestProject::new();
    project.file("app.py", "alpha\nbeta\n");
    let applier = applier(&project);

    // line_number == len(lines): valid
    let mut valid = proposal("app.py", "whitespace_cleanup", Severity::Cosmetic);
    valid.line_number = 2;
    valid.original_code = "beta".to_string();
    valid.proposed_fix = "BETA".to_string();
    applier.apply(&valid).unwrap();

    // line_number == len(lines) + 1: out of bounds
    let mut invalid = proposal("app.py", "whitespace_cleanup", Severity::Cosmetic);
    invalid.line_number = 3;
    let err = applier.apply(&invalid).unwrap_err();
    assert!(matches!(err, FixError::LineOutOfBounds { .. }));
}

#[test]
fn stale_original_is_rejected_without_side_effects() {
    let project = TestProject::new();
    project.file("app.py", "current content\n");
    let before = project.snapshot();

    let mut p = proposal("app.py", "whitespace_cleanup", Severity::Cosmetic);
    p.original_code = "content that was edited away".to_string();

    let err = applier(&project).apply(&p).unwrap_err();
    assert!(matches!(err, FixError::OriginalNotFound { .. }));
    assert_eq!(project.snapshot(), before, "no partial writes, no backup");
}

#[test]
fn empty_proposal_set_is_a_filesystem_noop() {
    let project = TestProject::new();
    project.file("a.py", "one\n").file("b.py", "two\n");
    let before = project.snapshot();

    let results = applier(&project).apply_batch(&[]);
    assert!(results.is_empty());
    assert_eq!(project.snapshot(), before);
}

#[test]
fn failed_multi_step_sequence_restores_byte_for_byte() {
    let project = TestProject::new();
    project.file("pkg/module.py", "def handler():\n    return 1\n");
    project.file("pkg/util.py", "VALUE = 10\n");
    project.file("main.py", "import pkg\n");
    let pristine = project.snapshot();

    let applier = applier(&project);
    let backups = TempDir::new().unwrap();
    applier.create_project_backup(backups.path()).unwrap();

    // Step one applies cleanly
    let mut first = proposal("pkg/util.py", "whitespace_cleanup", Severity::Cosmetic);
    first.original_code = "VALUE = 10".to_string();
    first.proposed_fix = "VALUE = 20".to_string();
    applier.apply(&first).unwrap();
    assert_eq!(project.read("pkg/util.py"), "VALUE = 20\n");

    // Step two is blocked by the emergency validator
    let mut second = proposal("pkg/module.py", "whitespace_cleanup", Severity::Cosmetic);
    second.original_code = "    return 1".to_string();
    second.proposed_fix = "    os.system('rm -rf /')".to_string();
    second.line_number = 2;
    let err = applier.apply(&second).unwrap_err();
    assert!(err.is_safety_rejection());

    // The sequence failed: roll everything back from the retained backup
    let restored = applier.restore_project_backup(backups.path()).unwrap();
    assert_eq!(restored, 3);

    // Post-state equals pre-state byte-for-byte for all backed-up files
    let after = project.snapshot();
    for (path, content) in &pristine {
        assert_eq!(
            after.get(path),
            Some(content),
            "file {} differs after restore",
            path.display()
        );
    }

    // The backup itself is retained for forensics
    assert!(backups.path().join("project_backup").is_dir());
}

#[test]
fn backup_never_nests_inside_the_project() {
    let project = TestProject::new();
    project.file("main.py", "x = 1\n");

    let applier = applier(&project);
    let inside = project.root().join("nested_backups");
    let err = applier.create_project_backup(&inside).unwrap_err();
    assert!(matches!(err, FixError::Backup(_)));
    assert!(!inside.join("project_backup").exists());
}

#[test]
fn write_failure_restores_from_bak() {
    let project = TestProject::new();
    project.file("app.py", "original line\n");

    // Applying twice with the second proposal stale shows the restore
    // path never corrupts the file
    let applier = applier(&project);
    let mut p = proposal("app.py", "whitespace_cleanup", Severity::Cosmetic);
    p.original_code = "original line".to_string();
    p.proposed_fix = "updated line".to_string();
    applier.apply(&p).unwrap();

    let stale = p.clone();
    let err = applier.apply(&stale).unwrap_err();
    assert!(matches!(err, FixError::OriginalNotFound { .. }));
    assert_eq!(project.read("app.py"), "updated line\n");
}
