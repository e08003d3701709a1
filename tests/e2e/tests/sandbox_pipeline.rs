//! Safety-escape path: emergency validator and sandbox
//!
//! A malicious "calculator fix" must die at the emergency validator; if
//! that layer were bypassed, the sandbox runtime probe catches it. Both
//! rejections leave the tree untouched and append to their block logs.

use std::process::{Command, Stdio};

use fixpoint_core::analysis::Severity;
use fixpoint_core::fixing::applier::ApplierConfig;
use fixpoint_core::fixing::emergency::EMERGENCY_LOG_FILE;
use fixpoint_core::fixing::{validate_fix_application, FixApplier, FixError, SandboxValidator};
use fixpoint_e2e::{proposal, TestProject};

const CALCULATOR: &str = "def add(a, b):\n    return a + b\n\ndef divide(x, y):\n    return x / y\n";

fn python_available() -> bool {
    ["python3", "python"].iter().any(|interp| {
        Command::new(interp)
            .arg("--version")
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .is_ok()
    })
}

#[test]
fn emergency_validator_blocks_injected_shell_command() {
    let project = TestProject::new();
    project.file("calculator.py", CALCULATOR);

    let mut malicious = proposal("calculator.py", "whitespace_cleanup", Severity::Cosmetic);
    malicious.line_number = 2;
    malicious.original_code = "    return a + b".to_string();
    malicious.proposed_fix = "    os.system('rm -rf /')\n    return a + b".to_string();

    let applier = FixApplier::with_config(project.root(), ApplierConfig { run_sandbox: false });
    let err = applier.apply(&malicious).unwrap_err();
    assert!(matches!(err, FixError::EmergencyBlock { .. }));

    // File content unchanged
    assert_eq!(project.read("calculator.py"), CALCULATOR);

    // The block is on the record
    let log = project.read(EMERGENCY_LOG_FILE);
    assert_eq!(log.lines().count(), 1);
    let entry: serde_json::Value = serde_json::from_str(log.lines().next().unwrap()).unwrap();
    assert_eq!(entry["action"], "EMERGENCY_APPLICATION_BLOCK");
    assert!(entry["reason"].as_str().unwrap().contains("os.system"));
}

#[test]
fn emergency_verdict_is_content_based_not_diff_based() {
    let project = TestProject::new();
    project.file("calculator.py", CALCULATOR);

    let clean = proposal("calculator.py", "whitespace_cleanup", Severity::Cosmetic);

    // The full post-image is inspected, so danger smuggled anywhere in
    // the file is caught even if the diff looks boring
    let pre = CALCULATOR.to_string();
    let post = format!("{CALCULATOR}\nimport subprocess\nsubprocess.run(['curl', 'evil'])\n");
    let (safe, reason) = validate_fix_application(&clean, &pre, &post);
    assert!(!safe);
    assert!(reason.contains("subprocess"));
}

#[test]
fn sandbox_catches_what_emergency_would_miss() {
    if !python_available() {
        return;
    }
    let project = TestProject::new();
    project.file("calculator.py", CALCULATOR);

    let mut malicious = proposal("calculator.py", "whitespace_cleanup", Severity::Cosmetic);
    malicious.proposed_fix = "os.system('rm -rf /')".to_string();

    // Feed the sandbox directly, as if the emergency layer had been
    // bypassed by a crafted diff
    let modified = format!("import os\n{CALCULATOR}os.system('rm -rf /')\n");
    let validator = SandboxValidator::new();
    let (safe, reason, result) = validator
        .validate_fix(project.root(), &malicious, &modified)
        .unwrap();

    assert!(!safe, "runtime probe must flag the shell call: {reason}");
    assert!(!result.security_violations.is_empty());

    // The real tree never saw the malicious content
    assert_eq!(project.read("calculator.py"), CALCULATOR);
}

#[test]
fn full_pipeline_blocks_and_logs_sandbox_rejections() {
    if !python_available() {
        return;
    }
    let project = TestProject::new();
    project.file("calculator.py", CALCULATOR);

    // Syntactically broken fix: passes the emergency token check, dies
    // in the sandbox build phase
    let mut broken = proposal("calculator.py", "whitespace_cleanup", Severity::Cosmetic);
    broken.line_number = 1;
    broken.original_code = "def add(a, b):".to_string();
    broken.proposed_fix = "def add(a, b:".to_string();

    let applier = FixApplier::new(project.root());
    let err = applier.apply(&broken).unwrap_err();
    assert!(matches!(err, FixError::SandboxBlock { .. }));

    assert_eq!(project.read("calculator.py"), CALCULATOR);

    let log = project.read("sandbox_application_blocks.log");
    assert_eq!(log.lines().count(), 1);
    let entry: serde_json::Value = serde_json::from_str(log.lines().next().unwrap()).unwrap();
    assert_eq!(entry["action"], "SANDBOX_APPLICATION_BLOCK");
    assert_eq!(entry["build_passed"], false);
}

#[test]
fn clean_fix_passes_the_whole_gauntlet() {
    if !python_available() {
        return;
    }
    let project = TestProject::new();
    project.file("calculator.py", CALCULATOR);

    let mut clean = proposal("calculator.py", "whitespace_cleanup", Severity::Cosmetic);
    clean.line_number = 2;
    clean.original_code = "    return a + b".to_string();
    clean.proposed_fix = "    return a + b  # sum".to_string();

    let applier = FixApplier::new(project.root());
    applier.apply(&clean).unwrap();

    assert!(project.read("calculator.py").contains("# sum"));
    assert!(project.exists("calculator.py.bak"));
    assert!(!project.exists(EMERGENCY_LOG_FILE));
    assert!(!project.exists("sandbox_application_blocks.log"));
}
