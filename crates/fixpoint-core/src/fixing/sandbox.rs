//! Sandboxed build and run validation
//!
//! The last gate before a write: the project is copied into an isolated
//! temp directory, the fix is applied there, and the copy is built and
//! probed under a restrictions preamble that denies network, subprocess,
//! and out-of-tree file access. Static checks upstream can be fooled;
//! this layer watches what the code actually does.

use std::io::Read;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use tempfile::TempDir;

use super::{FixError, FixProposal, Result};

// ============================================================================
// CONSTANTS
// ============================================================================

/// Total validation budget
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Interpreters tried for the build, in order; first that works wins
const PYTHON_INTERPRETERS: &[&str] = &["python3", "python"];

/// Output substrings that mark a run as security-relevant
const SUSPICIOUS_OUTPUT: &[&str] = &[
    "backdoor", "admin", "password", "eval(", "exec(", "os.system", "subprocess", "rm -rf",
    "delete",
];

/// Directories never copied into the sandbox
const EXCLUDED_DIRS: &[&str] = &[".git", "__pycache__", "node_modules", ".venv", "venv"];

/// Restrictions preamble dropped into every sandbox
const RESTRICTIONS_SCRIPT: &str = r#"
import os
import socket
import subprocess

# Deny network access
def _blocked_socket(*args, **kwargs):
    raise PermissionError("Network access blocked in sandbox")
socket.socket = _blocked_socket

# Deny subprocess execution outside the safe list
_original_run = subprocess.run
_SAFE_COMMANDS = ("python", "pytest", "pip", "coverage")

def _restricted_run(*args, **kwargs):
    cmd = args[0] if args else kwargs.get("cmd", "")
    name = cmd[0] if isinstance(cmd, list) and cmd else str(cmd).split()[0] if str(cmd) else ""
    name = os.path.basename(name)
    if name not in _SAFE_COMMANDS:
        raise PermissionError(f"Command '{name}' blocked in sandbox")
    return _original_run(*args, **kwargs)
subprocess.run = _restricted_run

# Deny file access outside the sandbox root
import builtins
_original_open = builtins.open

def _restricted_open(filename, *args, **kwargs):
    path = os.path.abspath(filename)
    root = os.path.abspath(os.getcwd())
    if not path.startswith(root):
        raise PermissionError(f"File access outside sandbox blocked: {filename}")
    return _original_open(filename, *args, **kwargs)
builtins.open = _restricted_open

print("sandbox restrictions active")
"#;

// ============================================================================
// RESULT
// ============================================================================

/// Detailed result of one sandbox run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SandboxResult {
    /// All phases passed with no violations
    pub success: bool,
    /// Syntax compilation of the tree succeeded
    pub build_passed: bool,
    /// Test files (if any) passed their checks
    pub tests_passed: bool,
    /// Runtime probe ran clean
    pub runtime_safe: bool,
    /// Non-security problems encountered
    pub issues_found: Vec<String>,
    /// Security-relevant observations
    pub security_violations: Vec<String>,
    /// Wall-clock seconds the validation took
    pub execution_time: f64,
}

struct PhaseOutcome {
    passed: bool,
    issues: Vec<String>,
    violations: Vec<String>,
}

impl PhaseOutcome {
    fn pass() -> Self {
        Self {
            passed: true,
            issues: vec![],
            violations: vec![],
        }
    }

    fn fail(issue: String) -> Self {
        Self {
            passed: false,
            issues: vec![issue],
            violations: vec![],
        }
    }
}

// ============================================================================
// VALIDATOR
// ============================================================================

/// Isolated build/run validator
pub struct SandboxValidator {
    timeout: Duration,
}

impl Default for SandboxValidator {
    fn default() -> Self {
        Self::new()
    }
}

impl SandboxValidator {
    pub fn new() -> Self {
        Self {
            timeout: DEFAULT_TIMEOUT,
        }
    }

    pub fn with_timeout(timeout: Duration) -> Self {
        Self { timeout }
    }

    /// Each of the three phases gets a third of the budget
    fn phase_timeout(&self) -> Duration {
        self.timeout / 3
    }

    /// Validate a fix inside an isolated copy of the project
    ///
    /// `Ok((safe, reason, result))` reports the verdict; `Err` means the
    /// sandbox itself could not be set up, which callers must treat as a
    /// rejection, never as a pass.
    pub fn validate_fix(
        &self,
        project_root: &Path,
        proposal: &FixProposal,
        modified_content: &str,
    ) -> Result<(bool, String, SandboxResult)> {
        let started = Instant::now();

        let sandbox = TempDir::with_prefix("fixpoint_sandbox_")
            .map_err(|e| FixError::SandboxFailure(format!("cannot create sandbox: {e}")))?;
        tracing::info!(sandbox = %sandbox.path().display(), "sandbox created");

        if let Err(e) = copy_project_safely(project_root, sandbox.path()) {
            return Err(FixError::SandboxFailure(format!("cannot copy project: {e}")));
        }

        std::fs::write(sandbox.path().join("sandbox_restrictions.py"), RESTRICTIONS_SCRIPT)
            .map_err(|e| FixError::SandboxFailure(format!("cannot write preamble: {e}")))?;

        // Apply the fix inside the copy only
        let target = sandbox.path().join(&proposal.file_path);
        if let Some(parent) = target.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| FixError::SandboxFailure(format!("cannot prepare target dir: {e}")))?;
        }
        std::fs::write(&target, modified_content)
            .map_err(|e| FixError::SandboxFailure(format!("cannot apply fix in sandbox: {e}")))?;

        let build = self.validate_build(sandbox.path());
        let tests = self.validate_tests(sandbox.path());
        let runtime = self.validate_runtime(sandbox.path(), proposal);

        let mut issues = Vec::new();
        let mut violations = Vec::new();
        for phase in [&build, &tests, &runtime] {
            issues.extend(phase.issues.iter().cloned());
            violations.extend(phase.violations.iter().cloned());
        }

        let result = SandboxResult {
            success: build.passed && tests.passed && runtime.passed,
            build_passed: build.passed,
            tests_passed: tests.passed,
            runtime_safe: runtime.passed,
            issues_found: issues,
            security_violations: violations,
            execution_time: started.elapsed().as_secs_f64(),
        };

        // The temp directory is removed on drop, on every exit path
        drop(sandbox);

        if result.success {
            Ok((true, "passed sandbox validation".to_string(), result))
        } else {
            let mut reason = format!(
                "sandbox validation failed: {}",
                result.issues_found.iter().take(3).cloned().collect::<Vec<_>>().join("; ")
            );
            if !result.security_violations.is_empty() {
                reason.push_str(&format!(
                    " | security: {}",
                    result.security_violations.iter().take(3).cloned().collect::<Vec<_>>().join("; ")
                ));
            }
            Ok((false, reason, result))
        }
    }

    // ========================================================================
    // PHASES
    // ========================================================================

    /// Best-effort syntax compile of every Python file in the sandbox
    fn validate_build(&self, sandbox: &Path) -> PhaseOutcome {
        let py_files: Vec<PathBuf> = collect_files(sandbox, |name| name.ends_with(".py"));
        if py_files.is_empty() {
            return PhaseOutcome::pass();
        }

        for interpreter in PYTHON_INTERPRETERS {
            let mut cmd = Command::new(interpreter);
            cmd.arg("-m").arg("py_compile").args(&py_files).current_dir(sandbox);

            match run_with_timeout(cmd, self.phase_timeout()) {
                RunOutcome::Completed { success: true, .. } => return PhaseOutcome::pass(),
                RunOutcome::Completed { success: false, stderr, .. } => {
                    return PhaseOutcome::fail(format!("build failed: {}", first_line(&stderr)));
                }
                RunOutcome::TimedOut => return PhaseOutcome::fail("build timeout".to_string()),
                RunOutcome::SpawnFailed => continue,
            }
        }

        PhaseOutcome::fail("all build commands failed".to_string())
    }

    /// Syntax-check discovered test files (full execution stays off)
    fn validate_tests(&self, sandbox: &Path) -> PhaseOutcome {
        let test_files: Vec<PathBuf> = collect_files(sandbox, |name| {
            (name.starts_with("test_") || name.ends_with("_test.py")) && name.ends_with(".py")
        });
        if test_files.is_empty() {
            return PhaseOutcome::pass();
        }

        for test_file in test_files.iter().take(5) {
            for interpreter in PYTHON_INTERPRETERS {
                let mut cmd = Command::new(interpreter);
                cmd.arg("-m").arg("py_compile").arg(test_file).current_dir(sandbox);

                match run_with_timeout(cmd, self.phase_timeout()) {
                    RunOutcome::Completed { success: true, .. } => break,
                    RunOutcome::Completed { success: false, .. } => {
                        return PhaseOutcome::fail(format!(
                            "test file syntax error: {}",
                            test_file.display()
                        ));
                    }
                    RunOutcome::TimedOut => {
                        return PhaseOutcome::fail("test validation timeout".to_string());
                    }
                    RunOutcome::SpawnFailed => continue,
                }
            }
        }

        PhaseOutcome::pass()
    }

    /// Execute a generated probe that loads the modified file under the
    /// restrictions preamble and reports what it observes
    fn validate_runtime(&self, sandbox: &Path, proposal: &FixProposal) -> PhaseOutcome {
        let probe_path = sandbox.join("runtime_probe.py");
        let probe = runtime_probe_script(&proposal.file_path);
        if let Err(e) = std::fs::write(&probe_path, probe) {
            return PhaseOutcome::fail(format!("cannot write runtime probe: {e}"));
        }

        for interpreter in PYTHON_INTERPRETERS {
            let mut cmd = Command::new(interpreter);
            cmd.arg(&probe_path).current_dir(sandbox);

            match run_with_timeout(cmd, self.phase_timeout()) {
                RunOutcome::Completed { success, stdout, stderr } => {
                    let output = format!("{stdout}\n{stderr}");
                    let violations = scan_output_for_violations(&output);
                    let mut outcome = PhaseOutcome {
                        passed: success && violations.is_empty(),
                        issues: vec![],
                        violations,
                    };
                    if !success {
                        outcome.issues.push(format!("runtime probe failed: {}", first_line(&stderr)));
                    }
                    return outcome;
                }
                RunOutcome::TimedOut => {
                    return PhaseOutcome {
                        passed: false,
                        issues: vec!["runtime probe timeout".to_string()],
                        violations: vec!["runtime timeout, possible infinite loop".to_string()],
                    };
                }
                RunOutcome::SpawnFailed => continue,
            }
        }

        PhaseOutcome::fail("no interpreter available for runtime probe".to_string())
    }
}

// ============================================================================
// HELPERS
// ============================================================================

/// Copy a project tree, leaving out VCS metadata, caches, virtualenvs,
/// hidden files, and anything matching the sensitive-file list
pub(crate) fn copy_project_safely(source: &Path, destination: &Path) -> std::io::Result<()> {
    for entry in walkdir::WalkDir::new(source).into_iter().filter_entry(|entry| {
        let name = entry.file_name().to_string_lossy();
        if entry.file_type().is_dir() {
            !EXCLUDED_DIRS.contains(&name.as_ref())
        } else {
            !is_sensitive_file(&name) && !is_hidden_file(&name)
        }
    }) {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                tracing::warn!(error = %e, "sandbox copy walk error");
                continue;
            }
        };
        let relative = entry
            .path()
            .strip_prefix(source)
            .expect("walk stays under source");
        if relative.as_os_str().is_empty() {
            continue;
        }
        let dest = destination.join(relative);
        if entry.file_type().is_dir() {
            std::fs::create_dir_all(&dest)?;
        } else if entry.file_type().is_file() {
            if let Some(parent) = dest.parent() {
                std::fs::create_dir_all(parent)?;
            }
            std::fs::copy(entry.path(), &dest)?;
        }
    }
    Ok(())
}

fn is_sensitive_file(name: &str) -> bool {
    name == ".env"
        || name.starts_with("secrets.")
        || name.starts_with("credentials.")
        || name.ends_with(".key")
        || name.ends_with(".pem")
        || name.ends_with(".pyc")
}

fn is_hidden_file(name: &str) -> bool {
    name.starts_with('.') && name != ".gitignore"
}

fn collect_files(root: &Path, predicate: impl Fn(&str) -> bool) -> Vec<PathBuf> {
    walkdir::WalkDir::new(root)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
        .filter(|e| {
            e.file_name()
                .to_str()
                .map(|name| predicate(name))
                .unwrap_or(false)
        })
        .map(|e| e.path().to_path_buf())
        .collect()
}

/// Substring scan of captured output against the suspicious-token list
///
/// Deliberately plain substring matching: a false alarm here costs one
/// rejected fix, a miss costs an applied backdoor.
pub(crate) fn scan_output_for_violations(output: &str) -> Vec<String> {
    let lower = output.to_lowercase();
    let mut violations: Vec<String> = SUSPICIOUS_OUTPUT
        .iter()
        .filter(|token| lower.contains(*token))
        .map(|token| format!("suspicious pattern in output: {token}"))
        .collect();

    if output.contains("Network access blocked") {
        violations.push("attempted network access".to_string());
    }
    if output.contains("Command") && output.contains("blocked") {
        violations.push("attempted system command execution".to_string());
    }

    violations
}

/// Python source of the runtime probe for one target file
fn runtime_probe_script(file_path: &str) -> String {
    format!(
        r#"
import os
import sys
import tempfile

try:
    exec(compile(open("sandbox_restrictions.py").read(), "sandbox_restrictions.py", "exec"))
except OSError:
    pass

target = {file_path:?}
temp_before = set(os.listdir(tempfile.gettempdir()))

try:
    if os.path.exists(target):
        with open(target) as handle:
            code = handle.read()
        compile(code, target, "exec")
        print("probe: compilation ok")

        for marker in ("os.system", "subprocess", "eval(", "exec("):
            if marker in code:
                print(f"probe warning: {{marker}} present in modified code")
except SyntaxError as error:
    print(f"probe: compilation failed: {{error}}")
    sys.exit(1)

temp_after = set(os.listdir(tempfile.gettempdir()))
created = temp_after - temp_before
if created:
    print(f"probe warning: new temp files created: {{sorted(created)}}")

print("probe: runtime check complete")
"#
    )
}

fn first_line(text: &str) -> &str {
    text.lines().next().unwrap_or("")
}

// ============================================================================
// PROCESS CONTROL
// ============================================================================

enum RunOutcome {
    Completed {
        success: bool,
        stdout: String,
        stderr: String,
    },
    TimedOut,
    SpawnFailed,
}

/// Run a command with a hard deadline; the child is killed on timeout
fn run_with_timeout(mut cmd: Command, timeout: Duration) -> RunOutcome {
    cmd.stdin(Stdio::null()).stdout(Stdio::piped()).stderr(Stdio::piped());

    let mut child = match cmd.spawn() {
        Ok(child) => child,
        Err(_) => return RunOutcome::SpawnFailed,
    };

    // Drain pipes on threads so a chatty child cannot deadlock the poll loop
    let stdout_handle = child.stdout.take();
    let stderr_handle = child.stderr.take();
    let stdout_thread = std::thread::spawn(move || read_all(stdout_handle));
    let stderr_thread = std::thread::spawn(move || read_all(stderr_handle));

    let deadline = Instant::now() + timeout;
    let status = loop {
        match child.try_wait() {
            Ok(Some(status)) => break Some(status),
            Ok(None) => {
                if Instant::now() >= deadline {
                    let _ = child.kill();
                    let _ = child.wait();
                    break None;
                }
                std::thread::sleep(Duration::from_millis(25));
            }
            Err(_) => break None,
        }
    };

    let stdout = stdout_thread.join().unwrap_or_default();
    let stderr = stderr_thread.join().unwrap_or_default();

    match status {
        Some(status) => RunOutcome::Completed {
            success: status.success(),
            stdout,
            stderr,
        },
        None => RunOutcome::TimedOut,
    }
}

fn read_all(handle: Option<impl Read>) -> String {
    let mut buffer = String::new();
    if let Some(mut handle) = handle {
        let _ = handle.read_to_string(&mut buffer);
    }
    buffer
}
