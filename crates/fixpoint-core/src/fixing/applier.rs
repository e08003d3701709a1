//! Atomic fix application
//!
//! The only component allowed to touch the project tree. Every write is
//! preceded by a `.bak` sibling of the pre-image and goes through a
//! temp-file-and-rename so a crash never leaves a half-written file. At
//! project scope, a full backup taken before the first fix is the ground
//! truth for rollback, and restoration is file-by-file copy - never a
//! rename of the project directory.

use std::path::{Path, PathBuf};

use chrono::Utc;
use serde_json::json;

use super::emergency::{validate_fix_application, EmergencyLog};
use super::safety::append_json_line;
use super::sandbox::SandboxValidator;
use super::{FixError, FixProposal, Result};

/// Default sandbox block log file name
pub const SANDBOX_LOG_FILE: &str = "sandbox_application_blocks.log";

/// Directories excluded from the full project backup
const BACKUP_EXCLUDED_DIRS: &[&str] = &["__pycache__", ".git", "venv", ".venv", "node_modules"];

// ============================================================================
// CONFIG
// ============================================================================

/// Applier configuration
pub struct ApplierConfig {
    /// Run the sandbox validator before every write
    ///
    /// Disable only when validation already happened out-of-band (the
    /// integration-map driver batches it); the emergency validator always
    /// runs regardless.
    pub run_sandbox: bool,
}

impl Default for ApplierConfig {
    fn default() -> Self {
        Self { run_sandbox: true }
    }
}

// ============================================================================
// APPLIER
// ============================================================================

/// Applies approved proposals to the tree, one at a time
pub struct FixApplier {
    project_root: PathBuf,
    emergency_log: EmergencyLog,
    sandbox_log_path: PathBuf,
    sandbox: SandboxValidator,
    config: ApplierConfig,
}

impl FixApplier {
    /// Applier with logs written into the project root
    pub fn new(project_root: impl Into<PathBuf>) -> Self {
        Self::with_config(project_root, ApplierConfig::default())
    }

    pub fn with_config(project_root: impl Into<PathBuf>, config: ApplierConfig) -> Self {
        let project_root = project_root.into();
        Self {
            emergency_log: EmergencyLog::in_dir(&project_root),
            sandbox_log_path: project_root.join(SANDBOX_LOG_FILE),
            sandbox: SandboxValidator::new(),
            project_root,
            config,
        }
    }

    pub fn project_root(&self) -> &Path {
        &self.project_root
    }

    pub fn emergency_log(&self) -> &EmergencyLog {
        &self.emergency_log
    }

    pub fn sandbox_log_path(&self) -> &Path {
        &self.sandbox_log_path
    }

    // ========================================================================
    // SINGLE FIX
    // ========================================================================

    /// Apply one proposal; any error leaves the file as it was
    pub fn apply(&self, proposal: &FixProposal) -> Result<()> {
        let path = self.resolve(&proposal.file_path);
        if !path.is_file() {
            return Err(FixError::FileNotFound(proposal.file_path.clone()));
        }

        let pre_image = std::fs::read_to_string(&path)
            .map_err(|e| FixError::io(path.display().to_string(), e))?;

        let post_image = self.compute_post_image(proposal, &pre_image)?;

        // Gate 1: emergency pattern validator on the full post-image
        let (safe, reason) = validate_fix_application(proposal, &pre_image, &post_image);
        if !safe {
            self.emergency_log.record_block(proposal, &reason);
            tracing::warn!(file = %proposal.file_path, reason, "emergency block");
            return Err(FixError::EmergencyBlock { reason });
        }

        // Gate 2: sandboxed build/run validation
        if self.config.run_sandbox {
            match self
                .sandbox
                .validate_fix(&self.project_root, proposal, &post_image)
            {
                Ok((true, _, _)) => {}
                Ok((false, reason, result)) => {
                    self.log_sandbox_block(proposal, &reason, Some(&result));
                    tracing::warn!(file = %proposal.file_path, reason, "sandbox block");
                    return Err(FixError::SandboxBlock { reason });
                }
                Err(e) => {
                    // Infrastructure failure is a rejection, not a pass
                    let reason = e.to_string();
                    self.log_sandbox_block(proposal, &reason, None);
                    return Err(e);
                }
            }
        }

        self.write_with_backup(&path, &pre_image, &post_image)?;
        tracing::info!(
            file = %proposal.file_path,
            issue_type = %proposal.issue_type,
            "fix applied"
        );
        Ok(())
    }

    /// Apply a batch serially; a rejected fix does not stop the rest
    pub fn apply_batch(&self, proposals: &[FixProposal]) -> Vec<(usize, Result<()>)> {
        proposals
            .iter()
            .enumerate()
            .map(|(index, proposal)| (index, self.apply(proposal)))
            .collect()
    }

    /// Verify the proposal against the current file and build the
    /// post-image without touching disk
    fn compute_post_image(&self, proposal: &FixProposal, pre_image: &str) -> Result<String> {
        let line_count = pre_image.lines().count();
        let index = proposal.line_number as usize;
        if proposal.line_number == 0 || index > line_count {
            return Err(FixError::LineOutOfBounds {
                file: proposal.file_path.clone(),
                line: proposal.line_number,
                len: line_count,
            });
        }

        let mut parts: Vec<String> = pre_image.split('\n').map(str::to_owned).collect();
        if !parts[index - 1].contains(&proposal.original_code) {
            return Err(FixError::OriginalNotFound {
                file: proposal.file_path.clone(),
                line: proposal.line_number,
            });
        }

        parts[index - 1] = parts[index - 1].replace(&proposal.original_code, &proposal.proposed_fix);
        Ok(parts.join("\n"))
    }

    /// `.bak` sibling, then atomic rename of the new content into place;
    /// restores the pre-image if anything goes wrong past the backup
    fn write_with_backup(&self, path: &Path, pre_image: &str, post_image: &str) -> Result<()> {
        let file_name = path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("file");
        let backup_path = path.with_file_name(format!("{file_name}.bak"));

        std::fs::write(&backup_path, pre_image)
            .map_err(|e| FixError::io(backup_path.display().to_string(), e))?;

        if let Err(write_error) = self.atomic_write(path, post_image) {
            return match std::fs::copy(&backup_path, path) {
                Ok(_) => Err(write_error),
                Err(restore_error) => Err(FixError::RollbackFailed(format!(
                    "write failed ({write_error}) and backup restore failed ({restore_error})"
                ))),
            };
        }
        Ok(())
    }

    fn atomic_write(&self, path: &Path, content: &str) -> Result<()> {
        let parent = path.parent().unwrap_or(Path::new("."));
        let temp = tempfile::NamedTempFile::new_in(parent)
            .map_err(|e| FixError::io(parent.display().to_string(), e))?;
        std::fs::write(temp.path(), content)
            .map_err(|e| FixError::io(temp.path().display().to_string(), e))?;
        temp.persist(path)
            .map_err(|e| FixError::io(path.display().to_string(), e.error))?;
        Ok(())
    }

    fn log_sandbox_block(
        &self,
        proposal: &FixProposal,
        reason: &str,
        result: Option<&super::sandbox::SandboxResult>,
    ) {
        let entry = json!({
            "timestamp": Utc::now().to_rfc3339(),
            "action": "SANDBOX_APPLICATION_BLOCK",
            "file_path": proposal.file_path,
            "fix_type": proposal.issue_type,
            "reason": reason,
            "build_passed": result.map(|r| r.build_passed),
            "tests_passed": result.map(|r| r.tests_passed),
            "runtime_safe": result.map(|r| r.runtime_safe),
            "execution_time": result.map(|r| r.execution_time),
            "issues": result.map(|r| r.issues_found.clone()),
            "security_violations": result.map(|r| r.security_violations.clone()),
        });
        if let Err(e) = append_json_line(&self.sandbox_log_path, &entry) {
            tracing::error!(path = %self.sandbox_log_path.display(), error = %e, "sandbox log write failed");
        }
    }

    fn resolve(&self, file_path: &str) -> PathBuf {
        let path = Path::new(file_path);
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.project_root.join(path)
        }
    }

    // ========================================================================
    // PROJECT-SCOPE BACKUP
    // ========================================================================

    /// Full project backup into `backup_dir/project_backup`
    ///
    /// Refuses a destination inside the project (backing up into a
    /// subdirectory of what is being backed up recurses forever) and
    /// refuses to overwrite an existing backup.
    pub fn create_project_backup(&self, backup_dir: &Path) -> Result<PathBuf> {
        let backup_path = backup_dir.join("project_backup");

        let resolved_root = self
            .project_root
            .canonicalize()
            .map_err(|e| FixError::io(self.project_root.display().to_string(), e))?;
        if backup_path.starts_with(&resolved_root) {
            return Err(FixError::Backup(format!(
                "cannot back up into a subdirectory of the project: {}",
                backup_path.display()
            )));
        }
        if backup_path.exists() {
            return Err(FixError::Backup(format!(
                "backup already exists: {}",
                backup_path.display()
            )));
        }

        std::fs::create_dir_all(&backup_path)
            .map_err(|e| FixError::io(backup_path.display().to_string(), e))?;

        let mut copied = 0usize;
        for entry in walkdir::WalkDir::new(&resolved_root)
            .into_iter()
            .filter_entry(|entry| {
                !(entry.file_type().is_dir()
                    && entry
                        .file_name()
                        .to_str()
                        .map(|name| BACKUP_EXCLUDED_DIRS.contains(&name))
                        .unwrap_or(false))
            })
        {
            let entry = entry.map_err(|e| FixError::Backup(format!("backup walk failed: {e}")))?;
            if !entry.file_type().is_file() {
                continue;
            }
            if entry.path().extension().and_then(|e| e.to_str()) == Some("pyc") {
                continue;
            }
            let relative = entry
                .path()
                .strip_prefix(&resolved_root)
                .expect("walk stays under root");
            let dest = backup_path.join(relative);
            if let Some(parent) = dest.parent() {
                std::fs::create_dir_all(parent)
                    .map_err(|e| FixError::io(parent.display().to_string(), e))?;
            }
            std::fs::copy(entry.path(), &dest)
                .map_err(|e| FixError::io(dest.display().to_string(), e))?;
            copied += 1;
        }

        if copied == 0 {
            return Err(FixError::Backup("backup is empty".to_string()));
        }

        tracing::info!(backup = %backup_path.display(), files = copied, "project backup created");
        Ok(backup_path)
    }

    /// Restore the tree from a project backup, file by file
    ///
    /// Never renames or replaces the project directory itself; a failure
    /// here is surfaced loudly because the tree may be inconsistent.
    pub fn restore_project_backup(&self, backup_dir: &Path) -> Result<usize> {
        let backup_path = backup_dir.join("project_backup");
        if !backup_path.is_dir() {
            return Err(FixError::RollbackFailed(format!(
                "no backup found at {}",
                backup_path.display()
            )));
        }

        let mut restored = 0usize;
        let mut failures = Vec::new();

        for entry in walkdir::WalkDir::new(&backup_path)
            .into_iter()
            .filter_map(|e| e.ok())
        {
            if !entry.file_type().is_file() {
                continue;
            }
            let relative = entry
                .path()
                .strip_prefix(&backup_path)
                .expect("walk stays under backup");
            let target = self.project_root.join(relative);
            if let Some(parent) = target.parent() {
                if let Err(e) = std::fs::create_dir_all(parent) {
                    failures.push(format!("{}: {e}", relative.display()));
                    continue;
                }
            }
            match std::fs::copy(entry.path(), &target) {
                Ok(_) => restored += 1,
                Err(e) => failures.push(format!("{}: {e}", relative.display())),
            }
        }

        if !failures.is_empty() {
            return Err(FixError::RollbackFailed(format!(
                "{} of {} files failed to restore: {}",
                failures.len(),
                failures.len() + restored,
                failures.join(", ")
            )));
        }

        tracing::info!(files = restored, "project restored from backup");
        Ok(restored)
    }
}
