//! Emergency pattern validator
//!
//! Content-only check on the full post-image just before the disk write,
//! after every other gate has already said yes. It compares the pre- and
//! post-image token sets: a fix may only remove danger, never introduce
//! it. Blocks are appended to an audit log the applier never truncates.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use chrono::Utc;
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::json;

use super::safety::{append_json_line, dangerous_patterns_in};
use super::FixProposal;

/// Default emergency log file name
pub const EMERGENCY_LOG_FILE: &str = "emergency_application_blocks.log";

/// Privilege- and identity-mutation shapes checked beyond the token list
static MUTATION_PATTERNS: Lazy<Vec<(Regex, &'static str)>> = Lazy::new(|| {
    vec![
        (
            Regex::new(r"\.role\s*=|\brole\s*=").expect("role pattern"),
            "role mutation",
        ),
        (
            Regex::new(r"\.permissions\s*=|\bpermissions\s*=").expect("permissions pattern"),
            "permissions mutation",
        ),
        (
            Regex::new(r"__class__\s*=").expect("class pattern"),
            "__class__ reassignment",
        ),
        (
            Regex::new(r"__\w+__\s*=").expect("dunder pattern"),
            "dunder attribute mutation",
        ),
        (
            Regex::new(r#"(?i)\b(password|secret|api_key|token)\s*=\s*["'][^"']+["']"#)
                .expect("credential pattern"),
            "credential string literal",
        ),
    ]
});

/// Validate a fix against its pre- and post-image
///
/// Returns `(safe, reason)`. The check is asymmetric on purpose: tokens
/// already present in the original are tolerated, tokens that appear only
/// in the modified content are blocked.
pub fn validate_fix_application(
    proposal: &FixProposal,
    original_content: &str,
    new_content: &str,
) -> (bool, String) {
    // Token-set comparison over the dangerous-pattern list
    let before: HashSet<&str> = dangerous_patterns_in(original_content).into_iter().collect();
    let after: Vec<&str> = dangerous_patterns_in(new_content)
        .into_iter()
        .filter(|token| !before.contains(token))
        .collect();

    if !after.is_empty() {
        return (
            false,
            format!(
                "fix for {} introduces dangerous patterns: {:?}",
                proposal.file_path, after
            ),
        );
    }

    // Newly introduced privilege/identity mutations
    for (pattern, label) in MUTATION_PATTERNS.iter() {
        let before_count = pattern.find_iter(original_content).count();
        let after_count = pattern.find_iter(new_content).count();
        if after_count > before_count {
            return (false, format!("fix introduces {label}"));
        }
    }

    (true, "no new security-sensitive content".to_string())
}

// ============================================================================
// EMERGENCY LOG
// ============================================================================

/// Append-only JSON-lines log of emergency blocks
pub struct EmergencyLog {
    path: PathBuf,
}

impl EmergencyLog {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Standard log location inside a directory
    pub fn in_dir(dir: &Path) -> Self {
        Self::new(dir.join(EMERGENCY_LOG_FILE))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Record a block; the fix was refused despite upstream approval
    pub fn record_block(&self, proposal: &FixProposal, reason: &str) {
        let entry = json!({
            "timestamp": Utc::now().to_rfc3339(),
            "action": "EMERGENCY_APPLICATION_BLOCK",
            "file_path": proposal.file_path,
            "fix_type": proposal.issue_type,
            "reason": reason,
            "proposed_fix": proposal.proposed_fix,
        });
        if let Err(e) = append_json_line(&self.path, &entry) {
            tracing::error!(path = %self.path.display(), error = %e, "emergency log write failed");
        }
    }
}
