//! Safety scoring
//!
//! A deterministic score in [0.0, 1.0] per proposal, hostile until proven
//! benign. The base score is low, bonuses are small, and several rules
//! short-circuit straight to zero. Anything that scores zero is
//! unappliable no matter who approved it.

use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};

use aho_corasick::AhoCorasick;
use chrono::Utc;
use once_cell::sync::Lazy;
use serde_json::json;

use crate::analysis::{FileContext, Severity};

use super::FixProposal;

// ============================================================================
// TYPE CATEGORIES
// ============================================================================

/// Issue types cosmetic enough to earn the only positive bonus
const ULTRA_SAFE_TYPES: &[&str] = &["whitespace_cleanup", "typo_corrections"];

/// Scoring categories that disqualify a proposal outright
const RISKY_TYPES: &[&str] = &[
    "security",
    "performance",
    "logic",
    "syntax_errors",
    "exception_handling",
    "missing_imports",
    "string_formatting",
    "algorithm_changes",
    "api_modifications",
    "database_queries",
    "concurrency_fixes",
    "memory_management",
];

/// Map a specific issue type onto its scoring category
///
/// Analyzers emit precise identifiers (`cpp_missing_include`,
/// `bare_except`); the scoring table is written against coarse
/// categories. This is the single place the two vocabularies meet.
pub fn scoring_category(issue_type: &str) -> &str {
    match issue_type {
        "bare_except" => "exception_handling",
        "cpp_missing_include" => "missing_imports",
        "sql_injection" | "hardcoded_credentials" | "security_eval" => "security",
        "off_by_one" => "logic",
        t if t.contains("security") => "security",
        t if t.contains("performance") || t == "hotspot_file" => "performance",
        t if t.contains("memory") && t.starts_with("cpp_") => "memory_management",
        t => t,
    }
}

// ============================================================================
// DANGEROUS PATTERNS
// ============================================================================

/// Tokens whose presence in a proposed fix forces the score to zero
pub const DANGEROUS_PATTERNS: &[&str] = &[
    // structural keywords
    "import ", "def ", "class ", "try:", "except:", "with ", "for ", "while ", "if ",
    // process / eval primitives
    "subprocess", "os.system", "eval(", "exec(", "__import__", "getattr(", "setattr(",
    "delattr(", "globals()", "locals()", "vars()", "dir(", "open(", "file(", "input()",
    "raw_input()", "compile(", "memoryview(",
    // privilege tokens
    "user.role =", ".role =", "admin", "root", "password", "auth",
    // boolean constants
    "return True", "return False", "== True", "== False",
    // network
    "http://", "https://", "ftp://", "requests.", "urllib.",
    // filesystem destructive
    "rm -rf", "del ", "shutil.", "pathlib.",
    // unsafe deserialization
    "pickle.", "yaml.load", "marshal.", "shelve.", "dill.", "joblib.",
];

static DANGEROUS_MATCHER: Lazy<AhoCorasick> =
    Lazy::new(|| AhoCorasick::new(DANGEROUS_PATTERNS).expect("pattern set builds"));

/// All dangerous tokens present in a text, in pattern-list order, deduped
pub fn dangerous_patterns_in(text: &str) -> Vec<&'static str> {
    let mut found: Vec<&'static str> = DANGEROUS_MATCHER
        .find_overlapping_iter(text)
        .map(|m| DANGEROUS_PATTERNS[m.pattern().as_usize()])
        .collect();
    found.sort_by_key(|pattern| {
        DANGEROUS_PATTERNS
            .iter()
            .position(|p| p == pattern)
            .unwrap_or(usize::MAX)
    });
    found.dedup();
    found
}

/// Assignment operators; any mutation in a fix caps the score at the floor
const ASSIGNMENT_PATTERNS: &[&str] = &[" = ", "+=", "-=", "*=", "/=", "|=", "&=", "^="];

// ============================================================================
// SECURITY AUDIT LOG
// ============================================================================

/// Append-only JSON-lines audit trail for dangerous-pattern hits
pub struct SecurityAudit {
    path: PathBuf,
}

impl SecurityAudit {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Default audit file next to the other block logs
    pub fn in_dir(dir: &Path) -> Self {
        Self::new(dir.join("security_audit.log"))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Record a dangerous-pattern detection
    pub fn record_dangerous(&self, proposal: &FixProposal, patterns: &[&str]) {
        let entry = json!({
            "timestamp": Utc::now().to_rfc3339(),
            "action": "DANGEROUS_PATTERNS_DETECTED",
            "file_path": proposal.file_path,
            "fix_type": proposal.issue_type,
            "patterns": patterns,
            "message": format!("dangerous patterns detected: {patterns:?}"),
        });
        if let Err(e) = append_json_line(&self.path, &entry) {
            tracing::error!(path = %self.path.display(), error = %e, "audit write failed");
        }
        tracing::warn!(
            file = %proposal.file_path,
            patterns = ?patterns,
            "dangerous patterns detected in proposed fix"
        );
    }
}

/// Append one JSON object as a line to an append-only log
pub(crate) fn append_json_line(path: &Path, value: &serde_json::Value) -> std::io::Result<()> {
    let mut file = OpenOptions::new().create(true).append(true).open(path)?;
    writeln!(file, "{value}")
}

// ============================================================================
// SCORING
// ============================================================================

/// Where in the rule sequence the upstream-score cap applies
///
/// The additive rules and the cap interact: capping before the context
/// and severity deductions lets those deductions dig below the cap,
/// capping at the end does not. Both orderings are real; the default is
/// the end cap, the other exists so the interpretations stay comparable
/// under test.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CapMode {
    /// Cap once, at the end, after every deduction (default)
    AfterAdditive,
    /// Cap right after the code-change rules, before the context and
    /// severity deductions
    Immediate,
}

/// Compute the safety score for a proposal, writing an audit entry when
/// dangerous patterns disqualify it
pub fn score_proposal(proposal: &FixProposal, audit: Option<&SecurityAudit>) -> f64 {
    score_with_cap_mode(proposal, audit, CapMode::AfterAdditive)
}

/// Safety score with no audit sink
pub fn calculate_safety_score(proposal: &FixProposal) -> f64 {
    score_with_cap_mode(proposal, None, CapMode::AfterAdditive)
}

pub fn score_with_cap_mode(
    proposal: &FixProposal,
    audit: Option<&SecurityAudit>,
    cap_mode: CapMode,
) -> f64 {
    // Assume unsafe until proven otherwise
    let mut score: f64 = 0.1;

    let category = scoring_category(&proposal.issue_type);
    if ULTRA_SAFE_TYPES.contains(&category) {
        score += 0.4;
    } else if RISKY_TYPES.contains(&category) {
        return 0.0;
    }

    if !proposal.original_code.is_empty() && !proposal.proposed_fix.is_empty() {
        let original_lines = proposal.original_code.matches('\n').count();
        let proposed_lines = proposal.proposed_fix.matches('\n').count();
        if original_lines != proposed_lines {
            score -= 0.3;
        }

        let size_ratio =
            proposal.proposed_fix.len() as f64 / proposal.original_code.len().max(1) as f64;
        if !(0.8..=1.2).contains(&size_ratio) {
            score -= 0.2;
        }

        let dangerous = dangerous_patterns_in(&proposal.proposed_fix);
        if !dangerous.is_empty() {
            if let Some(audit) = audit {
                audit.record_dangerous(proposal, &dangerous);
            }
            return 0.0;
        }

        if ASSIGNMENT_PATTERNS
            .iter()
            .any(|pattern| proposal.proposed_fix.contains(pattern))
        {
            score = score.min(0.1);
        }
    }

    let cap = proposal.safety_score as f64 / 100.0 * 0.8;
    if cap_mode == CapMode::Immediate {
        score = score.min(cap);
    }

    match proposal.context {
        FileContext::Production => score -= 0.2,
        FileContext::Config => score -= 0.3,
        _ => {}
    }

    match proposal.severity {
        Severity::High | Severity::Critical => return 0.0,
        Severity::Medium => score -= 0.2,
        _ => {}
    }

    if cap_mode == CapMode::AfterAdditive {
        score = score.min(cap);
    }

    score.clamp(0.0, 1.0)
}
