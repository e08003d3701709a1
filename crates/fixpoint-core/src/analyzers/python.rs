//! Python analyzer
//!
//! Line-oriented heuristics for the Python family: maintenance markers,
//! bare excepts, debug prints, credential and SQL-injection heuristics,
//! off-by-one range bounds, and recall of previously learned patterns.

use std::path::Path;

use once_cell::sync::Lazy;
use regex::Regex;

use crate::analysis::{FileContext, Issue, Severity};
use crate::storage::MemoryStore;

use super::{LanguageAnalyzer, Result};

// ============================================================================
// PATTERN REGISTRY
// ============================================================================

/// Compiled patterns, one per issue type
struct Patterns {
    off_by_one: Regex,
    credential_name: Regex,
    sql_call: Regex,
}

static PATTERNS: Lazy<Patterns> = Lazy::new(|| Patterns {
    // `range(len(xs) - 1)` loops that usually mean to cover the whole slice
    off_by_one: Regex::new(r"for\s+\w+\s+in\s+range\(\s*len\([^)]*\)\s*-\s*1\s*\)")
        .expect("off_by_one pattern is valid"),
    // credential-looking assignment to a string literal
    credential_name: Regex::new(r#"(?i)\b(password|secret|api_key|token|passwd)\s*=\s*["'][^"']+["']"#)
        .expect("credential pattern is valid"),
    sql_call: Regex::new(r"\b(cursor\.execute|execute)\s*\(").expect("sql pattern is valid"),
});

/// Maintenance markers scanned verbatim (case-sensitive like the comments)
const MAINTENANCE_MARKERS: &[&str] = &["TODO", "FIXME", "XXX", "HACK", "BUG"];

/// Tokens that indicate the value came from the environment, not a literal
const CREDENTIAL_SAFE_TOKENS: &[&str] = &["getenv", "environ", "config", "input"];

// ============================================================================
// ANALYZER
// ============================================================================

/// Python language analyzer
pub struct PythonAnalyzer {
    _private: (),
}

impl PythonAnalyzer {
    pub fn new() -> Self {
        Self { _private: () }
    }

    fn is_test_file(path: &Path) -> bool {
        let name = path.file_name().and_then(|n| n.to_str()).unwrap_or_default();
        let full = path.to_string_lossy();
        name.starts_with("test_")
            || name.ends_with("_test.py")
            || full.contains("/tests/")
            || full.contains("/test/")
    }

    /// Recall learned patterns whose content appears on a line
    fn recalled_patterns(&self, memory: &MemoryStore) -> Vec<String> {
        match memory.search(self.language_name(), "code issues", 20, 0.5) {
            Ok(records) => records
                .into_iter()
                .map(|r| r.content.to_lowercase())
                .filter(|content| content.len() > 10)
                .collect(),
            Err(e) => {
                tracing::debug!(error = %e, "memory recall unavailable");
                Vec::new()
            }
        }
    }
}

impl Default for PythonAnalyzer {
    fn default() -> Self {
        Self::new()
    }
}

impl LanguageAnalyzer for PythonAnalyzer {
    fn language_name(&self) -> &'static str {
        "python"
    }

    fn file_extensions(&self) -> &'static [&'static str] {
        &[".py", ".pyw"]
    }

    fn analyze_file(&self, path: &Path, content: &str, memory: &MemoryStore) -> Result<Vec<Issue>> {
        let mut issues = Vec::new();
        let file_path = path.display().to_string();
        let context = FileContext::classify(path);
        let is_test = Self::is_test_file(path);
        let known_patterns = self.recalled_patterns(memory);

        let lines: Vec<&str> = content.lines().collect();
        for (i, raw_line) in lines.iter().enumerate() {
            let line_number = (i + 1) as u32;
            let line = raw_line.trim();
            let line_lower = line.to_lowercase();

            if MAINTENANCE_MARKERS.iter().any(|marker| line.contains(marker)) {
                let snippet: String = line.chars().take(100).collect();
                issues.push(
                    Issue::new(
                        &file_path,
                        "maintenance",
                        Severity::Medium,
                        format!("Maintenance comment: {snippet}"),
                    )
                    .at_line(line_number)
                    .with_context(context),
                );
            } else if line.starts_with("print(") && !is_test {
                issues.push(
                    Issue::new(
                        &file_path,
                        "debugging",
                        Severity::Low,
                        "Debug print statement in production code",
                    )
                    .at_line(line_number)
                    .with_context(context)
                    .with_suggestion("Route output through the logging module"),
                );
            } else if line.contains("import *") && line.contains("from") {
                issues.push(
                    Issue::new(
                        &file_path,
                        "wildcard_import",
                        Severity::Medium,
                        format!("Wildcard import: {line}"),
                    )
                    .at_line(line_number)
                    .with_context(context)
                    .with_suggestion("Import the needed names explicitly"),
                );
            } else if line == "except:" || line.contains("except:") {
                issues.push(
                    Issue::new(
                        &file_path,
                        "bare_except",
                        Severity::High,
                        "Bare except clause catches all exceptions",
                    )
                    .at_line(line_number)
                    .with_context(context)
                    .with_suggestion("Catch a specific exception type"),
                );
            } else if PATTERNS.off_by_one.is_match(line) {
                issues.push(
                    Issue::new(
                        &file_path,
                        "off_by_one",
                        Severity::Medium,
                        format!("Range excludes the final element: {line}"),
                    )
                    .at_line(line_number)
                    .with_context(context)
                    .with_suggestion("Check whether range(len(...)) was intended"),
                );
            } else if line.contains("eval(") || line.contains("exec(") {
                issues.push(
                    Issue::new(
                        &file_path,
                        "security_eval",
                        Severity::Critical,
                        "Dynamic code execution via eval/exec",
                    )
                    .at_line(line_number)
                    .with_context(context)
                    .with_suggestion("Replace dynamic evaluation with explicit dispatch"),
                );
            } else if PATTERNS.credential_name.is_match(line)
                && !CREDENTIAL_SAFE_TOKENS.iter().any(|token| line_lower.contains(token))
            {
                issues.push(
                    Issue::new(
                        &file_path,
                        "hardcoded_credentials",
                        Severity::Critical,
                        "Potential hardcoded credential",
                    )
                    .at_line(line_number)
                    .with_context(context)
                    .with_suggestion("Load secrets from the environment or a vault"),
                );
            } else if PATTERNS.sql_call.is_match(&line_lower)
                && (line.contains('+') || line.contains('%'))
            {
                issues.push(
                    Issue::new(
                        &file_path,
                        "sql_injection",
                        Severity::Critical,
                        "Potential SQL injection via string concatenation",
                    )
                    .at_line(line_number)
                    .with_context(context)
                    .with_suggestion("Use parameterized queries"),
                );
            } else if line.contains("open(") && i > 0 {
                // Error handling must appear in the five preceding lines
                let window_start = i.saturating_sub(5);
                let guarded = lines[window_start..=i].iter().any(|l| l.contains("try:"));
                if !guarded {
                    issues.push(
                        Issue::new(
                            &file_path,
                            "file_error_handling",
                            Severity::Medium,
                            "File operation without surrounding error handling",
                        )
                        .at_line(line_number)
                        .with_context(context),
                    );
                }
            }

            // Patterns recalled from memory
            for pattern in &known_patterns {
                if line_lower.contains(pattern.as_str()) {
                    let snippet: String = pattern.chars().take(50).collect();
                    issues.push(
                        Issue::new(
                            &file_path,
                            "memory_pattern",
                            Severity::Medium,
                            format!("Known issue pattern from memory: {snippet}"),
                        )
                        .at_line(line_number)
                        .with_context(context)
                        .from_memory(),
                    );
                    break;
                }
            }
        }

        for issue in issues.iter_mut() {
            if issue.educational_content.is_none() {
                issue.educational_content = self.educational_content(issue);
            }
        }

        Ok(issues)
    }

    fn educational_content(&self, issue: &Issue) -> Option<String> {
        let note = match issue.issue_type.as_str() {
            "bare_except" => {
                "A bare `except:` swallows SystemExit and KeyboardInterrupt along with real \
                 errors. Catch the narrowest exception type that the block can actually handle."
            }
            "sql_injection" => {
                "Building SQL with `+` or `%` interpolation lets crafted input escape the \
                 query. Parameterized queries keep data and SQL separate."
            }
            "hardcoded_credentials" => {
                "Credentials committed to source outlive the commit that removes them. Read \
                 them from the environment or a secret store instead."
            }
            "security_eval" => {
                "eval/exec run arbitrary code with the caller's privileges. Almost every use \
                 can be replaced with a dict dispatch or getattr on a fixed namespace."
            }
            "off_by_one" => {
                "`range(len(xs) - 1)` stops one element early. When pairing adjacent items \
                 that is intended; when visiting every item it silently drops the last one."
            }
            _ => return None,
        };
        Some(note.to_string())
    }
}
