//! Analysis module - issue model, recursive engine, cycle tracking
//!
//! Issues are immutable once created: analyzers emit them, the engine
//! aggregates them, and the fix pipeline consumes them. The JSON shape is
//! a stable interface; field names here must not drift.

pub mod cycles;
pub mod engine;

pub use cycles::{CycleMetrics, CycleTracker, ScanComparison};
pub use engine::{EngineConfig, EngineError, IterationReport, RecursiveEngine};

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

// ============================================================================
// SEVERITY
// ============================================================================

/// Issue severity, ordered from worst to most benign
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Critical,
    High,
    Medium,
    Low,
    Cosmetic,
    Info,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Critical => "critical",
            Severity::High => "high",
            Severity::Medium => "medium",
            Severity::Low => "low",
            Severity::Cosmetic => "cosmetic",
            Severity::Info => "info",
        }
    }

    /// Parse a severity name; unknown names are treated as medium
    pub fn parse_name(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "critical" => Severity::Critical,
            "high" => Severity::High,
            "medium" => Severity::Medium,
            "low" => Severity::Low,
            "cosmetic" => Severity::Cosmetic,
            "info" => Severity::Info,
            _ => Severity::Medium,
        }
    }

    /// Rank for comparisons: higher is more severe
    pub fn rank(&self) -> u8 {
        match self {
            Severity::Critical => 5,
            Severity::High => 4,
            Severity::Medium => 3,
            Severity::Low => 2,
            Severity::Cosmetic => 1,
            Severity::Info => 0,
        }
    }
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// ============================================================================
// FILE CONTEXT
// ============================================================================

/// Coarse classification of where an issue lives
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum FileContext {
    Production,
    Test,
    Config,
    #[default]
    Unknown,
}

impl FileContext {
    pub fn as_str(&self) -> &'static str {
        match self {
            FileContext::Production => "production",
            FileContext::Test => "test",
            FileContext::Config => "config",
            FileContext::Unknown => "unknown",
        }
    }

    pub fn parse_name(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "production" => FileContext::Production,
            "test" => FileContext::Test,
            "config" => FileContext::Config,
            _ => FileContext::Unknown,
        }
    }

    /// Classify a path by its name and ancestors
    pub fn classify(path: &std::path::Path) -> Self {
        let name = path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or_default();
        let full = path.to_string_lossy();

        if name.starts_with("test_")
            || name.ends_with("_test.py")
            || full.contains("/tests/")
            || full.contains("/test/")
        {
            FileContext::Test
        } else if name.ends_with(".toml")
            || name.ends_with(".yaml")
            || name.ends_with(".yml")
            || name.ends_with(".ini")
            || name.ends_with(".cfg")
            || name.contains("config")
        {
            FileContext::Config
        } else {
            FileContext::Production
        }
    }
}

impl std::fmt::Display for FileContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// ============================================================================
// ISSUE
// ============================================================================

/// A detected problem
///
/// Never mutated after creation. Serialized field names are part of the
/// persisted issue-file format consumed by `fix` and `train`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Issue {
    /// File the issue was found in
    pub file_path: String,
    /// 1-based line, when the issue is line-anchored
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub line: Option<u32>,
    /// Stable issue-type identifier, e.g. `bare_except`, `cpp_missing_include`
    #[serde(rename = "type")]
    pub issue_type: String,
    /// Severity classification
    pub severity: Severity,
    /// Human-readable description
    pub description: String,
    /// Suggested remediation, when one is known
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub suggestion: Option<String>,
    /// File context classification
    #[serde(default)]
    pub context: FileContext,
    /// Teaching notes attached by the analyzer
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub educational_content: Option<String>,
    /// Whether this issue came from a recalled memory pattern
    #[serde(default)]
    pub learned_from_memory: bool,
    /// Analyzer-specific keys, prefixed by the analyzer's short name
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Issue {
    pub fn new(
        file_path: impl Into<String>,
        issue_type: impl Into<String>,
        severity: Severity,
        description: impl Into<String>,
    ) -> Self {
        Self {
            file_path: file_path.into(),
            line: None,
            issue_type: issue_type.into(),
            severity,
            description: description.into(),
            suggestion: None,
            context: FileContext::Unknown,
            educational_content: None,
            learned_from_memory: false,
            extra: Map::new(),
        }
    }

    pub fn at_line(mut self, line: u32) -> Self {
        self.line = Some(line);
        self
    }

    pub fn with_suggestion(mut self, suggestion: impl Into<String>) -> Self {
        self.suggestion = Some(suggestion.into());
        self
    }

    pub fn with_context(mut self, context: FileContext) -> Self {
        self.context = context;
        self
    }

    pub fn from_memory(mut self) -> Self {
        self.learned_from_memory = true;
        self
    }

    pub fn with_extra(mut self, key: impl Into<String>, value: Value) -> Self {
        self.extra.insert(key.into(), value);
        self
    }

    /// Dedup key: two detectors reporting the same spot collapse to one
    pub fn dedup_key(&self) -> (String, Option<u32>, String) {
        (self.file_path.clone(), self.line, self.issue_type.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_severity_ordering() {
        assert!(Severity::Critical.rank() > Severity::High.rank());
        assert!(Severity::High.rank() > Severity::Medium.rank());
        assert!(Severity::Info.rank() < Severity::Cosmetic.rank());
    }

    #[test]
    fn test_issue_json_field_names_are_stable() {
        let issue = Issue::new("src/app.py", "bare_except", Severity::High, "Bare except clause")
            .at_line(42)
            .with_suggestion("except Exception as e:");

        let json = serde_json::to_value(&issue).unwrap();
        assert_eq!(json["file_path"], "src/app.py");
        assert_eq!(json["line"], 42);
        assert_eq!(json["type"], "bare_except");
        assert_eq!(json["severity"], "high");
        assert_eq!(json["suggestion"], "except Exception as e:");
        assert_eq!(json["learned_from_memory"], false);
        // `issue_type` must not leak as a field name
        assert!(json.get("issue_type").is_none());
    }

    #[test]
    fn test_issue_json_round_trip_with_extra_keys() {
        let issue = Issue::new("a.cpp", "cpp_missing_include", Severity::Medium, "Missing include")
            .with_extra("cpp_fix_content", Value::String("#include <vector>".into()));

        let text = serde_json::to_string(&issue).unwrap();
        let back: Issue = serde_json::from_str(&text).unwrap();
        assert_eq!(back.extra["cpp_fix_content"], "#include <vector>");
        assert_eq!(back.issue_type, "cpp_missing_include");
    }

    #[test]
    fn test_context_classification() {
        use std::path::Path;
        assert_eq!(FileContext::classify(Path::new("tests/test_app.py")), FileContext::Test);
        assert_eq!(FileContext::classify(Path::new("src/config.yaml")), FileContext::Config);
        assert_eq!(FileContext::classify(Path::new("src/server.py")), FileContext::Production);
        assert_eq!(FileContext::classify(Path::new("module_test.py")), FileContext::Test);
    }

    #[test]
    fn test_severity_parse_unknown_defaults_medium() {
        assert_eq!(Severity::parse_name("warning"), Severity::Medium);
        assert_eq!(Severity::parse_name("CRITICAL"), Severity::Critical);
    }
}
