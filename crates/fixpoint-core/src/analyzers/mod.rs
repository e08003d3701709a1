//! Analyzers module - language-specific issue detection
//!
//! One analyzer per language family, registered by file extension. The
//! registry is the single point of polymorphism: everything downstream
//! sees only `Vec<Issue>`.

mod binary;
mod cpp;
mod python;

pub use binary::BinaryAnalyzer;
pub use cpp::CppAnalyzer;
pub use python::PythonAnalyzer;

use std::collections::HashMap;
use std::path::Path;

use serde_json::json;

use crate::analysis::Issue;
use crate::memory::StoreInput;
use crate::storage::MemoryStore;

// ============================================================================
// ERROR TYPES
// ============================================================================

/// Analyzer error type
///
/// An analyzer failure affects only the file being analyzed; the engine
/// warns and moves on.
#[non_exhaustive]
#[derive(Debug, thiserror::Error)]
pub enum AnalyzerError {
    /// The analyzer could not process the file
    #[error("Analysis failed for {path}: {message}")]
    Failed { path: String, message: String },
    /// IO error while an analyzer consulted its own file
    #[error("IO error for {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

impl AnalyzerError {
    pub fn failed(path: &Path, message: impl Into<String>) -> Self {
        AnalyzerError::Failed {
            path: path.display().to_string(),
            message: message.into(),
        }
    }
}

/// Analyzer result type
pub type Result<T> = std::result::Result<T, AnalyzerError>;

// ============================================================================
// CAPABILITIES
// ============================================================================

/// A named declaration found during capability extraction
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct DeclaredSymbol {
    pub name: String,
    /// 1-based line of the declaration
    pub line: u32,
}

/// Structural summary of a source file
///
/// Produced by analyzers that support capability extraction; consumers
/// use it for cross-file correlation and complexity reporting.
#[derive(Debug, Clone, Default, serde::Serialize, serde::Deserialize)]
pub struct FileCapabilities {
    /// Free functions and methods
    pub functions: Vec<DeclaredSymbol>,
    /// Classes and structs
    pub classes: Vec<DeclaredSymbol>,
    /// Preprocessor or module-level constants
    pub constants: Vec<String>,
    /// Import/include statements, verbatim
    pub imports: Vec<String>,
    /// Language keywords observed in the file
    pub keywords: std::collections::HashSet<String>,
    /// Rough branching/size complexity
    pub complexity_score: usize,
    /// Whether the file defines an entry point
    pub has_entry_point: bool,
    /// Content length in bytes
    pub file_size: usize,
}

// ============================================================================
// ANALYZER TRAIT
// ============================================================================

/// A language-specific analyzer
///
/// Implementations are pure with respect to the file system: they may
/// consult memory and write learned patterns back, but never mutate
/// sources. Every emitted issue must carry a stable `issue_type` so
/// downstream policies can key on it.
pub trait LanguageAnalyzer: Send + Sync {
    /// Language identifier, also used as the analyzer's memory namespace
    fn language_name(&self) -> &'static str;

    /// File extensions (with leading dot) this analyzer claims
    fn file_extensions(&self) -> &'static [&'static str];

    /// Analyze decoded text content
    fn analyze_file(&self, path: &Path, content: &str, memory: &MemoryStore) -> Result<Vec<Issue>>;

    /// Whether this analyzer wants raw bytes instead of decoded text
    fn handles_binary(&self) -> bool {
        false
    }

    /// Analyze raw bytes; only called when [`handles_binary`] is true
    ///
    /// [`handles_binary`]: LanguageAnalyzer::handles_binary
    fn analyze_bytes(&self, path: &Path, bytes: &[u8], memory: &MemoryStore) -> Result<Vec<Issue>> {
        self.analyze_file(path, &String::from_utf8_lossy(bytes), memory)
    }

    /// Languages whose memory namespaces hold correlated prior art
    fn sibling_languages(&self) -> &'static [&'static str] {
        &[]
    }

    /// Structural summary of a file, for analyzers that support it
    fn extract_capabilities(&self, _path: &Path, _content: &str) -> Option<FileCapabilities> {
        None
    }

    /// Teaching notes for an issue, when the analyzer has any
    fn educational_content(&self, _issue: &Issue) -> Option<String> {
        None
    }

    /// Store detected patterns for future recall
    ///
    /// Default implementation records one pattern memory per issue under
    /// the analyzer's namespace.
    fn learn_from_analysis(&self, issues: &[Issue], memory: &MemoryStore) {
        for issue in issues {
            let input = StoreInput::new(
                self.language_name(),
                format!("{}: {}", issue.issue_type, issue.description),
            )
            .with_metadata(json!({
                "language": self.language_name(),
                "issue_type": issue.issue_type,
                "severity": issue.severity.as_str(),
                "file_path": issue.file_path,
            }));
            if let Err(e) = memory.store(input) {
                tracing::warn!(error = %e, "failed to store learned pattern");
            }
        }
    }

    /// Recall similar patterns from this and sibling language namespaces
    fn similar_patterns(&self, issue_type: &str, memory: &MemoryStore) -> Vec<String> {
        let query = format!("{} {}", issue_type, self.language_name());
        let mut patterns = Vec::new();

        let mut namespaces = vec![self.language_name()];
        namespaces.extend_from_slice(self.sibling_languages());

        for namespace in namespaces {
            match memory.search(namespace, &query, 5, 0.5) {
                Ok(records) => patterns.extend(records.into_iter().map(|r| r.content)),
                Err(e) => tracing::debug!(namespace, error = %e, "pattern recall failed"),
            }
        }
        patterns
    }
}

// ============================================================================
// REGISTRY
// ============================================================================

/// Extension-to-analyzer dispatch table
///
/// Each extension maps to exactly one analyzer. If two analyzers claim
/// the same extension, the last registered wins and a warning is logged.
pub struct AnalyzerRegistry {
    analyzers: Vec<Box<dyn LanguageAnalyzer>>,
    by_extension: HashMap<String, usize>,
}

impl AnalyzerRegistry {
    /// Empty registry
    pub fn new() -> Self {
        Self {
            analyzers: Vec::new(),
            by_extension: HashMap::new(),
        }
    }

    /// Registry loaded with the built-in analyzers
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.register(Box::new(PythonAnalyzer::new()));
        registry.register(Box::new(CppAnalyzer::new()));
        registry.register(Box::new(BinaryAnalyzer::new()));
        registry
    }

    /// Register an analyzer for all its extensions
    pub fn register(&mut self, analyzer: Box<dyn LanguageAnalyzer>) {
        let index = self.analyzers.len();
        for extension in analyzer.file_extensions() {
            let key = extension.to_lowercase();
            if let Some(previous) = self.by_extension.insert(key, index) {
                tracing::warn!(
                    extension,
                    previous_analyzer = self.analyzers[previous].language_name(),
                    new_analyzer = analyzer.language_name(),
                    "extension re-registered, last registration wins"
                );
            }
        }
        self.analyzers.push(analyzer);
    }

    /// The analyzer claiming a file's extension, if any
    pub fn analyzer_for(&self, path: &Path) -> Option<&dyn LanguageAnalyzer> {
        let extension = path.extension()?.to_str()?;
        let key = format!(".{}", extension.to_lowercase());
        self.by_extension
            .get(&key)
            .map(|&index| self.analyzers[index].as_ref())
    }

    /// All registered analyzers
    pub fn analyzers(&self) -> impl Iterator<Item = &dyn LanguageAnalyzer> {
        self.analyzers.iter().map(|a| a.as_ref())
    }

    /// Number of registered analyzers
    pub fn len(&self) -> usize {
        self.analyzers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.analyzers.is_empty()
    }
}

impl Default for AnalyzerRegistry {
    fn default() -> Self {
        Self::with_defaults()
    }
}
