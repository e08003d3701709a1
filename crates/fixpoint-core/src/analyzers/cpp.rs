//! C++ analyzer
//!
//! Covers the systems-language family: AI-generated code patterns,
//! brace and namespace structure, include-graph analysis with
//! missing-include detection, and security/performance/memory heuristics.
//! Correlates with the other systems languages through shared memory
//! namespaces.

use std::collections::HashSet;
use std::path::Path;

use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::json;

use crate::analysis::{FileContext, Issue, Severity};
use crate::storage::MemoryStore;

use super::{LanguageAnalyzer, Result};

// ============================================================================
// PATTERN REGISTRY
// ============================================================================

/// A compiled detector bound to its issue type
struct Detector {
    issue_type: &'static str,
    severity: Severity,
    description: &'static str,
    suggestion: Option<&'static str>,
    pattern: Regex,
}

fn detector(
    issue_type: &'static str,
    severity: Severity,
    description: &'static str,
    suggestion: Option<&'static str>,
    pattern: &str,
) -> Detector {
    Detector {
        issue_type,
        severity,
        description,
        suggestion,
        pattern: Regex::new(pattern).expect("detector pattern is valid"),
    }
}

/// Patterns typical of machine-generated C++ committed without review
static AI_PATTERNS: Lazy<Vec<Detector>> = Lazy::new(|| {
    vec![
        detector(
            "cpp_incorrect_include_paths",
            Severity::High,
            "Deep relative include path suggests missing project-structure context",
            Some("Use a path from the project root or reorganize the headers"),
            r#""(\.\./){3,}[^"]*""#,
        ),
        detector(
            "cpp_const_duplication",
            Severity::Medium,
            "Duplicated const qualifier",
            None,
            r"\bconst\s+const\b",
        ),
        detector(
            "cpp_static_duplication",
            Severity::Medium,
            "Duplicated static qualifier",
            None,
            r"\bstatic\s+static\b",
        ),
        detector(
            "cpp_platform_specific_includes",
            Severity::Medium,
            "Platform-specific include without a feature guard",
            Some("Wrap in the appropriate platform #ifdef"),
            r"#include\s+<OpenGL/gl3\.h>",
        ),
        detector(
            "cpp_namespace_pollution",
            Severity::Medium,
            "using-directive placed before a namespace declaration",
            Some("Move using statements inside the narrowest scope"),
            r"using\s+namespace\s+std\s*;\s*namespace",
        ),
    ]
});

/// Security-sensitive call patterns
static SECURITY_PATTERNS: Lazy<Vec<Detector>> = Lazy::new(|| {
    vec![
        detector(
            "cpp_buffer_overflow_risk",
            Severity::High,
            "Unsafe C string function that can overflow its destination",
            Some("Use snprintf, strncpy-style bounded calls, or std::string"),
            r"\b(strcpy|strcat|sprintf|gets)\s*\(",
        ),
        detector(
            "cpp_unsafe_cast",
            Severity::Medium,
            "C-style cast discards type checking",
            Some("Use static_cast/dynamic_cast/const_cast/reinterpret_cast"),
            r"\((?:int|char|float|double|long|short|unsigned|void)\s*\*+\s*\)\s*\w+",
        ),
    ]
});

/// Performance anti-patterns
static PERFORMANCE_PATTERNS: Lazy<Vec<Detector>> = Lazy::new(|| {
    vec![
        detector(
            "cpp_inefficient_string_concat",
            Severity::Medium,
            "Repeated string concatenation builds intermediate temporaries",
            Some("Use a stringstream or reserve() with +="),
            r"std::string\s+\w+\s*=\s*[^;]*\+[^;]*\+",
        ),
        detector(
            "cpp_pass_by_value_large",
            Severity::Medium,
            "Large container passed by value",
            Some("Pass by const reference"),
            r"void\s+\w+\s*\(\s*std::(?:vector|string|map|set)<?[^)&]*\s+\w+\s*\)",
        ),
    ]
});

/// Memory-management heuristics
static MEMORY_PATTERNS: Lazy<Vec<Detector>> = Lazy::new(|| {
    vec![detector(
        "cpp_raw_pointer_new",
        Severity::Medium,
        "Raw pointer initialized with new",
        Some("Use std::unique_ptr or std::shared_ptr"),
        r"\b(?:int|char|float|double|void|struct\s+\w+|\w+)\s*\*\s*\w+\s*=\s*new\b",
    )]
});

static INCLUDE_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"#include\s+([<"][^>"]+[>"])"#).expect("include pattern is valid"));

static FUNCTION_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?m)^\s*(?:[\w:<>~&*]+\s+)+(\w+)\s*\([^;{]*\)\s*(?:const)?\s*(?:override)?\s*\{")
        .expect("function pattern is valid")
});

static CLASS_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\b(?:class|struct)\s+(\w+)(?:\s*:\s*[^{;]*)?\s*[{;]")
        .expect("class pattern is valid")
});

static DEFINE_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"#define\s+(\w+)").expect("define pattern is valid"));

static MAIN_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\bint\s+main\s*\(").expect("main pattern is valid"));

/// Keywords tracked during capability extraction
const TRACKED_KEYWORDS: &[&str] = &[
    "virtual", "override", "const", "static", "inline", "template", "namespace", "class",
    "struct", "enum", "union", "typedef", "public", "private", "protected", "friend", "extern",
    "new", "delete", "unique_ptr", "shared_ptr",
];

static TRIPLE_NESTED_NAMESPACE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"namespace\s+\w+\s*\{\s*namespace\s+\w+\s*\{\s*namespace\s+\w+\s*\{")
        .expect("nesting pattern is valid")
});

static NESTED_NAMESPACE_PAIR: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"namespace\s+(\w+)\s*\{\s*namespace\s+(\w+)\s*\{")
        .expect("namespace pair pattern is valid")
});

static ARRAY_NEW: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"new\s+\w+\s*\[").expect("array new pattern is valid"));

/// Symbols mapped to the canonical header that declares them
static SYMBOL_HEADERS: Lazy<Vec<(Regex, &'static str)>> = Lazy::new(|| {
    let table: &[(&str, &str)] = &[
        (r"\bstd::cout\b|\bstd::cin\b|\bstd::endl\b", "<iostream>"),
        (r"\bstd::string\b", "<string>"),
        (r"\bstd::vector\b", "<vector>"),
        (r"\bstd::map\b|\bstd::multimap\b", "<map>"),
        (r"\bstd::set\b|\bstd::multiset\b", "<set>"),
        (r"\bstd::list\b", "<list>"),
        (r"\bstd::queue\b|\bstd::priority_queue\b", "<queue>"),
        (r"\bstd::stack\b", "<stack>"),
        (r"\bstd::deque\b", "<deque>"),
        (r"\bstd::array\b", "<array>"),
        (
            r"\bstd::shared_ptr\b|\bstd::unique_ptr\b|\bstd::weak_ptr\b|\bstd::make_unique\b|\bstd::make_shared\b",
            "<memory>",
        ),
        (r"\bstd::thread\b", "<thread>"),
        (r"\bstd::mutex\b|\bstd::lock_guard\b|\bstd::unique_lock\b", "<mutex>"),
        (r"\bstd::chrono\b", "<chrono>"),
        (r"\bstd::sort\b|\bstd::find\b|\bstd::transform\b", "<algorithm>"),
        (r"\bstd::numeric_limits\b", "<limits>"),
        (r"\bstd::function\b|\bstd::bind\b", "<functional>"),
        (r"\bstd::tuple\b", "<tuple>"),
        (r"\bstd::pair\b|\bstd::make_pair\b", "<utility>"),
        (r"\bstd::regex\b", "<regex>"),
        (r"\bstd::fstream\b|\bstd::ifstream\b|\bstd::ofstream\b", "<fstream>"),
        (
            r"\bstd::stringstream\b|\bstd::istringstream\b|\bstd::ostringstream\b",
            "<sstream>",
        ),
        (r"\bprintf\b|\bscanf\b", "<cstdio>"),
        (r"\bmalloc\b|\bcalloc\b|\brealloc\b", "<cstdlib>"),
        (r"\bstrcpy\b|\bstrlen\b|\bstrcmp\b|\bstrcat\b", "<cstring>"),
        (r"\bsqrt\b|\bpow\b|\bfabs\b", "<cmath>"),
        (r"\bassert\b", "<cassert>"),
    ];
    table
        .iter()
        .map(|(pattern, header)| {
            (Regex::new(pattern).expect("symbol pattern is valid"), *header)
        })
        .collect()
});

/// Include-path shapes that will not survive another platform or build root
static INCORRECT_PATH_PATTERNS: Lazy<Vec<(Regex, &'static str, &'static str)>> = Lazy::new(|| {
    vec![
        (
            Regex::new(r#"#include\s+"(\.\./){3,}[^"]*""#).unwrap(),
            "Excessive relative path depth",
            "Use a path from the project root or reorganize the code",
        ),
        (
            Regex::new(r#"#include\s+"[^"]*\\[^"]*""#).unwrap(),
            "Windows-style path separator in include",
            "Use forward slashes for cross-platform builds",
        ),
        (
            Regex::new(r"#include\s+<[^>]*\.cpp>").unwrap(),
            "Implementation file included instead of a header",
            "Include the corresponding .h/.hpp header",
        ),
        (
            Regex::new(r#"#include\s+"[^"]*\s[^"]*""#).unwrap(),
            "Include path contains whitespace",
            "Remove spaces from the include path",
        ),
    ]
});

// ============================================================================
// ANALYZER
// ============================================================================

/// C++ language analyzer
///
/// Also claims plain C sources; the heuristics degrade gracefully there.
pub struct CppAnalyzer {
    _private: (),
}

impl CppAnalyzer {
    pub fn new() -> Self {
        Self { _private: () }
    }

    fn line_of(content: &str, offset: usize) -> u32 {
        (content[..offset].matches('\n').count() + 1) as u32
    }

    fn run_detectors(
        detectors: &[Detector],
        content: &str,
        file_path: &str,
        context: FileContext,
        issues: &mut Vec<Issue>,
    ) {
        for d in detectors {
            for m in d.pattern.find_iter(content) {
                let mut issue = Issue::new(file_path, d.issue_type, d.severity, d.description)
                    .at_line(Self::line_of(content, m.start()))
                    .with_context(context);
                if let Some(suggestion) = d.suggestion {
                    issue = issue.with_suggestion(suggestion);
                }
                issues.push(issue);
            }
        }
    }

    /// Brace balance and namespace nesting depth
    fn structure_issues(content: &str, file_path: &str, context: FileContext) -> Vec<Issue> {
        let mut issues = Vec::new();

        // Same name opened twice in a row: a generation artifact, not a style choice
        for captures in NESTED_NAMESPACE_PAIR.captures_iter(content) {
            let (outer, inner) = (&captures[1], &captures[2]);
            if outer == inner {
                let offset = captures.get(0).expect("match exists").start();
                issues.push(
                    Issue::new(
                        file_path,
                        "cpp_double_namespace",
                        Severity::High,
                        format!("Doubled namespace declaration: {outer}"),
                    )
                    .at_line(Self::line_of(content, offset))
                    .with_context(context)
                    .with_suggestion("Collapse the duplicated namespace"),
                );
            }
        }

        let opens = content.matches('{').count();
        let closes = content.matches('}').count();
        if opens != closes {
            issues.push(
                Issue::new(
                    file_path,
                    "cpp_brace_imbalance",
                    Severity::High,
                    format!("Brace imbalance: {opens} opens, {closes} closes"),
                )
                .with_context(context),
            );
        }

        if TRIPLE_NESTED_NAMESPACE.is_match(content) {
            issues.push(
                Issue::new(
                    file_path,
                    "cpp_excessive_namespace_nesting",
                    Severity::Medium,
                    "Excessive namespace nesting",
                )
                .with_context(context)
                .with_suggestion("Consider flattening to a nested-namespace-definition"),
            );
        }

        issues
    }

    /// Duplicate includes, ordering, missing includes, broken paths
    fn include_issues(content: &str, file_path: &str, context: FileContext) -> Vec<Issue> {
        let mut issues = Vec::new();

        // Gather includes with their lines
        let mut includes: Vec<(String, u32)> = Vec::new();
        for m in INCLUDE_PATTERN.captures_iter(content) {
            let whole = m.get(0).expect("match exists");
            includes.push((
                m.get(1).expect("header group").as_str().to_string(),
                Self::line_of(content, whole.start()),
            ));
        }

        // Duplicates
        let mut seen: HashSet<&str> = HashSet::new();
        for (header, line) in &includes {
            if !seen.insert(header.as_str()) {
                issues.push(
                    Issue::new(
                        file_path,
                        "cpp_duplicate_include",
                        Severity::Low,
                        format!("Duplicate include: {header}"),
                    )
                    .at_line(*line)
                    .with_context(context)
                    .with_suggestion(format!("Remove the duplicate include at line {line}"))
                    .with_extra("cpp_fix_action", json!("remove_line")),
                );
            }
        }

        // Local includes before system includes
        let first_local = includes
            .iter()
            .filter(|(h, _)| h.starts_with('"'))
            .map(|(_, line)| *line)
            .min();
        let last_system = includes
            .iter()
            .filter(|(h, _)| h.starts_with('<'))
            .map(|(_, line)| *line)
            .max();
        if let (Some(first_local), Some(last_system)) = (first_local, last_system) {
            if first_local < last_system {
                issues.push(
                    Issue::new(
                        file_path,
                        "cpp_include_order",
                        Severity::Low,
                        "Local includes appear before system includes",
                    )
                    .at_line(first_local)
                    .with_context(context)
                    .with_suggestion("Order includes: system headers first, then local headers"),
                );
            }
        }

        // Missing includes, mapped from referenced symbols
        let current: HashSet<String> = includes
            .iter()
            .map(|(h, _)| h.trim_matches(|c| c == '<' || c == '>' || c == '"').to_string())
            .collect();
        let insert_line = includes.iter().map(|(_, line)| *line).max().map(|l| l + 1).unwrap_or(1);

        for (symbol, header) in SYMBOL_HEADERS.iter() {
            if !symbol.is_match(content) {
                continue;
            }
            let bare = header.trim_matches(|c| c == '<' || c == '>');
            let already = current.contains(bare) || current.contains(&format!("{bare}.h"));
            if already {
                continue;
            }
            issues.push(
                Issue::new(
                    file_path,
                    "cpp_missing_include",
                    Severity::Medium,
                    format!("Missing include {header} for referenced symbols"),
                )
                .at_line(insert_line)
                .with_context(context)
                .with_suggestion(format!("Add: #include {header}"))
                .with_extra("cpp_fix_action", json!("add_include"))
                .with_extra("cpp_fix_content", json!(format!("#include {header}"))),
            );
        }

        // Incorrect paths
        for (pattern, description, suggestion) in INCORRECT_PATH_PATTERNS.iter() {
            for m in pattern.find_iter(content) {
                issues.push(
                    Issue::new(
                        file_path,
                        "cpp_incorrect_include_path",
                        Severity::Medium,
                        *description,
                    )
                    .at_line(Self::line_of(content, m.start()))
                    .with_context(context)
                    .with_suggestion(*suggestion)
                    .with_extra("cpp_found_path", json!(m.as_str())),
                );
            }
        }

        issues
    }

    /// File-level memory-management heuristics that need cross-line context
    fn memory_issues(content: &str, file_path: &str, context: FileContext) -> Vec<Issue> {
        let mut issues = Vec::new();

        // new without any delete in the same translation unit
        if content.contains("new ") && !content.contains("delete") && !content.contains("unique_ptr")
        {
            if let Some(offset) = content.find("new ") {
                issues.push(
                    Issue::new(
                        file_path,
                        "cpp_memory_leak_risk",
                        Severity::Medium,
                        "Dynamic allocation without a matching delete",
                    )
                    .at_line(Self::line_of(content, offset))
                    .with_context(context)
                    .with_suggestion("Manage the allocation with RAII or smart pointers"),
                );
            }
        }

        // new[] freed with scalar delete
        let has_array_delete = content.contains("delete[]") || content.contains("delete []");
        let has_scalar_delete = content.contains("delete ") && !has_array_delete;
        if ARRAY_NEW.is_match(content) && has_scalar_delete {
            issues.push(
                Issue::new(
                    file_path,
                    "cpp_array_delete_mismatch",
                    Severity::High,
                    "Array allocated with new[] but released with scalar delete",
                )
                .with_context(context)
                .with_suggestion("Use delete[] or replace the array with std::vector"),
            );
        }

        // Virtual methods without a virtual destructor
        if content.contains("virtual ") && content.contains("class ") && !content.contains("virtual ~")
        {
            if let Some(offset) = content.find("class ") {
                issues.push(
                    Issue::new(
                        file_path,
                        "cpp_missing_virtual_destructor",
                        Severity::High,
                        "Class declares virtual methods but no virtual destructor",
                    )
                    .at_line(Self::line_of(content, offset))
                    .with_context(context)
                    .with_suggestion("Add a virtual destructor to the base class"),
                );
            }
        }

        issues
    }
}

impl Default for CppAnalyzer {
    fn default() -> Self {
        Self::new()
    }
}

impl LanguageAnalyzer for CppAnalyzer {
    fn language_name(&self) -> &'static str {
        "cpp"
    }

    fn file_extensions(&self) -> &'static [&'static str] {
        &[".cpp", ".hpp", ".h", ".c", ".cc", ".cxx", ".hxx"]
    }

    fn sibling_languages(&self) -> &'static [&'static str] {
        &["c", "rust", "go"]
    }

    fn extract_capabilities(&self, _path: &Path, content: &str) -> Option<super::FileCapabilities> {
        let functions = FUNCTION_PATTERN
            .captures_iter(content)
            .map(|captures| super::DeclaredSymbol {
                name: captures[1].to_string(),
                line: Self::line_of(content, captures.get(0).expect("match exists").start()),
            })
            .collect::<Vec<_>>();

        let classes = CLASS_PATTERN
            .captures_iter(content)
            .map(|captures| super::DeclaredSymbol {
                name: captures[1].to_string(),
                line: Self::line_of(content, captures.get(0).expect("match exists").start()),
            })
            .collect::<Vec<_>>();

        let constants = DEFINE_PATTERN
            .captures_iter(content)
            .map(|captures| captures[1].to_string())
            .collect();

        let imports = INCLUDE_PATTERN
            .find_iter(content)
            .map(|m| m.as_str().to_string())
            .collect();

        let keywords = TRACKED_KEYWORDS
            .iter()
            .filter(|keyword| content.contains(*keyword))
            .map(|keyword| keyword.to_string())
            .collect();

        let complexity_score = functions.len() * 2
            + classes.len() * 3
            + content.matches("if").count()
            + content.matches("for").count()
            + content.matches("while").count()
            + content.matches("switch").count()
            + content.matches("try").count();

        Some(super::FileCapabilities {
            functions,
            classes,
            constants,
            imports,
            keywords,
            complexity_score,
            has_entry_point: MAIN_PATTERN.is_match(content),
            file_size: content.len(),
        })
    }

    fn analyze_file(&self, path: &Path, content: &str, memory: &MemoryStore) -> Result<Vec<Issue>> {
        let file_path = path.display().to_string();
        let context = FileContext::classify(path);

        let mut issues = Vec::new();
        Self::run_detectors(&AI_PATTERNS, content, &file_path, context, &mut issues);
        issues.extend(Self::structure_issues(content, &file_path, context));
        issues.extend(Self::include_issues(content, &file_path, context));
        Self::run_detectors(&SECURITY_PATTERNS, content, &file_path, context, &mut issues);
        Self::run_detectors(&PERFORMANCE_PATTERNS, content, &file_path, context, &mut issues);
        Self::run_detectors(&MEMORY_PATTERNS, content, &file_path, context, &mut issues);
        issues.extend(Self::memory_issues(content, &file_path, context));

        // Keep per-file issues in source order for stable reports
        issues.sort_by_key(|issue| issue.line.unwrap_or(0));

        for issue in issues.iter_mut() {
            if issue.educational_content.is_none() {
                issue.educational_content = self.educational_content(issue);
            }
        }

        self.learn_from_analysis(&issues, memory);

        Ok(issues)
    }

    fn educational_content(&self, issue: &Issue) -> Option<String> {
        let mut note = format!("C++ issue: {}", issue.description);
        if let Some(suggestion) = &issue.suggestion {
            note.push_str(&format!("\nRecommendation: {suggestion}"));
        }

        let t = issue.issue_type.as_str();
        if t.contains("memory") || t.contains("raw_pointer") || t.contains("delete") {
            note.push_str(
                "\nC++ memory is managed manually; RAII ties lifetimes to scopes and keeps \
                 cleanup exception-safe.",
            );
        } else if t.contains("buffer") || t.contains("cast") {
            note.push_str(
                "\nModern C++ replacements (std::string, checked casts, containers) close \
                 most of the classic memory-safety holes.",
            );
        } else if t.contains("concat") || t.contains("pass_by_value") || t.contains("endl") {
            note.push_str(
                "\nMove semantics, const references, and buffered output remove most of the \
                 accidental copies in hot paths.",
            );
        }
        Some(note)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn analyze(content: &str) -> Vec<Issue> {
        let memory = MemoryStore::in_memory().unwrap();
        CppAnalyzer::new()
            .analyze_file(Path::new("src/widget.cpp"), content, &memory)
            .unwrap()
    }

    fn find<'a>(issues: &'a [Issue], issue_type: &str) -> Option<&'a Issue> {
        issues.iter().find(|i| i.issue_type == issue_type)
    }

    #[test]
    fn test_missing_include_for_std_vector() {
        let content = "#include <string>\n\nstd::vector<int> make() { return {}; }\n";
        let issues = analyze(content);

        let issue = find(&issues, "cpp_missing_include").expect("missing include detected");
        assert_eq!(issue.severity, Severity::Medium);
        assert_eq!(issue.extra["cpp_fix_content"], "#include <vector>");
        // Inserted after the last existing include line
        assert_eq!(issue.line, Some(2));
    }

    #[test]
    fn test_present_include_not_reported() {
        let content = "#include <vector>\nstd::vector<int> make() { return {}; }\n";
        let issues = analyze(content);
        assert!(find(&issues, "cpp_missing_include").is_none());
    }

    #[test]
    fn test_duplicate_include() {
        let content = "#include <vector>\n#include <vector>\nstd::vector<int> v;\n";
        let issues = analyze(content);
        let issue = find(&issues, "cpp_duplicate_include").unwrap();
        assert_eq!(issue.line, Some(2));
    }

    #[test]
    fn test_include_order_local_before_system() {
        let content = "#include \"widget.h\"\n#include <vector>\nstd::vector<int> v;\n";
        let issues = analyze(content);
        assert!(find(&issues, "cpp_include_order").is_some());
    }

    #[test]
    fn test_brace_imbalance() {
        let issues = analyze("int main() { if (x) { return 1; }\n");
        let issue = find(&issues, "cpp_brace_imbalance").unwrap();
        assert_eq!(issue.severity, Severity::High);
    }

    #[test]
    fn test_double_namespace() {
        let issues = analyze("namespace app { namespace app {\nint x;\n} }\n");
        assert!(find(&issues, "cpp_double_namespace").is_some());
    }

    #[test]
    fn test_const_duplication() {
        let issues = analyze("const const int x = 1;\n");
        assert!(find(&issues, "cpp_const_duplication").is_some());
    }

    #[test]
    fn test_buffer_overflow_call() {
        let issues = analyze("#include <cstring>\nvoid f(char* dst, const char* src) { strcpy(dst, src); }\n");
        let issue = find(&issues, "cpp_buffer_overflow_risk").unwrap();
        assert_eq!(issue.severity, Severity::High);
        assert_eq!(issue.line, Some(2));
    }

    #[test]
    fn test_raw_new_without_delete() {
        let issues = analyze("void f() { int* p = new int(5); use(p); }\n");
        assert!(find(&issues, "cpp_memory_leak_risk").is_some());
        assert!(find(&issues, "cpp_raw_pointer_new").is_some());
    }

    #[test]
    fn test_virtual_without_virtual_destructor() {
        let content = "class Base {\npublic:\n    virtual void run();\n    ~Base();\n};\n";
        let issues = analyze(content);
        let issue = find(&issues, "cpp_missing_virtual_destructor").unwrap();
        assert_eq!(issue.severity, Severity::High);
    }

    #[test]
    fn test_virtual_destructor_present_is_fine() {
        let content = "class Base {\npublic:\n    virtual void run();\n    virtual ~Base();\n};\n";
        let issues = analyze(content);
        assert!(find(&issues, "cpp_missing_virtual_destructor").is_none());
    }

    #[test]
    fn test_deep_relative_include_path() {
        let issues = analyze("#include \"../../../core/util.h\"\n");
        assert!(find(&issues, "cpp_incorrect_include_paths").is_some());
        assert!(find(&issues, "cpp_incorrect_include_path").is_some());
    }

    #[test]
    fn test_cpp_file_inclusion() {
        let issues = analyze("#include <impl.cpp>\n");
        let issue = find(&issues, "cpp_incorrect_include_path").unwrap();
        assert_eq!(issue.description, "Implementation file included instead of a header");
    }

    #[test]
    fn test_issues_sorted_by_line() {
        let content = "#include <string>\n#include <string>\nconst const int x = 1;\nstd::vector<int> v;\n";
        let issues = analyze(content);
        let lines: Vec<_> = issues.iter().map(|i| i.line.unwrap_or(0)).collect();
        let mut sorted = lines.clone();
        sorted.sort();
        assert_eq!(lines, sorted);
    }

    #[test]
    fn test_capability_extraction() {
        let content = "#include <vector>\n#define MAX_SIZE 64\n\nclass Widget {\npublic:\n    void render() {\n        draw();\n    }\n};\n\nint main() {\n    return 0;\n}\n";
        let capabilities = CppAnalyzer::new()
            .extract_capabilities(Path::new("widget.cpp"), content)
            .unwrap();

        assert!(capabilities.classes.iter().any(|c| c.name == "Widget"));
        assert!(capabilities.functions.iter().any(|f| f.name == "render"));
        assert_eq!(capabilities.constants, vec!["MAX_SIZE"]);
        assert_eq!(capabilities.imports, vec!["#include <vector>"]);
        assert!(capabilities.has_entry_point);
        assert!(capabilities.keywords.contains("class"));
        assert!(capabilities.complexity_score > 0);
    }

    #[test]
    fn test_analysis_learns_patterns() {
        let memory = MemoryStore::in_memory().unwrap();
        let analyzer = CppAnalyzer::new();
        analyzer
            .analyze_file(Path::new("src/widget.cpp"), "const const int x = 1;\n", &memory)
            .unwrap();
        assert!(memory.count("cpp").unwrap() >= 1);
    }
}
