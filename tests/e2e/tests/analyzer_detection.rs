//! Detection scenarios across languages
//!
//! The concrete seeds: off-by-one detection in Python, missing-include
//! detection in C++ with its generated proposal, and the stability of
//! repeated analysis.

use std::path::Path;

use fixpoint_core::analysis::{EngineConfig, RecursiveEngine, Severity};
use fixpoint_core::analyzers::{CppAnalyzer, LanguageAnalyzer};
use fixpoint_core::fixing::{calculate_safety_score, generate_proposals};
use fixpoint_core::storage::MemoryStore;
use fixpoint_e2e::TestProject;

#[test]
fn off_by_one_range_is_detected_with_line_number() {
    let project = TestProject::new();
    project.file(
        "inventory.py",
        "items = load()\nfor i in range(len(items) - 1):\n    ship(items[i])\n",
    );

    let memory = MemoryStore::in_memory().unwrap();
    let engine = RecursiveEngine::new(&memory, EngineConfig::default());
    let report = engine.analyze_project(project.root()).unwrap();

    let issue = report
        .issues
        .iter()
        .find(|issue| issue.issue_type == "off_by_one")
        .expect("off-by-one issue detected");
    assert!(issue.severity.rank() >= Severity::Medium.rank());
    assert_eq!(issue.line, Some(2));
    assert!(issue.file_path.ends_with("inventory.py"));
}

#[test]
fn missing_vector_include_yields_exact_insertion_proposal() {
    let project = TestProject::new();
    project.file(
        "widget.cpp",
        "#include <string>\n\nstd::vector<int> make() { return {}; }\n",
    );

    let memory = MemoryStore::in_memory().unwrap();
    let analyzer = CppAnalyzer::new();
    let content = project.read("widget.cpp");
    let issues = analyzer
        .analyze_file(Path::new("widget.cpp"), &content, &memory)
        .unwrap();

    let missing = issues
        .iter()
        .find(|issue| issue.issue_type == "cpp_missing_include")
        .expect("missing include detected");
    assert_eq!(missing.extra["cpp_fix_content"], "#include <vector>");

    // The proposal inserts exactly the include after the last existing one
    let proposals = generate_proposals(std::slice::from_ref(missing), project.root());
    assert_eq!(proposals.len(), 1);
    let proposal = &proposals[0];
    assert_eq!(proposal.original_code, "#include <string>");
    assert_eq!(proposal.proposed_fix, "#include <string>\n#include <vector>");

    // missing_imports is a disqualified category: never auto-applied
    assert_eq!(calculate_safety_score(proposal), 0.0);
}

#[test]
fn cpp_sibling_languages_share_memory_namespaces() {
    let analyzer = CppAnalyzer::new();
    assert!(analyzer.sibling_languages().contains(&"c"));
    assert!(analyzer.sibling_languages().contains(&"rust"));

    let memory = MemoryStore::in_memory().unwrap();
    memory
        .store(fixpoint_core::StoreInput::new(
            "rust",
            "cpp_missing_include cpp seen before in rust port",
        ))
        .unwrap();

    let patterns = analyzer.similar_patterns("cpp_missing_include", &memory);
    assert!(patterns.iter().any(|p| p.contains("rust port")));
}

#[test]
fn reanalysis_of_unchanged_project_is_stable() {
    let project = TestProject::new();
    project.file(
        "service.py",
        "# TODO: caching\ntry:\n    handle()\nexcept:\n    pass\n",
    );
    project.file("util.cpp", "const const int x = 1;\n");

    let memory = MemoryStore::in_memory().unwrap();
    let engine = RecursiveEngine::new(&memory, EngineConfig::default());

    let keys = |issues: &[fixpoint_core::Issue]| {
        let mut keys: Vec<_> = issues
            .iter()
            .filter(|issue| !issue.learned_from_memory)
            .map(|issue| issue.dedup_key())
            .collect();
        keys.sort();
        keys
    };

    let first = engine.analyze_project(project.root()).unwrap();
    let second = engine.analyze_project(project.root()).unwrap();
    assert_eq!(keys(&first.issues), keys(&second.issues));
}

#[test]
fn binary_files_are_fingerprinted() {
    let project = TestProject::new();
    project.bytes("data.bin", &[0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x01]);

    let memory = MemoryStore::in_memory().unwrap();
    let engine = RecursiveEngine::new(&memory, EngineConfig::default());
    let report = engine.analyze_project(project.root()).unwrap();

    let unknown = report
        .issues
        .iter()
        .find(|issue| issue.issue_type == "binary_unknown_format")
        .expect("unrecognized binary flagged");
    assert!(unknown.extra["binary_sha256"].as_str().unwrap().len() == 64);
}

#[test]
fn mixed_language_project_routes_by_extension() {
    let project = TestProject::new();
    project.file("app.py", "print('debug')\n");
    project.file("engine.cpp", "int* leak = new int(1);\n");
    project.file("notes.txt", "except:\n");

    let memory = MemoryStore::in_memory().unwrap();
    let engine = RecursiveEngine::new(&memory, EngineConfig::default());
    let report = engine.analyze_project(project.root()).unwrap();

    assert!(report.issues.iter().any(|i| i.issue_type == "debugging"));
    assert!(report.issues.iter().any(|i| i.issue_type.starts_with("cpp_")));
    // .txt has no analyzer: its bare except is invisible
    assert!(!report.issues.iter().any(|i| i.file_path.ends_with("notes.txt")));
}
