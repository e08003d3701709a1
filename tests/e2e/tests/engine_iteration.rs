//! Engine iteration behavior
//!
//! Batching, the size boundary, encoding fallbacks, exclusion rules,
//! and restartability across engine instances sharing one store.

use fixpoint_core::analysis::{EngineConfig, EngineError, RecursiveEngine};
use fixpoint_core::memory::ENGINE_NAMESPACE;
use fixpoint_core::storage::MemoryStore;
use fixpoint_e2e::TestProject;

#[test]
fn one_mebibyte_boundary_is_inclusive() {
    let project = TestProject::new();
    project.file("exact.py", &"#".repeat(1024 * 1024));
    project.file("over.py", &"#".repeat(1024 * 1024 + 1));

    let memory = MemoryStore::in_memory().unwrap();
    let engine = RecursiveEngine::new(&memory, EngineConfig::default());
    let report = engine.analyze_project(project.root()).unwrap();

    assert_eq!(report.files_processed, 1, "exactly 1 MiB is analyzed");
    assert_eq!(report.files_skipped, 1, "1 MiB + 1 byte is skipped");
}

#[test]
fn batches_partition_the_file_set() {
    let project = TestProject::new();
    for i in 0..23 {
        project.file(&format!("module_{i:02}.py"), "print('x')\n");
    }

    let memory = MemoryStore::in_memory().unwrap();
    let config = EngineConfig {
        batch_size: 10,
        ..EngineConfig::default()
    };
    let report = RecursiveEngine::new(&memory, config)
        .analyze_project(project.root())
        .unwrap();

    assert_eq!(report.files_processed, 23);
    assert_eq!(report.batches_processed, 3);

    // Batch summaries were remembered
    let batch_records = memory
        .search(ENGINE_NAMESPACE, "analysis complete", 50, 0.5)
        .unwrap();
    assert_eq!(batch_records.len(), 3);
}

#[test]
fn legacy_encoded_files_are_analyzed_not_skipped() {
    let project = TestProject::new();
    // Latin-1 comment byte, invalid as standalone UTF-8
    project.bytes("legacy.py", b"# r\xe9sum\xe9 parser\nexcept:\n");

    let memory = MemoryStore::in_memory().unwrap();
    let report = RecursiveEngine::new(&memory, EngineConfig::default())
        .analyze_project(project.root())
        .unwrap();

    assert_eq!(report.files_processed, 1);
    assert!(report.issues.iter().any(|i| i.issue_type == "bare_except"));
}

#[test]
fn excluded_directories_are_never_entered() {
    let project = TestProject::new();
    project.file("src/app.py", "except:\n");
    for dir in ["venv", ".git", "node_modules", "__pycache__", "build", ".tox"] {
        project.file(&format!("{dir}/planted.py"), "except:\n");
    }

    let memory = MemoryStore::in_memory().unwrap();
    let report = RecursiveEngine::new(&memory, EngineConfig::default())
        .analyze_project(project.root())
        .unwrap();

    assert_eq!(report.files_processed, 1);
    assert!(report
        .issues
        .iter()
        .all(|issue| issue.file_path.contains("src")));
}

#[test]
fn iteration_history_compounds_across_engine_instances() {
    let project = TestProject::new();
    project.file("app.py", "# TODO one\n# TODO two\n");

    let memory = MemoryStore::in_memory().unwrap();

    let first = RecursiveEngine::new(&memory, EngineConfig::default())
        .analyze_project(project.root())
        .unwrap();
    assert_eq!(first.iteration, 1);
    assert!(first.average_prior_improvements.is_none());

    // A brand-new engine over the same store continues the numbering and
    // sees the historical average
    let second = RecursiveEngine::new(&memory, EngineConfig::default())
        .analyze_project(project.root())
        .unwrap();
    assert_eq!(second.iteration, 2);
    let average = second.average_prior_improvements.unwrap();
    assert!((average - first.issues.len() as f64).abs() < 1e-9);
}

#[test]
fn cancellation_stops_between_batches() {
    let project = TestProject::new();
    project.file("app.py", "print('x')\n");

    let memory = MemoryStore::in_memory().unwrap();
    let engine = RecursiveEngine::new(&memory, EngineConfig::default());
    engine
        .cancel_token()
        .store(true, std::sync::atomic::Ordering::Relaxed);

    assert!(matches!(
        engine.analyze_project(project.root()),
        Err(EngineError::Cancelled)
    ));
}

#[test]
fn issues_within_a_file_preserve_source_order() {
    let project = TestProject::new();
    project.file(
        "ordered.py",
        "# TODO first\nx = 1\n# FIXME second\ny = 2\nexcept:\n",
    );

    let memory = MemoryStore::in_memory().unwrap();
    let report = RecursiveEngine::new(&memory, EngineConfig::default())
        .analyze_project(project.root())
        .unwrap();

    let lines: Vec<u32> = report
        .issues
        .iter()
        .filter(|issue| issue.file_path.ends_with("ordered.py"))
        .filter_map(|issue| issue.line)
        .collect();
    let mut sorted = lines.clone();
    sorted.sort();
    assert_eq!(lines, sorted);
}

#[test]
fn missing_project_root_is_an_input_error() {
    let memory = MemoryStore::in_memory().unwrap();
    let engine = RecursiveEngine::new(&memory, EngineConfig::default());
    assert!(matches!(
        engine.analyze_project(std::path::Path::new("/no/such/tree")),
        Err(EngineError::InvalidRoot(_))
    ));
}
