//! Recursive analysis engine
//!
//! Walks a project tree in batches, dispatches files to language
//! analyzers, learns from every pass, and stays restartable: prior
//! iteration records are read back from memory so repeated runs compound
//! instead of starting over.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use globset::{Glob, GlobSet, GlobSetBuilder};
use once_cell::sync::Lazy;
use serde_json::json;
use walkdir::WalkDir;

use crate::analyzers::AnalyzerRegistry;
use crate::memory::{StoreInput, ENGINE_NAMESPACE};
use crate::storage::{MemoryStore, StorageError};

use super::{Issue, Severity};

// ============================================================================
// CONSTANTS
// ============================================================================

/// Files above this size are skipped (inclusive boundary: exactly 1 MiB runs)
pub const MAX_FILE_SIZE: u64 = 1024 * 1024;

/// Default batch size
pub const DEFAULT_BATCH_SIZE: usize = 50;

/// Issue count at which a file is reported as a hotspot in the
/// cross-file correlation pass
const HOTSPOT_ISSUE_THRESHOLD: usize = 15;

/// Soft per-file analysis budget; exceeding it is logged, not fatal
const PER_FILE_SOFT_TIMEOUT: std::time::Duration = std::time::Duration::from_secs(5);

/// Directory names never descended into
const EXCLUDED_DIRS: &[&str] = &[
    "venv",
    ".venv",
    "env",
    "virtualenv",
    "__pycache__",
    ".git",
    "build",
    "dist",
    "node_modules",
    ".pytest_cache",
    ".tox",
    "site-packages",
    "target",
];

static EXCLUDE_SET: Lazy<GlobSet> = Lazy::new(|| {
    let mut builder = GlobSetBuilder::new();
    for dir in EXCLUDED_DIRS {
        builder.add(Glob::new(dir).expect("exclude glob is valid"));
    }
    builder.build().expect("exclude set builds")
});

// ============================================================================
// ERROR TYPES
// ============================================================================

/// Engine error type
#[non_exhaustive]
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// The project root does not exist or is not a directory
    #[error("Project path is not a directory: {0}")]
    InvalidRoot(PathBuf),
    /// Memory store failure
    #[error("Memory store error: {0}")]
    Storage(#[from] StorageError),
    /// The run was cancelled
    #[error("Analysis cancelled")]
    Cancelled,
}

/// Engine result type
pub type Result<T> = std::result::Result<T, EngineError>;

// ============================================================================
// CONFIG & REPORT
// ============================================================================

/// Engine configuration
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Files analyzed per batch
    pub batch_size: usize,
    /// Directory depth limit; `None` walks the whole tree
    pub max_depth: Option<usize>,
    /// Skip files larger than this many bytes
    pub max_file_size: u64,
    /// Worker threads for batch processing; 1 keeps runs deterministic
    pub parallel_batches: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            batch_size: DEFAULT_BATCH_SIZE,
            max_depth: None,
            max_file_size: MAX_FILE_SIZE,
            parallel_batches: 1,
        }
    }
}

/// Result of one analysis iteration
#[derive(Debug, Clone)]
pub struct IterationReport {
    /// Iteration number, counted across restarts
    pub iteration: u64,
    /// All issues found, in batch-submission order
    pub issues: Vec<Issue>,
    /// Files analyzed
    pub files_processed: usize,
    /// Files skipped (size, decoding, analyzer errors)
    pub files_skipped: usize,
    /// Batches submitted
    pub batches_processed: usize,
    /// Mean improvements per prior iteration, when history exists
    pub average_prior_improvements: Option<f64>,
    /// Wall-clock duration
    pub duration_seconds: f64,
}

// ============================================================================
// ENGINE
// ============================================================================

/// Memory-enhanced recursive analysis engine
pub struct RecursiveEngine<'a> {
    registry: AnalyzerRegistry,
    memory: &'a MemoryStore,
    config: EngineConfig,
    cancel: Arc<AtomicBool>,
}

impl<'a> RecursiveEngine<'a> {
    /// Engine with the default analyzer registry
    pub fn new(memory: &'a MemoryStore, config: EngineConfig) -> Self {
        Self::with_registry(memory, config, AnalyzerRegistry::with_defaults())
    }

    /// Engine with a caller-supplied registry
    pub fn with_registry(
        memory: &'a MemoryStore,
        config: EngineConfig,
        registry: AnalyzerRegistry,
    ) -> Self {
        Self {
            registry,
            memory,
            config,
            cancel: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Token that interrupts the walk between files and between batches
    pub fn cancel_token(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.cancel)
    }

    fn cancelled(&self) -> bool {
        self.cancel.load(Ordering::Relaxed)
    }

    /// Run one full analysis iteration over the project
    pub fn analyze_project(&self, project_root: &Path) -> Result<IterationReport> {
        if !project_root.is_dir() {
            return Err(EngineError::InvalidRoot(project_root.to_path_buf()));
        }

        let started = Instant::now();
        let iteration = self.next_iteration_number();
        let average_prior_improvements = self.average_prior_improvements();

        self.memory.store(
            StoreInput::new(
                ENGINE_NAMESPACE,
                format!("Starting improvement iteration {iteration}"),
            )
            .with_metadata(json!({
                "iteration": iteration,
                "batch_size": self.config.batch_size,
                "session_type": "improvement_iteration",
            })),
        )?;

        let (targets, mut files_skipped) = self.find_target_files(project_root);
        tracing::info!(
            files = targets.len(),
            batch_size = self.config.batch_size,
            "processing project in batches"
        );

        let batches: Vec<&[PathBuf]> = targets.chunks(self.config.batch_size.max(1)).collect();
        let batch_results = if self.config.parallel_batches > 1 {
            self.run_batches_parallel(&batches)
        } else {
            self.run_batches_serial(&batches)
        };
        if self.cancelled() {
            return Err(EngineError::Cancelled);
        }

        let mut issues: Vec<Issue> = Vec::new();
        let mut per_file_counts: HashMap<String, usize> = HashMap::new();
        let mut files_processed = 0usize;
        let batches_processed = batch_results.len();

        // Aggregate in batch-submission order regardless of worker timing
        for batch in batch_results {
            files_processed += batch.files_processed;
            files_skipped += batch.files_skipped;
            per_file_counts.extend(batch.per_file_counts);
            issues.extend(batch.issues);
        }

        // Cross-file correlation pass over the accumulated set
        issues.extend(self.hotspot_issues(&per_file_counts));

        let duration_seconds = started.elapsed().as_secs_f64();

        self.memory.store(
            StoreInput::new(
                ENGINE_NAMESPACE,
                format!("Full project iteration {iteration} complete"),
            )
            .with_metadata(json!({
                "iteration": iteration,
                "improvements_found": issues.len(),
                "files_processed": files_processed,
                "batches_processed": batches_processed,
                "duration_seconds": duration_seconds,
                "session_type": "iteration_complete",
            })),
        )?;

        tracing::info!(
            files = files_processed,
            issues = issues.len(),
            batches = batches_processed,
            "analysis iteration complete"
        );

        Ok(IterationReport {
            iteration,
            issues,
            files_processed,
            files_skipped,
            batches_processed,
            average_prior_improvements,
            duration_seconds,
        })
    }

    // ========================================================================
    // BATCH EXECUTION
    // ========================================================================

    fn run_batches_serial(&self, batches: &[&[PathBuf]]) -> Vec<BatchResult> {
        let mut results = Vec::with_capacity(batches.len());
        for (index, batch) in batches.iter().enumerate() {
            if self.cancelled() {
                break;
            }
            results.push(self.process_batch(index + 1, batch));
        }
        results
    }

    /// Bounded worker pool over the batch list
    ///
    /// Workers claim batch indices from a shared counter; results land in
    /// their submission slots so aggregation order never depends on
    /// scheduling.
    fn run_batches_parallel(&self, batches: &[&[PathBuf]]) -> Vec<BatchResult> {
        use std::sync::atomic::AtomicUsize;

        let workers = self.config.parallel_batches.min(batches.len().max(1));
        let next = AtomicUsize::new(0);
        let slots: Vec<std::sync::Mutex<Option<BatchResult>>> =
            (0..batches.len()).map(|_| std::sync::Mutex::new(None)).collect();

        std::thread::scope(|scope| {
            for _ in 0..workers {
                scope.spawn(|| loop {
                    let index = next.fetch_add(1, Ordering::SeqCst);
                    if index >= batches.len() || self.cancelled() {
                        break;
                    }
                    let result = self.process_batch(index + 1, batches[index]);
                    *slots[index].lock().expect("batch slot lock poisoned") = Some(result);
                });
            }
        });

        slots
            .into_iter()
            .filter_map(|slot| slot.into_inner().expect("batch slot lock poisoned"))
            .collect()
    }

    /// Analyze one batch of files and remember its summary
    fn process_batch(&self, batch_number: usize, batch: &[PathBuf]) -> BatchResult {
        let mut result = BatchResult::default();

        for file in batch {
            if self.cancelled() {
                break;
            }
            match self.analyze_file(file) {
                Some(file_issues) => {
                    result.files_processed += 1;
                    result
                        .per_file_counts
                        .insert(file.display().to_string(), file_issues.len());
                    result.issues.extend(file_issues);
                }
                None => result.files_skipped += 1,
            }
        }

        if !result.issues.is_empty() {
            let sample: Vec<&str> = result
                .issues
                .iter()
                .take(3)
                .map(|issue| issue.description.as_str())
                .collect();
            let record = StoreInput::new(
                ENGINE_NAMESPACE,
                format!("Batch {batch_number} analysis complete"),
            )
            .with_metadata(json!({
                "batch_number": batch_number,
                "files_in_batch": batch.len(),
                "issue_count": result.issues.len(),
                "sample_patterns": sample,
            }));
            if let Err(e) = self.memory.store(record) {
                tracing::warn!(batch_number, error = %e, "batch summary not recorded");
            }
        }

        result
    }

    // ========================================================================
    // FILE DISCOVERY
    // ========================================================================

    /// Candidate files under the root: analyzable extension, not excluded,
    /// within the size cap. Returns (targets, skipped_count).
    fn find_target_files(&self, project_root: &Path) -> (Vec<PathBuf>, usize) {
        let mut walker = WalkDir::new(project_root).sort_by_file_name();
        if let Some(depth) = self.config.max_depth {
            walker = walker.max_depth(depth);
        }

        let mut targets = Vec::new();
        let mut skipped = 0usize;

        let iter = walker.into_iter().filter_entry(|entry| {
            !(entry.file_type().is_dir()
                && entry
                    .file_name()
                    .to_str()
                    .map(|name| EXCLUDE_SET.is_match(name))
                    .unwrap_or(false))
        });

        for entry in iter {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    tracing::warn!(error = %e, "walk error, entry skipped");
                    continue;
                }
            };
            if !entry.file_type().is_file() {
                continue;
            }
            if self.registry.analyzer_for(entry.path()).is_none() {
                continue;
            }
            match entry.metadata() {
                Ok(metadata) if metadata.len() > self.config.max_file_size => {
                    tracing::info!(
                        file = %entry.path().display(),
                        size = metadata.len(),
                        "skipping oversized file"
                    );
                    skipped += 1;
                }
                Ok(_) => targets.push(entry.path().to_path_buf()),
                Err(e) => {
                    tracing::warn!(file = %entry.path().display(), error = %e, "stat failed");
                    skipped += 1;
                }
            }
        }

        (targets, skipped)
    }

    // ========================================================================
    // PER-FILE ANALYSIS
    // ========================================================================

    /// Analyze one file; `None` means it was skipped (unreadable,
    /// undecodable, or the analyzer failed)
    fn analyze_file(&self, path: &Path) -> Option<Vec<Issue>> {
        let started = Instant::now();
        let result = self.analyze_file_inner(path);
        if started.elapsed() > PER_FILE_SOFT_TIMEOUT {
            tracing::warn!(
                file = %path.display(),
                elapsed_ms = started.elapsed().as_millis() as u64,
                "per-file analysis exceeded the soft budget"
            );
        }
        result
    }

    fn analyze_file_inner(&self, path: &Path) -> Option<Vec<Issue>> {
        let analyzer = self.registry.analyzer_for(path)?;

        let bytes = match std::fs::read(path) {
            Ok(bytes) => bytes,
            Err(e) => {
                tracing::warn!(file = %path.display(), error = %e, "read failed, file skipped");
                return None;
            }
        };

        let result = if analyzer.handles_binary() {
            analyzer.analyze_bytes(path, &bytes, self.memory)
        } else {
            let content = match decode_text(&bytes) {
                Some((content, encoding)) => {
                    if encoding != "utf-8" {
                        tracing::debug!(file = %path.display(), encoding, "non-utf8 decode");
                    }
                    content
                }
                None => {
                    tracing::warn!(
                        file = %path.display(),
                        "could not decode file with any supported encoding"
                    );
                    return None;
                }
            };
            analyzer.analyze_file(path, &content, self.memory)
        };

        match result {
            Ok(issues) => Some(dedup_issues(issues)),
            Err(e) => {
                tracing::warn!(file = %path.display(), error = %e, "analyzer failed, file skipped");
                None
            }
        }
    }

    /// Cross-file pass: files whose issue density marks them as hotspots
    fn hotspot_issues(&self, per_file_counts: &HashMap<String, usize>) -> Vec<Issue> {
        let mut hotspots: Vec<(&String, usize)> = per_file_counts
            .iter()
            .filter(|(_, &count)| count >= HOTSPOT_ISSUE_THRESHOLD)
            .map(|(file, &count)| (file, count))
            .collect();
        hotspots.sort();

        hotspots
            .into_iter()
            .map(|(file, count)| {
                Issue::new(
                    file.clone(),
                    "hotspot_file",
                    Severity::Info,
                    format!("File accumulated {count} issues in one pass"),
                )
                .with_suggestion("Concentrated issues often share one root cause")
                .with_extra("engine_issue_count", json!(count))
            })
            .collect()
    }

    // ========================================================================
    // RESTARTABILITY
    // ========================================================================

    /// Iteration number continues across process restarts
    fn next_iteration_number(&self) -> u64 {
        match self.memory.search(ENGINE_NAMESPACE, "Starting improvement iteration", 10_000, 0.5) {
            Ok(records) => records.len() as u64 + 1,
            Err(e) => {
                tracing::warn!(error = %e, "could not read iteration history");
                1
            }
        }
    }

    /// Mean improvements per completed prior iteration
    fn average_prior_improvements(&self) -> Option<f64> {
        let records = self
            .memory
            .search(ENGINE_NAMESPACE, "iteration", 100, 0.5)
            .ok()?;
        let counts: Vec<f64> = records
            .iter()
            .filter(|r| r.meta_str("session_type") == Some("iteration_complete"))
            .filter_map(|r| r.meta_f64("improvements_found"))
            .collect();
        if counts.is_empty() {
            return None;
        }
        Some(counts.iter().sum::<f64>() / counts.len() as f64)
    }
}

/// Accumulated results for one batch
#[derive(Default)]
struct BatchResult {
    issues: Vec<Issue>,
    per_file_counts: HashMap<String, usize>,
    files_processed: usize,
    files_skipped: usize,
}

// ============================================================================
// DECODING
// ============================================================================

/// Decode file bytes: UTF-8 first, then the legacy single-byte encodings
///
/// Returns the text and the encoding that produced it. Single-byte
/// decoding cannot fail structurally, so in practice only an empty read
/// falls through; the ladder still reports which leg matched.
pub fn decode_text(bytes: &[u8]) -> Option<(String, &'static str)> {
    if let Ok(text) = std::str::from_utf8(bytes) {
        return Some((text.to_string(), "utf-8"));
    }

    let (text, _, had_errors) = encoding_rs::WINDOWS_1252.decode(bytes);
    if !had_errors {
        return Some((text.into_owned(), "windows-1252"));
    }

    let text = encoding_rs::mem::decode_latin1(bytes);
    Some((text.into_owned(), "latin-1"))
}

/// Collapse duplicate detections of the same `(file, line, type)`,
/// keeping the more severe entry and the original order
fn dedup_issues(issues: Vec<Issue>) -> Vec<Issue> {
    let mut seen: HashMap<(String, Option<u32>, String), usize> = HashMap::new();
    let mut result: Vec<Issue> = Vec::with_capacity(issues.len());

    for issue in issues {
        match seen.get(&issue.dedup_key()) {
            Some(&index) => {
                if issue.severity.rank() > result[index].severity.rank() {
                    result[index] = issue;
                }
            }
            None => {
                seen.insert(issue.dedup_key(), result.len());
                result.push(issue);
            }
        }
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn write(root: &Path, rel: &str, content: &str) {
        let path = root.join(rel);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, content).unwrap();
    }

    fn run(root: &Path) -> IterationReport {
        let memory = MemoryStore::in_memory().unwrap();
        RecursiveEngine::new(&memory, EngineConfig::default())
            .analyze_project(root)
            .unwrap()
    }

    #[test]
    fn test_analyzes_project_and_finds_issues() {
        let dir = TempDir::new().unwrap();
        write(dir.path(), "app.py", "try:\n    go()\nexcept:\n    pass\n");
        write(dir.path(), "lib.cpp", "const const int x = 1;\n");

        let report = run(dir.path());
        assert_eq!(report.files_processed, 2);
        assert!(report.issues.iter().any(|i| i.issue_type == "bare_except"));
        assert!(report.issues.iter().any(|i| i.issue_type == "cpp_const_duplication"));
    }

    #[test]
    fn test_skips_excluded_directories() {
        let dir = TempDir::new().unwrap();
        write(dir.path(), "app.py", "print('x')\n");
        write(dir.path(), "venv/lib.py", "except:\n");
        write(dir.path(), "node_modules/dep.py", "except:\n");
        write(dir.path(), ".git/hook.py", "except:\n");

        let report = run(dir.path());
        assert_eq!(report.files_processed, 1);
        assert!(report.issues.iter().all(|i| !i.file_path.contains("venv")));
    }

    #[test]
    fn test_file_size_boundary() {
        let dir = TempDir::new().unwrap();

        // Exactly 1 MiB: included
        let exactly = "#".repeat(MAX_FILE_SIZE as usize);
        write(dir.path(), "exact.py", &exactly);

        // One byte over: skipped
        let over = "#".repeat(MAX_FILE_SIZE as usize + 1);
        write(dir.path(), "over.py", &over);

        let report = run(dir.path());
        assert_eq!(report.files_processed, 1);
        assert_eq!(report.files_skipped, 1);
    }

    #[test]
    fn test_unmatched_extensions_are_ignored() {
        let dir = TempDir::new().unwrap();
        write(dir.path(), "README.md", "# TODO nothing\n");
        write(dir.path(), "notes.txt", "except:\n");

        let report = run(dir.path());
        assert_eq!(report.files_processed, 0);
        assert!(report.issues.is_empty());
    }

    #[test]
    fn test_latin1_content_is_decoded_not_skipped() {
        let dir = TempDir::new().unwrap();
        // 0xE9 is é in Latin-1 and invalid standalone UTF-8
        let bytes = b"# caf\xe9\nexcept:\n";
        fs::write(dir.path().join("legacy.py"), bytes).unwrap();

        let report = run(dir.path());
        assert_eq!(report.files_processed, 1);
        assert!(report.issues.iter().any(|i| i.issue_type == "bare_except"));
    }

    #[test]
    fn test_iteration_number_survives_restart() {
        let dir = TempDir::new().unwrap();
        write(dir.path(), "app.py", "print('x')\n");

        let memory = MemoryStore::in_memory().unwrap();
        let first = RecursiveEngine::new(&memory, EngineConfig::default())
            .analyze_project(dir.path())
            .unwrap();
        // Fresh engine over the same store: history carries forward
        let second = RecursiveEngine::new(&memory, EngineConfig::default())
            .analyze_project(dir.path())
            .unwrap();

        assert_eq!(first.iteration, 1);
        assert_eq!(second.iteration, 2);
        assert!(second.average_prior_improvements.is_some());
    }

    #[test]
    fn test_reanalysis_is_stable() {
        let dir = TempDir::new().unwrap();
        write(dir.path(), "app.py", "# TODO cleanup\nexcept:\n");

        let memory = MemoryStore::in_memory().unwrap();
        let engine = RecursiveEngine::new(&memory, EngineConfig::default());
        let first = engine.analyze_project(dir.path()).unwrap();
        let second = engine.analyze_project(dir.path()).unwrap();

        let kinds = |report: &IterationReport| {
            let mut v: Vec<(String, Option<u32>, String)> = report
                .issues
                .iter()
                .filter(|i| !i.learned_from_memory)
                .map(|i| i.dedup_key())
                .collect();
            v.sort();
            v
        };
        assert_eq!(kinds(&first), kinds(&second));
    }

    #[test]
    fn test_cancellation_between_batches() {
        let dir = TempDir::new().unwrap();
        write(dir.path(), "app.py", "print('x')\n");

        let memory = MemoryStore::in_memory().unwrap();
        let engine = RecursiveEngine::new(&memory, EngineConfig::default());
        engine.cancel_token().store(true, Ordering::Relaxed);

        assert!(matches!(
            engine.analyze_project(dir.path()),
            Err(EngineError::Cancelled)
        ));
    }

    #[test]
    fn test_batching_counts() {
        let dir = TempDir::new().unwrap();
        for i in 0..7 {
            write(dir.path(), &format!("m{i}.py"), "print('x')\n");
        }

        let memory = MemoryStore::in_memory().unwrap();
        let config = EngineConfig {
            batch_size: 3,
            ..EngineConfig::default()
        };
        let report = RecursiveEngine::new(&memory, config)
            .analyze_project(dir.path())
            .unwrap();

        assert_eq!(report.files_processed, 7);
        assert_eq!(report.batches_processed, 3);
    }

    #[test]
    fn test_parallel_batches_match_serial_results() {
        let dir = TempDir::new().unwrap();
        for i in 0..12 {
            write(
                dir.path(),
                &format!("m{i}.py"),
                "# TODO item\nexcept:\n",
            );
        }

        let run_with = |parallel_batches: usize| {
            let memory = MemoryStore::in_memory().unwrap();
            let config = EngineConfig {
                batch_size: 3,
                parallel_batches,
                ..EngineConfig::default()
            };
            let report = RecursiveEngine::new(&memory, config)
                .analyze_project(dir.path())
                .unwrap();
            let mut keys: Vec<_> = report.issues.iter().map(|i| i.dedup_key()).collect();
            keys.sort();
            (report.files_processed, report.batches_processed, keys)
        };

        let serial = run_with(1);
        let parallel = run_with(4);
        assert_eq!(serial, parallel);
        assert_eq!(serial.0, 12);
        assert_eq!(serial.1, 4);
    }

    #[test]
    fn test_dedup_keeps_higher_severity() {
        let issues = vec![
            Issue::new("a.py", "x", Severity::Low, "first").at_line(3),
            Issue::new("a.py", "x", Severity::High, "second").at_line(3),
            Issue::new("a.py", "x", Severity::Medium, "third").at_line(4),
        ];
        let deduped = dedup_issues(issues);
        assert_eq!(deduped.len(), 2);
        assert_eq!(deduped[0].severity, Severity::High);
        assert_eq!(deduped[1].line, Some(4));
    }

    #[test]
    fn test_invalid_root() {
        let memory = MemoryStore::in_memory().unwrap();
        let engine = RecursiveEngine::new(&memory, EngineConfig::default());
        assert!(matches!(
            engine.analyze_project(Path::new("/definitely/not/here")),
            Err(EngineError::InvalidRoot(_))
        ));
    }

    #[test]
    fn test_decode_ladder() {
        assert_eq!(decode_text(b"plain ascii").unwrap().1, "utf-8");
        assert_eq!(decode_text("héllo".as_bytes()).unwrap().1, "utf-8");
        assert_eq!(decode_text(b"caf\xe9").unwrap().1, "windows-1252");
        assert_eq!(decode_text(b"caf\xe9").unwrap().0, "café");
    }
}
