//! End-to-end test harness
//!
//! Builders for disposable projects and issue fixtures shared by the
//! test targets. Every project lives in its own temp directory and is
//! removed on drop.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use fixpoint_core::analysis::{FileContext, Issue, Severity};
use fixpoint_core::fixing::FixProposal;
use tempfile::TempDir;

/// A disposable project tree
pub struct TestProject {
    dir: TempDir,
}

impl TestProject {
    pub fn new() -> Self {
        Self {
            dir: TempDir::new().expect("temp project dir"),
        }
    }

    pub fn root(&self) -> &Path {
        self.dir.path()
    }

    /// Write a file, creating parent directories
    pub fn file(&self, rel: &str, content: &str) -> &Self {
        let path = self.dir.path().join(rel);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).expect("create parents");
        }
        std::fs::write(path, content).expect("write file");
        self
    }

    /// Write raw bytes
    pub fn bytes(&self, rel: &str, content: &[u8]) -> &Self {
        let path = self.dir.path().join(rel);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).expect("create parents");
        }
        std::fs::write(path, content).expect("write bytes");
        self
    }

    pub fn read(&self, rel: &str) -> String {
        std::fs::read_to_string(self.dir.path().join(rel)).expect("read file")
    }

    pub fn exists(&self, rel: &str) -> bool {
        self.dir.path().join(rel).exists()
    }

    /// Byte-exact snapshot of every file under the root, keyed by
    /// relative path; used for before/after tree comparisons
    pub fn snapshot(&self) -> BTreeMap<PathBuf, Vec<u8>> {
        let mut snapshot = BTreeMap::new();
        for entry in walk(self.dir.path()) {
            let relative = entry.strip_prefix(self.dir.path()).unwrap().to_path_buf();
            snapshot.insert(relative, std::fs::read(&entry).expect("read for snapshot"));
        }
        snapshot
    }
}

impl Default for TestProject {
    fn default() -> Self {
        Self::new()
    }
}

fn walk(root: &Path) -> Vec<PathBuf> {
    let mut files = Vec::new();
    let mut stack = vec![root.to_path_buf()];
    while let Some(dir) = stack.pop() {
        for entry in std::fs::read_dir(&dir).expect("read dir") {
            let entry = entry.expect("dir entry");
            let path = entry.path();
            if path.is_dir() {
                stack.push(path);
            } else {
                files.push(path);
            }
        }
    }
    files.sort();
    files
}

/// Issue fixture with sane defaults
pub fn issue(file: &str, issue_type: &str, severity: Severity, line: u32) -> Issue {
    Issue::new(file, issue_type, severity, format!("{issue_type} at line {line}")).at_line(line)
}

/// Proposal fixture with sane defaults
pub fn proposal(file: &str, issue_type: &str, severity: Severity) -> FixProposal {
    FixProposal {
        file_path: file.to_string(),
        issue_type: issue_type.to_string(),
        severity,
        description: format!("{issue_type} fix"),
        original_code: "original".to_string(),
        proposed_fix: "proposed".to_string(),
        line_number: 1,
        educational_explanation: String::new(),
        safety_score: 50,
        context: FileContext::Unknown,
        auto_approvable: true,
    }
}
