//! Command implementations
//!
//! Each subcommand lives in its own module and returns `anyhow::Result`;
//! the binary maps errors to exit codes in one place.

pub mod analyze;
pub mod cycle;
pub mod fix;
pub mod prune;
pub mod stats;
pub mod train;

use std::path::Path;

use anyhow::Context;
use fixpoint_core::storage::MemoryStore;
use fixpoint_core::Issue;

/// Open the shared memory store (honors `FIXPOINT_DB`)
pub fn open_store() -> anyhow::Result<MemoryStore> {
    MemoryStore::new(None).context("opening memory store")
}

/// Load an issues file written by `analyze`
pub fn load_issues(path: &Path) -> anyhow::Result<Vec<Issue>> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("reading issues file {}", path.display()))?;
    serde_json::from_str(&raw)
        .with_context(|| format!("parsing issues file {}", path.display()))
}
