//! # Fixpoint Core
//!
//! Recursive code-analysis engine with persistent pattern memory and a
//! defense-in-depth fix pipeline:
//!
//! - **Memory store**: namespaced SQLite records with hybrid
//!   keyword/vector search; learned patterns survive across runs
//! - **Pruning**: age/quality/redundancy strategies that compress
//!   over-represented patterns while preserving diversity
//! - **Analyzers**: extension-dispatched detectors for Python, the
//!   C/C++ family, and binary formats
//! - **Engine**: batched, restartable project traversal that learns
//!   from every iteration
//! - **Fix pipeline**: safety scoring, approval, emergency pattern
//!   validation, sandboxed build/run checks, and atomic application
//!   with rollback - fail-closed at every gate
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use fixpoint_core::analysis::{EngineConfig, RecursiveEngine};
//! use fixpoint_core::storage::MemoryStore;
//!
//! let memory = MemoryStore::new(None)?;
//! let engine = RecursiveEngine::new(&memory, EngineConfig::default());
//! let report = engine.analyze_project(std::path::Path::new("."))?;
//! println!("{} issues in {} files", report.issues.len(), report.files_processed);
//! ```
//!
//! ## Feature Flags
//!
//! - `embeddings` (default): local embedding generation with fastembed
//! - `vector-search` (default): HNSW vector search with USearch
//! - `bundled-sqlite` (default): compile SQLite in
//! - `full`: embeddings + vector-search

#![cfg_attr(docsrs, feature(doc_cfg))]

// ============================================================================
// MODULES
// ============================================================================

pub mod analysis;
pub mod analyzers;
pub mod config;
pub mod fixing;
pub mod memory;
pub mod pruning;
pub mod storage;

pub mod search;

#[cfg(feature = "embeddings")]
#[cfg_attr(docsrs, doc(cfg(feature = "embeddings")))]
pub mod embeddings;

// ============================================================================
// RE-EXPORTS
// ============================================================================

pub use analysis::{
    EngineConfig, FileContext, Issue, IterationReport, RecursiveEngine, Severity,
};
pub use analyzers::{AnalyzerRegistry, LanguageAnalyzer};
pub use fixing::{
    ApprovalMode, FixApplier, FixError, FixProposal, InteractiveApproval, SandboxValidator,
};
pub use memory::{HealthState, MemoryHealth, MemoryRecord, StoreInput};
pub use pruning::{MemoryPruner, PruningConfig, PruningResult, PruningStrategy};
pub use storage::{MemoryStore, StorageError};
