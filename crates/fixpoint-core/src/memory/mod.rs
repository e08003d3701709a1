//! Memory module - Core types for the persistent pattern store
//!
//! The store keeps learned patterns as flat records partitioned by
//! namespace. Records are written by analyzers and the engine, read by
//! everyone, and mutated only by the pruner.

mod record;

pub use record::{MemoryRecord, StoreInput};

use serde::{Deserialize, Serialize};

// ============================================================================
// HEALTH
// ============================================================================

/// Overall health of the memory store
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthState {
    /// Store and vector index both operational
    Ok,
    /// Store up, but embeddings or vector search unavailable (text-only mode)
    Degraded,
    /// Backing store unreachable
    Down,
}

impl HealthState {
    pub fn as_str(&self) -> &'static str {
        match self {
            HealthState::Ok => "ok",
            HealthState::Degraded => "degraded",
            HealthState::Down => "down",
        }
    }
}

impl std::fmt::Display for HealthState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Health report returned by [`crate::storage::MemoryStore::health`]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryHealth {
    /// Aggregate state
    pub state: HealthState,
    /// Total records across all namespaces
    pub memory_count: usize,
    /// Records with a live vector index entry
    pub vector_count: usize,
    /// Whether the embedding model initialized successfully
    pub embedder_available: bool,
}

// ============================================================================
// NAMESPACES
// ============================================================================

/// Namespace used by the engine for iteration and batch records
pub const ENGINE_NAMESPACE: &str = "recursive_engine";

/// Namespace for user training feedback
pub const USER_FEEDBACK_NAMESPACE: &str = "user_feedback";

/// Namespace for learned false-positive patterns
pub const FALSE_POSITIVE_NAMESPACE: &str = "false_positive_patterns";

/// Namespace for validation outcomes recorded by the fix pipeline
pub const VALIDATION_NAMESPACE: &str = "validation_results";

/// Namespace for improvement-cycle records
pub const CYCLE_NAMESPACE: &str = "improvement_cycles";

/// Namespaces that receive extended retention and lower pruning thresholds
pub const PROTECTED_NAMESPACES: &[&str] = &[
    USER_FEEDBACK_NAMESPACE,
    FALSE_POSITIVE_NAMESPACE,
    VALIDATION_NAMESPACE,
];

/// Whether a namespace is protected from aggressive pruning
pub fn is_protected_namespace(namespace: &str) -> bool {
    PROTECTED_NAMESPACES.contains(&namespace)
}
