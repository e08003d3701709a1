//! Vector index over record ids
//!
//! USearch HNSW index with cosine metric. Keys are the memory record ids,
//! so a hit maps straight back to a SQL row. The index lives only in
//! memory; it is rebuilt from stored records on first use after startup.

use usearch::{Index, IndexOptions, MetricKind, ScalarKind};

#[cfg(feature = "embeddings")]
use crate::embeddings::EMBEDDING_DIMENSIONS;

/// Dimensionality fallback when built without the embedder
#[cfg(not(feature = "embeddings"))]
const EMBEDDING_DIMENSIONS: usize = 384;

/// HNSW connectivity parameter (higher = better recall, more memory)
const DEFAULT_CONNECTIVITY: usize = 16;

/// HNSW expansion factor for index building
const DEFAULT_EXPANSION_ADD: usize = 128;

/// HNSW expansion factor for search
const DEFAULT_EXPANSION_SEARCH: usize = 64;

// ============================================================================
// ERROR TYPES
// ============================================================================

/// Vector search error types
#[non_exhaustive]
#[derive(Debug, Clone, thiserror::Error)]
pub enum VectorSearchError {
    /// Failed to create the index
    #[error("Index creation failed: {0}")]
    IndexCreation(String),
    /// Failed to add a vector
    #[error("Failed to add vector: {0}")]
    IndexAdd(String),
    /// Failed to search
    #[error("Search failed: {0}")]
    IndexSearch(String),
    /// Dimension mismatch
    #[error("Invalid dimensions: expected {0}, got {1}")]
    InvalidDimensions(usize, usize),
}

// ============================================================================
// VECTOR INDEX
// ============================================================================

/// In-memory HNSW index keyed by memory record id
pub struct VectorIndex {
    index: Option<Index>,
    dimensions: usize,
}

impl VectorIndex {
    /// Create an index with the embedder's dimensionality
    ///
    /// A creation failure leaves a permanently-empty index rather than
    /// propagating: vector search is an enhancement, not a dependency.
    pub fn new() -> Self {
        Self::with_dimensions(EMBEDDING_DIMENSIONS)
    }

    /// Create an index for a specific dimensionality
    pub fn with_dimensions(dimensions: usize) -> Self {
        let options = IndexOptions {
            dimensions,
            metric: MetricKind::Cos,
            quantization: ScalarKind::F32,
            connectivity: DEFAULT_CONNECTIVITY,
            expansion_add: DEFAULT_EXPANSION_ADD,
            expansion_search: DEFAULT_EXPANSION_SEARCH,
            multi: false,
        };

        let index = match Index::new(&options) {
            Ok(index) => Some(index),
            Err(e) => {
                tracing::warn!(error = %e, "vector index unavailable, search degrades to text");
                None
            }
        };

        Self { index, dimensions }
    }

    /// Number of vectors currently indexed
    pub fn len(&self) -> usize {
        self.index.as_ref().map(|i| i.size()).unwrap_or(0)
    }

    /// Whether the index holds no vectors
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Index a vector under a record id, growing capacity as needed
    pub fn add(&mut self, id: u64, vector: &[f32]) -> Result<(), VectorSearchError> {
        if vector.len() != self.dimensions {
            return Err(VectorSearchError::InvalidDimensions(
                self.dimensions,
                vector.len(),
            ));
        }
        let index = self
            .index
            .as_ref()
            .ok_or_else(|| VectorSearchError::IndexCreation("index unavailable".into()))?;

        // usearch requires reserve() ahead of add()
        if index.size() >= index.capacity() {
            let new_capacity = std::cmp::max(index.capacity() * 2, 16);
            index
                .reserve(new_capacity)
                .map_err(|e| VectorSearchError::IndexAdd(e.to_string()))?;
        }

        index
            .add(id, vector)
            .map_err(|e| VectorSearchError::IndexAdd(e.to_string()))?;
        Ok(())
    }

    /// Drop a record's vector; missing ids are fine
    pub fn remove(&mut self, id: u64) {
        if let Some(index) = self.index.as_ref() {
            let _ = index.remove(id);
        }
    }

    /// Nearest neighbors as `(record_id, cosine_similarity)` pairs
    pub fn search(&self, query: &[f32], limit: usize) -> Result<Vec<(u64, f32)>, VectorSearchError> {
        if query.len() != self.dimensions {
            return Err(VectorSearchError::InvalidDimensions(
                self.dimensions,
                query.len(),
            ));
        }
        let index = match self.index.as_ref() {
            Some(index) if index.size() > 0 => index,
            _ => return Ok(vec![]),
        };

        let results = index
            .search(query, limit)
            .map_err(|e| VectorSearchError::IndexSearch(e.to_string()))?;

        Ok(results
            .keys
            .iter()
            .zip(results.distances.iter())
            .map(|(key, distance)| (*key, 1.0 - distance))
            .collect())
    }
}

impl Default for VectorIndex {
    fn default() -> Self {
        Self::new()
    }
}
