//! Embeddings module - optional local semantic encoding
//!
//! Enabled with the `embeddings` feature and killable at runtime via
//! `FIXPOINT_DISABLE_EMBEDDINGS`. Every caller must tolerate absence:
//! a missing or failing embedder degrades search to text-only and never
//! fails a write.

mod local;

pub use local::{
    cosine_similarity, EmbeddingError, EmbeddingService, EMBEDDING_DIMENSIONS, MAX_TEXT_LENGTH,
};
