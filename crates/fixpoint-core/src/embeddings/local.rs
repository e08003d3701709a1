//! Local Semantic Embeddings
//!
//! Uses fastembed for local ONNX inference with the MiniLM sentence
//! encoder. The model is lazily initialized on first use and can be
//! released (and later re-initialized) with [`EmbeddingService::cleanup`].

use std::sync::Mutex;

use fastembed::{EmbeddingModel, InitOptions, TextEmbedding};

// ============================================================================
// CONSTANTS
// ============================================================================

/// Embedding dimensions of all-MiniLM-L6-v2
pub const EMBEDDING_DIMENSIONS: usize = 384;

/// Maximum text length for embedding (truncated if longer)
pub const MAX_TEXT_LENGTH: usize = 8192;

/// Batch size for efficient embedding generation
pub const BATCH_SIZE: usize = 32;

// ============================================================================
// ERROR TYPES
// ============================================================================

/// Embedding error types
#[non_exhaustive]
#[derive(Debug, Clone, thiserror::Error)]
pub enum EmbeddingError {
    /// Failed to initialize the embedding model
    #[error("Model initialization failed: {0}")]
    ModelInit(String),
    /// Failed to generate an embedding
    #[error("Embedding generation failed: {0}")]
    EmbeddingFailed(String),
    /// Invalid input (empty text)
    #[error("Invalid input: {0}")]
    InvalidInput(String),
    /// The embedder is disabled by configuration
    #[error("Embeddings disabled by configuration")]
    Disabled,
}

// ============================================================================
// MODEL STATE
// ============================================================================

enum ModelState {
    /// Not yet initialized (or reset by cleanup)
    Uninit,
    /// Live model
    Ready(TextEmbedding),
    /// Initialization failed; error kept so we do not retry every call
    Failed(String),
}

fn cache_dir() -> std::path::PathBuf {
    if let Ok(path) = std::env::var("FASTEMBED_CACHE_PATH") {
        return std::path::PathBuf::from(path);
    }
    if let Some(proj_dirs) = directories::ProjectDirs::from("dev", "fixpoint", "fixpoint") {
        return proj_dirs.cache_dir().join("fastembed");
    }
    std::path::PathBuf::from(".fastembed_cache")
}

// ============================================================================
// EMBEDDING SERVICE
// ============================================================================

/// Service for generating embeddings
///
/// Holds the model behind a mutex so the service is `Send + Sync` with
/// `&self` methods, matching the store's interior-mutability design.
pub struct EmbeddingService {
    model: Mutex<ModelState>,
    enabled: bool,
}

impl Default for EmbeddingService {
    fn default() -> Self {
        Self::new()
    }
}

impl EmbeddingService {
    /// Create a new service; honors the runtime kill-switch
    pub fn new() -> Self {
        Self {
            model: Mutex::new(ModelState::Uninit),
            enabled: !crate::config::embeddings_disabled(),
        }
    }

    /// A permanently disabled service (text-only stores, tests)
    pub fn disabled() -> Self {
        Self {
            model: Mutex::new(ModelState::Uninit),
            enabled: false,
        }
    }

    /// Whether embeddings are enabled by configuration
    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Whether the model is live (initializes it if needed)
    pub fn is_ready(&self) -> bool {
        if !self.enabled {
            return false;
        }
        let mut state = self.model.lock().expect("embedding model lock poisoned");
        self.ensure_init(&mut state);
        matches!(*state, ModelState::Ready(_))
    }

    /// Embedding dimensionality
    pub fn dimensions(&self) -> usize {
        EMBEDDING_DIMENSIONS
    }

    /// Model identifier
    pub fn model_name(&self) -> &'static str {
        "sentence-transformers/all-MiniLM-L6-v2"
    }

    fn ensure_init(&self, state: &mut ModelState) {
        if matches!(*state, ModelState::Uninit) {
            let dir = cache_dir();
            if let Err(e) = std::fs::create_dir_all(&dir) {
                tracing::warn!(cache_dir = %dir.display(), error = %e, "failed to create embedding cache dir");
            }
            let options = InitOptions::new(EmbeddingModel::AllMiniLML6V2)
                .with_show_download_progress(false)
                .with_cache_dir(dir);
            *state = match TextEmbedding::try_new(options) {
                Ok(model) => ModelState::Ready(model),
                Err(e) => {
                    tracing::warn!(error = %e, "embedding model unavailable, text-only mode");
                    ModelState::Failed(e.to_string())
                }
            };
        }
    }

    /// Generate an embedding for a single text
    pub fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        if !self.enabled {
            return Err(EmbeddingError::Disabled);
        }
        if text.is_empty() {
            return Err(EmbeddingError::InvalidInput("text cannot be empty".into()));
        }

        let mut state = self.model.lock().expect("embedding model lock poisoned");
        self.ensure_init(&mut state);

        let model = match &mut *state {
            ModelState::Ready(model) => model,
            ModelState::Failed(e) => return Err(EmbeddingError::ModelInit(e.clone())),
            ModelState::Uninit => unreachable!("ensure_init leaves no Uninit state"),
        };

        let text = truncate_utf8(text, MAX_TEXT_LENGTH);
        let mut embeddings = model
            .embed(vec![text], None)
            .map_err(|e| EmbeddingError::EmbeddingFailed(e.to_string()))?;

        embeddings
            .pop()
            .ok_or_else(|| EmbeddingError::EmbeddingFailed("no embedding generated".into()))
    }

    /// Generate embeddings for multiple texts (batched)
    pub fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        if !self.enabled {
            return Err(EmbeddingError::Disabled);
        }
        if texts.is_empty() {
            return Ok(vec![]);
        }

        let mut state = self.model.lock().expect("embedding model lock poisoned");
        self.ensure_init(&mut state);

        let model = match &mut *state {
            ModelState::Ready(model) => model,
            ModelState::Failed(e) => return Err(EmbeddingError::ModelInit(e.clone())),
            ModelState::Uninit => unreachable!("ensure_init leaves no Uninit state"),
        };

        let mut all = Vec::with_capacity(texts.len());
        for chunk in texts.chunks(BATCH_SIZE) {
            let truncated: Vec<&str> = chunk.iter().map(|t| truncate_utf8(t, MAX_TEXT_LENGTH)).collect();
            let embeddings = model
                .embed(truncated, None)
                .map_err(|e| EmbeddingError::EmbeddingFailed(e.to_string()))?;
            all.extend(embeddings);
        }
        Ok(all)
    }

    /// Release the model and its backing tensors
    ///
    /// Idempotent; a later call re-initializes lazily.
    pub fn cleanup(&self) {
        let mut state = self.model.lock().expect("embedding model lock poisoned");
        if matches!(*state, ModelState::Ready(_)) {
            tracing::debug!("releasing embedding model");
        }
        *state = ModelState::Uninit;
    }
}

/// Truncate to at most `max_len` bytes on a char boundary
fn truncate_utf8(text: &str, max_len: usize) -> &str {
    if text.len() <= max_len {
        return text;
    }
    let mut end = max_len;
    while end > 0 && !text.is_char_boundary(end) {
        end -= 1;
    }
    &text[..end]
}

// ============================================================================
// SIMILARITY
// ============================================================================

/// Cosine similarity between two vectors
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }
    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a * norm_b)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cosine_similarity_identical() {
        let v = vec![0.5, 0.5, 0.1];
        assert!((cosine_similarity(&v, &v) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_cosine_similarity_orthogonal() {
        let a = vec![1.0, 0.0];
        let b = vec![0.0, 1.0];
        assert!(cosine_similarity(&a, &b).abs() < 1e-6);
    }

    #[test]
    fn test_cosine_similarity_mismatched_lengths() {
        assert_eq!(cosine_similarity(&[1.0], &[1.0, 2.0]), 0.0);
    }

    #[test]
    fn test_truncate_utf8_respects_char_boundary() {
        let text = "héllo wörld";
        let truncated = truncate_utf8(text, 3);
        assert!(truncated.len() <= 3);
        assert!(text.starts_with(truncated));
    }

    #[test]
    fn test_cleanup_is_idempotent() {
        let service = EmbeddingService::new();
        service.cleanup();
        service.cleanup();
    }
}
