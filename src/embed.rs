//! Embedding providers
//!
//! `EmbeddingProvider` is the capability set retrieval and expansion share:
//! batch text → fixed-dimension vectors, plus the model identity the pack
//! metadata pins. Production code uses fastembed (behind the `embeddings`
//! feature) or any HTTP provider; tests use deterministic mock embedders.
//!
//! Every embedding in a pack must come from the same model and dimension —
//! the pack records both and refuses to open on a mismatch.

use crate::retry::{Classify, ErrorKind};
use async_trait::async_trait;
use thiserror::Error;

/// Approximate tokens-per-character ratio used for batch budgeting.
/// Provider tokenizers differ; a quarter of the character count is the
/// conventional safe estimate.
pub fn approx_tokens(text: &str) -> usize {
    text.chars().count() / 4 + 1
}

/// Errors from embedding operations
#[derive(Debug, Error)]
pub enum EmbeddingError {
    #[error("embedding returned no results")]
    EmptyResult,

    #[error("embedding model error: {0}")]
    Model(String),

    #[error("embedding provider error: {0}")]
    Provider(String),

    #[error("request timed out")]
    Timeout,
}

impl Classify for EmbeddingError {
    fn kind(&self) -> ErrorKind {
        match self {
            EmbeddingError::Provider(_) | EmbeddingError::Timeout => ErrorKind::Transient,
            EmbeddingError::EmptyResult | EmbeddingError::Model(_) => ErrorKind::Configuration,
        }
    }
}

/// Trait for embedding text into vectors.
///
/// Implementations handle model loading and inference; callers only see
/// the capability set `{embed_batch, dimension, model_id}`.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Embed a batch of texts, returning one vector per text, in order.
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError>;

    /// The fixed dimensionality of every vector this provider produces.
    fn dimension(&self) -> usize;

    /// Stable identifier recorded in pack metadata.
    fn model_id(&self) -> &str;
}

/// Embed `texts` in sub-batches sized by an approximate token budget, so
/// oversized section lists never blow a provider's per-request limit.
pub async fn embed_in_batches(
    provider: &dyn EmbeddingProvider,
    texts: &[String],
    max_tokens_per_batch: usize,
) -> Result<Vec<Vec<f32>>, EmbeddingError> {
    let mut vectors = Vec::with_capacity(texts.len());
    let mut batch: Vec<String> = Vec::new();
    let mut batch_tokens = 0usize;

    for text in texts {
        let tokens = approx_tokens(text);
        if !batch.is_empty() && batch_tokens + tokens > max_tokens_per_batch {
            vectors.extend(provider.embed_batch(&batch).await?);
            batch.clear();
            batch_tokens = 0;
        }
        batch.push(text.clone());
        batch_tokens += tokens;
    }
    if !batch.is_empty() {
        vectors.extend(provider.embed_batch(&batch).await?);
    }

    if vectors.len() != texts.len() {
        return Err(EmbeddingError::Model(format!(
            "provider returned {} vectors for {} texts",
            vectors.len(),
            texts.len()
        )));
    }
    Ok(vectors)
}

// ---------------------------------------------------------------------------
// FastEmbedProvider — local ONNX embedder behind `embeddings` feature
// ---------------------------------------------------------------------------

#[cfg(feature = "embeddings")]
mod fastembed_impl {
    use super::{EmbeddingError, EmbeddingProvider};
    use async_trait::async_trait;
    use fastembed::{EmbeddingModel, InitOptions, TextEmbedding};
    use std::sync::Mutex;

    /// Local embedder backed by fastembed (ONNX Runtime).
    ///
    /// Wraps `fastembed::TextEmbedding` in a `Mutex` because its `embed`
    /// method requires `&mut self`, while the provider trait uses `&self`.
    pub struct FastEmbedProvider {
        model: Mutex<TextEmbedding>,
        model_id: String,
        dimension: usize,
    }

    impl FastEmbedProvider {
        /// Load a specific fastembed model.
        pub fn new(model: EmbeddingModel, dimension: usize) -> Result<Self, EmbeddingError> {
            let model_id = format!("{:?}", model);
            let options = InitOptions::new(model).with_show_download_progress(false);
            let embedding = TextEmbedding::try_new(options)
                .map_err(|e| EmbeddingError::Model(e.to_string()))?;
            Ok(Self {
                model: Mutex::new(embedding),
                model_id,
                dimension,
            })
        }

        /// The default pack model (nomic-embed-text-v1.5, 768 dimensions).
        pub fn default_model() -> Result<Self, EmbeddingError> {
            Self::new(EmbeddingModel::NomicEmbedTextV15, 768)
        }
    }

    #[async_trait]
    impl EmbeddingProvider for FastEmbedProvider {
        async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
            if texts.is_empty() {
                return Ok(Vec::new());
            }
            let mut model = self.model.lock().unwrap();
            let embeddings = model
                .embed(texts.to_vec(), None)
                .map_err(|e| EmbeddingError::Model(e.to_string()))?;
            if embeddings.is_empty() {
                return Err(EmbeddingError::EmptyResult);
            }
            Ok(embeddings)
        }

        fn dimension(&self) -> usize {
            self.dimension
        }

        fn model_id(&self) -> &str {
            &self.model_id
        }
    }
}

#[cfg(feature = "embeddings")]
pub use fastembed_impl::FastEmbedProvider;

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Deterministic embedder: direction keyed on the first word.
    struct StubProvider {
        calls: AtomicUsize,
    }

    impl StubProvider {
        fn new() -> Self {
            Self {
                calls: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl EmbeddingProvider for StubProvider {
        async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(texts.iter().map(|_| vec![1.0, 0.0]).collect())
        }

        fn dimension(&self) -> usize {
            2
        }

        fn model_id(&self) -> &str {
            "stub"
        }
    }

    #[tokio::test]
    async fn batches_split_by_token_budget() {
        let provider = StubProvider::new();
        // Four ~25-token texts against a 60-token budget → two sub-batches
        let texts: Vec<String> = (0..4).map(|_| "x".repeat(100)).collect();

        let vectors = embed_in_batches(&provider, &texts, 60).await.unwrap();
        assert_eq!(vectors.len(), 4);
        assert_eq!(provider.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn single_small_batch_is_one_call() {
        let provider = StubProvider::new();
        let texts = vec!["short".to_string(), "texts".to_string()];
        let vectors = embed_in_batches(&provider, &texts, 1000).await.unwrap();
        assert_eq!(vectors.len(), 2);
        assert_eq!(provider.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn empty_input_is_no_calls() {
        let provider = StubProvider::new();
        let vectors = embed_in_batches(&provider, &[], 100).await.unwrap();
        assert!(vectors.is_empty());
        assert_eq!(provider.calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn approx_tokens_is_quarter_of_chars() {
        assert_eq!(approx_tokens(""), 1);
        assert_eq!(approx_tokens("abcdefgh"), 3);
    }

    #[test]
    fn provider_errors_classify_for_retry() {
        assert_eq!(
            EmbeddingError::Provider("503".into()).kind(),
            ErrorKind::Transient
        );
        assert_eq!(
            EmbeddingError::Model("bad".into()).kind(),
            ErrorKind::Configuration
        );
    }
}
