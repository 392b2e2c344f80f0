//! Deterministic embedders for end-to-end tests

use async_trait::async_trait;
use wikigr::{EmbeddingError, EmbeddingProvider};

pub const DIM: usize = 3;

/// Maps text onto fixed axes by topic keyword, so questions and sections
/// about the same subject score near-1 cosine while unrelated text lands
/// on an orthogonal axis.
pub struct AxisEmbedder;

#[async_trait]
impl EmbeddingProvider for AxisEmbedder {
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        Ok(texts
            .iter()
            .map(|text| {
                let lower = text.to_lowercase();
                if lower.contains("newton") || lower.contains("motion") {
                    vec![1.0, 0.2, 0.0]
                } else if lower.contains("gravity") || lower.contains("force") {
                    vec![0.9, 0.4, 0.0]
                } else {
                    vec![0.0, 0.0, 1.0]
                }
            })
            .collect())
    }

    fn dimension(&self) -> usize {
        DIM
    }

    fn model_id(&self) -> &str {
        "axis-test-embedder"
    }
}
