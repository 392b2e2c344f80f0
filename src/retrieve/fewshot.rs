//! Few-shot examples: strict-schema loading and similarity retrieval
//!
//! The examples file shapes synthesis style. Its schema is strict —
//! `question`, `answer`, and `sources` are all required and a malformed
//! file fails agent construction — but a *missing* file is fine and just
//! disables the feature. Example-question embeddings are computed once per
//! process, on first use, and cached for concurrent queries.

use crate::embed::{EmbeddingError, EmbeddingProvider};
use crate::store::cosine_similarity;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// One (question, answer, sources) tuple injected into the synthesis prompt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FewShotExample {
    pub question: String,
    pub answer: String,
    pub sources: Vec<String>,
}

/// Errors loading the examples file
#[derive(Debug, Error)]
pub enum FewShotError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("examples file is not valid JSON: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("invalid example at index {index}: {reason}")]
    Invalid { index: usize, reason: String },
}

/// Capability for loading few-shot examples from wherever the pack keeps them.
pub trait FewShotSource: Send + Sync {
    fn load_examples(&self) -> Result<Vec<FewShotExample>, FewShotError>;
}

/// Loads examples from the JSON file adjacent to the pack.
pub struct FileFewShotSource {
    path: PathBuf,
}

impl FileFewShotSource {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }
}

impl FewShotSource for FileFewShotSource {
    fn load_examples(&self) -> Result<Vec<FewShotExample>, FewShotError> {
        if !self.path.exists() {
            // Missing file disables the feature; it is not an error.
            return Ok(Vec::new());
        }
        let content = std::fs::read_to_string(&self.path)?;
        let examples: Vec<FewShotExample> = serde_json::from_str(&content)?;
        for (index, example) in examples.iter().enumerate() {
            if example.question.trim().is_empty() {
                return Err(FewShotError::Invalid {
                    index,
                    reason: "empty question".to_string(),
                });
            }
            if example.answer.trim().is_empty() {
                return Err(FewShotError::Invalid {
                    index,
                    reason: "empty answer".to_string(),
                });
            }
        }
        Ok(examples)
    }
}

/// Loaded examples plus the per-process embedding cache.
pub(crate) struct FewShotIndex {
    examples: Vec<FewShotExample>,
    /// question text → embedding, filled on first use.
    cache: DashMap<String, Vec<f32>>,
}

impl FewShotIndex {
    pub(crate) fn new(examples: Vec<FewShotExample>) -> Self {
        Self {
            examples,
            cache: DashMap::new(),
        }
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.examples.is_empty()
    }

    /// The `k` examples whose questions are most similar to the query
    /// embedding. Uncached example questions are embedded in one batch.
    pub(crate) async fn top_k(
        &self,
        embedder: &dyn EmbeddingProvider,
        query_vector: &[f32],
        k: usize,
    ) -> Result<Vec<&FewShotExample>, EmbeddingError> {
        if self.examples.is_empty() || k == 0 {
            return Ok(Vec::new());
        }

        let missing: Vec<String> = self
            .examples
            .iter()
            .map(|e| e.question.clone())
            .filter(|q| !self.cache.contains_key(q))
            .collect();
        if !missing.is_empty() {
            let vectors = embedder.embed_batch(&missing).await?;
            for (question, vector) in missing.into_iter().zip(vectors) {
                self.cache.insert(question, vector);
            }
        }

        let mut scored: Vec<(f32, &FewShotExample)> = self
            .examples
            .iter()
            .map(|example| {
                let similarity = self
                    .cache
                    .get(&example.question)
                    .map(|v| cosine_similarity(query_vector, v.value()))
                    .unwrap_or(0.0);
                (similarity, example)
            })
            .collect();
        scored.sort_by(|a, b| {
            b.0.partial_cmp(&a.0)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.1.question.cmp(&b.1.question))
        });
        Ok(scored.into_iter().take(k).map(|(_, e)| e).collect())
    }
}
