//! Retrieval agent: vector search, graph reranking, and synthesis

mod agent;
mod config;
mod fewshot;
mod quality;
mod rerank;

pub use agent::{RetrievalAgent, RetrievalError};
pub use config::RetrievalConfig;
pub use fewshot::{FewShotError, FewShotExample, FewShotSource, FileFewShotSource};
pub use rerank::CrossEncoder;

use crate::llm::TokenUsage;
use serde::{Deserialize, Serialize};

/// How the answer was produced.
///
/// Kept as a tagged sum so every consumer pattern-matches exhaustively
/// instead of comparing strings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueryType {
    /// Normal path: pack context retrieved by vector search.
    VectorSearch,
    /// Top-1 similarity fell below the confidence threshold; the pack was
    /// bypassed entirely.
    ConfidenceGatedFallback,
    /// Vector search produced no candidates at all.
    VectorFallback,
}

impl QueryType {
    pub fn as_str(&self) -> &'static str {
        match self {
            QueryType::VectorSearch => "vector_search",
            QueryType::ConfidenceGatedFallback => "confidence_gated_fallback",
            QueryType::VectorFallback => "vector_fallback",
        }
    }
}

/// The retrieval agent's answer to one question.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryResponse {
    pub answer: String,
    /// Deduplicated titles of the articles whose sections made it into the
    /// synthesis prompt.
    pub sources: Vec<String>,
    pub query_type: QueryType,
    pub token_usage: TokenUsage,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn query_type_serializes_with_stable_names() {
        assert_eq!(
            serde_json::to_string(&QueryType::ConfidenceGatedFallback).unwrap(),
            "\"confidence_gated_fallback\""
        );
        assert_eq!(QueryType::VectorSearch.as_str(), "vector_search");
        assert_eq!(QueryType::VectorFallback.as_str(), "vector_fallback");
    }
}
