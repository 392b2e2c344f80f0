//! Candidate reranking: vector similarity blended with link centrality
//!
//! Raw LINKS_TO degrees are stored ground truth; normalization over the
//! candidate pool is computed at query time as an interpretive lens, so
//! the same pack can be reranked under different weights without rebuilds.

use std::collections::HashMap;

/// One candidate article with its anchor section.
#[derive(Debug, Clone, PartialEq)]
pub struct Candidate {
    pub title: String,
    pub section_id: i64,
    pub similarity: f32,
}

/// Optional joint query-document scorer applied on top of the blended
/// rank. A failure to provide one when enabled is non-fatal; the pipeline
/// proceeds without it.
pub trait CrossEncoder: Send + Sync {
    fn score(&self, query: &str, document: &str) -> f32;
}

/// Min-max normalize degrees over the candidate pool.
///
/// A pool where every article has the same degree normalizes to all zeros,
/// leaving the vector score to decide.
pub fn normalize_degrees(degrees: &HashMap<String, usize>) -> HashMap<String, f32> {
    let min = degrees.values().copied().min().unwrap_or(0) as f32;
    let max = degrees.values().copied().max().unwrap_or(0) as f32;
    let range = max - min;

    degrees
        .iter()
        .map(|(title, &d)| {
            let normalized = if range > 0.0 {
                (d as f32 - min) / range
            } else {
                0.0
            };
            (title.clone(), normalized)
        })
        .collect()
}

/// Sort candidates by `vector_weight × cosine + graph_weight ×
/// normalized_degree`, descending. The sort is stable and ties break by
/// ascending title, so the pipeline is deterministic.
pub fn rerank_by_degree(
    mut candidates: Vec<Candidate>,
    degrees: &HashMap<String, usize>,
    vector_weight: f32,
    graph_weight: f32,
) -> Vec<Candidate> {
    let normalized = normalize_degrees(degrees);
    let score = |c: &Candidate| {
        let nd = normalized.get(&c.title).copied().unwrap_or(0.0);
        vector_weight * c.similarity + graph_weight * nd
    };
    candidates.sort_by(|a, b| {
        score(b)
            .partial_cmp(&score(a))
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.title.cmp(&b.title))
    });
    candidates
}

/// Order candidates by similarity alone (reranker disabled).
pub fn rank_by_similarity(mut candidates: Vec<Candidate>) -> Vec<Candidate> {
    candidates.sort_by(|a, b| {
        b.similarity
            .partial_cmp(&a.similarity)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.title.cmp(&b.title))
    });
    candidates
}

/// Re-score the pool with a cross-encoder and re-sort by that score.
pub fn rerank_by_cross_encoder(
    mut candidates: Vec<Candidate>,
    encoder: &dyn CrossEncoder,
    query: &str,
    document_for: impl Fn(&Candidate) -> String,
) -> Vec<Candidate> {
    let scores: HashMap<String, f32> = candidates
        .iter()
        .map(|c| (c.title.clone(), encoder.score(query, &document_for(c))))
        .collect();
    candidates.sort_by(|a, b| {
        let sa = scores.get(&a.title).copied().unwrap_or(0.0);
        let sb = scores.get(&b.title).copied().unwrap_or(0.0);
        sb.partial_cmp(&sa)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.title.cmp(&b.title))
    });
    candidates
}
