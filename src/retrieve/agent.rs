//! The retrieval agent — question in, cited answer out
//!
//! One query walks the pipeline: embed the question (optionally with LLM
//! paraphrases), pull candidates by vector search, gate on confidence,
//! rerank by link centrality, expand across the link graph, filter thin
//! sections, assemble the few-shot prompt, and synthesize. The agent only
//! reads the store, so concurrent queries need no coordination.
//!
//! Provider failures never propagate to the caller: the agent answers with
//! a user-safe string instead. Enhancement failures (few-shot, paraphrase,
//! cross-encoder) are non-fatal and logged.

use super::config::RetrievalConfig;
use super::fewshot::{FewShotExample, FewShotIndex, FewShotSource};
use super::quality::{quality_score, question_keywords};
use super::rerank::{
    rank_by_similarity, rerank_by_cross_encoder, rerank_by_degree, Candidate, CrossEncoder,
};
use super::{QueryResponse, QueryType};
use crate::embed::EmbeddingProvider;
use crate::llm::{LlmClient, LlmError, TokenUsage};
use crate::parser::normalize_title;
use crate::retry::{Classify, ErrorKind};
use crate::store::{ArticleState, Direction, PackStore, SectionRow};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, warn};

/// Hard cap on the final source set after multi-doc expansion.
const MAX_SOURCE_ARTICLES: usize = 7;
/// Neighbors added by one multi-doc expansion.
const MAX_EXPANSION_NEIGHBORS: usize = 2;
/// Link hops traversed from the top article.
const EXPANSION_HOPS: usize = 2;
/// Paraphrase input is clipped to this many characters.
const PARAPHRASE_INPUT_CHARS: usize = 500;

/// Errors constructing a retrieval agent. Queries themselves never error;
/// they return a user-safe answer instead.
#[derive(Debug, Error)]
pub enum RetrievalError {
    #[error("configuration error: {0}")]
    Config(String),

    #[error("few-shot examples: {0}")]
    FewShot(#[from] super::fewshot::FewShotError),
}

/// Answers free-form questions against a built pack.
pub struct RetrievalAgent {
    config: RetrievalConfig,
    store: Arc<dyn PackStore>,
    embedder: Arc<dyn EmbeddingProvider>,
    llm: Arc<dyn LlmClient>,
    fewshot: Option<FewShotIndex>,
    cross_encoder: Option<Arc<dyn CrossEncoder>>,
}

impl RetrievalAgent {
    pub fn new(
        config: RetrievalConfig,
        store: Arc<dyn PackStore>,
        embedder: Arc<dyn EmbeddingProvider>,
        llm: Arc<dyn LlmClient>,
    ) -> Result<Self, RetrievalError> {
        config.validate().map_err(RetrievalError::Config)?;
        Ok(Self {
            config,
            store,
            embedder,
            llm,
            fewshot: None,
            cross_encoder: None,
        })
    }

    /// Load few-shot examples. A malformed file fails fast here; a missing
    /// file loads zero examples and disables the feature.
    pub fn with_fewshot_source(mut self, source: &dyn FewShotSource) -> Result<Self, RetrievalError> {
        let examples = source.load_examples()?;
        if examples.is_empty() {
            debug!("no few-shot examples available; feature disabled");
            self.fewshot = None;
        } else {
            self.fewshot = Some(FewShotIndex::new(examples));
        }
        Ok(self)
    }

    pub fn with_cross_encoder(mut self, encoder: Arc<dyn CrossEncoder>) -> Self {
        self.cross_encoder = Some(encoder);
        self
    }

    /// Answer a question. `max_results` overrides the configured article
    /// count when given.
    pub async fn query(&self, question: &str, max_results: Option<usize>) -> QueryResponse {
        let mut usage = TokenUsage::default();
        match self.run_pipeline(question, max_results, &mut usage).await {
            Ok(response) => response,
            Err(kind) => QueryResponse {
                answer: format!("Unable to answer: {}", kind.as_str()),
                sources: Vec::new(),
                query_type: QueryType::VectorFallback,
                token_usage: usage,
            },
        }
    }

    async fn run_pipeline(
        &self,
        question: &str,
        max_results: Option<usize>,
        usage: &mut TokenUsage,
    ) -> Result<QueryResponse, ErrorKind> {
        let cfg = &self.config;
        let num_docs = max_results.unwrap_or(cfg.num_docs).max(1);
        let enhanced = cfg.use_enhancements;

        // --- 1. query embeddings ---
        let mut query_texts = vec![question.to_string()];
        if enhanced && cfg.enable_multi_query {
            match self.paraphrase(question, usage).await {
                Ok(mut paraphrases) => query_texts.append(&mut paraphrases),
                Err(error) => {
                    warn!(error = %error, "paraphrase failed; continuing with the original question");
                }
            }
        }
        let query_vectors = self
            .embedder
            .embed_batch(&query_texts)
            .await
            .map_err(|e| e.kind())?;
        let primary_vector = query_vectors
            .first()
            .cloned()
            .ok_or(ErrorKind::Configuration)?;

        // --- 2. initial candidates: union over query embeddings, best
        //        section per article ---
        let k = num_docs * cfg.candidate_multiplier;
        let mut best_by_article: HashMap<String, Candidate> = HashMap::new();
        for vector in &query_vectors {
            let hits = self
                .store
                .vector_search(vector, k)
                .map_err(|_| ErrorKind::Storage)?;
            for hit in hits {
                let candidate = Candidate {
                    title: hit.article_title,
                    section_id: hit.section_id,
                    similarity: hit.similarity,
                };
                best_by_article
                    .entry(candidate.title.clone())
                    .and_modify(|existing| {
                        if candidate.similarity > existing.similarity {
                            *existing = candidate.clone();
                        }
                    })
                    .or_insert(candidate);
            }
        }
        let candidates: Vec<Candidate> = best_by_article.into_values().collect();

        if candidates.is_empty() {
            debug!("no vector candidates; synthesizing without pack context");
            let answer = self.synthesize(question, &[], &[], usage).await?;
            return Ok(QueryResponse {
                answer,
                sources: Vec::new(),
                query_type: QueryType::VectorFallback,
                token_usage: *usage,
            });
        }

        // --- 3. confidence gate: low-confidence pack content must never
        //        be injected ---
        let max_similarity = candidates
            .iter()
            .map(|c| c.similarity)
            .fold(f32::NEG_INFINITY, f32::max);
        if max_similarity < cfg.context_confidence_threshold {
            debug!(
                max_similarity,
                threshold = cfg.context_confidence_threshold,
                "confidence gate fired; bypassing pack"
            );
            let answer = self.synthesize(question, &[], &[], usage).await?;
            return Ok(QueryResponse {
                answer,
                sources: Vec::new(),
                query_type: QueryType::ConfidenceGatedFallback,
                token_usage: *usage,
            });
        }

        // --- 4. rerank ---
        let ranked = if enhanced && cfg.enable_reranker {
            let degrees: HashMap<String, usize> = candidates
                .iter()
                .map(|c| (c.title.clone(), self.store.degree(&c.title).unwrap_or(0)))
                .collect();
            let mut ranked =
                rerank_by_degree(candidates, &degrees, cfg.vector_weight, cfg.graph_weight);
            if cfg.enable_cross_encoder {
                match &self.cross_encoder {
                    Some(encoder) => {
                        ranked = rerank_by_cross_encoder(ranked, encoder.as_ref(), question, |c| {
                            self.store
                                .section(c.section_id)
                                .ok()
                                .flatten()
                                .map(|s| s.text)
                                .unwrap_or_default()
                        });
                    }
                    None => {
                        warn!("cross-encoder enabled but none wired; skipping");
                    }
                }
            }
            ranked
        } else {
            rank_by_similarity(candidates)
        };

        // --- 5. select, then multi-doc expansion over LINKS_TO ---
        let mut selected: Vec<Candidate> = ranked.into_iter().take(num_docs).collect();
        if enhanced && cfg.enable_multidoc {
            self.expand_multidoc(&mut selected);
        }
        selected.truncate(MAX_SOURCE_ARTICLES);

        // --- 6. content quality filter + context assembly ---
        let keywords = question_keywords(question);
        let mut context: Vec<SectionRow> = Vec::new();
        for candidate in &selected {
            context.extend(self.pick_sections(&candidate.title, &keywords, true));
        }
        if context.is_empty() {
            // Every section everywhere was filtered: fall back to full
            // article content rather than synthesizing from nothing.
            debug!("quality filter dropped all sections; using full article content");
            for candidate in &selected {
                context.extend(self.pick_sections(&candidate.title, &keywords, false));
            }
        }

        // --- 7. few-shot examples ---
        let examples: Vec<&FewShotExample> = if enhanced && cfg.enable_fewshot {
            match &self.fewshot {
                Some(index) => index
                    .top_k(self.embedder.as_ref(), &primary_vector, cfg.fewshot_examples)
                    .await
                    .unwrap_or_else(|error| {
                        warn!(error = %error, "few-shot embedding failed; continuing without examples");
                        Vec::new()
                    }),
                None => Vec::new(),
            }
        } else {
            Vec::new()
        };

        // --- 8. synthesis ---
        let answer = self.synthesize(question, &context, &examples, usage).await?;

        // --- 9. sources: deduplicated titles actually in the prompt ---
        let mut sources: Vec<String> = Vec::new();
        for row in &context {
            if !sources.contains(&row.article_title) {
                sources.push(row.article_title.clone());
            }
        }

        Ok(QueryResponse {
            answer,
            sources,
            query_type: QueryType::VectorSearch,
            token_usage: *usage,
        })
    }

    /// Follow outbound links from the top-ranked article, up to two hops,
    /// adding up to two processed neighbors. Neighbors inherit the anchor's
    /// similarity for ordering.
    fn expand_multidoc(&self, selected: &mut Vec<Candidate>) {
        let Some(top) = selected.first().cloned() else {
            return;
        };
        let already: HashSet<String> = selected.iter().map(|c| c.title.clone()).collect();

        let mut frontier = vec![top.title.clone()];
        let mut visited: HashSet<String> = already.clone();
        let mut added = 0usize;

        for _ in 0..EXPANSION_HOPS {
            let mut next_frontier = Vec::new();
            for title in &frontier {
                let neighbors = match self.store.neighbors(title, Direction::Outbound) {
                    Ok(neighbors) => neighbors,
                    Err(error) => {
                        warn!(error = %error, "neighbor traversal failed; stopping expansion");
                        return;
                    }
                };
                for neighbor in neighbors {
                    let neighbor = normalize_title(&neighbor);
                    if !visited.insert(neighbor.clone()) {
                        continue;
                    }
                    next_frontier.push(neighbor.clone());
                    if added >= MAX_EXPANSION_NEIGHBORS
                        || selected.len() >= MAX_SOURCE_ARTICLES
                    {
                        continue;
                    }
                    // Only fully processed articles carry retrievable text.
                    let is_processed = self
                        .store
                        .article(&neighbor)
                        .ok()
                        .flatten()
                        .map(|a| a.state == ArticleState::Processed)
                        .unwrap_or(false);
                    if is_processed {
                        selected.push(Candidate {
                            title: neighbor,
                            section_id: top.section_id,
                            similarity: top.similarity,
                        });
                        added += 1;
                    }
                }
            }
            frontier = next_frontier;
            if frontier.is_empty() {
                break;
            }
        }
    }

    /// Choose up to `max_sections_per_article` sections of one article.
    /// With `filtered` set, sections below the quality threshold (or under
    /// the stub cutoff) are dropped; the survivors are the highest-scoring
    /// ones, returned in document order.
    fn pick_sections(
        &self,
        title: &str,
        keywords: &HashSet<String>,
        filtered: bool,
    ) -> Vec<SectionRow> {
        let cfg = &self.config;
        let sections = match self.store.sections(title) {
            Ok(sections) => sections,
            Err(error) => {
                warn!(article = %title, error = %error, "section load failed");
                return Vec::new();
            }
        };

        let mut scored: Vec<(f32, SectionRow)> = sections
            .into_iter()
            .map(|row| {
                let score =
                    quality_score(keywords, &row.text, row.word_count, cfg.stub_word_cutoff);
                (score, row)
            })
            .filter(|(score, _)| !filtered || *score >= cfg.content_quality_threshold)
            .collect();

        scored.sort_by(|a, b| {
            b.0.partial_cmp(&a.0)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.1.ordinal.cmp(&b.1.ordinal))
        });
        let mut picked: Vec<SectionRow> = scored
            .into_iter()
            .take(cfg.max_sections_per_article)
            .map(|(_, row)| row)
            .collect();
        picked.sort_by_key(|row| row.ordinal);
        picked
    }

    /// Generate two paraphrases of the question for multi-query retrieval.
    async fn paraphrase(
        &self,
        question: &str,
        usage: &mut TokenUsage,
    ) -> Result<Vec<String>, LlmError> {
        let clipped: String = question.chars().take(PARAPHRASE_INPUT_CHARS).collect();
        let prompt = format!(
            "Rewrite the following question two different ways, one per line. \
             Do not answer it.\n\nQuestion: {}",
            clipped
        );
        let completion = self.llm.complete(&prompt, 128).await?;
        usage.add(completion.usage);
        Ok(completion
            .text
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .take(2)
            .map(|line| line.trim_start_matches(['-', '*', ' ']).to_string())
            .collect())
    }

    async fn synthesize(
        &self,
        question: &str,
        context: &[SectionRow],
        examples: &[&FewShotExample],
        usage: &mut TokenUsage,
    ) -> Result<String, ErrorKind> {
        let prompt = build_prompt(question, context, examples);
        let completion = self
            .llm
            .complete(&prompt, self.config.synthesis_max_tokens)
            .await
            .map_err(|e| e.kind())?;
        usage.add(completion.usage);
        Ok(completion.text.trim().to_string())
    }
}

fn build_prompt(question: &str, context: &[SectionRow], examples: &[&FewShotExample]) -> String {
    let mut prompt = String::new();

    if !examples.is_empty() {
        prompt.push_str("Here are examples of well-formed answers:\n\n");
        for example in examples {
            prompt.push_str(&format!(
                "Question: {}\nAnswer: {}\n",
                example.question, example.answer
            ));
            if !example.sources.is_empty() {
                prompt.push_str(&format!("Sources: {}\n", example.sources.join(", ")));
            }
            prompt.push('\n');
        }
    }

    if context.is_empty() {
        prompt.push_str(
            "No relevant articles were found in the knowledge pack. Answer \
             from general knowledge and say so plainly if you are unsure.\n\n",
        );
    } else {
        prompt.push_str(
            "Answer the question using the article excerpts below. Cite the \
             articles you draw on by their titles.\n\n",
        );
        for row in context {
            prompt.push_str(&format!(
                "### {} — {}\n{}\n\n",
                row.article_title, row.heading, row.text
            ));
        }
    }

    prompt.push_str(&format!("Question: {}\nAnswer:", question));
    prompt
}
