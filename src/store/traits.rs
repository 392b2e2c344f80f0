//! Pack store trait definitions
//!
//! The pack store is the single durability boundary: articles, sections,
//! entities, facts, links, and section embeddings all live in one embedded
//! database per pack. The `PackStore` trait keeps the capability surface
//! small enough that tests can use in-memory stores without a framework.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors that can occur during pack store operations
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Article not found: {0}")]
    ArticleNotFound(String),

    #[error("Embedding dimension mismatch: expected {expected}, got {got}")]
    DimensionMismatch { expected: usize, got: usize },

    #[error("Invalid state transition for '{title}': {from} -> {to}")]
    InvalidTransition {
        title: String,
        from: ArticleState,
        to: ArticleState,
    },

    #[error("Vector index error: {0}")]
    Vector(String),
}

/// Result type for store operations
pub type StoreResult<T> = Result<T, StoreError>;

/// Lifecycle state of an article within a pack.
///
/// Transitions only advance: `discovered → claimed → loaded → processed`,
/// with `failed` as the terminal error state and `claimed → discovered`
/// as the retry/release path. The store refuses regressions elsewhere.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArticleState {
    Discovered,
    Claimed,
    Loaded,
    Processed,
    Failed,
}

impl ArticleState {
    pub fn as_str(&self) -> &'static str {
        match self {
            ArticleState::Discovered => "discovered",
            ArticleState::Claimed => "claimed",
            ArticleState::Loaded => "loaded",
            ArticleState::Processed => "processed",
            ArticleState::Failed => "failed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "discovered" => Some(ArticleState::Discovered),
            "claimed" => Some(ArticleState::Claimed),
            "loaded" => Some(ArticleState::Loaded),
            "processed" => Some(ArticleState::Processed),
            "failed" => Some(ArticleState::Failed),
            _ => None,
        }
    }

    /// Position along the forward path. `failed` sits outside the path and
    /// is handled separately (terminal).
    pub fn rank(&self) -> u8 {
        match self {
            ArticleState::Discovered => 0,
            ArticleState::Claimed => 1,
            ArticleState::Loaded => 2,
            ArticleState::Processed => 3,
            ArticleState::Failed => 4,
        }
    }
}

impl std::fmt::Display for ArticleState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A lightweight handle to an article row.
#[derive(Debug, Clone, PartialEq)]
pub struct ArticleRef {
    pub title: String,
    pub url: String,
    pub state: ArticleState,
    pub depth: u32,
    pub retry_count: u32,
    /// Milliseconds on the orchestrator's clock; `None` when unclaimed.
    pub claimed_at: Option<i64>,
}

/// A parsed section ready for persistence (no id yet).
#[derive(Debug, Clone, PartialEq)]
pub struct NewSection {
    pub ordinal: u32,
    pub heading: String,
    /// Heading level, 1 or 2. The lead section uses level 1.
    pub level: u8,
    pub text: String,
    pub word_count: u32,
}

/// A stored section row.
#[derive(Debug, Clone, PartialEq)]
pub struct SectionRow {
    pub id: i64,
    pub article_title: String,
    pub ordinal: u32,
    pub heading: String,
    pub level: u8,
    pub text: String,
    pub word_count: u32,
    pub has_embedding: bool,
}

/// One vector-search hit.
#[derive(Debug, Clone, PartialEq)]
pub struct SectionHit {
    pub section_id: i64,
    pub article_title: String,
    pub similarity: f32,
}

/// An entity produced by the extractor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityRecord {
    pub name: String,
    #[serde(rename = "type")]
    pub entity_type: String,
    #[serde(default)]
    pub description: String,
}

/// A relation between two extracted entities.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RelationRecord {
    pub source: String,
    pub target: String,
    pub predicate: String,
}

/// The full structured output of one extraction pass over an article.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Extraction {
    #[serde(default)]
    pub entities: Vec<EntityRecord>,
    #[serde(default)]
    pub relations: Vec<RelationRecord>,
    #[serde(default)]
    pub facts: Vec<String>,
}

impl Extraction {
    pub fn is_empty(&self) -> bool {
        self.entities.is_empty() && self.relations.is_empty() && self.facts.is_empty()
    }
}

/// Traversal direction for link neighbors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Outbound,
    Inbound,
    Both,
}

/// Aggregate counts for monitoring and stop conditions.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct PackStats {
    pub articles: u64,
    pub sections: u64,
    pub entities: u64,
    pub relations: u64,
    pub discovered: u64,
    pub claimed: u64,
    pub loaded: u64,
    pub processed: u64,
    pub failed: u64,
}

/// Trait for pack storage backends
///
/// Implementations must be thread-safe (Send + Sync): the expansion
/// orchestrator mutates through it from several workers, and the retrieval
/// agent reads through it concurrently. Every multi-row write is
/// transactional per article: a crashed worker leaves the article either
/// fully in its prior state or fully in the new state.
pub trait PackStore: Send + Sync {
    // === Work queue ===

    /// Create or update an article. Idempotent on title; `depth` only ever
    /// decreases (`min(existing, new)`) and `state` only ever advances.
    fn upsert_article(
        &self,
        title: &str,
        url: &str,
        depth: u32,
        initial_state: ArticleState,
    ) -> StoreResult<()>;

    /// Atomically claim up to `limit` articles that are `discovered`, or
    /// `claimed` with a heartbeat older than `heartbeat_timeout_ms`.
    /// Ordering: ascending depth, then insertion order. Serializable under
    /// concurrent callers; two callers never receive the same article.
    fn claim_batch(
        &self,
        limit: usize,
        now_ms: i64,
        heartbeat_timeout_ms: i64,
    ) -> StoreResult<Vec<ArticleRef>>;

    /// Refresh the heartbeat on a held claim.
    fn refresh_claim(&self, title: &str, now_ms: i64) -> StoreResult<()>;

    /// Return a claimed article to `discovered` without counting a retry
    /// (cancellation path).
    fn release_claim(&self, title: &str) -> StoreResult<()>;

    // === Article pipeline writes ===

    /// Transactionally replace the article's sections, record categories,
    /// and create placeholder articles for link targets not yet present.
    /// Transitions `claimed → loaded`.
    fn write_article_contents(
        &self,
        title: &str,
        sections: &[NewSection],
        links: &[String],
        categories: &[String],
    ) -> StoreResult<()>;

    /// Fill section embeddings. Every vector must match the pack dimension.
    fn write_embeddings(&self, title: &str, embeddings: &[(u32, Vec<f32>)]) -> StoreResult<()>;

    /// Merge extracted entities by `(lower(name), type)`, create MENTIONS /
    /// RELATES_TO / STATES edges. Transitions `loaded → processed`.
    fn write_extractions(&self, title: &str, extraction: &Extraction) -> StoreResult<()>;

    /// Record a failure. Increments `retry_count`; at `max_retries` the
    /// article becomes `failed`, otherwise it returns to `discovered`.
    /// Returns the resulting state.
    fn mark_failed(&self, title: &str, reason: &str, max_retries: u32)
        -> StoreResult<ArticleState>;

    // === Reads ===

    /// Top-k sections by cosine similarity to the query vector.
    fn vector_search(&self, query: &[f32], k: usize) -> StoreResult<Vec<SectionHit>>;

    /// Titles linked to/from an article.
    fn neighbors(&self, title: &str, direction: Direction) -> StoreResult<Vec<String>>;

    /// Total LINKS_TO degree (in + out), the centrality signal for reranking.
    fn degree(&self, title: &str) -> StoreResult<usize>;

    fn article(&self, title: &str) -> StoreResult<Option<ArticleRef>>;

    /// Sections of an article, ordered by ordinal.
    fn sections(&self, title: &str) -> StoreResult<Vec<SectionRow>>;

    fn section(&self, section_id: i64) -> StoreResult<Option<SectionRow>>;

    fn stats(&self) -> StoreResult<PackStats>;
}
