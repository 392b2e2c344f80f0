//! WikiGR: knowledge-pack expansion engine and retrieval agent
//!
//! Builds domain-specific knowledge packs from Wikipedia or structured web
//! documentation, then answers natural-language questions against them.
//!
//! # Core Concepts
//!
//! - **Pack**: a self-contained graph of articles, sections, entities, and
//!   embeddings, plus its metadata and optional few-shot examples file
//! - **Expansion**: a work-queue state machine that grows a pack from a few
//!   seed titles, with parallel claim-based workers
//! - **Retrieval**: vector search with graph reranking, a confidence gate,
//!   and LLM synthesis with cited sources
//!
//! # Example
//!
//! ```no_run
//! use wikigr::{ExpansionConfig, Orchestrator};
//! # use std::sync::Arc;
//! # async fn run(store: Arc<dyn wikigr::PackStore>,
//! #              source: Arc<dyn wikigr::SourceClient>,
//! #              embedder: Arc<dyn wikigr::EmbeddingProvider>,
//! #              llm: Arc<dyn wikigr::LlmClient>) {
//! let orchestrator = Orchestrator::new(
//!     ExpansionConfig::default().with_target_articles(50),
//!     store, source, embedder, llm,
//! );
//! let stats = orchestrator.run(&["Newton's laws of motion".to_string()]).await;
//! # }
//! ```

pub mod embed;
pub mod expand;
pub mod extract;
pub mod llm;
pub mod pack;
pub mod parser;
pub mod retrieve;
pub mod retry;
pub mod source;
pub mod store;

pub use embed::{EmbeddingError, EmbeddingProvider};
pub use expand::{ExpansionConfig, ExpansionError, Orchestrator};
pub use extract::Extractor;
pub use llm::{Completion, HttpLlmClient, LlmClient, LlmConfig, LlmError, MockLlm, TokenUsage};
pub use pack::{read_seed_file, Pack, PackError, PackMetadata};
pub use parser::{default_title_filter, normalize_title, ParsedArticle, Parser};
pub use retrieve::{
    CrossEncoder, FewShotExample, FewShotSource, FileFewShotSource, QueryResponse, QueryType,
    RetrievalAgent, RetrievalConfig, RetrievalError,
};
pub use retry::{Classify, ErrorKind, RetryPolicy};
pub use source::{
    FetchedPage, RateLimited, SourceClient, SourceClientExt, SourceError, WikipediaClient,
};
pub use store::{
    ArticleRef, ArticleState, Direction, EntityRecord, Extraction, NewSection, PackStats,
    PackStore, RelationRecord, SectionHit, SectionRow, SqlitePackStore, StoreError,
};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
