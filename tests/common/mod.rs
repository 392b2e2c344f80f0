//! Common test utilities for WikiGR end-to-end scenarios
//!
//! Provides deterministic stand-ins for the external capabilities: an
//! in-memory article source, keyword-axis embedders, and wiki-markup page
//! builders. The LLM side uses `wikigr::MockLlm` directly.

pub mod embedders;
pub mod sources;

pub use embedders::{AxisEmbedder, DIM};
pub use sources::{page_with_links, MapSource};

use std::sync::Arc;
use wikigr::{ExpansionConfig, LlmClient, MockLlm, Orchestrator, SqlitePackStore};

/// Empty-but-valid extraction JSON for pipelines that don't care about
/// entity output.
pub const EMPTY_EXTRACTION: &str = r#"{"entities": [], "relations": [], "facts": []}"#;

/// Wire an orchestrator over an in-memory store with the standard mocks.
pub fn test_orchestrator(
    config: ExpansionConfig,
    source: MapSource,
) -> (Orchestrator, Arc<SqlitePackStore>) {
    let store = Arc::new(SqlitePackStore::open_in_memory(DIM).expect("in-memory store"));
    let llm: Arc<dyn LlmClient> = Arc::new(MockLlm::new().with_default(EMPTY_EXTRACTION));
    let orchestrator = Orchestrator::new(
        config,
        store.clone(),
        Arc::new(source),
        Arc::new(AxisEmbedder),
        llm,
    );
    (orchestrator, store)
}
