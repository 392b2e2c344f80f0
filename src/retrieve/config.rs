//! Retrieval agent configuration

/// Configuration for the retrieval pipeline.
///
/// `use_enhancements` is the master switch: with it off, the agent runs
/// plain vector search plus synthesis regardless of the per-stage flags.
#[derive(Debug, Clone)]
pub struct RetrievalConfig {
    pub use_enhancements: bool,
    pub enable_reranker: bool,
    pub enable_multidoc: bool,
    pub enable_fewshot: bool,
    pub enable_cross_encoder: bool,
    pub enable_multi_query: bool,

    /// Rerank combination weights; must sum to 1.
    pub vector_weight: f32,
    pub graph_weight: f32,

    /// Articles retrieved by multi-doc expansion.
    pub num_docs: usize,
    pub max_sections_per_article: usize,

    /// Below this top-1 cosine similarity the pack is bypassed entirely.
    pub context_confidence_threshold: f32,
    /// Sections scoring below this are filtered from the context.
    pub content_quality_threshold: f32,
    /// Sections shorter than this many words are always filtered.
    pub stub_word_cutoff: u32,
    /// Initial candidate pool = num_docs × candidate_multiplier.
    pub candidate_multiplier: usize,

    /// Output budget for the synthesis call.
    pub synthesis_max_tokens: u32,
    /// Few-shot examples injected at the head of the prompt.
    pub fewshot_examples: usize,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            use_enhancements: true,
            enable_reranker: true,
            enable_multidoc: true,
            enable_fewshot: true,
            enable_cross_encoder: false,
            enable_multi_query: false,
            vector_weight: 0.6,
            graph_weight: 0.4,
            num_docs: 5,
            max_sections_per_article: 3,
            context_confidence_threshold: 0.5,
            content_quality_threshold: 0.3,
            stub_word_cutoff: 20,
            candidate_multiplier: 2,
            synthesis_max_tokens: 512,
            fewshot_examples: 3,
        }
    }
}

impl RetrievalConfig {
    pub fn with_enhancements(mut self, enabled: bool) -> Self {
        self.use_enhancements = enabled;
        self
    }

    pub fn with_reranker(mut self, enabled: bool) -> Self {
        self.enable_reranker = enabled;
        self
    }

    pub fn with_multidoc(mut self, enabled: bool) -> Self {
        self.enable_multidoc = enabled;
        self
    }

    pub fn with_fewshot(mut self, enabled: bool) -> Self {
        self.enable_fewshot = enabled;
        self
    }

    pub fn with_multi_query(mut self, enabled: bool) -> Self {
        self.enable_multi_query = enabled;
        self
    }

    pub fn with_weights(mut self, vector: f32, graph: f32) -> Self {
        self.vector_weight = vector;
        self.graph_weight = graph;
        self
    }

    pub fn with_confidence_threshold(mut self, threshold: f32) -> Self {
        self.context_confidence_threshold = threshold;
        self
    }

    pub fn with_num_docs(mut self, num_docs: usize) -> Self {
        self.num_docs = num_docs;
        self
    }

    pub fn validate(&self) -> Result<(), String> {
        if (self.vector_weight + self.graph_weight - 1.0).abs() > 1e-6 {
            return Err(format!(
                "vector_weight + graph_weight must sum to 1 (got {} + {})",
                self.vector_weight, self.graph_weight
            ));
        }
        if !(0.0..=1.0).contains(&self.context_confidence_threshold) {
            return Err("context_confidence_threshold must be in [0, 1]".to_string());
        }
        if !(0.0..=1.0).contains(&self.content_quality_threshold) {
            return Err("content_quality_threshold must be in [0, 1]".to_string());
        }
        if self.num_docs == 0 {
            return Err("num_docs must be positive".to_string());
        }
        if self.candidate_multiplier == 0 {
            return Err("candidate_multiplier must be positive".to_string());
        }
        Ok(())
    }
}
