//! Entity & relationship extraction driver
//!
//! Drives the LLM over one parsed article, eliciting strict JSON with
//! entities, relations, and short facts. Transport errors propagate (the
//! worker retries those); schema errors are handled here — one corrective
//! retry with a stricter prompt, then an empty extraction so the article
//! still reaches `processed` and stays retrievable.

use crate::llm::{LlmClient, LlmError, TokenUsage};
use crate::store::{EntityRecord, Extraction, NewSection};
use std::collections::HashSet;
use tracing::warn;

const DEFAULT_MAX_INPUT_TOKENS: usize = 6_000;
const DEFAULT_MAX_OUTPUT_TOKENS: u32 = 1_500;

const SCHEMA_HINT: &str = r#"{"entities": [{"name": "...", "type": "...", "description": "..."}], "relations": [{"source": "...", "target": "...", "predicate": "..."}], "facts": ["..."]}"#;

/// LLM-backed extractor for one article at a time.
pub struct Extractor<L: LlmClient> {
    llm: L,
    max_input_tokens: usize,
    max_output_tokens: u32,
}

impl<L: LlmClient> Extractor<L> {
    pub fn new(llm: L) -> Self {
        Self {
            llm,
            max_input_tokens: DEFAULT_MAX_INPUT_TOKENS,
            max_output_tokens: DEFAULT_MAX_OUTPUT_TOKENS,
        }
    }

    pub fn with_max_input_tokens(mut self, tokens: usize) -> Self {
        self.max_input_tokens = tokens;
        self
    }

    /// Extract entities, relations, and facts for an article.
    ///
    /// Input beyond the token budget is dropped tail-first, whole sections
    /// at a time. Returns the extraction plus the token usage of every LLM
    /// call made.
    pub async fn extract(
        &self,
        title: &str,
        sections: &[NewSection],
    ) -> Result<(Extraction, TokenUsage), LlmError> {
        let body = self.assemble_input(title, sections);
        let mut usage = TokenUsage::default();

        let prompt = extraction_prompt(title, &body, false);
        let completion = self.llm.complete(&prompt, self.max_output_tokens).await?;
        usage.add(completion.usage);

        match parse_extraction(&completion.text) {
            Ok(extraction) => return Ok((normalize(extraction), usage)),
            Err(parse_err) => {
                warn!(
                    article = %title,
                    error = %parse_err,
                    "malformed extraction, retrying with strict prompt"
                );
            }
        }

        let strict_prompt = extraction_prompt(title, &body, true);
        let completion = self.llm.complete(&strict_prompt, self.max_output_tokens).await?;
        usage.add(completion.usage);

        match parse_extraction(&completion.text) {
            Ok(extraction) => Ok((normalize(extraction), usage)),
            Err(parse_err) => {
                warn!(
                    article = %title,
                    error = %parse_err,
                    "extraction still malformed, recording empty extraction"
                );
                Ok((Extraction::default(), usage))
            }
        }
    }

    /// Join sections into the prompt body, dropping from the tail until the
    /// result fits the input budget.
    fn assemble_input(&self, title: &str, sections: &[NewSection]) -> String {
        let mut kept = sections.len();
        loop {
            let body: String = sections[..kept]
                .iter()
                .map(|s| format!("## {}\n{}\n", s.heading, s.text))
                .collect();
            let total = crate::embed::approx_tokens(title) + crate::embed::approx_tokens(&body);
            if total <= self.max_input_tokens || kept <= 1 {
                if kept < sections.len() {
                    warn!(
                        article = %title,
                        kept,
                        dropped = sections.len() - kept,
                        "truncated extraction input tail-first"
                    );
                }
                return body;
            }
            kept -= 1;
        }
    }
}

fn extraction_prompt(title: &str, body: &str, strict: bool) -> String {
    let strictness = if strict {
        "Your previous answer was not valid JSON. Respond with ONLY a single \
         JSON object, no prose, no markdown fences, exactly matching this shape: "
    } else {
        "Respond with a single JSON object of this shape: "
    };
    format!(
        "Extract the key entities, relationships, and facts from the article \
         \"{title}\".\n\
         Entities have a short name, a type (person, place, concept, \
         organization, event, or work), and a one-sentence description. \
         Relations connect two extracted entities with a short predicate. \
         Facts are standalone factual sentences attributable to the article.\n\
         {strictness}{SCHEMA_HINT}\n\n\
         Article:\n{body}"
    )
}

/// Parse the LLM response into an [`Extraction`], unwrapping markdown code
/// fences when present.
fn parse_extraction(text: &str) -> Result<Extraction, serde_json::Error> {
    serde_json::from_str(strip_fences(text))
}

fn strip_fences(text: &str) -> &str {
    let trimmed = text.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    // Drop the language tag on the opening fence, then the closing fence.
    let rest = rest.strip_prefix("json").unwrap_or(rest);
    let rest = rest.strip_suffix("```").unwrap_or(rest);
    rest.trim()
}

/// Trim whitespace, drop empties, and dedupe entities by
/// `(lowercase(name), type)`, keeping the first occurrence's casing.
fn normalize(mut extraction: Extraction) -> Extraction {
    let mut seen: HashSet<(String, String)> = HashSet::new();
    let mut entities: Vec<EntityRecord> = Vec::with_capacity(extraction.entities.len());
    for mut entity in extraction.entities {
        entity.name = entity.name.trim().to_string();
        entity.entity_type = entity.entity_type.trim().to_lowercase();
        entity.description = entity.description.trim().to_string();
        if entity.name.is_empty() || entity.entity_type.is_empty() {
            continue;
        }
        let key = (entity.name.to_lowercase(), entity.entity_type.clone());
        if seen.insert(key) {
            entities.push(entity);
        }
    }
    extraction.entities = entities;

    extraction.relations.retain(|r| {
        !r.source.trim().is_empty() && !r.target.trim().is_empty() && !r.predicate.trim().is_empty()
    });
    extraction.facts.retain(|f| !f.trim().is_empty());
    extraction
}
