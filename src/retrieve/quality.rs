//! Content quality scoring for retrieved sections
//!
//! A cheap lexical gate between retrieval and synthesis: very short stubs
//! are always dropped, longer sections earn a length score, and overlap
//! with the question's keywords adds a small boost. Sections below the
//! configured threshold never reach the prompt.

use std::collections::HashSet;

/// English stop words excluded from question keywords.
const STOP_WORDS: &[&str] = &[
    "a", "an", "and", "are", "as", "at", "be", "but", "by", "can", "did", "do", "does", "for",
    "from", "had", "has", "have", "how", "in", "is", "it", "its", "of", "on", "or", "that", "the",
    "their", "there", "these", "they", "this", "to", "was", "were", "what", "when", "where",
    "which", "who", "why", "will", "with",
];

/// Lowercased, stop-word-free keywords of a question.
pub fn question_keywords(question: &str) -> HashSet<String> {
    question
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
        .map(|w| w.to_lowercase())
        .filter(|w| !STOP_WORDS.contains(&w.as_str()))
        .collect()
}

/// Score one section against the question keywords.
///
/// `length_score = min(0.8, 0.2 + (word_count/200) × 0.6)` and
/// `keyword_score = min(0.2, overlap_ratio × 0.2)`, capped at 1 combined.
/// Sections under `stub_word_cutoff` words always score 0.
pub fn quality_score(
    keywords: &HashSet<String>,
    section_text: &str,
    word_count: u32,
    stub_word_cutoff: u32,
) -> f32 {
    if word_count < stub_word_cutoff {
        return 0.0;
    }

    let length_score = (0.2 + (word_count as f32 / 200.0) * 0.6).min(0.8);

    let keyword_score = if keywords.is_empty() {
        0.0
    } else {
        let section_words: HashSet<String> = section_text
            .split(|c: char| !c.is_alphanumeric())
            .filter(|w| !w.is_empty())
            .map(|w| w.to_lowercase())
            .collect();
        let overlap = keywords.iter().filter(|k| section_words.contains(*k)).count();
        let overlap_ratio = overlap as f32 / keywords.len() as f32;
        (overlap_ratio * 0.2).min(0.2)
    };

    (length_score + keyword_score).min(1.0)
}
