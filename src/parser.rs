//! Article parsing: section splitting, link discovery, title normalization
//!
//! Raw page text arrives as MediaWiki-flavored markup (or the plain-text
//! extract the API serves, which keeps `== Heading ==` markers). The parser
//! produces the ordered section list, the outbound link targets, and the
//! category names.
//!
//! Title canonicalization lives here and nowhere else: seeds, link targets,
//! and store lookups all pass through [`normalize_title`], so the graph
//! never holds two spellings of the same article.

use crate::store::NewSection;
use regex::Regex;
use std::collections::HashSet;
use std::sync::OnceLock;

/// Everything the parser produces for one article.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParsedArticle {
    pub sections: Vec<NewSection>,
    /// Normalized, filtered, deduplicated outbound link targets, in
    /// document order.
    pub links: Vec<String>,
    pub categories: Vec<String>,
}

impl ParsedArticle {
    pub fn word_count(&self) -> u32 {
        self.sections.iter().map(|s| s.word_count).sum()
    }
}

fn wiki_link_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\[\[([^\[\]]+?)\]\]").unwrap())
}

fn template_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\{\{[^{}]*\}\}").unwrap())
}

fn ref_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?s)<ref[^>]*?/>|<ref[^>]*?>.*?</ref>").unwrap())
}

fn tag_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"</?[a-zA-Z][^>]*>").unwrap())
}

fn external_link_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\[https?://\S+(?:\s+([^\]]+))?\]").unwrap())
}

fn heading_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^(={2,})\s*(.+?)\s*=*\s*$").unwrap())
}

/// Canonical title normalization — the one place link targets, seeds, and
/// lookups agree on spelling.
///
/// Rules: drop the `|alias` and `#fragment` parts, underscores become
/// spaces, whitespace collapses to single spaces, the leading character is
/// uppercased (MediaWiki treats the first letter as case-insensitive), the
/// rest of the casing is preserved as the source gives it.
pub fn normalize_title(raw: &str) -> String {
    let target = raw.split('|').next().unwrap_or("");
    let target = target.split('#').next().unwrap_or("");
    let decoded = percent_decode(target);
    let collapsed: String = decoded
        .replace('_', " ")
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ");

    let mut chars = collapsed.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
        None => String::new(),
    }
}

/// Minimal percent-decoding for the escapes that actually show up in wiki
/// link targets. Invalid escapes pass through untouched.
fn percent_decode(s: &str) -> String {
    if !s.contains('%') {
        return s.to_string();
    }
    let bytes = s.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'%' && i + 2 < bytes.len() {
            let hex = &s[i + 1..i + 3];
            if let Ok(byte) = u8::from_str_radix(hex, 16) {
                out.push(byte);
                i += 3;
                continue;
            }
        }
        out.push(bytes[i]);
        i += 1;
    }
    String::from_utf8(out).unwrap_or_else(|_| s.to_string())
}

const NAMESPACE_PREFIXES: &[&str] = &[
    "File:",
    "Image:",
    "Category:",
    "Template:",
    "Help:",
    "Special:",
    "Talk:",
    "Portal:",
    "Wikipedia:",
    "Draft:",
    "Module:",
    "MediaWiki:",
    "Book:",
    "User:",
];

/// Default discovery filter: rejects namespace-prefixed titles,
/// interlanguage links (`fr:`, `de:` …), disambiguation pages, and media
/// file names. Applied at discovery time, before an article enters the
/// work queue.
pub fn default_title_filter(title: &str) -> bool {
    if title.is_empty() {
        return false;
    }
    for prefix in NAMESPACE_PREFIXES {
        if strip_prefix_ignore_case(title, prefix).is_some() {
            return false;
        }
    }
    // Interlanguage prefix: a 2-3 letter ASCII code followed by a colon.
    if let Some(colon) = title.find(':') {
        let prefix = &title[..colon];
        if (2..=3).contains(&prefix.len()) && prefix.chars().all(|c| c.is_ascii_alphabetic()) {
            return false;
        }
    }
    if title.ends_with("(disambiguation)") {
        return false;
    }
    let lower = title.to_lowercase();
    for ext in [".jpg", ".jpeg", ".png", ".gif", ".svg", ".ogg", ".pdf", ".webm"] {
        if lower.ends_with(ext) {
            return false;
        }
    }
    true
}

/// Parses raw page markup into sections, links, and categories.
pub struct Parser {
    filter: Box<dyn Fn(&str) -> bool + Send + Sync>,
}

impl Default for Parser {
    fn default() -> Self {
        Self::new()
    }
}

impl Parser {
    pub fn new() -> Self {
        Self {
            filter: Box::new(default_title_filter),
        }
    }

    /// Replace the discovery filter (e.g. to also reject list pages).
    pub fn with_filter(mut self, filter: impl Fn(&str) -> bool + Send + Sync + 'static) -> Self {
        self.filter = Box::new(filter);
        self
    }

    /// Parse one article's raw text.
    ///
    /// Heading markers `== H ==` map to section level 1 and `=== H ===` to
    /// level 2; deeper headings fold their text into the enclosing level-2
    /// section. Text before the first heading becomes the lead section at
    /// ordinal 0, titled after the article.
    pub fn parse(&self, title: &str, raw: &str) -> ParsedArticle {
        let (links, categories) = self.collect_links(raw);
        let cleaned = scrub_markup(raw);
        let sections = split_sections(title, &cleaned);
        ParsedArticle {
            sections,
            links,
            categories,
        }
    }

    fn collect_links(&self, raw: &str) -> (Vec<String>, Vec<String>) {
        let mut links = Vec::new();
        let mut seen: HashSet<String> = HashSet::new();
        let mut categories = Vec::new();
        let mut seen_categories: HashSet<String> = HashSet::new();

        for cap in wiki_link_re().captures_iter(raw) {
            let inner = cap.get(1).map(|m| m.as_str()).unwrap_or("");
            if let Some(rest) = strip_prefix_ignore_case(inner, "Category:") {
                let name = normalize_title(rest);
                if !name.is_empty() && seen_categories.insert(name.clone()) {
                    categories.push(name);
                }
                continue;
            }
            let target = normalize_title(inner);
            if target.is_empty() || !(self.filter)(&target) {
                continue;
            }
            if seen.insert(target.clone()) {
                links.push(target);
            }
        }

        (links, categories)
    }
}

fn strip_prefix_ignore_case<'a>(s: &'a str, prefix: &str) -> Option<&'a str> {
    match s.get(..prefix.len()) {
        Some(head) if head.eq_ignore_ascii_case(prefix) => Some(&s[prefix.len()..]),
        _ => None,
    }
}

/// Strip wiki markup down to readable text, keeping link aliases.
fn scrub_markup(raw: &str) -> String {
    let mut text = ref_re().replace_all(raw, "").into_owned();

    // Templates nest; a few passes of the innermost-first pattern flattens
    // the realistic cases.
    for _ in 0..4 {
        let next = template_re().replace_all(&text, "").into_owned();
        if next == text {
            break;
        }
        text = next;
    }

    text = wiki_link_re()
        .replace_all(&text, |caps: &regex::Captures<'_>| {
            let inner = caps.get(1).map(|m| m.as_str()).unwrap_or("");
            // Category/file links vanish from the prose entirely.
            if strip_prefix_ignore_case(inner, "Category:").is_some()
                || strip_prefix_ignore_case(inner, "File:").is_some()
                || strip_prefix_ignore_case(inner, "Image:").is_some()
            {
                return String::new();
            }
            match inner.rsplit_once('|') {
                Some((_, alias)) => alias.to_string(),
                None => inner.split('#').next().unwrap_or("").to_string(),
            }
        })
        .into_owned();

    text = external_link_re()
        .replace_all(&text, |caps: &regex::Captures<'_>| {
            caps.get(1).map(|m| m.as_str().to_string()).unwrap_or_default()
        })
        .into_owned();

    text = tag_re().replace_all(&text, "").into_owned();
    text = text.replace("'''", "").replace("''", "");
    text
}

fn split_sections(title: &str, cleaned: &str) -> Vec<NewSection> {
    let mut sections: Vec<NewSection> = Vec::new();
    let mut current_heading = title.to_string();
    let mut current_level: u8 = 1;
    let mut buffer: Vec<&str> = Vec::new();
    let mut ordinal: u32 = 0;

    let flush =
        |heading: &str, level: u8, buffer: &mut Vec<&str>, ordinal: &mut u32, out: &mut Vec<NewSection>| {
            let text = buffer.join("\n").trim().to_string();
            buffer.clear();
            if text.is_empty() && *ordinal != 0 {
                return;
            }
            let word_count = text.split_whitespace().count() as u32;
            out.push(NewSection {
                ordinal: *ordinal,
                heading: heading.to_string(),
                level,
                text,
                word_count,
            });
            *ordinal += 1;
        };

    for line in cleaned.lines() {
        if let Some(cap) = heading_re().captures(line.trim()) {
            let marker_len = cap.get(1).map(|m| m.as_str().len()).unwrap_or(2);
            let heading = cap.get(2).map(|m| m.as_str().trim_end_matches('=').trim()).unwrap_or("");
            // == → level 1, === → level 2, deeper merges into the current
            // section rather than opening a new one.
            if marker_len > 3 {
                buffer.push(heading);
                continue;
            }
            flush(&current_heading, current_level, &mut buffer, &mut ordinal, &mut sections);
            current_heading = heading.to_string();
            current_level = (marker_len as u8) - 1;
        } else {
            buffer.push(line);
        }
    }
    flush(&current_heading, current_level, &mut buffer, &mut ordinal, &mut sections);

    // Drop the lead placeholder if the article opened directly with a heading.
    if let Some(first) = sections.first() {
        if first.ordinal == 0 && first.text.is_empty() && sections.len() > 1 {
            sections.remove(0);
            for (i, section) in sections.iter_mut().enumerate() {
                section.ordinal = i as u32;
            }
        }
    }

    sections
}

#[cfg(test)]
mod tests {
    use super::*;

    // === Title normalization ===

    #[test]
    fn normalize_collapses_whitespace_and_underscores() {
        assert_eq!(normalize_title("Isaac_Newton"), "Isaac Newton");
        assert_eq!(normalize_title("  laws   of  motion "), "Laws of motion");
    }

    #[test]
    fn normalize_strips_alias_and_fragment() {
        assert_eq!(normalize_title("Gravity|gravitational pull"), "Gravity");
        assert_eq!(normalize_title("Gravity#History"), "Gravity");
        assert_eq!(normalize_title("gravity#History|pull"), "Gravity");
    }

    #[test]
    fn normalize_uppercases_first_char_only() {
        assert_eq!(normalize_title("force"), "Force");
        assert_eq!(normalize_title("pH meter"), "PH meter");
        assert_eq!(normalize_title("McLaren"), "McLaren");
    }

    #[test]
    fn normalize_percent_decodes_common_escapes() {
        assert_eq!(normalize_title("Newton%27s laws"), "Newton's laws");
        assert_eq!(normalize_title("A%20B"), "A B");
    }

    #[test]
    fn normalize_is_idempotent() {
        let once = normalize_title("isaac_newton#Early_life");
        assert_eq!(normalize_title(&once), once);
    }

    // === Discovery filter ===

    #[test]
    fn filter_rejects_namespace_titles() {
        assert!(!default_title_filter("File:Newton.jpg"));
        assert!(!default_title_filter("Category:Physics"));
        assert!(!default_title_filter("Template:Infobox"));
        assert!(!default_title_filter("wikipedia:About"));
    }

    #[test]
    fn filter_rejects_interlanguage_and_disambiguation() {
        assert!(!default_title_filter("fr:Gravité"));
        assert!(!default_title_filter("de:Kraft"));
        assert!(!default_title_filter("Mercury (disambiguation)"));
    }

    #[test]
    fn filter_accepts_ordinary_titles_with_colons_elsewhere() {
        assert!(default_title_filter("Newton's laws of motion"));
        assert!(default_title_filter("2001: A Space Odyssey"));
        assert!(default_title_filter("Bose–Einstein condensate"));
    }

    // === Section splitting ===

    const SAMPLE: &str = "\
Classical mechanics describes the motion of [[macroscopic object]]s.{{sfn|Goldstein|1980}}

== History ==
[[Isaac Newton|Newton]] formulated the laws in the ''Principia''.<ref>Principia, 1687.</ref>

=== Antiquity ===
Earlier ideas came from [[Aristotle]].

==== Minor note ====
A deeply nested aside.

== Branches ==
Statics and [[dynamics (mechanics)|dynamics]].

[[Category:Classical mechanics]]
[[fr:Mécanique classique]]
";

    #[test]
    fn splits_lead_and_headed_sections() {
        let parsed = Parser::new().parse("Classical mechanics", SAMPLE);
        let headings: Vec<&str> = parsed.sections.iter().map(|s| s.heading.as_str()).collect();
        assert_eq!(
            headings,
            vec!["Classical mechanics", "History", "Antiquity", "Branches"]
        );
        assert_eq!(parsed.sections[0].ordinal, 0);
        assert_eq!(parsed.sections[0].level, 1);
        assert_eq!(parsed.sections[1].level, 1);
        assert_eq!(parsed.sections[2].level, 2);
    }

    #[test]
    fn deep_headings_fold_into_parent_section() {
        let parsed = Parser::new().parse("Classical mechanics", SAMPLE);
        let antiquity = &parsed.sections[2];
        assert!(antiquity.text.contains("deeply nested aside"));
    }

    #[test]
    fn markup_is_scrubbed_from_section_text() {
        let parsed = Parser::new().parse("Classical mechanics", SAMPLE);
        let lead = &parsed.sections[0];
        assert!(lead.text.contains("macroscopic object"));
        assert!(!lead.text.contains("[["));
        assert!(!lead.text.contains("{{"));
        let history = &parsed.sections[1];
        assert!(history.text.contains("Newton formulated"));
        assert!(!history.text.contains("<ref>"));
        assert!(!history.text.contains("''"));
    }

    #[test]
    fn collects_normalized_filtered_links_in_order() {
        let parsed = Parser::new().parse("Classical mechanics", SAMPLE);
        assert_eq!(
            parsed.links,
            vec![
                "Macroscopic object".to_string(),
                "Isaac Newton".to_string(),
                "Aristotle".to_string(),
                "Dynamics (mechanics)".to_string(),
            ]
        );
    }

    #[test]
    fn collects_categories_and_skips_interlanguage() {
        let parsed = Parser::new().parse("Classical mechanics", SAMPLE);
        assert_eq!(parsed.categories, vec!["Classical mechanics".to_string()]);
        assert!(!parsed.links.iter().any(|l| l.contains("Mécanique")));
    }

    #[test]
    fn duplicate_links_are_reported_once() {
        let raw = "[[Force]] and more [[force]] and [[Force|forces]].";
        let parsed = Parser::new().parse("T", raw);
        assert_eq!(parsed.links, vec!["Force".to_string()]);
    }

    #[test]
    fn article_opening_with_heading_has_no_empty_lead() {
        let raw = "== Overview ==\nBody text here.";
        let parsed = Parser::new().parse("T", raw);
        assert_eq!(parsed.sections.len(), 1);
        assert_eq!(parsed.sections[0].heading, "Overview");
        assert_eq!(parsed.sections[0].ordinal, 0);
    }

    #[test]
    fn word_count_sums_sections() {
        let parsed = Parser::new().parse("T", "one two three\n== H ==\nfour five");
        assert_eq!(parsed.word_count(), 5);
    }

    #[test]
    fn custom_filter_is_applied_at_discovery() {
        let parser = Parser::new().with_filter(|t| t != "Aristotle" && default_title_filter(t));
        let parsed = parser.parse("Classical mechanics", SAMPLE);
        assert!(!parsed.links.iter().any(|l| l == "Aristotle"));
    }
}
