//! In-memory article sources for end-to-end tests

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use wikigr::{FetchedPage, SourceClient, SourceError};

/// Build a plausible wiki-markup page: a fat lead section, links woven
/// into the prose, and one subsection.
pub fn page_with_links(topic: &str, links: &[&str]) -> String {
    let mut body = format!("'''{}''' is a topic with enough prose to pass the size gate. ", topic);
    body.push_str(&format!("{} appears in many contexts. ", topic).repeat(40));
    for link in links {
        body.push_str(&format!("It relates closely to [[{}]]. ", link));
    }
    body.push_str(&format!(
        "\n== Background ==\nThe background of {} spans several fields of study. ",
        topic
    ));
    body.push_str(&"More background detail follows here. ".repeat(10));
    body.push('\n');
    body
}

/// In-memory source: title → raw page text, with a fetch counter.
pub struct MapSource {
    pages: HashMap<String, String>,
    fetches: AtomicUsize,
}

impl MapSource {
    pub fn new() -> Self {
        Self {
            pages: HashMap::new(),
            fetches: AtomicUsize::new(0),
        }
    }

    pub fn with_page(mut self, title: &str, raw: String) -> Self {
        self.pages.insert(title.to_string(), raw);
        self
    }

    /// Add a page whose prose links to the given titles.
    pub fn with_linked_page(self, title: &str, links: &[&str]) -> Self {
        let raw = page_with_links(title, links);
        self.with_page(title, raw)
    }

    pub fn fetch_count(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }
}

impl Default for MapSource {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SourceClient for MapSource {
    async fn fetch(&self, title: &str, _url: Option<&str>) -> Result<FetchedPage, SourceError> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        match self.pages.get(title) {
            Some(raw) => Ok(FetchedPage {
                title: title.to_string(),
                url: format!("https://example.org/wiki/{}", title.replace(' ', "_")),
                raw_text: raw.clone(),
            }),
            None => Err(SourceError::NotFound(title.to_string())),
        }
    }
}
