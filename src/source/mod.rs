//! Article sources: fetch raw page text for a title
//!
//! `SourceClient` is the capability the expansion pipeline consumes; the
//! Wikipedia implementation lives in [`wikipedia`], and tests substitute
//! in-memory fakes. Politeness (token-bucket rate limiting) is a decorator
//! so any client picks it up unchanged.

mod wikipedia;

pub use wikipedia::WikipediaClient;

use crate::retry::{Classify, ErrorKind};
use async_trait::async_trait;
use governor::{Quota, RateLimiter};
use nonzero_ext::nonzero;
use std::num::NonZeroU32;
use std::sync::Arc;
use thiserror::Error;

/// Minimum raw word count below which an article is rejected as thin.
pub const DEFAULT_MIN_CONTENT_WORDS: u32 = 200;

/// Raw page content and metadata for one article.
#[derive(Debug, Clone, PartialEq)]
pub struct FetchedPage {
    /// Canonical title as the source reports it (after redirects).
    pub title: String,
    /// The URL the content was fetched from.
    pub url: String,
    /// Raw markup, ready for the parser.
    pub raw_text: String,
}

impl FetchedPage {
    pub fn word_count(&self) -> u32 {
        self.raw_text.split_whitespace().count() as u32
    }
}

/// Errors from source operations
#[derive(Debug, Error)]
pub enum SourceError {
    #[error("HTTP error: {0}")]
    Http(String),

    #[error("request timed out")]
    Timeout,

    #[error("rate limited by source")]
    RateLimited,

    #[error("page not found: {0}")]
    NotFound(String),

    #[error("thin content: {words} words (minimum {minimum})")]
    ThinContent { words: u32, minimum: u32 },

    #[error("malformed response: {0}")]
    Malformed(String),
}

impl Classify for SourceError {
    fn kind(&self) -> ErrorKind {
        match self {
            SourceError::Http(_) | SourceError::Timeout | SourceError::RateLimited => {
                ErrorKind::Transient
            }
            SourceError::NotFound(_)
            | SourceError::ThinContent { .. }
            | SourceError::Malformed(_) => ErrorKind::InvalidContent,
        }
    }
}

/// Trait for article sources (to allow mocking)
#[async_trait]
pub trait SourceClient: Send + Sync {
    /// Fetch raw content for a title. `url` is the previously recorded
    /// source URL when known; implementations may ignore it and resolve by
    /// title.
    async fn fetch(&self, title: &str, url: Option<&str>) -> Result<FetchedPage, SourceError>;
}

/// Reject pages below the configured minimum size.
pub fn ensure_substantial(page: &FetchedPage, min_words: u32) -> Result<(), SourceError> {
    let words = page.word_count();
    if words < min_words {
        return Err(SourceError::ThinContent {
            words,
            minimum: min_words,
        });
    }
    Ok(())
}

type DirectRateLimiter = RateLimiter<
    governor::state::NotKeyed,
    governor::state::InMemoryState,
    governor::clock::DefaultClock,
>;

/// A source wrapper that enforces rate limits.
///
/// Uses the governor crate for precise rate limiting with burst support.
pub struct RateLimited<C: SourceClient> {
    inner: C,
    limiter: Arc<DirectRateLimiter>,
}

impl<C: SourceClient> RateLimited<C> {
    /// Wrap `client`, allowing at most `requests_per_second` fetches.
    pub fn new(client: C, requests_per_second: u32) -> Self {
        let rps = NonZeroU32::new(requests_per_second).unwrap_or(nonzero!(1u32));
        Self {
            inner: client,
            limiter: Arc::new(RateLimiter::direct(Quota::per_second(rps))),
        }
    }

    /// Wrap with burst support: sustained `requests_per_second`, short
    /// bursts up to `burst`.
    pub fn with_burst(client: C, requests_per_second: u32, burst: u32) -> Self {
        let rps = NonZeroU32::new(requests_per_second).unwrap_or(nonzero!(1u32));
        let burst = NonZeroU32::new(burst).unwrap_or(rps);
        Self {
            inner: client,
            limiter: Arc::new(RateLimiter::direct(Quota::per_second(rps).allow_burst(burst))),
        }
    }
}

#[async_trait]
impl<C: SourceClient> SourceClient for RateLimited<C> {
    async fn fetch(&self, title: &str, url: Option<&str>) -> Result<FetchedPage, SourceError> {
        self.limiter.until_ready().await;
        self.inner.fetch(title, url).await
    }
}

/// Extension trait for easy rate limiting.
pub trait SourceClientExt: SourceClient + Sized {
    fn rate_limited(self, requests_per_second: u32) -> RateLimited<Self> {
        RateLimited::new(self, requests_per_second)
    }
}

impl<C: SourceClient + Sized> SourceClientExt for C {}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Instant;

    struct CountingSource(AtomicUsize);

    #[async_trait]
    impl SourceClient for CountingSource {
        async fn fetch(&self, title: &str, _url: Option<&str>) -> Result<FetchedPage, SourceError> {
            self.0.fetch_add(1, Ordering::SeqCst);
            Ok(FetchedPage {
                title: title.to_string(),
                url: format!("https://example.org/{}", title),
                raw_text: "word ".repeat(250),
            })
        }
    }

    #[tokio::test]
    async fn rate_limiter_spaces_out_fetches() {
        let source = CountingSource(AtomicUsize::new(0)).rate_limited(2);

        let start = Instant::now();
        for i in 0..3 {
            source.fetch(&format!("T{}", i), None).await.unwrap();
        }
        // First request is immediate; the next two wait for permits at 2/s.
        assert!(start.elapsed().as_millis() >= 500);
    }

    #[tokio::test]
    async fn thin_content_is_rejected() {
        let page = FetchedPage {
            title: "Stub".to_string(),
            url: String::new(),
            raw_text: "too short".to_string(),
        };
        let err = ensure_substantial(&page, DEFAULT_MIN_CONTENT_WORDS).unwrap_err();
        assert!(matches!(err, SourceError::ThinContent { words: 2, .. }));
        assert_eq!(err.kind(), ErrorKind::InvalidContent);
    }

    #[test]
    fn http_errors_classify_as_transient() {
        assert_eq!(
            SourceError::Http("503".to_string()).kind(),
            ErrorKind::Transient
        );
        assert_eq!(SourceError::RateLimited.kind(), ErrorKind::Transient);
        assert_eq!(
            SourceError::NotFound("X".to_string()).kind(),
            ErrorKind::InvalidContent
        );
    }
}
