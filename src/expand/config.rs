//! Expansion configuration

use std::time::Duration;

/// Configuration for one expansion run.
///
/// Validated once at start-up; a bad configuration never touches the pack.
#[derive(Debug, Clone)]
pub struct ExpansionConfig {
    /// Stop once this many articles are `processed`. In-flight articles
    /// finish, so the terminal count can exceed this by up to
    /// `worker_count - 1`.
    pub target_articles: u64,
    /// Discoveries beyond this depth are not created.
    pub max_depth: u32,
    /// Parallel workers, each sequential within itself.
    pub worker_count: usize,
    /// Maximum articles claimed per `claim_batch` call.
    pub claim_batch_size: usize,
    /// A claim older than this is reclaimable by other workers.
    pub heartbeat_timeout: Duration,
    /// Transient failures per article before it is marked `failed`.
    pub max_retries: u32,
    /// Cap on outbound discoveries created per source article.
    pub link_budget_per_article: usize,
    /// Articles below this raw word count fail with "thin content".
    pub min_content_words: u32,
    /// Per-operation timeouts; exceeding one is a transient error.
    pub fetch_timeout: Duration,
    pub embed_timeout: Duration,
    pub extract_timeout: Duration,
    /// Approximate token budget per embedding sub-batch.
    pub embed_batch_tokens: usize,
}

impl Default for ExpansionConfig {
    fn default() -> Self {
        Self {
            target_articles: 100,
            max_depth: 2,
            worker_count: 4,
            claim_batch_size: 8,
            heartbeat_timeout: Duration::from_secs(60),
            max_retries: 3,
            link_budget_per_article: 20,
            min_content_words: crate::source::DEFAULT_MIN_CONTENT_WORDS,
            fetch_timeout: Duration::from_secs(30),
            embed_timeout: Duration::from_secs(60),
            extract_timeout: Duration::from_secs(120),
            embed_batch_tokens: 8_000,
        }
    }
}

impl ExpansionConfig {
    pub fn with_target_articles(mut self, target: u64) -> Self {
        self.target_articles = target;
        self
    }

    pub fn with_max_depth(mut self, depth: u32) -> Self {
        self.max_depth = depth;
        self
    }

    pub fn with_worker_count(mut self, workers: usize) -> Self {
        self.worker_count = workers;
        self
    }

    pub fn with_heartbeat_timeout(mut self, timeout: Duration) -> Self {
        self.heartbeat_timeout = timeout;
        self
    }

    pub fn with_link_budget(mut self, budget: usize) -> Self {
        self.link_budget_per_article = budget;
        self
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.target_articles == 0 {
            return Err("target_articles must be positive".to_string());
        }
        if self.worker_count == 0 {
            return Err("worker_count must be positive".to_string());
        }
        if self.claim_batch_size == 0 {
            return Err("claim_batch_size must be positive".to_string());
        }
        if self.heartbeat_timeout.is_zero() {
            return Err("heartbeat_timeout must be positive".to_string());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_validate() {
        assert!(ExpansionConfig::default().validate().is_ok());
    }

    #[test]
    fn zero_workers_rejected() {
        let config = ExpansionConfig::default().with_worker_count(0);
        assert!(config.validate().is_err());
    }

    #[test]
    fn zero_target_rejected() {
        let config = ExpansionConfig::default().with_target_articles(0);
        assert!(config.validate().is_err());
    }
}
