//! Classified errors and the retrying caller
//!
//! Every external capability (fetch, embed, extract, synthesize) is called
//! through [`retry_with_backoff`], so the backoff/jitter/max-retries policy
//! lives in exactly one place. Errors carry an [`ErrorKind`] and only
//! `Transient` kinds are retried; everything else fails fast.

use rand::Rng;
use std::fmt::Display;
use std::future::Future;
use std::time::Duration;
use tracing::warn;

/// Coarse error classification driving retry and failure policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Network failure, timeout, HTTP 429/5xx, provider rate limit.
    /// Retried with backoff up to the policy's max.
    Transient,
    /// Thin pages, parse failures, empty sections. Per-article, terminal.
    InvalidContent,
    /// Malformed LLM output after the corrective retry.
    SchemaViolation,
    /// Bad weights, missing seeds, dimension mismatch. Fails start-up.
    Configuration,
    /// Store-level constraint violation or transaction abort.
    Storage,
}

impl ErrorKind {
    pub fn is_transient(&self) -> bool {
        matches!(self, ErrorKind::Transient)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::Transient => "transient",
            ErrorKind::InvalidContent => "invalid content",
            ErrorKind::SchemaViolation => "schema violation",
            ErrorKind::Configuration => "configuration",
            ErrorKind::Storage => "storage",
        }
    }
}

/// Implemented by every external-boundary error type so the retry
/// combinator can classify without knowing the concrete error.
pub trait Classify {
    fn kind(&self) -> ErrorKind;
}

/// Backoff parameters for one capability boundary.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(30),
        }
    }
}

impl RetryPolicy {
    pub fn new(max_retries: u32) -> Self {
        Self {
            max_retries,
            ..Self::default()
        }
    }

    /// Exponential delay for the given attempt (0-based), with up to 50%
    /// additive jitter, capped at `max_delay`.
    fn delay_for(&self, attempt: u32) -> Duration {
        let exp = self.base_delay.saturating_mul(1u32 << attempt.min(16));
        let capped = exp.min(self.max_delay);
        let jitter_ms = rand::thread_rng().gen_range(0..=capped.as_millis() as u64 / 2);
        capped + Duration::from_millis(jitter_ms)
    }
}

/// Call `operation` until it succeeds, the error is non-transient, or
/// `max_retries` retries are exhausted. Returns the last error either way.
pub async fn retry_with_backoff<T, E, F, Fut>(
    policy: &RetryPolicy,
    op_name: &str,
    mut operation: F,
) -> Result<T, E>
where
    E: Classify + Display,
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
{
    let mut attempt: u32 = 0;
    loop {
        match operation().await {
            Ok(value) => return Ok(value),
            Err(err) if err.kind().is_transient() && attempt < policy.max_retries => {
                let delay = policy.delay_for(attempt);
                warn!(
                    op = op_name,
                    attempt = attempt + 1,
                    delay_ms = delay.as_millis() as u64,
                    error = %err,
                    "transient failure, backing off"
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            Err(err) => return Err(err),
        }
    }
}
