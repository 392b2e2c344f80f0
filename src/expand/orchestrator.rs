//! Expansion orchestrator — drives articles from `discovered` to `processed`
//!
//! A claim loop hands batches from the store's work queue to a pool of
//! worker tasks. Each worker runs one article through the sequential
//! pipeline (fetch → parse → persist → embed → extract → discover links)
//! with per-stage timeouts, refreshing its claim heartbeat the whole time.
//! Transient failures retry with backoff through the shared retrying
//! caller; terminal failures mark the article and the run continues.

use super::config::ExpansionConfig;
use crate::embed::{embed_in_batches, EmbeddingError, EmbeddingProvider};
use crate::extract::Extractor;
use crate::llm::LlmClient;
use crate::parser::{default_title_filter, normalize_title, Parser};
use crate::retry::{retry_with_backoff, Classify, ErrorKind, RetryPolicy};
use crate::source::{ensure_substantial, SourceClient, SourceError};
use crate::store::{ArticleRef, ArticleState, NewSection, PackStats, PackStore, StoreError};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::sync::watch;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Errors that end an expansion run
#[derive(Debug, Error)]
pub enum ExpansionError {
    #[error("configuration error: {0}")]
    Config(String),

    #[error("store error: {0}")]
    Store(#[from] StoreError),

    #[error("expansion aborted, repeated store failures on '{0}'")]
    StoreAborted(String),
}

/// Discovery-time title filter.
pub type TitleFilter = Arc<dyn Fn(&str) -> bool + Send + Sync>;

/// Monotonic clock anchored at orchestrator start; claim heartbeats are
/// milliseconds on this clock, which keeps reclamation testable.
#[derive(Clone)]
struct Clock {
    epoch: Instant,
}

impl Clock {
    fn new() -> Self {
        Self {
            epoch: Instant::now(),
        }
    }

    fn now_ms(&self) -> i64 {
        self.epoch.elapsed().as_millis() as i64
    }
}

/// One worker's report back to the claim loop.
#[derive(Debug)]
enum WorkerOutcome {
    Processed {
        title: String,
        discovered: usize,
    },
    Failed {
        title: String,
        terminal: bool,
        reason: String,
    },
    Released {
        title: String,
    },
    StoreFailure {
        title: String,
        error: String,
    },
}

/// Everything a worker task needs, cloned per spawn (all shared state is
/// behind `Arc`).
#[derive(Clone)]
struct WorkerCtx {
    config: ExpansionConfig,
    store: Arc<dyn PackStore>,
    source: Arc<dyn SourceClient>,
    embedder: Arc<dyn EmbeddingProvider>,
    extractor: Arc<Extractor<Arc<dyn LlmClient>>>,
    parser: Arc<Parser>,
    filter: TitleFilter,
    cancel: CancellationToken,
    clock: Clock,
}

/// The expansion orchestrator.
///
/// Owns the worker pool, the cancellation token, and the progress channel.
/// All capabilities are injected as trait objects so tests can run the full
/// loop against in-memory fakes.
pub struct Orchestrator {
    config: ExpansionConfig,
    store: Arc<dyn PackStore>,
    source: Arc<dyn SourceClient>,
    embedder: Arc<dyn EmbeddingProvider>,
    extractor: Arc<Extractor<Arc<dyn LlmClient>>>,
    parser: Arc<Parser>,
    filter: TitleFilter,
    cancel: CancellationToken,
    progress: watch::Sender<PackStats>,
}

impl Orchestrator {
    pub fn new(
        config: ExpansionConfig,
        store: Arc<dyn PackStore>,
        source: Arc<dyn SourceClient>,
        embedder: Arc<dyn EmbeddingProvider>,
        llm: Arc<dyn LlmClient>,
    ) -> Self {
        let (progress, _) = watch::channel(PackStats::default());
        Self {
            config,
            store,
            source,
            embedder,
            extractor: Arc::new(Extractor::new(llm)),
            parser: Arc::new(Parser::new()),
            filter: Arc::new(default_title_filter),
            cancel: CancellationToken::new(),
            progress,
        }
    }

    /// Replace the discovery filter. The same predicate is applied inside
    /// the parser (link capture) and at discovery time.
    pub fn with_filter(mut self, filter: impl Fn(&str) -> bool + Send + Sync + 'static) -> Self {
        let filter: TitleFilter = Arc::new(filter);
        let parser_filter = Arc::clone(&filter);
        self.parser = Arc::new(Parser::new().with_filter(move |t| parser_filter(t)));
        self.filter = filter;
        self
    }

    /// Token that stops new claims and interrupts in-flight workers.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Subscribe to stats snapshots, emitted at most once per second.
    pub fn progress(&self) -> watch::Receiver<PackStats> {
        self.progress.subscribe()
    }

    /// Run expansion from the given seeds until the target is reached or
    /// the queue drains. Returns the terminal stats.
    pub async fn run(&self, seeds: &[String]) -> Result<PackStats, ExpansionError> {
        self.config.validate().map_err(ExpansionError::Config)?;
        if seeds.is_empty() {
            return Err(ExpansionError::Config(
                "at least one seed is required".to_string(),
            ));
        }

        let clock = Clock::new();
        for seed in seeds {
            let title = normalize_title(seed);
            if title.is_empty() {
                return Err(ExpansionError::Config(format!("invalid seed: {:?}", seed)));
            }
            self.store
                .upsert_article(&title, "", 0, ArticleState::Discovered)?;
        }
        info!(
            seeds = seeds.len(),
            target = self.config.target_articles,
            workers = self.config.worker_count,
            "expansion started"
        );

        let heartbeat_ms = self.config.heartbeat_timeout.as_millis() as i64;
        let mut join_set: JoinSet<WorkerOutcome> = JoinSet::new();
        let mut last_emit: Option<Instant> = None;
        let mut store_failures: HashMap<String, u32> = HashMap::new();
        let mut stop_claiming = false;

        loop {
            let stats = self.store.stats()?;
            self.emit_progress(stats, &mut last_emit);

            if self.cancel.is_cancelled() {
                stop_claiming = true;
            }
            if stats.processed >= self.config.target_articles {
                // In-flight articles finish; no new claims.
                stop_claiming = true;
            }

            if !stop_claiming && join_set.len() < self.config.worker_count {
                let capacity = (self.config.worker_count - join_set.len())
                    .min(self.config.claim_batch_size);
                let batch = self
                    .store
                    .claim_batch(capacity, clock.now_ms(), heartbeat_ms)?;
                if batch.is_empty() && join_set.is_empty() {
                    if stats.claimed == 0 {
                        break; // queue drained
                    }
                    // Claims held by a crashed worker are still pending;
                    // wait for their heartbeats to expire and reclaim.
                    tokio::time::sleep(Duration::from_millis(100)).await;
                    continue;
                }
                for article in batch {
                    let ctx = self.worker_ctx(clock.clone());
                    join_set.spawn(run_worker(ctx, article));
                }
            } else if join_set.is_empty() {
                break; // stop condition met and nothing in flight
            }

            // Wait briefly for a completion, then loop to re-check
            // cancellation, progress, and claims.
            match tokio::time::timeout(Duration::from_millis(100), join_set.join_next()).await {
                Ok(Some(Ok(outcome))) => {
                    self.handle_outcome(outcome, &mut store_failures)?;
                }
                Ok(Some(Err(join_error))) => {
                    warn!(error = %join_error, "worker task panicked; claim will expire");
                }
                Ok(None) | Err(_) => {}
            }
        }

        let stats = self.store.stats()?;
        let _ = self.progress.send(stats);
        info!(
            processed = stats.processed,
            failed = stats.failed,
            articles = stats.articles,
            "expansion finished"
        );
        Ok(stats)
    }

    fn worker_ctx(&self, clock: Clock) -> WorkerCtx {
        WorkerCtx {
            config: self.config.clone(),
            store: Arc::clone(&self.store),
            source: Arc::clone(&self.source),
            embedder: Arc::clone(&self.embedder),
            extractor: Arc::clone(&self.extractor),
            parser: Arc::clone(&self.parser),
            filter: Arc::clone(&self.filter),
            cancel: self.cancel.clone(),
            clock,
        }
    }

    fn emit_progress(&self, stats: PackStats, last_emit: &mut Option<Instant>) {
        let due = match last_emit {
            None => true,
            Some(at) => at.elapsed() >= Duration::from_secs(1),
        };
        if due {
            let _ = self.progress.send(stats);
            *last_emit = Some(Instant::now());
        }
    }

    fn handle_outcome(
        &self,
        outcome: WorkerOutcome,
        store_failures: &mut HashMap<String, u32>,
    ) -> Result<(), ExpansionError> {
        match outcome {
            WorkerOutcome::Processed { title, discovered } => {
                debug!(article = %title, discovered, "worker finished");
            }
            WorkerOutcome::Failed {
                title,
                terminal,
                reason,
            } => {
                if terminal {
                    warn!(article = %title, reason = %reason, "article failed");
                } else {
                    debug!(article = %title, reason = %reason, "article returned for retry");
                }
            }
            WorkerOutcome::Released { title } => {
                debug!(article = %title, "claim released on cancellation");
            }
            WorkerOutcome::StoreFailure { title, error } => {
                let count = store_failures.entry(title.clone()).or_insert(0);
                *count += 1;
                if *count > 1 {
                    // One retry per article on store errors; repeats are fatal.
                    return Err(ExpansionError::StoreAborted(title));
                }
                warn!(article = %title, error = %error, "store failure, will retry article once");
            }
        }
        Ok(())
    }
}

/// Pipeline-stage error with the classification the failure policy needs.
#[derive(Debug, Error)]
enum PipelineError {
    #[error("fetch: {0}")]
    Source(#[from] SourceError),

    #[error("embedding: {0}")]
    Embedding(#[from] EmbeddingError),

    #[error("extraction: {0}")]
    Llm(#[from] crate::llm::LlmError),

    #[error("store: {0}")]
    Store(#[from] StoreError),

    #[error("no sections after parsing")]
    EmptySections,
}

impl Classify for PipelineError {
    fn kind(&self) -> ErrorKind {
        match self {
            PipelineError::Source(e) => e.kind(),
            PipelineError::Embedding(e) => e.kind(),
            PipelineError::Llm(e) => e.kind(),
            PipelineError::Store(_) => ErrorKind::Storage,
            PipelineError::EmptySections => ErrorKind::InvalidContent,
        }
    }
}

/// Aborts the heartbeat task even if the worker future is dropped mid-way.
struct AbortOnDrop(tokio::task::JoinHandle<()>);

impl Drop for AbortOnDrop {
    fn drop(&mut self) {
        self.0.abort();
    }
}

async fn run_worker(ctx: WorkerCtx, article: ArticleRef) -> WorkerOutcome {
    let title = article.title.clone();

    // Refresh the claim at a third of the timeout; a stalled worker's claim
    // expires and claim_batch hands the article to someone else.
    let heartbeat = {
        let store = Arc::clone(&ctx.store);
        let clock = ctx.clock.clone();
        let hb_title = title.clone();
        let interval = ctx.config.heartbeat_timeout / 3;
        AbortOnDrop(tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.tick().await; // first tick fires immediately
            loop {
                ticker.tick().await;
                if store.refresh_claim(&hb_title, clock.now_ms()).is_err() {
                    break;
                }
            }
        }))
    };

    let outcome = tokio::select! {
        _ = ctx.cancel.cancelled() => {
            let _ = ctx.store.release_claim(&title);
            WorkerOutcome::Released { title }
        }
        result = process_article(&ctx, &article) => match result {
            Ok(discovered) => WorkerOutcome::Processed { title, discovered },
            Err(error) => settle_failure(&ctx, title, error),
        }
    };

    drop(heartbeat);
    outcome
}

/// Apply the failure policy for one pipeline error.
fn settle_failure(ctx: &WorkerCtx, title: String, error: PipelineError) -> WorkerOutcome {
    match error.kind() {
        ErrorKind::Storage => {
            let _ = ctx.store.release_claim(&title);
            WorkerOutcome::StoreFailure {
                title,
                error: error.to_string(),
            }
        }
        ErrorKind::Transient => {
            // Retries with backoff already happened per call; at the
            // article level this failure counts toward max_retries.
            let reason = error.to_string();
            let state = ctx
                .store
                .mark_failed(&title, &reason, ctx.config.max_retries)
                .unwrap_or(ArticleState::Failed);
            WorkerOutcome::Failed {
                title,
                terminal: state == ArticleState::Failed,
                reason,
            }
        }
        _ => {
            // Invalid content and schema violations are terminal per article.
            let reason = error.to_string();
            let _ = ctx.store.mark_failed(&title, &reason, 0);
            WorkerOutcome::Failed {
                title,
                terminal: true,
                reason,
            }
        }
    }
}

async fn process_article(ctx: &WorkerCtx, article: &ArticleRef) -> Result<usize, PipelineError> {
    let policy = RetryPolicy::new(ctx.config.max_retries);
    let title = article.title.clone();
    debug!(article = %title, depth = article.depth, "pipeline start");

    // --- fetch ---
    let page = {
        let source = Arc::clone(&ctx.source);
        let fetch_title = title.clone();
        let url = if article.url.is_empty() {
            None
        } else {
            Some(article.url.clone())
        };
        let timeout = ctx.config.fetch_timeout;
        retry_with_backoff(&policy, "fetch", move || {
            let source = Arc::clone(&source);
            let title = fetch_title.clone();
            let url = url.clone();
            async move {
                match tokio::time::timeout(timeout, source.fetch(&title, url.as_deref())).await {
                    Ok(result) => result,
                    Err(_) => Err(SourceError::Timeout),
                }
            }
        })
        .await?
    };
    ensure_substantial(&page, ctx.config.min_content_words)?;

    // --- parse ---
    let parsed = ctx.parser.parse(&title, &page.raw_text);
    if parsed.sections.is_empty() {
        return Err(PipelineError::EmptySections);
    }

    // --- persist contents: claimed → loaded ---
    ctx.store
        .write_article_contents(&title, &parsed.sections, &parsed.links, &parsed.categories)?;

    // --- embed ---
    let texts: Arc<Vec<String>> =
        Arc::new(parsed.sections.iter().map(|s| s.text.clone()).collect());
    let vectors = {
        let embedder = Arc::clone(&ctx.embedder);
        let texts = Arc::clone(&texts);
        let timeout = ctx.config.embed_timeout;
        let batch_tokens = ctx.config.embed_batch_tokens;
        retry_with_backoff(&policy, "embed", move || {
            let embedder = Arc::clone(&embedder);
            let texts = Arc::clone(&texts);
            async move {
                match tokio::time::timeout(
                    timeout,
                    embed_in_batches(embedder.as_ref(), &texts, batch_tokens),
                )
                .await
                {
                    Ok(result) => result,
                    Err(_) => Err(EmbeddingError::Timeout),
                }
            }
        })
        .await?
    };
    let pairs: Vec<(u32, Vec<f32>)> = parsed
        .sections
        .iter()
        .map(|s| s.ordinal)
        .zip(vectors)
        .collect();
    ctx.store.write_embeddings(&title, &pairs)?;

    // --- extract: loaded → processed ---
    let sections: Arc<Vec<NewSection>> = Arc::new(parsed.sections.clone());
    let (extraction, _usage) = {
        let extractor = Arc::clone(&ctx.extractor);
        let extract_title = title.clone();
        let sections = Arc::clone(&sections);
        let timeout = ctx.config.extract_timeout;
        retry_with_backoff(&policy, "extract", move || {
            let extractor = Arc::clone(&extractor);
            let title = extract_title.clone();
            let sections = Arc::clone(&sections);
            async move {
                match tokio::time::timeout(timeout, extractor.extract(&title, &sections)).await {
                    Ok(result) => result,
                    Err(_) => Err(crate::llm::LlmError::Timeout),
                }
            }
        })
        .await?
    };
    ctx.store.write_extractions(&title, &extraction)?;

    // --- discover links ---
    let next_depth = article.depth + 1;
    let mut discovered = 0usize;
    for link in &parsed.links {
        if !(ctx.filter)(link) {
            continue;
        }
        match ctx.store.article(link)? {
            Some(_) => {
                // Already known: only the depth minimum may improve.
                if next_depth <= ctx.config.max_depth {
                    ctx.store
                        .upsert_article(link, "", next_depth, ArticleState::Discovered)?;
                }
            }
            None => {
                if next_depth <= ctx.config.max_depth
                    && discovered < ctx.config.link_budget_per_article
                {
                    ctx.store
                        .upsert_article(link, "", next_depth, ArticleState::Discovered)?;
                    discovered += 1;
                }
            }
        }
    }

    info!(
        article = %title,
        sections = parsed.sections.len(),
        links = parsed.links.len(),
        discovered,
        "article processed"
    );
    Ok(discovered)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::MockLlm;
    use crate::source::FetchedPage;
    use crate::store::SqlitePackStore;
    use async_trait::async_trait;
    use std::collections::HashMap;

    const DIM: usize = 3;

    /// In-memory source: title → raw wikitext.
    struct MapSource {
        pages: HashMap<String, String>,
    }

    #[async_trait]
    impl SourceClient for MapSource {
        async fn fetch(
            &self,
            title: &str,
            _url: Option<&str>,
        ) -> Result<FetchedPage, SourceError> {
            match self.pages.get(title) {
                Some(raw) => Ok(FetchedPage {
                    title: title.to_string(),
                    url: format!("https://example.org/wiki/{}", title),
                    raw_text: raw.clone(),
                }),
                None => Err(SourceError::NotFound(title.to_string())),
            }
        }
    }

    struct HashEmbedder;

    #[async_trait]
    impl EmbeddingProvider for HashEmbedder {
        async fn embed_batch(
            &self,
            texts: &[String],
        ) -> Result<Vec<Vec<f32>>, crate::embed::EmbeddingError> {
            Ok(texts
                .iter()
                .map(|t| {
                    let h = t.len() as f32;
                    vec![1.0, h % 7.0, h % 3.0]
                })
                .collect())
        }
        fn dimension(&self) -> usize {
            DIM
        }
        fn model_id(&self) -> &str {
            "hash-embedder"
        }
    }

    fn page_with_links(links: &[&str]) -> String {
        let mut body = String::from("Lead paragraph with plenty of words. ");
        body.push_str(&"filler word ".repeat(120));
        for link in links {
            body.push_str(&format!("See [[{}]]. ", link));
        }
        body.push_str("\n== Details ==\nMore detail text here.\n");
        body
    }

    fn orchestrator(
        config: ExpansionConfig,
        pages: HashMap<String, String>,
    ) -> (Orchestrator, Arc<SqlitePackStore>) {
        let store = Arc::new(SqlitePackStore::open_in_memory(DIM).unwrap());
        let llm: Arc<dyn LlmClient> = Arc::new(
            MockLlm::new().with_default(r#"{"entities": [], "relations": [], "facts": []}"#),
        );
        let orchestrator = Orchestrator::new(
            config,
            store.clone(),
            Arc::new(MapSource { pages }),
            Arc::new(HashEmbedder),
            llm,
        );
        (orchestrator, store)
    }

    fn fast_config() -> ExpansionConfig {
        ExpansionConfig::default()
            .with_worker_count(2)
            .with_heartbeat_timeout(Duration::from_secs(5))
            .with_target_articles(10)
    }

    #[tokio::test]
    async fn empty_seed_list_fails_validation() {
        let (orchestrator, _) = orchestrator(fast_config(), HashMap::new());
        let err = orchestrator.run(&[]).await.unwrap_err();
        assert!(matches!(err, ExpansionError::Config(_)));
    }

    #[tokio::test]
    async fn single_seed_without_links_processes_and_drains() {
        let mut pages = HashMap::new();
        pages.insert("Solo".to_string(), page_with_links(&[]));
        let (orchestrator, store) = orchestrator(fast_config(), pages);

        let stats = orchestrator.run(&["Solo".to_string()]).await.unwrap();
        assert_eq!(stats.processed, 1);
        assert_eq!(stats.failed, 0);
        assert_eq!(
            store.article("Solo").unwrap().unwrap().state,
            ArticleState::Processed
        );
    }

    #[tokio::test]
    async fn discovers_linked_articles_up_to_depth() {
        let mut pages = HashMap::new();
        pages.insert("Root".to_string(), page_with_links(&["Child"]));
        pages.insert("Child".to_string(), page_with_links(&["Grandchild"]));
        pages.insert("Grandchild".to_string(), page_with_links(&[]));

        let config = fast_config().with_max_depth(1).with_target_articles(10);
        let (orchestrator, store) = orchestrator(config, pages);

        let stats = orchestrator.run(&["Root".to_string()]).await.unwrap();

        // Root (depth 0) and Child (depth 1) process; Grandchild would be
        // depth 2, beyond max_depth, so it was never discovered.
        assert_eq!(stats.processed, 2);
        assert!(store.article("Grandchild").unwrap().is_none());
        assert_eq!(store.article("Child").unwrap().unwrap().depth, 1);
    }

    #[tokio::test]
    async fn missing_page_fails_article_but_run_continues() {
        let mut pages = HashMap::new();
        pages.insert("Good".to_string(), page_with_links(&["Missing"]));
        let (orchestrator, store) = orchestrator(fast_config(), pages);

        let stats = orchestrator.run(&["Good".to_string()]).await.unwrap();
        assert_eq!(stats.processed, 1);
        assert_eq!(stats.failed, 1);
        assert_eq!(
            store.article("Missing").unwrap().unwrap().state,
            ArticleState::Failed
        );
    }

    #[tokio::test]
    async fn thin_pages_fail_with_reason() {
        let mut pages = HashMap::new();
        pages.insert("Stub".to_string(), "Barely any text.".to_string());
        let (orchestrator, store) = orchestrator(fast_config(), pages);

        let stats = orchestrator.run(&["Stub".to_string()]).await.unwrap();
        assert_eq!(stats.processed, 0);
        assert_eq!(stats.failed, 1);
        assert_eq!(
            store.article("Stub").unwrap().unwrap().state,
            ArticleState::Failed
        );
    }

    #[tokio::test]
    async fn link_budget_caps_discoveries() {
        let links: Vec<String> = (0..30).map(|i| format!("Target {}", i)).collect();
        let link_refs: Vec<&str> = links.iter().map(|s| s.as_str()).collect();
        let mut pages = HashMap::new();
        pages.insert("Hub".to_string(), page_with_links(&link_refs));

        let config = fast_config().with_target_articles(1).with_link_budget(5);
        let (orchestrator, store) = orchestrator(config, pages);

        orchestrator.run(&["Hub".to_string()]).await.unwrap();

        let stats = store.stats().unwrap();
        // Hub itself plus at most 5 discovered placeholders.
        assert!(stats.articles <= 6, "articles = {}", stats.articles);
    }

    #[tokio::test]
    async fn cancellation_stops_claims_and_releases() {
        let mut pages = HashMap::new();
        for i in 0..20 {
            pages.insert(format!("Page {}", i), page_with_links(&[]));
        }
        let seeds: Vec<String> = (0..20).map(|i| format!("Page {}", i)).collect();

        let (orchestrator, store) = orchestrator(fast_config().with_target_articles(100), pages);
        let cancel = orchestrator.cancellation_token();
        cancel.cancel();

        let stats = orchestrator.run(&seeds).await.unwrap();
        assert_eq!(stats.processed, 0);

        // Nothing left holding a claim.
        assert_eq!(store.stats().unwrap().claimed, 0);
    }

    #[tokio::test]
    async fn progress_channel_reports_terminal_stats() {
        let mut pages = HashMap::new();
        pages.insert("Only".to_string(), page_with_links(&[]));
        let (orchestrator, _) = orchestrator(fast_config(), pages);

        let progress = orchestrator.progress();
        orchestrator.run(&["Only".to_string()]).await.unwrap();

        let last = *progress.borrow();
        assert_eq!(last.processed, 1);
    }

    #[tokio::test]
    async fn seeds_are_normalized_before_insertion() {
        let mut pages = HashMap::new();
        pages.insert("Isaac Newton".to_string(), page_with_links(&[]));
        let (orchestrator, store) = orchestrator(fast_config(), pages);

        orchestrator.run(&["isaac_newton".to_string()]).await.unwrap();
        assert!(store.article("Isaac Newton").unwrap().is_some());
    }
}
