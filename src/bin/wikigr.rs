//! WikiGR CLI — build and query knowledge packs.
//!
//! Usage:
//!   wikigr expand --pack path --seeds seeds.txt [--target N] [--depth D]
//!   wikigr query --pack path "question"
//!   wikigr stats --pack path

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use wikigr::source::SourceClientExt;
use wikigr::{
    ExpansionConfig, FileFewShotSource, HttpLlmClient, LlmConfig, Orchestrator, Pack,
    RetrievalAgent, RetrievalConfig, WikipediaClient,
};

#[derive(Parser)]
#[command(
    name = "wikigr",
    version,
    about = "Knowledge-pack expansion engine and retrieval agent"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Expand a pack from seed articles until the target size is reached
    Expand {
        /// Pack directory (created if absent)
        #[arg(long)]
        pack: Option<PathBuf>,
        /// Seed list file, one title per line
        #[arg(long)]
        seeds: PathBuf,
        /// Stop once this many articles are processed
        #[arg(long, default_value_t = 100)]
        target: u64,
        /// Maximum link depth from the seeds
        #[arg(long, default_value_t = 2)]
        depth: u32,
        /// Parallel workers
        #[arg(long, default_value_t = 4)]
        workers: usize,
    },
    /// Answer a question against a built pack
    Query {
        /// Pack directory
        #[arg(long)]
        pack: Option<PathBuf>,
        /// The question to answer
        question: String,
        /// Maximum source articles
        #[arg(long)]
        max_results: Option<usize>,
    },
    /// Print pack statistics
    Stats {
        /// Pack directory
        #[arg(long)]
        pack: Option<PathBuf>,
    },
}

fn default_pack_dir() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("wikigr")
        .join("default-pack")
}

fn llm_from_env() -> Result<HttpLlmClient, Box<dyn std::error::Error>> {
    let mut config = LlmConfig::default();
    if let Ok(key) = std::env::var("WIKIGR_LLM_API_KEY") {
        config.api_key = Some(key);
    }
    if let Ok(model) = std::env::var("WIKIGR_LLM_MODEL") {
        config.model = model;
    }
    if let Ok(endpoint) = std::env::var("WIKIGR_LLM_ENDPOINT") {
        config.endpoint = endpoint;
    }
    Ok(HttpLlmClient::new(config)?)
}

#[cfg(feature = "embeddings")]
fn embedder() -> Result<Arc<dyn wikigr::EmbeddingProvider>, Box<dyn std::error::Error>> {
    Ok(Arc::new(wikigr::embed::FastEmbedProvider::default_model()?))
}

#[cfg(not(feature = "embeddings"))]
fn embedder() -> Result<Arc<dyn wikigr::EmbeddingProvider>, Box<dyn std::error::Error>> {
    Err("this build has no embedding provider; rebuild with --features embeddings".into())
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt().with_target(false).init();

    let cli = Cli::parse();
    match cli.command {
        Commands::Expand {
            pack,
            seeds,
            target,
            depth,
            workers,
        } => {
            let pack_dir = pack.unwrap_or_else(default_pack_dir);
            let provider = embedder()?;
            let mut pack = if pack_dir.join(wikigr::pack::METADATA_FILE).exists() {
                Pack::open(&pack_dir, provider.as_ref())?
            } else {
                Pack::create(&pack_dir, provider.as_ref())?
            };
            let seed_titles = wikigr::read_seed_file(&seeds)?;

            let config = ExpansionConfig::default()
                .with_target_articles(target)
                .with_max_depth(depth)
                .with_worker_count(workers);
            let source = WikipediaClient::new()?.rate_limited(2);
            let orchestrator = Orchestrator::new(
                config,
                pack.store(),
                Arc::new(source),
                provider,
                Arc::new(llm_from_env()?),
            );

            let stats = orchestrator.run(&seed_titles).await?;
            pack.finalize()?;
            println!(
                "processed {} articles ({} failed, {} entities, {} relations)",
                stats.processed, stats.failed, stats.entities, stats.relations
            );
        }
        Commands::Query {
            pack,
            question,
            max_results,
        } => {
            let pack_dir = pack.unwrap_or_else(default_pack_dir);
            let provider = embedder()?;
            let pack = Pack::open(&pack_dir, provider.as_ref())?;

            let agent = RetrievalAgent::new(
                RetrievalConfig::default(),
                pack.store(),
                provider,
                Arc::new(llm_from_env()?),
            )?
            .with_fewshot_source(&FileFewShotSource::new(pack.fewshot_path()))?;

            let response = agent.query(&question, max_results).await;
            println!("{}", response.answer);
            if !response.sources.is_empty() {
                println!("\nSources: {}", response.sources.join(", "));
            }
            println!("[{}]", response.query_type.as_str());
        }
        Commands::Stats { pack } => {
            let pack_dir = pack.unwrap_or_else(default_pack_dir);
            use wikigr::PackStore;
            let metadata_path = pack_dir.join(wikigr::pack::METADATA_FILE);
            let metadata: wikigr::PackMetadata =
                serde_json::from_str(&std::fs::read_to_string(metadata_path)?)?;
            let store =
                wikigr::SqlitePackStore::open(pack_dir.join(wikigr::pack::DB_FILE), metadata.embedding_dim)?;
            let stats = store.stats()?;
            println!(
                "pack {} ({} dims, model {})",
                metadata.pack_id, metadata.embedding_dim, metadata.embedding_model
            );
            println!(
                "articles: {} (processed {}, discovered {}, failed {})",
                stats.articles, stats.processed, stats.discovered, stats.failed
            );
            println!(
                "sections: {}  entities: {}  relations: {}",
                stats.sections, stats.entities, stats.relations
            );
        }
    }
    Ok(())
}
