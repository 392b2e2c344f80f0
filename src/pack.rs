//! Pack directory layout and metadata
//!
//! A pack is a directory: `pack.db` (the graph + vector store),
//! `pack.json` (the metadata record external packaging tools read —
//! field names are stable), `seeds.txt`, and an optional `fewshot.json`.
//!
//! The metadata pins the embedding model and dimension; opening a pack
//! with a different provider fails fast rather than mixing vector spaces.

use crate::embed::EmbeddingProvider;
use crate::parser::normalize_title;
use crate::store::{PackStore, SqlitePackStore, StoreError};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;
use uuid::Uuid;

pub const DB_FILE: &str = "pack.db";
pub const METADATA_FILE: &str = "pack.json";
pub const SEEDS_FILE: &str = "seeds.txt";
pub const FEWSHOT_FILE: &str = "fewshot.json";

/// Errors from pack-level operations
#[derive(Debug, Error)]
pub enum PackError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("metadata error: {0}")]
    Metadata(#[from] serde_json::Error),

    #[error("store error: {0}")]
    Store(#[from] StoreError),

    #[error("embedding model mismatch: pack built with '{pack}', provider is '{provider}'")]
    ModelMismatch { pack: String, provider: String },

    #[error("embedding dimension mismatch: pack is {pack}, provider is {provider}")]
    DimensionMismatch { pack: usize, provider: usize },

    #[error("seed list at {} is empty", .0.display())]
    EmptySeeds(PathBuf),
}

/// The metadata record written alongside the store. This is the contract
/// with external packaging and distribution tools; field names are stable.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PackMetadata {
    pub pack_id: String,
    pub version: String,
    pub article_count: u64,
    pub entity_count: u64,
    pub relationship_count: u64,
    pub embedding_model: String,
    pub embedding_dim: usize,
    pub build_time: String,
}

/// An opened pack: the store plus its pinned metadata.
pub struct Pack {
    dir: PathBuf,
    metadata: PackMetadata,
    store: Arc<SqlitePackStore>,
}

impl std::fmt::Debug for Pack {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pack")
            .field("dir", &self.dir)
            .field("metadata", &self.metadata)
            .finish()
    }
}

impl Pack {
    /// Create a fresh pack directory for the given embedding provider.
    pub fn create(dir: impl AsRef<Path>, provider: &dyn EmbeddingProvider) -> Result<Self, PackError> {
        let dir = dir.as_ref().to_path_buf();
        std::fs::create_dir_all(&dir)?;

        let metadata = PackMetadata {
            pack_id: Uuid::new_v4().to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            article_count: 0,
            entity_count: 0,
            relationship_count: 0,
            embedding_model: provider.model_id().to_string(),
            embedding_dim: provider.dimension(),
            build_time: Utc::now().to_rfc3339(),
        };
        write_metadata(&dir, &metadata)?;

        let store = SqlitePackStore::open(dir.join(DB_FILE), metadata.embedding_dim)?;
        Ok(Self {
            dir,
            metadata,
            store: Arc::new(store),
        })
    }

    /// Open an existing pack, validating the provider against the pack's
    /// pinned embedding model and dimension. Mixing is forbidden.
    pub fn open(dir: impl AsRef<Path>, provider: &dyn EmbeddingProvider) -> Result<Self, PackError> {
        let dir = dir.as_ref().to_path_buf();
        let metadata = read_metadata(&dir)?;

        if metadata.embedding_model != provider.model_id() {
            return Err(PackError::ModelMismatch {
                pack: metadata.embedding_model,
                provider: provider.model_id().to_string(),
            });
        }
        if metadata.embedding_dim != provider.dimension() {
            return Err(PackError::DimensionMismatch {
                pack: metadata.embedding_dim,
                provider: provider.dimension(),
            });
        }

        let store = SqlitePackStore::open(dir.join(DB_FILE), metadata.embedding_dim)?;
        Ok(Self {
            dir,
            metadata,
            store: Arc::new(store),
        })
    }

    pub fn metadata(&self) -> &PackMetadata {
        &self.metadata
    }

    pub fn store(&self) -> Arc<SqlitePackStore> {
        Arc::clone(&self.store)
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn fewshot_path(&self) -> PathBuf {
        self.dir.join(FEWSHOT_FILE)
    }

    pub fn seeds_path(&self) -> PathBuf {
        self.dir.join(SEEDS_FILE)
    }

    /// Refresh the counts in `pack.json` from the store after expansion.
    pub fn finalize(&mut self) -> Result<(), PackError> {
        let stats = self.store.stats()?;
        self.metadata.article_count = stats.processed;
        self.metadata.entity_count = stats.entities;
        self.metadata.relationship_count = stats.relations;
        write_metadata(&self.dir, &self.metadata)
    }
}

fn write_metadata(dir: &Path, metadata: &PackMetadata) -> Result<(), PackError> {
    let json = serde_json::to_string_pretty(metadata)?;
    std::fs::write(dir.join(METADATA_FILE), json)?;
    Ok(())
}

fn read_metadata(dir: &Path) -> Result<PackMetadata, PackError> {
    let json = std::fs::read_to_string(dir.join(METADATA_FILE))?;
    Ok(serde_json::from_str(&json)?)
}

/// Read a seed list: one title per line, `#` comments and blanks skipped,
/// titles normalized through the canonical rules.
pub fn read_seed_file(path: impl AsRef<Path>) -> Result<Vec<String>, PackError> {
    let path = path.as_ref();
    let content = std::fs::read_to_string(path)?;
    let seeds: Vec<String> = content
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .map(normalize_title)
        .filter(|title| !title.is_empty())
        .collect();
    if seeds.is_empty() {
        return Err(PackError::EmptySeeds(path.to_path_buf()));
    }
    Ok(seeds)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embed::EmbeddingError;
    use async_trait::async_trait;

    struct FixedProvider {
        model: &'static str,
        dim: usize,
    }

    #[async_trait]
    impl EmbeddingProvider for FixedProvider {
        async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
            Ok(texts.iter().map(|_| vec![0.0; self.dim]).collect())
        }
        fn dimension(&self) -> usize {
            self.dim
        }
        fn model_id(&self) -> &str {
            self.model
        }
    }

    #[test]
    fn create_then_open_round_trips_metadata() {
        let dir = tempfile::tempdir().unwrap();
        let provider = FixedProvider { model: "test-model", dim: 4 };

        let pack = Pack::create(dir.path().join("physics"), &provider).unwrap();
        let id = pack.metadata().pack_id.clone();
        drop(pack);

        let pack = Pack::open(dir.path().join("physics"), &provider).unwrap();
        assert_eq!(pack.metadata().pack_id, id);
        assert_eq!(pack.metadata().embedding_model, "test-model");
        assert_eq!(pack.metadata().embedding_dim, 4);
    }

    #[test]
    fn open_rejects_model_mismatch() {
        let dir = tempfile::tempdir().unwrap();
        let built_with = FixedProvider { model: "model-a", dim: 4 };
        Pack::create(dir.path(), &built_with).unwrap();

        let other = FixedProvider { model: "model-b", dim: 4 };
        let err = Pack::open(dir.path(), &other).unwrap_err();
        assert!(matches!(err, PackError::ModelMismatch { .. }));
    }

    #[test]
    fn open_rejects_dimension_mismatch() {
        let dir = tempfile::tempdir().unwrap();
        let built_with = FixedProvider { model: "m", dim: 4 };
        Pack::create(dir.path(), &built_with).unwrap();

        let other = FixedProvider { model: "m", dim: 8 };
        let err = Pack::open(dir.path(), &other).unwrap_err();
        assert!(matches!(
            err,
            PackError::DimensionMismatch { pack: 4, provider: 8 }
        ));
    }

    #[test]
    fn finalize_updates_counts_from_store() {
        let dir = tempfile::tempdir().unwrap();
        let provider = FixedProvider { model: "m", dim: 3 };
        let mut pack = Pack::create(dir.path(), &provider).unwrap();

        use crate::store::{ArticleState, Extraction, NewSection, PackStore};
        let store = pack.store();
        store
            .upsert_article("A", "u", 0, ArticleState::Discovered)
            .unwrap();
        store.claim_batch(1, 1_000, 60_000).unwrap();
        store
            .write_article_contents(
                "A",
                &[NewSection {
                    ordinal: 0,
                    heading: "A".to_string(),
                    level: 1,
                    text: "text".to_string(),
                    word_count: 1,
                }],
                &[],
                &[],
            )
            .unwrap();
        store.write_embeddings("A", &[(0, vec![1.0, 0.0, 0.0])]).unwrap();
        store.write_extractions("A", &Extraction::default()).unwrap();

        pack.finalize().unwrap();
        assert_eq!(pack.metadata().article_count, 1);

        let reread = read_metadata(pack.dir()).unwrap();
        assert_eq!(reread.article_count, 1);
    }

    #[test]
    fn seed_file_skips_comments_and_normalizes() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(SEEDS_FILE);
        std::fs::write(&path, "# physics pack\nNewton's_laws_of_motion\n\n  gravity  \n").unwrap();

        let seeds = read_seed_file(&path).unwrap();
        assert_eq!(
            seeds,
            vec!["Newton's laws of motion".to_string(), "Gravity".to_string()]
        );
    }

    #[test]
    fn empty_seed_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(SEEDS_FILE);
        std::fs::write(&path, "# only comments\n").unwrap();
        assert!(matches!(
            read_seed_file(&path),
            Err(PackError::EmptySeeds(_))
        ));
    }
}
