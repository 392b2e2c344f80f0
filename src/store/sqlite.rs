//! SQLite pack store backend
//!
//! One database file per pack holds the whole graph: articles, sections,
//! entities, facts, link edges, and the sqlite-vec index over section
//! embeddings. All multi-row writes for an article run in one transaction,
//! so a crashed worker leaves the article fully in its prior state or fully
//! in the new state.

use super::traits::{
    ArticleRef, ArticleState, Direction, EntityRecord, Extraction, NewSection, PackStats,
    PackStore, SectionHit, SectionRow, StoreError, StoreResult,
};
use super::vector::register_vec_extension;
use rusqlite::{params, Connection, OptionalExtension, Transaction};
use std::path::Path;
use std::sync::Mutex;

/// SQLite-backed pack store
///
/// Thread-safe via an internal mutex on the connection; the mutex plus
/// per-call transactions make `claim_batch` linearizable under concurrent
/// workers. WAL mode keeps retrieval reads cheap while expansion writes.
pub struct SqlitePackStore {
    conn: Mutex<Connection>,
    dimension: usize,
}

impl SqlitePackStore {
    /// Open or create a pack database at the given path.
    pub fn open(path: impl AsRef<Path>, dimension: usize) -> StoreResult<Self> {
        if let Some(parent) = path.as_ref().parent() {
            std::fs::create_dir_all(parent)?;
        }
        register_vec_extension();
        let conn = Connection::open(path)?;
        Self::init(conn, dimension)
    }

    /// Create an in-memory pack store (useful for testing).
    pub fn open_in_memory(dimension: usize) -> StoreResult<Self> {
        register_vec_extension();
        let conn = Connection::open_in_memory()?;
        Self::init(conn, dimension)
    }

    fn init(conn: Connection, dimension: usize) -> StoreResult<Self> {
        Self::init_schema(&conn, dimension)?;
        Ok(Self {
            conn: Mutex::new(conn),
            dimension,
        })
    }

    /// The embedding dimensionality this store was opened with.
    pub fn dimension(&self) -> usize {
        self.dimension
    }

    fn init_schema(conn: &Connection, dimension: usize) -> StoreResult<()> {
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS articles (
                title TEXT PRIMARY KEY,
                url TEXT NOT NULL DEFAULT '',
                category TEXT,
                word_count INTEGER NOT NULL DEFAULT 0,
                state TEXT NOT NULL DEFAULT 'discovered',
                depth INTEGER NOT NULL DEFAULT 0,
                claimed_at INTEGER,
                retry_count INTEGER NOT NULL DEFAULT 0,
                fail_reason TEXT
            );

            CREATE INDEX IF NOT EXISTS idx_articles_state
                ON articles(state, depth);

            CREATE TABLE IF NOT EXISTS sections (
                id INTEGER PRIMARY KEY,
                article_title TEXT NOT NULL,
                ordinal INTEGER NOT NULL,
                heading TEXT NOT NULL,
                level INTEGER NOT NULL,
                text TEXT NOT NULL,
                word_count INTEGER NOT NULL,
                has_embedding INTEGER NOT NULL DEFAULT 0,
                UNIQUE(article_title, ordinal)
            );

            CREATE INDEX IF NOT EXISTS idx_sections_article
                ON sections(article_title);

            CREATE TABLE IF NOT EXISTS entities (
                id INTEGER PRIMARY KEY,
                name TEXT NOT NULL,
                name_lower TEXT NOT NULL,
                entity_type TEXT NOT NULL,
                description TEXT NOT NULL DEFAULT '',
                article_count INTEGER NOT NULL DEFAULT 0,
                UNIQUE(name_lower, entity_type)
            );

            CREATE TABLE IF NOT EXISTS facts (
                id INTEGER PRIMARY KEY,
                text TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS categories (
                name TEXT PRIMARY KEY
            );

            CREATE TABLE IF NOT EXISTS links (
                source_title TEXT NOT NULL,
                target_title TEXT NOT NULL,
                UNIQUE(source_title, target_title)
            );

            CREATE INDEX IF NOT EXISTS idx_links_target
                ON links(target_title);

            CREATE TABLE IF NOT EXISTS article_categories (
                article_title TEXT NOT NULL,
                category_name TEXT NOT NULL,
                UNIQUE(article_title, category_name)
            );

            CREATE TABLE IF NOT EXISTS mentions (
                section_id INTEGER NOT NULL,
                entity_id INTEGER NOT NULL,
                UNIQUE(section_id, entity_id)
            );

            CREATE TABLE IF NOT EXISTS entity_relations (
                source_entity_id INTEGER NOT NULL,
                target_entity_id INTEGER NOT NULL,
                predicate TEXT NOT NULL,
                UNIQUE(source_entity_id, target_entity_id, predicate)
            );

            CREATE TABLE IF NOT EXISTS section_facts (
                section_id INTEGER NOT NULL,
                fact_id INTEGER NOT NULL,
                UNIQUE(section_id, fact_id)
            );

            PRAGMA journal_mode = WAL;
            "#,
        )?;

        // vec0 virtual tables can't use IF NOT EXISTS on older sqlite-vec
        // builds inside execute_batch with the rest, so create it separately.
        let create_vec = format!(
            "CREATE VIRTUAL TABLE IF NOT EXISTS section_vectors USING vec0(\
                 section_id INTEGER,\
                 embedding float[{}]\
             )",
            dimension
        );
        conn.execute_batch(&create_vec)?;

        Ok(())
    }

    fn row_to_article(row: &rusqlite::Row<'_>) -> rusqlite::Result<ArticleRef> {
        let state_str: String = row.get(2)?;
        Ok(ArticleRef {
            title: row.get(0)?,
            url: row.get(1)?,
            state: ArticleState::parse(&state_str).unwrap_or(ArticleState::Discovered),
            depth: row.get(3)?,
            retry_count: row.get(4)?,
            claimed_at: row.get(5)?,
        })
    }

    fn load_article(conn: &Connection, title: &str) -> StoreResult<Option<ArticleRef>> {
        let article = conn
            .query_row(
                "SELECT title, url, state, depth, retry_count, claimed_at
                 FROM articles WHERE title = ?1",
                params![title],
                Self::row_to_article,
            )
            .optional()?;
        Ok(article)
    }

    /// Load an article and check it is in the expected state.
    fn expect_state(
        conn: &Connection,
        title: &str,
        expected: &[ArticleState],
    ) -> StoreResult<ArticleRef> {
        let article = Self::load_article(conn, title)?
            .ok_or_else(|| StoreError::ArticleNotFound(title.to_string()))?;
        if !expected.contains(&article.state) {
            return Err(StoreError::InvalidTransition {
                title: title.to_string(),
                from: article.state,
                to: expected[0],
            });
        }
        Ok(article)
    }

    fn delete_section_rows(tx: &Transaction<'_>, title: &str) -> StoreResult<()> {
        tx.execute(
            "DELETE FROM section_vectors WHERE section_id IN
                 (SELECT id FROM sections WHERE article_title = ?1)",
            params![title],
        )?;
        tx.execute(
            "DELETE FROM mentions WHERE section_id IN
                 (SELECT id FROM sections WHERE article_title = ?1)",
            params![title],
        )?;
        tx.execute(
            "DELETE FROM section_facts WHERE section_id IN
                 (SELECT id FROM sections WHERE article_title = ?1)",
            params![title],
        )?;
        tx.execute("DELETE FROM sections WHERE article_title = ?1", params![title])?;
        Ok(())
    }

    /// Insert or reuse an entity, returning its id. Existing entities are
    /// matched by `(lower(name), type)`; an empty stored description is
    /// filled in from the new record.
    fn merge_entity(tx: &Transaction<'_>, entity: &EntityRecord) -> StoreResult<i64> {
        let name_lower = entity.name.trim().to_lowercase();
        let existing: Option<(i64, String)> = tx
            .query_row(
                "SELECT id, description FROM entities
                 WHERE name_lower = ?1 AND entity_type = ?2",
                params![name_lower, entity.entity_type],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()?;

        match existing {
            Some((id, description)) => {
                if description.is_empty() && !entity.description.is_empty() {
                    tx.execute(
                        "UPDATE entities SET description = ?1 WHERE id = ?2",
                        params![entity.description, id],
                    )?;
                }
                Ok(id)
            }
            None => {
                tx.execute(
                    "INSERT INTO entities (name, name_lower, entity_type, description)
                     VALUES (?1, ?2, ?3, ?4)",
                    params![
                        entity.name.trim(),
                        name_lower,
                        entity.entity_type,
                        entity.description
                    ],
                )?;
                Ok(tx.last_insert_rowid())
            }
        }
    }

    /// Sections of `title` whose text mentions `needle` (case-insensitive).
    /// Falls back to the lead section so every entity keeps a MENTIONS edge.
    fn mentioning_sections(
        tx: &Transaction<'_>,
        title: &str,
        needle: &str,
    ) -> StoreResult<Vec<i64>> {
        let mut stmt = tx.prepare(
            "SELECT id, text FROM sections WHERE article_title = ?1 ORDER BY ordinal",
        )?;
        let rows: Vec<(i64, String)> = stmt
            .query_map(params![title], |row| Ok((row.get(0)?, row.get(1)?)))?
            .collect::<Result<_, _>>()?;

        let needle_lower = needle.to_lowercase();
        let matching: Vec<i64> = rows
            .iter()
            .filter(|(_, text)| text.to_lowercase().contains(&needle_lower))
            .map(|(id, _)| *id)
            .collect();

        if matching.is_empty() {
            Ok(rows.first().map(|(id, _)| *id).into_iter().collect())
        } else {
            Ok(matching)
        }
    }

    fn lead_section_id(tx: &Transaction<'_>, title: &str) -> StoreResult<Option<i64>> {
        let id = tx
            .query_row(
                "SELECT id FROM sections WHERE article_title = ?1 ORDER BY ordinal LIMIT 1",
                params![title],
                |row| row.get(0),
            )
            .optional()?;
        Ok(id)
    }
}

impl PackStore for SqlitePackStore {
    fn upsert_article(
        &self,
        title: &str,
        url: &str,
        depth: u32,
        initial_state: ArticleState,
    ) -> StoreResult<()> {
        let mut conn = self.conn.lock().unwrap();
        let tx = conn.transaction()?;

        match Self::load_article(&tx, title)? {
            None => {
                tx.execute(
                    "INSERT INTO articles (title, url, state, depth) VALUES (?1, ?2, ?3, ?4)",
                    params![title, url, initial_state.as_str(), depth],
                )?;
            }
            Some(existing) => {
                // Depth never increases; state never regresses.
                let new_depth = existing.depth.min(depth);
                let new_state = if initial_state.rank() > existing.state.rank()
                    && existing.state != ArticleState::Failed
                {
                    initial_state
                } else {
                    existing.state
                };
                let new_url = if existing.url.is_empty() {
                    url
                } else {
                    existing.url.as_str()
                };
                tx.execute(
                    "UPDATE articles SET url = ?1, depth = ?2, state = ?3 WHERE title = ?4",
                    params![new_url, new_depth, new_state.as_str(), title],
                )?;
            }
        }

        tx.commit()?;
        Ok(())
    }

    fn claim_batch(
        &self,
        limit: usize,
        now_ms: i64,
        heartbeat_timeout_ms: i64,
    ) -> StoreResult<Vec<ArticleRef>> {
        let mut conn = self.conn.lock().unwrap();
        let tx = conn.transaction()?;
        let stale_before = now_ms - heartbeat_timeout_ms;

        let claimable: Vec<ArticleRef> = {
            let mut stmt = tx.prepare(
                "SELECT title, url, state, depth, retry_count, claimed_at
                 FROM articles
                 WHERE state = 'discovered'
                    OR (state = 'claimed' AND claimed_at < ?1)
                 ORDER BY depth ASC, rowid ASC
                 LIMIT ?2",
            )?;
            let rows = stmt
                .query_map(params![stale_before, limit as i64], Self::row_to_article)?
                .collect::<Result<_, _>>()?;
            rows
        };

        let mut claimed = Vec::with_capacity(claimable.len());
        for mut article in claimable {
            tx.execute(
                "UPDATE articles SET state = 'claimed', claimed_at = ?1 WHERE title = ?2",
                params![now_ms, article.title],
            )?;
            article.state = ArticleState::Claimed;
            article.claimed_at = Some(now_ms);
            claimed.push(article);
        }

        tx.commit()?;
        Ok(claimed)
    }

    fn refresh_claim(&self, title: &str, now_ms: i64) -> StoreResult<()> {
        let conn = self.conn.lock().unwrap();
        let updated = conn.execute(
            "UPDATE articles SET claimed_at = ?1
             WHERE title = ?2 AND state IN ('claimed', 'loaded')",
            params![now_ms, title],
        )?;
        if updated == 0 {
            return Err(StoreError::ArticleNotFound(title.to_string()));
        }
        Ok(())
    }

    fn release_claim(&self, title: &str) -> StoreResult<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "UPDATE articles SET state = 'discovered', claimed_at = NULL
             WHERE title = ?1 AND state IN ('claimed', 'loaded')",
            params![title],
        )?;
        Ok(())
    }

    fn write_article_contents(
        &self,
        title: &str,
        sections: &[NewSection],
        links: &[String],
        categories: &[String],
    ) -> StoreResult<()> {
        let mut conn = self.conn.lock().unwrap();
        let tx = conn.transaction()?;

        Self::expect_state(&tx, title, &[ArticleState::Claimed])?;
        Self::delete_section_rows(&tx, title)?;

        let mut total_words: u32 = 0;
        for section in sections {
            tx.execute(
                "INSERT INTO sections (article_title, ordinal, heading, level, text, word_count)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![
                    title,
                    section.ordinal,
                    section.heading,
                    section.level,
                    section.text,
                    section.word_count
                ],
            )?;
            total_words += section.word_count;
        }

        tx.execute("DELETE FROM links WHERE source_title = ?1", params![title])?;
        for target in links {
            tx.execute(
                "INSERT OR IGNORE INTO links (source_title, target_title) VALUES (?1, ?2)",
                params![title, target],
            )?;
        }

        for category in categories {
            tx.execute(
                "INSERT OR IGNORE INTO categories (name) VALUES (?1)",
                params![category],
            )?;
            tx.execute(
                "INSERT OR IGNORE INTO article_categories (article_title, category_name)
                 VALUES (?1, ?2)",
                params![title, category],
            )?;
        }

        tx.execute(
            "UPDATE articles SET state = 'loaded', word_count = ?1, category = ?2
             WHERE title = ?3",
            params![total_words, categories.first(), title],
        )?;

        tx.commit()?;
        Ok(())
    }

    fn write_embeddings(&self, title: &str, embeddings: &[(u32, Vec<f32>)]) -> StoreResult<()> {
        for (_, vector) in embeddings {
            if vector.len() != self.dimension {
                return Err(StoreError::DimensionMismatch {
                    expected: self.dimension,
                    got: vector.len(),
                });
            }
        }

        let mut conn = self.conn.lock().unwrap();
        let tx = conn.transaction()?;

        for (ordinal, vector) in embeddings {
            let section_id: i64 = tx
                .query_row(
                    "SELECT id FROM sections WHERE article_title = ?1 AND ordinal = ?2",
                    params![title, ordinal],
                    |row| row.get(0),
                )
                .optional()?
                .ok_or_else(|| {
                    StoreError::ArticleNotFound(format!("{} section {}", title, ordinal))
                })?;

            let mut normalized = vector.clone();
            super::vector::l2_normalize(&mut normalized);
            let bytes = super::vector::vec_as_bytes(&normalized);

            tx.execute(
                "DELETE FROM section_vectors WHERE section_id = ?1",
                params![section_id],
            )?;
            tx.execute(
                "INSERT INTO section_vectors (section_id, embedding) VALUES (?1, ?2)",
                params![section_id, bytes],
            )?;
            tx.execute(
                "UPDATE sections SET has_embedding = 1 WHERE id = ?1",
                params![section_id],
            )?;
        }

        tx.commit()?;
        Ok(())
    }

    fn write_extractions(&self, title: &str, extraction: &Extraction) -> StoreResult<()> {
        let mut conn = self.conn.lock().unwrap();
        let tx = conn.transaction()?;

        // Re-running on an already-processed article is a no-op transition;
        // entity merging below is idempotent by the unique constraints.
        Self::expect_state(&tx, title, &[ArticleState::Loaded, ArticleState::Processed])?;

        // Processed implies every section is embedded.
        let unembedded: i64 = tx.query_row(
            "SELECT COUNT(*) FROM sections WHERE article_title = ?1 AND has_embedding = 0",
            params![title],
            |row| row.get(0),
        )?;
        if unembedded > 0 {
            return Err(StoreError::Vector(format!(
                "{} sections of '{}' lack embeddings",
                unembedded, title
            )));
        }

        let mut entity_ids: Vec<(String, i64)> = Vec::with_capacity(extraction.entities.len());
        for entity in &extraction.entities {
            if entity.name.trim().is_empty() {
                continue;
            }
            let id = Self::merge_entity(&tx, entity)?;
            let key = entity.name.trim().to_lowercase();
            if !entity_ids.iter().any(|(k, _)| *k == key) {
                entity_ids.push((key, id));
            }

            for section_id in Self::mentioning_sections(&tx, title, entity.name.trim())? {
                tx.execute(
                    "INSERT OR IGNORE INTO mentions (section_id, entity_id) VALUES (?1, ?2)",
                    params![section_id, id],
                )?;
            }

            tx.execute(
                "UPDATE entities SET article_count =
                     (SELECT COUNT(DISTINCT s.article_title)
                      FROM mentions m JOIN sections s ON s.id = m.section_id
                      WHERE m.entity_id = ?1)
                 WHERE id = ?1",
                params![id],
            )?;
        }

        let lookup = |name: &str| -> Option<i64> {
            let key = name.trim().to_lowercase();
            entity_ids.iter().find(|(k, _)| *k == key).map(|(_, id)| *id)
        };

        for relation in &extraction.relations {
            // Relations referencing entities absent from this extraction are dropped.
            let (Some(source_id), Some(target_id)) =
                (lookup(&relation.source), lookup(&relation.target))
            else {
                continue;
            };
            tx.execute(
                "INSERT OR IGNORE INTO entity_relations
                     (source_entity_id, target_entity_id, predicate)
                 VALUES (?1, ?2, ?3)",
                params![source_id, target_id, relation.predicate.trim()],
            )?;
        }

        if let Some(lead_id) = Self::lead_section_id(&tx, title)? {
            for fact in &extraction.facts {
                let text = fact.trim();
                if text.is_empty() {
                    continue;
                }
                let existing: Option<i64> = tx
                    .query_row(
                        "SELECT f.id FROM facts f
                         JOIN section_facts sf ON sf.fact_id = f.id
                         WHERE sf.section_id = ?1 AND f.text = ?2",
                        params![lead_id, text],
                        |row| row.get(0),
                    )
                    .optional()?;
                if existing.is_some() {
                    continue;
                }
                tx.execute("INSERT INTO facts (text) VALUES (?1)", params![text])?;
                let fact_id = tx.last_insert_rowid();
                tx.execute(
                    "INSERT INTO section_facts (section_id, fact_id) VALUES (?1, ?2)",
                    params![lead_id, fact_id],
                )?;
            }
        }

        tx.execute(
            "UPDATE articles SET state = 'processed', claimed_at = NULL WHERE title = ?1",
            params![title],
        )?;

        tx.commit()?;
        Ok(())
    }

    fn mark_failed(
        &self,
        title: &str,
        reason: &str,
        max_retries: u32,
    ) -> StoreResult<ArticleState> {
        let mut conn = self.conn.lock().unwrap();
        let tx = conn.transaction()?;

        let article = Self::load_article(&tx, title)?
            .ok_or_else(|| StoreError::ArticleNotFound(title.to_string()))?;
        let retries = article.retry_count + 1;
        let next_state = if retries >= max_retries {
            ArticleState::Failed
        } else {
            ArticleState::Discovered
        };

        tx.execute(
            "UPDATE articles
             SET state = ?1, retry_count = ?2, fail_reason = ?3, claimed_at = NULL
             WHERE title = ?4",
            params![next_state.as_str(), retries, reason, title],
        )?;

        tx.commit()?;
        Ok(next_state)
    }

    fn vector_search(&self, query: &[f32], k: usize) -> StoreResult<Vec<SectionHit>> {
        if query.len() != self.dimension {
            return Err(StoreError::DimensionMismatch {
                expected: self.dimension,
                got: query.len(),
            });
        }
        if k == 0 {
            return Ok(Vec::new());
        }

        let mut normalized = query.to_vec();
        super::vector::l2_normalize(&mut normalized);

        let conn = self.conn.lock().unwrap();
        let bytes = super::vector::vec_as_bytes(&normalized);

        // KNN over L2-normalized vectors; cosine = 1 - dist²/2.
        let mut stmt = conn.prepare(
            "SELECT section_id, distance FROM section_vectors
             WHERE embedding MATCH ?1 AND k = ?2",
        )?;
        let knn: Vec<(i64, f32)> = stmt
            .query_map(params![bytes, k as i64], |row| {
                Ok((row.get(0)?, row.get(1)?))
            })?
            .collect::<Result<_, _>>()?;

        let mut hits = Vec::with_capacity(knn.len());
        for (section_id, distance) in knn {
            let article_title: Option<String> = conn
                .query_row(
                    "SELECT article_title FROM sections WHERE id = ?1",
                    params![section_id],
                    |row| row.get(0),
                )
                .optional()?;
            if let Some(article_title) = article_title {
                hits.push(SectionHit {
                    section_id,
                    article_title,
                    similarity: 1.0 - (distance * distance) / 2.0,
                });
            }
        }
        Ok(hits)
    }

    fn neighbors(&self, title: &str, direction: Direction) -> StoreResult<Vec<String>> {
        let conn = self.conn.lock().unwrap();
        let sql = match direction {
            Direction::Outbound => {
                "SELECT target_title FROM links WHERE source_title = ?1 ORDER BY rowid"
            }
            Direction::Inbound => {
                "SELECT source_title FROM links WHERE target_title = ?1 ORDER BY rowid"
            }
            Direction::Both => {
                "SELECT target_title FROM links WHERE source_title = ?1
                 UNION
                 SELECT source_title FROM links WHERE target_title = ?1"
            }
        };
        let mut stmt = conn.prepare(sql)?;
        let titles: Vec<String> = stmt
            .query_map(params![title], |row| row.get(0))?
            .collect::<Result<_, _>>()?;
        Ok(titles)
    }

    fn degree(&self, title: &str) -> StoreResult<usize> {
        let conn = self.conn.lock().unwrap();
        let count: i64 = conn.query_row(
            "SELECT
                 (SELECT COUNT(*) FROM links WHERE source_title = ?1) +
                 (SELECT COUNT(*) FROM links WHERE target_title = ?1)",
            params![title],
            |row| row.get(0),
        )?;
        Ok(count as usize)
    }

    fn article(&self, title: &str) -> StoreResult<Option<ArticleRef>> {
        let conn = self.conn.lock().unwrap();
        Self::load_article(&conn, title)
    }

    fn sections(&self, title: &str) -> StoreResult<Vec<SectionRow>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT id, article_title, ordinal, heading, level, text, word_count, has_embedding
             FROM sections WHERE article_title = ?1 ORDER BY ordinal",
        )?;
        let rows: Vec<SectionRow> = stmt
            .query_map(params![title], row_to_section)?
            .collect::<Result<_, _>>()?;
        Ok(rows)
    }

    fn section(&self, section_id: i64) -> StoreResult<Option<SectionRow>> {
        let conn = self.conn.lock().unwrap();
        let row = conn
            .query_row(
                "SELECT id, article_title, ordinal, heading, level, text, word_count, has_embedding
                 FROM sections WHERE id = ?1",
                params![section_id],
                row_to_section,
            )
            .optional()?;
        Ok(row)
    }

    fn stats(&self) -> StoreResult<PackStats> {
        let conn = self.conn.lock().unwrap();
        let count = |sql: &str| -> StoreResult<u64> {
            let n: i64 = conn.query_row(sql, [], |row| row.get(0))?;
            Ok(n as u64)
        };
        let state_count = |state: &str| -> StoreResult<u64> {
            let n: i64 = conn.query_row(
                "SELECT COUNT(*) FROM articles WHERE state = ?1",
                params![state],
                |row| row.get(0),
            )?;
            Ok(n as u64)
        };
        Ok(PackStats {
            articles: count("SELECT COUNT(*) FROM articles")?,
            sections: count("SELECT COUNT(*) FROM sections")?,
            entities: count("SELECT COUNT(*) FROM entities")?,
            relations: count("SELECT COUNT(*) FROM entity_relations")?,
            discovered: state_count("discovered")?,
            claimed: state_count("claimed")?,
            loaded: state_count("loaded")?,
            processed: state_count("processed")?,
            failed: state_count("failed")?,
        })
    }
}

fn row_to_section(row: &rusqlite::Row<'_>) -> rusqlite::Result<SectionRow> {
    let has_embedding: i64 = row.get(7)?;
    Ok(SectionRow {
        id: row.get(0)?,
        article_title: row.get(1)?,
        ordinal: row.get(2)?,
        heading: row.get(3)?,
        level: row.get(4)?,
        text: row.get(5)?,
        word_count: row.get(6)?,
        has_embedding: has_embedding != 0,
    })
}
