//! libSQL-backed vector store for embedded chunks.
//!
//! The [`VectorStore`] wraps a local libSQL database holding one row per
//! chunk, with the embedding serialized as a little-endian f32 blob.
//! Search is brute-force: load every embedding, score by cosine
//! similarity, keep the best `fetch_k` candidates, then re-rank with
//! maximal marginal relevance to trade relevance against diversity.
//!
//! **Access rules:**
//! - ingest binary: read-write (sole writer) via [`VectorStore::create`]
//! - chat binary: read-only via [`VectorStore::open_readonly`]

mod migrations;

use std::path::Path;

use chrono::Utc;
use libsql::{Connection, Database, params};
use tracing::{debug, info, instrument};

use sitechat_shared::{Chunk, FETCH_K, MMR_LAMBDA, Result, SitechatError, TOP_K};

// ---------------------------------------------------------------------------
// Search parameters
// ---------------------------------------------------------------------------

/// Parameters for a similarity search.
#[derive(Debug, Clone, Copy)]
pub struct SearchParams {
    /// Candidate pool size scored by cosine similarity.
    pub fetch_k: usize,
    /// Number of chunks returned after re-ranking.
    pub top_k: usize,
    /// Re-rank the candidate pool with maximal marginal relevance.
    pub use_mmr: bool,
    /// MMR trade-off: 1.0 is pure relevance, 0.0 is pure diversity.
    pub mmr_lambda: f32,
}

impl Default for SearchParams {
    fn default() -> Self {
        Self {
            fetch_k: FETCH_K,
            top_k: TOP_K,
            use_mmr: true,
            mmr_lambda: MMR_LAMBDA,
        }
    }
}

/// A chunk returned from search with its cosine similarity to the query.
#[derive(Debug, Clone)]
pub struct ScoredChunk {
    pub chunk: Chunk,
    pub score: f32,
}

// ---------------------------------------------------------------------------
// VectorStore
// ---------------------------------------------------------------------------

/// Storage handle wrapping a local libSQL database of embedded chunks.
pub struct VectorStore {
    #[allow(dead_code)]
    db: Database,
    conn: Connection,
    readonly: bool,
}

impl VectorStore {
    /// Open or create a writable dataset at `path` for ingestion.
    ///
    /// With `overwrite` set, any chunks from a previous run are deleted so
    /// the dataset reflects exactly one ingestion pass.
    #[instrument(skip_all, fields(path = %path.display(), overwrite))]
    pub async fn create(path: &Path, overwrite: bool) -> Result<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(|e| SitechatError::io(parent, e))?;
            }
        }

        let store = Self::open_at(path, false).await?;
        store.run_migrations().await?;

        if overwrite {
            let deleted = store
                .conn
                .execute("DELETE FROM chunks", params![])
                .await
                .map_err(|e| SitechatError::Store(e.to_string()))?;
            if deleted > 0 {
                info!(deleted, "cleared existing chunks");
            }
        }
        Ok(store)
    }

    /// Open an existing dataset at `path` in read-only mode.
    ///
    /// Fails when no dataset exists, rather than silently creating an
    /// empty one.
    pub async fn open_readonly(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(SitechatError::Store(format!(
                "no dataset at {}, run the ingest binary first",
                path.display()
            )));
        }
        Self::open_at(path, true).await
    }

    async fn open_at(path: &Path, readonly: bool) -> Result<Self> {
        let db = libsql::Builder::new_local(path)
            .build()
            .await
            .map_err(|e| SitechatError::Store(e.to_string()))?;

        let conn = db
            .connect()
            .map_err(|e| SitechatError::Store(e.to_string()))?;

        Ok(Self { db, conn, readonly })
    }

    /// Run pending schema migrations.
    async fn run_migrations(&self) -> Result<()> {
        let current_version = self.get_schema_version().await;

        for migration in migrations::all_migrations() {
            if migration.version > current_version {
                info!(
                    version = migration.version,
                    description = migration.description,
                    "applying migration"
                );
                self.conn.execute_batch(migration.sql).await.map_err(|e| {
                    SitechatError::Store(format!("migration v{} failed: {e}", migration.version))
                })?;
            }
        }
        Ok(())
    }

    /// Get the current schema version, or 0 if no migrations have been applied.
    async fn get_schema_version(&self) -> u32 {
        let result = self
            .conn
            .query("SELECT MAX(version) FROM schema_migrations", params![])
            .await;

        match result {
            Ok(mut rows) => {
                if let Ok(Some(row)) = rows.next().await {
                    row.get::<u32>(0).unwrap_or(0)
                } else {
                    0
                }
            }
            Err(_) => 0, // Table doesn't exist yet
        }
    }

    /// Ensure we're in read-write mode before writing.
    fn check_writable(&self) -> Result<()> {
        if self.readonly {
            return Err(SitechatError::Store(
                "dataset is opened in read-only mode".into(),
            ));
        }
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Chunk operations
    // -----------------------------------------------------------------------

    /// Insert chunks with their embeddings in a single transaction.
    ///
    /// `chunks` and `embeddings` are parallel slices; every embedding must
    /// share one dimension.
    #[instrument(skip_all, fields(chunks = chunks.len()))]
    pub async fn add_chunks(&self, chunks: &[Chunk], embeddings: &[Vec<f32>]) -> Result<()> {
        self.check_writable()?;

        if chunks.len() != embeddings.len() {
            return Err(SitechatError::validation(format!(
                "{} chunks but {} embeddings",
                chunks.len(),
                embeddings.len()
            )));
        }
        if chunks.is_empty() {
            return Ok(());
        }

        let dimension = embeddings[0].len();
        if dimension == 0 {
            return Err(SitechatError::validation("embeddings are empty"));
        }
        if let Some(bad) = embeddings.iter().find(|e| e.len() != dimension) {
            return Err(SitechatError::validation(format!(
                "inconsistent embedding dimensions: expected {dimension}, got {}",
                bad.len()
            )));
        }

        let tx = self
            .conn
            .transaction()
            .await
            .map_err(|e| SitechatError::Store(e.to_string()))?;

        let now = Utc::now().to_rfc3339();
        for (chunk, embedding) in chunks.iter().zip(embeddings) {
            tx.execute(
                "INSERT OR REPLACE INTO chunks
                     (id, document_url, title, chunk_index, text, embedding, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                params![
                    chunk.id.as_str(),
                    chunk.document_url.as_str(),
                    chunk.title.as_deref(),
                    chunk.chunk_index as i64,
                    chunk.text.as_str(),
                    serialize_embedding(embedding),
                    now.as_str(),
                ],
            )
            .await
            .map_err(|e| SitechatError::Store(e.to_string()))?;
        }

        tx.commit()
            .await
            .map_err(|e| SitechatError::Store(e.to_string()))?;
        debug!(chunks = chunks.len(), dimension, "chunks persisted");
        Ok(())
    }

    /// Number of chunks in the dataset.
    pub async fn len(&self) -> Result<u64> {
        let mut rows = self
            .conn
            .query("SELECT COUNT(*) FROM chunks", params![])
            .await
            .map_err(|e| SitechatError::Store(e.to_string()))?;

        match rows.next().await {
            Ok(Some(row)) => row
                .get::<u64>(0)
                .map_err(|e| SitechatError::Store(e.to_string())),
            Ok(None) => Ok(0),
            Err(e) => Err(SitechatError::Store(e.to_string())),
        }
    }

    /// Whether the dataset contains no chunks.
    pub async fn is_empty(&self) -> Result<bool> {
        Ok(self.len().await? == 0)
    }

    /// Record a dataset-level metadata value, such as the embedding model.
    pub async fn set_meta(&self, key: &str, value: &str) -> Result<()> {
        self.check_writable()?;
        self.conn
            .execute(
                "INSERT OR REPLACE INTO dataset_meta (key, value, updated_at)
                 VALUES (?1, ?2, datetime('now'))",
                params![key, value],
            )
            .await
            .map_err(|e| SitechatError::Store(e.to_string()))?;
        Ok(())
    }

    /// Read a dataset-level metadata value.
    pub async fn get_meta(&self, key: &str) -> Result<Option<String>> {
        let mut rows = self
            .conn
            .query("SELECT value FROM dataset_meta WHERE key = ?1", params![key])
            .await
            .map_err(|e| SitechatError::Store(e.to_string()))?;

        match rows.next().await {
            Ok(Some(row)) => Ok(Some(
                row.get::<String>(0)
                    .map_err(|e| SitechatError::Store(e.to_string()))?,
            )),
            Ok(None) => Ok(None),
            Err(e) => Err(SitechatError::Store(e.to_string())),
        }
    }

    // -----------------------------------------------------------------------
    // Search
    // -----------------------------------------------------------------------

    /// Find the chunks most relevant to a query embedding.
    ///
    /// Scores every stored chunk by cosine similarity, keeps the best
    /// `fetch_k`, then selects `top_k` of those with maximal marginal
    /// relevance when `use_mmr` is set.
    #[instrument(skip_all, fields(fetch_k = params.fetch_k, top_k = params.top_k))]
    pub async fn search(
        &self,
        query_embedding: &[f32],
        params: SearchParams,
    ) -> Result<Vec<ScoredChunk>> {
        if query_embedding.is_empty() {
            return Err(SitechatError::validation("query embedding is empty"));
        }

        let mut rows = self
            .conn
            .query(
                "SELECT id, document_url, title, chunk_index, text, embedding FROM chunks",
                params![],
            )
            .await
            .map_err(|e| SitechatError::Store(e.to_string()))?;

        let mut candidates: Vec<(Chunk, Vec<f32>, f32)> = Vec::new();
        while let Some(row) = rows
            .next()
            .await
            .map_err(|e| SitechatError::Store(e.to_string()))?
        {
            let chunk = row_to_chunk(&row)?;
            let blob = row
                .get::<Vec<u8>>(5)
                .map_err(|e| SitechatError::Store(e.to_string()))?;
            let embedding = deserialize_embedding(&blob);
            let score = cosine_similarity(query_embedding, &embedding);
            candidates.push((chunk, embedding, score));
        }

        candidates.sort_by(|a, b| b.2.partial_cmp(&a.2).unwrap_or(std::cmp::Ordering::Equal));
        candidates.truncate(params.fetch_k.max(1));

        let results = if params.use_mmr {
            mmr_select(candidates, params.top_k.max(1), params.mmr_lambda)
        } else {
            candidates
                .into_iter()
                .take(params.top_k.max(1))
                .map(|(chunk, _, score)| ScoredChunk { chunk, score })
                .collect()
        };

        debug!(results = results.len(), "search complete");
        Ok(results)
    }
}

// ---------------------------------------------------------------------------
// Vector helpers
// ---------------------------------------------------------------------------

fn serialize_embedding(embedding: &[f32]) -> Vec<u8> {
    embedding.iter().flat_map(|f| f.to_le_bytes()).collect()
}

fn deserialize_embedding(bytes: &[u8]) -> Vec<f32> {
    bytes
        .chunks_exact(4)
        .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
        .collect()
}

fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    let denom = norm_a * norm_b;

    if denom <= f32::EPSILON { 0.0 } else { dot / denom }
}

/// Greedy maximal-marginal-relevance selection over a scored candidate pool.
///
/// Each round picks the candidate maximizing
/// `lambda * query_score - (1 - lambda) * max_similarity_to_selected`,
/// penalizing candidates that repeat what was already picked.
fn mmr_select(
    candidates: Vec<(Chunk, Vec<f32>, f32)>,
    top_k: usize,
    lambda: f32,
) -> Vec<ScoredChunk> {
    let mut remaining = candidates;
    let mut selected: Vec<(Chunk, Vec<f32>, f32)> = Vec::with_capacity(top_k);

    while selected.len() < top_k && !remaining.is_empty() {
        let mut best_idx = 0;
        let mut best_value = f32::NEG_INFINITY;

        for (idx, (_, embedding, query_score)) in remaining.iter().enumerate() {
            let redundancy = selected
                .iter()
                .map(|(_, picked, _)| cosine_similarity(embedding, picked))
                .fold(0.0_f32, f32::max);
            let value = lambda * query_score - (1.0 - lambda) * redundancy;
            if value > best_value {
                best_value = value;
                best_idx = idx;
            }
        }

        selected.push(remaining.swap_remove(best_idx));
    }

    selected
        .into_iter()
        .map(|(chunk, _, score)| ScoredChunk { chunk, score })
        .collect()
}

fn row_to_chunk(row: &libsql::Row) -> Result<Chunk> {
    Ok(Chunk {
        id: row
            .get::<String>(0)
            .map_err(|e| SitechatError::Store(e.to_string()))?,
        document_url: row
            .get::<String>(1)
            .map_err(|e| SitechatError::Store(e.to_string()))?,
        title: row.get::<String>(2).ok(),
        chunk_index: row
            .get::<i64>(3)
            .map_err(|e| SitechatError::Store(e.to_string()))? as usize,
        text: row
            .get::<String>(4)
            .map_err(|e| SitechatError::Store(e.to_string()))?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use sitechat_shared::Document;

    async fn test_store() -> VectorStore {
        let path = std::env::temp_dir().join(format!("sitechat-test-{}.db", uuid::Uuid::now_v7()));
        VectorStore::create(&path, false).await.unwrap()
    }

    fn chunk(url: &str, index: usize, text: &str) -> Chunk {
        let doc = Document {
            url: url.into(),
            title: Some("Test Page".into()),
            text: String::new(),
        };
        Chunk::new(&doc, index, text.into())
    }

    #[tokio::test]
    async fn create_and_migrate() {
        let store = test_store().await;
        assert_eq!(store.get_schema_version().await, 1);
        assert!(store.is_empty().await.unwrap());
    }

    #[tokio::test]
    async fn idempotent_migration() {
        let path = std::env::temp_dir().join(format!("sitechat-test-{}.db", uuid::Uuid::now_v7()));
        let store = VectorStore::create(&path, false).await.unwrap();
        drop(store);
        let store = VectorStore::create(&path, false).await.unwrap();
        assert_eq!(store.get_schema_version().await, 1);
    }

    #[tokio::test]
    async fn add_and_count_chunks() {
        let store = test_store().await;

        let chunks = vec![
            chunk("https://docs.example.com/a", 0, "alpha text"),
            chunk("https://docs.example.com/a", 1, "beta text"),
        ];
        let embeddings = vec![vec![1.0, 0.0], vec![0.0, 1.0]];

        store.add_chunks(&chunks, &embeddings).await.unwrap();
        assert_eq!(store.len().await.unwrap(), 2);
    }

    #[tokio::test]
    async fn add_chunks_rejects_mismatched_lengths() {
        let store = test_store().await;
        let chunks = vec![chunk("https://docs.example.com/a", 0, "text")];
        let result = store.add_chunks(&chunks, &[]).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn add_chunks_rejects_inconsistent_dimensions() {
        let store = test_store().await;
        let chunks = vec![
            chunk("https://docs.example.com/a", 0, "one"),
            chunk("https://docs.example.com/a", 1, "two"),
        ];
        let embeddings = vec![vec![1.0, 0.0], vec![1.0, 0.0, 0.0]];
        let result = store.add_chunks(&chunks, &embeddings).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn overwrite_clears_previous_run() {
        let path = std::env::temp_dir().join(format!("sitechat-test-{}.db", uuid::Uuid::now_v7()));

        let store = VectorStore::create(&path, false).await.unwrap();
        store
            .add_chunks(
                &[chunk("https://docs.example.com/a", 0, "old")],
                &[vec![1.0]],
            )
            .await
            .unwrap();
        drop(store);

        let store = VectorStore::create(&path, true).await.unwrap();
        assert!(store.is_empty().await.unwrap());
    }

    #[tokio::test]
    async fn search_orders_by_cosine_similarity() {
        let store = test_store().await;

        let chunks = vec![
            chunk("https://docs.example.com/a", 0, "about cats"),
            chunk("https://docs.example.com/b", 0, "about dogs"),
            chunk("https://docs.example.com/c", 0, "about birds"),
        ];
        let embeddings = vec![
            vec![1.0, 0.0, 0.0],
            vec![0.7, 0.7, 0.0],
            vec![0.0, 0.0, 1.0],
        ];
        store.add_chunks(&chunks, &embeddings).await.unwrap();

        let params = SearchParams {
            use_mmr: false,
            top_k: 2,
            ..SearchParams::default()
        };
        let results = store.search(&[1.0, 0.0, 0.0], params).await.unwrap();

        assert_eq!(results.len(), 2);
        assert!(results[0].chunk.text.contains("cats"));
        assert!(results[0].score > 0.99);
        assert!(results[1].chunk.text.contains("dogs"));
        assert!(results[0].score >= results[1].score);
    }

    #[tokio::test]
    async fn mmr_prefers_diverse_results() {
        let store = test_store().await;

        // Two near-duplicates close to the query and one distinct chunk.
        let chunks = vec![
            chunk("https://docs.example.com/a", 0, "install guide"),
            chunk("https://docs.example.com/a", 1, "install guide copy"),
            chunk("https://docs.example.com/b", 0, "api reference"),
        ];
        let embeddings = vec![
            vec![1.0, 0.0],
            vec![0.999, 0.001],
            vec![0.6, 0.8],
        ];
        store.add_chunks(&chunks, &embeddings).await.unwrap();

        let params = SearchParams {
            top_k: 2,
            ..SearchParams::default()
        };
        let results = store.search(&[1.0, 0.0], params).await.unwrap();

        assert_eq!(results.len(), 2);
        assert!(results[0].chunk.text.contains("install guide"));
        // The second pick should be the distinct chunk, not the duplicate.
        assert!(results[1].chunk.text.contains("api reference"));
    }

    #[tokio::test]
    async fn meta_roundtrip() {
        let store = test_store().await;
        assert!(store.get_meta("embedding_model").await.unwrap().is_none());

        store
            .set_meta("embedding_model", "text-embedding-ada-002")
            .await
            .unwrap();
        assert_eq!(
            store.get_meta("embedding_model").await.unwrap().as_deref(),
            Some("text-embedding-ada-002")
        );

        store.set_meta("embedding_model", "embed-v2").await.unwrap();
        assert_eq!(
            store.get_meta("embedding_model").await.unwrap().as_deref(),
            Some("embed-v2")
        );
    }

    #[tokio::test]
    async fn search_empty_store_returns_nothing() {
        let store = test_store().await;
        let results = store
            .search(&[1.0, 0.0], SearchParams::default())
            .await
            .unwrap();
        assert!(results.is_empty());
    }

    #[tokio::test]
    async fn readonly_rejects_writes() {
        let path = std::env::temp_dir().join(format!("sitechat-test-{}.db", uuid::Uuid::now_v7()));

        let store = VectorStore::create(&path, false).await.unwrap();
        store
            .add_chunks(
                &[chunk("https://docs.example.com/a", 0, "text")],
                &[vec![1.0]],
            )
            .await
            .unwrap();
        drop(store);

        let readonly = VectorStore::open_readonly(&path).await.unwrap();
        assert_eq!(readonly.len().await.unwrap(), 1);

        let result = readonly
            .add_chunks(
                &[chunk("https://docs.example.com/b", 0, "more")],
                &[vec![1.0]],
            )
            .await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn open_readonly_requires_existing_dataset() {
        let path = std::env::temp_dir().join(format!("sitechat-missing-{}.db", uuid::Uuid::now_v7()));
        let result = VectorStore::open_readonly(&path).await;
        assert!(result.is_err());
    }

    #[test]
    fn embedding_blob_roundtrip() {
        let embedding = vec![0.5_f32, -1.25, 3.0];
        let blob = serialize_embedding(&embedding);
        assert_eq!(blob.len(), 12);
        assert_eq!(deserialize_embedding(&blob), embedding);
    }

    #[test]
    fn cosine_similarity_basics() {
        assert!((cosine_similarity(&[1.0, 0.0], &[1.0, 0.0]) - 1.0).abs() < 1e-6);
        assert!(cosine_similarity(&[1.0, 0.0], &[0.0, 1.0]).abs() < 1e-6);
        assert_eq!(cosine_similarity(&[1.0], &[1.0, 0.0]), 0.0);
        assert_eq!(cosine_similarity(&[], &[]), 0.0);
    }
}
