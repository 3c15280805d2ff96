//! Persisted vector index.
//!
//! The index is a single SQLite file holding documents, chunks, their
//! embedding vectors (little-endian f32 BLOBs), and build metadata. It is
//! written once per build and read-only afterwards; nearest-neighbor lookup
//! is a full scan with cosine similarity computed in Rust, ranked with a
//! deterministic tie-break on chunk id.

use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use sqlx::Row;
use std::path::Path;
use std::str::FromStr;

use crate::embedding::{blob_to_vec, cosine_similarity, vec_to_blob};
use crate::error::{PipelineError, Result};
use crate::models::{Chunk, Document, RetrievedChunk};

/// Build-time metadata recorded in the index.
///
/// The embedding model is checked at query time: retrieving with a different
/// model than the one that built the index is a configuration error.
#[derive(Debug, Clone, PartialEq)]
pub struct IndexMeta {
    pub embedding_model: String,
    pub dims: usize,
    pub chunk_size: usize,
    pub chunk_overlap: usize,
    pub built_at: i64,
}

/// Handle to a persisted index.
#[derive(Debug)]
pub struct Index {
    pool: SqlitePool,
}

impl Index {
    /// Create a fresh index database at `path` and install the schema.
    /// Used by the build step, which writes to a temporary path and renames.
    pub async fn create(path: &Path) -> Result<Self> {
        let options = SqliteConnectOptions::from_str(&format!("sqlite:{}", path.display()))
            .map_err(PipelineError::Index)?
            .create_if_missing(true)
            .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal);

        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(options)
            .await?;

        let index = Self { pool };
        index.install_schema().await?;
        Ok(index)
    }

    /// Open an existing index for querying. The file must exist.
    pub async fn open(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(PipelineError::io(
                path.to_path_buf(),
                std::io::Error::new(
                    std::io::ErrorKind::NotFound,
                    "index file does not exist; run the build first",
                ),
            ));
        }

        let options = SqliteConnectOptions::from_str(&format!("sqlite:{}", path.display()))
            .map_err(PipelineError::Index)?
            .create_if_missing(false);

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await?;

        Ok(Self { pool })
    }

    async fn install_schema(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS index_meta (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS documents (
                id TEXT PRIMARY KEY,
                source_path TEXT NOT NULL,
                metadata_json TEXT NOT NULL DEFAULT '{}'
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS chunks (
                id TEXT PRIMARY KEY,
                document_id TEXT NOT NULL,
                source_path TEXT NOT NULL,
                ordinal INTEGER NOT NULL,
                text TEXT NOT NULL,
                hash TEXT NOT NULL,
                UNIQUE(document_id, ordinal),
                FOREIGN KEY (document_id) REFERENCES documents(id)
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS chunk_vectors (
                chunk_id TEXT PRIMARY KEY,
                embedding BLOB NOT NULL,
                FOREIGN KEY (chunk_id) REFERENCES chunks(id)
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_chunks_document_id ON chunks(document_id)")
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    /// Record build metadata. Called once at the end of a successful build.
    pub async fn write_meta(&self, meta: &IndexMeta) -> Result<()> {
        let pairs = [
            ("embedding_model", meta.embedding_model.clone()),
            ("embedding_dims", meta.dims.to_string()),
            ("chunk_size", meta.chunk_size.to_string()),
            ("chunk_overlap", meta.chunk_overlap.to_string()),
            ("built_at", meta.built_at.to_string()),
        ];

        for (key, value) in pairs {
            sqlx::query(
                "INSERT INTO index_meta (key, value) VALUES (?, ?)
                 ON CONFLICT(key) DO UPDATE SET value = excluded.value",
            )
            .bind(key)
            .bind(value)
            .execute(&self.pool)
            .await?;
        }

        Ok(())
    }

    pub async fn read_meta(&self) -> Result<IndexMeta> {
        let rows = sqlx::query("SELECT key, value FROM index_meta")
            .fetch_all(&self.pool)
            .await?;

        let mut model = None;
        let mut dims = None;
        let mut chunk_size = None;
        let mut chunk_overlap = None;
        let mut built_at = None;

        for row in rows {
            let key: String = row.get("key");
            let value: String = row.get("value");
            match key.as_str() {
                "embedding_model" => model = Some(value),
                "embedding_dims" => dims = value.parse().ok(),
                "chunk_size" => chunk_size = value.parse().ok(),
                "chunk_overlap" => chunk_overlap = value.parse().ok(),
                "built_at" => built_at = value.parse().ok(),
                _ => {}
            }
        }

        match (model, dims, chunk_size, chunk_overlap, built_at) {
            (Some(embedding_model), Some(dims), Some(chunk_size), Some(chunk_overlap), Some(built_at)) => {
                Ok(IndexMeta {
                    embedding_model,
                    dims,
                    chunk_size,
                    chunk_overlap,
                    built_at,
                })
            }
            _ => Err(PipelineError::config(
                "index metadata is incomplete; rebuild the index",
            )),
        }
    }

    pub async fn insert_document(&self, doc: &Document) -> Result<()> {
        sqlx::query("INSERT INTO documents (id, source_path, metadata_json) VALUES (?, ?, ?)")
            .bind(&doc.id)
            .bind(doc.source_path.display().to_string())
            .bind(doc.metadata.to_string())
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Insert a batch of chunks with their vectors in one transaction.
    pub async fn insert_chunks(&self, chunks: &[Chunk], vectors: &[Vec<f32>]) -> Result<()> {
        debug_assert_eq!(chunks.len(), vectors.len());

        let mut tx = self.pool.begin().await?;

        for (chunk, vector) in chunks.iter().zip(vectors.iter()) {
            sqlx::query(
                "INSERT INTO chunks (id, document_id, source_path, ordinal, text, hash)
                 VALUES (?, ?, ?, ?, ?, ?)",
            )
            .bind(&chunk.id)
            .bind(&chunk.document_id)
            .bind(chunk.source_path.display().to_string())
            .bind(chunk.ordinal)
            .bind(&chunk.text)
            .bind(&chunk.hash)
            .execute(&mut *tx)
            .await?;

            sqlx::query("INSERT INTO chunk_vectors (chunk_id, embedding) VALUES (?, ?)")
                .bind(&chunk.id)
                .bind(vec_to_blob(vector))
                .execute(&mut *tx)
                .await?;
        }

        tx.commit().await?;
        Ok(())
    }

    pub async fn chunk_count(&self) -> Result<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM chunks")
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }

    /// Retrieve the `k` chunks nearest to the query vector by cosine
    /// similarity. Ties break on chunk id ascending, so repeated calls with
    /// the same query embedding return the same chunks in the same order.
    pub async fn nearest(&self, query_vec: &[f32], k: usize) -> Result<Vec<RetrievedChunk>> {
        let rows = sqlx::query(
            r#"
            SELECT c.id, c.document_id, c.source_path, c.ordinal, c.text, c.hash, cv.embedding
            FROM chunk_vectors cv
            JOIN chunks c ON c.id = cv.chunk_id
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        let mut candidates: Vec<RetrievedChunk> = rows
            .iter()
            .map(|row| {
                let blob: Vec<u8> = row.get("embedding");
                let vec = blob_to_vec(&blob);
                let score = cosine_similarity(query_vec, &vec) as f64;
                let source_path: String = row.get("source_path");
                RetrievedChunk {
                    chunk: Chunk {
                        id: row.get("id"),
                        document_id: row.get("document_id"),
                        source_path: source_path.into(),
                        ordinal: row.get("ordinal"),
                        text: row.get("text"),
                        hash: row.get("hash"),
                    },
                    score,
                }
            })
            .collect();

        candidates.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.chunk.id.cmp(&b.chunk.id))
        });
        candidates.truncate(k);

        Ok(candidates)
    }

    pub async fn close(self) {
        self.pool.close().await;
    }
}
