//! Index build orchestration.
//!
//! Runs the full corpus pass: load → normalize → split → embed → persist.
//! The build is all-or-nothing: chunks are embedded and written into a
//! temporary database next to the configured path, which is renamed over
//! the target only after every write has succeeded. Any failure leaves a
//! previously persisted index untouched.
//!
//! A lock file next to the index enforces the single-writer invariant:
//! a second build against the same path is rejected while one is running.

use chrono::Utc;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::task::JoinSet;
use uuid::Uuid;

use crate::config::{Config, EmbeddingConfig};
use crate::embedding::Embedder;
use crate::error::{ApiErrorKind, PipelineError, Result};
use crate::index::{Index, IndexMeta};
use crate::loader;
use crate::models::{Chunk, Document};
use crate::normalize;
use crate::splitter;

/// Counts from a completed build.
#[derive(Debug, Clone)]
pub struct BuildReport {
    pub documents: usize,
    pub chunks: usize,
}

/// Build the index from the configured docs root and persist it at the
/// configured path.
pub async fn build_index(config: &Config, embedder: Arc<dyn Embedder>) -> Result<BuildReport> {
    let index_path = &config.index.path;
    let _lock = BuildLock::acquire(index_path)?;

    println!("Loading docs from {}...", config.docs.root.display());
    let docs = loader::load_documents(&config.docs)?;
    let docs = normalize::normalize_all(docs)?;
    let chunks = splitter::split_corpus(&docs, &config.chunking)?;

    println!("  documents: {}", docs.len());
    println!("  chunks: {}", chunks.len());

    println!("Embedding with {}...", embedder.model_name());
    let vectors = embed_chunks(Arc::clone(&embedder), &chunks, &config.embedding).await?;

    let temp = temp_path(index_path);
    let meta = IndexMeta {
        embedding_model: embedder.model_name().to_string(),
        dims: embedder.dims(),
        chunk_size: config.chunking.chunk_size,
        chunk_overlap: config.chunking.chunk_overlap,
        built_at: Utc::now().timestamp(),
    };

    match persist(&temp, &docs, &chunks, &vectors, &meta).await {
        Ok(()) => {
            std::fs::rename(&temp, index_path)
                .map_err(|e| PipelineError::io(index_path.clone(), e))?;
        }
        Err(e) => {
            remove_temp_files(&temp);
            return Err(e);
        }
    }

    println!("Index written to {}.", index_path.display());

    Ok(BuildReport {
        documents: docs.len(),
        chunks: chunks.len(),
    })
}

/// Embed every chunk, batched per the config, with up to
/// `embedding.concurrency` batch requests in flight. Vectors come back in
/// chunk order regardless of completion order.
async fn embed_chunks(
    embedder: Arc<dyn Embedder>,
    chunks: &[Chunk],
    config: &EmbeddingConfig,
) -> Result<Vec<Vec<f32>>> {
    let batches: Vec<Vec<String>> = chunks
        .chunks(config.batch_size)
        .map(|batch| batch.iter().map(|c| c.text.clone()).collect())
        .collect();

    let mut results: Vec<Option<Vec<Vec<f32>>>> = (0..batches.len()).map(|_| None).collect();
    let mut pending = batches.into_iter().enumerate();

    loop {
        let mut set = JoinSet::new();
        for (i, texts) in pending.by_ref().take(config.concurrency) {
            let embedder = Arc::clone(&embedder);
            set.spawn(async move {
                let expected = texts.len();
                let vectors = embedder.embed(&texts).await?;
                if vectors.len() != expected {
                    return Err(PipelineError::embedding(
                        ApiErrorKind::Transient,
                        format!(
                            "embedding API returned {} vectors for {} texts",
                            vectors.len(),
                            expected
                        ),
                    ));
                }
                Ok::<_, PipelineError>((i, vectors))
            });
        }

        if set.is_empty() {
            break;
        }

        while let Some(joined) = set.join_next().await {
            let task_result = joined.map_err(|e| {
                PipelineError::embedding(
                    ApiErrorKind::Transient,
                    format!("embedding task failed: {}", e),
                )
            })?;
            let (i, vectors) = task_result?;
            results[i] = Some(vectors);
        }
    }

    let mut all = Vec::with_capacity(chunks.len());
    for batch in results {
        match batch {
            Some(vectors) => all.extend(vectors),
            None => {
                return Err(PipelineError::embedding(
                    ApiErrorKind::Transient,
                    "embedding batch produced no result",
                ))
            }
        }
    }
    Ok(all)
}

async fn persist(
    temp: &Path,
    docs: &[Document],
    chunks: &[Chunk],
    vectors: &[Vec<f32>],
    meta: &IndexMeta,
) -> Result<()> {
    if let Some(parent) = temp.parent() {
        std::fs::create_dir_all(parent).map_err(|e| PipelineError::io(parent.to_path_buf(), e))?;
    }

    let index = Index::create(temp).await?;
    for doc in docs {
        index.insert_document(doc).await?;
    }
    index.insert_chunks(chunks, vectors).await?;
    index.write_meta(meta).await?;
    index.close().await;
    Ok(())
}

fn temp_path(index_path: &Path) -> PathBuf {
    let name = index_path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| "index".to_string());
    let temp_name = format!(".{}.tmp-{}", name, Uuid::new_v4());
    match index_path.parent() {
        Some(parent) => parent.join(temp_name),
        None => PathBuf::from(temp_name),
    }
}

/// Best-effort removal of an aborted temp database and its WAL side files.
fn remove_temp_files(temp: &Path) {
    for suffix in ["", "-wal", "-shm"] {
        let mut path = temp.as_os_str().to_owned();
        path.push(suffix);
        let _ = std::fs::remove_file(PathBuf::from(path));
    }
}

/// Lock file guarding the index path. Created with `create_new`, so a
/// second acquire fails while the first holder is alive; removed on drop.
struct BuildLock {
    path: PathBuf,
}

impl BuildLock {
    fn acquire(index_path: &Path) -> Result<Self> {
        let path = lock_path(index_path);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| PipelineError::io(parent.to_path_buf(), e))?;
        }

        match std::fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&path)
        {
            Ok(_) => Ok(Self { path }),
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
                Err(PipelineError::config(format!(
                    "another build is already writing {} (lock file {} exists)",
                    index_path.display(),
                    path.display()
                )))
            }
            Err(e) => Err(PipelineError::io(path, e)),
        }
    }
}

impl Drop for BuildLock {
    fn drop(&mut self) {
        let _ = std::fs::remove_file(&self.path);
    }
}

fn lock_path(index_path: &Path) -> PathBuf {
    let mut path = index_path.as_os_str().to_owned();
    path.push(".lock");
    PathBuf::from(path)
}
