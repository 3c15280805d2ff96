//! Embedding provider abstraction and the OpenAI-backed implementation.
//!
//! The [`Embedder`] trait is the seam between the pipeline and the remote
//! embedding API; tests inject deterministic fakes through it. The OpenAI
//! implementation batches texts per request and retries transient failures
//! with exponential backoff.
//!
//! Also provides vector utilities for the index:
//! - [`cosine_similarity`]: similarity between two embedding vectors
//! - [`vec_to_blob`] / [`blob_to_vec`]: little-endian f32 BLOB codec for
//!   SQLite storage
//!
//! # Retry Strategy
//!
//! - Network errors and 5xx (server error) → retry
//! - HTTP 429 (rate limited) and 401/403 (authentication) → fail immediately
//! - Backoff: 1s, 2s, 4s, 8s, 16s, 32s (capped at 2^5)

use async_trait::async_trait;
use std::time::Duration;

use crate::config::EmbeddingConfig;
use crate::error::{ApiErrorKind, PipelineError, Result};

/// Produces embedding vectors for batches of text.
///
/// Implementations must return one vector per input text, in input order.
#[async_trait]
pub trait Embedder: Send + Sync {
    /// Embed a batch of texts.
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;

    /// Model identifier (e.g. `"text-embedding-3-small"`). Recorded in the
    /// index metadata so query-time model mismatches are detectable.
    fn model_name(&self) -> &str;

    /// Embedding vector dimensionality.
    fn dims(&self) -> usize;
}

/// Embed a single query text.
pub async fn embed_query(embedder: &dyn Embedder, text: &str) -> Result<Vec<f32>> {
    let results = embedder.embed(&[text.to_string()]).await?;
    results.into_iter().next().ok_or_else(|| {
        PipelineError::embedding(ApiErrorKind::Transient, "empty embedding response")
    })
}

/// Embedding provider backed by the OpenAI embeddings API.
///
/// Calls `POST /v1/embeddings` with the configured model. The API key is
/// read from the `OPENAI_API_KEY` environment variable at construction.
pub struct OpenAiEmbedder {
    client: reqwest::Client,
    api_key: String,
    model: String,
    dims: usize,
    max_retries: u32,
}

impl OpenAiEmbedder {
    pub fn new(config: &EmbeddingConfig) -> Result<Self> {
        let api_key = std::env::var("OPENAI_API_KEY")
            .map_err(|_| PipelineError::config("OPENAI_API_KEY environment variable not set"))?;

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| PipelineError::config(format!("failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            api_key,
            model: config.model.clone(),
            dims: config.dims,
            max_retries: config.max_retries,
        })
    }
}

#[async_trait]
impl Embedder for OpenAiEmbedder {
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let body = serde_json::json!({
            "model": self.model,
            "input": texts,
        });

        let mut last_err = None;

        for attempt in 0..=self.max_retries {
            if attempt > 0 {
                let delay = Duration::from_secs(1 << (attempt - 1).min(5));
                tokio::time::sleep(delay).await;
            }

            let resp = self
                .client
                .post("https://api.openai.com/v1/embeddings")
                .header("Authorization", format!("Bearer {}", self.api_key))
                .header("Content-Type", "application/json")
                .json(&body)
                .send()
                .await;

            match resp {
                Ok(response) => {
                    let status = response.status();

                    if status.is_success() {
                        let json: serde_json::Value = response.json().await.map_err(|e| {
                            PipelineError::embedding(ApiErrorKind::Transient, e.to_string())
                        })?;
                        return parse_embedding_response(&json);
                    }

                    let kind = classify_status(status);
                    let body_text = response.text().await.unwrap_or_default();
                    let err = PipelineError::embedding(
                        kind,
                        format!("embeddings API returned {}: {}", status, body_text),
                    );

                    if !kind.is_retryable() {
                        return Err(err);
                    }
                    last_err = Some(err);
                }
                Err(e) => {
                    last_err = Some(PipelineError::embedding(
                        ApiErrorKind::Transient,
                        e.to_string(),
                    ));
                }
            }
        }

        Err(last_err.unwrap_or_else(|| {
            PipelineError::embedding(ApiErrorKind::Transient, "embedding failed after retries")
        }))
    }

    fn model_name(&self) -> &str {
        &self.model
    }

    fn dims(&self) -> usize {
        self.dims
    }
}

/// Map an HTTP status to a failure class for retry decisions.
pub fn classify_status(status: reqwest::StatusCode) -> ApiErrorKind {
    match status.as_u16() {
        429 => ApiErrorKind::RateLimited,
        401 | 403 => ApiErrorKind::Auth,
        _ => ApiErrorKind::Transient,
    }
}

/// Extract `data[].embedding` arrays in input order.
fn parse_embedding_response(json: &serde_json::Value) -> Result<Vec<Vec<f32>>> {
    let data = json.get("data").and_then(|d| d.as_array()).ok_or_else(|| {
        PipelineError::embedding(
            ApiErrorKind::Transient,
            "invalid embeddings response: missing data array",
        )
    })?;

    let mut embeddings = Vec::with_capacity(data.len());

    for item in data {
        let embedding = item
            .get("embedding")
            .and_then(|e| e.as_array())
            .ok_or_else(|| {
                PipelineError::embedding(
                    ApiErrorKind::Transient,
                    "invalid embeddings response: missing embedding",
                )
            })?;

        let vec: Vec<f32> = embedding
            .iter()
            .map(|v| v.as_f64().unwrap_or(0.0) as f32)
            .collect();

        embeddings.push(vec);
    }

    Ok(embeddings)
}

/// Encode a float vector as a BLOB (little-endian f32 bytes).
pub fn vec_to_blob(vec: &[f32]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(vec.len() * 4);
    for &v in vec {
        bytes.extend_from_slice(&v.to_le_bytes());
    }
    bytes
}

/// Decode a BLOB back into a float vector.
pub fn blob_to_vec(blob: &[u8]) -> Vec<f32> {
    blob.chunks_exact(4)
        .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
        .collect()
}

/// Cosine similarity in `[-1.0, 1.0]`. Returns `0.0` for empty vectors or
/// vectors of different lengths.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let mut dot = 0.0f32;
    let mut norm_a = 0.0f32;
    let mut norm_b = 0.0f32;

    for (x, y) in a.iter().zip(b.iter()) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    let denom = norm_a.sqrt() * norm_b.sqrt();
    if denom < f32::EPSILON {
        return 0.0;
    }

    dot / denom
}
