//! Error types for the ingestion and retrieval pipeline.
//!
//! Remote API failures carry an [`ApiErrorKind`] so callers can distinguish
//! rate limiting, authentication failure, and transient network trouble.
//! Only transient failures are retried; rate-limit and auth failures
//! surface immediately.

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for pipeline operations.
pub type Result<T> = std::result::Result<T, PipelineError>;

/// Classification of a remote API failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApiErrorKind {
    /// HTTP 429. Fails the run immediately.
    RateLimited,
    /// HTTP 401/403. Fails the run immediately.
    Auth,
    /// Network error, 5xx, or other unexpected status. Retried with
    /// exponential backoff.
    Transient,
}

impl ApiErrorKind {
    pub fn is_retryable(&self) -> bool {
        matches!(self, ApiErrorKind::Transient)
    }
}

impl std::fmt::Display for ApiErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ApiErrorKind::RateLimited => write!(f, "rate-limited"),
            ApiErrorKind::Auth => write!(f, "authentication"),
            ApiErrorKind::Transient => write!(f, "transient-network"),
        }
    }
}

/// Errors produced anywhere in the load → split → index → answer pipeline.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// Filesystem access failure, with the path that caused it.
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Malformed structured document.
    #[error("failed to parse {path}: {message}")]
    Parse { path: PathBuf, message: String },

    /// Embedding API failure.
    #[error("embedding request failed ({kind}): {message}")]
    Embedding { kind: ApiErrorKind, message: String },

    /// Completion API failure.
    #[error("completion request failed ({kind}): {message}")]
    Completion { kind: ApiErrorKind, message: String },

    /// Combined prompt exceeds the completion model's context budget.
    #[error("prompt of {prompt_chars} chars exceeds context budget of {budget_chars}")]
    ContextOverflow {
        prompt_chars: usize,
        budget_chars: usize,
    },

    /// Invalid or missing configuration.
    #[error("configuration error: {0}")]
    Config(String),

    /// Index storage failure.
    #[error("index storage error: {0}")]
    Index(#[from] sqlx::Error),
}

impl PipelineError {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    pub fn parse(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Self::Parse {
            path: path.into(),
            message: message.into(),
        }
    }

    pub fn embedding(kind: ApiErrorKind, message: impl Into<String>) -> Self {
        Self::Embedding {
            kind,
            message: message.into(),
        }
    }

    pub fn completion(kind: ApiErrorKind, message: impl Into<String>) -> Self {
        Self::Completion {
            kind,
            message: message.into(),
        }
    }

    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }
}
