use anyhow::{Context, Result};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::loader::ParserKind;
use crate::qa::Strategy;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub docs: DocsConfig,
    pub chunking: ChunkingConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub completion: CompletionConfig,
    #[serde(default)]
    pub qa: QaConfig,
    pub index: IndexConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DocsConfig {
    pub root: PathBuf,
    /// File extension → parser kind. Extensions not listed here are skipped.
    #[serde(default = "default_parsers")]
    pub parsers: BTreeMap<String, ParserKind>,
    #[serde(default)]
    pub exclude_globs: Vec<String>,
    #[serde(default)]
    pub follow_symlinks: bool,
}

fn default_parsers() -> BTreeMap<String, ParserKind> {
    let mut map = BTreeMap::new();
    map.insert("txt".to_string(), ParserKind::Text);
    map.insert("md".to_string(), ParserKind::Text);
    map.insert("json".to_string(), ParserKind::Json);
    map
}

#[derive(Debug, Deserialize, Clone)]
pub struct ChunkingConfig {
    pub chunk_size: usize,
    #[serde(default = "default_overlap")]
    pub chunk_overlap: usize,
}

fn default_overlap() -> usize {
    0
}

#[derive(Debug, Deserialize, Clone)]
pub struct EmbeddingConfig {
    #[serde(default = "default_embedding_model")]
    pub model: String,
    #[serde(default = "default_dims")]
    pub dims: usize,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            model: default_embedding_model(),
            dims: default_dims(),
            batch_size: default_batch_size(),
            concurrency: default_concurrency(),
            max_retries: default_max_retries(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

fn default_embedding_model() -> String {
    "text-embedding-3-small".to_string()
}
fn default_dims() -> usize {
    1536
}
fn default_batch_size() -> usize {
    64
}
fn default_concurrency() -> usize {
    2
}
fn default_max_retries() -> u32 {
    5
}
fn default_timeout_secs() -> u64 {
    30
}

#[derive(Debug, Deserialize, Clone)]
pub struct CompletionConfig {
    #[serde(default = "default_completion_model")]
    pub model: String,
    /// Prompt budget in characters; a stuffed prompt beyond this aborts
    /// with a context-overflow error instead of a truncated API call.
    #[serde(default = "default_context_budget")]
    pub context_budget_chars: usize,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_completion_timeout")]
    pub timeout_secs: u64,
}

impl Default for CompletionConfig {
    fn default() -> Self {
        Self {
            model: default_completion_model(),
            context_budget_chars: default_context_budget(),
            max_retries: default_max_retries(),
            timeout_secs: default_completion_timeout(),
        }
    }
}

fn default_completion_model() -> String {
    "gpt-4o-mini".to_string()
}
fn default_context_budget() -> usize {
    48_000
}
fn default_completion_timeout() -> u64 {
    60
}

#[derive(Debug, Deserialize, Clone)]
pub struct QaConfig {
    #[serde(default)]
    pub strategy: Strategy,
    #[serde(default = "default_top_k")]
    pub top_k: usize,
}

impl Default for QaConfig {
    fn default() -> Self {
        Self {
            strategy: Strategy::default(),
            top_k: default_top_k(),
        }
    }
}

fn default_top_k() -> usize {
    4
}

#[derive(Debug, Deserialize, Clone)]
pub struct IndexConfig {
    pub path: PathBuf,
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;

    validate(&config)?;
    Ok(config)
}

fn validate(config: &Config) -> Result<()> {
    if config.chunking.chunk_size == 0 {
        anyhow::bail!("chunking.chunk_size must be > 0");
    }

    if config.chunking.chunk_overlap >= config.chunking.chunk_size {
        anyhow::bail!(
            "chunking.chunk_overlap ({}) must be < chunking.chunk_size ({})",
            config.chunking.chunk_overlap,
            config.chunking.chunk_size
        );
    }

    if config.embedding.dims == 0 {
        anyhow::bail!("embedding.dims must be > 0");
    }

    if config.embedding.batch_size == 0 {
        anyhow::bail!("embedding.batch_size must be > 0");
    }

    if config.embedding.concurrency == 0 {
        anyhow::bail!("embedding.concurrency must be > 0");
    }

    if config.qa.top_k == 0 {
        anyhow::bail!("qa.top_k must be >= 1");
    }

    if config.completion.context_budget_chars == 0 {
        anyhow::bail!("completion.context_budget_chars must be > 0");
    }

    if config.docs.parsers.is_empty() {
        anyhow::bail!("docs.parsers must map at least one extension");
    }

    Ok(())
}
