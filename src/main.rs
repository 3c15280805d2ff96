//! # Corpus QA CLI (`cqa`)
//!
//! The `cqa` binary drives the pipeline end to end. It provides commands for
//! building the index from a document directory and for asking questions
//! against it.
//!
//! ## Usage
//!
//! ```bash
//! cqa --config ./config/cqa.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `cqa index` | Load, split, and embed the corpus into the index file |
//! | `cqa ask "<question>"` | Answer a question against the index (builds it first if absent) |

use anyhow::Context;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;

use corpus_qa::completion::OpenAiCompletion;
use corpus_qa::config;
use corpus_qa::embedding::{Embedder, OpenAiEmbedder};
use corpus_qa::index::Index;
use corpus_qa::indexer;
use corpus_qa::qa;

/// Corpus QA — retrieval-augmented question answering over a local
/// document corpus.
///
/// All commands accept a `--config` flag pointing to a TOML configuration
/// file. See `config/cqa.example.toml` for a full example.
#[derive(Parser)]
#[command(
    name = "cqa",
    about = "Corpus QA — retrieval-augmented question answering over a local document corpus",
    version
)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/cqa.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

/// Top-level CLI commands.
#[derive(Subcommand)]
enum Commands {
    /// Build the index from the configured docs root.
    ///
    /// Loads every mapped file, normalizes and splits it into chunks, embeds
    /// the chunks, and writes the index file. An existing index at the
    /// configured path is replaced atomically on success and left untouched
    /// on failure.
    Index,

    /// Answer a question against the index.
    ///
    /// Embeds the question, retrieves the nearest chunks, and synthesizes an
    /// answer with the configured strategy. If no index file exists yet, one
    /// is built first.
    Ask {
        /// The question to answer.
        question: String,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let cfg = config::load_config(&cli.config)?;

    match cli.command {
        Commands::Index => {
            let embedder = Arc::new(OpenAiEmbedder::new(&cfg.embedding)?);
            indexer::build_index(&cfg, embedder).await?;
        }
        Commands::Ask { question } => {
            let embedder = Arc::new(OpenAiEmbedder::new(&cfg.embedding)?);

            if !cfg.index.path.exists() {
                indexer::build_index(&cfg, Arc::clone(&embedder) as Arc<dyn Embedder>).await?;
            }

            let completion = OpenAiCompletion::new(&cfg.completion)?;
            let index = Index::open(&cfg.index.path).await?;

            let result = qa::answer(
                &index,
                embedder.as_ref(),
                &completion,
                &question,
                cfg.qa.strategy,
                cfg.qa.top_k,
            )
            .await
            .with_context(|| format!("failed to answer: {}", question))?;

            index.close().await;

            println!("{}", result.answer);
            println!();
            println!("Sources:");
            for item in &result.source_chunks {
                println!(
                    "  [{:.4}] {} (chunk {})",
                    item.score,
                    item.chunk.source_path.display(),
                    item.chunk.ordinal
                );
            }
        }
    }

    Ok(())
}
