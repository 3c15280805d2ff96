//! # Corpus QA
//!
//! A retrieval-augmented question answering pipeline over a local document
//! corpus.
//!
//! Corpus QA loads text and JSON documents from a directory, normalizes and
//! splits them into bounded overlapping chunks, embeds the chunks through a
//! remote embedding API into a persisted SQLite nearest-neighbor index, and
//! answers questions against that index with a completion model.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────┐   ┌───────────┐   ┌──────────┐   ┌──────────┐
//! │  Loader   │──▶│ Normalize │──▶│ Splitter │──▶│  Indexer  │
//! │ txt/json  │   │ flat text │   │  chunks  │   │ embed+DB │
//! └──────────┘   └───────────┘   └──────────┘   └────┬─────┘
//!                                                    │
//!                                               ┌────▼─────┐
//!                                               │    QA     │
//!                                               │ stuff/    │
//!                                               │ refine    │
//!                                               └──────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! cqa index                          # build the index from the docs root
//! cqa ask "What colour is the sky?"  # retrieve + answer
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`models`] | Core data types |
//! | [`loader`] | Document loading from the docs root |
//! | [`normalize`] | Content normalization to flat text |
//! | [`splitter`] | Recursive character splitting |
//! | [`embedding`] | Embedding provider abstraction |
//! | [`completion`] | Completion provider abstraction |
//! | [`index`] | Persisted SQLite vector index |
//! | [`indexer`] | Index build orchestration |
//! | [`qa`] | Retrieval and answer composition |
//! | [`error`] | Pipeline error taxonomy |

pub mod completion;
pub mod config;
pub mod embedding;
pub mod error;
pub mod index;
pub mod indexer;
pub mod loader;
pub mod models;
pub mod normalize;
pub mod qa;
pub mod splitter;
