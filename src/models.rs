//! Core data models used throughout corpus-qa.
//!
//! These types represent the documents, chunks, and answers that flow
//! through the ingestion and retrieval pipeline.

use std::path::PathBuf;

/// Document content as produced by a parser, before normalization.
///
/// Plain-text files arrive as [`RawContent::Text`]; JSON files may arrive
/// as a flat string, an ordered list of string fields, or an arbitrary
/// structured value that normalization must flatten or reject.
#[derive(Debug, Clone, PartialEq)]
pub enum RawContent {
    Text(String),
    Fragments(Vec<String>),
    Value(serde_json::Value),
}

/// A source document. After [`crate::normalize::normalize_document`] runs,
/// `content` is always `RawContent::Text`.
#[derive(Debug, Clone)]
pub struct Document {
    pub id: String,
    pub source_path: PathBuf,
    pub content: RawContent,
    pub metadata: serde_json::Value,
}

impl Document {
    /// The flattened content, if this document has been normalized.
    pub fn text(&self) -> Option<&str> {
        match &self.content {
            RawContent::Text(s) => Some(s),
            _ => None,
        }
    }
}

/// A bounded slice of a document's normalized text, the unit of embedding
/// and retrieval. Created at split time, owned by the index build.
#[derive(Debug, Clone, PartialEq)]
pub struct Chunk {
    pub id: String,
    pub document_id: String,
    pub source_path: PathBuf,
    pub ordinal: i64,
    pub text: String,
    pub hash: String,
}

/// A chunk retrieved from the index, with its similarity to the query.
#[derive(Debug, Clone)]
pub struct RetrievedChunk {
    pub chunk: Chunk,
    pub score: f64,
}

/// Answer to a single query plus the chunks it was grounded on,
/// ordered by descending relevance.
#[derive(Debug, Clone)]
pub struct QueryResult {
    pub answer: String,
    pub source_chunks: Vec<RetrievedChunk>,
}
