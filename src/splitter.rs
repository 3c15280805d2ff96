//! Recursive character splitter.
//!
//! Divides normalized document text into chunks of at most `chunk_size`
//! characters, splitting on the coarsest separator that fits: paragraph
//! break, line break, sentence boundary, whitespace, then a hard character
//! cut. Separators stay attached to the piece they terminate, so
//! concatenating the chunks (discounting overlap) reconstructs the original
//! text exactly.
//!
//! Each chunk receives a per-document ordinal starting at 0, a UUID, and a
//! SHA-256 hash of its text. Splitting is deterministic: the same input and
//! config always produce the same chunk sequence.

use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::config::ChunkingConfig;
use crate::error::{PipelineError, Result};
use crate::models::{Chunk, Document};

/// Separator priority, coarsest first. The hard character cut is the
/// implicit final level.
const SEPARATORS: [&str; 4] = ["\n\n", "\n", ". ", " "];

/// Split one normalized document into chunks. Empty documents yield no
/// chunks. Errors if the document has not been normalized.
pub fn split_document(doc: &Document, config: &ChunkingConfig) -> Result<Vec<Chunk>> {
    let text = doc.text().ok_or_else(|| {
        PipelineError::config(format!(
            "document {} reached the splitter without normalization",
            doc.source_path.display()
        ))
    })?;

    if text.is_empty() {
        return Ok(Vec::new());
    }

    // Merge budget excludes the overlap so that chunks stay within
    // chunk_size after the previous chunk's tail is prepended.
    let budget = config.chunk_size - config.chunk_overlap;
    let pieces = split_pieces(text, budget, &SEPARATORS);
    let merged = merge_pieces(pieces, budget);
    let with_overlap = apply_overlap(merged, config.chunk_overlap);

    let chunks = with_overlap
        .into_iter()
        .enumerate()
        .map(|(i, text)| make_chunk(doc, i as i64, text))
        .collect();

    Ok(chunks)
}

/// Split a whole corpus, preserving document order. Ordinals restart at 0
/// for each document.
pub fn split_corpus(docs: &[Document], config: &ChunkingConfig) -> Result<Vec<Chunk>> {
    let mut chunks = Vec::new();
    for doc in docs {
        chunks.extend(split_document(doc, config)?);
    }
    Ok(chunks)
}

/// Recursively split text into pieces of at most `budget` characters,
/// trying each separator in priority order and hard-cutting as a last
/// resort. Separators remain attached to the preceding piece.
fn split_pieces(text: &str, budget: usize, separators: &[&str]) -> Vec<String> {
    if char_len(text) <= budget {
        return vec![text.to_string()];
    }

    match separators.first() {
        Some(sep) => {
            let mut out = Vec::new();
            for piece in text.split_inclusive(sep) {
                if char_len(piece) <= budget {
                    out.push(piece.to_string());
                } else {
                    out.extend(split_pieces(piece, budget, &separators[1..]));
                }
            }
            out
        }
        None => hard_cut(text, budget),
    }
}

/// Cut text at character boundaries every `budget` characters.
fn hard_cut(text: &str, budget: usize) -> Vec<String> {
    let mut out = Vec::new();
    let mut current = String::new();
    let mut count = 0;

    for ch in text.chars() {
        if count == budget {
            out.push(std::mem::take(&mut current));
            count = 0;
        }
        current.push(ch);
        count += 1;
    }
    if !current.is_empty() {
        out.push(current);
    }
    out
}

/// Greedily merge adjacent pieces into chunks of at most `budget` characters.
fn merge_pieces(pieces: Vec<String>, budget: usize) -> Vec<String> {
    let mut chunks = Vec::new();
    let mut buf = String::new();
    let mut buf_len = 0usize;

    for piece in pieces {
        let piece_len = char_len(&piece);
        if buf_len + piece_len > budget && !buf.is_empty() {
            chunks.push(std::mem::take(&mut buf));
            buf_len = 0;
        }
        buf.push_str(&piece);
        buf_len += piece_len;
    }
    if !buf.is_empty() {
        chunks.push(buf);
    }

    chunks
}

/// Prepend the trailing `overlap` characters of each chunk to its successor.
/// The tail is taken from the chunk before overlap was applied, so overlap
/// never compounds.
fn apply_overlap(chunks: Vec<String>, overlap: usize) -> Vec<String> {
    if overlap == 0 {
        return chunks;
    }

    let mut out = Vec::with_capacity(chunks.len());
    let mut prev_tail = String::new();

    for (i, chunk) in chunks.into_iter().enumerate() {
        let with_overlap = if i == 0 {
            chunk.clone()
        } else {
            format!("{}{}", prev_tail, chunk)
        };
        prev_tail = char_suffix(&chunk, overlap);
        out.push(with_overlap);
    }

    out
}

fn char_len(s: &str) -> usize {
    s.chars().count()
}

/// The last `n` characters of `s` (all of `s` if shorter).
fn char_suffix(s: &str, n: usize) -> String {
    let len = char_len(s);
    if len <= n {
        return s.to_string();
    }
    s.chars().skip(len - n).collect()
}

fn make_chunk(doc: &Document, ordinal: i64, text: String) -> Chunk {
    let mut hasher = Sha256::new();
    hasher.update(text.as_bytes());
    let hash = format!("{:x}", hasher.finalize());

    Chunk {
        id: Uuid::new_v4().to_string(),
        document_id: doc.id.clone(),
        source_path: doc.source_path.clone(),
        ordinal,
        text,
        hash,
    }
}
