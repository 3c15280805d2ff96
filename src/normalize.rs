//! Content normalization.
//!
//! Every document that reaches the splitter must carry a single flat string.
//! String content passes through unchanged; ordered fragments join with a
//! newline, preserving order. Structured values are coerced to their JSON
//! serialization; `null` content is rejected as a parse error.

use crate::error::{PipelineError, Result};
use crate::models::{Document, RawContent};

/// Flatten a document's content to a single string.
pub fn normalize_document(mut doc: Document) -> Result<Document> {
    let flat = match doc.content {
        RawContent::Text(s) => s,
        RawContent::Fragments(parts) => parts.join("\n"),
        RawContent::Value(serde_json::Value::Null) => {
            return Err(PipelineError::parse(
                doc.source_path,
                "document has null content",
            ));
        }
        RawContent::Value(value) => serde_json::to_string(&value)
            .map_err(|e| PipelineError::parse(doc.source_path.clone(), e.to_string()))?,
    };

    doc.content = RawContent::Text(flat);
    Ok(doc)
}

/// Normalize a whole corpus, preserving document order.
pub fn normalize_all(docs: Vec<Document>) -> Result<Vec<Document>> {
    docs.into_iter().map(normalize_document).collect()
}
