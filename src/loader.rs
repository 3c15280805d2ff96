//! Directory loader with per-extension parser dispatch.
//!
//! Walks a configured root directory and turns each recognized file into one
//! or more [`Document`]s. The extension → [`ParserKind`] mapping comes from
//! configuration; files with unmapped extensions are skipped, not errors.
//! A missing or unreadable root aborts the run.

use globset::{Glob, GlobSet, GlobSetBuilder};
use serde::Deserialize;
use std::path::Path;
use uuid::Uuid;
use walkdir::WalkDir;

use crate::config::DocsConfig;
use crate::error::{PipelineError, Result};
use crate::models::{Document, RawContent};

/// Parsing strategy for one file extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ParserKind {
    /// Whole file body becomes one document.
    Text,
    /// One document per top-level JSON record.
    Json,
}

/// Scan the docs root and parse every recognized file.
///
/// Returns documents in deterministic order (sorted by relative path, with
/// per-file record order preserved).
pub fn load_documents(config: &DocsConfig) -> Result<Vec<Document>> {
    let root = &config.root;
    if !root.exists() {
        return Err(PipelineError::io(
            root.clone(),
            std::io::Error::new(std::io::ErrorKind::NotFound, "docs root does not exist"),
        ));
    }

    let mut default_excludes = vec![
        "**/.git/**".to_string(),
        "**/target/**".to_string(),
        "**/node_modules/**".to_string(),
    ];
    default_excludes.extend(config.exclude_globs.clone());
    let exclude_set = build_globset(&default_excludes)?;

    let mut files = Vec::new();

    let walker = WalkDir::new(root).follow_links(config.follow_symlinks);
    for entry in walker {
        let entry = entry.map_err(|e| {
            let path = e.path().unwrap_or(root).to_path_buf();
            let io = e
                .into_io_error()
                .unwrap_or_else(|| std::io::Error::other("directory walk failed"));
            PipelineError::io(path, io)
        })?;
        if !entry.file_type().is_file() {
            continue;
        }

        let path = entry.path();
        let relative = path.strip_prefix(root).unwrap_or(path);
        let rel_str = relative.to_string_lossy().to_string();

        if exclude_set.is_match(&rel_str) {
            continue;
        }

        let ext = match path.extension().and_then(|e| e.to_str()) {
            Some(e) => e.to_ascii_lowercase(),
            None => continue,
        };

        let kind = match config.parsers.get(&ext) {
            Some(k) => *k,
            None => continue, // unmapped extension, skip
        };

        files.push((rel_str, path.to_path_buf(), kind));
    }

    // Sort for deterministic ordering
    files.sort_by(|a, b| a.0.cmp(&b.0));

    let mut documents = Vec::new();
    for (_, path, kind) in files {
        documents.extend(parse_file(&path, kind)?);
    }

    Ok(documents)
}

/// Parse a single file into documents according to its parser kind.
pub fn parse_file(path: &Path, kind: ParserKind) -> Result<Vec<Document>> {
    match kind {
        ParserKind::Text => parse_text(path),
        ParserKind::Json => parse_json(path),
    }
}

fn parse_text(path: &Path) -> Result<Vec<Document>> {
    let body =
        std::fs::read_to_string(path).map_err(|e| PipelineError::io(path.to_path_buf(), e))?;

    Ok(vec![make_document(path, RawContent::Text(body), None)])
}

/// A JSON file yields one document per top-level record: each element of a
/// top-level array, or the whole value otherwise. String records become flat
/// text; arrays whose elements are all strings become ordered fragments;
/// anything else is carried structured for normalization to decide.
fn parse_json(path: &Path) -> Result<Vec<Document>> {
    let body =
        std::fs::read_to_string(path).map_err(|e| PipelineError::io(path.to_path_buf(), e))?;

    let value: serde_json::Value = serde_json::from_str(&body)
        .map_err(|e| PipelineError::parse(path.to_path_buf(), e.to_string()))?;

    let records: Vec<serde_json::Value> = match value {
        serde_json::Value::Array(items) => items,
        other => vec![other],
    };

    let documents = records
        .into_iter()
        .enumerate()
        .map(|(i, record)| {
            let content = record_content(record);
            make_document(path, content, Some(i))
        })
        .collect();

    Ok(documents)
}

fn record_content(record: serde_json::Value) -> RawContent {
    match record {
        serde_json::Value::String(s) => RawContent::Text(s),
        serde_json::Value::Array(items)
            if items.iter().all(|v| matches!(v, serde_json::Value::String(_))) =>
        {
            let fragments = items
                .into_iter()
                .filter_map(|v| match v {
                    serde_json::Value::String(s) => Some(s),
                    _ => None,
                })
                .collect();
            RawContent::Fragments(fragments)
        }
        other => RawContent::Value(other),
    }
}

fn make_document(path: &Path, content: RawContent, record_index: Option<usize>) -> Document {
    let mut metadata = serde_json::json!({
        "source": path.display().to_string(),
    });
    if let Some(i) = record_index {
        metadata["record"] = serde_json::json!(i);
    }

    Document {
        id: Uuid::new_v4().to_string(),
        source_path: path.to_path_buf(),
        content,
        metadata,
    }
}

fn build_globset(patterns: &[String]) -> Result<GlobSet> {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        let glob = Glob::new(pattern)
            .map_err(|e| PipelineError::config(format!("invalid exclude glob: {}", e)))?;
        builder.add(glob);
    }
    builder
        .build()
        .map_err(|e| PipelineError::config(format!("invalid exclude globs: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DocsConfig;
    use std::collections::BTreeMap;
    use std::fs;

    fn docs_config(root: &Path) -> DocsConfig {
        let mut parsers = BTreeMap::new();
        parsers.insert("txt".to_string(), ParserKind::Text);
        parsers.insert("json".to_string(), ParserKind::Json);
        DocsConfig {
            root: root.to_path_buf(),
            parsers,
            exclude_globs: Vec::new(),
            follow_symlinks: false,
        }
    }

    #[test]
    fn test_text_file_one_document() {
        let tmp = tempfile::tempdir().unwrap();
        fs::write(tmp.path().join("a.txt"), "The sky is blue.").unwrap();

        let docs = load_documents(&docs_config(tmp.path())).unwrap();
        assert_eq!(docs.len(), 1);
        assert_eq!(docs[0].content, RawContent::Text("The sky is blue.".into()));
    }

    #[test]
    fn test_json_array_one_document_per_record() {
        let tmp = tempfile::tempdir().unwrap();
        fs::write(tmp.path().join("r.json"), r#"["A","B"]"#).unwrap();

        let docs = load_documents(&docs_config(tmp.path())).unwrap();
        assert_eq!(docs.len(), 2);
        assert_eq!(docs[0].content, RawContent::Text("A".into()));
        assert_eq!(docs[1].content, RawContent::Text("B".into()));
    }

    #[test]
    fn test_json_string_array_record_becomes_fragments() {
        let tmp = tempfile::tempdir().unwrap();
        fs::write(tmp.path().join("r.json"), r#"[["x","y"]]"#).unwrap();

        let docs = load_documents(&docs_config(tmp.path())).unwrap();
        assert_eq!(docs.len(), 1);
        assert_eq!(
            docs[0].content,
            RawContent::Fragments(vec!["x".into(), "y".into()])
        );
    }

    #[test]
    fn test_unsupported_extension_skipped() {
        let tmp = tempfile::tempdir().unwrap();
        fs::write(tmp.path().join("a.txt"), "kept").unwrap();
        fs::write(tmp.path().join("b.pdf"), "ignored").unwrap();

        let docs = load_documents(&docs_config(tmp.path())).unwrap();
        assert_eq!(docs.len(), 1);
    }

    #[test]
    fn test_missing_root_is_io_error() {
        let tmp = tempfile::tempdir().unwrap();
        let missing = tmp.path().join("nope");
        let err = load_documents(&docs_config(&missing)).unwrap_err();
        assert!(matches!(err, PipelineError::Io { .. }));
    }

    #[test]
    fn test_malformed_json_is_parse_error_with_path() {
        let tmp = tempfile::tempdir().unwrap();
        fs::write(tmp.path().join("bad.json"), "{not json").unwrap();

        let err = load_documents(&docs_config(tmp.path())).unwrap_err();
        match err {
            PipelineError::Parse { path, .. } => {
                assert!(path.to_string_lossy().ends_with("bad.json"))
            }
            other => panic!("expected parse error, got {:?}", other),
        }
    }

    #[test]
    fn test_deterministic_ordering() {
        let tmp = tempfile::tempdir().unwrap();
        fs::write(tmp.path().join("b.txt"), "second").unwrap();
        fs::write(tmp.path().join("a.txt"), "first").unwrap();

        let docs = load_documents(&docs_config(tmp.path())).unwrap();
        assert_eq!(docs[0].content, RawContent::Text("first".into()));
        assert_eq!(docs[1].content, RawContent::Text("second".into()));
    }

    #[test]
    fn test_exclude_globs_respected() {
        let tmp = tempfile::tempdir().unwrap();
        fs::create_dir_all(tmp.path().join("drafts")).unwrap();
        fs::write(tmp.path().join("keep.txt"), "keep").unwrap();
        fs::write(tmp.path().join("drafts/skip.txt"), "skip").unwrap();

        let mut config = docs_config(tmp.path());
        config.exclude_globs = vec!["drafts/**".to_string()];

        let docs = load_documents(&config).unwrap();
        assert_eq!(docs.len(), 1);
        assert_eq!(docs[0].content, RawContent::Text("keep".into()));
    }
}
