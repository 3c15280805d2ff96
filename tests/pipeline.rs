//! End-to-end pipeline tests with fake embedding and completion providers.
//!
//! These drive the library through the same path the `cqa` binary takes,
//! with deterministic in-process providers instead of the OpenAI API.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tempfile::TempDir;

use corpus_qa::completion::CompletionModel;
use corpus_qa::config::{self, Config};
use corpus_qa::embedding::Embedder;
use corpus_qa::error::{ApiErrorKind, PipelineError, Result};
use corpus_qa::index::Index;
use corpus_qa::indexer;
use corpus_qa::qa::{self, Strategy};

/// Embeds text as marker-word counts, so retrieval is fully predictable.
struct FakeEmbedder {
    model: String,
}

impl FakeEmbedder {
    fn new() -> Self {
        Self {
            model: "fake-embed".to_string(),
        }
    }

    fn named(model: &str) -> Self {
        Self {
            model: model.to_string(),
        }
    }

    fn vectorize(text: &str) -> Vec<f32> {
        let lower = text.to_lowercase();
        ["sky", "grass", "sun", "sea"]
            .iter()
            .map(|word| lower.matches(word).count() as f32 + 0.01)
            .collect()
    }
}

#[async_trait]
impl Embedder for FakeEmbedder {
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        Ok(texts.iter().map(|t| Self::vectorize(t)).collect())
    }

    fn model_name(&self) -> &str {
        &self.model
    }

    fn dims(&self) -> usize {
        4
    }
}

/// Fails every call with an authentication error.
struct AuthFailEmbedder;

#[async_trait]
impl Embedder for AuthFailEmbedder {
    async fn embed(&self, _texts: &[String]) -> Result<Vec<Vec<f32>>> {
        Err(PipelineError::embedding(
            ApiErrorKind::Auth,
            "embeddings API returned 401",
        ))
    }

    fn model_name(&self) -> &str {
        "fake-embed"
    }

    fn dims(&self) -> usize {
        4
    }
}

/// Returns a canned answer and records every prompt it receives.
struct FakeCompletion {
    answer: String,
    budget: usize,
    prompts: Mutex<Vec<String>>,
}

impl FakeCompletion {
    fn new(answer: &str) -> Self {
        Self {
            answer: answer.to_string(),
            budget: 100_000,
            prompts: Mutex::new(Vec::new()),
        }
    }

    fn with_budget(answer: &str, budget: usize) -> Self {
        Self {
            answer: answer.to_string(),
            budget,
            prompts: Mutex::new(Vec::new()),
        }
    }

    fn prompts(&self) -> Vec<String> {
        self.prompts.lock().unwrap().clone()
    }
}

#[async_trait]
impl CompletionModel for FakeCompletion {
    async fn complete(&self, prompt: &str) -> Result<String> {
        self.prompts.lock().unwrap().push(prompt.to_string());
        Ok(self.answer.clone())
    }

    fn model_name(&self) -> &str {
        "fake-completion"
    }

    fn context_budget_chars(&self) -> usize {
        self.budget
    }
}

struct TestEnv {
    _tmp: TempDir,
    docs_dir: PathBuf,
    index_path: PathBuf,
    config_path: PathBuf,
}

fn setup(chunk_size: usize, chunk_overlap: usize, strategy: &str, top_k: usize) -> TestEnv {
    let tmp = TempDir::new().unwrap();
    let root = tmp.path().to_path_buf();

    let docs_dir = root.join("docs");
    fs::create_dir_all(&docs_dir).unwrap();

    let index_path = root.join("data").join("corpus.index");

    let config_content = format!(
        r#"[docs]
root = "{docs}"

[chunking]
chunk_size = {chunk_size}
chunk_overlap = {chunk_overlap}

[qa]
strategy = "{strategy}"
top_k = {top_k}

[index]
path = "{index}"
"#,
        docs = docs_dir.display(),
        index = index_path.display(),
    );

    let config_path = root.join("cqa.toml");
    fs::write(&config_path, config_content).unwrap();

    TestEnv {
        _tmp: tmp,
        docs_dir,
        index_path,
        config_path,
    }
}

fn load(env: &TestEnv) -> Config {
    config::load_config(&env.config_path).unwrap()
}

fn write_doc(env: &TestEnv, name: &str, content: &str) {
    fs::write(env.docs_dir.join(name), content).unwrap();
}

async fn ask(
    index_path: &Path,
    completion: &FakeCompletion,
    question: &str,
    strategy: Strategy,
    k: usize,
) -> Result<corpus_qa::models::QueryResult> {
    let embedder = FakeEmbedder::new();
    let index = Index::open(index_path).await?;
    let result = qa::answer(&index, &embedder, completion, question, strategy, k).await;
    index.close().await;
    result
}

#[tokio::test]
async fn test_single_text_file_yields_one_chunk() {
    let env = setup(1000, 0, "stuff", 4);
    write_doc(&env, "sky.txt", "The sky is blue. Grass is green.");

    let cfg = load(&env);
    let report = indexer::build_index(&cfg, Arc::new(FakeEmbedder::new()))
        .await
        .unwrap();

    assert_eq!(report.documents, 1);
    assert_eq!(report.chunks, 1);
    assert!(env.index_path.exists());

    let index = Index::open(&env.index_path).await.unwrap();
    assert_eq!(index.chunk_count().await.unwrap(), 1);
    index.close().await;
}

#[tokio::test]
async fn test_json_array_yields_one_document_per_element() {
    let env = setup(1000, 0, "stuff", 4);
    write_doc(&env, "records.json", r#"["A", "B"]"#);

    let cfg = load(&env);
    let report = indexer::build_index(&cfg, Arc::new(FakeEmbedder::new()))
        .await
        .unwrap();

    assert_eq!(report.documents, 2);
    assert_eq!(report.chunks, 2);
}

#[tokio::test]
async fn test_ask_retrieves_nearest_chunk() {
    let env = setup(1000, 0, "stuff", 4);
    write_doc(&env, "a.txt", "The sky is blue today.");
    write_doc(&env, "b.txt", "Grass is green in spring.");
    write_doc(&env, "c.txt", "The sun is bright at noon.");

    let cfg = load(&env);
    indexer::build_index(&cfg, Arc::new(FakeEmbedder::new()))
        .await
        .unwrap();

    let completion = FakeCompletion::new("Green.");
    let result = ask(
        &env.index_path,
        &completion,
        "What colour is the grass?",
        Strategy::Stuff,
        1,
    )
    .await
    .unwrap();

    assert_eq!(result.answer, "Green.");
    assert_eq!(result.source_chunks.len(), 1);
    assert!(result.source_chunks[0].chunk.text.contains("Grass is green"));

    // The single retrieved chunk is the only context in the prompt.
    let prompts = completion.prompts();
    assert_eq!(prompts.len(), 1);
    assert!(prompts[0].contains("Grass is green"));
    assert!(!prompts[0].contains("sky is blue"));
}

#[tokio::test]
async fn test_failed_build_leaves_no_index() {
    let env = setup(1000, 0, "stuff", 4);
    write_doc(&env, "a.txt", "The sky is blue.");

    let cfg = load(&env);
    let err = indexer::build_index(&cfg, Arc::new(AuthFailEmbedder))
        .await
        .unwrap_err();

    match err {
        PipelineError::Embedding { kind, .. } => assert_eq!(kind, ApiErrorKind::Auth),
        other => panic!("expected embedding error, got {:?}", other),
    }
    assert!(!env.index_path.exists());
}

#[tokio::test]
async fn test_failed_rebuild_preserves_existing_index() {
    let env = setup(1000, 0, "stuff", 4);
    write_doc(&env, "a.txt", "The sky is blue.");

    let cfg = load(&env);
    indexer::build_index(&cfg, Arc::new(FakeEmbedder::new()))
        .await
        .unwrap();

    write_doc(&env, "b.txt", "Grass is green.");
    let result = indexer::build_index(&cfg, Arc::new(AuthFailEmbedder)).await;
    assert!(result.is_err());

    // The first build is still intact and queryable.
    let index = Index::open(&env.index_path).await.unwrap();
    assert_eq!(index.chunk_count().await.unwrap(), 1);
    index.close().await;
}

#[tokio::test]
async fn test_refine_calls_completion_once_per_chunk() {
    let env = setup(1000, 0, "refine", 3);
    write_doc(&env, "a.txt", "The sky is blue today.");
    write_doc(&env, "b.txt", "Grass is green in spring.");
    write_doc(&env, "c.txt", "The sun is bright at noon.");

    let cfg = load(&env);
    indexer::build_index(&cfg, Arc::new(FakeEmbedder::new()))
        .await
        .unwrap();

    let completion = FakeCompletion::new("An answer.");
    let result = ask(
        &env.index_path,
        &completion,
        "What colour is the sky?",
        Strategy::Refine,
        3,
    )
    .await
    .unwrap();

    assert_eq!(result.source_chunks.len(), 3);
    let prompts = completion.prompts();
    assert_eq!(prompts.len(), 3);
    // Every refine step after the seed carries the running answer forward.
    assert!(prompts[1].contains("An answer."));
    assert!(prompts[2].contains("An answer."));
}

#[tokio::test]
async fn test_stuff_rejects_oversized_prompt() {
    let env = setup(1000, 0, "stuff", 4);
    write_doc(&env, "a.txt", "The sky is blue today and the sea is calm.");

    let cfg = load(&env);
    indexer::build_index(&cfg, Arc::new(FakeEmbedder::new()))
        .await
        .unwrap();

    let completion = FakeCompletion::with_budget("unreachable", 20);
    let err = ask(
        &env.index_path,
        &completion,
        "What colour is the sky?",
        Strategy::Stuff,
        4,
    )
    .await
    .unwrap_err();

    match err {
        PipelineError::ContextOverflow { budget_chars, .. } => assert_eq!(budget_chars, 20),
        other => panic!("expected context overflow, got {:?}", other),
    }
    // Overflow is detected before any completion call is made.
    assert!(completion.prompts().is_empty());
}

#[tokio::test]
async fn test_query_rejects_mismatched_embedding_model() {
    let env = setup(1000, 0, "stuff", 4);
    write_doc(&env, "a.txt", "The sky is blue.");

    let cfg = load(&env);
    indexer::build_index(&cfg, Arc::new(FakeEmbedder::new()))
        .await
        .unwrap();

    let other = FakeEmbedder::named("other-embed");
    let completion = FakeCompletion::new("unreachable");
    let index = Index::open(&env.index_path).await.unwrap();
    let err = qa::answer(&index, &other, &completion, "Q?", Strategy::Stuff, 4)
        .await
        .unwrap_err();
    index.close().await;

    match err {
        PipelineError::Config(message) => assert!(message.contains("fake-embed")),
        other => panic!("expected config error, got {:?}", other),
    }
}

#[tokio::test]
async fn test_concurrent_build_is_rejected() {
    let env = setup(1000, 0, "stuff", 4);
    write_doc(&env, "a.txt", "The sky is blue.");

    fs::create_dir_all(env.index_path.parent().unwrap()).unwrap();
    let lock_file = PathBuf::from(format!("{}.lock", env.index_path.display()));
    fs::write(&lock_file, "").unwrap();

    let cfg = load(&env);
    let err = indexer::build_index(&cfg, Arc::new(FakeEmbedder::new()))
        .await
        .unwrap_err();

    match err {
        PipelineError::Config(message) => assert!(message.contains("lock")),
        other => panic!("expected config error, got {:?}", other),
    }
}

#[tokio::test]
async fn test_overlapping_chunks_stay_within_size() {
    let env = setup(40, 8, "stuff", 4);
    write_doc(
        &env,
        "long.txt",
        "The sky is blue. Grass is green. The sun is bright. The sea is calm. Night falls late.",
    );

    let cfg = load(&env);
    let report = indexer::build_index(&cfg, Arc::new(FakeEmbedder::new()))
        .await
        .unwrap();
    assert!(report.chunks > 1);

    let index = Index::open(&env.index_path).await.unwrap();
    let retrieved = index
        .nearest(&FakeEmbedder::vectorize("sky grass sun sea"), 100)
        .await
        .unwrap();
    index.close().await;

    assert_eq!(retrieved.len(), report.chunks);
    for item in &retrieved {
        assert!(item.chunk.text.chars().count() <= 40);
    }
}
