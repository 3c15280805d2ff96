//! Retriever-QA pipeline.
//!
//! `answer` embeds the query, retrieves the k nearest chunks from the
//! index, and drives the completion model through one of two composition
//! strategies. Which strategy runs is an explicit configuration choice,
//! since they differ materially in cost and latency:
//!
//! - [`Strategy::Stuff`] concatenates every retrieved chunk into a single
//!   prompt and makes one completion call. Cheap, but the combined prompt
//!   must fit the model's context budget.
//! - [`Strategy::Refine`] seeds an answer from the first chunk and then
//!   refines it once per remaining chunk. One call per chunk, more robust
//!   to an irrelevant chunk in the middle of the set.
//!
//! The pipeline holds no state between calls; concurrent `answer` calls
//! against an open index are independent.

use serde::Deserialize;

use crate::completion::CompletionModel;
use crate::embedding::{embed_query, Embedder};
use crate::error::{PipelineError, Result};
use crate::index::Index;
use crate::models::{QueryResult, RetrievedChunk};

/// How retrieved chunks are composed into completion calls.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Strategy {
    /// All chunks in one prompt, one completion call.
    Stuff,
    /// Iterative refinement, one completion call per chunk.
    #[default]
    Refine,
}

/// Answer a query against an already-built index.
///
/// The embedder must be the same model that built the index; the model id
/// recorded in the index metadata is checked and a mismatch is a
/// configuration error, not a silent quality degradation.
pub async fn answer(
    index: &Index,
    embedder: &dyn Embedder,
    completion: &dyn CompletionModel,
    query: &str,
    strategy: Strategy,
    k: usize,
) -> Result<QueryResult> {
    let meta = index.read_meta().await?;
    if meta.embedding_model != embedder.model_name() {
        return Err(PipelineError::config(format!(
            "index was built with embedding model '{}' but '{}' is configured",
            meta.embedding_model,
            embedder.model_name()
        )));
    }
    if meta.dims != embedder.dims() {
        return Err(PipelineError::config(format!(
            "index vectors have {} dims but the embedder produces {}",
            meta.dims,
            embedder.dims()
        )));
    }

    let query_vec = embed_query(embedder, query).await?;
    let retrieved = index.nearest(&query_vec, k).await?;

    if retrieved.is_empty() {
        return Err(PipelineError::config(
            "index contains no chunks; rebuild it from a non-empty corpus",
        ));
    }

    let answer = match strategy {
        Strategy::Stuff => stuff_answer(completion, query, &retrieved).await?,
        Strategy::Refine => refine_answer(completion, query, &retrieved).await?,
    };

    Ok(QueryResult {
        answer,
        source_chunks: retrieved,
    })
}

async fn stuff_answer(
    completion: &dyn CompletionModel,
    query: &str,
    retrieved: &[RetrievedChunk],
) -> Result<String> {
    let context = build_context(retrieved);
    let prompt = build_stuff_prompt(query, &context);
    check_budget(&prompt, completion.context_budget_chars())?;
    completion.complete(&prompt).await
}

async fn refine_answer(
    completion: &dyn CompletionModel,
    query: &str,
    retrieved: &[RetrievedChunk],
) -> Result<String> {
    let seed_prompt = build_seed_prompt(query, &retrieved[0].chunk.text);
    check_budget(&seed_prompt, completion.context_budget_chars())?;
    let mut current = completion.complete(&seed_prompt).await?;

    for item in &retrieved[1..] {
        let prompt = build_refine_prompt(query, &current, &item.chunk.text);
        check_budget(&prompt, completion.context_budget_chars())?;
        current = completion.complete(&prompt).await?;
    }

    Ok(current)
}

fn check_budget(prompt: &str, budget_chars: usize) -> Result<()> {
    let prompt_chars = prompt.chars().count();
    if prompt_chars > budget_chars {
        return Err(PipelineError::ContextOverflow {
            prompt_chars,
            budget_chars,
        });
    }
    Ok(())
}

/// Number the retrieved chunks and tag each with its source file, so the
/// model can ground its answer.
fn build_context(retrieved: &[RetrievedChunk]) -> String {
    let mut context = String::new();
    for (i, item) in retrieved.iter().enumerate() {
        context.push_str(&format!(
            "[{}] {} (chunk {})\n{}\n\n",
            i + 1,
            item.chunk.source_path.display(),
            item.chunk.ordinal,
            item.chunk.text
        ));
    }
    context
}

fn build_stuff_prompt(question: &str, context: &str) -> String {
    format!(
        r#"Based on the following context, answer the question. Only use information from the context. If the answer is not in the context, say so.

Context:
{context}

Question: {question}

Answer:"#
    )
}

fn build_seed_prompt(question: &str, context: &str) -> String {
    format!(
        r#"Context information is below.

{context}

Given the context information and no prior knowledge, answer the question.

Question: {question}

Answer:"#
    )
}

fn build_refine_prompt(question: &str, existing_answer: &str, context: &str) -> String {
    format!(
        r#"The original question is: {question}

We have an existing answer:
{existing_answer}

There is an opportunity to refine the existing answer with more context below.

{context}

Given the new context, refine the original answer. If the context is not useful, return the existing answer unchanged.

Answer:"#
    )
}
