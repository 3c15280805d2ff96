//! Completion provider abstraction and the OpenAI-backed implementation.
//!
//! [`CompletionModel`] is the seam between the QA pipeline and the remote
//! completion API. The OpenAI implementation drives the chat completions
//! endpoint with the same retry model as the embedding provider: transient
//! failures back off exponentially, rate-limit and auth failures surface
//! immediately.

use async_trait::async_trait;
use std::time::Duration;

use crate::config::CompletionConfig;
use crate::embedding::classify_status;
use crate::error::{ApiErrorKind, PipelineError, Result};

/// Synthesizes text from a prompt.
#[async_trait]
pub trait CompletionModel: Send + Sync {
    /// One prompt in, one completion out.
    async fn complete(&self, prompt: &str) -> Result<String>;

    /// Model identifier for reporting.
    fn model_name(&self) -> &str;

    /// Prompt budget in characters. Prompts beyond this must be rejected
    /// by the caller with a context-overflow error, not truncated.
    fn context_budget_chars(&self) -> usize;
}

/// Completion provider backed by the OpenAI chat completions API.
pub struct OpenAiCompletion {
    client: reqwest::Client,
    api_key: String,
    model: String,
    context_budget_chars: usize,
    max_retries: u32,
}

impl OpenAiCompletion {
    pub fn new(config: &CompletionConfig) -> Result<Self> {
        let api_key = std::env::var("OPENAI_API_KEY")
            .map_err(|_| PipelineError::config("OPENAI_API_KEY environment variable not set"))?;

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| PipelineError::config(format!("failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            api_key,
            model: config.model.clone(),
            context_budget_chars: config.context_budget_chars,
            max_retries: config.max_retries,
        })
    }
}

#[async_trait]
impl CompletionModel for OpenAiCompletion {
    async fn complete(&self, prompt: &str) -> Result<String> {
        let body = serde_json::json!({
            "model": self.model,
            "messages": [
                { "role": "user", "content": prompt }
            ],
        });

        let mut last_err = None;

        for attempt in 0..=self.max_retries {
            if attempt > 0 {
                let delay = Duration::from_secs(1 << (attempt - 1).min(5));
                tokio::time::sleep(delay).await;
            }

            let resp = self
                .client
                .post("https://api.openai.com/v1/chat/completions")
                .header("Authorization", format!("Bearer {}", self.api_key))
                .header("Content-Type", "application/json")
                .json(&body)
                .send()
                .await;

            match resp {
                Ok(response) => {
                    let status = response.status();

                    if status.is_success() {
                        let json: serde_json::Value = response.json().await.map_err(|e| {
                            PipelineError::completion(ApiErrorKind::Transient, e.to_string())
                        })?;
                        return parse_completion_response(&json);
                    }

                    let kind = classify_status(status);
                    let body_text = response.text().await.unwrap_or_default();
                    let err = PipelineError::completion(
                        kind,
                        format!("completions API returned {}: {}", status, body_text),
                    );

                    if !kind.is_retryable() {
                        return Err(err);
                    }
                    last_err = Some(err);
                }
                Err(e) => {
                    last_err = Some(PipelineError::completion(
                        ApiErrorKind::Transient,
                        e.to_string(),
                    ));
                }
            }
        }

        Err(last_err.unwrap_or_else(|| {
            PipelineError::completion(ApiErrorKind::Transient, "completion failed after retries")
        }))
    }

    fn model_name(&self) -> &str {
        &self.model
    }

    fn context_budget_chars(&self) -> usize {
        self.context_budget_chars
    }
}

/// Extract `choices[0].message.content` from a chat completion response.
fn parse_completion_response(json: &serde_json::Value) -> Result<String> {
    json.get("choices")
        .and_then(|c| c.as_array())
        .and_then(|c| c.first())
        .and_then(|c| c.get("message"))
        .and_then(|m| m.get("content"))
        .and_then(|t| t.as_str())
        .map(|s| s.trim().to_string())
        .ok_or_else(|| {
            PipelineError::completion(
                ApiErrorKind::Transient,
                "invalid completions response: missing choices[0].message.content",
            )
        })
}
