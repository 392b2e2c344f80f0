//! LLM client — the completion capability behind extraction and synthesis
//!
//! Defines the client trait and response types. Two implementations:
//! - `HttpLlmClient`: OpenAI-compatible chat-completions endpoint (production)
//! - `MockLlm`: returns preconfigured responses (testing)
//!
//! The trait is deliberately one method; extraction prompting, paraphrase
//! generation, and synthesis all go through `complete`.

use crate::retry::{Classify, ErrorKind};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::Duration;

/// Token accounting for one completion (estimates when the provider does
/// not report usage).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenUsage {
    pub prompt_tokens: u64,
    pub completion_tokens: u64,
}

impl TokenUsage {
    pub fn add(&mut self, other: TokenUsage) {
        self.prompt_tokens += other.prompt_tokens;
        self.completion_tokens += other.completion_tokens;
    }
}

/// One completion result.
#[derive(Debug, Clone, PartialEq)]
pub struct Completion {
    pub text: String,
    pub usage: TokenUsage,
}

/// Errors from LLM client operations.
#[derive(Debug, thiserror::Error)]
pub enum LlmError {
    #[error("provider unavailable: {0}")]
    Unavailable(String),

    #[error("request timed out")]
    Timeout,

    #[error("rate limited by provider")]
    RateLimited,

    #[error("completion failed: {0}")]
    Failed(String),

    #[error("response parse error: {0}")]
    Parse(String),
}

impl Classify for LlmError {
    fn kind(&self) -> ErrorKind {
        match self {
            LlmError::Unavailable(_) | LlmError::Timeout | LlmError::RateLimited => {
                ErrorKind::Transient
            }
            LlmError::Failed(_) => ErrorKind::Transient,
            LlmError::Parse(_) => ErrorKind::SchemaViolation,
        }
    }
}

/// Client trait for text completion.
///
/// Abstracts over transport (HTTP, mock) so pipeline code doesn't depend
/// on how the model is reached.
#[async_trait]
pub trait LlmClient: Send + Sync {
    /// Complete `prompt`, producing at most `max_output_tokens` tokens.
    async fn complete(&self, prompt: &str, max_output_tokens: u32)
        -> Result<Completion, LlmError>;
}

#[async_trait]
impl<T: LlmClient + ?Sized> LlmClient for std::sync::Arc<T> {
    async fn complete(
        &self,
        prompt: &str,
        max_output_tokens: u32,
    ) -> Result<Completion, LlmError> {
        (**self).complete(prompt, max_output_tokens).await
    }
}

/// LLM endpoint configuration. Credentials are passed here explicitly;
/// the library never reads the environment itself.
#[derive(Debug, Clone)]
pub struct LlmConfig {
    pub endpoint: String,
    pub api_key: Option<String>,
    pub model: String,
    pub request_timeout: Duration,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            endpoint: "https://api.openai.com/v1/chat/completions".to_string(),
            api_key: None,
            // Default synthesis/extraction model; deployments override this
            // per pack.
            model: "gpt-4o-mini".to_string(),
            request_timeout: Duration::from_secs(120),
        }
    }
}

/// Production client for OpenAI-compatible chat-completions endpoints.
pub struct HttpLlmClient {
    http: reqwest::Client,
    config: LlmConfig,
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    max_tokens: u32,
    temperature: f32,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
    #[serde(default)]
    usage: Option<ChatUsage>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ChatResponseMessage {
    content: String,
}

#[derive(Debug, Deserialize)]
struct ChatUsage {
    #[serde(default)]
    prompt_tokens: u64,
    #[serde(default)]
    completion_tokens: u64,
}

impl HttpLlmClient {
    pub fn new(config: LlmConfig) -> Result<Self, LlmError> {
        let http = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| LlmError::Unavailable(e.to_string()))?;
        Ok(Self { http, config })
    }
}

#[async_trait]
impl LlmClient for HttpLlmClient {
    async fn complete(
        &self,
        prompt: &str,
        max_output_tokens: u32,
    ) -> Result<Completion, LlmError> {
        let request = ChatRequest {
            model: &self.config.model,
            messages: vec![ChatMessage {
                role: "user",
                content: prompt,
            }],
            max_tokens: max_output_tokens,
            temperature: 0.0,
        };

        let mut builder = self.http.post(&self.config.endpoint).json(&request);
        if let Some(key) = &self.config.api_key {
            builder = builder.bearer_auth(key);
        }

        let response = builder.send().await.map_err(|e| {
            if e.is_timeout() {
                LlmError::Timeout
            } else {
                LlmError::Unavailable(e.to_string())
            }
        })?;

        let status = response.status();
        if status.as_u16() == 429 {
            return Err(LlmError::RateLimited);
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(LlmError::Failed(format!("{}: {}", status, body)));
        }

        let body: ChatResponse = response
            .json()
            .await
            .map_err(|e| LlmError::Parse(e.to_string()))?;

        let text = body
            .choices
            .into_iter()
            .next()
            .map(|c| c.message.content)
            .ok_or_else(|| LlmError::Parse("response has no choices".to_string()))?;

        let usage = body
            .usage
            .map(|u| TokenUsage {
                prompt_tokens: u.prompt_tokens,
                completion_tokens: u.completion_tokens,
            })
            .unwrap_or_else(|| estimate_usage(prompt, &text));

        Ok(Completion { text, usage })
    }
}

fn estimate_usage(prompt: &str, completion: &str) -> TokenUsage {
    TokenUsage {
        prompt_tokens: crate::embed::approx_tokens(prompt) as u64,
        completion_tokens: crate::embed::approx_tokens(completion) as u64,
    }
}

/// Mock client for testing — serves scripted responses.
///
/// Responses can be keyed by a prompt substring (first match wins) or
/// queued in order; when both are empty the default response is served.
pub struct MockLlm {
    keyed: Vec<(String, String)>,
    queue: Mutex<VecDeque<Result<String, String>>>,
    default_response: String,
    calls: Mutex<Vec<String>>,
}

impl Default for MockLlm {
    fn default() -> Self {
        Self::new()
    }
}

impl MockLlm {
    pub fn new() -> Self {
        Self {
            keyed: Vec::new(),
            queue: Mutex::new(VecDeque::new()),
            default_response: String::new(),
            calls: Mutex::new(Vec::new()),
        }
    }

    /// Serve `response` for any prompt containing `needle`.
    pub fn with_response(mut self, needle: impl Into<String>, response: impl Into<String>) -> Self {
        self.keyed.push((needle.into(), response.into()));
        self
    }

    /// Push a response served in FIFO order regardless of prompt.
    pub fn push(self, response: impl Into<String>) -> Self {
        self.queue.lock().unwrap().push_back(Ok(response.into()));
        self
    }

    /// Push a failure served in FIFO order.
    pub fn push_failure(self, message: impl Into<String>) -> Self {
        self.queue.lock().unwrap().push_back(Err(message.into()));
        self
    }

    /// Response served when nothing else matches.
    pub fn with_default(mut self, response: impl Into<String>) -> Self {
        self.default_response = response.into();
        self
    }

    /// Prompts observed so far, in call order.
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl LlmClient for MockLlm {
    async fn complete(
        &self,
        prompt: &str,
        _max_output_tokens: u32,
    ) -> Result<Completion, LlmError> {
        self.calls.lock().unwrap().push(prompt.to_string());

        if let Some(queued) = self.queue.lock().unwrap().pop_front() {
            return match queued {
                Ok(text) => Ok(Completion {
                    usage: estimate_usage(prompt, &text),
                    text,
                }),
                Err(message) => Err(LlmError::Failed(message)),
            };
        }

        for (needle, response) in &self.keyed {
            if prompt.contains(needle.as_str()) {
                return Ok(Completion {
                    usage: estimate_usage(prompt, response),
                    text: response.clone(),
                });
            }
        }

        Ok(Completion {
            usage: estimate_usage(prompt, &self.default_response),
            text: self.default_response.clone(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn mock_serves_keyed_response() {
        let llm = MockLlm::new()
            .with_response("capital of France", "Paris.")
            .with_default("I don't know.");

        let out = llm
            .complete("What is the capital of France?", 64)
            .await
            .unwrap();
        assert_eq!(out.text, "Paris.");

        let out = llm.complete("Something else", 64).await.unwrap();
        assert_eq!(out.text, "I don't know.");
    }

    #[tokio::test]
    async fn mock_queue_takes_precedence_and_drains() {
        let llm = MockLlm::new()
            .push("first")
            .push_failure("boom")
            .with_default("default");

        assert_eq!(llm.complete("p", 8).await.unwrap().text, "first");
        assert!(llm.complete("p", 8).await.is_err());
        assert_eq!(llm.complete("p", 8).await.unwrap().text, "default");
        assert_eq!(llm.calls().len(), 3);
    }

    #[test]
    fn chat_response_deserializes() {
        let json = r#"{
            "choices": [{"message": {"role": "assistant", "content": "hello"}}],
            "usage": {"prompt_tokens": 10, "completion_tokens": 2}
        }"#;
        let body: ChatResponse = serde_json::from_str(json).unwrap();
        assert_eq!(body.choices[0].message.content, "hello");
        assert_eq!(body.usage.unwrap().completion_tokens, 2);
    }

    #[test]
    fn transient_kinds_cover_rate_limit_and_timeout() {
        assert!(LlmError::RateLimited.kind().is_transient());
        assert!(LlmError::Timeout.kind().is_transient());
        assert!(!LlmError::Parse("x".into()).kind().is_transient());
    }
}
