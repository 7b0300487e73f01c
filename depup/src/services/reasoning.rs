//! Reasoning service backend
//!
//! The reasoning service is a black box: a prompt goes in, text comes out.
//! It is used twice in a run, once per dependency for insight synthesis and
//! once per (file, task) pair for code patching.

use async_trait::async_trait;
use depup_common::config::ReasoningConfig;
use governor::{Quota, RateLimiter};
use reqwest::{header, Client};
use serde::{Deserialize, Serialize};
use std::num::NonZeroU32;
use std::time::Duration;
use thiserror::Error;

/// Reasoning backend errors
#[derive(Debug, Error)]
pub enum ReasoningError {
    /// No API key or backend not reachable
    #[error("Backend unavailable: {0}")]
    Unavailable(String),

    /// Non-success response
    #[error("Request failed: {0}")]
    RequestFailed(String),

    /// HTTP 429 from the backend
    #[error("Rate limited, retry after {retry_after_secs:?}s")]
    RateLimited { retry_after_secs: Option<u64> },

    #[error("Network error: {0}")]
    Network(String),

    /// Response body or content unreadable
    #[error("Parse error: {0}")]
    Parse(String),
}

/// One completion request
#[derive(Debug, Clone, Default, Serialize)]
pub struct CompletionRequest {
    pub system_prompt: Option<String>,
    pub prompt: String,
    pub temperature: Option<f32>,
    /// Ask the backend for a JSON object answer
    pub json_output: bool,
}

impl CompletionRequest {
    pub fn user(prompt: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            ..Default::default()
        }
    }

    pub fn with_system(mut self, prompt: impl Into<String>) -> Self {
        self.system_prompt = Some(prompt.into());
        self
    }

    pub fn with_temperature(mut self, temperature: Option<f32>) -> Self {
        self.temperature = temperature.map(|t| t.clamp(0.0, 2.0));
        self
    }

    pub fn with_json_output(mut self) -> Self {
        self.json_output = true;
        self
    }
}

/// Completion text
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompletionResponse {
    pub content: String,
}

/// Natural-language inference collaborator
#[async_trait]
pub trait ReasoningBackend: Send + Sync {
    /// Backend identifier (model name)
    fn id(&self) -> &str;

    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse, ReasoningError>;
}

type DirectLimiter = RateLimiter<
    governor::state::direct::NotKeyed,
    governor::state::InMemoryState,
    governor::clock::DefaultClock,
>;

/// OpenAI-compatible chat-completions backend
pub struct OpenAiCompatibleBackend {
    client: Client,
    base_url: String,
    api_key: Option<String>,
    model: String,
    temperature: Option<f32>,
    rate_limiter: DirectLimiter,
}

impl OpenAiCompatibleBackend {
    /// Build from config; `api_key` is the already-resolved secret
    pub fn new(config: &ReasoningConfig, api_key: Option<String>) -> Result<Self, ReasoningError> {
        let client = Client::builder()
            .timeout(config.timeout())
            .connect_timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| ReasoningError::Unavailable(e.to_string()))?;

        let per_minute = NonZeroU32::new(config.requests_per_minute)
            .ok_or_else(|| ReasoningError::Unavailable("requests_per_minute must be > 0".to_string()))?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key,
            model: config.model.clone(),
            temperature: config.temperature,
            rate_limiter: RateLimiter::direct(Quota::per_minute(per_minute)),
        })
    }

    fn chat_completions_url(&self) -> String {
        format!("{}/chat/completions", self.base_url)
    }
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_format: Option<ResponseFormat>,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Debug, Serialize)]
struct ResponseFormat {
    #[serde(rename = "type")]
    format_type: &'static str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: MessageResponse,
}

#[derive(Debug, Deserialize)]
struct MessageResponse {
    content: Option<String>,
}

#[async_trait]
impl ReasoningBackend for OpenAiCompatibleBackend {
    fn id(&self) -> &str {
        &self.model
    }

    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse, ReasoningError> {
        let api_key = self
            .api_key
            .as_deref()
            .ok_or_else(|| ReasoningError::Unavailable("No reasoning API key configured".to_string()))?;

        self.rate_limiter.until_ready().await;

        let mut messages = Vec::with_capacity(2);
        if let Some(system) = &request.system_prompt {
            messages.push(ChatMessage {
                role: "system",
                content: system,
            });
        }
        messages.push(ChatMessage {
            role: "user",
            content: &request.prompt,
        });

        let body = ChatRequest {
            model: &self.model,
            messages,
            temperature: request.temperature.or(self.temperature),
            response_format: request.json_output.then_some(ResponseFormat {
                format_type: "json_object",
            }),
        };

        tracing::debug!(model = %self.model, prompt_chars = request.prompt.len(), "Sending completion request");

        let response = self
            .client
            .post(self.chat_completions_url())
            .header(header::AUTHORIZATION, format!("Bearer {}", api_key))
            .json(&body)
            .send()
            .await
            .map_err(|e| ReasoningError::Network(e.to_string()))?;

        let status = response.status();
        if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            let retry_after_secs = response
                .headers()
                .get(header::RETRY_AFTER)
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.parse().ok());
            return Err(ReasoningError::RateLimited { retry_after_secs });
        }
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(ReasoningError::RequestFailed(format!("HTTP {}: {}", status.as_u16(), text)));
        }

        let chat: ChatResponse = response
            .json()
            .await
            .map_err(|e| ReasoningError::Parse(e.to_string()))?;

        let content = chat
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or_else(|| ReasoningError::Parse("Response has no message content".to_string()))?;

        Ok(CompletionResponse { content })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{header as header_matcher, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn config(base_url: &str) -> ReasoningConfig {
        ReasoningConfig {
            base_url: base_url.to_string(),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_complete_returns_first_choice() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .and(header_matcher("authorization", "Bearer test-key"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "choices": [{"message": {"role": "assistant", "content": "hello"}}]
            })))
            .mount(&server)
            .await;

        let backend = OpenAiCompatibleBackend::new(&config(&server.uri()), Some("test-key".into())).unwrap();
        let response = backend.complete(CompletionRequest::user("hi")).await.unwrap();

        assert_eq!(response.content, "hello");
        assert_eq!(backend.id(), "llama3-8b-8192");
    }

    #[tokio::test]
    async fn test_rate_limited_status() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(429).insert_header("retry-after", "7"))
            .mount(&server)
            .await;

        let backend = OpenAiCompatibleBackend::new(&config(&server.uri()), Some("k".into())).unwrap();
        let err = backend.complete(CompletionRequest::user("hi")).await.unwrap_err();

        assert!(matches!(err, ReasoningError::RateLimited { retry_after_secs: Some(7) }));
    }

    #[tokio::test]
    async fn test_missing_key_is_unavailable() {
        let backend = OpenAiCompatibleBackend::new(&config("http://127.0.0.1:9"), None).unwrap();
        let err = backend.complete(CompletionRequest::user("hi")).await.unwrap_err();
        assert!(matches!(err, ReasoningError::Unavailable(_)));
    }

    #[tokio::test]
    async fn test_server_error_is_request_failed() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(500).set_body_string("boom"))
            .mount(&server)
            .await;

        let backend = OpenAiCompatibleBackend::new(&config(&server.uri()), Some("k".into())).unwrap();
        let err = backend.complete(CompletionRequest::user("hi")).await.unwrap_err();
        assert!(err.to_string().contains("HTTP 500"));
    }

    #[test]
    fn test_temperature_clamped() {
        let request = CompletionRequest::user("x").with_temperature(Some(5.0));
        assert_eq!(request.temperature, Some(2.0));
    }
}
