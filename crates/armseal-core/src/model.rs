//! Model service boundary
//!
//! The language model is an opaque text-completion service: an ordered list
//! of messages plus a sampling temperature go in, completion text comes out.
//! [`OpenAiChatModel`] talks to an OpenAI-compatible chat-completions
//! endpoint over HTTP.

use crate::error::{ConfigError, UpstreamError};
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::time::Duration;

/// Default chat-completions endpoint
pub const DEFAULT_MODEL_URL: &str = "https://api.openai.com/v1/chat/completions";
/// Default model name
pub const DEFAULT_MODEL: &str = "gpt-4o-mini";
/// Default sampling temperature
pub const DEFAULT_TEMPERATURE: f32 = 0.6;
/// Default upstream timeout
pub const DEFAULT_MODEL_TIMEOUT: Duration = Duration::from_secs(60);

/// Role of a model-facing message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModelRole {
    System,
    User,
    Assistant,
}

/// One model-facing message
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelMessage {
    pub role: ModelRole,
    pub content: String,
}

impl ModelMessage {
    #[must_use]
    pub fn new(role: ModelRole, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
        }
    }
}

/// Everything the model service needs for one completion
#[derive(Debug, Clone, PartialEq)]
pub struct CompletionRequest {
    pub messages: Vec<ModelMessage>,
    pub temperature: f32,
}

/// Text-completion service
#[async_trait]
pub trait ModelService: Send + Sync {
    /// Produce completion text for `request`
    ///
    /// Implementations may return empty text; callers treat that as an
    /// upstream failure.
    async fn complete(&self, request: CompletionRequest) -> Result<String, UpstreamError>;
}

/// Connection settings for [`OpenAiChatModel`]
#[derive(Clone, PartialEq)]
pub struct ModelSettings {
    pub api_key: String,
    pub model: String,
    pub url: String,
    pub timeout: Duration,
}

impl ModelSettings {
    /// Settings with default model, endpoint and timeout
    #[must_use]
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            model: DEFAULT_MODEL.to_string(),
            url: DEFAULT_MODEL_URL.to_string(),
            timeout: DEFAULT_MODEL_TIMEOUT,
        }
    }

    #[must_use]
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    #[must_use]
    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url = url.into();
        self
    }

    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

impl fmt::Debug for ModelSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModelSettings")
            .field("api_key", &"<redacted>")
            .field("model", &self.model)
            .field("url", &self.url)
            .field("timeout", &self.timeout)
            .finish()
    }
}

/// OpenAI-compatible chat-completions client
#[derive(Clone)]
pub struct OpenAiChatModel {
    client: Client,
    settings: ModelSettings,
}

impl OpenAiChatModel {
    /// Build a client with the configured timeout
    ///
    /// # Errors
    /// Returns [`ConfigError::HttpClient`] if the TLS backend cannot be
    /// initialised
    pub fn new(settings: ModelSettings) -> Result<Self, ConfigError> {
        let client = Client::builder()
            .timeout(settings.timeout)
            .build()
            .map_err(|err| ConfigError::HttpClient(err.to_string()))?;
        Ok(Self { client, settings })
    }

    /// Model name sent upstream
    #[inline]
    #[must_use]
    pub fn model(&self) -> &str {
        &self.settings.model
    }
}

impl fmt::Debug for OpenAiChatModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OpenAiChatModel")
            .field("settings", &self.settings)
            .finish_non_exhaustive()
    }
}

#[derive(Serialize)]
struct ChatCompletionRequest<'a> {
    model: &'a str,
    messages: &'a [ModelMessage],
    temperature: f32,
}

#[derive(Deserialize)]
struct ChatCompletionResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: ResponseMessage,
}

#[derive(Deserialize)]
struct ResponseMessage {
    content: Option<String>,
}

#[derive(Deserialize)]
struct ErrorResponse {
    error: ErrorBody,
}

#[derive(Deserialize)]
struct ErrorBody {
    message: String,
}

#[async_trait]
impl ModelService for OpenAiChatModel {
    async fn complete(&self, request: CompletionRequest) -> Result<String, UpstreamError> {
        let body = ChatCompletionRequest {
            model: &self.settings.model,
            messages: &request.messages,
            temperature: request.temperature,
        };

        let response = self
            .client
            .post(&self.settings.url)
            .bearer_auth(&self.settings.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|err| UpstreamError::Transport {
                message: err.to_string(),
                is_retryable: err.is_connect() || err.is_timeout(),
            })?;

        let status = response.status();
        let body_text = response
            .text()
            .await
            .map_err(|err| UpstreamError::Transport {
                message: format!("failed to read response body: {err}"),
                is_retryable: err.is_timeout(),
            })?;

        if !status.is_success() {
            return Err(map_http_error(status, &body_text));
        }

        let raw: Value =
            serde_json::from_str(&body_text).map_err(|err| UpstreamError::Malformed(err.to_string()))?;
        extract_text_response(raw)
    }
}

fn extract_text_response(raw: Value) -> Result<String, UpstreamError> {
    let parsed: ChatCompletionResponse = serde_json::from_value(raw.clone())
        .map_err(|err| UpstreamError::Malformed(err.to_string()))?;
    parsed
        .choices
        .into_iter()
        .next()
        .and_then(|choice| choice.message.content)
        .filter(|text| !text.trim().is_empty())
        .ok_or(UpstreamError::EmptyCompletion { details: Some(raw) })
}

fn map_http_error(status: StatusCode, body: &str) -> UpstreamError {
    let details = serde_json::from_str::<Value>(body).ok();
    let message = serde_json::from_str::<ErrorResponse>(body)
        .map(|wrapper| wrapper.error.message)
        .unwrap_or_else(|_| {
            status
                .canonical_reason()
                .map_or_else(|| body.to_string(), str::to_string)
        });
    UpstreamError::Status {
        status: status.as_u16(),
        message,
        details,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_extract_first_choice() {
        let raw = json!({"choices": [{"message": {"role": "assistant", "content": "hello"}}]});
        assert_eq!(extract_text_response(raw).unwrap(), "hello");
    }

    #[test]
    fn test_empty_completion_keeps_details() {
        let raw = json!({"choices": [{"message": {"role": "assistant", "content": "  "}}]});
        let err = extract_text_response(raw.clone()).unwrap_err();
        assert!(matches!(err, UpstreamError::EmptyCompletion { .. }));
        assert_eq!(err.details(), Some(&raw));

        let none = extract_text_response(json!({"choices": []})).unwrap_err();
        assert!(matches!(none, UpstreamError::EmptyCompletion { .. }));
    }

    #[test]
    fn test_map_http_error_prefers_error_message() {
        let body = r#"{"error":{"message":"Rate limit reached","type":"requests"}}"#;
        let err = map_http_error(StatusCode::TOO_MANY_REQUESTS, body);
        match &err {
            UpstreamError::Status {
                status, message, ..
            } => {
                assert_eq!(*status, 429);
                assert_eq!(message, "Rate limit reached");
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert!(err.is_retryable());
        assert!(err.details().is_some());
    }

    #[test]
    fn test_map_http_error_without_json_body() {
        let err = map_http_error(StatusCode::BAD_REQUEST, "nope");
        assert!(matches!(
            err,
            UpstreamError::Status { status: 400, ref message, details: None } if message == "Bad Request"
        ));
        assert!(!err.is_retryable());
    }

    #[test]
    fn test_request_serialization() {
        let messages = vec![
            ModelMessage::new(ModelRole::System, "be kind"),
            ModelMessage::new(ModelRole::User, "hi"),
        ];
        let body = ChatCompletionRequest {
            model: "gpt-4o-mini",
            messages: &messages,
            temperature: 0.5,
        };
        let value = serde_json::to_value(&body).unwrap();
        assert_eq!(value["model"], "gpt-4o-mini");
        assert_eq!(value["messages"][0]["role"], "system");
        assert_eq!(value["messages"][1]["content"], "hi");
        assert_eq!(value["temperature"], 0.5);
    }

    #[test]
    fn test_settings_debug_redacts_key() {
        let settings = ModelSettings::new("sk-secret-value");
        let debug = format!("{settings:?}");
        assert!(!debug.contains("sk-secret-value"));
        assert!(debug.contains("gpt-4o-mini"));
    }
}
