//! Generative model trait and implementations.
//!
//! - `OpenAiChatModel` calls an OpenAI-compatible `/chat/completions`
//!   endpoint.
//! - `MockChatModel` answers deterministically and records every prompt it
//!   receives, for tests and offline runs.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::{debug, info};

use docent_core::config::GenerationConfig;
use docent_core::error::DocentError;

/// Speaker of a chat message.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    System,
    User,
    Assistant,
}

/// One turn of a chat completion request.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: ChatRole,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::User,
            content: content.into(),
        }
    }
}

/// Optional sampling parameters; `None` leaves the provider default.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct CompletionOptions {
    pub temperature: Option<f32>,
    pub max_tokens: Option<u32>,
}

/// A generative language model that completes a chat transcript.
pub trait ChatModel: Send + Sync {
    /// Produce the assistant reply to `messages`.
    fn complete(
        &self,
        messages: &[ChatMessage],
        options: &CompletionOptions,
    ) -> impl std::future::Future<Output = Result<String, DocentError>> + Send;

    /// Name of the model behind this service.
    fn model_name(&self) -> &str;
}

/// Object-safe version of [`ChatModel`], implemented for every `ChatModel`.
pub trait DynChatModel: Send + Sync {
    fn complete_boxed<'a>(
        &'a self,
        messages: &'a [ChatMessage],
        options: &'a CompletionOptions,
    ) -> std::pin::Pin<Box<dyn std::future::Future<Output = Result<String, DocentError>> + Send + 'a>>;

    fn model_name(&self) -> &str;
}

impl<T: ChatModel> DynChatModel for T {
    fn complete_boxed<'a>(
        &'a self,
        messages: &'a [ChatMessage],
        options: &'a CompletionOptions,
    ) -> std::pin::Pin<Box<dyn std::future::Future<Output = Result<String, DocentError>> + Send + 'a>> {
        Box::pin(self.complete(messages, options))
    }

    fn model_name(&self) -> &str {
        ChatModel::model_name(self)
    }
}

// ---------------------------------------------------------------------------
// OpenAiChatModel
// ---------------------------------------------------------------------------

/// Chat completion client for any OpenAI-compatible API.
pub struct OpenAiChatModel {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
    model: String,
}

impl std::fmt::Debug for OpenAiChatModel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenAiChatModel")
            .field("base_url", &self.base_url)
            .field("model", &self.model)
            .finish()
    }
}

impl OpenAiChatModel {
    pub fn new(
        base_url: &str,
        api_key: impl Into<String>,
        model: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, DocentError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| DocentError::Provider(format!("HTTP client: {}", e)))?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            model: model.into(),
        })
    }

    /// Build from configuration, reading the API key from the named env var.
    pub fn from_config(config: &GenerationConfig, timeout: Duration) -> Result<Self, DocentError> {
        let api_key = std::env::var(&config.api_key_env).map_err(|_| {
            DocentError::Config(format!(
                "generation API key variable {} is not set",
                config.api_key_env
            ))
        })?;

        let model = Self::new(&config.base_url, api_key, config.model.clone(), timeout)?;
        info!(model = %model.model, base_url = %model.base_url, "Chat provider ready");
        Ok(model)
    }

    fn request_body(&self, messages: &[ChatMessage], options: &CompletionOptions) -> Value {
        let mut body = json!({
            "model": self.model,
            "messages": messages,
        });
        if let Some(temperature) = options.temperature {
            body["temperature"] = json!(temperature);
        }
        if let Some(max_tokens) = options.max_tokens {
            body["max_tokens"] = json!(max_tokens);
        }
        body
    }

    fn parse_response(body: &Value) -> Result<String, DocentError> {
        body.get("choices")
            .and_then(|c| c.get(0))
            .and_then(|choice| choice.get("message"))
            .and_then(|m| m.get("content"))
            .and_then(|c| c.as_str())
            .map(|s| s.trim().to_string())
            .ok_or_else(|| DocentError::Provider("completion response contained no choices".to_string()))
    }
}

impl ChatModel for OpenAiChatModel {
    async fn complete(
        &self,
        messages: &[ChatMessage],
        options: &CompletionOptions,
    ) -> Result<String, DocentError> {
        let url = format!("{}/chat/completions", self.base_url);
        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&self.request_body(messages, options))
            .send()
            .await
            .map_err(|e| DocentError::Provider(format!("completion request failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            return Err(DocentError::Provider(format!(
                "completion API returned {}: {}",
                status, detail
            )));
        }

        let body: Value = response
            .json()
            .await
            .map_err(|e| DocentError::Provider(format!("invalid completion response: {}", e)))?;

        let answer = Self::parse_response(&body)?;
        debug!(model = %self.model, answer_len = answer.len(), "Completion received");
        Ok(answer)
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}

// ---------------------------------------------------------------------------
// MockChatModel
// ---------------------------------------------------------------------------

/// Deterministic chat model.
///
/// Clones share the same prompt log, so a test can keep a handle after
/// moving the model into a service.
#[derive(Debug, Clone, Default)]
pub struct MockChatModel {
    failure: Option<String>,
    prompts: Arc<Mutex<Vec<Vec<ChatMessage>>>>,
}

impl MockChatModel {
    pub fn new() -> Self {
        Self::default()
    }

    /// A model whose every completion fails with `message`.
    pub fn failing(message: impl Into<String>) -> Self {
        Self {
            failure: Some(message.into()),
            prompts: Arc::default(),
        }
    }

    /// Every transcript received so far, oldest first.
    pub fn prompts(&self) -> Vec<Vec<ChatMessage>> {
        self.prompts.lock().map(|p| p.clone()).unwrap_or_default()
    }
}

impl ChatModel for MockChatModel {
    async fn complete(
        &self,
        messages: &[ChatMessage],
        _options: &CompletionOptions,
    ) -> Result<String, DocentError> {
        if let Ok(mut prompts) = self.prompts.lock() {
            prompts.push(messages.to_vec());
        }
        if let Some(ref failure) = self.failure {
            return Err(DocentError::Provider(failure.clone()));
        }

        let sources = messages
            .iter()
            .filter(|m| m.role == ChatRole::User)
            .map(|m| m.content.matches("[Source ").count())
            .sum::<usize>();
        Ok(format!("Answer drawn from {} source(s).", sources))
    }

    fn model_name(&self) -> &str {
        "mock-chat"
    }
}
