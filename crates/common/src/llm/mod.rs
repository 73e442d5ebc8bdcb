//! Chat completion client abstraction
//!
//! Provides a unified interface over the supported generation
//! backends:
//! - OpenAI (gpt-5 series)
//! - Anthropic (claude sonnet/haiku)
//!
//! Supported executors form a closed enum rather than a runtime
//! string lookup, so an unknown model name is a deserialization
//! error instead of a mid-batch panic.

use crate::errors::{AppError, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// One role-tagged entry of a conversation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

impl ChatMessage {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".to_string(),
            content: content.into(),
        }
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: "system".to_string(),
            content: content.into(),
        }
    }
}

/// Generation parameters passed with every call
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct GenerationParams {
    /// Sampling temperature; some backends ignore it
    pub temperature: f32,

    /// Maximum output tokens. Reasoning backends may spend part of
    /// this budget on tokens the caller never sees.
    pub max_tokens: u32,
}

impl Default for GenerationParams {
    fn default() -> Self {
        Self {
            temperature: 0.7,
            max_tokens: 2000,
        }
    }
}

/// Supported chat models
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChatModel {
    Gpt5,
    Gpt5Mini,
    ClaudeSonnet,
    ClaudeHaiku,
}

/// Backend provider for a model
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Provider {
    OpenAi,
    Anthropic,
}

impl ChatModel {
    /// Wire-level model identifier
    pub fn api_name(&self) -> &'static str {
        match self {
            ChatModel::Gpt5 => "gpt-5",
            ChatModel::Gpt5Mini => "gpt-5-mini",
            ChatModel::ClaudeSonnet => "claude-sonnet-4-5-20250929",
            ChatModel::ClaudeHaiku => "claude-haiku-4-5-20251101",
        }
    }

    pub fn provider(&self) -> Provider {
        match self {
            ChatModel::Gpt5 | ChatModel::Gpt5Mini => Provider::OpenAi,
            ChatModel::ClaudeSonnet | ChatModel::ClaudeHaiku => Provider::Anthropic,
        }
    }

    /// The gpt-5 series only accepts temperature 1.0; the parameter
    /// is omitted from requests to those models.
    pub fn ignores_temperature(&self) -> bool {
        matches!(self, ChatModel::Gpt5 | ChatModel::Gpt5Mini)
    }
}

/// Trait for chat completion backends
#[async_trait]
pub trait ChatClient: Send + Sync {
    /// Run one completion and return the text content
    async fn complete(&self, messages: &[ChatMessage], params: &GenerationParams)
        -> Result<String>;

    /// Identifier recorded on task results
    fn model_id(&self) -> &str;
}

/// OpenAI chat completions client
pub struct OpenAiChatClient {
    client: reqwest::Client,
    api_key: String,
    model: ChatModel,
    base_url: String,
}

#[derive(Serialize)]
struct OpenAiChatRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_completion_tokens: Option<u32>,
}

#[derive(Deserialize)]
struct OpenAiChatResponse {
    choices: Vec<OpenAiChoice>,
}

#[derive(Deserialize)]
struct OpenAiChoice {
    message: OpenAiChoiceMessage,
}

#[derive(Deserialize)]
struct OpenAiChoiceMessage {
    content: Option<String>,
}

impl OpenAiChatClient {
    pub fn new(
        api_key: String,
        model: ChatModel,
        base_url: Option<String>,
        timeout: Duration,
    ) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| AppError::Internal {
                message: format!("Failed to create HTTP client: {}", e),
            })?;

        Ok(Self {
            client,
            api_key,
            model,
            base_url: base_url.unwrap_or_else(|| "https://api.openai.com/v1".to_string()),
        })
    }
}

#[async_trait]
impl ChatClient for OpenAiChatClient {
    async fn complete(
        &self,
        messages: &[ChatMessage],
        params: &GenerationParams,
    ) -> Result<String> {
        let url = format!("{}/chat/completions", self.base_url);

        // gpt-5 series: temperature is fixed by the backend and the
        // output budget travels as max_completion_tokens
        let request = if self.model.ignores_temperature() {
            OpenAiChatRequest {
                model: self.model.api_name(),
                messages,
                temperature: None,
                max_tokens: None,
                max_completion_tokens: Some(params.max_tokens),
            }
        } else {
            OpenAiChatRequest {
                model: self.model.api_name(),
                messages,
                temperature: Some(params.temperature),
                max_tokens: Some(params.max_tokens),
                max_completion_tokens: None,
            }
        };

        let response = self
            .client
            .post(&url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .json(&request)
            .send()
            .await
            .map_err(|e| AppError::Generation {
                model: self.model.api_name().to_string(),
                message: format!("Request failed: {}", e),
            })?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(AppError::Generation {
                model: self.model.api_name().to_string(),
                message: format!("API error {}: {}", status, body),
            });
        }

        let result: OpenAiChatResponse =
            response.json().await.map_err(|e| AppError::Generation {
                model: self.model.api_name().to_string(),
                message: format!("Failed to parse response: {}", e),
            })?;

        result
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or_else(|| AppError::EmptyCompletion {
                model: self.model.api_name().to_string(),
            })
    }

    fn model_id(&self) -> &str {
        self.model.api_name()
    }
}

/// Anthropic messages client
pub struct AnthropicChatClient {
    client: reqwest::Client,
    api_key: String,
    model: ChatModel,
    base_url: String,
}

#[derive(Serialize)]
struct AnthropicRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    temperature: f32,
    max_tokens: u32,
}

#[derive(Deserialize)]
struct AnthropicResponse {
    content: Vec<AnthropicContent>,
}

#[derive(Deserialize)]
struct AnthropicContent {
    #[serde(default)]
    text: String,
}

impl AnthropicChatClient {
    pub fn new(
        api_key: String,
        model: ChatModel,
        base_url: Option<String>,
        timeout: Duration,
    ) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| AppError::Internal {
                message: format!("Failed to create HTTP client: {}", e),
            })?;

        Ok(Self {
            client,
            api_key,
            model,
            base_url: base_url.unwrap_or_else(|| "https://api.anthropic.com".to_string()),
        })
    }
}

#[async_trait]
impl ChatClient for AnthropicChatClient {
    async fn complete(
        &self,
        messages: &[ChatMessage],
        params: &GenerationParams,
    ) -> Result<String> {
        let url = format!("{}/v1/messages", self.base_url);

        let request = AnthropicRequest {
            model: self.model.api_name(),
            messages,
            temperature: params.temperature,
            max_tokens: params.max_tokens,
        };

        let response = self
            .client
            .post(&url)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", "2023-06-01")
            .json(&request)
            .send()
            .await
            .map_err(|e| AppError::Generation {
                model: self.model.api_name().to_string(),
                message: format!("Request failed: {}", e),
            })?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(AppError::Generation {
                model: self.model.api_name().to_string(),
                message: format!("API error {}: {}", status, body),
            });
        }

        let result: AnthropicResponse =
            response.json().await.map_err(|e| AppError::Generation {
                model: self.model.api_name().to_string(),
                message: format!("Failed to parse response: {}", e),
            })?;

        result
            .content
            .into_iter()
            .next()
            .map(|c| c.text)
            .ok_or_else(|| AppError::EmptyCompletion {
                model: self.model.api_name().to_string(),
            })
    }

    fn model_id(&self) -> &str {
        self.model.api_name()
    }
}

/// Mock chat client for testing
///
/// Replays scripted outcomes in order; once exhausted it repeats the
/// last one. `Err(message)` entries surface as generation errors.
pub struct MockChatClient {
    model_id: String,
    script: Mutex<Vec<std::result::Result<String, String>>>,
    cursor: Mutex<usize>,
}

impl MockChatClient {
    pub fn new(
        model_id: impl Into<String>,
        script: Vec<std::result::Result<String, String>>,
    ) -> Self {
        Self {
            model_id: model_id.into(),
            script: Mutex::new(script),
            cursor: Mutex::new(0),
        }
    }

    /// Mock that always returns the same text
    pub fn fixed(model_id: impl Into<String>, text: impl Into<String>) -> Self {
        Self::new(model_id, vec![Ok(text.into())])
    }

    /// Mock that always fails
    pub fn failing(model_id: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(model_id, vec![Err(message.into())])
    }

    /// Number of completions served so far
    pub fn calls(&self) -> usize {
        *self.cursor.lock().unwrap()
    }
}

#[async_trait]
impl ChatClient for MockChatClient {
    async fn complete(
        &self,
        _messages: &[ChatMessage],
        _params: &GenerationParams,
    ) -> Result<String> {
        let script = self.script.lock().unwrap();
        let mut cursor = self.cursor.lock().unwrap();
        let idx = (*cursor).min(script.len().saturating_sub(1));
        *cursor += 1;

        match script.get(idx) {
            Some(Ok(text)) => Ok(text.clone()),
            Some(Err(message)) => Err(AppError::Generation {
                model: self.model_id.clone(),
                message: message.clone(),
            }),
            None => Err(AppError::EmptyCompletion {
                model: self.model_id.clone(),
            }),
        }
    }

    fn model_id(&self) -> &str {
        &self.model_id
    }
}

/// Build a chat client for a configured model
pub fn build_chat_client(
    model: ChatModel,
    config: &crate::config::LlmConfig,
) -> Result<Arc<dyn ChatClient>> {
    let timeout = Duration::from_secs(config.call_timeout_secs);

    match model.provider() {
        Provider::OpenAi => {
            let key = config
                .openai_api_key
                .clone()
                .ok_or_else(|| AppError::MissingSetting {
                    name: "llm.openai_api_key".to_string(),
                })?;
            Ok(Arc::new(OpenAiChatClient::new(
                key,
                model,
                config.openai_api_base.clone(),
                timeout,
            )?))
        }
        Provider::Anthropic => {
            let key = config
                .anthropic_api_key
                .clone()
                .ok_or_else(|| AppError::MissingSetting {
                    name: "llm.anthropic_api_key".to_string(),
                })?;
            Ok(Arc::new(AnthropicChatClient::new(
                key,
                model,
                config.anthropic_api_base.clone(),
                timeout,
            )?))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_model_wire_names() {
        assert_eq!(ChatModel::Gpt5.api_name(), "gpt-5");
        assert_eq!(ChatModel::ClaudeHaiku.provider(), Provider::Anthropic);
        assert!(ChatModel::Gpt5Mini.ignores_temperature());
        assert!(!ChatModel::ClaudeSonnet.ignores_temperature());
    }

    #[test]
    fn test_model_deserializes_from_snake_case() {
        let model: ChatModel = serde_json::from_str("\"claude_sonnet\"").unwrap();
        assert_eq!(model, ChatModel::ClaudeSonnet);

        let bad: std::result::Result<ChatModel, _> = serde_json::from_str("\"gpt_99\"");
        assert!(bad.is_err());
    }

    #[tokio::test]
    async fn test_mock_script_replays_in_order() {
        let mock = MockChatClient::new(
            "mock",
            vec![Ok("first".into()), Err("boom".into()), Ok("third".into())],
        );
        let params = GenerationParams::default();
        let msgs = [ChatMessage::user("hi")];

        assert_eq!(mock.complete(&msgs, &params).await.unwrap(), "first");
        assert!(mock.complete(&msgs, &params).await.is_err());
        assert_eq!(mock.complete(&msgs, &params).await.unwrap(), "third");
        // Exhausted scripts repeat the last entry
        assert_eq!(mock.complete(&msgs, &params).await.unwrap(), "third");
        assert_eq!(mock.calls(), 4);
    }

    #[test]
    fn test_build_client_requires_key() {
        let config = crate::config::LlmConfig::default();
        let err = build_chat_client(ChatModel::Gpt5, &config).err().unwrap();
        assert!(matches!(err, AppError::MissingSetting { .. }));
    }
}
