//! `OpenAI` client.

use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};

use super::{ChatProvider, LlmHttpConfig, build_http_client, map_transport_error, status_to_error};
use crate::{Error, Result};
use async_trait::async_trait;

/// `OpenAI` chat client.
pub struct OpenAiClient {
    /// API key.
    api_key: SecretString,
    /// API endpoint.
    endpoint: String,
    /// Model to use.
    model: String,
    /// HTTP client.
    client: reqwest::Client,
}

impl OpenAiClient {
    /// Default API endpoint.
    pub const DEFAULT_ENDPOINT: &'static str = "https://api.openai.com/v1";

    /// Default model.
    pub const DEFAULT_MODEL: &'static str = "gpt-4-1106-preview";

    /// Environment variable holding the API key.
    pub const KEY_VARIABLE: &'static str = "OPENAI_API_KEY";

    const MAX_TOKENS: u32 = 2_000;
    const TEMPERATURE: f32 = 0.7;

    /// Creates a new `OpenAI` client with the given API key.
    #[must_use]
    pub fn new(api_key: SecretString) -> Self {
        Self {
            api_key,
            endpoint: Self::DEFAULT_ENDPOINT.to_string(),
            model: Self::DEFAULT_MODEL.to_string(),
            client: build_http_client(LlmHttpConfig::from_env()),
        }
    }

    /// Creates a client from `OPENAI_API_KEY`.
    ///
    /// # Errors
    ///
    /// Returns `Error::ConfigurationMissing` if the variable is unset or
    /// blank, before any request is made.
    pub fn from_env() -> Result<Self> {
        let key = std::env::var(Self::KEY_VARIABLE)
            .ok()
            .filter(|v| !v.trim().is_empty())
            .ok_or_else(|| Error::ConfigurationMissing {
                variable: Self::KEY_VARIABLE.to_string(),
            })?;
        Ok(Self::new(SecretString::from(key)))
    }

    /// Sets the API key.
    #[must_use]
    pub fn with_api_key(mut self, key: impl Into<String>) -> Self {
        self.api_key = SecretString::from(key.into());
        self
    }

    /// Sets the API endpoint.
    #[must_use]
    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }

    /// Sets the model.
    #[must_use]
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    /// Sets HTTP client timeouts for LLM requests.
    #[must_use]
    pub fn with_http_config(mut self, config: LlmHttpConfig) -> Self {
        self.client = build_http_client(config);
        self
    }

    /// Rejects requests when no usable key is configured.
    fn validate(&self) -> Result<()> {
        if self.api_key.expose_secret().trim().is_empty() {
            return Err(Error::ConfigurationMissing {
                variable: Self::KEY_VARIABLE.to_string(),
            });
        }
        Ok(())
    }

    /// Checks if the model is a reasoning-family model.
    ///
    /// Those models use `max_completion_tokens` instead of `max_tokens`
    /// and only support temperature=1 (default).
    fn is_reasoning_model(&self) -> bool {
        self.model.starts_with("gpt-5")
            || self.model.starts_with("o1")
            || self.model.starts_with("o3")
    }

    /// Makes one request to the Chat Completions API.
    async fn request(&self, messages: Vec<ChatMessage>) -> Result<String> {
        self.validate()?;

        tracing::info!(provider = "openai", model = %self.model, "Making LLM request");

        let request = if self.is_reasoning_model() {
            ChatCompletionRequest {
                model: self.model.clone(),
                messages,
                max_tokens: None,
                max_completion_tokens: Some(Self::MAX_TOKENS),
                temperature: None,
            }
        } else {
            ChatCompletionRequest {
                model: self.model.clone(),
                messages,
                max_tokens: Some(Self::MAX_TOKENS),
                max_completion_tokens: None,
                temperature: Some(Self::TEMPERATURE),
            }
        };

        let response = self
            .client
            .post(format!("{}/chat/completions", self.endpoint))
            .header(
                "Authorization",
                format!("Bearer {}", self.api_key.expose_secret()),
            )
            .header("Content-Type", "application/json")
            .json(&request)
            .send()
            .await
            .map_err(|e| map_transport_error("openai", &self.model, &e))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            tracing::error!(
                provider = "openai",
                model = %self.model,
                status = %status,
                body = %body,
                "LLM API returned error status"
            );
            return Err(status_to_error(status.as_u16(), body));
        }

        let response: ChatCompletionResponse = response.json().await.map_err(|e| {
            tracing::error!(
                provider = "openai",
                model = %self.model,
                error = %e,
                "Failed to parse LLM response"
            );
            Error::DecodingFailed(e.to_string())
        })?;

        first_choice_content(response)
    }
}

#[async_trait]
impl ChatProvider for OpenAiClient {
    fn name(&self) -> &'static str {
        "openai"
    }

    async fn complete(&self, prompt: &str) -> Result<String> {
        let messages = vec![ChatMessage {
            role: "user".to_string(),
            content: prompt.to_string(),
        }];

        self.request(messages).await
    }

    /// Uses the native system role instead of the concatenating default.
    async fn complete_with_system(&self, system: &str, user: &str) -> Result<String> {
        let messages = vec![
            ChatMessage {
                role: "system".to_string(),
                content: system.to_string(),
            },
            ChatMessage {
                role: "user".to_string(),
                content: user.to_string(),
            },
        ];

        self.request(messages).await
    }
}

/// Extracts the first choice's content from a response envelope.
fn first_choice_content(response: ChatCompletionResponse) -> Result<String> {
    response
        .choices
        .into_iter()
        .next()
        .map(|choice| choice.message.content)
        .filter(|content| !content.is_empty())
        .ok_or_else(|| Error::DecodingFailed("no choices in response".to_string()))
}

/// Request to the Chat Completions API.
#[derive(Debug, Serialize)]
struct ChatCompletionRequest {
    model: String,
    messages: Vec<ChatMessage>,
    /// Token limit for GPT-4 and earlier models.
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
    /// Token limit for reasoning-family models.
    #[serde(skip_serializing_if = "Option::is_none")]
    max_completion_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
}

/// A message in the chat.
#[derive(Debug, Serialize, Deserialize)]
struct ChatMessage {
    role: String,
    content: String,
}

/// Response from the Chat Completions API.
#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    choices: Vec<ChatChoice>,
}

/// A choice in the response.
#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}
