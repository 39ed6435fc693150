//! Anthropic Claude client.

use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};

use super::{ChatProvider, LlmHttpConfig, build_http_client, map_transport_error, status_to_error};
use crate::{Error, Result};
use async_trait::async_trait;

/// Anthropic Claude chat client.
pub struct AnthropicClient {
    /// API key.
    api_key: SecretString,
    /// API endpoint.
    endpoint: String,
    /// Model to use.
    model: String,
    /// HTTP client.
    client: reqwest::Client,
}

impl AnthropicClient {
    /// Default API endpoint.
    pub const DEFAULT_ENDPOINT: &'static str = "https://api.anthropic.com/v1";

    /// Default model.
    pub const DEFAULT_MODEL: &'static str = "claude-3-5-sonnet-20241022";

    /// Environment variable holding the API key.
    pub const KEY_VARIABLE: &'static str = "ANTHROPIC_API_KEY";

    const API_VERSION: &'static str = "2023-06-01";
    const MAX_TOKENS: u32 = 2_000;

    /// Creates a new Anthropic client with the given API key.
    #[must_use]
    pub fn new(api_key: SecretString) -> Self {
        Self {
            api_key,
            endpoint: Self::DEFAULT_ENDPOINT.to_string(),
            model: Self::DEFAULT_MODEL.to_string(),
            client: build_http_client(LlmHttpConfig::from_env()),
        }
    }

    /// Creates a client from `ANTHROPIC_API_KEY`.
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

    /// Makes one request to the Messages API.
    async fn request(&self, messages: Vec<Message>) -> Result<String> {
        self.validate()?;

        tracing::info!(provider = "anthropic", model = %self.model, "Making LLM request");

        let request = MessagesRequest {
            model: self.model.clone(),
            max_tokens: Self::MAX_TOKENS,
            messages,
        };

        let response = self
            .client
            .post(format!("{}/messages", self.endpoint))
            .header("x-api-key", self.api_key.expose_secret())
            .header("anthropic-version", Self::API_VERSION)
            .header("content-type", "application/json")
            .json(&request)
            .send()
            .await
            .map_err(|e| map_transport_error("anthropic", &self.model, &e))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            tracing::error!(
                provider = "anthropic",
                model = %self.model,
                status = %status,
                body = %body,
                "LLM API returned error status"
            );
            return Err(status_to_error(status.as_u16(), body));
        }

        let response: MessagesResponse = response.json().await.map_err(|e| {
            tracing::error!(
                provider = "anthropic",
                model = %self.model,
                error = %e,
                "Failed to parse LLM response"
            );
            Error::DecodingFailed(e.to_string())
        })?;

        first_text_block(response)
    }
}

#[async_trait]
impl ChatProvider for AnthropicClient {
    fn name(&self) -> &'static str {
        "anthropic"
    }

    async fn complete(&self, prompt: &str) -> Result<String> {
        let messages = vec![Message {
            role: "user".to_string(),
            content: prompt.to_string(),
        }];

        self.request(messages).await
    }
}

/// Extracts the first non-empty text block from a response envelope.
fn first_text_block(response: MessagesResponse) -> Result<String> {
    response
        .content
        .into_iter()
        .find(|block| block.block_type == "text" && !block.text.is_empty())
        .map(|block| block.text)
        .ok_or_else(|| Error::DecodingFailed("no text content in response".to_string()))
}

/// Request to the Messages API.
#[derive(Debug, Serialize)]
struct MessagesRequest {
    model: String,
    max_tokens: u32,
    messages: Vec<Message>,
}

/// A message in the conversation.
#[derive(Debug, Serialize)]
struct Message {
    role: String,
    content: String,
}

/// Response from the Messages API.
#[derive(Debug, Deserialize)]
struct MessagesResponse {
    content: Vec<ContentBlock>,
}

/// A content block in the response.
#[derive(Debug, Deserialize)]
struct ContentBlock {
    #[serde(rename = "type")]
    block_type: String,
    #[serde(default)]
    text: String,
}
