//! LLM client abstraction.
//!
//! Provides a unified interface for the chat-completion providers, so the
//! analysis pipeline builds one prompt, runs one retry loop, and parses one
//! response format regardless of which provider is configured.

mod anthropic;
mod openai;
pub mod parser;
pub mod prompt;
pub mod retry;

pub use anthropic::AnthropicClient;
pub use openai::OpenAiClient;
pub use parser::{ParsedAnalysis, parse_analysis};
pub use retry::RetryPolicy;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use crate::config::{LlmProvider, UndertoneConfig};
use crate::{Error, Result};

/// Trait for chat-completion providers.
///
/// One request is dispatched per call; retries live in [`retry`], not in the
/// providers themselves.
#[async_trait]
pub trait ChatProvider: Send + Sync {
    /// The provider name.
    fn name(&self) -> &'static str;

    /// Generates a completion for the given prompt.
    ///
    /// # Errors
    ///
    /// Returns an error if the completion fails.
    async fn complete(&self, prompt: &str) -> Result<String>;

    /// Generates a completion with a system prompt.
    ///
    /// # Errors
    ///
    /// Returns an error if the completion fails.
    ///
    /// Default implementation concatenates system and user prompts.
    /// Providers should override this to use native system prompt support.
    async fn complete_with_system(&self, system: &str, user: &str) -> Result<String> {
        let combined = format!("{system}\n\n---\n\nUser message:\n{user}");
        self.complete(&combined).await
    }
}

/// HTTP client configuration for LLM providers.
#[derive(Debug, Clone, Copy)]
pub struct LlmHttpConfig {
    /// Read timeout for one request in milliseconds (0 to disable).
    pub request_timeout_ms: u64,
    /// Connect timeout in milliseconds (0 to disable).
    pub connect_timeout_ms: u64,
    /// Total deadline for one request in milliseconds (0 to disable).
    pub total_timeout_ms: u64,
}

impl Default for LlmHttpConfig {
    fn default() -> Self {
        Self {
            request_timeout_ms: 30_000,
            connect_timeout_ms: 30_000,
            total_timeout_ms: 60_000,
        }
    }
}

impl LlmHttpConfig {
    /// Loads HTTP configuration from environment variables.
    #[must_use]
    pub fn from_env() -> Self {
        Self::default().with_env_overrides()
    }

    /// Loads HTTP configuration from config file settings.
    #[must_use]
    pub fn from_config(config: &crate::config::LlmConfig) -> Self {
        let mut settings = Self::default();
        if let Some(request_timeout_ms) = config.request_timeout_ms {
            settings.request_timeout_ms = request_timeout_ms;
        }
        if let Some(connect_timeout_ms) = config.connect_timeout_ms {
            settings.connect_timeout_ms = connect_timeout_ms;
        }
        if let Some(total_timeout_ms) = config.total_timeout_ms {
            settings.total_timeout_ms = total_timeout_ms;
        }
        settings
    }

    /// Applies environment variable overrides.
    #[must_use]
    pub fn with_env_overrides(mut self) -> Self {
        if let Ok(v) = std::env::var("UNDERTONE_LLM_REQUEST_TIMEOUT_MS") {
            if let Ok(request_timeout_ms) = v.parse::<u64>() {
                self.request_timeout_ms = request_timeout_ms;
            }
        }
        if let Ok(v) = std::env::var("UNDERTONE_LLM_CONNECT_TIMEOUT_MS") {
            if let Ok(connect_timeout_ms) = v.parse::<u64>() {
                self.connect_timeout_ms = connect_timeout_ms;
            }
        }
        if let Ok(v) = std::env::var("UNDERTONE_LLM_TOTAL_TIMEOUT_MS") {
            if let Ok(total_timeout_ms) = v.parse::<u64>() {
                self.total_timeout_ms = total_timeout_ms;
            }
        }
        self
    }
}

/// Builds an HTTP client for LLM requests with configured timeouts.
#[must_use]
pub fn build_http_client(config: LlmHttpConfig) -> reqwest::Client {
    let mut builder = reqwest::Client::builder();
    if config.request_timeout_ms > 0 {
        builder = builder.read_timeout(Duration::from_millis(config.request_timeout_ms));
    }
    if config.connect_timeout_ms > 0 {
        builder = builder.connect_timeout(Duration::from_millis(config.connect_timeout_ms));
    }
    if config.total_timeout_ms > 0 {
        builder = builder.timeout(Duration::from_millis(config.total_timeout_ms));
    }

    builder.build().unwrap_or_else(|err| {
        tracing::warn!("Failed to build LLM HTTP client: {err}");
        reqwest::Client::new()
    })
}

/// Builds the configured provider, resolving its API key up front.
///
/// # Errors
///
/// Returns `Error::ConfigurationMissing` if no API key can be resolved for
/// the configured provider.
pub fn provider_from_config(config: &UndertoneConfig) -> Result<Arc<dyn ChatProvider>> {
    let api_key = config.llm.resolve_api_key()?;
    let http = LlmHttpConfig::from_config(&config.llm).with_env_overrides();

    let provider: Arc<dyn ChatProvider> = match config.llm.provider {
        LlmProvider::Anthropic => {
            let mut client = AnthropicClient::new(api_key).with_http_config(http);
            if let Some(model) = &config.llm.model {
                client = client.with_model(model);
            }
            if let Some(base_url) = &config.llm.base_url {
                client = client.with_endpoint(base_url);
            }
            Arc::new(client)
        }
        LlmProvider::OpenAi => {
            let mut client = OpenAiClient::new(api_key).with_http_config(http);
            if let Some(model) = &config.llm.model {
                client = client.with_model(model);
            }
            if let Some(base_url) = &config.llm.base_url {
                client = client.with_endpoint(base_url);
            }
            Arc::new(client)
        }
    };

    Ok(provider)
}

/// Maps a non-2xx provider status to the matching error variant.
pub(crate) fn status_to_error(status: u16, body: String) -> Error {
    match status {
        429 => Error::RateLimited,
        402 => Error::InsufficientCredits,
        502 | 503 | 529 => Error::ServiceOverloaded(status),
        _ => Error::Api { status, body },
    }
}

/// Maps a reqwest transport failure to the matching error variant.
///
/// Builder errors (malformed URLs) are programmer errors, not network ones.
pub(crate) fn map_transport_error(
    provider: &'static str,
    model: &str,
    err: &reqwest::Error,
) -> Error {
    if err.is_builder() {
        return Error::InvalidRequest(err.to_string());
    }

    let error_kind = if err.is_timeout() {
        "timeout"
    } else if err.is_connect() {
        "connect"
    } else if err.is_request() {
        "request"
    } else {
        "unknown"
    };
    tracing::error!(
        provider,
        model = %model,
        error = %err,
        error_kind,
        "LLM request failed"
    );
    Error::Network(format!("{error_kind} error: {err}"))
}
