//! Configuration management.

use secrecy::SecretString;
use serde::Deserialize;
use std::fmt;

use crate::{Error, Result};

/// Main configuration for undertone.
#[derive(Debug, Clone, Default)]
pub struct UndertoneConfig {
    /// LLM provider configuration.
    pub llm: LlmConfig,
}

/// LLM provider configuration.
#[derive(Debug, Clone, Default)]
pub struct LlmConfig {
    /// Provider name: "anthropic" or "openai".
    pub provider: LlmProvider,
    /// Model name.
    pub model: Option<String>,
    /// API key (can be an environment variable reference like `${OPENAI_API_KEY}`).
    pub api_key: Option<String>,
    /// Base URL for the provider (for proxies or compatible gateways).
    pub base_url: Option<String>,
    /// Per-request read timeout in milliseconds.
    pub request_timeout_ms: Option<u64>,
    /// Connect timeout in milliseconds.
    pub connect_timeout_ms: Option<u64>,
    /// Total deadline for one request in milliseconds.
    pub total_timeout_ms: Option<u64>,
    /// Total provider attempts per analysis, including the first.
    pub max_attempts: Option<u32>,
    /// Backoff step in milliseconds; attempt k waits k times this.
    pub backoff_step_ms: Option<u64>,
}

impl LlmConfig {
    /// Resolves the API key for the configured provider.
    ///
    /// Precedence: an explicit config value wins, with `${VAR}` references
    /// resolved through the environment; otherwise the provider's standard
    /// environment variable is read. Resolution happens once at startup, so a
    /// missing key fails before any network traffic.
    ///
    /// # Errors
    ///
    /// Returns `Error::ConfigurationMissing` naming the variable that was
    /// expected when no non-empty key can be found.
    pub fn resolve_api_key(&self) -> Result<SecretString> {
        if let Some(raw) = &self.api_key {
            let raw = raw.trim();
            if let Some(name) = raw.strip_prefix("${").and_then(|s| s.strip_suffix('}')) {
                return read_key_variable(name);
            }
            if !raw.is_empty() {
                return Ok(SecretString::from(raw.to_string()));
            }
        }
        read_key_variable(self.provider.api_key_variable())
    }
}

fn read_key_variable(variable: &str) -> Result<SecretString> {
    match std::env::var(variable) {
        Ok(value) if !value.trim().is_empty() => Ok(SecretString::from(value)),
        _ => Err(Error::ConfigurationMissing {
            variable: variable.to_string(),
        }),
    }
}

/// Available LLM providers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LlmProvider {
    /// Anthropic Claude.
    #[default]
    Anthropic,
    /// `OpenAI` GPT.
    OpenAi,
}

impl LlmProvider {
    /// Parses a provider string.
    #[must_use]
    pub fn parse(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "openai" | "open-ai" | "gpt" => Self::OpenAi,
            _ => Self::Anthropic,
        }
    }

    /// Canonical provider name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Anthropic => "anthropic",
            Self::OpenAi => "openai",
        }
    }

    /// Environment variable holding this provider's API key.
    #[must_use]
    pub const fn api_key_variable(self) -> &'static str {
        match self {
            Self::Anthropic => "ANTHROPIC_API_KEY",
            Self::OpenAi => "OPENAI_API_KEY",
        }
    }
}

impl fmt::Display for LlmProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Configuration file structure (for TOML parsing).
#[derive(Debug, Deserialize, Default)]
pub struct ConfigFile {
    /// LLM configuration.
    pub llm: Option<ConfigFileLlm>,
}

/// LLM section in config file.
#[derive(Debug, Deserialize, Default)]
pub struct ConfigFileLlm {
    /// Provider name.
    pub provider: Option<String>,
    /// Model name.
    pub model: Option<String>,
    /// API key.
    pub api_key: Option<String>,
    /// Base URL.
    pub base_url: Option<String>,
    /// Per-request read timeout in milliseconds.
    pub request_timeout_ms: Option<u64>,
    /// Connect timeout in milliseconds.
    pub connect_timeout_ms: Option<u64>,
    /// Total deadline for one request in milliseconds.
    pub total_timeout_ms: Option<u64>,
    /// Total provider attempts per analysis.
    pub max_attempts: Option<u32>,
    /// Backoff step in milliseconds.
    pub backoff_step_ms: Option<u64>,
}

impl UndertoneConfig {
    /// Creates a new configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Loads configuration from a file path.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn load_from_file(path: &std::path::Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path).map_err(|e| Error::OperationFailed {
            operation: "read_config_file".to_string(),
            cause: e.to_string(),
        })?;

        let file: ConfigFile = toml::from_str(&contents).map_err(|e| Error::OperationFailed {
            operation: "parse_config_file".to_string(),
            cause: e.to_string(),
        })?;

        Ok(Self::from_config_file(file))
    }

    /// Loads configuration from the default location.
    ///
    /// Checks the following paths in order:
    /// 1. Platform-specific config dir (`~/Library/Application Support/undertone/` on macOS)
    /// 2. XDG config dir (`~/.config/undertone/` for Unix compatibility)
    ///
    /// Returns default configuration if no config file is found.
    #[must_use]
    pub fn load_default() -> Self {
        let Some(base_dirs) = directories::BaseDirs::new() else {
            return Self::default();
        };

        // Check platform-specific config dir first
        let platform_config = base_dirs
            .config_dir()
            .join("undertone")
            .join("config.toml");
        if platform_config.exists() {
            if let Ok(config) = Self::load_from_file(&platform_config) {
                return config;
            }
        }

        // Fall back to XDG-style ~/.config/undertone/ for Unix compatibility
        let xdg_config = base_dirs
            .home_dir()
            .join(".config")
            .join("undertone")
            .join("config.toml");
        if xdg_config.exists() {
            if let Ok(config) = Self::load_from_file(&xdg_config) {
                return config;
            }
        }

        Self::default()
    }

    /// Converts a `ConfigFile` to `UndertoneConfig`.
    fn from_config_file(file: ConfigFile) -> Self {
        let mut config = Self::default();

        if let Some(llm) = file.llm {
            if let Some(provider) = llm.provider {
                config.llm.provider = LlmProvider::parse(&provider);
            }
            config.llm.model = llm.model;
            config.llm.api_key = llm.api_key;
            config.llm.base_url = llm.base_url;
            config.llm.request_timeout_ms = llm.request_timeout_ms;
            config.llm.connect_timeout_ms = llm.connect_timeout_ms;
            config.llm.total_timeout_ms = llm.total_timeout_ms;
            config.llm.max_attempts = llm.max_attempts;
            config.llm.backoff_step_ms = llm.backoff_step_ms;
        }

        config
    }

    /// Applies `UNDERTONE_LLM_*` environment overrides on top of file values.
    #[must_use]
    pub fn with_env_overrides(mut self) -> Self {
        if let Ok(value) = std::env::var("UNDERTONE_LLM_PROVIDER") {
            if !value.trim().is_empty() {
                self.llm.provider = LlmProvider::parse(&value);
            }
        }
        if let Ok(value) = std::env::var("UNDERTONE_LLM_MODEL") {
            if !value.trim().is_empty() {
                self.llm.model = Some(value);
            }
        }
        if let Ok(value) = std::env::var("UNDERTONE_LLM_BASE_URL") {
            if !value.trim().is_empty() {
                self.llm.base_url = Some(value);
            }
        }
        self
    }

    /// Sets the provider.
    #[must_use]
    pub const fn with_provider(mut self, provider: LlmProvider) -> Self {
        self.llm.provider = provider;
        self
    }

    /// Sets the model name.
    #[must_use]
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.llm.model = Some(model.into());
        self
    }
}
