//! # Undertone
//!
//! Emotion-aware analysis engine for voice journal transcripts.
//!
//! Undertone sends a journal transcript to an LLM provider (Anthropic or
//! `OpenAI`), retries transient provider failures with linear backoff, and
//! extracts a structured reflection (emotion, summary, analysis, suggested
//! actions) out of whatever text the model returns. Alongside the request
//! path it aggregates prior entries into emotion patterns and a daily
//! trajectory that feed back into the next prompt.
//!
//! ## Features
//!
//! - Single `ChatProvider` trait in front of Anthropic and `OpenAI`
//! - Linear-backoff retry confined to rate-limit and overload failures
//! - Depth-aware JSON extraction with a degraded fallback result
//! - Emotion pattern, trigger, and trajectory aggregation over history
//! - Broadcast progress events for in-flight analysis requests
//!
//! ## Example
//!
//! ```rust,ignore
//! use undertone::{AnalysisService, UndertoneConfig};
//!
//! let config = UndertoneConfig::load_default()?;
//! let service = AnalysisService::from_config(&config)?;
//! let result = service.analyze("long day, but the demo went well", &history).await?;
//! println!("{}", result.primary_emotion);
//! ```

#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]
#![warn(missing_docs)]
#![forbid(unsafe_code)]
// multiple_crate_versions is inherently crate-level (detects duplicate transitive dependencies).
// Cannot be moved to function level. Current duplicates: reqwest/tokio transitive deps.
#![allow(clippy::multiple_crate_versions)]

use thiserror::Error as ThisError;

// Module declarations
pub mod config;
pub mod llm;
pub mod models;
pub mod observability;
pub mod services;

// Re-exports for convenience
pub use config::{LlmProvider, UndertoneConfig};
pub use llm::{AnthropicClient, ChatProvider, LlmHttpConfig, OpenAiClient, RetryPolicy};
pub use models::{
    AnalysisEvent, AnalysisResult, EmotionChange, EmotionPattern, EmotionalTrajectory, EventMeta,
    JournalEntry, PatternAnalysis, TimeRange,
};
pub use services::{AnalysisService, PatternService};

/// Error type for undertone operations.
///
/// Uses `thiserror` for automatic `Display` and `Error` trait implementations.
///
/// # Error Variant Triggers
///
/// | Variant | Raised When |
/// |---------|-------------|
/// | `ConfigurationMissing` | No API key found for the configured provider |
/// | `InvalidRequest` | Empty transcript, malformed endpoint URL, bad CLI arguments |
/// | `RateLimited` | Provider returns HTTP 429 |
/// | `ServiceOverloaded` | Provider returns HTTP 529, 503, or 502 |
/// | `InsufficientCredits` | Provider returns HTTP 402 |
/// | `Api` | Any other non-2xx provider status |
/// | `Network` | Connect, timeout, or transport failures before a status arrives |
/// | `DecodingFailed` | 2xx response whose envelope does not match the provider schema |
/// | `InvalidJsonResponse` | Model output contains no extractable JSON object |
/// | `OperationFailed` | Config file I/O, history file I/O, subscriber init |
#[derive(Debug, ThisError)]
pub enum Error {
    /// A required credential or setting is absent.
    ///
    /// Raised when:
    /// - The provider's API key environment variable is unset or blank
    /// - A `${VAR}` reference in the config file names an unset variable
    #[error("configuration missing: {variable} is not set")]
    ConfigurationMissing {
        /// The environment variable or config key that was expected.
        variable: String,
    },

    /// The request could not be constructed or accepted.
    ///
    /// Raised when:
    /// - The transcript is empty or whitespace-only
    /// - The provider endpoint URL fails to parse
    /// - CLI flags are combined in an unusable way
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// The provider rejected the request with HTTP 429.
    ///
    /// Eligible for retry with linear backoff.
    #[error("rate limited by provider")]
    RateLimited,

    /// The provider reported overload (HTTP 529, 503, or 502).
    ///
    /// Eligible for retry with linear backoff.
    #[error("service overloaded (status {0})")]
    ServiceOverloaded(u16),

    /// The account has run out of API credits (HTTP 402).
    ///
    /// Never retried; the condition will not clear on its own.
    #[error("insufficient API credits")]
    InsufficientCredits,

    /// The provider returned a non-2xx status with no dedicated variant.
    #[error("API error (status {status}): {body}")]
    Api {
        /// HTTP status code returned by the provider.
        status: u16,
        /// Response body, if one could be read.
        body: String,
    },

    /// The request failed before an HTTP status was received.
    ///
    /// Raised when:
    /// - DNS resolution or TCP connect fails
    /// - The connect, read, or total timeout elapses
    #[error("network error: {0}")]
    Network(String),

    /// A 2xx response body did not match the provider's envelope schema.
    ///
    /// Raised when:
    /// - Required envelope fields are missing or mistyped
    /// - The envelope carries no non-empty text content
    #[error("failed to decode provider response: {0}")]
    DecodingFailed(String),

    /// Model output contained no JSON object to extract.
    ///
    /// Raised when:
    /// - The text has no `{`, no `}`, or the last `}` precedes the first `{`
    #[error("invalid JSON in model response: {0}")]
    InvalidJsonResponse(String),

    /// An internal operation failed.
    ///
    /// Raised when:
    /// - The config file cannot be read or parsed
    /// - History files cannot be read or written
    /// - The tracing subscriber is initialized twice
    #[error("operation '{operation}' failed: {cause}")]
    OperationFailed {
        /// The operation that failed.
        operation: String,
        /// The underlying cause.
        cause: String,
    },
}

impl Error {
    /// Whether the retry controller may schedule another attempt after this error.
    ///
    /// Only rate limiting and provider overload are transient; everything else
    /// fails the request immediately.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::RateLimited | Self::ServiceOverloaded(_))
    }

    /// Stable lowercase label for metrics and event payloads.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::ConfigurationMissing { .. } => "configuration_missing",
            Self::InvalidRequest(_) => "invalid_request",
            Self::RateLimited => "rate_limited",
            Self::ServiceOverloaded(_) => "service_overloaded",
            Self::InsufficientCredits => "insufficient_credits",
            Self::Api { .. } => "api_error",
            Self::Network(_) => "network",
            Self::DecodingFailed(_) => "decoding_failed",
            Self::InvalidJsonResponse(_) => "invalid_json_response",
            Self::OperationFailed { .. } => "operation_failed",
        }
    }
}

/// Result type alias for undertone operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Returns the current Unix timestamp in seconds.
///
/// Centralized so event metadata and log fields agree on the clock. Uses
/// `SystemTime::now()` with fallback to 0 if the system clock is before the
/// Unix epoch.
///
/// # Examples
///
/// ```rust
/// use undertone::current_timestamp;
///
/// let ts = current_timestamp();
/// assert!(ts > 0); // Should be a reasonable Unix timestamp
/// ```
#[must_use]
pub fn current_timestamp() -> u64 {
    use std::time::{SystemTime, UNIX_EPOCH};
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}
