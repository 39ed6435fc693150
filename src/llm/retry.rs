//! Retry controller for provider requests.
//!
//! Wraps a request closure with bounded, linearly backed-off retries. Only
//! rate-limit and overload failures are retried; every other error fails the
//! request on the spot. Waits use `tokio::time::sleep`, so a suspended
//! request never blocks unrelated work and cancellation drops the wait.

use std::future::Future;
use std::time::{Duration, Instant};

use crate::models::{AnalysisEvent, EventMeta};
use crate::observability::EventBus;
use crate::{Error, Result};

const EVENT_SOURCE: &str = "retry_controller";

/// Retry policy for provider requests.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts per request, including the first.
    pub max_attempts: u32,
    /// Base backoff step; attempt k waits k times this before the next try.
    pub backoff_step: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            backoff_step: Duration::from_secs(2),
        }
    }
}

impl RetryPolicy {
    /// Loads retry settings from environment variables.
    #[must_use]
    pub fn from_env() -> Self {
        Self::default().with_env_overrides()
    }

    /// Loads retry settings from config file values.
    #[must_use]
    pub fn from_config(config: &crate::config::LlmConfig) -> Self {
        let mut policy = Self::default();
        if let Some(max_attempts) = config.max_attempts {
            policy.max_attempts = max_attempts.max(1);
        }
        if let Some(backoff_step_ms) = config.backoff_step_ms {
            policy.backoff_step = Duration::from_millis(backoff_step_ms);
        }
        policy
    }

    /// Applies environment variable overrides.
    #[must_use]
    pub fn with_env_overrides(mut self) -> Self {
        if let Ok(v) = std::env::var("UNDERTONE_LLM_MAX_ATTEMPTS") {
            if let Ok(max_attempts) = v.parse::<u32>() {
                self.max_attempts = max_attempts.max(1);
            }
        }
        if let Ok(v) = std::env::var("UNDERTONE_LLM_BACKOFF_STEP_MS") {
            if let Ok(backoff_step_ms) = v.parse::<u64>() {
                self.backoff_step = Duration::from_millis(backoff_step_ms);
            }
        }
        self
    }

    /// Delay scheduled after the given failed attempt (1-based).
    #[must_use]
    pub fn backoff_delay(self, attempt: u32) -> Duration {
        self.backoff_step * attempt
    }
}

/// Runs `op` under the retry policy, publishing progress events as it goes.
///
/// `op` receives the 1-based attempt number and must dispatch exactly one
/// provider request per call.
///
/// # Errors
///
/// Returns the first non-retryable error immediately, or the last retryable
/// error once attempts are exhausted.
pub async fn run_with_retry<T, F, Fut>(
    policy: &RetryPolicy,
    provider: &'static str,
    events: &EventBus,
    correlation_id: Option<&str>,
    mut op: F,
) -> Result<T>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let max_attempts = policy.max_attempts.max(1);
    let mut last_error: Option<Error> = None;

    for attempt in 1..=max_attempts {
        events.publish(AnalysisEvent::AttemptStarted {
            meta: EventMeta::new(EVENT_SOURCE, correlation_id.map(str::to_string)),
            attempt,
            max_attempts,
        });

        let started = Instant::now();
        let result = op(attempt).await;
        let elapsed = started.elapsed();

        match result {
            Ok(value) => {
                record_request(provider, "success", elapsed);
                if attempt > 1 {
                    tracing::info!(provider, attempt, "LLM request succeeded after retry");
                }
                return Ok(value);
            }
            Err(err) if err.is_retryable() && attempt < max_attempts => {
                record_request(provider, err.kind(), elapsed);
                metrics::counter!("llm_retries_total", "provider" => provider).increment(1);

                let delay = policy.backoff_delay(attempt);
                let delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX);
                tracing::warn!(
                    provider,
                    attempt,
                    max_attempts,
                    delay_ms,
                    error = %err,
                    "transient provider failure, backing off before retry"
                );
                events.publish(AnalysisEvent::RetryScheduled {
                    meta: EventMeta::new(EVENT_SOURCE, correlation_id.map(str::to_string)),
                    attempt,
                    max_attempts,
                    delay_ms,
                    reason: err.kind(),
                });

                tokio::time::sleep(delay).await;
                last_error = Some(err);
            }
            Err(err) => {
                record_request(provider, err.kind(), elapsed);
                return Err(err);
            }
        }
    }

    // The loop always returns from its final iteration; this satisfies the
    // compiler when max_attempts is somehow zero.
    Err(last_error.unwrap_or_else(|| {
        Error::Network("retry loop exhausted without dispatching a request".to_string())
    }))
}

fn record_request(provider: &'static str, status: &'static str, elapsed: Duration) {
    metrics::counter!(
        "llm_requests_total",
        "provider" => provider,
        "status" => status
    )
    .increment(1);
    metrics::histogram!(
        "llm_request_duration_ms",
        "provider" => provider,
        "status" => status
    )
    .record(elapsed.as_secs_f64() * 1000.0);
}
