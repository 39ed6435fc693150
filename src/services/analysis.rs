//! Emotion analysis orchestration.
//!
//! One call to [`AnalysisService::analyze`] runs the whole pipeline: build
//! the prompt from the transcript and recent history, dispatch the provider
//! request under the retry policy, and parse the response into an
//! [`AnalysisResult`]. Lifecycle events go out on the event bus so callers
//! can surface progress without touching this code path.

use std::sync::Arc;

use chrono::Utc;
use uuid::Uuid;

use crate::config::UndertoneConfig;
use crate::llm::{ChatProvider, RetryPolicy, parse_analysis, prompt, provider_from_config, retry};
use crate::models::{AnalysisEvent, AnalysisResult, EventMeta, JournalEntry};
use crate::observability::{EventBus, global_event_bus};
use crate::{Error, Result};

const EVENT_SOURCE: &str = "analysis_service";

/// Most prior entries considered when building prompt context.
pub const MAX_HISTORY_ENTRIES: usize = 10;

/// Orchestrates one transcript analysis end to end.
pub struct AnalysisService {
    provider: Arc<dyn ChatProvider>,
    retry: RetryPolicy,
    events: EventBus,
}

impl AnalysisService {
    /// Creates a service around an existing provider, publishing events on
    /// the global bus.
    #[must_use]
    pub fn new(provider: Arc<dyn ChatProvider>, retry: RetryPolicy) -> Self {
        Self {
            provider,
            retry,
            events: global_event_bus().clone(),
        }
    }

    /// Builds the service from configuration, resolving the provider, its
    /// API key, and the retry policy.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ConfigurationMissing`] if no API key can be resolved
    /// for the configured provider.
    pub fn from_config(config: &UndertoneConfig) -> Result<Self> {
        let provider = provider_from_config(config)?;
        let retry = RetryPolicy::from_config(&config.llm).with_env_overrides();
        Ok(Self::new(provider, retry))
    }

    /// Replaces the event bus, for callers that want a private channel.
    #[must_use]
    pub fn with_event_bus(mut self, events: EventBus) -> Self {
        self.events = events;
        self
    }

    /// Name of the provider this service dispatches to.
    #[must_use]
    pub fn provider_name(&self) -> &'static str {
        self.provider.name()
    }

    /// Analyzes one transcript against recent history.
    ///
    /// `history` is expected newest-first; entries past
    /// [`MAX_HISTORY_ENTRIES`] are ignored. On success the result is either
    /// fully structured or a degraded fallback built from the raw response
    /// text; both are valid, displayable results.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidRequest`] for an empty transcript without
    /// dispatching any request, and otherwise the terminal error of the
    /// provider call once retries are exhausted.
    pub async fn analyze(
        &self,
        transcript: &str,
        history: &[JournalEntry],
    ) -> Result<AnalysisResult> {
        if transcript.trim().is_empty() {
            return Err(Error::InvalidRequest(
                "transcript must not be empty".to_string(),
            ));
        }

        let correlation_id = Uuid::new_v4().to_string();
        let recent = &history[..history.len().min(MAX_HISTORY_ENTRIES)];
        let user_prompt = prompt::build_user_prompt(transcript, recent, Utc::now());

        tracing::debug!(
            provider = self.provider.name(),
            correlation_id = %correlation_id,
            history_entries = recent.len(),
            prompt_chars = user_prompt.len(),
            "dispatching analysis request"
        );

        let provider = Arc::clone(&self.provider);
        let outcome = retry::run_with_retry(
            &self.retry,
            self.provider.name(),
            &self.events,
            Some(&correlation_id),
            move |_attempt| {
                let provider = Arc::clone(&provider);
                let user = user_prompt.clone();
                async move {
                    provider
                        .complete_with_system(prompt::SYSTEM_PROMPT, &user)
                        .await
                }
            },
        )
        .await;

        match outcome.and_then(|raw| parse_analysis(&raw)) {
            Ok(parsed) => {
                if parsed.degraded {
                    tracing::warn!(
                        provider = self.provider.name(),
                        correlation_id = %correlation_id,
                        "response parsing degraded to fallback result"
                    );
                }
                metrics::counter!(
                    "analysis_completed_total",
                    "degraded" => if parsed.degraded { "true" } else { "false" }
                )
                .increment(1);
                self.events.publish(AnalysisEvent::Completed {
                    meta: EventMeta::new(EVENT_SOURCE, Some(correlation_id)),
                    degraded: parsed.degraded,
                });
                Ok(parsed.result)
            }
            Err(err) => {
                tracing::error!(
                    provider = self.provider.name(),
                    correlation_id = %correlation_id,
                    error = %err,
                    error_kind = err.kind(),
                    "analysis failed"
                );
                metrics::counter!("analysis_failed_total", "error" => err.kind()).increment(1);
                self.events.publish(AnalysisEvent::Failed {
                    meta: EventMeta::new(EVENT_SOURCE, Some(correlation_id)),
                    reason: err.to_string(),
                });
                Err(err)
            }
        }
    }
}
