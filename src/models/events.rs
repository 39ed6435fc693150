//! Progress events emitted while an analysis request is in flight.

use crate::current_timestamp;
use uuid::Uuid;

/// Shared event metadata required for observability.
#[derive(Debug, Clone)]
pub struct EventMeta {
    /// Unique identifier for this event.
    pub event_id: String,
    /// Optional correlation identifier linking events of one analysis.
    pub correlation_id: Option<String>,
    /// Event source component.
    pub source: &'static str,
    /// Timestamp (Unix epoch seconds).
    pub timestamp: u64,
}

impl EventMeta {
    /// Creates new event metadata using the current timestamp.
    #[must_use]
    pub fn new(source: &'static str, correlation_id: Option<String>) -> Self {
        Self::with_timestamp(source, correlation_id, current_timestamp())
    }

    /// Creates new event metadata with a specified timestamp.
    #[must_use]
    pub fn with_timestamp(
        source: &'static str,
        correlation_id: Option<String>,
        timestamp: u64,
    ) -> Self {
        Self {
            event_id: Uuid::new_v4().to_string(),
            correlation_id,
            source,
            timestamp,
        }
    }
}

/// Events published during an analysis request.
///
/// Subscribers (a CLI progress line, a UI binding) observe these instead of
/// the service mutating any shared state itself.
#[derive(Debug, Clone)]
pub enum AnalysisEvent {
    /// A provider attempt is about to be dispatched.
    AttemptStarted {
        /// Event metadata.
        meta: EventMeta,
        /// Attempt number, starting at 1.
        attempt: u32,
        /// Total attempts the retry policy allows.
        max_attempts: u32,
    },
    /// A transient failure was observed and a retry is scheduled.
    RetryScheduled {
        /// Event metadata.
        meta: EventMeta,
        /// The attempt that just failed.
        attempt: u32,
        /// Total attempts the retry policy allows.
        max_attempts: u32,
        /// How long the controller will wait before the next attempt.
        delay_ms: u64,
        /// Error kind label that triggered the retry.
        reason: &'static str,
    },
    /// The analysis finished and a result is available.
    Completed {
        /// Event metadata.
        meta: EventMeta,
        /// Whether the degraded fallback result was used.
        degraded: bool,
    },
    /// The analysis failed with no result.
    Failed {
        /// Event metadata.
        meta: EventMeta,
        /// Display form of the final error.
        reason: String,
    },
}

impl AnalysisEvent {
    /// Returns the event type name.
    #[must_use]
    pub const fn event_type(&self) -> &'static str {
        match self {
            Self::AttemptStarted { .. } => "analysis.attempt_started",
            Self::RetryScheduled { .. } => "analysis.retry_scheduled",
            Self::Completed { .. } => "analysis.completed",
            Self::Failed { .. } => "analysis.failed",
        }
    }

    /// Returns the timestamp of the event.
    #[must_use]
    pub const fn timestamp(&self) -> u64 {
        match self {
            Self::AttemptStarted { meta, .. }
            | Self::RetryScheduled { meta, .. }
            | Self::Completed { meta, .. }
            | Self::Failed { meta, .. } => meta.timestamp,
        }
    }

    /// Returns the event metadata.
    #[must_use]
    pub const fn meta(&self) -> &EventMeta {
        match self {
            Self::AttemptStarted { meta, .. }
            | Self::RetryScheduled { meta, .. }
            | Self::Completed { meta, .. }
            | Self::Failed { meta, .. } => meta,
        }
    }
}
