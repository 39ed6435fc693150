//! Analysis Pipeline Integration Tests
//!
//! Exercises the full analyze pipeline against in-process providers:
//! - Structured, degraded, and failed outcomes end to end
//! - Retry scheduling with linear backoff under a paused clock
//! - Prompt assembly with and without recent-history context
//! - Lifecycle events observed over the event bus
//! - Pattern aggregation over multi-day histories
//!
//! These tests do NOT require API keys; every provider is a scripted stub.

// Integration tests use expect/unwrap for simplicity - panics are acceptable in tests
#![allow(
    clippy::expect_used,
    clippy::unwrap_used,
    clippy::panic,
    clippy::excessive_nesting,
    dead_code
)]

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};

use undertone::llm::ChatProvider;
use undertone::observability::EventBus;
use undertone::{
    AnalysisEvent, AnalysisResult, AnalysisService, Error, JournalEntry, PatternService,
    RetryPolicy, TimeRange,
};

/// A response shaped exactly the way the system prompt demands.
const STRUCTURED_RESPONSE: &str = r#"{
    "emotion": "hopeful",
    "summary": "Finding footing after a hard week at work",
    "analysis": "Hey, thanks for sharing. It sounds like the week asked a lot of you.\n\nThere's a thread here worth noticing.\n\nWhat would it look like to protect one evening?",
    "suggestions": ["Block one evening this week", "Write down the deadline worry", "Tell one person how the week went"]
}"#;

// ============================================================================
// Scripted providers
// ============================================================================

/// Replays a fixed script of outcomes, one per call, and counts calls.
struct ScriptedProvider {
    script: Mutex<VecDeque<undertone::Result<String>>>,
    calls: Arc<AtomicU32>,
}

impl ScriptedProvider {
    fn new(script: Vec<undertone::Result<String>>) -> (Arc<Self>, Arc<AtomicU32>) {
        let calls = Arc::new(AtomicU32::new(0));
        let provider = Arc::new(Self {
            script: Mutex::new(script.into()),
            calls: Arc::clone(&calls),
        });
        (provider, calls)
    }
}

#[async_trait]
impl ChatProvider for ScriptedProvider {
    fn name(&self) -> &'static str {
        "scripted"
    }

    async fn complete(&self, _prompt: &str) -> undertone::Result<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.script
            .lock()
            .unwrap()
            .pop_front()
            .expect("provider called more times than scripted")
    }
}

/// Records every prompt it receives and always answers the same way.
struct CapturingProvider {
    prompts: Arc<Mutex<Vec<String>>>,
    response: &'static str,
}

impl CapturingProvider {
    fn new(response: &'static str) -> (Arc<Self>, Arc<Mutex<Vec<String>>>) {
        let prompts = Arc::new(Mutex::new(Vec::new()));
        let provider = Arc::new(Self {
            prompts: Arc::clone(&prompts),
            response,
        });
        (provider, prompts)
    }
}

#[async_trait]
impl ChatProvider for CapturingProvider {
    fn name(&self) -> &'static str {
        "capturing"
    }

    async fn complete(&self, prompt: &str) -> undertone::Result<String> {
        self.prompts.lock().unwrap().push(prompt.to_string());
        Ok(self.response.to_string())
    }
}

// ============================================================================
// Fixtures
// ============================================================================

fn service(provider: Arc<dyn ChatProvider>) -> AnalysisService {
    AnalysisService::new(provider, RetryPolicy::default()).with_event_bus(EventBus::new(64))
}

fn entry_at(
    timestamp: DateTime<Utc>,
    emotion: &str,
    summary: &str,
    analysis: &str,
) -> JournalEntry {
    let result = AnalysisResult::new(emotion, summary, analysis, vec![]);
    JournalEntry::from_analysis("spoken transcript", &result, timestamp)
}

fn june_2nd(hour: u32, minute: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 6, 2, hour, minute, 0).unwrap()
}

// ============================================================================
// Pipeline outcomes
// ============================================================================

mod pipeline {
    use super::*;

    #[tokio::test]
    async fn test_structured_response_round_trip() {
        let (provider, calls) = ScriptedProvider::new(vec![Ok(STRUCTURED_RESPONSE.to_string())]);
        let svc = service(provider);

        let result = svc
            .analyze("this week was a lot but I think I'm okay", &[])
            .await
            .unwrap();

        assert_eq!(result.primary_emotion, "hopeful");
        assert_eq!(result.summary, "Finding footing after a hard week at work");
        assert!(result.analysis.starts_with("Hey, thanks for sharing."));
        assert_eq!(result.suggestions.len(), 3);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_prose_wrapped_json_still_parses() {
        let wrapped = format!("Of course. Here is the analysis:\n\n{STRUCTURED_RESPONSE}\n\nTake care.");
        let (provider, _) = ScriptedProvider::new(vec![Ok(wrapped)]);
        let svc = service(provider);

        let result = svc.analyze("a decent day", &[]).await.unwrap();
        assert_eq!(result.primary_emotion, "hopeful");
    }

    #[tokio::test]
    async fn test_unusable_payload_degrades_to_fallback() {
        let (provider, calls) = ScriptedProvider::new(vec![Ok(
            "I hear you. { b0rked not-json here } Be kind to yourself.".to_string(),
        )]);
        let svc = service(provider);

        let result = svc.analyze("rambling thoughts", &[]).await.unwrap();

        assert_eq!(result.primary_emotion, "reflective");
        assert_eq!(result.summary, "Processing your thoughts");
        assert_eq!(
            result.suggestions,
            vec![
                "Take a moment to breathe".to_string(),
                "Consider what you're feeling".to_string(),
                "Be gentle with yourself".to_string(),
            ]
        );
        // The raw text is preserved as the analysis body.
        assert!(result.analysis.contains("Be kind to yourself."));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_response_without_braces_is_an_error() {
        let (provider, calls) =
            ScriptedProvider::new(vec![Ok("no json anywhere in this reply".to_string())]);
        let svc = service(provider);

        let err = svc.analyze("a transcript", &[]).await.unwrap_err();
        assert!(matches!(err, Error::InvalidJsonResponse(_)));
        // Parse failures are terminal, not retried.
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_empty_transcript_never_dispatches() {
        let (provider, calls) = ScriptedProvider::new(vec![]);
        let svc = service(provider);

        let err = svc.analyze("  \n\t ", &[]).await.unwrap_err();
        assert!(matches!(err, Error::InvalidRequest(_)));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }
}

// ============================================================================
// Retry behavior under a paused clock
// ============================================================================

mod retry_backoff {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_rate_limit_retries_and_recovers() {
        let (provider, calls) = ScriptedProvider::new(vec![
            Err(Error::RateLimited),
            Err(Error::RateLimited),
            Ok(STRUCTURED_RESPONSE.to_string()),
        ]);
        let svc = service(provider);
        let started = tokio::time::Instant::now();

        let result = svc.analyze("still here", &[]).await.unwrap();

        assert_eq!(result.primary_emotion, "hopeful");
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        // 2s after attempt 1, 4s after attempt 2.
        assert_eq!(started.elapsed(), Duration::from_secs(6));
    }

    #[tokio::test(start_paused = true)]
    async fn test_overload_retries_once_then_recovers() {
        let (provider, calls) = ScriptedProvider::new(vec![
            Err(Error::ServiceOverloaded(529)),
            Ok(STRUCTURED_RESPONSE.to_string()),
        ]);
        let svc = service(provider);
        let started = tokio::time::Instant::now();

        svc.analyze("hanging in", &[]).await.unwrap();

        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert_eq!(started.elapsed(), Duration::from_secs(2));
    }

    #[tokio::test(start_paused = true)]
    async fn test_exhausted_attempts_surface_the_last_error() {
        let (provider, calls) = ScriptedProvider::new(vec![
            Err(Error::RateLimited),
            Err(Error::RateLimited),
            Err(Error::RateLimited),
        ]);
        let svc = service(provider);
        let started = tokio::time::Instant::now();

        let err = svc.analyze("a transcript", &[]).await.unwrap_err();

        assert!(matches!(err, Error::RateLimited));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        // No sleep after the final attempt.
        assert_eq!(started.elapsed(), Duration::from_secs(6));
    }

    #[tokio::test(start_paused = true)]
    async fn test_payment_failure_is_terminal() {
        let (provider, calls) = ScriptedProvider::new(vec![Err(Error::InsufficientCredits)]);
        let svc = service(provider);
        let started = tokio::time::Instant::now();

        let err = svc.analyze("a transcript", &[]).await.unwrap_err();

        assert!(matches!(err, Error::InsufficientCredits));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(started.elapsed(), Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn test_bad_gateway_maps_to_retryable_overload() {
        let (provider, calls) = ScriptedProvider::new(vec![
            Err(Error::ServiceOverloaded(502)),
            Err(Error::ServiceOverloaded(503)),
            Ok(STRUCTURED_RESPONSE.to_string()),
        ]);
        let svc = service(provider);

        svc.analyze("gateway trouble", &[]).await.unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }
}

// ============================================================================
// Lifecycle events over the bus
// ============================================================================

mod event_stream {
    use super::*;

    fn drain(rx: &mut tokio::sync::broadcast::Receiver<AnalysisEvent>) -> Vec<AnalysisEvent> {
        let mut events = Vec::new();
        while let Ok(event) = rx.try_recv() {
            events.push(event);
        }
        events
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_events_carry_linear_delays() {
        let bus = EventBus::new(64);
        let mut rx = bus.subscribe();
        let (provider, _) = ScriptedProvider::new(vec![
            Err(Error::RateLimited),
            Err(Error::ServiceOverloaded(529)),
            Ok(STRUCTURED_RESPONSE.to_string()),
        ]);
        let svc = AnalysisService::new(provider, RetryPolicy::default()).with_event_bus(bus);

        svc.analyze("hold on", &[]).await.unwrap();

        let events = drain(&mut rx);
        let delays: Vec<(u32, u64, &'static str)> = events
            .iter()
            .filter_map(|event| match event {
                AnalysisEvent::RetryScheduled {
                    attempt,
                    delay_ms,
                    reason,
                    ..
                } => Some((*attempt, *delay_ms, *reason)),
                _ => None,
            })
            .collect();

        assert_eq!(
            delays,
            vec![(1, 2_000, "rate_limited"), (2, 4_000, "service_overloaded")]
        );
    }

    #[tokio::test]
    async fn test_attempts_and_completion_are_announced() {
        let bus = EventBus::new(64);
        let mut rx = bus.subscribe();
        let (provider, _) = ScriptedProvider::new(vec![Ok(STRUCTURED_RESPONSE.to_string())]);
        let svc = AnalysisService::new(provider, RetryPolicy::default()).with_event_bus(bus);

        svc.analyze("a fine day", &[]).await.unwrap();

        let events = drain(&mut rx);
        let types: Vec<&'static str> = events.iter().map(AnalysisEvent::event_type).collect();
        assert_eq!(types, vec!["analysis.attempt_started", "analysis.completed"]);

        match events.last().unwrap() {
            AnalysisEvent::Completed { degraded, .. } => assert!(!degraded),
            other => panic!("expected Completed, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_degraded_completion_is_flagged() {
        let bus = EventBus::new(64);
        let mut rx = bus.subscribe_event_type("analysis.completed");
        let (provider, _) =
            ScriptedProvider::new(vec![Ok("{ not even close to json }".to_string())]);
        let svc = AnalysisService::new(provider, RetryPolicy::default()).with_event_bus(bus);

        svc.analyze("a foggy day", &[]).await.unwrap();

        match rx.recv().await.unwrap() {
            AnalysisEvent::Completed { degraded, .. } => assert!(degraded),
            other => panic!("expected Completed, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_events_share_one_correlation_id() {
        let bus = EventBus::new(64);
        let mut rx = bus.subscribe();
        let (provider, _) = ScriptedProvider::new(vec![Ok(STRUCTURED_RESPONSE.to_string())]);
        let svc = AnalysisService::new(provider, RetryPolicy::default()).with_event_bus(bus);

        svc.analyze("one request", &[]).await.unwrap();

        let events = drain(&mut rx);
        assert!(events.len() >= 2);
        let ids: Vec<Option<String>> = events
            .iter()
            .map(|event| event.meta().correlation_id.clone())
            .collect();
        assert!(ids[0].is_some());
        assert!(ids.iter().all(|id| id == &ids[0]));
    }
}

// ============================================================================
// Prompt assembly observed through the provider
// ============================================================================

mod prompt_context {
    use super::*;

    async fn captured_prompt(transcript: &str, history: &[JournalEntry]) -> String {
        let (provider, prompts) = CapturingProvider::new(STRUCTURED_RESPONSE);
        let svc = service(provider);
        svc.analyze(transcript, history).await.unwrap();
        let captured = prompts.lock().unwrap();
        assert_eq!(captured.len(), 1);
        captured[0].clone()
    }

    #[tokio::test]
    async fn test_system_persona_travels_with_every_request() {
        let prompt = captured_prompt("just checking in", &[]).await;

        // The default trait plumbing folds the system prompt into the request.
        assert!(prompt.contains("wise mentor"));
        assert!(prompt.contains(r#"Always open with "Hey, thanks for sharing""#));
        assert!(prompt.contains("Here's their voice note transcript:"));
    }

    #[tokio::test]
    async fn test_empty_history_omits_the_patterns_block() {
        let prompt = captured_prompt("first entry ever", &[]).await;

        assert!(!prompt.contains("Recent emotional patterns"));
        assert!(!prompt.contains("Pay attention to"));
        assert!(prompt.contains("**Current entry:**\n\"first entry ever\""));
    }

    #[tokio::test]
    async fn test_history_quotes_only_the_five_newest_entries() {
        // Newest first, one hour apart.
        let history: Vec<JournalEntry> = (0..7i64)
            .map(|i| {
                entry_at(
                    june_2nd(18, 0) - chrono::Duration::hours(i),
                    "tired",
                    &format!("summary number {i}"),
                    "",
                )
            })
            .collect();

        let prompt = captured_prompt("another long day", &history).await;

        assert!(prompt.contains("Recent emotional patterns"));
        for i in 0..5 {
            assert!(prompt.contains(&format!("summary number {i}")), "missing entry {i}");
        }
        assert!(!prompt.contains("summary number 5"));
        assert!(!prompt.contains("summary number 6"));
    }

    #[tokio::test]
    async fn test_long_analysis_is_snipped_into_context_lines() {
        let long_analysis = "x".repeat(400);
        let history = vec![entry_at(
            june_2nd(9, 0),
            "anxious",
            "deadline worries",
            &long_analysis,
        )];

        let prompt = captured_prompt("more of the same", &history).await;

        let context_line = prompt
            .lines()
            .find(|line| line.trim_start().starts_with("Context:"))
            .expect("context line present");
        assert!(context_line.ends_with("..."));
        // 100 chars of snippet, not the whole 400.
        assert!(context_line.len() < 120);
    }
}

// ============================================================================
// Pattern aggregation over realistic histories
// ============================================================================

mod pattern_aggregation {
    use super::*;

    #[test]
    fn test_morning_anxiety_is_detected_with_trigger() {
        let entries = vec![
            entry_at(
                june_2nd(7, 30),
                "anxious",
                "worried before standup",
                "Hey, thanks for sharing. The deadline is clearly weighing on you.",
            ),
            entry_at(
                june_2nd(8, 45),
                "anxious",
                "inbox dread",
                "Hey, thanks for sharing. Work keeps pulling your attention.",
            ),
            entry_at(
                june_2nd(10, 15),
                "anxious",
                "meeting nerves",
                "Hey, thanks for sharing. That meeting loomed large.",
            ),
            entry_at(june_2nd(20, 0), "calm", "quieter evening", ""),
        ];
        let service = PatternService::new();

        let analysis = service.analyze(&entries, june_2nd(22, 0));

        assert!(analysis.has_significant_patterns());
        assert_eq!(analysis.daily.len(), 1);
        let pattern = &analysis.daily[0];
        assert_eq!(pattern.emotion, "anxious");
        assert_eq!(pattern.frequency, 3);
        assert_eq!(pattern.time_range, TimeRange::Today);
        assert!(pattern.insights.iter().any(|i| i.contains("frequently today")));
        assert!(pattern.insights.iter().any(|i| i.contains("in the morning")));
        assert_eq!(pattern.triggers, vec!["work-related".to_string()]);
    }

    #[test]
    fn test_windows_widen_from_day_to_month() {
        let now = june_2nd(12, 0);
        let entries = vec![
            // Two stressed entries today.
            entry_at(june_2nd(8, 0), "stressed", "s", ""),
            entry_at(june_2nd(10, 0), "stressed", "s", ""),
            // Two calm entries five days ago.
            entry_at(now - chrono::Duration::days(5), "calm", "s", ""),
            entry_at(now - chrono::Duration::days(5) + chrono::Duration::hours(2), "calm", "s", ""),
            // Two grateful entries three weeks ago.
            entry_at(now - chrono::Duration::days(21), "grateful", "s", ""),
            entry_at(now - chrono::Duration::days(21) + chrono::Duration::hours(3), "grateful", "s", ""),
        ];
        let service = PatternService::new();

        let analysis = service.analyze(&entries, now);

        let daily: Vec<&str> = analysis.daily.iter().map(|p| p.emotion.as_str()).collect();
        let weekly: Vec<&str> = analysis.weekly.iter().map(|p| p.emotion.as_str()).collect();
        let monthly: Vec<&str> = analysis.monthly.iter().map(|p| p.emotion.as_str()).collect();

        assert_eq!(daily, vec!["stressed"]);
        assert_eq!(weekly, vec!["calm", "stressed"]);
        assert_eq!(monthly, vec!["calm", "grateful", "stressed"]);
    }

    #[test]
    fn test_single_occurrences_never_form_patterns() {
        let entries = vec![
            entry_at(june_2nd(8, 0), "joy", "s", ""),
            entry_at(june_2nd(12, 0), "sad", "s", ""),
            entry_at(june_2nd(18, 0), "tired", "s", ""),
        ];
        let service = PatternService::new();

        let analysis = service.analyze(&entries, june_2nd(22, 0));

        assert!(analysis.daily.is_empty());
        assert!(!analysis.has_significant_patterns());
        // Three entries still make a trajectory even with no recurring emotion.
        assert!(analysis.trajectory.is_some());
    }

    #[test]
    fn test_trajectory_tracks_a_recovery_day() {
        let entries = vec![
            entry_at(june_2nd(8, 0), "anxious", "rough start", ""),
            entry_at(june_2nd(8, 40), "calm", "walked it off", ""),
            entry_at(june_2nd(19, 0), "content", "good dinner", ""),
        ];
        let service = PatternService::new();

        let trajectory = service
            .trajectory(&entries, june_2nd(22, 0))
            .expect("three entries today");

        assert_eq!(trajectory.changes.len(), 2);
        assert_eq!(trajectory.changes[0].from_emotion, "anxious");
        assert_eq!(trajectory.changes[0].to_emotion, "calm");
        // anxious -> calm inside an hour counts as a recovery.
        assert!(
            trajectory
                .insights
                .iter()
                .any(|i| i.contains("resilience"))
        );
        assert!(
            trajectory
                .insights
                .iter()
                .any(|i| i.contains("positive direction"))
        );
    }

    #[test]
    fn test_trajectory_needs_three_entries_today() {
        let entries = vec![
            entry_at(june_2nd(8, 0), "anxious", "s", ""),
            entry_at(june_2nd(12, 0), "calm", "s", ""),
            // Third entry is yesterday, so it does not count.
            entry_at(june_2nd(8, 0) - chrono::Duration::days(1), "calm", "s", ""),
        ];
        let service = PatternService::new();

        assert!(service.trajectory(&entries, june_2nd(22, 0)).is_none());
    }

    #[test]
    fn test_recent_emotion_context_reads_naturally() {
        let entries = vec![entry_at(june_2nd(9, 0), "anxious", "s", "")];
        let service = PatternService::new();

        let line = service
            .recent_emotion_context(&entries, "Anxious", june_2nd(12, 0))
            .expect("emotion present in history");

        assert_eq!(line, "You last felt anxious 3 hours ago");
    }
}

// ============================================================================
// Provider construction
// ============================================================================

mod provider_config {
    use super::*;
    use secrecy::SecretString;
    use undertone::{AnthropicClient, OpenAiClient};

    #[test]
    fn test_anthropic_client_builder() {
        let client = AnthropicClient::new(SecretString::from("sk-ant-test".to_string()))
            .with_endpoint("https://test.anthropic.com/v1")
            .with_model("claude-3-opus-20240229");

        assert_eq!(client.name(), "anthropic");
    }

    #[test]
    fn test_openai_client_builder() {
        let client = OpenAiClient::new(SecretString::from("sk-proj-test".to_string()))
            .with_endpoint("https://test.openai.com/v1")
            .with_model("gpt-4-turbo");

        assert_eq!(client.name(), "openai");
    }

    #[tokio::test]
    async fn test_blank_keys_fail_before_any_network_io() {
        let anthropic = AnthropicClient::new(SecretString::from(String::new()));
        let openai = OpenAiClient::new(SecretString::from(String::new()));

        assert!(matches!(
            anthropic.complete("hi").await.unwrap_err(),
            Error::ConfigurationMissing { .. }
        ));
        assert!(matches!(
            openai.complete("hi").await.unwrap_err(),
            Error::ConfigurationMissing { .. }
        ));
    }
}
