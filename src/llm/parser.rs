//! Extracts a structured analysis out of free-text model output.
//!
//! Models wrap their JSON in prose, markdown, or stray braces often enough
//! that extraction happens in two stages: a depth-aware scan for the first
//! balanced object, then the first-`{`-to-last-`}` heuristic when no balanced
//! object exists. A payload that still fails to deserialize yields a degraded
//! fallback result rather than an error, so a paid model response is never
//! discarded outright.

use serde::Deserialize;

use crate::models::AnalysisResult;
use crate::{Error, Result};

const FALLBACK_EMOTION: &str = "reflective";
const FALLBACK_SUMMARY: &str = "Processing your thoughts";
const FALLBACK_ANALYSIS_CHARS: usize = 500;
const FALLBACK_SUGGESTIONS: [&str; 3] = [
    "Take a moment to breathe",
    "Consider what you're feeling",
    "Be gentle with yourself",
];

/// Outcome of parsing one model response.
#[derive(Debug, Clone)]
pub struct ParsedAnalysis {
    /// The structured result.
    pub result: AnalysisResult,
    /// Whether the degraded fallback was used instead of the model's JSON.
    pub degraded: bool,
}

/// Shape the model is instructed to produce.
#[derive(Debug, Deserialize)]
struct AnalysisPayload {
    emotion: String,
    summary: String,
    analysis: String,
    suggestions: Vec<String>,
}

impl AnalysisPayload {
    fn into_result(self) -> AnalysisResult {
        AnalysisResult::new(
            self.emotion.trim().to_lowercase(),
            self.summary,
            self.analysis,
            self.suggestions,
        )
    }
}

/// Parses a model response into an analysis result.
///
/// # Errors
///
/// Returns `Error::InvalidJsonResponse` only when no JSON object can be
/// located at all. A located but malformed payload becomes a degraded
/// fallback result instead.
pub fn parse_analysis(raw: &str) -> Result<ParsedAnalysis> {
    let span = extract_json_span(raw)?;
    match serde_json::from_str::<AnalysisPayload>(span) {
        Ok(payload) => {
            metrics::counter!("analysis_parse_total", "outcome" => "structured").increment(1);
            Ok(ParsedAnalysis {
                result: payload.into_result(),
                degraded: false,
            })
        }
        Err(err) => {
            metrics::counter!("analysis_parse_total", "outcome" => "fallback").increment(1);
            tracing::warn!(
                error = %err,
                span_len = span.len(),
                "model payload did not match the expected shape, using fallback"
            );
            Ok(ParsedAnalysis {
                result: fallback_result(raw),
                degraded: true,
            })
        }
    }
}

/// Locates the JSON object span inside free text.
fn extract_json_span(text: &str) -> Result<&str> {
    let start = text.find('{').ok_or_else(|| {
        Error::InvalidJsonResponse("no opening brace in response".to_string())
    })?;
    let end = text.rfind('}').ok_or_else(|| {
        Error::InvalidJsonResponse("no closing brace in response".to_string())
    })?;
    if end < start {
        return Err(Error::InvalidJsonResponse(
            "closing brace precedes opening brace".to_string(),
        ));
    }

    // Prefer the first balanced object; trailing prose with stray braces
    // would otherwise corrupt the naive span.
    if let Some(span) = balanced_object(&text[start..]) {
        return Ok(span);
    }
    Ok(&text[start..=end])
}

/// Scans for the first balanced `{...}`, honoring string literals and escapes.
fn balanced_object(text: &str) -> Option<&str> {
    let mut depth: usize = 0;
    let mut in_string = false;
    let mut escaped = false;

    for (index, ch) in text.char_indices() {
        if escaped {
            escaped = false;
            continue;
        }
        match ch {
            '\\' if in_string => escaped = true,
            '"' => in_string = !in_string,
            '{' if !in_string => depth += 1,
            '}' if !in_string => {
                depth = depth.saturating_sub(1);
                if depth == 0 {
                    return Some(&text[..=index]);
                }
            }
            _ => {}
        }
    }
    None
}

/// Builds the degraded result when a located payload cannot be deserialized.
fn fallback_result(raw: &str) -> AnalysisResult {
    AnalysisResult::new(
        FALLBACK_EMOTION,
        FALLBACK_SUMMARY,
        truncate_chars(raw, FALLBACK_ANALYSIS_CHARS),
        FALLBACK_SUGGESTIONS.iter().map(|s| (*s).to_string()).collect(),
    )
}

fn truncate_chars(text: &str, limit: usize) -> String {
    if text.chars().count() <= limit {
        text.to_string()
    } else {
        let mut truncated: String = text.chars().take(limit).collect();
        truncated.push_str("...");
        truncated
    }
}
