//! Structured result of a single journal analysis.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// What the model said about one transcript.
///
/// Exactly one result is produced per analyzed transcript, whether the model
/// payload parsed cleanly or the degraded fallback was used.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnalysisResult {
    /// Unique identifier for this result.
    pub id: Uuid,
    /// Single lowercase word naming the dominant emotion.
    pub primary_emotion: String,
    /// Short summary of the entry (the prompt asks for 15-20 words).
    pub summary: String,
    /// Conversational reflection, multiple paragraphs.
    pub analysis: String,
    /// Suggested actions (the prompt asks for 2-4).
    pub suggestions: Vec<String>,
}

impl AnalysisResult {
    /// Creates a result with a fresh identifier.
    #[must_use]
    pub fn new(
        primary_emotion: impl Into<String>,
        summary: impl Into<String>,
        analysis: impl Into<String>,
        suggestions: Vec<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            primary_emotion: primary_emotion.into(),
            summary: summary.into(),
            analysis: analysis.into(),
            suggestions,
        }
    }

    /// Renders the result as shareable plain text.
    #[must_use]
    pub fn to_share_text(&self, timestamp: DateTime<Utc>) -> String {
        let mut text = format!(
            "Reflection - {}\n\nEmotion: {}\nSummary: {}\n\nAnalysis:\n{}\n\nSuggested Actions:\n",
            timestamp.format("%Y-%m-%d %H:%M UTC"),
            capitalize(&self.primary_emotion),
            self.summary,
            self.analysis,
        );
        for suggestion in &self.suggestions {
            text.push_str("\u{2022} ");
            text.push_str(suggestion);
            text.push('\n');
        }
        text.push_str("\n---\nCreated with undertone");
        text
    }
}

fn capitalize(word: &str) -> String {
    let mut chars = word.chars();
    chars.next().map_or_else(String::new, |first| {
        first.to_uppercase().collect::<String>() + chars.as_str()
    })
}
