//! Persisted journal entries, read back for prompt context and pattern analysis.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::AnalysisResult;

/// One recorded journal session: the transcript plus the analysis it received.
///
/// History files hold arrays of these, newest first. Persistence itself is the
/// caller's concern; this crate only reads entries for context and writes them
/// back when asked to record a session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JournalEntry {
    /// Unique identifier for this entry.
    pub id: Uuid,
    /// When the entry was recorded.
    pub timestamp: DateTime<Utc>,
    /// Raw transcript of the voice note.
    pub transcript: String,
    /// Single lowercase word naming the dominant emotion.
    pub primary_emotion: String,
    /// Short summary from the analysis.
    pub summary: String,
    /// Full reflection text from the analysis.
    pub analysis: String,
    /// Suggested actions from the analysis.
    #[serde(default)]
    pub suggestions: Vec<String>,
}

impl JournalEntry {
    /// Builds an entry from a finished analysis, as recorded after a session.
    #[must_use]
    pub fn from_analysis(
        transcript: impl Into<String>,
        result: &AnalysisResult,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            timestamp,
            transcript: transcript.into(),
            primary_emotion: result.primary_emotion.clone(),
            summary: result.summary.clone(),
            analysis: result.analysis.clone(),
            suggestions: result.suggestions.clone(),
        }
    }
}
