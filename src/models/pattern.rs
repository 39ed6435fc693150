//! Emotion pattern aggregates computed over windows of journal history.

use std::collections::HashMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Window of history a pattern was computed over.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TimeRange {
    /// Entries recorded since local midnight.
    Today,
    /// Entries recorded in the last seven days.
    ThisWeek,
    /// Entries recorded in the last thirty days.
    ThisMonth,
}

impl TimeRange {
    /// Canonical machine-readable name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Today => "today",
            Self::ThisWeek => "this_week",
            Self::ThisMonth => "this_month",
        }
    }

    /// Human-readable label for display.
    #[must_use]
    pub const fn display_name(self) -> &'static str {
        match self {
            Self::Today => "Today",
            Self::ThisWeek => "This Week",
            Self::ThisMonth => "This Month",
        }
    }
}

impl fmt::Display for TimeRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A recurring emotion inside one time range.
///
/// Only emotions that occurred at least twice in the window become patterns.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmotionPattern {
    /// Unique identifier for this pattern.
    pub id: Uuid,
    /// The recurring emotion, as recorded on the entries.
    pub emotion: String,
    /// How many entries in the window carried this emotion.
    pub frequency: usize,
    /// The window the pattern was computed over.
    pub time_range: TimeRange,
    /// Human-readable observations about the pattern.
    pub insights: Vec<String>,
    /// Trigger categories inferred from the entries' analysis text.
    pub triggers: Vec<String>,
}

impl EmotionPattern {
    /// Creates a pattern with a fresh identifier.
    #[must_use]
    pub fn new(
        emotion: impl Into<String>,
        frequency: usize,
        time_range: TimeRange,
        insights: Vec<String>,
        triggers: Vec<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            emotion: emotion.into(),
            frequency,
            time_range,
            insights,
            triggers,
        }
    }
}

/// One transition between consecutive differing emotions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmotionChange {
    /// Emotion before the transition.
    pub from_emotion: String,
    /// Emotion after the transition.
    pub to_emotion: String,
    /// Seconds between the two entries.
    pub elapsed_secs: i64,
}

/// How the day's emotions moved, built from three or more entries.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmotionalTrajectory {
    /// Unique identifier for this trajectory.
    pub id: Uuid,
    /// When the trajectory was computed.
    pub date: DateTime<Utc>,
    /// Most frequent emotion across the inputs.
    pub dominant_emotion: String,
    /// Transitions between consecutive differing emotions, in time order.
    pub changes: Vec<EmotionChange>,
    /// Human-readable observations about the day.
    pub insights: Vec<String>,
}

/// Patterns across all three windows plus the day's trajectory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PatternAnalysis {
    /// Patterns among today's entries.
    pub daily: Vec<EmotionPattern>,
    /// Patterns over the last seven days.
    pub weekly: Vec<EmotionPattern>,
    /// Patterns over the last thirty days.
    pub monthly: Vec<EmotionPattern>,
    /// Today's trajectory, when at least three entries exist for today.
    pub trajectory: Option<EmotionalTrajectory>,
}

impl PatternAnalysis {
    /// Whether any window produced at least one pattern.
    #[must_use]
    pub fn has_significant_patterns(&self) -> bool {
        !self.daily.is_empty() || !self.weekly.is_empty() || !self.monthly.is_empty()
    }

    /// The emotion with the highest summed frequency across all windows.
    ///
    /// Ties resolve to the lexicographically smaller emotion so output is
    /// stable across runs.
    #[must_use]
    pub fn most_frequent_emotion(&self) -> Option<&str> {
        let mut totals: HashMap<&str, usize> = HashMap::new();
        for pattern in self
            .daily
            .iter()
            .chain(self.weekly.iter())
            .chain(self.monthly.iter())
        {
            *totals.entry(pattern.emotion.as_str()).or_insert(0) += pattern.frequency;
        }
        totals
            .into_iter()
            .max_by(|a, b| a.1.cmp(&b.1).then_with(|| b.0.cmp(a.0)))
            .map(|(emotion, _)| emotion)
    }
}
