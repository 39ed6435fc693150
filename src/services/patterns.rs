//! Emotion pattern and trajectory aggregation.
//!
//! Pure computation over journal entries: no storage access and no provider
//! calls. Callers pass the reference time explicitly, so the same history
//! always yields the same analysis. Windows and hour buckets are evaluated
//! in UTC.

use std::collections::HashMap;

use chrono::{DateTime, Duration, NaiveTime, Timelike, Utc};
use uuid::Uuid;

use crate::models::{
    EmotionChange, EmotionPattern, EmotionalTrajectory, JournalEntry, PatternAnalysis, TimeRange,
};

/// Occurrences of one emotion in a window before it counts as a pattern.
const MIN_PATTERN_OCCURRENCES: usize = 2;

/// Occurrences in one hour bucket before the time-of-day insight fires.
const MIN_BUCKET_OCCURRENCES: usize = 2;

/// Occurrences today before the frequency insight fires.
const FREQUENT_TODAY_THRESHOLD: usize = 3;

/// Group size at which the recurrence insight fires.
const RECURRING_THRESHOLD: usize = 3;

/// Entries required today before a trajectory is computed.
const MIN_TRAJECTORY_ENTRIES: usize = 3;

/// Emotion changes counting as "several shifts" in one day.
const SEVERAL_SHIFTS_THRESHOLD: usize = 3;

/// Upper bound for a negative-to-positive transition to count as a recovery.
const QUICK_RECOVERY_SECS: i64 = 3600;

/// Most trigger categories reported per pattern.
const MAX_TRIGGERS: usize = 3;

/// Emotions treated as positive for trajectory insights.
const POSITIVE_EMOTIONS: [&str; 7] = [
    "joy", "happy", "content", "calm", "peaceful", "excited", "grateful",
];

/// Emotions treated as negative for trajectory insights.
const NEGATIVE_EMOTIONS: [&str; 6] = [
    "sad", "angry", "anxious", "frustrated", "stressed", "worried",
];

/// Trigger categories and the keywords that select them, scanned in order.
const TRIGGER_CATEGORIES: [(&str, [&str; 3]); 4] = [
    ("work-related", ["work", "deadline", "meeting"]),
    ("relationships", ["relationship", "friend", "family"]),
    ("financial", ["money", "financial", "budget"]),
    ("health/energy", ["health", "tired", "sleep"]),
];

/// Aggregates journal history into recurring emotion patterns and a daily
/// trajectory.
#[derive(Debug, Clone, Copy)]
pub struct PatternService;

#[allow(clippy::unused_self)]
impl PatternService {
    /// Creates a new pattern service.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    /// Computes patterns for all three windows plus today's trajectory.
    #[must_use]
    pub fn analyze(&self, entries: &[JournalEntry], now: DateTime<Utc>) -> PatternAnalysis {
        PatternAnalysis {
            daily: self.emotion_patterns(entries, TimeRange::Today, now),
            weekly: self.emotion_patterns(entries, TimeRange::ThisWeek, now),
            monthly: self.emotion_patterns(entries, TimeRange::ThisMonth, now),
            trajectory: self.trajectory(entries, now),
        }
    }

    /// Groups one window's entries by emotion and keeps the recurring ones.
    ///
    /// Emotions occurring fewer than [`MIN_PATTERN_OCCURRENCES`] times in the
    /// window are dropped. Output is sorted by frequency descending, then
    /// emotion ascending, so the same history always renders the same way.
    #[must_use]
    pub fn emotion_patterns(
        &self,
        entries: &[JournalEntry],
        range: TimeRange,
        now: DateTime<Utc>,
    ) -> Vec<EmotionPattern> {
        let mut groups: HashMap<String, Vec<&JournalEntry>> = HashMap::new();
        for entry in entries
            .iter()
            .filter(|e| in_window(e.timestamp, range, now))
        {
            let emotion = entry.primary_emotion.trim().to_lowercase();
            if emotion.is_empty() {
                continue;
            }
            groups.entry(emotion).or_default().push(entry);
        }

        let mut patterns: Vec<EmotionPattern> = groups
            .into_iter()
            .filter(|(_, group)| group.len() >= MIN_PATTERN_OCCURRENCES)
            .map(|(emotion, group)| {
                let insights = emotion_insights(&emotion, &group, range);
                let triggers = identify_triggers(&group);
                EmotionPattern::new(emotion, group.len(), range, insights, triggers)
            })
            .collect();

        patterns.sort_by(|a, b| {
            b.frequency
                .cmp(&a.frequency)
                .then_with(|| a.emotion.cmp(&b.emotion))
        });
        patterns
    }

    /// Builds today's emotional trajectory, when today has enough entries.
    ///
    /// Returns `None` for fewer than [`MIN_TRAJECTORY_ENTRIES`] entries today.
    /// Entries are ordered chronologically and each adjacent pair with
    /// differing emotions becomes one [`EmotionChange`].
    #[must_use]
    pub fn trajectory(
        &self,
        entries: &[JournalEntry],
        now: DateTime<Utc>,
    ) -> Option<EmotionalTrajectory> {
        let mut today: Vec<&JournalEntry> = entries
            .iter()
            .filter(|e| in_window(e.timestamp, TimeRange::Today, now))
            .collect();
        if today.len() < MIN_TRAJECTORY_ENTRIES {
            return None;
        }
        today.sort_by_key(|e| e.timestamp);

        let mut changes = Vec::new();
        for pair in today.windows(2) {
            let from = pair[0].primary_emotion.trim().to_lowercase();
            let to = pair[1].primary_emotion.trim().to_lowercase();
            if from == to || from.is_empty() || to.is_empty() {
                continue;
            }
            changes.push(EmotionChange {
                from_emotion: from,
                to_emotion: to,
                elapsed_secs: (pair[1].timestamp - pair[0].timestamp).num_seconds(),
            });
        }

        let insights = trajectory_insights(&changes);

        Some(EmotionalTrajectory {
            id: Uuid::new_v4(),
            date: now,
            dominant_emotion: dominant_emotion(&today),
            changes,
            insights,
        })
    }

    /// Describes when the given emotion was last recorded.
    ///
    /// Returns `None` when no entry carries the emotion. The result is a
    /// ready-to-display line such as `You last felt anxious 3 hours ago`.
    #[must_use]
    pub fn recent_emotion_context(
        &self,
        entries: &[JournalEntry],
        emotion: &str,
        now: DateTime<Utc>,
    ) -> Option<String> {
        let wanted = emotion.trim().to_lowercase();
        if wanted.is_empty() {
            return None;
        }
        let most_recent = entries
            .iter()
            .filter(|e| e.primary_emotion.trim().to_lowercase() == wanted)
            .map(|e| e.timestamp)
            .max()?;
        let elapsed = (now - most_recent).num_seconds().max(0);
        Some(format!(
            "You last felt {wanted} {}",
            long_relative_time(elapsed)
        ))
    }
}

impl Default for PatternService {
    fn default() -> Self {
        Self::new()
    }
}

/// Start of the UTC day containing `now`.
fn start_of_day(now: DateTime<Utc>) -> DateTime<Utc> {
    now.date_naive().and_time(NaiveTime::MIN).and_utc()
}

fn in_window(timestamp: DateTime<Utc>, range: TimeRange, now: DateTime<Utc>) -> bool {
    if timestamp > now {
        return false;
    }
    match range {
        TimeRange::Today => timestamp >= start_of_day(now),
        TimeRange::ThisWeek => timestamp >= now - Duration::days(7),
        TimeRange::ThisMonth => timestamp >= now - Duration::days(30),
    }
}

/// Builds the insight lines for one recurring emotion.
fn emotion_insights(emotion: &str, group: &[&JournalEntry], range: TimeRange) -> Vec<String> {
    let mut insights = Vec::new();

    if group.len() >= FREQUENT_TODAY_THRESHOLD && range == TimeRange::Today {
        insights.push(format!("You've been feeling {emotion} frequently today"));
    }

    if let Some(bucket) = dominant_time_bucket(group) {
        insights.push(format!("You tend to feel {emotion} in the {bucket}"));
    }

    if group.len() >= RECURRING_THRESHOLD {
        insights.push("This emotion has been recurring over time".to_string());
    }

    insights
}

/// The hour bucket holding at least [`MIN_BUCKET_OCCURRENCES`] entries and
/// strictly more than every other bucket. Ties yield `None`.
fn dominant_time_bucket(group: &[&JournalEntry]) -> Option<&'static str> {
    let mut counts: HashMap<&'static str, usize> = HashMap::new();
    for entry in group {
        *counts
            .entry(time_of_day(entry.timestamp.hour()))
            .or_insert(0) += 1;
    }

    let (bucket, count) = counts
        .iter()
        .max_by_key(|(_, count)| **count)
        .map(|(bucket, count)| (*bucket, *count))?;
    if count < MIN_BUCKET_OCCURRENCES {
        return None;
    }
    let tied = counts.values().filter(|&&c| c == count).count();
    if tied > 1 {
        return None;
    }
    Some(bucket)
}

/// Buckets an hour of day into a named period.
const fn time_of_day(hour: u32) -> &'static str {
    match hour {
        6..=11 => "morning",
        12..=16 => "afternoon",
        17..=21 => "evening",
        _ => "night",
    }
}

/// Scans the group's analysis text for known trigger categories.
///
/// Categories are reported in declaration order, at most [`MAX_TRIGGERS`]
/// of them.
fn identify_triggers(group: &[&JournalEntry]) -> Vec<String> {
    let texts: Vec<String> = group.iter().map(|e| e.analysis.to_lowercase()).collect();

    let mut triggers = Vec::new();
    for (label, keywords) in TRIGGER_CATEGORIES {
        let matched = texts
            .iter()
            .any(|text| keywords.iter().any(|kw| text.contains(kw)));
        if matched {
            triggers.push(label.to_string());
            if triggers.len() == MAX_TRIGGERS {
                break;
            }
        }
    }
    triggers
}

/// Most frequent emotion across the entries, ties resolving to the
/// lexicographically smaller name.
fn dominant_emotion(entries: &[&JournalEntry]) -> String {
    let mut counts: HashMap<String, usize> = HashMap::new();
    for entry in entries {
        let emotion = entry.primary_emotion.trim().to_lowercase();
        if emotion.is_empty() {
            continue;
        }
        *counts.entry(emotion).or_insert(0) += 1;
    }
    counts
        .into_iter()
        .max_by(|a, b| a.1.cmp(&b.1).then_with(|| b.0.cmp(&a.0)))
        .map_or_else(|| "mixed".to_string(), |(emotion, _)| emotion)
}

/// Qualitative observations derived from the day's emotion changes.
fn trajectory_insights(changes: &[EmotionChange]) -> Vec<String> {
    let mut insights = Vec::new();

    if changes.is_empty() {
        insights.push("Your emotional state has been consistent today".to_string());
    } else if changes.len() >= SEVERAL_SHIFTS_THRESHOLD {
        insights.push("You've experienced several emotional shifts today".to_string());
    }

    let ends_positively = changes
        .last()
        .is_some_and(|change| is_positive(&change.to_emotion));
    if ends_positively {
        insights.push("It looks like things have shifted in a positive direction".to_string());
    }

    let quick_recovery = changes.iter().any(|change| {
        is_negative(&change.from_emotion)
            && is_positive(&change.to_emotion)
            && change.elapsed_secs < QUICK_RECOVERY_SECS
    });
    if quick_recovery {
        insights.push("You showed good emotional resilience today".to_string());
    }

    insights
}

fn is_positive(emotion: &str) -> bool {
    POSITIVE_EMOTIONS.contains(&emotion)
}

fn is_negative(emotion: &str) -> bool {
    NEGATIVE_EMOTIONS.contains(&emotion)
}

/// Formats elapsed seconds in long units for context lines.
fn long_relative_time(elapsed_secs: i64) -> String {
    if elapsed_secs < 3600 {
        format!("{} minutes ago", elapsed_secs / 60)
    } else if elapsed_secs < 86_400 {
        format!("{} hours ago", elapsed_secs / 3600)
    } else {
        format!("{} days ago", elapsed_secs / 86_400)
    }
}
