//! Data models for undertone.
//!
//! This module contains all the core data structures used throughout the system.

mod analysis;
mod entry;
mod events;
mod pattern;

pub use analysis::AnalysisResult;
pub use entry::JournalEntry;
pub use events::{AnalysisEvent, EventMeta};
pub use pattern::{
    EmotionChange, EmotionPattern, EmotionalTrajectory, PatternAnalysis, TimeRange,
};
