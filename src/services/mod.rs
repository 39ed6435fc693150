//! Business logic services.
//!
//! Services orchestrate the LLM provider layer and provide high-level operations.

mod analysis;
mod patterns;

pub use analysis::{AnalysisService, MAX_HISTORY_ENTRIES};
pub use patterns::PatternService;
