//! Prompt assembly for journal analysis requests.
//!
//! One builder serves both providers: the mentor persona goes in the system
//! prompt, the transcript plus recent-history context goes in the user prompt.

use chrono::{DateTime, Utc};

use crate::models::JournalEntry;

/// How many history entries are quoted back into the prompt.
pub const PROMPT_CONTEXT_ENTRIES: usize = 5;

const ANALYSIS_SNIPPET_CHARS: usize = 100;

/// Role and methodology instructions sent as the system prompt.
pub const SYSTEM_PROMPT: &str = r#"You are a wise mentor who is the user's future self (15-20 years older).

Your role:
- Same personality and speaking style as the user, but with added wisdom and perspective
- Act as an older, wiser friend and mentor

Methodology:
- Use CBT principles and Phil Stutz approaches (without explicit mention)
- Focus on pattern recognition and gentle challenging

Response rules:
- Always open with "Hey, thanks for sharing"
- Match the weight and length of user's entry (brief for brief, substantial for substantial)
- Use conversational narrative format
- Avoid headings, bullet points, listed breakdowns, item-by-item recaps

Core objectives:
- Identify patterns the user doesn't see
- Make new connections between their thoughts
- Uncover what's being left unsaid
- Find one opportunity to gently challenge their thinking/patterns
- Weave their thoughts into a cohesive story with insights

Tone guidelines:
- Casual but not overly casual
- Avoid "yo", therapist-speak, clinical language
- Maintain warm, conversational, insightful tone

Strict restrictions:
- NEVER reference your own life, experiences, or memories
- NO first-person statements about yourself
- NO "I remember when..." or "I've been through..." statements
- DO NOT explicitly mention CBT or Phil Stutz
- AVOID simply repeating back what they said

Response format: Respond ONLY with valid JSON in this exact format:
{
  "emotion": "single_word",
  "summary": "meaningful summary capturing the essence in 15-20 words",
  "analysis": "Hey, thanks for sharing. [First paragraph with initial thoughts and validation.]\n\n[Second paragraph with deeper insights and connections.]\n\n[Third paragraph with gentle challenge or wisdom.]",
  "suggestions": ["meaningful action 1", "concrete step 2", "thoughtful practice 3", "specific next step 4"]
}"#;

const CLOSING_INSTRUCTIONS: &str = r#"Remember:
- Respond as their wise, older self with deep insight
- Make meaningful connections and identify patterns from their history
- Give them substantial reflection, not just surface observations
- Your analysis should roughly match the user's input's length
- Be specific to the user's situation and emotional journey

Respond only with valid JSON in the exact format specified in your system instructions."#;

/// Builds the user prompt for one analysis request.
///
/// `entries` must be ordered newest first; only the first
/// [`PROMPT_CONTEXT_ENTRIES`] are quoted. With no history the
/// recent-patterns block is omitted entirely.
#[must_use]
pub fn build_user_prompt(
    transcript: &str,
    entries: &[JournalEntry],
    now: DateTime<Utc>,
) -> String {
    let mut user_prompt = String::from("Here's their voice note transcript:");

    if !entries.is_empty() {
        let window = &entries[..entries.len().min(PROMPT_CONTEXT_ENTRIES)];

        user_prompt.push_str(
            "\n\n**Recent emotional patterns for context (USE THESE FOR PATTERN RECOGNITION):**\n",
        );
        for entry in window {
            let time_ago = relative_time(entry.timestamp, now);
            user_prompt.push_str(&format!(
                "- {time_ago}: {} - {}\n",
                entry.primary_emotion, entry.summary
            ));
            if !entry.analysis.is_empty() {
                let snippet: String = entry.analysis.chars().take(ANALYSIS_SNIPPET_CHARS).collect();
                user_prompt.push_str(&format!("  Context: {snippet}...\n"));
            }
        }

        user_prompt.push_str("\n**Pay attention to:**\n");
        user_prompt.push_str("- Are there recurring themes or triggers?\n");
        user_prompt.push_str("- Is this part of a pattern you've seen before?\n");
        user_prompt.push_str("- How does this connect to their recent emotional journey?\n");
        user_prompt.push_str("- What growth or struggles do you notice over time?\n");
    }

    user_prompt.push_str(&format!("\n\n**Current entry:**\n\"{transcript}\"\n\n"));
    user_prompt.push_str(CLOSING_INSTRUCTIONS);
    user_prompt
}

/// Formats how long ago a timestamp was, in compact single-letter units.
///
/// Buckets: minutes under an hour, hours under a day, days under a week,
/// weeks otherwise. Future timestamps clamp to "0m ago".
#[must_use]
pub fn relative_time(then: DateTime<Utc>, now: DateTime<Utc>) -> String {
    let elapsed = now.signed_duration_since(then).num_seconds().max(0);
    if elapsed < 3_600 {
        format!("{}m ago", elapsed / 60)
    } else if elapsed < 86_400 {
        format!("{}h ago", elapsed / 3_600)
    } else if elapsed < 604_800 {
        format!("{}d ago", elapsed / 86_400)
    } else {
        format!("{}w ago", elapsed / 604_800)
    }
}
