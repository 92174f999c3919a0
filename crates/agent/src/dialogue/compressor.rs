//! Periodic summarization of older turns.
//!
//! Every `compression_interval` turns, and once when a conversation first
//! reaches `max_turns`, the recent transcript is condensed into a short
//! summary by the text generator. The summary then stands in for the raw
//! history when the contextual query is built.
//!
//! Compression never fails a turn. A generator error or timeout stores a
//! placeholder summary and still advances the schedule, so a broken
//! generator is not retried on every following turn.

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use turnwise_config::{AppConfig, DialogueConfig};
use turnwise_core::error::GenerationError;
use turnwise_core::message::{Message, transcript};
use turnwise_core::provider::TextGenerator;

use crate::dialogue::state::{DialogueState, UserPreferences};

/// Stored in place of a summary when summarization fails.
pub const COMPRESSION_FALLBACK_SUMMARY: &str =
    "Context compression failed. Using recent conversation history.";

/// When compression is due.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CompressionSchedule {
    pub interval: u64,
    pub max_turns: u64,
}

impl Default for CompressionSchedule {
    fn default() -> Self {
        Self {
            interval: 10,
            max_turns: 20,
        }
    }
}

impl CompressionSchedule {
    pub fn from_config(config: &DialogueConfig) -> Self {
        Self {
            interval: config.compression_interval,
            max_turns: config.max_turns,
        }
    }

    /// Whether turn `turn` should compress, given the last compression turn.
    ///
    /// Due every `interval` turns. Additionally forced once when the
    /// conversation reaches `max_turns` without having compressed there.
    pub fn is_due(&self, turn: u64, last_compression_turn: u64) -> bool {
        let periodic = turn.saturating_sub(last_compression_turn) >= self.interval;
        let forced = turn >= self.max_turns && last_compression_turn < self.max_turns;
        periodic || forced
    }
}

/// Result of one compression attempt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompressionOutcome {
    pub summary: String,
    /// True when `summary` is the failure placeholder.
    pub failed: bool,
    /// Number of messages that were summarized.
    pub source_messages: usize,
}

/// Summarizes conversation history through a [`TextGenerator`].
pub struct ContextCompressor {
    generator: Arc<dyn TextGenerator>,
    schedule: CompressionSchedule,
    summary_max_words: usize,
    timeout: Duration,
}

impl ContextCompressor {
    pub fn new(generator: Arc<dyn TextGenerator>) -> Self {
        Self {
            generator,
            schedule: CompressionSchedule::default(),
            summary_max_words: 200,
            timeout: Duration::from_secs(30),
        }
    }

    pub fn from_config(generator: Arc<dyn TextGenerator>, config: &AppConfig) -> Self {
        Self::new(generator)
            .with_schedule(CompressionSchedule::from_config(&config.dialogue))
            .with_summary_max_words(config.dialogue.summary_max_words)
            .with_timeout(config.timeouts.summary())
    }

    pub fn with_schedule(mut self, schedule: CompressionSchedule) -> Self {
        self.schedule = schedule;
        self
    }

    pub fn with_summary_max_words(mut self, words: usize) -> Self {
        self.summary_max_words = words;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn schedule(&self) -> CompressionSchedule {
        self.schedule
    }

    /// Compress if turn `turn` is due, summarizing the tail of `history`.
    pub async fn maybe_compress(
        &self,
        state: &DialogueState,
        turn: u64,
        history: &[Message],
    ) -> Option<CompressionOutcome> {
        if !self.schedule.is_due(turn, state.last_compression_turn) {
            return None;
        }
        info!(
            turn,
            last_compression_turn = state.last_compression_turn,
            "Compressing conversation context"
        );
        Some(self.compress(&state.user_preferences, history).await)
    }

    /// Summarize the last `interval` messages of `history`. Never fails.
    pub async fn compress(
        &self,
        preferences: &UserPreferences,
        history: &[Message],
    ) -> CompressionOutcome {
        let window = usize::try_from(self.schedule.interval).unwrap_or(usize::MAX);
        let recent = &history[history.len().saturating_sub(window)..];
        let prompt = build_compression_prompt(recent, preferences);

        let result = match tokio::time::timeout(self.timeout, self.generator.generate(&prompt)).await
        {
            Ok(Ok(text)) if text.trim().is_empty() => Err(GenerationError::EmptyResponse),
            Ok(Ok(text)) => Ok(text),
            Ok(Err(e)) => Err(e),
            Err(_) => Err(GenerationError::Timeout(format!(
                "summary not produced within {}s",
                self.timeout.as_secs()
            ))),
        };

        match result {
            Ok(text) => CompressionOutcome {
                summary: clamp_words(text.trim(), self.summary_max_words),
                failed: false,
                source_messages: recent.len(),
            },
            Err(e) => {
                warn!(
                    generator = self.generator.name(),
                    error = %e,
                    "Context compression failed, storing placeholder summary"
                );
                CompressionOutcome {
                    summary: COMPRESSION_FALLBACK_SUMMARY.to_string(),
                    failed: true,
                    source_messages: recent.len(),
                }
            }
        }
    }
}

/// The condensation prompt sent to the generator.
pub fn build_compression_prompt(recent: &[Message], preferences: &UserPreferences) -> String {
    format!(
        "You are a conversation summarizer. Compress the following conversation history into a concise summary that preserves:
1. Key topics discussed
2. User's preferences and technical level
3. Important context for future questions
4. Any unresolved questions or follow-ups

Conversation History:
{history}

Current User Preferences:
- Preferred API: {api}
- Technical Level: {level}
- Topics Discussed: {topics}

Provide a concise summary (max 200 words) that maintains context for future questions:",
        history = transcript(recent),
        api = preferences
            .preferred_api
            .map_or("Not specified", |a| a.as_str()),
        level = preferences.technical_level,
        topics = preferences.topics_display(),
    )
}

/// Keep at most `max_words` whitespace-separated words.
fn clamp_words(text: &str, max_words: usize) -> String {
    if text.split_whitespace().nth(max_words).is_none() {
        return text.to_string();
    }
    text.split_whitespace()
        .take(max_words)
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dialogue::state::ApiPreference;
    use crate::test_helpers::{FailingGenerator, HangingGenerator, ScriptedGenerator};

    fn history(n: usize) -> Vec<Message> {
        (0..n)
            .map(|i| {
                if i % 2 == 0 {
                    Message::user(format!("question {i}"))
                } else {
                    Message::assistant(format!("answer {i}"))
                }
            })
            .collect()
    }

    #[test]
    fn schedule_every_interval() {
        let schedule = CompressionSchedule::default();
        assert!(!schedule.is_due(9, 0));
        assert!(schedule.is_due(10, 0));
        assert!(!schedule.is_due(15, 10));
        assert!(schedule.is_due(20, 10));
    }

    #[test]
    fn schedule_twenty_five_turns() {
        let schedule = CompressionSchedule::default();
        let mut last = 0;
        let mut compressed_at = Vec::new();
        for turn in 1..=25 {
            if schedule.is_due(turn, last) {
                compressed_at.push(turn);
                last = turn;
            }
        }
        assert_eq!(compressed_at, vec![10, 20]);
    }

    #[test]
    fn max_turns_forces_once() {
        let schedule = CompressionSchedule {
            interval: 15,
            max_turns: 20,
        };
        assert!(schedule.is_due(20, 15));
        assert!(!schedule.is_due(21, 20));
        assert!(!schedule.is_due(34, 20));
        assert!(schedule.is_due(35, 20));
    }

    #[test]
    fn prompt_includes_transcript_and_preferences() {
        let mut prefs = UserPreferences::default();
        prefs.preferred_api = Some(ApiPreference::Graphql);
        prefs.topics.insert("orders".into());
        let prompt = build_compression_prompt(&history(2), &prefs);
        assert!(prompt.contains("user: question 0\nassistant: answer 1"));
        assert!(prompt.contains("- Preferred API: graphql"));
        assert!(prompt.contains("- Technical Level: intermediate"));
        assert!(prompt.contains("- Topics Discussed: orders"));
    }

    #[test]
    fn prompt_defaults_when_no_preferences() {
        let prompt = build_compression_prompt(&[], &UserPreferences::default());
        assert!(prompt.contains("- Preferred API: Not specified"));
        assert!(prompt.contains("- Topics Discussed: None"));
    }

    #[test]
    fn clamp_words_limits_length() {
        assert_eq!(clamp_words("one two three", 5), "one two three");
        assert_eq!(clamp_words("one  two three four", 2), "one two");
    }

    #[tokio::test]
    async fn compress_summarizes_recent_window() {
        let generator = Arc::new(ScriptedGenerator::new(vec!["Merchant discussed orders."]));
        let compressor = ContextCompressor::new(generator.clone());
        let outcome = compressor
            .compress(&UserPreferences::default(), &history(14))
            .await;

        assert!(!outcome.failed);
        assert_eq!(outcome.summary, "Merchant discussed orders.");
        assert_eq!(outcome.source_messages, 10);
        let prompt = generator.prompts().remove(0);
        assert!(!prompt.contains("question 2\n"));
        assert!(prompt.contains("question 4"));
    }

    #[tokio::test]
    async fn long_summary_is_clamped() {
        let long = vec!["word"; 500].join(" ");
        let compressor = ContextCompressor::new(Arc::new(ScriptedGenerator::new(vec![long])))
            .with_summary_max_words(200);
        let outcome = compressor.compress(&UserPreferences::default(), &history(4)).await;
        assert_eq!(outcome.summary.split_whitespace().count(), 200);
    }

    #[tokio::test]
    async fn generator_failure_stores_placeholder() {
        let compressor = ContextCompressor::new(Arc::new(FailingGenerator::default()));
        let outcome = compressor.compress(&UserPreferences::default(), &history(4)).await;
        assert!(outcome.failed);
        assert_eq!(outcome.summary, COMPRESSION_FALLBACK_SUMMARY);
    }

    #[tokio::test]
    async fn empty_summary_is_a_failure() {
        let compressor = ContextCompressor::new(Arc::new(ScriptedGenerator::new(vec!["   "])));
        let outcome = compressor.compress(&UserPreferences::default(), &history(2)).await;
        assert!(outcome.failed);
    }

    #[tokio::test]
    async fn timeout_stores_placeholder() {
        tokio::time::pause();
        let compressor = ContextCompressor::new(Arc::new(HangingGenerator))
            .with_timeout(Duration::from_secs(5));
        let outcome = compressor.compress(&UserPreferences::default(), &history(2)).await;
        assert!(outcome.failed);
        assert_eq!(outcome.summary, COMPRESSION_FALLBACK_SUMMARY);
    }

    #[tokio::test]
    async fn maybe_compress_skips_when_not_due() {
        let generator = Arc::new(ScriptedGenerator::new(Vec::<String>::new()));
        let compressor = ContextCompressor::new(generator.clone());
        let state = DialogueState::new();
        assert!(compressor.maybe_compress(&state, 3, &history(6)).await.is_none());
        assert_eq!(generator.call_count(), 0);
    }
}
