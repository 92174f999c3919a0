//! The Turnwise conversation context manager.
//!
//! Each turn runs **Analyze → Compress → Select → Generate → Commit**:
//!
//! 1. **Analyze** the message for follow-ups, ambiguity and preferences
//! 2. **Compress** older turns into a summary when the schedule says so
//! 3. **Select** the history and documents that fit the token budget
//! 4. **Generate** the answer from the rendered prompt
//! 5. **Commit** the turn's changes to the session state
//!
//! An ambiguous message stops after step 1 with a clarification question.

pub mod context;
pub mod dialogue;
pub mod engine;
pub mod prompt;

#[cfg(test)]
pub(crate) mod test_helpers;

pub use context::{ContextBudgetResult, ContextWindowManager, TokenCounter};
pub use dialogue::{
    ConversationStateStore, DialogueAnalyzer, DialogueState, EvictionPolicy, SessionStats,
};
pub use engine::{ConversationEngine, PreparedTurn, TurnContext, TurnResponse};
