//! Text generation trait, the abstraction over LLM backends.
//!
//! Turnwise never talks to a model directly. It hands a fully rendered
//! prompt to a `TextGenerator` and gets an answer back. The same trait is
//! used for the main answer and for conversation summaries.

use async_trait::async_trait;

use crate::error::GenerationError;

/// A black-box text generator: prompt in, answer out.
///
/// Implementations may be slow or fail; callers always wrap `generate`
/// in a timeout.
#[async_trait]
pub trait TextGenerator: Send + Sync {
    /// A human-readable name for this generator (e.g., "gemini", "offline").
    fn name(&self) -> &str;

    /// Generate a completion for the given prompt.
    async fn generate(&self, prompt: &str) -> std::result::Result<String, GenerationError>;
}
