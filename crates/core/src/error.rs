//! Error types for the Turnwise domain.
//!
//! Uses `thiserror` for ergonomic error definitions.
//! Each collaborator boundary has its own error variant.

use thiserror::Error;

/// The top-level error type for all Turnwise operations.
#[derive(Debug, Error)]
pub enum Error {
    // --- Text generation ---
    #[error("Generation error: {0}")]
    Generation(#[from] GenerationError),

    // --- Retrieval ---
    #[error("Retrieval error: {0}")]
    Retrieval(#[from] RetrievalError),

    // --- Conversation log ---
    #[error("Conversation log error: {0}")]
    Log(#[from] LogError),

    // --- Tokenizer ---
    #[error("Tokenizer error: {0}")]
    Tokenizer(#[from] TokenizerError),

    // --- Generic ---
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// A message that is safe to show to an end user.
    ///
    /// Collaborator failures become a "please retry" response; nothing
    /// from the underlying error leaks through.
    pub fn user_message(&self) -> &'static str {
        match self {
            Self::Generation(GenerationError::Timeout(_))
            | Self::Retrieval(RetrievalError::Timeout(_)) => {
                "Sorry, that took too long to answer. Please try again in a moment."
            }
            Self::Generation(_) | Self::Retrieval(_) | Self::Log(_) => {
                "Sorry, I couldn't complete that request right now. Please try again."
            }
            _ => "Something went wrong on our side. Please try again.",
        }
    }

    /// Whether retrying the same turn has a reasonable chance of succeeding.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Generation(GenerationError::Timeout(_) | GenerationError::Unavailable(_))
                | Self::Retrieval(RetrievalError::Timeout(_))
        )
    }
}

/// Result type alias using our Error.
pub type Result<T> = std::result::Result<T, Error>;

// --- Collaborator errors ---

#[derive(Debug, Clone, Error)]
pub enum GenerationError {
    #[error("Generation request failed: {0}")]
    Failed(String),

    #[error("Generator unavailable: {0}")]
    Unavailable(String),

    #[error("Generation timed out: {0}")]
    Timeout(String),

    #[error("Generator returned an empty response")]
    EmptyResponse,
}

#[derive(Debug, Clone, Error)]
pub enum RetrievalError {
    #[error("Search failed: {0}")]
    SearchFailed(String),

    #[error("Retrieval timed out: {0}")]
    Timeout(String),
}

#[derive(Debug, Clone, Error)]
pub enum LogError {
    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Read failed for session {session_id}: {reason}")]
    ReadFailed { session_id: String, reason: String },
}

#[derive(Debug, Clone, Error)]
pub enum TokenizerError {
    /// The encoding could not be loaded. Fatal at construction time.
    #[error("Unable to initialize token encoding '{encoding}': {reason}")]
    Initialization { encoding: String, reason: String },

    /// A single string could not be encoded. Callers fall back to an estimate.
    #[error("Failed to encode text: {0}")]
    Encode(String),

    /// The tokenizer is no longer usable at all.
    #[error("Tokenizer unavailable: {0}")]
    Unavailable(String),
}
