//! Tokenizer trait, the pluggable token-counting function.

use crate::error::TokenizerError;

/// Counts tokens for a piece of text.
///
/// `Encode` errors are per-string and recoverable; `Unavailable` means the
/// tokenizer cannot be used any more.
pub trait Tokenizer: Send + Sync {
    /// Encoding name (e.g. "cl100k_base").
    fn name(&self) -> &str;

    fn count(&self, text: &str) -> Result<usize, TokenizerError>;
}
