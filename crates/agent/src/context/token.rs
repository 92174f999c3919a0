//! Token counting.
//!
//! Production counting uses the `cl100k_base` BPE from `tiktoken-rs`. The
//! heuristic counter (1 token ≈ 4 characters, rounded up) is both the
//! per-string fallback when encoding fails and a deterministic tokenizer
//! for tests.

use std::sync::{Arc, OnceLock};

use serde::{Deserialize, Serialize};
use tiktoken_rs::CoreBPE;
use tracing::{debug, warn};
use turnwise_config::ContextConfig;
use turnwise_core::document::RetrievedDocument;
use turnwise_core::error::TokenizerError;
use turnwise_core::message::Message;
use turnwise_core::tokenizer::Tokenizer;

/// Formatting overhead charged per message (`role: content\n`).
pub const MESSAGE_OVERHEAD: usize = 3;

/// Formatting overhead charged per document (title, content, metadata labels).
pub const DOCUMENT_OVERHEAD: usize = 10;

/// Estimate the token count for a string.
///
/// Heuristic: 1 token ≈ 4 characters. Rounds up.
pub fn estimate_tokens(text: &str) -> usize {
    text.chars().count().div_ceil(4)
}

// ── Tokenizers ────────────────────────────────────────────────────────────

static CL100K: OnceLock<Arc<CoreBPE>> = OnceLock::new();

fn cl100k() -> Result<Arc<CoreBPE>, TokenizerError> {
    if let Some(bpe) = CL100K.get() {
        return Ok(Arc::clone(bpe));
    }
    let bpe = tiktoken_rs::cl100k_base().map_err(|e| TokenizerError::Initialization {
        encoding: "cl100k_base".into(),
        reason: e.to_string(),
    })?;
    // A racing initializer may have won; either handle is equivalent.
    let _ = CL100K.set(Arc::new(bpe));
    CL100K.get().cloned().ok_or_else(|| TokenizerError::Initialization {
        encoding: "cl100k_base".into(),
        reason: "encoding cell left empty after initialization".into(),
    })
}

/// BPE tokenizer backed by `tiktoken-rs`.
///
/// The encoding tables are loaded once per process and shared by every
/// instance.
#[derive(Clone)]
pub struct TiktokenTokenizer {
    encoding: String,
    bpe: Arc<CoreBPE>,
}

impl TiktokenTokenizer {
    /// Load the named encoding. Fails fast if it cannot be initialized.
    pub fn new(encoding: &str) -> Result<Self, TokenizerError> {
        let bpe = match encoding {
            "cl100k_base" => cl100k()?,
            "p50k_base" => Arc::new(tiktoken_rs::p50k_base().map_err(|e| {
                TokenizerError::Initialization {
                    encoding: encoding.into(),
                    reason: e.to_string(),
                }
            })?),
            "r50k_base" => Arc::new(tiktoken_rs::r50k_base().map_err(|e| {
                TokenizerError::Initialization {
                    encoding: encoding.into(),
                    reason: e.to_string(),
                }
            })?),
            other => {
                return Err(TokenizerError::Initialization {
                    encoding: other.into(),
                    reason: "unsupported encoding".into(),
                });
            }
        };
        debug!(encoding, "Tokenizer initialized");
        Ok(Self {
            encoding: encoding.into(),
            bpe,
        })
    }

    pub fn cl100k_base() -> Result<Self, TokenizerError> {
        Self::new("cl100k_base")
    }
}

impl Tokenizer for TiktokenTokenizer {
    fn name(&self) -> &str {
        &self.encoding
    }

    fn count(&self, text: &str) -> Result<usize, TokenizerError> {
        if text.is_empty() {
            return Ok(0);
        }
        Ok(self.bpe.encode_with_special_tokens(text).len())
    }
}

/// Deterministic chars/4 tokenizer.
#[derive(Debug, Clone, Copy, Default)]
pub struct HeuristicTokenizer;

impl Tokenizer for HeuristicTokenizer {
    fn name(&self) -> &str {
        "heuristic"
    }

    fn count(&self, text: &str) -> Result<usize, TokenizerError> {
        Ok(estimate_tokens(text))
    }
}

// ── Counter ───────────────────────────────────────────────────────────────

/// Per-part token breakdown for a prospective context.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContextSizeEstimate {
    pub message_tokens: usize,
    pub document_tokens: usize,
    pub system_tokens: usize,
    pub total_tokens: usize,
}

/// Result of comparing a token total against a limit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenLimitCheck {
    pub exceeds: bool,
    pub total_tokens: usize,
    pub max_tokens: usize,
    /// Share of the limit used, in percent, rounded to 2 decimal places.
    pub percentage: f64,
    pub recommendation: String,
}

/// Compare a token total against a limit and describe the result.
pub fn check_token_limit(total_tokens: usize, max_tokens: usize) -> TokenLimitCheck {
    let exceeds = total_tokens > max_tokens;
    let percentage = if max_tokens == 0 {
        if total_tokens == 0 { 0.0 } else { f64::INFINITY }
    } else {
        total_tokens as f64 / max_tokens as f64 * 100.0
    };

    let recommendation = if exceeds {
        format!(
            "Context exceeds limit by {} tokens ({:.1}%). Consider truncating conversation history or reducing retrieved documents.",
            total_tokens - max_tokens,
            percentage
        )
    } else {
        format!("Context is within limits ({percentage:.1}% of {max_tokens} tokens).")
    };

    TokenLimitCheck {
        exceeds,
        total_tokens,
        max_tokens,
        percentage: (percentage * 100.0).round() / 100.0,
        recommendation,
    }
}

/// Counts tokens for text, messages and documents.
///
/// `try_*` methods surface an unavailable tokenizer as an error; the plain
/// methods never fail and fall back to [`estimate_tokens`].
#[derive(Clone)]
pub struct TokenCounter {
    tokenizer: Arc<dyn Tokenizer>,
    message_overhead: usize,
    document_overhead: usize,
}

impl std::fmt::Debug for TokenCounter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenCounter")
            .field("tokenizer", &self.tokenizer.name())
            .field("message_overhead", &self.message_overhead)
            .field("document_overhead", &self.document_overhead)
            .finish()
    }
}

impl TokenCounter {
    pub fn new(tokenizer: Arc<dyn Tokenizer>) -> Self {
        Self {
            tokenizer,
            message_overhead: MESSAGE_OVERHEAD,
            document_overhead: DOCUMENT_OVERHEAD,
        }
    }

    /// Counter over the shared `cl100k_base` encoding.
    pub fn cl100k() -> Result<Self, TokenizerError> {
        Ok(Self::new(Arc::new(TiktokenTokenizer::cl100k_base()?)))
    }

    /// Counter using the chars/4 heuristic only.
    pub fn heuristic() -> Self {
        Self::new(Arc::new(HeuristicTokenizer))
    }

    pub fn from_config(config: &ContextConfig) -> Result<Self, TokenizerError> {
        let tokenizer = TiktokenTokenizer::new(&config.encoding)?;
        Ok(Self::new(Arc::new(tokenizer))
            .with_overheads(config.message_overhead, config.document_overhead))
    }

    pub fn with_overheads(mut self, message: usize, document: usize) -> Self {
        self.message_overhead = message;
        self.document_overhead = document;
        self
    }

    pub fn tokenizer_name(&self) -> &str {
        self.tokenizer.name()
    }

    /// Count tokens, estimating when a single string fails to encode.
    ///
    /// Returns an error only when the tokenizer is unusable.
    pub fn try_count(&self, text: &str) -> Result<usize, TokenizerError> {
        match self.tokenizer.count(text) {
            Ok(n) => Ok(n),
            Err(TokenizerError::Encode(reason)) => {
                let estimate = estimate_tokens(text);
                warn!(%reason, estimate, "Token encoding failed, using character estimate");
                Ok(estimate)
            }
            Err(e) => Err(e),
        }
    }

    pub fn count(&self, text: &str) -> usize {
        self.try_count(text).unwrap_or_else(|e| {
            warn!(error = %e, "Tokenizer unavailable, using character estimate");
            estimate_tokens(text)
        })
    }

    /// Role tokens + content tokens + formatting overhead.
    pub fn try_count_message(&self, message: &Message) -> Result<usize, TokenizerError> {
        let role = self.try_count(message.role.as_str())?;
        let content = self.try_count(&message.content)?;
        Ok(role + content + self.message_overhead)
    }

    pub fn count_message(&self, message: &Message) -> usize {
        self.count(message.role.as_str()) + self.count(&message.content) + self.message_overhead
    }

    pub fn count_messages(&self, messages: &[Message]) -> usize {
        messages.iter().map(|m| self.count_message(m)).sum()
    }

    /// Title + content + serialized metadata + formatting overhead.
    pub fn try_count_document(&self, document: &RetrievedDocument) -> Result<usize, TokenizerError> {
        let title = self.try_count(document.title.as_deref().unwrap_or(""))?;
        let content = self.try_count(&document.content)?;
        let metadata = self.try_count(&document.metadata_json())?;
        Ok(title + content + metadata + self.document_overhead)
    }

    pub fn count_document(&self, document: &RetrievedDocument) -> usize {
        self.count(document.title.as_deref().unwrap_or(""))
            + self.count(&document.content)
            + self.count(&document.metadata_json())
            + self.document_overhead
    }

    pub fn count_documents(&self, documents: &[RetrievedDocument]) -> usize {
        documents.iter().map(|d| self.count_document(d)).sum()
    }

    /// Token breakdown for messages, documents and a system prompt together.
    pub fn estimate_context_size(
        &self,
        messages: &[Message],
        documents: &[RetrievedDocument],
        system_prompt: &str,
    ) -> ContextSizeEstimate {
        let message_tokens = self.count_messages(messages);
        let document_tokens = self.count_documents(documents);
        let system_tokens = self.count(system_prompt);
        ContextSizeEstimate {
            message_tokens,
            document_tokens,
            system_tokens,
            total_tokens: message_tokens + document_tokens + system_tokens,
        }
    }
}
