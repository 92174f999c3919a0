//! Token-budgeted context selection.
//!
//! Packs conversation history and retrieved documents into a fixed token
//! budget in two greedy phases:
//!
//! 1. **Messages**, newest first, into `message_share` of the budget left
//!    after the system prompt. Stops at the first message that does not fit.
//! 2. **Documents**, highest relevance first (stable for ties), into what
//!    the messages left over. Stops at the first document that does not fit.
//!
//! No backtracking: a smaller item behind one that did not fit is never
//! considered. Selection is deterministic for identical inputs.
//!
//! If counting fails outright the manager falls back to a fixed window of
//! recent messages plus every document, so a caller is never blocked.

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};
use turnwise_config::ContextConfig;
use turnwise_core::document::RetrievedDocument;
use turnwise_core::error::TokenizerError;
use turnwise_core::message::Message;

use crate::context::token::TokenCounter;

// ── Types ─────────────────────────────────────────────────────────────────

/// Token totals for a selection.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenUsage {
    pub message_tokens: usize,
    pub document_tokens: usize,
    pub system_tokens: usize,
    pub total_tokens: usize,
}

impl TokenUsage {
    fn new(message_tokens: usize, document_tokens: usize, system_tokens: usize) -> Self {
        Self {
            message_tokens,
            document_tokens,
            system_tokens,
            total_tokens: message_tokens + document_tokens + system_tokens,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StrategyKind {
    TokenBudget,
    FixedWindowFallback,
}

impl std::fmt::Display for StrategyKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::TokenBudget => write!(f, "token_budget"),
            Self::FixedWindowFallback => write!(f, "fixed_window_fallback"),
        }
    }
}

/// How a selection was made.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WindowingStrategy {
    #[serde(rename = "type")]
    pub kind: StrategyKind,
    pub max_tokens: usize,
    /// Budget left after the system prompt.
    pub available_tokens: usize,
    pub message_budget: usize,
    pub document_budget: usize,
    pub messages_dropped: usize,
    pub documents_dropped: usize,
    /// Why the fallback was taken.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// The selected context for one generation call.
///
/// On the fast path `token_usage.total_tokens <= max_tokens` whenever
/// `max_tokens` covers the system prompt. On the fallback path
/// (`windowing_strategy.kind == FixedWindowFallback`) the usage figures are
/// character estimates and the total is **not** guaranteed to fit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContextBudgetResult {
    /// Chronological order.
    pub selected_messages: Vec<Message>,
    /// Relevance order, highest first.
    pub selected_documents: Vec<RetrievedDocument>,
    pub token_usage: TokenUsage,
    pub truncated: bool,
    pub windowing_strategy: WindowingStrategy,
}

impl ContextBudgetResult {
    pub fn is_fallback(&self) -> bool {
        self.windowing_strategy.kind == StrategyKind::FixedWindowFallback
    }
}

// ── Manager ───────────────────────────────────────────────────────────────

/// Selects history and documents that fit a token budget. Stateless.
#[derive(Debug, Clone)]
pub struct ContextWindowManager {
    counter: TokenCounter,
    /// Message share of the available budget, in thousandths.
    message_share_permille: usize,
    fallback_window: usize,
}

impl ContextWindowManager {
    /// Manager with the default 70% message share and an 8-message fallback.
    pub fn new(counter: TokenCounter) -> Self {
        Self {
            counter,
            message_share_permille: 700,
            fallback_window: 8,
        }
    }

    pub fn from_config(counter: TokenCounter, config: &ContextConfig) -> Self {
        Self::new(counter)
            .with_message_share(config.message_share)
            .with_fallback_window(config.fallback_window)
    }

    /// Share of the post-system budget given to history. Resolution is 0.001.
    pub fn with_message_share(mut self, share: f32) -> Self {
        self.message_share_permille = (share.clamp(0.0, 1.0) * 1000.0).round() as usize;
        self
    }

    pub fn with_fallback_window(mut self, messages: usize) -> Self {
        self.fallback_window = messages;
        self
    }

    pub fn counter(&self) -> &TokenCounter {
        &self.counter
    }

    /// Select the messages and documents that fit `max_tokens`.
    ///
    /// Never fails. Counting errors switch to the fixed-window fallback.
    pub fn select_context(
        &self,
        messages: &[Message],
        documents: &[RetrievedDocument],
        system_prompt: &str,
        max_tokens: usize,
    ) -> ContextBudgetResult {
        match self.try_select(messages, documents, system_prompt, max_tokens) {
            Ok(result) => {
                debug!(
                    messages = result.selected_messages.len(),
                    documents = result.selected_documents.len(),
                    total_tokens = result.token_usage.total_tokens,
                    max_tokens,
                    truncated = result.truncated,
                    "Context selected"
                );
                result
            }
            Err(e) => {
                warn!(error = %e, "Token budgeting failed, using fixed message window");
                self.fallback(messages, documents, system_prompt, max_tokens, e)
            }
        }
    }

    fn try_select(
        &self,
        messages: &[Message],
        documents: &[RetrievedDocument],
        system_prompt: &str,
        max_tokens: usize,
    ) -> Result<ContextBudgetResult, TokenizerError> {
        let system_tokens = self.counter.try_count(system_prompt)?;
        let available = max_tokens.saturating_sub(system_tokens);
        let message_budget = share_of(available, self.message_share_permille);

        // ── Phase 1: messages, newest first ────────────────────────────────
        let mut message_tokens = 0;
        let mut keep_from = messages.len();
        for (i, message) in messages.iter().enumerate().rev() {
            let cost = self.counter.try_count_message(message)?;
            if message_tokens + cost > message_budget {
                break;
            }
            message_tokens += cost;
            keep_from = i;
        }
        let selected_messages = messages[keep_from..].to_vec();

        // ── Phase 2: documents, most relevant first ───────────────────────
        let document_budget = available - message_tokens;
        let mut ranked: Vec<&RetrievedDocument> = documents.iter().collect();
        // sort_by is stable, so equal scores keep retriever order
        ranked.sort_by(|a, b| b.relevance_score.total_cmp(&a.relevance_score));

        let mut document_tokens = 0;
        let mut selected_documents = Vec::new();
        for document in ranked {
            let cost = self.counter.try_count_document(document)?;
            if document_tokens + cost > document_budget {
                break;
            }
            document_tokens += cost;
            selected_documents.push(document.clone());
        }

        let messages_dropped = messages.len() - selected_messages.len();
        let documents_dropped = documents.len() - selected_documents.len();

        Ok(ContextBudgetResult {
            selected_messages,
            selected_documents,
            token_usage: TokenUsage::new(message_tokens, document_tokens, system_tokens),
            truncated: messages_dropped > 0 || documents_dropped > 0,
            windowing_strategy: WindowingStrategy {
                kind: StrategyKind::TokenBudget,
                max_tokens,
                available_tokens: available,
                message_budget,
                document_budget,
                messages_dropped,
                documents_dropped,
                error: None,
            },
        })
    }

    fn fallback(
        &self,
        messages: &[Message],
        documents: &[RetrievedDocument],
        system_prompt: &str,
        max_tokens: usize,
        error: TokenizerError,
    ) -> ContextBudgetResult {
        let start = messages.len().saturating_sub(self.fallback_window);
        let selected_messages = messages[start..].to_vec();

        let usage = TokenUsage::new(
            self.counter.count_messages(&selected_messages),
            self.counter.count_documents(documents),
            self.counter.count(system_prompt),
        );

        ContextBudgetResult {
            windowing_strategy: WindowingStrategy {
                kind: StrategyKind::FixedWindowFallback,
                max_tokens,
                available_tokens: max_tokens.saturating_sub(usage.system_tokens),
                message_budget: usage.message_tokens,
                document_budget: usage.document_tokens,
                messages_dropped: start,
                documents_dropped: 0,
                error: Some(error.to_string()),
            },
            selected_messages,
            selected_documents: documents.to_vec(),
            token_usage: usage,
            truncated: false,
        }
    }
}

/// `floor(tokens * permille / 1000)` without overflowing for any `tokens`.
fn share_of(tokens: usize, permille: usize) -> usize {
    tokens / 1000 * permille + tokens % 1000 * permille / 1000
}
