//! Token accounting and budget-bounded context selection.
//!
//! | Piece | Role |
//! |-------|------|
//! | [`TokenCounter`] | Counts messages and documents, with per-item overheads |
//! | [`ContextWindowManager`] | Picks the newest history and the most relevant documents that fit |

pub mod token;
pub mod window;

pub use token::{
    ContextSizeEstimate, HeuristicTokenizer, TiktokenTokenizer, TokenCounter, TokenLimitCheck,
    check_token_limit, estimate_tokens,
};
pub use window::{
    ContextBudgetResult, ContextWindowManager, StrategyKind, TokenUsage, WindowingStrategy,
};
