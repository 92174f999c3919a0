//! Per-session dialogue tracking.
//!
//! The analyzer reads each message, the store keeps one [`DialogueState`]
//! per session, and the compressor periodically folds older turns into a
//! summary.

pub mod analyzer;
pub mod compressor;
pub mod profile;
pub mod state;
pub mod store;

pub use analyzer::{
    Ambiguity, AmbiguityDetection, AmbiguityRule, DialogueAnalyzer, FollowUpDetection,
    FollowUpIndicators, TopicRule, TurnAnalysis,
};
pub use compressor::{CompressionOutcome, CompressionSchedule, ContextCompressor};
pub use profile::extract_merchant_profile;
pub use state::{
    AmbiguityFlags, ApiPreference, DialogueState, MerchantProfile, PreferenceDelta, TechnicalLevel,
    TurnDelta, UserPreferences,
};
pub use store::{ConversationStateStore, EvictionPolicy, SessionHandle, SessionStats};
