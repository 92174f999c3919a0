//! Per-turn dialogue heuristics.
//!
//! Follow-up detection, ambiguity detection and preference extraction.
//! Everything here is pure: no I/O, no state, and odd input gives a neutral
//! result rather than an error.

use std::collections::BTreeSet;
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};
use turnwise_config::DialogueConfig;
use turnwise_core::message::Message;

use crate::dialogue::profile::extract_merchant_profile;
use crate::dialogue::state::{ApiPreference, MerchantProfile, PreferenceDelta, TechnicalLevel};

/// Marker appended by clarification resolution. Messages carrying it are
/// never flagged as ambiguous again.
pub const CLARIFICATION_MARKER: &str = "(Clarification:";

/// Transition phrases that mark a message as continuing the conversation.
pub const FOLLOW_UP_PHRASES: &[&str] = &[
    "what about",
    "how about",
    "also",
    "additionally",
    "furthermore",
    "and",
    "but",
    "however",
    "on the other hand",
    "similarly",
    "in addition",
    "moreover",
    "besides",
    "apart from",
    "other than",
    "instead",
    "rather",
    "alternatively",
    "meanwhile",
    "next",
    "then",
    "after that",
    "following",
    "subsequent",
    "related to",
    "concerning",
    "regarding",
    "about",
    "for",
    "with respect to",
];

static FOLLOW_UP_PHRASE_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    let alternatives = FOLLOW_UP_PHRASES
        .iter()
        .map(|p| regex::escape(p))
        .collect::<Vec<_>>()
        .join("|");
    Regex::new(&format!(r"(?i)\b(?:{alternatives})\b")).unwrap()
});

static PRONOUN_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\b(?:it|this|that|these|those|them)\b").unwrap());

static CONTINUATION_PATTERNS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    [
        r"(?i)^(and|but|however|also|additionally|furthermore|moreover)\s+",
        r"(?i)^(what|how|when|where|why|which|who)\s+(about|regarding|concerning)",
        r"(?i)^(can|could|would|should)\s+(you|we|i)\s+(also|additionally|further)",
    ]
    .iter()
    .map(|p| Regex::new(p).unwrap())
    .collect()
});

static REST_API_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)rest.*api|admin.*api").unwrap());
static GRAPHQL_REGEX: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?i)graphql|gql").unwrap());
static NODE_SDK_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)node.*sdk|javascript.*sdk").unwrap());

static BEGINNER_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)beginner|basic|simple|easy").unwrap());
static ADVANCED_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)advanced|complex|sophisticated|expert").unwrap());

// ── Rule tables ───────────────────────────────────────────────────────────

/// One entry in the ambiguity table: if `pattern` matches, ask `clarification`.
#[derive(Debug, Clone)]
pub struct AmbiguityRule {
    pub kind: String,
    pub pattern: Regex,
    pub clarification: String,
}

impl AmbiguityRule {
    /// Build a rule. The pattern is matched case-insensitively.
    pub fn new(
        kind: impl Into<String>,
        pattern: &str,
        clarification: impl Into<String>,
    ) -> Result<Self, regex::Error> {
        Ok(Self {
            kind: kind.into(),
            pattern: Regex::new(&format!("(?i){pattern}"))?,
            clarification: clarification.into(),
        })
    }

    /// The Shopify support table, in evaluation order.
    pub fn builtin() -> Vec<Self> {
        BUILTIN_AMBIGUITY_RULES.clone()
    }
}

static BUILTIN_AMBIGUITY_RULES: LazyLock<Vec<AmbiguityRule>> = LazyLock::new(|| {
    [
        (
            "api_type",
            r"\b(which.*api|what.*api|api.*difference|compare.*api|api.*vs|rest.*vs.*graphql|graphql.*vs.*rest)",
            "Are you asking about the REST Admin API, GraphQL Admin API, or Storefront API?",
        ),
        (
            "payment_type",
            r"\b(payment.*integrat|integrat.*payment|payment.*setup|setup.*payment)",
            "Are you asking about one-time payments, recurring payments, or payment processing setup?",
        ),
        (
            "integration_type",
            r"\b(integrat.*service|connect.*app|link.*account)",
            "Are you asking about integrating with external services, connecting apps, or linking accounts?",
        ),
        (
            "development_type",
            r"\b(develop.*app|build.*app|create.*app)",
            "Are you asking about building a Shopify app, customizing themes, or developing integrations?",
        ),
        (
            "setup_type",
            r"\b(setup.*store|configure.*store|install.*app)",
            "Are you asking about store setup, app installation, or configuration?",
        ),
    ]
    .into_iter()
    .map(|(kind, pattern, clarification)| {
        AmbiguityRule::new(kind, pattern, clarification).unwrap()
    })
    .collect()
});

/// Maps a topic name to the pattern that signals it.
#[derive(Debug, Clone)]
pub struct TopicRule {
    pub topic: String,
    pub pattern: Regex,
}

impl TopicRule {
    pub fn new(topic: impl Into<String>, pattern: &str) -> Result<Self, regex::Error> {
        Ok(Self {
            topic: topic.into(),
            pattern: Regex::new(&format!("(?i){pattern}"))?,
        })
    }

    pub fn builtin() -> Vec<Self> {
        BUILTIN_TOPIC_RULES.clone()
    }
}

static BUILTIN_TOPIC_RULES: LazyLock<Vec<TopicRule>> = LazyLock::new(|| {
    [
        ("products", "product|inventory|catalog"),
        ("orders", "order|fulfillment|shipping"),
        ("customers", "customer|user|client"),
        ("payments", "payment|billing|charge"),
        ("themes", "theme|design|template"),
        ("apps", "app|application|integration"),
        ("analytics", "analytics|report|data"),
        ("settings", "setting|configuration|setup"),
    ]
    .into_iter()
    .map(|(topic, pattern)| TopicRule::new(topic, pattern).unwrap())
    .collect()
});

// ── Results ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FollowUpIndicators {
    pub has_keyword: bool,
    pub has_pronoun_ref: bool,
    pub has_pattern: bool,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FollowUpDetection {
    pub is_follow_up: bool,
    /// Unnormalized score in [0, 2.1]. Advisory unless a gate is configured.
    pub confidence: f32,
    pub indicators: FollowUpIndicators,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Ambiguity {
    #[serde(rename = "type")]
    pub kind: String,
    pub clarification: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AmbiguityDetection {
    pub needs_clarification: bool,
    pub ambiguities: Vec<Ambiguity>,
    /// The first matching rule's question.
    pub clarification_question: Option<String>,
}

/// Everything the analyzer derives from one incoming message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TurnAnalysis {
    pub follow_up: FollowUpDetection,
    pub ambiguity: AmbiguityDetection,
    pub preferences: PreferenceDelta,
    pub merchant_profile: MerchantProfile,
}

// ── Analyzer ──────────────────────────────────────────────────────────────

/// Stateless per-turn heuristics over a message and its history.
#[derive(Debug, Clone)]
pub struct DialogueAnalyzer {
    ambiguity_rules: Vec<AmbiguityRule>,
    topic_rules: Vec<TopicRule>,
    confidence_gate: Option<f32>,
}

impl Default for DialogueAnalyzer {
    fn default() -> Self {
        Self::new()
    }
}

impl DialogueAnalyzer {
    pub fn new() -> Self {
        Self {
            ambiguity_rules: AmbiguityRule::builtin(),
            topic_rules: TopicRule::builtin(),
            confidence_gate: None,
        }
    }

    pub fn from_config(config: &DialogueConfig) -> Self {
        Self::new().with_confidence_gate(config.follow_up_confidence_gate)
    }

    /// Require `confidence >= gate` instead of any single indicator.
    pub fn with_confidence_gate(mut self, gate: Option<f32>) -> Self {
        self.confidence_gate = gate;
        self
    }

    /// Replace the ambiguity table.
    pub fn with_ambiguity_rules(mut self, rules: Vec<AmbiguityRule>) -> Self {
        self.ambiguity_rules = rules;
        self
    }

    /// Append a rule after the existing ones.
    pub fn add_ambiguity_rule(mut self, rule: AmbiguityRule) -> Self {
        self.ambiguity_rules.push(rule);
        self
    }

    pub fn with_topic_rules(mut self, rules: Vec<TopicRule>) -> Self {
        self.topic_rules = rules;
        self
    }

    pub fn ambiguity_rules(&self) -> &[AmbiguityRule] {
        &self.ambiguity_rules
    }

    pub fn analyze(&self, message: &str, history: &[Message]) -> TurnAnalysis {
        TurnAnalysis {
            follow_up: self.detect_follow_up(message, history),
            ambiguity: self.detect_ambiguity(message, history),
            preferences: self.extract_preferences(message, history),
            merchant_profile: extract_merchant_profile(history),
        }
    }

    pub fn detect_follow_up(&self, message: &str, history: &[Message]) -> FollowUpDetection {
        let text = message.trim().to_lowercase();
        if text.is_empty() {
            return FollowUpDetection::default();
        }

        let has_keyword = FOLLOW_UP_PHRASE_REGEX.is_match(&text);
        let has_pronoun_ref = !history.is_empty() && PRONOUN_REGEX.is_match(&text);
        let has_pattern = CONTINUATION_PATTERNS.iter().any(|p| p.is_match(&text));

        let confidence = weight(has_keyword, 0.8) + weight(has_pronoun_ref, 0.6) + weight(has_pattern, 0.7);
        let is_follow_up = match self.confidence_gate {
            Some(gate) => confidence >= gate,
            None => has_keyword || has_pronoun_ref || has_pattern,
        };

        FollowUpDetection {
            is_follow_up,
            confidence,
            indicators: FollowUpIndicators {
                has_keyword,
                has_pronoun_ref,
                has_pattern,
            },
        }
    }

    pub fn detect_ambiguity(&self, message: &str, _history: &[Message]) -> AmbiguityDetection {
        if message.contains(CLARIFICATION_MARKER) {
            return AmbiguityDetection::default();
        }

        let ambiguities: Vec<Ambiguity> = self
            .ambiguity_rules
            .iter()
            .filter(|rule| rule.pattern.is_match(message))
            .map(|rule| Ambiguity {
                kind: rule.kind.clone(),
                clarification: rule.clarification.clone(),
            })
            .collect();

        AmbiguityDetection {
            needs_clarification: !ambiguities.is_empty(),
            clarification_question: ambiguities.first().map(|a| a.clarification.clone()),
            ambiguities,
        }
    }

    pub fn extract_preferences(&self, message: &str, _history: &[Message]) -> PreferenceDelta {
        let preferred_api = if REST_API_REGEX.is_match(message) {
            Some(ApiPreference::Rest)
        } else if GRAPHQL_REGEX.is_match(message) {
            Some(ApiPreference::Graphql)
        } else if NODE_SDK_REGEX.is_match(message) {
            Some(ApiPreference::NodeSdk)
        } else {
            None
        };

        let technical_level = if BEGINNER_REGEX.is_match(message) {
            TechnicalLevel::Beginner
        } else if ADVANCED_REGEX.is_match(message) {
            TechnicalLevel::Advanced
        } else {
            TechnicalLevel::Intermediate
        };

        let topics: BTreeSet<String> = self
            .topic_rules
            .iter()
            .filter(|rule| rule.pattern.is_match(message))
            .map(|rule| rule.topic.clone())
            .collect();

        PreferenceDelta {
            preferred_api,
            technical_level,
            topics,
        }
    }
}

fn weight(flag: bool, value: f32) -> f32 {
    if flag { value } else { 0.0 }
}
