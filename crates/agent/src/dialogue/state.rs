//! Per-session dialogue state and the deltas that advance it.

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ── Preferences ───────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApiPreference {
    Rest,
    Graphql,
    NodeSdk,
}

impl ApiPreference {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Rest => "rest",
            Self::Graphql => "graphql",
            Self::NodeSdk => "node_sdk",
        }
    }
}

impl std::fmt::Display for ApiPreference {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TechnicalLevel {
    Beginner,
    #[default]
    Intermediate,
    Advanced,
}

impl TechnicalLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Beginner => "beginner",
            Self::Intermediate => "intermediate",
            Self::Advanced => "advanced",
        }
    }
}

impl std::fmt::Display for TechnicalLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Preferences signalled by a single message.
///
/// `Intermediate` is the "no signal" level and never overwrites a stored one.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PreferenceDelta {
    pub preferred_api: Option<ApiPreference>,
    pub technical_level: TechnicalLevel,
    pub topics: BTreeSet<String>,
}

impl PreferenceDelta {
    pub fn is_empty(&self) -> bool {
        self.preferred_api.is_none()
            && self.technical_level == TechnicalLevel::Intermediate
            && self.topics.is_empty()
    }
}

/// Accumulated preferences for a session. Only ever grows or is refined.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserPreferences {
    pub preferred_api: Option<ApiPreference>,
    pub technical_level: TechnicalLevel,
    pub topics: BTreeSet<String>,
}

impl UserPreferences {
    pub fn merge(&mut self, delta: &PreferenceDelta) {
        if let Some(api) = delta.preferred_api {
            self.preferred_api = Some(api);
        }
        if delta.technical_level != TechnicalLevel::Intermediate {
            self.technical_level = delta.technical_level;
        }
        self.topics.extend(delta.topics.iter().cloned());
    }

    /// Topics joined for display, or "None".
    pub fn topics_display(&self) -> String {
        if self.topics.is_empty() {
            "None".into()
        } else {
            self.topics.iter().cloned().collect::<Vec<_>>().join(", ")
        }
    }
}

// ── Merchant profile ──────────────────────────────────────────────────────

macro_rules! profile_enum {
    ($name:ident { $($variant:ident => $text:literal),+ $(,)? }) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        #[serde(rename_all = "snake_case")]
        pub enum $name {
            $($variant),+
        }

        impl $name {
            pub fn as_str(&self) -> &'static str {
                match self {
                    $(Self::$variant => $text),+
                }
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(self.as_str())
            }
        }
    };
}

profile_enum!(PlanTier {
    Basic => "basic",
    Shopify => "shopify",
    Advanced => "advanced",
    Plus => "plus",
    Enterprise => "enterprise",
});

profile_enum!(StoreType {
    Physical => "physical",
    Online => "online",
    Both => "both",
});

profile_enum!(Industry {
    Fashion => "fashion",
    Electronics => "electronics",
    Food => "food",
    Beauty => "beauty",
    Home => "home",
    Sports => "sports",
    Books => "books",
    Jewelry => "jewelry",
});

profile_enum!(StoreSize {
    Small => "small",
    Medium => "medium",
    Large => "large",
    Enterprise => "enterprise",
});

profile_enum!(ExperienceLevel {
    New => "new",
    Experienced => "experienced",
    Expert => "expert",
});

/// What is known about the merchant behind a session.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MerchantProfile {
    pub plan_tier: Option<PlanTier>,
    pub store_type: Option<StoreType>,
    pub industry: Option<Industry>,
    pub location: Option<String>,
    pub store_size: Option<StoreSize>,
    pub experience_level: Option<ExperienceLevel>,
}

impl MerchantProfile {
    /// Overwrite fields that `other` knows; never clear a known field.
    pub fn merge(&mut self, other: &MerchantProfile) {
        if other.plan_tier.is_some() {
            self.plan_tier = other.plan_tier;
        }
        if other.store_type.is_some() {
            self.store_type = other.store_type;
        }
        if other.industry.is_some() {
            self.industry = other.industry;
        }
        if let Some(location) = other.location.as_ref().filter(|l| !l.is_empty()) {
            self.location = Some(location.clone());
        }
        if other.store_size.is_some() {
            self.store_size = other.store_size;
        }
        if other.experience_level.is_some() {
            self.experience_level = other.experience_level;
        }
    }

    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

// ── Dialogue state ────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AmbiguityFlags {
    /// The original question a clarification was given for.
    pub pending_clarification: Option<String>,
}

/// Everything Turnwise tracks about one session.
///
/// `turn_count` only moves forward, by exactly one per committed turn, and
/// `last_compression_turn <= turn_count` always holds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DialogueState {
    pub turn_count: u64,
    pub last_compression_turn: u64,
    pub context_summary: Option<String>,
    pub user_preferences: UserPreferences,
    #[serde(default)]
    pub merchant_profile: MerchantProfile,
    #[serde(default)]
    pub ambiguity_flags: AmbiguityFlags,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Default for DialogueState {
    fn default() -> Self {
        Self::new()
    }
}

impl DialogueState {
    pub fn new() -> Self {
        let now = Utc::now();
        Self {
            turn_count: 0,
            last_compression_turn: 0,
            context_summary: None,
            user_preferences: UserPreferences::default(),
            merchant_profile: MerchantProfile::default(),
            ambiguity_flags: AmbiguityFlags::default(),
            created_at: now,
            updated_at: now,
        }
    }

    /// Apply the outcome of one successful turn.
    ///
    /// Deltas compose: two commits computed from the same snapshot still
    /// advance the turn count twice and keep both preference sets.
    pub fn apply(&mut self, delta: &TurnDelta) {
        self.turn_count += 1;
        self.user_preferences.merge(&delta.preferences);
        self.merchant_profile.merge(&delta.merchant_profile);
        if let Some(summary) = &delta.summary {
            self.context_summary = Some(summary.clone());
            self.last_compression_turn = self.turn_count;
        }
        if delta.clear_pending_clarification {
            self.ambiguity_flags.pending_clarification = None;
        }
        self.updated_at = Utc::now();
    }
}

/// State changes produced by one turn, applied at commit time.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TurnDelta {
    pub preferences: PreferenceDelta,
    pub merchant_profile: MerchantProfile,
    /// Set when the turn ran compression (including the failure placeholder).
    pub summary: Option<String>,
    pub clear_pending_clarification: bool,
}
