//! Merchant profile extraction from conversation history.
//!
//! Keyword tables are scanned in order over the lowercased transcript;
//! the first entry with any matching phrase wins for each field.

use std::sync::LazyLock;

use regex::Regex;
use turnwise_core::message::Message;

use crate::dialogue::state::{
    ExperienceLevel, Industry, MerchantProfile, PlanTier, StoreSize, StoreType,
};

const PLAN_TIERS: &[(PlanTier, &[&str])] = &[
    (PlanTier::Basic, &["basic plan", "basic tier", "basic subscription", "starter plan"]),
    (PlanTier::Shopify, &["shopify plan", "standard plan", "regular plan"]),
    (PlanTier::Advanced, &["advanced plan", "advanced tier", "professional plan"]),
    (PlanTier::Plus, &["shopify plus", "plus plan", "enterprise plan"]),
    (PlanTier::Enterprise, &["enterprise", "custom plan", "white label"]),
];

const STORE_TYPES: &[(StoreType, &[&str])] = &[
    (StoreType::Physical, &["physical store", "brick and mortar", "retail store", "in-person"]),
    (StoreType::Online, &["online store", "ecommerce", "digital store", "web store"]),
    (StoreType::Both, &["omnichannel", "both online and physical", "multi-channel"]),
];

const INDUSTRIES: &[(Industry, &[&str])] = &[
    (Industry::Fashion, &["fashion", "clothing", "apparel", "style", "fashion store"]),
    (Industry::Electronics, &["electronics", "tech", "gadgets", "electronics store"]),
    (Industry::Food, &["food", "restaurant", "cafe", "bakery", "food store"]),
    (Industry::Beauty, &["beauty", "cosmetics", "skincare", "makeup", "beauty store"]),
    (Industry::Home, &["home", "furniture", "decor", "home goods"]),
    (Industry::Sports, &["sports", "fitness", "athletic", "sports store"]),
    (Industry::Books, &["books", "bookstore", "publishing", "literature"]),
    (Industry::Jewelry, &["jewelry", "watches", "accessories", "jewelry store"]),
];

const STORE_SIZES: &[(StoreSize, &[&str])] = &[
    (StoreSize::Small, &["small business", "startup", "small store", "local business"]),
    (StoreSize::Medium, &["medium business", "growing business", "mid-size"]),
    (StoreSize::Large, &["large business", "big store", "major retailer"]),
    (StoreSize::Enterprise, &["enterprise", "corporation", "large corporation"]),
];

const EXPERIENCE_LEVELS: &[(ExperienceLevel, &[&str])] = &[
    (
        ExperienceLevel::New,
        &["new to shopify", "just started", "beginner", "new merchant", "first time"],
    ),
    (
        ExperienceLevel::Experienced,
        &["experienced", "been using", "familiar with", "know shopify"],
    ),
    (ExperienceLevel::Expert, &["expert", "advanced user", "power user", "developer"]),
];

static LOCATION_PATTERNS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    [
        r"\b(?:based in|located in|in|from)\s+([a-z][a-z ]*?)(?:\s|$|,|\.)",
        r"\b(?:country|region)\s+([a-z][a-z ]*?)(?:\s|$|,|\.)",
    ]
    .iter()
    .map(|p| Regex::new(p).unwrap())
    .collect()
});

/// Words that follow "in"/"from" without naming a place.
const NOT_A_LOCATION: &[&str] = &[
    "a", "an", "the", "my", "our", "your", "this", "that", "it", "order", "stock", "person",
];

fn first_match<T: Copy>(text: &str, table: &[(T, &[&str])]) -> Option<T> {
    table
        .iter()
        .find(|(_, phrases)| phrases.iter().any(|p| text.contains(p)))
        .map(|(value, _)| *value)
}

fn detect_location(text: &str) -> Option<String> {
    LOCATION_PATTERNS.iter().find_map(|pattern| {
        pattern
            .captures_iter(text)
            .filter_map(|caps| caps.get(1))
            .map(|m| m.as_str().trim())
            .find(|candidate| !candidate.is_empty() && !NOT_A_LOCATION.contains(candidate))
            .map(str::to_string)
    })
}

/// Derive what the transcript says about the merchant.
///
/// Fields with no signal stay `None` so merging never clears known values.
pub fn extract_merchant_profile(history: &[Message]) -> MerchantProfile {
    if history.is_empty() {
        return MerchantProfile::default();
    }

    let text = history
        .iter()
        .map(|m| m.content.to_lowercase())
        .collect::<Vec<_>>()
        .join(" ");

    MerchantProfile {
        plan_tier: first_match(&text, PLAN_TIERS),
        store_type: first_match(&text, STORE_TYPES),
        industry: first_match(&text, INDUSTRIES),
        location: detect_location(&text),
        store_size: first_match(&text, STORE_SIZES),
        experience_level: first_match(&text, EXPERIENCE_LEVELS),
    }
}
