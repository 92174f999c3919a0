//! Retrieved documents: the read-only output of the external retriever.

use serde::{Deserialize, Serialize};

use crate::message::SourceRef;

/// A ranked document produced by the retriever for a single turn.
///
/// Never persisted by Turnwise; the window manager only reads it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RetrievedDocument {
    /// The document text.
    pub content: String,

    /// Retriever relevance score (0.0–1.0).
    pub relevance_score: f32,

    /// Documentation category (e.g. "payments", "themes").
    #[serde(default)]
    pub category: String,

    /// Human-readable title.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,

    /// Where the document came from.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_url: Option<String>,

    /// Any extra retriever metadata. Charged against the token budget.
    #[serde(default, skip_serializing_if = "serde_json::Map::is_empty")]
    pub metadata: serde_json::Map<String, serde_json::Value>,
}

impl RetrievedDocument {
    pub fn new(content: impl Into<String>, relevance_score: f32, category: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            relevance_score,
            category: category.into(),
            title: None,
            source_url: None,
            metadata: serde_json::Map::new(),
        }
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    pub fn with_source_url(mut self, url: impl Into<String>) -> Self {
        self.source_url = Some(url.into());
        self
    }

    /// The metadata object as it would be serialized next to the content.
    pub fn metadata_json(&self) -> String {
        let mut map = self.metadata.clone();
        map.insert("category".into(), self.category.clone().into());
        if let Some(url) = &self.source_url {
            map.insert("source_url".into(), url.clone().into());
        }
        serde_json::Value::Object(map).to_string()
    }

    /// Citation for an assistant message built from this document.
    pub fn to_source_ref(&self) -> SourceRef {
        SourceRef {
            title: self.title.clone().unwrap_or_else(|| "Unknown".into()),
            url: self.source_url.clone().unwrap_or_else(|| "N/A".into()),
            category: self.category.clone(),
            relevance_score: self.relevance_score,
        }
    }
}
