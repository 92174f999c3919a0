//! Offline collaborators for the `demo` command.
//!
//! Nothing here talks to a network. The generator answers from the
//! documentation block of its prompt, and the retriever scores a small
//! built-in corpus by word overlap.

use async_trait::async_trait;
use turnwise_core::document::RetrievedDocument;
use turnwise_core::error::{GenerationError, RetrievalError};
use turnwise_core::provider::TextGenerator;
use turnwise_core::retriever::Retriever;

const SUMMARY_PROMPT_PREFIX: &str = "You are a conversation summarizer";

/// Answers from the prompt itself.
pub struct OfflineGenerator;

impl OfflineGenerator {
    fn section<'a>(prompt: &'a str, start: &str, end: &str) -> Option<&'a str> {
        let from = prompt.find(start)? + start.len();
        let rest = &prompt[from..];
        let to = rest.find(end).unwrap_or(rest.len());
        Some(rest[..to].trim())
    }

    fn summarize(prompt: &str) -> String {
        let history = Self::section(prompt, "Conversation History:", "Current User Preferences:")
            .unwrap_or_default();
        let questions: Vec<&str> = history
            .lines()
            .filter_map(|line| line.strip_prefix("user: "))
            .collect();
        let topics = Self::section(prompt, "- Topics Discussed:", "\n").unwrap_or("None");
        format!(
            "The merchant asked {} question(s), most recently: \"{}\". Topics so far: {}.",
            questions.len(),
            questions.last().copied().unwrap_or("nothing yet"),
            topics
        )
    }

    fn answer(prompt: &str) -> String {
        let query = Self::section(prompt, "USER QUESTION:", "\n\nEXPERT ANSWER:").unwrap_or_default();
        let question = query
            .lines()
            .find_map(|line| {
                line.strip_prefix("Follow-up question: ")
                    .or_else(|| line.strip_prefix("Current question: "))
            })
            .or_else(|| query.lines().next())
            .unwrap_or_default()
            .to_string();
        let docs = Self::section(prompt, "RETRIEVED DOCUMENTATION:", "\n\nUSER QUESTION:")
            .unwrap_or_default();

        match docs.split("\n\n---\n\n").next().filter(|d| !d.is_empty()) {
            Some(first) => {
                let mut lines = first.lines();
                let header = lines.next().unwrap_or_default();
                let body = lines.collect::<Vec<_>>().join(" ");
                format!("For \"{question}\": {body} (see {header})")
            }
            None => format!("I couldn't find documentation for \"{question}\"."),
        }
    }
}

#[async_trait]
impl TextGenerator for OfflineGenerator {
    fn name(&self) -> &str {
        "offline"
    }

    async fn generate(&self, prompt: &str) -> Result<String, GenerationError> {
        if prompt.starts_with(SUMMARY_PROMPT_PREFIX) {
            Ok(Self::summarize(prompt))
        } else {
            Ok(Self::answer(prompt))
        }
    }
}

struct CorpusEntry {
    title: &'static str,
    url: &'static str,
    category: &'static str,
    content: &'static str,
}

const CORPUS: &[CorpusEntry] = &[
    CorpusEntry {
        title: "Adding products",
        url: "https://help.shopify.com/manual/products/add-update-products",
        category: "products",
        content: "From your admin go to Products > Add product, enter a title, description, price and media, then save.",
    },
    CorpusEntry {
        title: "Product variants",
        url: "https://help.shopify.com/manual/products/variants",
        category: "products",
        content: "Variants let one product come in options such as size or color. Each product can have up to 100 variants.",
    },
    CorpusEntry {
        title: "Selling subscriptions",
        url: "https://help.shopify.com/manual/products/purchase-options/subscriptions",
        category: "payments",
        content: "Recurring payments are sold through subscription apps that create selling plans on your products.",
    },
    CorpusEntry {
        title: "Shopify Payments",
        url: "https://help.shopify.com/manual/payments/shopify-payments",
        category: "payments",
        content: "Shopify Payments processes one-time card payments directly in checkout without a third-party gateway.",
    },
    CorpusEntry {
        title: "Fulfilling orders",
        url: "https://help.shopify.com/manual/orders/fulfill-orders",
        category: "orders",
        content: "Open an order, choose Fulfill items, add tracking details and the customer is notified of shipping.",
    },
    CorpusEntry {
        title: "GraphQL Admin API",
        url: "https://shopify.dev/docs/api/admin-graphql",
        category: "apps",
        content: "The GraphQL Admin API exposes products, orders and customers. Use productCreate to add products.",
    },
    CorpusEntry {
        title: "Theme editor",
        url: "https://help.shopify.com/manual/online-store/themes/customizing-themes",
        category: "themes",
        content: "Customize themes from Online Store > Themes > Customize, where sections and blocks can be rearranged.",
    },
];

const STOP_WORDS: &[&str] = &[
    "a", "an", "the", "to", "do", "i", "how", "what", "is", "of", "for", "and", "in", "on", "my",
    "can", "about", "with", "you", "it", "that", "this",
];

fn terms(text: &str) -> Vec<String> {
    text.to_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| w.len() > 1 && !STOP_WORDS.contains(w))
        .map(|w| w.trim_end_matches('s').to_string())
        .collect()
}

/// Scores the built-in corpus by query term overlap.
pub struct CorpusRetriever {
    limit: usize,
}

impl CorpusRetriever {
    pub fn new(limit: usize) -> Self {
        Self { limit }
    }
}

#[async_trait]
impl Retriever for CorpusRetriever {
    fn name(&self) -> &str {
        "corpus"
    }

    async fn search(&self, query: &str) -> Result<Vec<RetrievedDocument>, RetrievalError> {
        let query_terms = terms(query);
        if query_terms.is_empty() {
            return Ok(Vec::new());
        }

        let mut scored: Vec<RetrievedDocument> = CORPUS
            .iter()
            .filter_map(|entry| {
                let doc_terms = terms(&format!("{} {} {}", entry.title, entry.category, entry.content));
                let hits = query_terms.iter().filter(|t| doc_terms.contains(t)).count();
                (hits > 0).then(|| {
                    RetrievedDocument::new(
                        entry.content,
                        hits as f32 / query_terms.len() as f32,
                        entry.category,
                    )
                    .with_title(entry.title)
                    .with_source_url(entry.url)
                })
            })
            .collect();

        scored.sort_by(|a, b| b.relevance_score.total_cmp(&a.relevance_score));
        scored.truncate(self.limit);
        Ok(scored)
    }
}
