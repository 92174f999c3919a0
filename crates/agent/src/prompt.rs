//! Contextual query construction and generation prompt rendering.

use turnwise_core::document::RetrievedDocument;
use turnwise_core::message::{Message, transcript};

use crate::dialogue::state::UserPreferences;

/// Used when neither the caller nor the config supplies a system prompt.
pub const DEFAULT_SYSTEM_PROMPT: &str = "You are an expert Shopify Merchant Support Assistant with deep knowledge of Shopify's platform, APIs, and best practices.

INSTRUCTIONS:
1. Maintain context: reference the previous conversation when relevant.
2. For follow-up questions, build on earlier answers.
3. Match the user's technical level and use their preferred API in examples when known.
4. Give detailed, actionable answers formatted in markdown.";

/// Turn the raw message into the query used for retrieval and generation.
///
/// A stored summary takes precedence over quoting recent messages; a known
/// API preference is always appended.
pub fn build_contextual_query(
    message: &str,
    history: &[Message],
    is_follow_up: bool,
    summary: Option<&str>,
    preferences: &UserPreferences,
    recent_messages: usize,
) -> String {
    let mut query = if let Some(summary) = summary {
        format!("Conversation summary: {summary}\n\nCurrent question: {message}")
    } else if is_follow_up {
        let recent = &history[history.len().saturating_sub(recent_messages)..];
        format!(
            "Previous context: {}\n\nFollow-up question: {message}",
            transcript(recent)
        )
    } else {
        message.to_string()
    };

    if let Some(api) = preferences.preferred_api {
        query.push_str(&format!("\n\nUser prefers: {api} API"));
    }
    query
}

/// Inputs for one generation prompt.
pub struct PromptInput<'a> {
    pub system_prompt: &'a str,
    /// The turn number this prompt answers.
    pub turn: u64,
    pub preferences: &'a UserPreferences,
    pub is_follow_up: bool,
    /// Budget-selected history, chronological.
    pub messages: &'a [Message],
    /// Budget-selected documents, most relevant first.
    pub documents: &'a [RetrievedDocument],
    pub contextual_query: &'a str,
}

/// Render the prompt sent to the text generator.
pub fn render_prompt(input: &PromptInput<'_>) -> String {
    let mut prompt = String::with_capacity(input.system_prompt.len() + 1024);
    prompt.push_str(input.system_prompt);

    prompt.push_str("\n\nCONVERSATION CONTEXT:\n");
    prompt.push_str(&format!("- Turn Count: {}\n", input.turn));
    prompt.push_str(&format!(
        "- User's Preferred API: {}\n",
        input
            .preferences
            .preferred_api
            .map_or("Not specified", |a| a.as_str())
    ));
    prompt.push_str(&format!(
        "- User's Technical Level: {}\n",
        input.preferences.technical_level
    ));
    prompt.push_str(&format!(
        "- Topics Discussed: {}\n",
        input.preferences.topics_display()
    ));
    prompt.push_str(&format!(
        "- Is Follow-up Question: {}",
        if input.is_follow_up { "Yes" } else { "No" }
    ));

    if !input.messages.is_empty() {
        prompt.push_str("\n\nRECENT CONVERSATION:\n");
        prompt.push_str(&transcript(input.messages));
    }

    prompt.push_str("\n\nRETRIEVED DOCUMENTATION:\n");
    prompt.push_str(&render_documents(input.documents));

    prompt.push_str("\n\nUSER QUESTION: ");
    prompt.push_str(input.contextual_query);
    prompt.push_str("\n\nEXPERT ANSWER:");
    prompt
}

/// `[Source n] title (url)` blocks separated by `---`.
pub fn render_documents(documents: &[RetrievedDocument]) -> String {
    documents
        .iter()
        .enumerate()
        .map(|(i, doc)| {
            format!(
                "[Source {}] {} ({})\n{}",
                i + 1,
                doc.title.as_deref().unwrap_or("Unknown"),
                doc.source_url.as_deref().unwrap_or("N/A"),
                doc.content
            )
        })
        .collect::<Vec<_>>()
        .join("\n\n---\n\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dialogue::state::{ApiPreference, TechnicalLevel};

    fn history() -> Vec<Message> {
        vec![
            Message::user("How do I create a product?"),
            Message::assistant("Use productCreate."),
            Message::user("Can I add variants?"),
            Message::assistant("Yes, pass variants in the input."),
        ]
    }

    #[test]
    fn plain_query_is_the_message() {
        let q = build_contextual_query("Hi", &history(), false, None, &UserPreferences::default(), 3);
        assert_eq!(q, "Hi");
    }

    #[test]
    fn follow_up_quotes_last_three_messages() {
        let q = build_contextual_query(
            "What about images?",
            &history(),
            true,
            None,
            &UserPreferences::default(),
            3,
        );
        assert_eq!(
            q,
            "Previous context: assistant: Use productCreate.\nuser: Can I add variants?\nassistant: Yes, pass variants in the input.\n\nFollow-up question: What about images?"
        );
    }

    #[test]
    fn summary_takes_precedence_and_api_is_appended() {
        let prefs = UserPreferences {
            preferred_api: Some(ApiPreference::Graphql),
            ..Default::default()
        };
        let q = build_contextual_query(
            "What about images?",
            &history(),
            true,
            Some("Merchant is creating products."),
            &prefs,
            3,
        );
        assert_eq!(
            q,
            "Conversation summary: Merchant is creating products.\n\nCurrent question: What about images?\n\nUser prefers: graphql API"
        );
    }

    #[test]
    fn documents_render_with_sources() {
        let docs = vec![
            RetrievedDocument::new("Products have variants.", 0.9, "products")
                .with_title("Product API")
                .with_source_url("https://shopify.dev/docs/api/product"),
            RetrievedDocument::new("Orders flow.", 0.5, "orders"),
        ];
        assert_eq!(
            render_documents(&docs),
            "[Source 1] Product API (https://shopify.dev/docs/api/product)\nProducts have variants.\n\n---\n\n[Source 2] Unknown (N/A)\nOrders flow."
        );
    }

    #[test]
    fn prompt_sections_in_order() {
        let prefs = UserPreferences {
            technical_level: TechnicalLevel::Beginner,
            ..Default::default()
        };
        let messages = history();
        let prompt = render_prompt(&PromptInput {
            system_prompt: "SYSTEM",
            turn: 3,
            preferences: &prefs,
            is_follow_up: true,
            messages: &messages,
            documents: &[],
            contextual_query: "QUERY",
        });

        assert!(prompt.starts_with("SYSTEM\n\nCONVERSATION CONTEXT:\n- Turn Count: 3\n"));
        assert!(prompt.contains("- User's Technical Level: beginner"));
        assert!(prompt.contains("- Is Follow-up Question: Yes"));
        let recent = prompt.find("RECENT CONVERSATION:").unwrap();
        let docs = prompt.find("RETRIEVED DOCUMENTATION:").unwrap();
        let question = prompt.find("USER QUESTION: QUERY").unwrap();
        assert!(recent < docs && docs < question);
        assert!(prompt.ends_with("EXPERT ANSWER:"));
    }

    #[test]
    fn prompt_omits_empty_history() {
        let prompt = render_prompt(&PromptInput {
            system_prompt: DEFAULT_SYSTEM_PROMPT,
            turn: 1,
            preferences: &UserPreferences::default(),
            is_follow_up: false,
            messages: &[],
            documents: &[],
            contextual_query: "How do I add products?",
        });
        assert!(!prompt.contains("RECENT CONVERSATION"));
        assert!(prompt.contains("- Is Follow-up Question: No"));
    }
}
