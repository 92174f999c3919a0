//! End-to-end integration tests for the Turnwise context manager.
//!
//! These tests drive the whole turn pipeline through the public crates:
//! config loading, the conversation log, retrieval, context selection,
//! compression and state commits.

use std::sync::Arc;
use std::time::Duration;

use turnwise_agent::dialogue::{ApiPreference, CompressionSchedule, EvictionPolicy, TechnicalLevel};
use turnwise_agent::{ConversationEngine, ConversationStateStore, TokenCounter};
use turnwise_config::AppConfig;
use turnwise_core::document::RetrievedDocument;
use turnwise_core::error::{Error, GenerationError, RetrievalError};
use turnwise_core::memory::ConversationLog;
use turnwise_core::message::{Message, Role};
use turnwise_core::provider::TextGenerator;
use turnwise_core::retriever::Retriever;
use turnwise_memory::{InMemoryConversationLog, JsonlConversationLog};

// ── Mock Collaborators ───────────────────────────────────────────────────

/// Answers with a fixed text, or a summary for compression prompts.
struct ScriptedGenerator {
    answer: String,
    prompts: std::sync::Mutex<Vec<String>>,
}

impl ScriptedGenerator {
    fn new(answer: &str) -> Self {
        Self {
            answer: answer.to_string(),
            prompts: std::sync::Mutex::new(Vec::new()),
        }
    }

    fn prompts(&self) -> Vec<String> {
        self.prompts.lock().unwrap().clone()
    }

    fn summary_calls(&self) -> usize {
        self.prompts()
            .iter()
            .filter(|p| p.starts_with("You are a conversation summarizer"))
            .count()
    }
}

#[async_trait::async_trait]
impl TextGenerator for ScriptedGenerator {
    fn name(&self) -> &str {
        "e2e_scripted"
    }

    async fn generate(&self, prompt: &str) -> Result<String, GenerationError> {
        self.prompts.lock().unwrap().push(prompt.to_string());
        if prompt.starts_with("You are a conversation summarizer") {
            Ok("Merchant is building an apparel store on the GraphQL API.".into())
        } else {
            Ok(self.answer.clone())
        }
    }
}

/// Generator whose backend is always down.
struct BrokenAnswers;

#[async_trait::async_trait]
impl TextGenerator for BrokenAnswers {
    fn name(&self) -> &str {
        "e2e_broken"
    }

    async fn generate(&self, _prompt: &str) -> Result<String, GenerationError> {
        Err(GenerationError::Unavailable("model overloaded".into()))
    }
}

struct DocsRetriever {
    queries: std::sync::Mutex<Vec<String>>,
}

impl DocsRetriever {
    fn new() -> Self {
        Self {
            queries: std::sync::Mutex::new(Vec::new()),
        }
    }

    fn queries(&self) -> Vec<String> {
        self.queries.lock().unwrap().clone()
    }
}

#[async_trait::async_trait]
impl Retriever for DocsRetriever {
    fn name(&self) -> &str {
        "e2e_docs"
    }

    async fn search(&self, query: &str) -> Result<Vec<RetrievedDocument>, RetrievalError> {
        self.queries.lock().unwrap().push(query.to_string());
        Ok(vec![
            RetrievedDocument::new("Use productCreate to add products.", 0.92, "products")
                .with_title("productCreate")
                .with_source_url("https://shopify.dev/docs/api/admin-graphql/productCreate"),
            RetrievedDocument::new("Variants describe product options.", 0.71, "products")
                .with_title("Variants"),
            RetrievedDocument::new("Themes control storefront design.", 0.12, "themes"),
        ])
    }
}

fn engine(generator: Arc<dyn TextGenerator>) -> ConversationEngine {
    ConversationEngine::new(generator, TokenCounter::heuristic())
}

// ── E2E: Full Turn Pipeline ──────────────────────────────────────────────

#[tokio::test]
async fn e2e_turn_persists_transcript_with_citations() {
    let dir = tempfile::tempdir().unwrap();
    let log = JsonlConversationLog::new(dir.path());
    let generator = Arc::new(ScriptedGenerator::new("Call productCreate with a title."));
    let retriever = DocsRetriever::new();
    let engine = engine(generator.clone());

    let response = engine
        .run_turn("merchant-1", "How do I add products?", &log, &retriever, None, None)
        .await
        .expect("turn should succeed");

    assert_eq!(response.answer, "Call productCreate with a title.");
    assert_eq!(response.context.turn, 1);
    assert_eq!(response.sources.len(), 3);
    assert_eq!(response.sources[0].title, "productCreate");

    // A fresh log instance reads the same transcript back
    let reopened = JsonlConversationLog::new(dir.path());
    let history = reopened.history("merchant-1").await.unwrap();
    assert_eq!(history.len(), 2);
    assert_eq!(history[0].role, Role::User);
    assert_eq!(history[1].role, Role::Assistant);
    assert_eq!(history[1].sources.len(), 3);

    let prompt = &generator.prompts()[0];
    assert!(prompt.contains("- Turn Count: 1"));
    assert!(prompt.contains("[Source 1] productCreate"));
    assert!(prompt.ends_with("EXPERT ANSWER:"));
}

#[tokio::test]
async fn e2e_follow_up_uses_previous_turns_for_retrieval() {
    let log = InMemoryConversationLog::new();
    let retriever = DocsRetriever::new();
    let engine = engine(Arc::new(ScriptedGenerator::new("Answer.")));

    engine
        .run_turn("s", "How do I set up one-time payments?", &log, &retriever, None, None)
        .await
        .unwrap();
    let response = engine
        .run_turn("s", "What about recurring payments?", &log, &retriever, None, None)
        .await
        .unwrap();

    assert!(response.context.follow_up.is_follow_up);
    let query = &retriever.queries()[1];
    assert!(query.starts_with("Previous context: "));
    assert!(query.contains("user: How do I set up one-time payments?"));
    assert!(query.ends_with("Follow-up question: What about recurring payments?"));
}

#[tokio::test]
async fn e2e_clarification_then_answer() {
    let log = InMemoryConversationLog::new();
    let retriever = DocsRetriever::new();
    let generator = Arc::new(ScriptedGenerator::new("Use selling plans."));
    let engine = engine(generator.clone());

    let first = engine
        .run_turn("s", "How do I integrate payments?", &log, &retriever, None, None)
        .await
        .unwrap();
    assert!(first.context.needs_clarification);
    assert!(first.answer.contains("recurring payments"));
    assert!(retriever.queries().is_empty());
    assert!(generator.prompts().is_empty());

    let clarified = engine
        .resolve_clarification("s", "recurring payments", "How do I integrate payments?")
        .await;
    let second = engine
        .run_turn("s", &clarified, &log, &retriever, None, None)
        .await
        .unwrap();

    assert!(!second.context.needs_clarification);
    assert_eq!(second.answer, "Use selling plans.");
    let stats = engine.stats("s").await.unwrap();
    assert_eq!(stats.turn_count, 1);
    assert!(stats.pending_clarification.is_none());
    // Clarification exchange plus the answered turn
    assert_eq!(log.history("s").await.unwrap().len(), 4);
}

#[tokio::test]
async fn e2e_twenty_five_turns_compress_at_ten_and_twenty() {
    let log = InMemoryConversationLog::new();
    let retriever = DocsRetriever::new();
    let generator = Arc::new(ScriptedGenerator::new("Noted."));
    let engine = engine(generator.clone());

    let mut compressed = Vec::new();
    for i in 1..=25 {
        let response = engine
            .run_turn("long", &format!("Question {i} on product setup"), &log, &retriever, None, None)
            .await
            .unwrap();
        if response.context.compressed {
            compressed.push(response.context.turn);
        }
    }

    assert_eq!(compressed, vec![10, 20]);
    assert_eq!(generator.summary_calls(), 2);

    let stats = engine.stats("long").await.unwrap();
    assert_eq!(stats.turn_count, 25);
    assert_eq!(stats.last_compression_turn, 20);
    assert!(stats.has_context_summary);

    // After compression the summary stands in for quoted history
    let last_query = retriever.queries().pop().unwrap();
    assert!(last_query.starts_with("Conversation summary: Merchant is building"));
}

#[tokio::test]
async fn e2e_preferences_and_profile_accumulate() {
    let log = InMemoryConversationLog::new();
    let retriever = DocsRetriever::new();
    let generator = Arc::new(ScriptedGenerator::new("Sure."));
    let engine = engine(generator.clone());

    for message in [
        "I'm a beginner running an online store selling apparel",
        "I want to use the GraphQL API for products",
        "How do I fulfill orders?",
    ] {
        engine.run_turn("p", message, &log, &retriever, None, None).await.unwrap();
    }

    let stats = engine.stats("p").await.unwrap();
    assert_eq!(stats.user_preferences.preferred_api, Some(ApiPreference::Graphql));
    assert_eq!(stats.user_preferences.technical_level, TechnicalLevel::Beginner);
    assert!(stats.user_preferences.topics.contains("products"));
    assert!(stats.user_preferences.topics.contains("orders"));
    assert!(stats.merchant_profile.store_type.is_some());
    assert!(stats.merchant_profile.industry.is_some());

    let last_prompt = generator.prompts().pop().unwrap();
    assert!(last_prompt.contains("- User's Preferred API: graphql"));
    assert!(last_prompt.contains("- User's Technical Level: beginner"));
}

#[tokio::test]
async fn e2e_tight_budget_keeps_most_recent_history() {
    let log = InMemoryConversationLog::new();
    for i in 0..10 {
        log.append("tight", Message::user(format!("message {i} {}", "x".repeat(300))))
            .await
            .unwrap();
    }
    let engine = engine(Arc::new(ScriptedGenerator::new("ok")));
    let system = "s".repeat(80);

    let response = engine
        .run_turn("tight", "Next question", &log, &DocsRetriever::new(), Some(&system), Some(300))
        .await
        .unwrap();

    let budget = response.context.context_budget.unwrap();
    assert!(budget.truncated);
    assert!(budget.selected_messages.len() < 10);
    assert!(budget.token_usage.total_tokens <= 300);
    let last = budget.selected_messages.last().unwrap();
    assert!(last.content.starts_with("message 9"));
}

// ── E2E: Failure Handling ────────────────────────────────────────────────

#[tokio::test]
async fn e2e_generation_failure_leaves_no_trace() {
    let log = InMemoryConversationLog::new();
    let engine = engine(Arc::new(BrokenAnswers));

    let err = engine
        .run_turn("f", "How do I add products?", &log, &DocsRetriever::new(), None, None)
        .await
        .unwrap_err();

    assert!(matches!(err, Error::Generation(GenerationError::Unavailable(_))));
    assert!(err.is_retryable());
    assert!(err.user_message().contains("try again"));
    assert_eq!(engine.stats("f").await.unwrap().turn_count, 0);
    assert!(log.history("f").await.unwrap().is_empty());
}

// ── E2E: Sessions ────────────────────────────────────────────────────────

#[tokio::test]
async fn e2e_store_capacity_evicts_least_recent_session() {
    tokio::time::pause();
    let store = Arc::new(ConversationStateStore::new(EvictionPolicy {
        max_sessions: Some(2),
        idle_ttl: None,
    }));
    let engine = engine(Arc::new(ScriptedGenerator::new("ok"))).with_store(store.clone());

    for session in ["a", "b", "c"] {
        engine.process_turn(session, "Hello there", &[], &[], None, None).await;
        tokio::time::advance(Duration::from_secs(1)).await;
    }

    assert_eq!(store.len().await, 2);
    assert!(engine.stats("a").await.is_none());
    assert!(engine.stats("c").await.is_some());
}

#[tokio::test]
async fn e2e_idle_sessions_expire() {
    tokio::time::pause();
    let store = Arc::new(ConversationStateStore::new(EvictionPolicy {
        max_sessions: None,
        idle_ttl: Some(Duration::from_secs(60)),
    }));
    let engine = engine(Arc::new(ScriptedGenerator::new("ok"))).with_store(store.clone());

    engine.process_turn("idle", "Hello there", &[], &[], None, None).await;
    tokio::time::advance(Duration::from_secs(61)).await;

    assert_eq!(engine.evict_expired().await, 1);
    assert!(store.is_empty().await);
}

#[tokio::test]
async fn e2e_snapshot_restores_into_another_engine() {
    let first = engine(Arc::new(ScriptedGenerator::new("ok")));
    for _ in 0..3 {
        first
            .process_turn("moving", "Tell me about GraphQL products", &[], &[], None, None)
            .await;
    }
    let snapshot = first.store().snapshot("moving").await.unwrap();

    let second = engine(Arc::new(ScriptedGenerator::new("ok")));
    second.store().restore("moving", snapshot).await;
    let ctx = second
        .process_turn("moving", "And orders?", &[], &[], None, None)
        .await;

    assert_eq!(ctx.turn, 4);
    let stats = second.stats("moving").await.unwrap();
    assert_eq!(stats.turn_count, 4);
    assert_eq!(stats.user_preferences.preferred_api, Some(ApiPreference::Graphql));
}

#[tokio::test]
async fn e2e_concurrent_turns_across_sessions() {
    let engine = Arc::new(engine(Arc::new(ScriptedGenerator::new("ok"))));
    let log = Arc::new(InMemoryConversationLog::new());
    let retriever = Arc::new(DocsRetriever::new());

    let mut tasks = Vec::new();
    for s in 0..4 {
        for t in 0..5 {
            let engine = engine.clone();
            let log = log.clone();
            let retriever = retriever.clone();
            tasks.push(tokio::spawn(async move {
                engine
                    .run_turn(
                        &format!("session-{s}"),
                        &format!("Question {t} about products"),
                        log.as_ref(),
                        retriever.as_ref(),
                        None,
                        None,
                    )
                    .await
            }));
        }
    }
    for task in tasks {
        task.await.unwrap().unwrap();
    }

    for s in 0..4 {
        let id = format!("session-{s}");
        assert_eq!(engine.stats(&id).await.unwrap().turn_count, 5);
        assert_eq!(log.history(&id).await.unwrap().len(), 10);
    }
}

// ── E2E: Configuration ───────────────────────────────────────────────────

#[tokio::test]
async fn e2e_engine_from_config_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("config.toml");
    std::fs::write(
        &path,
        r#"
system_prompt = "You answer Shopify questions tersely."

[context]
max_tokens = 2000

[dialogue]
compression_interval = 3
max_turns = 6
"#,
    )
    .unwrap();

    let config = AppConfig::load_from(&path).unwrap();
    assert_eq!(config.context.max_tokens, 2000);

    let generator = Arc::new(ScriptedGenerator::new("ok"));
    let engine = ConversationEngine::from_config(generator.clone(), TokenCounter::heuristic(), &config);
    let log = InMemoryConversationLog::new();
    let retriever = DocsRetriever::new();

    let mut compressed = Vec::new();
    for i in 1..=7 {
        let response = engine
            .run_turn("cfg", &format!("Question {i} on themes"), &log, &retriever, None, None)
            .await
            .unwrap();
        if response.context.compressed {
            compressed.push(response.context.turn);
        }
        let budget = response.context.context_budget.unwrap();
        assert_eq!(budget.windowing_strategy.max_tokens, 2000);
    }

    assert_eq!(compressed, vec![3, 6]);
    assert!(generator.prompts()[0].starts_with("You answer Shopify questions tersely."));
    assert_eq!(
        CompressionSchedule::from_config(&config.dialogue),
        CompressionSchedule { interval: 3, max_turns: 6 }
    );
}
