//! `turnwise demo`: replay a scripted support conversation offline.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use turnwise_agent::ConversationEngine;
use turnwise_agent::context::TokenCounter;
use turnwise_core::memory::ConversationLog;
use turnwise_memory::{InMemoryConversationLog, JsonlConversationLog};

use super::load_config;
use crate::offline::{CorpusRetriever, OfflineGenerator};

/// One scripted step.
enum Step {
    /// Send a message.
    Ask(&'static str),
    /// Answer the pending clarification question.
    Clarify(&'static str),
}

const SCRIPT: &[Step] = &[
    Step::Ask("How do I add products to my online store?"),
    Step::Ask("Can I also add variants like size and color?"),
    Step::Ask("How do I integrate payments?"),
    Step::Clarify("recurring payments"),
    Step::Ask("What about one-time card payments?"),
    Step::Ask("I'm a beginner and prefer the GraphQL Admin API. How do I create products with it?"),
    Step::Ask("How do I fulfill orders and add tracking?"),
    Step::Ask("And how do I notify the customer about shipping?"),
    Step::Ask("How do I customize my theme sections?"),
    Step::Ask("Can I rearrange blocks in the theme editor?"),
    Step::Ask("Where do I see recent orders?"),
    Step::Ask("What about product variants limits?"),
    Step::Ask("Does that work for subscriptions too?"),
];

pub async fn run(
    config_path: Option<&Path>,
    session: &str,
    log_dir: Option<PathBuf>,
    max_tokens: Option<usize>,
) -> Result<(), Box<dyn std::error::Error>> {
    let config = load_config(config_path).map_err(|e| format!("Failed to load config: {e}"))?;
    let counter = TokenCounter::from_config(&config.context)?;

    let mut engine = ConversationEngine::from_config(Arc::new(OfflineGenerator), counter, &config);
    if let Some(max_tokens) = max_tokens {
        engine = engine.with_max_tokens(max_tokens);
    }
    let budget = max_tokens.unwrap_or(config.context.max_tokens);

    let log: Box<dyn ConversationLog> = match log_dir {
        Some(dir) => Box::new(JsonlConversationLog::new(dir)),
        None => Box::new(InMemoryConversationLog::new()),
    };
    let retriever = CorpusRetriever::new(3);

    println!();
    println!("  Turnwise demo");
    println!("  Session:  {session}");
    println!("  Log:      {}", log.name());
    println!("  Budget:   {budget} tokens");
    println!();

    let mut pending: Option<String> = None;
    for step in SCRIPT {
        let message = match step {
            Step::Ask(text) => text.to_string(),
            Step::Clarify(answer) => match pending.take() {
                Some(original) => engine.resolve_clarification(session, answer, &original).await,
                None => continue,
            },
        };

        println!("  You > {message}");
        let response = match engine
            .run_turn(session, &message, log.as_ref(), &retriever, None, None)
            .await
        {
            Ok(response) => response,
            Err(e) => {
                tracing::warn!(error = %e, "Turn failed");
                println!("  Turnwise > {}\n", e.user_message());
                continue;
            }
        };

        let ctx = &response.context;
        if ctx.needs_clarification {
            pending = Some(message);
            println!("  Turnwise (clarifying) > {}\n", response.answer);
            continue;
        }

        let tokens = ctx
            .context_budget
            .as_ref()
            .map_or(0, |b| b.token_usage.total_tokens);
        println!(
            "    [turn {}] follow-up: {} ({:.1}) | compressed: {} | tokens: {tokens}/{budget} | sources: {}",
            ctx.turn,
            if ctx.follow_up.is_follow_up { "yes" } else { "no" },
            ctx.follow_up.confidence,
            if ctx.compressed { "yes" } else { "no" },
            response.sources.len(),
        );
        println!("  Turnwise > {}\n", response.answer);
    }

    match engine.stats(session).await {
        Some(stats) => {
            println!("  Session stats:");
            println!("{}", serde_json::to_string_pretty(&stats)?);
        }
        None => println!("  Session was evicted before the demo finished"),
    }
    Ok(())
}
