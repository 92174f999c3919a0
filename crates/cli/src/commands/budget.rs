//! `turnwise budget`: run context selection over a JSON file.

use std::path::Path;

use serde::{Deserialize, Serialize};
use turnwise_agent::context::{
    ContextBudgetResult, ContextSizeEstimate, ContextWindowManager, TokenCounter, TokenLimitCheck,
    check_token_limit,
};
use turnwise_agent::prompt::DEFAULT_SYSTEM_PROMPT;
use turnwise_config::AppConfig;
use turnwise_core::document::RetrievedDocument;
use turnwise_core::message::Message;

use super::load_config;

/// The input file layout.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BudgetInput {
    #[serde(default)]
    pub messages: Vec<Message>,
    #[serde(default)]
    pub documents: Vec<RetrievedDocument>,
    pub system_prompt: Option<String>,
    pub max_tokens: Option<usize>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BudgetReport {
    pub tokenizer: String,
    /// Size of the whole input, before selection.
    pub input: ContextSizeEstimate,
    pub limit: TokenLimitCheck,
    pub selection: ContextBudgetResult,
}

pub fn build_report(input: &BudgetInput, counter: TokenCounter, config: &AppConfig) -> BudgetReport {
    let system_prompt = input
        .system_prompt
        .as_deref()
        .or(config.system_prompt.as_deref())
        .unwrap_or(DEFAULT_SYSTEM_PROMPT);
    let max_tokens = input.max_tokens.unwrap_or(config.context.max_tokens);

    let tokenizer = counter.tokenizer_name().to_string();
    let estimate = counter.estimate_context_size(&input.messages, &input.documents, system_prompt);
    let window = ContextWindowManager::from_config(counter, &config.context);
    let selection = window.select_context(&input.messages, &input.documents, system_prompt, max_tokens);

    BudgetReport {
        tokenizer,
        input: estimate,
        limit: check_token_limit(estimate.total_tokens, max_tokens),
        selection,
    }
}

pub async fn run(
    config_path: Option<&Path>,
    input_path: &Path,
    heuristic: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    let config = load_config(config_path).map_err(|e| format!("Failed to load config: {e}"))?;

    let raw = tokio::fs::read_to_string(input_path)
        .await
        .map_err(|e| format!("Failed to read {}: {e}", input_path.display()))?;
    let input: BudgetInput = serde_json::from_str(&raw)
        .map_err(|e| format!("Invalid budget input {}: {e}", input_path.display()))?;

    let counter = if heuristic {
        TokenCounter::heuristic()
    } else {
        TokenCounter::from_config(&config.context)?
    };

    let report = build_report(&input, counter, &config);
    tracing::info!(
        selected_messages = report.selection.selected_messages.len(),
        selected_documents = report.selection.selected_documents.len(),
        total_tokens = report.selection.token_usage.total_tokens,
        strategy = %report.selection.windowing_strategy.kind,
        "Context selected"
    );
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}
