//! Shared collaborator mocks for unit tests.

use std::collections::VecDeque;
use std::sync::Mutex;

use async_trait::async_trait;
use turnwise_core::document::RetrievedDocument;
use turnwise_core::error::{GenerationError, LogError, RetrievalError, TokenizerError};
use turnwise_core::memory::ConversationLog;
use turnwise_core::message::{Message, Role};
use turnwise_core::provider::TextGenerator;
use turnwise_core::retriever::Retriever;
use turnwise_core::tokenizer::Tokenizer;

/// A generator that replays scripted answers and records every prompt.
///
/// Returns `GenerationError::Failed` once the script runs out, unless
/// built with [`ScriptedGenerator::always`].
pub struct ScriptedGenerator {
    responses: Mutex<VecDeque<String>>,
    repeat: Option<String>,
    prompts: Mutex<Vec<String>>,
}

impl ScriptedGenerator {
    pub fn new<S: Into<String>>(responses: Vec<S>) -> Self {
        Self {
            responses: Mutex::new(responses.into_iter().map(Into::into).collect()),
            repeat: None,
            prompts: Mutex::new(Vec::new()),
        }
    }

    /// Answer every prompt with the same text.
    pub fn always(text: impl Into<String>) -> Self {
        Self {
            responses: Mutex::new(VecDeque::new()),
            repeat: Some(text.into()),
            prompts: Mutex::new(Vec::new()),
        }
    }

    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().unwrap().clone()
    }

    pub fn call_count(&self) -> usize {
        self.prompts.lock().unwrap().len()
    }
}

#[async_trait]
impl TextGenerator for ScriptedGenerator {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn generate(&self, prompt: &str) -> Result<String, GenerationError> {
        self.prompts.lock().unwrap().push(prompt.to_string());
        if let Some(text) = &self.repeat {
            return Ok(text.clone());
        }
        self.responses
            .lock()
            .unwrap()
            .pop_front()
            .ok_or_else(|| GenerationError::Failed("script exhausted".into()))
    }
}

/// Always fails.
#[derive(Default)]
pub struct FailingGenerator;

#[async_trait]
impl TextGenerator for FailingGenerator {
    fn name(&self) -> &str {
        "failing"
    }

    async fn generate(&self, _prompt: &str) -> Result<String, GenerationError> {
        Err(GenerationError::Failed("upstream returned 500".into()))
    }
}

/// Never answers.
pub struct HangingGenerator;

#[async_trait]
impl TextGenerator for HangingGenerator {
    fn name(&self) -> &str {
        "hanging"
    }

    async fn generate(&self, _prompt: &str) -> Result<String, GenerationError> {
        std::future::pending().await
    }
}

/// Fails to encode every string, but stays usable.
pub struct FlakyTokenizer;

impl Tokenizer for FlakyTokenizer {
    fn name(&self) -> &str {
        "flaky"
    }

    fn count(&self, _text: &str) -> Result<usize, TokenizerError> {
        Err(TokenizerError::Encode("invalid byte sequence".into()))
    }
}

/// Permanently unusable.
pub struct BrokenTokenizer;

impl Tokenizer for BrokenTokenizer {
    fn name(&self) -> &str {
        "broken"
    }

    fn count(&self, _text: &str) -> Result<usize, TokenizerError> {
        Err(TokenizerError::Unavailable("encoding released".into()))
    }
}

/// Returns the same documents for every query and records the queries.
pub struct StaticRetriever {
    documents: Vec<RetrievedDocument>,
    queries: Mutex<Vec<String>>,
}

impl StaticRetriever {
    pub fn new(documents: Vec<RetrievedDocument>) -> Self {
        Self {
            documents,
            queries: Mutex::new(Vec::new()),
        }
    }

    pub fn queries(&self) -> Vec<String> {
        self.queries.lock().unwrap().clone()
    }
}

#[async_trait]
impl Retriever for StaticRetriever {
    fn name(&self) -> &str {
        "static"
    }

    async fn search(&self, query: &str) -> Result<Vec<RetrievedDocument>, RetrievalError> {
        self.queries.lock().unwrap().push(query.to_string());
        Ok(self.documents.clone())
    }
}

/// Always fails.
pub struct FailingRetriever;

#[async_trait]
impl Retriever for FailingRetriever {
    fn name(&self) -> &str {
        "failing"
    }

    async fn search(&self, _query: &str) -> Result<Vec<RetrievedDocument>, RetrievalError> {
        Err(RetrievalError::SearchFailed("index offline".into()))
    }
}

/// A log that refuses any batch carrying an assistant message.
#[derive(Default)]
pub struct AnswerRejectingLog {
    messages: Mutex<Vec<Message>>,
}

#[async_trait]
impl ConversationLog for AnswerRejectingLog {
    fn name(&self) -> &str {
        "answer_rejecting"
    }

    async fn history(&self, _session_id: &str) -> Result<Vec<Message>, LogError> {
        Ok(self.messages.lock().unwrap().clone())
    }

    async fn append_all(&self, _session_id: &str, messages: Vec<Message>) -> Result<(), LogError> {
        if messages.iter().any(|m| m.role == Role::Assistant) {
            return Err(LogError::Storage("disk full".into()));
        }
        self.messages.lock().unwrap().extend(messages);
        Ok(())
    }
}
