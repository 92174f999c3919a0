//! The per-turn pipeline.
//!
//! A turn moves through three steps:
//!
//! 1. **Prepare**: snapshot the session, analyze the message, maybe
//!    compress, build the contextual query and select a bounded context.
//!    Nothing is written to the session.
//! 2. **Generate**: the caller (or [`ConversationEngine::run_turn`]) sends
//!    the rendered prompt to the text generator.
//! 3. **Commit**: apply the turn's delta to the session under a brief lock.
//!
//! The session lock is never held across a collaborator call, and commits
//! apply deltas rather than overwriting, so two turns racing on the same
//! session both land. An ambiguous message short-circuits after step 1 with
//! a clarification question and never advances the turn count.

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use turnwise_config::AppConfig;
use turnwise_core::document::RetrievedDocument;
use turnwise_core::error::{Error, GenerationError, RetrievalError};
use turnwise_core::memory::ConversationLog;
use turnwise_core::message::{Message, SourceRef};
use turnwise_core::provider::TextGenerator;
use turnwise_core::retriever::Retriever;

use crate::context::token::TokenCounter;
use crate::context::window::{ContextBudgetResult, ContextWindowManager};
use crate::dialogue::analyzer::{CLARIFICATION_MARKER, DialogueAnalyzer, FollowUpDetection, TurnAnalysis};
use crate::dialogue::compressor::{CompressionOutcome, CompressionSchedule, ContextCompressor};
use crate::dialogue::state::{DialogueState, TurnDelta, UserPreferences};
use crate::dialogue::store::{ConversationStateStore, SessionHandle, SessionStats};
use crate::prompt::{DEFAULT_SYSTEM_PROMPT, PromptInput, build_contextual_query, render_prompt};

// ── Results ───────────────────────────────────────────────────────────────

/// What a turn produced, independent of generation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TurnContext {
    pub session_id: String,
    /// The turn number this message is (or would have been) answered as.
    pub turn: u64,
    pub contextual_query: String,
    /// `None` when the turn short-circuited for clarification.
    pub context_budget: Option<ContextBudgetResult>,
    pub needs_clarification: bool,
    pub clarification_question: Option<String>,
    pub follow_up: FollowUpDetection,
    pub compressed: bool,
}

/// A prepared, not yet committed, turn.
#[derive(Debug, Clone)]
pub struct PreparedTurn {
    pub context: TurnContext,
    pub analysis: TurnAnalysis,
    /// Applied to the session by [`ConversationEngine::commit_turn`].
    pub delta: TurnDelta,
    /// Session preferences with this turn's signals merged in.
    pub preferences: UserPreferences,
    pub compression: Option<CompressionOutcome>,
    pub system_prompt: String,
    session: SessionHandle,
}

impl PreparedTurn {
    pub fn needs_clarification(&self) -> bool {
        self.context.needs_clarification
    }

    /// The generation prompt, or `None` for a clarification turn.
    pub fn prompt(&self) -> Option<String> {
        let budget = self.context.context_budget.as_ref()?;
        Some(render_prompt(&PromptInput {
            system_prompt: &self.system_prompt,
            turn: self.context.turn,
            preferences: &self.preferences,
            is_follow_up: self.context.follow_up.is_follow_up,
            messages: &budget.selected_messages,
            documents: &budget.selected_documents,
            contextual_query: &self.context.contextual_query,
        }))
    }
}

/// The answer to a fully processed turn.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TurnResponse {
    /// The generated answer, or the clarification question.
    pub answer: String,
    pub sources: Vec<SourceRef>,
    pub context: TurnContext,
}

// ── Engine ────────────────────────────────────────────────────────────────

/// Orchestrates analysis, compression, context selection and generation
/// for every session.
pub struct ConversationEngine {
    generator: Arc<dyn TextGenerator>,
    store: Arc<ConversationStateStore>,
    analyzer: DialogueAnalyzer,
    compressor: ContextCompressor,
    window: ContextWindowManager,
    system_prompt: String,
    max_tokens: usize,
    follow_up_context_messages: usize,
    generation_timeout: Duration,
    retrieval_timeout: Duration,
}

impl ConversationEngine {
    /// Create an engine with default settings and an unbounded session store.
    pub fn new(generator: Arc<dyn TextGenerator>, counter: TokenCounter) -> Self {
        Self {
            compressor: ContextCompressor::new(generator.clone()),
            generator,
            store: Arc::new(ConversationStateStore::default()),
            analyzer: DialogueAnalyzer::new(),
            window: ContextWindowManager::new(counter),
            system_prompt: DEFAULT_SYSTEM_PROMPT.to_string(),
            max_tokens: 6000,
            follow_up_context_messages: 3,
            generation_timeout: Duration::from_secs(60),
            retrieval_timeout: Duration::from_secs(15),
        }
    }

    pub fn from_config(
        generator: Arc<dyn TextGenerator>,
        counter: TokenCounter,
        config: &AppConfig,
    ) -> Self {
        Self {
            compressor: ContextCompressor::from_config(generator.clone(), config),
            generator,
            store: Arc::new(ConversationStateStore::from_config(&config.sessions)),
            analyzer: DialogueAnalyzer::from_config(&config.dialogue),
            window: ContextWindowManager::from_config(counter, &config.context),
            system_prompt: config
                .system_prompt
                .clone()
                .unwrap_or_else(|| DEFAULT_SYSTEM_PROMPT.to_string()),
            max_tokens: config.context.max_tokens,
            follow_up_context_messages: config.dialogue.follow_up_context_messages,
            generation_timeout: config.timeouts.generation(),
            retrieval_timeout: config.timeouts.retrieval(),
        }
    }

    /// Share a session store between engines.
    pub fn with_store(mut self, store: Arc<ConversationStateStore>) -> Self {
        self.store = store;
        self
    }

    pub fn with_analyzer(mut self, analyzer: DialogueAnalyzer) -> Self {
        self.analyzer = analyzer;
        self
    }

    pub fn with_compression_schedule(mut self, schedule: CompressionSchedule) -> Self {
        self.compressor = self.compressor.with_schedule(schedule);
        self
    }

    pub fn with_system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.system_prompt = prompt.into();
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: usize) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    pub fn with_generation_timeout(mut self, timeout: Duration) -> Self {
        self.generation_timeout = timeout;
        self
    }

    pub fn with_retrieval_timeout(mut self, timeout: Duration) -> Self {
        self.retrieval_timeout = timeout;
        self
    }

    pub fn store(&self) -> &Arc<ConversationStateStore> {
        &self.store
    }

    pub fn window(&self) -> &ContextWindowManager {
        &self.window
    }

    // ── Turn steps ────────────────────────────────────────────────────────

    /// Analyze, maybe compress, and build the contextual query.
    ///
    /// Returns the turn with `context_budget` unset; selection happens once
    /// the candidate documents are known.
    async fn plan_turn(
        &self,
        session_id: &str,
        message: &str,
        history: &[Message],
        system_prompt: Option<&str>,
    ) -> PreparedTurn {
        let session = self.store.get(session_id).await;
        let state: DialogueState = session.snapshot().await;
        let turn = state.turn_count + 1;

        let analysis = self.analyzer.analyze(message, history);
        debug!(
            session_id,
            turn,
            follow_up = analysis.follow_up.is_follow_up,
            ambiguous = analysis.ambiguity.needs_clarification,
            "Message analyzed"
        );

        let mut preferences = state.user_preferences.clone();
        preferences.merge(&analysis.preferences);
        let system_prompt = system_prompt.unwrap_or(&self.system_prompt).to_string();

        if analysis.ambiguity.needs_clarification {
            info!(session_id, turn, "Clarification needed, skipping generation");
            return PreparedTurn {
                context: TurnContext {
                    session_id: session_id.to_string(),
                    turn: state.turn_count,
                    contextual_query: message.to_string(),
                    context_budget: None,
                    needs_clarification: true,
                    clarification_question: analysis.ambiguity.clarification_question.clone(),
                    follow_up: analysis.follow_up,
                    compressed: false,
                },
                delta: TurnDelta::default(),
                preferences,
                compression: None,
                system_prompt,
                analysis,
                session,
            };
        }

        let compression = self.compressor.maybe_compress(&state, turn, history).await;
        let summary = compression
            .as_ref()
            .map(|c| c.summary.as_str())
            .or(state.context_summary.as_deref());

        let contextual_query = build_contextual_query(
            message,
            history,
            analysis.follow_up.is_follow_up,
            summary,
            &preferences,
            self.follow_up_context_messages,
        );

        let delta = TurnDelta {
            preferences: analysis.preferences.clone(),
            merchant_profile: analysis.merchant_profile.clone(),
            summary: compression.as_ref().map(|c| c.summary.clone()),
            clear_pending_clarification: true,
        };

        PreparedTurn {
            context: TurnContext {
                session_id: session_id.to_string(),
                turn,
                contextual_query,
                context_budget: None,
                needs_clarification: false,
                clarification_question: None,
                follow_up: analysis.follow_up,
                compressed: compression.is_some(),
            },
            delta,
            preferences,
            compression,
            system_prompt,
            analysis,
            session,
        }
    }

    fn select(
        &self,
        prepared: &mut PreparedTurn,
        history: &[Message],
        documents: &[RetrievedDocument],
        max_tokens: Option<usize>,
    ) {
        if prepared.needs_clarification() {
            return;
        }
        let budget = self.window.select_context(
            history,
            documents,
            &prepared.system_prompt,
            max_tokens.unwrap_or(self.max_tokens),
        );
        prepared.context.context_budget = Some(budget);
    }

    /// Everything up to generation. Does not modify the session.
    pub async fn prepare_turn(
        &self,
        session_id: &str,
        message: &str,
        history: &[Message],
        documents: &[RetrievedDocument],
        system_prompt: Option<&str>,
        max_tokens: Option<usize>,
    ) -> PreparedTurn {
        let mut prepared = self.plan_turn(session_id, message, history, system_prompt).await;
        self.select(&mut prepared, history, documents, max_tokens);
        prepared
    }

    /// Apply a prepared turn to its session. Returns the new turn count.
    ///
    /// Clarification turns leave the session untouched.
    pub async fn commit_turn(&self, prepared: &PreparedTurn) -> u64 {
        let mut state = prepared.session.lock().await;
        if prepared.needs_clarification() {
            return state.turn_count;
        }
        state.apply(&prepared.delta);
        debug!(
            session_id = prepared.session.session_id(),
            turn_count = state.turn_count,
            last_compression_turn = state.last_compression_turn,
            "Turn committed"
        );
        state.turn_count
    }

    /// Prepare and commit in one step, for callers that generate elsewhere.
    pub async fn process_turn(
        &self,
        session_id: &str,
        message: &str,
        history: &[Message],
        documents: &[RetrievedDocument],
        system_prompt: Option<&str>,
        max_tokens: Option<usize>,
    ) -> TurnContext {
        let prepared = self
            .prepare_turn(session_id, message, history, documents, system_prompt, max_tokens)
            .await;
        self.commit_turn(&prepared).await;
        prepared.context
    }

    /// The full pipeline: history, retrieval, selection, generation, commit.
    ///
    /// On any collaborator failure the session is left as it was and the
    /// error is returned; [`Error::user_message`] gives a safe reply. The
    /// question and answer reach the log in one `append_all`, so a failed
    /// write never leaves half a turn behind.
    pub async fn run_turn(
        &self,
        session_id: &str,
        message: &str,
        log: &dyn ConversationLog,
        retriever: &dyn Retriever,
        system_prompt: Option<&str>,
        max_tokens: Option<usize>,
    ) -> Result<TurnResponse, Error> {
        let history = log.history(session_id).await?;
        let mut prepared = self.plan_turn(session_id, message, &history, system_prompt).await;

        if prepared.needs_clarification() {
            let question = prepared.context.clarification_question.clone().unwrap_or_default();
            log.append_all(
                session_id,
                vec![Message::user(message), Message::assistant(question.clone())],
            )
            .await?;
            return Ok(TurnResponse {
                answer: question,
                sources: Vec::new(),
                context: prepared.context,
            });
        }

        let documents = self.retrieve(retriever, &prepared.context.contextual_query).await?;
        self.select(&mut prepared, &history, &documents, max_tokens);

        let prompt = prepared
            .prompt()
            .ok_or_else(|| Error::Internal("prepared turn has no context budget".into()))?;
        let answer = self.generate(&prompt).await?;

        let sources: Vec<SourceRef> = prepared
            .context
            .context_budget
            .as_ref()
            .map(|b| b.selected_documents.iter().map(RetrievedDocument::to_source_ref).collect())
            .unwrap_or_default();

        log.append_all(
            session_id,
            vec![
                Message::user(message),
                Message::assistant_with_sources(answer.clone(), sources.clone()),
            ],
        )
        .await?;
        let turn_count = self.commit_turn(&prepared).await;

        info!(
            session_id,
            turn = turn_count,
            total_tokens = prepared
                .context
                .context_budget
                .as_ref()
                .map_or(0, |b| b.token_usage.total_tokens),
            sources = sources.len(),
            "Turn completed"
        );

        Ok(TurnResponse {
            answer,
            sources,
            context: prepared.context,
        })
    }

    async fn retrieve(
        &self,
        retriever: &dyn Retriever,
        query: &str,
    ) -> Result<Vec<RetrievedDocument>, RetrievalError> {
        match tokio::time::timeout(self.retrieval_timeout, retriever.search(query)).await {
            Ok(Ok(documents)) => {
                debug!(retriever = retriever.name(), count = documents.len(), "Documents retrieved");
                Ok(documents)
            }
            Ok(Err(e)) => {
                warn!(retriever = retriever.name(), error = %e, "Retrieval failed");
                Err(e)
            }
            Err(_) => {
                warn!(retriever = retriever.name(), "Retrieval timed out");
                Err(RetrievalError::Timeout(format!(
                    "no results within {}s",
                    self.retrieval_timeout.as_secs()
                )))
            }
        }
    }

    async fn generate(&self, prompt: &str) -> Result<String, GenerationError> {
        let result = tokio::time::timeout(self.generation_timeout, self.generator.generate(prompt)).await;
        match result {
            Ok(Ok(text)) if text.trim().is_empty() => Err(GenerationError::EmptyResponse),
            Ok(Ok(text)) => Ok(text),
            Ok(Err(e)) => {
                warn!(generator = self.generator.name(), error = %e, "Generation failed");
                Err(e)
            }
            Err(_) => {
                warn!(generator = self.generator.name(), "Generation timed out");
                Err(GenerationError::Timeout(format!(
                    "no answer within {}s",
                    self.generation_timeout.as_secs()
                )))
            }
        }
    }

    // ── Session operations ────────────────────────────────────────────────

    /// Record the user's answer to a clarification question and return the
    /// clarified query to submit as the next message.
    pub async fn resolve_clarification(
        &self,
        session_id: &str,
        response: &str,
        original_question: &str,
    ) -> String {
        let session = self.store.get(session_id).await;
        session.lock().await.ambiguity_flags.pending_clarification =
            Some(original_question.to_string());
        format!("{original_question} {CLARIFICATION_MARKER} {response})")
    }

    pub async fn stats(&self, session_id: &str) -> Option<SessionStats> {
        self.store.stats(session_id).await
    }

    /// Forget a session's dialogue state. Unknown sessions are a no-op.
    pub async fn cleanup(&self, session_id: &str) {
        self.store.remove(session_id).await;
    }

    /// Drop sessions idle past the configured TTL.
    pub async fn evict_expired(&self) -> usize {
        let evicted = self.store.evict_expired().await;
        if evicted > 0 {
            info!(evicted, "Idle sessions evicted");
        }
        evicted
    }
}
