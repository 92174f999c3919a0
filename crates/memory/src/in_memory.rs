//! In-memory conversation log, useful for testing and ephemeral sessions.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use turnwise_core::error::LogError;
use turnwise_core::memory::ConversationLog;
use turnwise_core::message::Message;

/// Stores each session's transcript in a Vec keyed by session id.
/// Nothing survives the process.
#[derive(Clone)]
pub struct InMemoryConversationLog {
    sessions: Arc<RwLock<HashMap<String, Vec<Message>>>>,
}

impl InMemoryConversationLog {
    pub fn new() -> Self {
        Self {
            sessions: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Number of sessions with at least one message.
    pub async fn session_count(&self) -> usize {
        self.sessions.read().await.len()
    }

    /// Drop a session's transcript. Returns whether anything was removed.
    pub async fn clear_session(&self, session_id: &str) -> bool {
        self.sessions.write().await.remove(session_id).is_some()
    }
}

impl Default for InMemoryConversationLog {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ConversationLog for InMemoryConversationLog {
    fn name(&self) -> &str {
        "in_memory"
    }

    async fn history(&self, session_id: &str) -> Result<Vec<Message>, LogError> {
        let sessions = self.sessions.read().await;
        Ok(sessions.get(session_id).cloned().unwrap_or_default())
    }

    async fn append_all(&self, session_id: &str, messages: Vec<Message>) -> Result<(), LogError> {
        if messages.is_empty() {
            return Ok(());
        }
        self.sessions
            .write()
            .await
            .entry(session_id.to_string())
            .or_default()
            .extend(messages);
        Ok(())
    }

    async fn len(&self, session_id: &str) -> Result<usize, LogError> {
        Ok(self
            .sessions
            .read()
            .await
            .get(session_id)
            .map_or(0, Vec::len))
    }
}
