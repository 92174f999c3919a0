//! Conversation log trait: append-only transcript storage.
//!
//! The log owns raw messages. Turnwise reads a session's history at the
//! start of a turn and appends the user message and the assistant answer
//! together once the turn succeeds. How the log is persisted is up to the backend.

use async_trait::async_trait;

use crate::error::LogError;
use crate::message::Message;

/// The core conversation log trait.
#[async_trait]
pub trait ConversationLog: Send + Sync {
    /// Backend name (e.g. "in_memory", "mongo").
    fn name(&self) -> &str;

    /// Full ordered history for a session. Unknown sessions yield an empty list.
    async fn history(&self, session_id: &str) -> Result<Vec<Message>, LogError>;

    /// Append messages to a session's history as one unit: either all of
    /// them are stored or none are.
    async fn append_all(&self, session_id: &str, messages: Vec<Message>) -> Result<(), LogError>;

    /// Append a single message to a session's history.
    async fn append(&self, session_id: &str, message: Message) -> Result<(), LogError> {
        self.append_all(session_id, vec![message]).await
    }

    /// Number of messages stored for a session.
    async fn len(&self, session_id: &str) -> Result<usize, LogError> {
        Ok(self.history(session_id).await?.len())
    }
}
