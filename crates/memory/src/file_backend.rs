//! File-based conversation log using JSON lines.
//!
//! One file per session under a root directory: `{root}/{session_id}.jsonl`,
//! one `Message` per line. Appends open the file in append mode, so a
//! transcript is never rewritten.

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::{debug, warn};
use turnwise_core::error::LogError;
use turnwise_core::memory::ConversationLog;
use turnwise_core::message::Message;

pub struct JsonlConversationLog {
    root: PathBuf,
    /// Serializes appends so lines from concurrent writers never interleave.
    write_lock: Mutex<()>,
}

impl JsonlConversationLog {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            write_lock: Mutex::new(()),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// File for a session. Bytes outside `[A-Za-z0-9-]` are written as `_xx`
    /// hex escapes, so distinct ids never share a file and no id can leave
    /// the root directory.
    fn session_path(&self, session_id: &str) -> PathBuf {
        let mut name = String::with_capacity(session_id.len() + 6);
        for byte in session_id.bytes() {
            if byte.is_ascii_alphanumeric() || byte == b'-' {
                name.push(char::from(byte));
            } else {
                name.push_str(&format!("_{byte:02x}"));
            }
        }
        name.push_str(".jsonl");
        self.root.join(name)
    }
}

#[async_trait]
impl ConversationLog for JsonlConversationLog {
    fn name(&self) -> &str {
        "jsonl"
    }

    async fn history(&self, session_id: &str) -> Result<Vec<Message>, LogError> {
        let path = self.session_path(session_id);
        let content = match tokio::fs::read_to_string(&path).await {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => {
                return Err(LogError::ReadFailed {
                    session_id: session_id.to_string(),
                    reason: e.to_string(),
                });
            }
        };

        let messages: Vec<Message> = content
            .lines()
            .filter(|line| !line.trim().is_empty())
            .filter_map(|line| match serde_json::from_str::<Message>(line) {
                Ok(msg) => Some(msg),
                Err(e) => {
                    warn!(session_id, error = %e, "Skipping corrupted transcript line");
                    None
                }
            })
            .collect();

        debug!(session_id, count = messages.len(), "Transcript loaded");
        Ok(messages)
    }

    async fn append_all(&self, session_id: &str, messages: Vec<Message>) -> Result<(), LogError> {
        if messages.is_empty() {
            return Ok(());
        }
        let mut lines = String::new();
        for message in &messages {
            let line = serde_json::to_string(message)
                .map_err(|e| LogError::Storage(format!("Failed to serialize message: {e}")))?;
            lines.push_str(&line);
            lines.push('\n');
        }

        let _guard = self.write_lock.lock().await;
        tokio::fs::create_dir_all(&self.root)
            .await
            .map_err(|e| LogError::Storage(format!("Failed to create session directory: {e}")))?;

        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(self.session_path(session_id))
            .await
            .map_err(|e| LogError::Storage(format!("Failed to open transcript: {e}")))?;
        // One write per batch, so a turn's lines land together
        file.write_all(lines.as_bytes())
            .await
            .map_err(|e| LogError::Storage(format!("Failed to write transcript: {e}")))?;
        file.flush()
            .await
            .map_err(|e| LogError::Storage(format!("Failed to flush transcript: {e}")))?;
        debug!(session_id, count = messages.len(), "Transcript appended");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use turnwise_core::message::Role;

    #[tokio::test]
    async fn append_persists_across_instances() {
        let dir = tempfile::tempdir().unwrap();

        let log = JsonlConversationLog::new(dir.path());
        log.append("s1", Message::user("What plan am I on?")).await.unwrap();
        log.append("s1", Message::assistant("Shopify Plus.")).await.unwrap();

        let reopened = JsonlConversationLog::new(dir.path());
        let history = reopened.history("s1").await.unwrap();
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].role, Role::User);
        assert_eq!(history[1].content, "Shopify Plus.");
    }

    #[tokio::test]
    async fn missing_session_file_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let log = JsonlConversationLog::new(dir.path().join("not-yet-created"));
        assert!(log.history("s1").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn corrupted_lines_are_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let log = JsonlConversationLog::new(dir.path());
        log.append("s1", Message::user("first")).await.unwrap();

        let path = dir.path().join("s1.jsonl");
        let mut content = std::fs::read_to_string(&path).unwrap();
        content.push_str("{not json}\n");
        std::fs::write(&path, content).unwrap();
        log.append("s1", Message::user("second")).await.unwrap();

        let history = log.history("s1").await.unwrap();
        assert_eq!(history.len(), 2);
        assert_eq!(history[1].content, "second");
    }

    #[tokio::test]
    async fn session_ids_are_escaped() {
        let dir = tempfile::tempdir().unwrap();
        let log = JsonlConversationLog::new(dir.path());
        log.append("../escape", Message::user("hi")).await.unwrap();

        assert!(dir.path().join("_2e_2e_2fescape.jsonl").exists());
        assert_eq!(log.len("../escape").await.unwrap(), 1);
    }

    #[tokio::test]
    async fn similar_session_ids_stay_isolated() {
        let dir = tempfile::tempdir().unwrap();
        let log = JsonlConversationLog::new(dir.path());
        log.append("alice.b", Message::user("secret from alice.b")).await.unwrap();
        log.append("alice_b", Message::user("hello from alice_b")).await.unwrap();

        let dotted = log.history("alice.b").await.unwrap();
        let underscored = log.history("alice_b").await.unwrap();
        assert_eq!(dotted.len(), 1);
        assert_eq!(dotted[0].content, "secret from alice.b");
        assert_eq!(underscored.len(), 1);
        assert_eq!(underscored[0].content, "hello from alice_b");
        assert!(log.history("alice_5fb").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn append_all_writes_turn_together() {
        let dir = tempfile::tempdir().unwrap();
        let log = JsonlConversationLog::new(dir.path());
        log.append_all(
            "s1",
            vec![Message::user("How do I refund?"), Message::assistant("Open the order.")],
        )
        .await
        .unwrap();
        log.append_all("s1", Vec::new()).await.unwrap();

        let history = log.history("s1").await.unwrap();
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].role, Role::User);
        assert_eq!(history[1].role, Role::Assistant);
    }
}
