//! Process-wide session store.
//!
//! Maps session id → dialogue state. The map sits behind a `tokio` RwLock
//! and each session's state behind its own async Mutex, so turns on
//! different sessions never contend and turns on the same session
//! serialize only for their read-modify-write.
//!
//! The map is bounded: an optional LRU capacity and an optional idle TTL.
//! A handle to an evicted session stays usable, but whatever is written
//! through it after eviction is not visible to later lookups.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::{Mutex, MutexGuard, RwLock};
use tokio::time::Instant;
use tracing::debug;
use turnwise_config::SessionConfig;

use crate::dialogue::state::{DialogueState, MerchantProfile, UserPreferences};

/// Bounds on how many sessions are kept and for how long.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EvictionPolicy {
    pub max_sessions: Option<usize>,
    pub idle_ttl: Option<Duration>,
}

impl EvictionPolicy {
    pub fn unbounded() -> Self {
        Self::default()
    }

    pub fn from_config(config: &SessionConfig) -> Self {
        Self {
            max_sessions: config.max_sessions,
            idle_ttl: config.idle_ttl(),
        }
    }
}

/// Shared access to one session's state.
#[derive(Debug, Clone)]
pub struct SessionHandle {
    session_id: Arc<str>,
    state: Arc<Mutex<DialogueState>>,
}

impl SessionHandle {
    fn new(session_id: &str, state: DialogueState) -> Self {
        Self {
            session_id: Arc::from(session_id),
            state: Arc::new(Mutex::new(state)),
        }
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    /// Copy of the current state. The lock is released before returning.
    pub async fn snapshot(&self) -> DialogueState {
        self.state.lock().await.clone()
    }

    /// Exclusive access for a read-modify-write. Keep the guard short-lived.
    pub async fn lock(&self) -> MutexGuard<'_, DialogueState> {
        self.state.lock().await
    }
}

/// Read-only view of a session for observability.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionStats {
    pub turn_count: u64,
    pub last_compression_turn: u64,
    pub has_context_summary: bool,
    pub user_preferences: UserPreferences,
    pub merchant_profile: MerchantProfile,
    pub pending_clarification: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<&DialogueState> for SessionStats {
    fn from(state: &DialogueState) -> Self {
        Self {
            turn_count: state.turn_count,
            last_compression_turn: state.last_compression_turn,
            has_context_summary: state.context_summary.is_some(),
            user_preferences: state.user_preferences.clone(),
            merchant_profile: state.merchant_profile.clone(),
            pending_clarification: state.ambiguity_flags.pending_clarification.clone(),
            created_at: state.created_at,
            updated_at: state.updated_at,
        }
    }
}

struct Slot {
    handle: SessionHandle,
    last_access: Instant,
}

/// Bounded map of session id → dialogue state.
pub struct ConversationStateStore {
    sessions: RwLock<HashMap<String, Slot>>,
    policy: EvictionPolicy,
}

impl Default for ConversationStateStore {
    fn default() -> Self {
        Self::new(EvictionPolicy::unbounded())
    }
}

impl ConversationStateStore {
    pub fn new(policy: EvictionPolicy) -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
            policy,
        }
    }

    pub fn from_config(config: &SessionConfig) -> Self {
        Self::new(EvictionPolicy::from_config(config))
    }

    pub fn policy(&self) -> EvictionPolicy {
        self.policy
    }

    fn is_expired(&self, slot: &Slot, now: Instant) -> bool {
        self.policy
            .idle_ttl
            .is_some_and(|ttl| now.duration_since(slot.last_access) > ttl)
    }

    /// Handle for a session, creating zeroed state on first use.
    ///
    /// A session idle past the TTL is discarded and recreated.
    pub async fn get(&self, session_id: &str) -> SessionHandle {
        let now = Instant::now();
        let mut sessions = self.sessions.write().await;

        if let Some(slot) = sessions.get_mut(session_id) {
            if !self.is_expired(slot, now) {
                slot.last_access = now;
                return slot.handle.clone();
            }
            debug!(session_id, "Session expired, starting fresh");
            sessions.remove(session_id);
        }

        let handle = SessionHandle::new(session_id, DialogueState::new());
        sessions.insert(
            session_id.to_string(),
            Slot {
                handle: handle.clone(),
                last_access: now,
            },
        );
        self.enforce_capacity(&mut sessions, session_id);
        debug!(session_id, sessions = sessions.len(), "Session created");
        handle
    }

    /// Handle for an existing, unexpired session. Does not create or touch.
    pub async fn peek(&self, session_id: &str) -> Option<SessionHandle> {
        let now = Instant::now();
        let sessions = self.sessions.read().await;
        sessions
            .get(session_id)
            .filter(|slot| !self.is_expired(slot, now))
            .map(|slot| slot.handle.clone())
    }

    pub async fn stats(&self, session_id: &str) -> Option<SessionStats> {
        let handle = self.peek(session_id).await?;
        let state = handle.lock().await;
        Some(SessionStats::from(&*state))
    }

    /// Copy of a session's state, for persisting to an external store.
    pub async fn snapshot(&self, session_id: &str) -> Option<DialogueState> {
        let handle = self.peek(session_id).await?;
        Some(handle.snapshot().await)
    }

    /// Install state loaded from an external store.
    ///
    /// Replaces the state in place when the session is live, so handles
    /// already held by in-flight turns observe it.
    pub async fn restore(&self, session_id: &str, state: DialogueState) {
        let now = Instant::now();
        let live = {
            let mut sessions = self.sessions.write().await;
            match sessions.get_mut(session_id) {
                Some(slot) => {
                    slot.last_access = now;
                    Some(slot.handle.clone())
                }
                None => {
                    sessions.insert(
                        session_id.to_string(),
                        Slot {
                            handle: SessionHandle::new(session_id, state.clone()),
                            last_access: now,
                        },
                    );
                    self.enforce_capacity(&mut sessions, session_id);
                    None
                }
            }
        };
        // The map lock is released before taking the session lock
        if let Some(handle) = live {
            *handle.lock().await = state;
        }
        debug!(session_id, "Session state restored");
    }

    /// Remove a session. Unknown ids are a no-op.
    pub async fn remove(&self, session_id: &str) -> bool {
        let removed = self.sessions.write().await.remove(session_id).is_some();
        if removed {
            debug!(session_id, "Session removed");
        }
        removed
    }

    /// Drop every session idle past the TTL. Returns how many were dropped.
    pub async fn evict_expired(&self) -> usize {
        if self.policy.idle_ttl.is_none() {
            return 0;
        }
        let now = Instant::now();
        let mut sessions = self.sessions.write().await;
        let before = sessions.len();
        sessions.retain(|_, slot| !self.is_expired(slot, now));
        let evicted = before - sessions.len();
        if evicted > 0 {
            debug!(evicted, remaining = sessions.len(), "Expired sessions evicted");
        }
        evicted
    }

    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.sessions.read().await.is_empty()
    }

    fn enforce_capacity(&self, sessions: &mut HashMap<String, Slot>, keep: &str) {
        let Some(max) = self.policy.max_sessions else {
            return;
        };
        while sessions.len() > max {
            let oldest = sessions
                .iter()
                .filter(|(id, _)| id.as_str() != keep)
                .min_by_key(|(_, slot)| slot.last_access)
                .map(|(id, _)| id.clone());
            match oldest {
                Some(id) => {
                    sessions.remove(&id);
                    debug!(session_id = %id, "Least recently used session evicted");
                }
                None => break,
            }
        }
    }
}
