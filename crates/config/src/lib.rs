//! Configuration loading, validation, and management for Turnwise.
//!
//! Loads configuration from `~/.turnwise/config.toml` with environment
//! variable overrides. Validates all settings at startup.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// The root configuration structure.
///
/// Maps directly to `~/.turnwise/config.toml`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Default system prompt used when the caller does not supply one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system_prompt: Option<String>,

    /// Token budgeting
    #[serde(default)]
    pub context: ContextConfig,

    /// Dialogue state machine
    #[serde(default)]
    pub dialogue: DialogueConfig,

    /// Session store bounds
    #[serde(default)]
    pub sessions: SessionConfig,

    /// Collaborator timeouts
    #[serde(default)]
    pub timeouts: TimeoutConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContextConfig {
    /// Total token budget per generation call
    #[serde(default = "default_max_tokens")]
    pub max_tokens: usize,

    /// Share of the post-system budget reserved for history (0.0–1.0]
    #[serde(default = "default_message_share")]
    pub message_share: f32,

    /// Messages kept by the fail-soft fixed window
    #[serde(default = "default_fallback_window")]
    pub fallback_window: usize,

    /// Per-message formatting overhead in tokens
    #[serde(default = "default_message_overhead")]
    pub message_overhead: usize,

    /// Per-document formatting overhead in tokens
    #[serde(default = "default_document_overhead")]
    pub document_overhead: usize,

    /// BPE encoding name
    #[serde(default = "default_encoding")]
    pub encoding: String,
}

fn default_max_tokens() -> usize {
    6000
}
fn default_message_share() -> f32 {
    0.7
}
fn default_fallback_window() -> usize {
    8
}
fn default_message_overhead() -> usize {
    3
}
fn default_document_overhead() -> usize {
    10
}
fn default_encoding() -> String {
    "cl100k_base".into()
}

impl Default for ContextConfig {
    fn default() -> Self {
        Self {
            max_tokens: default_max_tokens(),
            message_share: default_message_share(),
            fallback_window: default_fallback_window(),
            message_overhead: default_message_overhead(),
            document_overhead: default_document_overhead(),
            encoding: default_encoding(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DialogueConfig {
    /// Summarize every N turns
    #[serde(default = "default_compression_interval")]
    pub compression_interval: u64,

    /// Turn count at which compression is forced
    #[serde(default = "default_max_turns")]
    pub max_turns: u64,

    /// Upper bound on summary length in words
    #[serde(default = "default_summary_max_words")]
    pub summary_max_words: usize,

    /// Messages quoted into a follow-up query
    #[serde(default = "default_follow_up_context")]
    pub follow_up_context_messages: usize,

    /// When set, a message is a follow-up only if its confidence reaches this value
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub follow_up_confidence_gate: Option<f32>,
}

fn default_compression_interval() -> u64 {
    10
}
fn default_max_turns() -> u64 {
    20
}
fn default_summary_max_words() -> usize {
    200
}
fn default_follow_up_context() -> usize {
    3
}

impl Default for DialogueConfig {
    fn default() -> Self {
        Self {
            compression_interval: default_compression_interval(),
            max_turns: default_max_turns(),
            summary_max_words: default_summary_max_words(),
            follow_up_context_messages: default_follow_up_context(),
            follow_up_confidence_gate: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Maximum live sessions; least recently used are evicted beyond this
    #[serde(default = "default_max_sessions", skip_serializing_if = "Option::is_none")]
    pub max_sessions: Option<usize>,

    /// Idle sessions older than this are expired
    #[serde(default = "default_idle_ttl", skip_serializing_if = "Option::is_none")]
    pub idle_ttl_secs: Option<u64>,
}

fn default_max_sessions() -> Option<usize> {
    Some(10_000)
}
fn default_idle_ttl() -> Option<u64> {
    Some(60 * 60)
}

impl SessionConfig {
    pub fn idle_ttl(&self) -> Option<Duration> {
        self.idle_ttl_secs.map(Duration::from_secs)
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            max_sessions: default_max_sessions(),
            idle_ttl_secs: default_idle_ttl(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimeoutConfig {
    #[serde(default = "default_generation_timeout")]
    pub generation_secs: u64,

    #[serde(default = "default_summary_timeout")]
    pub summary_secs: u64,

    #[serde(default = "default_retrieval_timeout")]
    pub retrieval_secs: u64,
}

fn default_generation_timeout() -> u64 {
    60
}
fn default_summary_timeout() -> u64 {
    30
}
fn default_retrieval_timeout() -> u64 {
    15
}

impl TimeoutConfig {
    pub fn generation(&self) -> Duration {
        Duration::from_secs(self.generation_secs)
    }

    pub fn summary(&self) -> Duration {
        Duration::from_secs(self.summary_secs)
    }

    pub fn retrieval(&self) -> Duration {
        Duration::from_secs(self.retrieval_secs)
    }
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            generation_secs: default_generation_timeout(),
            summary_secs: default_summary_timeout(),
            retrieval_secs: default_retrieval_timeout(),
        }
    }
}

impl AppConfig {
    /// Load configuration from the default path (~/.turnwise/config.toml).
    ///
    /// Environment overrides (highest priority):
    /// - `TURNWISE_MAX_TOKENS`
    /// - `TURNWISE_COMPRESSION_INTERVAL`
    /// - `TURNWISE_SYSTEM_PROMPT`
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_with_env(&Self::config_dir().join("config.toml"))
    }

    /// Load from `path`, then apply environment overrides.
    pub fn load_with_env(path: &Path) -> Result<Self, ConfigError> {
        let mut config = Self::load_from(path)?;
        config.apply_env_overrides()?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a specific file path.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            tracing::info!("No config file found at {}, using defaults", path.display());
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        let config: Self = toml::from_str(&content).map_err(|e| ConfigError::ParseError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        config.validate()?;
        Ok(config)
    }

    fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        if let Ok(raw) = std::env::var("TURNWISE_MAX_TOKENS") {
            self.context.max_tokens = parse_env("TURNWISE_MAX_TOKENS", &raw)?;
        }
        if let Ok(raw) = std::env::var("TURNWISE_COMPRESSION_INTERVAL") {
            self.dialogue.compression_interval = parse_env("TURNWISE_COMPRESSION_INTERVAL", &raw)?;
        }
        if let Ok(prompt) = std::env::var("TURNWISE_SYSTEM_PROMPT") {
            self.system_prompt = Some(prompt);
        }
        Ok(())
    }

    /// Get the configuration directory path.
    pub fn config_dir() -> PathBuf {
        dirs_home().join(".turnwise")
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(self.context.message_share > 0.0 && self.context.message_share <= 1.0) {
            return Err(ConfigError::ValidationError(
                "context.message_share must be in (0.0, 1.0]".into(),
            ));
        }

        if self.dialogue.compression_interval == 0 {
            return Err(ConfigError::ValidationError(
                "dialogue.compression_interval must be > 0".into(),
            ));
        }

        if self.dialogue.max_turns == 0 {
            return Err(ConfigError::ValidationError(
                "dialogue.max_turns must be > 0".into(),
            ));
        }

        if self.dialogue.summary_max_words == 0 {
            return Err(ConfigError::ValidationError(
                "dialogue.summary_max_words must be > 0".into(),
            ));
        }

        if self.sessions.max_sessions == Some(0) {
            return Err(ConfigError::ValidationError(
                "sessions.max_sessions must be > 0 when set".into(),
            ));
        }

        if self.timeouts.generation_secs == 0
            || self.timeouts.summary_secs == 0
            || self.timeouts.retrieval_secs == 0
        {
            return Err(ConfigError::ValidationError(
                "collaborator timeouts must be > 0 seconds".into(),
            ));
        }

        Ok(())
    }

    /// Generate a default config TOML string (for the `config` command).
    pub fn default_toml() -> String {
        Self::default().to_toml()
    }

    pub fn to_toml(&self) -> String {
        toml::to_string_pretty(self).unwrap_or_default()
    }
}

fn parse_env<T: std::str::FromStr>(name: &str, raw: &str) -> Result<T, ConfigError> {
    raw.trim()
        .parse()
        .map_err(|_| ConfigError::ValidationError(format!("{name} has an invalid value: {raw}")))
}

/// Get the user's home directory.
fn dirs_home() -> PathBuf {
    #[cfg(target_os = "windows")]
    {
        std::env::var("USERPROFILE")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("C:\\Users\\Default"))
    }
    #[cfg(not(target_os = "windows"))]
    {
        std::env::var("HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("/tmp"))
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file at {path}: {reason}")]
    ReadError { path: PathBuf, reason: String },

    #[error("Failed to parse config file at {path}: {reason}")]
    ParseError { path: PathBuf, reason: String },

    #[error("Configuration validation failed: {0}")]
    ValidationError(String),
}
