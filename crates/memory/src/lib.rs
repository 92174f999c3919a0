//! Conversation log backends for Turnwise.

pub mod file_backend;
pub mod in_memory;

pub use file_backend::JsonlConversationLog;
pub use in_memory::InMemoryConversationLog;
