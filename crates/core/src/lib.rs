//! # Turnwise Core
//!
//! Domain types and collaborator traits for the Turnwise conversation
//! context manager, plus its error taxonomy. This crate has **no runtime
//! dependencies**; it defines the model every other crate implements
//! against.
//!
//! ## Collaborators
//!
//! Everything outside the context manager is a trait here:
//! - [`TextGenerator`]: prompt in, answer out
//! - [`Retriever`]: ranked documents for a query
//! - [`ConversationLog`]: append-only transcript store
//! - [`Tokenizer`]: token counting

pub mod document;
pub mod error;
pub mod memory;
pub mod message;
pub mod provider;
pub mod retriever;
pub mod tokenizer;

// Re-export key types at crate root for ergonomics
pub use document::RetrievedDocument;
pub use error::{Error, GenerationError, LogError, Result, RetrievalError, TokenizerError};
pub use memory::ConversationLog;
pub use message::{Message, Role, SourceRef};
pub use provider::TextGenerator;
pub use retriever::Retriever;
pub use tokenizer::Tokenizer;
