//! Retriever trait for the external search engine.

use async_trait::async_trait;

use crate::document::RetrievedDocument;
use crate::error::RetrievalError;

/// Returns ranked, scored documents for a query.
#[async_trait]
pub trait Retriever: Send + Sync {
    fn name(&self) -> &str;

    async fn search(&self, query: &str) -> std::result::Result<Vec<RetrievedDocument>, RetrievalError>;
}
