use crate::domain::result::DomainResult;
use async_trait::async_trait;

/// Repository input for inserting one document into a collection
#[derive(Debug, Clone, PartialEq)]
pub struct InsertDocumentInput {
    /// Broker message id; a second insert with the same id is a no-op
    pub msg_id: Option<String>,
    pub document: serde_json::Value,
}

/// Result of an insert
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InsertedDocument {
    pub id: String,
    /// True when the message id was already stored and nothing was written
    pub duplicate: bool,
}

/// Repository trait for the document store the worker commits into
#[cfg_attr(any(test, feature = "testing"), mockall::automock)]
#[async_trait]
pub trait DocumentRepository: Send + Sync {
    /// Insert a document, returning the id the store assigned
    async fn insert_one(&self, input: InsertDocumentInput) -> DomainResult<InsertedDocument>;
}
