//! # Storage Traits
//!
//! The document store contract the domain layer depends on. Any backend that
//! implements [`DocumentStore`] can be swapped in without touching services.

use async_trait::async_trait;
use log::debug;

use super::document::{CollectionPath, Document, DocumentPath, Fields, OrderedQuery};
use super::subscription::{SnapshotListener, Subscription};

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Document not found: {0}")]
    NotFound(String),
    #[error("Store unavailable: {0}")]
    Unavailable(String),
    #[error("Malformed document {path}: {reason}")]
    Malformed { path: String, reason: String },
    #[error(transparent)]
    Backend(#[from] anyhow::Error),
}

impl StoreError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, StoreError::NotFound(_))
    }
}

/// Keyed, hierarchical document store
///
/// Writes carrying [`server_timestamp`](super::document::server_timestamp)
/// sentinels are stamped with the store's clock.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Read a document, `None` when it does not exist
    async fn get_document(&self, path: &DocumentPath) -> Result<Option<Document>, StoreError>;

    /// Merge `fields` into an existing document; fails with `NotFound` if absent
    async fn update_document(&self, path: &DocumentPath, fields: Fields) -> Result<(), StoreError>;

    /// Merge `fields` into the document, creating it when absent
    async fn set_document_merge(&self, path: &DocumentPath, fields: Fields) -> Result<(), StoreError>;

    /// Add a new document to a collection and return the id the store assigned
    async fn append_to_collection(
        &self,
        collection: &CollectionPath,
        fields: Fields,
    ) -> Result<String, StoreError>;

    /// Remove a document; fails with `NotFound` if it does not exist
    async fn delete_document(&self, path: &DocumentPath) -> Result<(), StoreError>;

    /// Watch a collection in order. The listener receives the full ordered
    /// result on every change until the returned handle is disposed.
    fn subscribe_ordered(&self, query: OrderedQuery, listener: SnapshotListener) -> Subscription;

    /// Update the document if it exists, otherwise create it with a merge write
    async fn upsert_merge(&self, path: &DocumentPath, fields: Fields) -> Result<(), StoreError> {
        match self.update_document(path, fields.clone()).await {
            Err(StoreError::NotFound(_)) => {
                debug!("Document {} not found for update, creating it with merge", path);
                self.set_document_merge(path, fields).await
            }
            other => other,
        }
    }
}
