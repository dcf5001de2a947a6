//! # YAML Document Store
//!
//! File-backed [`DocumentStore`] for running the engagement layer locally.
//! Every document is a human-readable YAML file:
//!
//! ```text
//! data/
//! └── users/
//!     ├── u1.yaml                  ← root document
//!     └── u1/
//!         ├── reminders/{id}.yaml
//!         ├── medicationLogs/{id}.yaml
//!         └── journal/{id}.yaml
//! ```
//!
//! The whole tree is loaded into a [`MemoryDocumentStore`] on open, which
//! answers reads and drives subscriptions. Each write saves the touched
//! document with an atomic temp file + rename first; the in-memory tree and
//! its listeners only see the change once the file is in place.

mod connection;

pub use connection::{default_data_directory, YamlConnection};

use async_trait::async_trait;
use log::info;

use super::document::{CollectionPath, Document, DocumentPath, Fields, OrderedQuery};
use super::memory::MemoryDocumentStore;
use super::subscription::{SnapshotListener, Subscription};
use super::traits::{DocumentStore, StoreError};

#[derive(Clone)]
pub struct YamlDocumentStore {
    memory: MemoryDocumentStore,
    connection: YamlConnection,
}

impl YamlDocumentStore {
    /// Load every document under the connection's directory
    pub fn open(connection: YamlConnection) -> Result<Self, StoreError> {
        let memory = MemoryDocumentStore::new();
        for (path, fields) in connection.load_all()? {
            memory.load_document(path, fields);
        }
        info!(
            "Opened YAML document store at {} ({} documents)",
            connection.base_directory().display(),
            memory.document_count()
        );

        Ok(Self { memory, connection })
    }

    pub fn connection(&self) -> &YamlConnection {
        &self.connection
    }

    pub fn document_count(&self) -> usize {
        self.memory.document_count()
    }
}

#[async_trait]
impl DocumentStore for YamlDocumentStore {
    async fn get_document(&self, path: &DocumentPath) -> Result<Option<Document>, StoreError> {
        self.memory.get_document(path).await
    }

    async fn update_document(&self, path: &DocumentPath, fields: Fields) -> Result<(), StoreError> {
        self.memory.write_with(path, fields, false, |path, document| {
            self.connection.write_document(path, document)
        })
    }

    async fn set_document_merge(&self, path: &DocumentPath, fields: Fields) -> Result<(), StoreError> {
        self.memory.write_with(path, fields, true, |path, document| {
            self.connection.write_document(path, document)
        })
    }

    async fn append_to_collection(
        &self,
        collection: &CollectionPath,
        fields: Fields,
    ) -> Result<String, StoreError> {
        self.memory.append_with(collection, fields, |path, document| {
            self.connection.write_document(path, document)
        })
    }

    async fn delete_document(&self, path: &DocumentPath) -> Result<(), StoreError> {
        self.memory
            .delete_with(path, |path| self.connection.remove_document(path))
    }

    fn subscribe_ordered(&self, query: OrderedQuery, listener: SnapshotListener) -> Subscription {
        self.memory.subscribe_ordered(query, listener)
    }
}
