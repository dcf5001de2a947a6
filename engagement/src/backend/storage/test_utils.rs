//! Test utilities for exercising services against a misbehaving store
//!
//! `FlakyStore` wraps a [`MemoryDocumentStore`] and lets a test inject
//! failures per operation, count calls, and hold reads of a document until
//! the test releases them.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::Semaphore;

use super::document::{CollectionPath, Document, DocumentPath, Fields, OrderedQuery};
use super::memory::MemoryDocumentStore;
use super::subscription::{SnapshotListener, Subscription};
use super::traits::{DocumentStore, StoreError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StoreOp {
    Get,
    Update,
    Merge,
    Append,
    Delete,
    Subscribe,
}

#[derive(Default)]
struct Control {
    failing: Mutex<HashSet<StoreOp>>,
    calls: Mutex<HashMap<StoreOp, usize>>,
    held: Mutex<HashMap<DocumentPath, Arc<Semaphore>>>,
}

#[derive(Clone, Default)]
pub struct FlakyStore {
    inner: MemoryDocumentStore,
    control: Arc<Control>,
}

impl FlakyStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// The wrapped store, for seeding and inspecting documents directly
    pub fn inner(&self) -> &MemoryDocumentStore {
        &self.inner
    }

    pub fn fail(&self, op: StoreOp, failing: bool) {
        let mut set = self.control.failing.lock();
        if failing {
            set.insert(op);
        } else {
            set.remove(&op);
        }
    }

    pub fn calls(&self, op: StoreOp) -> usize {
        self.control.calls.lock().get(&op).copied().unwrap_or(0)
    }

    /// Block every `get_document` of `path` until [`release`](Self::release)
    pub fn hold_gets(&self, path: &DocumentPath) {
        self.control
            .held
            .lock()
            .insert(path.clone(), Arc::new(Semaphore::new(0)));
    }

    pub fn release(&self, path: &DocumentPath) {
        if let Some(gate) = self.control.held.lock().remove(path) {
            gate.close();
        }
    }

    fn enter(&self, op: StoreOp) -> Result<(), StoreError> {
        *self.control.calls.lock().entry(op).or_insert(0) += 1;
        if self.control.failing.lock().contains(&op) {
            Err(StoreError::Unavailable("injected failure".to_string()))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl DocumentStore for FlakyStore {
    async fn get_document(&self, path: &DocumentPath) -> Result<Option<Document>, StoreError> {
        self.enter(StoreOp::Get)?;
        let gate = self.control.held.lock().get(path).cloned();
        if let Some(gate) = gate {
            // A closed gate means the test released it
            let _ = gate.acquire().await;
        }
        self.inner.get_document(path).await
    }

    async fn update_document(&self, path: &DocumentPath, fields: Fields) -> Result<(), StoreError> {
        self.enter(StoreOp::Update)?;
        self.inner.update_document(path, fields).await
    }

    async fn set_document_merge(&self, path: &DocumentPath, fields: Fields) -> Result<(), StoreError> {
        self.enter(StoreOp::Merge)?;
        self.inner.set_document_merge(path, fields).await
    }

    async fn append_to_collection(
        &self,
        collection: &CollectionPath,
        fields: Fields,
    ) -> Result<String, StoreError> {
        self.enter(StoreOp::Append)?;
        self.inner.append_to_collection(collection, fields).await
    }

    async fn delete_document(&self, path: &DocumentPath) -> Result<(), StoreError> {
        self.enter(StoreOp::Delete)?;
        self.inner.delete_document(path).await
    }

    fn subscribe_ordered(&self, query: OrderedQuery, listener: SnapshotListener) -> Subscription {
        if let Err(e) = self.enter(StoreOp::Subscribe) {
            (listener.on_error)(e);
            return Subscription::noop();
        }
        self.inner.subscribe_ordered(query, listener)
    }
}
