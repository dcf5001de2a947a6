//! # In-Memory Document Store
//!
//! A complete [`DocumentStore`] kept in process memory. Documents live in a
//! sorted map keyed by path; listeners are re-evaluated whenever a document in
//! their collection changes and receive the whole ordered result.
//!
//! ## Semantics
//!
//! - Ids handed out by `append_to_collection` are random UUIDs
//! - Server timestamps resolve to strictly increasing RFC 3339 strings
//! - Merge writes replace top-level fields only
//! - Ordered queries skip documents that lack the order field (or hold null),
//!   ties are broken by document id
//! - The initial snapshot is delivered before `subscribe_ordered` returns

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use log::{debug, trace};
use parking_lot::Mutex;
use serde_json::Value;
use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::sync::Arc;
use uuid::Uuid;

use super::document::{
    format_timestamp, resolve_server_timestamps, CollectionPath, Document, DocumentPath, Fields,
    OrderedQuery,
};
use super::subscription::{SnapshotListener, Subscription};
use super::traits::{DocumentStore, StoreError};

#[derive(Clone, Default)]
pub struct MemoryDocumentStore {
    state: Arc<Mutex<TreeState>>,
}

#[derive(Default)]
struct TreeState {
    documents: BTreeMap<DocumentPath, Fields>,
    listeners: BTreeMap<u64, ActiveListener>,
    next_listener_id: u64,
    last_stamp: Option<DateTime<Utc>>,
}

struct ActiveListener {
    query: OrderedQuery,
    listener: Arc<SnapshotListener>,
}

type Delivery = (Arc<SnapshotListener>, Vec<Document>);

impl TreeState {
    fn next_stamp(&mut self) -> String {
        let mut now = Utc::now();
        if let Some(last) = self.last_stamp {
            if now <= last {
                now = last + Duration::microseconds(1);
            }
        }
        self.last_stamp = Some(now);
        format_timestamp(now)
    }

    fn run_query(&self, query: &OrderedQuery) -> Vec<Document> {
        let order_key = |document: &Document| {
            document
                .fields
                .get(&query.order_field)
                .cloned()
                .unwrap_or(Value::Null)
        };

        let mut documents: Vec<Document> = self
            .documents
            .iter()
            .filter(|(path, fields)| {
                path.parent() == &query.collection
                    && fields
                        .get(&query.order_field)
                        .map_or(false, |value| !value.is_null())
            })
            .map(|(path, fields)| Document {
                id: path.id().to_string(),
                fields: fields.clone(),
            })
            .collect();

        documents.sort_by(|a, b| {
            let ordering = compare_values(&order_key(a), &order_key(b));
            let ordering = if query.descending {
                ordering.reverse()
            } else {
                ordering
            };
            ordering.then_with(|| a.id.cmp(&b.id))
        });
        documents
    }

    fn deliveries_for(&self, collection: &CollectionPath) -> Vec<Delivery> {
        self.listeners
            .values()
            .filter(|active| &active.query.collection == collection)
            .map(|active| (Arc::clone(&active.listener), self.run_query(&active.query)))
            .collect()
    }

    /// Fields `path` would hold after merging `fields`, without applying them
    fn merged(&mut self, path: &DocumentPath, mut fields: Fields, create: bool) -> Result<Fields, StoreError> {
        let mut document = match self.documents.get(path) {
            Some(existing) => existing.clone(),
            None if create => Fields::new(),
            None => return Err(StoreError::NotFound(path.to_string())),
        };

        let stamp = self.next_stamp();
        resolve_server_timestamps(&mut fields, &stamp);
        document.extend(fields);
        Ok(document)
    }
}

/// Compare two field values: numbers numerically, strings and booleans
/// naturally, mixed types by a fixed type rank
fn compare_values(a: &Value, b: &Value) -> Ordering {
    fn rank(value: &Value) -> u8 {
        match value {
            Value::Null => 0,
            Value::Bool(_) => 1,
            Value::Number(_) => 2,
            Value::String(_) => 3,
            Value::Array(_) => 4,
            Value::Object(_) => 5,
        }
    }

    match (a, b) {
        (Value::Number(x), Value::Number(y)) => x
            .as_f64()
            .partial_cmp(&y.as_f64())
            .unwrap_or(Ordering::Equal),
        (Value::String(x), Value::String(y)) => x.cmp(y),
        (Value::Bool(x), Value::Bool(y)) => x.cmp(y),
        _ => rank(a).cmp(&rank(b)),
    }
}

impl MemoryDocumentStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current fields of a document without going through the async API
    pub fn peek(&self, path: &DocumentPath) -> Option<Fields> {
        self.state.lock().documents.get(path).cloned()
    }

    /// Insert a document as-is, without stamping or notifying listeners
    pub fn load_document(&self, path: DocumentPath, fields: Fields) {
        self.state.lock().documents.insert(path, fields);
    }

    /// Every document directly inside `collection`, by id
    pub fn documents_in(&self, collection: &CollectionPath) -> Vec<Document> {
        self.state
            .lock()
            .documents
            .iter()
            .filter(|(path, _)| path.parent() == collection)
            .map(|(path, fields)| Document {
                id: path.id().to_string(),
                fields: fields.clone(),
            })
            .collect()
    }

    pub fn document_count(&self) -> usize {
        self.state.lock().documents.len()
    }

    /// Number of live subscriptions, useful to verify teardown
    pub fn listener_count(&self) -> usize {
        self.state.lock().listeners.len()
    }

    fn deliver(deliveries: Vec<Delivery>) {
        for (listener, documents) in deliveries {
            (listener.on_data)(documents);
        }
    }

    /// Merge `fields` into `path`. `commit` sees the resulting document
    /// before it becomes visible; when it fails nothing changes and no
    /// listener is called.
    pub(crate) fn write_with<C>(
        &self,
        path: &DocumentPath,
        fields: Fields,
        create: bool,
        commit: C,
    ) -> Result<(), StoreError>
    where
        C: FnOnce(&DocumentPath, &Fields) -> Result<(), StoreError>,
    {
        let deliveries = {
            let mut state = self.state.lock();
            let document = state.merged(path, fields, create)?;
            commit(path, &document)?;
            state.documents.insert(path.clone(), document);
            state.deliveries_for(path.parent())
        };
        Self::deliver(deliveries);
        Ok(())
    }

    /// Append a document under a fresh id, committing it like [`Self::write_with`]
    pub(crate) fn append_with<C>(
        &self,
        collection: &CollectionPath,
        fields: Fields,
        commit: C,
    ) -> Result<String, StoreError>
    where
        C: FnOnce(&DocumentPath, &Fields) -> Result<(), StoreError>,
    {
        let id = Uuid::new_v4().simple().to_string();
        let path = collection.doc(id.clone());
        self.write_with(&path, fields, true, commit)?;
        debug!("Appended document {}", path);
        Ok(id)
    }

    /// Remove `path` once `commit` succeeds
    pub(crate) fn delete_with<C>(&self, path: &DocumentPath, commit: C) -> Result<(), StoreError>
    where
        C: FnOnce(&DocumentPath) -> Result<(), StoreError>,
    {
        let deliveries = {
            let mut state = self.state.lock();
            if !state.documents.contains_key(path) {
                return Err(StoreError::NotFound(path.to_string()));
            }
            commit(path)?;
            state.documents.remove(path);
            state.deliveries_for(path.parent())
        };
        debug!("Deleted document {}", path);
        Self::deliver(deliveries);
        Ok(())
    }
}

#[async_trait]
impl DocumentStore for MemoryDocumentStore {
    async fn get_document(&self, path: &DocumentPath) -> Result<Option<Document>, StoreError> {
        Ok(self.peek(path).map(|fields| Document {
            id: path.id().to_string(),
            fields,
        }))
    }

    async fn update_document(&self, path: &DocumentPath, fields: Fields) -> Result<(), StoreError> {
        trace!("Updating document {}", path);
        self.write_with(path, fields, false, |_, _| Ok(()))
    }

    async fn set_document_merge(&self, path: &DocumentPath, fields: Fields) -> Result<(), StoreError> {
        trace!("Merging into document {}", path);
        self.write_with(path, fields, true, |_, _| Ok(()))
    }

    async fn append_to_collection(
        &self,
        collection: &CollectionPath,
        fields: Fields,
    ) -> Result<String, StoreError> {
        self.append_with(collection, fields, |_, _| Ok(()))
    }

    async fn delete_document(&self, path: &DocumentPath) -> Result<(), StoreError> {
        self.delete_with(path, |_| Ok(()))
    }

    fn subscribe_ordered(&self, query: OrderedQuery, listener: SnapshotListener) -> Subscription {
        let listener = Arc::new(listener);
        let (listener_id, initial) = {
            let mut state = self.state.lock();
            let listener_id = state.next_listener_id;
            state.next_listener_id += 1;
            let initial = state.run_query(&query);
            debug!(
                "Subscribing to {} ordered by {} (listener {})",
                query.collection, query.order_field, listener_id
            );
            state.listeners.insert(
                listener_id,
                ActiveListener {
                    query,
                    listener: Arc::clone(&listener),
                },
            );
            (listener_id, initial)
        };

        (listener.on_data)(initial);

        let state = Arc::downgrade(&self.state);
        Subscription::new(move || {
            if let Some(state) = state.upgrade() {
                state.lock().listeners.remove(&listener_id);
                debug!("Disposed listener {}", listener_id);
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::storage::document::server_timestamp;
    use serde_json::json;

    fn fields(value: Value) -> Fields {
        match value {
            Value::Object(map) => map,
            _ => Fields::new(),
        }
    }

    fn journal() -> CollectionPath {
        CollectionPath::root("users").doc("u1").collection("journal")
    }

    fn collecting_listener() -> (SnapshotListener, Arc<Mutex<Vec<Vec<String>>>>) {
        let received = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&received);
        let listener = SnapshotListener::new(
            move |documents: Vec<Document>| {
                sink.lock()
                    .push(documents.into_iter().map(|d| d.id).collect());
            },
            |_| {},
        );
        (listener, received)
    }

    #[tokio::test]
    async fn test_update_missing_document_is_not_found() {
        let store = MemoryDocumentStore::new();
        let path = CollectionPath::root("users").doc("u1");

        let result = store.update_document(&path, fields(json!({ "currentStreak": 1 }))).await;
        assert!(matches!(result, Err(StoreError::NotFound(_))));
        assert_eq!(store.document_count(), 0);
    }

    #[tokio::test]
    async fn test_upsert_creates_then_updates() {
        let store = MemoryDocumentStore::new();
        let path = CollectionPath::root("users").doc("u1");

        store
            .upsert_merge(&path, fields(json!({ "currentStreak": 1 })))
            .await
            .expect("upsert should create the document");
        store
            .set_document_merge(&path, fields(json!({ "hasWrittenFirstJournal": true })))
            .await
            .unwrap();
        store
            .upsert_merge(&path, fields(json!({ "currentStreak": 2 })))
            .await
            .unwrap();

        let document = store.get_document(&path).await.unwrap().expect("document exists");
        assert_eq!(document.get("currentStreak"), Some(&json!(2)));
        assert_eq!(document.get_bool("hasWrittenFirstJournal"), Some(true));
    }

    #[tokio::test]
    async fn test_append_assigns_ids_and_stamps_increasing_timestamps() {
        let store = MemoryDocumentStore::new();
        let mut ids = Vec::new();
        for text in ["a", "b", "c"] {
            let id = store
                .append_to_collection(&journal(), fields(json!({ "text": text, "timestamp": server_timestamp() })))
                .await
                .unwrap();
            ids.push(id);
        }

        assert_eq!(ids.len(), 3);
        assert_ne!(ids[0], ids[1]);

        let stamps: Vec<String> = ids
            .iter()
            .map(|id| {
                store.peek(&journal().doc(id.clone())).unwrap()["timestamp"]
                    .as_str()
                    .unwrap()
                    .to_string()
            })
            .collect();
        assert!(stamps[0] < stamps[1] && stamps[1] < stamps[2]);
    }

    #[tokio::test]
    async fn test_ordered_subscription_newest_first() {
        let store = MemoryDocumentStore::new();
        store.load_document(journal().doc("old"), fields(json!({ "text": "old", "timestamp": "2026-01-01T00:00:00.000000Z" })));
        store.load_document(journal().doc("new"), fields(json!({ "text": "new", "timestamp": "2026-03-01T00:00:00.000000Z" })));
        store.load_document(journal().doc("pending"), fields(json!({ "text": "no timestamp" })));

        let (listener, received) = collecting_listener();
        let _subscription = store.subscribe_ordered(OrderedQuery::newest_first(journal(), "timestamp"), listener);

        assert_eq!(received.lock().clone(), vec![vec!["new".to_string(), "old".to_string()]]);

        store
            .append_to_collection(&journal(), fields(json!({ "text": "latest", "timestamp": server_timestamp() })))
            .await
            .unwrap();

        let deliveries = received.lock().clone();
        assert_eq!(deliveries.len(), 2);
        assert_eq!(deliveries[1].len(), 3);
        assert_eq!(&deliveries[1][1..], &["new".to_string(), "old".to_string()]);
    }

    #[tokio::test]
    async fn test_listeners_only_see_their_collection() {
        let store = MemoryDocumentStore::new();
        let (listener, received) = collecting_listener();
        let _subscription = store.subscribe_ordered(OrderedQuery::newest_first(journal(), "timestamp"), listener);

        let reminders = CollectionPath::root("users").doc("u1").collection("reminders");
        store
            .append_to_collection(&reminders, fields(json!({ "createdAt": server_timestamp() })))
            .await
            .unwrap();

        assert_eq!(received.lock().len(), 1);
    }

    #[tokio::test]
    async fn test_disposed_subscription_receives_nothing() {
        let store = MemoryDocumentStore::new();
        let (listener, received) = collecting_listener();
        let subscription = store.subscribe_ordered(OrderedQuery::newest_first(journal(), "timestamp"), listener);
        assert_eq!(store.listener_count(), 1);

        subscription.dispose();
        assert_eq!(store.listener_count(), 0);

        store
            .append_to_collection(&journal(), fields(json!({ "timestamp": server_timestamp() })))
            .await
            .unwrap();
        assert_eq!(received.lock().len(), 1);
    }

    #[tokio::test]
    async fn test_delete_missing_document_is_not_found() {
        let store = MemoryDocumentStore::new();
        store.load_document(journal().doc("j1"), fields(json!({ "timestamp": "2026-01-01T00:00:00.000000Z" })));

        let (listener, received) = collecting_listener();
        let _subscription = store.subscribe_ordered(OrderedQuery::newest_first(journal(), "timestamp"), listener);

        let result = store.delete_document(&journal().doc("missing")).await;
        assert!(matches!(result, Err(StoreError::NotFound(_))));
        assert_eq!(received.lock().len(), 1);

        store.delete_document(&journal().doc("j1")).await.unwrap();
        assert_eq!(received.lock().last().cloned(), Some(Vec::<String>::new()));
    }

    #[test]
    fn test_compare_values() {
        assert_eq!(compare_values(&json!(2), &json!(10)), Ordering::Less);
        assert_eq!(compare_values(&json!("b"), &json!("a")), Ordering::Greater);
        assert_eq!(compare_values(&json!(1), &json!("1")), Ordering::Less);
    }

    #[tokio::test]
    async fn test_rejected_commit_changes_nothing() {
        let store = MemoryDocumentStore::new();
        let path = journal().doc("j1");
        store.load_document(path.clone(), fields(json!({ "text": "hi", "timestamp": "2026-01-01T00:00:00.000000Z" })));
        let (listener, received) = collecting_listener();
        let _subscription = store.subscribe_ordered(OrderedQuery::newest_first(journal(), "timestamp"), listener);

        let rejected = || Err(StoreError::Backend(anyhow::anyhow!("disk full")));
        let result = store.write_with(&path, fields(json!({ "text": "edited" })), false, |_, _| rejected());
        assert!(matches!(result, Err(StoreError::Backend(_))));
        let result = store.delete_with(&path, |_| rejected());
        assert!(matches!(result, Err(StoreError::Backend(_))));
        let result = store.append_with(&journal(), fields(json!({ "timestamp": server_timestamp() })), |_, _| rejected());
        assert!(result.is_err());

        assert_eq!(store.peek(&path).unwrap()["text"], json!("hi"));
        assert_eq!(store.document_count(), 1);
        assert_eq!(received.lock().len(), 1);
    }
}
