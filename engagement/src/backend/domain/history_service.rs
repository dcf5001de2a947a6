//! History service domain logic.
//!
//! Keeps a live, newest-first cache of a user's medication logs, journal
//! entries and reminders. Each collection has its own ordered subscription;
//! every delivery carries the full ordered result and replaces that cache
//! wholesale.
//!
//! ## Lifecycle
//!
//! - The three subscriptions are opened together when a user is observed and
//!   disposed together when observation stops or the user changes; the caches
//!   reset to empty at that point
//! - Deliveries from a superseded user are ignored
//! - Deletes go to the store only. The cache changes when the store delivers
//!   the updated collection, never optimistically.

use log::{debug, error, info, warn};
use serde::de::DeserializeOwned;
use shared::{HistoryKind, HistorySnapshot, JournalEntry, MedicationLogEntry, Reminder, UserId};
use std::collections::BTreeSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::watch;

use crate::backend::domain::commands::history::DeleteRecordCommand;
use crate::backend::identity::IdentityService;
use crate::backend::storage::{
    Document, DocumentStore, OrderedQuery, SnapshotListener, StoreError, Subscription,
    SubscriptionSet, UserPaths,
};

#[derive(Debug, thiserror::Error)]
pub enum HistoryError {
    #[error("No user is signed in")]
    NotSignedIn,
    #[error("Failed to delete item {record_id} from {kind}: {source}")]
    DeleteFailed {
        kind: HistoryKind,
        record_id: String,
        #[source]
        source: StoreError,
    },
}

/// A record type shown in one of the history lists
trait HistoryRecord: DeserializeOwned + Send + 'static {
    const KIND: HistoryKind;

    fn set_id(&mut self, id: String);

    fn replace_cache(snapshot: &mut HistorySnapshot, records: Vec<Self>);
}

impl HistoryRecord for MedicationLogEntry {
    const KIND: HistoryKind = HistoryKind::MedicationLogs;

    fn set_id(&mut self, id: String) {
        self.id = id;
    }

    fn replace_cache(snapshot: &mut HistorySnapshot, records: Vec<Self>) {
        snapshot.medication_logs = records;
    }
}

impl HistoryRecord for JournalEntry {
    const KIND: HistoryKind = HistoryKind::Journal;

    fn set_id(&mut self, id: String) {
        self.id = id;
    }

    fn replace_cache(snapshot: &mut HistorySnapshot, records: Vec<Self>) {
        snapshot.journal_entries = records;
    }
}

impl HistoryRecord for Reminder {
    const KIND: HistoryKind = HistoryKind::Reminders;

    fn set_id(&mut self, id: String) {
        self.id = id;
    }

    fn replace_cache(snapshot: &mut HistorySnapshot, records: Vec<Self>) {
        snapshot.reminders = records;
    }
}

#[derive(Default)]
struct Session {
    /// User most recently asked for, even if its subscriptions are still opening
    target: Option<UserId>,
    subscriptions: Option<SubscriptionSet>,
}

struct HistoryInner {
    store: Arc<dyn DocumentStore>,
    paths: UserPaths,
    snapshot: watch::Sender<HistorySnapshot>,
    session: parking_lot::Mutex<Session>,
    generation: AtomicU64,
    /// Kinds that have not delivered (or failed) yet in this generation.
    /// Only touched while holding the snapshot's write lock.
    awaiting: parking_lot::Mutex<BTreeSet<HistoryKind>>,
}

impl HistoryInner {
    fn is_current(&self, generation: u64) -> bool {
        self.generation.load(Ordering::SeqCst) == generation
    }

    fn apply<R: HistoryRecord>(&self, generation: u64, documents: Vec<Document>) {
        if !self.is_current(generation) {
            return;
        }

        let records: Vec<R> = documents
            .into_iter()
            .filter_map(|document| match document.decode::<R>() {
                Ok(mut record) => {
                    record.set_id(document.id);
                    Some(record)
                }
                Err(e) => {
                    warn!("Skipping malformed {} record {}: {}", R::KIND, document.id, e);
                    None
                }
            })
            .collect();
        let count = records.len();

        let applied = self.snapshot.send_if_modified(|snapshot| {
            if !self.is_current(generation) {
                return false;
            }
            R::replace_cache(snapshot, records);
            snapshot.loading = self.mark_delivered(R::KIND);
            true
        });
        if applied {
            debug!("History {} now has {} records", R::KIND, count);
        }
    }

    fn fail(&self, kind: HistoryKind, generation: u64, error: StoreError) {
        if !self.is_current(generation) {
            return;
        }
        error!("Error fetching {}: {}", kind, error);

        self.snapshot.send_if_modified(|snapshot| {
            if !self.is_current(generation) {
                return false;
            }
            snapshot.loading = self.mark_delivered(kind);
            true
        });
    }

    /// Returns whether any kind is still loading
    fn mark_delivered(&self, kind: HistoryKind) -> bool {
        let mut awaiting = self.awaiting.lock();
        awaiting.remove(&kind);
        !awaiting.is_empty()
    }
}

#[derive(Clone)]
pub struct HistoryService {
    inner: Arc<HistoryInner>,
}

impl HistoryService {
    pub fn new(store: Arc<dyn DocumentStore>, paths: UserPaths) -> Self {
        let (snapshot, _) = watch::channel(HistorySnapshot::default());
        Self {
            inner: Arc::new(HistoryInner {
                store,
                paths,
                snapshot,
                session: parking_lot::Mutex::new(Session::default()),
                generation: AtomicU64::new(0),
                awaiting: parking_lot::Mutex::new(BTreeSet::new()),
            }),
        }
    }

    pub fn snapshot(&self) -> HistorySnapshot {
        self.inner.snapshot.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<HistorySnapshot> {
        self.inner.snapshot.subscribe()
    }

    pub fn observed_user(&self) -> Option<UserId> {
        self.inner.session.lock().target.clone()
    }

    /// Start showing `user`'s history, or nothing for `None`.
    /// Observing the user already observed is a no-op.
    pub fn observe(&self, user: Option<UserId>) {
        let (generation, previous) = {
            let mut session = self.inner.session.lock();
            if session.target == user {
                return;
            }
            session.target = user.clone();
            let generation = self.inner.generation.fetch_add(1, Ordering::SeqCst) + 1;
            (generation, session.subscriptions.take())
        };

        if let Some(mut previous) = previous {
            previous.dispose_all();
            debug!("Closed history subscriptions (generation {})", generation - 1);
        }

        self.inner.snapshot.send_modify(|snapshot| {
            let mut awaiting = self.inner.awaiting.lock();
            awaiting.clear();
            if user.is_some() {
                awaiting.extend(HistoryKind::ALL);
            }
            *snapshot = HistorySnapshot {
                user: user.clone(),
                loading: user.is_some(),
                ..HistorySnapshot::default()
            };
        });

        let user = match user {
            Some(user) => user,
            None => {
                info!("Stopped observing history");
                return;
            }
        };

        info!("Observing history for {}", user);
        let mut subscriptions = SubscriptionSet::new();
        subscriptions.push(self.open::<MedicationLogEntry>(&user, generation));
        subscriptions.push(self.open::<JournalEntry>(&user, generation));
        subscriptions.push(self.open::<Reminder>(&user, generation));

        let mut session = self.inner.session.lock();
        if self.inner.is_current(generation) {
            session.subscriptions = Some(subscriptions);
        } else {
            drop(session);
            debug!("History for {} superseded while opening", user);
            subscriptions.dispose_all();
        }
    }

    /// Stop observing and clear every cache
    pub fn stop(&self) {
        self.observe(None);
    }

    /// Observe whoever the identity service reports. Disposing the returned
    /// handle stops following and stops observing.
    pub fn follow(&self, identity: &dyn IdentityService) -> Subscription {
        let service = self.clone();
        let registration = identity.on_identity_change(Box::new(move |user| service.observe(user)));

        let service = self.clone();
        Subscription::new(move || {
            registration.dispose();
            service.stop();
        })
    }

    /// Delete a record of the observed user. The cached list updates when the
    /// store delivers the change.
    pub async fn delete(&self, command: DeleteRecordCommand) -> Result<(), HistoryError> {
        let user = self.observed_user().ok_or(HistoryError::NotSignedIn)?;
        let path = self
            .inner
            .paths
            .record(&user, command.kind, &command.record_id);

        self.inner.store.delete_document(&path).await.map_err(|source| {
            error!("Failed to delete {}: {}", path, source);
            HistoryError::DeleteFailed {
                kind: command.kind,
                record_id: command.record_id.clone(),
                source,
            }
        })?;

        info!("Deleted {} item {}", command.kind, command.record_id);
        if command.kind == HistoryKind::Reminders {
            // TODO: cancel the reminder's local schedule here once product signs off on the behavior change
            warn!(
                "Reminder {} deleted; its local notification schedule stays installed",
                command.record_id
            );
        }
        Ok(())
    }

    fn open<R: HistoryRecord>(&self, user: &UserId, generation: u64) -> Subscription {
        let collection = self.inner.paths.history(user, R::KIND);
        let query = OrderedQuery::newest_first(collection, R::KIND.order_field());

        let data_target = Arc::downgrade(&self.inner);
        let error_target = Arc::downgrade(&self.inner);
        let listener = SnapshotListener::new(
            move |documents| {
                if let Some(inner) = data_target.upgrade() {
                    inner.apply::<R>(generation, documents);
                }
            },
            move |error| {
                if let Some(inner) = error_target.upgrade() {
                    inner.fail(R::KIND, generation, error);
                }
            },
        );

        self.inner.store.subscribe_ordered(query, listener)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::identity::LocalIdentity;
    use crate::backend::storage::test_utils::{FlakyStore, StoreOp};
    use crate::backend::storage::{server_timestamp, Fields};
    use serde_json::{json, Value};

    fn setup() -> (HistoryService, FlakyStore) {
        let store = FlakyStore::new();
        let service = HistoryService::new(Arc::new(store.clone()), UserPaths::default());
        (service, store)
    }

    fn fields(value: Value) -> Fields {
        value.as_object().cloned().unwrap_or_default()
    }

    fn seed(store: &FlakyStore, user: &str, kind: HistoryKind, id: &str, value: Value) {
        let path = UserPaths::default().record(&UserId::new(user), kind, id);
        store.inner().load_document(path, fields(value));
    }

    fn seed_journal(store: &FlakyStore, user: &str, id: &str, timestamp: &str) {
        seed(store, user, HistoryKind::Journal, id, json!({ "text": id, "timestamp": timestamp }));
    }

    fn delete(kind: HistoryKind, id: &str) -> DeleteRecordCommand {
        DeleteRecordCommand {
            kind,
            record_id: id.to_string(),
        }
    }

    #[tokio::test]
    async fn test_observe_loads_ordered_caches() {
        let (service, store) = setup();
        seed_journal(&store, "u1", "j-old", "2026-10-01T08:00:00.000000Z");
        seed_journal(&store, "u1", "j-new", "2026-10-18T08:00:00.000000Z");
        seed(&store, "u1", HistoryKind::MedicationLogs, "m1", json!({
            "medicationName": "Ibuprofen", "dosage": "200mg", "timestamp": "2026-10-02T08:00:00.000000Z"
        }));
        seed(&store, "u1", HistoryKind::Reminders, "r1", json!({
            "reminderText": "Walk", "reminderDay": "Monday", "reminderTime": "09:00",
            "createdAt": "2026-10-03T08:00:00.000000Z", "isActive": true
        }));

        service.observe(Some(UserId::new("u1")));
        let snapshot = service.snapshot();

        assert!(!snapshot.loading);
        assert_eq!(snapshot.user, Some(UserId::new("u1")));
        assert_eq!(snapshot.ids_of(HistoryKind::Journal), vec!["j-new", "j-old"]);
        assert_eq!(snapshot.ids_of(HistoryKind::MedicationLogs), vec!["m1"]);
        assert_eq!(snapshot.reminders[0].reminder_text, "Walk");
        assert_eq!(store.inner().listener_count(), 3);
    }

    #[tokio::test]
    async fn test_live_updates_replace_cache() {
        let (service, store) = setup();
        seed_journal(&store, "u1", "j1", "2026-10-01T08:00:00.000000Z");
        service.observe(Some(UserId::new("u1")));
        let mut receiver = service.subscribe();
        receiver.borrow_and_update();

        let journal = UserPaths::default().history(&UserId::new("u1"), HistoryKind::Journal);
        let id = store
            .append_to_collection(&journal, fields(json!({ "text": "today", "timestamp": server_timestamp() })))
            .await
            .unwrap();

        assert!(receiver.has_changed().unwrap());
        assert_eq!(service.snapshot().ids_of(HistoryKind::Journal), vec![id.as_str(), "j1"]);
    }

    #[tokio::test]
    async fn test_delete_updates_through_store_delivery() {
        let (service, store) = setup();
        seed_journal(&store, "u1", "j1", "2026-10-01T08:00:00.000000Z");
        seed_journal(&store, "u1", "j2", "2026-10-02T08:00:00.000000Z");
        service.observe(Some(UserId::new("u1")));

        service.delete(delete(HistoryKind::Journal, "j1")).await.unwrap();
        assert_eq!(service.snapshot().ids_of(HistoryKind::Journal), vec!["j2"]);
    }

    #[tokio::test]
    async fn test_delete_missing_record_fails_and_keeps_cache() {
        let (service, store) = setup();
        seed_journal(&store, "u1", "j1", "2026-10-01T08:00:00.000000Z");
        service.observe(Some(UserId::new("u1")));
        let before = service.snapshot();

        let error = service
            .delete(delete(HistoryKind::Journal, "missing"))
            .await
            .unwrap_err();
        assert!(matches!(error, HistoryError::DeleteFailed { kind: HistoryKind::Journal, .. }));
        assert_eq!(service.snapshot(), before);

        store.fail(StoreOp::Delete, true);
        assert!(service.delete(delete(HistoryKind::Journal, "j1")).await.is_err());
        assert_eq!(service.snapshot(), before);
    }

    #[tokio::test]
    async fn test_failed_file_delete_keeps_record_on_disk_store() {
        use crate::backend::storage::{YamlConnection, YamlDocumentStore};

        let temp_dir = tempfile::TempDir::new().unwrap();
        let store = YamlDocumentStore::open(YamlConnection::new(temp_dir.path()).unwrap()).unwrap();
        let paths = UserPaths::default();
        let user = UserId::new("u1");
        let id = store
            .append_to_collection(
                &paths.history(&user, HistoryKind::Journal),
                fields(json!({ "text": "hi", "timestamp": server_timestamp() })),
            )
            .await
            .unwrap();

        let service = HistoryService::new(Arc::new(store.clone()), paths.clone());
        service.observe(Some(user.clone()));
        assert_eq!(service.snapshot().journal_entries.len(), 1);

        let file = store
            .connection()
            .document_file(&paths.record(&user, HistoryKind::Journal, &id))
            .unwrap();
        std::fs::remove_file(&file).unwrap();
        std::fs::create_dir(&file).unwrap();
        std::fs::write(file.join("keep"), "x").unwrap();

        let error = service.delete(delete(HistoryKind::Journal, &id)).await.unwrap_err();
        assert!(matches!(error, HistoryError::DeleteFailed { kind: HistoryKind::Journal, .. }));
        assert_eq!(service.snapshot().journal_entries.len(), 1);
        assert!(store.get_document(&paths.record(&user, HistoryKind::Journal, &id)).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_delete_requires_observed_user() {
        let (service, _store) = setup();
        let result = service.delete(delete(HistoryKind::Reminders, "r1")).await;
        assert!(matches!(result, Err(HistoryError::NotSignedIn)));
    }

    #[tokio::test]
    async fn test_switching_user_tears_down_and_resets() {
        let (service, store) = setup();
        seed_journal(&store, "u1", "j1", "2026-10-01T08:00:00.000000Z");
        seed_journal(&store, "u2", "k1", "2026-10-05T08:00:00.000000Z");

        service.observe(Some(UserId::new("u1")));
        service.observe(Some(UserId::new("u1")));
        assert_eq!(store.inner().listener_count(), 3);
        assert_eq!(store.calls(StoreOp::Subscribe), 3);

        service.observe(Some(UserId::new("u2")));
        assert_eq!(store.inner().listener_count(), 3);
        assert_eq!(service.snapshot().ids_of(HistoryKind::Journal), vec!["k1"]);

        // The old user's changes no longer reach the cache
        let u1_journal = UserPaths::default().history(&UserId::new("u1"), HistoryKind::Journal);
        store
            .append_to_collection(&u1_journal, fields(json!({ "text": "late", "timestamp": server_timestamp() })))
            .await
            .unwrap();
        assert_eq!(service.snapshot().ids_of(HistoryKind::Journal), vec!["k1"]);

        service.stop();
        assert_eq!(store.inner().listener_count(), 0);
        assert_eq!(service.snapshot(), HistorySnapshot::default());
    }

    #[tokio::test]
    async fn test_subscription_errors_end_loading() {
        let (service, store) = setup();
        store.fail(StoreOp::Subscribe, true);

        service.observe(Some(UserId::new("u1")));
        let snapshot = service.snapshot();
        assert!(!snapshot.loading);
        assert_eq!(snapshot.len_of(HistoryKind::Journal), 0);
    }

    #[tokio::test]
    async fn test_malformed_records_are_skipped() {
        let (service, store) = setup();
        seed(&store, "u1", HistoryKind::Reminders, "bad", json!({
            "reminderText": "Walk", "reminderDay": "Monday", "reminderTime": "9am",
            "createdAt": "2026-10-03T08:00:00.000000Z"
        }));
        seed(&store, "u1", HistoryKind::Reminders, "good", json!({
            "reminderText": "Run", "reminderDay": "Tuesday", "reminderTime": "07:00",
            "createdAt": "2026-10-02T08:00:00.000000Z", "isActive": true
        }));

        service.observe(Some(UserId::new("u1")));
        assert_eq!(service.snapshot().ids_of(HistoryKind::Reminders), vec!["good"]);
    }

    #[tokio::test]
    async fn test_follow_identity() {
        let (service, store) = setup();
        seed_journal(&store, "u1", "j1", "2026-10-01T08:00:00.000000Z");
        let identity = LocalIdentity::new();

        let following = service.follow(&identity);
        assert_eq!(store.inner().listener_count(), 0);

        identity.sign_in(UserId::new("u1"));
        assert_eq!(service.snapshot().ids_of(HistoryKind::Journal), vec!["j1"]);
        assert_eq!(store.inner().listener_count(), 3);

        identity.sign_out();
        assert_eq!(store.inner().listener_count(), 0);
        assert_eq!(service.snapshot().len_of(HistoryKind::Journal), 0);

        identity.sign_in(UserId::new("u1"));
        following.dispose();
        assert_eq!(store.inner().listener_count(), 0);
        assert_eq!(identity.listener_count(), 0);
        assert_eq!(service.observed_user(), None);
    }
}
