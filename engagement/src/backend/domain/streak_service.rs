//! Streak service domain logic.
//!
//! Owns the per-user streak counter. The counter is an explicit state object
//! (`Uninitialized → Loading → Ready(n)`) that consumers observe through a
//! `watch` channel instead of ambient global state.
//!
//! ## Business Rules
//!
//! - Every identity change restarts the machine; the latest change wins and a
//!   stale load completion is discarded
//! - Signing out goes straight to `Ready(0)` so no streak leaks into the next
//!   session
//! - A failed load is treated as 0 rather than leaving the UI loading forever
//! - `increment` only works from `Ready(n)`, applies `n + 1` locally at once
//!   and persists in the background; persist failures are logged and never
//!   roll the local value back

use chrono::Utc;
use log::{debug, error, info, warn};
use parking_lot::Mutex;
use serde_json::Value;
use shared::{StreakState, UserId};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::backend::identity::IdentityService;
use crate::backend::storage::{format_timestamp, DocumentStore, Fields, Subscription, UserPaths};

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum StreakError {
    #[error("Streak is not ready yet (currently {0:?})")]
    NotReady(StreakState),
}

/// Outcome of a successful increment
#[derive(Debug)]
pub struct StreakIncrement {
    /// The new local value
    pub value: u32,
    /// Background persist task, `None` when nobody is signed in
    pub persist: Option<JoinHandle<()>>,
}

impl StreakIncrement {
    /// Wait for the background persist to finish and return the local value
    pub async fn persisted(self) -> u32 {
        if let Some(persist) = self.persist {
            if let Err(e) = persist.await {
                error!("Streak persist task failed: {}", e);
            }
        }
        self.value
    }
}

struct StreakInner {
    store: Arc<dyn DocumentStore>,
    paths: UserPaths,
    state: watch::Sender<StreakState>,
    user: Mutex<Option<UserId>>,
    generation: AtomicU64,
    persist_lock: tokio::sync::Mutex<()>,
}

/// A load that was started and still has to complete
struct PendingLoad {
    generation: u64,
    user: UserId,
}

#[derive(Clone)]
pub struct StreakService {
    inner: Arc<StreakInner>,
}

impl StreakService {
    pub fn new(store: Arc<dyn DocumentStore>, paths: UserPaths) -> Self {
        let (state, _) = watch::channel(StreakState::Uninitialized);
        Self {
            inner: Arc::new(StreakInner {
                store,
                paths,
                state,
                user: Mutex::new(None),
                generation: AtomicU64::new(0),
                persist_lock: tokio::sync::Mutex::new(()),
            }),
        }
    }

    pub fn state(&self) -> StreakState {
        *self.inner.state.borrow()
    }

    /// Current value, 0 while not ready
    pub fn current(&self) -> u32 {
        self.state().value()
    }

    pub fn is_loading(&self) -> bool {
        !self.state().is_ready()
    }

    /// Receiver notified on every state change
    pub fn subscribe(&self) -> watch::Receiver<StreakState> {
        self.inner.state.subscribe()
    }

    /// Wait until the streak is ready and return its value
    pub async fn ready(&self) -> u32 {
        let mut receiver = self.subscribe();
        let value = match receiver.wait_for(StreakState::is_ready).await {
            Ok(state) => state.value(),
            Err(_) => 0,
        };
        value
    }

    /// Follow identity changes. Loads run on the current tokio runtime.
    pub fn attach(&self, identity: &dyn IdentityService) -> Subscription {
        let service = self.clone();
        identity.on_identity_change(Box::new(move |user| {
            if let Some(pending) = service.begin_identity_change(user) {
                match tokio::runtime::Handle::try_current() {
                    Ok(runtime) => {
                        let service = service.clone();
                        runtime.spawn(async move { service.finish_load(pending).await });
                    }
                    Err(_) => error!(
                        "No async runtime to load the streak for {}; call reload() later",
                        pending.user
                    ),
                }
            }
        }))
    }

    /// Apply an identity change and wait for the resulting load
    pub async fn handle_identity_change(&self, user: Option<UserId>) {
        if let Some(pending) = self.begin_identity_change(user) {
            self.finish_load(pending).await;
        }
    }

    /// Re-read the streak of the current user
    pub async fn reload(&self) {
        let user = self.inner.user.lock().clone();
        self.handle_identity_change(user).await;
    }

    fn begin_identity_change(&self, user: Option<UserId>) -> Option<PendingLoad> {
        let inner = &self.inner;
        let next = if user.is_some() {
            StreakState::Loading
        } else {
            StreakState::Ready(0)
        };

        // Generation, user and state move together under the watch lock
        let mut generation = 0;
        inner.state.send_modify(|state| {
            generation = inner.generation.fetch_add(1, Ordering::SeqCst) + 1;
            *inner.user.lock() = user.clone();
            *state = next;
        });

        match user {
            None => {
                info!("No user signed in, streak reset to 0");
                None
            }
            Some(user) => {
                debug!("Loading streak for {} (generation {})", user, generation);
                Some(PendingLoad { generation, user })
            }
        }
    }

    async fn finish_load(&self, pending: PendingLoad) {
        let path = self.inner.paths.root(&pending.user);
        let value = match self.inner.store.get_document(&path).await {
            Ok(Some(document)) => {
                let value = document
                    .get("currentStreak")
                    .and_then(Value::as_u64)
                    .map(|n| u32::try_from(n).unwrap_or(u32::MAX))
                    .unwrap_or(0);
                info!("Loaded streak {} for {}", value, pending.user);
                value
            }
            Ok(None) => {
                info!("No root document for {}, streak starts at 0", pending.user);
                0
            }
            Err(e) => {
                error!("Failed to load streak for {}: {}", pending.user, e);
                0
            }
        };

        let generation = &self.inner.generation;
        let applied = self.inner.state.send_if_modified(|state| {
            if generation.load(Ordering::SeqCst) != pending.generation {
                return false;
            }
            *state = StreakState::Ready(value);
            true
        });
        if !applied {
            debug!(
                "Discarding stale streak load for {} (generation {})",
                pending.user, pending.generation
            );
        }
    }

    /// Count one engagement event
    pub fn increment(&self) -> Result<StreakIncrement, StreakError> {
        let inner = &self.inner;
        let mut outcome = Err(StreakState::Uninitialized);
        inner.state.send_if_modified(|state| match state {
            StreakState::Ready(n) => {
                *n = n.saturating_add(1);
                outcome = Ok((
                    *n,
                    inner.generation.load(Ordering::SeqCst),
                    inner.user.lock().clone(),
                ));
                true
            }
            other => {
                outcome = Err(*other);
                false
            }
        });
        let (value, generation, user) = match outcome {
            Ok(claimed) => claimed,
            Err(state) => {
                warn!("Streak increment rejected while {:?}", state);
                return Err(StreakError::NotReady(state));
            }
        };

        debug!("Streak increased to {}", value);
        let persist = match (user, tokio::runtime::Handle::try_current()) {
            (Some(user), Ok(runtime)) => {
                let service = self.clone();
                Some(runtime.spawn(async move {
                    service.persist(user, generation, value).await
                }))
            }
            (Some(user), Err(_)) => {
                error!("No async runtime to save streak {} for {}", value, user);
                None
            }
            (None, _) => {
                info!("Cannot save streak, no user signed in");
                None
            }
        };

        Ok(StreakIncrement { value, persist })
    }

    async fn persist(&self, user: UserId, generation: u64, value: u32) {
        let _guard = self.inner.persist_lock.lock().await;

        // Persists may run out of order; never write a value below the local one
        let value = {
            let state = self.inner.state.borrow();
            if self.inner.generation.load(Ordering::SeqCst) == generation {
                value.max(state.value())
            } else {
                value
            }
        };

        let mut fields = Fields::new();
        fields.insert("currentStreak".to_string(), Value::from(value));
        fields.insert(
            "lastStreakUpdate".to_string(),
            Value::from(format_timestamp(Utc::now())),
        );

        let path = self.inner.paths.root(&user);
        match self.inner.store.upsert_merge(&path, fields).await {
            Ok(()) => info!("Saved streak {} for {}", value, user),
            Err(e) => error!("Failed to save streak {} for {}: {}", value, user, e),
        }
    }
}
