//! Disposable subscription handles shared by the store and the identity source.

use super::document::Document;
use super::traits::StoreError;

/// Handle returned by every subscribe call. Disposing it (explicitly or by
/// dropping it) unregisters the listener exactly once.
#[must_use = "dropping a Subscription disposes it immediately"]
pub struct Subscription {
    dispose: Option<Box<dyn FnOnce() + Send>>,
}

impl Subscription {
    pub fn new(dispose: impl FnOnce() + Send + 'static) -> Self {
        Self {
            dispose: Some(Box::new(dispose)),
        }
    }

    /// A handle with nothing to release, e.g. for a subscription that failed to open
    pub fn noop() -> Self {
        Self { dispose: None }
    }

    pub fn dispose(mut self) {
        self.release();
    }

    fn release(&mut self) {
        if let Some(dispose) = self.dispose.take() {
            dispose();
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.release();
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("active", &self.dispose.is_some())
            .finish()
    }
}

/// Subscriptions opened together and torn down together
#[derive(Debug, Default)]
pub struct SubscriptionSet {
    handles: Vec<Subscription>,
}

impl SubscriptionSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, subscription: Subscription) {
        self.handles.push(subscription);
    }

    pub fn len(&self) -> usize {
        self.handles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handles.is_empty()
    }

    pub fn dispose_all(&mut self) {
        for subscription in self.handles.drain(..) {
            subscription.dispose();
        }
    }
}

impl Drop for SubscriptionSet {
    fn drop(&mut self) {
        self.dispose_all();
    }
}

/// Callbacks of an ordered collection subscription. `on_data` receives the
/// full ordered result every time, never a diff.
pub struct SnapshotListener {
    pub on_data: Box<dyn Fn(Vec<Document>) + Send + Sync>,
    pub on_error: Box<dyn Fn(StoreError) + Send + Sync>,
}

impl SnapshotListener {
    pub fn new(
        on_data: impl Fn(Vec<Document>) + Send + Sync + 'static,
        on_error: impl Fn(StoreError) + Send + Sync + 'static,
    ) -> Self {
        Self {
            on_data: Box::new(on_data),
            on_error: Box::new(on_error),
        }
    }
}
