//! # Identity Module
//!
//! The session/identity contract the engagement services depend on, plus a
//! local identity source for tests and the command-line binary.

use log::{debug, info};
use parking_lot::Mutex;
use shared::UserId;
use std::collections::BTreeMap;
use std::sync::{Arc, Weak};

use crate::backend::storage::Subscription;

pub type IdentityCallback = Box<dyn Fn(Option<UserId>) + Send + Sync>;

pub trait IdentityService: Send + Sync {
    fn current_identity(&self) -> Option<UserId>;

    /// Register a callback for identity changes. The callback is invoked with
    /// the current identity as soon as it is registered.
    fn on_identity_change(&self, callback: IdentityCallback) -> Subscription;
}

#[derive(Default)]
struct IdentityState {
    current: Option<UserId>,
    listeners: BTreeMap<u64, Arc<IdentityCallback>>,
    next_listener_id: u64,
}

/// Identity that is set directly instead of through a sign-in flow
#[derive(Clone, Default)]
pub struct LocalIdentity {
    state: Arc<Mutex<IdentityState>>,
}

impl LocalIdentity {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn signed_in(user: UserId) -> Self {
        let identity = Self::new();
        identity.state.lock().current = Some(user);
        identity
    }

    pub fn sign_in(&self, user: UserId) {
        info!("Signed in as {}", user);
        self.set(Some(user));
    }

    pub fn sign_out(&self) {
        info!("Signed out");
        self.set(None);
    }

    pub fn listener_count(&self) -> usize {
        self.state.lock().listeners.len()
    }

    fn set(&self, user: Option<UserId>) {
        let listeners: Vec<Arc<IdentityCallback>> = {
            let mut state = self.state.lock();
            state.current = user.clone();
            state.listeners.values().cloned().collect()
        };
        for listener in listeners {
            listener(user.clone());
        }
    }
}

impl IdentityService for LocalIdentity {
    fn current_identity(&self) -> Option<UserId> {
        self.state.lock().current.clone()
    }

    fn on_identity_change(&self, callback: IdentityCallback) -> Subscription {
        let callback = Arc::new(callback);
        let (listener_id, current) = {
            let mut state = self.state.lock();
            let listener_id = state.next_listener_id;
            state.next_listener_id += 1;
            state.listeners.insert(listener_id, Arc::clone(&callback));
            (listener_id, state.current.clone())
        };
        debug!("Registered identity listener {}", listener_id);

        callback(current);

        let state: Weak<Mutex<IdentityState>> = Arc::downgrade(&self.state);
        Subscription::new(move || {
            if let Some(state) = state.upgrade() {
                state.lock().listeners.remove(&listener_id);
                debug!("Removed identity listener {}", listener_id);
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_listener_sees_current_and_later_identities() {
        let identity = LocalIdentity::signed_in(UserId::new("u1"));
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);

        let subscription = identity.on_identity_change(Box::new(move |user| sink.lock().push(user)));
        identity.sign_out();
        identity.sign_in(UserId::new("u2"));

        assert_eq!(
            seen.lock().clone(),
            vec![Some(UserId::new("u1")), None, Some(UserId::new("u2"))]
        );

        subscription.dispose();
        assert_eq!(identity.listener_count(), 0);
        identity.sign_out();
        assert_eq!(seen.lock().len(), 3);
        assert_eq!(identity.current_identity(), None);
    }
}
