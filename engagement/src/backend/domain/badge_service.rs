//! Badge service domain logic.
//!
//! First-action badges are boolean flags on the user's root document that go
//! from false to true exactly once. Unlocking is check-then-set: the flag is
//! read before the action and written after the action succeeds.
//!
//! Two near-simultaneous first actions may both see the flag unset and both
//! write it. The write is an idempotent merge of `true`, so the worst case is a
//! redundant write and the flag never ends up false. There is no lock across
//! devices.
//!
//! Badge failures never block the action itself: a failed read lets the action
//! proceed without writing the flag, and a failed write is only logged.

use log::{debug, error, info, warn};
use serde_json::Value;
use shared::{BadgeFlag, BadgeStatus, UserId, UserRoot};
use std::future::Future;
use std::sync::Arc;

use crate::backend::storage::{DocumentStore, Fields, StoreError, UserPaths};

/// Result of the pre-action flag read
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BadgeCheck {
    /// Flag unset (or no root document yet): this is the first action
    FirstAction,
    AlreadyUnlocked,
    /// The read failed; the action proceeds but the flag is not written
    Unknown,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FirstActionOutcome<T> {
    pub value: T,
    /// True when this action unlocked the badge
    pub badge_unlocked: bool,
}

#[derive(Clone)]
pub struct BadgeService {
    store: Arc<dyn DocumentStore>,
    paths: UserPaths,
}

impl BadgeService {
    pub fn new(store: Arc<dyn DocumentStore>, paths: UserPaths) -> Self {
        Self { store, paths }
    }

    pub async fn check(&self, user: &UserId, flag: BadgeFlag) -> BadgeCheck {
        match self.store.get_document(&self.paths.root(user)).await {
            Ok(Some(document)) => {
                if document.get_bool(flag.field_name()).unwrap_or(false) {
                    BadgeCheck::AlreadyUnlocked
                } else {
                    BadgeCheck::FirstAction
                }
            }
            Ok(None) => BadgeCheck::FirstAction,
            Err(e) => {
                warn!("Could not read {} for {}: {}", flag, user, e);
                BadgeCheck::Unknown
            }
        }
    }

    /// Merge `{flag: true}` into the root document
    pub async fn unlock(&self, user: &UserId, flag: BadgeFlag) -> Result<(), StoreError> {
        let mut fields = Fields::new();
        fields.insert(flag.field_name().to_string(), Value::Bool(true));
        self.store
            .set_document_merge(&self.paths.root(user), fields)
            .await
    }

    /// Run `action` and unlock `flag` if this was the user's first time
    pub async fn run_first_action<T, E, F, Fut>(
        &self,
        user: &UserId,
        flag: BadgeFlag,
        action: F,
    ) -> Result<FirstActionOutcome<T>, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let check = self.check(user, flag).await;
        let value = action().await?;

        let badge_unlocked = match check {
            BadgeCheck::FirstAction => match self.unlock(user, flag).await {
                Ok(()) => {
                    info!("Unlocked badge {} for {}", flag, user);
                    true
                }
                Err(e) => {
                    error!("Failed to unlock badge {} for {}: {}", flag, user, e);
                    false
                }
            },
            BadgeCheck::AlreadyUnlocked => false,
            BadgeCheck::Unknown => {
                debug!("Skipping badge write for {} after failed read", flag);
                false
            }
        };

        Ok(FirstActionOutcome {
            value,
            badge_unlocked,
        })
    }

    /// Current badge flags; a missing root document means nothing unlocked
    pub async fn badges(&self, user: &UserId) -> Result<BadgeStatus, StoreError> {
        let path = self.paths.root(user);
        match self.store.get_document(&path).await? {
            Some(document) => {
                let root: UserRoot = document.decode().map_err(|e| StoreError::Malformed {
                    path: path.to_string(),
                    reason: e.to_string(),
                })?;
                Ok(root.badges())
            }
            None => Ok(BadgeStatus::default()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::storage::test_utils::{FlakyStore, StoreOp};
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn setup() -> (BadgeService, FlakyStore, UserId) {
        let store = FlakyStore::new();
        let service = BadgeService::new(Arc::new(store.clone()), UserPaths::default());
        (service, store, UserId::new("u1"))
    }

    fn flag_value(store: &FlakyStore, user: &UserId, flag: BadgeFlag) -> Option<Value> {
        store
            .inner()
            .peek(&UserPaths::default().root(user))
            .and_then(|fields| fields.get(flag.field_name()).cloned())
    }

    async fn succeed() -> Result<&'static str, StoreError> {
        Ok("record")
    }

    #[tokio::test]
    async fn test_first_action_unlocks_badge() {
        let (service, store, user) = setup();
        assert_eq!(service.check(&user, BadgeFlag::FirstJournal).await, BadgeCheck::FirstAction);

        let outcome = service
            .run_first_action(&user, BadgeFlag::FirstJournal, succeed)
            .await
            .unwrap();
        assert_eq!(outcome.value, "record");
        assert!(outcome.badge_unlocked);
        assert_eq!(flag_value(&store, &user, BadgeFlag::FirstJournal), Some(json!(true)));

        let second = service
            .run_first_action(&user, BadgeFlag::FirstJournal, succeed)
            .await
            .unwrap();
        assert!(!second.badge_unlocked);
        assert_eq!(store.calls(StoreOp::Merge), 1);

        let badges = service.badges(&user).await.unwrap();
        assert!(badges.has_written_first_journal);
        assert!(!badges.has_logged_first_medication);
    }

    #[tokio::test]
    async fn test_read_failure_proceeds_without_write() {
        let (service, store, user) = setup();
        store.fail(StoreOp::Get, true);

        let outcome = service
            .run_first_action(&user, BadgeFlag::FirstMedication, succeed)
            .await
            .unwrap();
        assert!(!outcome.badge_unlocked);
        assert_eq!(store.calls(StoreOp::Merge), 0);
    }

    #[tokio::test]
    async fn test_failed_action_writes_nothing() {
        let (service, store, user) = setup();

        let result = service
            .run_first_action(&user, BadgeFlag::FirstMedication, || async {
                Err::<(), _>(StoreError::Unavailable("offline".to_string()))
            })
            .await;
        assert!(result.is_err());
        assert_eq!(store.calls(StoreOp::Merge), 0);
        assert_eq!(flag_value(&store, &user, BadgeFlag::FirstMedication), None);
    }

    #[tokio::test]
    async fn test_write_failure_does_not_fail_action() {
        let (service, store, user) = setup();
        store.fail(StoreOp::Merge, true);

        let outcome = service
            .run_first_action(&user, BadgeFlag::FirstMedication, succeed)
            .await
            .unwrap();
        assert_eq!(outcome.value, "record");
        assert!(!outcome.badge_unlocked);
    }

    #[tokio::test]
    async fn test_concurrent_first_actions_leave_flag_set() {
        let (service, store, user) = setup();
        let actions = Arc::new(AtomicUsize::new(0));

        let run = || {
            let actions = Arc::clone(&actions);
            service.run_first_action(&user, BadgeFlag::FirstJournal, move || async move {
                tokio::task::yield_now().await;
                actions.fetch_add(1, Ordering::SeqCst);
                Ok::<_, StoreError>(())
            })
        };
        let (first, second) = tokio::join!(run(), run());

        assert!(first.is_ok() && second.is_ok());
        assert_eq!(actions.load(Ordering::SeqCst), 2);
        assert_eq!(flag_value(&store, &user, BadgeFlag::FirstJournal), Some(json!(true)));
        // Both saw the flag unset, so both wrote it
        assert_eq!(store.calls(StoreOp::Merge), 2);
    }

    #[tokio::test]
    async fn test_badges_for_unknown_user() {
        let (service, _store, user) = setup();
        assert_eq!(service.badges(&user).await.unwrap(), BadgeStatus::default());
    }
}
