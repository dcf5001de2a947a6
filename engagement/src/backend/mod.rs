//! # Backend Module
//!
//! Contains all non-UI logic of the habit engagement layer.
//!
//! This module brings together:
//! - **Domain**: Streak, badge, reminder, history and activity services
//! - **Storage**: The document store contract and its memory/YAML backends
//! - **Notifications**: The local notification contract and an in-process notifier
//! - **Identity**: Who is signed in, and change notifications
//! - **IO**: Command handlers used by the binary
//!
//! ## Architecture
//!
//! ```text
//! IO Layer (CLI handlers)
//!     ↓
//! Domain Layer (services)
//!     ↓
//! Storage / Notifications / Identity (external collaborators behind traits)
//! ```

pub mod config;
pub mod domain;
pub mod identity;
pub mod io;
pub mod notifications;
pub mod storage;

use anyhow::Result;
use log::info;
use shared::UserId;
use std::sync::Arc;

use crate::backend::config::EngagementConfig;
use crate::backend::domain::{
    ActivityService, BadgeService, HistoryService, ReminderService, StreakService,
};
use crate::backend::identity::{IdentityService, LocalIdentity};
use crate::backend::notifications::{LocalNotifier, MemoryNotifier};
use crate::backend::storage::{
    DocumentStore, SubscriptionSet, UserPaths, YamlConnection, YamlDocumentStore,
};

/// Main application state that holds all services
#[derive(Clone)]
pub struct AppState {
    pub streak_service: StreakService,
    pub badge_service: BadgeService,
    pub reminder_service: ReminderService,
    pub activity_service: ActivityService,
    pub history_service: HistoryService,
    pub identity: Arc<dyn IdentityService>,
}

/// Running backend: the services plus the listeners they registered
pub struct EngagementApp {
    pub state: AppState,
    listeners: SubscriptionSet,
}

impl EngagementApp {
    /// Dispose every listener the backend registered
    pub fn shutdown(mut self) {
        self.state.history_service.stop();
        self.listeners.dispose_all();
        info!("Engagement backend shut down");
    }
}

/// Initialize the backend with all required services.
/// Must be called inside a tokio runtime: the streak load starts right away.
pub fn initialize_backend(
    config: &EngagementConfig,
    store: Arc<dyn DocumentStore>,
    notifier: Arc<dyn LocalNotifier>,
    identity: Arc<dyn IdentityService>,
) -> EngagementApp {
    info!("Setting up domain services");
    let paths = UserPaths::new(config.users_collection.clone());

    let streak_service = StreakService::new(Arc::clone(&store), paths.clone());
    let badge_service = BadgeService::new(Arc::clone(&store), paths.clone());
    let reminder_service = ReminderService::new(
        Arc::clone(&store),
        notifier,
        Arc::clone(&identity),
        streak_service.clone(),
        paths.clone(),
        config.notifications.clone(),
    );
    let activity_service = ActivityService::new(
        Arc::clone(&store),
        Arc::clone(&identity),
        badge_service.clone(),
        paths.clone(),
    );
    let history_service = HistoryService::new(store, paths);

    info!("Attaching streak to identity changes");
    let mut listeners = SubscriptionSet::new();
    listeners.push(streak_service.attach(identity.as_ref()));

    EngagementApp {
        state: AppState {
            streak_service,
            badge_service,
            reminder_service,
            activity_service,
            history_service,
            identity,
        },
        listeners,
    }
}

/// A backend on local files: YAML documents and persisted schedules
pub struct LocalBackend {
    pub app: EngagementApp,
    pub store: YamlDocumentStore,
    pub notifier: MemoryNotifier,
    pub identity: LocalIdentity,
}

/// Open the file-backed stores under the configured data directory and
/// initialize the services for `user`
pub fn open_local_backend(config: &EngagementConfig, user: Option<UserId>) -> Result<LocalBackend> {
    let data_directory = config.resolve_data_directory()?;
    info!("Using data directory {}", data_directory.display());

    let connection = YamlConnection::new(&data_directory)?;
    let store = YamlDocumentStore::open(connection)?;
    let notifier = MemoryNotifier::open(&data_directory)?;
    let identity = match user {
        Some(user) => LocalIdentity::signed_in(user),
        None => LocalIdentity::new(),
    };

    let app = initialize_backend(
        config,
        Arc::new(store.clone()),
        Arc::new(notifier.clone()),
        Arc::new(identity.clone()),
    );

    Ok(LocalBackend {
        app,
        store,
        notifier,
        identity,
    })
}
