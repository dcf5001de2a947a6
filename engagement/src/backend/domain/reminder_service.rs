//! Reminder service domain logic.
//!
//! Setting a reminder spans two independent systems: the document store holds
//! the reminder record and the local notification subsystem holds the alarm.
//!
//! ## Flow
//!
//! 1. Validate the input (no side effects on failure)
//! 2. Persist the record; the store assigns its id. Failure aborts everything.
//! 3. Install the weekly trigger under the record id, cancelling any previous
//!    schedule with that id first. Failure here does not remove the record;
//!    the caller gets a permission or scheduling error naming the saved id.
//! 4. Count the reminder as an engagement event on the streak.

use log::{debug, error, info, warn};
use shared::{HistoryKind, Reminder, ReminderDay, ReminderTime};
use std::sync::Arc;

use crate::backend::config::NotificationSettings;
use crate::backend::domain::commands::reminders::{SetReminderCommand, SetReminderResult};
use crate::backend::domain::models::reminder::{ReminderValidationError, ValidatedReminder};
use crate::backend::domain::streak_service::StreakService;
use crate::backend::identity::IdentityService;
use crate::backend::notifications::{
    LocalNotifier, NotificationContent, NotificationError, PermissionStatus, WeeklyTrigger,
};
use crate::backend::storage::{DocumentStore, StoreError, UserPaths};

#[derive(Debug, thiserror::Error)]
pub enum ReminderError {
    #[error(transparent)]
    Validation(#[from] ReminderValidationError),
    #[error("Please sign in to set reminders")]
    NotSignedIn,
    #[error("Failed to save reminder: {0}")]
    Persist(#[source] StoreError),
    #[error("Failed to load reminder: {0}")]
    Load(#[source] StoreError),
    #[error("Reminder {0} not found")]
    NotFound(String),
    #[error("Reminder {reminder_id} was saved, but notifications are not permitted so it will not fire")]
    PermissionDenied { reminder_id: String },
    #[error("Reminder {reminder_id} was saved, but scheduling it failed: {source}")]
    ScheduleFailed {
        reminder_id: String,
        #[source]
        source: NotificationError,
    },
}

impl ReminderError {
    /// Id of the reminder record that was saved despite the error
    pub fn saved_reminder_id(&self) -> Option<&str> {
        match self {
            ReminderError::PermissionDenied { reminder_id }
            | ReminderError::ScheduleFailed { reminder_id, .. } => Some(reminder_id),
            _ => None,
        }
    }
}

#[derive(Clone)]
pub struct ReminderService {
    store: Arc<dyn DocumentStore>,
    notifier: Arc<dyn LocalNotifier>,
    identity: Arc<dyn IdentityService>,
    streak: StreakService,
    paths: UserPaths,
    settings: NotificationSettings,
}

impl ReminderService {
    pub fn new(
        store: Arc<dyn DocumentStore>,
        notifier: Arc<dyn LocalNotifier>,
        identity: Arc<dyn IdentityService>,
        streak: StreakService,
        paths: UserPaths,
        settings: NotificationSettings,
    ) -> Self {
        Self {
            store,
            notifier,
            identity,
            streak,
            paths,
            settings,
        }
    }

    /// Make sure notifications may be shown, prompting only when needed.
    /// Safe to call any number of times.
    pub async fn request_permissions(&self) -> Result<PermissionStatus, NotificationError> {
        if let Err(e) = self.notifier.configure_channel(&self.settings.channel).await {
            warn!("Failed to configure notification channel: {}", e);
        }

        let existing = self.notifier.permission_status().await?;
        if existing.is_granted() {
            debug!("Notification permission already granted");
            return Ok(existing);
        }

        let status = self.notifier.request_permission().await?;
        if status.is_granted() {
            info!("Notification permission granted");
        } else {
            warn!("Notifications are needed for reminders (permission {:?})", status);
        }
        Ok(status)
    }

    pub async fn set_reminder(&self, command: SetReminderCommand) -> Result<SetReminderResult, ReminderError> {
        let reminder = ValidatedReminder::parse(&command.text, &command.day, &command.time)?;
        let user = self
            .identity
            .current_identity()
            .ok_or(ReminderError::NotSignedIn)?;

        let collection = self.paths.history(&user, HistoryKind::Reminders);
        let reminder_id = self
            .store
            .append_to_collection(&collection, reminder.to_fields())
            .await
            .map_err(|e| {
                error!("Failed to save reminder for {}: {}", user, e);
                ReminderError::Persist(e)
            })?;
        info!(
            "Saved reminder {} for {} ({} {})",
            reminder_id, user, reminder.day, reminder.time
        );

        let trigger = self
            .arm(&reminder_id, &reminder.text, reminder.day, reminder.time)
            .await?;

        let streak = match self.streak.increment() {
            Ok(increment) => Some(increment),
            Err(e) => {
                warn!("Reminder {} set but streak not counted: {}", reminder_id, e);
                None
            }
        };

        Ok(SetReminderResult {
            reminder_id,
            trigger,
            streak,
        })
    }

    /// Install (or reinstall) the schedule of a saved reminder
    pub async fn install_schedule(&self, reminder: &Reminder) -> Result<WeeklyTrigger, ReminderError> {
        self.arm(
            &reminder.id,
            &reminder.reminder_text,
            reminder.reminder_day,
            reminder.reminder_time,
        )
        .await
    }

    /// Load a saved reminder of the current user and reinstall its schedule
    pub async fn rearm(&self, reminder_id: &str) -> Result<WeeklyTrigger, ReminderError> {
        let user = self
            .identity
            .current_identity()
            .ok_or(ReminderError::NotSignedIn)?;
        let path = self.paths.record(&user, HistoryKind::Reminders, reminder_id);

        let document = self
            .store
            .get_document(&path)
            .await
            .map_err(ReminderError::Load)?
            .ok_or_else(|| ReminderError::NotFound(reminder_id.to_string()))?;
        let mut reminder: Reminder = document.decode().map_err(|e| {
            ReminderError::Load(StoreError::Malformed {
                path: path.to_string(),
                reason: e.to_string(),
            })
        })?;
        reminder.id = document.id;

        self.install_schedule(&reminder).await
    }

    async fn arm(
        &self,
        reminder_id: &str,
        text: &str,
        day: ReminderDay,
        time: ReminderTime,
    ) -> Result<WeeklyTrigger, ReminderError> {
        let trigger = WeeklyTrigger::for_reminder(day, time);
        let content = NotificationContent {
            title: self.settings.title.clone(),
            body: text.to_string(),
            sound: self.settings.sound.clone(),
            reminder_id: reminder_id.to_string(),
        };

        // At most one schedule per reminder id
        if let Err(e) = self.notifier.cancel(reminder_id).await {
            warn!("Failed to cancel existing schedule {}: {}", reminder_id, e);
        }

        match self.notifier.schedule(reminder_id, content, trigger).await {
            Ok(()) => {
                info!(
                    "Scheduled reminder {} for weekday {} at {:02}:{:02}",
                    reminder_id, trigger.weekday, trigger.hour, trigger.minute
                );
                Ok(trigger)
            }
            Err(NotificationError::PermissionDenied) => {
                warn!("Reminder {} saved but notification permission is missing", reminder_id);
                Err(ReminderError::PermissionDenied {
                    reminder_id: reminder_id.to_string(),
                })
            }
            Err(source) => {
                error!("Failed to schedule reminder {}: {}", reminder_id, source);
                Err(ReminderError::ScheduleFailed {
                    reminder_id: reminder_id.to_string(),
                    source,
                })
            }
        }
    }
}
