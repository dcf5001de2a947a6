//! # Notifications Module
//!
//! Contract for the device's local notification subsystem plus an in-process
//! implementation.
//!
//! Schedules are keyed by a stable identifier (the reminder's document id).
//! Scheduling under an identifier that already has a schedule replaces it, so
//! a reminder never ends up with two alarms.

mod memory;
mod trigger;

pub use memory::{MemoryNotifier, ScheduledNotification};
pub use trigger::WeeklyTrigger;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

#[derive(Debug, thiserror::Error)]
pub enum NotificationError {
    #[error("Notification permission not granted")]
    PermissionDenied,
    #[error("Invalid trigger: {0}")]
    InvalidTrigger(String),
    #[error("Notification service unavailable: {0}")]
    Unavailable(String),
    #[error(transparent)]
    Backend(#[from] anyhow::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PermissionStatus {
    Granted,
    Denied,
    #[default]
    Undetermined,
}

impl PermissionStatus {
    pub fn is_granted(self) -> bool {
        self == PermissionStatus::Granted
    }
}

/// What the user sees when a reminder fires
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationContent {
    pub title: String,
    pub body: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sound: Option<String>,
    /// Links the notification back to its reminder record
    pub reminder_id: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChannelImportance {
    Min,
    Low,
    Default,
    High,
    Max,
}

/// Delivery channel settings (used by platforms that group notifications)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationChannel {
    pub id: String,
    pub name: String,
    pub importance: ChannelImportance,
    pub vibration_pattern: Vec<u64>,
    pub light_color: String,
}

impl Default for NotificationChannel {
    fn default() -> Self {
        Self {
            id: "default".to_string(),
            name: "default".to_string(),
            importance: ChannelImportance::Max,
            vibration_pattern: vec![0, 250, 250, 250],
            light_color: "#FF231F7C".to_string(),
        }
    }
}

#[async_trait]
pub trait LocalNotifier: Send + Sync {
    /// Register the delivery channel. Platforms without channels ignore it.
    async fn configure_channel(&self, _channel: &NotificationChannel) -> Result<(), NotificationError> {
        Ok(())
    }

    /// Current permission without prompting the user
    async fn permission_status(&self) -> Result<PermissionStatus, NotificationError>;

    /// Prompt the user for permission and return the answer
    async fn request_permission(&self) -> Result<PermissionStatus, NotificationError>;

    /// Remove the schedule installed under `identifier`, if any
    async fn cancel(&self, identifier: &str) -> Result<(), NotificationError>;

    /// Install a recurring schedule under `identifier`, replacing any existing one
    async fn schedule(
        &self,
        identifier: &str,
        content: NotificationContent,
        trigger: WeeklyTrigger,
    ) -> Result<(), NotificationError>;
}
