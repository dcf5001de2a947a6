use serde_json::Value;
use shared::{ReminderDay, ReminderTime};

use crate::backend::storage::{server_timestamp, Fields};

/// Reminder input that passed validation and may be persisted
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidatedReminder {
    pub text: String,
    pub day: ReminderDay,
    pub time: ReminderTime,
}

impl ValidatedReminder {
    /// Validate raw input in order: text, then time, then weekday
    pub fn parse(text: &str, day: &str, time: &str) -> Result<Self, ReminderValidationError> {
        let text = text.trim();
        if text.is_empty() {
            return Err(ReminderValidationError::EmptyText);
        }

        let time: ReminderTime = time
            .parse()
            .map_err(|_| ReminderValidationError::InvalidTime(time.to_string()))?;
        let day: ReminderDay = day
            .parse()
            .map_err(|_| ReminderValidationError::UnknownDay(day.to_string()))?;

        Ok(Self {
            text: text.to_string(),
            day,
            time,
        })
    }

    /// Fields of a new reminder record; `createdAt` is stamped by the store
    pub fn to_fields(&self) -> Fields {
        let mut fields = Fields::new();
        fields.insert("reminderText".to_string(), Value::from(self.text.clone()));
        fields.insert("reminderDay".to_string(), Value::from(self.day.name()));
        fields.insert("reminderTime".to_string(), Value::from(self.time.to_string()));
        fields.insert("createdAt".to_string(), server_timestamp());
        fields.insert("isActive".to_string(), Value::Bool(true));
        fields
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ReminderValidationError {
    #[error("Please enter a reminder description")]
    EmptyText,
    #[error("Invalid time '{0}': please use HH:MM (e.g., 09:00 or 14:30)")]
    InvalidTime(String),
    #[error("Unknown weekday '{0}'")]
    UnknownDay(String),
}
