//! # Domain Module
//!
//! Contains the engagement logic of the health tracker: streaks, first-action
//! badges, recurring reminders and the live history lists.
//!
//! The services only talk to the outside world through the store, notifier
//! and identity traits, so they run the same against the in-memory, file or a
//! remote backend.
//!
//! ## Module Organization
//!
//! - **streak_service**: Streak state machine, reload on identity change, optimistic increments
//! - **badge_service**: Check-then-set first-action badges
//! - **reminder_service**: Reminder validation, persistence and weekly schedules
//! - **history_service**: Live ordered caches of a user's records, delete by id
//! - **activity_service**: Medication and journal logging flows
//! - **commands**: Command and result types used by the services
//! - **models**: Validated inputs and their validation errors
//!
//! ## Control Flow
//!
//! ```text
//! identity change     → StreakService reload/reset, HistoryService resubscribe
//! log medication/journal → BadgeService check → store append → flag write
//! set reminder        → store append → notifier cancel + schedule → streak increment
//! ```
//!
//! ## Business Rules
//!
//! - The streak never decreases and resets to 0 with no user signed in
//! - Badge flags go from false to true once and are never reset
//! - Invalid reminder input is rejected before anything is written
//! - A saved reminder is not removed when its schedule cannot be installed
//! - A reminder id has at most one installed schedule

pub mod activity_service;
pub mod badge_service;
pub mod commands;
pub mod history_service;
pub mod models;
pub mod reminder_service;
pub mod streak_service;

pub use activity_service::*;
pub use badge_service::*;
pub use commands::*;
pub use history_service::*;
pub use reminder_service::*;
pub use streak_service::*;
