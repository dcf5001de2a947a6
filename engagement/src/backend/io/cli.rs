//! Command handlers for the `habit-engagement` binary.
//!
//! Each subcommand maps to one service operation and renders a short text
//! result. Errors are returned to `main`, which reports them and exits non-zero.

use anyhow::{anyhow, Result};
use chrono::Local;
use clap::Subcommand;
use shared::{BadgeFlag, HistoryKind, HistorySnapshot};
use std::fmt::Write as _;

use crate::backend::config::EngagementConfig;
use crate::backend::domain::commands::activity::{LogMedicationCommand, WriteJournalCommand};
use crate::backend::domain::commands::history::DeleteRecordCommand;
use crate::backend::domain::commands::reminders::SetReminderCommand;
use crate::backend::LocalBackend;

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Show the current streak
    Streak,
    /// Show which first-action badges are unlocked
    Badges,
    /// Ask for notification permission if it has not been granted
    Permissions,
    /// Save a weekly reminder and schedule its notification
    Remind {
        #[arg(long)]
        text: String,
        /// Weekday name, e.g. Wednesday
        #[arg(long)]
        day: String,
        /// 24-hour HH:MM
        #[arg(long)]
        time: String,
    },
    /// Reinstall the notification of a saved reminder
    Rearm {
        #[arg(long)]
        id: String,
    },
    /// Log a medication intake
    LogMedication {
        #[arg(long)]
        name: String,
        #[arg(long)]
        dosage: String,
    },
    /// Write a journal entry
    Journal {
        #[arg(long)]
        text: String,
    },
    /// List records, newest first
    History {
        /// medications, journal or reminders; all when omitted
        #[arg(long)]
        kind: Option<HistoryKind>,
    },
    /// Delete one record
    Delete {
        #[arg(long)]
        kind: HistoryKind,
        #[arg(long)]
        id: String,
    },
    /// List installed notification schedules
    Schedules,
    /// Print the effective configuration
    Config,
}

pub async fn execute_command(
    backend: &LocalBackend,
    config: &EngagementConfig,
    command: Command,
) -> Result<String> {
    let state = &backend.app.state;

    match command {
        Command::Streak => {
            let streak = state.streak_service.ready().await;
            Ok(format!("Current streak: {}", streak))
        }
        Command::Badges => {
            let user = state
                .identity
                .current_identity()
                .ok_or_else(|| anyhow!("No user selected; pass --user or set default_user"))?;
            let badges = state.badge_service.badges(&user).await?;
            let mut output = String::new();
            for (flag, label) in [
                (BadgeFlag::FirstMedication, "First medication logged"),
                (BadgeFlag::FirstJournal, "First journal entry"),
            ] {
                let mark = if badges.is_unlocked(flag) { "unlocked" } else { "locked" };
                writeln!(output, "{}: {}", label, mark)?;
            }
            Ok(output.trim_end().to_string())
        }
        Command::Permissions => {
            let status = state.reminder_service.request_permissions().await?;
            Ok(format!("Notification permission: {:?}", status))
        }
        Command::Remind { text, day, time } => {
            state.streak_service.ready().await;
            state.reminder_service.request_permissions().await?;
            let result = state
                .reminder_service
                .set_reminder(SetReminderCommand { text, day, time })
                .await?;
            let mut output = format!(
                "Reminder {} saved and scheduled (weekday {} at {:02}:{:02})",
                result.reminder_id, result.trigger.weekday, result.trigger.hour, result.trigger.minute
            );
            if let Some(increment) = result.streak {
                let streak = increment.persisted().await;
                write!(output, "\nStreak: {}", streak)?;
            }
            Ok(output)
        }
        Command::Rearm { id } => {
            state.reminder_service.request_permissions().await?;
            let trigger = state.reminder_service.rearm(&id).await?;
            Ok(format!(
                "Reminder {} scheduled (weekday {} at {:02}:{:02})",
                id, trigger.weekday, trigger.hour, trigger.minute
            ))
        }
        Command::LogMedication { name, dosage } => {
            let result = state
                .activity_service
                .log_medication(LogMedicationCommand {
                    medication_name: name,
                    dosage,
                })
                .await?;
            Ok(activity_message("Medication logged", &result.record_id, result.badge_unlocked))
        }
        Command::Journal { text } => {
            let result = state
                .activity_service
                .write_journal(WriteJournalCommand { text })
                .await?;
            Ok(activity_message("Journal entry saved", &result.record_id, result.badge_unlocked))
        }
        Command::History { kind } => {
            state.history_service.observe(state.identity.current_identity());
            let snapshot = state.history_service.snapshot();
            let kinds = match kind {
                Some(kind) => vec![kind],
                None => HistoryKind::ALL.to_vec(),
            };
            render_history(&snapshot, &kinds)
        }
        Command::Delete { kind, id } => {
            state.history_service.observe(state.identity.current_identity());
            state
                .history_service
                .delete(DeleteRecordCommand {
                    kind,
                    record_id: id.clone(),
                })
                .await?;
            Ok(format!("Deleted {} item {}", kind, id))
        }
        Command::Schedules => {
            let now = Local::now().naive_local();
            let mut output = String::new();
            for scheduled in backend.notifier.schedules() {
                let next = scheduled
                    .trigger
                    .next_fire_after(now)
                    .map(|at| at.format("%a %Y-%m-%d %H:%M").to_string())
                    .unwrap_or_else(|| "never".to_string());
                writeln!(
                    output,
                    "{}  \"{}\"  next: {}",
                    scheduled.identifier, scheduled.content.body, next
                )?;
            }
            if output.is_empty() {
                output.push_str("No schedules installed");
            }
            Ok(output.trim_end().to_string())
        }
        Command::Config => Ok(serde_yaml::to_string(config)?.trim_end().to_string()),
    }
}

fn activity_message(action: &str, record_id: &str, badge_unlocked: bool) -> String {
    if badge_unlocked {
        format!("{} ({}). Badge unlocked!", action, record_id)
    } else {
        format!("{} ({})", action, record_id)
    }
}

fn render_history(snapshot: &HistorySnapshot, kinds: &[HistoryKind]) -> Result<String> {
    if snapshot.user.is_none() {
        return Err(anyhow!("No user selected; pass --user or set default_user"));
    }

    let mut output = String::new();
    for kind in kinds {
        writeln!(output, "== {} ({}) ==", kind, snapshot.len_of(*kind))?;
        match kind {
            HistoryKind::MedicationLogs => {
                for entry in &snapshot.medication_logs {
                    writeln!(output, "{}  {} {}  {}", entry.id, entry.medication_name, entry.dosage, stamp(entry.timestamp))?;
                }
            }
            HistoryKind::Journal => {
                for entry in &snapshot.journal_entries {
                    writeln!(output, "{}  {}  {}", entry.id, stamp(entry.timestamp), entry.text)?;
                }
            }
            HistoryKind::Reminders => {
                for reminder in &snapshot.reminders {
                    let status = if reminder.is_active { "active" } else { "inactive" };
                    writeln!(
                        output,
                        "{}  {} {} {}  \"{}\"",
                        reminder.id, reminder.reminder_day, reminder.reminder_time, status, reminder.reminder_text
                    )?;
                }
            }
        }
    }
    Ok(output.trim_end().to_string())
}

fn stamp(timestamp: Option<chrono::DateTime<chrono::Utc>>) -> String {
    timestamp
        .map(|at| at.with_timezone(&Local).format("%Y-%m-%d %H:%M").to_string())
        .unwrap_or_else(|| "pending".to_string())
}
