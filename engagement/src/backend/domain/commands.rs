//! Domain-level command and result types
//! These structs are used by services inside the domain layer. The binary's
//! I/O layer maps its arguments to these types.

pub mod reminders {
    use crate::backend::domain::streak_service::StreakIncrement;
    use crate::backend::notifications::WeeklyTrigger;

    /// Raw reminder input as entered by the user.
    #[derive(Debug, Clone)]
    pub struct SetReminderCommand {
        pub text: String,
        /// Weekday name, e.g. "Wednesday"
        pub day: String,
        /// 24-hour "HH:MM"
        pub time: String,
    }

    /// Result of a fully successful reminder set.
    #[derive(Debug)]
    pub struct SetReminderResult {
        pub reminder_id: String,
        pub trigger: WeeklyTrigger,
        /// `None` when the streak was not ready to count the event
        pub streak: Option<StreakIncrement>,
    }
}

pub mod activity {
    /// Input for logging a medication intake.
    #[derive(Debug, Clone)]
    pub struct LogMedicationCommand {
        pub medication_name: String,
        pub dosage: String,
    }

    /// Input for writing a journal entry.
    #[derive(Debug, Clone)]
    pub struct WriteJournalCommand {
        pub text: String,
    }

    /// Result of logging an activity.
    #[derive(Debug, Clone, PartialEq, Eq)]
    pub struct ActivityResult {
        pub record_id: String,
        /// True when this entry unlocked the first-action badge
        pub badge_unlocked: bool,
    }
}

pub mod history {
    use shared::HistoryKind;

    /// Command for deleting one record from a history collection.
    #[derive(Debug, Clone)]
    pub struct DeleteRecordCommand {
        pub kind: HistoryKind,
        pub record_id: String,
    }
}
