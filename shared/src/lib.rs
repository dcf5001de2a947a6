use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Opaque identifier of a signed-in user. Every record is scoped under one.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(String);

impl UserId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Day a reminder repeats on, ordered Monday first
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ReminderDay {
    Monday,
    Tuesday,
    Wednesday,
    Thursday,
    Friday,
    Saturday,
    Sunday,
}

impl ReminderDay {
    pub const ALL: [ReminderDay; 7] = [
        ReminderDay::Monday,
        ReminderDay::Tuesday,
        ReminderDay::Wednesday,
        ReminderDay::Thursday,
        ReminderDay::Friday,
        ReminderDay::Saturday,
        ReminderDay::Sunday,
    ];

    /// 0-based position in the Monday-first week
    pub fn index(self) -> u8 {
        match self {
            ReminderDay::Monday => 0,
            ReminderDay::Tuesday => 1,
            ReminderDay::Wednesday => 2,
            ReminderDay::Thursday => 3,
            ReminderDay::Friday => 4,
            ReminderDay::Saturday => 5,
            ReminderDay::Sunday => 6,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            ReminderDay::Monday => "Monday",
            ReminderDay::Tuesday => "Tuesday",
            ReminderDay::Wednesday => "Wednesday",
            ReminderDay::Thursday => "Thursday",
            ReminderDay::Friday => "Friday",
            ReminderDay::Saturday => "Saturday",
            ReminderDay::Sunday => "Sunday",
        }
    }

    /// Weekday number understood by the notification platform (1 = Sunday ... 7 = Saturday)
    pub fn trigger_weekday(self) -> u8 {
        ((self.index() + 1) % 7) + 1
    }
}

impl fmt::Display for ReminderDay {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for ReminderDay {
    type Err = ReminderDayError;

    /// Only the exact day names are accepted
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ReminderDay::ALL
            .into_iter()
            .find(|day| day.name() == s)
            .ok_or_else(|| ReminderDayError(s.to_string()))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ReminderDayError(pub String);

impl fmt::Display for ReminderDayError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Unknown day of week: '{}'", self.0)
    }
}

impl std::error::Error for ReminderDayError {}

/// Time of day in strict 24-hour `HH:MM` form
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ReminderTime {
    hour: u8,
    minute: u8,
}

impl ReminderTime {
    pub fn new(hour: u8, minute: u8) -> Result<Self, ReminderTimeError> {
        if hour > 23 || minute > 59 {
            return Err(ReminderTimeError(format!("{:02}:{:02}", hour, minute)));
        }
        Ok(Self { hour, minute })
    }

    pub fn hour(&self) -> u8 {
        self.hour
    }

    pub fn minute(&self) -> u8 {
        self.minute
    }
}

impl fmt::Display for ReminderTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:02}:{:02}", self.hour, self.minute)
    }
}

impl FromStr for ReminderTime {
    type Err = ReminderTimeError;

    /// Accepts exactly two hour digits `[01]\d|2[0-3]`, a colon and two minute digits `[0-5]\d`
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || ReminderTimeError(s.to_string());
        let bytes = s.as_bytes();
        if bytes.len() != 5 || bytes[2] != b':' {
            return Err(invalid());
        }
        let digits = [bytes[0], bytes[1], bytes[3], bytes[4]];
        if !digits.iter().all(u8::is_ascii_digit) {
            return Err(invalid());
        }
        let hour = (digits[0] - b'0') * 10 + (digits[1] - b'0');
        let minute = (digits[2] - b'0') * 10 + (digits[3] - b'0');
        Self::new(hour, minute).map_err(|_| invalid())
    }
}

impl TryFrom<String> for ReminderTime {
    type Error = ReminderTimeError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<ReminderTime> for String {
    fn from(time: ReminderTime) -> Self {
        time.to_string()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ReminderTimeError(pub String);

impl fmt::Display for ReminderTimeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Invalid time '{}', expected HH:MM (e.g., 09:00 or 14:30)", self.0)
    }
}

impl std::error::Error for ReminderTimeError {}

/// A recurring weekly reminder stored under `reminders/{id}`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Reminder {
    /// Store-assigned document id, not part of the stored fields
    #[serde(skip)]
    pub id: String,
    pub reminder_text: String,
    pub reminder_day: ReminderDay,
    pub reminder_time: ReminderTime,
    /// Server timestamp, absent until the store resolves it
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub is_active: bool,
}

/// A medication intake stored under `medicationLogs/{id}`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MedicationLogEntry {
    #[serde(skip)]
    pub id: String,
    pub medication_name: String,
    #[serde(default)]
    pub dosage: String,
    #[serde(default)]
    pub timestamp: Option<DateTime<Utc>>,
}

/// A journal entry stored under `journal/{id}`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JournalEntry {
    #[serde(skip)]
    pub id: String,
    pub text: String,
    #[serde(default)]
    pub timestamp: Option<DateTime<Utc>>,
}

/// The user's root document. Every field is optional in storage.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct UserRoot {
    pub first_name: Option<String>,
    pub current_streak: u32,
    pub last_streak_update: Option<DateTime<Utc>>,
    pub has_logged_first_medication: bool,
    pub has_written_first_journal: bool,
}

impl UserRoot {
    pub fn badges(&self) -> BadgeStatus {
        BadgeStatus {
            has_logged_first_medication: self.has_logged_first_medication,
            has_written_first_journal: self.has_written_first_journal,
        }
    }
}

/// One-way achievement flags kept on the user's root document
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BadgeFlag {
    FirstMedication,
    FirstJournal,
}

impl BadgeFlag {
    /// Name of the boolean field on the root document
    pub fn field_name(self) -> &'static str {
        match self {
            BadgeFlag::FirstMedication => "hasLoggedFirstMedication",
            BadgeFlag::FirstJournal => "hasWrittenFirstJournal",
        }
    }
}

impl fmt::Display for BadgeFlag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.field_name())
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BadgeStatus {
    pub has_logged_first_medication: bool,
    pub has_written_first_journal: bool,
}

impl BadgeStatus {
    pub fn is_unlocked(&self, flag: BadgeFlag) -> bool {
        match flag {
            BadgeFlag::FirstMedication => self.has_logged_first_medication,
            BadgeFlag::FirstJournal => self.has_written_first_journal,
        }
    }
}

/// Lifecycle of the streak counter
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum StreakState {
    #[default]
    Uninitialized,
    Loading,
    Ready(u32),
}

impl StreakState {
    /// Current counter value, 0 unless ready
    pub fn value(&self) -> u32 {
        match self {
            StreakState::Ready(n) => *n,
            _ => 0,
        }
    }

    pub fn is_loading(&self) -> bool {
        matches!(self, StreakState::Loading)
    }

    pub fn is_ready(&self) -> bool {
        matches!(self, StreakState::Ready(_))
    }
}

/// The three user record collections shown in history views
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum HistoryKind {
    MedicationLogs,
    Journal,
    Reminders,
}

impl HistoryKind {
    pub const ALL: [HistoryKind; 3] = [
        HistoryKind::MedicationLogs,
        HistoryKind::Journal,
        HistoryKind::Reminders,
    ];

    /// Collection name under the user root
    pub fn collection_name(self) -> &'static str {
        match self {
            HistoryKind::MedicationLogs => "medicationLogs",
            HistoryKind::Journal => "journal",
            HistoryKind::Reminders => "reminders",
        }
    }

    /// Field the collection is ordered by, newest first
    pub fn order_field(self) -> &'static str {
        match self {
            HistoryKind::MedicationLogs | HistoryKind::Journal => "timestamp",
            HistoryKind::Reminders => "createdAt",
        }
    }
}

impl fmt::Display for HistoryKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.collection_name())
    }
}

impl FromStr for HistoryKind {
    type Err = HistoryKindError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "medication" | "medications" | "medicationlogs" => Ok(HistoryKind::MedicationLogs),
            "journal" | "journals" => Ok(HistoryKind::Journal),
            "reminder" | "reminders" => Ok(HistoryKind::Reminders),
            _ => Err(HistoryKindError(s.to_string())),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct HistoryKindError(pub String);

impl fmt::Display for HistoryKindError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Unknown record kind '{}', expected medication, journal or reminders",
            self.0
        )
    }
}

impl std::error::Error for HistoryKindError {}

/// Cached, newest-first view of a user's records
#[derive(Debug, Clone, Default, PartialEq)]
pub struct HistorySnapshot {
    pub user: Option<UserId>,
    /// True until every collection has delivered once (or failed)
    pub loading: bool,
    pub medication_logs: Vec<MedicationLogEntry>,
    pub journal_entries: Vec<JournalEntry>,
    pub reminders: Vec<Reminder>,
}

impl HistorySnapshot {
    pub fn len_of(&self, kind: HistoryKind) -> usize {
        match kind {
            HistoryKind::MedicationLogs => self.medication_logs.len(),
            HistoryKind::Journal => self.journal_entries.len(),
            HistoryKind::Reminders => self.reminders.len(),
        }
    }

    pub fn ids_of(&self, kind: HistoryKind) -> Vec<&str> {
        match kind {
            HistoryKind::MedicationLogs => self.medication_logs.iter().map(|r| r.id.as_str()).collect(),
            HistoryKind::Journal => self.journal_entries.iter().map(|r| r.id.as_str()).collect(),
            HistoryKind::Reminders => self.reminders.iter().map(|r| r.id.as_str()).collect(),
        }
    }
}
