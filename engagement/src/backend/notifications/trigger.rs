use chrono::{Datelike, Duration, NaiveDateTime, NaiveTime};
use serde::{Deserialize, Serialize};
use shared::{ReminderDay, ReminderTime};

use super::NotificationError;

/// Recurring weekly trigger in the notification platform's numbering:
/// weekday 1 is Sunday, 7 is Saturday.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct WeeklyTrigger {
    pub weekday: u8,
    pub hour: u8,
    pub minute: u8,
    pub repeats: bool,
}

impl WeeklyTrigger {
    pub fn for_reminder(day: ReminderDay, time: ReminderTime) -> Self {
        Self {
            weekday: day.trigger_weekday(),
            hour: time.hour(),
            minute: time.minute(),
            repeats: true,
        }
    }

    pub fn validate(&self) -> Result<(), NotificationError> {
        if !(1..=7).contains(&self.weekday) {
            return Err(NotificationError::InvalidTrigger(format!(
                "weekday {} outside 1-7",
                self.weekday
            )));
        }
        if self.hour > 23 || self.minute > 59 {
            return Err(NotificationError::InvalidTrigger(format!(
                "time {:02}:{:02} outside 00:00-23:59",
                self.hour, self.minute
            )));
        }
        Ok(())
    }

    /// The first time strictly after `after` at which this trigger fires
    pub fn next_fire_after(&self, after: NaiveDateTime) -> Option<NaiveDateTime> {
        self.validate().ok()?;
        let time = NaiveTime::from_hms_opt(u32::from(self.hour), u32::from(self.minute), 0)?;

        let current = after.weekday().num_days_from_sunday() as i64 + 1;
        let days_ahead = (i64::from(self.weekday) - current).rem_euclid(7);
        let candidate = (after.date() + Duration::days(days_ahead)).and_time(time);

        if candidate > after {
            Some(candidate)
        } else {
            Some(candidate + Duration::days(7))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn at(year: i32, month: u32, day: u32, hour: u32, minute: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(year, month, day)
            .unwrap()
            .and_hms_opt(hour, minute, 0)
            .unwrap()
    }

    #[test]
    fn test_trigger_for_wednesday_morning() {
        let trigger = WeeklyTrigger::for_reminder(ReminderDay::Wednesday, ReminderTime::new(9, 0).unwrap());
        assert_eq!(
            trigger,
            WeeklyTrigger {
                weekday: 4,
                hour: 9,
                minute: 0,
                repeats: true
            }
        );
    }

    #[test]
    fn test_next_fire_after() {
        // 2026-10-19 is a Monday
        let monday_noon = at(2026, 10, 19, 12, 0);
        let wednesday = WeeklyTrigger::for_reminder(ReminderDay::Wednesday, ReminderTime::new(9, 0).unwrap());
        assert_eq!(wednesday.next_fire_after(monday_noon), Some(at(2026, 10, 21, 9, 0)));

        // Same day, later time fires today
        let monday_evening = WeeklyTrigger::for_reminder(ReminderDay::Monday, ReminderTime::new(18, 30).unwrap());
        assert_eq!(monday_evening.next_fire_after(monday_noon), Some(at(2026, 10, 19, 18, 30)));

        // Same day, earlier time waits a week
        let monday_morning = WeeklyTrigger::for_reminder(ReminderDay::Monday, ReminderTime::new(8, 0).unwrap());
        assert_eq!(monday_morning.next_fire_after(monday_noon), Some(at(2026, 10, 26, 8, 0)));

        let sunday = WeeklyTrigger::for_reminder(ReminderDay::Sunday, ReminderTime::new(7, 15).unwrap());
        assert_eq!(sunday.weekday, 1);
        assert_eq!(sunday.next_fire_after(monday_noon), Some(at(2026, 10, 25, 7, 15)));
    }

    #[test]
    fn test_validate_rejects_out_of_range() {
        let trigger = WeeklyTrigger {
            weekday: 0,
            hour: 9,
            minute: 0,
            repeats: true,
        };
        assert!(matches!(trigger.validate(), Err(NotificationError::InvalidTrigger(_))));
        assert_eq!(trigger.next_fire_after(at(2026, 10, 19, 0, 0)), None);

        let trigger = WeeklyTrigger {
            weekday: 3,
            hour: 24,
            minute: 0,
            repeats: true,
        };
        assert!(trigger.validate().is_err());
    }
}
