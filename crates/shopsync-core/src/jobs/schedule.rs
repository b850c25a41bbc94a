//! Per-shop sweep schedule

use chrono::{DateTime, Datelike, Duration, TimeZone, Timelike, Utc, Weekday};
use serde::{Deserialize, Serialize};

const DEFAULT_EVERY_HOURS: u32 = 24;

/// When the scheduled sweep may run for a shop. Times are UTC.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct SyncSchedule {
    /// Minimum hours between sweeps (default 24)
    #[serde(default)]
    pub every_hours: Option<u32>,
    /// Allowed weekdays; empty means every day
    #[serde(default)]
    pub days: Vec<Weekday>,
    /// Allowed hour of day; `None` means any hour
    #[serde(default)]
    pub hour: Option<u32>,
}

impl SyncSchedule {
    pub fn interval(&self) -> Duration {
        Duration::hours(i64::from(self.every_hours.unwrap_or(DEFAULT_EVERY_HOURS).max(1)))
    }

    /// Whether a sweep should run at `now` given the previous sweep (Unix ms).
    pub fn is_due(&self, now: DateTime<Utc>, last_sweep_ms: Option<i64>) -> bool {
        if !self.days.is_empty() && !self.days.contains(&now.weekday()) {
            return false;
        }
        if self.hour.is_some_and(|hour| hour != now.hour()) {
            return false;
        }

        let Some(last) = last_sweep_ms.and_then(|ms| Utc.timestamp_millis_opt(ms).single()) else {
            return true;
        };
        now - last >= self.interval()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // 2026-03-02 is a Monday
    fn at(day: u32, hour: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, day, hour, 0, 0).unwrap()
    }

    #[test]
    fn test_first_sweep_is_due_immediately() {
        assert!(SyncSchedule::default().is_due(at(2, 10), None));
    }

    #[test]
    fn test_interval_must_elapse() {
        let schedule = SyncSchedule {
            every_hours: Some(6),
            ..SyncSchedule::default()
        };
        let last = at(2, 10).timestamp_millis();
        assert!(!schedule.is_due(at(2, 15), Some(last)));
        assert!(schedule.is_due(at(2, 16), Some(last)));
    }

    #[test]
    fn test_day_and_hour_restrict() {
        let schedule = SyncSchedule {
            every_hours: Some(1),
            days: vec![Weekday::Mon, Weekday::Thu],
            hour: Some(3),
        };
        assert!(schedule.is_due(at(2, 3), None));
        assert!(!schedule.is_due(at(2, 4), None));
        assert!(!schedule.is_due(at(3, 3), None));
        assert!(schedule.is_due(at(5, 3), None));
    }

    #[test]
    fn test_schedule_deserializes_weekday_names() {
        let schedule: SyncSchedule =
            serde_json::from_str(r#"{"days": ["Mon", "Fri"], "hour": 2}"#).unwrap();
        assert_eq!(schedule.days, vec![Weekday::Mon, Weekday::Fri]);
        assert_eq!(schedule.interval(), Duration::hours(24));
    }
}
