//! # Business Hours Gate
//!
//! Decides whether a message may go out now, judged on the recipient-local clock,
//! and how long to wait otherwise. Pure function of `now_utc` and static configuration.

use chrono::{DateTime, Datelike, Days, FixedOffset, NaiveDateTime, NaiveTime, Timelike, Utc, Weekday};
use std::time::Duration;

use crate::domain::config::BusinessHoursConfig;
use crate::domain::types::GateDecision;

const WEEKDAYS: [Weekday; 5] = [
    Weekday::Mon,
    Weekday::Tue,
    Weekday::Wed,
    Weekday::Thu,
    Weekday::Fri,
];

#[derive(Debug, Clone)]
pub struct BusinessHoursGate {
    enabled: bool,
    start_hour: u32,
    end_hour: u32,
    offset: FixedOffset,
    /// `None` allows every day.
    days: Option<Vec<Weekday>>,
}

impl BusinessHoursGate {
    pub fn from_config(config: &BusinessHoursConfig) -> Self {
        let days = match &config.days {
            Some(days) => Some(days.clone()),
            None if config.weekdays_only => Some(WEEKDAYS.to_vec()),
            None => None,
        };
        Self {
            enabled: config.enabled,
            start_hour: config.start_hour,
            end_hour: config.end_hour.min(24),
            offset: config.timezone,
            days,
        }
    }

    pub fn check(&self, now_utc: DateTime<Utc>) -> GateDecision {
        if !self.enabled {
            return GateDecision::proceed();
        }

        let local = now_utc.with_timezone(&self.offset).naive_local();
        if self.is_open(&local) {
            return GateDecision::proceed();
        }

        match self.next_opening(&local) {
            Some(opening) => GateDecision::wait(round_up_to_minutes(opening - local)),
            None => {
                // Only reachable with an empty day list.
                tracing::warn!("Business hours allow no day of the week; re-checking in 24h");
                GateDecision::wait(Duration::from_secs(24 * 3600))
            }
        }
    }

    fn is_open(&self, local: &NaiveDateTime) -> bool {
        let hour = local.hour();
        self.day_allowed(local.weekday()) && hour >= self.start_hour && hour < self.end_hour
    }

    fn day_allowed(&self, day: Weekday) -> bool {
        self.days.as_ref().is_none_or(|days| days.contains(&day))
    }

    /// First window start strictly after `local`, at most a week out.
    fn next_opening(&self, local: &NaiveDateTime) -> Option<NaiveDateTime> {
        let start = NaiveTime::from_hms_opt(self.start_hour, 0, 0)?;
        (0..=7u64).find_map(|ahead| {
            let date = local.date().checked_add_days(Days::new(ahead))?;
            if !self.day_allowed(date.weekday()) {
                return None;
            }
            let candidate = date.and_time(start);
            (candidate > *local).then_some(candidate)
        })
    }
}

/// Whole minutes, rounded up, never zero.
fn round_up_to_minutes(delta: chrono::TimeDelta) -> Duration {
    let millis = delta.num_milliseconds().max(1) as u64;
    Duration::from_secs(millis.div_ceil(60_000) * 60)
}
