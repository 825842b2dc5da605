//! Trigger math: when does a job next fire?
//!
//! A trigger is evaluated once, at scheduler start, to get the initial
//! delay. Every later firing is `period()` after the previous one.
//! All functions here are pure; the caller supplies "now".

use chrono::{Datelike, Duration, NaiveDate, NaiveDateTime, Timelike, Weekday};
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Trigger {
    /// Every day at `hour`:00:00.
    DailyAt { hour: u32 },
    /// Every hour at `minute`:00.
    HourlyAt { minute: u32 },
    /// Every week on `weekday` at `hour`:00:00.
    WeeklyAt { weekday: Weekday, hour: u32 },
    /// Roughly monthly, first firing on day `day` at `hour`:00:00.
    MonthlyAt { day: u32, hour: u32 },
}

impl Trigger {
    /// Fixed distance between consecutive firings.
    pub fn period(&self) -> Duration {
        match self {
            Self::DailyAt { .. }   => Duration::hours(24),
            Self::HourlyAt { .. }  => Duration::hours(1),
            Self::WeeklyAt { .. }  => Duration::days(7),
            Self::MonthlyAt { .. } => Duration::days(30),
        }
    }

    pub fn validate(&self) -> Result<(), String> {
        let hour_ok = |h: u32| h <= 23;
        match *self {
            Self::DailyAt { hour } | Self::WeeklyAt { hour, .. } if !hour_ok(hour) => {
                Err(format!("hour must be 0-23, got {hour}"))
            }
            Self::HourlyAt { minute } if minute > 59 => {
                Err(format!("minute must be 0-59, got {minute}"))
            }
            Self::MonthlyAt { day, hour } => {
                if !(1..=31).contains(&day) {
                    Err(format!("day of month must be 1-31, got {day}"))
                } else if !hour_ok(hour) {
                    Err(format!("hour must be 0-23, got {hour}"))
                } else {
                    Ok(())
                }
            }
            _ => Ok(()),
        }
    }

    /// First firing strictly after `now`. A slot that falls exactly on
    /// `now` counts as already passed. `None` only for invalid triggers.
    pub fn next_fire_after(&self, now: NaiveDateTime) -> Option<NaiveDateTime> {
        self.validate().ok()?;
        let today = now.date();
        match *self {
            Self::DailyAt { hour } => {
                let candidate = today.and_hms_opt(hour, 0, 0)?;
                Some(roll_forward(candidate, now, Duration::days(1)))
            }
            Self::HourlyAt { minute } => {
                let candidate = today.and_hms_opt(now.hour(), minute, 0)?;
                Some(roll_forward(candidate, now, Duration::hours(1)))
            }
            Self::WeeklyAt { weekday, hour } => {
                let ahead = (7 + weekday.num_days_from_monday()
                    - today.weekday().num_days_from_monday())
                    % 7;
                let candidate = (today + Duration::days(i64::from(ahead))).and_hms_opt(hour, 0, 0)?;
                Some(roll_forward(candidate, now, Duration::days(7)))
            }
            Self::MonthlyAt { day, hour } => {
                // Day 29-31 does not exist in every month; skip those months.
                let (mut year, mut month) = (today.year(), today.month());
                for _ in 0..=12 {
                    if let Some(candidate) = NaiveDate::from_ymd_opt(year, month, day)
                        .and_then(|d| d.and_hms_opt(hour, 0, 0))
                    {
                        if candidate > now {
                            return Some(candidate);
                        }
                    }
                    (year, month) = next_month(year, month);
                }
                None
            }
        }
    }

    /// Time from `now` until the first firing.
    pub fn initial_delay(&self, now: NaiveDateTime) -> Option<Duration> {
        self.next_fire_after(now).map(|next| next - now)
    }
}

impl fmt::Display for Trigger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::DailyAt { hour }           => write!(f, "daily at {hour:02}:00"),
            Self::HourlyAt { minute }        => write!(f, "hourly at :{minute:02}"),
            Self::WeeklyAt { weekday, hour } => write!(f, "weekly on {weekday} at {hour:02}:00"),
            Self::MonthlyAt { day, hour }    => write!(f, "monthly on day {day} at {hour:02}:00"),
        }
    }
}

fn roll_forward(candidate: NaiveDateTime, now: NaiveDateTime, step: Duration) -> NaiveDateTime {
    if candidate <= now {
        candidate + step
    } else {
        candidate
    }
}

fn next_month(year: i32, month: u32) -> (i32, u32) {
    if month == 12 {
        (year + 1, 1)
    } else {
        (year, month + 1)
    }
}
