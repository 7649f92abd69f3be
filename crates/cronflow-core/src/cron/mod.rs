//! Five-field cron expressions: parsing, matching, next-run search, and
//! human-readable labels.
//!
//! Fields are `minute hour day-of-month month day-of-week`. Day-of-week
//! accepts `0-7` with `7` as an alias for Sunday. When both day-of-month and
//! day-of-week are restricted, a candidate must satisfy *both* (no classic
//! cron OR between the two day fields).
//!
//! Next-run search scans forward minute by minute and gives up after
//! [`SEARCH_WINDOW_MINUTES`]; schedules with no match inside that window
//! (yearly dates, impossible day combinations) have no next run.

pub mod field;

use std::collections::BTreeSet;
use std::str::FromStr;

use chrono::{DateTime, Datelike, Duration, Local, TimeZone, Timelike};
use cronflow_types::error::CronError;

pub use field::parse_field;

/// How far ahead `next_run` looks: 48 hours of minutes.
pub const SEARCH_WINDOW_MINUTES: i64 = 48 * 60;

const WEEKDAY_NAMES: [&str; 8] = ["Sun", "Mon", "Tue", "Wed", "Thu", "Fri", "Sat", "Sun"];

// ---------------------------------------------------------------------------
// CronSchedule
// ---------------------------------------------------------------------------

/// A parsed five-field cron expression.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CronSchedule {
    minutes: BTreeSet<u32>,
    hours: BTreeSet<u32>,
    days_of_month: BTreeSet<u32>,
    months: BTreeSet<u32>,
    days_of_week: BTreeSet<u32>,
}

impl FromStr for CronSchedule {
    type Err = CronError;

    fn from_str(expr: &str) -> Result<Self, Self::Err> {
        let fields: Vec<&str> = expr.split_whitespace().collect();
        let [minute, hour, dom, month, dow] = fields[..] else {
            return Err(CronError::FieldCount(fields.len()));
        };

        let mut days_of_week = parse_field(dow, 0, 7)?;
        if days_of_week.remove(&7) {
            days_of_week.insert(0);
        }

        Ok(Self {
            minutes: parse_field(minute, 0, 59)?,
            hours: parse_field(hour, 0, 23)?,
            days_of_month: parse_field(dom, 1, 31)?,
            months: parse_field(month, 1, 12)?,
            days_of_week,
        })
    }
}

impl CronSchedule {
    /// Whether `instant` (seconds ignored) falls on this schedule.
    pub fn matches<Tz: TimeZone>(&self, instant: &DateTime<Tz>) -> bool {
        self.minutes.contains(&instant.minute())
            && self.hours.contains(&instant.hour())
            && self.days_of_month.contains(&instant.day())
            && self.months.contains(&instant.month())
            && self
                .days_of_week
                .contains(&instant.weekday().num_days_from_sunday())
    }

    /// First matching minute strictly after `from`, within the search window.
    pub fn next_after<Tz: TimeZone>(&self, from: &DateTime<Tz>) -> Option<DateTime<Tz>> {
        let mut candidate = truncate_to_minute(from.clone() + Duration::minutes(1));
        for _ in 0..SEARCH_WINDOW_MINUTES {
            if self.matches(&candidate) {
                return Some(candidate);
            }
            candidate += Duration::minutes(1);
        }
        None
    }
}

fn truncate_to_minute<Tz: TimeZone>(instant: DateTime<Tz>) -> DateTime<Tz> {
    let seconds = Duration::seconds(i64::from(instant.second()))
        + Duration::nanoseconds(i64::from(instant.nanosecond()));
    instant - seconds
}

// ---------------------------------------------------------------------------
// Free functions
// ---------------------------------------------------------------------------

/// Next instant after `from` matching `expr`, or `None` when the expression
/// is malformed or has no match in the next 48 hours.
pub fn next_run<Tz: TimeZone>(expr: &str, from: &DateTime<Tz>) -> Option<DateTime<Tz>> {
    expr.parse::<CronSchedule>().ok()?.next_after(from)
}

/// Up to `count` successive fire times after `from`.
///
/// Each step searches from the previous result, so the list can extend past
/// the 48-hour window as long as consecutive fires are within it.
pub fn next_runs<Tz: TimeZone>(expr: &str, from: &DateTime<Tz>, count: usize) -> Vec<DateTime<Tz>> {
    let Ok(schedule) = expr.parse::<CronSchedule>() else {
        return Vec::new();
    };
    let mut runs = Vec::with_capacity(count);
    let mut cursor = from.clone();
    while runs.len() < count {
        match schedule.next_after(&cursor) {
            Some(next) => {
                cursor = next.clone();
                runs.push(next);
            }
            None => break,
        }
    }
    runs
}

/// Whether `expr` would be armed if scheduled right now (local time).
pub fn is_valid(expr: &str) -> bool {
    next_run(expr, &Local::now()).is_some()
}

/// Best-effort label for common schedule shapes; falls back to the raw
/// expression.
pub fn describe(expr: &str) -> String {
    let fields: Vec<&str> = expr.split_whitespace().collect();
    let [minute, hour, dom, month, dow] = fields[..] else {
        return expr.to_string();
    };

    let minute_num = minute.parse::<u32>().ok().filter(|m| *m <= 59);
    let hour_num = hour.parse::<u32>().ok().filter(|h| *h <= 23);
    let every_day = dom == "*" && month == "*";

    if !every_day {
        return expr.to_string();
    }

    if dow == "*" {
        if minute == "*" && hour == "*" {
            return "Every minute".to_string();
        }
        if hour == "*" {
            if let Some(n) = positive_step(minute) {
                return format!("Every {n} minutes");
            }
            return match minute_num {
                Some(0) => "Every hour".to_string(),
                Some(m) => format!("Hourly at :{m:02}"),
                None => expr.to_string(),
            };
        }
        if let (Some(0), Some(n)) = (minute_num, positive_step(hour)) {
            return format!("Every {n} hours");
        }
    }

    let (Some(m), Some(h)) = (minute_num, hour_num) else {
        return expr.to_string();
    };

    if dow == "*" {
        return format!("Daily at {h:02}:{m:02}");
    }
    if dow == "1-5" {
        return format!("Weekdays at {h:02}:{m:02}");
    }
    if let Some(day) = dow.parse::<usize>().ok().and_then(|d| WEEKDAY_NAMES.get(d)) {
        return format!("Weekly ({day} {h:02}:{m:02})");
    }

    expr.to_string()
}

/// `N` from a `*/N` field, when `N` is positive.
fn positive_step(field: &str) -> Option<u32> {
    field
        .strip_prefix("*/")
        .and_then(|n| n.parse::<u32>().ok())
        .filter(|n| *n > 0)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
