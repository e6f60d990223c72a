//! UTC calendar-day helpers.

use chrono::{DateTime, Days, NaiveTime, Utc};

/// Format the UTC calendar day of `at` as `YYYY-MM-DD`.
#[must_use]
pub fn utc_day(at: DateTime<Utc>) -> String {
    at.format("%Y-%m-%d").to_string()
}

/// The first instant of the UTC day after `at`.
///
/// Saturates to `at` itself at the far end of chrono's supported range.
#[must_use]
pub fn next_utc_midnight(at: DateTime<Utc>) -> DateTime<Utc> {
    at.date_naive()
        .checked_add_days(Days::new(1))
        .map_or(at, |day| day.and_time(NaiveTime::MIN).and_utc())
}
