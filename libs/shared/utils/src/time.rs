//! Timezone-aware conversion and interval primitives.
//!
//! Wall-clock times are always converted through the IANA timezone database
//! (`chrono-tz`), never through fixed offsets, so DST transitions are handled
//! correctly. Timezone names are validated once at the boundary via
//! [`TimezoneName`] and carried as a resolved [`Tz`] from there on.

use chrono::{DateTime, Datelike, LocalResult, NaiveDate, NaiveTime, TimeZone, Utc, Weekday};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, Error, PartialEq)]
pub enum TimeError {
    #[error("Invalid timezone: {0}")]
    InvalidTimezone(String),

    #[error("Local time {0} does not exist in timezone {1}")]
    NonexistentLocalTime(String, String),
}

/// A validated IANA timezone name (e.g. `"Europe/Paris"`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TimezoneName(String);

impl TimezoneName {
    pub fn parse(name: &str) -> Result<Self, TimeError> {
        name.parse::<Tz>()
            .map(|_| Self(name.to_string()))
            .map_err(|_| TimeError::InvalidTimezone(name.to_string()))
    }

    pub fn resolve(&self) -> Tz {
        // Validated at construction, so this cannot fail.
        self.0.parse::<Tz>().unwrap_or(chrono_tz::UTC)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for TimezoneName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Convert a wall-clock date and time in `tz` to a UTC instant.
///
/// Ambiguous local times (the repeated hour when DST ends) resolve to the
/// earliest valid instant. Nonexistent local times (the skipped hour when DST
/// starts) are an error so callers can drop the affected candidate.
pub fn local_to_utc(date: NaiveDate, time: NaiveTime, tz: Tz) -> Result<DateTime<Utc>, TimeError> {
    match tz.from_local_datetime(&date.and_time(time)) {
        LocalResult::Single(dt) => Ok(dt.with_timezone(&Utc)),
        LocalResult::Ambiguous(earliest, _) => Ok(earliest.with_timezone(&Utc)),
        LocalResult::None => Err(TimeError::NonexistentLocalTime(
            date.and_time(time).to_string(),
            tz.name().to_string(),
        )),
    }
}

/// Express a UTC instant in `tz`.
pub fn utc_to_local(instant: DateTime<Utc>, tz: Tz) -> DateTime<Tz> {
    instant.with_timezone(&tz)
}

/// Half-open interval overlap: `[a_start, a_end)` intersects `[b_start, b_end)`.
pub fn intervals_overlap(
    a_start: DateTime<Utc>,
    a_end: DateTime<Utc>,
    b_start: DateTime<Utc>,
    b_end: DateTime<Utc>,
) -> bool {
    a_start < b_end && b_start < a_end
}

/// Day-of-week index with Sunday = 0 through Saturday = 6.
pub fn day_of_week_index(date: NaiveDate) -> i32 {
    match date.weekday() {
        Weekday::Sun => 0,
        Weekday::Mon => 1,
        Weekday::Tue => 2,
        Weekday::Wed => 3,
        Weekday::Thu => 4,
        Weekday::Fri => 5,
        Weekday::Sat => 6,
    }
}

/// Round a monetary amount to 2 decimals, half-up.
pub fn round_half_up_2(amount: f64) -> f64 {
    (amount * 100.0).round() / 100.0
}
