//! Date/time utilities for chatrelay.
//!
//! Timestamps are stored as fixed-width RFC3339 strings in UTC so that
//! lexicographic order in SQLite matches chronological order, and rendered
//! for clients in the configured display timezone.

use chrono::{DateTime, NaiveDateTime, SecondsFormat, Utc};
use chrono_tz::Tz;

/// Format used for every timestamp sent to clients (e.g. "Jan 15, 2024 10:30").
pub const DISPLAY_FORMAT: &str = "%b %d, %Y %H:%M";

/// Parse a timezone name, falling back to UTC for unknown names.
pub fn parse_timezone(name: &str) -> Tz {
    name.parse().unwrap_or(Tz::UTC)
}

/// Render a UTC timestamp for clients in the given timezone.
pub fn format_display(dt: &DateTime<Utc>, tz: &Tz) -> String {
    dt.with_timezone(tz).format(DISPLAY_FORMAT).to_string()
}

/// Encode a timestamp for storage.
pub fn to_storage(dt: &DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Micros, true)
}

/// Decode a stored timestamp.
///
/// Accepts RFC3339 and the bare SQLite `datetime('now')` format.
pub fn from_storage(s: &str) -> Option<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S")
        .ok()
        .map(|naive| naive.and_utc())
}
