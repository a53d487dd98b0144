//! Human-readable interval and countdown text.

use chrono::{DateTime, Utc};

/// Interval choices offered in reminder settings, in minutes.
pub const INTERVAL_PRESETS: [u32; 6] = [15, 30, 60, 90, 120, 180];

/// Render an interval: `"45 minutes"`, `"1 hour"`, `"2 hours"`, `"1h 30m"`.
#[must_use]
pub fn format_interval(minutes: u32) -> String {
    if minutes < 60 {
        return format!("{minutes} minutes");
    }
    let hours = minutes / 60;
    let rest = minutes % 60;
    match (hours, rest) {
        (1, 0) => "1 hour".to_owned(),
        (h, 0) => format!("{h} hours"),
        (h, m) => format!("{h}h {m}m"),
    }
}

/// Render the time left until `next`: `"Triggering..."` once due, otherwise
/// whole minutes such as `"42m"`, `"2h"` or `"1h 5m"`.
#[must_use]
pub fn format_countdown(next: DateTime<Utc>, now: DateTime<Utc>) -> String {
    let remaining = next - now;
    if remaining <= chrono::Duration::zero() {
        return "Triggering...".to_owned();
    }

    let minutes = remaining.num_minutes();
    let hours = minutes / 60;
    let rest = minutes % 60;
    match (hours, rest) {
        (0, m) => format!("{m}m"),
        (h, 0) => format!("{h}h"),
        (h, m) => format!("{h}h {m}m"),
    }
}
