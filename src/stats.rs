//! Completion statistics and day-grouped history.
//!
//! Everything here is a pure function of the completion log and a caller
//! supplied "now". The time zone of `now` decides where calendar days start.

use crate::store::models::CompletionEvent;
use chrono::{DateTime, Duration, NaiveDate, TimeZone};
use serde::{Deserialize, Serialize};

/// Completion counts shown on the progress card.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompletionStats {
    /// Completions since the start of the current calendar day.
    pub today: usize,
    /// Completions within the trailing 7x24 hours.
    pub seven_days: usize,
    pub all_time: usize,
}

/// Completions that share one calendar day.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DayHistory {
    pub date: NaiveDate,
    /// Newest first.
    pub completions: Vec<CompletionEvent>,
}

/// Count completions for today, the trailing week and all time.
///
/// A completion stamped exactly at local midnight counts as today.
pub fn compute_stats<Tz: TimeZone>(
    completions: &[CompletionEvent],
    now: &DateTime<Tz>,
) -> CompletionStats {
    let day_start = start_of_day(now);
    let week_start = now.clone() - Duration::days(7);

    CompletionStats {
        today: completions
            .iter()
            .filter(|c| c.timestamp >= day_start)
            .count(),
        seven_days: completions
            .iter()
            .filter(|c| c.timestamp >= week_start)
            .count(),
        all_time: completions.len(),
    }
}

/// Group completions by calendar day in `tz`, newest day first.
pub fn history_by_day<Tz: TimeZone>(completions: &[CompletionEvent], tz: &Tz) -> Vec<DayHistory> {
    let mut sorted: Vec<&CompletionEvent> = completions.iter().collect();
    sorted.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));

    let mut days: Vec<DayHistory> = Vec::new();
    for completion in sorted {
        let date = completion.timestamp.with_timezone(tz).date_naive();
        match days.last_mut() {
            Some(day) if day.date == date => day.completions.push(completion.clone()),
            _ => days.push(DayHistory {
                date,
                completions: vec![completion.clone()],
            }),
        }
    }
    days
}

/// Midnight of `now`'s calendar day in its own time zone.
///
/// Falls back to `now` minus the elapsed wall-clock time when midnight does
/// not exist locally (DST transition at 00:00).
fn start_of_day<Tz: TimeZone>(now: &DateTime<Tz>) -> DateTime<Tz> {
    let local = now.naive_local();
    let midnight = local.date().and_time(chrono::NaiveTime::MIN);
    now.timezone()
        .from_local_datetime(&midnight)
        .earliest()
        .unwrap_or_else(|| now.clone() - (local - midnight))
}
