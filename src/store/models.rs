//! Persisted record shapes: exercises, completion events and settings.
//!
//! Field names are camelCase on the wire so the stored JSON matches the
//! layout the frontend already reads.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;
use std::str::FromStr;

/// Default reminder interval (2 hours).
pub const DEFAULT_INTERVAL_MINUTES: u32 = 120;

/// Default snooze delay.
pub const DEFAULT_SNOOZE_MINUTES: u32 = 10;

/// One exercise in the user's routine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Exercise {
    /// Opaque stable identifier (`exercise_<uuid>`).
    pub id: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
    /// Zero-based display order.
    pub position: u32,
}

impl Exercise {
    /// Create an exercise with a freshly generated id.
    pub fn new(name: impl Into<String>, note: Option<String>, position: u32) -> Self {
        Self {
            id: format!("exercise_{}", uuid::Uuid::new_v4()),
            name: name.into(),
            note,
            position,
        }
    }
}

/// How a completion was recorded.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CompletionSource {
    /// Marked complete from a reminder notification.
    Notification,
    /// Marked complete from the app.
    #[default]
    Manual,
}

impl CompletionSource {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Notification => "notification",
            Self::Manual => "manual",
        }
    }
}

impl fmt::Display for CompletionSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CompletionSource {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "notification" | "reminder" => Ok(Self::Notification),
            "manual" => Ok(Self::Manual),
            other => Err(format!("unknown completion source `{other}`")),
        }
    }
}

/// One entry in the append-only completion log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompletionEvent {
    /// Opaque identifier (`completion_<uuid>`).
    pub id: String,
    /// Stored as an ISO-8601 string.
    pub timestamp: DateTime<Utc>,
    pub source: CompletionSource,
}

impl CompletionEvent {
    /// Record a completion at `timestamp`.
    pub fn new(source: CompletionSource, timestamp: DateTime<Utc>) -> Self {
        Self {
            id: format!("completion_{}", uuid::Uuid::new_v4()),
            timestamp,
            source,
        }
    }
}

/// Preferred colour scheme.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ThemePreference {
    #[default]
    System,
    Light,
    Dark,
}

/// Singleton user settings.
///
/// Missing fields in the stored record fall back to defaults, so older or
/// partially written records still load.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Settings {
    pub reminders_enabled: bool,
    pub interval_minutes: u32,
    pub snooze_minutes: u32,
    /// Instant the scheduler last committed to firing next.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next_scheduled_at: Option<DateTime<Utc>>,
    pub theme_preference: ThemePreference,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            reminders_enabled: false,
            interval_minutes: DEFAULT_INTERVAL_MINUTES,
            snooze_minutes: DEFAULT_SNOOZE_MINUTES,
            next_scheduled_at: None,
            theme_preference: ThemePreference::System,
        }
    }
}

impl Settings {
    /// Return a new record with every field present in `patch` replaced.
    ///
    /// Fields absent from the patch keep their current value.
    #[must_use]
    pub fn merged(&self, patch: &SettingsPatch) -> Self {
        Self {
            reminders_enabled: patch.reminders_enabled.unwrap_or(self.reminders_enabled),
            interval_minutes: patch.interval_minutes.unwrap_or(self.interval_minutes),
            snooze_minutes: patch.snooze_minutes.unwrap_or(self.snooze_minutes),
            next_scheduled_at: match patch.next_scheduled_at {
                Some(next) => next,
                None => self.next_scheduled_at,
            },
            theme_preference: patch.theme_preference.unwrap_or(self.theme_preference),
        }
    }
}

/// Partial settings update.
///
/// `next_scheduled_at` is tri-state: absent keeps the stored value,
/// `Some(None)` (JSON `null`) clears it, `Some(Some(t))` sets it.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct SettingsPatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reminders_enabled: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub interval_minutes: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub snooze_minutes: Option<u32>,
    #[serde(
        deserialize_with = "deserialize_present",
        skip_serializing_if = "Option::is_none"
    )]
    pub next_scheduled_at: Option<Option<DateTime<Utc>>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub theme_preference: Option<ThemePreference>,
}

impl SettingsPatch {
    /// Patch that only sets the persisted next fire time.
    #[must_use]
    pub fn next_scheduled_at(next: Option<DateTime<Utc>>) -> Self {
        Self {
            next_scheduled_at: Some(next),
            ..Self::default()
        }
    }
}

/// Distinguish an explicit `null` from an absent field.
fn deserialize_present<'de, D, T>(deserializer: D) -> Result<Option<T>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    T::deserialize(deserializer).map(Some)
}
