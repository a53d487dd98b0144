//! Reminder scheduling.
//!
//! One cancellable interval cycle plus independent snooze timers. The next
//! fire instant is persisted so a restart can pick up where it left off.

pub mod format;
pub mod reminder;

pub use format::{INTERVAL_PRESETS, format_countdown, format_interval};
pub use reminder::{ReminderScheduler, SchedulerState};
