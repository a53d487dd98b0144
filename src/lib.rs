//! Physio Buddy: exercise routine tracking with interval reminders.
//!
//! The crate keeps a user's exercise list, a log of completed routines and
//! reminder settings, and runs the reminder schedule that nudges the user
//! to do their exercises.
//!
//! # Architecture
//!
//! - **Store**: JSON records behind a key-value backend (`store`)
//! - **Stats**: counts and day-grouped history over the completion log
//! - **Notify**: notification payloads and the [`notify::Notifier`] seam
//! - **Scheduler**: one cancellable reminder cycle plus snooze timers, with
//!   the next fire time persisted so restarts resume the schedule
//! - **Service**: the operations a frontend calls
//! - **Host**: newline-delimited JSON envelopes over stdin/stdout

pub mod app_dirs;
pub mod config;
pub mod diagnostics;
pub mod error;
pub mod host;
pub mod notify;
pub mod scheduler;
pub mod service;
pub mod stats;
pub mod store;

#[cfg(test)]
pub(crate) mod test_utils;

pub use config::HostConfig;
pub use error::{PhysioError, Result};
pub use notify::{HostNotifier, LogNotifier, Notifier, PermissionState, ReminderNotification};
pub use scheduler::{ReminderScheduler, SchedulerState};
pub use service::RoutineService;
pub use stats::{CompletionStats, DayHistory};
pub use store::Storage;
