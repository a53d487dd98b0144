//! Operations exposed to the user-facing layer.
//!
//! [`RoutineService`] ties the store, the scheduler and the notifier
//! together. Frontends (and the host bridge) talk to this and nothing else.

use crate::error::{PhysioError, Result};
use crate::notify::{Notifier, PermissionState};
use crate::scheduler::{
    INTERVAL_PRESETS, ReminderScheduler, SchedulerState, format_countdown, format_interval,
};
use crate::stats::{CompletionStats, DayHistory};
use crate::store::{
    CompletionEvent, CompletionSource, Exercise, Settings, SettingsPatch, Storage,
};
use chrono::{DateTime, Local, Utc};
use serde::Serialize;
use std::sync::Arc;
use tracing::info;

/// Outcome of turning reminders on.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EnableOutcome {
    pub enabled: bool,
    pub next_scheduled_at: Option<DateTime<Utc>>,
    /// Shown to the user when reminders could not be turned on.
    pub hint: Option<String>,
    /// Confirmation text, e.g. "You'll be reminded every 2 hours".
    pub message: Option<String>,
}

/// Snapshot for the reminder card.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReminderStatus {
    pub enabled: bool,
    pub armed: bool,
    pub interval_minutes: u32,
    pub interval_label: String,
    /// Interval choices the settings picker offers.
    pub interval_presets: &'static [u32],
    pub snooze_minutes: u32,
    pub next_scheduled_at: Option<DateTime<Utc>>,
    pub countdown: Option<String>,
    pub permission: PermissionState,
}

/// Facade over persisted state and reminder scheduling.
#[derive(Clone)]
pub struct RoutineService {
    storage: Storage,
    scheduler: ReminderScheduler,
    notifier: Arc<dyn Notifier>,
}

impl RoutineService {
    pub fn new(storage: Storage, scheduler: ReminderScheduler, notifier: Arc<dyn Notifier>) -> Self {
        Self {
            storage,
            scheduler,
            notifier,
        }
    }

    /// Build a service with a stock scheduler over `storage` and `notifier`.
    pub fn with_defaults(storage: Storage, notifier: Arc<dyn Notifier>) -> Self {
        let scheduler = ReminderScheduler::new(storage.clone(), Arc::clone(&notifier));
        Self::new(storage, scheduler, notifier)
    }

    #[must_use]
    pub fn storage(&self) -> &Storage {
        &self.storage
    }

    #[must_use]
    pub fn scheduler(&self) -> &ReminderScheduler {
        &self.scheduler
    }

    // -- exercises ---------------------------------------------------------

    pub fn list_exercises(&self) -> Vec<Exercise> {
        self.storage.list_exercises()
    }

    pub fn save_exercises(&self, exercises: &[Exercise]) -> Result<()> {
        self.storage.save_exercises(exercises)
    }

    pub fn add_exercise(&self, name: &str, note: Option<&str>) -> Result<Exercise> {
        let exercise = self.storage.add_exercise(name, note)?;
        info!(id = %exercise.id, name = %exercise.name, "exercise added");
        Ok(exercise)
    }

    pub fn update_exercise(&self, id: &str, name: &str, note: Option<&str>) -> Result<Exercise> {
        self.storage.update_exercise(id, name, note)
    }

    pub fn delete_exercise(&self, id: &str) -> Result<()> {
        self.storage.delete_exercise(id)?;
        info!(id, "exercise deleted");
        Ok(())
    }

    pub fn move_exercise(&self, from: usize, to: usize) -> Result<Vec<Exercise>> {
        self.storage.move_exercise(from, to)
    }

    // -- settings ----------------------------------------------------------

    pub fn get_settings(&self) -> Settings {
        self.storage.get_settings()
    }

    /// Merge `patch` into stored settings.
    ///
    /// Reminder fields go through the scheduler: turning reminders off stops
    /// the cycle, a new interval restarts the countdown and turning them on
    /// arms a cycle. `nextScheduledAt` is owned by the scheduler; a patch may
    /// only clear a stale value while no cycle is running.
    pub fn save_settings(&self, patch: &SettingsPatch) -> Result<Settings> {
        for minutes in [patch.interval_minutes, patch.snooze_minutes].into_iter().flatten() {
            if minutes == 0 {
                return Err(PhysioError::InvalidInterval(minutes));
            }
        }
        match patch.next_scheduled_at {
            Some(Some(_)) => {
                return Err(PhysioError::Validation(
                    "nextScheduledAt is set by the scheduler".to_owned(),
                ));
            }
            Some(None) if self.scheduler.state() != SchedulerState::Idle => {
                return Err(PhysioError::Validation(
                    "nextScheduledAt cannot be cleared while reminders run".to_owned(),
                ));
            }
            _ => {}
        }

        let before = self.storage.get_settings();
        self.storage.save_settings(&SettingsPatch {
            snooze_minutes: patch.snooze_minutes,
            next_scheduled_at: patch.next_scheduled_at,
            theme_preference: patch.theme_preference,
            ..SettingsPatch::default()
        })?;

        if patch.reminders_enabled == Some(false) {
            self.disable_reminders()?;
        }
        if let Some(interval) = patch
            .interval_minutes
            .filter(|m| *m != before.interval_minutes)
        {
            self.update_interval(interval)?;
        }
        if patch.reminders_enabled == Some(true) && !before.reminders_enabled {
            let settings = self.storage.save_settings(&SettingsPatch {
                reminders_enabled: Some(true),
                ..SettingsPatch::default()
            })?;
            self.scheduler.enable(settings.interval_minutes)?;
        }
        Ok(self.storage.get_settings())
    }

    // -- completions & stats -----------------------------------------------

    pub fn add_completion(&self, source: CompletionSource) -> Result<CompletionEvent> {
        let completion = self.storage.add_completion(source)?;
        info!(id = %completion.id, source = %source, "routine completed");
        Ok(completion)
    }

    /// Counts relative to the local clock.
    pub fn get_stats(&self) -> CompletionStats {
        self.storage.get_stats(&Local::now())
    }

    /// History grouped by local calendar day.
    pub fn get_history(&self) -> Vec<DayHistory> {
        self.storage.get_history(&Local)
    }

    // -- reminders ---------------------------------------------------------

    /// Ask for permission if needed, then persist and arm reminders.
    ///
    /// When permission is refused, `remindersEnabled` is left as it was and
    /// the outcome carries a hint for the user.
    pub async fn enable_reminders(&self) -> Result<EnableOutcome> {
        if !self.notifier.has_permission() && !self.notifier.request_permission().await? {
            let permission = self.notifier.permission();
            info!(permission = permission.as_str(), "reminders not enabled");
            return Ok(EnableOutcome {
                enabled: false,
                next_scheduled_at: None,
                hint: permission.hint().map(str::to_owned),
                message: None,
            });
        }

        let settings = self.storage.save_settings(&SettingsPatch {
            reminders_enabled: Some(true),
            ..SettingsPatch::default()
        })?;
        let armed = self.scheduler.enable(settings.interval_minutes)?;

        Ok(EnableOutcome {
            enabled: armed,
            next_scheduled_at: self.scheduler.next_reminder_time(),
            hint: if armed {
                None
            } else {
                self.notifier.permission().hint().map(str::to_owned)
            },
            message: armed.then(|| {
                format!(
                    "You'll be reminded every {}",
                    format_interval(settings.interval_minutes)
                )
            }),
        })
    }

    /// Persist reminders as off and stop the cycle.
    pub fn disable_reminders(&self) -> Result<Settings> {
        self.storage.save_settings(&SettingsPatch {
            reminders_enabled: Some(false),
            ..SettingsPatch::default()
        })?;
        self.scheduler.disable()?;
        Ok(self.storage.get_settings())
    }

    /// Persist a new interval and restart the countdown if reminders run.
    pub fn update_interval(&self, interval_minutes: u32) -> Result<Settings> {
        if interval_minutes == 0 {
            return Err(PhysioError::InvalidInterval(interval_minutes));
        }
        let settings = self.storage.save_settings(&SettingsPatch {
            interval_minutes: Some(interval_minutes),
            ..SettingsPatch::default()
        })?;
        if settings.reminders_enabled {
            self.scheduler.change_interval(interval_minutes)?;
        }
        Ok(self.storage.get_settings())
    }

    /// Schedule the snoozed reminder using the stored snooze delay.
    ///
    /// Returns whether a snooze was scheduled.
    pub fn snooze(&self) -> Result<bool> {
        let snooze_minutes = self.storage.get_settings().snooze_minutes;
        Ok(self.scheduler.snooze(snooze_minutes)?.is_some())
    }

    pub fn get_next_reminder_time(&self) -> Option<DateTime<Utc>> {
        self.scheduler.next_reminder_time()
    }

    /// Everything the reminder card shows.
    pub fn reminder_status(&self) -> ReminderStatus {
        let settings = self.storage.get_settings();
        let state = self.scheduler.state();
        let next = settings.next_scheduled_at;
        ReminderStatus {
            enabled: settings.reminders_enabled,
            armed: matches!(state, SchedulerState::Armed { .. }),
            interval_minutes: settings.interval_minutes,
            interval_label: format_interval(settings.interval_minutes),
            interval_presets: &INTERVAL_PRESETS,
            snooze_minutes: settings.snooze_minutes,
            next_scheduled_at: next,
            countdown: next.map(|next| format_countdown(next, Utc::now())),
            permission: self.notifier.permission(),
        }
    }

    // -- permission --------------------------------------------------------

    pub fn has_permission(&self) -> bool {
        self.notifier.has_permission()
    }

    pub fn permission_state(&self) -> PermissionState {
        self.notifier.permission()
    }

    pub async fn request_permission(&self) -> Result<bool> {
        self.notifier.request_permission().await
    }

    // -- lifecycle ---------------------------------------------------------

    /// Re-enter the persisted reminder schedule at startup.
    pub async fn resume(&self) -> Result<bool> {
        let settings = self.storage.get_settings();
        self.scheduler.resume(&settings).await
    }

    /// Stop the reminder cycle, keeping persisted state for the next start.
    pub fn shutdown(&self) {
        self.scheduler.shutdown();
    }
}
