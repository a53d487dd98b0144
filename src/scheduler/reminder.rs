//! Interval reminder scheduler.
//!
//! At most one main cycle runs at a time. It sleeps, shows a reminder,
//! persists the next fire instant as `nextScheduledAt`, and loops until
//! cancelled. Snoozes are independent one-shot tasks that never touch the
//! main cycle or the persisted schedule.

use crate::error::{PhysioError, Result};
use crate::notify::{Notifier, ReminderNotification};
use crate::store::{Settings, SettingsPatch, Storage};
use chrono::{DateTime, Utc};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Whether a main reminder cycle is running.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerState {
    Idle,
    Armed { interval_minutes: u32 },
}

impl SchedulerState {
    #[must_use]
    pub fn is_armed(self) -> bool {
        matches!(self, Self::Armed { .. })
    }
}

struct ArmedCycle {
    cancel: CancellationToken,
    handle: JoinHandle<()>,
    interval_minutes: u32,
}

struct Inner {
    storage: Storage,
    notifier: Arc<dyn Notifier>,
    reminder: ReminderNotification,
    snoozed: ReminderNotification,
    cycle: Mutex<Option<ArmedCycle>>,
}

/// Owns the reminder cycle. Cheap to clone; clones share one cycle.
#[derive(Clone)]
pub struct ReminderScheduler {
    inner: Arc<Inner>,
}

impl ReminderScheduler {
    /// Create an idle scheduler using the stock reminder texts.
    pub fn new(storage: Storage, notifier: Arc<dyn Notifier>) -> Self {
        Self::with_notifications(
            storage,
            notifier,
            ReminderNotification::reminder(),
            ReminderNotification::snoozed(),
        )
    }

    /// Create an idle scheduler with custom regular and snoozed reminders.
    pub fn with_notifications(
        storage: Storage,
        notifier: Arc<dyn Notifier>,
        reminder: ReminderNotification,
        snoozed: ReminderNotification,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                storage,
                notifier,
                reminder,
                snoozed,
                cycle: Mutex::new(None),
            }),
        }
    }

    /// Start a fresh cycle of `interval_minutes`, replacing any running one.
    ///
    /// Returns `false` and stays idle when notification permission is
    /// missing; the persisted next time is cleared in that case.
    pub fn enable(&self, interval_minutes: u32) -> Result<bool> {
        validate_interval(interval_minutes)?;
        let mut slot = self.inner.lock_cycle()?;
        cancel_cycle(&mut slot);

        if !self.inner.notifier.has_permission() {
            info!(
                permission = self.inner.notifier.permission().as_str(),
                "reminders not armed; notification permission missing"
            );
            self.inner.persist_next(None)?;
            return Ok(false);
        }

        let next = Utc::now() + minutes(interval_minutes);
        self.inner.persist_next(Some(next))?;
        let delay = std_minutes(interval_minutes);
        *slot = Some(self.arm(interval_minutes, delay));
        info!(interval_minutes, next = %next, "reminders armed");
        Ok(true)
    }

    /// Stop the cycle and clear the persisted next time. Idempotent.
    pub fn disable(&self) -> Result<()> {
        let mut slot = self.inner.lock_cycle()?;
        if cancel_cycle(&mut slot) {
            info!("reminders disabled");
        }
        self.inner.persist_next(None)
    }

    /// Restart the countdown with a new interval if a cycle is running.
    ///
    /// Returns whether a cycle was restarted. When idle, nothing changes.
    pub fn change_interval(&self, interval_minutes: u32) -> Result<bool> {
        validate_interval(interval_minutes)?;
        if !self.state().is_armed() {
            debug!(interval_minutes, "interval changed while idle");
            return Ok(false);
        }
        self.enable(interval_minutes)
    }

    /// Re-enter the schedule after a restart.
    ///
    /// A persisted time that has already passed fires one reminder right
    /// away and then starts a full interval. A future time is honoured and
    /// the regular interval continues after it. Without a persisted time
    /// this behaves like [`enable`](Self::enable).
    pub async fn resume(&self, settings: &Settings) -> Result<bool> {
        if !settings.reminders_enabled {
            self.disable()?;
            debug!("reminders disabled; scheduler stays idle");
            return Ok(false);
        }
        let interval_minutes = settings.interval_minutes;
        validate_interval(interval_minutes)?;

        let now = Utc::now();
        match settings.next_scheduled_at {
            None => self.enable(interval_minutes),
            Some(_) if !self.inner.notifier.has_permission() => self.enable(interval_minutes),
            Some(due) if due <= now => {
                info!(due = %due, "scheduled reminder passed while away; firing now");
                self.shutdown();
                self.inner.fire(&self.inner.reminder).await;
                self.enable(interval_minutes)
            }
            Some(due) => {
                let mut slot = self.inner.lock_cycle()?;
                cancel_cycle(&mut slot);
                let delay = (due - now).to_std().unwrap_or(Duration::ZERO);
                *slot = Some(self.arm(interval_minutes, delay));
                info!(
                    next = %due,
                    remaining_secs = delay.as_secs(),
                    "resuming existing reminder schedule"
                );
                Ok(true)
            }
        }
    }

    /// Show the snoozed reminder once after `snooze_minutes`.
    ///
    /// Returns `None` without scheduling anything when permission is
    /// missing. The main cycle and `nextScheduledAt` are left alone.
    pub fn snooze(&self, snooze_minutes: u32) -> Result<Option<JoinHandle<()>>> {
        validate_interval(snooze_minutes)?;
        if !self.inner.notifier.has_permission() {
            debug!("snooze ignored; notification permission missing");
            return Ok(None);
        }

        let inner = Arc::clone(&self.inner);
        let delay = std_minutes(snooze_minutes);
        info!(snooze_minutes, "reminder snoozed");
        Ok(Some(tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            inner.fire(&inner.snoozed).await;
        })))
    }

    /// Current cycle state.
    #[must_use]
    pub fn state(&self) -> SchedulerState {
        match self.inner.cycle.lock() {
            Ok(slot) => match slot.as_ref() {
                Some(cycle) if !cycle.cancel.is_cancelled() => SchedulerState::Armed {
                    interval_minutes: cycle.interval_minutes,
                },
                _ => SchedulerState::Idle,
            },
            Err(_) => SchedulerState::Idle,
        }
    }

    /// The persisted next fire instant, if any.
    #[must_use]
    pub fn next_reminder_time(&self) -> Option<DateTime<Utc>> {
        self.inner.storage.get_settings().next_scheduled_at
    }

    /// Stop the cycle without touching persisted state.
    pub fn shutdown(&self) {
        if let Ok(mut slot) = self.inner.cycle.lock() {
            if cancel_cycle(&mut slot) {
                debug!("reminder cycle stopped");
            }
        }
    }

    fn arm(&self, interval_minutes: u32, first_delay: Duration) -> ArmedCycle {
        let cancel = CancellationToken::new();
        let handle = tokio::spawn(run_cycle(
            Arc::clone(&self.inner),
            cancel.clone(),
            interval_minutes,
            first_delay,
        ));
        ArmedCycle {
            cancel,
            handle,
            interval_minutes,
        }
    }
}

impl Inner {
    fn lock_cycle(&self) -> Result<MutexGuard<'_, Option<ArmedCycle>>> {
        self.cycle
            .lock()
            .map_err(|_| PhysioError::Storage("scheduler lock poisoned".to_owned()))
    }

    fn persist_next(&self, next: Option<DateTime<Utc>>) -> Result<()> {
        self.storage
            .save_settings(&SettingsPatch::next_scheduled_at(next))
            .map(|_| ())
    }

    /// Best-effort display. Missing permission skips, failures are logged.
    async fn fire(&self, notification: &ReminderNotification) {
        if !self.notifier.has_permission() {
            debug!(title = %notification.title, "reminder due but permission missing");
            return;
        }
        match self.notifier.show(notification).await {
            Ok(()) => info!(title = %notification.title, "reminder shown"),
            Err(e) => error!(error = %e, "failed to show reminder"),
        }
    }

    /// Persist the next fire time unless the cycle was cancelled meanwhile.
    ///
    /// Returns `false` when the cycle should stop.
    fn commit_next(&self, cancel: &CancellationToken, interval_minutes: u32) -> bool {
        let Ok(_slot) = self.cycle.lock() else {
            warn!("scheduler lock poisoned; stopping reminder cycle");
            return false;
        };
        if cancel.is_cancelled() {
            return false;
        }
        let next = Utc::now() + minutes(interval_minutes);
        if let Err(e) = self.persist_next(Some(next)) {
            warn!(error = %e, "failed to persist next reminder time");
        } else {
            debug!(next = %next, "next reminder scheduled");
        }
        true
    }
}

async fn run_cycle(
    inner: Arc<Inner>,
    cancel: CancellationToken,
    interval_minutes: u32,
    first_delay: Duration,
) {
    let mut delay = first_delay;
    loop {
        tokio::select! {
            () = cancel.cancelled() => break,
            () = tokio::time::sleep(delay) => {}
        }
        inner.fire(&inner.reminder).await;
        if !inner.commit_next(&cancel, interval_minutes) {
            break;
        }
        delay = std_minutes(interval_minutes);
    }
}

/// Cancel the running cycle, if any. Returns whether one was running.
fn cancel_cycle(slot: &mut Option<ArmedCycle>) -> bool {
    match slot.take() {
        Some(cycle) => {
            cycle.cancel.cancel();
            drop(cycle.handle);
            true
        }
        None => false,
    }
}

fn validate_interval(minutes: u32) -> Result<()> {
    if minutes == 0 {
        return Err(PhysioError::InvalidInterval(minutes));
    }
    Ok(())
}

fn minutes(m: u32) -> chrono::Duration {
    chrono::Duration::minutes(i64::from(m))
}

fn std_minutes(m: u32) -> Duration {
    Duration::from_secs(u64::from(m) * 60)
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used)]

    use super::*;
    use crate::notify::PermissionState;
    use crate::test_utils::RecordingNotifier;

    fn scheduler_with(permission: PermissionState) -> (ReminderScheduler, Arc<RecordingNotifier>) {
        let notifier = Arc::new(RecordingNotifier::new(permission));
        let scheduler = ReminderScheduler::new(Storage::in_memory(), notifier.clone());
        (scheduler, notifier)
    }

    async fn advance(minutes: u64) {
        tokio::time::sleep(Duration::from_secs(minutes * 60)).await;
        for _ in 0..4 {
            tokio::task::yield_now().await;
        }
    }

    #[tokio::test(start_paused = true)]
    async fn enable_persists_next_and_arms() {
        let (scheduler, notifier) = scheduler_with(PermissionState::Granted);
        let before = Utc::now();

        assert!(scheduler.enable(60).unwrap());

        let next = scheduler.next_reminder_time().unwrap();
        assert!(next >= before + chrono::Duration::minutes(60));
        assert!(next <= Utc::now() + chrono::Duration::minutes(60));
        assert_eq!(
            scheduler.state(),
            SchedulerState::Armed {
                interval_minutes: 60
            }
        );
        assert_eq!(notifier.shown_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn cycle_fires_every_interval() {
        let (scheduler, notifier) = scheduler_with(PermissionState::Granted);
        scheduler.enable(30).unwrap();

        advance(29).await;
        assert_eq!(notifier.shown_count(), 0);
        advance(1).await;
        assert_eq!(notifier.shown_count(), 1);
        advance(30).await;
        assert_eq!(notifier.shown_count(), 2);
        assert!(scheduler.next_reminder_time().is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn enable_without_permission_stays_idle() {
        let (scheduler, notifier) = scheduler_with(PermissionState::Denied);

        assert!(!scheduler.enable(30).unwrap());
        assert_eq!(scheduler.state(), SchedulerState::Idle);
        assert!(scheduler.next_reminder_time().is_none());

        advance(120).await;
        assert_eq!(notifier.shown_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn disable_is_idempotent_and_stops_firing() {
        let (scheduler, notifier) = scheduler_with(PermissionState::Granted);
        scheduler.enable(15).unwrap();

        scheduler.disable().unwrap();
        scheduler.disable().unwrap();

        assert_eq!(scheduler.state(), SchedulerState::Idle);
        assert!(scheduler.next_reminder_time().is_none());
        advance(60).await;
        assert_eq!(notifier.shown_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn enable_twice_keeps_one_cycle() {
        let (scheduler, notifier) = scheduler_with(PermissionState::Granted);
        scheduler.enable(30).unwrap();
        scheduler.enable(30).unwrap();

        advance(30).await;
        assert_eq!(notifier.shown_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn change_interval_restarts_countdown() {
        let (scheduler, notifier) = scheduler_with(PermissionState::Granted);
        scheduler.enable(60).unwrap();
        advance(50).await;

        assert!(scheduler.change_interval(30).unwrap());
        advance(15).await;
        assert_eq!(notifier.shown_count(), 0);
        advance(15).await;
        assert_eq!(notifier.shown_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn change_interval_while_idle_does_nothing() {
        let (scheduler, _notifier) = scheduler_with(PermissionState::Granted);
        assert!(!scheduler.change_interval(30).unwrap());
        assert_eq!(scheduler.state(), SchedulerState::Idle);
        assert!(scheduler.next_reminder_time().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn zero_interval_is_rejected() {
        let (scheduler, _notifier) = scheduler_with(PermissionState::Granted);
        assert!(matches!(
            scheduler.enable(0),
            Err(PhysioError::InvalidInterval(0))
        ));
        assert!(scheduler.snooze(0).is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn resume_past_due_fires_once_then_full_interval() {
        let (scheduler, notifier) = scheduler_with(PermissionState::Granted);
        let settings = Settings {
            reminders_enabled: true,
            interval_minutes: 60,
            next_scheduled_at: Some(Utc::now() - chrono::Duration::minutes(5)),
            ..Settings::default()
        };

        assert!(scheduler.resume(&settings).await.unwrap());
        assert_eq!(notifier.shown_count(), 1);
        assert!(scheduler.next_reminder_time().unwrap() > Utc::now());

        advance(59).await;
        assert_eq!(notifier.shown_count(), 1);
        advance(1).await;
        assert_eq!(notifier.shown_count(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn resume_future_honours_remaining_time() {
        let (scheduler, notifier) = scheduler_with(PermissionState::Granted);
        let due = Utc::now() + chrono::Duration::minutes(10);
        let settings = Settings {
            reminders_enabled: true,
            interval_minutes: 60,
            next_scheduled_at: Some(due),
            ..Settings::default()
        };

        assert!(scheduler.resume(&settings).await.unwrap());
        assert_eq!(notifier.shown_count(), 0);

        advance(10).await;
        assert_eq!(notifier.shown_count(), 1);
        advance(60).await;
        assert_eq!(notifier.shown_count(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn resume_disabled_stays_idle() {
        let (scheduler, notifier) = scheduler_with(PermissionState::Granted);
        let settings = scheduler
            .inner
            .storage
            .save_settings(&SettingsPatch::next_scheduled_at(Some(
                Utc::now() - chrono::Duration::minutes(5),
            )))
            .unwrap();
        assert!(!settings.reminders_enabled);

        assert!(!scheduler.resume(&settings).await.unwrap());
        assert_eq!(scheduler.state(), SchedulerState::Idle);
        assert_eq!(notifier.shown_count(), 0);
        assert!(scheduler.next_reminder_time().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn snooze_fires_once_and_leaves_schedule() {
        let (scheduler, notifier) = scheduler_with(PermissionState::Granted);
        scheduler.enable(120).unwrap();
        let next = scheduler.next_reminder_time();

        let handle = scheduler.snooze(10).unwrap().expect("snooze scheduled");
        advance(10).await;
        handle.await.unwrap();

        assert_eq!(notifier.shown_titles(), vec!["Physio reminder (snoozed)"]);
        assert_eq!(scheduler.next_reminder_time(), next);
        assert!(scheduler.state().is_armed());
    }

    #[tokio::test(start_paused = true)]
    async fn snooze_without_permission_schedules_nothing() {
        let (scheduler, _notifier) = scheduler_with(PermissionState::Default);
        assert!(scheduler.snooze(10).unwrap().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn permission_revoked_mid_cycle_skips_show_but_rearms() {
        let (scheduler, notifier) = scheduler_with(PermissionState::Granted);
        scheduler.enable(30).unwrap();
        let first_next = scheduler.next_reminder_time().unwrap();

        notifier.set_permission(PermissionState::Denied);
        advance(30).await;
        assert_eq!(notifier.shown_count(), 0);
        assert!(scheduler.state().is_armed());
        assert!(scheduler.next_reminder_time().unwrap() >= first_next);

        notifier.set_permission(PermissionState::Granted);
        advance(30).await;
        assert_eq!(notifier.shown_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn show_errors_do_not_stop_the_cycle() {
        let (scheduler, notifier) = scheduler_with(PermissionState::Granted);
        notifier.fail_shows(true);
        scheduler.enable(15).unwrap();

        advance(15).await;
        advance(15).await;
        assert_eq!(notifier.attempt_count(), 2);
        assert!(scheduler.state().is_armed());
    }

    #[tokio::test(start_paused = true)]
    async fn shutdown_keeps_persisted_next() {
        let (scheduler, _notifier) = scheduler_with(PermissionState::Granted);
        scheduler.enable(30).unwrap();
        let next = scheduler.next_reminder_time();

        scheduler.shutdown();
        assert_eq!(scheduler.state(), SchedulerState::Idle);
        assert_eq!(scheduler.next_reminder_time(), next);
    }
}
