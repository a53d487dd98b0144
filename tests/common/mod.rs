//! Shared helpers for integration tests.

#![allow(dead_code, clippy::expect_used)]

use async_trait::async_trait;
use physio_buddy::{Notifier, PermissionState, ReminderNotification};
use std::sync::Mutex;
use std::time::Duration;

/// Notifier double that records every reminder it is asked to show.
pub struct RecordingNotifier {
    permission: Mutex<PermissionState>,
    shown: Mutex<Vec<ReminderNotification>>,
}

impl RecordingNotifier {
    pub fn new(permission: PermissionState) -> Self {
        Self {
            permission: Mutex::new(permission),
            shown: Mutex::new(Vec::new()),
        }
    }

    pub fn granted() -> Self {
        Self::new(PermissionState::Granted)
    }

    pub fn set_permission(&self, state: PermissionState) {
        *self.permission.lock().expect("permission lock") = state;
    }

    pub fn shown_titles(&self) -> Vec<String> {
        self.shown
            .lock()
            .expect("shown lock")
            .iter()
            .map(|n| n.title.clone())
            .collect()
    }

    pub fn shown_count(&self) -> usize {
        self.shown.lock().expect("shown lock").len()
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    fn permission(&self) -> PermissionState {
        *self.permission.lock().expect("permission lock")
    }

    async fn request_permission(&self) -> physio_buddy::Result<bool> {
        Ok(self.has_permission())
    }

    async fn show(&self, notification: &ReminderNotification) -> physio_buddy::Result<()> {
        self.shown
            .lock()
            .expect("shown lock")
            .push(notification.clone());
        Ok(())
    }
}

/// Advance the paused clock by `minutes` and let spawned timers run.
pub async fn advance_minutes(minutes: u64) {
    tokio::time::sleep(Duration::from_secs(minutes * 60)).await;
    for _ in 0..4 {
        tokio::task::yield_now().await;
    }
}
