//! Shared test doubles used across unit test modules.

#![allow(clippy::expect_used)]

use crate::error::{PhysioError, Result};
use crate::notify::{Notifier, PermissionState, ReminderNotification};
use async_trait::async_trait;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

/// Notifier that records what it was asked to show.
pub struct RecordingNotifier {
    permission: Mutex<PermissionState>,
    grant_on_request: AtomicBool,
    fail: AtomicBool,
    attempts: AtomicUsize,
    shown: Mutex<Vec<ReminderNotification>>,
}

impl RecordingNotifier {
    pub fn new(permission: PermissionState) -> Self {
        Self {
            permission: Mutex::new(permission),
            grant_on_request: AtomicBool::new(false),
            fail: AtomicBool::new(false),
            attempts: AtomicUsize::new(0),
            shown: Mutex::new(Vec::new()),
        }
    }

    pub fn set_permission(&self, state: PermissionState) {
        *self.permission.lock().expect("permission lock") = state;
    }

    /// Answer the next permission prompt with "granted".
    pub fn grant_on_request(&self, grant: bool) {
        self.grant_on_request.store(grant, Ordering::SeqCst);
    }

    pub fn fail_shows(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }

    pub fn shown_count(&self) -> usize {
        self.shown.lock().expect("shown lock").len()
    }

    pub fn shown_titles(&self) -> Vec<String> {
        self.shown
            .lock()
            .expect("shown lock")
            .iter()
            .map(|n| n.title.clone())
            .collect()
    }

    pub fn attempt_count(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    fn permission(&self) -> PermissionState {
        *self.permission.lock().expect("permission lock")
    }

    async fn request_permission(&self) -> Result<bool> {
        if self.permission() == PermissionState::Default {
            let next = if self.grant_on_request.load(Ordering::SeqCst) {
                PermissionState::Granted
            } else {
                PermissionState::Denied
            };
            self.set_permission(next);
        }
        Ok(self.has_permission())
    }

    async fn show(&self, notification: &ReminderNotification) -> Result<()> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        if self.fail.load(Ordering::SeqCst) {
            return Err(PhysioError::Notification("display failed".to_owned()));
        }
        self.shown
            .lock()
            .expect("shown lock")
            .push(notification.clone());
        Ok(())
    }
}
