//! Notification payloads, permission state, and the notifier seam.
//!
//! The core never draws anything. A [`Notifier`] either logs reminders
//! ([`LogNotifier`]) or forwards them to the frontend as host events
//! ([`HostNotifier`]), which is responsible for putting them on screen.

use crate::error::{PhysioError, Result};
use crate::host::channel::emit_event;
use crate::host::contract::EventEnvelope;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::{broadcast, oneshot};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Deduplication tag shared by every reminder, so repeated fires collapse.
pub const REMINDER_TAG: &str = "physio-reminder";

/// How long an untouched notification stays up.
pub const DEFAULT_AUTO_DISMISS: Duration = Duration::from_secs(30);

/// Default icon reference handed to the frontend.
pub const DEFAULT_ICON: &str = "/favicon.ico";

/// What the frontend is asked to display.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReminderNotification {
    pub title: String,
    pub body: String,
    pub icon: Option<String>,
    /// Keep the notification up until the user interacts with it.
    pub require_interaction: bool,
    pub tag: String,
    pub auto_dismiss: Duration,
}

impl ReminderNotification {
    /// The regular interval reminder.
    #[must_use]
    pub fn reminder() -> Self {
        Self::with_text(
            "Time for your physio routine!",
            "Tap to view your exercises and mark as complete.",
        )
    }

    /// The one-shot reminder fired after a snooze.
    #[must_use]
    pub fn snoozed() -> Self {
        Self::with_text(
            "Physio reminder (snoozed)",
            "Time for your physio routine! This is your snoozed reminder.",
        )
    }

    /// A reminder with custom text and default presentation.
    #[must_use]
    pub fn with_text(title: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            body: body.into(),
            icon: Some(DEFAULT_ICON.to_owned()),
            require_interaction: true,
            tag: REMINDER_TAG.to_owned(),
            auto_dismiss: DEFAULT_AUTO_DISMISS,
        }
    }

    fn to_payload(&self, notification_id: &str) -> serde_json::Value {
        serde_json::json!({
            "notification_id": notification_id,
            "title": self.title,
            "body": self.body,
            "icon": self.icon,
            "require_interaction": self.require_interaction,
            "tag": self.tag,
            "auto_dismiss_secs": self.auto_dismiss.as_secs(),
        })
    }
}

/// Notification permission as reported by the platform.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PermissionState {
    /// The platform cannot show notifications at all.
    Unsupported,
    /// Not asked yet.
    #[default]
    Default,
    Granted,
    Denied,
}

impl PermissionState {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Unsupported => "unsupported",
            Self::Default => "default",
            Self::Granted => "granted",
            Self::Denied => "denied",
        }
    }

    #[must_use]
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "unsupported" => Some(Self::Unsupported),
            "default" | "prompt" => Some(Self::Default),
            "granted" => Some(Self::Granted),
            "denied" | "blocked" => Some(Self::Denied),
            _ => None,
        }
    }

    /// User-visible explanation when reminders cannot be delivered.
    #[must_use]
    pub fn hint(self) -> Option<&'static str> {
        match self {
            Self::Granted => None,
            Self::Unsupported => Some("Notifications are not supported on this device."),
            Self::Default | Self::Denied => Some(
                "Please enable notifications in your system settings to receive reminders.",
            ),
        }
    }
}

/// Something that can put a reminder in front of the user.
#[async_trait]
pub trait Notifier: Send + Sync {
    /// Current permission state.
    fn permission(&self) -> PermissionState;

    /// Ask the user for permission, suspending until they answer.
    ///
    /// Resolves immediately when the answer is already known.
    async fn request_permission(&self) -> Result<bool>;

    /// Display `notification`. A no-op without permission.
    async fn show(&self, notification: &ReminderNotification) -> Result<()>;

    fn has_permission(&self) -> bool {
        self.permission() == PermissionState::Granted
    }
}

/// Writes reminders to the log. Used headless and in tests.
#[derive(Debug)]
pub struct LogNotifier {
    permission: PermissionState,
}

impl LogNotifier {
    #[must_use]
    pub fn new(permission: PermissionState) -> Self {
        Self { permission }
    }

    #[must_use]
    pub fn granted() -> Self {
        Self::new(PermissionState::Granted)
    }
}

impl Default for LogNotifier {
    fn default() -> Self {
        Self::granted()
    }
}

#[async_trait]
impl Notifier for LogNotifier {
    fn permission(&self) -> PermissionState {
        self.permission
    }

    async fn request_permission(&self) -> Result<bool> {
        Ok(self.has_permission())
    }

    async fn show(&self, notification: &ReminderNotification) -> Result<()> {
        if !self.has_permission() {
            debug!(title = %notification.title, "no notification permission; not shown");
            return Ok(());
        }
        info!(
            title = %notification.title,
            body = %notification.body,
            tag = %notification.tag,
            "reminder notification"
        );
        Ok(())
    }
}

struct ActiveNotification {
    id: String,
    dismiss: CancellationToken,
}

/// Forwards reminders to the frontend over the host event channel.
///
/// Emitted events:
/// - `notification.show` when a reminder should appear
/// - `notification.dismissed` after auto-dismiss, a click, or replacement
///   by a newer reminder with the same tag
/// - `notification.permission_requested` when the user must be asked
/// - `app.focus_requested` when a notification is clicked
pub struct HostNotifier {
    events: broadcast::Sender<EventEnvelope>,
    permission: Mutex<PermissionState>,
    pending: Mutex<Option<oneshot::Sender<bool>>>,
    active: Arc<Mutex<HashMap<String, ActiveNotification>>>,
}

impl HostNotifier {
    #[must_use]
    pub fn new(events: broadcast::Sender<EventEnvelope>, permission: PermissionState) -> Self {
        Self {
            events,
            permission: Mutex::new(permission),
            pending: Mutex::new(None),
            active: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Overwrite the permission state, e.g. when the frontend reports a
    /// change made in system settings.
    pub fn set_permission(&self, state: PermissionState) {
        if let Ok(mut guard) = self.permission.lock() {
            *guard = state;
        }
    }

    /// Deliver the user's answer to an outstanding permission request.
    ///
    /// Returns `true` when a request was waiting for it. The permission
    /// state is updated either way.
    pub fn respond_permission(&self, granted: bool) -> bool {
        self.set_permission(if granted {
            PermissionState::Granted
        } else {
            PermissionState::Denied
        });

        let waiter = self.pending.lock().ok().and_then(|mut slot| slot.take());
        match waiter {
            Some(tx) => tx.send(granted).is_ok(),
            None => false,
        }
    }

    /// Whether a permission request is awaiting an answer.
    #[must_use]
    pub fn permission_request_pending(&self) -> bool {
        self.pending
            .lock()
            .map(|slot| slot.is_some())
            .unwrap_or(false)
    }

    /// Handle a click on a shown notification.
    ///
    /// Requests app focus and dismisses the notification. With no id, the
    /// reminder currently shown under [`REMINDER_TAG`] is targeted. Returns
    /// `false` when nothing matching was on screen.
    pub fn clicked(&self, notification_id: Option<&str>) -> bool {
        emit_event(
            &self.events,
            "app.focus_requested",
            serde_json::json!({ "reason": "notification_clicked" }),
        );

        let removed = self.active.lock().ok().and_then(|mut active| {
            let tag = match notification_id {
                Some(id) => active
                    .iter()
                    .find(|(_, n)| n.id == id)
                    .map(|(tag, _)| tag.clone())?,
                None => REMINDER_TAG.to_owned(),
            };
            active.remove(&tag)
        });

        match removed {
            Some(notification) => {
                notification.dismiss.cancel();
                emit_dismissed(&self.events, &notification.id, "clicked");
                true
            }
            None => false,
        }
    }

    fn current_permission(&self) -> PermissionState {
        self.permission
            .lock()
            .map(|guard| *guard)
            .unwrap_or(PermissionState::Unsupported)
    }
}

#[async_trait]
impl Notifier for HostNotifier {
    fn permission(&self) -> PermissionState {
        self.current_permission()
    }

    async fn request_permission(&self) -> Result<bool> {
        match self.current_permission() {
            PermissionState::Granted => return Ok(true),
            PermissionState::Denied | PermissionState::Unsupported => return Ok(false),
            PermissionState::Default => {}
        }

        let rx = {
            let mut slot = self
                .pending
                .lock()
                .map_err(|_| PhysioError::Notification("permission lock poisoned".to_owned()))?;
            if slot.is_some() {
                return Err(PhysioError::PermissionRequestPending);
            }
            let (tx, rx) = oneshot::channel();
            *slot = Some(tx);
            rx
        };

        emit_event(
            &self.events,
            "notification.permission_requested",
            serde_json::json!({ "permission": PermissionState::Default.as_str() }),
        );

        rx.await.map_err(|_| {
            PhysioError::Notification("permission request abandoned before an answer".to_owned())
        })
    }

    async fn show(&self, notification: &ReminderNotification) -> Result<()> {
        if !self.has_permission() {
            debug!(title = %notification.title, "no notification permission; not shown");
            return Ok(());
        }

        let id = uuid::Uuid::new_v4().to_string();
        let dismiss = CancellationToken::new();

        let replaced = {
            let mut active = self
                .active
                .lock()
                .map_err(|_| PhysioError::Notification("notification lock poisoned".to_owned()))?;
            active.insert(
                notification.tag.clone(),
                ActiveNotification {
                    id: id.clone(),
                    dismiss: dismiss.clone(),
                },
            )
        };
        if let Some(old) = replaced {
            old.dismiss.cancel();
            emit_dismissed(&self.events, &old.id, "replaced");
        }

        emit_event(
            &self.events,
            "notification.show",
            notification.to_payload(&id),
        );

        let events = self.events.clone();
        let active = Arc::clone(&self.active);
        let tag = notification.tag.clone();
        let timeout = notification.auto_dismiss;
        tokio::spawn(async move {
            tokio::select! {
                () = dismiss.cancelled() => {}
                () = tokio::time::sleep(timeout) => {
                    let still_shown = match active.lock() {
                        Ok(mut active) => {
                            if active.get(&tag).is_some_and(|n| n.id == id) {
                                active.remove(&tag);
                                true
                            } else {
                                false
                            }
                        }
                        Err(_) => {
                            warn!("notification lock poisoned; skipping auto-dismiss");
                            false
                        }
                    };
                    if still_shown {
                        emit_dismissed(&events, &id, "timeout");
                    }
                }
            }
        });

        Ok(())
    }
}

fn emit_dismissed(events: &broadcast::Sender<EventEnvelope>, id: &str, reason: &str) {
    emit_event(
        events,
        "notification.dismissed",
        serde_json::json!({ "notification_id": id, "reason": reason }),
    );
}
