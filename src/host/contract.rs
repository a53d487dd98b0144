//! Versioned host command/event envelopes for frontend integration.

use serde::{Deserialize, Serialize};

/// Contract version for host command/event envelopes.
pub const EVENT_VERSION: u32 = 1;

/// Command set understood by the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CommandName {
    #[serde(rename = "host.ping")]
    HostPing,
    #[serde(rename = "host.version")]
    HostVersion,
    #[serde(rename = "exercises.list")]
    ExercisesList,
    #[serde(rename = "exercises.save")]
    ExercisesSave,
    #[serde(rename = "exercises.add")]
    ExercisesAdd,
    #[serde(rename = "exercises.update")]
    ExercisesUpdate,
    #[serde(rename = "exercises.delete")]
    ExercisesDelete,
    #[serde(rename = "exercises.move")]
    ExercisesMove,
    #[serde(rename = "settings.get")]
    SettingsGet,
    #[serde(rename = "settings.patch")]
    SettingsPatch,
    #[serde(rename = "completion.add")]
    CompletionAdd,
    #[serde(rename = "stats.get")]
    StatsGet,
    #[serde(rename = "history.get")]
    HistoryGet,
    #[serde(rename = "reminders.enable")]
    RemindersEnable,
    #[serde(rename = "reminders.disable")]
    RemindersDisable,
    #[serde(rename = "reminders.update_interval")]
    RemindersUpdateInterval,
    #[serde(rename = "reminders.snooze")]
    RemindersSnooze,
    #[serde(rename = "reminders.status")]
    RemindersStatus,
    #[serde(rename = "notification.permission_status")]
    NotificationPermissionStatus,
    #[serde(rename = "notification.permission_request")]
    NotificationPermissionRequest,
    #[serde(rename = "notification.permission_respond")]
    NotificationPermissionRespond,
    #[serde(rename = "notification.clicked")]
    NotificationClicked,
    #[serde(rename = "runtime.stop")]
    RuntimeStop,
}

impl CommandName {
    /// Every command, in wire order.
    pub const ALL: [Self; 23] = [
        Self::HostPing,
        Self::HostVersion,
        Self::ExercisesList,
        Self::ExercisesSave,
        Self::ExercisesAdd,
        Self::ExercisesUpdate,
        Self::ExercisesDelete,
        Self::ExercisesMove,
        Self::SettingsGet,
        Self::SettingsPatch,
        Self::CompletionAdd,
        Self::StatsGet,
        Self::HistoryGet,
        Self::RemindersEnable,
        Self::RemindersDisable,
        Self::RemindersUpdateInterval,
        Self::RemindersSnooze,
        Self::RemindersStatus,
        Self::NotificationPermissionStatus,
        Self::NotificationPermissionRequest,
        Self::NotificationPermissionRespond,
        Self::NotificationClicked,
        Self::RuntimeStop,
    ];

    /// Render command name to wire format.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::HostPing => "host.ping",
            Self::HostVersion => "host.version",
            Self::ExercisesList => "exercises.list",
            Self::ExercisesSave => "exercises.save",
            Self::ExercisesAdd => "exercises.add",
            Self::ExercisesUpdate => "exercises.update",
            Self::ExercisesDelete => "exercises.delete",
            Self::ExercisesMove => "exercises.move",
            Self::SettingsGet => "settings.get",
            Self::SettingsPatch => "settings.patch",
            Self::CompletionAdd => "completion.add",
            Self::StatsGet => "stats.get",
            Self::HistoryGet => "history.get",
            Self::RemindersEnable => "reminders.enable",
            Self::RemindersDisable => "reminders.disable",
            Self::RemindersUpdateInterval => "reminders.update_interval",
            Self::RemindersSnooze => "reminders.snooze",
            Self::RemindersStatus => "reminders.status",
            Self::NotificationPermissionStatus => "notification.permission_status",
            Self::NotificationPermissionRequest => "notification.permission_request",
            Self::NotificationPermissionRespond => "notification.permission_respond",
            Self::NotificationClicked => "notification.clicked",
            Self::RuntimeStop => "runtime.stop",
        }
    }

    /// Parse a command name from wire format.
    #[must_use]
    pub fn parse(raw: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|c| c.as_str() == raw)
    }
}

/// A versioned response envelope from backend host -> frontend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResponseEnvelope {
    pub v: u32,
    pub request_id: String,
    pub ok: bool,
    pub payload: serde_json::Value,
    pub error: Option<String>,
}

impl ResponseEnvelope {
    /// Build a successful response envelope.
    #[must_use]
    pub fn ok(request_id: impl Into<String>, payload: serde_json::Value) -> Self {
        Self {
            v: EVENT_VERSION,
            request_id: request_id.into(),
            ok: true,
            payload,
            error: None,
        }
    }

    /// Build an error response envelope.
    #[must_use]
    pub fn error(request_id: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            v: EVENT_VERSION,
            request_id: request_id.into(),
            ok: false,
            payload: serde_json::Value::Null,
            error: Some(message.into()),
        }
    }
}

/// A versioned command envelope from frontend -> backend host.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommandEnvelope {
    pub v: u32,
    pub request_id: String,
    pub command: CommandName,
    #[serde(default)]
    pub payload: serde_json::Value,
}

impl CommandEnvelope {
    /// Build a v1 command envelope.
    #[must_use]
    pub fn new(
        request_id: impl Into<String>,
        command: CommandName,
        payload: serde_json::Value,
    ) -> Self {
        Self {
            v: EVENT_VERSION,
            request_id: request_id.into(),
            command,
            payload,
        }
    }

    /// Validate envelope version and required identifiers.
    pub fn validate(&self) -> Result<(), ContractError> {
        if self.v != EVENT_VERSION {
            return Err(ContractError::new(
                ContractErrorKind::UnsupportedVersion,
                format!(
                    "unsupported contract version {}; expected {}",
                    self.v, EVENT_VERSION
                ),
            ));
        }
        if self.request_id.trim().is_empty() {
            return Err(ContractError::new(
                ContractErrorKind::InvalidEnvelope,
                "request_id cannot be empty".to_owned(),
            ));
        }
        Ok(())
    }
}

/// A versioned event envelope from backend host -> frontend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventEnvelope {
    pub v: u32,
    pub event_id: String,
    pub event: String,
    pub payload: serde_json::Value,
}

impl EventEnvelope {
    /// Build a v1 event envelope.
    #[must_use]
    pub fn new(
        event_id: impl Into<String>,
        event: impl Into<String>,
        payload: serde_json::Value,
    ) -> Self {
        Self {
            v: EVENT_VERSION,
            event_id: event_id.into(),
            event: event.into(),
            payload,
        }
    }
}

/// Contract validation error categories.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContractErrorKind {
    UnsupportedVersion,
    InvalidEnvelope,
}

/// Contract validation error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContractError {
    pub kind: ContractErrorKind,
    pub message: String,
}

impl ContractError {
    #[must_use]
    pub fn new(kind: ContractErrorKind, message: String) -> Self {
        Self { kind, message }
    }
}

impl std::fmt::Display for ContractError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}: {}", self.kind, self.message)
    }
}

impl std::error::Error for ContractError {}
