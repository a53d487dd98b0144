//! Configuration for the headless host.

use crate::notify::{PermissionState, ReminderNotification};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Top-level host configuration, read from `config.toml`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HostConfig {
    /// Where persisted state lives.
    pub storage: StorageConfig,
    /// Log filtering and file output.
    pub logging: LoggingConfig,
    /// Reminder text and presentation.
    pub notifications: NotificationConfig,
}

/// Persisted state location.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Data directory (None = platform default).
    pub data_dir: Option<PathBuf>,
}

impl StorageConfig {
    /// The configured directory, or the platform data directory.
    #[must_use]
    pub fn resolved_data_dir(&self) -> PathBuf {
        self.data_dir.clone().unwrap_or_else(crate::app_dirs::data_dir)
    }

    /// Rolling log directory, `<data_dir>/logs`.
    #[must_use]
    pub fn logs_dir(&self) -> PathBuf {
        self.resolved_data_dir().join("logs")
    }
}

/// Logging settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// `EnvFilter` directive used when `RUST_LOG` is unset.
    pub level: String,
    /// Also write a daily rolling log file under `<data_dir>/logs`.
    pub file_logging: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "physio_buddy=info".to_owned(),
            file_logging: true,
        }
    }
}

/// Reminder notification settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NotificationConfig {
    pub title: String,
    pub body: String,
    pub snoozed_title: String,
    pub snoozed_body: String,
    /// Icon reference passed through to the frontend (None = no icon).
    pub icon: Option<String>,
    /// Keep notifications up until the user interacts with them.
    pub require_interaction: bool,
    /// Seconds before an untouched notification is dismissed.
    pub auto_dismiss_secs: u64,
    /// Permission state assumed at startup, before the frontend reports one.
    pub permission: PermissionState,
}

impl Default for NotificationConfig {
    fn default() -> Self {
        let reminder = ReminderNotification::reminder();
        let snoozed = ReminderNotification::snoozed();
        Self {
            title: reminder.title,
            body: reminder.body,
            snoozed_title: snoozed.title,
            snoozed_body: snoozed.body,
            icon: reminder.icon,
            require_interaction: reminder.require_interaction,
            auto_dismiss_secs: reminder.auto_dismiss.as_secs(),
            permission: PermissionState::Default,
        }
    }
}

impl NotificationConfig {
    /// The regular reminder built from these settings.
    #[must_use]
    pub fn reminder(&self) -> ReminderNotification {
        self.build(&self.title, &self.body)
    }

    /// The snoozed reminder built from these settings.
    #[must_use]
    pub fn snoozed(&self) -> ReminderNotification {
        self.build(&self.snoozed_title, &self.snoozed_body)
    }

    fn build(&self, title: &str, body: &str) -> ReminderNotification {
        ReminderNotification {
            icon: self.icon.clone(),
            require_interaction: self.require_interaction,
            auto_dismiss: Duration::from_secs(self.auto_dismiss_secs.max(1)),
            ..ReminderNotification::with_text(title, body)
        }
    }
}

impl HostConfig {
    /// Load configuration from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_file(path: &Path) -> crate::error::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        toml::from_str(&content).map_err(|e| crate::error::PhysioError::Config(e.to_string()))
    }

    /// Save configuration to a TOML file, creating parent directories as needed.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be written or the config cannot be serialized.
    pub fn save_to_file(&self, path: &Path) -> crate::error::Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)
            .map_err(|e| crate::error::PhysioError::Config(e.to_string()))?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Load `path` if it exists, otherwise defaults.
    ///
    /// # Errors
    ///
    /// Returns an error only when an existing file cannot be read or parsed.
    pub fn load_or_default(path: &Path) -> crate::error::Result<Self> {
        if path.exists() {
            Self::from_file(path)
        } else {
            Ok(Self::default())
        }
    }

    /// Returns the default config file path (`app_dirs::config_file()`).
    #[must_use]
    pub fn default_config_path() -> PathBuf {
        crate::app_dirs::config_file()
    }
}
