//! Error types for the physio reminder core.

/// Top-level error type for storage, scheduling and the host bridge.
#[derive(Debug, thiserror::Error)]
pub enum PhysioError {
    /// Persistence backend error (key-value read/write).
    #[error("storage error: {0}")]
    Storage(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON encode/decode error.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Configuration error.
    #[error("config error: {0}")]
    Config(String),

    /// Rejected user input (empty exercise name, bad index, ...).
    #[error("validation error: {0}")]
    Validation(String),

    /// Referenced record does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// Reminder interval must be at least one minute.
    #[error("invalid reminder interval: {0} minutes")]
    InvalidInterval(u32),

    /// Notification construction or delivery error.
    #[error("notification error: {0}")]
    Notification(String),

    /// A permission prompt is already waiting for the user.
    #[error("a notification permission request is already pending")]
    PermissionRequestPending,

    /// Channel send/receive error.
    #[error("channel error: {0}")]
    Channel(String),

    /// Malformed host command or payload.
    #[error("contract error: {0}")]
    Contract(String),
}

/// Convenience result type.
pub type Result<T> = std::result::Result<T, PhysioError>;
