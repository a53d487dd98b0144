//! Logging setup for the host binary.
//!
//! Stdout carries the JSON protocol, so human-readable logs go to stderr.
//! When enabled, a daily rolling file is also written under
//! [`crate::config::StorageConfig::logs_dir`]. Old files are pruned at startup.

use crate::config::LoggingConfig;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

/// Prefix of rolling log files (`physio-host.log.YYYY-MM-DD`).
pub const LOG_FILE_PREFIX: &str = "physio-host.log";

/// Maximum age (in days) of log files to keep.
pub const MAX_LOG_AGE_DAYS: u64 = 7;

/// Maximum number of log files to keep.
pub const MAX_LOG_FILES: usize = 10;

/// Install the global subscriber.
///
/// The filter comes from `RUST_LOG`, falling back to `config.level`. The
/// returned guard flushes the file writer on drop and must be held for the
/// life of the process.
pub fn init_tracing(config: &LoggingConfig, logs_dir: &Path) -> Option<WorkerGuard> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.level.as_str()));

    let mut file_error = None;
    let (file_layer, guard) = if config.file_logging {
        match fs::create_dir_all(logs_dir) {
            Ok(()) => {
                prune_old_logs(logs_dir);
                let appender = tracing_appender::rolling::daily(logs_dir, LOG_FILE_PREFIX);
                let (writer, guard) = tracing_appender::non_blocking(appender);
                let layer = tracing_subscriber::fmt::layer()
                    .with_ansi(false)
                    .with_writer(writer);
                (Some(layer), Some(guard))
            }
            Err(e) => {
                file_error = Some(e);
                (None, None)
            }
        }
    } else {
        (None, None)
    };

    let stderr_layer = tracing_subscriber::fmt::layer().with_writer(std::io::stderr);

    if tracing_subscriber::registry()
        .with(filter)
        .with(stderr_layer)
        .with(file_layer)
        .try_init()
        .is_err()
    {
        tracing::debug!("global subscriber already installed");
    }

    if let Some(e) = file_error {
        tracing::warn!(
            dir = %logs_dir.display(),
            error = %e,
            "cannot create log directory; file logging disabled"
        );
    }

    guard
}

/// Remove log files older than [`MAX_LOG_AGE_DAYS`] or beyond [`MAX_LOG_FILES`].
fn prune_old_logs(log_dir: &Path) {
    let cutoff = SystemTime::now()
        .checked_sub(Duration::from_secs(MAX_LOG_AGE_DAYS * 86_400))
        .unwrap_or(UNIX_EPOCH);
    prune_old_logs_with_cutoff(log_dir, cutoff, MAX_LOG_FILES);
}

fn prune_old_logs_with_cutoff(log_dir: &Path, cutoff: SystemTime, max_files: usize) {
    let mut entries: Vec<(PathBuf, SystemTime)> = match fs::read_dir(log_dir) {
        Ok(dir) => dir
            .flatten()
            .filter_map(|e| {
                let path = e.path();
                let name = path.file_name()?.to_str()?;
                if !name.starts_with(LOG_FILE_PREFIX) {
                    return None;
                }
                let mtime = path.metadata().ok()?.modified().ok()?;
                Some((path, mtime))
            })
            .collect(),
        Err(_) => return,
    };

    // Newest first.
    entries.sort_by(|a, b| b.1.cmp(&a.1));

    for (i, (path, mtime)) in entries.iter().enumerate() {
        if *mtime < cutoff || i >= max_files {
            let _ = fs::remove_file(path);
        }
    }
}
