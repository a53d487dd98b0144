//! Headless host binary for stdin/stdout JSON communication.
//!
//! Reads `CommandEnvelope` messages as newline-delimited JSON from stdin,
//! dispatches them through the host command channel, and writes
//! `ResponseEnvelope` and `EventEnvelope` messages to stdout.
//!
//! All tracing/diagnostic output goes to stderr (and the rolling log file)
//! so that stdout remains a clean JSON protocol channel.

use physio_buddy::host::channel::command_channel_with_events;
use physio_buddy::host::stdio::{EVENT_CAPACITY, REQUEST_CAPACITY, run_stdio_bridge_with_events};
use physio_buddy::{HostConfig, HostNotifier, ReminderScheduler, RoutineService, Storage};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::broadcast;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config_path = std::env::var_os("PHYSIO_CONFIG")
        .map(PathBuf::from)
        .unwrap_or_else(HostConfig::default_config_path);
    let config = HostConfig::load_or_default(&config_path)
        .map_err(|e| anyhow::anyhow!("cannot load config {}: {e}", config_path.display()))?;

    let data_dir = config.storage.resolved_data_dir();
    let _log_guard =
        physio_buddy::diagnostics::init_tracing(&config.logging, &config.storage.logs_dir());

    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        config = %config_path.display(),
        data_dir = %data_dir.display(),
        "physio-host starting"
    );

    let storage = Storage::open_dir(&data_dir);
    // Subscribe stdout before resuming so a reminder that fires during
    // resume is not lost.
    let (event_tx, stdout_events) = broadcast::channel(EVENT_CAPACITY);
    let notifier = Arc::new(HostNotifier::new(
        event_tx.clone(),
        config.notifications.permission,
    ));
    let scheduler = ReminderScheduler::with_notifications(
        storage.clone(),
        notifier.clone(),
        config.notifications.reminder(),
        config.notifications.snoozed(),
    );
    let service = RoutineService::new(storage, scheduler, notifier.clone());

    match service.resume().await {
        Ok(armed) => tracing::info!(armed, "reminder schedule restored"),
        Err(e) => tracing::warn!(error = %e, "could not restore reminder schedule"),
    }

    let (client, server) =
        command_channel_with_events(REQUEST_CAPACITY, event_tx, service.clone(), Some(notifier));

    let result = tokio::select! {
        result = run_stdio_bridge_with_events(client, server, stdout_events) => result,
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("interrupt received; shutting down");
            Ok(())
        }
    };
    service.shutdown();

    result.map_err(|e| {
        tracing::error!(error = %e, "physio-host exited with error");
        anyhow::anyhow!("physio-host failed: {e}")
    })?;

    tracing::info!("physio-host shut down cleanly");
    Ok(())
}
