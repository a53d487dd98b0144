//! Stdin/stdout JSON bridge for the host command channel.
//!
//! Reads newline-delimited JSON `CommandEnvelope` messages from stdin,
//! dispatches them through the `HostCommandServer` router, and writes
//! `ResponseEnvelope` and `EventEnvelope` messages as newline-delimited
//! JSON to stdout.
//!
//! Stdout is exclusively reserved for the JSON protocol; all diagnostic
//! output (tracing, logs) must be routed to stderr.

use crate::error::{PhysioError, Result};
use crate::host::channel::{HostCommandClient, HostCommandServer};
use crate::host::contract::{CommandEnvelope, CommandName, EventEnvelope, ResponseEnvelope};
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader, BufWriter};
use tokio::sync::Mutex;
use tokio::sync::broadcast::{self, error::RecvError};

/// Default request channel capacity for the stdio bridge.
pub const REQUEST_CAPACITY: usize = 64;

/// Default event broadcast channel capacity for the stdio bridge.
pub const EVENT_CAPACITY: usize = 128;

type SharedWriter<W> = Arc<Mutex<BufWriter<W>>>;

/// Run the bridge on the process's stdin and stdout.
pub async fn run_stdio_bridge(client: HostCommandClient, server: HostCommandServer) -> Result<()> {
    let events = client.subscribe_events();
    run_stdio_bridge_with_events(client, server, events).await
}

/// Run the bridge on stdin and stdout, forwarding `events`.
///
/// Subscribe `events` before doing any work that may emit, such as
/// resuming the reminder schedule, so those events still reach stdout.
pub async fn run_stdio_bridge_with_events(
    client: HostCommandClient,
    server: HostCommandServer,
    events: broadcast::Receiver<EventEnvelope>,
) -> Result<()> {
    run_bridge_with_events(tokio::io::stdin(), tokio::io::stdout(), client, server, events).await
}

/// Run the JSON bridge until `input` closes or a `runtime.stop` command is
/// received. Events are taken from a fresh subscription.
pub async fn run_bridge<R, W>(
    input: R,
    output: W,
    client: HostCommandClient,
    server: HostCommandServer,
) -> Result<()>
where
    R: AsyncRead + Unpin + Send + 'static,
    W: AsyncWrite + Unpin + Send + 'static,
{
    let events = client.subscribe_events();
    run_bridge_with_events(input, output, client, server, events).await
}

/// Run the JSON bridge with an existing event subscription.
///
/// The router runs on its own task, events are copied to `output` by a
/// forwarder task, and this task reads commands from `input`. Responses
/// and events share one writer, one line each. Returning drops the client,
/// which ends the router.
pub async fn run_bridge_with_events<R, W>(
    input: R,
    output: W,
    client: HostCommandClient,
    server: HostCommandServer,
    events: broadcast::Receiver<EventEnvelope>,
) -> Result<()>
where
    R: AsyncRead + Unpin + Send + 'static,
    W: AsyncWrite + Unpin + Send + 'static,
{
    let writer = Arc::new(Mutex::new(BufWriter::new(output)));

    let server_handle = tokio::spawn(server.run());
    let forwarder = tokio::spawn(forward_events(events, Arc::clone(&writer)));

    let reader_result = run_reader(input, client, Arc::clone(&writer)).await;

    forwarder.abort();
    let _ = forwarder.await;
    let _ = server_handle.await;

    reader_result
}

/// Copy broadcast events to `writer` until the channel closes or a write fails.
async fn forward_events<W>(mut events: broadcast::Receiver<EventEnvelope>, writer: SharedWriter<W>)
where
    W: AsyncWrite + Unpin,
{
    loop {
        let event = match events.recv().await {
            Ok(event) => event,
            Err(RecvError::Lagged(skipped)) => {
                tracing::warn!(skipped, "stdout lagged behind host events; some were dropped");
                continue;
            }
            Err(RecvError::Closed) => break,
        };
        let json = match serde_json::to_string(&event) {
            Ok(json) => json,
            Err(e) => {
                tracing::error!(event = %event.event, error = %e, "cannot encode host event");
                continue;
            }
        };
        let mut w = writer.lock().await;
        if let Err(e) = write_line(&mut w, &json).await {
            tracing::warn!(error = %e, "stdout closed; no longer forwarding host events");
            break;
        }
    }
}

/// Read line-by-line, dispatch each command, and write responses.
async fn run_reader<R, W>(
    input: R,
    client: HostCommandClient,
    writer: SharedWriter<W>,
) -> Result<()>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut reader = BufReader::new(input);
    let mut line = String::new();

    loop {
        line.clear();
        let bytes_read = reader
            .read_line(&mut line)
            .await
            .map_err(|e| PhysioError::Channel(format!("failed to read from stdin: {e}")))?;

        if bytes_read == 0 {
            tracing::info!("stdin closed (EOF); shutting down stdio bridge");
            break;
        }

        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }

        let envelope: CommandEnvelope = match serde_json::from_str(trimmed) {
            Ok(env) => env,
            Err(e) => {
                tracing::warn!(
                    error = %e,
                    raw_line = %trimmed,
                    "failed to parse command envelope"
                );
                let error_response = ResponseEnvelope::error(
                    "parse-error",
                    format!("failed to parse command envelope: {e}"),
                );
                let json = serde_json::to_string(&error_response)?;
                let mut w = writer.lock().await;
                write_line(&mut w, &json).await?;
                continue;
            }
        };

        let is_stop = envelope.command == CommandName::RuntimeStop;
        let request_id = envelope.request_id.clone();

        let response = match client.send(envelope).await {
            Ok(resp) => resp,
            Err(e) => {
                tracing::error!(error = %e, "host command dispatch failed");
                let id = if request_id.trim().is_empty() {
                    "dispatch-error".to_owned()
                } else {
                    request_id
                };
                ResponseEnvelope::error(id, format!("dispatch failed: {e}"))
            }
        };

        let json = serde_json::to_string(&response)?;
        {
            let mut w = writer.lock().await;
            write_line(&mut w, &json).await?;
        }

        if is_stop {
            tracing::info!("runtime.stop received; shutting down stdio bridge");
            break;
        }
    }

    Ok(())
}

/// Write a single JSON line to the buffered writer and flush.
async fn write_line<W: AsyncWrite + Unpin>(writer: &mut BufWriter<W>, json: &str) -> Result<()> {
    writer
        .write_all(json.as_bytes())
        .await
        .map_err(|e| PhysioError::Channel(format!("failed to write to stdout: {e}")))?;
    writer
        .write_all(b"\n")
        .await
        .map_err(|e| PhysioError::Channel(format!("failed to write newline to stdout: {e}")))?;
    writer
        .flush()
        .await
        .map_err(|e| PhysioError::Channel(format!("failed to flush stdout: {e}")))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used)]

    use super::*;
    use crate::host::channel::{command_channel, command_channel_with_events};
    use crate::host::contract::EVENT_VERSION;
    use crate::notify::{LogNotifier, PermissionState};
    use crate::service::RoutineService;
    use crate::store::Storage;
    use tokio::io::AsyncReadExt;

    #[test]
    fn parse_error_response_is_well_formed() {
        let resp = ResponseEnvelope::error("parse-error", "bad json");
        assert!(!resp.ok);
        assert_eq!(resp.request_id, "parse-error");
        assert_eq!(resp.v, EVENT_VERSION);
        assert!(resp.error.is_some());
    }

    #[tokio::test]
    async fn bridge_answers_lines_and_stops() {
        let service = RoutineService::with_defaults(
            Storage::in_memory(),
            Arc::new(LogNotifier::new(PermissionState::Denied)),
        );
        let (client, server) = command_channel(REQUEST_CAPACITY, EVENT_CAPACITY, service);

        let input = concat!(
            "{\"v\":1,\"request_id\":\"a\",\"command\":\"host.ping\",\"payload\":{}}\n",
            "not json\n",
            "\n",
            "{\"v\":9,\"request_id\":\"b\",\"command\":\"host.ping\",\"payload\":{}}\n",
            "{\"v\":1,\"request_id\":\"c\",\"command\":\"runtime.stop\",\"payload\":{}}\n",
            "{\"v\":1,\"request_id\":\"d\",\"command\":\"host.ping\",\"payload\":{}}\n",
        );
        let (output, mut read_back) = tokio::io::duplex(64 * 1024);

        run_bridge(input.as_bytes(), output, client, server)
            .await
            .unwrap();

        let mut written = String::new();
        read_back.read_to_string(&mut written).await.unwrap();
        let responses: Vec<ResponseEnvelope> = written
            .lines()
            .filter_map(|l| serde_json::from_str(l).ok())
            .filter(|r: &ResponseEnvelope| !r.request_id.is_empty())
            .collect();

        let ids: Vec<&str> = responses.iter().map(|r| r.request_id.as_str()).collect();
        assert_eq!(ids, ["a", "parse-error", "b", "c"]);
        assert!(responses[0].ok);
        assert!(!responses[1].ok);
        assert!(!responses[2].ok);
        assert!(responses[3].ok);
    }

    #[tokio::test]
    async fn events_emitted_before_start_reach_output() {
        let service = RoutineService::with_defaults(
            Storage::in_memory(),
            Arc::new(LogNotifier::new(PermissionState::Denied)),
        );
        let (event_tx, _) = tokio::sync::broadcast::channel(EVENT_CAPACITY);
        let events = event_tx.subscribe();
        let (client, server) =
            command_channel_with_events(REQUEST_CAPACITY, event_tx.clone(), service, None);

        crate::host::channel::emit_event(
            &event_tx,
            "notification.show",
            serde_json::json!({"title": "Time for your physio routine!"}),
        );

        let input = "{\"v\":1,\"request_id\":\"stop\",\"command\":\"runtime.stop\",\"payload\":{}}\n";
        let (output, mut read_back) = tokio::io::duplex(64 * 1024);

        run_bridge_with_events(input.as_bytes(), output, client, server, events)
            .await
            .unwrap();

        let mut written = String::new();
        read_back.read_to_string(&mut written).await.unwrap();
        let shown: Vec<EventEnvelope> = written
            .lines()
            .filter_map(|l| serde_json::from_str::<EventEnvelope>(l).ok())
            .filter(|e| e.event == "notification.show")
            .collect();
        assert_eq!(shown.len(), 1);
        assert_eq!(shown[0].payload["title"], "Time for your physio routine!");
    }
}
