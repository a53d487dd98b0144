//! Host command channel and router.
//!
//! Commands are routed serially. The two commands that may wait on the
//! user (`reminders.enable`, `notification.permission_request`) are
//! accepted immediately and finish on a spawned task, reporting through an
//! event, so that the `notification.permission_respond` that unblocks them
//! can arrive through this same router.

use crate::error::{PhysioError, Result};
use crate::host::contract::{CommandEnvelope, CommandName, EventEnvelope, ResponseEnvelope};
use crate::notify::HostNotifier;
use crate::service::RoutineService;
use crate::store::{CompletionSource, Exercise, SettingsPatch};
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc, oneshot};
use tracing::{debug, warn};

/// Send `event` to every subscriber. Dropped silently when nobody listens.
pub fn emit_event(
    event_tx: &broadcast::Sender<EventEnvelope>,
    event: &str,
    payload: serde_json::Value,
) {
    let envelope =
        EventEnvelope::new(uuid::Uuid::new_v4().to_string(), event.to_owned(), payload);
    if event_tx.send(envelope).is_err() {
        debug!(event, "no event subscribers");
    }
}

struct HostCommandRequest {
    envelope: CommandEnvelope,
    response_tx: oneshot::Sender<ResponseEnvelope>,
}

#[derive(Clone)]
pub struct HostCommandClient {
    request_tx: mpsc::Sender<HostCommandRequest>,
    event_tx: broadcast::Sender<EventEnvelope>,
}

impl HostCommandClient {
    pub async fn send(&self, envelope: CommandEnvelope) -> Result<ResponseEnvelope> {
        envelope.validate().map_err(|e| {
            PhysioError::Contract(format!(
                "invalid host command envelope {}: {}",
                envelope.request_id, e
            ))
        })?;

        let (response_tx, response_rx) = oneshot::channel();
        self.request_tx
            .send(HostCommandRequest {
                envelope,
                response_tx,
            })
            .await
            .map_err(|e| {
                PhysioError::Channel(format!("failed to send host command request: {e}"))
            })?;

        response_rx
            .await
            .map_err(|e| PhysioError::Channel(format!("host command response dropped: {e}")))
    }

    #[must_use]
    pub fn subscribe_events(&self) -> broadcast::Receiver<EventEnvelope> {
        self.event_tx.subscribe()
    }
}

pub struct HostCommandServer {
    request_rx: mpsc::Receiver<HostCommandRequest>,
    event_tx: broadcast::Sender<EventEnvelope>,
    service: RoutineService,
    notifier: Option<Arc<HostNotifier>>,
}

/// Create a command channel with its own event broadcast.
#[must_use]
pub fn command_channel(
    request_capacity: usize,
    event_capacity: usize,
    service: RoutineService,
) -> (HostCommandClient, HostCommandServer) {
    let (event_tx, _event_rx) = broadcast::channel(event_capacity.max(1));
    command_channel_with_events(request_capacity, event_tx, service, None)
}

/// Create a command channel using an existing event broadcast sender.
///
/// Pass the [`HostNotifier`] built on the same sender so that notification
/// events and command events reach the frontend through one stream, and so
/// that permission answers and clicks can be delivered to it.
#[must_use]
pub fn command_channel_with_events(
    request_capacity: usize,
    event_tx: broadcast::Sender<EventEnvelope>,
    service: RoutineService,
    notifier: Option<Arc<HostNotifier>>,
) -> (HostCommandClient, HostCommandServer) {
    let (request_tx, request_rx) = mpsc::channel(request_capacity.max(1));

    (
        HostCommandClient {
            request_tx,
            event_tx: event_tx.clone(),
        },
        HostCommandServer {
            request_rx,
            event_tx,
            service,
            notifier,
        },
    )
}

impl HostCommandServer {
    pub async fn run(mut self) {
        while let Some(request) = self.request_rx.recv().await {
            let envelope = &request.envelope;
            let response = self.route(envelope).unwrap_or_else(|e| {
                warn!(
                    command = envelope.command.as_str(),
                    request_id = %envelope.request_id,
                    error = %e,
                    "host command failed"
                );
                ResponseEnvelope::error(envelope.request_id.clone(), e.to_string())
            });
            let _ = request.response_tx.send(response);
        }
    }

    /// Route a command envelope to the appropriate handler.
    pub fn route(&self, envelope: &CommandEnvelope) -> Result<ResponseEnvelope> {
        debug!(command = envelope.command.as_str(), request_id = %envelope.request_id, "routing host command");
        match envelope.command {
            CommandName::HostPing => Ok(ResponseEnvelope::ok(
                envelope.request_id.clone(),
                serde_json::json!({"pong": true}),
            )),
            CommandName::HostVersion => Ok(ResponseEnvelope::ok(
                envelope.request_id.clone(),
                serde_json::json!({
                    "contract_version": crate::host::contract::EVENT_VERSION,
                    "channel": "physio_host_v1",
                    "version": env!("CARGO_PKG_VERSION"),
                }),
            )),
            CommandName::ExercisesList => self.handle_exercises_list(envelope),
            CommandName::ExercisesSave => self.handle_exercises_save(envelope),
            CommandName::ExercisesAdd => self.handle_exercises_add(envelope),
            CommandName::ExercisesUpdate => self.handle_exercises_update(envelope),
            CommandName::ExercisesDelete => self.handle_exercises_delete(envelope),
            CommandName::ExercisesMove => self.handle_exercises_move(envelope),
            CommandName::SettingsGet => self.handle_settings_get(envelope),
            CommandName::SettingsPatch => self.handle_settings_patch(envelope),
            CommandName::CompletionAdd => self.handle_completion_add(envelope),
            CommandName::StatsGet => self.handle_stats_get(envelope),
            CommandName::HistoryGet => self.handle_history_get(envelope),
            CommandName::RemindersEnable => self.handle_reminders_enable(envelope),
            CommandName::RemindersDisable => self.handle_reminders_disable(envelope),
            CommandName::RemindersUpdateInterval => self.handle_reminders_update_interval(envelope),
            CommandName::RemindersSnooze => self.handle_reminders_snooze(envelope),
            CommandName::RemindersStatus => self.handle_reminders_status(envelope),
            CommandName::NotificationPermissionStatus => {
                self.handle_notification_permission_status(envelope)
            }
            CommandName::NotificationPermissionRequest => {
                self.handle_notification_permission_request(envelope)
            }
            CommandName::NotificationPermissionRespond => {
                self.handle_notification_permission_respond(envelope)
            }
            CommandName::NotificationClicked => self.handle_notification_clicked(envelope),
            CommandName::RuntimeStop => self.handle_runtime_stop(envelope),
        }
    }

    fn handle_exercises_list(&self, envelope: &CommandEnvelope) -> Result<ResponseEnvelope> {
        Ok(ResponseEnvelope::ok(
            envelope.request_id.clone(),
            serde_json::json!({"exercises": self.service.list_exercises()}),
        ))
    }

    fn handle_exercises_save(&self, envelope: &CommandEnvelope) -> Result<ResponseEnvelope> {
        let exercises = parse_exercise_list(&envelope.payload)?;
        self.service.save_exercises(&exercises)?;
        self.emit_exercises_changed(envelope);
        Ok(ResponseEnvelope::ok(
            envelope.request_id.clone(),
            serde_json::json!({"accepted": true, "count": exercises.len()}),
        ))
    }

    fn handle_exercises_add(&self, envelope: &CommandEnvelope) -> Result<ResponseEnvelope> {
        let name = parse_non_empty_field(&envelope.payload, "name", "exercises.add")?;
        let note = parse_optional_string(&envelope.payload, "note", "exercises.add")?;
        let exercise = self.service.add_exercise(&name, note.as_deref())?;
        self.emit_exercises_changed(envelope);
        Ok(ResponseEnvelope::ok(
            envelope.request_id.clone(),
            serde_json::json!({"accepted": true, "exercise": exercise}),
        ))
    }

    fn handle_exercises_update(&self, envelope: &CommandEnvelope) -> Result<ResponseEnvelope> {
        let id = parse_non_empty_field(&envelope.payload, "id", "exercises.update")?;
        let name = parse_non_empty_field(&envelope.payload, "name", "exercises.update")?;
        let note = parse_optional_string(&envelope.payload, "note", "exercises.update")?;
        let exercise = self.service.update_exercise(&id, &name, note.as_deref())?;
        self.emit_exercises_changed(envelope);
        Ok(ResponseEnvelope::ok(
            envelope.request_id.clone(),
            serde_json::json!({"accepted": true, "exercise": exercise}),
        ))
    }

    fn handle_exercises_delete(&self, envelope: &CommandEnvelope) -> Result<ResponseEnvelope> {
        let id = parse_non_empty_field(&envelope.payload, "id", "exercises.delete")?;
        self.service.delete_exercise(&id)?;
        self.emit_exercises_changed(envelope);
        Ok(ResponseEnvelope::ok(
            envelope.request_id.clone(),
            serde_json::json!({"accepted": true, "id": id}),
        ))
    }

    fn handle_exercises_move(&self, envelope: &CommandEnvelope) -> Result<ResponseEnvelope> {
        let from = parse_index(&envelope.payload, "from", "exercises.move")?;
        let to = parse_index(&envelope.payload, "to", "exercises.move")?;
        let exercises = self.service.move_exercise(from, to)?;
        self.emit_exercises_changed(envelope);
        Ok(ResponseEnvelope::ok(
            envelope.request_id.clone(),
            serde_json::json!({"accepted": true, "exercises": exercises}),
        ))
    }

    fn handle_settings_get(&self, envelope: &CommandEnvelope) -> Result<ResponseEnvelope> {
        Ok(ResponseEnvelope::ok(
            envelope.request_id.clone(),
            serde_json::json!({"settings": self.service.get_settings()}),
        ))
    }

    fn handle_settings_patch(&self, envelope: &CommandEnvelope) -> Result<ResponseEnvelope> {
        let patch = parse_settings_patch(&envelope.payload)?;
        let settings = self.service.save_settings(&patch)?;
        self.emit_event(
            "settings.changed",
            serde_json::json!({"request_id": envelope.request_id, "settings": settings}),
        );
        Ok(ResponseEnvelope::ok(
            envelope.request_id.clone(),
            serde_json::json!({"accepted": true, "settings": settings}),
        ))
    }

    fn handle_completion_add(&self, envelope: &CommandEnvelope) -> Result<ResponseEnvelope> {
        let source = parse_completion_source(&envelope.payload)?;
        let completion = self.service.add_completion(source)?;
        let stats = self.service.get_stats();
        self.emit_event(
            "completion.added",
            serde_json::json!({
                "request_id": envelope.request_id,
                "completion": completion,
                "stats": stats,
            }),
        );
        Ok(ResponseEnvelope::ok(
            envelope.request_id.clone(),
            serde_json::json!({"accepted": true, "completion": completion, "stats": stats}),
        ))
    }

    fn handle_stats_get(&self, envelope: &CommandEnvelope) -> Result<ResponseEnvelope> {
        Ok(ResponseEnvelope::ok(
            envelope.request_id.clone(),
            serde_json::json!({"stats": self.service.get_stats()}),
        ))
    }

    fn handle_history_get(&self, envelope: &CommandEnvelope) -> Result<ResponseEnvelope> {
        Ok(ResponseEnvelope::ok(
            envelope.request_id.clone(),
            serde_json::json!({"days": self.service.get_history()}),
        ))
    }

    fn handle_reminders_enable(&self, envelope: &CommandEnvelope) -> Result<ResponseEnvelope> {
        let service = self.service.clone();
        let event_tx = self.event_tx.clone();
        let request_id = envelope.request_id.clone();
        tokio::spawn(async move {
            let payload = match service.enable_reminders().await {
                Ok(outcome) => serde_json::json!({
                    "request_id": request_id,
                    "ok": true,
                    "outcome": outcome,
                }),
                Err(e) => {
                    warn!(error = %e, "enabling reminders failed");
                    serde_json::json!({
                        "request_id": request_id,
                        "ok": false,
                        "error": e.to_string(),
                    })
                }
            };
            emit_event(&event_tx, "reminders.enable_result", payload);
        });

        Ok(ResponseEnvelope::ok(
            envelope.request_id.clone(),
            serde_json::json!({"accepted": true, "pending": true}),
        ))
    }

    fn handle_reminders_disable(&self, envelope: &CommandEnvelope) -> Result<ResponseEnvelope> {
        let settings = self.service.disable_reminders()?;
        self.emit_event(
            "reminders.disabled",
            serde_json::json!({"request_id": envelope.request_id}),
        );
        Ok(ResponseEnvelope::ok(
            envelope.request_id.clone(),
            serde_json::json!({"accepted": true, "settings": settings}),
        ))
    }

    fn handle_reminders_update_interval(
        &self,
        envelope: &CommandEnvelope,
    ) -> Result<ResponseEnvelope> {
        let minutes = parse_minutes(
            &envelope.payload,
            "interval_minutes",
            "reminders.update_interval",
        )?;
        let settings = self.service.update_interval(minutes)?;
        self.emit_event(
            "reminders.interval_updated",
            serde_json::json!({
                "request_id": envelope.request_id,
                "interval_minutes": minutes,
                "interval_label": crate::scheduler::format_interval(minutes),
                "next_scheduled_at": settings.next_scheduled_at,
            }),
        );
        Ok(ResponseEnvelope::ok(
            envelope.request_id.clone(),
            serde_json::json!({"accepted": true, "settings": settings}),
        ))
    }

    fn handle_reminders_snooze(&self, envelope: &CommandEnvelope) -> Result<ResponseEnvelope> {
        let scheduled = self.service.snooze()?;
        let snooze_minutes = self.service.get_settings().snooze_minutes;
        Ok(ResponseEnvelope::ok(
            envelope.request_id.clone(),
            serde_json::json!({
                "accepted": true,
                "scheduled": scheduled,
                "snooze_minutes": snooze_minutes,
                "hint": self.service.permission_state().hint(),
            }),
        ))
    }

    fn handle_reminders_status(&self, envelope: &CommandEnvelope) -> Result<ResponseEnvelope> {
        let status = serde_json::to_value(self.service.reminder_status())?;
        Ok(ResponseEnvelope::ok(envelope.request_id.clone(), status))
    }

    fn handle_notification_permission_status(
        &self,
        envelope: &CommandEnvelope,
    ) -> Result<ResponseEnvelope> {
        let permission = self.service.permission_state();
        Ok(ResponseEnvelope::ok(
            envelope.request_id.clone(),
            serde_json::json!({
                "permission": permission,
                "granted": self.service.has_permission(),
                "hint": permission.hint(),
            }),
        ))
    }

    fn handle_notification_permission_request(
        &self,
        envelope: &CommandEnvelope,
    ) -> Result<ResponseEnvelope> {
        let service = self.service.clone();
        let event_tx = self.event_tx.clone();
        let request_id = envelope.request_id.clone();
        tokio::spawn(async move {
            let payload = match service.request_permission().await {
                Ok(granted) => serde_json::json!({
                    "request_id": request_id,
                    "ok": true,
                    "granted": granted,
                    "permission": service.permission_state(),
                }),
                Err(e) => serde_json::json!({
                    "request_id": request_id,
                    "ok": false,
                    "error": e.to_string(),
                }),
            };
            emit_event(&event_tx, "notification.permission_result", payload);
        });

        Ok(ResponseEnvelope::ok(
            envelope.request_id.clone(),
            serde_json::json!({"accepted": true, "pending": true}),
        ))
    }

    fn handle_notification_permission_respond(
        &self,
        envelope: &CommandEnvelope,
    ) -> Result<ResponseEnvelope> {
        let granted = parse_bool(&envelope.payload, "granted", "notification.permission_respond")?;
        let notifier = self.host_notifier("notification.permission_respond")?;
        let was_pending = notifier.respond_permission(granted);
        Ok(ResponseEnvelope::ok(
            envelope.request_id.clone(),
            serde_json::json!({
                "accepted": true,
                "granted": granted,
                "was_pending": was_pending,
            }),
        ))
    }

    fn handle_notification_clicked(&self, envelope: &CommandEnvelope) -> Result<ResponseEnvelope> {
        let notification_id =
            parse_optional_string(&envelope.payload, "notification_id", "notification.clicked")?;
        let notifier = self.host_notifier("notification.clicked")?;
        let dismissed = notifier.clicked(notification_id.as_deref());
        Ok(ResponseEnvelope::ok(
            envelope.request_id.clone(),
            serde_json::json!({"accepted": true, "dismissed": dismissed}),
        ))
    }

    fn handle_runtime_stop(&self, envelope: &CommandEnvelope) -> Result<ResponseEnvelope> {
        self.service.shutdown();
        self.emit_event(
            "runtime.stopped",
            serde_json::json!({"request_id": envelope.request_id}),
        );
        Ok(ResponseEnvelope::ok(
            envelope.request_id.clone(),
            serde_json::json!({"accepted": true}),
        ))
    }

    fn host_notifier(&self, command: &str) -> Result<&HostNotifier> {
        self.notifier.as_deref().ok_or_else(|| {
            PhysioError::Notification(format!("{command} requires the host notifier"))
        })
    }

    fn emit_exercises_changed(&self, envelope: &CommandEnvelope) {
        self.emit_event(
            "exercises.changed",
            serde_json::json!({
                "request_id": envelope.request_id,
                "exercises": self.service.list_exercises(),
            }),
        );
    }

    fn emit_event(&self, event: &str, payload: serde_json::Value) {
        emit_event(&self.event_tx, event, payload);
    }
}

fn parse_exercise_list(payload: &serde_json::Value) -> Result<Vec<Exercise>> {
    let Some(raw) = payload.get("exercises") else {
        return Err(PhysioError::Validation(
            "exercises.save requires payload.exercises".to_owned(),
        ));
    };
    serde_json::from_value(raw.clone()).map_err(|e| {
        PhysioError::Validation(format!("exercises.save payload.exercises is invalid: {e}"))
    })
}

fn parse_settings_patch(payload: &serde_json::Value) -> Result<SettingsPatch> {
    if !payload.is_object() {
        return Err(PhysioError::Validation(
            "settings.patch requires an object payload".to_owned(),
        ));
    }
    let patch: SettingsPatch = serde_json::from_value(payload.clone())
        .map_err(|e| PhysioError::Validation(format!("settings.patch payload is invalid: {e}")))?;
    if patch.interval_minutes == Some(0) {
        return Err(PhysioError::InvalidInterval(0));
    }
    if patch.snooze_minutes == Some(0) {
        return Err(PhysioError::InvalidInterval(0));
    }
    Ok(patch)
}

fn parse_completion_source(payload: &serde_json::Value) -> Result<CompletionSource> {
    match payload.get("source") {
        None | Some(serde_json::Value::Null) => Ok(CompletionSource::Manual),
        Some(serde_json::Value::String(raw)) => raw
            .parse()
            .map_err(|e: String| PhysioError::Validation(format!("completion.add: {e}"))),
        Some(_) => Err(PhysioError::Validation(
            "completion.add payload.source must be a string when provided".to_owned(),
        )),
    }
}

fn parse_non_empty_field(
    payload: &serde_json::Value,
    field: &str,
    command: &str,
) -> Result<String> {
    let Some(raw) = payload.get(field).and_then(serde_json::Value::as_str) else {
        return Err(PhysioError::Validation(format!(
            "{command} requires payload.{field}"
        )));
    };
    let value = raw.trim();
    if value.is_empty() {
        return Err(PhysioError::Validation(format!(
            "{command} requires a non-empty payload.{field}"
        )));
    }
    Ok(value.to_owned())
}

fn parse_optional_string(
    payload: &serde_json::Value,
    field: &str,
    command: &str,
) -> Result<Option<String>> {
    match payload.get(field) {
        None | Some(serde_json::Value::Null) => Ok(None),
        Some(serde_json::Value::String(raw)) => Ok(Some(raw.clone())),
        Some(_) => Err(PhysioError::Validation(format!(
            "{command} payload.{field} must be a string when provided"
        ))),
    }
}

fn parse_index(payload: &serde_json::Value, field: &str, command: &str) -> Result<usize> {
    payload
        .get(field)
        .and_then(serde_json::Value::as_u64)
        .and_then(|n| usize::try_from(n).ok())
        .ok_or_else(|| {
            PhysioError::Validation(format!(
                "{command} requires payload.{field} (non-negative integer)"
            ))
        })
}

fn parse_minutes(payload: &serde_json::Value, field: &str, command: &str) -> Result<u32> {
    let Some(raw) = payload.get(field).and_then(serde_json::Value::as_u64) else {
        return Err(PhysioError::Validation(format!(
            "{command} requires payload.{field} (minutes)"
        )));
    };
    match u32::try_from(raw) {
        Ok(0) => Err(PhysioError::InvalidInterval(0)),
        Ok(minutes) => Ok(minutes),
        Err(_) => Err(PhysioError::Validation(format!(
            "{command} payload.{field} is out of range: {raw}"
        ))),
    }
}

fn parse_bool(payload: &serde_json::Value, field: &str, command: &str) -> Result<bool> {
    payload
        .get(field)
        .and_then(serde_json::Value::as_bool)
        .ok_or_else(|| {
            PhysioError::Validation(format!("{command} requires payload.{field} (bool)"))
        })
}
