//! Host command channel driven end to end through the client.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use physio_buddy::host::channel::{HostCommandClient, command_channel_with_events};
use physio_buddy::host::contract::{CommandEnvelope, CommandName, EventEnvelope};
use physio_buddy::{HostNotifier, PermissionState, RoutineService, Storage};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;

struct Host {
    client: HostCommandClient,
    events: broadcast::Receiver<EventEnvelope>,
    service: RoutineService,
}

fn start_host(permission: PermissionState) -> Host {
    let (event_tx, _) = broadcast::channel(64);
    let notifier = Arc::new(HostNotifier::new(event_tx.clone(), permission));
    let service = RoutineService::with_defaults(Storage::in_memory(), notifier.clone());
    let (client, server) =
        command_channel_with_events(16, event_tx, service.clone(), Some(notifier));
    let events = client.subscribe_events();
    tokio::spawn(server.run());
    Host {
        client,
        events,
        service,
    }
}

async fn send(host: &Host, id: &str, command: CommandName, payload: serde_json::Value) -> serde_json::Value {
    let resp = host
        .client
        .send(CommandEnvelope::new(id, command, payload))
        .await
        .unwrap();
    assert_eq!(resp.request_id, id);
    serde_json::to_value(resp).unwrap()
}

async fn next_event(host: &mut Host, name: &str) -> EventEnvelope {
    loop {
        let event = tokio::time::timeout(Duration::from_secs(5), host.events.recv())
            .await
            .expect("timed out waiting for event")
            .expect("event channel closed");
        if event.event == name {
            return event;
        }
    }
}

#[tokio::test]
async fn enable_asks_for_permission_and_arms_after_grant() {
    let mut host = start_host(PermissionState::Default);

    let resp = send(&host, "enable-1", CommandName::RemindersEnable, serde_json::json!({})).await;
    assert_eq!(resp["ok"], true);
    assert_eq!(resp["payload"]["pending"], true);

    next_event(&mut host, "notification.permission_requested").await;

    let resp = send(
        &host,
        "respond-1",
        CommandName::NotificationPermissionRespond,
        serde_json::json!({"granted": true}),
    )
    .await;
    assert_eq!(resp["payload"]["was_pending"], true);

    let result = next_event(&mut host, "reminders.enable_result").await;
    assert_eq!(result.payload["request_id"], "enable-1");
    assert_eq!(result.payload["outcome"]["enabled"], true);
    assert!(result.payload["outcome"]["nextScheduledAt"].is_string());

    let status = send(&host, "status-1", CommandName::RemindersStatus, serde_json::json!({})).await;
    assert_eq!(status["payload"]["enabled"], true);
    assert_eq!(status["payload"]["armed"], true);
    assert_eq!(status["payload"]["permission"], "granted");
    assert_eq!(
        status["payload"]["intervalPresets"],
        serde_json::json!([15, 30, 60, 90, 120, 180])
    );

    let patched = send(
        &host,
        "patch-off",
        CommandName::SettingsPatch,
        serde_json::json!({"remindersEnabled": false}),
    )
    .await;
    assert_eq!(patched["ok"], true);
    assert!(patched["payload"]["settings"].get("nextScheduledAt").is_none());
    let status = send(&host, "status-2", CommandName::RemindersStatus, serde_json::json!({})).await;
    assert_eq!(status["payload"]["enabled"], false);
    assert_eq!(status["payload"]["armed"], false);
}

#[tokio::test]
async fn enable_refused_keeps_reminders_off() {
    let mut host = start_host(PermissionState::Default);

    send(&host, "enable-2", CommandName::RemindersEnable, serde_json::json!({})).await;
    next_event(&mut host, "notification.permission_requested").await;
    send(
        &host,
        "respond-2",
        CommandName::NotificationPermissionRespond,
        serde_json::json!({"granted": false}),
    )
    .await;

    let result = next_event(&mut host, "reminders.enable_result").await;
    assert_eq!(result.payload["outcome"]["enabled"], false);
    assert!(result.payload["outcome"]["hint"].is_string());
    assert!(!host.service.get_settings().reminders_enabled);

    let resp = send(
        &host,
        "perm-2",
        CommandName::NotificationPermissionStatus,
        serde_json::json!({}),
    )
    .await;
    assert_eq!(resp["payload"]["permission"], "denied");
    assert_eq!(resp["payload"]["granted"], false);
}

#[tokio::test]
async fn second_permission_request_while_pending_reports_error() {
    let mut host = start_host(PermissionState::Default);

    send(&host, "ask-1", CommandName::NotificationPermissionRequest, serde_json::json!({})).await;
    next_event(&mut host, "notification.permission_requested").await;
    send(&host, "ask-2", CommandName::NotificationPermissionRequest, serde_json::json!({})).await;

    let second = next_event(&mut host, "notification.permission_result").await;
    assert_eq!(second.payload["request_id"], "ask-2");
    assert_eq!(second.payload["ok"], false);

    send(
        &host,
        "respond-3",
        CommandName::NotificationPermissionRespond,
        serde_json::json!({"granted": true}),
    )
    .await;
    let first = next_event(&mut host, "notification.permission_result").await;
    assert_eq!(first.payload["request_id"], "ask-1");
    assert_eq!(first.payload["granted"], true);
}

#[tokio::test]
async fn exercise_commands_emit_change_events() {
    let mut host = start_host(PermissionState::Granted);

    let a = send(
        &host,
        "add-a",
        CommandName::ExercisesAdd,
        serde_json::json!({"name": "Squats"}),
    )
    .await;
    let a_id = a["payload"]["exercise"]["id"].as_str().unwrap().to_owned();
    send(
        &host,
        "add-b",
        CommandName::ExercisesAdd,
        serde_json::json!({"name": "Lunges", "note": "each leg"}),
    )
    .await;

    let moved = send(
        &host,
        "move",
        CommandName::ExercisesMove,
        serde_json::json!({"from": 1, "to": 0}),
    )
    .await;
    assert_eq!(moved["payload"]["exercises"][0]["name"], "Lunges");
    assert_eq!(moved["payload"]["exercises"][1]["position"], 1);

    let updated = send(
        &host,
        "update",
        CommandName::ExercisesUpdate,
        serde_json::json!({"id": a_id, "name": "Goblet squats", "note": ""}),
    )
    .await;
    assert_eq!(updated["payload"]["exercise"]["name"], "Goblet squats");
    assert!(updated["payload"]["exercise"].get("note").is_none());

    send(
        &host,
        "delete",
        CommandName::ExercisesDelete,
        serde_json::json!({"id": a_id}),
    )
    .await;

    let mut changes = 0;
    while changes < 5 {
        next_event(&mut host, "exercises.changed").await;
        changes += 1;
    }

    let listed = send(&host, "list", CommandName::ExercisesList, serde_json::json!({})).await;
    let names: Vec<&str> = listed["payload"]["exercises"]
        .as_array()
        .unwrap()
        .iter()
        .map(|e| e["name"].as_str().unwrap())
        .collect();
    assert_eq!(names, ["Lunges"]);

    let missing = send(
        &host,
        "delete-again",
        CommandName::ExercisesDelete,
        serde_json::json!({"id": a_id}),
    )
    .await;
    assert_eq!(missing["ok"], false);
    assert!(missing["error"].as_str().unwrap().contains("not found"));
}

#[tokio::test]
async fn completion_and_stats_round_trip() {
    let host = start_host(PermissionState::Granted);

    send(
        &host,
        "done-1",
        CommandName::CompletionAdd,
        serde_json::json!({"source": "notification"}),
    )
    .await;
    send(&host, "done-2", CommandName::CompletionAdd, serde_json::json!({})).await;

    let stats = send(&host, "stats", CommandName::StatsGet, serde_json::json!({})).await;
    assert_eq!(stats["payload"]["stats"]["today"], 2);
    assert_eq!(stats["payload"]["stats"]["sevenDays"], 2);
    assert_eq!(stats["payload"]["stats"]["allTime"], 2);

    let history = send(&host, "history", CommandName::HistoryGet, serde_json::json!({})).await;
    let days = history["payload"]["days"].as_array().unwrap();
    assert_eq!(days.len(), 1);
    assert_eq!(days[0]["completions"][0]["source"], "manual");
}

#[tokio::test]
async fn shown_reminder_click_focuses_app() {
    let mut host = start_host(PermissionState::Granted);

    send(
        &host,
        "patch",
        CommandName::SettingsPatch,
        serde_json::json!({"snoozeMinutes": 1}),
    )
    .await;
    let snooze = send(&host, "snooze", CommandName::RemindersSnooze, serde_json::json!({})).await;
    assert_eq!(snooze["payload"]["scheduled"], true);
    assert_eq!(snooze["payload"]["snooze_minutes"], 1);

    for _ in 0..4 {
        tokio::task::yield_now().await;
    }
    tokio::time::pause();
    tokio::time::advance(Duration::from_secs(61)).await;
    tokio::time::resume();

    let shown = next_event(&mut host, "notification.show").await;
    assert_eq!(shown.payload["title"], "Physio reminder (snoozed)");
    let id = shown.payload["notification_id"].as_str().unwrap().to_owned();

    let clicked = send(
        &host,
        "click",
        CommandName::NotificationClicked,
        serde_json::json!({"notification_id": id}),
    )
    .await;
    assert_eq!(clicked["payload"]["dismissed"], true);
    next_event(&mut host, "app.focus_requested").await;
    let dismissed = next_event(&mut host, "notification.dismissed").await;
    assert_eq!(dismissed.payload["reason"], "clicked");
}
