//! Supervisor lifecycle tests against the real echo-agent binary: on-demand
//! spawn, event streaming, kill and respawn, single-flight cold starts, and
//! startup failure handling.

mod common;

use std::time::Duration;

use serde_json::json;

use agent_gateway::config::schema::DaemonConfig;
use agent_gateway::daemon::{DaemonError, RequestKind, Supervisor};

#[tokio::test]
async fn test_unary_roundtrip_spawns_on_demand() {
    let supervisor = Supervisor::new(common::echo_agent_config("unary"));
    assert_eq!(supervisor.generation(), 0);
    assert_eq!(supervisor.status().await.state, "absent");

    let result = supervisor
        .request("r1", RequestKind::Ask, json!({ "message": "ping" }))
        .await
        .unwrap();
    assert_eq!(result["echo"]["message"], "ping");

    assert_eq!(supervisor.generation(), 1);
    assert_eq!(supervisor.status().await.state, "ready");
    assert_eq!(supervisor.in_flight(), 0);

    supervisor.kill().await;
}

#[tokio::test]
async fn test_stream_relays_events_in_order() {
    let supervisor = Supervisor::new(common::echo_agent_config("stream"));

    let mut stream = supervisor
        .stream("r1", RequestKind::Chat, json!({ "message": "one two three" }))
        .await
        .unwrap();
    assert_eq!(supervisor.in_flight(), 1);

    let mut events = Vec::new();
    while let Some(event) = stream.next().await.unwrap() {
        events.push(event);
    }
    drop(stream);
    assert_eq!(supervisor.in_flight(), 0);

    let names: Vec<&str> = events.iter().map(|e| e.name.as_str()).collect();
    assert_eq!(names, ["message_start", "delta", "delta", "delta", "done"]);
    assert_eq!(events[1].data["text"], "one");
    assert_eq!(events[2].data["text"], "two");
    assert_eq!(events[3].data["text"], "three");

    supervisor.kill().await;
}

#[tokio::test]
async fn test_kill_then_request_spawns_fresh_process() {
    let supervisor = Supervisor::new(common::echo_agent_config("respawn"));

    supervisor
        .request("r1", RequestKind::Ask, json!({ "message": "first" }))
        .await
        .unwrap();
    assert_eq!(supervisor.generation(), 1);

    supervisor.kill().await;
    assert_eq!(supervisor.status().await.state, "absent");

    let result = supervisor
        .request("r2", RequestKind::Ask, json!({ "message": "second" }))
        .await
        .unwrap();
    assert_eq!(result["echo"]["message"], "second");
    assert_eq!(supervisor.generation(), 2);

    supervisor.kill().await;
}

#[tokio::test]
async fn test_clear_caches_on_absent_daemon_is_a_noop() {
    let supervisor = Supervisor::new(common::echo_agent_config("clear-absent"));

    let cleared = supervisor.clear_caches("r1").await.unwrap();
    assert!(!cleared);
    // Must not have spawned anything.
    assert_eq!(supervisor.generation(), 0);
    assert_eq!(supervisor.status().await.state, "absent");

    supervisor
        .request("r2", RequestKind::Ask, json!({ "message": "warm up" }))
        .await
        .unwrap();
    let cleared = supervisor.clear_caches("r3").await.unwrap();
    assert!(cleared);

    supervisor.kill().await;
}

#[tokio::test]
async fn test_concurrent_cold_requests_share_one_spawn() {
    let supervisor = Supervisor::new(common::echo_agent_config("coldstart"));

    let a = supervisor.request("ra", RequestKind::Ask, json!({ "message": "a" }));
    let b = supervisor.request("rb", RequestKind::Ask, json!({ "message": "b" }));
    let (a, b) = tokio::join!(a, b);

    assert_eq!(a.unwrap()["echo"]["message"], "a");
    assert_eq!(b.unwrap()["echo"]["message"], "b");
    assert_eq!(supervisor.generation(), 1);

    supervisor.kill().await;
}

#[tokio::test]
async fn test_startup_timeout_leaves_state_absent() {
    // A process that never binds the socket.
    let config = DaemonConfig {
        command: "sh".to_string(),
        args: vec!["-c".to_string(), "sleep 5".to_string()],
        socket_path: common::unique_socket_path("timeout"),
        startup_timeout_ms: 300,
        request_timeout_ms: 1_000,
        idle_shutdown_secs: None,
    };
    let supervisor = Supervisor::new(config);

    let err = supervisor
        .request("r1", RequestKind::Ask, json!({}))
        .await
        .unwrap_err();
    assert!(matches!(err, DaemonError::StartupFailed(_)));
    assert_eq!(supervisor.status().await.state, "absent");
}

#[tokio::test]
async fn test_unspawnable_command_reports_startup_failure() {
    let config = DaemonConfig {
        command: "/nonexistent/agent-binary".to_string(),
        args: Vec::new(),
        socket_path: common::unique_socket_path("nospawn"),
        startup_timeout_ms: 300,
        request_timeout_ms: 1_000,
        idle_shutdown_secs: None,
    };
    let supervisor = Supervisor::new(config);

    let err = supervisor
        .request("r1", RequestKind::Ask, json!({}))
        .await
        .unwrap_err();
    assert!(matches!(err, DaemonError::StartupFailed(_)));
    assert_eq!(supervisor.status().await.state, "absent");
    assert_eq!(supervisor.generation(), 1);
}

#[tokio::test]
async fn test_dropped_stream_releases_slot_and_daemon_survives() {
    let supervisor = Supervisor::new(common::echo_agent_config("cancel"));

    let message = vec!["word"; 200].join(" ");
    let mut stream = supervisor
        .stream(
            "r1",
            RequestKind::Chat,
            json!({ "message": message, "delay_ms": 50 }),
        )
        .await
        .unwrap();
    let first = stream.next().await.unwrap().unwrap();
    assert_eq!(first.name, "message_start");
    assert_eq!(supervisor.in_flight(), 1);

    // Walking away mid-stream must free the slot and hang up on the daemon.
    drop(stream);
    assert_eq!(supervisor.in_flight(), 0);

    // The daemon absorbed the hangup and keeps serving on its own process.
    let result = supervisor
        .request("r2", RequestKind::Ask, json!({ "message": "still here" }))
        .await
        .unwrap();
    assert_eq!(result["echo"]["message"], "still here");
    assert_eq!(supervisor.generation(), 1);

    supervisor.kill().await;
}

#[tokio::test]
async fn test_stalled_stream_reports_unresponsive() {
    let mut config = common::echo_agent_config("stall");
    config.request_timeout_ms = 300;
    let supervisor = Supervisor::new(config);

    let mut stream = supervisor
        .stream(
            "r1",
            RequestKind::Chat,
            json!({ "message": "a b c", "delay_ms": 5_000 }),
        )
        .await
        .unwrap();

    // The opening frame arrives immediately, then the daemon goes quiet.
    let first = stream.next().await.unwrap().unwrap();
    assert_eq!(first.name, "message_start");

    let err = stream.next().await.unwrap_err();
    assert!(matches!(err, DaemonError::Unresponsive(_)));

    drop(stream);
    supervisor.kill().await;
}

#[tokio::test]
async fn test_external_crash_fails_inflight_and_forces_absent() {
    let supervisor = Supervisor::new(common::echo_agent_config("crash"));

    supervisor
        .request("r1", RequestKind::Ask, json!({ "message": "warm" }))
        .await
        .unwrap();
    let pid = supervisor.status().await.pid.unwrap();

    // Kill the process out from under a slow in-flight call.
    let slow = supervisor.request("r2", RequestKind::Ask, json!({ "message": "slow", "delay_ms": 3_000 }));
    let crash = async {
        tokio::time::sleep(Duration::from_millis(300)).await;
        std::process::Command::new("kill")
            .args(["-9", &pid.to_string()])
            .status()
            .unwrap()
    };
    let (result, _) = tokio::join!(slow, crash);
    assert!(matches!(
        result.unwrap_err(),
        DaemonError::ConnectionClosed | DaemonError::Io(_)
    ));

    // The monitor reaps the dead process on a later tick.
    tokio::time::sleep(Duration::from_millis(1_500)).await;
    assert_eq!(supervisor.status().await.state, "absent");

    // A subsequent request spawns a fresh generation.
    let result = supervisor
        .request("r3", RequestKind::Ask, json!({ "message": "again" }))
        .await
        .unwrap();
    assert_eq!(result["echo"]["message"], "again");
    assert_eq!(supervisor.generation(), 2);

    supervisor.kill().await;
}

#[tokio::test]
async fn test_idle_shutdown_terminates_then_respawns() {
    let mut config = common::echo_agent_config("idle");
    config.idle_shutdown_secs = Some(1);
    let supervisor = Supervisor::new(config);

    supervisor
        .request("r1", RequestKind::Ask, json!({ "message": "hi" }))
        .await
        .unwrap();
    assert_eq!(supervisor.status().await.state, "ready");

    // The monitor checks every 500ms; give it time to observe the idle gap.
    tokio::time::sleep(Duration::from_millis(2_500)).await;
    assert_eq!(supervisor.status().await.state, "absent");
    assert_eq!(supervisor.generation(), 1);

    let result = supervisor
        .request("r2", RequestKind::Ask, json!({ "message": "back" }))
        .await
        .unwrap();
    assert_eq!(result["echo"]["message"], "back");
    assert_eq!(supervisor.generation(), 2);

    supervisor.kill().await;
}
