//! Shared utilities for integration tests.

use std::sync::atomic::{AtomicU32, Ordering};

use tokio::net::TcpListener;

use agent_gateway::config::schema::DaemonConfig;
use agent_gateway::{GatewayConfig, GatewayServer, Shutdown};

static SOCKET_SEQ: AtomicU32 = AtomicU32::new(0);

/// Unique socket path per test so parallel tests never share a daemon.
pub fn unique_socket_path(tag: &str) -> String {
    let seq = SOCKET_SEQ.fetch_add(1, Ordering::SeqCst);
    std::env::temp_dir()
        .join(format!(
            "agent-gw-test-{}-{}-{}.sock",
            tag,
            std::process::id(),
            seq
        ))
        .to_string_lossy()
        .into_owned()
}

/// Daemon config pointing at the echo-agent test binary.
pub fn echo_agent_config(tag: &str) -> DaemonConfig {
    DaemonConfig {
        command: env!("CARGO_BIN_EXE_echo-agent").to_string(),
        args: Vec::new(),
        socket_path: unique_socket_path(tag),
        startup_timeout_ms: 10_000,
        request_timeout_ms: 5_000,
        idle_shutdown_secs: None,
    }
}

/// Start a gateway on an ephemeral port. Returns the base URL and the
/// shutdown handle; dropping the handle leaves the server running for the
/// remainder of the test process, so keep it alive until the test ends.
#[allow(dead_code)]
pub async fn start_gateway(config: GatewayConfig) -> (String, Shutdown) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let shutdown = Shutdown::new();
    let rx = shutdown.subscribe();
    let server = GatewayServer::new(config);
    tokio::spawn(async move {
        let _ = server.run(listener, rx).await;
    });

    (format!("http://{}", addr), shutdown)
}
