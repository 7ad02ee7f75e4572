//! Agent Gateway (binary entry point)
//!
//! Exposes a local agent runtime over HTTP. The request pipeline
//! authenticates, rate-limits, and logs every inbound call; chat endpoints
//! relay the supervised agent daemon's event stream back to the caller.

use std::path::PathBuf;

use tokio::net::TcpListener;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use agent_gateway::config::loader::load_config;
use agent_gateway::{GatewayConfig, GatewayServer, Shutdown};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load configuration: explicit path argument, else defaults.
    let config = match std::env::args().nth(1) {
        Some(path) => load_config(&PathBuf::from(path))?,
        None => GatewayConfig::default(),
    };

    // Initialize tracing subscriber
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                format!(
                    "agent_gateway={},tower_http=info",
                    config.observability.log_level
                )
                .into()
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("agent-gateway v0.1.0 starting");
    tracing::info!(
        bind_address = %config.server.bind_address,
        general_limit = config.rate_limit.general.limit,
        chat_limit = config.rate_limit.chat.limit,
        daemon_command = %config.daemon.command,
        "Configuration loaded"
    );

    // Initialize metrics exporter
    if config.observability.metrics_enabled {
        if let Ok(addr) = config.observability.metrics_address.parse() {
            agent_gateway::observability::metrics::init_metrics(addr);
        } else {
            tracing::error!(
                metrics_address = %config.observability.metrics_address,
                "Failed to parse metrics address"
            );
        }
    }

    // Bind TCP listener
    let listener = TcpListener::bind(&config.server.bind_address).await?;
    tracing::info!(address = %listener.local_addr()?, "Listening for connections");

    // Create and run the gateway
    let shutdown = Shutdown::new();
    let server = GatewayServer::new(config);
    server.run(listener, shutdown.subscribe()).await?;

    tracing::info!("Shutdown complete");
    Ok(())
}
