//! HTTP server setup and configuration.
//!
//! # Responsibilities
//! - Create the Axum router with all handlers
//! - Wire the pipeline stages in order: security → rate limit → logging
//! - Serve with graceful shutdown
//! - Run the rate-limiter sweep task and terminate the daemon on exit

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::{
    middleware,
    routing::{get, post},
    Router,
};
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tower_http::{timeout::TimeoutLayer, trace::TraceLayer};

use crate::config::GatewayConfig;
use crate::daemon::Supervisor;
use crate::http::handlers;
use crate::observability::logging::request_logger;
use crate::security::auth::security_middleware;
use crate::security::rate_limit::{rate_limit_middleware, RateLimiter};
use crate::stores::{ArtifactStore, ToolStore};

/// Application state injected into middleware and handlers.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<GatewayConfig>,
    pub limiter: Arc<RateLimiter>,
    pub supervisor: Supervisor,
    pub artifacts: Arc<ArtifactStore>,
    pub tools: Arc<ToolStore>,
}

/// HTTP server for the agent gateway.
pub struct GatewayServer {
    router: Router,
    state: AppState,
}

impl GatewayServer {
    /// Create a new server with the given configuration.
    pub fn new(config: GatewayConfig) -> Self {
        let config = Arc::new(config);
        let state = AppState {
            limiter: Arc::new(RateLimiter::new(&config.rate_limit)),
            supervisor: Supervisor::new(config.daemon.clone()),
            artifacts: Arc::new(ArtifactStore::new(&config.stores.artifacts_path)),
            tools: Arc::new(ToolStore::new(&config.stores.tools_path)),
            config,
        };
        let router = Self::build_router(state.clone());
        Self { router, state }
    }

    /// Handle to the daemon supervisor (used by shutdown and tests).
    pub fn supervisor(&self) -> Supervisor {
        self.state.supervisor.clone()
    }

    /// Build the Axum router with all middleware layers.
    fn build_router(state: AppState) -> Router {
        let request_timeout = Duration::from_secs(state.config.server.request_timeout_secs);
        Router::new()
            .route("/health", get(handlers::health))
            .route("/api/chat", post(handlers::chat))
            .route("/api/ask", post(handlers::ask))
            .route("/api/daemon/status", get(handlers::daemon_status))
            .route("/api/daemon/caches/clear", post(handlers::clear_caches))
            .route("/api/daemon/restart", post(handlers::restart_daemon))
            .route("/api/artifacts", get(handlers::list_artifacts))
            .route("/api/artifacts/{id}", get(handlers::get_artifact))
            .route("/api/tools", get(handlers::list_tools))
            .with_state(state.clone())
            // Pipeline order (outermost last): security admits and annotates,
            // rate limiting rejects over-limit clients, the logger wraps the
            // handler so it times exactly the admitted work.
            .layer(middleware::from_fn_with_state(
                state.clone(),
                request_logger,
            ))
            .layer(middleware::from_fn_with_state(
                state.clone(),
                rate_limit_middleware,
            ))
            .layer(middleware::from_fn_with_state(state, security_middleware))
            .layer(TimeoutLayer::new(request_timeout))
            .layer(TraceLayer::new_for_http())
    }

    /// Run the server, accepting connections on the given listener.
    pub async fn run(
        self,
        listener: TcpListener,
        mut shutdown: broadcast::Receiver<()>,
    ) -> Result<(), std::io::Error> {
        let addr = listener.local_addr()?;
        tracing::info!(address = %addr, "HTTP server starting");

        // Periodic sweep keeps the rate-limit map bounded.
        let limiter = self.state.limiter.clone();
        let sweep_interval = Duration::from_secs(self.state.config.rate_limit.sweep_interval_secs);
        let sweeper = tokio::spawn(async move {
            let mut interval = tokio::time::interval(sweep_interval);
            interval.tick().await; // first tick fires immediately
            loop {
                interval.tick().await;
                limiter.sweep();
            }
        });

        let app = self
            .router
            .into_make_service_with_connect_info::<SocketAddr>();

        axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                tokio::select! {
                    _ = shutdown.recv() => {}
                    _ = tokio::signal::ctrl_c() => {}
                }
                tracing::info!("Shutdown signal received");
            })
            .await?;

        sweeper.abort();
        // No orphan agent process may outlive the gateway.
        self.state.supervisor.kill().await;

        tracing::info!("HTTP server stopped");
        Ok(())
    }
}
