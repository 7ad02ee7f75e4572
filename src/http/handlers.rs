//! Request handlers.
//!
//! Thin dispatch only: every handler validates its input, calls into the
//! daemon client or a metadata store, and maps errors to HTTP statuses.
//! No handler touches the process handle directly.

use std::convert::Infallible;
use std::pin::Pin;
use std::time::Duration;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{
        sse::{Event, KeepAlive, KeepAliveStream, Sse},
        IntoResponse, Response,
    },
    Extension, Json,
};
use futures_util::Stream;
use serde::Deserialize;
use serde_json::json;

use crate::daemon::{DaemonError, RequestKind};
use crate::http::server::AppState;
use crate::security::auth::RequestContext;
use crate::security::sanitize;
use crate::stores::StoreError;

const SSE_KEEPALIVE: Duration = Duration::from_secs(15);

/// Handler-level failures mapped to HTTP statuses.
#[derive(Debug)]
pub enum ApiError {
    Daemon(DaemonError),
    InputRejected(String),
    NotFound(&'static str),
    Store(StoreError),
}

impl From<DaemonError> for ApiError {
    fn from(e: DaemonError) -> Self {
        ApiError::Daemon(e)
    }
}

impl From<StoreError> for ApiError {
    fn from(e: StoreError) -> Self {
        ApiError::Store(e)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match &self {
            // An unresponsive daemon is a timeout; everything else on the
            // daemon path is a bad upstream.
            ApiError::Daemon(DaemonError::Unresponsive(_)) => {
                (StatusCode::GATEWAY_TIMEOUT, self.to_string())
            }
            ApiError::Daemon(_) => (StatusCode::BAD_GATEWAY, self.to_string()),
            ApiError::InputRejected(msg) => (StatusCode::FORBIDDEN, msg.clone()),
            ApiError::NotFound(what) => (StatusCode::NOT_FOUND, format!("{what} not found")),
            ApiError::Store(_) => (StatusCode::INTERNAL_SERVER_ERROR, self.to_string()),
        };
        (status, Json(json!({ "error": message }))).into_response()
    }
}

impl std::fmt::Display for ApiError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ApiError::Daemon(e) => write!(f, "{}", e),
            ApiError::InputRejected(msg) => write!(f, "input rejected: {}", msg),
            ApiError::NotFound(what) => write!(f, "{} not found", what),
            ApiError::Store(e) => write!(f, "{}", e),
        }
    }
}

/// Liveness probe. Exempt from auth and skipped by the request logger.
pub async fn health() -> impl IntoResponse {
    Json(json!({ "status": "ok" }))
}

#[derive(Debug, Deserialize)]
pub struct ChatRequest {
    pub message: String,
    #[serde(default)]
    pub session_id: Option<String>,
}

type EventStream = Pin<Box<dyn Stream<Item = Result<Event, Infallible>> + Send + 'static>>;

/// Streaming chat turn: forwards the message to the daemon and relays its
/// event stream to the caller. Dropping the response (client disconnect)
/// drops the upstream connection, which cancels the daemon-side read.
pub async fn chat(
    State(state): State<AppState>,
    Extension(ctx): Extension<RequestContext>,
    Json(body): Json<ChatRequest>,
) -> Result<Sse<KeepAliveStream<EventStream>>, ApiError> {
    let message =
        sanitize::clean_text(&body.message).map_err(|e| ApiError::InputRejected(e.to_string()))?;

    let mut upstream = state
        .supervisor
        .stream(
            &ctx.correlation_id,
            RequestKind::Chat,
            json!({ "message": message, "session_id": body.session_id }),
        )
        .await?;

    let request_id = ctx.correlation_id.clone();
    let stream = async_stream::stream! {
        loop {
            match upstream.next().await {
                Ok(Some(event)) => {
                    yield Ok(Event::default().event(event.name).data(event.data.to_string()));
                }
                Ok(None) => break,
                Err(e) => {
                    // Mid-stream upstream loss: the stream simply ends; the
                    // client sees a truncated event sequence.
                    tracing::warn!(request_id = %request_id, error = %e, "Chat relay interrupted");
                    break;
                }
            }
        }
    };

    Ok(Sse::new(Box::pin(stream) as EventStream)
        .keep_alive(KeepAlive::new().interval(SSE_KEEPALIVE)))
}

/// Unary agent call: single JSON payload in, single JSON result out.
pub async fn ask(
    State(state): State<AppState>,
    Extension(ctx): Extension<RequestContext>,
    Json(payload): Json<serde_json::Value>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let payload = match payload {
        serde_json::Value::Object(mut map) => {
            if let Some(serde_json::Value::String(text)) = map.get("message") {
                let cleaned = sanitize::clean_text(text)
                    .map_err(|e| ApiError::InputRejected(e.to_string()))?;
                map.insert("message".to_string(), serde_json::Value::String(cleaned));
            }
            serde_json::Value::Object(map)
        }
        other => other,
    };

    let result = state
        .supervisor
        .request(&ctx.correlation_id, RequestKind::Ask, payload)
        .await?;
    Ok(Json(result))
}

/// Supervisor state snapshot.
pub async fn daemon_status(State(state): State<AppState>) -> impl IntoResponse {
    Json(state.supervisor.status().await)
}

/// Clear the daemon's caches. Success even when no process is running;
/// never spawns one.
pub async fn clear_caches(
    State(state): State<AppState>,
    Extension(ctx): Extension<RequestContext>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let cleared = state.supervisor.clear_caches(&ctx.correlation_id).await?;
    Ok(Json(json!({ "cleared": cleared })))
}

/// Compound operation: clear caches, then force-terminate the process so
/// the next request re-spawns with clean state.
pub async fn restart_daemon(
    State(state): State<AppState>,
    Extension(ctx): Extension<RequestContext>,
) -> Json<serde_json::Value> {
    let cleared = match state.supervisor.clear_caches(&ctx.correlation_id).await {
        Ok(cleared) => cleared,
        Err(e) => {
            // The kill below still gives the caller a fresh process.
            tracing::warn!(request_id = %ctx.correlation_id, error = %e, "Cache clear failed before restart");
            false
        }
    };
    state.supervisor.kill().await;
    Json(json!({ "cleared": cleared, "killed": true }))
}

/// Artifact listing for the control panel's browser.
pub async fn list_artifacts(
    State(state): State<AppState>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let artifacts = state.artifacts.list()?;
    Ok(Json(json!({ "artifacts": artifacts })))
}

/// Single artifact lookup.
pub async fn get_artifact(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<serde_json::Value>, ApiError> {
    match state.artifacts.get(&id)? {
        Some(artifact) => Ok(Json(json!(artifact))),
        None => Err(ApiError::NotFound("artifact")),
    }
}

/// Tool listing for the control panel's tool manager.
pub async fn list_tools(State(state): State<AppState>) -> Result<Json<serde_json::Value>, ApiError> {
    let tools = state.tools.list()?;
    Ok(Json(json!({ "tools": tools })))
}
