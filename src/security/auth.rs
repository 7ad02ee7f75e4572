//! API key enforcement and request correlation.
//!
//! # Responsibilities
//! - Validate the API key on protected paths (exempt paths pass through)
//! - Enforce the request body size ceiling before handlers run
//! - Assign a correlation id: reuse a well-formed inbound id, else generate
//! - Attach a RequestContext for the rest of the pipeline and echo the
//!   correlation id in the response
//!
//! # Design Decisions
//! - Side effects are confined to annotating the request; no external I/O
//! - Inbound correlation ids must match a safe character set and length
//!   bound, anything else is replaced with a fresh id

use std::net::SocketAddr;
use std::time::Instant;

use axum::{
    body::Body,
    extract::{ConnectInfo, State},
    http::{HeaderValue, Request, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
};
use uuid::Uuid;

use crate::http::server::AppState;

/// Header carrying the API key.
pub const API_KEY_HEADER: &str = "x-api-key";

/// Header carrying the correlation id, inbound and echoed outbound.
pub const CORRELATION_HEADER: &str = "x-correlation-id";

const MAX_CORRELATION_ID_LEN: usize = 64;

/// Per-request context created at pipeline entry. Immutable; discarded
/// after the response completes.
#[derive(Debug, Clone)]
pub struct RequestContext {
    /// Opaque id threaded through logging and echoed to the caller.
    pub correlation_id: String,

    /// Identifier used to bucket rate-limit state (forwarded IP or peer IP).
    pub client_key: String,

    /// Arrival timestamp.
    pub received_at: Instant,

    pub method: String,
    pub path: String,
}

/// True when an inbound correlation id is safe to reuse.
pub fn is_valid_correlation_id(id: &str) -> bool {
    !id.is_empty()
        && id.len() <= MAX_CORRELATION_ID_LEN
        && id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
}

/// Derive the rate-limit client key: the first forwarded IP if present,
/// else the peer address.
fn client_key(request: &Request<Body>, peer: SocketAddr) -> String {
    request
        .headers()
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(|ip| ip.trim().to_string())
        .filter(|ip| !ip.is_empty())
        .unwrap_or_else(|| peer.ip().to_string())
}

/// Middleware stage: authenticate, size-check, and correlate the request.
pub async fn security_middleware(
    State(state): State<AppState>,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    mut request: Request<Body>,
    next: Next,
) -> Response {
    let path = request.uri().path().to_string();
    let exempt = state
        .config
        .security
        .exempt_paths
        .iter()
        .any(|p| path.starts_with(p.as_str()));

    // 1. API key check. An empty key list disables the check (dev mode).
    if !exempt && !state.config.security.api_keys.is_empty() {
        let presented = request
            .headers()
            .get(API_KEY_HEADER)
            .and_then(|v| v.to_str().ok());
        let authorized = presented
            .map(|key| state.config.security.api_keys.iter().any(|k| k == key))
            .unwrap_or(false);
        if !authorized {
            tracing::warn!(path = %path, "Rejected request with missing or invalid API key");
            return (StatusCode::UNAUTHORIZED, "Missing or invalid API key").into_response();
        }
    }

    // 2. Body size ceiling, checked before any handler reads the body.
    if let Some(length) = request
        .headers()
        .get(axum::http::header::CONTENT_LENGTH)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse::<usize>().ok())
    {
        if length > state.config.security.max_body_bytes {
            tracing::warn!(path = %path, length, "Rejected oversized request body");
            return (StatusCode::FORBIDDEN, "Request body too large").into_response();
        }
    }

    // 3. Correlation id: reuse a well-formed inbound id, else generate.
    let correlation_id = request
        .headers()
        .get(CORRELATION_HEADER)
        .and_then(|v| v.to_str().ok())
        .filter(|id| is_valid_correlation_id(id))
        .map(|id| id.to_string())
        .unwrap_or_else(|| Uuid::new_v4().to_string());

    let ctx = RequestContext {
        correlation_id: correlation_id.clone(),
        client_key: client_key(&request, peer),
        received_at: Instant::now(),
        method: request.method().to_string(),
        path,
    };
    request.extensions_mut().insert(ctx);

    let mut response = next.run(request).await;
    if let Ok(value) = HeaderValue::from_str(&correlation_id) {
        response.headers_mut().insert(CORRELATION_HEADER, value);
    }
    response
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_correlation_ids() {
        assert!(is_valid_correlation_id("abc-123"));
        assert!(is_valid_correlation_id("A_b-9"));
        assert!(is_valid_correlation_id(&"x".repeat(64)));
    }

    #[test]
    fn test_invalid_correlation_ids() {
        assert!(!is_valid_correlation_id(""));
        assert!(!is_valid_correlation_id("has space"));
        assert!(!is_valid_correlation_id("semi;colon"));
        assert!(!is_valid_correlation_id("new\nline"));
        assert!(!is_valid_correlation_id(&"x".repeat(65)));
    }

    #[test]
    fn test_client_key_prefers_forwarded_ip() {
        let peer: SocketAddr = "10.0.0.1:1234".parse().unwrap();

        let req = Request::builder()
            .header("x-forwarded-for", "203.0.113.7, 10.0.0.2")
            .body(Body::empty())
            .unwrap();
        assert_eq!(client_key(&req, peer), "203.0.113.7");

        let req = Request::builder().body(Body::empty()).unwrap();
        assert_eq!(client_key(&req, peer), "10.0.0.1");
    }
}
