//! Per-client rate limiting with independent buckets.
//!
//! # Responsibilities
//! - Track request counts per (client key, bucket) over a fixed window
//! - Reject over-limit requests with a retry hint
//! - Evict stale windows to bound memory
//!
//! # Design Decisions
//! - Fixed-window counter: windows reset lazily on first access after expiry,
//!   no background thread is required for correctness
//! - Admission increments state even if the handler later fails; the limiter
//!   governs attempted load, not success
//! - A periodic sweep removes idle entries so the map stays bounded

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use axum::{
    body::Body,
    http::{Request, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
};
use axum::extract::State;
use serde_json::json;

use crate::config::schema::RateLimitConfig;
use crate::http::server::AppState;
use crate::observability::metrics;
use crate::security::auth::RequestContext;

/// Named rate-limit policies. Chat calls are expensive for the backend
/// daemon, so they get their own lower ceiling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Bucket {
    General,
    Chat,
}

impl Bucket {
    pub fn as_str(&self) -> &'static str {
        match self {
            Bucket::General => "general",
            Bucket::Chat => "chat",
        }
    }
}

/// Outcome of an admission check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Admission {
    pub allowed: bool,
    /// Time until the window resets, set only when rejected. Always positive.
    pub retry_after_ms: Option<u64>,
}

struct Window {
    count: u32,
    started: Instant,
}

#[derive(Debug, Clone, Copy)]
struct Policy {
    limit: u32,
    window: Duration,
}

/// Tracks request counts per (client key, bucket).
pub struct RateLimiter {
    windows: Mutex<HashMap<(String, Bucket), Window>>,
    general: Policy,
    chat: Policy,
}

impl RateLimiter {
    pub fn new(config: &RateLimitConfig) -> Self {
        Self {
            windows: Mutex::new(HashMap::new()),
            general: Policy {
                limit: config.general.limit,
                window: Duration::from_millis(config.general.window_ms),
            },
            chat: Policy {
                limit: config.chat.limit,
                window: Duration::from_millis(config.chat.window_ms),
            },
        }
    }

    fn policy(&self, bucket: Bucket) -> Policy {
        match bucket {
            Bucket::General => self.general,
            Bucket::Chat => self.chat,
        }
    }

    /// Admit or reject one request for the given client key and bucket.
    ///
    /// A brand-new client key has an implicit zero count; an expired window
    /// is treated as fresh on first access.
    pub fn admit(&self, client_key: &str, bucket: Bucket) -> Admission {
        let policy = self.policy(bucket);
        let now = Instant::now();

        let mut windows = self.windows.lock().expect("rate limiter mutex poisoned");
        let window = windows
            .entry((client_key.to_string(), bucket))
            .or_insert(Window {
                count: 0,
                started: now,
            });

        if now.duration_since(window.started) >= policy.window {
            window.count = 0;
            window.started = now;
        }

        window.count += 1;
        if window.count > policy.limit {
            let elapsed = now.duration_since(window.started);
            let remaining = policy.window.saturating_sub(elapsed);
            Admission {
                allowed: false,
                retry_after_ms: Some((remaining.as_millis() as u64).max(1)),
            }
        } else {
            Admission {
                allowed: true,
                retry_after_ms: None,
            }
        }
    }

    /// Remove windows that expired at least one full window ago.
    pub fn sweep(&self) {
        let now = Instant::now();
        let mut windows = self.windows.lock().expect("rate limiter mutex poisoned");
        windows.retain(|(_, bucket), window| {
            let policy = match bucket {
                Bucket::General => self.general,
                Bucket::Chat => self.chat,
            };
            now.duration_since(window.started) < policy.window * 2
        });
    }

    /// Number of tracked windows (for tests and status).
    pub fn tracked_entries(&self) -> usize {
        self.windows.lock().expect("rate limiter mutex poisoned").len()
    }
}

/// Middleware stage: bill the request against the matching bucket and
/// short-circuit with 429 when the client is over its limit.
pub async fn rate_limit_middleware(
    State(state): State<AppState>,
    request: Request<Body>,
    next: Next,
) -> Response {
    let client_key = request
        .extensions()
        .get::<RequestContext>()
        .map(|ctx| ctx.client_key.clone())
        .unwrap_or_else(|| "unknown".to_string());

    let path = request.uri().path();
    let bucket = if state
        .config
        .rate_limit
        .chat_paths
        .iter()
        .any(|p| path.starts_with(p.as_str()))
    {
        Bucket::Chat
    } else {
        Bucket::General
    };

    let admission = state.limiter.admit(&client_key, bucket);
    if admission.allowed {
        return next.run(request).await;
    }

    let retry_after_ms = admission.retry_after_ms.unwrap_or(1);
    tracing::warn!(
        client = %client_key,
        bucket = bucket.as_str(),
        retry_after_ms,
        "Rate limit exceeded"
    );
    metrics::record_rate_limited(bucket.as_str());

    let body = json!({
        "error": "rate limit exceeded",
        "retryAfterMs": retry_after_ms,
    });
    let mut response = (StatusCode::TOO_MANY_REQUESTS, axum::Json(body)).into_response();
    if let Ok(value) = retry_after_ms.div_ceil(1000).to_string().parse() {
        response.headers_mut().insert("retry-after", value);
    }
    response
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::schema::BucketConfig;

    fn limiter(general: (u32, u64), chat: (u32, u64)) -> RateLimiter {
        RateLimiter::new(&RateLimitConfig {
            general: BucketConfig {
                limit: general.0,
                window_ms: general.1,
            },
            chat: BucketConfig {
                limit: chat.0,
                window_ms: chat.1,
            },
            ..RateLimitConfig::default()
        })
    }

    #[test]
    fn test_rejects_after_limit_with_positive_hint() {
        let limiter = limiter((3, 60_000), (1, 60_000));

        for _ in 0..3 {
            assert!(limiter.admit("c1", Bucket::General).allowed);
        }
        let rejected = limiter.admit("c1", Bucket::General);
        assert!(!rejected.allowed);
        assert!(rejected.retry_after_ms.unwrap() > 0);
    }

    #[test]
    fn test_distinct_clients_do_not_interfere() {
        let limiter = limiter((2, 60_000), (1, 60_000));

        assert!(limiter.admit("c1", Bucket::General).allowed);
        assert!(limiter.admit("c1", Bucket::General).allowed);
        assert!(!limiter.admit("c1", Bucket::General).allowed);

        // c2 still has its full budget
        assert!(limiter.admit("c2", Bucket::General).allowed);
        assert!(limiter.admit("c2", Bucket::General).allowed);
    }

    #[test]
    fn test_buckets_are_independent() {
        let limiter = limiter((10, 60_000), (1, 60_000));

        assert!(limiter.admit("c1", Bucket::Chat).allowed);
        assert!(!limiter.admit("c1", Bucket::Chat).allowed);
        // General bucket untouched by chat spend
        assert!(limiter.admit("c1", Bucket::General).allowed);
    }

    #[test]
    fn test_expired_window_resets_lazily() {
        let limiter = limiter((1, 30), (1, 30));

        assert!(limiter.admit("c1", Bucket::General).allowed);
        assert!(!limiter.admit("c1", Bucket::General).allowed);

        std::thread::sleep(Duration::from_millis(40));
        assert!(limiter.admit("c1", Bucket::General).allowed);
    }

    #[test]
    fn test_sweep_evicts_stale_entries() {
        let limiter = limiter((1, 10), (1, 10));

        limiter.admit("c1", Bucket::General);
        limiter.admit("c2", Bucket::Chat);
        assert_eq!(limiter.tracked_entries(), 2);

        std::thread::sleep(Duration::from_millis(30));
        limiter.sweep();
        assert_eq!(limiter.tracked_entries(), 0);
    }
}
