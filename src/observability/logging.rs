//! Per-request access logging.
//!
//! # Responsibilities
//! - Emit exactly one structured log line when a response is finalized,
//!   whether the handler returned, failed, or the client disconnected early
//! - Select severity: 5xx → error, 4xx or slow → warn, else info
//! - Skip configured path prefixes (liveness probes) entirely
//!
//! # Design Decisions
//! - The guard rides inside the response body, so finalization happens when
//!   the last body byte is produced (or the body is dropped), not at header
//!   time. Streamed responses log their true duration and byte count.
//! - A drop guard covers the early-disconnect case at any point: before the
//!   handler returns or mid-body, Drop still emits the line
//! - Emission is synchronous bookkeeping only, never I/O on the write path

use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::{Duration, Instant};

use axum::{
    body::{Body, Bytes},
    extract::State,
    http::{HeaderMap, Request},
    middleware::Next,
    response::Response,
};
use http_body::{Frame, SizeHint};
use tracing::Level;

use crate::http::server::AppState;
use crate::observability::metrics;
use crate::security::auth::RequestContext;

const MAX_USER_AGENT_LEN: usize = 64;

/// Status recorded when the client disconnected before a response existed.
/// Follows the nginx convention for "client closed request".
const STATUS_CLIENT_CLOSED: u16 = 499;

/// One completed request, constructed at response finalization and
/// immediately emitted.
#[derive(Debug, Clone)]
pub struct LogEntry {
    pub request_id: String,
    pub method: String,
    pub path: String,
    pub status: u16,
    pub latency_ms: u64,
    pub client_ip: String,
    pub user_agent: String,
    pub request_bytes: u64,
    pub response_bytes: u64,
}

/// Pick the log level for a finished request.
fn severity(status: u16, latency: Duration, slow_threshold: Duration) -> Level {
    if status >= 500 {
        Level::ERROR
    } else if status >= 400 || latency > slow_threshold {
        Level::WARN
    } else {
        Level::INFO
    }
}

fn emit(entry: &LogEntry, slow_threshold: Duration) {
    let latency = Duration::from_millis(entry.latency_ms);
    match severity(entry.status, latency, slow_threshold) {
        Level::ERROR => tracing::error!(
            request_id = %entry.request_id,
            method = %entry.method,
            path = %entry.path,
            status = entry.status,
            latency_ms = entry.latency_ms,
            client_ip = %entry.client_ip,
            user_agent = %entry.user_agent,
            request_bytes = entry.request_bytes,
            response_bytes = entry.response_bytes,
            "request completed"
        ),
        Level::WARN => tracing::warn!(
            request_id = %entry.request_id,
            method = %entry.method,
            path = %entry.path,
            status = entry.status,
            latency_ms = entry.latency_ms,
            client_ip = %entry.client_ip,
            user_agent = %entry.user_agent,
            request_bytes = entry.request_bytes,
            response_bytes = entry.response_bytes,
            "request completed"
        ),
        _ => tracing::info!(
            request_id = %entry.request_id,
            method = %entry.method,
            path = %entry.path,
            status = entry.status,
            latency_ms = entry.latency_ms,
            client_ip = %entry.client_ip,
            user_agent = %entry.user_agent,
            request_bytes = entry.request_bytes,
            response_bytes = entry.response_bytes,
            "request completed"
        ),
    }
}

/// Guard that guarantees exactly one LogEntry per wrapped request.
///
/// `complete` consumes the pending entry on the normal path; if the guard is
/// dropped first (request future cancelled, or the response body dropped
/// mid-stream), Drop emits the entry with a client-closed status.
struct LogGuard {
    pending: Option<LogEntry>,
    started: Instant,
    slow_threshold: Duration,
}

impl LogGuard {
    fn new(entry: LogEntry, started: Instant, slow_threshold: Duration) -> Self {
        Self {
            pending: Some(entry),
            started,
            slow_threshold,
        }
    }

    fn complete(&mut self, status: u16, response_bytes: u64) {
        if let Some(mut entry) = self.pending.take() {
            entry.status = status;
            entry.latency_ms = self.started.elapsed().as_millis() as u64;
            entry.response_bytes = response_bytes;
            emit(&entry, self.slow_threshold);
            metrics::record_request(&entry.method, entry.status, self.started);
        }
    }
}

impl Drop for LogGuard {
    fn drop(&mut self) {
        if let Some(mut entry) = self.pending.take() {
            entry.status = STATUS_CLIENT_CLOSED;
            entry.latency_ms = self.started.elapsed().as_millis() as u64;
            emit(&entry, self.slow_threshold);
            metrics::record_request(&entry.method, entry.status, self.started);
        }
    }
}

/// Response body wrapper that carries the LogGuard to the true end of the
/// request: the entry is completed when the last frame is produced, and the
/// guard's Drop covers a body discarded mid-stream (client disconnect), which
/// is logged as client-closed even though headers already went out.
struct LoggedBody {
    inner: Body,
    guard: LogGuard,
    status: u16,
    bytes: u64,
}

impl http_body::Body for LoggedBody {
    type Data = Bytes;
    type Error = axum::Error;

    fn poll_frame(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
    ) -> Poll<Option<Result<Frame<Self::Data>, Self::Error>>> {
        let this = self.get_mut();
        match http_body::Body::poll_frame(Pin::new(&mut this.inner), cx) {
            Poll::Ready(Some(Ok(frame))) => {
                if let Some(data) = frame.data_ref() {
                    this.bytes += data.len() as u64;
                }
                Poll::Ready(Some(Ok(frame)))
            }
            Poll::Ready(Some(Err(e))) => {
                this.guard.complete(this.status, this.bytes);
                Poll::Ready(Some(Err(e)))
            }
            Poll::Ready(None) => {
                this.guard.complete(this.status, this.bytes);
                Poll::Ready(None)
            }
            Poll::Pending => Poll::Pending,
        }
    }

    fn is_end_stream(&self) -> bool {
        http_body::Body::is_end_stream(&self.inner)
    }

    fn size_hint(&self) -> SizeHint {
        http_body::Body::size_hint(&self.inner)
    }
}

fn content_length(headers: &HeaderMap) -> u64 {
    headers
        .get(axum::http::header::CONTENT_LENGTH)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse().ok())
        .unwrap_or(0)
}

fn truncated_user_agent(headers: &HeaderMap) -> String {
    let ua = headers
        .get(axum::http::header::USER_AGENT)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("-");
    if ua.len() > MAX_USER_AGENT_LEN {
        ua.chars().take(MAX_USER_AGENT_LEN).collect()
    } else {
        ua.to_string()
    }
}

/// Middleware stage: wrap the rest of the pipeline in a LogGuard.
pub async fn request_logger(
    State(state): State<AppState>,
    request: Request<Body>,
    next: Next,
) -> Response {
    let path = request.uri().path();
    if state
        .config
        .logging
        .skip_paths
        .iter()
        .any(|p| path.starts_with(p.as_str()))
    {
        return next.run(request).await;
    }

    let ctx = request.extensions().get::<RequestContext>().cloned();
    let (request_id, client_ip) = match &ctx {
        Some(c) => (c.correlation_id.clone(), c.client_key.clone()),
        None => ("-".to_string(), "-".to_string()),
    };
    let started = Instant::now();
    let slow_threshold = Duration::from_millis(state.config.logging.slow_threshold_ms);

    let entry = LogEntry {
        request_id,
        method: request.method().to_string(),
        path: path.to_string(),
        status: 0,
        latency_ms: 0,
        client_ip,
        user_agent: truncated_user_agent(request.headers()),
        request_bytes: content_length(request.headers()),
        response_bytes: 0,
    };
    let guard = LogGuard::new(entry, started, slow_threshold);

    let response = next.run(request).await;

    // Hand the guard to the body so finalization tracks the last byte.
    let status = response.status().as_u16();
    let (parts, body) = response.into_parts();
    let body = Body::new(LoggedBody {
        inner: body,
        guard,
        status,
        bytes: 0,
    });
    Response::from_parts(parts, body)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use std::sync::{Arc, Mutex};
    use tracing_subscriber::fmt::MakeWriter;

    #[derive(Clone, Default)]
    struct SharedBuf(Arc<Mutex<Vec<u8>>>);

    impl Write for SharedBuf {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }
        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    impl<'a> MakeWriter<'a> for SharedBuf {
        type Writer = SharedBuf;
        fn make_writer(&'a self) -> Self::Writer {
            self.clone()
        }
    }

    fn test_entry(id: &str) -> LogEntry {
        LogEntry {
            request_id: id.to_string(),
            method: "GET".into(),
            path: "/api/tools".into(),
            status: 0,
            latency_ms: 0,
            client_ip: "127.0.0.1".into(),
            user_agent: "-".into(),
            request_bytes: 0,
            response_bytes: 0,
        }
    }

    fn captured_lines(buf: &SharedBuf, id: &str) -> usize {
        let bytes = buf.0.lock().unwrap();
        String::from_utf8_lossy(&bytes)
            .lines()
            .filter(|l| l.contains(id))
            .count()
    }

    #[test]
    fn test_severity_selection() {
        let slow = Duration::from_millis(1000);
        assert_eq!(severity(200, Duration::from_millis(10), slow), Level::INFO);
        assert_eq!(severity(404, Duration::from_millis(10), slow), Level::WARN);
        assert_eq!(severity(200, Duration::from_millis(2000), slow), Level::WARN);
        assert_eq!(severity(502, Duration::from_millis(10), slow), Level::ERROR);
    }

    #[test]
    fn test_completed_guard_emits_exactly_once() {
        let buf = SharedBuf::default();
        let subscriber = tracing_subscriber::fmt()
            .with_writer(buf.clone())
            .with_ansi(false)
            .finish();

        tracing::subscriber::with_default(subscriber, || {
            let mut guard = LogGuard::new(
                test_entry("req-once"),
                Instant::now(),
                Duration::from_secs(5),
            );
            guard.complete(200, 42);
            drop(guard); // drop after completion must not emit again
        });

        assert_eq!(captured_lines(&buf, "req-once"), 1);
    }

    #[test]
    fn test_dropped_guard_emits_client_closed() {
        let buf = SharedBuf::default();
        let subscriber = tracing_subscriber::fmt()
            .with_writer(buf.clone())
            .with_ansi(false)
            .finish();

        tracing::subscriber::with_default(subscriber, || {
            let guard = LogGuard::new(
                test_entry("req-dropped"),
                Instant::now(),
                Duration::from_secs(5),
            );
            drop(guard); // simulates the request future being cancelled
        });

        assert_eq!(captured_lines(&buf, "req-dropped"), 1);
        let bytes = buf.0.lock().unwrap();
        let output = String::from_utf8_lossy(&bytes);
        assert!(output.contains("499"));
    }

    #[tokio::test]
    async fn test_streaming_response_logs_at_body_end() {
        let buf = SharedBuf::default();
        let subscriber = tracing_subscriber::fmt()
            .with_writer(buf.clone())
            .with_ansi(false)
            .finish();
        let _default = tracing::subscriber::set_default(subscriber);

        let guard = LogGuard::new(
            test_entry("req-body"),
            Instant::now(),
            Duration::from_secs(5),
        );
        let body = Body::new(LoggedBody {
            inner: Body::from("hello"),
            guard,
            status: 200,
            bytes: 0,
        });

        // Nothing is emitted until the body has been fully produced.
        assert_eq!(captured_lines(&buf, "req-body"), 0);

        let collected = axum::body::to_bytes(body, usize::MAX).await.unwrap();
        assert_eq!(&collected[..], b"hello");

        assert_eq!(captured_lines(&buf, "req-body"), 1);
        let bytes = buf.0.lock().unwrap();
        let output = String::from_utf8_lossy(&bytes);
        assert!(output.contains("status=200"));
        assert!(output.contains("response_bytes=5"));
    }

    #[test]
    fn test_body_dropped_mid_stream_logs_client_closed() {
        let buf = SharedBuf::default();
        let subscriber = tracing_subscriber::fmt()
            .with_writer(buf.clone())
            .with_ansi(false)
            .finish();

        tracing::subscriber::with_default(subscriber, || {
            let guard = LogGuard::new(
                test_entry("req-cut"),
                Instant::now(),
                Duration::from_secs(5),
            );
            let body = LoggedBody {
                inner: Body::from("never read"),
                guard,
                status: 200,
                bytes: 0,
            };
            drop(body); // client went away mid-stream
        });

        assert_eq!(captured_lines(&buf, "req-cut"), 1);
        let bytes = buf.0.lock().unwrap();
        let output = String::from_utf8_lossy(&bytes);
        assert!(output.contains("499"));
    }
}
