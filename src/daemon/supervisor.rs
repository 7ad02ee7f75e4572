//! Lifecycle control for the backend agent process.
//!
//! # State machine
//! ```text
//! Absent → Starting → Ready ⇄ Busy(n) → Terminating → Absent
//!                        └─ Crashed ───────────────→ Absent
//! ```
//! `Starting` is represented by holding the state lock for the duration of
//! the spawn: callers arriving mid-spawn queue on the lock and observe the
//! single in-progress spawn's outcome instead of racing to start duplicates.
//!
//! # Invariant
//! At most one process handle exists at a time. A kill replaces the handle
//! with Absent before the lock is released, so no new request can observe a
//! stale handle pointing at a dead process.

use std::path::Path;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex as StdMutex};
use std::time::{Duration, Instant};

use serde::Serialize;
use tokio::io::BufReader;
use tokio::net::unix::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::UnixStream;
use tokio::process::{Child, Command};
use tokio::sync::Mutex;

use crate::config::schema::DaemonConfig;
use crate::daemon::ipc::{DaemonConn, DaemonRequest, RequestKind};
use crate::daemon::sse::{SseEvent, SseStream};
use crate::daemon::DaemonError;
use crate::observability::metrics;

const READY_POLL_INTERVAL: Duration = Duration::from_millis(25);
const MONITOR_INTERVAL: Duration = Duration::from_millis(500);

enum ProcState {
    Absent,
    Ready { child: Child, generation: u64 },
}

struct Inner {
    config: DaemonConfig,
    state: Mutex<ProcState>,
    busy: AtomicUsize,
    spawn_count: AtomicU64,
    last_activity: StdMutex<Instant>,
}

impl Inner {
    fn touch(&self) {
        *self
            .last_activity
            .lock()
            .expect("last_activity mutex poisoned") = Instant::now();
    }

    fn idle_for(&self) -> Duration {
        self.last_activity
            .lock()
            .expect("last_activity mutex poisoned")
            .elapsed()
    }
}

/// RAII guard for one in-flight daemon call.
struct InFlightGuard {
    inner: Arc<Inner>,
}

impl InFlightGuard {
    fn new(inner: Arc<Inner>) -> Self {
        inner.busy.fetch_add(1, Ordering::SeqCst);
        inner.touch();
        Self { inner }
    }
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.inner.busy.fetch_sub(1, Ordering::SeqCst);
        self.inner.touch();
    }
}

/// Point-in-time snapshot of the supervisor, for the status endpoint.
#[derive(Debug, Clone, Serialize)]
pub struct DaemonStatus {
    pub state: String,
    pub in_flight: usize,
    pub generation: u64,
    /// OS pid of the live process, absent otherwise.
    pub pid: Option<u32>,
}

/// Owns the backend agent process and all access to it.
///
/// Handler code never touches the process handle directly; every mutation
/// goes through the narrow entry points here.
#[derive(Clone)]
pub struct Supervisor {
    inner: Arc<Inner>,
}

/// One streamed daemon reply. Dropping it closes the connection, which
/// propagates cancellation to the daemon's write loop, and releases the
/// in-flight slot.
pub struct DaemonStream {
    events: SseStream<BufReader<OwnedReadHalf>>,
    idle_timeout_ms: u64,
    _writer: OwnedWriteHalf,
    _in_flight: InFlightGuard,
}

impl DaemonStream {
    /// Next relayed event, in daemon emission order. Each pull carries an
    /// inactivity bound: a daemon that stops emitting mid-stream surfaces as
    /// `Unresponsive` instead of holding the relay open forever.
    pub async fn next(&mut self) -> Result<Option<SseEvent>, DaemonError> {
        let timeout = Duration::from_millis(self.idle_timeout_ms);
        match tokio::time::timeout(timeout, self.events.next()).await {
            Err(_) => Err(DaemonError::Unresponsive(self.idle_timeout_ms)),
            Ok(Ok(event)) => Ok(event),
            Ok(Err(_)) => Err(DaemonError::ConnectionClosed),
        }
    }
}

impl Supervisor {
    pub fn new(config: DaemonConfig) -> Self {
        Self {
            inner: Arc::new(Inner {
                config,
                state: Mutex::new(ProcState::Absent),
                busy: AtomicUsize::new(0),
                spawn_count: AtomicU64::new(0),
                last_activity: StdMutex::new(Instant::now()),
            }),
        }
    }

    /// Number of spawn attempts so far. Increments once per attempt, so a
    /// respawn after a kill or crash is observable as a new generation.
    pub fn generation(&self) -> u64 {
        self.inner.spawn_count.load(Ordering::SeqCst)
    }

    /// Calls currently in flight against the process.
    pub fn in_flight(&self) -> usize {
        self.inner.busy.load(Ordering::SeqCst)
    }

    /// Snapshot for the status endpoint.
    pub async fn status(&self) -> DaemonStatus {
        let in_flight = self.in_flight();
        let generation = self.generation();
        let (state, pid) = match self.inner.state.try_lock() {
            // Lock held means a spawn (or kill) is in progress.
            Err(_) => ("starting", None),
            Ok(guard) => match &*guard {
                ProcState::Absent => ("absent", None),
                ProcState::Ready { child, .. } => {
                    let state = if in_flight > 0 { "busy" } else { "ready" };
                    (state, child.id())
                }
            },
        };
        DaemonStatus {
            state: state.to_string(),
            in_flight,
            generation,
            pid,
        }
    }

    /// Forward a unary request, spawning the daemon first if needed.
    pub async fn request(
        &self,
        id: &str,
        kind: RequestKind,
        payload: serde_json::Value,
    ) -> Result<serde_json::Value, DaemonError> {
        self.ensure_ready().await?;
        let _in_flight = InFlightGuard::new(self.inner.clone());
        self.call(DaemonRequest {
            id: id.to_string(),
            kind,
            payload,
        })
        .await
    }

    /// Forward a streaming request, spawning the daemon first if needed.
    /// Events are decoded lazily as the caller pulls them.
    pub async fn stream(
        &self,
        id: &str,
        kind: RequestKind,
        payload: serde_json::Value,
    ) -> Result<DaemonStream, DaemonError> {
        self.ensure_ready().await?;
        let in_flight = InFlightGuard::new(self.inner.clone());
        let mut conn = DaemonConn::open(Path::new(&self.inner.config.socket_path))
            .await
            .map_err(|_| DaemonError::ConnectionClosed)?;
        conn.send(&DaemonRequest {
            id: id.to_string(),
            kind,
            payload,
        })
        .await?;
        let (events, writer) = conn.into_event_stream();
        Ok(DaemonStream {
            events,
            idle_timeout_ms: self.inner.config.request_timeout_ms,
            _writer: writer,
            _in_flight: in_flight,
        })
    }

    /// Tell a live daemon to drop its caches. A no-op success when the
    /// process is absent; never spawns one.
    pub async fn clear_caches(&self, id: &str) -> Result<bool, DaemonError> {
        {
            let guard = self.inner.state.lock().await;
            if matches!(*guard, ProcState::Absent) {
                return Ok(false);
            }
        }
        let _in_flight = InFlightGuard::new(self.inner.clone());
        self.call(DaemonRequest {
            id: id.to_string(),
            kind: RequestKind::ClearCaches,
            payload: serde_json::Value::Null,
        })
        .await?;
        Ok(true)
    }

    /// Unconditionally terminate the process, regardless of in-flight calls.
    /// In-flight calls observe a closed connection. The handle is nulled
    /// before the lock is released.
    pub async fn kill(&self) {
        let mut guard = self.inner.state.lock().await;
        if let ProcState::Ready {
            mut child,
            generation,
        } = std::mem::replace(&mut *guard, ProcState::Absent)
        {
            if let Err(e) = child.kill().await {
                tracing::warn!(error = %e, "Failed to kill daemon process");
            }
            tracing::info!(generation, "Daemon terminated");
        }
    }

    /// Unary exchange against an already-live daemon. Does not spawn.
    async fn call(&self, request: DaemonRequest) -> Result<serde_json::Value, DaemonError> {
        let mut conn = DaemonConn::open(Path::new(&self.inner.config.socket_path))
            .await
            .map_err(|_| DaemonError::ConnectionClosed)?;
        conn.send(&request).await?;

        let timeout_ms = self.inner.config.request_timeout_ms;
        let reply = tokio::time::timeout(Duration::from_millis(timeout_ms), conn.read_reply())
            .await
            .map_err(|_| DaemonError::Unresponsive(timeout_ms))??;

        if reply.ok {
            Ok(reply.result)
        } else {
            Err(DaemonError::Rejected(
                reply.error.unwrap_or_else(|| "unspecified error".to_string()),
            ))
        }
    }

    /// Spawn the daemon if absent and wait until its socket accepts
    /// connections. Holding the state lock for the whole spawn makes it
    /// single-flight.
    async fn ensure_ready(&self) -> Result<(), DaemonError> {
        let mut guard = self.inner.state.lock().await;

        if let ProcState::Ready { child, generation } = &mut *guard {
            match child.try_wait() {
                Ok(None) => return Ok(()),
                Ok(Some(status)) => {
                    tracing::warn!(
                        generation = *generation,
                        exit = %status,
                        "Daemon exited unexpectedly"
                    );
                    metrics::record_daemon_crash();
                    *guard = ProcState::Absent;
                }
                Err(e) => {
                    tracing::warn!(error = %e, "Lost track of daemon process");
                    *guard = ProcState::Absent;
                }
            }
        }

        let config = &self.inner.config;
        let socket_path = Path::new(&config.socket_path);
        // The daemon binds the socket itself; a stale file from a previous
        // run would make readiness detection lie.
        let _ = std::fs::remove_file(socket_path);

        let generation = self.inner.spawn_count.fetch_add(1, Ordering::SeqCst) + 1;
        tracing::info!(
            generation,
            command = %config.command,
            socket = %config.socket_path,
            "Spawning agent daemon"
        );

        let mut child = Command::new(&config.command)
            .args(&config.args)
            .arg("--socket")
            .arg(&config.socket_path)
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| DaemonError::StartupFailed(format!("spawn {}: {e}", config.command)))?;

        let deadline = Instant::now() + Duration::from_millis(config.startup_timeout_ms);
        loop {
            if UnixStream::connect(socket_path).await.is_ok() {
                break;
            }
            if let Ok(Some(status)) = child.try_wait() {
                *guard = ProcState::Absent;
                return Err(DaemonError::StartupFailed(format!(
                    "process exited during startup: {status}"
                )));
            }
            if Instant::now() >= deadline {
                let _ = child.kill().await;
                *guard = ProcState::Absent;
                return Err(DaemonError::StartupFailed(format!(
                    "not ready within {} ms",
                    config.startup_timeout_ms
                )));
            }
            tokio::time::sleep(READY_POLL_INTERVAL).await;
        }

        metrics::record_daemon_spawn();
        self.inner.touch();
        *guard = ProcState::Ready { child, generation };
        spawn_monitor(self.inner.clone(), generation);
        tracing::info!(generation, "Daemon ready");
        Ok(())
    }
}

/// Background watcher for one process generation: detects crashes and
/// applies the optional idle shutdown. Exits once its generation is gone.
fn spawn_monitor(inner: Arc<Inner>, generation: u64) {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(MONITOR_INTERVAL);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        loop {
            interval.tick().await;
            let mut guard = inner.state.lock().await;
            let ProcState::Ready {
                child,
                generation: current,
            } = &mut *guard
            else {
                return;
            };
            if *current != generation {
                return;
            }

            match child.try_wait() {
                Ok(Some(status)) => {
                    tracing::warn!(generation, exit = %status, "Daemon crashed");
                    metrics::record_daemon_crash();
                    *guard = ProcState::Absent;
                    return;
                }
                Err(e) => {
                    tracing::warn!(generation, error = %e, "Lost track of daemon process");
                    *guard = ProcState::Absent;
                    return;
                }
                Ok(None) => {}
            }

            if let Some(idle_secs) = inner.config.idle_shutdown_secs {
                if inner.busy.load(Ordering::SeqCst) == 0
                    && inner.idle_for() >= Duration::from_secs(idle_secs)
                {
                    if let ProcState::Ready { mut child, .. } =
                        std::mem::replace(&mut *guard, ProcState::Absent)
                    {
                        let _ = child.kill().await;
                    }
                    tracing::info!(generation, idle_secs, "Daemon idle, shut down");
                    return;
                }
            }
        }
    });
}
