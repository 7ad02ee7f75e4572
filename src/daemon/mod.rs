//! Daemon client and process supervision subsystem.
//!
//! # Data Flow
//! ```text
//! handler calls supervisor
//!     → supervisor.rs (spawn-on-demand, state machine, kill/restart)
//!     → ipc.rs (per-request Unix socket connection, NDJSON request line)
//!     → sse.rs (decode the daemon's streamed reply into typed events)
//!     → events relayed to the HTTP response writer
//! ```
//!
//! # Design Decisions
//! - At most one daemon process handle exists at a time; the handle is
//!   nulled before any replacement may spawn
//! - Spawn is single-flight: callers arriving mid-spawn wait for it
//! - Malformed upstream frames are absorbed by the parser, never surfaced

pub mod ipc;
pub mod sse;
pub mod supervisor;

use thiserror::Error;

pub use ipc::{DaemonReply, DaemonRequest, RequestKind};
pub use sse::{SseEvent, SseParser, SseStream};
pub use supervisor::{DaemonStatus, DaemonStream, Supervisor};

/// Errors surfaced by daemon calls. Malformed stream frames are not here;
/// the SSE parser drops them silently.
#[derive(Debug, Error)]
pub enum DaemonError {
    /// The process spawned but never became ready, or could not spawn.
    #[error("daemon failed to start: {0}")]
    StartupFailed(String),

    /// No reply within the per-call timeout. The process is left running;
    /// killing it is an explicit operator action.
    #[error("daemon did not respond within {0} ms")]
    Unresponsive(u64),

    /// The connection closed mid-call, typically because the process died
    /// or was killed with calls in flight.
    #[error("daemon connection closed")]
    ConnectionClosed,

    /// The daemon answered with a structured error.
    #[error("daemon rejected request: {0}")]
    Rejected(String),

    /// The daemon's unary reply was not parseable.
    #[error("daemon sent an invalid reply: {0}")]
    BadReply(String),

    #[error("daemon io error: {0}")]
    Io(#[from] std::io::Error),
}
