//! IPC wire contract with the agent daemon.
//!
//! The daemon binds a Unix domain socket. The gateway opens one connection
//! per call and writes a single NDJSON request line. The daemon answers
//! either with one NDJSON reply line (unary) or with a sequence of
//! event-stream frames followed by EOF (streaming), then closes the
//! connection. Request/response pairing and chunk ordering come from the
//! connection itself.

use std::path::Path;

use serde::{Deserialize, Serialize};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::unix::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::UnixStream;

use crate::daemon::sse::SseStream;
use crate::daemon::DaemonError;

/// Request kinds the daemon understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RequestKind {
    /// Streaming chat turn; replied to with event frames.
    Chat,
    /// Unary question/answer exchange.
    Ask,
    /// Drop internal caches; unary.
    ClearCaches,
}

/// One structured request forwarded to the daemon.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DaemonRequest {
    /// Correlation id, carried through for the daemon's own logs.
    pub id: String,
    pub kind: RequestKind,
    pub payload: serde_json::Value,
}

/// Unary reply line.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DaemonReply {
    pub ok: bool,
    #[serde(default)]
    pub result: serde_json::Value,
    #[serde(default)]
    pub error: Option<String>,
}

/// One connection to the daemon, used for a single exchange.
pub struct DaemonConn {
    reader: BufReader<OwnedReadHalf>,
    writer: OwnedWriteHalf,
}

impl DaemonConn {
    /// Connect to the daemon's socket.
    pub async fn open(socket_path: &Path) -> std::io::Result<Self> {
        let stream = UnixStream::connect(socket_path).await?;
        let (read_half, write_half) = stream.into_split();
        Ok(Self {
            reader: BufReader::new(read_half),
            writer: write_half,
        })
    }

    /// Send the request as one NDJSON line.
    pub async fn send(&mut self, request: &DaemonRequest) -> Result<(), DaemonError> {
        let json = serde_json::to_string(request)
            .map_err(|e| DaemonError::BadReply(format!("unserializable request: {e}")))?;
        self.writer.write_all(json.as_bytes()).await?;
        self.writer.write_all(b"\n").await?;
        self.writer.flush().await?;
        Ok(())
    }

    /// Read one unary reply line. EOF before a line means the daemon went
    /// away mid-call.
    pub async fn read_reply(&mut self) -> Result<DaemonReply, DaemonError> {
        let mut line = String::new();
        let n = self.reader.read_line(&mut line).await?;
        if n == 0 {
            return Err(DaemonError::ConnectionClosed);
        }
        let reply: DaemonReply = serde_json::from_str(line.trim())
            .map_err(|e| DaemonError::BadReply(e.to_string()))?;
        Ok(reply)
    }

    /// Hand the read side to the event decoder. The write half is kept
    /// alive alongside it so the daemon does not observe an early hangup.
    pub fn into_event_stream(self) -> (SseStream<BufReader<OwnedReadHalf>>, OwnedWriteHalf) {
        (SseStream::new(self.reader), self.writer)
    }
}
