//! Decoder for the daemon's event-stream framing.
//!
//! The wire format is line-based UTF-8: `event: <name>` sets the pending
//! event name, `data: <json>` completes one event. Blank lines and unknown
//! lines are ignored. A data line whose payload fails to parse is dropped
//! silently; malformed frames never abort the stream.
//!
//! # Design Decisions
//! - The parser buffers raw bytes and only converts complete lines, so a
//!   network read boundary may fall anywhere, including inside a multi-byte
//!   character
//! - Consumption is pull-based: `SseStream::next` reads from the source only
//!   when the consumer asks, so a slow consumer throttles the upstream read
//! - A stream is forward-only and finite; a new stream needs a new parser

use std::collections::VecDeque;

use tokio::io::{AsyncRead, AsyncReadExt};

const EVENT_PREFIX: &str = "event: ";
const DATA_PREFIX: &str = "data: ";
const READ_CHUNK: usize = 4096;

/// One decoded event: a name plus its structured payload.
#[derive(Debug, Clone, PartialEq)]
pub struct SseEvent {
    pub name: String,
    pub data: serde_json::Value,
}

/// Incremental frame decoder. Feed it bytes in arbitrary chunks and drain
/// completed events.
#[derive(Debug, Default)]
pub struct SseParser {
    buf: Vec<u8>,
    pending_name: Option<String>,
    ready: VecDeque<SseEvent>,
}

impl SseParser {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one chunk of raw bytes. Completed events become available via
    /// `next_event`; a trailing incomplete line stays buffered.
    pub fn push(&mut self, bytes: &[u8]) {
        self.buf.extend_from_slice(bytes);

        // 0x0A never appears inside a UTF-8 continuation, so splitting on
        // raw newline bytes is safe even mid-character.
        while let Some(pos) = self.buf.iter().position(|&b| b == b'\n') {
            let line_bytes: Vec<u8> = self.buf.drain(..=pos).collect();
            let line = String::from_utf8_lossy(&line_bytes[..pos]);
            self.handle_line(line.trim_end_matches('\r'));
        }
    }

    /// Pop the next completed event, if any.
    pub fn next_event(&mut self) -> Option<SseEvent> {
        self.ready.pop_front()
    }

    fn handle_line(&mut self, line: &str) {
        if let Some(name) = line.strip_prefix(EVENT_PREFIX) {
            self.pending_name = Some(name.to_string());
            return;
        }
        if let Some(payload) = line.strip_prefix(DATA_PREFIX) {
            // Data is only meaningful once an event name is pending.
            let Some(name) = self.pending_name.take() else {
                return;
            };
            match serde_json::from_str(payload) {
                Ok(data) => self.ready.push_back(SseEvent { name, data }),
                Err(e) => {
                    tracing::debug!(event = %name, error = %e, "Dropping malformed frame");
                }
            }
        }
        // Blank separators and unknown fields are ignored.
    }
}

/// Pull-based event stream over an async byte source.
///
/// Lazy and finite: ends when the source ends. Not restartable.
pub struct SseStream<R> {
    source: R,
    parser: SseParser,
    done: bool,
}

impl<R: AsyncRead + Unpin> SseStream<R> {
    pub fn new(source: R) -> Self {
        Self {
            source,
            parser: SseParser::new(),
            done: false,
        }
    }

    /// Next event in emission order, or None when the source is exhausted.
    pub async fn next(&mut self) -> std::io::Result<Option<SseEvent>> {
        loop {
            if let Some(event) = self.parser.next_event() {
                return Ok(Some(event));
            }
            if self.done {
                return Ok(None);
            }
            let mut chunk = [0u8; READ_CHUNK];
            let n = self.source.read(&mut chunk).await?;
            if n == 0 {
                self.done = true;
                return Ok(None);
            }
            self.parser.push(&chunk[..n]);
        }
    }
}
