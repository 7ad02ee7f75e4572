//! Minimal agent daemon used for development runs and integration tests.
//!
//! Implements the gateway's IPC contract: binds the Unix socket passed via
//! `--socket`, reads one NDJSON request line per connection, and answers
//! with a single reply line (unary kinds) or event-stream frames (chat).
//! Chat turns echo the message back word by word.

use clap::Parser;
use serde_json::json;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::unix::OwnedWriteHalf;
use tokio::net::{UnixListener, UnixStream};

use agent_gateway::daemon::ipc::{DaemonReply, DaemonRequest, RequestKind};

#[derive(Parser)]
#[command(name = "echo-agent")]
struct Args {
    /// Unix socket path to bind for gateway IPC.
    #[arg(long)]
    socket: String,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let _ = std::fs::remove_file(&args.socket);
    let listener = UnixListener::bind(&args.socket)?;
    eprintln!("echo-agent listening on {}", args.socket);

    loop {
        let (stream, _) = listener.accept().await?;
        tokio::spawn(async move {
            if let Err(e) = handle(stream).await {
                eprintln!("echo-agent: connection error: {e}");
            }
        });
    }
}

async fn handle(stream: UnixStream) -> std::io::Result<()> {
    let (read_half, mut writer) = stream.into_split();
    let mut reader = BufReader::new(read_half);

    let mut line = String::new();
    if reader.read_line(&mut line).await? == 0 {
        return Ok(());
    }

    let request: DaemonRequest = match serde_json::from_str(line.trim()) {
        Ok(request) => request,
        Err(e) => {
            return write_reply(
                &mut writer,
                &DaemonReply {
                    ok: false,
                    result: serde_json::Value::Null,
                    error: Some(format!("bad request: {e}")),
                },
            )
            .await;
        }
    };

    // Optional pacing knob: `delay_ms` in the payload slows chat frames
    // (default 10ms per word) or delays the unary reply. Lets callers
    // exercise mid-stream cancellation and timeout handling.
    let delay_ms = request.payload.get("delay_ms").and_then(|v| v.as_u64());

    match request.kind {
        RequestKind::Chat => {
            let message = request
                .payload
                .get("message")
                .and_then(|v| v.as_str())
                .unwrap_or("")
                .to_string();
            let pacing = std::time::Duration::from_millis(delay_ms.unwrap_or(10));

            write_frame(&mut writer, "message_start", json!({ "id": request.id })).await?;
            for word in message.split_whitespace() {
                tokio::time::sleep(pacing).await;
                write_frame(&mut writer, "delta", json!({ "text": word })).await?;
            }
            write_frame(&mut writer, "done", json!({ "ok": true })).await?;
        }
        RequestKind::Ask => {
            if let Some(ms) = delay_ms {
                tokio::time::sleep(std::time::Duration::from_millis(ms)).await;
            }
            write_reply(
                &mut writer,
                &DaemonReply {
                    ok: true,
                    result: json!({ "echo": request.payload }),
                    error: None,
                },
            )
            .await?;
        }
        RequestKind::ClearCaches => {
            write_reply(
                &mut writer,
                &DaemonReply {
                    ok: true,
                    result: json!({ "cleared": true }),
                    error: None,
                },
            )
            .await?;
        }
    }

    Ok(())
}

async fn write_frame(
    writer: &mut OwnedWriteHalf,
    name: &str,
    data: serde_json::Value,
) -> std::io::Result<()> {
    writer
        .write_all(format!("event: {name}\ndata: {data}\n\n").as_bytes())
        .await?;
    writer.flush().await
}

async fn write_reply(writer: &mut OwnedWriteHalf, reply: &DaemonReply) -> std::io::Result<()> {
    let json = serde_json::to_string(reply).map_err(std::io::Error::other)?;
    writer.write_all(json.as_bytes()).await?;
    writer.write_all(b"\n").await?;
    writer.flush().await
}
