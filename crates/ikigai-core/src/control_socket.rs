// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{UnixListener, UnixStream};
use tracing::{debug, warn};

/// One decoded request off the wire (§4.8). `SendKeys` bytes are pushed into
/// the event loop's key-injection buffer and consumed as if they arrived on
/// the TTY; `ReadFramebuffer` returns a snapshot of the current scrollback.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ControlRequest {
    ReadFramebuffer,
    SendKeys { keys: String },
}

#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ControlReply {
    Framebuffer { lines: Vec<FramebufferLine> },
    Ok { ok: bool },
    Error { error: String },
}

#[derive(Debug, Serialize)]
pub struct FramebufferLine {
    pub spans: Vec<FramebufferSpan>,
}

#[derive(Debug, Serialize)]
pub struct FramebufferSpan {
    pub text: String,
    pub style: Value,
}

/// Listens at `<runtime_dir>/ikigai-<pid>.sock` (§4.8). Accepts one request
/// per connection, replies with one newline-terminated JSON object, closes.
pub struct ControlSocket {
    listener: UnixListener,
    path: PathBuf,
}

impl ControlSocket {
    /// Bind the listener. Fails loudly if a stale socket file exists at the
    /// same path and cannot be removed — a leftover socket from a crashed
    /// process must not silently steal a new instance's control channel.
    pub fn bind(runtime_dir: &str, pid: u32) -> anyhow::Result<Self> {
        std::fs::create_dir_all(runtime_dir)?;
        let path = Path::new(runtime_dir).join(format!("ikigai-{pid}.sock"));
        if path.exists() {
            std::fs::remove_file(&path)?;
        }
        let listener = UnixListener::bind(&path)?;
        debug!(path = %path.display(), "control socket bound");
        Ok(Self { listener, path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Accept one connection and read its one request line. The parse
    /// result is handed back alongside the stream (rather than folded into
    /// the outer `Result`) so a malformed `type` still gets the
    /// `{"error":"unknown request"}` reply the wire protocol promises,
    /// instead of silently dropping the connection.
    pub async fn accept(&self) -> anyhow::Result<(Result<ControlRequest, String>, UnixStream)> {
        let (stream, _addr) = self.listener.accept().await?;
        let mut reader = BufReader::new(stream);
        let mut line = String::new();
        reader.read_line(&mut line).await?;
        let request = serde_json::from_str(line.trim_end()).map_err(|e| e.to_string());
        Ok((request, reader.into_inner()))
    }
}

impl Drop for ControlSocket {
    fn drop(&mut self) {
        let _ = std::fs::remove_file(&self.path);
    }
}

/// Write one reply line and close. Unknown request types never reach here —
/// `serde`'s tagged enum rejects them during `accept()`'s parse, which the
/// caller turns into `{"error":"unknown request"}` before calling this.
pub async fn reply(stream: &mut UnixStream, reply: &ControlReply) -> anyhow::Result<()> {
    let mut text = serde_json::to_string(reply)?;
    text.push('\n');
    stream.write_all(text.as_bytes()).await?;
    Ok(())
}

pub fn unknown_request_error() -> ControlReply {
    ControlReply::Error { error: "unknown request".to_string() }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
