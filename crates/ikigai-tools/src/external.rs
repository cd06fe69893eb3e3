// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::process::Command;
use tracing::debug;

use crate::tool::{Tool, ToolCall, ToolContext, ToolOutput};

const TIMEOUT: Duration = Duration::from_secs(30);
const OUTPUT_CAP: usize = 64 * 1024;

/// A tool backed by an external subprocess (§4.3). The child receives the
/// call's arguments as JSON on stdin, emits one JSON value on stdout, and may
/// emit diagnostics on stderr. It runs in its own process group so the
/// interrupt coordinator can signal the whole tree rather than just the
/// immediate child.
pub struct ExternalTool {
    name: String,
    description: String,
    parameters: Value,
    path: String,
}

impl ExternalTool {
    pub fn new(
        name: impl Into<String>,
        description: impl Into<String>,
        parameters: Value,
        path: impl Into<String>,
    ) -> Self {
        Self { name: name.into(), description: description.into(), parameters, path: path.into() }
    }
}

#[async_trait]
impl Tool for ExternalTool {
    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> &str {
        &self.description
    }

    fn parameters_schema(&self) -> Value {
        self.parameters.clone()
    }

    async fn execute(&self, call: &ToolCall, ctx: &ToolContext) -> ToolOutput {
        debug!(tool = %self.name, path = %self.path, "spawning external tool");

        let mut cmd = Command::new(&self.path);
        cmd.process_group(0)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());

        let mut child = match cmd.spawn() {
            Ok(c) => c,
            Err(e) => return ToolOutput::err(&call.id, format!("spawn error: {e}")),
        };

        *ctx.child_pid.lock().unwrap() = child.id();

        let stdin_payload = call.args.to_string();
        let mut stdin = child.stdin.take().expect("piped stdin");
        let mut stdout = child.stdout.take().expect("piped stdout");
        let mut stderr = child.stderr.take().expect("piped stderr");

        let write_fut = async move {
            let _ = stdin.write_all(stdin_payload.as_bytes()).await;
            drop(stdin);
        };
        let stdout_fut = capped_read(&mut stdout);
        let stderr_fut = capped_read(&mut stderr);

        let run = async {
            let (_, out, err) = tokio::join!(write_fut, stdout_fut, stderr_fut);
            let status = child.wait().await;
            (status, out, err)
        };

        let result = tokio::time::timeout(TIMEOUT, run).await;
        *ctx.child_pid.lock().unwrap() = None;

        let (status, out, err) = match result {
            Ok(r) => r,
            Err(_) => {
                let pid = child.id();
                if let Some(pid) = pid {
                    kill_group(pid);
                }
                return ToolOutput::err(&call.id, format!("timeout after {}s", TIMEOUT.as_secs()));
            }
        };

        let (stdout_bytes, stdout_truncated) = out;
        let (stderr_bytes, stderr_truncated) = err;

        let status = match status {
            Ok(s) => s,
            Err(e) => return ToolOutput::err(&call.id, format!("wait error: {e}")),
        };

        if stdout_truncated || stderr_truncated {
            return ToolOutput::err(&call.id, "tool output exceeded 64 KiB cap".to_string());
        }

        if !status.success() {
            let stderr_text = String::from_utf8_lossy(&stderr_bytes);
            let code = status.code().unwrap_or(-1);
            return ToolOutput::err(&call.id, format!("[exit {code}] {stderr_text}"));
        }

        let stdout_text = String::from_utf8_lossy(&stdout_bytes).into_owned();
        ToolOutput::ok(&call.id, stdout_text)
    }
}

/// Read a pipe to EOF, capping the bytes retained at [`OUTPUT_CAP`] while
/// still draining everything past the cap. A child that writes more than the
/// cap must not be left blocked on a full pipe buffer waiting for a reader
/// that stopped early.
async fn capped_read<R: AsyncReadExt + Unpin>(reader: &mut R) -> (Vec<u8>, bool) {
    let mut kept = Vec::new();
    let mut truncated = false;
    let mut buf = [0u8; 8192];
    loop {
        match reader.read(&mut buf).await {
            Ok(0) => break,
            Ok(n) => {
                if kept.len() < OUTPUT_CAP {
                    let room = OUTPUT_CAP - kept.len();
                    kept.extend_from_slice(&buf[..n.min(room)]);
                }
                if kept.len() + n > OUTPUT_CAP {
                    truncated = true;
                }
            }
            Err(_) => break,
        }
    }
    (kept, truncated)
}

fn kill_group(pid: u32) {
    unsafe {
        libc::kill(-(pid as i32), libc::SIGTERM);
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn call(args: Value) -> ToolCall {
        ToolCall { id: "e1".into(), name: "ext".into(), args }
    }

    fn echo_tool() -> ExternalTool {
        ExternalTool::new(
            "ext",
            "echoes stdin",
            json!({"type": "object"}),
            "/bin/cat",
        )
    }

    #[tokio::test]
    async fn echoes_stdin_back_on_stdout() {
        let t = echo_tool();
        let ctx = ToolContext::default();
        let out = t.execute(&call(json!({"x": 1})), &ctx).await;
        assert!(!out.is_error, "{}", out.content);
        assert_eq!(out.content, r#"{"x":1}"#);
    }

    #[tokio::test]
    async fn nonzero_exit_is_error() {
        let t = ExternalTool::new("fail", "fails", json!({"type": "object"}), "/bin/false");
        let out = t.execute(&call(json!({})), &ToolContext::default()).await;
        assert!(out.is_error);
    }

    #[tokio::test]
    async fn missing_binary_is_spawn_error() {
        let t = ExternalTool::new("nope", "missing", json!({"type": "object"}), "/no/such/binary");
        let out = t.execute(&call(json!({})), &ToolContext::default()).await;
        assert!(out.is_error);
        assert!(out.content.contains("spawn error"));
    }

    #[tokio::test]
    async fn publishes_child_pid_during_execution() {
        let t = ExternalTool::new("sleep", "sleeps", json!({"type": "object"}), "/bin/sleep");
        let ctx = ToolContext::default();
        // /bin/sleep with no args exits immediately with usage error; we only
        // care that the context is cleared afterward.
        let _ = t.execute(&call(json!({})), &ctx).await;
        assert!(ctx.child_pid.lock().unwrap().is_none());
    }
}
