// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde_json::Value;

/// Per-execution scratch state shared between the tool worker and the tool
/// it is running (§4.3, §4.7). External tools record the spawned child's pid
/// here so the interrupt coordinator can find it without waiting for
/// `execute` to return.
#[derive(Clone, Default)]
pub struct ToolContext {
    pub child_pid: Arc<Mutex<Option<u32>>>,
}

/// A single tool invocation requested by the model.
#[derive(Debug, Clone)]
pub struct ToolCall {
    /// Opaque identifier returned by the model (forwarded verbatim).
    pub id: String,
    pub name: String,
    /// Parsed JSON arguments.
    pub args: Value,
}

/// The result of executing a tool, before the dispatcher wraps it into the
/// `{tool_success, output_or_error}` envelope (§4.3).
#[derive(Debug, Clone)]
pub struct ToolOutput {
    pub call_id: String,
    /// Raw output string. For a successful run this is the tool's result
    /// (often JSON-encoded); for a failed run it is the error message.
    pub content: String,
    pub is_error: bool,
}

impl ToolOutput {
    pub fn ok(call_id: impl Into<String>, content: impl Into<String>) -> Self {
        Self { call_id: call_id.into(), content: content.into(), is_error: false }
    }

    pub fn err(call_id: impl Into<String>, msg: impl Into<String>) -> Self {
        Self { call_id: call_id.into(), content: msg.into(), is_error: true }
    }
}

/// Trait every tool — internal handler or external-process wrapper — must
/// implement. The dispatcher (§4.3) looks tools up by name and calls
/// `execute` without caring which kind it is.
#[async_trait]
pub trait Tool: Send + Sync {
    fn name(&self) -> &str;
    fn description(&self) -> &str;
    /// JSON Schema for the arguments object, sent to the provider.
    fn parameters_schema(&self) -> Value;
    /// Run the tool. Internal tools return `ToolOutput::err` instead of
    /// panicking; external tools map subprocess failure the same way and
    /// publish their child pid into `ctx` as soon as it is known.
    async fn execute(&self, call: &ToolCall, ctx: &ToolContext) -> ToolOutput;
}

// ─── Unit tests ──────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn ok_output_is_not_error() {
        let o = ToolOutput::ok("c1", "done");
        assert!(!o.is_error);
        assert_eq!(o.content, "done");
        assert_eq!(o.call_id, "c1");
    }

    #[test]
    fn err_output_is_error() {
        let o = ToolOutput::err("c1", "boom");
        assert!(o.is_error);
        assert_eq!(o.content, "boom");
    }

    #[test]
    fn tool_call_holds_parsed_args() {
        let call = ToolCall { id: "1".into(), name: "glob".into(), args: json!({"pattern": "*.rs"}) };
        assert_eq!(call.args["pattern"], "*.rs");
    }

    #[test]
    fn tool_context_starts_with_no_pid() {
        let ctx = ToolContext::default();
        assert!(ctx.child_pid.lock().unwrap().is_none());
    }
}
