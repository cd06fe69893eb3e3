// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use std::sync::Arc;

use ikigai_tools::{ToolCall, ToolContext, ToolRegistry};
use serde_json::Value;
use tokio::sync::Mutex;

/// Per-agent tool-worker slot (§4.7). The agent's lock guards
/// `(running, complete, result, child_pid)` transitions; this struct is that
/// state, shared between the main thread and the spawned worker task.
#[derive(Default)]
pub struct ToolWorkerState {
    pub running: bool,
    pub complete: bool,
    pub result: Option<Value>,
    pub ctx: ToolContext,
}

/// A deferred command supplies this instead of a real tool call: the worker
/// does nothing provider-facing, and the hook runs on the main thread when
/// the worker finishes, with access to the scratch context (§4.7 "Deferred-
/// command variant").
pub type OnCompleteHook = Box<dyn FnOnce(&ToolContext) + Send>;

/// Runs exactly one tool call to completion and writes the result envelope
/// into `state` under the lock, matching the lifecycle in §4.7: the main
/// thread spawns this, polls `state.complete` on its own schedule, and joins.
pub async fn run(registry: Arc<ToolRegistry>, call: ToolCall, state: Arc<Mutex<ToolWorkerState>>) {
    let ctx = {
        let guard = state.lock().await;
        guard.ctx.clone()
    };
    let result = registry.execute(&call, &ctx).await;
    let mut guard = state.lock().await;
    guard.result = Some(result);
    guard.complete = true;
    guard.running = false;
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
