// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use std::collections::HashMap;
use std::time::Duration;

use tokio::time::sleep;
use uuid::Uuid;

const POLL_INTERVAL: Duration = Duration::from_millis(25);
const POLL_ATTEMPTS: u32 = 10; // ~250 ms total before escalating to SIGKILL

/// Per-agent interrupt flags (§4.11). The event loop consults this on every
/// tick to decide whether a `WaitingForLLM`/`ExecutingTool` agent should take
/// the interrupted-completion path instead of the normal one.
#[derive(Default)]
pub struct InterruptCoordinator {
    requested: HashMap<Uuid, bool>,
}

impl InterruptCoordinator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn request(&mut self, agent: Uuid) {
        self.requested.insert(agent, true);
    }

    pub fn is_requested(&self, agent: Uuid) -> bool {
        self.requested.get(&agent).copied().unwrap_or(false)
    }

    pub fn clear(&mut self, agent: Uuid) {
        self.requested.remove(&agent);
    }
}

/// Kill a subprocess's whole process group: SIGTERM, poll `waitpid` briefly,
/// SIGKILL if it's still alive (§4.11, §5 "Timeouts"). `pid` is the process
/// group leader's pid as published by [`crate::tool_worker`] via
/// `ToolContext::child_pid`.
#[cfg(unix)]
pub async fn kill_process_group(pid: u32) {
    unsafe {
        libc::kill(-(pid as i32), libc::SIGTERM);
    }
    for _ in 0..POLL_ATTEMPTS {
        if !process_alive(pid) {
            return;
        }
        sleep(POLL_INTERVAL).await;
    }
    unsafe {
        libc::kill(-(pid as i32), libc::SIGKILL);
    }
}

#[cfg(unix)]
fn process_alive(pid: u32) -> bool {
    // Signal 0 performs no delivery, only existence/permission checks.
    unsafe { libc::kill(pid as i32, 0) == 0 }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
