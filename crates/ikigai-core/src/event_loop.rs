// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use std::collections::{HashMap, VecDeque};
use std::time::Duration;

use serde_json::Value;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::time::MissedTickBehavior;
use tracing::{info, warn};
use uuid::Uuid;

use crate::agent::{Agent, AgentState};
use crate::control_socket::{reply, unknown_request_error, ControlReply, ControlRequest, ControlSocket, FramebufferLine, FramebufferSpan};
use crate::interrupt::{kill_process_group, InterruptCoordinator};

/// Spinner / tool-poll tick bound (§5 "the event loop's select timeout is
/// the minimum of all provider-requested timeouts and a UI tick bound").
/// No provider adapter in this tree reports a shorter timeout, so the tick
/// itself is the effective bound.
const TICK: Duration = Duration::from_millis(50);

/// The cooperative main loop described in §4.9. One `EventLoop` owns every
/// agent in the session, the interrupt flags, and (outside headless mode)
/// the control socket. There is exactly one of these per process.
pub struct EventLoop {
    agents: HashMap<Uuid, Agent>,
    current: Uuid,
    interrupts: InterruptCoordinator,
    control_socket: Option<ControlSocket>,
    headless: bool,
    quit: bool,
    /// Lines queued by `SendKeys` control requests (§4.9 step 2), drained
    /// one per loop iteration through the same path as real stdin lines.
    injected_lines: VecDeque<String>,
}

impl EventLoop {
    pub fn new(root: Agent, control_socket: Option<ControlSocket>, headless: bool) -> Self {
        let current = root.id;
        let mut agents = HashMap::new();
        agents.insert(current, root);
        Self { agents, current, interrupts: InterruptCoordinator::new(), control_socket, headless, quit: false, injected_lines: VecDeque::new() }
    }

    pub fn current_agent(&self) -> &Agent {
        self.agents.get(&self.current).expect("current agent always present")
    }

    fn current_agent_mut(&mut self) -> &mut Agent {
        self.agents.get_mut(&self.current).expect("current agent always present")
    }

    /// Drive the loop to completion (user `/exit`, EOF on a headless stdin,
    /// or SIGINT/SIGTERM — step 12 of §4.9).
    pub async fn run(&mut self) -> anyhow::Result<()> {
        let mut stdin_lines = BufReader::new(tokio::io::stdin()).lines();
        let mut ticker = tokio::time::interval(TICK);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        #[cfg(unix)]
        let mut sigterm = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())?;

        while !self.quit {
            if let Some(line) = self.injected_lines.pop_front() {
                self.handle_input_line(line).await;
                continue;
            }

            tokio::select! {
                biased;

                _ = tokio::signal::ctrl_c() => {
                    self.handle_sigint().await;
                }

                _ = sigterm_or_pending(&mut sigterm) => {
                    info!("received SIGTERM, exiting");
                    self.quit = true;
                }

                line = stdin_lines.next_line(), if !self.headless => {
                    match line {
                        Ok(Some(text)) => self.handle_input_line(text).await,
                        Ok(None) => {
                            // EOF on stdin in an interactive run means the
                            // terminal went away; behave like `/exit`.
                            self.quit = true;
                        }
                        Err(e) => warn!(error = %e, "stdin read error"),
                    }
                }

                accepted = accept_or_pending(&self.control_socket) => {
                    if let Some((req, mut stream)) = accepted {
                        let reply_msg = match req {
                            Ok(req) => self.handle_control_request(req),
                            Err(_) => unknown_request_error(),
                        };
                        if let Err(e) = reply(&mut stream, &reply_msg).await {
                            warn!(error = %e, "failed to write control socket reply");
                        }
                    }
                }

                _ = ticker.tick() => {
                    self.poll_tool_workers().await;
                    self.drain_pending_prompts().await;
                }
            }
        }
        Ok(())
    }

    /// Ctrl-C: quit when idle, otherwise request an interrupt (§4.9
    /// "Cancellation model"). A `WaitingForLLM` agent's stream is driven to
    /// completion inline by this loop (see module docs); only the
    /// `ExecutingTool` case is genuinely preemptible here, via the next
    /// tool-poll tick observing the flag.
    async fn handle_sigint(&mut self) {
        if self.current_agent().state() == AgentState::Idle {
            self.quit = true;
        } else {
            self.interrupts.request(self.current);
        }
    }

    async fn handle_input_line(&mut self, line: String) {
        let trimmed = line.trim();
        if let Some(rest) = trimmed.strip_prefix('/') {
            self.handle_command(rest).await;
        } else if !trimmed.is_empty() {
            self.current_agent_mut().pending_prompt = Some(trimmed.to_string());
        }
    }

    async fn handle_command(&mut self, command: &str) {
        let (name, arg) = command.split_once(' ').unwrap_or((command, ""));
        let arg = arg.trim();
        let label = if arg.is_empty() { None } else { Some(arg.to_string()) };
        match name {
            "mark" => {
                let now = chrono::Utc::now();
                self.current_agent_mut().create_mark(label, now);
            }
            "rewind" => {
                if let Err(e) = self.current_agent_mut().rewind_to(label.as_deref()) {
                    warn!(error = %e, "rewind failed");
                }
            }
            "clear" => {
                self.current_agent_mut().conversation.clear();
                self.current_agent_mut().scrollback.clear();
            }
            "exit" => self.quit = true,
            "model" | "system" | "help" | "fork" | "wait" | "pin" => {
                // Recognised but handled above the core runtime (provider
                // catalog, TUI help text, subagent forking) — out of scope
                // for this crate's responsibility.
            }
            _ => warn!(command = %name, "unknown slash command"),
        }
    }

    async fn poll_tool_workers(&mut self) {
        let ids: Vec<Uuid> = self.agents.keys().copied().collect();
        for id in ids {
            let interrupted = self.interrupts.is_requested(id);
            let agent = self.agents.get_mut(&id).unwrap();
            if agent.state() != AgentState::ExecutingTool {
                continue;
            }
            if interrupted {
                if let Some(pid) = agent.tool_child_pid().await {
                    kill_process_group(pid).await;
                }
                agent.interrupt();
                self.interrupts.clear(id);
                continue;
            }
            agent.poll_tool_worker().await;
            if agent.state() == AgentState::ExecutingTool {
                agent.spawn_tool_worker();
            }
        }
    }

    async fn drain_pending_prompts(&mut self) {
        let ids: Vec<Uuid> = self.agents.keys().copied().collect();
        for id in ids {
            let text = {
                let agent = self.agents.get_mut(&id).unwrap();
                if agent.state() != AgentState::Idle {
                    continue;
                }
                agent.pending_prompt.take()
            };
            if let Some(text) = text {
                let agent = self.agents.get_mut(&id).unwrap();
                if let Err(e) = agent.start_turn(&text).await {
                    warn!(error = %e, "turn failed");
                } else if agent.state() == AgentState::ExecutingTool {
                    agent.spawn_tool_worker();
                }
            }
        }
    }

    /// The key-injection buffer (§4.9 step 2) is consumed through the same
    /// stateful input parser as real TTY bytes; wiring a byte-level parser
    /// is the terminal front-end's job, not the control socket's. `SendKeys`
    /// just queues the lines it carries for `run()`'s loop to dispatch.
    fn handle_control_request(&mut self, req: ControlRequest) -> ControlReply {
        match req {
            ControlRequest::ReadFramebuffer => ControlReply::Framebuffer { lines: self.snapshot_framebuffer() },
            ControlRequest::SendKeys { keys } => {
                let mut parts = keys.split('\n').peekable();
                while let Some(part) = parts.next() {
                    if parts.peek().is_some() || !part.is_empty() {
                        self.injected_lines.push_back(part.to_string());
                    }
                }
                ControlReply::Ok { ok: true }
            }
        }
    }

    fn snapshot_framebuffer(&self) -> Vec<FramebufferLine> {
        let sb = &self.current_agent().scrollback;
        (0..sb.len())
            .filter_map(|i| sb.get_line_text(i))
            .map(|(bytes, _)| FramebufferLine {
                spans: vec![FramebufferSpan { text: String::from_utf8_lossy(bytes).into_owned(), style: Value::Null }],
            })
            .collect()
    }
}

#[cfg(unix)]
async fn sigterm_or_pending(sig: &mut tokio::signal::unix::Signal) {
    sig.recv().await;
}

async fn accept_or_pending(
    socket: &Option<ControlSocket>,
) -> Option<(Result<ControlRequest, String>, tokio::net::UnixStream)> {
    match socket {
        Some(s) => match s.accept().await {
            Ok(pair) => Some(pair),
            // The accept()/readline I/O itself failed (no line was ever
            // read) — there is no stream left to reply on.
            Err(_) => std::future::pending().await,
        },
        None => std::future::pending().await,
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
