// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
mod cli;

use std::sync::Arc;

use clap::Parser;
use cli::Cli;
use ikigai_core::{bootstrap_events_if_empty, replay, Agent, ControlSocket, EventLoop};
use ikigai_model::{MockProvider, ModelProvider};
use ikigai_tools::{GlobTool, ToolRegistry};
use tracing_subscriber::{filter::EnvFilter, fmt, prelude::*};
use uuid::Uuid;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // In TTY mode, tracing output on stderr would corrupt the live display.
    // Suppress it unless the caller explicitly opts in via IKIGAI_LOG_DIR
    // (writes to a file, §6) or --headless (writes to stderr).
    let is_tty = !cli.headless;
    init_logging(cli.verbose, is_tty);

    let config = ikigai_config::load(cli.config.as_deref())?;

    if cli.show_config {
        println!("{}", serde_yaml::to_string(&config)?);
        return Ok(());
    }

    let session_id = Uuid::new_v4();
    let agent_id = Uuid::new_v4();

    let system_prompt_path = std::env::var("IKIGAI_SYSTEM_PROMPT").unwrap_or_else(|_| "/etc/ikigai/system.md".to_string());
    let bootstrap = bootstrap_events_if_empty(&[], session_id, agent_id, chrono::Utc::now(), &system_prompt_path);
    let replayed = replay(&bootstrap);

    let provider = resolve_provider(&config.model.provider);
    let mut tools = ToolRegistry::new();
    tools.register(GlobTool);

    let mut agent = Agent::new(agent_id, None, provider, Arc::new(tools), config.model.clone(), config.agent.clone());
    agent.conversation = replayed.conversation;
    agent.scrollback = replayed.scrollback;
    agent.marks = replayed.marks;

    let control_socket = match ControlSocket::bind(&config.runtime.runtime_dir, std::process::id()) {
        Ok(socket) => Some(socket),
        Err(e) => {
            tracing::warn!(error = %e, "failed to bind control socket, continuing without it");
            None
        }
    };

    let mut event_loop = EventLoop::new(agent, control_socket, cli.headless);
    event_loop.run().await
}

/// Resolve a provider name to a concrete [`ModelProvider`] (§6
/// `IKIGAI_DEFAULT_PROVIDER`). Only the deterministic mock backend ships
/// with this binary; a real deployment links a concrete wire-format adapter
/// and extends this match.
fn resolve_provider(name: &str) -> Arc<dyn ModelProvider> {
    match name {
        "mock" => Arc::new(MockProvider),
        other => {
            tracing::warn!(provider = %other, "unknown provider, falling back to mock");
            Arc::new(MockProvider)
        }
    }
}

fn init_logging(verbosity: u8, is_tty: bool) {
    if is_tty {
        if let Ok(log_dir) = std::env::var("IKIGAI_LOG_DIR") {
            let path = std::path::Path::new(&log_dir).join(format!("ikigai-{}.log", std::process::id()));
            if let Ok(file) = std::fs::OpenOptions::new().create(true).append(true).open(&path) {
                let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("debug"));
                let _ = tracing_subscriber::registry()
                    .with(fmt::layer().with_target(true).with_ansi(false).with_writer(std::sync::Mutex::new(file)))
                    .with(filter)
                    .try_init();
                return;
            }
        }
        // No log directory configured: suppress output so the live display
        // is never interleaved with log lines.
        let _ = tracing_subscriber::registry().with(tracing_subscriber::filter::LevelFilter::OFF).try_init();
        return;
    }

    let level = match verbosity {
        0 => "warn",
        1 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    let _ = tracing_subscriber::registry().with(fmt::layer().with_target(false)).with(filter).try_init();
}
