// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use std::path::PathBuf;

use clap::Parser;

/// `ikigai` launches the interactive TTY client; `ikigai --headless` runs
/// the same event loop with no TTY attached, control socket still active
/// (tests and automation, §6 "CLI").
#[derive(Parser, Debug)]
#[command(name = "ikigai", version, about = "A terminal multi-agent LLM orchestration client")]
pub struct Cli {
    /// Run without a TTY. The control socket remains active.
    #[arg(long)]
    pub headless: bool,

    /// Increase log verbosity (only takes effect in headless mode; see
    /// `init_logging`).
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Explicit config file, merged as the highest-priority file layer.
    #[arg(long, short = 'c')]
    pub config: Option<PathBuf>,

    /// Print the resolved configuration as YAML and exit.
    #[arg(long)]
    pub show_config: bool,
}
