// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use serde::{Deserialize, Serialize};

fn default_temperature() -> f32 {
    1.0
}
fn default_max_completion_tokens() -> u32 {
    4096
}
fn default_max_tool_turns() -> u32 {
    50
}
fn default_max_output_size() -> usize {
    1_048_576
}
fn default_history_size() -> usize {
    10_000
}
fn default_system_prompt_cap() -> usize {
    1024
}
fn default_runtime_dir() -> String {
    "/tmp/ikigai".into()
}
fn default_provider() -> String {
    "mock".into()
}

/// Top-level configuration (§6 "Config defaults"). Every field has a
/// hard-coded fallback so the client starts with no config file present.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub model: ModelConfig,
    #[serde(default)]
    pub agent: AgentConfig,
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub runtime: RuntimeConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            model: ModelConfig::default(),
            agent: AgentConfig::default(),
            store: StoreConfig::default(),
            runtime: RuntimeConfig::default(),
        }
    }
}

/// Provider selection and sampling parameters sent on every completion
/// request (§4.4). Concrete wire formats live with the provider adapter, not
/// here — this crate only carries the knobs the core needs to build a
/// [`ikigai_model::CompletionRequest`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelConfig {
    /// Provider identifier, resolved by the binary's provider registry.
    #[serde(default = "default_provider")]
    pub provider: String,
    /// Sampling temperature.
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    /// Cap on tokens requested per completion.
    #[serde(default = "default_max_completion_tokens")]
    pub max_completion_tokens: u32,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            temperature: default_temperature(),
            max_completion_tokens: default_max_completion_tokens(),
        }
    }
}

/// Agent-loop bounds (§4.5 `should_continue_tool_loop`, §6 defaults).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentConfig {
    /// Maximum tool-call rounds in a single turn before the loop stops
    /// regardless of `finish_reason`.
    #[serde(default = "default_max_tool_turns")]
    pub max_tool_turns: u32,
    /// Maximum bytes a single tool result may contribute before the worker
    /// truncates it.
    #[serde(default = "default_max_output_size")]
    pub max_output_size: usize,
    /// Maximum number of scrollback lines retained in memory.
    #[serde(default = "default_history_size")]
    pub history_size: usize,
    /// Maximum byte length of a `/system` override.
    #[serde(default = "default_system_prompt_cap")]
    pub system_prompt_cap: usize,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            max_tool_turns: default_max_tool_turns(),
            max_output_size: default_max_output_size(),
            history_size: default_history_size(),
            system_prompt_cap: default_system_prompt_cap(),
        }
    }
}

/// Event-store connection overrides (`IKIGAI_DB_*`, §6). The store's schema
/// and queries are out of scope for this crate; this is only the connection
/// shape consumed via the `EventStore` trait implementation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    pub host: String,
    pub port: u16,
    pub name: String,
    pub user: String,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self { host: "localhost".into(), port: 5432, name: "ikigai".into(), user: "ikigai".into() }
    }
}

/// Process-level directories (`IKIGAI_RUNTIME_DIR`, `IKIGAI_LOG_DIR`, §6).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuntimeConfig {
    /// Directory where `ikigai-<pid>.sock` is created (§4.8).
    pub runtime_dir: String,
    /// Debug log directory; absent unless compiled with DEBUG.
    pub log_dir: Option<String>,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self { runtime_dir: default_runtime_dir(), log_dir: None }
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
