// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use std::path::{Path, PathBuf};

use anyhow::Context;
use tracing::debug;

use crate::Config;

/// Ordered list of config file locations searched from lowest to highest priority.
/// Later files override earlier ones.
fn config_search_paths() -> Vec<PathBuf> {
    let mut paths = Vec::new();

    paths.push(PathBuf::from("/etc/ikigai/config.yaml"));
    paths.push(PathBuf::from("/etc/ikigai/config.yml"));

    if let Some(home) = dirs::home_dir() {
        paths.push(home.join(".config/ikigai/config.yaml"));
        paths.push(home.join(".config/ikigai/config.yml"));
    }
    if let Some(cfg) = dirs::config_dir() {
        paths.push(cfg.join("ikigai/config.yaml"));
        paths.push(cfg.join("ikigai/config.yml"));
    }

    paths.push(PathBuf::from(".ikigai.yaml"));
    paths.push(PathBuf::from(".ikigai.yml"));

    paths
}

/// Load configuration by merging all discovered YAML files, then applying
/// `IKIGAI_*` environment overrides (§6) as the highest-priority layer.
/// The `extra` argument may provide an explicit path (e.g. `--config` CLI flag).
pub fn load(extra: Option<&Path>) -> anyhow::Result<Config> {
    let mut merged = serde_yaml::Value::Mapping(serde_yaml::Mapping::new());

    for path in config_search_paths() {
        if path.is_file() {
            debug!(path = %path.display(), "loading config layer");
            let text = std::fs::read_to_string(&path)
                .with_context(|| format!("reading {}", path.display()))?;
            let layer: serde_yaml::Value = serde_yaml::from_str(&text)
                .with_context(|| format!("parsing {}", path.display()))?;
            merge_yaml(&mut merged, layer);
        }
    }

    if let Some(p) = extra {
        debug!(path = %p.display(), "loading explicit config");
        let text =
            std::fs::read_to_string(p).with_context(|| format!("reading {}", p.display()))?;
        let layer: serde_yaml::Value =
            serde_yaml::from_str(&text).with_context(|| format!("parsing {}", p.display()))?;
        merge_yaml(&mut merged, layer);
    }

    let mut config: Config = if matches!(merged, serde_yaml::Value::Mapping(ref m) if m.is_empty())
    {
        Config::default()
    } else {
        serde_yaml::from_value(merged).unwrap_or_default()
    };

    apply_env_overrides(&mut config);
    Ok(config)
}

/// Apply `IKIGAI_*` environment variable overrides on top of the merged file
/// config (§6). Each one is independently optional; absence leaves the file
/// value (or struct default) untouched.
fn apply_env_overrides(config: &mut Config) {
    if let Ok(v) = std::env::var("IKIGAI_RUNTIME_DIR") {
        config.runtime.runtime_dir = v;
    }
    if let Ok(v) = std::env::var("IKIGAI_LOG_DIR") {
        config.runtime.log_dir = Some(v);
    }
    if let Ok(v) = std::env::var("IKIGAI_DEFAULT_PROVIDER") {
        config.model.provider = v;
    }
    if let Ok(v) = std::env::var("IKIGAI_DB_HOST") {
        config.store.host = v;
    }
    if let Ok(v) = std::env::var("IKIGAI_DB_PORT") {
        if let Ok(port) = v.parse() {
            config.store.port = port;
        }
    }
    if let Ok(v) = std::env::var("IKIGAI_DB_NAME") {
        config.store.name = v;
    }
    if let Ok(v) = std::env::var("IKIGAI_DB_USER") {
        config.store.user = v;
    }
}

/// Deep-merge `src` into `dst`; src wins on scalar conflicts.
fn merge_yaml(dst: &mut serde_yaml::Value, src: serde_yaml::Value) {
    match (dst, src) {
        (serde_yaml::Value::Mapping(d), serde_yaml::Value::Mapping(s)) => {
            for (k, v) in s {
                let entry = d
                    .entry(k)
                    .or_insert(serde_yaml::Value::Mapping(serde_yaml::Mapping::new()));
                merge_yaml(entry, v);
            }
        }
        (dst, src) => *dst = src,
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
