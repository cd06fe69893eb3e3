// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use serde_json::Value;
use thiserror::Error;

use crate::events::EventKind;
use crate::scrollback::Scrollback;

#[derive(Debug, Error)]
pub enum RenderError {
    #[error("invalid event kind for rendering")]
    InvalidKind,
}

const STYLE_NORMAL: &str = "\x1b[0m";
const STYLE_INTERRUPTED: &str = "\x1b[2m";
const STYLE_TOOL_CALL: &str = "\x1b[36m";
const STYLE_SUCCESS: &str = "\x1b[0m";
const STYLE_ERROR: &str = "\x1b[31m";

/// Deterministic mapping `(kind, content, data, interrupted) → scrollback
/// lines` (§4.2). Live dispatch and replay call the same function, which is
/// what makes restart invisible to the user.
pub fn render_event(
    scrollback: &mut Scrollback,
    kind: EventKind,
    content: Option<&str>,
    data: Option<&Value>,
    interrupted: bool,
) -> Result<(), RenderError> {
    match kind {
        EventKind::User | EventKind::Assistant | EventKind::System | EventKind::ToolResult => {
            render_text_block(scrollback, kind, content, data, interrupted);
        }
        EventKind::ToolCall => render_tool_call(scrollback, content, data, interrupted),
        EventKind::Mark => render_mark(scrollback, data),
        EventKind::Rewind | EventKind::Clear | EventKind::Interrupted | EventKind::Usage | EventKind::Fork => {
            // Deterministic no-op renderings: these kinds carry no durable
            // visible text of their own in this client.
        }
        EventKind::Command => {}
    }
    Ok(())
}

fn render_text_block(
    scrollback: &mut Scrollback,
    kind: EventKind,
    content: Option<&str>,
    data: Option<&Value>,
    interrupted: bool,
) {
    let Some(text) = content.map(str::trim_end) else { return };
    if text.is_empty() {
        return;
    }
    let style = if interrupted {
        STYLE_INTERRUPTED
    } else if kind == EventKind::ToolResult {
        tool_result_style(data)
    } else {
        STYLE_NORMAL
    };
    for line in text.split('\n') {
        scrollback.append_line(format!("{style}{line}{STYLE_NORMAL}"));
    }
    scrollback.append_line("");
}

fn tool_result_style(data: Option<&Value>) -> &'static str {
    match data.and_then(|d| d.get("success")).and_then(Value::as_bool) {
        Some(false) => STYLE_ERROR,
        _ => STYLE_SUCCESS,
    }
}

fn render_tool_call(scrollback: &mut Scrollback, content: Option<&str>, data: Option<&Value>, interrupted: bool) {
    let style = if interrupted { STYLE_INTERRUPTED } else { STYLE_TOOL_CALL };
    let summary = content.map(str::to_string).unwrap_or_else(|| tool_call_summary(data));
    scrollback.append_line(format!("{style}{summary}{STYLE_NORMAL}"));
    scrollback.append_line("");
}

fn tool_call_summary(data: Option<&Value>) -> String {
    let name = data.and_then(|d| d.get("tool_name")).and_then(Value::as_str).unwrap_or("?");
    let hint = data
        .and_then(|d| d.get("tool_args"))
        .map(|v| v.to_string())
        .unwrap_or_default();
    let hint: String = hint.chars().take(40).collect();
    format!("→ {name}({hint})")
}

fn render_mark(scrollback: &mut Scrollback, data: Option<&Value>) {
    let label = data.and_then(|d| d.get("label")).and_then(Value::as_str).filter(|s| !s.is_empty());
    let line = match label {
        Some(l) => format!("/mark {l}"),
        None => "/mark".to_string(),
    };
    scrollback.append_line(line);
    scrollback.append_line("");
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
