// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use serde::{Deserialize, Serialize};

// ─── Roles ────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
    Tool,
}

// ─── Content blocks ───────────────────────────────────────────────────────────

/// One block of a message's content.
///
/// A message carries an ordered list of these. `ToolCall` and `ToolResult`
/// pair up by `id` / `tool_call_id`; `Thinking` and `RedactedThinking` only
/// ever appear attached to the assistant turn that produced the tool call
/// they preceded (see [`Message::thinking_for_tool_call`]).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentBlock {
    Text { text: String },
    Thinking {
        text: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        signature: Option<String>,
    },
    RedactedThinking { data: String },
    ToolCall {
        id: String,
        name: String,
        /// JSON-encoded argument object.
        arguments_json: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        thought_signature: Option<String>,
    },
    ToolResult {
        tool_call_id: String,
        /// JSON-encoded result payload (a raw string is wrapped as a JSON string).
        content_json: String,
    },
}

impl ContentBlock {
    pub fn text(text: impl Into<String>) -> Self {
        Self::Text { text: text.into() }
    }

    pub fn tool_call(id: impl Into<String>, name: impl Into<String>, arguments_json: impl Into<String>) -> Self {
        Self::ToolCall {
            id: id.into(),
            name: name.into(),
            arguments_json: arguments_json.into(),
            thought_signature: None,
        }
    }

    pub fn tool_result(tool_call_id: impl Into<String>, content_json: impl Into<String>) -> Self {
        Self::ToolResult { tool_call_id: tool_call_id.into(), content_json: content_json.into() }
    }

    /// Approximate token cost of this block (4 chars ≈ 1 token).
    fn approx_tokens(&self) -> usize {
        let chars = match self {
            Self::Text { text } => text.len(),
            Self::Thinking { text, signature } => text.len() + signature.as_deref().unwrap_or("").len(),
            Self::RedactedThinking { data } => data.len(),
            Self::ToolCall { name, arguments_json, .. } => name.len() + arguments_json.len(),
            Self::ToolResult { content_json, .. } => content_json.len(),
        };
        (chars / 4).max(1)
    }
}

// ─── Message ──────────────────────────────────────────────────────────────────

/// A single message in an agent's conversation.
///
/// `interrupted` starts `false` and may flip to `true` exactly once, when the
/// turn this message belongs to is cut short by a user interrupt (§4.11).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: Vec<ContentBlock>,
    #[serde(default)]
    pub interrupted: bool,
}

impl Message {
    pub fn user(text: impl Into<String>) -> Self {
        Self { role: Role::User, content: vec![ContentBlock::text(text)], interrupted: false }
    }

    pub fn assistant(text: impl Into<String>) -> Self {
        Self { role: Role::Assistant, content: vec![ContentBlock::text(text)], interrupted: false }
    }

    pub fn assistant_blocks(content: Vec<ContentBlock>) -> Self {
        Self { role: Role::Assistant, content, interrupted: false }
    }

    pub fn tool_result(tool_call_id: impl Into<String>, content_json: impl Into<String>) -> Self {
        Self {
            role: Role::Tool,
            content: vec![ContentBlock::tool_result(tool_call_id, content_json)],
            interrupted: false,
        }
    }

    /// Plain text, if this message is a single `Text` block (the common case
    /// for `user`/`assistant` turns with no tool activity).
    pub fn as_text(&self) -> Option<&str> {
        match self.content.as_slice() {
            [ContentBlock::Text { text }] => Some(text),
            _ => None,
        }
    }

    /// The tool call this message carries, if any (assistant turns that asked
    /// for a tool hold exactly one).
    pub fn tool_call(&self) -> Option<(&str, &str, &str)> {
        self.content.iter().find_map(|b| match b {
            ContentBlock::ToolCall { id, name, arguments_json, .. } => {
                Some((id.as_str(), name.as_str(), arguments_json.as_str()))
            }
            _ => None,
        })
    }

    pub fn approx_tokens(&self) -> usize {
        self.content.iter().map(ContentBlock::approx_tokens).sum::<usize>().max(1)
    }
}

// ─── Tool schema (sent to the provider) ───────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolSchema {
    pub name: String,
    pub description: String,
    pub parameters: serde_json::Value,
}

// ─── Completion request / response ────────────────────────────────────────────

#[derive(Debug, Clone, Default)]
pub struct CompletionRequest {
    pub messages: Vec<Message>,
    pub tools: Vec<ToolSchema>,
    pub temperature: f32,
    pub max_output_tokens: u32,
}

/// Incremental update emitted by a provider during a streaming response (§4.4).
#[derive(Debug, Clone)]
pub enum StreamEvent {
    Start,
    TextDelta(String),
    ThinkingDelta(String),
    ToolCallStart { index: u32, id: String, name: String },
    ToolCallDelta { index: u32, arguments_fragment: String },
    ToolCallDone { index: u32 },
    Done(Usage),
    Error(String),
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Usage {
    pub input_tokens: u32,
    pub output_tokens: u32,
    pub thinking_tokens: u32,
}

/// The structured accumulation of one whole turn, handed to the state machine
/// once a stream reaches its terminal event.
#[derive(Debug, Clone)]
pub struct CompletionResponse {
    pub model: String,
    pub content_blocks: Vec<ContentBlock>,
    pub finish_reason: FinishReason,
    pub usage: Usage,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FinishReason {
    Stop,
    ToolUse,
    Error,
}

impl FinishReason {
    pub fn is_tool_use(self) -> bool {
        matches!(self, Self::ToolUse)
    }
}

/// The terminal outcome of a streaming request, exactly one of which is
/// produced per `start_stream` call (§5 cancellation semantics).
#[derive(Debug, Clone)]
pub struct Completion {
    pub success: bool,
    pub response: Option<CompletionResponse>,
    pub error_message: Option<String>,
}

impl Completion {
    pub fn failed(error_message: impl Into<String>) -> Self {
        Self { success: false, response: None, error_message: Some(error_message.into()) }
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    // ── Message construction ──────────────────────────────────────────────────

    #[test]
    fn user_message_is_single_text_block() {
        let m = Message::user("hello");
        assert_eq!(m.role, Role::User);
        assert_eq!(m.as_text(), Some("hello"));
        assert!(!m.interrupted);
    }

    #[test]
    fn assistant_blocks_with_tool_call_round_trips() {
        let m = Message::assistant_blocks(vec![
            ContentBlock::Thinking { text: "reasoning".into(), signature: Some("sig".into()) },
            ContentBlock::tool_call("t1", "glob", r#"{"pattern":"*.c"}"#),
        ]);
        assert!(m.as_text().is_none());
        let (id, name, args) = m.tool_call().unwrap();
        assert_eq!((id, name, args), ("t1", "glob", r#"{"pattern":"*.c"}"#));
    }

    #[test]
    fn tool_result_message_has_no_text_accessor() {
        let m = Message::tool_result("t1", r#"{"files":["a.c"]}"#);
        assert_eq!(m.role, Role::Tool);
        assert!(m.as_text().is_none());
    }

    // ── Token approximation ───────────────────────────────────────────────────

    #[test]
    fn approx_tokens_text_divides_by_four() {
        assert_eq!(Message::user("12345678").approx_tokens(), 2);
    }

    #[test]
    fn approx_tokens_minimum_is_one() {
        assert_eq!(Message::user("").approx_tokens(), 1);
    }

    // ── Serialisation round-trip ──────────────────────────────────────────────

    #[test]
    fn message_serialises_and_deserialises() {
        let original = Message::user("payload");
        let json = serde_json::to_string(&original).unwrap();
        let decoded: Message = serde_json::from_str(&json).unwrap();
        assert_eq!(decoded.as_text(), Some("payload"));
        assert!(!decoded.interrupted);
    }

    #[test]
    fn thinking_block_without_signature_omits_field() {
        let b = ContentBlock::Thinking { text: "t".into(), signature: None };
        let json = serde_json::to_string(&b).unwrap();
        assert!(!json.contains("signature"));
    }

    #[test]
    fn finish_reason_tool_use_detection() {
        assert!(FinishReason::ToolUse.is_tool_use());
        assert!(!FinishReason::Stop.is_tool_use());
    }

    #[test]
    fn failed_completion_has_no_response() {
        let c = Completion::failed("boom");
        assert!(!c.success);
        assert!(c.response.is_none());
        assert_eq!(c.error_message.as_deref(), Some("boom"));
    }
}
