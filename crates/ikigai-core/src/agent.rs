// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use std::sync::Arc;

use futures::StreamExt;
use ikigai_config::{AgentConfig, ModelConfig};
use ikigai_model::{Completion, CompletionRequest, ContentBlock, FinishReason, Message, ModelProvider, Role};
use ikigai_tools::{ToolCall, ToolRegistry};
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::marks::Marks;
use crate::render::render_event;
use crate::events::EventKind;
use crate::scrollback::Scrollback;
use crate::session::Conversation;
use crate::tool_worker::{self, ToolWorkerState};

/// §4.5 states.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AgentState {
    Idle,
    WaitingForLLM,
    ExecutingTool,
}

struct PendingThinking {
    text: Option<String>,
    signature: Option<String>,
    redacted: Option<String>,
}

impl Default for PendingThinking {
    fn default() -> Self {
        Self { text: None, signature: None, redacted: None }
    }
}

/// One conversational agent: owns its conversation, scrollback, marks,
/// provider handle, and tool-worker slot (§3 "Ownership").
pub struct Agent {
    pub id: Uuid,
    pub parent_id: Option<Uuid>,
    pub conversation: Conversation,
    pub scrollback: Scrollback,
    pub marks: Marks,
    pub dead: bool,

    state: AgentState,
    model: Arc<dyn ModelProvider>,
    tools: Arc<ToolRegistry>,
    model_config: ModelConfig,
    agent_config: AgentConfig,
    tool_iteration_count: u32,
    last_finish_reason: Option<FinishReason>,
    pending_tool_call: Option<(String, String, String)>,
    pending_thinking: PendingThinking,
    tool_worker: Option<Arc<Mutex<ToolWorkerState>>>,
    /// Injected after a fork; consumed on the next event-loop tick (§3).
    pub pending_prompt: Option<String>,
}

impl Agent {
    pub fn new(
        id: Uuid,
        parent_id: Option<Uuid>,
        model: Arc<dyn ModelProvider>,
        tools: Arc<ToolRegistry>,
        model_config: ModelConfig,
        agent_config: AgentConfig,
    ) -> Self {
        Self {
            id,
            parent_id,
            conversation: Conversation::new(),
            scrollback: Scrollback::new(),
            marks: Marks::new(),
            dead: false,
            state: AgentState::Idle,
            model,
            tools,
            model_config,
            agent_config,
            tool_iteration_count: 0,
            last_finish_reason: None,
            pending_tool_call: None,
            pending_thinking: PendingThinking::default(),
            tool_worker: None,
            pending_prompt: None,
        }
    }

    pub fn state(&self) -> AgentState {
        self.state
    }

    /// True iff the last completion requested a tool and the per-turn tool
    /// round cap has not been reached (§4.5).
    pub fn should_continue_tool_loop(&self) -> bool {
        self.last_finish_reason.map(FinishReason::is_tool_use).unwrap_or(false)
            && self.tool_iteration_count < self.agent_config.max_tool_turns
    }

    /// `Idle` → `WaitingForLLM`: build a request from the conversation and
    /// begin a stream. The caller awaits the returned future to drive the
    /// stream to completion; dropping it early is this crate's cancellation
    /// mechanism (see `ikigai_model::ModelProvider`).
    pub async fn start_turn(&mut self, user_text: &str) -> anyhow::Result<Completion> {
        assert_eq!(self.state, AgentState::Idle);
        self.conversation.push(Message::user(user_text));
        render_event(&mut self.scrollback, EventKind::User, Some(user_text), None, false).ok();

        self.state = AgentState::WaitingForLLM;
        self.tool_iteration_count = 0;
        self.run_stream().await
    }

    async fn run_stream(&mut self) -> anyhow::Result<Completion> {
        let request = CompletionRequest {
            messages: self.conversation.messages.clone(),
            tools: self.tools.schemas().into_iter().map(|s| ikigai_model::ToolSchema {
                name: s.name,
                description: s.description,
                parameters: s.parameters,
            }).collect(),
            temperature: self.model_config.temperature,
            max_output_tokens: self.model_config.max_completion_tokens,
        };
        let completion = match self.model.start_stream(request).await {
            Ok(stream) => accumulate_stream(self.model.model_name(), stream).await,
            Err(e) => Completion::failed(e.to_string()),
        };
        self.apply_completion(completion.clone());
        Ok(completion)
    }

    /// Apply a terminal [`Completion`], performing the transition named in
    /// the §4.5 table.
    fn apply_completion(&mut self, completion: Completion) {
        if !completion.success {
            render_event(&mut self.scrollback, EventKind::Assistant, completion.error_message.as_deref(), None, false).ok();
            self.state = AgentState::Idle;
            self.last_finish_reason = None;
            return;
        }
        let response = completion.response.expect("success completion carries a response");
        self.last_finish_reason = Some(response.finish_reason);

        let tool_call = response.content_blocks.iter().find_map(|b| match b {
            ContentBlock::ToolCall { id, name, arguments_json, .. } => Some((id.clone(), name.clone(), arguments_json.clone())),
            _ => None,
        });
        for block in &response.content_blocks {
            match block {
                ContentBlock::Thinking { text, signature } => {
                    self.pending_thinking.text = Some(text.clone());
                    self.pending_thinking.signature = signature.clone();
                }
                ContentBlock::RedactedThinking { data } => {
                    self.pending_thinking.redacted = Some(data.clone());
                }
                _ => {}
            }
        }

        if response.finish_reason.is_tool_use() {
            let (id, name, args) = tool_call.expect("tool_use finish reason carries a tool call");
            let mut blocks = Vec::new();
            if let Some(text) = self.pending_thinking.text.take() {
                blocks.push(ContentBlock::Thinking { text, signature: self.pending_thinking.signature.take() });
            }
            if let Some(data) = self.pending_thinking.redacted.take() {
                blocks.push(ContentBlock::RedactedThinking { data });
            }
            blocks.push(ContentBlock::tool_call(&id, &name, &args));
            self.conversation.push(Message::assistant_blocks(blocks));
            let args_value: serde_json::Value = serde_json::from_str(&args).unwrap_or(serde_json::Value::Null);
            render_event(&mut self.scrollback, EventKind::ToolCall, None, Some(&serde_json::json!({"tool_name": name, "tool_args": args_value})), false).ok();

            self.pending_tool_call = Some((id, name, args));
            self.pending_thinking = PendingThinking::default();
            self.state = AgentState::ExecutingTool;
        } else {
            self.pending_thinking = PendingThinking::default();
            if let Some(text) = response.content_blocks.iter().find_map(|b| match b {
                ContentBlock::Text { text } => Some(text.clone()),
                _ => None,
            }) {
                self.conversation.push(Message::assistant(&text));
                render_event(&mut self.scrollback, EventKind::Assistant, Some(&text), None, false).ok();
            }
            self.state = AgentState::Idle;
        }
    }

    /// `ExecutingTool` lifecycle step 1 (§4.7): spawn the worker for the
    /// pending tool call.
    pub fn spawn_tool_worker(&mut self) {
        let (id, name, args) = self.pending_tool_call.clone().expect("spawn_tool_worker requires a pending call");
        let parsed_args: serde_json::Value = serde_json::from_str(&args).unwrap_or(serde_json::Value::Null);
        let call = ToolCall { id, name, args: parsed_args };
        let state = Arc::new(Mutex::new(ToolWorkerState { running: true, ..Default::default() }));
        self.tool_worker = Some(state.clone());
        let registry = self.tools.clone();
        tokio::spawn(async move {
            tool_worker::run(registry, call, state).await;
        });
    }

    /// `ExecutingTool` lifecycle step 3 (§4.7): poll the worker slot; if
    /// complete, consume the result and transition per `should_continue_tool_loop`.
    pub async fn poll_tool_worker(&mut self) -> bool {
        let Some(state) = self.tool_worker.clone() else { return false };
        let complete = { state.lock().await.complete };
        if !complete {
            return false;
        }
        let result = { state.lock().await.result.clone() }.unwrap_or(serde_json::Value::Null);
        self.tool_worker = None;
        let (call_id, _name, _) = self.pending_tool_call.take().expect("complete worker implies a pending call");

        let success = result.get("tool_success").and_then(|v| v.as_bool()).unwrap_or(false);
        let output = result.get("output_or_error").and_then(|v| v.as_str()).unwrap_or_default().to_string();
        self.conversation.push(Message::tool_result(&call_id, &output));
        render_event(&mut self.scrollback, EventKind::ToolResult, Some(&output), Some(&serde_json::json!({"success": success})), false).ok();

        self.tool_iteration_count += 1;
        if self.should_continue_tool_loop() {
            self.state = AgentState::WaitingForLLM;
            let _ = self.run_stream().await;
        } else {
            self.state = AgentState::Idle;
        }
        true
    }

    /// The tool worker's child process group leader, if one is currently
    /// running (§4.11, interrupt-while-`ExecutingTool` needs this to send
    /// the process group a signal before tearing down agent state).
    pub async fn tool_child_pid(&self) -> Option<u32> {
        match &self.tool_worker {
            Some(state) => *state.lock().await.ctx.child_pid.lock().unwrap(),
            None => None,
        }
    }

    /// §4.11: mark the current turn interrupted and return to `Idle`. The
    /// caller is responsible for cancelling the in-flight stream or killing
    /// the tool worker's process group before calling this.
    pub fn interrupt(&mut self) {
        let boundary = self
            .conversation
            .messages
            .iter()
            .rposition(|m| m.role == Role::User)
            .unwrap_or(0);
        self.conversation.mark_interrupted_from(boundary);
        self.state = AgentState::Idle;
        self.pending_tool_call = None;
        self.tool_worker = None;
    }

    /// §4.10: checkpoint the current conversation length.
    pub fn create_mark(&mut self, label: Option<String>, created_at: chrono::DateTime<chrono::Utc>) {
        render_event(&mut self.scrollback, EventKind::Mark, None, label_data(&label).as_ref(), false).ok();
        self.marks.create(self.conversation.len(), label, created_at);
    }

    /// §4.10: truncate the conversation and marks back to `label`'s mark (or
    /// the most recent mark if `label` is `None`), then rebuild scrollback
    /// from scratch over what survives, matching how [`crate::replay`] does
    /// it so a rewind looks identical whether it happens live or on restart.
    pub fn rewind_to(&mut self, label: Option<&str>) -> Result<(), crate::marks::MarkError> {
        let target = self.marks.find(label)?.clone();
        self.conversation.truncate(target.message_index);
        self.marks.truncate_after(target.message_index, target.created_at);
        self.scrollback.clear();
        for msg in &self.conversation.messages {
            let kind = match msg.role {
                Role::User => EventKind::User,
                Role::Assistant => EventKind::Assistant,
                Role::Tool => EventKind::ToolResult,
            };
            if let Some(text) = msg.as_text() {
                let _ = render_event(&mut self.scrollback, kind, Some(text), None, msg.interrupted);
            }
        }
        for mark in self.marks.iter() {
            let _ = render_event(&mut self.scrollback, EventKind::Mark, None, label_data(&mark.label).as_ref(), false);
        }
        self.state = AgentState::Idle;
        self.pending_tool_call = None;
        self.tool_worker = None;
        Ok(())
    }
}

fn label_data(label: &Option<String>) -> Option<serde_json::Value> {
    label.as_ref().map(|l| serde_json::json!({"label": l}))
}

/// Drive a [`ikigai_model::ResponseStream`] to its terminal event, folding
/// deltas into a [`Completion`]. This is the async-Rust replacement for the
/// pull-based `perform()` pump (§9): the caller simply `.await`s this, and
/// dropping that future is the cancellation mechanism.
async fn accumulate_stream(model: &str, mut stream: ikigai_model::ResponseStream) -> Completion {
    use ikigai_model::{CompletionResponse, StreamEvent, Usage};

    let mut text = String::new();
    let mut thinking = String::new();
    let mut tool_call: Option<(String, String, String)> = None;
    let mut usage = Usage::default();
    let mut error: Option<String> = None;

    while let Some(event) = stream.next().await {
        match event {
            Ok(StreamEvent::Start) => {}
            Ok(StreamEvent::TextDelta(chunk)) => text.push_str(&chunk),
            Ok(StreamEvent::ThinkingDelta(chunk)) => thinking.push_str(&chunk),
            Ok(StreamEvent::ToolCallStart { id, name, .. }) => {
                tool_call = Some((id, name, String::new()));
            }
            Ok(StreamEvent::ToolCallDelta { arguments_fragment, .. }) => {
                if let Some((_, _, args)) = &mut tool_call {
                    args.push_str(&arguments_fragment);
                }
            }
            Ok(StreamEvent::ToolCallDone { .. }) => {}
            Ok(StreamEvent::Done(u)) => {
                usage = u;
                break;
            }
            Ok(StreamEvent::Error(msg)) => {
                error = Some(msg);
                break;
            }
            Err(e) => {
                error = Some(e.to_string());
                break;
            }
        }
    }

    if let Some(msg) = error {
        return Completion::failed(msg);
    }

    let mut blocks = Vec::new();
    if !thinking.is_empty() {
        blocks.push(ContentBlock::Thinking { text: thinking, signature: None });
    }
    let finish_reason = if let Some((id, name, args)) = tool_call {
        blocks.push(ContentBlock::tool_call(id, name, args));
        FinishReason::ToolUse
    } else {
        if !text.is_empty() {
            blocks.push(ContentBlock::text(text));
        }
        FinishReason::Stop
    };

    Completion {
        success: true,
        response: Some(CompletionResponse { model: model.to_string(), content_blocks: blocks, finish_reason, usage }),
        error_message: None,
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use ikigai_model::ScriptedMockProvider;
    use ikigai_tools::GlobTool;

    use super::*;

    fn tools() -> Arc<ToolRegistry> {
        let mut r = ToolRegistry::new();
        r.register(GlobTool);
        Arc::new(r)
    }

    fn agent_config(max_tool_turns: u32) -> AgentConfig {
        AgentConfig { max_tool_turns, ..AgentConfig::default() }
    }

    #[tokio::test]
    async fn idle_agent_submits_and_returns_to_idle_on_text_reply() {
        let provider = Arc::new(ScriptedMockProvider::always_text("hello there"));
        let mut agent = Agent::new(Uuid::new_v4(), None, provider, tools(), ModelConfig::default(), agent_config(50));
        assert_eq!(agent.state(), AgentState::Idle);
        let completion = agent.start_turn("hi").await.unwrap();
        assert!(completion.success);
        assert_eq!(agent.state(), AgentState::Idle);
        assert_eq!(agent.conversation.len(), 2);
    }

    #[tokio::test]
    async fn tool_use_completion_transitions_to_executing_tool() {
        let provider = Arc::new(ScriptedMockProvider::tool_then_text("c1", "glob", r#"{"pattern":"*.rs","root":"/tmp"}"#, "done"));
        let mut agent = Agent::new(Uuid::new_v4(), None, provider, tools(), ModelConfig::default(), agent_config(50));
        agent.start_turn("find rust files").await.unwrap();
        assert_eq!(agent.state(), AgentState::ExecutingTool);
        assert!(agent.should_continue_tool_loop());
    }

    #[tokio::test]
    async fn full_tool_round_trip_returns_to_idle() {
        let provider = Arc::new(ScriptedMockProvider::tool_then_text("c1", "glob", r#"{"pattern":"*.rs","root":"/tmp"}"#, "done"));
        let mut agent = Agent::new(Uuid::new_v4(), None, provider, tools(), ModelConfig::default(), agent_config(50));
        agent.start_turn("find rust files").await.unwrap();
        agent.spawn_tool_worker();
        // Poll until the spawned worker task completes.
        loop {
            if agent.poll_tool_worker().await {
                break;
            }
            tokio::task::yield_now().await;
        }
        assert_eq!(agent.state(), AgentState::Idle);
        // user, assistant(tool_call), tool_result, assistant(final text)
        assert_eq!(agent.conversation.len(), 4);
    }

    #[tokio::test]
    async fn failed_completion_returns_to_idle_without_tool_loop() {
        struct FailingProvider;
        #[async_trait::async_trait]
        impl ModelProvider for FailingProvider {
            fn name(&self) -> &str { "failing" }
            fn model_name(&self) -> &str { "failing-model" }
            async fn start_stream(&self, _req: CompletionRequest) -> anyhow::Result<ikigai_model::ResponseStream> {
                anyhow::bail!("connection refused")
            }
        }
        let mut agent = Agent::new(Uuid::new_v4(), None, Arc::new(FailingProvider), tools(), ModelConfig::default(), agent_config(50));
        let completion = agent.start_turn("hi").await.unwrap();
        assert!(!completion.success);
        assert_eq!(agent.state(), AgentState::Idle);
    }

    #[tokio::test]
    async fn interrupt_marks_current_turn_messages() {
        let provider = Arc::new(ScriptedMockProvider::always_text("reply"));
        let mut agent = Agent::new(Uuid::new_v4(), None, provider, tools(), ModelConfig::default(), agent_config(50));
        agent.start_turn("hi").await.unwrap();
        agent.interrupt();
        assert!(agent.conversation.messages.iter().all(|m| m.interrupted));
    }

    #[test]
    fn should_continue_tool_loop_false_when_turns_exhausted() {
        let provider = Arc::new(ScriptedMockProvider::always_text("x"));
        let mut agent = Agent::new(Uuid::new_v4(), None, provider, tools(), ModelConfig::default(), agent_config(0));
        agent.last_finish_reason = Some(FinishReason::ToolUse);
        assert!(!agent.should_continue_tool_loop());
    }

    #[tokio::test]
    async fn rewind_to_mark_truncates_conversation_and_rebuilds_scrollback() {
        let provider = Arc::new(ScriptedMockProvider::always_text("reply"));
        let mut agent = Agent::new(Uuid::new_v4(), None, provider, tools(), ModelConfig::default(), agent_config(50));
        agent.start_turn("first").await.unwrap();
        let now = chrono::DateTime::parse_from_rfc3339("2026-01-01T00:00:00Z").unwrap().with_timezone(&chrono::Utc);
        agent.create_mark(Some("ckpt".into()), now);
        agent.start_turn("second").await.unwrap();
        assert_eq!(agent.conversation.len(), 4);

        agent.rewind_to(Some("ckpt")).unwrap();
        assert_eq!(agent.conversation.len(), 2);
        assert!(!agent.scrollback.is_empty());
        assert_eq!(agent.marks.len(), 1);
    }

    #[tokio::test]
    async fn rewind_to_unknown_label_is_error() {
        let provider = Arc::new(ScriptedMockProvider::always_text("reply"));
        let mut agent = Agent::new(Uuid::new_v4(), None, provider, tools(), ModelConfig::default(), agent_config(50));
        agent.start_turn("hi").await.unwrap();
        assert!(agent.rewind_to(Some("nope")).is_err());
    }
}
