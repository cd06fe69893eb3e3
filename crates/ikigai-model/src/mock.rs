// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use futures::stream;

use crate::provider::{InputModality, ResponseStream};
use crate::{CompletionRequest, Role, StreamEvent, Usage};

/// Deterministic mock provider for tests. Echoes the last user message back
/// as the assistant response.
#[derive(Default)]
pub struct MockProvider;

#[async_trait]
impl crate::ModelProvider for MockProvider {
    fn name(&self) -> &str {
        "mock"
    }
    fn model_name(&self) -> &str {
        "mock-model"
    }

    async fn start_stream(&self, req: CompletionRequest) -> anyhow::Result<ResponseStream> {
        let reply = req
            .messages
            .iter()
            .rev()
            .find(|m| m.role == Role::User)
            .and_then(|m| m.as_text())
            .unwrap_or("[no input]")
            .to_string();

        let events: Vec<anyhow::Result<StreamEvent>> = vec![
            Ok(StreamEvent::Start),
            Ok(StreamEvent::TextDelta(format!("MOCK: {reply}"))),
            Ok(StreamEvent::Done(Usage { input_tokens: 10, output_tokens: 10, thinking_tokens: 0 })),
        ];
        Ok(Box::pin(stream::iter(events)))
    }
}

/// A pre-scripted mock provider. Each call to `start_stream` pops the next
/// response script from the front of the queue. This lets tests specify
/// exact event sequences — including tool calls — without network access.
pub struct ScriptedMockProvider {
    scripts: Arc<Mutex<Vec<Vec<StreamEvent>>>>,
    name: String,
    modalities: Vec<InputModality>,
    /// The last `CompletionRequest` seen by this provider, for assertions.
    pub last_request: Arc<Mutex<Option<CompletionRequest>>>,
}

impl ScriptedMockProvider {
    /// Build a provider from a list of response scripts. The outer `Vec` is
    /// the ordered list of calls; the inner `Vec` is the sequence of
    /// [`StreamEvent`]s emitted for that call.
    pub fn new(scripts: Vec<Vec<StreamEvent>>) -> Self {
        Self {
            scripts: Arc::new(Mutex::new(scripts)),
            name: "scripted-mock".into(),
            modalities: vec![InputModality::Text],
            last_request: Arc::new(Mutex::new(None)),
        }
    }

    pub fn with_vision(mut self) -> Self {
        self.modalities = vec![InputModality::Text, InputModality::Image];
        self
    }

    /// Convenience: provider that always returns a single text reply.
    pub fn always_text(reply: impl Into<String>) -> Self {
        let r = reply.into();
        Self::new(vec![vec![
            StreamEvent::Start,
            StreamEvent::TextDelta(r),
            StreamEvent::Done(Usage { input_tokens: 5, output_tokens: 5, thinking_tokens: 0 }),
        ]])
    }

    /// Convenience: provider that returns a tool call followed by a text reply,
    /// mirroring the two-round exchange in scenario S2.
    pub fn tool_then_text(
        tool_id: impl Into<String>,
        tool_name: impl Into<String>,
        args_json: impl Into<String>,
        final_text: impl Into<String>,
    ) -> Self {
        let id = tool_id.into();
        Self::new(vec![
            vec![
                StreamEvent::Start,
                StreamEvent::ToolCallStart { index: 0, id: id.clone(), name: tool_name.into() },
                StreamEvent::ToolCallDelta { index: 0, arguments_fragment: args_json.into() },
                StreamEvent::ToolCallDone { index: 0 },
                StreamEvent::Done(Usage { input_tokens: 5, output_tokens: 5, thinking_tokens: 0 }),
            ],
            vec![
                StreamEvent::Start,
                StreamEvent::TextDelta(final_text.into()),
                StreamEvent::Done(Usage { input_tokens: 5, output_tokens: 5, thinking_tokens: 0 }),
            ],
        ])
    }

    /// Convenience: provider that emits a thinking delta before its text reply.
    pub fn thinking_then_text(thinking: impl Into<String>, reply: impl Into<String>) -> Self {
        Self::new(vec![vec![
            StreamEvent::Start,
            StreamEvent::ThinkingDelta(thinking.into()),
            StreamEvent::TextDelta(reply.into()),
            StreamEvent::Done(Usage { input_tokens: 5, output_tokens: 5, thinking_tokens: 5 }),
        ]])
    }
}

#[async_trait]
impl crate::ModelProvider for ScriptedMockProvider {
    fn name(&self) -> &str {
        &self.name
    }
    fn model_name(&self) -> &str {
        "scripted-mock-model"
    }

    fn input_modalities(&self) -> Vec<InputModality> {
        self.modalities.clone()
    }

    async fn start_stream(&self, req: CompletionRequest) -> anyhow::Result<ResponseStream> {
        *self.last_request.lock().unwrap() = Some(req);
        let events = {
            let mut scripts = self.scripts.lock().unwrap();
            if scripts.is_empty() {
                vec![StreamEvent::Start, StreamEvent::TextDelta("[no more scripts]".into()), StreamEvent::Done(Usage::default())]
            } else {
                scripts.remove(0)
            }
        };
        let wrapped: Vec<anyhow::Result<StreamEvent>> = events.into_iter().map(Ok).collect();
        Ok(Box::pin(stream::iter(wrapped)))
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use futures::StreamExt;

    use super::*;
    use crate::{CompletionRequest, Message, ModelProvider};

    fn empty_req() -> CompletionRequest {
        CompletionRequest { messages: vec![Message::user("hi")], ..Default::default() }
    }

    #[tokio::test]
    async fn mock_echoes_last_user_message() {
        let p = MockProvider;
        let mut stream = p.start_stream(empty_req()).await.unwrap();
        stream.next().await.unwrap().unwrap(); // Start
        let second = stream.next().await.unwrap().unwrap();
        match second {
            StreamEvent::TextDelta(t) => assert!(t.contains("MOCK: hi")),
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[tokio::test]
    async fn mock_ends_with_done() {
        let p = MockProvider;
        let mut stream = p.start_stream(empty_req()).await.unwrap();
        let mut events = Vec::new();
        while let Some(ev) = stream.next().await {
            events.push(ev.unwrap());
        }
        assert!(matches!(events.last(), Some(StreamEvent::Done(_))));
    }

    #[tokio::test]
    async fn scripted_single_text_reply() {
        let p = ScriptedMockProvider::always_text("hello world");
        let mut stream = p.start_stream(empty_req()).await.unwrap();
        stream.next().await.unwrap().unwrap(); // Start
        let ev = stream.next().await.unwrap().unwrap();
        assert!(matches!(ev, StreamEvent::TextDelta(t) if t == "hello world"));
    }

    #[tokio::test]
    async fn scripted_tool_then_text_two_rounds() {
        let p = ScriptedMockProvider::tool_then_text("call-1", "glob", r#"{"pattern":"*.c"}"#, "done");

        let req = empty_req();
        let mut events = Vec::new();
        let mut stream = p.start_stream(req.clone()).await.unwrap();
        while let Some(ev) = stream.next().await {
            events.push(ev.unwrap());
        }
        assert!(events.iter().any(|e| matches!(e, StreamEvent::ToolCallStart { name, .. } if name == "glob")));

        let mut events2 = Vec::new();
        let mut stream2 = p.start_stream(req).await.unwrap();
        while let Some(ev) = stream2.next().await {
            events2.push(ev.unwrap());
        }
        assert!(events2.iter().any(|e| matches!(e, StreamEvent::TextDelta(t) if t == "done")));
    }

    #[tokio::test]
    async fn scripted_fallback_when_scripts_exhausted() {
        let p = ScriptedMockProvider::new(vec![]);
        let mut stream = p.start_stream(empty_req()).await.unwrap();
        stream.next().await.unwrap().unwrap(); // Start
        let ev = stream.next().await.unwrap().unwrap();
        assert!(matches!(ev, StreamEvent::TextDelta(t) if t.contains("no more scripts")));
    }

    #[tokio::test]
    async fn scripted_records_last_request() {
        let p = ScriptedMockProvider::always_text("ok");
        let req = empty_req();
        let _ = p.start_stream(req).await.unwrap();
        assert!(p.last_request.lock().unwrap().is_some());
    }
}
