// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

/// The append-only record kind (§3 "Event (log entry)"). Each variant names
/// the `data` fields the core reads back during replay; the store persists
/// `data` as an opaque JSON object and never interprets it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    User,
    Assistant,
    ToolCall,
    ToolResult,
    Mark,
    Rewind,
    Clear,
    Command,
    Fork,
    Interrupted,
    System,
    Usage,
}

/// One append-only log entry. `agent_id` is absent for session-wide events.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    /// Monotonic, store-assigned identifier. `0` until persisted.
    pub id: u64,
    pub session_id: Uuid,
    pub agent_id: Option<Uuid>,
    pub kind: EventKind,
    pub content: Option<String>,
    pub data: Option<Value>,
    pub created_at: DateTime<Utc>,
}

impl Event {
    pub fn new(session_id: Uuid, agent_id: Option<Uuid>, kind: EventKind, created_at: DateTime<Utc>) -> Self {
        Self { id: 0, session_id, agent_id, kind, content: None, data: None, created_at }
    }

    pub fn with_content(mut self, content: impl Into<String>) -> Self {
        self.content = Some(content.into());
        self
    }

    pub fn with_data(mut self, data: Value) -> Self {
        self.data = Some(data);
        self
    }

    pub fn data_field(&self, key: &str) -> Option<&Value> {
        self.data.as_ref().and_then(|d| d.get(key))
    }
}

/// The persistence seam for events (§5 "Event store writes happen only from
/// the main thread"). The relational schema and queries behind an
/// implementation are out of scope here; the core only ever appends and
/// reads back in order.
#[async_trait]
pub trait EventStore: Send + Sync {
    async fn append(&self, event: Event) -> anyhow::Result<Event>;
    /// All events for one agent, insertion order, for replay (§4.6).
    async fn events_for_agent(&self, agent_id: Uuid) -> anyhow::Result<Vec<Event>>;
    /// All agent ids for a session, in `created_at` ascending order, so a
    /// parent's state exists before any of its children are reconstructed.
    async fn agent_ids(&self, session_id: Uuid) -> anyhow::Result<Vec<Uuid>>;
    async fn mark_agent_dead(&self, agent_id: Uuid) -> anyhow::Result<()>;
}

/// In-memory [`EventStore`] used by tests and the mock provider harness.
#[derive(Default)]
pub struct InMemoryEventStore {
    inner: tokio::sync::Mutex<InMemoryState>,
}

#[derive(Default)]
struct InMemoryState {
    events: Vec<Event>,
    next_id: u64,
    dead: std::collections::HashSet<Uuid>,
}

#[async_trait]
impl EventStore for InMemoryEventStore {
    async fn append(&self, mut event: Event) -> anyhow::Result<Event> {
        let mut state = self.inner.lock().await;
        state.next_id += 1;
        event.id = state.next_id;
        state.events.push(event.clone());
        Ok(event)
    }

    async fn events_for_agent(&self, agent_id: Uuid) -> anyhow::Result<Vec<Event>> {
        let state = self.inner.lock().await;
        Ok(state
            .events
            .iter()
            .filter(|e| e.agent_id == Some(agent_id))
            .cloned()
            .collect())
    }

    async fn agent_ids(&self, session_id: Uuid) -> anyhow::Result<Vec<Uuid>> {
        let state = self.inner.lock().await;
        let mut seen = Vec::new();
        for e in state.events.iter().filter(|e| e.session_id == session_id) {
            if let Some(id) = e.agent_id {
                if !seen.contains(&id) {
                    seen.push(id);
                }
            }
        }
        Ok(seen)
    }

    async fn mark_agent_dead(&self, agent_id: Uuid) -> anyhow::Result<()> {
        self.inner.lock().await.dead.insert(agent_id);
        Ok(())
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn now() -> DateTime<Utc> {
        DateTime::parse_from_rfc3339("2026-01-01T00:00:00Z").unwrap().with_timezone(&Utc)
    }

    #[tokio::test]
    async fn append_assigns_monotonic_ids() {
        let store = InMemoryEventStore::default();
        let session = Uuid::new_v4();
        let agent = Uuid::new_v4();
        let e1 = store.append(Event::new(session, Some(agent), EventKind::User, now())).await.unwrap();
        let e2 = store.append(Event::new(session, Some(agent), EventKind::Assistant, now())).await.unwrap();
        assert!(e2.id > e1.id);
    }

    #[tokio::test]
    async fn events_for_agent_filters_by_agent_id() {
        let store = InMemoryEventStore::default();
        let session = Uuid::new_v4();
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        store.append(Event::new(session, Some(a), EventKind::User, now())).await.unwrap();
        store.append(Event::new(session, Some(b), EventKind::User, now())).await.unwrap();
        let events = store.events_for_agent(a).await.unwrap();
        assert_eq!(events.len(), 1);
    }

    #[tokio::test]
    async fn agent_ids_preserves_first_seen_order() {
        let store = InMemoryEventStore::default();
        let session = Uuid::new_v4();
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        store.append(Event::new(session, Some(a), EventKind::User, now())).await.unwrap();
        store.append(Event::new(session, Some(b), EventKind::User, now())).await.unwrap();
        store.append(Event::new(session, Some(a), EventKind::Assistant, now())).await.unwrap();
        assert_eq!(store.agent_ids(session).await.unwrap(), vec![a, b]);
    }

    #[test]
    fn data_field_reads_nested_json() {
        let e = Event::new(Uuid::new_v4(), None, EventKind::ToolCall, now())
            .with_data(serde_json::json!({"tool_call_id": "c1"}));
        assert_eq!(e.data_field("tool_call_id").unwrap(), "c1");
    }
}
