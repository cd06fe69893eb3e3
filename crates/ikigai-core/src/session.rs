// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use ikigai_model::Message;

/// The reconstructed conversation for one agent: an ordered message list
/// plus the running token estimate used for context-window accounting.
#[derive(Debug, Default)]
pub struct Conversation {
    pub messages: Vec<Message>,
    pub token_count: usize,
}

impl Conversation {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, msg: Message) {
        self.token_count += msg.approx_tokens();
        self.messages.push(msg);
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    /// Truncate to `len` messages (rewind, §4.10) and recompute the token
    /// estimate from what remains.
    pub fn truncate(&mut self, len: usize) {
        self.messages.truncate(len);
        self.recalculate_tokens();
    }

    /// Discard every message (`clear` event, §4.6). Marks and other
    /// out-of-band streams are untouched by design — this only clears the
    /// conversation itself.
    pub fn clear(&mut self) {
        self.messages.clear();
        self.token_count = 0;
    }

    /// Mark every message from `from_index` onward as interrupted (§4.11,
    /// last-user-message turn boundary).
    pub fn mark_interrupted_from(&mut self, from_index: usize) {
        for msg in self.messages.iter_mut().skip(from_index) {
            msg.interrupted = true;
        }
    }

    fn recalculate_tokens(&mut self) {
        self.token_count = self.messages.iter().map(Message::approx_tokens).sum();
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use ikigai_model::Message;

    use super::*;

    #[test]
    fn new_conversation_is_empty() {
        let c = Conversation::new();
        assert!(c.is_empty());
        assert_eq!(c.token_count, 0);
    }

    #[test]
    fn push_increments_token_count_and_length() {
        let mut c = Conversation::new();
        c.push(Message::user("hello"));
        assert_eq!(c.len(), 1);
        assert!(c.token_count > 0);
    }

    #[test]
    fn truncate_recomputes_token_count() {
        let mut c = Conversation::new();
        c.push(Message::user("one"));
        c.push(Message::assistant("two"));
        c.push(Message::user("three"));
        c.truncate(1);
        assert_eq!(c.len(), 1);
        assert_eq!(c.token_count, Message::user("one").approx_tokens());
    }

    #[test]
    fn clear_empties_conversation() {
        let mut c = Conversation::new();
        c.push(Message::user("hi"));
        c.clear();
        assert!(c.is_empty());
        assert_eq!(c.token_count, 0);
    }

    #[test]
    fn mark_interrupted_from_flips_only_tail() {
        let mut c = Conversation::new();
        c.push(Message::user("a"));
        c.push(Message::assistant("b"));
        c.push(Message::user("c"));
        c.mark_interrupted_from(1);
        assert!(!c.messages[0].interrupted);
        assert!(c.messages[1].interrupted);
        assert!(c.messages[2].interrupted);
    }
}
