// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use std::pin::Pin;

use async_trait::async_trait;
use futures::Stream;

use crate::{CompletionRequest, StreamEvent};

/// A provider's input modalities, used to decide whether images must be
/// stripped from a request before it is sent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputModality {
    Text,
    Image,
}

pub type ResponseStream = Pin<Box<dyn Stream<Item = anyhow::Result<StreamEvent>> + Send>>;

/// The seam between the agent runtime and a concrete LLM backend.
///
/// Concrete wire formats (OpenAI/Anthropic JSON shapes) are out of scope for
/// this crate; callers supply an implementation. The runtime never speaks
/// HTTP directly — it only drives this trait and the [`StreamEvent`] stream
/// it returns.
///
/// `start_stream` returns immediately with a stream; the caller (the agent
/// state machine) polls it to completion or drops it to cancel. Dropping the
/// stream *is* this crate's cancellation mechanism — async Rust tears down
/// the underlying task automatically, so there is no separate `cancel()`
/// method on the trait. The state machine synthesizes the terminal
/// `Completion{success:false}` itself when it drops a stream early, which
/// preserves the "exactly one terminal completion per request" guarantee
/// (§5) deterministically rather than by racing a callback.
#[async_trait]
pub trait ModelProvider: Send + Sync {
    /// Human-readable provider name for status display.
    fn name(&self) -> &str;

    /// Model identifier as reported to users.
    fn model_name(&self) -> &str;

    /// Begin a streaming completion request.
    async fn start_stream(&self, req: CompletionRequest) -> anyhow::Result<ResponseStream>;

    /// Modalities this provider accepts in request content. Defaults to
    /// text-only, the conservative choice for an unknown backend.
    fn input_modalities(&self) -> Vec<InputModality> {
        vec![InputModality::Text]
    }

    fn supports_images(&self) -> bool {
        self.input_modalities().contains(&InputModality::Image)
    }
}
