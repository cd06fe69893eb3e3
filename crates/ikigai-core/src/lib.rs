// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
mod agent;
mod control_socket;
mod event_loop;
mod events;
mod interrupt;
mod marks;
mod render;
mod replay;
mod scrollback;
mod session;
mod tool_worker;

pub use agent::{Agent, AgentState};
pub use control_socket::{reply, unknown_request_error, ControlReply, ControlRequest, ControlSocket, FramebufferLine, FramebufferSpan};
pub use event_loop::EventLoop;
pub use events::{Event, EventKind, EventStore, InMemoryEventStore};
pub use interrupt::{kill_process_group, InterruptCoordinator};
pub use marks::{Mark, MarkError, Marks};
pub use render::{render_event, RenderError};
pub use replay::{bootstrap_events_if_empty, replay, ReplayedAgent};
pub use scrollback::Scrollback;
pub use session::Conversation;
pub use tool_worker::{OnCompleteHook, ToolWorkerState};
