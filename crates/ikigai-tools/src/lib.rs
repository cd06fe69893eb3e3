// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
pub mod builtin;
pub mod external;
pub mod registry;
pub mod tool;

pub use builtin::glob::GlobTool;
pub use external::ExternalTool;
pub use registry::{ToolRegistry, ToolSchema};
pub use tool::{Tool, ToolCall, ToolContext, ToolOutput};
