//! Agent-facing tools
//!
//! Each tool is a closed implementation of [`Tool`], registered by name in a
//! [`ToolRegistry`] that checks its input schema once, at registration.

mod abort_loop;
mod definition;
mod inject_message;
mod registry;

pub use abort_loop::AbortLoopTool;
pub use definition::{Tool, ToolContext, ToolDefinition, ToolOutput, validate_definition};
pub use inject_message::InjectMessageTool;
pub use registry::ToolRegistry;
