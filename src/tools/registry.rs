//! Name-to-handler table for tools

use std::collections::BTreeMap;
use std::sync::Arc;

use serde_json::Value;

use super::abort_loop::AbortLoopTool;
use super::definition::{Tool, ToolContext, ToolDefinition, ToolOutput, validate_definition};
use super::inject_message::InjectMessageTool;
use crate::error::{ConvoyError, Result};

#[derive(Default)]
pub struct ToolRegistry {
    tools: BTreeMap<String, Arc<dyn Tool>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry holding the loop-control tools
    pub fn with_loop_control() -> Result<Self> {
        let mut registry = Self::new();
        registry.register(Arc::new(AbortLoopTool))?;
        registry.register(Arc::new(InjectMessageTool))?;
        Ok(registry)
    }

    /// Add a tool after validating its definition
    pub fn register(&mut self, tool: Arc<dyn Tool>) -> Result<()> {
        let definition = tool.definition();
        validate_definition(&definition)?;
        if self.tools.contains_key(&definition.name) {
            return Err(ConvoyError::Tool(format!("Tool {} is already registered", definition.name)));
        }
        log::debug!("Registered tool {}", definition.name);
        self.tools.insert(definition.name, tool);
        Ok(())
    }

    /// Definitions of every registered tool, sorted by name
    pub fn definitions(&self) -> Vec<ToolDefinition> {
        self.tools.values().map(|t| t.definition()).collect()
    }

    pub fn names(&self) -> Vec<&str> {
        self.tools.keys().map(String::as_str).collect()
    }

    /// Invoke a tool by name
    pub async fn dispatch(&self, context: &ToolContext, name: &str, input: Value) -> Result<ToolOutput> {
        let tool = self
            .tools
            .get(name)
            .ok_or_else(|| ConvoyError::Tool(format!("Unknown tool: {}", name)))?;
        log::debug!("Agent {} calling tool {}", context.agent, name);
        tool.call(context, input).await
    }
}
