//! Tool definitions, invocation context and results

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::coordination::SharedCoordinator;
use crate::error::{ConvoyError, Result};

/// Name, description and input schema advertised to the model
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolDefinition {
    pub name: String,
    pub description: String,
    /// JSON schema for the input object
    pub input_schema: Value,
}

impl ToolDefinition {
    pub fn new(name: impl Into<String>, description: impl Into<String>, input_schema: Value) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            input_schema,
        }
    }
}

/// Who is calling, and from which conversation
#[derive(Clone)]
pub struct ToolContext {
    /// Identity of the calling agent
    pub agent: String,
    pub conversation_id: String,
    pub coordinator: SharedCoordinator,
}

impl ToolContext {
    pub fn new(agent: impl Into<String>, conversation_id: impl Into<String>, coordinator: SharedCoordinator) -> Self {
        Self {
            agent: agent.into(),
            conversation_id: conversation_id.into(),
            coordinator,
        }
    }
}

/// Readable outcome handed back to the calling agent
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolOutput {
    pub content: String,
    pub is_error: bool,
}

impl ToolOutput {
    pub fn success(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            is_error: false,
        }
    }

    pub fn error(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            is_error: true,
        }
    }
}

#[async_trait]
pub trait Tool: Send + Sync {
    fn definition(&self) -> ToolDefinition;

    /// Run the tool
    ///
    /// Expected failures (bad input, a refused abort) come back as an error
    /// `ToolOutput`; `Err` is reserved for internal faults.
    async fn call(&self, context: &ToolContext, input: Value) -> Result<ToolOutput>;
}

/// Check a definition's name and schema shape
///
/// The schema must be an object schema with a `properties` object, and every
/// `required` entry must name one of those properties.
pub fn validate_definition(definition: &ToolDefinition) -> Result<()> {
    let name = &definition.name;
    if name.is_empty() || !name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-') {
        return Err(ConvoyError::Tool(format!("Invalid tool name: {:?}", name)));
    }

    let schema = definition
        .input_schema
        .as_object()
        .ok_or_else(|| ConvoyError::Tool(format!("{}: input schema must be an object", name)))?;

    if schema.get("type").and_then(Value::as_str) != Some("object") {
        return Err(ConvoyError::Tool(format!("{}: input schema type must be \"object\"", name)));
    }

    let properties = schema
        .get("properties")
        .and_then(Value::as_object)
        .ok_or_else(|| ConvoyError::Tool(format!("{}: input schema has no properties object", name)))?;

    if let Some(required) = schema.get("required") {
        let required = required
            .as_array()
            .ok_or_else(|| ConvoyError::Tool(format!("{}: required must be an array", name)))?;
        for field in required {
            let field = field
                .as_str()
                .ok_or_else(|| ConvoyError::Tool(format!("{}: required entries must be strings", name)))?;
            if !properties.contains_key(field) {
                return Err(ConvoyError::Tool(format!(
                    "{}: required field {} is not a declared property",
                    name, field
                )));
            }
        }
    }

    Ok(())
}
