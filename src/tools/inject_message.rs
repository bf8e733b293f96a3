//! inject_message - queue a message for a running execution loop

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{Value, json};

use super::definition::{Tool, ToolContext, ToolDefinition, ToolOutput};
use crate::domain::LoopKey;
use crate::error::Result;
use crate::registry::AbortDenied;

#[derive(Debug, Deserialize)]
struct InjectMessageInput {
    loop_number: u32,
    message: String,
    #[serde(default)]
    agent: Option<String>,
}

pub struct InjectMessageTool;

#[async_trait]
impl Tool for InjectMessageTool {
    fn definition(&self) -> ToolDefinition {
        ToolDefinition::new(
            "inject_message",
            "Send a message to a running execution loop. It is read at the loop's next step.",
            json!({
                "type": "object",
                "properties": {
                    "loop_number": {
                        "type": "integer",
                        "minimum": 1,
                        "description": "Number of the target loop"
                    },
                    "message": {
                        "type": "string",
                        "description": "Text to deliver"
                    },
                    "agent": {
                        "type": "string",
                        "description": "Agent that owns the loop, if several agents run a loop with this number"
                    }
                },
                "required": ["loop_number", "message"]
            }),
        )
    }

    async fn call(&self, context: &ToolContext, input: Value) -> Result<ToolOutput> {
        let input: InjectMessageInput = match serde_json::from_value(input) {
            Ok(input) => input,
            Err(e) => return Ok(ToolOutput::error(format!("Invalid input: {}", e))),
        };
        let number = input.loop_number;

        let mut coordinator = context.coordinator.lock().await;
        let result = match &input.agent {
            Some(agent) => {
                let key = LoopKey::new(agent.as_str(), context.conversation_id.as_str(), number);
                if coordinator.inject_into(&context.agent, &key, input.message) {
                    Ok(key)
                } else {
                    Err(AbortDenied::NotFound)
                }
            }
            None => coordinator.try_inject(&context.agent, &context.conversation_id, number, input.message),
        };

        match result {
            Ok(_) => Ok(ToolOutput::success(format!("Message delivered to loop #{}.", number))),
            Err(AbortDenied::Ambiguous { owners }) => Ok(ToolOutput::error(format!(
                "Loop #{} is ambiguous: agents {} each run a loop with this number. Pass `agent` to pick one.",
                number,
                owners.join(", ")
            ))),
            Err(_) => Ok(ToolOutput::error(format!(
                "Loop #{} not found; it may have already completed.",
                number
            ))),
        }
    }
}
