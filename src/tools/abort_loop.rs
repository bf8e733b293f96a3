//! abort_loop - stop another execution loop in the caller's conversation

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{Value, json};

use super::definition::{Tool, ToolContext, ToolDefinition, ToolOutput};
use crate::domain::LoopKey;
use crate::error::Result;

#[derive(Debug, Deserialize)]
struct AbortLoopInput {
    loop_number: u32,
    /// Owner of the target loop, when the number alone is ambiguous
    #[serde(default)]
    agent: Option<String>,
}

pub struct AbortLoopTool;

#[async_trait]
impl Tool for AbortLoopTool {
    fn definition(&self) -> ToolDefinition {
        ToolDefinition::new(
            "abort_loop",
            "Abort an execution loop in this conversation. Refused while the loop is waiting on delegations.",
            json!({
                "type": "object",
                "properties": {
                    "loop_number": {
                        "type": "integer",
                        "minimum": 1,
                        "description": "Number of the loop to abort"
                    },
                    "agent": {
                        "type": "string",
                        "description": "Agent that owns the loop, if several agents run a loop with this number"
                    }
                },
                "required": ["loop_number"]
            }),
        )
    }

    async fn call(&self, context: &ToolContext, input: Value) -> Result<ToolOutput> {
        let input: AbortLoopInput = match serde_json::from_value(input) {
            Ok(input) => input,
            Err(e) => return Ok(ToolOutput::error(format!("Invalid input: {}", e))),
        };
        let number = input.loop_number;

        let mut coordinator = context.coordinator.lock().await;
        let result = match &input.agent {
            Some(agent) => {
                let key = LoopKey::new(agent.as_str(), context.conversation_id.as_str(), number);
                coordinator.abort_loop(&context.agent, &key)
            }
            None => coordinator.abort(&context.agent, &context.conversation_id, number),
        };

        match result {
            Ok(receipt) => {
                let aborted = format!("Loop #{} ({}) aborted", number, receipt.key.owner);
                match coordinator.save(&context.conversation_id) {
                    Ok(()) => Ok(ToolOutput::success(format!("{}.", aborted))),
                    Err(e) => {
                        log::warn!("Failed to persist conversation {} after abort: {}", context.conversation_id, e);
                        Ok(ToolOutput::success(format!(
                            "{}, but the abort was not persisted: {}. It will be lost if the process restarts.",
                            aborted, e
                        )))
                    }
                }
            }
            Err(denied) => Ok(ToolOutput::error(format!(
                "Failed to abort loop #{}: {}. Consider sending a follow-up message with inject_message instead.",
                number, denied
            ))),
        }
    }
}
