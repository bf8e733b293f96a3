//! Conversation message types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Kind of content a message carries
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageType {
    /// Plain agent text
    Text,
    /// Tool invocation issued by the loop
    ToolCall,
    /// Result of a tool invocation
    ToolResult,
    /// Outbound delegation request
    DelegationRequest,
    /// Rendered delegation outcome fed back into the loop
    DelegationResponse,
    /// Message another agent pushed into the loop's queue
    Injected,
    /// Synthetic notice appended when a loop is aborted
    AbortNotice,
}

/// A single entry in a conversation log
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    /// Position in the conversation log, assigned by the store
    pub seq: u64,
    /// Pubkey of the agent whose loop wrote this message
    pub owner: String,
    /// Loop number within (owner, conversation)
    pub loop_number: u32,
    pub content: String,
    pub message_type: MessageType,
    pub created_at: DateTime<Utc>,
}
