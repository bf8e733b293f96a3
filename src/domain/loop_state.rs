//! Loop identity and lifecycle status
//!
//! An execution loop is named by its owning agent, the conversation it runs
//! in, and a per-(owner, conversation) loop number starting at 1.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Composite identity of an execution loop
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct LoopKey {
    /// Pubkey of the agent that owns the loop
    pub owner: String,
    /// Conversation the loop runs in
    pub conversation: String,
    /// Loop number, unique per (owner, conversation), never reused
    pub number: u32,
}

impl LoopKey {
    pub fn new(owner: impl Into<String>, conversation: impl Into<String>, number: u32) -> Self {
        Self {
            owner: owner.into(),
            conversation: conversation.into(),
            number,
        }
    }
}

impl fmt::Display for LoopKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}#{}", self.owner, self.conversation, self.number)
    }
}

/// Status of an execution loop
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum LoopStatus {
    /// Stepping normally
    Active,
    /// Waiting on one or more open delegations
    AwaitingDelegation,
    /// Abort requested but not yet applied (reserved, see DESIGN.md)
    Aborting,
    /// Finished on its own
    Completed,
    /// Stopped by an abort request
    Aborted,
}

impl LoopStatus {
    /// Returns true if no further transitions are possible
    pub fn is_terminal(&self) -> bool {
        matches!(self, LoopStatus::Completed | LoopStatus::Aborted)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            LoopStatus::Active => "active",
            LoopStatus::AwaitingDelegation => "awaiting-delegation",
            LoopStatus::Aborting => "aborting",
            LoopStatus::Completed => "completed",
            LoopStatus::Aborted => "aborted",
        }
    }
}

impl fmt::Display for LoopStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A message pushed into a loop's inbound queue by another agent or tool
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InjectedMessage {
    /// Agent that injected the message
    pub from: String,
    pub content: String,
    pub injected_at: DateTime<Utc>,
}

impl InjectedMessage {
    pub fn new(from: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            from: from.into(),
            content: content.into(),
            injected_at: Utc::now(),
        }
    }
}
