//! Error types for Convoy
//!
//! Centralized error handling using thiserror. Expected races (a loop that
//! already finished, a missing injection target) are not errors and never
//! show up here; see `registry::AbortDenied` for the abort denial reasons.

use thiserror::Error;

use crate::domain::LoopKey;

/// All error types that can occur in Convoy
#[derive(Debug, Error)]
pub enum ConvoyError {
    /// A loop with this key, or a later number for the same owner, already exists
    #[error("Duplicate loop: {0} is already registered or its number was used")]
    DuplicateLoop(LoopKey),

    /// Loop numbers start at 1
    #[error("Invalid loop number: {0} (loop numbers start at 1)")]
    InvalidLoopNumber(LoopKey),

    /// Loop not found in the registry
    #[error("Loop not found: {0}")]
    LoopNotFound(String),

    /// Delegation request rejected at creation time
    #[error("Invalid delegation: {0}")]
    InvalidDelegation(String),

    /// Delegation id unknown to the ledger
    #[error("Delegation not found: {0}")]
    DelegationNotFound(String),

    /// Response from an agent that was never asked
    #[error("Agent {agent} is not a recipient of delegation {delegation_id}")]
    UnknownRecipient { delegation_id: String, agent: String },

    /// Second terminal response from the same recipient
    #[error("Agent {agent} already responded to delegation {delegation_id}")]
    DuplicateResponse { delegation_id: String, agent: String },

    /// Tool registration or execution error
    #[error("Tool error: {0}")]
    Tool(String),

    /// Event transport error
    #[error("Transport error: {0}")]
    Transport(String),

    /// Working directory resolution error
    #[error("Worktree error: {0}")]
    Worktree(String),

    /// Storage/persistence error
    #[error("Storage error: {0}")]
    Storage(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Result type alias for Convoy operations
pub type Result<T> = std::result::Result<T, ConvoyError>;
