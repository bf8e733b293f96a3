//! Audit records for cross-agent loop control.
//!
//! Any agent may abort or inject into a loop it does not own; the registry
//! records who asked for what so an authorization layer can review it.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::loop_state::LoopKey;

/// Control action requested against a loop
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AuditAction {
    Abort,
    Inject,
}

/// One abort or inject request and what came of it
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditEvent {
    /// Agent that issued the request
    pub caller: String,
    pub conversation: String,
    pub loop_number: u32,
    /// Loop the request resolved to, if any
    pub target: Option<LoopKey>,
    pub action: AuditAction,
    /// "ok", or the denial reason
    pub outcome: String,
    pub at: DateTime<Utc>,
}

impl AuditEvent {
    pub fn new(
        caller: &str,
        conversation: &str,
        loop_number: u32,
        target: Option<LoopKey>,
        action: AuditAction,
        outcome: impl Into<String>,
    ) -> Self {
        Self {
            caller: caller.to_string(),
            conversation: conversation.to_string(),
            loop_number,
            target,
            action,
            outcome: outcome.into(),
            at: Utc::now(),
        }
    }

    /// True if the request was carried out
    pub fn succeeded(&self) -> bool {
        self.outcome == "ok"
    }

    /// True if the caller acted on a loop owned by someone else
    pub fn is_cross_agent(&self) -> bool {
        self.target.as_ref().is_some_and(|t| t.owner != self.caller)
    }
}
