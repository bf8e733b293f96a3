//! Execution-loop registry
//!
//! Index of every known execution loop across agents and conversations. The
//! registry is the single writer of loop status and pending delegations;
//! abort and inject from other agents go through it.
//!
//! Abort and inject are deliberately asymmetric: injection is best effort and
//! reports a missing target with `false`, abort is destructive and reports
//! the exact reason it was denied. `try_inject` exposes the reason for tools
//! that need to tell an agent what went wrong.

mod execution_loop;

use std::collections::HashMap;

use thiserror::Error;

use crate::domain::{AuditAction, AuditEvent, InjectedMessage, LoopKey, LoopStatus};
use crate::error::{ConvoyError, Result};

pub use execution_loop::ExecutionLoop;

/// Why an abort request was refused
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AbortDenied {
    /// No such loop, or it already finished
    #[error("not found")]
    NotFound,

    /// The loop is waiting on delegations that would be orphaned
    #[error("has pending delegations ({} outstanding)", .delegation_ids.len())]
    PendingDelegations { delegation_ids: Vec<String> },

    /// Several other agents run a loop with this number in the conversation
    #[error("ambiguous target: loop is running for agents {}", .owners.join(", "))]
    Ambiguous { owners: Vec<String> },
}

/// Confirmation of an applied abort
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AbortReceipt {
    pub key: LoopKey,
    pub caller: String,
}

/// Registry of execution loops
///
/// Owned by the runtime and passed by reference; there is no global instance.
#[derive(Debug, Default)]
pub struct LoopRegistry {
    loops: HashMap<LoopKey, ExecutionLoop>,
    /// Highest loop number handed out per (owner, conversation)
    counters: HashMap<(String, String), u32>,
    audit: Vec<AuditEvent>,
}

impl LoopRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Assign the next loop number for (owner, conversation) and register it
    pub fn allocate(&mut self, owner: &str, conversation: &str) -> Result<LoopKey> {
        let next = self
            .counters
            .get(&(owner.to_string(), conversation.to_string()))
            .copied()
            .unwrap_or(0)
            + 1;
        let key = LoopKey::new(owner, conversation, next);
        self.register(key.clone())?;
        Ok(key)
    }

    /// Never hand out numbers up to `through` for (owner, conversation)
    ///
    /// Used when loops from an earlier process are already on disk.
    pub fn reserve_numbers(&mut self, owner: &str, conversation: &str, through: u32) {
        let counter = self
            .counters
            .entry((owner.to_string(), conversation.to_string()))
            .or_insert(0);
        *counter = (*counter).max(through);
    }

    /// Start tracking a loop
    ///
    /// The number must be above every number already handed out for
    /// (owner, conversation), so a finished or pruned loop is never revived.
    pub fn register(&mut self, key: LoopKey) -> Result<()> {
        if key.number == 0 {
            return Err(ConvoyError::InvalidLoopNumber(key));
        }
        let highest = self
            .counters
            .get(&(key.owner.clone(), key.conversation.clone()))
            .copied()
            .unwrap_or(0);
        if self.loops.contains_key(&key) || key.number <= highest {
            return Err(ConvoyError::DuplicateLoop(key));
        }

        self.reserve_numbers(&key.owner, &key.conversation, key.number);

        tracing::debug!(loop_key = %key, "Loop registered");
        self.loops.insert(key.clone(), ExecutionLoop::new(key));
        Ok(())
    }

    pub fn get(&self, key: &LoopKey) -> Option<&ExecutionLoop> {
        self.loops.get(key)
    }

    pub fn status(&self, key: &LoopKey) -> Option<LoopStatus> {
        self.loops.get(key).map(ExecutionLoop::status)
    }

    /// True if the loop was aborted; polled by the loop at suspension points
    pub fn is_aborted(&self, key: &LoopKey) -> bool {
        self.status(key) == Some(LoopStatus::Aborted)
    }

    /// Non-terminal loops in a conversation, ordered by owner then number
    pub fn active_loops(&self, conversation: &str) -> Vec<&ExecutionLoop> {
        let mut active: Vec<&ExecutionLoop> = self
            .loops
            .values()
            .filter(|l| l.key().conversation == conversation && !l.status().is_terminal())
            .collect();
        active.sort_by(|a, b| a.key().cmp(b.key()));
        active
    }

    /// Resolve a loop number in a conversation to a running loop
    ///
    /// The caller's own loop wins; otherwise exactly one other agent must be
    /// running a loop with that number.
    pub fn resolve_target(
        &self,
        caller: &str,
        conversation: &str,
        loop_number: u32,
    ) -> std::result::Result<LoopKey, AbortDenied> {
        let own = LoopKey::new(caller, conversation, loop_number);
        if self.status(&own).is_some_and(|s| !s.is_terminal()) {
            return Ok(own);
        }

        let mut candidates: Vec<&LoopKey> = self
            .loops
            .values()
            .filter(|l| {
                l.key().conversation == conversation
                    && l.key().number == loop_number
                    && !l.status().is_terminal()
            })
            .map(ExecutionLoop::key)
            .collect();

        match candidates.len() {
            0 => Err(AbortDenied::NotFound),
            1 => Ok(candidates.remove(0).clone()),
            _ => {
                let mut owners: Vec<String> = candidates.iter().map(|k| k.owner.clone()).collect();
                owners.sort();
                Err(AbortDenied::Ambiguous { owners })
            }
        }
    }

    /// Abort a loop named by conversation and loop number
    pub fn abort(
        &mut self,
        caller: &str,
        conversation: &str,
        loop_number: u32,
    ) -> std::result::Result<AbortReceipt, AbortDenied> {
        match self.resolve_target(caller, conversation, loop_number) {
            Ok(key) => self.abort_loop(caller, &key),
            Err(denied) => {
                self.record(caller, conversation, loop_number, None, AuditAction::Abort, denied.to_string());
                Err(denied)
            }
        }
    }

    /// Abort a specific loop
    ///
    /// Refused while the loop waits on delegations. A refused abort leaves the
    /// loop untouched.
    pub fn abort_loop(&mut self, caller: &str, key: &LoopKey) -> std::result::Result<AbortReceipt, AbortDenied> {
        let verdict = match self.loops.get_mut(key) {
            None => Err(AbortDenied::NotFound),
            Some(state) if state.status().is_terminal() => Err(AbortDenied::NotFound),
            Some(state) if state.has_pending_delegations() => Err(AbortDenied::PendingDelegations {
                delegation_ids: state.pending_delegations().map(str::to_string).collect(),
            }),
            Some(state) => {
                state.set_status(LoopStatus::Aborted);
                Ok(AbortReceipt {
                    key: key.clone(),
                    caller: caller.to_string(),
                })
            }
        };

        match &verdict {
            Ok(_) => {
                tracing::info!(loop_key = %key, caller = %caller, "Loop aborted");
                self.record(caller, &key.conversation, key.number, Some(key.clone()), AuditAction::Abort, "ok");
            }
            Err(denied) => {
                tracing::info!(loop_key = %key, caller = %caller, reason = %denied, "Abort denied");
                self.record(
                    caller,
                    &key.conversation,
                    key.number,
                    Some(key.clone()),
                    AuditAction::Abort,
                    denied.to_string(),
                );
            }
        }
        verdict
    }

    /// Queue a message for a loop named by conversation and loop number
    ///
    /// Returns false if no running loop matches; the target finishing first is
    /// a normal race.
    pub fn inject(&mut self, caller: &str, conversation: &str, loop_number: u32, message: impl Into<String>) -> bool {
        self.try_inject(caller, conversation, loop_number, message).is_ok()
    }

    /// Like `inject`, but names the loop that received the message or the
    /// reason no loop did (`NotFound` or `Ambiguous`)
    pub fn try_inject(
        &mut self,
        caller: &str,
        conversation: &str,
        loop_number: u32,
        message: impl Into<String>,
    ) -> std::result::Result<LoopKey, AbortDenied> {
        match self.resolve_target(caller, conversation, loop_number) {
            Ok(key) => {
                if self.inject_into(caller, &key, message) {
                    Ok(key)
                } else {
                    Err(AbortDenied::NotFound)
                }
            }
            Err(denied) => {
                self.record(caller, conversation, loop_number, None, AuditAction::Inject, denied.to_string());
                Err(denied)
            }
        }
    }

    /// Queue a message for a specific loop
    pub fn inject_into(&mut self, caller: &str, key: &LoopKey, message: impl Into<String>) -> bool {
        let delivered = match self.loops.get_mut(key) {
            Some(state) if !state.status().is_terminal() => {
                state.push_injection(InjectedMessage::new(caller, message));
                true
            }
            _ => false,
        };

        let outcome = if delivered { "ok" } else { "not found" };
        tracing::debug!(loop_key = %key, caller = %caller, delivered, "Inject request");
        self.record(caller, &key.conversation, key.number, Some(key.clone()), AuditAction::Inject, outcome);
        delivered
    }

    /// Take every queued injection for a loop, oldest first
    pub fn drain_injections(&mut self, key: &LoopKey) -> Vec<InjectedMessage> {
        self.loops
            .get_mut(key)
            .map(ExecutionLoop::drain_injections)
            .unwrap_or_default()
    }

    /// Record that a loop now waits on a delegation
    ///
    /// Returns false if the loop is unknown or already terminal.
    pub fn mark_delegation_pending(&mut self, key: &LoopKey, delegation_id: &str) -> bool {
        match self.loops.get_mut(key) {
            Some(state) if !state.status().is_terminal() => {
                state.add_pending(delegation_id);
                tracing::debug!(loop_key = %key, delegation_id, "Delegation pending");
                true
            }
            _ => {
                log::warn!("Cannot mark delegation {} pending: loop {} is not running", delegation_id, key);
                false
            }
        }
    }

    /// Record that a delegation the loop waited on has resolved
    pub fn mark_delegation_resolved(&mut self, key: &LoopKey, delegation_id: &str) -> bool {
        match self.loops.get_mut(key) {
            Some(state) => {
                let removed = state.remove_pending(delegation_id);
                if !removed {
                    log::warn!("Delegation {} was not pending on loop {}", delegation_id, key);
                }
                removed
            }
            None => false,
        }
    }

    /// Mark a loop completed; a no-op for unknown or terminal loops
    pub fn complete(&mut self, key: &LoopKey) {
        if let Some(state) = self.loops.get_mut(key)
            && !state.status().is_terminal()
        {
            state.set_status(LoopStatus::Completed);
            tracing::info!(loop_key = %key, "Loop completed");
        }
    }

    /// Forget terminal loops; returns how many were removed
    ///
    /// Loop number counters survive, so numbers are still never reused.
    pub fn prune_terminal(&mut self) -> usize {
        let before = self.loops.len();
        self.loops.retain(|_, state| !state.status().is_terminal());
        before - self.loops.len()
    }

    /// Every abort and inject request seen, oldest first
    pub fn audit_log(&self) -> &[AuditEvent] {
        &self.audit
    }

    fn record(
        &mut self,
        caller: &str,
        conversation: &str,
        loop_number: u32,
        target: Option<LoopKey>,
        action: AuditAction,
        outcome: impl Into<String>,
    ) {
        self.audit
            .push(AuditEvent::new(caller, conversation, loop_number, target, action, outcome));
    }
}
