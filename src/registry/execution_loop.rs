//! Ephemeral state of one execution loop.
//!
//! Only the registry can change this state; everything else gets a shared
//! reference and reads it.

use std::collections::{BTreeSet, VecDeque};

use crate::domain::{InjectedMessage, LoopKey, LoopStatus};

/// State the registry keeps for a loop while it is known
#[derive(Debug, Clone)]
pub struct ExecutionLoop {
    key: LoopKey,
    status: LoopStatus,
    pending_delegations: BTreeSet<String>,
    inbox: VecDeque<InjectedMessage>,
}

impl ExecutionLoop {
    pub(super) fn new(key: LoopKey) -> Self {
        Self {
            key,
            status: LoopStatus::Active,
            pending_delegations: BTreeSet::new(),
            inbox: VecDeque::new(),
        }
    }

    pub fn key(&self) -> &LoopKey {
        &self.key
    }

    pub fn status(&self) -> LoopStatus {
        self.status
    }

    /// Delegation ids this loop is waiting on, sorted
    pub fn pending_delegations(&self) -> impl Iterator<Item = &str> {
        self.pending_delegations.iter().map(String::as_str)
    }

    pub fn has_pending_delegations(&self) -> bool {
        !self.pending_delegations.is_empty()
    }

    /// Number of injected messages not yet consumed by the loop
    pub fn queued_injections(&self) -> usize {
        self.inbox.len()
    }

    pub(super) fn set_status(&mut self, status: LoopStatus) {
        self.status = status;
    }

    pub(super) fn add_pending(&mut self, delegation_id: &str) -> bool {
        let inserted = self.pending_delegations.insert(delegation_id.to_string());
        if self.status == LoopStatus::Active {
            self.status = LoopStatus::AwaitingDelegation;
        }
        inserted
    }

    pub(super) fn remove_pending(&mut self, delegation_id: &str) -> bool {
        let removed = self.pending_delegations.remove(delegation_id);
        if self.pending_delegations.is_empty() && self.status == LoopStatus::AwaitingDelegation {
            self.status = LoopStatus::Active;
        }
        removed
    }

    pub(super) fn push_injection(&mut self, message: InjectedMessage) {
        self.inbox.push_back(message);
    }

    pub(super) fn drain_injections(&mut self) -> Vec<InjectedMessage> {
        self.inbox.drain(..).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_loop() -> ExecutionLoop {
        ExecutionLoop::new(LoopKey::new("alice", "c1", 1))
    }

    #[test]
    fn test_new_loop_is_active() {
        let state = test_loop();
        assert_eq!(state.status(), LoopStatus::Active);
        assert!(!state.has_pending_delegations());
        assert_eq!(state.queued_injections(), 0);
    }

    #[test]
    fn test_pending_moves_to_awaiting_and_back() {
        let mut state = test_loop();
        assert!(state.add_pending("d1"));
        assert!(state.add_pending("d2"));
        assert_eq!(state.status(), LoopStatus::AwaitingDelegation);

        assert!(state.remove_pending("d1"));
        assert_eq!(state.status(), LoopStatus::AwaitingDelegation);

        assert!(state.remove_pending("d2"));
        assert_eq!(state.status(), LoopStatus::Active);
    }

    #[test]
    fn test_remove_unknown_pending() {
        let mut state = test_loop();
        assert!(!state.remove_pending("nope"));
        assert_eq!(state.status(), LoopStatus::Active);
    }

    #[test]
    fn test_inbox_is_fifo() {
        let mut state = test_loop();
        state.push_injection(InjectedMessage::new("bob", "one"));
        state.push_injection(InjectedMessage::new("carol", "two"));

        let drained = state.drain_injections();
        let contents: Vec<&str> = drained.iter().map(|m| m.content.as_str()).collect();
        assert_eq!(contents, vec!["one", "two"]);
        assert_eq!(state.queued_injections(), 0);
    }
}
