//! Coordinator - keeps the registry, delegation ledger and conversation
//! stores in lockstep.
//!
//! Every method here runs to completion without awaiting, so an abort,
//! an injection or a delegation response is applied atomically with respect
//! to other loops sharing the coordinator.

use std::collections::HashMap;
use std::collections::hash_map::Entry;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio::sync::{Mutex, Notify};

use crate::conversation::ConversationStore;
use crate::delegation::{DelegationLedger, RenderOptions, render_all};
use crate::domain::{
    DelegationEntry, DelegationResponse, InjectedMessage, LoopKey, LoopStatus, Message, MessageType, ResponseProgress,
};
use crate::error::{ConvoyError, Result};
use crate::id::short_id;
use crate::registry::{AbortDenied, AbortReceipt, LoopRegistry};

/// Coordinator shared between concurrently running loops and tools
pub type SharedCoordinator = Arc<Mutex<Coordinator>>;

/// Text of the synthetic message appended to an aborted loop
pub fn abort_notice(loop_number: u32, caller: &str) -> String {
    format!("[Loop #{} was aborted by {}]", loop_number, caller)
}

/// Owner of all loop, delegation and conversation state in a process
#[derive(Debug, Default)]
pub struct Coordinator {
    registry: LoopRegistry,
    ledger: DelegationLedger,
    stores: HashMap<String, ConversationStore>,
    storage_dir: Option<PathBuf>,
    changes: Arc<Notify>,
}

impl Coordinator {
    /// Coordinator whose conversations live only in memory
    pub fn new() -> Self {
        Self::default()
    }

    /// Coordinator persisting conversations under `dir`
    pub fn with_storage_dir(dir: impl AsRef<Path>) -> Self {
        Self {
            storage_dir: Some(dir.as_ref().to_path_buf()),
            ..Self::default()
        }
    }

    pub fn into_shared(self) -> SharedCoordinator {
        Arc::new(Mutex::new(self))
    }

    pub fn registry(&self) -> &LoopRegistry {
        &self.registry
    }

    pub fn ledger(&self) -> &DelegationLedger {
        &self.ledger
    }

    /// Notified after any transition a waiting loop may care about
    pub fn changes(&self) -> Arc<Notify> {
        Arc::clone(&self.changes)
    }

    /// The store for a conversation, loading it from disk on first use
    ///
    /// Delegations persisted with the conversation are loaded into the ledger.
    pub fn conversation(&mut self, conversation_id: &str) -> Result<&mut ConversationStore> {
        match self.stores.entry(conversation_id.to_string()) {
            Entry::Occupied(entry) => Ok(entry.into_mut()),
            Entry::Vacant(entry) => {
                let store = match &self.storage_dir {
                    Some(dir) => ConversationStore::open(dir, conversation_id)?,
                    None => ConversationStore::new(conversation_id),
                };
                for delegation in store.delegations() {
                    self.ledger.restore(delegation.clone());
                }
                Ok(entry.insert(store))
            }
        }
    }

    /// The store for a conversation if it has been loaded
    pub fn loaded_conversation(&self, conversation_id: &str) -> Option<&ConversationStore> {
        self.stores.get(conversation_id)
    }

    /// Allocate and register a new loop for `owner` in `conversation`
    ///
    /// Numbers already persisted in the conversation are never reused.
    pub fn start_loop(&mut self, owner: &str, conversation: &str) -> Result<LoopKey> {
        let persisted = self.conversation(conversation)?.highest_loop_number(owner);
        self.registry.reserve_numbers(owner, conversation, persisted);
        let key = self.registry.allocate(owner, conversation)?;
        if let Some(store) = self.stores.get_mut(conversation) {
            store.track_loop(owner, key.number);
        }
        Ok(key)
    }

    /// Register a loop under an explicit key
    ///
    /// Fails with `DuplicateLoop` if the conversation already holds this or a
    /// later loop number for the owner, including loops from earlier runs.
    pub fn register_loop(&mut self, key: LoopKey) -> Result<()> {
        let persisted = self.conversation(&key.conversation)?.highest_loop_number(&key.owner);
        self.registry.reserve_numbers(&key.owner, &key.conversation, persisted);
        self.registry.register(key.clone())?;
        if let Some(store) = self.stores.get_mut(&key.conversation) {
            store.track_loop(&key.owner, key.number);
        }
        Ok(())
    }

    pub fn loop_status(&self, key: &LoopKey) -> Option<LoopStatus> {
        self.registry.status(key)
    }

    pub fn is_aborted(&self, key: &LoopKey) -> bool {
        self.registry.is_aborted(key)
    }

    /// Append a message written by a loop
    pub fn add_message(&mut self, key: &LoopKey, content: impl Into<String>, message_type: MessageType) -> Result<u64> {
        let store = self.conversation(&key.conversation)?;
        Ok(store.add_message(&key.owner, key.number, content, message_type))
    }

    /// Abort a loop by conversation and number
    ///
    /// On success the loop's messages become visible together with a notice
    /// naming the caller.
    pub fn abort(
        &mut self,
        caller: &str,
        conversation: &str,
        loop_number: u32,
    ) -> std::result::Result<AbortReceipt, AbortDenied> {
        let receipt = self.registry.abort(caller, conversation, loop_number)?;
        self.seal_aborted(&receipt);
        Ok(receipt)
    }

    /// Abort a specific loop
    pub fn abort_loop(&mut self, caller: &str, key: &LoopKey) -> std::result::Result<AbortReceipt, AbortDenied> {
        let receipt = self.registry.abort_loop(caller, key)?;
        self.seal_aborted(&receipt);
        Ok(receipt)
    }

    fn seal_aborted(&mut self, receipt: &AbortReceipt) {
        let key = &receipt.key;
        match self.stores.get_mut(&key.conversation) {
            Some(store) => {
                store.add_message(
                    &key.owner,
                    key.number,
                    abort_notice(key.number, &receipt.caller),
                    MessageType::AbortNotice,
                );
                store.abort_ral(&key.owner, key.number);
            }
            None => log::warn!("Aborted loop {} has no loaded conversation store", key),
        }
        self.changes.notify_waiters();
    }

    /// Queue a message for a loop by conversation and number
    pub fn inject(&mut self, caller: &str, conversation: &str, loop_number: u32, message: impl Into<String>) -> bool {
        self.try_inject(caller, conversation, loop_number, message).is_ok()
    }

    /// Queue a message, reporting which loop got it or why none did
    pub fn try_inject(
        &mut self,
        caller: &str,
        conversation: &str,
        loop_number: u32,
        message: impl Into<String>,
    ) -> std::result::Result<LoopKey, AbortDenied> {
        let key = self.registry.try_inject(caller, conversation, loop_number, message)?;
        self.changes.notify_waiters();
        Ok(key)
    }

    /// Queue a message for a specific loop
    pub fn inject_into(&mut self, caller: &str, key: &LoopKey, message: impl Into<String>) -> bool {
        let delivered = self.registry.inject_into(caller, key, message);
        if delivered {
            self.changes.notify_waiters();
        }
        delivered
    }

    /// Take a loop's queued injections, oldest first
    pub fn drain_injections(&mut self, key: &LoopKey) -> Vec<InjectedMessage> {
        self.registry.drain_injections(key)
    }

    /// Open a delegation from a running loop
    ///
    /// Records the request in the conversation and puts the loop into
    /// awaiting-delegation. Returns the delegation id.
    pub fn delegate(
        &mut self,
        key: &LoopKey,
        recipients: Vec<String>,
        request_message: &str,
        phase: Option<String>,
    ) -> Result<String> {
        match self.registry.status(key) {
            Some(status) if !status.is_terminal() => {}
            _ => return Err(ConvoyError::LoopNotFound(key.to_string())),
        }

        let id = self.ledger.create(key, recipients, request_message, phase)?;
        self.add_message(key, request_message, MessageType::DelegationRequest)?;
        self.registry.mark_delegation_pending(key, &id);
        self.sync_delegations(&key.conversation)?;
        log::info!("Loop {} opened delegation {}", key, id);
        Ok(id)
    }

    pub fn set_request_event_id(&mut self, delegation_id: &str, event_id: impl Into<String>) -> Result<()> {
        self.ledger.set_request_event_id(delegation_id, event_id)?;
        if let Some(conversation) = self.delegation_conversation(delegation_id) {
            self.sync_delegations(&conversation)?;
        }
        Ok(())
    }

    /// Record a recipient's response, resolving the delegation if it was the last one
    ///
    /// The conversation is saved before returning. A save failure comes back
    /// as an error but the response stays recorded in memory; retry with `save`.
    pub fn record_response(&mut self, delegation_id: &str, response: DelegationResponse) -> Result<ResponseProgress> {
        let (owner, progress) = self.ledger.record_response(delegation_id, response)?;
        if progress == ResponseProgress::Resolved {
            self.registry.mark_delegation_resolved(&owner, delegation_id);
            log::info!("Delegation {} resolved for loop {}", delegation_id, owner);
            self.changes.notify_waiters();
        }
        self.sync_delegations(&owner.conversation)?;
        self.save(&owner.conversation)?;
        Ok(progress)
    }

    /// Withdraw a delegation whose request never reached its recipients
    ///
    /// The owning loop stops waiting on it and a note naming `reason` is
    /// written to the loop.
    pub fn cancel_delegation(&mut self, delegation_id: &str, reason: &str) -> Result<()> {
        let owner = self.ledger.withdraw(delegation_id)?;
        self.registry.mark_delegation_resolved(&owner, delegation_id);
        self.add_message(
            &owner,
            format!("[Delegation {} was not delivered: {}]", short_id(delegation_id), reason),
            MessageType::DelegationResponse,
        )?;
        self.sync_delegations(&owner.conversation)?;
        log::warn!("Delegation {} from loop {} cancelled: {}", delegation_id, owner, reason);
        self.changes.notify_waiters();
        Ok(())
    }

    /// True once every recipient of the delegation has answered
    pub fn is_resolved(&self, delegation_id: &str) -> bool {
        self.ledger.get(delegation_id).is_some_and(|r| r.is_resolved())
    }

    /// Finish a loop: registry first, then seal its messages
    ///
    /// Must be the last step of a loop, after all of its messages are written.
    /// Returns false if the loop had already ended or the registry does not
    /// know it; loops left over from an earlier run belong to recovery.
    pub fn complete_loop(&mut self, key: &LoopKey) -> Result<bool> {
        match self.registry.status(key) {
            Some(status) if !status.is_terminal() => {}
            Some(_) => return Ok(false),
            None => {
                log::warn!("Not completing loop {}: it is not registered", key);
                return Ok(false);
            }
        }
        self.registry.complete(key);
        let store = self.conversation(&key.conversation)?;
        let sealed = store.complete_ral(&key.owner, key.number);
        self.changes.notify_waiters();
        Ok(sealed)
    }

    /// Messages of finished loops in a conversation, in insertion order
    pub fn visible_messages(&self, conversation: &str) -> Vec<&Message> {
        self.stores
            .get(conversation)
            .map(|s| s.visible_messages().collect())
            .unwrap_or_default()
    }

    /// Render a single delegation
    pub fn render_delegation(&self, delegation_id: &str, options: RenderOptions) -> Option<String> {
        self.ledger
            .get(delegation_id)
            .map(|r| crate::delegation::render_delegation(r, options))
    }

    /// Render every delegation issued in a conversation
    pub fn render_delegations(&self, conversation: &str, options: RenderOptions) -> String {
        render_all(self.ledger.for_conversation(conversation), options)
    }

    /// Persist one conversation
    pub fn save(&self, conversation: &str) -> Result<()> {
        match self.stores.get(conversation) {
            Some(store) => store.save(),
            None => Ok(()),
        }
    }

    /// Persist every loaded conversation, stopping at the first failure
    pub fn save_all(&self) -> Result<()> {
        for store in self.stores.values() {
            store.save()?;
        }
        Ok(())
    }

    fn delegation_conversation(&self, delegation_id: &str) -> Option<String> {
        self.ledger
            .entry(delegation_id)
            .map(|entry| entry.owner.conversation.clone())
    }

    /// Copy the ledger's view of a conversation into its store for the next save
    fn sync_delegations(&mut self, conversation: &str) -> Result<()> {
        let entries: Vec<DelegationEntry> = self
            .ledger
            .entries_for_conversation(conversation)
            .into_iter()
            .cloned()
            .collect();
        self.conversation(conversation)?.set_delegations(entries);
        Ok(())
    }

    /// Live registry alongside a conversation's store
    pub(crate) fn registry_and_store(&mut self, conversation_id: &str) -> Result<(&LoopRegistry, &mut ConversationStore)> {
        self.conversation(conversation_id)?;
        let store = self
            .stores
            .get_mut(conversation_id)
            .ok_or_else(|| ConvoyError::Storage(format!("Conversation {} failed to load", conversation_id)))?;
        Ok((&self.registry, store))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn contents(messages: Vec<&Message>) -> Vec<String> {
        messages.into_iter().map(|m| m.content.clone()).collect()
    }

    #[test]
    fn test_start_loop_allocates_numbers() {
        let mut coordinator = Coordinator::new();
        let a = coordinator.start_loop("alice", "c1").unwrap();
        let b = coordinator.start_loop("alice", "c1").unwrap();
        assert_eq!((a.number, b.number), (1, 2));
        assert_eq!(coordinator.loop_status(&a), Some(LoopStatus::Active));
        assert_eq!(
            coordinator.loaded_conversation("c1").unwrap().loop_status("alice", 2),
            Some(LoopStatus::Active)
        );
    }

    #[test]
    fn test_register_loop_duplicate() {
        let mut coordinator = Coordinator::new();
        let key = LoopKey::new("alice", "c1", 3);
        coordinator.register_loop(key.clone()).unwrap();
        assert!(matches!(
            coordinator.register_loop(key),
            Err(ConvoyError::DuplicateLoop(_))
        ));
    }

    #[test]
    fn test_abort_seals_with_notice() {
        let mut coordinator = Coordinator::new();
        let key = coordinator.start_loop("alice", "c1").unwrap();
        coordinator.add_message(&key, "step one", MessageType::Text).unwrap();
        assert!(coordinator.visible_messages("c1").is_empty());

        coordinator.abort("bob", "c1", key.number).unwrap();

        assert!(coordinator.is_aborted(&key));
        let visible = coordinator.visible_messages("c1");
        assert_eq!(visible.len(), 2);
        assert_eq!(visible[1].message_type, MessageType::AbortNotice);
        assert_eq!(visible[1].content, "[Loop #1 was aborted by bob]");
    }

    #[test]
    fn test_failed_abort_changes_nothing() {
        let mut coordinator = Coordinator::new();
        let key = coordinator.start_loop("alice", "c1").unwrap();
        coordinator
            .delegate(&key, vec!["bob".to_string()], "help", None)
            .unwrap();
        let messages_before = coordinator.loaded_conversation("c1").unwrap().messages().len();

        let denied = coordinator.abort("carol", "c1", key.number).unwrap_err();
        assert!(matches!(denied, AbortDenied::PendingDelegations { .. }));
        assert_eq!(coordinator.loop_status(&key), Some(LoopStatus::AwaitingDelegation));
        assert_eq!(
            coordinator.loaded_conversation("c1").unwrap().messages().len(),
            messages_before
        );
    }

    #[test]
    fn test_delegate_on_finished_loop_fails() {
        let mut coordinator = Coordinator::new();
        let key = coordinator.start_loop("alice", "c1").unwrap();
        coordinator.complete_loop(&key).unwrap();
        let err = coordinator
            .delegate(&key, vec!["bob".to_string()], "help", None)
            .unwrap_err();
        assert!(matches!(err, ConvoyError::LoopNotFound(_)));
        assert!(coordinator.ledger().is_empty());
    }

    #[test]
    fn test_record_response_resolves_loop() {
        let mut coordinator = Coordinator::new();
        let key = coordinator.start_loop("alice", "c1").unwrap();
        let id = coordinator
            .delegate(&key, vec!["bob".to_string()], "help", Some("plan".to_string()))
            .unwrap();
        assert!(!coordinator.is_resolved(&id));

        let progress = coordinator
            .record_response(&id, DelegationResponse::completed("bob", "done", "e1"))
            .unwrap();
        assert_eq!(progress, ResponseProgress::Resolved);
        assert!(coordinator.is_resolved(&id));
        assert_eq!(coordinator.loop_status(&key), Some(LoopStatus::Active));
    }

    #[test]
    fn test_complete_loop_is_idempotent() {
        let mut coordinator = Coordinator::new();
        let key = coordinator.start_loop("alice", "c1").unwrap();
        coordinator.add_message(&key, "answer", MessageType::Text).unwrap();
        assert!(coordinator.complete_loop(&key).unwrap());
        assert!(!coordinator.complete_loop(&key).unwrap());
        assert_eq!(contents(coordinator.visible_messages("c1")), vec!["answer"]);
    }

    #[test]
    fn test_inject_reaches_queue() {
        let mut coordinator = Coordinator::new();
        let key = coordinator.start_loop("alice", "c1").unwrap();
        assert!(coordinator.inject("bob", "c1", 1, "ping"));
        assert!(!coordinator.inject("bob", "c1", 2, "nobody home"));
        let drained = coordinator.drain_injections(&key);
        assert_eq!(drained.len(), 1);
        assert_eq!(drained[0].content, "ping");
    }

    #[test]
    fn test_render_delegations_for_conversation() {
        let mut coordinator = Coordinator::new();
        let key = coordinator.start_loop("alice", "c1").unwrap();
        let id = coordinator
            .delegate(&key, vec!["bob".to_string()], "a < b", None)
            .unwrap();

        let rendered = coordinator.render_delegations("c1", RenderOptions::default());
        assert!(rendered.contains("<delegation-request>a &lt; b</delegation-request>"));
        assert_eq!(
            coordinator.render_delegation(&id, RenderOptions::default()).unwrap(),
            rendered
        );
        assert!(coordinator.render_delegations("c2", RenderOptions::default()).is_empty());
    }

    #[test]
    fn test_start_loop_skips_persisted_numbers() {
        let temp = TempDir::new().unwrap();
        {
            let mut coordinator = Coordinator::with_storage_dir(temp.path());
            let key = coordinator.start_loop("alice", "c1").unwrap();
            coordinator.complete_loop(&key).unwrap();
            coordinator.save("c1").unwrap();
        }

        let mut coordinator = Coordinator::with_storage_dir(temp.path());
        let key = coordinator.start_loop("alice", "c1").unwrap();
        assert_eq!(key.number, 2);
        assert_eq!(coordinator.start_loop("bob", "c1").unwrap().number, 1);
    }

    #[test]
    fn test_save_and_reload() {
        let temp = TempDir::new().unwrap();
        {
            let mut coordinator = Coordinator::with_storage_dir(temp.path());
            let key = coordinator.start_loop("alice", "c1").unwrap();
            coordinator.add_message(&key, "persisted", MessageType::Text).unwrap();
            coordinator.complete_loop(&key).unwrap();
            coordinator.save_all().unwrap();
        }

        let mut coordinator = Coordinator::with_storage_dir(temp.path());
        let store = coordinator.conversation("c1").unwrap();
        let visible: Vec<&str> = store.visible_messages().map(|m| m.content.as_str()).collect();
        assert_eq!(visible, vec!["persisted"]);
    }

    #[test]
    fn test_register_loop_rejects_reuse_after_complete() {
        let mut coordinator = Coordinator::new();
        let key = LoopKey::new("alice", "c1", 1);
        coordinator.register_loop(key.clone()).unwrap();
        coordinator.add_message(&key, "first run", MessageType::Text).unwrap();
        coordinator.complete_loop(&key).unwrap();

        assert!(matches!(
            coordinator.register_loop(key.clone()),
            Err(ConvoyError::DuplicateLoop(_))
        ));
        assert_eq!(coordinator.loop_status(&key), Some(LoopStatus::Completed));
        assert_eq!(contents(coordinator.visible_messages("c1")), vec!["first run"]);
    }

    #[test]
    fn test_register_loop_rejects_number_used_before_restart() {
        let temp = TempDir::new().unwrap();
        {
            let mut coordinator = Coordinator::with_storage_dir(temp.path());
            let key = LoopKey::new("alice", "c1", 1);
            coordinator.register_loop(key.clone()).unwrap();
            coordinator.add_message(&key, "old", MessageType::Text).unwrap();
            coordinator.complete_loop(&key).unwrap();
            coordinator.save("c1").unwrap();
        }

        let mut coordinator = Coordinator::with_storage_dir(temp.path());
        assert!(matches!(
            coordinator.register_loop(LoopKey::new("alice", "c1", 1)),
            Err(ConvoyError::DuplicateLoop(_))
        ));

        let key = LoopKey::new("alice", "c1", 2);
        coordinator.register_loop(key.clone()).unwrap();
        coordinator.add_message(&key, "new", MessageType::Text).unwrap();
        assert!(coordinator.complete_loop(&key).unwrap());
        assert_eq!(contents(coordinator.visible_messages("c1")), vec!["old", "new"]);
    }

    #[test]
    fn test_complete_loop_leaves_unregistered_loop_sealed_off() {
        let mut coordinator = Coordinator::new();
        let ghost = LoopKey::new("ghost", "c1", 1);
        coordinator.add_message(&ghost, "stray", MessageType::Text).unwrap();

        assert!(!coordinator.complete_loop(&ghost).unwrap());
        assert!(coordinator.visible_messages("c1").is_empty());
        assert_eq!(
            coordinator.loaded_conversation("c1").unwrap().loop_status("ghost", 1),
            Some(LoopStatus::Active)
        );
    }

    #[test]
    fn test_abort_after_completing_with_pending_delegation() {
        let mut coordinator = Coordinator::new();
        let key = coordinator.start_loop("alice", "c1").unwrap();
        let id = coordinator
            .delegate(&key, vec!["bob".to_string()], "help", None)
            .unwrap();
        assert!(coordinator.complete_loop(&key).unwrap());

        assert_eq!(coordinator.abort("carol", "c1", key.number), Err(AbortDenied::NotFound));
        assert_eq!(coordinator.loop_status(&key), Some(LoopStatus::Completed));

        let progress = coordinator
            .record_response(&id, DelegationResponse::completed("bob", "late", "e1"))
            .unwrap();
        assert_eq!(progress, ResponseProgress::Resolved);
        assert_eq!(coordinator.loop_status(&key), Some(LoopStatus::Completed));
    }

    #[test]
    fn test_delegations_survive_reload() {
        let temp = TempDir::new().unwrap();
        let id = {
            let mut coordinator = Coordinator::with_storage_dir(temp.path());
            let key = coordinator.start_loop("alice", "c1").unwrap();
            let id = coordinator
                .delegate(&key, vec!["bob".to_string(), "carol".to_string()], "review", None)
                .unwrap();
            coordinator.set_request_event_id(&id, "evt-req").unwrap();
            coordinator
                .record_response(&id, DelegationResponse::completed("bob", "lgtm", "e1"))
                .unwrap();
            id
        };

        let mut coordinator = Coordinator::with_storage_dir(temp.path());
        coordinator.conversation("c1").unwrap();
        assert_eq!(coordinator.ledger().len(), 1);
        assert_eq!(
            coordinator.ledger().get(&id).unwrap().request_event_id.as_deref(),
            Some("evt-req")
        );

        let rendered = coordinator.render_delegations("c1", RenderOptions::default());
        assert!(rendered.contains("<response from=\"bob\">lgtm</response>"));
        assert!(rendered.contains("<response from=\"carol\" status=\"pending\"/>"));

        let progress = coordinator
            .record_response(&id, DelegationResponse::error("carol", "no time", "e2"))
            .unwrap();
        assert_eq!(progress, ResponseProgress::Resolved);
    }

    #[test]
    fn test_cancel_delegation_releases_loop() {
        let mut coordinator = Coordinator::new();
        let key = coordinator.start_loop("alice", "c1").unwrap();
        let id = coordinator
            .delegate(&key, vec!["bob".to_string()], "help", None)
            .unwrap();

        coordinator.cancel_delegation(&id, "relay down").unwrap();
        assert_eq!(coordinator.loop_status(&key), Some(LoopStatus::Active));
        assert!(coordinator.ledger().is_empty());
        assert!(coordinator.render_delegations("c1", RenderOptions::default()).is_empty());
        assert!(matches!(
            coordinator.cancel_delegation(&id, "again"),
            Err(ConvoyError::DelegationNotFound(_))
        ));
    }
}
