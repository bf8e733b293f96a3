//! Orphaned loop detection and sealing.

use crate::conversation::ConversationStore;
use crate::coordination::Coordinator;
use crate::domain::{LoopKey, MessageType};
use crate::error::Result;
use crate::registry::LoopRegistry;

pub fn interrupted_notice(loop_number: u32) -> String {
    format!("[Loop #{} was interrupted and did not finish]", loop_number)
}

/// Unsealed loops in `store` that the registry is not running
///
/// Returned as (owner, loop number) in store order.
pub fn find_orphaned_loops(store: &ConversationStore, registry: &LoopRegistry) -> Vec<(String, u32)> {
    store
        .unsealed_loops()
        .into_iter()
        .filter(|record| {
            let key = LoopKey::new(record.owner.as_str(), store.conversation_id(), record.loop_number);
            registry.status(&key).is_none()
        })
        .map(|record| (record.owner.clone(), record.loop_number))
        .collect()
}

/// Seal every orphaned loop as aborted
///
/// Returns the loops that were sealed.
pub fn abandon_orphans(store: &mut ConversationStore, registry: &LoopRegistry) -> Vec<(String, u32)> {
    let orphans = find_orphaned_loops(store, registry);

    for (owner, number) in &orphans {
        store.add_message(owner, *number, interrupted_notice(*number), MessageType::AbortNotice);
        store.abort_ral(owner, *number);
        log::info!(
            "Abandoned orphaned loop {}/{}#{}",
            owner,
            store.conversation_id(),
            number
        );
    }

    orphans
}

/// Load a conversation, abandon its orphans and persist the result
///
/// Returns the number of loops abandoned.
pub fn recover_conversation(coordinator: &mut Coordinator, conversation_id: &str) -> Result<usize> {
    let (registry, store) = coordinator.registry_and_store(conversation_id)?;
    let abandoned = abandon_orphans(store, registry);

    if !abandoned.is_empty() {
        log::warn!(
            "Recovered {} orphaned loop(s) in conversation {}",
            abandoned.len(),
            conversation_id
        );
        coordinator.save(conversation_id)?;
    }

    Ok(abandoned.len())
}
