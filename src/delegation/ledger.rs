//! Arena of delegation records keyed by id.
//!
//! Loops only hold delegation ids; the ledger maps each id to its record and
//! to the loop that issued it, so there are no loop/record back-references.
//! A resolved delegation stays readable for context assembly; only a request
//! that never reached its recipients is withdrawn.

use std::collections::HashMap;

use crate::domain::{DelegationEntry, DelegationRecord, DelegationResponse, LoopKey, ResponseProgress};
use crate::error::{ConvoyError, Result};

/// All delegations known to the process
#[derive(Debug, Default)]
pub struct DelegationLedger {
    entries: HashMap<String, DelegationEntry>,
    /// Ids in creation order
    order: Vec<String>,
}

impl DelegationLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Open a delegation issued by `owner` to `recipients`
    ///
    /// Returns the new delegation id.
    pub fn create(
        &mut self,
        owner: &LoopKey,
        recipients: Vec<String>,
        request_message: impl Into<String>,
        phase: Option<String>,
    ) -> Result<String> {
        let mut record = DelegationRecord::new(owner.owner.clone(), recipients, request_message)?;
        record.phase = phase;
        let id = record.id.clone();

        self.order.push(id.clone());
        self.entries.insert(
            id.clone(),
            DelegationEntry {
                owner: owner.clone(),
                record,
            },
        );
        Ok(id)
    }

    /// Load a delegation read back from disk
    ///
    /// Returns false if the id is already known; the in-memory record wins.
    pub fn restore(&mut self, entry: DelegationEntry) -> bool {
        if self.entries.contains_key(&entry.record.id) {
            return false;
        }
        self.order.push(entry.record.id.clone());
        self.entries.insert(entry.record.id.clone(), entry);
        true
    }

    /// Withdraw a delegation whose request was never delivered
    ///
    /// Returns the loop that issued it.
    pub fn withdraw(&mut self, id: &str) -> Result<LoopKey> {
        let entry = self
            .entries
            .remove(id)
            .ok_or_else(|| ConvoyError::DelegationNotFound(id.to_string()))?;
        self.order.retain(|known| known != id);
        Ok(entry.owner)
    }

    pub fn get(&self, id: &str) -> Option<&DelegationRecord> {
        self.entries.get(id).map(|e| &e.record)
    }

    /// Record together with the loop that issued it
    pub fn entry(&self, id: &str) -> Option<&DelegationEntry> {
        self.entries.get(id)
    }

    /// Attach the published request's event id
    pub fn set_request_event_id(&mut self, id: &str, event_id: impl Into<String>) -> Result<()> {
        let entry = self
            .entries
            .get_mut(id)
            .ok_or_else(|| ConvoyError::DelegationNotFound(id.to_string()))?;
        entry.record.request_event_id = Some(event_id.into());
        Ok(())
    }

    /// Record a recipient's response
    ///
    /// Returns the issuing loop and whether the delegation is now resolved.
    pub fn record_response(&mut self, id: &str, response: DelegationResponse) -> Result<(LoopKey, ResponseProgress)> {
        let entry = self
            .entries
            .get_mut(id)
            .ok_or_else(|| ConvoyError::DelegationNotFound(id.to_string()))?;
        let progress = entry.record.record_response(response)?;
        Ok((entry.owner.clone(), progress))
    }

    /// Delegations issued from a conversation, oldest first
    pub fn for_conversation(&self, conversation: &str) -> Vec<&DelegationRecord> {
        self.entries_for_conversation(conversation)
            .into_iter()
            .map(|e| &e.record)
            .collect()
    }

    /// Delegations issued from a conversation with their owning loops, oldest first
    pub fn entries_for_conversation(&self, conversation: &str) -> Vec<&DelegationEntry> {
        self.in_order().filter(|e| e.owner.conversation == conversation).collect()
    }

    /// Delegations issued by one loop, oldest first
    pub fn for_loop(&self, key: &LoopKey) -> Vec<&DelegationRecord> {
        self.in_order().filter(|e| &e.owner == key).map(|e| &e.record).collect()
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    fn in_order(&self) -> impl Iterator<Item = &DelegationEntry> {
        self.order.iter().filter_map(|id| self.entries.get(id))
    }
}
