//! Per-conversation message log with loop-gated visibility.
//!
//! Messages are appended unconditionally. A message becomes visible once its
//! loop is sealed as completed or aborted, and only if it was written before
//! the seal; anything a loop writes after it was sealed stays hidden.
//!
//! The file also carries the conversation's delegation records so pending
//! and resolved delegations survive a restart.

use std::collections::BTreeMap;
use std::path::Path;

use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::domain::{DelegationEntry, LoopStatus, Message, MessageType};
use crate::error::Result;
use crate::storage::JsonlFile;

/// Persisted lifecycle of one loop as the store sees it
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoopRecord {
    pub owner: String,
    pub loop_number: u32,
    pub status: LoopStatus,
    /// Sequence number at which the loop was sealed; earlier messages are visible
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sealed_at: Option<u64>,
}

impl LoopRecord {
    fn active(owner: &str, loop_number: u32) -> Self {
        Self {
            owner: owner.to_string(),
            loop_number,
            status: LoopStatus::Active,
            sealed_at: None,
        }
    }

    fn shows(&self, message: &Message) -> bool {
        self.status.is_terminal() && self.sealed_at.is_some_and(|seal| message.seq < seal)
    }
}

/// One line of the conversation file
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "entry", rename_all = "snake_case")]
enum LogEntry {
    Message(Message),
    Loop(LoopRecord),
    Delegation(DelegationEntry),
}

/// Message log for one conversation
#[derive(Debug)]
pub struct ConversationStore {
    conversation_id: String,
    file: Option<JsonlFile>,
    messages: Vec<Message>,
    loops: BTreeMap<(String, u32), LoopRecord>,
    delegations: Vec<DelegationEntry>,
    next_seq: u64,
}

impl ConversationStore {
    /// Create an in-memory store; `save` is a no-op
    pub fn new(conversation_id: impl Into<String>) -> Self {
        Self {
            conversation_id: conversation_id.into(),
            file: None,
            messages: Vec::new(),
            loops: BTreeMap::new(),
            delegations: Vec::new(),
            next_seq: 0,
        }
    }

    /// Open the store backed by `<dir>/<conversation_id>.jsonl`, loading it if present
    ///
    /// Visibility after reload comes from the persisted loop records only.
    pub fn open(dir: impl AsRef<Path>, conversation_id: impl Into<String>) -> Result<Self> {
        let conversation_id = conversation_id.into();
        let file = JsonlFile::new(dir.as_ref().join(format!("{}.jsonl", conversation_id)));

        let mut store = Self::new(conversation_id);
        for entry in file.read_all::<LogEntry>()? {
            match entry {
                LogEntry::Message(message) => {
                    store.next_seq = store.next_seq.max(message.seq + 1);
                    store.messages.push(message);
                }
                LogEntry::Loop(record) => {
                    store.loops.insert((record.owner.clone(), record.loop_number), record);
                }
                LogEntry::Delegation(entry) => store.delegations.push(entry),
            }
        }
        store.messages.sort_by_key(|m| m.seq);

        log::debug!(
            "Loaded conversation {} ({} messages, {} loops, {} delegations) from {}",
            store.conversation_id,
            store.messages.len(),
            store.loops.len(),
            store.delegations.len(),
            file.path().display()
        );
        store.file = Some(file);
        Ok(store)
    }

    pub fn conversation_id(&self) -> &str {
        &self.conversation_id
    }

    /// Start tracking a loop before it writes anything
    pub fn track_loop(&mut self, owner: &str, loop_number: u32) {
        self.loops
            .entry((owner.to_string(), loop_number))
            .or_insert_with(|| LoopRecord::active(owner, loop_number));
    }

    /// Append a message; never checks visibility
    ///
    /// Returns the message's sequence number.
    pub fn add_message(
        &mut self,
        owner: &str,
        loop_number: u32,
        content: impl Into<String>,
        message_type: MessageType,
    ) -> u64 {
        self.track_loop(owner, loop_number);
        if let Some(record) = self.loops.get(&(owner.to_string(), loop_number))
            && record.status.is_terminal()
        {
            log::warn!(
                "Loop {}#{} in {} wrote after it was {}; message stays hidden",
                owner,
                loop_number,
                self.conversation_id,
                record.status
            );
        }

        let seq = self.next_seq;
        self.next_seq += 1;
        self.messages.push(Message {
            seq,
            owner: owner.to_string(),
            loop_number,
            content: content.into(),
            message_type,
            created_at: Utc::now(),
        });
        seq
    }

    /// Seal a loop as completed, making its messages visible
    ///
    /// Returns false if the loop was already sealed.
    pub fn complete_ral(&mut self, owner: &str, loop_number: u32) -> bool {
        self.seal(owner, loop_number, LoopStatus::Completed)
    }

    /// Seal a loop as aborted, making its messages visible
    pub fn abort_ral(&mut self, owner: &str, loop_number: u32) -> bool {
        self.seal(owner, loop_number, LoopStatus::Aborted)
    }

    fn seal(&mut self, owner: &str, loop_number: u32, status: LoopStatus) -> bool {
        let next_seq = self.next_seq;
        let record = self
            .loops
            .entry((owner.to_string(), loop_number))
            .or_insert_with(|| LoopRecord::active(owner, loop_number));
        if record.status.is_terminal() {
            return false;
        }
        record.status = status;
        record.sealed_at = Some(next_seq);
        true
    }

    /// Messages from sealed loops, in insertion order
    ///
    /// Reflects the store's state each time it is called.
    pub fn visible_messages(&self) -> impl Iterator<Item = &Message> + '_ {
        self.messages.iter().filter(|m| {
            self.loops
                .get(&(m.owner.clone(), m.loop_number))
                .is_some_and(|record| record.shows(m))
        })
    }

    /// Every stored message, visible or not
    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    /// Messages written by one loop, in insertion order
    pub fn loop_messages<'a>(&'a self, owner: &'a str, loop_number: u32) -> impl Iterator<Item = &'a Message> + 'a {
        self.messages
            .iter()
            .filter(move |m| m.owner == owner && m.loop_number == loop_number)
    }

    pub fn loop_status(&self, owner: &str, loop_number: u32) -> Option<LoopStatus> {
        self.loops.get(&(owner.to_string(), loop_number)).map(|r| r.status)
    }

    /// Every loop the store knows about, ordered by owner then number
    pub fn loops(&self) -> impl Iterator<Item = &LoopRecord> {
        self.loops.values()
    }

    /// Highest loop number recorded for `owner`, 0 if none
    pub fn highest_loop_number(&self, owner: &str) -> u32 {
        self.loops
            .keys()
            .filter(|(o, _)| o == owner)
            .map(|(_, n)| *n)
            .max()
            .unwrap_or(0)
    }

    /// Delegations issued from this conversation, oldest first
    pub fn delegations(&self) -> &[DelegationEntry] {
        &self.delegations
    }

    /// Replace the delegation snapshot written by the next `save`
    pub fn set_delegations(&mut self, delegations: Vec<DelegationEntry>) {
        self.delegations = delegations;
    }

    /// Loops that have not been sealed yet
    pub fn unsealed_loops(&self) -> Vec<&LoopRecord> {
        self.loops.values().filter(|r| !r.status.is_terminal()).collect()
    }

    /// Persist the full log
    ///
    /// I/O failures are returned to the caller, which decides whether to retry.
    pub fn save(&self) -> Result<()> {
        let Some(file) = &self.file else {
            return Ok(());
        };

        let entries: Vec<LogEntry> = self
            .messages
            .iter()
            .cloned()
            .map(LogEntry::Message)
            .chain(self.loops.values().cloned().map(LogEntry::Loop))
            .chain(self.delegations.iter().cloned().map(LogEntry::Delegation))
            .collect();
        file.rewrite(&entries)?;

        log::debug!(
            "Saved conversation {} ({} entries) to {}",
            self.conversation_id,
            entries.len(),
            file.path().display()
        );
        Ok(())
    }
}
