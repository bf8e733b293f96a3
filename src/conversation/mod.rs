//! Conversation message store
//!
//! Append-only log of messages per conversation, each tagged with the agent
//! and loop that wrote it. Readers only ever see messages from loops that
//! have finished.

mod store;

pub use store::{ConversationStore, LoopRecord};
