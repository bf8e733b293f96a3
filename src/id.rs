//! ID generation utilities for Convoy
//!
//! Delegation and event ids look like event-network ids: 64 lowercase hex
//! characters. Debug rendering only ever shows the first eight.

use rand::Rng;

/// Number of characters shown when an id is abbreviated
pub const SHORT_ID_LEN: usize = 8;

/// Generate a random 32-byte id, hex encoded
fn random_hex_id() -> String {
    let bytes: [u8; 32] = rand::rng().random();
    hex::encode(bytes)
}

/// Generate a fresh delegation id
pub fn generate_delegation_id() -> String {
    random_hex_id()
}

/// Generate a fresh event id (used by in-process transports)
pub fn generate_event_id() -> String {
    random_hex_id()
}

/// Abbreviate an id to its first eight characters
///
/// Ids shorter than that are returned unchanged. Works on char boundaries so a
/// non-hex id from an external collaborator cannot cause a panic.
pub fn short_id(id: &str) -> &str {
    match id.char_indices().nth(SHORT_ID_LEN) {
        Some((idx, _)) => &id[..idx],
        None => id,
    }
}
