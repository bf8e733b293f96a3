//! Convoy - execution-loop coordination for multi-agent conversations
//!
//! Agents run execution loops inside shared conversations. Convoy tracks those
//! loops, lets other agents abort them or inject messages into them, keeps a
//! loop's messages hidden until it finishes, and renders delegations between
//! agents as XML for language-model context.

pub mod conversation;
pub mod coordination;
pub mod delegation;
pub mod domain;
pub mod error;
pub mod id;
pub mod recovery;
pub mod registry;
pub mod runner;
pub mod storage;
pub mod tools;
pub mod transport;
pub mod worktree;

pub use error::{ConvoyError, Result};
