//! Recovery of loops left open by a crashed process.
//!
//! A reloaded conversation may hold loops persisted as running that no live
//! registry knows about. Nothing will ever complete them, so their messages
//! would stay hidden forever. Recovery seals them as aborted with a notice.

mod orphan;

pub use orphan::{abandon_orphans, find_orphaned_loops, interrupted_notice, recover_conversation};
