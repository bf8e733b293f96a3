//! Loop coordination
//!
//! The coordinator ties the loop registry, the delegation ledger and the
//! conversation stores together so that aborts, injections and delegation
//! responses reach every piece of state in one step.

mod coordinator;

pub use coordinator::{Coordinator, SharedCoordinator, abort_notice};
