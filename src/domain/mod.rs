//! Domain types for Convoy
//!
//! This module contains all core domain types:
//! - LoopKey / LoopStatus: identity and lifecycle of an execution loop
//! - Message: one entry in a conversation log
//! - DelegationRecord: a request to other agents and their responses
//! - AuditEvent: who aborted or injected into which loop
//! - LoopOutcome: how a driven loop ended

pub mod audit;
pub mod delegation;
pub mod loop_state;
pub mod message;
pub mod outcome;

pub use audit::{AuditAction, AuditEvent};
pub use delegation::{DelegationEntry, DelegationRecord, DelegationResponse, ResponseProgress, ResponseStatus};
pub use loop_state::{InjectedMessage, LoopKey, LoopStatus};
pub use message::{Message, MessageType};
pub use outcome::LoopOutcome;
