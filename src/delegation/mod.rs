//! Delegation tracking and rendering
//!
//! - ledger: arena of delegation records, keyed by id
//! - render: deterministic XML blocks for language-model context

mod ledger;
mod render;

pub use ledger::DelegationLedger;
pub use render::{RenderOptions, escape_xml, render_all, render_delegation};
