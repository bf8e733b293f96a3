//! CLI module for convoy - inspect and repair stored conversations.

pub mod commands;

pub use commands::Cli;
