//! Storage layer for Convoy - JSONL files on local disk.

mod jsonl;

pub use jsonl::JsonlFile;
