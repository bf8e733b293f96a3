//! Cooperative loop driver.
//!
//! A runner drives one execution loop step by step. Between steps it picks
//! up injected messages and checks for an abort, so a loop stops at its next
//! suspension point once another agent has aborted it.

mod loop_runner;

pub use loop_runner::{LoopRunner, LoopRunnerConfig, Step, StepContext, StepExecutor};
