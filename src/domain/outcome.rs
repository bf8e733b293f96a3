//! Loop execution outcome types.

/// How a driven loop ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoopOutcome {
    /// Loop finished its work
    Completed,
    /// Loop noticed an abort at a suspension point and stopped
    Aborted,
    /// Loop hit its step bound without finishing
    StepLimit(u32),
}
