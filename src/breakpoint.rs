//! The interpreter's single suspension point besides input: an optional
//! breakpoint hook, invoked synchronously once per step.

/// A read-only view the breakpoint hook gets of the running interpreter.
pub struct StepView<'a> {
    pub ip: u64,
    pub op_counter: u64,
    pub memory: &'a mut dyn crate::memory::Memory,
}

/// Implemented by debuggers/tracers that want to pause execution.
pub trait BreakpointHandler {
    /// Called before every step; return `true` to invoke [`Self::handle`].
    fn should_break(&mut self, ip: u64, op_counter: u64) -> bool;

    /// Called when [`Self::should_break`] returns `true`. May block. Return
    /// `false` to drop the handler for the remainder of the run (equivalent
    /// to "continue, don't ask again").
    fn handle(&mut self, view: StepView) -> bool;
}
