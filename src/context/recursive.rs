//! Immediate execution: continuations run inline, as soon as they are scheduled.
//!
//! The simplest execution. Graph depth is bounded by the call stack.

use crate::error::Result;
use crate::model::{Obj, Value};

use super::{Continuation, CopyContext, CopyCore};

/// Context running every continuation on the spot.
pub struct RecursiveCopyContext<'c> {
    core: &'c CopyCore,
}

impl<'c> RecursiveCopyContext<'c> {
    /// Context over `core`.
    pub fn new(core: &'c CopyCore) -> Self {
        Self { core }
    }
}

impl CopyContext for RecursiveCopyContext<'_> {
    fn copy(&self, value: &Value) -> Result<Value> {
        self.core.copy(value, self)
    }

    fn register(&self, original: &Obj, clone: &Obj) -> Result<()> {
        self.core.register(original, clone)
    }

    fn schedule(&self, task: Continuation) -> Result<()> {
        self.core.count_continuation();
        task(self)
    }
}

/// Copies `root` recursively.
pub fn run(core: &CopyCore, root: &Value) -> Result<Value> {
    RecursiveCopyContext::new(core).copy(root)
}
