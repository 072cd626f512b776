//! Deferred single-threaded execution.
//!
//! Continuations are queued and drained by the invoking thread after the root copy returns,
//! so graph depth is not bounded by the call stack. The queue discipline only changes the order
//! in which independent subtrees are filled in:
//!
//! * [`TraversalOrder::DepthFirst`]: last in, first out.
//! * [`TraversalOrder::BreadthFirst`]: first in, first out.

use std::cell::RefCell;
use std::collections::VecDeque;

use crate::config::TraversalOrder;
use crate::error::Result;
use crate::model::{Obj, Value};

use super::{Continuation, CopyContext, CopyCore};

/// Context queuing continuations for a later drain.
pub struct SequentialCopyContext<'c> {
    core: &'c CopyCore,
    order: TraversalOrder,
    queue: RefCell<VecDeque<Continuation>>,
}

impl<'c> SequentialCopyContext<'c> {
    /// Context over `core`.
    pub fn new(core: &'c CopyCore, order: TraversalOrder) -> Self {
        Self {
            core,
            order,
            queue: RefCell::new(VecDeque::new()),
        }
    }

    fn next(&self) -> Option<Continuation> {
        let mut queue = self.queue.borrow_mut();
        match self.order {
            TraversalOrder::DepthFirst => queue.pop_back(),
            TraversalOrder::BreadthFirst => queue.pop_front(),
        }
    }

    /// Runs queued continuations until the queue is empty. Stops at the first failure.
    pub fn drain(&self) -> Result<()> {
        while let Some(task) = self.next() {
            self.core.count_continuation();
            task(self)?;
        }
        Ok(())
    }

    /// Continuations waiting in the queue.
    pub fn pending(&self) -> usize {
        self.queue.borrow().len()
    }
}

impl CopyContext for SequentialCopyContext<'_> {
    fn copy(&self, value: &Value) -> Result<Value> {
        self.core.copy(value, self)
    }

    fn register(&self, original: &Obj, clone: &Obj) -> Result<()> {
        self.core.register(original, clone)
    }

    fn schedule(&self, task: Continuation) -> Result<()> {
        self.queue.borrow_mut().push_back(task);
        Ok(())
    }
}

/// Copies `root`, then drains the queue.
pub fn run(core: &CopyCore, order: TraversalOrder, root: &Value) -> Result<Value> {
    let ctx = SequentialCopyContext::new(core, order);
    let copied = ctx.copy(root)?;
    ctx.drain()?;
    Ok(copied)
}
