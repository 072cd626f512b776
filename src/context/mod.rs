//! The copy context: one deep-clone invocation.
//!
//! Every copier talks to the engine through [`CopyContext`]: `copy` for child values,
//! `register` to publish a clone before its children are copied, and `schedule` to defer the
//! filling of a two-phase clone. The protocol itself lives in [`CopyCore`] and is shared by the
//! three executions, which differ only in where scheduled continuations run:
//!
//! | Execution | Continuations run |
//! |---|---|
//! | [`recursive`] | immediately, on the call stack |
//! | [`sequential`] | from a queue drained after the root copy, LIFO or FIFO |
//! | [`parallel`] | on a rayon scope, cancelled cooperatively on the first failure |
//!
//! ## Per-original state machine
//!
//! ```text
//! UNSEEN -> SLOT_RESERVED -> CLONE_REGISTERED -> COMPLETE (after the continuation ran)
//!                   \
//!                    -> FAILED (strategy error; waiters get the same error)
//! ```

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread;

use crate::error::{CloneError, Result};
use crate::identity::{CloneSlot, IdentityCache, SlotOutcome};
use crate::model::{Obj, Value};
use crate::registry::CopierRegistry;

pub mod parallel;
pub mod recursive;
pub mod sequential;

/// Deferred work that fills in a registered clone.
pub type Continuation = Box<dyn FnOnce(&dyn CopyContext) -> Result<()> + Send>;

/// What copiers see of the running invocation.
pub trait CopyContext {
    /// Copies `value`: scalars are returned as is, objects go through their strategy, and an
    /// object already copied in this invocation resolves to its existing clone.
    fn copy(&self, value: &Value) -> Result<Value>;

    /// Publishes `clone` as the clone of `original`.
    fn register(&self, original: &Obj, clone: &Obj) -> Result<()>;

    /// Hands `task` to the execution.
    fn schedule(&self, task: Continuation) -> Result<()>;

    /// Copies an object reference.
    fn copy_obj(&self, original: &Obj) -> Result<Value> {
        self.copy(&Value::Obj(original.clone()))
    }
}

/// State and protocol of one invocation, independent of the execution.
pub struct CopyCore {
    registry: Arc<CopierRegistry>,
    cache: IdentityCache,
    copied: AtomicUsize,
    continuations: AtomicUsize,
}

impl CopyCore {
    /// Starts an invocation. The identity cache is seeded with the introspector's singletons
    /// (mapped to themselves) and the caller's pairs.
    pub fn new(registry: Arc<CopierRegistry>, seeds: &[(Obj, Obj)]) -> Self {
        let singletons = registry.introspector().singletons();
        let cache = IdentityCache::seeded(
            singletons
                .iter()
                .map(|s| (s, s))
                .chain(seeds.iter().map(|(original, clone)| (original, clone))),
        );
        Self {
            registry,
            cache,
            copied: AtomicUsize::new(0),
            continuations: AtomicUsize::new(0),
        }
    }

    /// The identity cache of this invocation.
    pub fn cache(&self) -> &IdentityCache {
        &self.cache
    }

    /// Objects copied through a non-trivial strategy so far.
    pub fn copied(&self) -> usize {
        self.copied.load(Ordering::Relaxed)
    }

    /// Continuations run so far.
    pub fn continuations(&self) -> usize {
        self.continuations.load(Ordering::Relaxed)
    }

    pub(crate) fn count_continuation(&self) {
        self.continuations.fetch_add(1, Ordering::Relaxed);
    }

    /// The `copy` protocol, on behalf of `ctx`.
    pub fn copy(&self, value: &Value, ctx: &dyn CopyContext) -> Result<Value> {
        let Value::Obj(original) = value else {
            return Ok(value.clone());
        };

        if let Some(slot) = self.cache.slot(original) {
            return self.await_clone(original, &slot);
        }

        let strategy = self.registry.strategy_for(original)?;
        if strategy.is_trivial() {
            return strategy.copy(original, ctx);
        }

        let (slot, created) = self.cache.get_or_create_slot(original);
        if !created {
            return self.await_clone(original, &slot);
        }

        self.copied.fetch_add(1, Ordering::Relaxed);
        let _guard = AbandonOnUnwind {
            slot: &slot,
            type_name: original.class().name(),
        };
        let outcome = strategy
            .copy(original, ctx)
            .and_then(|copied| Self::verify(original, &slot, copied));
        if let Err(err) = &outcome {
            slot.abandon(err.clone());
        }
        outcome
    }

    /// The `register` protocol.
    pub fn register(&self, original: &Obj, clone: &Obj) -> Result<()> {
        if original.ptr_eq(clone) {
            return Err(CloneError::mismatch(
                original.class().name(),
                "registered the original itself as its clone",
            ));
        }
        self.cache.register(original, clone)
    }

    fn await_clone(&self, original: &Obj, slot: &Arc<CloneSlot>) -> Result<Value> {
        match self.cache.await_slot(slot) {
            SlotOutcome::Registered(clone) => Ok(Value::Obj(clone)),
            SlotOutcome::Failed(err) => Err(err),
            SlotOutcome::WouldDeadlock => Err(CloneError::mismatch(
                original.class().name(),
                "the object was reached again before its clone was registered",
            )),
        }
    }

    fn verify(original: &Obj, slot: &CloneSlot, copied: Value) -> Result<Value> {
        let Some(registered) = slot.get() else {
            return Err(CloneError::mismatch(
                original.class().name(),
                "copier returned without registering a clone",
            ));
        };
        match &copied {
            Value::Obj(clone) if clone.ptr_eq(&registered) => Ok(copied),
            _ => Err(CloneError::mismatch(
                original.class().name(),
                format!(
                    "copier returned {} but registered {:?}",
                    copied.type_name(),
                    registered
                ),
            )),
        }
    }
}

/// Fails a reserved slot when its strategy unwinds, so threads parked on it wake up.
struct AbandonOnUnwind<'s> {
    slot: &'s CloneSlot,
    type_name: &'s str,
}

impl Drop for AbandonOnUnwind<'_> {
    fn drop(&mut self) {
        if thread::panicking() {
            self.slot.abandon(CloneError::copier(
                self.type_name,
                "copier panicked before completing",
            ));
        }
    }
}
