//! Identity-keyed clone tracking for one invocation.
//!
//! Every original that goes through a non-trivial strategy gets exactly one [`CloneSlot`] in
//! the [`IdentityCache`]. The slot is reserved before the clone exists, filled as soon as the
//! strategy registers its clone, and only then are children copied. A cyclic reference that
//! reaches the original again finds the filled slot and resolves to the same clone.
//!
//! ## Concurrency
//!
//! The cache is a sharded [`DashMap`], so reserving a slot is an atomic get-or-insert scoped to
//! one shard, never a global lock. Each slot carries its own engine-private mutex and condvar:
//! a thread that discovers an original whose clone is still being allocated by another thread
//! parks on that slot until the owner registers (or fails). The original object itself is never
//! used as a lock.
//!
//! Built-in strategies register before touching any child, so an owner never waits while
//! holding an unregistered slot. Custom copiers may not; the cache keeps a waits-for map and
//! refuses a wait that would close a cycle between threads.

use std::hash::{BuildHasherDefault, Hash, Hasher};
use std::sync::{Arc, Condvar, Mutex, MutexGuard};
use std::thread::{self, ThreadId};

use dashmap::DashMap;
use twox_hash::XxHash64;

use crate::error::{CloneError, Result};
use crate::model::Obj;

/// Fast hasher for identity keys (the key is a pointer, no DoS surface).
pub type IdentityHasher = BuildHasherDefault<XxHash64>;

/// Wraps an [`Obj`] so that hashing and equality use reference identity.
#[derive(Clone, Debug)]
pub struct IdentityKey(Obj);

impl IdentityKey {
    /// Key for `obj`.
    pub fn new(obj: &Obj) -> Self {
        Self(obj.clone())
    }

    /// The wrapped object.
    pub fn obj(&self) -> &Obj {
        &self.0
    }
}

impl PartialEq for IdentityKey {
    fn eq(&self, other: &Self) -> bool {
        self.0.ptr_eq(&other.0)
    }
}

impl Eq for IdentityKey {}

impl Hash for IdentityKey {
    fn hash<H: Hasher>(&self, state: &mut H) {
        state.write_usize(self.0.addr());
    }
}

#[derive(Debug)]
enum SlotState {
    Reserved(ThreadId),
    Registered(Obj),
    Failed(CloneError),
}

/// What a thread finds when it waits on a slot it did not reserve.
#[derive(Debug)]
pub enum SlotOutcome {
    /// The clone is available.
    Registered(Obj),
    /// Waiting would never end: the slot is reserved by the calling thread itself, or by a
    /// thread that is (transitively) waiting on the caller.
    ///
    /// Happens when a copier asks for a child that refers back to the original before
    /// registering its clone.
    WouldDeadlock,
    /// The owner failed.
    Failed(CloneError),
}

/// Placeholder for the clone of one original.
#[derive(Debug)]
pub struct CloneSlot {
    state: Mutex<SlotState>,
    ready: Condvar,
}

impl CloneSlot {
    fn reserved() -> Self {
        Self {
            state: Mutex::new(SlotState::Reserved(thread::current().id())),
            ready: Condvar::new(),
        }
    }

    fn registered(clone: Obj) -> Self {
        Self {
            state: Mutex::new(SlotState::Registered(clone)),
            ready: Condvar::new(),
        }
    }

    fn lock(&self) -> MutexGuard<'_, SlotState> {
        self.state.lock().unwrap_or_else(|p| p.into_inner())
    }

    /// Publishes the clone. Fails if a clone is already registered.
    pub fn fill(&self, clone: &Obj) -> std::result::Result<(), Obj> {
        let mut state = self.lock();
        if let SlotState::Registered(existing) = &*state {
            return Err(existing.clone());
        }
        *state = SlotState::Registered(clone.clone());
        drop(state);
        self.ready.notify_all();
        Ok(())
    }

    /// Marks the slot as failed and wakes every waiter. A registered clone is kept; waiters
    /// that already saw it are unaffected and the invocation fails anyway.
    pub fn abandon(&self, err: CloneError) {
        let mut state = self.lock();
        if matches!(&*state, SlotState::Reserved(_)) {
            *state = SlotState::Failed(err);
        }
        drop(state);
        self.ready.notify_all();
    }

    /// Registered clone, if any, without blocking.
    pub fn get(&self) -> Option<Obj> {
        match &*self.lock() {
            SlotState::Registered(clone) => Some(clone.clone()),
            _ => None,
        }
    }

    /// Thread that reserved the slot, while it is still unregistered.
    pub fn owner(&self) -> Option<ThreadId> {
        match &*self.lock() {
            SlotState::Reserved(owner) => Some(*owner),
            _ => None,
        }
    }

    fn wait(&self, me: ThreadId) -> SlotOutcome {
        let mut state = self.lock();
        loop {
            match &*state {
                SlotState::Registered(clone) => return SlotOutcome::Registered(clone.clone()),
                SlotState::Failed(err) => return SlotOutcome::Failed(err.clone()),
                SlotState::Reserved(owner) if *owner == me => return SlotOutcome::WouldDeadlock,
                SlotState::Reserved(_) => {
                    state = self.ready.wait(state).unwrap_or_else(|p| p.into_inner());
                }
            }
        }
    }
}

/// Per-invocation map from original identity to clone slot.
#[derive(Debug, Default)]
pub struct IdentityCache {
    slots: DashMap<IdentityKey, Arc<CloneSlot>, IdentityHasher>,
    waits: DashMap<ThreadId, Arc<CloneSlot>>,
}

impl IdentityCache {
    /// Empty cache.
    pub fn new() -> Self {
        Self::default()
    }

    /// Cache pre-filled with `(original, clone)` pairs.
    pub fn seeded<'a>(pairs: impl IntoIterator<Item = (&'a Obj, &'a Obj)>) -> Self {
        let cache = Self::new();
        for (original, clone) in pairs {
            cache
                .slots
                .insert(IdentityKey::new(original), Arc::new(CloneSlot::registered(clone.clone())));
        }
        cache
    }

    /// Returns the slot for `original`, reserving it for the calling thread if it did not
    /// exist. The flag is `true` when the slot was created by this call.
    pub fn get_or_create_slot(&self, original: &Obj) -> (Arc<CloneSlot>, bool) {
        let mut created = false;
        let slot = self
            .slots
            .entry(IdentityKey::new(original))
            .or_insert_with(|| {
                created = true;
                Arc::new(CloneSlot::reserved())
            })
            .value()
            .clone();
        (slot, created)
    }

    /// Slot for `original`, if one exists.
    pub fn slot(&self, original: &Obj) -> Option<Arc<CloneSlot>> {
        self.slots.get(&IdentityKey::new(original)).map(|s| Arc::clone(s.value()))
    }

    /// Blocks until `slot` is registered or failed by its owner.
    ///
    /// Before parking, the calling thread records what it waits on and follows the chain of
    /// owners; if the chain leads back to the caller the wait is refused. The last thread to
    /// join a cycle always sees the complete chain.
    pub fn await_slot(&self, slot: &Arc<CloneSlot>) -> SlotOutcome {
        let me = thread::current().id();
        match slot.owner() {
            None => return slot.wait(me),
            Some(owner) if owner == me => return SlotOutcome::WouldDeadlock,
            Some(_) => {}
        }

        self.waits.insert(me, Arc::clone(slot));
        let mut next = slot.owner();
        let mut hops = 0;
        while let Some(owner) = next {
            if owner == me {
                self.waits.remove(&me);
                return SlotOutcome::WouldDeadlock;
            }
            hops += 1;
            if hops > self.waits.len() {
                break;
            }
            next = self
                .waits
                .get(&owner)
                .map(|s| Arc::clone(s.value()))
                .and_then(|s| s.owner());
        }

        let outcome = slot.wait(me);
        self.waits.remove(&me);
        outcome
    }

    /// Registered clone of `original`, if any.
    pub fn get(&self, original: &Obj) -> Option<Obj> {
        self.slot(original).and_then(|s| s.get())
    }

    /// Registers `clone` for `original`.
    pub fn register(&self, original: &Obj, clone: &Obj) -> Result<()> {
        let slot = self.slot(original).ok_or_else(|| {
            CloneError::mismatch(
                original.class().name(),
                "register called for an original that is not being copied",
            )
        })?;
        slot.fill(clone).map_err(|_| {
            CloneError::mismatch(original.class().name(), "original registered twice")
        })
    }

    /// Number of slots.
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    /// `true` when no slot exists.
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }
}
