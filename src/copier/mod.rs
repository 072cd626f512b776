//! Copying strategies.
//!
//! A [`Copier`] turns one original object into its clone. Copiers that take part in cycles
//! follow the two-phase protocol captured by [`TwoPhaseCopier`]: allocate an empty clone,
//! register it with the context, and fill it in later through a continuation. The registry
//! resolves every runtime class to one [`Strategy`], a tagged variant over the built-in
//! copiers plus caller supplied ones.

use std::fmt::Debug;
use std::sync::Arc;

use crate::context::CopyContext;
use crate::error::Result;
use crate::model::{Obj, Value};

pub mod builtin;
pub mod structural;

pub use builtin::{ArrayCopier, CollectionCopier, ShallowCopier};
pub use structural::{MemberCopier, MemberLayout, StructuralCopier};

/// Copy logic for one class.
///
/// An implementation must call [`CopyContext::register`] with the clone it is about to
/// return, exactly once, and before copying any child that may refer back to `original`.
pub trait Copier: Send + Sync + Debug {
    /// Produces the clone of `original`.
    fn copy(&self, original: &Obj, ctx: &dyn CopyContext) -> Result<Value>;
}

/// Copier split into allocation and deferred filling.
///
/// Wrap an implementation in [`TwoPhase`] to register it as a [`Copier`].
pub trait TwoPhaseCopier: Send + Sync {
    /// Creates the empty clone of `original`.
    fn allocate(&self, original: &Obj) -> Result<Obj>;

    /// Fills `clone` from `original`. Runs after `clone` is registered.
    fn deep_copy(&self, original: &Obj, clone: &Obj, ctx: &dyn CopyContext) -> Result<()>;
}

impl<T: TwoPhaseCopier + ?Sized> TwoPhaseCopier for Arc<T> {
    fn allocate(&self, original: &Obj) -> Result<Obj> {
        (**self).allocate(original)
    }

    fn deep_copy(&self, original: &Obj, clone: &Obj, ctx: &dyn CopyContext) -> Result<()> {
        (**self).deep_copy(original, clone, ctx)
    }
}

/// Runs the two-phase protocol: allocate, register, then schedule the fill.
pub fn copy_in_two_phases<T>(copier: &T, original: &Obj, ctx: &dyn CopyContext) -> Result<Value>
where
    T: TwoPhaseCopier + Clone + 'static,
{
    let clone = copier.allocate(original)?;
    ctx.register(original, &clone)?;

    let (copier, original, target) = (copier.clone(), original.clone(), clone.clone());
    ctx.schedule(Box::new(move |ctx: &dyn CopyContext| {
        copier.deep_copy(&original, &target, ctx)
    }))?;
    Ok(Value::Obj(clone))
}

/// Adapts a [`TwoPhaseCopier`] into a [`Copier`].
#[derive(Debug)]
pub struct TwoPhase<T>(pub Arc<T>);

impl<T> TwoPhase<T> {
    /// Wraps `copier`.
    pub fn new(copier: T) -> Self {
        Self(Arc::new(copier))
    }
}

impl<T> Copier for TwoPhase<T>
where
    T: TwoPhaseCopier + Debug + 'static,
{
    fn copy(&self, original: &Obj, ctx: &dyn CopyContext) -> Result<Value> {
        copy_in_two_phases(&self.0, original, ctx)
    }
}

/// The resolved copy behavior of one runtime class.
///
/// Cheap to clone; the registry hands out copies of its cached entries.
#[derive(Clone, Debug)]
pub enum Strategy {
    /// Keep the original reference.
    Noop,
    /// Replace with `Null`.
    Null,
    /// New object with the original's state copied verbatim.
    Shallow,
    /// Element-wise copy of an array.
    Array,
    /// Rebuild of a list, set or map.
    Collection,
    /// Caller registered or self-described copier.
    Custom(Arc<dyn Copier>),
    /// Member-wise structural copy.
    Structural(Arc<StructuralCopier>),
}

impl Strategy {
    /// Trivial strategies are cheaper to repeat than to look up, so they bypass the
    /// identity cache.
    pub fn is_trivial(&self) -> bool {
        matches!(self, Self::Noop | Self::Null)
    }

    /// Short name for logs.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Noop => "noop",
            Self::Null => "null",
            Self::Shallow => "shallow",
            Self::Array => "array",
            Self::Collection => "collection",
            Self::Custom(_) => "custom",
            Self::Structural(_) => "structural",
        }
    }

    /// Applies the strategy to `original`.
    pub fn copy(&self, original: &Obj, ctx: &dyn CopyContext) -> Result<Value> {
        match self {
            Self::Noop => Ok(Value::Obj(original.clone())),
            Self::Null => Ok(Value::Null),
            Self::Shallow => ShallowCopier.copy(original, ctx),
            Self::Array => copy_in_two_phases(&ArrayCopier, original, ctx),
            Self::Collection => copy_in_two_phases(&CollectionCopier, original, ctx),
            Self::Custom(copier) => copier.copy(original, ctx),
            Self::Structural(copier) => copy_in_two_phases(copier, original, ctx),
        }
    }
}
