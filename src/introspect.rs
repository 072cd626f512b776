//! Introspection and instantiation capabilities the engine consumes.
//!
//! The engine never reads or writes object state on its own. Everything goes through an
//! [`Introspector`]: enumerating a class's declared members, reading and writing a member on an
//! instance, and producing an empty instance of a class. [`ModelIntrospector`] implements the
//! capability for the crate's own object model.
//!
//! How an empty instance is produced is a separate decision, made once per class by
//! [`allocator_for`] from the configured [`InstantiationStrategy`].

use std::fmt::Debug;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::{CloneError, Result};
use crate::model::well_known;
use crate::model::{ClassRef, Constructor, MemberDesc, Obj, Storage, TypeKind, Value};

/// The type-introspection capability.
pub trait Introspector: Send + Sync + Debug {
    /// Members declared by `class` itself (not its ancestors), in declaration order.
    fn members_of(&self, class: &ClassRef) -> Result<Vec<Arc<MemberDesc>>>;

    /// Reads `member` on `instance`.
    fn get(&self, member: &MemberDesc, instance: &Obj) -> Result<Value>;

    /// Writes `value` into `member` on `instance`.
    fn set(&self, member: &MemberDesc, instance: &Obj, value: Value) -> Result<()>;

    /// Creates a zero-filled instance of `class` without running any constructor.
    fn allocate_empty(&self, class: &ClassRef) -> Result<Obj>;

    /// Objects that must always be copied by reference.
    fn singletons(&self) -> Vec<Obj> {
        Vec::new()
    }
}

/// [`Introspector`] for the crate's dynamic object model.
#[derive(Debug, Default, Clone, Copy)]
pub struct ModelIntrospector;

impl ModelIntrospector {
    fn slot(member: &MemberDesc, instance: &Obj) -> Result<usize> {
        let slot = match member.storage() {
            Storage::Instance(slot) => slot,
            Storage::Static => {
                return Err(CloneError::member(
                    instance.class().name(),
                    member.name(),
                    "static members have no per-instance value",
                ));
            }
        };
        if !instance.class().is_subclass_of(member.declaring()) {
            return Err(CloneError::member(
                instance.class().name(),
                member.name(),
                format!("member is declared by unrelated class '{}'", member.declaring_name()),
            ));
        }
        Ok(slot)
    }
}

impl Introspector for ModelIntrospector {
    fn members_of(&self, class: &ClassRef) -> Result<Vec<Arc<MemberDesc>>> {
        match class.kind() {
            TypeKind::Record => Ok(class.declared_members().to_vec()),
            _ => Ok(Vec::new()),
        }
    }

    fn get(&self, member: &MemberDesc, instance: &Obj) -> Result<Value> {
        let slot = Self::slot(member, instance)?;
        instance.slot(slot).ok_or_else(|| {
            CloneError::member(instance.class().name(), member.name(), "slot out of range")
        })
    }

    fn set(&self, member: &MemberDesc, instance: &Obj, value: Value) -> Result<()> {
        let slot = Self::slot(member, instance)?;
        if !member.field_type().accepts(&value) {
            return Err(CloneError::member(
                instance.class().name(),
                member.name(),
                format!(
                    "{:?} member cannot hold a {} value",
                    member.field_type(),
                    value.type_name()
                ),
            ));
        }
        if instance.set_slot(slot, value) {
            Ok(())
        } else {
            Err(CloneError::member(instance.class().name(), member.name(), "slot out of range"))
        }
    }

    fn allocate_empty(&self, class: &ClassRef) -> Result<Obj> {
        Obj::zeroed(class)
    }

    fn singletons(&self) -> Vec<Obj> {
        vec![well_known::empty_list(), well_known::empty_map()]
    }
}

/// How structural copies obtain their empty instance.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InstantiationStrategy {
    /// Run the class's no-argument constructor on a zero-filled instance.
    Constructor,
    /// Zero-filled instance, no constructor.
    #[default]
    Bypass,
    /// Constructor when the class has one and it succeeds, bypass otherwise.
    ConstructorThenBypass,
}

/// Per-class allocation recipe, resolved once when a structural strategy is built.
#[derive(Clone)]
pub enum Allocator {
    /// Zero-fill, then run the constructor.
    Construct(Constructor),
    /// Zero-fill only.
    Bypass,
    /// Zero-fill and try the constructor; on failure start over from a fresh zeroed instance.
    ConstructOrBypass(Constructor),
}

impl Debug for Allocator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Construct(_) => f.write_str("Construct"),
            Self::Bypass => f.write_str("Bypass"),
            Self::ConstructOrBypass(_) => f.write_str("ConstructOrBypass"),
        }
    }
}

impl Allocator {
    /// Produces an empty instance of `class`.
    pub fn allocate(&self, class: &ClassRef, introspector: &dyn Introspector) -> Result<Obj> {
        let instance = introspector.allocate_empty(class)?;
        match self {
            Self::Bypass => Ok(instance),
            Self::Construct(init) => {
                init(&instance)?;
                Ok(instance)
            }
            Self::ConstructOrBypass(init) => match init(&instance) {
                Ok(()) => Ok(instance),
                Err(_) => introspector.allocate_empty(class),
            },
        }
    }
}

/// Resolves the allocation recipe for `class` under `strategy`.
pub fn allocator_for(class: &ClassRef, strategy: InstantiationStrategy) -> Result<Allocator> {
    if matches!(class.kind(), TypeKind::Opaque | TypeKind::Enum) {
        return Err(CloneError::config(format!(
            "Type '{}' cannot be instantiated: its state is not visible to introspection. \
             Register a custom copier for it",
            class.name()
        )));
    }
    match (strategy, class.constructor()) {
        (InstantiationStrategy::Bypass, _) => Ok(Allocator::Bypass),
        (InstantiationStrategy::Constructor, Some(init)) => {
            Ok(Allocator::Construct(Arc::clone(init)))
        }
        (InstantiationStrategy::Constructor, None) => Err(CloneError::config(format!(
            "Type '{}' has no accessible no-argument constructor. Register a custom copier \
             for it or use the 'bypass' instantiation strategy",
            class.name()
        ))),
        (InstantiationStrategy::ConstructorThenBypass, Some(init)) => {
            Ok(Allocator::ConstructOrBypass(Arc::clone(init)))
        }
        (InstantiationStrategy::ConstructorThenBypass, None) => Ok(Allocator::Bypass),
    }
}
