//! Per-class strategy resolution.
//!
//! The [`CopierRegistry`] maps every runtime class to a [`Strategy`] the first time an instance
//! of it is copied, and keeps the answer for the lifetime of the [`Cloner`](crate::Cloner).
//! It depends only on static configuration (policies, custom copiers, instantiation), never on
//! invocation data, so one registry is shared by every invocation and every worker thread.
//!
//! ## Resolution order
//!
//! 1. The type policy: `Original` and `Null` resolve to the trivial strategies.
//! 2. Enums are always shared.
//! 3. Arrays: immutable elements are copied shallowly, others element by element.
//! 4. A custom copier registered for exactly this class.
//! 5. A copier the class supplies for itself.
//! 6. Lists, sets and maps are rebuilt.
//! 7. Records fall back to the structural copier, chained to the supertype.
//!
//! ## Concurrency
//!
//! Strategies are computed outside of any lock and inserted with an atomic
//! insert-if-absent. Two threads resolving the same class concurrently may both do the work,
//! but only the first result is kept and handed out.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use dashmap::DashMap;
use tracing::trace;

use crate::copier::{Copier, MemberCopier, MemberLayout, Strategy, StructuralCopier};
use crate::error::{CloneError, Result};
use crate::introspect::{InstantiationStrategy, Introspector, allocator_for};
use crate::model::{ClassId, ClassRef, ElementType, MemberDesc, Obj, TypeKind};
use crate::policy::{CopyAction, SharedPolicy};

/// Resolves and memoizes per-class copy strategies.
pub struct CopierRegistry {
    introspector: Arc<dyn Introspector>,
    instantiation: InstantiationStrategy,
    object_policy: Option<SharedPolicy<Obj>>,
    type_policy: SharedPolicy<ClassRef>,
    member_policy: SharedPolicy<MemberDesc>,
    custom: HashMap<ClassId, Arc<dyn Copier>>,
    shallow: HashSet<ClassId>,
    strategies: DashMap<ClassId, Strategy>,
    layouts: DashMap<(ClassId, bool), Option<Arc<MemberLayout>>>,
}

impl std::fmt::Debug for CopierRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CopierRegistry")
            .field("introspector", &self.introspector)
            .field("instantiation", &self.instantiation)
            .field("object_policy", &self.object_policy.is_some())
            .field("custom", &self.custom.len())
            .field("shallow", &self.shallow.len())
            .field("strategies", &self.strategies.len())
            .finish_non_exhaustive()
    }
}

/// Everything a registry is configured with.
pub(crate) struct RegistryParts {
    pub introspector: Arc<dyn Introspector>,
    pub instantiation: InstantiationStrategy,
    pub object_policy: Option<SharedPolicy<Obj>>,
    pub type_policy: SharedPolicy<ClassRef>,
    pub member_policy: SharedPolicy<MemberDesc>,
    pub custom: HashMap<ClassId, Arc<dyn Copier>>,
    pub shallow: HashSet<ClassId>,
}

impl CopierRegistry {
    pub(crate) fn new(parts: RegistryParts) -> Self {
        Self {
            introspector: parts.introspector,
            instantiation: parts.instantiation,
            object_policy: parts.object_policy,
            type_policy: parts.type_policy,
            member_policy: parts.member_policy,
            custom: parts.custom,
            shallow: parts.shallow,
            strategies: DashMap::new(),
            layouts: DashMap::new(),
        }
    }

    /// The introspection capability in use.
    pub fn introspector(&self) -> &Arc<dyn Introspector> {
        &self.introspector
    }

    /// Number of classes resolved so far.
    pub fn resolved_count(&self) -> usize {
        self.strategies.len()
    }

    /// Strategy for one object: the object policy first, then the strategy of its class.
    pub fn strategy_for(&self, original: &Obj) -> Result<Strategy> {
        if let Some(policy) = &self.object_policy {
            match policy.action(original) {
                CopyAction::Default => {}
                CopyAction::Original => return Ok(Strategy::Noop),
                CopyAction::Null => return Ok(Strategy::Null),
                CopyAction::Skip => {
                    return Err(CloneError::config(format!(
                        "Object policy returned SKIP for an instance of '{}'; SKIP is only valid \
                         for members",
                        original.class().name()
                    )));
                }
            }
        }
        self.strategy_for_type(original.class())
    }

    /// Memoized strategy for `class`.
    pub fn strategy_for_type(&self, class: &ClassRef) -> Result<Strategy> {
        if let Some(strategy) = self.strategies.get(&class.id()) {
            return Ok(strategy.value().clone());
        }

        let resolved = self.resolve(class)?;
        trace!(class = %class, strategy = resolved.name(), "resolved copy strategy");
        Ok(self
            .strategies
            .entry(class.id())
            .or_insert(resolved)
            .value()
            .clone())
    }

    fn resolve(&self, class: &ClassRef) -> Result<Strategy> {
        match self.type_policy.action(class) {
            CopyAction::Default => {}
            CopyAction::Original => return Ok(Strategy::Noop),
            CopyAction::Null => return Ok(Strategy::Null),
            CopyAction::Skip => {
                return Err(CloneError::config(format!(
                    "Type policy returned SKIP for '{}'; SKIP is only valid for members",
                    class.name()
                )));
            }
        }

        match class.kind() {
            TypeKind::Enum => return Ok(Strategy::Noop),
            TypeKind::Array(element) => {
                return Ok(if self.is_shared_element(element) {
                    Strategy::Shallow
                } else {
                    Strategy::Array
                });
            }
            _ => {}
        }

        if let Some(copier) = self.custom.get(&class.id()) {
            return Ok(Strategy::Custom(Arc::clone(copier)));
        }
        if let Some(copier) = class.self_copier() {
            return Ok(Strategy::Custom(Arc::clone(copier)));
        }

        match class.kind() {
            TypeKind::List | TypeKind::Set | TypeKind::Map => Ok(Strategy::Collection),
            TypeKind::Opaque => Err(CloneError::config(format!(
                "Type '{}' exposes no state to introspection. Register a custom copier for it",
                class.name()
            ))),
            _ => {
                let shallow = self.shallow.contains(&class.id());
                let layout = self.layout(class, shallow)?;
                let allocator = allocator_for(class, self.instantiation)?;
                Ok(Strategy::Structural(Arc::new(StructuralCopier::new(
                    class.clone(),
                    allocator,
                    layout,
                    Arc::clone(&self.introspector),
                ))))
            }
        }
    }

    /// Elements that are shared by identity make a shallow array copy sufficient.
    fn is_shared_element(&self, element: &ElementType) -> bool {
        match element {
            ElementType::Bool
            | ElementType::Int
            | ElementType::Float
            | ElementType::Char
            | ElementType::Str => true,
            ElementType::Class(class) => {
                *class.kind() == TypeKind::Enum
                    || (class.is_sealed() && self.type_policy.action(class) == CopyAction::Original)
            }
            ElementType::Any => false,
        }
    }

    /// Member layout of `class`, chained to its ancestors' layouts.
    fn layout(&self, class: &ClassRef, shallow: bool) -> Result<Option<Arc<MemberLayout>>> {
        if let Some(layout) = self.layouts.get(&(class.id(), shallow)) {
            return Ok(layout.value().clone());
        }

        let parent = match class.parent() {
            Some(parent) => self.layout(parent, shallow)?,
            None => None,
        };

        let members = self
            .introspector
            .members_of(class)?
            .into_iter()
            .filter(|member| !member.is_static())
            .filter_map(|member| {
                let mut action = self.member_policy.action(&member);
                if shallow && action.is_default() {
                    action = CopyAction::Original;
                }
                (action != CopyAction::Skip).then(|| MemberCopier::new(member, action))
            })
            .collect();

        let layout = MemberLayout::chain(class, parent, members);
        Ok(self
            .layouts
            .entry((class.id(), shallow))
            .or_insert(layout)
            .value()
            .clone())
    }
}
