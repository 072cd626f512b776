//! The structural copier: the fallback strategy for record classes.
//!
//! A structural copy allocates an empty instance of the original's class, registers it, and
//! then fills it member by member. The per-class member list is a [`MemberLayout`]: only the
//! class's own declared instance members, each paired with its resolved [`CopyAction`], chained
//! to the layout of the supertype. Filling runs the parent layout first, so inherited state is
//! copied before the subclass's own members, mirroring construction order.
//!
//! Ancestors that contribute no members (none declared, or all skipped) are collapsed out of
//! the chain when the layout is built.

use std::sync::Arc;

use crate::context::CopyContext;
use crate::error::Result;
use crate::introspect::{Allocator, Introspector};
use crate::model::{ClassRef, MemberDesc, Obj};
use crate::policy::CopyAction;

use super::TwoPhaseCopier;

/// One member and what to do with it.
#[derive(Debug, Clone)]
pub struct MemberCopier {
    member: Arc<MemberDesc>,
    action: CopyAction,
}

impl MemberCopier {
    /// Pairs `member` with `action`. `action` must not be [`CopyAction::Skip`]; skipped
    /// members are left out of layouts entirely.
    pub fn new(member: Arc<MemberDesc>, action: CopyAction) -> Self {
        Self { member, action }
    }

    /// The member.
    pub fn member(&self) -> &MemberDesc {
        &self.member
    }

    /// Resolved action.
    pub fn action(&self) -> CopyAction {
        self.action
    }

    fn fill(
        &self,
        original: &Obj,
        clone: &Obj,
        introspector: &dyn Introspector,
        ctx: &dyn CopyContext,
    ) -> Result<()> {
        let member = &*self.member;
        match self.action {
            CopyAction::Skip => Ok(()),
            CopyAction::Null => introspector.set(member, clone, member.field_type().zero()),
            CopyAction::Original => {
                let value = introspector.get(member, original)?;
                introspector.set(member, clone, value)
            }
            CopyAction::Default => {
                let value = introspector.get(member, original)?;
                let copied = ctx.copy(&value)?;
                introspector.set(member, clone, copied)
            }
        }
    }
}

/// Member copiers of one class level, chained to the nearest ancestor level.
#[derive(Debug)]
pub struct MemberLayout {
    class_name: Arc<str>,
    parent: Option<Arc<MemberLayout>>,
    members: Vec<MemberCopier>,
}

impl MemberLayout {
    /// Builds a level. Returns `parent` itself when `members` is empty.
    pub fn chain(
        class: &ClassRef,
        parent: Option<Arc<MemberLayout>>,
        members: Vec<MemberCopier>,
    ) -> Option<Arc<MemberLayout>> {
        if members.is_empty() {
            return parent;
        }
        Some(Arc::new(Self {
            class_name: Arc::from(class.name()),
            parent,
            members,
        }))
    }

    /// Class declaring this level's members.
    pub fn class_name(&self) -> &str {
        &self.class_name
    }

    /// Next ancestor level.
    pub fn parent(&self) -> Option<&Arc<MemberLayout>> {
        self.parent.as_ref()
    }

    /// This level's members, in declaration order.
    pub fn members(&self) -> &[MemberCopier] {
        &self.members
    }

    /// Number of levels in the chain, this one included.
    pub fn depth(&self) -> usize {
        1 + self.parent.as_ref().map_or(0, |p| p.depth())
    }

    /// Fills `clone` from `original`, ancestors first.
    pub fn fill(
        &self,
        original: &Obj,
        clone: &Obj,
        introspector: &dyn Introspector,
        ctx: &dyn CopyContext,
    ) -> Result<()> {
        if let Some(parent) = &self.parent {
            parent.fill(original, clone, introspector, ctx)?;
        }
        for member in &self.members {
            member.fill(original, clone, introspector, ctx)?;
        }
        Ok(())
    }
}

/// Two-phase structural copy of one record class.
#[derive(Debug)]
pub struct StructuralCopier {
    class: ClassRef,
    allocator: Allocator,
    layout: Option<Arc<MemberLayout>>,
    introspector: Arc<dyn Introspector>,
}

impl StructuralCopier {
    /// Creates the copier for `class`.
    pub fn new(
        class: ClassRef,
        allocator: Allocator,
        layout: Option<Arc<MemberLayout>>,
        introspector: Arc<dyn Introspector>,
    ) -> Self {
        Self {
            class,
            allocator,
            layout,
            introspector,
        }
    }

    /// The class this copier handles.
    pub fn class(&self) -> &ClassRef {
        &self.class
    }

    /// Member layout, `None` when no member needs copying.
    pub fn layout(&self) -> Option<&Arc<MemberLayout>> {
        self.layout.as_ref()
    }
}

impl TwoPhaseCopier for StructuralCopier {
    fn allocate(&self, _original: &Obj) -> Result<Obj> {
        self.allocator.allocate(&self.class, &*self.introspector)
    }

    fn deep_copy(&self, original: &Obj, clone: &Obj, ctx: &dyn CopyContext) -> Result<()> {
        match &self.layout {
            Some(layout) => layout.fill(original, clone, &*self.introspector, ctx),
            None => Ok(()),
        }
    }
}
