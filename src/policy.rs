//! Copy policies: deciding, per object, type or member, what a copy should do.
//!
//! A policy answers one question with a [`CopyAction`]. Policies are composed by
//! [`CompoundPolicy`], which asks each policy in order and keeps the first answer that is not
//! [`CopyAction::Default`]. The engine builds one compound policy per granularity:
//!
//! 1. the caller's custom policy, if any,
//! 2. exact overrides keyed by identity ([`ExactPolicy`]),
//! 3. predicate overrides ([`PredicatePolicy`]),
//! 4. actions declared on the class or member itself ([`DeclaredTypePolicy`],
//!    [`DeclaredMemberPolicy`]),
//! 5. the structural default ([`DefaultTypePolicy`]): enums and immutable classes are shared.
//!
//! Type and member policies are consulted once per class when its strategy is resolved, so they
//! may be arbitrarily expensive. The object policy is consulted on every copied object and is
//! therefore opt-in.

use std::collections::HashMap;
use std::collections::hash_map::Entry;
use std::fmt;
use std::hash::Hash;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::{CloneError, Result};
use crate::identity::IdentityKey;
use crate::model::{ClassId, ClassRef, MemberDesc, MemberKey, Obj, TypeKind};

/// What to do with an object, a type or a member.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CopyAction {
    /// Apply the normal copy logic.
    #[default]
    Default,
    /// Keep the original reference.
    Original,
    /// Replace with the neutral value (`Null`, or zero for primitive members).
    Null,
    /// Leave the member untouched on the clone. Member granularity only.
    Skip,
}

impl CopyAction {
    /// `true` for [`CopyAction::Default`].
    pub fn is_default(self) -> bool {
        self == Self::Default
    }
}

/// A decision function over items of type `I` (objects, classes or members).
pub trait CopyPolicy<I: ?Sized>: Send + Sync {
    /// Action for `item`; [`CopyAction::Default`] when the policy has no opinion.
    fn action(&self, item: &I) -> CopyAction;
}

impl<I: ?Sized, F> CopyPolicy<I> for F
where
    F: Fn(&I) -> CopyAction + Send + Sync,
{
    fn action(&self, item: &I) -> CopyAction {
        self(item)
    }
}

/// Shared, type-erased policy.
pub type SharedPolicy<I> = Arc<dyn CopyPolicy<I>>;

/// Shared predicate over items of type `I`.
pub type Predicate<I> = Arc<dyn Fn(&I) -> bool + Send + Sync>;

/// Maps an item to the key [`ExactPolicy`] stores it under.
pub trait PolicyKey {
    /// Key type.
    type Key: Eq + Hash + Send + Sync;

    /// Key for this item.
    fn policy_key(&self) -> Self::Key;
}

impl PolicyKey for Obj {
    type Key = IdentityKey;

    fn policy_key(&self) -> IdentityKey {
        IdentityKey::new(self)
    }
}

impl PolicyKey for ClassRef {
    type Key = ClassId;

    fn policy_key(&self) -> ClassId {
        self.id()
    }
}

impl PolicyKey for MemberDesc {
    type Key = MemberKey;

    fn policy_key(&self) -> MemberKey {
        self.key()
    }
}

// --- Exact overrides ---

/// Actions for specific items, keyed by identity.
pub struct ExactPolicy<I: PolicyKey> {
    actions: HashMap<I::Key, CopyAction>,
}

impl<I: PolicyKey> Default for ExactPolicy<I> {
    fn default() -> Self {
        Self {
            actions: HashMap::new(),
        }
    }
}

impl<I: PolicyKey> ExactPolicy<I> {
    /// Records `action` for `item`. A second action for the same item is a configuration error;
    /// [`CopyAction::Default`] is accepted and ignored.
    pub fn insert(
        &mut self,
        item: &I,
        action: CopyAction,
        describe: impl fmt::Display,
    ) -> Result<()> {
        if action.is_default() {
            return Ok(());
        }
        match self.actions.entry(item.policy_key()) {
            Entry::Occupied(existing) => Err(CloneError::config(format!(
                "Conflicting copy actions for {describe}: {:?} is already registered, \
                 cannot add {action:?}",
                existing.get()
            ))),
            Entry::Vacant(slot) => {
                slot.insert(action);
                Ok(())
            }
        }
    }

    /// `true` when an action is recorded for `item`.
    pub fn contains(&self, item: &I) -> bool {
        self.actions.contains_key(&item.policy_key())
    }

    /// Number of recorded actions.
    pub fn len(&self) -> usize {
        self.actions.len()
    }

    /// `true` when nothing is recorded.
    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }
}

impl<I: PolicyKey> CopyPolicy<I> for ExactPolicy<I> {
    fn action(&self, item: &I) -> CopyAction {
        self.actions.get(&item.policy_key()).copied().unwrap_or_default()
    }
}

// --- Predicate overrides ---

/// Actions for items matching a predicate; the first matching rule wins.
pub struct PredicatePolicy<I: ?Sized> {
    rules: Vec<(Predicate<I>, CopyAction)>,
}

impl<I: ?Sized> Default for PredicatePolicy<I> {
    fn default() -> Self {
        Self { rules: Vec::new() }
    }
}

impl<I: ?Sized> PredicatePolicy<I> {
    /// Appends a rule.
    pub fn push(&mut self, predicate: Predicate<I>, action: CopyAction) {
        if !action.is_default() {
            self.rules.push((predicate, action));
        }
    }

    /// Number of rules.
    pub fn len(&self) -> usize {
        self.rules.len()
    }

    /// `true` when there is no rule.
    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}

impl<I: ?Sized> CopyPolicy<I> for PredicatePolicy<I> {
    fn action(&self, item: &I) -> CopyAction {
        self.rules
            .iter()
            .find(|(predicate, _)| predicate(item))
            .map(|(_, action)| *action)
            .unwrap_or_default()
    }
}

// --- Built-in policies ---

/// Always answers the same action.
#[derive(Debug, Clone, Copy, Default)]
pub struct FixedPolicy(pub CopyAction);

impl<I: ?Sized> CopyPolicy<I> for FixedPolicy {
    fn action(&self, _item: &I) -> CopyAction {
        self.0
    }
}

/// Action declared on the class, inherited from the nearest ancestor that declares one.
#[derive(Debug, Clone, Copy, Default)]
pub struct DeclaredTypePolicy;

impl CopyPolicy<ClassRef> for DeclaredTypePolicy {
    fn action(&self, class: &ClassRef) -> CopyAction {
        let mut current = Some(class);
        while let Some(c) = current {
            if let Some(action) = c.declared_action() {
                return action;
            }
            current = c.parent();
        }
        CopyAction::Default
    }
}

/// Action declared on the member itself.
#[derive(Debug, Clone, Copy, Default)]
pub struct DeclaredMemberPolicy;

impl CopyPolicy<MemberDesc> for DeclaredMemberPolicy {
    fn action(&self, member: &MemberDesc) -> CopyAction {
        member.declared_action().unwrap_or_default()
    }
}

/// Enums and immutable classes are shared rather than copied.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultTypePolicy;

impl CopyPolicy<ClassRef> for DefaultTypePolicy {
    fn action(&self, class: &ClassRef) -> CopyAction {
        if *class.kind() == TypeKind::Enum || class.is_immutable() {
            CopyAction::Original
        } else {
            CopyAction::Default
        }
    }
}

// --- Composition ---

/// Ordered list of policies; the first non-default answer wins.
pub struct CompoundPolicy<I: ?Sized> {
    policies: Vec<SharedPolicy<I>>,
}

impl<I: ?Sized + 'static> CompoundPolicy<I> {
    /// Composes `policies`. An empty list always answers [`CopyAction::Default`]; a single
    /// policy is returned as is.
    pub fn of(policies: Vec<SharedPolicy<I>>) -> SharedPolicy<I> {
        let mut policies = policies;
        match policies.len() {
            0 => Arc::new(FixedPolicy(CopyAction::Default)),
            1 => policies.remove(0),
            _ => Arc::new(Self { policies }),
        }
    }
}

impl<I: ?Sized> CopyPolicy<I> for CompoundPolicy<I> {
    fn action(&self, item: &I) -> CopyAction {
        self.policies
            .iter()
            .map(|p| p.action(item))
            .find(|a| !a.is_default())
            .unwrap_or_default()
    }
}
