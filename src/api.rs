//! The public entry point: [`Cloner`] and its [`ClonerBuilder`].
//!
//! A cloner is configured once and then reused for any number of invocations. Everything
//! invocation-specific (identity cache, continuation queue, worker state) is created by
//! [`Cloner::deep_clone`] and discarded when it returns; the strategy cache lives in the
//! cloner and is shared by every invocation, including concurrent ones.
//!
//! ```rust
//! use deepgraph::model::{ClassRef, FieldType, Obj, Value, well_known};
//! use deepgraph::{Cloner, CopyAction, TraversalOrder};
//!
//! let node = ClassRef::record("Node")
//!     .field("id", FieldType::Int)
//!     .field("cache", FieldType::Ref)
//!     .field("next", FieldType::Ref)
//!     .build();
//!
//! let cloner = Cloner::builder()
//!     .sequential(TraversalOrder::BreadthFirst)
//!     .member_action(&node, "cache", CopyAction::Null)
//!     .build()?;
//!
//! let a = Obj::zeroed(&node)?;
//! a.set("id", 1)?;
//! a.set("cache", Obj::with_elements(&well_known::list(), vec![]))?;
//! a.set("next", &a)?;
//!
//! let copy = cloner.deep_clone(&Value::from(&a))?;
//! let b = copy.as_obj().cloned().ok_or(deepgraph::CloneError::Internal("no copy".into()))?;
//! assert!(!b.ptr_eq(&a));
//! assert_eq!(b.get("next")?, Value::from(&b));
//! assert!(b.get("cache")?.is_null());
//! # Ok::<(), deepgraph::CloneError>(())
//! ```

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::Arc;

use rayon::ThreadPool;
use tracing::debug;

use crate::config::{ClonerConfig, ExecutionMode, TraversalOrder};
use crate::context::{CopyCore, parallel, recursive, sequential};
use crate::copier::Copier;
use crate::error::{CloneError, Result};
use crate::identity::IdentityKey;
use crate::introspect::{InstantiationStrategy, Introspector, ModelIntrospector};
use crate::model::{ClassId, ClassRef, MemberDesc, Obj, Value};
use crate::policy::{
    CompoundPolicy, CopyAction, CopyPolicy, DeclaredMemberPolicy, DeclaredTypePolicy,
    DefaultTypePolicy, ExactPolicy, PredicatePolicy, SharedPolicy,
};
use crate::registry::{CopierRegistry, RegistryParts};

/// Deep copy engine.
///
/// Cheap to clone; clones share the strategy cache and the worker pool.
#[derive(Clone)]
pub struct Cloner {
    registry: Arc<CopierRegistry>,
    seeds: Arc<[(Obj, Obj)]>,
    mode: ExecutionMode,
    pool: Option<Arc<ThreadPool>>,
}

impl Default for Cloner {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Cloner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Cloner")
            .field("mode", &self.mode)
            .field("seeds", &self.seeds.len())
            .field("dedicated_pool", &self.pool.is_some())
            .field("registry", &self.registry)
            .finish()
    }
}

impl Cloner {
    /// Cloner with the default configuration: sequential depth-first execution, bypass
    /// instantiation, no overrides.
    pub fn new() -> Self {
        Self {
            registry: Arc::new(CopierRegistry::new(RegistryParts {
                introspector: Arc::new(ModelIntrospector),
                instantiation: InstantiationStrategy::default(),
                object_policy: None,
                type_policy: default_type_policy(None, None, None),
                member_policy: default_member_policy(None, None, None),
                custom: HashMap::new(),
                shallow: HashSet::new(),
            })),
            seeds: Arc::from(Vec::new()),
            mode: ExecutionMode::default(),
            pool: None,
        }
    }

    /// Starts a configuration.
    pub fn builder() -> ClonerBuilder {
        ClonerBuilder::default()
    }

    /// Execution mode.
    pub fn mode(&self) -> ExecutionMode {
        self.mode
    }

    /// The strategy registry shared by all invocations.
    pub fn registry(&self) -> &CopierRegistry {
        &self.registry
    }

    /// Deep-copies `value`.
    ///
    /// Scalars and strings are returned as is. For an object, the result is a graph sharing no
    /// mutable state with the original (except where a policy says `Original`), with the
    /// aliasing and cycles of the original reproduced among the clones.
    ///
    /// # Errors
    ///
    /// Any failure aborts the whole invocation; no partial result is returned.
    pub fn deep_clone(&self, value: &Value) -> Result<Value> {
        // 1. Fresh invocation state.
        let core = CopyCore::new(Arc::clone(&self.registry), &self.seeds);

        // 2. Root copy plus every continuation, per execution.
        let copied = match self.mode {
            ExecutionMode::Recursive => recursive::run(&core, value)?,
            ExecutionMode::Sequential { order } => sequential::run(&core, order, value)?,
            ExecutionMode::Parallel { .. } => parallel::run(&core, self.pool.as_deref(), value)?,
        };

        debug!(
            mode = ?self.mode,
            copied = core.copied(),
            continuations = core.continuations(),
            "deep clone finished"
        );
        Ok(copied)
    }

    /// Deep-copies an object. `None` when a policy turned it into `Null`.
    pub fn deep_clone_obj(&self, original: &Obj) -> Result<Option<Obj>> {
        match self.deep_clone(&Value::Obj(original.clone()))? {
            Value::Obj(clone) => Ok(Some(clone)),
            Value::Null => Ok(None),
            other => Err(CloneError::Internal(format!(
                "object copy produced a {} value",
                other.type_name()
            ))),
        }
    }
}

fn default_type_policy(
    custom: Option<SharedPolicy<ClassRef>>,
    exact: Option<ExactPolicy<ClassRef>>,
    predicates: Option<PredicatePolicy<ClassRef>>,
) -> SharedPolicy<ClassRef> {
    let mut chain: Vec<SharedPolicy<ClassRef>> = Vec::new();
    chain.extend(custom);
    if let Some(exact) = exact.filter(|p| !p.is_empty()) {
        chain.push(Arc::new(exact));
    }
    if let Some(predicates) = predicates.filter(|p| !p.is_empty()) {
        chain.push(Arc::new(predicates));
    }
    chain.push(Arc::new(DeclaredTypePolicy));
    chain.push(Arc::new(DefaultTypePolicy));
    CompoundPolicy::of(chain)
}

fn default_member_policy(
    custom: Option<SharedPolicy<MemberDesc>>,
    exact: Option<ExactPolicy<MemberDesc>>,
    predicates: Option<PredicatePolicy<MemberDesc>>,
) -> SharedPolicy<MemberDesc> {
    let mut chain: Vec<SharedPolicy<MemberDesc>> = Vec::new();
    chain.extend(custom);
    if let Some(exact) = exact.filter(|p| !p.is_empty()) {
        chain.push(Arc::new(exact));
    }
    if let Some(predicates) = predicates.filter(|p| !p.is_empty()) {
        chain.push(Arc::new(predicates));
    }
    chain.push(Arc::new(DeclaredMemberPolicy));
    CompoundPolicy::of(chain)
}

/// Collects a cloner configuration.
///
/// Every method is chainable. Conflicting settings do not fail immediately; the first
/// conflict is reported by [`ClonerBuilder::build`].
#[derive(Default)]
pub struct ClonerBuilder {
    mode: ExecutionMode,
    instantiation: InstantiationStrategy,
    introspector: Option<Arc<dyn Introspector>>,
    object_policy: Option<SharedPolicy<Obj>>,
    type_policy: Option<SharedPolicy<ClassRef>>,
    member_policy: Option<SharedPolicy<MemberDesc>>,
    object_actions: ExactPolicy<Obj>,
    object_rules: PredicatePolicy<Obj>,
    type_actions: ExactPolicy<ClassRef>,
    type_rules: PredicatePolicy<ClassRef>,
    member_actions: ExactPolicy<MemberDesc>,
    member_rules: PredicatePolicy<MemberDesc>,
    custom: HashMap<ClassId, Arc<dyn Copier>>,
    shallow: HashSet<ClassId>,
    seeds: Vec<(Obj, Obj)>,
    seeded: HashSet<IdentityKey>,
    errors: Vec<CloneError>,
}

impl fmt::Debug for ClonerBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClonerBuilder")
            .field("mode", &self.mode)
            .field("instantiation", &self.instantiation)
            .field("type_actions", &self.type_actions.len())
            .field("member_actions", &self.member_actions.len())
            .field("custom", &self.custom.len())
            .field("shallow", &self.shallow.len())
            .field("seeds", &self.seeds.len())
            .field("errors", &self.errors.len())
            .finish_non_exhaustive()
    }
}

impl ClonerBuilder {
    fn fail(&mut self, message: String) {
        self.errors.push(CloneError::config(message));
    }

    fn record(&mut self, outcome: Result<()>) {
        if let Err(err) = outcome {
            self.errors.push(err);
        }
    }

    fn reject_skip(&mut self, action: CopyAction, target: &str) -> bool {
        if action == CopyAction::Skip {
            self.fail(format!("SKIP is only valid for members, not for {target}"));
            return true;
        }
        false
    }

    // --- Execution ---

    /// Sets the execution mode. The last call wins.
    pub fn mode(mut self, mode: ExecutionMode) -> Self {
        self.mode = mode;
        self
    }

    /// Continuations run inline.
    pub fn recursive(self) -> Self {
        self.mode(ExecutionMode::Recursive)
    }

    /// Continuations are queued and drained in `order`.
    pub fn sequential(self, order: TraversalOrder) -> Self {
        self.mode(ExecutionMode::Sequential { order })
    }

    /// Continuations run on the global rayon pool.
    pub fn parallel(self) -> Self {
        self.mode(ExecutionMode::Parallel { threads: None })
    }

    /// Continuations run on a dedicated pool of `threads` workers.
    pub fn parallel_threads(self, threads: usize) -> Self {
        self.mode(ExecutionMode::Parallel {
            threads: Some(threads),
        })
    }

    /// Applies a data-driven configuration (execution mode and instantiation).
    pub fn config(self, config: &ClonerConfig) -> Self {
        self.mode(config.execution).instantiation(config.instantiation)
    }

    // --- Capabilities ---

    /// How structural copies obtain empty instances. The last call wins.
    pub fn instantiation(mut self, strategy: InstantiationStrategy) -> Self {
        self.instantiation = strategy;
        self
    }

    /// Replaces the introspection capability. May be set once.
    pub fn introspector(mut self, introspector: Arc<dyn Introspector>) -> Self {
        if self.introspector.is_some() {
            self.fail("An introspector is already configured".into());
        } else {
            self.introspector = Some(introspector);
        }
        self
    }

    // --- Object policies ---

    /// Custom object policy, consulted for every copied object. May be set once.
    pub fn object_policy(mut self, policy: impl CopyPolicy<Obj> + 'static) -> Self {
        if self.object_policy.is_some() {
            self.fail("An object policy is already configured".into());
        } else {
            self.object_policy = Some(Arc::new(policy));
        }
        self
    }

    /// Action for one specific object.
    pub fn object_action(mut self, original: &Obj, action: CopyAction) -> Self {
        if !self.reject_skip(action, "objects") {
            let outcome = self.object_actions.insert(
                original,
                action,
                format_args!("object {original:?}"),
            );
            self.record(outcome);
        }
        self
    }

    /// Action for every object matching `predicate`.
    pub fn object_action_if<F>(mut self, predicate: F, action: CopyAction) -> Self
    where
        F: Fn(&Obj) -> bool + Send + Sync + 'static,
    {
        if !self.reject_skip(action, "objects") {
            self.object_rules.push(Arc::new(predicate), action);
        }
        self
    }

    // --- Type policies ---

    /// Custom type policy, consulted first. May be set once.
    pub fn type_policy(mut self, policy: impl CopyPolicy<ClassRef> + 'static) -> Self {
        if self.type_policy.is_some() {
            self.fail("A type policy is already configured".into());
        } else {
            self.type_policy = Some(Arc::new(policy));
        }
        self
    }

    /// Action for exactly `class` (not its subclasses).
    pub fn type_action(mut self, class: &ClassRef, action: CopyAction) -> Self {
        if self.reject_skip(action, "types") {
            return self;
        }
        if self.custom.contains_key(&class.id()) {
            self.fail(format!(
                "Type '{class}' already has a custom copier; it cannot also have a copy action"
            ));
            return self;
        }
        if self.shallow.contains(&class.id()) {
            self.fail(format!(
                "Type '{class}' is already copied shallowly; it cannot also have a copy action"
            ));
            return self;
        }
        let outcome = self.type_actions.insert(class, action, format_args!("type '{class}'"));
        self.record(outcome);
        self
    }

    /// Action for every class matching `predicate`.
    pub fn type_action_if<F>(mut self, predicate: F, action: CopyAction) -> Self
    where
        F: Fn(&ClassRef) -> bool + Send + Sync + 'static,
    {
        if !self.reject_skip(action, "types") {
            self.type_rules.push(Arc::new(predicate), action);
        }
        self
    }

    // --- Member policies ---

    /// Custom member policy, consulted first. May be set once.
    pub fn member_policy(mut self, policy: impl CopyPolicy<MemberDesc> + 'static) -> Self {
        if self.member_policy.is_some() {
            self.fail("A member policy is already configured".into());
        } else {
            self.member_policy = Some(Arc::new(policy));
        }
        self
    }

    /// Action for the instance member `name` of `class` (own or inherited).
    pub fn member_action(mut self, class: &ClassRef, name: &str, action: CopyAction) -> Self {
        let Some(member) = class.find_member(name) else {
            self.fail(format!("Type '{class}' has no instance member '{name}'"));
            return self;
        };
        if action == CopyAction::Null && member.field_type().is_primitive() {
            self.fail(format!(
                "Member '{}.{name}' is a {:?} primitive and cannot be set to NULL; use SKIP",
                member.declaring_name(),
                member.field_type()
            ));
            return self;
        }
        let outcome = self.member_actions.insert(
            &member,
            action,
            format_args!("member '{}.{name}'", member.declaring_name()),
        );
        self.record(outcome);
        self
    }

    /// Action for every member matching `predicate`.
    pub fn member_action_if<F>(mut self, predicate: F, action: CopyAction) -> Self
    where
        F: Fn(&MemberDesc) -> bool + Send + Sync + 'static,
    {
        self.member_rules.push(Arc::new(predicate), action);
        self
    }

    // --- Copiers ---

    /// Custom copier for exactly `class`.
    pub fn copier(mut self, class: &ClassRef, copier: Arc<dyn Copier>) -> Self {
        if self.custom.contains_key(&class.id()) {
            self.fail(format!("Type '{class}' already has a custom copier"));
        } else if self.shallow.contains(&class.id()) {
            self.fail(format!("Type '{class}' is already copied shallowly"));
        } else if self.type_actions.contains(class) {
            self.fail(format!("Type '{class}' already has a copy action"));
        } else {
            self.custom.insert(class.id(), copier);
        }
        self
    }

    /// Copies `class` structurally with every member kept by reference.
    pub fn shallow(mut self, class: &ClassRef) -> Self {
        if self.shallow.contains(&class.id()) {
            self.fail(format!("Type '{class}' is already copied shallowly"));
        } else if self.custom.contains_key(&class.id()) {
            self.fail(format!("Type '{class}' already has a custom copier"));
        } else if self.type_actions.contains(class) {
            self.fail(format!("Type '{class}' already has a copy action"));
        } else {
            self.shallow.insert(class.id());
        }
        self
    }

    // --- Seeds ---

    /// Every invocation maps `original` to `clone` instead of copying it.
    pub fn clone_of(mut self, original: &Obj, clone: &Obj) -> Self {
        if self.seeded.insert(IdentityKey::new(original)) {
            self.seeds.push((original.clone(), clone.clone()));
        } else {
            self.fail(format!("{original:?} already has a pre-defined clone"));
        }
        self
    }

    /// Every invocation keeps `obj` by reference.
    pub fn singleton(self, obj: &Obj) -> Self {
        self.clone_of(obj, obj)
    }

    // --- Build ---

    /// Validates the configuration and creates the cloner.
    ///
    /// # Errors
    ///
    /// The first conflict recorded by a builder method, or a dedicated pool of zero threads.
    pub fn build(self) -> Result<Cloner> {
        if let Some(err) = self.errors.into_iter().next() {
            return Err(err);
        }

        let pool = match self.mode {
            ExecutionMode::Parallel { threads: Some(0) } => {
                return Err(CloneError::config("A parallel pool needs at least one thread"));
            }
            ExecutionMode::Parallel {
                threads: Some(threads),
            } => Some(Arc::new(
                rayon::ThreadPoolBuilder::new()
                    .num_threads(threads)
                    .thread_name(|i| format!("deepgraph-worker-{i}"))
                    .build()
                    .map_err(|e| CloneError::config(format!("Cannot start worker pool: {e}")))?,
            )),
            _ => None,
        };

        let has_object_policy = self.object_policy.is_some()
            || !self.object_actions.is_empty()
            || !self.object_rules.is_empty();
        let object_policy = has_object_policy.then(|| {
            let mut chain: Vec<SharedPolicy<Obj>> = Vec::new();
            chain.extend(self.object_policy);
            if !self.object_actions.is_empty() {
                chain.push(Arc::new(self.object_actions));
            }
            if !self.object_rules.is_empty() {
                chain.push(Arc::new(self.object_rules));
            }
            CompoundPolicy::of(chain)
        });

        debug!(
            mode = ?self.mode,
            instantiation = ?self.instantiation,
            object_policy = has_object_policy,
            type_actions = self.type_actions.len(),
            type_rules = self.type_rules.len(),
            member_actions = self.member_actions.len(),
            member_rules = self.member_rules.len(),
            custom = self.custom.len(),
            shallow = self.shallow.len(),
            seeds = self.seeds.len(),
            "cloner built"
        );

        let registry = CopierRegistry::new(RegistryParts {
            introspector: self.introspector.unwrap_or_else(|| Arc::new(ModelIntrospector)),
            instantiation: self.instantiation,
            object_policy,
            type_policy: default_type_policy(
                self.type_policy,
                Some(self.type_actions),
                Some(self.type_rules),
            ),
            member_policy: default_member_policy(
                self.member_policy,
                Some(self.member_actions),
                Some(self.member_rules),
            ),
            custom: self.custom,
            shallow: self.shallow,
        });

        Ok(Cloner {
            registry: Arc::new(registry),
            seeds: Arc::from(self.seeds),
            mode: self.mode,
            pool,
        })
    }
}
