//! # deepgraph
//!
//! A generic deep copy engine for arbitrary, possibly cyclic, in-memory object graphs.
//!
//! ## Overview
//!
//! deepgraph produces an independent copy of an object graph without asking the types in the
//! graph to supply copy logic. Aliasing is preserved: two references to the same original
//! become two references to the same clone, and cycles are reproduced among the clones rather
//! than followed forever.
//!
//! ### Key Features
//!
//! *   **Exactly one clone per original:** an identity-keyed slot cache, reserved before the
//!     clone exists, resolves cycles and shared references, even when the same original is
//!     discovered by several worker threads at once.
//! *   **Two-phase copying:** allocate an empty clone, register it, fill it in later. A member
//!     that points back to its owner resolves to the (not yet filled) clone.
//! *   **Cascading policies:** per object, per type and per member, each answering `Default`,
//!     `Original` (share), `Null` or, for members, `Skip`.
//! *   **Cached strategies:** each runtime class is resolved once to a
//!     [`Strategy`](copier::Strategy) (trivial, shallow, array, collection, custom, structural)
//!     and reused by every invocation.
//! *   **Three executions, one protocol:** recursive, sequential (depth- or breadth-first queue)
//!     and parallel (rayon scope with cooperative cancellation).
//!
//! ## Architecture
//!
//! ```text
//! Cloner ──▶ CopyContext ──▶ CopierRegistry ──▶ Strategy
//!   ▲            │  ▲                              │
//!   │            │  └──── copy(child) ─────────────┘
//!   │            └──▶ IdentityCache (slots)
//!   └── drains continuations (inline / queue / rayon scope)
//! ```
//!
//! ### Object Model
//!
//! Rust has no runtime reflection, so graphs are expressed with the dynamic model in
//! [`model`]: [`Obj`] handles described by [`ClassRef`]s. The engine only ever reads and writes
//! state through an [`Introspector`]; [`ModelIntrospector`] is the default one.
//!
//! ## Usage
//!
//! ```rust
//! use deepgraph::model::{ClassRef, FieldType, Obj, Value, well_known};
//! use deepgraph::Cloner;
//!
//! let person = ClassRef::record("Person")
//!     .field("name", FieldType::Str)
//!     .field("friends", FieldType::Ref)
//!     .build();
//!
//! let alice = Obj::zeroed(&person)?;
//! alice.set("name", "Alice")?;
//! let friends = Obj::with_elements(&well_known::list(), vec![Value::from(&alice)]);
//! alice.set("friends", &friends)?;
//!
//! let cloner = Cloner::builder().parallel().build()?;
//! let copy = cloner.deep_clone_obj(&alice)?;
//! assert!(copy.is_some_and(|c| !c.ptr_eq(&alice)));
//! # Ok::<(), deepgraph::CloneError>(())
//! ```
//!
//! ## Error Handling
//!
//! Every fallible operation returns [`Result`]. A failure anywhere aborts the whole
//! invocation; see [`CloneError`] for the taxonomy.
//!
//! ## Logging
//!
//! The crate emits [`tracing`] events (`debug` per cloner and per invocation, `trace` per
//! resolved class, `warn` on parallel failures) and never installs a subscriber.

#![deny(unsafe_code)]
#![deny(clippy::unwrap_used)]
#![deny(clippy::panic)]
#![warn(missing_docs)]

pub mod api;
pub mod config;
pub mod context;
pub mod copier;
pub mod error;
pub mod identity;
pub mod introspect;
pub mod model;
pub mod policy;
pub mod registry;

pub use api::{Cloner, ClonerBuilder};
pub use config::{ClonerConfig, ExecutionMode, TraversalOrder};
pub use context::{Continuation, CopyContext};
pub use copier::{Copier, Strategy, TwoPhase, TwoPhaseCopier};
pub use error::{CloneError, Result};
pub use introspect::{InstantiationStrategy, Introspector, ModelIntrospector};
pub use model::{ClassRef, FieldType, Obj, Value};
pub use policy::{CopyAction, CopyPolicy};
