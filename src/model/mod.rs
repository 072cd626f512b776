//! The dynamic object model the engine copies.
//!
//! Rust has no runtime reflection, so graphs that need a generic deep copy are expressed with
//! this model: [`Obj`] handles (shared, interior-mutable heap objects, possibly cyclic) whose
//! shape is described by a [`ClassRef`]. The engine never touches the model directly; it goes
//! through an [`Introspector`](crate::introspect::Introspector), of which
//! [`ModelIntrospector`](crate::introspect::ModelIntrospector) is the default.
//!
//! ```rust
//! use deepgraph::model::{ClassRef, FieldType, Obj};
//!
//! let node = ClassRef::record("Node")
//!     .field("value", FieldType::Int)
//!     .field("next", FieldType::Ref)
//!     .build();
//!
//! let a = Obj::zeroed(&node)?;
//! a.set("value", 7)?;
//! a.set("next", &a)?; // cycles are fine
//! assert_eq!(a.get("value")?.as_int(), Some(7));
//! # Ok::<(), deepgraph::CloneError>(())
//! ```

/// Class descriptors, members and the class builder.
pub mod class;
/// Values and heap objects.
pub mod value;
/// Well-known classes and process-wide singletons.
pub mod well_known;

pub use class::{
    ClassBuilder, ClassDesc, ClassId, ClassRef, Constructor, ElementType, FieldType, MemberDesc,
    MemberKey, Storage, TypeKind,
};
pub use value::{Obj, ObjState, Value};
