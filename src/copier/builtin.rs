//! Built-in copiers for arrays and collections.

use std::collections::HashMap;
use std::sync::Arc;

use crate::context::CopyContext;
use crate::error::{CloneError, Result};
use crate::model::{Obj, ObjState, TypeKind, Value};

use super::{Copier, TwoPhaseCopier};

/// One-phase copy: same class, state copied verbatim.
///
/// Only correct when the state holds nothing that needs copying (immutable elements).
#[derive(Debug, Clone, Copy, Default)]
pub struct ShallowCopier;

impl Copier for ShallowCopier {
    fn copy(&self, original: &Obj, ctx: &dyn CopyContext) -> Result<Value> {
        let clone = Obj::new(original.class(), original.snapshot());
        ctx.register(original, &clone)?;
        Ok(Value::Obj(clone))
    }
}

/// Same-length array, then every element copied through the context.
#[derive(Debug, Clone, Copy, Default)]
pub struct ArrayCopier;

impl TwoPhaseCopier for ArrayCopier {
    fn allocate(&self, original: &Obj) -> Result<Obj> {
        let class = original.class();
        let TypeKind::Array(element) = class.kind() else {
            return Err(CloneError::Internal(format!(
                "array copier applied to non-array type '{}'",
                class.name()
            )));
        };
        Ok(Obj::with_elements(class, vec![element.zero(); original.len()]))
    }

    fn deep_copy(&self, original: &Obj, clone: &Obj, ctx: &dyn CopyContext) -> Result<()> {
        let copied = original
            .elements()
            .iter()
            .map(|element| ctx.copy(element))
            .collect::<Result<Vec<_>>>()?;
        clone.write(|state| *state = ObjState::Elements(copied));
        Ok(())
    }
}

/// Rebuilds lists, sets and maps.
///
/// Copying may merge elements that were distinct in the original (two members nulled by a
/// policy, two keys mapped to one shared instance), so set elements and map keys are
/// de-duplicated after copying. For maps the last value wins.
#[derive(Debug, Clone, Copy, Default)]
pub struct CollectionCopier;

impl TwoPhaseCopier for CollectionCopier {
    fn allocate(&self, original: &Obj) -> Result<Obj> {
        let class = original.class();
        match class.kind() {
            TypeKind::List | TypeKind::Set => Ok(Obj::with_elements(class, Vec::new())),
            TypeKind::Map => Ok(Obj::with_entries(class, Vec::new())),
            other => Err(CloneError::Internal(format!(
                "collection copier applied to {other:?} type '{}'",
                class.name()
            ))),
        }
    }

    fn deep_copy(&self, original: &Obj, clone: &Obj, ctx: &dyn CopyContext) -> Result<()> {
        match original.class().kind() {
            TypeKind::Map => {
                let mut entries: Vec<(Value, Value)> = Vec::with_capacity(original.len());
                let mut index = KeyIndex::default();
                for (key, value) in original.entries() {
                    let key = ctx.copy(&key)?;
                    let value = ctx.copy(&value)?;
                    match index.position(&key) {
                        Some(at) => entries[at].1 = value,
                        None => {
                            index.insert(&key, entries.len());
                            entries.push((key, value));
                        }
                    }
                }
                clone.write(|state| *state = ObjState::Entries(entries));
            }
            kind => {
                let dedup = *kind == TypeKind::Set;
                let mut items: Vec<Value> = Vec::with_capacity(original.len());
                let mut index = KeyIndex::default();
                for element in original.elements() {
                    let element = ctx.copy(&element)?;
                    if dedup {
                        if index.position(&element).is_some() {
                            continue;
                        }
                        index.insert(&element, items.len());
                    }
                    items.push(element);
                }
                clone.write(|state| *state = ObjState::Elements(items));
            }
        }
        Ok(())
    }
}

/// Hashable view of a [`Value`]: objects by identity, scalars by value.
#[derive(PartialEq, Eq, Hash)]
enum KeyOf {
    Null,
    Bool(bool),
    Int(i64),
    Char(char),
    Str(Arc<str>),
    Obj(usize),
}

/// Positions of the set elements or map keys kept so far.
///
/// Floats are not hashable under value equality (`NaN`, signed zero) and are compared one by
/// one instead.
#[derive(Default)]
struct KeyIndex {
    hashed: HashMap<KeyOf, usize>,
    floats: Vec<(f64, usize)>,
}

impl KeyIndex {
    fn key_of(value: &Value) -> Option<KeyOf> {
        match value {
            Value::Null => Some(KeyOf::Null),
            Value::Bool(b) => Some(KeyOf::Bool(*b)),
            Value::Int(i) => Some(KeyOf::Int(*i)),
            Value::Char(c) => Some(KeyOf::Char(*c)),
            Value::Str(s) => Some(KeyOf::Str(Arc::clone(s))),
            Value::Obj(o) => Some(KeyOf::Obj(o.addr())),
            Value::Float(_) => None,
        }
    }

    fn position(&self, value: &Value) -> Option<usize> {
        match (Self::key_of(value), value) {
            (Some(key), _) => self.hashed.get(&key).copied(),
            (None, Value::Float(f)) => self.floats.iter().find(|(x, _)| x == f).map(|(_, at)| *at),
            (None, _) => None,
        }
    }

    fn insert(&mut self, value: &Value, at: usize) {
        match (Self::key_of(value), value) {
            (Some(key), _) => {
                self.hashed.insert(key, at);
            }
            (None, Value::Float(f)) => self.floats.push((*f, at)),
            (None, _) => {}
        }
    }
}
