//! Values and heap objects.

use std::fmt;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use super::class::{ClassRef, Storage, TypeKind};
use crate::error::{CloneError, Result};

/// A value stored in a member, an array slot or a collection.
///
/// Scalars and strings are immutable. Equality compares scalars by value and objects by
/// reference identity.
#[derive(Debug, Clone, Default, PartialEq)]
pub enum Value {
    /// Absent reference.
    #[default]
    Null,
    /// Boolean.
    Bool(bool),
    /// 64-bit integer.
    Int(i64),
    /// 64-bit float.
    Float(f64),
    /// Character.
    Char(char),
    /// Immutable string, shared.
    Str(Arc<str>),
    /// Reference to a heap object.
    Obj(Obj),
}

impl Value {
    /// `true` for [`Value::Null`].
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// Referenced object, if any.
    pub fn as_obj(&self) -> Option<&Obj> {
        match self {
            Self::Obj(o) => Some(o),
            _ => None,
        }
    }

    /// Integer payload, if any.
    pub fn as_int(&self) -> Option<i64> {
        match self {
            Self::Int(i) => Some(*i),
            _ => None,
        }
    }

    /// Boolean payload, if any.
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// Float payload, if any.
    pub fn as_float(&self) -> Option<f64> {
        match self {
            Self::Float(v) => Some(*v),
            _ => None,
        }
    }

    /// String payload, if any.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Str(s) => Some(s),
            _ => None,
        }
    }

    /// Short human readable name of the variant (or the object's class).
    pub fn type_name(&self) -> String {
        match self {
            Self::Null => "null".into(),
            Self::Bool(_) => "bool".into(),
            Self::Int(_) => "int".into(),
            Self::Float(_) => "float".into(),
            Self::Char(_) => "char".into(),
            Self::Str(_) => "str".into(),
            Self::Obj(o) => o.class().name().to_string(),
        }
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Self::Bool(v)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Self::Int(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Self::Int(i64::from(v))
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Self::Float(v)
    }
}

impl From<char> for Value {
    fn from(v: char) -> Self {
        Self::Char(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Self::Str(Arc::from(v))
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Self::Str(Arc::from(v))
    }
}

impl From<Obj> for Value {
    fn from(v: Obj) -> Self {
        Self::Obj(v)
    }
}

impl From<&Obj> for Value {
    fn from(v: &Obj) -> Self {
        Self::Obj(v.clone())
    }
}

/// Mutable state of a heap object.
#[derive(Debug, Clone, PartialEq)]
pub enum ObjState {
    /// Record slots, ancestors first.
    Fields(Vec<Value>),
    /// Array, list or set elements.
    Elements(Vec<Value>),
    /// Map entries in insertion order.
    Entries(Vec<(Value, Value)>),
    /// Enum constant name.
    Variant(Arc<str>),
    /// Nothing the model can see.
    Opaque,
}

impl ObjState {
    /// Zero state for a fresh instance of `class`.
    pub fn zeroed(class: &ClassRef) -> Result<Self> {
        match class.kind() {
            TypeKind::Record => Ok(Self::Fields(
                class.slot_types().iter().map(|ty| ty.zero()).collect(),
            )),
            TypeKind::Array(_) | TypeKind::List | TypeKind::Set => Ok(Self::Elements(Vec::new())),
            TypeKind::Map => Ok(Self::Entries(Vec::new())),
            TypeKind::Enum | TypeKind::Opaque => Err(CloneError::config(format!(
                "Cannot allocate an empty instance of '{}': {:?} classes have no neutral state",
                class.name(),
                class.kind()
            ))),
        }
    }
}

struct ObjectCell {
    class: ClassRef,
    state: RwLock<ObjState>,
}

/// Shared handle to a heap object. Equality is reference identity.
#[derive(Clone)]
pub struct Obj(Arc<ObjectCell>);

impl Obj {
    /// Creates an object with the given state. The state is not validated against the class.
    pub fn new(class: &ClassRef, state: ObjState) -> Self {
        Self(Arc::new(ObjectCell {
            class: class.clone(),
            state: RwLock::new(state),
        }))
    }

    /// Creates a zero-filled instance without running any constructor.
    pub fn zeroed(class: &ClassRef) -> Result<Self> {
        Ok(Self::new(class, ObjState::zeroed(class)?))
    }

    /// Creates an array, list or set holding `elements`.
    pub fn with_elements(class: &ClassRef, elements: Vec<Value>) -> Self {
        Self::new(class, ObjState::Elements(elements))
    }

    /// Creates a map holding `entries`.
    pub fn with_entries(class: &ClassRef, entries: Vec<(Value, Value)>) -> Self {
        Self::new(class, ObjState::Entries(entries))
    }

    /// Creates an enum constant.
    pub fn variant(class: &ClassRef, name: &str) -> Self {
        Self::new(class, ObjState::Variant(Arc::from(name)))
    }

    /// Runtime class.
    pub fn class(&self) -> &ClassRef {
        &self.0.class
    }

    /// Reference identity.
    pub fn ptr_eq(&self, other: &Obj) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }

    /// Address of the object, stable for its lifetime.
    pub fn addr(&self) -> usize {
        Arc::as_ptr(&self.0) as usize
    }

    fn state(&self) -> RwLockReadGuard<'_, ObjState> {
        self.0.state.read().unwrap_or_else(|p| p.into_inner())
    }

    fn state_mut(&self) -> RwLockWriteGuard<'_, ObjState> {
        self.0.state.write().unwrap_or_else(|p| p.into_inner())
    }

    /// Runs `f` on the current state.
    pub fn read<R>(&self, f: impl FnOnce(&ObjState) -> R) -> R {
        f(&self.state())
    }

    /// Runs `f` on the mutable state.
    pub fn write<R>(&self, f: impl FnOnce(&mut ObjState) -> R) -> R {
        f(&mut self.state_mut())
    }

    /// Copy of the whole state.
    pub fn snapshot(&self) -> ObjState {
        self.state().clone()
    }

    /// Reads a record slot.
    pub fn slot(&self, slot: usize) -> Option<Value> {
        match &*self.state() {
            ObjState::Fields(fields) => fields.get(slot).cloned(),
            _ => None,
        }
    }

    /// Writes a record slot. Returns `false` if the slot does not exist.
    pub fn set_slot(&self, slot: usize, value: Value) -> bool {
        match &mut *self.state_mut() {
            ObjState::Fields(fields) => match fields.get_mut(slot) {
                Some(entry) => {
                    *entry = value;
                    true
                }
                None => false,
            },
            _ => false,
        }
    }

    /// Reads an instance member by name (own or inherited).
    pub fn get(&self, name: &str) -> Result<Value> {
        let slot = self.slot_of(name)?;
        self.slot(slot)
            .ok_or_else(|| CloneError::member(self.class().name(), name, "slot out of range"))
    }

    /// Writes an instance member by name (own or inherited).
    pub fn set(&self, name: &str, value: impl Into<Value>) -> Result<()> {
        let member = self
            .class()
            .find_member(name)
            .ok_or_else(|| CloneError::member(self.class().name(), name, "no such member"))?;
        let value = value.into();
        if !member.field_type().accepts(&value) {
            return Err(CloneError::member(
                self.class().name(),
                name,
                format!(
                    "{:?} member cannot hold a {} value",
                    member.field_type(),
                    value.type_name()
                ),
            ));
        }
        let slot = self.slot_of(name)?;
        if self.set_slot(slot, value) {
            Ok(())
        } else {
            Err(CloneError::member(self.class().name(), name, "slot out of range"))
        }
    }

    fn slot_of(&self, name: &str) -> Result<usize> {
        match self.class().find_member(name).map(|m| m.storage()) {
            Some(Storage::Instance(slot)) => Ok(slot),
            _ => Err(CloneError::member(self.class().name(), name, "no such instance member")),
        }
    }

    /// Elements of an array, list or set (empty for other shapes).
    pub fn elements(&self) -> Vec<Value> {
        match &*self.state() {
            ObjState::Elements(items) => items.clone(),
            _ => Vec::new(),
        }
    }

    /// Element at `index`.
    pub fn element(&self, index: usize) -> Option<Value> {
        match &*self.state() {
            ObjState::Elements(items) => items.get(index).cloned(),
            _ => None,
        }
    }

    /// Appends to an array, list or set. Sets ignore values already present.
    pub fn push(&self, value: impl Into<Value>) -> Result<()> {
        let value = value.into();
        let is_set = *self.class().kind() == TypeKind::Set;
        match &mut *self.state_mut() {
            ObjState::Elements(items) => {
                if !(is_set && items.contains(&value)) {
                    items.push(value);
                }
                Ok(())
            }
            _ => Err(CloneError::member(self.class().name(), "[]", "not a sequence")),
        }
    }

    /// Entries of a map (empty for other shapes).
    pub fn entries(&self) -> Vec<(Value, Value)> {
        match &*self.state() {
            ObjState::Entries(entries) => entries.clone(),
            _ => Vec::new(),
        }
    }

    /// Inserts or replaces a map entry.
    pub fn insert(&self, key: impl Into<Value>, value: impl Into<Value>) -> Result<()> {
        let (key, value) = (key.into(), value.into());
        match &mut *self.state_mut() {
            ObjState::Entries(entries) => {
                match entries.iter_mut().find(|(k, _)| *k == key) {
                    Some(entry) => entry.1 = value,
                    None => entries.push((key, value)),
                }
                Ok(())
            }
            _ => Err(CloneError::member(self.class().name(), "{}", "not a map")),
        }
    }

    /// Looks a key up in a map.
    pub fn lookup(&self, key: &Value) -> Option<Value> {
        match &*self.state() {
            ObjState::Entries(entries) => {
                entries.iter().find(|(k, _)| k == key).map(|(_, v)| v.clone())
            }
            _ => None,
        }
    }

    /// Number of elements or entries (fields for records).
    pub fn len(&self) -> usize {
        match &*self.state() {
            ObjState::Fields(fields) => fields.len(),
            ObjState::Elements(items) => items.len(),
            ObjState::Entries(entries) => entries.len(),
            ObjState::Variant(_) | ObjState::Opaque => 0,
        }
    }

    /// `true` when [`Obj::len`] is zero.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Name of an enum constant.
    pub fn variant_name(&self) -> Option<Arc<str>> {
        match &*self.state() {
            ObjState::Variant(name) => Some(Arc::clone(name)),
            _ => None,
        }
    }
}

impl PartialEq for Obj {
    fn eq(&self, other: &Self) -> bool {
        self.ptr_eq(other)
    }
}

impl Eq for Obj {}

impl fmt::Debug for Obj {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Obj({}@{:#x})", self.class().name(), self.addr())
    }
}
