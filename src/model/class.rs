//! Class descriptors: the static shape of every object in the model.

use std::fmt;
use std::hash::{Hash, Hasher};
use std::ops::Deref;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use super::value::{Obj, Value};
use crate::copier::Copier;
use crate::error::Result;
use crate::policy::CopyAction;

static NEXT_CLASS_ID: AtomicU64 = AtomicU64::new(1);

/// A strong type identifying a class for the lifetime of the process.
///
/// Two classes built with the same name are still distinct classes.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ClassId(u64);

impl ClassId {
    fn next() -> Self {
        Self(NEXT_CLASS_ID.fetch_add(1, Ordering::Relaxed))
    }

    /// Returns the raw numeric value.
    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl fmt::Debug for ClassId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ClassId({})", self.0)
    }
}

impl fmt::Display for ClassId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Declared type of a record member.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FieldType {
    /// `bool` primitive.
    Bool,
    /// 64-bit signed integer primitive.
    Int,
    /// 64-bit float primitive.
    Float,
    /// `char` primitive.
    Char,
    /// Immutable string reference.
    Str,
    /// Reference to anything.
    Ref,
}

impl FieldType {
    /// The neutral value a freshly allocated member holds.
    pub fn zero(self) -> Value {
        match self {
            Self::Bool => Value::Bool(false),
            Self::Int => Value::Int(0),
            Self::Float => Value::Float(0.0),
            Self::Char => Value::Char('\0'),
            Self::Str | Self::Ref => Value::Null,
        }
    }

    /// Primitives cannot hold `Null`.
    pub fn is_primitive(self) -> bool {
        matches!(self, Self::Bool | Self::Int | Self::Float | Self::Char)
    }

    /// Whether a member of this type may store `value`.
    pub fn accepts(self, value: &Value) -> bool {
        match (self, value) {
            (Self::Bool, Value::Bool(_))
            | (Self::Int, Value::Int(_))
            | (Self::Float, Value::Float(_))
            | (Self::Char, Value::Char(_)) => true,
            (Self::Str, Value::Null | Value::Str(_)) => true,
            (Self::Ref, _) => true,
            _ => false,
        }
    }
}

/// Element type of a homogeneous array.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ElementType {
    /// `bool` elements.
    Bool,
    /// Integer elements.
    Int,
    /// Float elements.
    Float,
    /// `char` elements.
    Char,
    /// String elements.
    Str,
    /// Instances of the given class (or its subclasses).
    Class(ClassRef),
    /// Anything.
    Any,
}

impl ElementType {
    /// The neutral value of a fresh array slot.
    pub fn zero(&self) -> Value {
        match self {
            Self::Bool => Value::Bool(false),
            Self::Int => Value::Int(0),
            Self::Float => Value::Float(0.0),
            Self::Char => Value::Char('\0'),
            Self::Str | Self::Class(_) | Self::Any => Value::Null,
        }
    }
}

/// The structural category of a class.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TypeKind {
    /// Named members stored in slots.
    Record,
    /// Fixed-length homogeneous array.
    Array(ElementType),
    /// Ordered growable sequence.
    List,
    /// Sequence without duplicates (by value equality, identity for objects).
    Set,
    /// Association list keyed by value equality (identity for objects).
    Map,
    /// Enum constants. Always shared, never copied.
    Enum,
    /// State the model cannot see into. Only custom copiers can handle it.
    Opaque,
}

/// Where a member's value lives.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Storage {
    /// Index into the instance's field vector.
    Instance(usize),
    /// Class-level member, not part of any instance.
    Static,
}

/// Identity of a member: declaring class plus name.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MemberKey {
    class: ClassId,
    name: Arc<str>,
}

/// Descriptor of one declared member.
#[derive(Debug, Clone)]
pub struct MemberDesc {
    name: Arc<str>,
    declaring: ClassId,
    declaring_name: Arc<str>,
    ty: FieldType,
    storage: Storage,
    declared_action: Option<CopyAction>,
}

impl MemberDesc {
    /// Member name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Class declaring this member.
    pub fn declaring(&self) -> ClassId {
        self.declaring
    }

    /// Name of the declaring class.
    pub fn declaring_name(&self) -> &str {
        &self.declaring_name
    }

    /// Declared type.
    pub fn field_type(&self) -> FieldType {
        self.ty
    }

    /// Storage location.
    pub fn storage(&self) -> Storage {
        self.storage
    }

    /// `true` for class-level members.
    pub fn is_static(&self) -> bool {
        self.storage == Storage::Static
    }

    /// Copy action declared on the member itself, if any.
    pub fn declared_action(&self) -> Option<CopyAction> {
        self.declared_action
    }

    /// Identity key of this member.
    pub fn key(&self) -> MemberKey {
        MemberKey {
            class: self.declaring,
            name: Arc::clone(&self.name),
        }
    }
}

/// No-argument constructor: initializes a zero-filled instance.
pub type Constructor = Arc<dyn Fn(&Obj) -> Result<()> + Send + Sync>;

/// The immutable description of a class.
pub struct ClassDesc {
    id: ClassId,
    name: Arc<str>,
    kind: TypeKind,
    parent: Option<ClassRef>,
    members: Vec<Arc<MemberDesc>>,
    slot_types: Vec<FieldType>,
    sealed: bool,
    immutable: bool,
    declared_action: Option<CopyAction>,
    constructor: Option<Constructor>,
    self_copier: Option<Arc<dyn Copier>>,
}

impl ClassDesc {
    /// Process-unique id.
    pub fn id(&self) -> ClassId {
        self.id
    }

    /// Class name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Structural category.
    pub fn kind(&self) -> &TypeKind {
        &self.kind
    }

    /// Supertype, if any.
    pub fn parent(&self) -> Option<&ClassRef> {
        self.parent.as_ref()
    }

    /// Members declared by this class only (instance and static), in declaration order.
    pub fn declared_members(&self) -> &[Arc<MemberDesc>] {
        &self.members
    }

    /// Own declared member by name.
    pub fn member(&self, name: &str) -> Option<&Arc<MemberDesc>> {
        self.members.iter().find(|m| m.name() == name)
    }

    /// Instance member by name, searching this class first and then its ancestors.
    pub fn find_member(&self, name: &str) -> Option<Arc<MemberDesc>> {
        if let Some(m) = self.members.iter().find(|m| m.name() == name && !m.is_static()) {
            return Some(Arc::clone(m));
        }
        self.parent.as_ref().and_then(|p| p.find_member(name))
    }

    /// Declared type of every instance slot, ancestors first.
    pub fn slot_types(&self) -> &[FieldType] {
        &self.slot_types
    }

    /// Sealed classes have no subtypes.
    pub fn is_sealed(&self) -> bool {
        self.sealed
    }

    /// Instances never change after construction.
    pub fn is_immutable(&self) -> bool {
        self.immutable
    }

    /// Copy action declared on the class itself, if any.
    pub fn declared_action(&self) -> Option<CopyAction> {
        self.declared_action
    }

    /// No-argument constructor, if the class has one.
    pub fn constructor(&self) -> Option<&Constructor> {
        self.constructor.as_ref()
    }

    /// Copier the class supplies for itself, if any.
    pub fn self_copier(&self) -> Option<&Arc<dyn Copier>> {
        self.self_copier.as_ref()
    }

    /// Whether this class is `id` or one of its descendants.
    pub fn is_subclass_of(&self, id: ClassId) -> bool {
        self.id == id || self.parent.as_ref().is_some_and(|p| p.is_subclass_of(id))
    }
}

impl fmt::Debug for ClassDesc {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClassDesc")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("kind", &self.kind)
            .field("parent", &self.parent.as_ref().map(|p| p.name().to_string()))
            .field("members", &self.members.len())
            .field("sealed", &self.sealed)
            .field("immutable", &self.immutable)
            .finish_non_exhaustive()
    }
}

/// Shared handle to a [`ClassDesc`]. Equality and hashing use the class id.
#[derive(Clone)]
pub struct ClassRef(Arc<ClassDesc>);

impl ClassRef {
    /// Starts a record class.
    pub fn record(name: &str) -> ClassBuilder {
        ClassBuilder::new(name, TypeKind::Record)
    }

    /// Starts an array class.
    pub fn array(name: &str, element: ElementType) -> ClassBuilder {
        ClassBuilder::new(name, TypeKind::Array(element))
    }

    /// Starts a list class.
    pub fn list(name: &str) -> ClassBuilder {
        ClassBuilder::new(name, TypeKind::List)
    }

    /// Starts a set class.
    pub fn set(name: &str) -> ClassBuilder {
        ClassBuilder::new(name, TypeKind::Set)
    }

    /// Starts a map class.
    pub fn map(name: &str) -> ClassBuilder {
        ClassBuilder::new(name, TypeKind::Map)
    }

    /// Starts an enum class.
    pub fn enumeration(name: &str) -> ClassBuilder {
        ClassBuilder::new(name, TypeKind::Enum)
    }

    /// Starts an opaque class.
    pub fn opaque(name: &str) -> ClassBuilder {
        ClassBuilder::new(name, TypeKind::Opaque)
    }
}

impl Deref for ClassRef {
    type Target = ClassDesc;

    fn deref(&self) -> &ClassDesc {
        &self.0
    }
}

impl PartialEq for ClassRef {
    fn eq(&self, other: &Self) -> bool {
        self.0.id == other.0.id
    }
}

impl Eq for ClassRef {}

impl Hash for ClassRef {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.0.id.hash(state);
    }
}

impl fmt::Debug for ClassRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ClassRef({}{})", self.0.name, self.0.id)
    }
}

impl fmt::Display for ClassRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0.name)
    }
}

/// Builder for [`ClassRef`].
///
/// Member names are expected to be unique within one class; a duplicate is shadowed by the
/// first declaration on lookup.
pub struct ClassBuilder {
    name: Arc<str>,
    kind: TypeKind,
    parent: Option<ClassRef>,
    fields: Vec<(Arc<str>, FieldType, bool, Option<CopyAction>)>,
    sealed: bool,
    immutable: bool,
    declared_action: Option<CopyAction>,
    constructor: Option<Constructor>,
    self_copier: Option<Arc<dyn Copier>>,
}

impl ClassBuilder {
    fn new(name: &str, kind: TypeKind) -> Self {
        Self {
            name: Arc::from(name),
            kind,
            parent: None,
            fields: Vec::new(),
            sealed: false,
            immutable: false,
            declared_action: None,
            constructor: None,
            self_copier: None,
        }
    }

    /// Sets the supertype. Instance slots of the parent come first.
    pub fn extends(mut self, parent: &ClassRef) -> Self {
        self.parent = Some(parent.clone());
        self
    }

    /// Declares an instance member.
    pub fn field(mut self, name: &str, ty: FieldType) -> Self {
        self.fields.push((Arc::from(name), ty, false, None));
        self
    }

    /// Declares an instance member carrying its own copy action.
    pub fn field_with_action(mut self, name: &str, ty: FieldType, action: CopyAction) -> Self {
        self.fields.push((Arc::from(name), ty, false, Some(action)));
        self
    }

    /// Declares a class-level member. Static members are never copied.
    pub fn static_field(mut self, name: &str, ty: FieldType) -> Self {
        self.fields.push((Arc::from(name), ty, true, None));
        self
    }

    /// Marks the class as having no subtypes.
    pub fn sealed(mut self) -> Self {
        self.sealed = true;
        self
    }

    /// Marks instances as never changing; they are shared instead of copied.
    pub fn immutable(mut self) -> Self {
        self.immutable = true;
        self
    }

    /// Declares the copy action for every instance of the class.
    pub fn declared_action(mut self, action: CopyAction) -> Self {
        self.declared_action = Some(action);
        self
    }

    /// Sets the no-argument constructor.
    pub fn constructor<F>(mut self, init: F) -> Self
    where
        F: Fn(&Obj) -> Result<()> + Send + Sync + 'static,
    {
        self.constructor = Some(Arc::new(init));
        self
    }

    /// Lets the class supply its own copy logic.
    pub fn copier(mut self, copier: Arc<dyn Copier>) -> Self {
        self.self_copier = Some(copier);
        self
    }

    /// Finishes the class.
    pub fn build(self) -> ClassRef {
        let id = ClassId::next();
        let mut slot_types = self
            .parent
            .as_ref()
            .map(|p| p.slot_types().to_vec())
            .unwrap_or_default();

        let members = self
            .fields
            .into_iter()
            .map(|(name, ty, is_static, declared_action)| {
                let storage = if is_static {
                    Storage::Static
                } else {
                    slot_types.push(ty);
                    Storage::Instance(slot_types.len() - 1)
                };
                Arc::new(MemberDesc {
                    name,
                    declaring: id,
                    declaring_name: Arc::clone(&self.name),
                    ty,
                    storage,
                    declared_action,
                })
            })
            .collect();

        ClassRef(Arc::new(ClassDesc {
            id,
            name: self.name,
            kind: self.kind,
            parent: self.parent,
            members,
            slot_types,
            sealed: self.sealed,
            immutable: self.immutable,
            declared_action: self.declared_action,
            constructor: self.constructor,
            self_copier: self.self_copier,
        }))
    }
}
