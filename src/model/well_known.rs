use std::sync::LazyLock;

use super::class::{ClassRef, ElementType};
use super::value::Obj;

static OBJECT_ARRAY: LazyLock<ClassRef> =
    LazyLock::new(|| ClassRef::array("Object[]", ElementType::Any).build());
static INT_ARRAY: LazyLock<ClassRef> =
    LazyLock::new(|| ClassRef::array("int[]", ElementType::Int).sealed().build());
static STRING_ARRAY: LazyLock<ClassRef> =
    LazyLock::new(|| ClassRef::array("String[]", ElementType::Str).sealed().build());
static LIST: LazyLock<ClassRef> = LazyLock::new(|| ClassRef::list("List").build());
static SET: LazyLock<ClassRef> = LazyLock::new(|| ClassRef::set("Set").build());
static MAP: LazyLock<ClassRef> = LazyLock::new(|| ClassRef::map("Map").build());

static EMPTY_LIST: LazyLock<Obj> = LazyLock::new(|| {
    let class = ClassRef::list("EmptyList").sealed().build();
    Obj::with_elements(&class, Vec::new())
});
static EMPTY_MAP: LazyLock<Obj> = LazyLock::new(|| {
    let class = ClassRef::map("EmptyMap").sealed().build();
    Obj::with_entries(&class, Vec::new())
});

/// Array of anything.
pub fn object_array() -> ClassRef {
    OBJECT_ARRAY.clone()
}

/// Array of integers.
pub fn int_array() -> ClassRef {
    INT_ARRAY.clone()
}

/// Array of strings.
pub fn string_array() -> ClassRef {
    STRING_ARRAY.clone()
}

/// General purpose list.
pub fn list() -> ClassRef {
    LIST.clone()
}

/// General purpose set.
pub fn set() -> ClassRef {
    SET.clone()
}

/// General purpose map.
pub fn map() -> ClassRef {
    MAP.clone()
}

/// The shared empty list. Always copied by reference.
pub fn empty_list() -> Obj {
    EMPTY_LIST.clone()
}

/// The shared empty map. Always copied by reference.
pub fn empty_map() -> Obj {
    EMPTY_MAP.clone()
}
