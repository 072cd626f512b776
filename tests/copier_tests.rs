#![allow(missing_docs)]

mod common;

use std::sync::Arc;

use common::{all_modes, deep_eq, list_of, node, node_class, obj};
use deepgraph::copier::Strategy;
use deepgraph::introspect::{Introspector, ModelIntrospector};
use deepgraph::model::{ClassRef, ElementType, FieldType, Obj, Value, well_known};
use deepgraph::{
    CloneError, Cloner, Copier, CopyAction, CopyContext, InstantiationStrategy, TwoPhase,
    TwoPhaseCopier,
};

// --- CUSTOM COPIERS ---

/// Copies `x` and doubles it, one phase.
#[derive(Debug)]
struct DoublingCopier;

impl Copier for DoublingCopier {
    fn copy(&self, original: &Obj, ctx: &dyn CopyContext) -> deepgraph::Result<Value> {
        let clone = Obj::zeroed(original.class())?;
        ctx.register(original, &clone)?;
        let x = original.get("x")?.as_int().unwrap_or_default();
        clone.set("x", x * 2)?;
        clone.set("link", ctx.copy(&original.get("link")?)?)?;
        Ok(Value::Obj(clone))
    }
}

/// Two-phase copier that keeps `link` and upper-cases `name`.
#[derive(Debug)]
struct LinkCopier;

impl TwoPhaseCopier for LinkCopier {
    fn allocate(&self, original: &Obj) -> deepgraph::Result<Obj> {
        Obj::zeroed(original.class())
    }

    fn deep_copy(
        &self,
        original: &Obj,
        clone: &Obj,
        ctx: &dyn CopyContext,
    ) -> deepgraph::Result<()> {
        let name = original.get("name")?.as_str().unwrap_or_default().to_uppercase();
        clone.set("name", name)?;
        clone.set("link", ctx.copy(&original.get("link")?)?)
    }
}

#[derive(Debug)]
enum Broken {
    NoRegister,
    RegisterTwice,
    ReturnOther,
    RegisterOriginal,
    RecurseFirst,
    Fail,
}

impl Copier for Broken {
    fn copy(&self, original: &Obj, ctx: &dyn CopyContext) -> deepgraph::Result<Value> {
        let clone = Obj::zeroed(original.class())?;
        match self {
            Self::NoRegister => {}
            Self::RegisterTwice => {
                ctx.register(original, &clone)?;
                ctx.register(original, &clone)?;
            }
            Self::ReturnOther => {
                ctx.register(original, &clone)?;
                return Ok(Value::Obj(Obj::zeroed(original.class())?));
            }
            Self::RegisterOriginal => ctx.register(original, original)?,
            Self::RecurseFirst => {
                let link = ctx.copy(&original.get("link")?)?;
                clone.set("link", link)?;
                ctx.register(original, &clone)?;
            }
            Self::Fail => return Err(CloneError::copier(original.class().name(), "refused")),
        }
        Ok(Value::Obj(clone))
    }
}

fn custom_class(name: &str) -> ClassRef {
    ClassRef::record(name)
        .field("x", FieldType::Int)
        .field("name", FieldType::Str)
        .field("link", FieldType::Ref)
        .build()
}

fn mismatch(result: deepgraph::Result<Value>) -> String {
    match result.map_err(|e| e.root_cause().clone()) {
        Err(CloneError::RegistrationMismatch { detail, .. }) => detail,
        other => panic!("expected a registration mismatch, got {other:?}"),
    }
}

#[test]
fn one_phase_custom_copier_is_used_and_handles_cycles() -> deepgraph::Result<()> {
    let class = custom_class("Doubled");
    let a = Obj::zeroed(&class)?;
    a.set("x", 21)?;
    a.set("link", &a)?;

    for (mode, cloner) in all_modes(|b| b.copier(&class, Arc::new(DoublingCopier)))? {
        let c = obj(cloner.deep_clone(&Value::from(&a))?)?;
        assert_eq!(c.get("x")?, Value::Int(42), "{mode}");
        assert_eq!(c.get("link")?, Value::from(&c), "{mode}");
    }
    Ok(())
}

#[test]
fn two_phase_custom_copier() -> deepgraph::Result<()> {
    let class = custom_class("Linked");
    let a = Obj::zeroed(&class)?;
    let b = Obj::zeroed(&class)?;
    a.set("name", "a")?;
    b.set("name", "b")?;
    a.set("link", &b)?;
    b.set("link", &a)?;

    let cloners = all_modes(|bld| bld.copier(&class, Arc::new(TwoPhase::new(LinkCopier))))?;
    for (mode, cloner) in cloners {
        let a2 = obj(cloner.deep_clone(&Value::from(&a))?)?;
        let b2 = obj(a2.get("link")?)?;
        assert_eq!(a2.get("name")?.as_str(), Some("A"), "{mode}");
        assert_eq!(b2.get("name")?.as_str(), Some("B"), "{mode}");
        assert_eq!(b2.get("link")?, Value::from(&a2), "{mode}");
    }
    Ok(())
}

#[test]
fn self_described_copier() -> deepgraph::Result<()> {
    let class = ClassRef::record("SelfCopying")
        .field("x", FieldType::Int)
        .field("link", FieldType::Ref)
        .copier(Arc::new(DoublingCopier))
        .build();
    let a = Obj::zeroed(&class)?;
    a.set("x", 5)?;

    let c = obj(Cloner::new().deep_clone(&Value::from(&a))?)?;
    assert_eq!(c.get("x")?, Value::Int(10));
    Ok(())
}

#[test]
fn broken_copiers_are_reported_as_mismatches() -> deepgraph::Result<()> {
    for broken in [
        Broken::NoRegister,
        Broken::RegisterTwice,
        Broken::ReturnOther,
        Broken::RegisterOriginal,
    ] {
        let class = custom_class("Broken");
        let a = Obj::zeroed(&class)?;
        let label = format!("{broken:?}");
        let cloner = Cloner::builder().copier(&class, Arc::new(broken)).build()?;
        let detail = mismatch(cloner.deep_clone(&Value::from(&a)));
        assert!(!detail.is_empty(), "{label}");
    }
    Ok(())
}

#[test]
fn copier_reaching_its_original_before_registering_fails_cleanly() -> deepgraph::Result<()> {
    let class = custom_class("Eager");
    let a = Obj::zeroed(&class)?;
    a.set("link", &a)?;

    for (mode, cloner) in all_modes(|b| b.copier(&class, Arc::new(Broken::RecurseFirst)))? {
        let detail = mismatch(cloner.deep_clone(&Value::from(&a)));
        assert!(detail.contains("before its clone was registered"), "{mode}: {detail}");
    }

    // Without a cycle, copying children first is fine.
    let b = Obj::zeroed(&class)?;
    let leaf = Obj::zeroed(&class)?;
    b.set("link", &leaf)?;
    let cloner = Cloner::builder().copier(&class, Arc::new(Broken::RecurseFirst)).build()?;
    let c = obj(cloner.deep_clone(&Value::from(&b))?)?;
    assert!(c.get("link")?.as_obj().is_some_and(|l| !l.ptr_eq(&leaf)));
    Ok(())
}

#[test]
fn copier_errors_propagate() -> deepgraph::Result<()> {
    let class = custom_class("Failing");
    let a = Obj::zeroed(&class)?;
    let cloner = Cloner::builder().copier(&class, Arc::new(Broken::Fail)).build()?;
    let err = cloner.deep_clone(&Value::from(&a));
    assert!(matches!(err, Err(CloneError::Copier { ref message, .. }) if message == "refused"));
    Ok(())
}

#[test]
fn copier_registration_conflicts() {
    let class = node_class();
    let err = Cloner::builder()
        .copier(&class, Arc::new(DoublingCopier))
        .copier(&class, Arc::new(DoublingCopier))
        .build();
    assert!(err.is_err_and(|e| e.is_configuration()));

    let err = Cloner::builder()
        .type_action(&class, CopyAction::Original)
        .copier(&class, Arc::new(DoublingCopier))
        .build();
    assert!(err.is_err_and(|e| e.is_configuration()));

    let err = Cloner::builder()
        .shallow(&class)
        .type_action(&class, CopyAction::Null)
        .build();
    assert!(err.is_err_and(|e| e.is_configuration()));
}

// --- SHALLOW, ARRAYS, COLLECTIONS ---

#[test]
fn shallow_class_shares_members() -> deepgraph::Result<()> {
    let class = node_class();
    let n = node(&class, 1, "n")?;
    let next = node(&class, 2, "next")?;
    n.set("next", &next)?;

    let cloner = Cloner::builder().shallow(&class).build()?;
    let c = obj(cloner.deep_clone(&Value::from(&n))?)?;
    assert!(!c.ptr_eq(&n));
    assert_eq!(c.get("next")?, Value::from(&next));
    assert_eq!(c.get("value")?, Value::Int(1));
    Ok(())
}

#[test]
fn primitive_arrays_are_copied_shallowly() -> deepgraph::Result<()> {
    let ints = Obj::with_elements(&well_known::int_array(), vec![Value::Int(1), Value::Int(2)]);
    let cloner = Cloner::new();
    let c = obj(cloner.deep_clone(&Value::from(&ints))?)?;

    assert!(!c.ptr_eq(&ints));
    assert_eq!(c.elements(), ints.elements());
    assert!(matches!(
        cloner.registry().strategy_for_type(&well_known::int_array())?,
        Strategy::Shallow
    ));
    Ok(())
}

#[test]
fn arrays_of_immutable_sealed_elements_are_shallow() -> deepgraph::Result<()> {
    let money = ClassRef::record("Money")
        .field("cents", FieldType::Int)
        .sealed()
        .immutable()
        .build();
    let open = ClassRef::record("Open").field("cents", FieldType::Int).build();
    let wallet = ClassRef::array("Money[]", ElementType::Class(money)).build();
    let bag = ClassRef::array("Open[]", ElementType::Class(open)).build();

    let cloner = Cloner::new();
    assert_eq!(cloner.registry().strategy_for_type(&wallet)?.name(), "shallow");
    assert_eq!(cloner.registry().strategy_for_type(&bag)?.name(), "array");
    Ok(())
}

#[test]
fn object_arrays_copy_every_element() -> deepgraph::Result<()> {
    let class = node_class();
    let n = node(&class, 1, "n")?;
    let array = Obj::with_elements(&well_known::object_array(), vec![Value::from(&n), Value::Null]);
    array.push(&array)?;

    for (mode, cloner) in all_modes(|b| b)? {
        let c = obj(cloner.deep_clone(&Value::from(&array))?)?;
        assert_eq!(c.len(), 3, "{mode}");
        assert!(c.element(0).is_some_and(|v| v != Value::from(&n)), "{mode}");
        assert_eq!(c.element(1), Some(Value::Null), "{mode}");
        assert_eq!(c.element(2), Some(Value::from(&c)), "{mode}");
    }
    Ok(())
}

#[test]
fn sets_are_deduplicated_after_copying() -> deepgraph::Result<()> {
    let class = node_class();
    let set = Obj::with_elements(&well_known::set(), Vec::new());
    set.push(node(&class, 1, "a")?)?;
    set.push(node(&class, 2, "b")?)?;
    set.push(Value::Int(7))?;
    assert_eq!(set.len(), 3);

    let cloner = Cloner::builder().type_action(&class, CopyAction::Null).build()?;
    let c = obj(cloner.deep_clone(&Value::from(&set))?)?;
    assert_eq!(c.elements(), vec![Value::Null, Value::Int(7)]);
    Ok(())
}

#[test]
fn maps_merge_keys_that_copy_to_the_same_clone() -> deepgraph::Result<()> {
    let class = node_class();
    let (k1, k2, target) = (node(&class, 1, "k1")?, node(&class, 2, "k2")?, node(&class, 0, "k")?);
    let map = Obj::with_entries(&well_known::map(), Vec::new());
    map.insert(&k1, "first")?;
    map.insert(&k2, "second")?;
    map.insert("plain", 3)?;

    let cloner = Cloner::builder().clone_of(&k1, &target).clone_of(&k2, &target).build()?;
    let c = obj(cloner.deep_clone(&Value::from(&map))?)?;
    assert_eq!(c.len(), 2);
    assert_eq!(c.lookup(&Value::from(&target)), Some(Value::from("second")));
    assert_eq!(c.lookup(&Value::from("plain")), Some(Value::Int(3)));
    Ok(())
}

#[test]
fn large_sets_keep_distinct_scalars_and_merge_shared_clones() -> deepgraph::Result<()> {
    const COUNT: i64 = 20_000;

    let class = node_class();
    let (k1, k2, target) = (node(&class, 1, "k1")?, node(&class, 2, "k2")?, node(&class, 0, "t")?);
    let mut items: Vec<Value> = (0..COUNT).map(Value::Int).collect();
    items.extend([
        Value::from("x"),
        Value::from("x"),
        Value::Float(f64::NAN),
        Value::Float(f64::NAN),
        Value::Float(1.5),
        Value::Float(1.5),
        Value::from(&k1),
        Value::from(&k2),
        Value::Int(0),
    ]);
    let set = Obj::with_elements(&well_known::set(), items);

    let cloner = Cloner::builder().clone_of(&k1, &target).clone_of(&k2, &target).build()?;
    let c = obj(cloner.deep_clone(&Value::from(&set))?)?;
    let elements = c.elements();

    // "x" once, NaN twice (never equal to itself), 1.5 once, the shared clone once.
    assert_eq!(elements.len(), COUNT as usize + 5);
    assert_eq!(elements.first(), Some(&Value::Int(0)));
    assert_eq!(elements.last(), Some(&Value::from(&target)));
    Ok(())
}

#[test]
fn empty_singletons_are_kept_by_reference() -> deepgraph::Result<()> {
    let class = node_class();
    let n = node(&class, 1, "n")?;
    n.set("next", well_known::empty_list())?;
    n.set("peer", well_known::empty_map())?;

    let c = obj(Cloner::new().deep_clone(&Value::from(&n))?)?;
    assert_eq!(c.get("next")?, Value::from(well_known::empty_list()));
    assert_eq!(c.get("peer")?, Value::from(well_known::empty_map()));
    Ok(())
}

#[test]
fn seeded_pairs_replace_copying() -> deepgraph::Result<()> {
    let class = node_class();
    let a = node(&class, 1, "a")?;
    let fixed = node(&class, 2, "fixed")?;
    let replacement = node(&class, 3, "r")?;
    a.set("next", &fixed)?;
    a.set("peer", &a)?;

    let cloner = Cloner::builder().clone_of(&fixed, &replacement).singleton(&a).build()?;
    assert_eq!(cloner.deep_clone(&Value::from(&a))?, Value::from(&a));

    let root = list_of(vec![Value::from(&fixed)]);
    let c = obj(cloner.deep_clone(&Value::from(&root))?)?;
    assert_eq!(c.element(0), Some(Value::from(&replacement)));

    let dup = Cloner::builder().singleton(&a).clone_of(&a, &fixed).build();
    assert!(dup.is_err_and(|e| e.is_configuration()));
    Ok(())
}

// --- STRUCTURAL COPIES ---

#[test]
fn inherited_members_are_copied_and_empty_levels_collapse() -> deepgraph::Result<()> {
    let base = ClassRef::record("Base").field("id", FieldType::Int).build();
    let middle = ClassRef::record("Middle")
        .extends(&base)
        .static_field("count", FieldType::Int)
        .build();
    let leaf = ClassRef::record("Leaf").extends(&middle).field("child", FieldType::Ref).build();

    let l = Obj::zeroed(&leaf)?;
    let child = Obj::zeroed(&base)?;
    l.set("id", 11)?;
    l.set("child", &child)?;

    let cloner = Cloner::new();
    let c = obj(cloner.deep_clone(&Value::from(&l))?)?;
    assert_eq!(c.get("id")?, Value::Int(11));
    assert!(c.get("child")?.as_obj().is_some_and(|o| !o.ptr_eq(&child)));
    assert!(deep_eq(&Value::from(&l), &Value::from(&c)));

    let Strategy::Structural(copier) = cloner.registry().strategy_for_type(&leaf)? else {
        panic!("leaf should be copied structurally");
    };
    let layout = copier.layout().cloned().ok_or_else(|| CloneError::Internal("no layout".into()))?;
    assert_eq!(layout.depth(), 2);
    assert_eq!(layout.class_name(), "Leaf");
    assert_eq!(layout.parent().map(|p| p.class_name()), Some("Base"));
    Ok(())
}

#[test]
fn static_members_are_not_instance_state() -> deepgraph::Result<()> {
    let class = ClassRef::record("Counter")
        .static_field("total", FieldType::Int)
        .field("n", FieldType::Int)
        .build();
    let c = Obj::zeroed(&class)?;
    c.set("n", 3)?;
    assert_eq!(c.len(), 1);

    let total = class
        .member("total")
        .cloned()
        .ok_or_else(|| CloneError::Internal("no member".into()))?;
    assert!(matches!(ModelIntrospector.get(&total, &c), Err(CloneError::MemberAccess { .. })));

    let copy = obj(Cloner::new().deep_clone(&Value::from(&c))?)?;
    assert_eq!(copy.get("n")?, Value::Int(3));
    Ok(())
}

#[test]
fn opaque_types_need_a_custom_copier() -> deepgraph::Result<()> {
    let socket = ClassRef::opaque("Socket").build();
    let s = Obj::new(&socket, deepgraph::model::ObjState::Opaque);

    let err = Cloner::new().deep_clone(&Value::from(&s));
    assert!(err.is_err_and(|e| e.is_configuration()));

    let cloner = Cloner::builder().type_action(&socket, CopyAction::Original).build()?;
    assert_eq!(cloner.deep_clone(&Value::from(&s))?, Value::from(&s));
    Ok(())
}

// --- INSTANTIATION ---

fn session_class() -> ClassRef {
    ClassRef::record("Session")
        .field("token", FieldType::Str)
        .field("hits", FieldType::Int)
        .constructor(|s: &Obj| s.set("token", "fresh"))
        .build()
}

#[test]
fn constructor_instantiation_runs_the_constructor() -> deepgraph::Result<()> {
    let class = session_class();
    let s = Obj::zeroed(&class)?;
    s.set("token", "secret")?;
    s.set("hits", 4)?;

    let with_ctor = Cloner::builder()
        .instantiation(InstantiationStrategy::Constructor)
        .member_action(&class, "token", CopyAction::Skip)
        .build()?;
    let c = obj(with_ctor.deep_clone(&Value::from(&s))?)?;
    assert_eq!(c.get("token")?.as_str(), Some("fresh"));
    assert_eq!(c.get("hits")?, Value::Int(4));

    let bypass = Cloner::builder().member_action(&class, "token", CopyAction::Skip).build()?;
    let c = obj(bypass.deep_clone(&Value::from(&s))?)?;
    assert!(c.get("token")?.is_null());
    Ok(())
}

#[test]
fn constructor_instantiation_requires_a_constructor() -> deepgraph::Result<()> {
    let class = node_class();
    let n = node(&class, 1, "n")?;

    let strict = Cloner::builder().instantiation(InstantiationStrategy::Constructor).build()?;
    let err = strict.deep_clone(&Value::from(&n));
    assert!(matches!(err, Err(CloneError::Configuration(ref msg)) if msg.contains("Node")));

    let lenient = Cloner::builder()
        .instantiation(InstantiationStrategy::ConstructorThenBypass)
        .build()?;
    assert!(lenient.deep_clone(&Value::from(&n)).is_ok());
    Ok(())
}

#[test]
fn failing_constructor_falls_back_to_bypass() -> deepgraph::Result<()> {
    let class = ClassRef::record("Fragile")
        .field("v", FieldType::Int)
        .constructor(|_: &Obj| Err(CloneError::copier("Fragile", "constructor failed")))
        .build();
    let f = Obj::zeroed(&class)?;
    f.set("v", 8)?;

    let lenient = Cloner::builder()
        .instantiation(InstantiationStrategy::ConstructorThenBypass)
        .build()?;
    let c = obj(lenient.deep_clone(&Value::from(&f))?)?;
    assert_eq!(c.get("v")?, Value::Int(8));

    let strict = Cloner::builder().instantiation(InstantiationStrategy::Constructor).build()?;
    assert!(matches!(
        strict.deep_clone(&Value::from(&f)),
        Err(CloneError::Copier { .. })
    ));
    Ok(())
}
