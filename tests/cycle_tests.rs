#![allow(missing_docs)]

mod common;

use common::{
    all_modes, deep_eq, disjoint, holder_class, init_tracing, list_of, node, node_class, obj, ring,
};
use deepgraph::model::{Obj, Value};

// --- CYCLES ---

#[test]
fn self_reference_points_to_the_clone() -> deepgraph::Result<()> {
    init_tracing();
    let class = node_class();
    let x = node(&class, 1, "x")?;
    x.set("next", &x)?;

    for (mode, cloner) in all_modes(|b| b)? {
        let y = obj(cloner.deep_clone(&Value::from(&x))?)?;
        assert!(!y.ptr_eq(&x), "{mode}: clone is the original");
        assert_eq!(y.get("next")?, Value::from(&y), "{mode}: self reference not rewired");
        assert_eq!(y.get("value")?, Value::Int(1));
        assert_eq!(y.get("label")?.as_str(), Some("x"));
    }
    Ok(())
}

#[test]
fn record_and_list_referencing_each_other() -> deepgraph::Result<()> {
    // A { self_ref = A, list = [A, list] }
    let a = Obj::zeroed(&holder_class())?;
    let list = list_of(vec![Value::from(&a)]);
    list.push(&list)?;
    a.set("self_ref", &a)?;
    a.set("list", &list)?;

    for (mode, cloner) in all_modes(|b| b)? {
        let a2 = obj(cloner.deep_clone(&Value::from(&a))?)?;
        let list2 = obj(a2.get("list")?)?;

        assert_eq!(a2.get("self_ref")?, Value::from(&a2), "{mode}");
        assert!(!list2.ptr_eq(&list), "{mode}: list was shared");
        assert_eq!(list2.len(), 2, "{mode}");
        assert_eq!(list2.element(0), Some(Value::from(&a2)), "{mode}");
        assert_eq!(list2.element(1), Some(Value::from(&list2)), "{mode}");
    }
    Ok(())
}

#[test]
fn mutual_references_survive_every_mode() -> deepgraph::Result<()> {
    let class = node_class();
    let a = node(&class, 1, "a")?;
    let b = node(&class, 2, "b")?;
    a.set("next", &b)?;
    a.set("peer", &b)?;
    b.set("next", &a)?;

    for (mode, cloner) in all_modes(|b| b)? {
        let a2 = obj(cloner.deep_clone(&Value::from(&a))?)?;
        let b2 = obj(a2.get("next")?)?;
        assert!(!b2.ptr_eq(&b), "{mode}");
        assert_eq!(a2.get("peer")?, Value::from(&b2), "{mode}: aliasing lost");
        assert_eq!(b2.get("next")?, Value::from(&a2), "{mode}: cycle lost");
    }
    Ok(())
}

#[test]
fn long_rings_do_not_need_a_deep_stack() -> deepgraph::Result<()> {
    let class = node_class();
    let first = ring(&class, 20_000)?;
    let root = Value::from(&first);

    for (mode, cloner) in all_modes(|b| b)? {
        if mode == "recursive" {
            continue;
        }
        let copy = cloner.deep_clone(&root)?;
        assert!(deep_eq(&root, &copy), "{mode}");
        assert!(disjoint(&root, &copy), "{mode}");
    }
    Ok(())
}

// --- IDENTITY ---

#[test]
fn shared_references_map_to_one_clone() -> deepgraph::Result<()> {
    let class = node_class();
    let shared = node(&class, 7, "shared")?;
    let left = node(&class, 1, "left")?;
    let right = node(&class, 2, "right")?;
    left.set("next", &shared)?;
    right.set("next", &shared)?;
    let root = list_of(vec![Value::from(&left), Value::from(&right), Value::from(&shared)]);

    for (mode, cloner) in all_modes(|b| b)? {
        let copy = obj(cloner.deep_clone(&Value::from(&root))?)?;
        let shared2 = copy.element(2).unwrap_or_default();
        let left2 = obj(copy.element(0).unwrap_or_default())?;
        let right2 = obj(copy.element(1).unwrap_or_default())?;

        assert_ne!(shared2, Value::from(&shared), "{mode}");
        assert_eq!(left2.get("next")?, shared2, "{mode}");
        assert_eq!(right2.get("next")?, shared2, "{mode}");
    }
    Ok(())
}

#[test]
fn equal_but_distinct_objects_stay_distinct() -> deepgraph::Result<()> {
    let class = node_class();
    let one = node(&class, 5, "same")?;
    let two = node(&class, 5, "same")?;
    let root = list_of(vec![Value::from(&one), Value::from(&two)]);

    let copy = obj(deepgraph::Cloner::new().deep_clone(&Value::from(&root))?)?;
    let (c1, c2) = (copy.element(0).unwrap_or_default(), copy.element(1).unwrap_or_default());
    assert_ne!(c1, c2);
    assert!(deep_eq(&c1, &c2));
    Ok(())
}

#[test]
fn clone_is_independent_of_the_original() -> deepgraph::Result<()> {
    let class = node_class();
    let a = node(&class, 1, "a")?;
    let b = node(&class, 2, "b")?;
    a.set("next", &b)?;

    let a2 = deepgraph::Cloner::new()
        .deep_clone_obj(&a)?
        .ok_or_else(|| deepgraph::CloneError::Internal("nulled".into()))?;
    let b2 = obj(a2.get("next")?)?;
    b2.set("value", 99)?;
    a2.set("label", "changed")?;

    assert_eq!(b.get("value")?, Value::Int(2));
    assert_eq!(a.get("label")?.as_str(), Some("a"));
    assert!(disjoint(&Value::from(&a), &Value::from(&a2)));
    Ok(())
}

#[test]
fn scalars_come_back_unchanged() -> deepgraph::Result<()> {
    let cloner = deepgraph::Cloner::new();
    for value in [
        Value::Null,
        Value::Bool(true),
        Value::Int(-3),
        Value::Float(1.5),
        Value::Char('z'),
        Value::from("text"),
    ] {
        assert_eq!(cloner.deep_clone(&value)?, value);
    }
    Ok(())
}
