#![allow(dead_code)]

use std::collections::{HashMap, HashSet};

use deepgraph::model::{ClassRef, FieldType, Obj, ObjState, Value, well_known};
use deepgraph::{CloneError, Cloner, ClonerBuilder, TraversalOrder};

/// Routes library logs to the test writer; only the first call installs the subscriber.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_max_level(tracing::Level::DEBUG)
        .with_test_writer()
        .try_init();
}

// --- FIXTURE CLASSES ---

/// `Node { value: Int, label: Str, next: Ref, peer: Ref }`
pub fn node_class() -> ClassRef {
    ClassRef::record("Node")
        .field("value", FieldType::Int)
        .field("label", FieldType::Str)
        .field("next", FieldType::Ref)
        .field("peer", FieldType::Ref)
        .build()
}

/// `Holder { self_ref: Ref, list: Ref }`
pub fn holder_class() -> ClassRef {
    ClassRef::record("Holder")
        .field("self_ref", FieldType::Ref)
        .field("list", FieldType::Ref)
        .build()
}

pub fn node(class: &ClassRef, value: i64, label: &str) -> deepgraph::Result<Obj> {
    let n = Obj::zeroed(class)?;
    n.set("value", value)?;
    n.set("label", label)?;
    Ok(n)
}

pub fn list_of(items: Vec<Value>) -> Obj {
    Obj::with_elements(&well_known::list(), items)
}

pub fn obj(value: Value) -> deepgraph::Result<Obj> {
    value
        .as_obj()
        .cloned()
        .ok_or_else(|| {
            CloneError::Internal(format!("expected an object, got {}", value.type_name()))
        })
}

// --- CLONERS ---

/// One cloner per execution mode, each configured by `configure`.
pub fn all_modes(
    configure: impl Fn(ClonerBuilder) -> ClonerBuilder,
) -> deepgraph::Result<Vec<(&'static str, Cloner)>> {
    Ok(vec![
        ("recursive", configure(Cloner::builder().recursive()).build()?),
        (
            "depth_first",
            configure(Cloner::builder().sequential(TraversalOrder::DepthFirst)).build()?,
        ),
        (
            "breadth_first",
            configure(Cloner::builder().sequential(TraversalOrder::BreadthFirst)).build()?,
        ),
        ("parallel", configure(Cloner::builder().parallel_threads(4)).build()?),
    ])
}

// --- GRAPH BUILDERS ---

/// Node edges: `(value, label, next, peer, items)`; indices out of range mean `Null`.
pub type NodeSpec = (i64, String, usize, usize, Vec<usize>);

/// Builds a graph from `specs` and returns its first node. `items` become a list held in
/// `peer` when `peer` is out of range.
pub fn build_graph(class: &ClassRef, specs: &[NodeSpec]) -> deepgraph::Result<Value> {
    let nodes = specs
        .iter()
        .map(|(value, label, ..)| node(class, *value, label))
        .collect::<deepgraph::Result<Vec<_>>>()?;
    let at = |i: usize| nodes.get(i).map(Value::from).unwrap_or_default();

    for (n, (_, _, next, peer, items)) in nodes.iter().zip(specs) {
        n.set("next", at(*next))?;
        if *peer < nodes.len() {
            n.set("peer", at(*peer))?;
        } else if !items.is_empty() {
            n.set("peer", list_of(items.iter().map(|i| at(*i)).collect()))?;
        }
    }
    Ok(nodes.first().map(Value::from).unwrap_or_default())
}

/// `count` nodes linked through `next`, the last one pointing back to the first.
pub fn ring(class: &ClassRef, count: usize) -> deepgraph::Result<Obj> {
    let nodes = (0..count)
        .map(|i| node(class, i as i64, "ring"))
        .collect::<deepgraph::Result<Vec<_>>>()?;
    for (i, n) in nodes.iter().enumerate() {
        n.set("next", &nodes[(i + 1) % count])?;
    }
    Ok(nodes[0].clone())
}

// --- GRAPH INSPECTION ---

/// Every object reachable from `root`, each once.
pub fn reachable(root: &Value) -> Vec<Obj> {
    let mut seen = HashSet::new();
    let mut out = Vec::new();
    let mut stack = vec![root.clone()];
    while let Some(value) = stack.pop() {
        let Value::Obj(o) = value else { continue };
        if !seen.insert(o.addr()) {
            continue;
        }
        match o.snapshot() {
            ObjState::Fields(values) | ObjState::Elements(values) => stack.extend(values),
            ObjState::Entries(entries) => {
                for (k, v) in entries {
                    stack.push(k);
                    stack.push(v);
                }
            }
            ObjState::Variant(_) | ObjState::Opaque => {}
        }
        out.push(o);
    }
    out
}

/// `true` when no object is reachable from both `a` and `b`.
pub fn disjoint(a: &Value, b: &Value) -> bool {
    let left: HashSet<usize> = reachable(a).iter().map(Obj::addr).collect();
    reachable(b).iter().all(|o| !left.contains(&o.addr()))
}

/// Structural equality up to a bijection between objects: same classes, same scalars, and
/// the same aliasing and cycle structure.
pub fn deep_eq(a: &Value, b: &Value) -> bool {
    let mut forward: HashMap<usize, usize> = HashMap::new();
    let mut backward: HashMap<usize, usize> = HashMap::new();
    let mut stack = vec![(a.clone(), b.clone())];

    while let Some((x, y)) = stack.pop() {
        let (ox, oy) = match (&x, &y) {
            (Value::Obj(ox), Value::Obj(oy)) => (ox, oy),
            _ if x == y => continue,
            _ => return false,
        };

        match (forward.get(&ox.addr()), backward.get(&oy.addr())) {
            (Some(fy), Some(bx)) if *fy == oy.addr() && *bx == ox.addr() => continue,
            (None, None) => {}
            _ => return false,
        }
        if ox.class() != oy.class() {
            return false;
        }
        forward.insert(ox.addr(), oy.addr());
        backward.insert(oy.addr(), ox.addr());

        match (ox.snapshot(), oy.snapshot()) {
            (ObjState::Fields(l), ObjState::Fields(r))
            | (ObjState::Elements(l), ObjState::Elements(r)) => {
                if l.len() != r.len() {
                    return false;
                }
                stack.extend(l.into_iter().zip(r));
            }
            (ObjState::Entries(l), ObjState::Entries(r)) => {
                if l.len() != r.len() {
                    return false;
                }
                for ((lk, lv), (rk, rv)) in l.into_iter().zip(r) {
                    stack.push((lk, rk));
                    stack.push((lv, rv));
                }
            }
            (ObjState::Variant(l), ObjState::Variant(r)) if l == r => {}
            (ObjState::Opaque, ObjState::Opaque) => {}
            _ => return false,
        }
    }
    true
}
