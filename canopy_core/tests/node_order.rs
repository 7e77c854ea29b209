// Copyright 2025 the Canopy Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Top-level node ordering: the cyclic chain, nested ranges, clearing,
//! flattening and the unsupported-nesting rejection.

use canopy_core::{Error, NodeFlags, NodeHandle, Ui};
use kurbo::{Size, Vec2};

fn ui() -> Ui {
    Ui::with_size(Size::new(100.0, 100.0)).unwrap()
}

fn root(ui: &mut Ui) -> NodeHandle {
    ui.create_node(None, Vec2::ZERO, Size::new(10.0, 10.0), NodeFlags::empty())
        .unwrap()
}

fn child(ui: &mut Ui, parent: NodeHandle) -> NodeHandle {
    ui.create_node(
        Some(parent),
        Vec2::ZERO,
        Size::new(10.0, 10.0),
        NodeFlags::empty(),
    )
    .unwrap()
}

fn order(ui: &Ui) -> Vec<NodeHandle> {
    let mut out = Vec::new();
    let mut current = ui.node_order_first();
    while let Some(node) = current {
        out.push(node);
        current = ui.node_order_next(node).unwrap();
    }
    out
}

#[test]
fn root_nodes_are_ordered_in_creation_order() {
    let mut ui = ui();
    let a = root(&mut ui);
    let b = root(&mut ui);
    let c = root(&mut ui);
    assert_eq!(order(&ui), [a, b, c]);
    assert_eq!(ui.node_order_first(), Some(a));
    assert_eq!(ui.node_order_last(), Some(c));
    assert!(ui.is_node_top_level(a).unwrap());
    assert!(ui.is_node_ordered(a).unwrap());
}

#[test]
fn reorder_clear_and_reinsert() {
    let mut ui = ui();
    let a = root(&mut ui);
    let b = root(&mut ui);
    let c = root(&mut ui);

    // Moving to the back of the order draws the node front-most.
    ui.set_node_order(a, None).unwrap();
    assert_eq!(order(&ui), [b, c, a]);

    // Clearing hides but keeps the node top-level.
    ui.clear_node_order(b).unwrap();
    assert_eq!(order(&ui), [c, a]);
    assert_eq!(ui.node_order_first(), Some(c));
    assert_eq!(ui.node_order_last(), Some(a));
    assert!(ui.is_node_top_level(b).unwrap());
    assert!(!ui.is_node_ordered(b).unwrap());

    // Reinserting behind c puts b back in front of it in draw order,
    // i.e. earlier in the chain.
    ui.set_node_order(b, Some(c)).unwrap();
    assert_eq!(order(&ui), [b, c, a]);
}

#[test]
fn clearing_the_only_root_empties_the_order() {
    let mut ui = ui();
    let a = root(&mut ui);
    ui.clear_node_order(a).unwrap();
    assert_eq!(ui.node_order_first(), None);
    assert!(order(&ui).is_empty());

    ui.set_node_order(a, None).unwrap();
    assert_eq!(order(&ui), [a]);
}

#[test]
fn nested_top_level_ranges() {
    let mut ui = ui();
    let a = root(&mut ui);
    let inner = child(&mut ui, a);
    let b = root(&mut ui);

    // Making a nested node top-level inserts it after its nearest
    // top-level ancestor, inside [a .. a.last_nested].
    ui.set_node_order(inner, None).unwrap();
    assert_eq!(order(&ui), [a, inner, b]);
    assert_eq!(ui.node_order_last_nested(a).unwrap(), inner);
    assert_eq!(ui.node_order_last_nested(inner).unwrap(), inner);
    assert_eq!(ui.node_order_last_nested(b).unwrap(), b);

    // Reordering the parent drags the whole nested range along.
    ui.set_node_order(a, None).unwrap();
    assert_eq!(order(&ui), [b, a, inner]);

    // Flattening keeps nested top-level nodes connected in place.
    ui.flatten_node_order(inner).unwrap();
    assert_eq!(order(&ui), [b, a]);
    assert!(!ui.is_node_top_level(inner).unwrap());
    assert_eq!(ui.node_order_last_nested(a).unwrap(), a);
}

#[test]
fn ordering_constraints() {
    let mut ui = ui();
    let a = root(&mut ui);
    let b = root(&mut ui);
    let inner = child(&mut ui, a);

    // Behind itself, behind an unordered node, root/non-root mismatch.
    assert_eq!(ui.set_node_order(a, Some(a)), Err(Error::InvalidHandle));
    assert_eq!(ui.set_node_order(a, Some(inner)), Err(Error::InvalidHandle));
    ui.set_node_order(inner, None).unwrap();
    assert_eq!(ui.set_node_order(a, Some(inner)), Err(Error::InvalidHandle));
    assert_eq!(ui.set_node_order(inner, Some(b)), Err(Error::InvalidHandle));

    // Flattening a root node is not a thing.
    assert_eq!(
        ui.flatten_node_order(a),
        Err(Error::IncompatibleCapabilities)
    );
}

#[test]
fn nested_order_under_new_top_level_is_rejected() {
    let mut ui = ui();
    let a = root(&mut ui);
    let middle = child(&mut ui, a);
    let leaf = child(&mut ui, middle);

    // leaf is top-level and nested under a; making middle top-level would
    // have to splice leaf's range around, which is unsupported.
    ui.set_node_order(leaf, None).unwrap();
    assert_eq!(
        ui.set_node_order(middle, None),
        Err(Error::UnsupportedNestedOrder)
    );
    // The rejected node is untouched and the order unchanged.
    assert!(!ui.is_node_top_level(middle).unwrap());
    assert_eq!(order(&ui), [a, leaf]);

    // After clearing the nested order the call goes through.
    ui.flatten_node_order(leaf).unwrap();
    ui.set_node_order(middle, None).unwrap();
    assert_eq!(order(&ui), [a, middle]);
}

#[test]
fn removing_a_top_level_parent_frees_nested_order_slots() {
    let mut ui = ui();
    let a = root(&mut ui);
    let inner = child(&mut ui, a);
    ui.set_node_order(inner, None).unwrap();
    let used = ui.node_order_used_count();

    ui.remove_node(a).unwrap();
    assert_eq!(ui.node_order_used_count(), used - 2);
    assert_eq!(ui.node_order_first(), None);

    // inner is still alive until clean() prunes the orphaned subtree.
    assert!(ui.is_node_valid(inner));
    ui.clean();
    assert!(!ui.is_node_valid(inner));
}
