// Copyright 2025 the Canopy Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! The update pipeline: offset/opacity propagation, culling, the data
//! partition, layout solving and the dirty-state law.

mod common;

use std::cell::RefCell;
use std::rc::Rc;

use canopy_core::{
    DataHandle, Layer, LayerFeatures, Layouter, NodeFlags, NodeHandle, Ui, UserInterfaceStates,
};
use common::{ShiftLayouter, TestLayer, TestRenderer};
use kurbo::{Size, Vec2};

fn ui() -> Ui {
    Ui::with_size(Size::new(100.0, 100.0)).unwrap()
}

fn node(ui: &mut Ui, parent: Option<NodeHandle>, offset: Vec2, size: Size) -> NodeHandle {
    ui.create_node(parent, offset, size, NodeFlags::empty())
        .unwrap()
}

struct InstalledLayer {
    handle: canopy_core::LayerHandle,
    #[allow(dead_code)]
    log: Rc<RefCell<Vec<common::Delivered>>>,
    updates: Rc<RefCell<Vec<Vec<u32>>>>,
    opacities: Rc<RefCell<Vec<Vec<f32>>>>,
}

fn event_layer(ui: &mut Ui) -> InstalledLayer {
    let handle = ui.create_layer(None).unwrap();
    let log = Rc::new(RefCell::new(Vec::new()));
    let instance = TestLayer::new(handle, log.clone());
    let updates = instance.updates.clone();
    let opacities = instance.seen_opacities.clone();
    ui.set_layer_instance(Box::new(instance)).unwrap();
    InstalledLayer {
        handle,
        log,
        updates,
        opacities,
    }
}

fn attach(ui: &mut Ui, layer: canopy_core::LayerHandle, node: NodeHandle) -> DataHandle {
    let data = ui
        .layer_mut(layer)
        .unwrap()
        .common_mut()
        .create_data(Some(node))
        .unwrap();
    DataHandle::new(layer, data)
}

#[test]
fn state_is_clean_after_update() {
    let mut ui = ui();
    let root = node(&mut ui, None, Vec2::new(10.0, 10.0), Size::new(30.0, 30.0));
    assert!(
        ui.state()
            .contains(UserInterfaceStates::NEEDS_NODE_UPDATE)
    );

    ui.update().unwrap();
    assert!(ui.state().is_empty());

    // Mutations re-dirty exactly their slice of the lattice.
    ui.set_node_offset(root, Vec2::new(5.0, 5.0)).unwrap();
    let state = ui.state();
    assert!(state.contains(UserInterfaceStates::NEEDS_LAYOUT_UPDATE));
    assert!(!state.contains(UserInterfaceStates::NEEDS_LAYOUT_ASSIGNMENT_UPDATE));

    ui.update().unwrap();
    assert!(ui.state().is_empty());
}

#[test]
fn absolute_offsets_and_opacities() {
    let mut ui = ui();
    let a = node(&mut ui, None, Vec2::new(10.0, 20.0), Size::new(50.0, 50.0));
    let b = node(&mut ui, Some(a), Vec2::new(5.0, 5.0), Size::new(20.0, 20.0));
    let c = node(&mut ui, Some(b), Vec2::new(1.0, 2.0), Size::new(10.0, 10.0));
    ui.set_node_opacity(a, 0.5).unwrap();
    ui.set_node_opacity(c, 0.5).unwrap();

    let layer = event_layer(&mut ui);
    attach(&mut ui, layer.handle, c);
    ui.update().unwrap();

    // Absolute opacity is the product along the parent chain:
    // 0.5 * 1.0 * 0.5.
    assert_eq!(layer.opacities.borrow().last().unwrap(), &[0.25]);

    // The event position math exposes the absolute offset of c:
    // 10+5+1 = 16, 20+5+2 = 27.
    let mut event = canopy_core::PointerMoveEvent::new(core::time::Duration::ZERO, None, true);
    assert!(
        ui.pointer_move_event(kurbo::Point::new(16.5, 27.5), &mut event)
            .unwrap()
    );
    assert_eq!(ui.current_hovered_node(), Some(c));
    let mut outside = canopy_core::PointerMoveEvent::new(core::time::Duration::ZERO, None, true);
    ui.pointer_move_event(kurbo::Point::new(15.0, 26.0), &mut outside)
        .unwrap();
    assert_eq!(ui.current_hovered_node(), None);
}

#[test]
fn hidden_subtrees_are_excluded() {
    let mut ui = ui();
    let a = node(&mut ui, None, Vec2::ZERO, Size::new(50.0, 50.0));
    let b = node(&mut ui, Some(a), Vec2::ZERO, Size::new(50.0, 50.0));
    let layer = event_layer(&mut ui);
    attach(&mut ui, layer.handle, b);
    ui.update().unwrap();
    assert_eq!(layer.updates.borrow().last().unwrap().len(), 1);

    ui.add_node_flags(a, NodeFlags::HIDDEN).unwrap();
    ui.update().unwrap();
    assert!(layer.updates.borrow().last().unwrap().is_empty());
}

#[test]
fn culled_data_are_not_partitioned() {
    let mut ui = ui();
    let clip = ui
        .create_node(
            None,
            Vec2::new(10.0, 10.0),
            Size::new(20.0, 20.0),
            NodeFlags::CLIP,
        )
        .unwrap();
    // Inside the clip rect.
    let inside = node(&mut ui, Some(clip), Vec2::new(5.0, 5.0), Size::new(5.0, 5.0));
    // Entirely outside the clip rect.
    let outside = node(
        &mut ui,
        Some(clip),
        Vec2::new(100.0, 100.0),
        Size::new(5.0, 5.0),
    );
    let layer = event_layer(&mut ui);
    let inside_data = attach(&mut ui, layer.handle, inside);
    attach(&mut ui, layer.handle, outside);
    ui.update().unwrap();
    assert_eq!(
        layer.updates.borrow().last().unwrap(),
        &[inside_data.data().index()]
    );
}

#[test]
fn layouter_solves_masked_hierarchy() {
    let mut ui = ui();
    let parent = node(&mut ui, None, Vec2::new(10.0, 10.0), Size::new(40.0, 40.0));
    let child = node(&mut ui, Some(parent), Vec2::ZERO, Size::new(10.0, 10.0));

    let layouter = ui.create_layouter(None).unwrap();
    let mut instance = ShiftLayouter::new(layouter, Vec2::new(3.0, 0.0));
    let calls = instance.calls.clone();
    let parent_layout = instance.common_mut().add(parent).unwrap();
    instance.common_mut().add(child).unwrap();
    ui.set_layouter_instance(Box::new(instance)).unwrap();

    let layer = event_layer(&mut ui);
    attach(&mut ui, layer.handle, child);
    ui.update().unwrap();

    // The child's layout joins the parent's group: one call, both masked.
    assert_eq!(
        calls.borrow().as_slice(),
        [(vec![parent_layout.index()], 2)]
    );

    // Post-layout, child sits at (10+3)+(0+3) = 16 absolute.
    let mut event = canopy_core::PointerMoveEvent::new(core::time::Duration::ZERO, None, true);
    ui.pointer_move_event(kurbo::Point::new(16.5, 10.5), &mut event)
        .unwrap();
    assert_eq!(ui.current_hovered_node(), Some(child));
}

#[test]
fn dependent_layouters_run_in_level_order() {
    let mut ui = ui();
    let parent = node(&mut ui, None, Vec2::ZERO, Size::new(40.0, 40.0));
    let child = node(&mut ui, Some(parent), Vec2::ZERO, Size::new(10.0, 10.0));

    let first = ui.create_layouter(None).unwrap();
    let second = ui.create_layouter(None).unwrap();
    let mut first_instance = ShiftLayouter::new(first, Vec2::new(1.0, 0.0));
    let mut second_instance = ShiftLayouter::new(second, Vec2::new(2.0, 0.0));
    let first_calls = first_instance.calls.clone();
    let second_calls = second_instance.calls.clone();
    first_instance.common_mut().add(parent).unwrap();
    second_instance.common_mut().add(child).unwrap();
    ui.set_layouter_instance(Box::new(first_instance)).unwrap();
    ui.set_layouter_instance(Box::new(second_instance)).unwrap();

    ui.update().unwrap();
    assert_eq!(first_calls.borrow().len(), 1);
    assert_eq!(second_calls.borrow().len(), 1);
}

#[test]
fn draw_drives_renderer_transitions() {
    use canopy_core::{RendererDrawStates, RendererTargetState};

    let mut ui = ui();
    let target = node(&mut ui, None, Vec2::ZERO, Size::new(50.0, 50.0));

    let renderer = TestRenderer::new();
    let transitions = renderer.transitions.clone();
    ui.set_renderer_instance(Box::new(renderer)).unwrap();

    let layer = ui.create_layer(None).unwrap();
    let log = Rc::new(RefCell::new(Vec::new()));
    let instance = TestLayer::new(layer, log)
        .with_features(LayerFeatures::DRAW_USES_BLENDING | LayerFeatures::EVENT);
    ui.set_layer_instance(Box::new(instance)).unwrap();
    attach(&mut ui, layer, target);

    ui.draw().unwrap();
    assert_eq!(
        transitions.borrow().as_slice(),
        [
            (RendererTargetState::Initial, RendererDrawStates::empty()),
            (RendererTargetState::Draw, RendererDrawStates::BLENDING),
            (RendererTargetState::Final, RendererDrawStates::empty()),
        ]
    );

    // Nothing dirty: a second draw only brackets the frame.
    transitions.borrow_mut().clear();
    ui.draw().unwrap();
    assert_eq!(
        transitions.borrow().as_slice(),
        [
            (RendererTargetState::Initial, RendererDrawStates::empty()),
            (RendererTargetState::Draw, RendererDrawStates::BLENDING),
            (RendererTargetState::Final, RendererDrawStates::empty()),
        ]
    );
}

#[test]
fn clean_prunes_orphaned_hierarchies() {
    let mut ui = ui();
    let a = node(&mut ui, None, Vec2::ZERO, Size::new(50.0, 50.0));
    let b = node(&mut ui, Some(a), Vec2::ZERO, Size::new(20.0, 20.0));
    let c = node(&mut ui, Some(b), Vec2::ZERO, Size::new(10.0, 10.0));
    let layer = event_layer(&mut ui);
    let data = attach(&mut ui, layer.handle, c);

    ui.remove_node(a).unwrap();
    assert!(ui.is_node_valid(b), "children linger until clean");
    assert!(ui.is_node_valid(c));

    ui.clean();
    assert!(!ui.is_node_valid(b));
    assert!(!ui.is_node_valid(c));
    assert!(!ui.is_data_valid(data), "attachments are pruned with them");

    // Update states survive the clean so the next update rebuilds.
    assert!(
        ui.state()
            .contains(UserInterfaceStates::NEEDS_NODE_UPDATE)
    );
    ui.update().unwrap();
    assert!(ui.state().is_empty());
}
