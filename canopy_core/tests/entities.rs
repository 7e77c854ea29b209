// Copyright 2025 the Canopy Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Entity lifecycle: arenas, handles, instances and capacity limits.

mod common;

use std::cell::RefCell;
use std::rc::Rc;

use canopy_core::{Error, LayerFeatures, NodeFlags, Ui};
use common::{TestLayer, TestRenderer};
use kurbo::{Size, Vec2};

fn ui() -> Ui {
    Ui::with_size(Size::new(100.0, 100.0)).unwrap()
}

#[test]
fn node_handles_stay_invalid_after_removal() {
    let mut ui = ui();
    let node = ui
        .create_node(None, Vec2::ZERO, Size::new(10.0, 10.0), NodeFlags::empty())
        .unwrap();
    assert!(ui.is_node_valid(node));
    assert_eq!(ui.node_used_count(), 1);

    ui.remove_node(node).unwrap();
    assert!(!ui.is_node_valid(node));
    assert_eq!(ui.remove_node(node), Err(Error::InvalidHandle));

    // The recycled slot gets a new generation; the old handle stays dead.
    let next = ui
        .create_node(None, Vec2::ZERO, Size::new(10.0, 10.0), NodeFlags::empty())
        .unwrap();
    assert_eq!(next.index(), node.index());
    assert_eq!(next.generation(), node.generation() + 1);
    assert!(!ui.is_node_valid(node));
    assert!(ui.is_node_valid(next));
}

#[test]
fn layer_capacity_exhaustion_and_recovery() {
    let mut ui = ui();
    let mut handles = Vec::new();
    for _ in 0..256 {
        handles.push(ui.create_layer(None).unwrap());
    }
    assert_eq!(ui.create_layer(None), Err(Error::CapacityExceeded));
    assert_eq!(ui.layer_capacity(), 256);
    assert_eq!(ui.layer_used_count(), 256);

    let removed = handles[100];
    ui.remove_layer(removed).unwrap();
    let replacement = ui.create_layer(None).unwrap();
    assert_eq!(replacement.index(), removed.index());
    assert_eq!(replacement.generation(), removed.generation() + 1);
}

#[test]
fn instance_errors() {
    let mut ui = ui();
    let layer = ui.create_layer(None).unwrap();
    assert!(!ui.has_layer_instance(layer).unwrap());
    assert_eq!(ui.layer(layer).err(), Some(Error::NoInstance));

    let log = Rc::new(RefCell::new(Vec::new()));
    ui.set_layer_instance(Box::new(TestLayer::new(layer, log.clone())))
        .unwrap();
    assert!(ui.has_layer_instance(layer).unwrap());
    assert_eq!(
        ui.set_layer_instance(Box::new(TestLayer::new(layer, log))),
        Err(Error::AlreadySet)
    );
}

#[test]
fn renderer_slot() {
    let mut ui = ui();
    assert!(!ui.has_renderer_instance());
    assert_eq!(ui.renderer().err(), Some(Error::NoInstance));

    ui.set_renderer_instance(Box::new(TestRenderer::new()))
        .unwrap();
    assert!(ui.has_renderer_instance());
    assert_eq!(
        ui.set_renderer_instance(Box::new(TestRenderer::new())),
        Err(Error::AlreadySet)
    );
}

#[test]
fn compositing_layer_requires_compositing_renderer() {
    let mut ui = ui();
    ui.set_renderer_instance(Box::new(TestRenderer::new()))
        .unwrap();
    let layer = ui.create_layer(None).unwrap();
    let log = Rc::new(RefCell::new(Vec::new()));
    let instance =
        TestLayer::new(layer, log).with_features(LayerFeatures::COMPOSITE | LayerFeatures::DRAW);
    assert_eq!(
        ui.set_layer_instance(Box::new(instance)),
        Err(Error::IncompatibleCapabilities)
    );
}

#[test]
fn layer_order_chain() {
    let mut ui = ui();
    let a = ui.create_layer(None).unwrap();
    let b = ui.create_layer(None).unwrap();
    // Inserted before the back-most layer, c becomes the new back.
    let c = ui.create_layer(Some(a)).unwrap();

    assert_eq!(ui.layer_first(), Some(c));
    assert_eq!(ui.layer_next(c).unwrap(), Some(a));
    assert_eq!(ui.layer_next(a).unwrap(), Some(b));
    assert_eq!(ui.layer_next(b).unwrap(), None);
    assert_eq!(ui.layer_last(), Some(b));
    assert_eq!(ui.layer_previous(c).unwrap(), None);

    ui.remove_layer(a).unwrap();
    assert_eq!(ui.layer_next(c).unwrap(), Some(b));
    assert_eq!(ui.layer_next(a), Err(Error::InvalidHandle));
}

#[test]
fn zero_sizes_are_rejected() {
    assert_eq!(
        Ui::with_size(Size::ZERO).err(),
        Some(Error::ZeroSize)
    );
    let mut ui = Ui::new_uninitialized();
    ui.create_node(None, Vec2::ZERO, Size::new(1.0, 1.0), NodeFlags::empty())
        .unwrap();
    // Updating with work pending but no size set is a contract violation.
    assert_eq!(ui.update(), Err(Error::ZeroSize));
}

#[test]
fn attach_data_validates_both_sides() {
    let mut ui = ui();
    let node = ui
        .create_node(None, Vec2::ZERO, Size::new(10.0, 10.0), NodeFlags::empty())
        .unwrap();
    let layer = ui.create_layer(None).unwrap();
    let log = Rc::new(RefCell::new(Vec::new()));
    ui.set_layer_instance(Box::new(TestLayer::new(layer, log)))
        .unwrap();

    let data = ui
        .layer_mut(layer)
        .unwrap()
        .common_mut()
        .create_data(None)
        .unwrap();
    let handle = canopy_core::DataHandle::new(layer, data);
    ui.attach_data(node, handle).unwrap();

    ui.remove_node(node).unwrap();
    assert_eq!(ui.attach_data(node, handle), Err(Error::InvalidHandle));

    // The dangling attachment is pruned by the next clean.
    ui.clean();
    assert!(!ui.is_data_valid(handle));
}
