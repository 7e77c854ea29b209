// Copyright 2025 the Canopy Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Event dispatch: click sequences, capture, fall-through hand-off, focus
//! rules, key/text routing and visibility-lost notifications.

mod common;

use std::cell::RefCell;
use std::rc::Rc;
use std::time::Duration;

use canopy_core::{
    DataHandle, Error, FocusEvent, Key, KeyEvent, Layer, LayerHandle, NodeFlags, NodeHandle,
    Pointer, PointerEvent, PointerMoveEvent, ScrollEvent, TextInputEvent, Ui,
};
use common::{Delivered, TestLayer};
use kurbo::{Point, Size, Vec2};

struct Fixture {
    ui: Ui,
    layer: LayerHandle,
    log: Rc<RefCell<Vec<Delivered>>>,
}

impl Fixture {
    fn new() -> Self {
        Self::with_layer(|layer| layer)
    }

    fn with_layer(configure: impl FnOnce(TestLayer) -> TestLayer) -> Self {
        let mut ui = Ui::with_size(Size::new(100.0, 100.0)).unwrap();
        let layer = ui.create_layer(None).unwrap();
        let log = Rc::new(RefCell::new(Vec::new()));
        let instance = configure(TestLayer::new(layer, log.clone()));
        ui.set_layer_instance(Box::new(instance)).unwrap();
        Self { ui, layer, log }
    }

    fn node(&mut self, parent: Option<NodeHandle>, offset: Vec2, size: Size) -> NodeHandle {
        self.ui
            .create_node(parent, offset, size, NodeFlags::empty())
            .unwrap()
    }

    fn attach(&mut self, node: NodeHandle) -> DataHandle {
        let data = self
            .ui
            .layer_mut(self.layer)
            .unwrap()
            .common_mut()
            .create_data(Some(node))
            .unwrap();
        DataHandle::new(self.layer, data)
    }

    fn take_log(&self) -> Vec<Delivered> {
        self.log.borrow_mut().drain(..).collect()
    }

    fn press(&mut self, x: f64, y: f64) -> bool {
        let mut event = PointerEvent::new(Duration::ZERO, Pointer::MouseLeft, true);
        self.ui
            .pointer_press_event(Point::new(x, y), &mut event)
            .unwrap()
    }

    fn release(&mut self, x: f64, y: f64) -> bool {
        let mut event = PointerEvent::new(Duration::ZERO, Pointer::MouseLeft, true);
        self.ui
            .pointer_release_event(Point::new(x, y), &mut event)
            .unwrap()
    }

    fn pointer_move(&mut self, x: f64, y: f64) -> bool {
        let mut event = PointerMoveEvent::new(Duration::ZERO, None, true);
        self.ui
            .pointer_move_event(Point::new(x, y), &mut event)
            .unwrap()
    }
}

#[test]
fn press_move_release_click() {
    let mut fixture = Fixture::new();
    let node = fixture.node(None, Vec2::new(10.0, 10.0), Size::new(30.0, 30.0));
    fixture.ui.add_node_flags(node, NodeFlags::FOCUSABLE).unwrap();
    let data = fixture.attach(node);
    let id = data.data().index();

    assert!(fixture.pointer_move(20.0, 20.0));
    assert_eq!(fixture.ui.current_hovered_node(), Some(node));
    assert_eq!(
        fixture.take_log(),
        [Delivered::Move { data: id, fallthrough: false }, Delivered::Enter { data: id }]
    );

    assert!(fixture.press(20.0, 20.0));
    assert_eq!(fixture.ui.current_pressed_node(), Some(node));
    assert_eq!(fixture.ui.current_captured_node(), Some(node));
    assert_eq!(fixture.ui.current_focused_node(), Some(node));
    assert_eq!(
        fixture.take_log(),
        [
            Delivered::Press {
                data: id,
                primary: true,
                fallthrough: false,
                hovered: true,
            },
            Delivered::Focus { data: id },
        ]
    );

    // Moving outside keeps the event flowing through the capture and drops
    // the hover.
    assert!(fixture.pointer_move(80.0, 80.0));
    assert_eq!(fixture.ui.current_hovered_node(), None);
    assert_eq!(fixture.ui.current_captured_node(), Some(node));
    assert_eq!(
        fixture.take_log(),
        [Delivered::Move { data: id, fallthrough: false }, Delivered::Leave { data: id }]
    );

    // Releasing through the capture ends press and capture, keeps focus.
    assert!(fixture.release(80.0, 80.0));
    assert_eq!(fixture.ui.current_pressed_node(), None);
    assert_eq!(fixture.ui.current_captured_node(), None);
    assert_eq!(fixture.ui.current_focused_node(), Some(node));
    assert_eq!(
        fixture.take_log(),
        [Delivered::Release { data: id, hovered: false, focused: true }]
    );
}

#[test]
fn children_win_over_parents() {
    let mut fixture = Fixture::new();
    let parent = fixture.node(None, Vec2::ZERO, Size::new(100.0, 100.0));
    let child = fixture.node(Some(parent), Vec2::new(10.0, 10.0), Size::new(20.0, 20.0));
    let parent_data = fixture.attach(parent);
    let child_data = fixture.attach(child);

    assert!(fixture.press(15.0, 15.0));
    assert_eq!(fixture.ui.current_pressed_node(), Some(child));
    let log = fixture.take_log();
    assert_eq!(
        log[0],
        Delivered::Press {
            data: child_data.data().index(),
            primary: true,
            fallthrough: false,
            hovered: false,
        }
    );

    // Outside the child, the parent gets it.
    fixture.release(15.0, 15.0);
    fixture.take_log();
    assert!(fixture.press(50.0, 50.0));
    assert_eq!(fixture.ui.current_pressed_node(), Some(parent));
    assert_eq!(
        fixture.take_log()[0],
        Delivered::Press {
            data: parent_data.data().index(),
            primary: true,
            fallthrough: false,
            hovered: false,
        }
    );
}

#[test]
fn fallthrough_takes_over_the_drag() {
    let mut fixture = Fixture::with_layer(|mut layer| {
        layer.accept_fallthrough_move = true;
        layer
    });
    let parent = fixture
        .ui
        .create_node(
            None,
            Vec2::ZERO,
            Size::new(100.0, 100.0),
            NodeFlags::FALLTHROUGH_POINTER_EVENTS,
        )
        .unwrap();
    let child = fixture.node(Some(parent), Vec2::new(10.0, 10.0), Size::new(30.0, 30.0));
    let parent_data = fixture.attach(parent);
    let child_data = fixture.attach(child);
    let child_id = child_data.data().index();
    let parent_id = parent_data.data().index();

    // The press lands on the child; the parent observes it fall through
    // without taking over. Neither delivery is hovering, no move preceded
    // the press.
    assert!(fixture.press(20.0, 20.0));
    assert_eq!(fixture.ui.current_pressed_node(), Some(child));
    assert_eq!(fixture.ui.current_captured_node(), Some(child));
    assert_eq!(
        fixture.take_log(),
        [
            Delivered::Press {
                data: child_id,
                primary: true,
                fallthrough: false,
                hovered: false,
            },
            Delivered::Press {
                data: parent_id,
                primary: true,
                fallthrough: true,
                hovered: false,
            },
        ]
    );

    // The move falls through too; the parent accepts and takes the whole
    // interaction over, cancelling the child exactly once.
    assert!(fixture.pointer_move(25.0, 25.0));
    assert_eq!(fixture.ui.current_pressed_node(), Some(parent));
    assert_eq!(fixture.ui.current_hovered_node(), Some(parent));
    assert_eq!(fixture.ui.current_captured_node(), Some(parent));
    let log = fixture.take_log();
    assert_eq!(
        log.iter()
            .filter(|event| matches!(event, Delivered::Cancel { data } if *data == child_id))
            .count(),
        1
    );
    assert!(log.contains(&Delivered::Move { data: parent_id, fallthrough: true }));

    // Subsequent events go to the parent directly through the capture.
    fixture.pointer_move(30.0, 30.0);
    let log = fixture.take_log();
    assert!(matches!(log[0], Delivered::Move { data, .. } if data == parent_id));
    assert!(fixture.release(30.0, 30.0));
    assert_eq!(fixture.ui.current_pressed_node(), None);
    assert_eq!(fixture.ui.current_captured_node(), None);
}

#[test]
fn focus_mutual_exclusion() {
    let mut fixture = Fixture::new();
    let a = fixture.node(None, Vec2::new(0.0, 0.0), Size::new(40.0, 40.0));
    let b = fixture.node(None, Vec2::new(50.0, 0.0), Size::new(40.0, 40.0));
    fixture.ui.add_node_flags(a, NodeFlags::FOCUSABLE).unwrap();
    fixture.ui.add_node_flags(b, NodeFlags::FOCUSABLE).unwrap();
    let a_data = fixture.attach(a);
    let b_data = fixture.attach(b);

    let mut event = FocusEvent::new(Duration::ZERO);
    assert!(fixture.ui.focus_event(Some(a), &mut event).unwrap());
    assert_eq!(fixture.ui.current_focused_node(), Some(a));
    assert_eq!(
        fixture.take_log(),
        [Delivered::Focus { data: a_data.data().index() }]
    );

    // Focusing b blurs a exactly once.
    let mut event = FocusEvent::new(Duration::ZERO);
    assert!(fixture.ui.focus_event(Some(b), &mut event).unwrap());
    assert_eq!(fixture.ui.current_focused_node(), Some(b));
    assert_eq!(
        fixture.take_log(),
        [
            Delivered::Focus { data: b_data.data().index() },
            Delivered::Blur { data: a_data.data().index() },
        ]
    );

    // Null blurs without focusing anything.
    let mut event = FocusEvent::new(Duration::ZERO);
    assert!(!fixture.ui.focus_event(None, &mut event).unwrap());
    assert_eq!(fixture.ui.current_focused_node(), None);
    assert_eq!(
        fixture.take_log(),
        [Delivered::Blur { data: b_data.data().index() }]
    );

    // Focusing a non-focusable node is a contract violation.
    let plain = fixture.node(None, Vec2::ZERO, Size::new(10.0, 10.0));
    let mut event = FocusEvent::new(Duration::ZERO);
    assert_eq!(
        fixture.ui.focus_event(Some(plain), &mut event),
        Err(Error::IncompatibleCapabilities)
    );
}

#[test]
fn no_blur_keeps_focus_on_outside_press() {
    let mut fixture = Fixture::new();
    let focusable = fixture.node(None, Vec2::ZERO, Size::new(30.0, 30.0));
    fixture
        .ui
        .add_node_flags(focusable, NodeFlags::FOCUSABLE | NodeFlags::NO_BLUR)
        .unwrap();
    let other = fixture.node(None, Vec2::new(50.0, 50.0), Size::new(30.0, 30.0));
    fixture.attach(focusable);
    fixture.attach(other);

    let mut event = FocusEvent::new(Duration::ZERO);
    fixture.ui.focus_event(Some(focusable), &mut event).unwrap();
    assert_eq!(fixture.ui.current_focused_node(), Some(focusable));

    // A press on a non-focusable node elsewhere would normally blur.
    fixture.press(60.0, 60.0);
    assert_eq!(fixture.ui.current_focused_node(), Some(focusable));
}

#[test]
fn key_and_text_routing() {
    let mut fixture = Fixture::new();
    let focusable = fixture.node(None, Vec2::ZERO, Size::new(30.0, 30.0));
    fixture
        .ui
        .add_node_flags(focusable, NodeFlags::FOCUSABLE)
        .unwrap();
    let hovered = fixture.node(None, Vec2::new(50.0, 50.0), Size::new(30.0, 30.0));
    let focusable_data = fixture.attach(focusable);
    let hovered_data = fixture.attach(hovered);

    // Without focus and without a known pointer position, keys go nowhere.
    let mut event = KeyEvent::new(Duration::ZERO, Key::Enter);
    assert!(!fixture.ui.key_press_event(&mut event).unwrap());
    assert!(!fixture
        .ui
        .text_input_event(&mut TextInputEvent::new(Duration::ZERO, "x"))
        .unwrap());
    assert!(fixture.take_log().is_empty());

    // With a hovered node, keys follow the pointer.
    fixture.pointer_move(60.0, 60.0);
    fixture.take_log();
    let mut event = KeyEvent::new(Duration::ZERO, Key::Enter);
    assert!(fixture.ui.key_press_event(&mut event).unwrap());
    assert_eq!(
        fixture.take_log(),
        [Delivered::Key { data: hovered_data.data().index(), press: true }]
    );

    // Focus beats the pointer; text input follows focus only.
    let mut focus = FocusEvent::new(Duration::ZERO);
    fixture.ui.focus_event(Some(focusable), &mut focus).unwrap();
    fixture.take_log();
    let mut event = KeyEvent::new(Duration::ZERO, Key::Enter);
    assert!(fixture.ui.key_release_event(&mut event).unwrap());
    assert!(fixture
        .ui
        .text_input_event(&mut TextInputEvent::new(Duration::ZERO, "hi"))
        .unwrap());
    assert_eq!(
        fixture.take_log(),
        [
            Delivered::Key { data: focusable_data.data().index(), press: false },
            Delivered::Text { data: focusable_data.data().index(), text: "hi".into() },
        ]
    );
}

#[test]
fn scroll_goes_to_hovered_then_captured() {
    let mut fixture = Fixture::new();
    let node = fixture.node(None, Vec2::new(10.0, 10.0), Size::new(30.0, 30.0));
    let data = fixture.attach(node);
    let id = data.data().index();

    // Nothing hovered: the scroll has no target.
    let mut event = ScrollEvent::new(Duration::ZERO, Vec2::new(0.0, 1.0));
    assert!(!fixture
        .ui
        .scroll_event(Point::new(20.0, 20.0), &mut event)
        .unwrap());

    fixture.pointer_move(20.0, 20.0);
    fixture.take_log();
    let mut event = ScrollEvent::new(Duration::ZERO, Vec2::new(0.0, 1.0));
    assert!(fixture
        .ui
        .scroll_event(Point::new(20.0, 20.0), &mut event)
        .unwrap());
    assert_eq!(
        fixture.take_log(),
        [Delivered::Scroll { data: id, offset: Vec2::new(0.0, 1.0) }]
    );

    // With capture, scrolls go to the captured node even from outside.
    fixture.press(20.0, 20.0);
    fixture.take_log();
    let mut event = ScrollEvent::new(Duration::ZERO, Vec2::new(2.0, 0.0));
    assert!(fixture
        .ui
        .scroll_event(Point::new(90.0, 90.0), &mut event)
        .unwrap());
    assert_eq!(
        fixture.take_log(),
        [Delivered::Scroll { data: id, offset: Vec2::new(2.0, 0.0) }]
    );
}

#[test]
fn visibility_lost_is_emitted_once() {
    let mut fixture = Fixture::new();
    let node = fixture.node(None, Vec2::new(10.0, 10.0), Size::new(30.0, 30.0));
    fixture.ui.add_node_flags(node, NodeFlags::FOCUSABLE).unwrap();
    let data = fixture.attach(node);
    let id = data.data().index();

    // Make the node simultaneously hovered, pressed, captured and focused.
    fixture.pointer_move(20.0, 20.0);
    fixture.press(20.0, 20.0);
    fixture.take_log();
    assert_eq!(fixture.ui.current_pressed_node(), Some(node));
    assert_eq!(fixture.ui.current_captured_node(), Some(node));
    assert_eq!(fixture.ui.current_hovered_node(), Some(node));
    assert_eq!(fixture.ui.current_focused_node(), Some(node));

    fixture.ui.add_node_flags(node, NodeFlags::HIDDEN).unwrap();
    fixture.ui.update().unwrap();

    assert_eq!(
        fixture.take_log(),
        [Delivered::VisibilityLost { data: id, pressed: false, hovered: false }]
    );
    assert_eq!(fixture.ui.current_pressed_node(), None);
    assert_eq!(fixture.ui.current_captured_node(), None);
    assert_eq!(fixture.ui.current_hovered_node(), None);
    assert_eq!(fixture.ui.current_focused_node(), None);

    // A second update has nothing left to report.
    fixture.ui.update().unwrap();
    assert!(fixture.take_log().is_empty());
}

#[test]
fn losing_only_focusability_keeps_press_state() {
    let mut fixture = Fixture::new();
    let node = fixture.node(None, Vec2::new(10.0, 10.0), Size::new(30.0, 30.0));
    fixture.ui.add_node_flags(node, NodeFlags::FOCUSABLE).unwrap();
    let data = fixture.attach(node);
    let id = data.data().index();

    fixture.pointer_move(20.0, 20.0);
    fixture.press(20.0, 20.0);
    fixture.take_log();

    fixture.ui.clear_node_flags(node, NodeFlags::FOCUSABLE).unwrap();
    fixture.ui.update().unwrap();

    // Only focus is lost; the event reports the node still pressed and
    // hovered, and the pointer state survives.
    assert_eq!(
        fixture.take_log(),
        [Delivered::VisibilityLost { data: id, pressed: true, hovered: true }]
    );
    assert_eq!(fixture.ui.current_focused_node(), None);
    assert_eq!(fixture.ui.current_pressed_node(), Some(node));
    assert_eq!(fixture.ui.current_captured_node(), Some(node));
    assert_eq!(fixture.ui.current_hovered_node(), Some(node));
}

#[test]
fn accepted_events_cannot_be_reused() {
    let mut fixture = Fixture::new();
    let node = fixture.node(None, Vec2::new(10.0, 10.0), Size::new(30.0, 30.0));
    fixture.attach(node);

    let mut event = PointerEvent::new(Duration::ZERO, Pointer::MouseLeft, true);
    assert!(fixture
        .ui
        .pointer_press_event(Point::new(20.0, 20.0), &mut event)
        .unwrap());
    assert_eq!(
        fixture.ui.pointer_press_event(Point::new(20.0, 20.0), &mut event),
        Err(Error::EventAlreadyAccepted)
    );
}

#[test]
fn no_events_and_disabled_subtrees_are_skipped() {
    let mut fixture = Fixture::new();
    let parent = fixture.node(None, Vec2::ZERO, Size::new(100.0, 100.0));
    let child = fixture.node(Some(parent), Vec2::new(10.0, 10.0), Size::new(20.0, 20.0));
    fixture.attach(child);

    fixture.ui.add_node_flags(parent, NodeFlags::NO_EVENTS).unwrap();
    assert!(!fixture.press(15.0, 15.0));
    assert!(fixture.take_log().is_empty());

    fixture.ui.clear_node_flags(parent, NodeFlags::NO_EVENTS).unwrap();
    assert!(fixture.press(15.0, 15.0));
    fixture.release(15.0, 15.0);
    fixture.take_log();

    fixture.ui.add_node_flags(parent, NodeFlags::DISABLED).unwrap();
    assert!(!fixture.press(15.0, 15.0));
    assert!(fixture.take_log().is_empty());
}

#[test]
fn window_coordinates_are_scaled() {
    let mut ui = Ui::new(
        Size::new(100.0, 100.0),
        Size::new(200.0, 200.0),
        Size::new(400.0, 400.0),
    )
    .unwrap();
    let layer = ui.create_layer(None).unwrap();
    let log = Rc::new(RefCell::new(Vec::new()));
    ui.set_layer_instance(Box::new(TestLayer::new(layer, log.clone())))
        .unwrap();
    let node = ui
        .create_node(
            None,
            Vec2::new(10.0, 10.0),
            Size::new(30.0, 30.0),
            NodeFlags::empty(),
        )
        .unwrap();
    let data = ui
        .layer_mut(layer)
        .unwrap()
        .common_mut()
        .create_data(Some(node))
        .unwrap();
    let _ = data;

    // Window position (60, 60) maps to UI position (30, 30).
    let mut event = PointerEvent::new(Duration::ZERO, Pointer::MouseLeft, true);
    assert!(ui.pointer_press_event(Point::new(60.0, 60.0), &mut event).unwrap());
    // Window position (90, 90) maps to (45, 45), outside the node.
    let mut release = PointerEvent::new(Duration::ZERO, Pointer::MouseLeft, true);
    ui.pointer_release_event(Point::new(90.0, 90.0), &mut release)
        .unwrap();
}
