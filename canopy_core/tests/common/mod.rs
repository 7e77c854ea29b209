// Copyright 2025 the Canopy Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Shared test collaborators: a recording event layer, a recording
//! renderer and a shifting layouter.

// Each test binary uses its own subset of these helpers.
#![allow(dead_code)]

use std::cell::RefCell;
use std::rc::Rc;

use canopy_core::{
    FocusEvent, KeyEvent, Layer, LayerCommon, LayerDraw, LayerFeatures, LayerHandle,
    LayerUpdate, Layouter, LayouterCommon, LayouterHandle, NodeHandle, PointerCancelEvent,
    PointerEvent, PointerMoveEvent, Renderer, RendererDrawStates, RendererFeatures,
    RendererTargetState, ScrollEvent, TextInputEvent, VisibilityLostEvent,
};
use kurbo::{Size, Vec2};

/// One delivered event, as observed by [`TestLayer`].
#[derive(Clone, Debug, PartialEq)]
pub enum Delivered {
    Press {
        data: u32,
        primary: bool,
        fallthrough: bool,
        hovered: bool,
    },
    Release {
        data: u32,
        hovered: bool,
        focused: bool,
    },
    Move {
        data: u32,
        fallthrough: bool,
    },
    Enter {
        data: u32,
    },
    Leave {
        data: u32,
    },
    Cancel {
        data: u32,
    },
    Scroll {
        data: u32,
        offset: Vec2,
    },
    Focus {
        data: u32,
    },
    Blur {
        data: u32,
    },
    Key {
        data: u32,
        press: bool,
    },
    Text {
        data: u32,
        text: String,
    },
    VisibilityLost {
        data: u32,
        pressed: bool,
        hovered: bool,
    },
}

/// Event layer recording every delivery into a shared log.
pub struct TestLayer {
    common: LayerCommon,
    pub log: Rc<RefCell<Vec<Delivered>>>,
    pub features: LayerFeatures,
    pub accept_press: bool,
    pub accept_release: bool,
    pub accept_move: bool,
    pub accept_fallthrough_press: bool,
    pub accept_fallthrough_move: bool,
    pub accept_focus: bool,
    pub accept_key: bool,
    pub accept_text: bool,
    pub accept_scroll: bool,
    /// Override for the capture flag on accepted presses.
    pub capture_on_press: Option<bool>,
    /// Data id slices seen by `update`, for partition assertions.
    pub updates: Rc<RefCell<Vec<Vec<u32>>>>,
    /// Absolute opacity per updated data, parallel to `updates`.
    pub seen_opacities: Rc<RefCell<Vec<Vec<f32>>>>,
}

impl TestLayer {
    pub fn new(handle: LayerHandle, log: Rc<RefCell<Vec<Delivered>>>) -> Self {
        Self {
            common: LayerCommon::new(handle),
            log,
            features: LayerFeatures::EVENT,
            accept_press: true,
            accept_release: true,
            accept_move: true,
            accept_fallthrough_press: false,
            accept_fallthrough_move: false,
            accept_focus: true,
            accept_key: true,
            accept_text: true,
            accept_scroll: true,
            capture_on_press: None,
            updates: Rc::new(RefCell::new(Vec::new())),
            seen_opacities: Rc::new(RefCell::new(Vec::new())),
        }
    }

    pub fn with_features(mut self, features: LayerFeatures) -> Self {
        self.features = features;
        self
    }
}

impl Layer for TestLayer {
    fn common(&self) -> &LayerCommon {
        &self.common
    }

    fn common_mut(&mut self) -> &mut LayerCommon {
        &mut self.common
    }

    fn as_any(&self) -> &dyn std::any::Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn std::any::Any {
        self
    }

    fn features(&self) -> LayerFeatures {
        self.features
    }

    fn update(&mut self, update: &LayerUpdate<'_>) {
        self.updates.borrow_mut().push(update.data_ids.to_vec());
        let opacities = update
            .data_ids
            .iter()
            .map(|data| {
                let node = self
                    .common
                    .attachment_at(*data as usize)
                    .expect("updated data are attached");
                update.node_opacities[node.index() as usize]
            })
            .collect();
        self.seen_opacities.borrow_mut().push(opacities);
    }

    fn draw(&mut self, _draw: &LayerDraw<'_>) {}

    fn pointer_press_event(&mut self, data: u32, event: &mut PointerEvent) {
        self.log.borrow_mut().push(Delivered::Press {
            data,
            primary: event.is_primary(),
            fallthrough: event.is_fallthrough(),
            hovered: event.is_node_hovered(),
        });
        let accept = if event.is_fallthrough() {
            self.accept_fallthrough_press
        } else {
            self.accept_press
        };
        if accept {
            if let Some(captured) = self.capture_on_press {
                event.set_captured(captured);
            }
            event.set_accepted();
        }
    }

    fn pointer_release_event(&mut self, data: u32, event: &mut PointerEvent) {
        self.log.borrow_mut().push(Delivered::Release {
            data,
            hovered: event.is_node_hovered(),
            focused: event.is_node_focused(),
        });
        if self.accept_release {
            event.set_accepted();
        }
    }

    fn pointer_move_event(&mut self, data: u32, event: &mut PointerMoveEvent) {
        self.log.borrow_mut().push(Delivered::Move {
            data,
            fallthrough: event.is_fallthrough(),
        });
        let accept = if event.is_fallthrough() {
            self.accept_fallthrough_move
        } else {
            self.accept_move
        };
        if accept {
            event.set_accepted();
        }
    }

    fn pointer_enter_event(&mut self, data: u32, _event: &mut PointerMoveEvent) {
        self.log.borrow_mut().push(Delivered::Enter { data });
    }

    fn pointer_leave_event(&mut self, data: u32, _event: &mut PointerMoveEvent) {
        self.log.borrow_mut().push(Delivered::Leave { data });
    }

    fn pointer_cancel_event(&mut self, data: u32, _event: &mut PointerCancelEvent) {
        self.log.borrow_mut().push(Delivered::Cancel { data });
    }

    fn scroll_event(&mut self, data: u32, event: &mut ScrollEvent) {
        self.log.borrow_mut().push(Delivered::Scroll {
            data,
            offset: event.offset(),
        });
        if self.accept_scroll {
            event.set_accepted();
        }
    }

    fn focus_event(&mut self, data: u32, event: &mut FocusEvent) {
        self.log.borrow_mut().push(Delivered::Focus { data });
        if self.accept_focus {
            event.set_accepted();
        }
    }

    fn blur_event(&mut self, data: u32, event: &mut FocusEvent) {
        self.log.borrow_mut().push(Delivered::Blur { data });
        event.set_accepted();
    }

    fn key_press_event(&mut self, data: u32, event: &mut KeyEvent) {
        self.log
            .borrow_mut()
            .push(Delivered::Key { data, press: true });
        if self.accept_key {
            event.set_accepted();
        }
    }

    fn key_release_event(&mut self, data: u32, event: &mut KeyEvent) {
        self.log
            .borrow_mut()
            .push(Delivered::Key { data, press: false });
        if self.accept_key {
            event.set_accepted();
        }
    }

    fn text_input_event(&mut self, data: u32, event: &mut TextInputEvent) {
        self.log.borrow_mut().push(Delivered::Text {
            data,
            text: event.text().to_string(),
        });
        if self.accept_text {
            event.set_accepted();
        }
    }

    fn visibility_lost_event(&mut self, data: u32, event: &mut VisibilityLostEvent) {
        self.log.borrow_mut().push(Delivered::VisibilityLost {
            data,
            pressed: event.is_node_pressed(),
            hovered: event.is_node_hovered(),
        });
    }
}

/// Renderer recording the transition sequence.
pub struct TestRenderer {
    pub features: RendererFeatures,
    pub transitions: Rc<RefCell<Vec<(RendererTargetState, RendererDrawStates)>>>,
}

impl TestRenderer {
    pub fn new() -> Self {
        Self {
            features: RendererFeatures::empty(),
            transitions: Rc::new(RefCell::new(Vec::new())),
        }
    }
}

impl Renderer for TestRenderer {
    fn features(&self) -> RendererFeatures {
        self.features
    }

    fn setup_framebuffers(&mut self, _size: Size) {}

    fn transition(&mut self, target: RendererTargetState, draw_states: RendererDrawStates) {
        self.transitions.borrow_mut().push((target, draw_states));
    }
}

/// Layouter shifting every masked node by a fixed delta, recording its
/// calls.
pub struct ShiftLayouter {
    common: LayouterCommon,
    pub delta: Vec2,
    /// (top-level layout ids, masked layout count) per update call.
    pub calls: Rc<RefCell<Vec<(Vec<u32>, usize)>>>,
}

impl ShiftLayouter {
    pub fn new(handle: LayouterHandle, delta: Vec2) -> Self {
        Self {
            common: LayouterCommon::new(handle),
            delta,
            calls: Rc::new(RefCell::new(Vec::new())),
        }
    }
}

impl Layouter for ShiftLayouter {
    fn common(&self) -> &LayouterCommon {
        &self.common
    }

    fn common_mut(&mut self) -> &mut LayouterCommon {
        &mut self.common
    }

    fn update(
        &mut self,
        mask: &[bool],
        layout_ids: &[u32],
        _node_parents: &[Option<NodeHandle>],
        node_offsets: &mut [Vec2],
        _node_sizes: &mut [Size],
    ) {
        let mut masked = 0;
        for (slot, masked_bit) in mask.iter().enumerate() {
            if !masked_bit {
                continue;
            }
            masked += 1;
            if let Some(node) = self.common.node_at(slot) {
                node_offsets[node.index() as usize] += self.delta;
            }
        }
        self.calls
            .borrow_mut()
            .push((layout_ids.to_vec(), masked));
    }
}
