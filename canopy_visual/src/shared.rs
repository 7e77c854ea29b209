// Copyright 2025 the Canopy Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! State shared between visual layers: style counts and the transition
//! function table.

use alloc::rc::Rc;
use core::cell::RefCell;

/// A style transition function, mapping a non-dynamic style index to
/// another within `0..style_count`.
pub type StyleTransition = fn(u32) -> u32;

/// The seven style transition functions. Any left as `None` behaves as the
/// identity.
///
/// The `out`/`over` suffix is the hover axis; `inactive`, `focused` and
/// `pressed` the interaction axis. `to_disabled` is applied during layer
/// update to data on disabled nodes; unlike the others, leaving it `None`
/// turns the whole disabled pass into a plain copy so implementations can
/// handle disabling globally instead (for example by desaturating).
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct StyleTransitions {
    /// Towards not hovered, not focused, not pressed.
    pub to_inactive_out: Option<StyleTransition>,
    /// Towards hovered, not focused, not pressed.
    pub to_inactive_over: Option<StyleTransition>,
    /// Towards focused, not hovered.
    pub to_focused_out: Option<StyleTransition>,
    /// Towards focused and hovered.
    pub to_focused_over: Option<StyleTransition>,
    /// Towards pressed, not hovered.
    pub to_pressed_out: Option<StyleTransition>,
    /// Towards pressed and hovered.
    pub to_pressed_over: Option<StyleTransition>,
    /// Towards disabled.
    pub to_disabled: Option<StyleTransition>,
}

fn passthrough(style: u32) -> u32 {
    style
}

impl StyleTransitions {
    pub(crate) fn to_inactive(&self, hovered: bool) -> StyleTransition {
        let transition = if hovered {
            self.to_inactive_over
        } else {
            self.to_inactive_out
        };
        transition.unwrap_or(passthrough)
    }

    pub(crate) fn to_focused(&self, hovered: bool) -> StyleTransition {
        let transition = if hovered {
            self.to_focused_over
        } else {
            self.to_focused_out
        };
        transition.unwrap_or(passthrough)
    }

    pub(crate) fn to_pressed(&self, hovered: bool) -> StyleTransition {
        let transition = if hovered {
            self.to_pressed_over
        } else {
            self.to_pressed_out
        };
        transition.unwrap_or(passthrough)
    }
}

#[derive(Debug)]
pub(crate) struct SharedState {
    pub(crate) style_count: u32,
    pub(crate) dynamic_style_count: u32,
    pub(crate) transitions: StyleTransitions,
    /// Bumped whenever `to_disabled` changes, so layers sharing this state
    /// know to recompute their calculated styles.
    pub(crate) to_disabled_stamp: u64,
}

/// Style counts and transition functions shared between all visual layers
/// drawing with the same style definitions.
///
/// Cheap to clone; clones refer to the same state.
#[derive(Clone, Debug)]
pub struct Shared {
    inner: Rc<RefCell<SharedState>>,
}

impl Shared {
    /// Creates shared state for `style_count` regular styles and
    /// `dynamic_style_count` per-layer dynamic style slots.
    #[must_use]
    pub fn new(style_count: u32, dynamic_style_count: u32) -> Self {
        Self {
            inner: Rc::new(RefCell::new(SharedState {
                style_count,
                dynamic_style_count,
                transitions: StyleTransitions::default(),
                to_disabled_stamp: 0,
            })),
        }
    }

    /// Number of regular styles.
    #[must_use]
    pub fn style_count(&self) -> u32 {
        self.inner.borrow().style_count
    }

    /// Number of dynamic style slots per layer.
    #[must_use]
    pub fn dynamic_style_count(&self) -> u32 {
        self.inner.borrow().dynamic_style_count
    }

    /// Regular plus dynamic style count; the exclusive upper bound for
    /// [`VisualLayer::set_style`](crate::VisualLayer::set_style).
    #[must_use]
    pub fn total_style_count(&self) -> u32 {
        let state = self.inner.borrow();
        state.style_count + state.dynamic_style_count
    }

    /// Replaces the transition function table.
    ///
    /// A change to `to_disabled` marks all layers sharing this state as
    /// needing a data update the next time their state is polled.
    pub fn set_style_transitions(&self, transitions: StyleTransitions) {
        let mut state = self.inner.borrow_mut();
        if state.transitions.to_disabled != transitions.to_disabled {
            state.to_disabled_stamp += 1;
        }
        state.transitions = transitions;
    }

    /// The current transition function table.
    #[must_use]
    pub fn style_transitions(&self) -> StyleTransitions {
        self.inner.borrow().transitions
    }

    pub(crate) fn with<R>(&self, f: impl FnOnce(&SharedState) -> R) -> R {
        f(&self.inner.borrow())
    }
}
