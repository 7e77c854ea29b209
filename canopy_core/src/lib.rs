// Copyright 2025 the Canopy Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

// After you edit the crate's doc comment, run this command, then check README.md for any missing links
// cargo rdme --workspace-project=canopy_core --heading-base-level=0

//! Canopy Core: a retained-mode user interface runtime.
//!
//! The [`Ui`] type owns a hierarchy of *nodes* (rectangular regions with
//! offset, size, opacity and behavior flags) plus three kinds of installed
//! collaborators: *layers* (data producers for drawing and event handling),
//! *layouters* (geometry solvers) and *animators* (time-driven mutators).
//! From those it incrementally derives what has to be redrawn and which
//! piece of attached data receives which input event.
//!
//! ## Data flow
//!
//! User code mutates nodes and collaborator data; dirty flags accumulate in
//! an implication-closed lattice ([`UserInterfaceStates`]). The frame loop
//! then runs:
//!
//! - [`Ui::clean`]: prunes orphaned children, data, layouts and animations
//!   after removals.
//! - [`Ui::advance_animations`]: advances time-driven mutations, which may
//!   set further dirty flags.
//! - [`Ui::update`]: rebuilds the visible node list, solves layouts,
//!   propagates offsets and opacities, culls against clip rectangles,
//!   partitions per-layer data into draw/event/composite batches and
//!   refreshes every layer.
//! - [`Ui::draw`]: walks the compacted draw list and drives the
//!   [`Renderer`] state machine.
//!
//! Each pass is a no-op when nothing it depends on changed, and the event
//! entry points run [`Ui::update`] lazily, so callers only redraw when
//!
//! ```
//! # let ui = canopy_core::Ui::new_uninitialized();
//! !ui.state().is_empty()
//! # ;
//! ```
//!
//! ## Handles
//!
//! Every entity is addressed by a generational handle; see
//! [`canopy_handle`] for the liveness rules. Handles stay cheap to copy
//! and validate, and removing an entity invalidates all its outstanding
//! handles at once.
//!
//! ## Events
//!
//! Pointer, scroll, key, text input and focus events enter through
//! [`Ui::pointer_press_event`] and friends, get scaled from window to UI
//! coordinates, and are delivered to layer data via hit testing with
//! pointer capture, hover tracking, keyboard focus and fall-through to
//! interested ancestors. See the [`events`] module types for the handler
//! view of each event.
//!
//! ## Example
//!
//! ```
//! use canopy_core::{NodeFlags, Ui};
//! use kurbo::{Size, Vec2};
//!
//! let mut ui = Ui::with_size(Size::new(800.0, 600.0))?;
//! let panel = ui.create_node(
//!     None,
//!     Vec2::new(16.0, 16.0),
//!     Size::new(200.0, 120.0),
//!     NodeFlags::empty(),
//! )?;
//! let button = ui.create_node(
//!     Some(panel),
//!     Vec2::new(8.0, 8.0),
//!     Size::new(64.0, 24.0),
//!     NodeFlags::FOCUSABLE,
//! )?;
//! ui.update()?;
//! assert!(ui.is_node_valid(button));
//! # Ok::<(), canopy_core::Error>(())
//! ```
//!
//! This crate is `no_std` and uses `alloc`.

#![no_std]

extern crate alloc;

mod animator;
mod error;
mod event;
mod events;
mod handles;
mod layer;
mod layouter;
mod node;
mod renderer;
mod state;
mod ui;
mod update;

pub use animator::{
    AdvanceBuffers, AnimationFlags, AnimationState, Animator, AnimatorCommon, DataAnimator,
    GenericAnimator, NodeAnimator, StyleAnimator, StyleChange,
};
pub use error::Error;
pub use events::{
    FocusEvent, Key, KeyEvent, Modifiers, Pointer, PointerCancelEvent, PointerEvent,
    PointerMoveEvent, ScrollEvent, TextInputEvent, VisibilityLostEvent,
};
pub use handles::{
    AnimationDataHandle, AnimationHandle, AnimatorHandle, DataHandle, LayerDataHandle, LayerHandle,
    LayoutDataHandle, LayoutHandle, LayouterHandle, NodeHandle,
};
pub use layer::{Layer, LayerCommon, LayerDraw, LayerUpdate};
pub use layouter::{Layouter, LayouterCommon};
pub use node::NodeFlags;
pub use renderer::{Renderer, RendererDrawStates, RendererFeatures, RendererTargetState};
pub use state::{
    AnimatorFeatures, AnimatorStates, LayerFeatures, LayerStates, LayouterStates, NodeAnimations,
    UserInterfaceStates,
};
pub use ui::Ui;

/// Glob-import convenience for layer implementations: the event types plus
/// the handful of types every layer touches.
pub mod prelude {
    pub use crate::events::*;
    pub use crate::{
        Layer, LayerCommon, LayerFeatures, LayerStates, NodeFlags, Ui, UserInterfaceStates,
    };
}
