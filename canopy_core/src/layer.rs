// Copyright 2025 the Canopy Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Layer contract and the common per-layer data bookkeeping.
//!
//! A layer owns *data*: per-node attachments that produce drawing and
//! receive events. Implementations embed a [`LayerCommon`] (the data-slot
//! arena, node attachments and the stored dirty states) and expose it via
//! [`Layer::common`]; the provided trait methods and the runtime work
//! through it, so a minimal layer only implements
//! [`features`](Layer::features) plus whatever hooks it cares about.

use alloc::vec::Vec;
use core::time::Duration;

use canopy_handle::Arena;
use kurbo::{Size, Vec2};

use crate::animator::{AdvanceBuffers, Animator, DataAnimator, StyleAnimator};
use crate::error::Error;
use crate::events::{
    FocusEvent, KeyEvent, PointerCancelEvent, PointerEvent, PointerMoveEvent, ScrollEvent,
    TextInputEvent, VisibilityLostEvent,
};
use crate::handles::{LayerDataHandle, LayerHandle, NodeHandle};
use crate::renderer::Renderer;
use crate::state::{LayerFeatures, LayerStates};

/// Data-slot arena, node attachments and stored dirty state shared by every
/// layer implementation.
#[derive(Debug)]
pub struct LayerCommon {
    handle: LayerHandle,
    data: Arena<LayerDataHandle, Option<NodeHandle>>,
    states: LayerStates,
}

impl LayerCommon {
    /// Creates the common state for a layer installed under `handle`.
    ///
    /// The handle comes from [`Ui::create_layer`](crate::Ui::create_layer);
    /// [`Ui::set_layer_instance`](crate::Ui::set_layer_instance) checks that
    /// the instance's handle matches the slot it's installed into.
    #[must_use]
    pub fn new(handle: LayerHandle) -> Self {
        Self {
            handle,
            data: Arena::new(),
            states: LayerStates::empty(),
        }
    }

    /// The handle this layer was created under.
    #[must_use]
    pub fn handle(&self) -> LayerHandle {
        self.handle
    }

    /// Number of data slots ever allocated, including freed ones.
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.data.capacity()
    }

    /// Number of live data.
    #[must_use]
    pub fn used_count(&self) -> usize {
        self.data.used_count()
    }

    /// Allocates a data slot, optionally already attached to `node`.
    pub fn create_data(&mut self, node: Option<NodeHandle>) -> Result<LayerDataHandle, Error> {
        let handle = self.data.allocate(node)?;
        self.states |= LayerStates::NEEDS_DATA_UPDATE;
        if node.is_some() {
            self.states |= LayerStates::NEEDS_ATTACHMENT_UPDATE;
        }
        Ok(handle)
    }

    /// Removes a data slot.
    ///
    /// Animations attached to the data are pruned by the next
    /// [`Ui::clean`](crate::Ui::clean), which the
    /// [`NEEDS_DATA_CLEAN`](LayerStates::NEEDS_DATA_CLEAN) state requests.
    pub fn remove_data(&mut self, data: LayerDataHandle) -> Result<(), Error> {
        self.data.remove(data).ok_or(Error::InvalidHandle)?;
        self.states |= LayerStates::NEEDS_ATTACHMENT_UPDATE | LayerStates::NEEDS_DATA_CLEAN;
        Ok(())
    }

    /// Whether `data` refers to live data of this layer.
    #[must_use]
    pub fn is_data_valid(&self, data: LayerDataHandle) -> bool {
        self.data.is_valid(data)
    }

    /// Attaches `data` to `node`, or detaches it when `node` is `None`.
    pub fn attach(&mut self, data: LayerDataHandle, node: Option<NodeHandle>) -> Result<(), Error> {
        let slot = self.data.get_mut(data).ok_or(Error::InvalidHandle)?;
        *slot = node;
        self.states |= LayerStates::NEEDS_ATTACHMENT_UPDATE;
        Ok(())
    }

    /// The node `data` is attached to.
    pub fn node_of(&self, data: LayerDataHandle) -> Result<Option<NodeHandle>, Error> {
        self.data.get(data).copied().ok_or(Error::InvalidHandle)
    }

    /// Attachment of the data slot at `index`; `None` for freed slots and
    /// unattached data alike.
    #[must_use]
    pub fn attachment_at(&self, index: usize) -> Option<NodeHandle> {
        self.data.get_at(index).copied().flatten()
    }

    /// Live data handle at slot `index`, `None` for freed slots.
    #[must_use]
    pub fn data_handle_at(&self, index: usize) -> Option<LayerDataHandle> {
        self.data.handle_at(index)
    }

    /// Marks the layer as needing an update; the flags are folded into
    /// [`Ui::state`](crate::Ui::state) and handed back to
    /// [`Layer::update`](Layer::update).
    pub fn set_needs_update(&mut self, states: LayerStates) {
        self.states |= states;
    }

    /// The stored dirty state.
    #[must_use]
    pub fn state(&self) -> LayerStates {
        self.states
    }

    /// Writes the per-slot data generations into `out`, for pruning stale
    /// references held by animators.
    pub fn data_generations_into(&self, out: &mut Vec<u32>) {
        self.data.generations_into(out);
    }

    pub(crate) fn clear_states(&mut self, states: LayerStates) {
        self.states &= !states;
    }

    pub(crate) fn clean_stale_attachments(&mut self, node_generations: &[u32]) {
        for index in 0..self.data.capacity() {
            let Some(node) = self.attachment_at(index) else {
                continue;
            };
            let stale = node_generations
                .get(node.index() as usize)
                .is_none_or(|generation| *generation != node.generation());
            if stale {
                let handle = self.data.handle_at(index).expect("slot is attached");
                self.data.remove(handle);
                self.states |=
                    LayerStates::NEEDS_ATTACHMENT_UPDATE | LayerStates::NEEDS_DATA_CLEAN;
            }
        }
    }
}

/// Bundled inputs to [`Layer::update`].
///
/// The node-indexed arrays (`node_offsets`, `node_sizes`, `node_opacities`,
/// `nodes_enabled`) cover the whole node capacity and are valid at the
/// indices reachable from `data_ids` through the layer's attachments. Clip
/// rects come as run-length encoding: `clip_rect_ids[i]` indexes into the
/// global `clip_rect_offsets`/`clip_rect_sizes` and covers the next
/// `clip_rect_data_counts[i]` entries of `data_ids`.
#[derive(Debug)]
pub struct LayerUpdate<'a> {
    /// Which aspects changed since the last update.
    pub states: LayerStates,
    /// Data slot indices attached to visible nodes, in draw order.
    pub data_ids: &'a [u32],
    /// Clip rect index per run of `data_ids`.
    pub clip_rect_ids: &'a [u32],
    /// Length of each run of `data_ids`.
    pub clip_rect_data_counts: &'a [u32],
    /// Absolute node offsets, indexed by node id.
    pub node_offsets: &'a [Vec2],
    /// Post-layout node sizes, indexed by node id.
    pub node_sizes: &'a [Size],
    /// Absolute node opacities, indexed by node id.
    pub node_opacities: &'a [f32],
    /// Whether the node is enabled, indexed by node id.
    pub nodes_enabled: &'a [bool],
    /// Global clip rect offsets.
    pub clip_rect_offsets: &'a [Vec2],
    /// Global clip rect sizes.
    pub clip_rect_sizes: &'a [Size],
    /// Composite rectangle offsets for this layer's `data_ids`, non-empty
    /// only for compositing layers.
    pub composite_rect_offsets: &'a [Vec2],
    /// Composite rectangle sizes for this layer's `data_ids`.
    pub composite_rect_sizes: &'a [Size],
}

/// Bundled inputs to [`Layer::draw`]: the same partition as
/// [`LayerUpdate`], plus the sub-range to draw in this call.
#[derive(Debug)]
pub struct LayerDraw<'a> {
    /// Data slot indices attached to visible nodes, in draw order; the same
    /// slice the preceding [`Layer::update`] received.
    pub data_ids: &'a [u32],
    /// First entry of `data_ids` to draw.
    pub offset: usize,
    /// Number of entries to draw.
    pub count: usize,
    /// Clip rect index per run.
    pub clip_rect_ids: &'a [u32],
    /// Length of each run.
    pub clip_rect_data_counts: &'a [u32],
    /// First clip rect run of this call.
    pub clip_rect_offset: usize,
    /// Number of clip rect runs in this call.
    pub clip_rect_count: usize,
    /// Absolute node offsets, indexed by node id.
    pub node_offsets: &'a [Vec2],
    /// Post-layout node sizes, indexed by node id.
    pub node_sizes: &'a [Size],
    /// Absolute node opacities, indexed by node id.
    pub node_opacities: &'a [f32],
    /// Whether the node is enabled, indexed by node id.
    pub nodes_enabled: &'a [bool],
    /// Global clip rect offsets.
    pub clip_rect_offsets: &'a [Vec2],
    /// Global clip rect sizes.
    pub clip_rect_sizes: &'a [Size],
}

/// A data producer attached to the node hierarchy.
///
/// All hooks have no-op defaults; event hooks that don't call the event's
/// `set_accepted` leave the event propagating to the next candidate.
pub trait Layer: core::any::Any {
    /// The embedded common state.
    fn common(&self) -> &LayerCommon;

    /// The embedded common state, mutably.
    fn common_mut(&mut self) -> &mut LayerCommon;

    /// Type-erasure escape hatch, implemented as `self` in every concrete
    /// layer so callers can get the concrete type back with
    /// [`Ui::layer_downcast`](crate::Ui::layer_downcast).
    fn as_any(&self) -> &dyn core::any::Any;

    /// Mutable variant of [`as_any`](Self::as_any).
    fn as_any_mut(&mut self) -> &mut dyn core::any::Any;

    /// Capabilities of the layer. Expected to stay constant.
    fn features(&self) -> LayerFeatures;

    /// Dirty state of the layer, folded into
    /// [`Ui::state`](crate::Ui::state). Implementations that derive extra
    /// dirtiness (for example from shared state) union it here.
    fn state(&self) -> LayerStates {
        self.common().state()
    }

    /// Called when the UI size is set or changes; only called for layers
    /// with [`LayerFeatures::DRAW`].
    fn set_size(&mut self, _size: Size, _framebuffer_size: Size) {}

    /// Drops data attached to no-longer-valid nodes. `node_generations` is
    /// indexed by node id.
    fn clean_nodes(&mut self, node_generations: &[u32]) {
        self.common_mut().clean_stale_attachments(node_generations);
    }

    /// Prunes animations attached to removed data. `animators` are the
    /// animators with data attachment associated with this layer.
    fn clean_data(&mut self, animators: &mut [&mut dyn Animator]) {
        let mut generations = Vec::new();
        self.common().data_generations_into(&mut generations);
        for animator in animators {
            animator.common_mut().clean_stale_data(&generations);
        }
        self.common_mut().clear_states(LayerStates::NEEDS_DATA_CLEAN);
    }

    /// Called at the head of [`Ui::update`](crate::Ui::update) for layers
    /// that reported [`NEEDS_COMMON_DATA_UPDATE`](LayerStates::NEEDS_COMMON_DATA_UPDATE)
    /// or [`NEEDS_SHARED_DATA_UPDATE`](LayerStates::NEEDS_SHARED_DATA_UPDATE).
    fn pre_update(&mut self, _states: LayerStates) {}

    /// Refreshes per-data state from the current node hierarchy.
    fn update(&mut self, _update: &LayerUpdate<'_>) {}

    /// Composites framebuffer contents under the layer's data; only called
    /// for layers with [`LayerFeatures::COMPOSITE`].
    fn composite(
        &mut self,
        _renderer: &mut dyn Renderer,
        _rect_offsets: &[Vec2],
        _rect_sizes: &[Size],
        _offset: usize,
        _count: usize,
    ) {
    }

    /// Draws a sub-range of the layer's visible data; only called for
    /// layers with [`LayerFeatures::DRAW`].
    fn draw(&mut self, _draw: &LayerDraw<'_>) {}

    /// Advances data animators associated with this layer; only called for
    /// layers with [`LayerFeatures::ANIMATE_DATA`].
    fn advance_data_animations(
        &mut self,
        _time: Duration,
        _buffers: &mut AdvanceBuffers,
        _animators: &mut [&mut dyn DataAnimator],
    ) {
    }

    /// Advances style animators associated with this layer; only called for
    /// layers with [`LayerFeatures::ANIMATE_STYLES`].
    fn advance_style_animations(
        &mut self,
        _time: Duration,
        _buffers: &mut AdvanceBuffers,
        _animators: &mut [&mut dyn StyleAnimator],
    ) {
    }

    /// A pointer was pressed over the data's node.
    fn pointer_press_event(&mut self, _data_id: u32, _event: &mut PointerEvent) {}

    /// A pointer was released over (or captured by) the data's node.
    fn pointer_release_event(&mut self, _data_id: u32, _event: &mut PointerEvent) {}

    /// A pointer moved over (or stayed captured by) the data's node.
    fn pointer_move_event(&mut self, _data_id: u32, _event: &mut PointerMoveEvent) {}

    /// The primary pointer started hovering the data's node.
    fn pointer_enter_event(&mut self, _data_id: u32, _event: &mut PointerMoveEvent) {}

    /// The primary pointer stopped hovering the data's node.
    fn pointer_leave_event(&mut self, _data_id: u32, _event: &mut PointerMoveEvent) {}

    /// The in-progress pointer interaction was taken over or torn down.
    fn pointer_cancel_event(&mut self, _data_id: u32, _event: &mut PointerCancelEvent) {}

    /// A scroll happened over (or was captured by) the data's node.
    fn scroll_event(&mut self, _data_id: u32, _event: &mut ScrollEvent) {}

    /// The data's node gained focus.
    fn focus_event(&mut self, _data_id: u32, _event: &mut FocusEvent) {}

    /// The data's node lost focus.
    fn blur_event(&mut self, _data_id: u32, _event: &mut FocusEvent) {}

    /// A key was pressed while the data's node was focused or hovered.
    fn key_press_event(&mut self, _data_id: u32, _event: &mut KeyEvent) {}

    /// A key was released while the data's node was focused or hovered.
    fn key_release_event(&mut self, _data_id: u32, _event: &mut KeyEvent) {}

    /// Text was input while the data's node was focused.
    fn text_input_event(&mut self, _data_id: u32, _event: &mut TextInputEvent) {}

    /// The data's node stopped being visible, enabled or focusable while it
    /// was pressed, captured, hovered or focused.
    fn visibility_lost_event(&mut self, _data_id: u32, _event: &mut VisibilityLostEvent) {}
}

impl core::fmt::Debug for dyn Layer + '_ {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "dyn Layer({:?})", self.common().handle())
    }
}
