// Copyright 2025 the Canopy Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! The [`Ui`] type: arenas, orderings and the clean / animation-advance
//! passes. The update pipeline lives in `update.rs`, event dispatch in
//! `event.rs`.

use alloc::boxed::Box;
use alloc::vec::Vec;
use core::time::Duration;

use canopy_handle::{Arena, Chain, Chained};
use kurbo::{Size, Vec2};

use crate::animator::{AdvanceBuffers, Animator};
use crate::error::Error;
use crate::handles::{
    AnimationHandle, AnimatorHandle, DataHandle, LayerHandle, LayouterHandle, NodeHandle,
};
use crate::layer::Layer;
use crate::layouter::Layouter;
use crate::node::NodeFlags;
use crate::renderer::{Renderer, RendererFeatures};
use crate::state::{
    AnimatorFeatures, AnimatorStates, LayerFeatures, LayerStates, LayouterStates, NodeAnimations,
    UserInterfaceStates,
};

/// Index sentinel-free alias for node order slots.
type OrderIndex = u32;

#[derive(Debug)]
pub(crate) struct Node {
    pub(crate) parent: Option<NodeHandle>,
    pub(crate) offset: Vec2,
    pub(crate) size: Size,
    pub(crate) opacity: f32,
    pub(crate) flags: NodeFlags,
    /// Index into the node order storage while the node is top-level.
    pub(crate) order: Option<OrderIndex>,
}

/// One entry of the top-level node order.
#[derive(Copy, Clone, Debug)]
pub(crate) struct OrderEntry {
    /// Previous top-level node in back-to-front order.
    pub(crate) previous: Option<NodeHandle>,
    /// Next top-level node; `None` past the last nested node of a
    /// disconnected parent.
    pub(crate) next: Option<NodeHandle>,
    /// Last top-level node nested under this one, the node itself if none.
    /// `None` only transiently while connecting a fresh non-root node.
    pub(crate) last_nested: Option<NodeHandle>,
}

#[derive(Debug)]
pub(crate) enum OrderSlot {
    Used(OrderEntry),
    Free { next: Option<OrderIndex> },
}

impl OrderSlot {
    pub(crate) fn used(&self) -> &OrderEntry {
        match self {
            Self::Used(entry) => entry,
            Self::Free { .. } => unreachable!("order slot is free"),
        }
    }

    fn used_mut(&mut self) -> &mut OrderEntry {
        match self {
            Self::Used(entry) => entry,
            Self::Free { .. } => unreachable!("order slot is free"),
        }
    }
}

#[derive(Debug)]
pub(crate) struct LayerSlot {
    pub(crate) instance: Option<Box<dyn Layer>>,
    /// Cached out of the instance so hot loops can check features of freed
    /// or instance-less layers without a branch; cleared on removal.
    pub(crate) features: LayerFeatures,
    chain: Chain<LayerHandle>,
}

impl Chained<LayerHandle> for LayerSlot {
    fn chain(&self) -> &Chain<LayerHandle> {
        &self.chain
    }

    fn chain_mut(&mut self) -> &mut Chain<LayerHandle> {
        &mut self.chain
    }
}

#[derive(Debug)]
pub(crate) struct LayouterSlot {
    pub(crate) instance: Option<Box<dyn Layouter>>,
    chain: Chain<LayouterHandle>,
}

impl Chained<LayouterHandle> for LayouterSlot {
    fn chain(&self) -> &Chain<LayouterHandle> {
        &self.chain
    }

    fn chain_mut(&mut self) -> &mut Chain<LayouterHandle> {
        &mut self.chain
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub(crate) enum AnimatorKind {
    Generic,
    Node,
    Data,
    Style,
}

#[derive(Debug)]
pub(crate) struct AnimatorSlot {
    pub(crate) instance: Option<Box<dyn Animator>>,
    pub(crate) features: AnimatorFeatures,
    pub(crate) kind: Option<AnimatorKind>,
}

/// Partition of the per-layer region of the animator instance list.
///
/// The region `[start, next layer's start)` holds this layer's
/// data-attachment animators, sub-partitioned as generic `[start,
/// data_start)`, data `[data_start, style_start)` and style `[style_start,
/// end)`.
#[derive(Copy, Clone, Debug, Default)]
pub(crate) struct LayerAnimatorRegion {
    pub(crate) start: usize,
    pub(crate) data_start: usize,
    pub(crate) style_start: usize,
}

/// The user interface runtime.
///
/// Owns the node hierarchy, the layers, layouters and animators installed
/// into it, and all per-frame derived state. See the crate docs for the
/// overall data flow.
#[derive(Debug)]
pub struct Ui {
    pub(crate) renderer: Option<Box<dyn Renderer>>,

    pub(crate) layers: Arena<LayerHandle, LayerSlot>,
    pub(crate) first_layer: Option<LayerHandle>,

    pub(crate) layouters: Arena<LayouterHandle, LayouterSlot>,
    pub(crate) first_layouter: Option<LayouterHandle>,

    pub(crate) animators: Arena<AnimatorHandle, AnimatorSlot>,
    /// All animator instances in advance order: generic without
    /// attachments, generic with node attachment, node animators, then one
    /// region per layer (see [`LayerAnimatorRegion`]).
    pub(crate) animator_instances: Vec<AnimatorHandle>,
    /// Start of the generic-with-node-attachment partition.
    pub(crate) animator_generic_node_start: usize,
    /// Start of the node animator partition.
    pub(crate) animator_node_start: usize,
    /// Per-layer regions, indexed by layer id. Entries for freed layers
    /// stay as collapsed (empty) regions so the running offsets keep
    /// working.
    pub(crate) layer_animator_regions: Vec<LayerAnimatorRegion>,

    pub(crate) nodes: Arena<NodeHandle, Node>,
    pub(crate) node_order: Vec<OrderSlot>,
    pub(crate) first_free_node_order: Option<OrderIndex>,
    pub(crate) first_node_order: Option<NodeHandle>,

    pub(crate) size: Size,
    pub(crate) window_size: Size,
    pub(crate) framebuffer_size: Size,

    pub(crate) state: UserInterfaceStates,
    pub(crate) animation_time: Duration,
    advance_buffers: AdvanceBuffers,

    pub(crate) current_pressed_node: Option<NodeHandle>,
    pub(crate) current_captured_node: Option<NodeHandle>,
    pub(crate) current_hovered_node: Option<NodeHandle>,
    pub(crate) current_focused_node: Option<NodeHandle>,
    pub(crate) current_global_pointer_position: Option<Vec2>,

    // Derived state rebuilt by update(); all of it is indexed as described
    // in update.rs and grows monotonically across frames.
    pub(crate) visible_node_ids: Vec<u32>,
    pub(crate) visible_node_children_counts: Vec<u32>,
    pub(crate) front_to_back_top_level_indices: Vec<u32>,
    pub(crate) node_offsets: Vec<Vec2>,
    pub(crate) node_sizes: Vec<Size>,
    pub(crate) absolute_node_offsets: Vec<Vec2>,
    pub(crate) absolute_node_opacities: Vec<f32>,
    pub(crate) visible_node_mask: Vec<bool>,
    pub(crate) visible_event_node_mask: Vec<bool>,
    pub(crate) visible_enabled_node_mask: Vec<bool>,
    pub(crate) clip_rect_offsets: Vec<Vec2>,
    pub(crate) clip_rect_sizes: Vec<Size>,
    pub(crate) clip_rect_node_counts: Vec<u32>,
    pub(crate) top_level_layout_offsets: Vec<u32>,
    pub(crate) top_level_layout_layouter_ids: Vec<u8>,
    pub(crate) top_level_layout_ids: Vec<u32>,
    pub(crate) layout_masks: Vec<bool>,
    pub(crate) layout_mask_offsets: Vec<usize>,
    /// Per layer id: (data offset, clip rect offset, composite rect offset)
    /// into the `data_to_update_*` arrays; one trailing entry closes the
    /// last layer's ranges.
    pub(crate) data_to_update_layer_offsets: Vec<[usize; 3]>,
    pub(crate) data_to_update_ids: Vec<u32>,
    pub(crate) data_to_update_clip_rect_ids: Vec<u32>,
    pub(crate) data_to_update_clip_rect_data_counts: Vec<u32>,
    pub(crate) composite_rect_offsets: Vec<Vec2>,
    pub(crate) composite_rect_sizes: Vec<Size>,
    pub(crate) data_to_draw_layer_ids: Vec<u32>,
    pub(crate) data_to_draw_offsets: Vec<usize>,
    pub(crate) data_to_draw_sizes: Vec<usize>,
    pub(crate) data_to_draw_clip_rect_offsets: Vec<usize>,
    pub(crate) data_to_draw_clip_rect_sizes: Vec<usize>,
    pub(crate) visible_node_event_data_offsets: Vec<u32>,
    pub(crate) visible_node_event_data: Vec<DataHandle>,
    pub(crate) draw_count: usize,
}

impl Default for Ui {
    fn default() -> Self {
        Self::new_uninitialized()
    }
}

impl Ui {
    /// Creates a runtime without a size; [`set_size`](Self::set_size) has
    /// to be called before the first [`update`](Self::update).
    #[must_use]
    pub fn new_uninitialized() -> Self {
        Self {
            renderer: None,
            layers: Arena::new(),
            first_layer: None,
            layouters: Arena::new(),
            first_layouter: None,
            animators: Arena::new(),
            animator_instances: Vec::new(),
            animator_generic_node_start: 0,
            animator_node_start: 0,
            layer_animator_regions: Vec::new(),
            nodes: Arena::new(),
            node_order: Vec::new(),
            first_free_node_order: None,
            first_node_order: None,
            size: Size::ZERO,
            window_size: Size::ZERO,
            framebuffer_size: Size::ZERO,
            state: UserInterfaceStates::empty(),
            animation_time: Duration::ZERO,
            advance_buffers: AdvanceBuffers::default(),
            current_pressed_node: None,
            current_captured_node: None,
            current_hovered_node: None,
            current_focused_node: None,
            current_global_pointer_position: None,
            visible_node_ids: Vec::new(),
            visible_node_children_counts: Vec::new(),
            front_to_back_top_level_indices: Vec::new(),
            node_offsets: Vec::new(),
            node_sizes: Vec::new(),
            absolute_node_offsets: Vec::new(),
            absolute_node_opacities: Vec::new(),
            visible_node_mask: Vec::new(),
            visible_event_node_mask: Vec::new(),
            visible_enabled_node_mask: Vec::new(),
            clip_rect_offsets: Vec::new(),
            clip_rect_sizes: Vec::new(),
            clip_rect_node_counts: Vec::new(),
            top_level_layout_offsets: Vec::new(),
            top_level_layout_layouter_ids: Vec::new(),
            top_level_layout_ids: Vec::new(),
            layout_masks: Vec::new(),
            layout_mask_offsets: Vec::new(),
            data_to_update_layer_offsets: Vec::new(),
            data_to_update_ids: Vec::new(),
            data_to_update_clip_rect_ids: Vec::new(),
            data_to_update_clip_rect_data_counts: Vec::new(),
            composite_rect_offsets: Vec::new(),
            composite_rect_sizes: Vec::new(),
            data_to_draw_layer_ids: Vec::new(),
            data_to_draw_offsets: Vec::new(),
            data_to_draw_sizes: Vec::new(),
            data_to_draw_clip_rect_offsets: Vec::new(),
            data_to_draw_clip_rect_sizes: Vec::new(),
            visible_node_event_data_offsets: Vec::new(),
            visible_node_event_data: Vec::new(),
            draw_count: 0,
        }
    }

    /// Creates a runtime with a UI size, window size and framebuffer size.
    ///
    /// Events arrive in window coordinates and get scaled by
    /// `size / window_size`; the framebuffer size is handed to the renderer
    /// and to drawing layers.
    pub fn new(size: Size, window_size: Size, framebuffer_size: Size) -> Result<Self, Error> {
        let mut ui = Self::new_uninitialized();
        ui.set_size(size, window_size, framebuffer_size)?;
        Ok(ui)
    }

    /// Creates a runtime with all three sizes equal, for unscaled setups.
    pub fn with_size(size: Size) -> Result<Self, Error> {
        Self::new(size, size, size)
    }

    /// The UI size events and node geometry live in.
    #[must_use]
    pub fn size(&self) -> Size {
        self.size
    }

    /// The window size incoming event positions are relative to.
    #[must_use]
    pub fn window_size(&self) -> Size {
        self.window_size
    }

    /// The framebuffer size drawing happens in.
    #[must_use]
    pub fn framebuffer_size(&self) -> Size {
        self.framebuffer_size
    }

    /// Sets the UI, window and framebuffer sizes. All have to be non-zero.
    pub fn set_size(
        &mut self,
        size: Size,
        window_size: Size,
        framebuffer_size: Size,
    ) -> Result<(), Error> {
        if size.width <= 0.0
            || size.height <= 0.0
            || window_size.width <= 0.0
            || window_size.height <= 0.0
            || framebuffer_size.width <= 0.0
            || framebuffer_size.height <= 0.0
        {
            return Err(Error::ZeroSize);
        }
        let size_changed = self.size != size;
        let framebuffer_changed = self.framebuffer_size != framebuffer_size;
        self.size = size;
        self.window_size = window_size;
        self.framebuffer_size = framebuffer_size;

        if (size_changed || framebuffer_changed)
            && let Some(renderer) = &mut self.renderer
        {
            renderer.setup_framebuffers(framebuffer_size);
        }
        if size_changed || framebuffer_changed {
            for (_, slot) in self.layers.iter_mut() {
                if slot.features.contains(LayerFeatures::DRAW)
                    && let Some(instance) = &mut slot.instance
                {
                    instance.set_size(size, framebuffer_size);
                }
            }
        }
        // A changed size moves the implicit root clip rect, so everything
        // culling-related has to be redone.
        if size_changed && self.nodes.capacity() != 0 {
            self.state |= UserInterfaceStates::NEEDS_NODE_CLIP_UPDATE;
        }
        Ok(())
    }

    /// Sets all three sizes to `size`.
    pub fn set_size_unscaled(&mut self, size: Size) -> Result<(), Error> {
        self.set_size(size, size, size)
    }

    /// What needs to be cleaned, updated or advanced.
    ///
    /// Combines the stored flags with flags derived from polling every
    /// layouter, layer and animator instance, mapped through the dirty
    /// lattice.
    #[must_use]
    pub fn state(&self) -> UserInterfaceStates {
        let mut states = UserInterfaceStates::empty();

        if !self
            .state
            .contains(UserInterfaceStates::NEEDS_LAYOUT_ASSIGNMENT_UPDATE)
        {
            for (_, slot) in self.layouters.iter() {
                let Some(instance) = &slot.instance else {
                    continue;
                };
                let layouter_state = instance.state();
                if layouter_state.contains(LayouterStates::NEEDS_UPDATE) {
                    states |= UserInterfaceStates::NEEDS_LAYOUT_UPDATE;
                }
                if layouter_state.contains(LayouterStates::NEEDS_ASSIGNMENT_UPDATE) {
                    states |= UserInterfaceStates::NEEDS_LAYOUT_ASSIGNMENT_UPDATE;
                }
                if states.contains(UserInterfaceStates::NEEDS_LAYOUT_ASSIGNMENT_UPDATE) {
                    break;
                }
            }
        }

        let layer_saturated = UserInterfaceStates::NEEDS_DATA_ATTACHMENT_UPDATE
            | UserInterfaceStates::NEEDS_DATA_CLEAN;
        if !self.state.contains(layer_saturated) {
            for (_, slot) in self.layers.iter() {
                let Some(instance) = &slot.instance else {
                    continue;
                };
                let layer_state = instance.state();
                if layer_state.intersects(
                    LayerStates::NEEDS_DATA_UPDATE
                        | LayerStates::NEEDS_COMMON_DATA_UPDATE
                        | LayerStates::NEEDS_SHARED_DATA_UPDATE,
                ) {
                    states |= UserInterfaceStates::NEEDS_DATA_UPDATE;
                }
                if layer_state.contains(LayerStates::NEEDS_ATTACHMENT_UPDATE) {
                    states |= UserInterfaceStates::NEEDS_DATA_ATTACHMENT_UPDATE;
                }
                if layer_state.contains(LayerStates::NEEDS_DATA_CLEAN) {
                    states |= UserInterfaceStates::NEEDS_DATA_CLEAN;
                }
                if states.contains(layer_saturated) {
                    break;
                }
            }
        }

        for (_, slot) in self.animators.iter() {
            let Some(instance) = &slot.instance else {
                continue;
            };
            if instance.state().contains(AnimatorStates::NEEDS_ADVANCE) {
                states |= UserInterfaceStates::NEEDS_ANIMATION_ADVANCE;
                break;
            }
        }

        self.state | states
    }

    /// The time of the last [`advance_animations`](Self::advance_animations)
    /// call.
    #[must_use]
    pub fn animation_time(&self) -> Duration {
        self.animation_time
    }

    // --- Renderer ---------------------------------------------------------

    /// Installs the renderer instance.
    pub fn set_renderer_instance(&mut self, instance: Box<dyn Renderer>) -> Result<(), Error> {
        if self.renderer.is_some() {
            return Err(Error::AlreadySet);
        }
        if !instance.features().contains(RendererFeatures::COMPOSITE)
            && self
                .layers
                .iter()
                .any(|(_, slot)| slot.features.contains(LayerFeatures::COMPOSITE))
        {
            return Err(Error::IncompatibleCapabilities);
        }
        let mut instance = instance;
        if self.framebuffer_size != Size::ZERO {
            instance.setup_framebuffers(self.framebuffer_size);
        }
        self.renderer = Some(instance);
        Ok(())
    }

    /// Whether a renderer instance is installed.
    #[must_use]
    pub fn has_renderer_instance(&self) -> bool {
        self.renderer.is_some()
    }

    /// The installed renderer instance.
    pub fn renderer(&mut self) -> Result<&mut (dyn Renderer + 'static), Error> {
        self.renderer
            .as_deref_mut()
            .ok_or(Error::NoInstance)
    }

    // --- Layers -----------------------------------------------------------

    /// Number of layer slots ever created, including removed ones.
    #[must_use]
    pub fn layer_capacity(&self) -> usize {
        self.layers.capacity()
    }

    /// Number of live layers. Linear in the free-list length.
    #[must_use]
    pub fn layer_used_count(&self) -> usize {
        self.layers.used_count()
    }

    /// Whether `layer` is a live layer handle.
    #[must_use]
    pub fn is_layer_valid(&self, layer: LayerHandle) -> bool {
        self.layers.is_valid(layer)
    }

    /// Whether `data` refers to live data of a live layer with an instance.
    #[must_use]
    pub fn is_data_valid(&self, data: DataHandle) -> bool {
        self.layers
            .get(data.layer())
            .and_then(|slot| slot.instance.as_ref())
            .is_some_and(|instance| instance.common().is_data_valid(data.data()))
    }

    /// Writes the per-slot layer generations into `out`, indexed by layer
    /// id.
    pub fn layer_generations_into(&self, out: &mut Vec<u32>) {
        self.layers.generations_into(out);
    }

    /// Back-most layer in draw order.
    #[must_use]
    pub fn layer_first(&self) -> Option<LayerHandle> {
        self.first_layer
    }

    /// Front-most layer in draw order.
    #[must_use]
    pub fn layer_last(&self) -> Option<LayerHandle> {
        self.layers.chain_last(self.first_layer)
    }

    /// Layer drawn right after `layer`, `None` for the front-most one.
    pub fn layer_next(&self, layer: LayerHandle) -> Result<Option<LayerHandle>, Error> {
        if !self.layers.is_valid(layer) {
            return Err(Error::InvalidHandle);
        }
        Ok(self.layers.chain_next(self.first_layer, layer))
    }

    /// Layer drawn right before `layer`, `None` for the back-most one.
    pub fn layer_previous(&self, layer: LayerHandle) -> Result<Option<LayerHandle>, Error> {
        if !self.layers.is_valid(layer) {
            return Err(Error::InvalidHandle);
        }
        Ok(self.layers.chain_previous(self.first_layer, layer))
    }

    /// Creates a layer drawn before `before`, or front-most when `before`
    /// is `None`. The instance comes separately via
    /// [`set_layer_instance`](Self::set_layer_instance).
    pub fn create_layer(&mut self, before: Option<LayerHandle>) -> Result<LayerHandle, Error> {
        if let Some(before) = before
            && !self.layers.is_valid(before)
        {
            return Err(Error::InvalidHandle);
        }
        let handle = self.layers.allocate(LayerSlot {
            instance: None,
            features: LayerFeatures::empty(),
            chain: Chain::default(),
        })?;
        let mut first = self.first_layer;
        self.layers.chain_insert_before(&mut first, handle, before);
        self.first_layer = first;

        // (Re)initialize this layer's animator region as empty, positioned
        // after the previous layer id's region.
        let id = handle.index() as usize;
        if id >= self.layer_animator_regions.len() {
            debug_assert_eq!(id, self.layer_animator_regions.len());
            let start = self.animator_instances.len();
            self.layer_animator_regions.push(LayerAnimatorRegion {
                start,
                data_start: start,
                style_start: start,
            });
        } else {
            let start = self.layer_animator_regions[id].start;
            self.layer_animator_regions[id] = LayerAnimatorRegion {
                start,
                data_start: start,
                style_start: start,
            };
        }
        Ok(handle)
    }

    /// Installs a layer instance into the slot its
    /// [`LayerCommon`](crate::LayerCommon) was created for.
    pub fn set_layer_instance(&mut self, instance: Box<dyn Layer>) -> Result<(), Error> {
        let handle = instance.common().handle();
        if !self.layers.is_valid(handle) {
            return Err(Error::InvalidHandle);
        }
        let features = instance.features();
        if features.contains(LayerFeatures::COMPOSITE)
            && let Some(renderer) = &self.renderer
            && !renderer.features().contains(RendererFeatures::COMPOSITE)
        {
            return Err(Error::IncompatibleCapabilities);
        }
        let slot = self.layers.get_mut(handle).expect("validity checked");
        if slot.instance.is_some() {
            return Err(Error::AlreadySet);
        }
        slot.features = features;
        slot.instance = Some(instance);
        if self.size != Size::ZERO && features.contains(LayerFeatures::DRAW) {
            let size = self.size;
            let framebuffer_size = self.framebuffer_size;
            let slot = self.layers.get_mut(handle).expect("validity checked");
            if let Some(instance) = &mut slot.instance {
                instance.set_size(size, framebuffer_size);
            }
        }
        Ok(())
    }

    /// Whether `layer` has an instance installed.
    pub fn has_layer_instance(&self, layer: LayerHandle) -> Result<bool, Error> {
        self.layers
            .get(layer)
            .map(|slot| slot.instance.is_some())
            .ok_or(Error::InvalidHandle)
    }

    /// The instance installed for `layer`.
    pub fn layer(&self, layer: LayerHandle) -> Result<&dyn Layer, Error> {
        self.layers
            .get(layer)
            .ok_or(Error::InvalidHandle)?
            .instance
            .as_deref()
            .ok_or(Error::NoInstance)
    }

    /// The instance installed for `layer`, mutably.
    pub fn layer_mut(&mut self, layer: LayerHandle) -> Result<&mut dyn Layer, Error> {
        self.layers
            .get_mut(layer)
            .ok_or(Error::InvalidHandle)?
            .instance
            .as_deref_mut()
            .ok_or(Error::NoInstance)
    }

    /// The instance installed for `layer`, downcast to its concrete type.
    ///
    /// Fails with [`Error::IncompatibleCapabilities`] if the installed
    /// instance isn't a `T`.
    pub fn layer_downcast<T: Layer>(&self, layer: LayerHandle) -> Result<&T, Error> {
        self.layer(layer)?
            .as_any()
            .downcast_ref()
            .ok_or(Error::IncompatibleCapabilities)
    }

    /// Mutable variant of [`layer_downcast`](Self::layer_downcast).
    pub fn layer_downcast_mut<T: Layer>(&mut self, layer: LayerHandle) -> Result<&mut T, Error> {
        self.layer_mut(layer)?
            .as_any_mut()
            .downcast_mut()
            .ok_or(Error::IncompatibleCapabilities)
    }

    /// Removes a layer together with its instance and data.
    ///
    /// Animators associated with the layer stop being advanced but stay
    /// installed.
    pub fn remove_layer(&mut self, layer: LayerHandle) -> Result<(), Error> {
        if !self.layers.is_valid(layer) {
            return Err(Error::InvalidHandle);
        }
        let mut first = self.first_layer;
        self.layers.chain_remove(&mut first, layer);
        self.first_layer = first;

        // Prune the layer's animator region from the instance list; the
        // instances themselves stay installed.
        let id = layer.index() as usize;
        let region = self.layer_animator_regions[id];
        let end = self.layer_region_end(id);
        let count = end - region.start;
        if count != 0 {
            self.animator_instances.drain(region.start..end);
            for later in &mut self.layer_animator_regions[id + 1..] {
                later.start -= count;
                later.data_start -= count;
                later.style_start -= count;
            }
        }
        self.layer_animator_regions[id] = LayerAnimatorRegion {
            start: region.start,
            data_start: region.start,
            style_start: region.start,
        };

        self.layers.remove(layer).expect("validity checked");
        self.state |= UserInterfaceStates::NEEDS_DATA_ATTACHMENT_UPDATE;
        Ok(())
    }

    /// Attaches layer data to a node.
    ///
    /// A previously attached node is replaced. Data stay attached until the
    /// node or the data are removed.
    pub fn attach_data(&mut self, node: NodeHandle, data: DataHandle) -> Result<(), Error> {
        if !self.nodes.is_valid(node) {
            return Err(Error::InvalidHandle);
        }
        let slot = self.layers.get_mut(data.layer()).ok_or(Error::InvalidHandle)?;
        let instance = slot.instance.as_deref_mut().ok_or(Error::NoInstance)?;
        instance.common_mut().attach(data.data(), Some(node))?;
        self.state |= UserInterfaceStates::NEEDS_DATA_ATTACHMENT_UPDATE;
        Ok(())
    }

    pub(crate) fn layer_region_end(&self, id: usize) -> usize {
        self.layer_animator_regions
            .get(id + 1..)
            .into_iter()
            .flatten()
            .next()
            .map_or(self.animator_instances.len(), |region| region.start)
    }

    // --- Layouters --------------------------------------------------------

    /// Number of layouter slots ever created, including removed ones.
    #[must_use]
    pub fn layouter_capacity(&self) -> usize {
        self.layouters.capacity()
    }

    /// Number of live layouters. Linear in the free-list length.
    #[must_use]
    pub fn layouter_used_count(&self) -> usize {
        self.layouters.used_count()
    }

    /// Whether `layouter` is a live layouter handle.
    #[must_use]
    pub fn is_layouter_valid(&self, layouter: LayouterHandle) -> bool {
        self.layouters.is_valid(layouter)
    }

    /// Whether `layout` refers to a live layout of a live layouter with an
    /// instance.
    #[must_use]
    pub fn is_layout_valid(&self, layout: crate::handles::LayoutHandle) -> bool {
        self.layouters
            .get(layout.layouter())
            .and_then(|slot| slot.instance.as_ref())
            .is_some_and(|instance| instance.common().is_layout_valid(layout.layout()))
    }

    /// Writes the per-slot layouter generations into `out`, indexed by
    /// layouter id.
    pub fn layouter_generations_into(&self, out: &mut Vec<u32>) {
        self.layouters.generations_into(out);
    }

    /// First layouter in layout order.
    #[must_use]
    pub fn layouter_first(&self) -> Option<LayouterHandle> {
        self.first_layouter
    }

    /// Last layouter in layout order.
    #[must_use]
    pub fn layouter_last(&self) -> Option<LayouterHandle> {
        self.layouters.chain_last(self.first_layouter)
    }

    /// Layouter ordered right after `layouter`.
    pub fn layouter_next(&self, layouter: LayouterHandle) -> Result<Option<LayouterHandle>, Error> {
        if !self.layouters.is_valid(layouter) {
            return Err(Error::InvalidHandle);
        }
        Ok(self.layouters.chain_next(self.first_layouter, layouter))
    }

    /// Layouter ordered right before `layouter`.
    pub fn layouter_previous(
        &self,
        layouter: LayouterHandle,
    ) -> Result<Option<LayouterHandle>, Error> {
        if !self.layouters.is_valid(layouter) {
            return Err(Error::InvalidHandle);
        }
        Ok(self.layouters.chain_previous(self.first_layouter, layouter))
    }

    /// Creates a layouter ordered before `before`, or last when `before`
    /// is `None`.
    pub fn create_layouter(
        &mut self,
        before: Option<LayouterHandle>,
    ) -> Result<LayouterHandle, Error> {
        if let Some(before) = before
            && !self.layouters.is_valid(before)
        {
            return Err(Error::InvalidHandle);
        }
        let handle = self.layouters.allocate(LayouterSlot {
            instance: None,
            chain: Chain::default(),
        })?;
        let mut first = self.first_layouter;
        self.layouters.chain_insert_before(&mut first, handle, before);
        self.first_layouter = first;
        Ok(handle)
    }

    /// Installs a layouter instance into the slot its
    /// [`LayouterCommon`](crate::LayouterCommon) was created for.
    pub fn set_layouter_instance(&mut self, instance: Box<dyn Layouter>) -> Result<(), Error> {
        let handle = instance.common().handle();
        if !self.layouters.is_valid(handle) {
            return Err(Error::InvalidHandle);
        }
        let slot = self.layouters.get_mut(handle).expect("validity checked");
        if slot.instance.is_some() {
            return Err(Error::AlreadySet);
        }
        slot.instance = Some(instance);
        Ok(())
    }

    /// Whether `layouter` has an instance installed.
    pub fn has_layouter_instance(&self, layouter: LayouterHandle) -> Result<bool, Error> {
        self.layouters
            .get(layouter)
            .map(|slot| slot.instance.is_some())
            .ok_or(Error::InvalidHandle)
    }

    /// The instance installed for `layouter`.
    pub fn layouter(&self, layouter: LayouterHandle) -> Result<&dyn Layouter, Error> {
        self.layouters
            .get(layouter)
            .ok_or(Error::InvalidHandle)?
            .instance
            .as_deref()
            .ok_or(Error::NoInstance)
    }

    /// The instance installed for `layouter`, mutably.
    pub fn layouter_mut(&mut self, layouter: LayouterHandle) -> Result<&mut (dyn Layouter + 'static), Error> {
        self.layouters
            .get_mut(layouter)
            .ok_or(Error::InvalidHandle)?
            .instance
            .as_deref_mut()
            .ok_or(Error::NoInstance)
    }

    /// Removes a layouter together with its instance and layouts.
    pub fn remove_layouter(&mut self, layouter: LayouterHandle) -> Result<(), Error> {
        if !self.layouters.is_valid(layouter) {
            return Err(Error::InvalidHandle);
        }
        let mut first = self.first_layouter;
        self.layouters.chain_remove(&mut first, layouter);
        self.first_layouter = first;
        self.layouters.remove(layouter).expect("validity checked");
        self.state |= UserInterfaceStates::NEEDS_LAYOUT_ASSIGNMENT_UPDATE;
        Ok(())
    }

    // --- Animators --------------------------------------------------------

    /// Number of animator slots ever created, including removed ones.
    #[must_use]
    pub fn animator_capacity(&self) -> usize {
        self.animators.capacity()
    }

    /// Number of live animators. Linear in the free-list length.
    #[must_use]
    pub fn animator_used_count(&self) -> usize {
        self.animators.used_count()
    }

    /// Whether `animator` is a live animator handle.
    #[must_use]
    pub fn is_animator_valid(&self, animator: AnimatorHandle) -> bool {
        self.animators.is_valid(animator)
    }

    /// Whether `animation` refers to a live animation of a live animator
    /// with an instance.
    #[must_use]
    pub fn is_animation_valid(&self, animation: AnimationHandle) -> bool {
        self.animators
            .get(animation.animator())
            .and_then(|slot| slot.instance.as_ref())
            .is_some_and(|instance| instance.common().is_animation_valid(animation.animation()))
    }

    /// Writes the per-slot animator generations into `out`, indexed by
    /// animator id.
    pub fn animator_generations_into(&self, out: &mut Vec<u32>) {
        self.animators.generations_into(out);
    }

    /// Creates an animator. The instance comes separately via one of the
    /// `set_*_animator_instance` calls.
    pub fn create_animator(&mut self) -> Result<AnimatorHandle, Error> {
        Ok(self.animators.allocate(AnimatorSlot {
            instance: None,
            features: AnimatorFeatures::empty(),
            kind: None,
        })?)
    }

    /// Installs a generic animator instance.
    ///
    /// Generic animators may carry node or data attachments; data
    /// attachments require the instance's layer to be set and to support
    /// [`LayerFeatures::ANIMATE_DATA`].
    pub fn set_generic_animator_instance(
        &mut self,
        mut instance: Box<dyn Animator>,
    ) -> Result<(), Error> {
        if instance.as_generic().is_none() {
            return Err(Error::IncompatibleCapabilities);
        }
        let features = instance.features();
        let position = if features.contains(AnimatorFeatures::DATA_ATTACHMENT) {
            let id = self.check_animator_layer(instance.as_ref(), LayerFeatures::ANIMATE_DATA)?;
            let position = self.layer_animator_regions[id].data_start;
            self.layer_animator_regions[id].data_start += 1;
            self.layer_animator_regions[id].style_start += 1;
            self.shift_regions_after(id);
            position
        } else if features.contains(AnimatorFeatures::NODE_ATTACHMENT) {
            let position = self.animator_node_start;
            self.animator_node_start += 1;
            self.shift_all_regions();
            position
        } else {
            let position = self.animator_generic_node_start;
            self.animator_generic_node_start += 1;
            self.animator_node_start += 1;
            self.shift_all_regions();
            position
        };
        self.install_animator(instance, AnimatorKind::Generic, position)
    }

    /// Installs a node animator instance; it has to support
    /// [`AnimatorFeatures::NODE_ATTACHMENT`].
    pub fn set_node_animator_instance(
        &mut self,
        mut instance: Box<dyn Animator>,
    ) -> Result<(), Error> {
        if instance.as_node().is_none()
            || !instance
                .features()
                .contains(AnimatorFeatures::NODE_ATTACHMENT)
        {
            return Err(Error::IncompatibleCapabilities);
        }
        let position = self
            .layer_animator_regions
            .first()
            .map_or(self.animator_instances.len(), |region| region.start);
        self.shift_all_regions();
        self.install_animator(instance, AnimatorKind::Node, position)
    }

    /// Installs a data animator instance; it has to support
    /// [`AnimatorFeatures::DATA_ATTACHMENT`] and be associated with a layer
    /// supporting [`LayerFeatures::ANIMATE_DATA`].
    pub fn set_data_animator_instance(
        &mut self,
        mut instance: Box<dyn Animator>,
    ) -> Result<(), Error> {
        if instance.as_data().is_none()
            || !instance
                .features()
                .contains(AnimatorFeatures::DATA_ATTACHMENT)
        {
            return Err(Error::IncompatibleCapabilities);
        }
        let id = self.check_animator_layer(instance.as_ref(), LayerFeatures::ANIMATE_DATA)?;
        let position = self.layer_animator_regions[id].style_start;
        self.layer_animator_regions[id].style_start += 1;
        self.shift_regions_after(id);
        self.install_animator(instance, AnimatorKind::Data, position)
    }

    /// Installs a style animator instance; it has to support
    /// [`AnimatorFeatures::DATA_ATTACHMENT`] and be associated with a layer
    /// supporting [`LayerFeatures::ANIMATE_STYLES`].
    pub fn set_style_animator_instance(
        &mut self,
        mut instance: Box<dyn Animator>,
    ) -> Result<(), Error> {
        if instance.as_style().is_none()
            || !instance
                .features()
                .contains(AnimatorFeatures::DATA_ATTACHMENT)
        {
            return Err(Error::IncompatibleCapabilities);
        }
        let id = self.check_animator_layer(instance.as_ref(), LayerFeatures::ANIMATE_STYLES)?;
        let position = self.layer_region_end(id);
        self.shift_regions_after(id);
        self.install_animator(instance, AnimatorKind::Style, position)
    }

    fn check_animator_layer(
        &self,
        instance: &dyn Animator,
        needed: LayerFeatures,
    ) -> Result<usize, Error> {
        let layer = instance
            .common()
            .layer()
            .ok_or(Error::IncompatibleCapabilities)?;
        let slot = self.layers.get(layer).ok_or(Error::InvalidHandle)?;
        if !slot.features.contains(needed) {
            return Err(Error::IncompatibleCapabilities);
        }
        Ok(layer.index() as usize)
    }

    fn shift_all_regions(&mut self) {
        for region in &mut self.layer_animator_regions {
            region.start += 1;
            region.data_start += 1;
            region.style_start += 1;
        }
    }

    fn shift_regions_after(&mut self, id: usize) {
        for region in &mut self.layer_animator_regions[id + 1..] {
            region.start += 1;
            region.data_start += 1;
            region.style_start += 1;
        }
    }

    fn install_animator(
        &mut self,
        instance: Box<dyn Animator>,
        kind: AnimatorKind,
        position: usize,
    ) -> Result<(), Error> {
        let handle = instance.common().handle();
        let features = instance.features();
        let Some(slot) = self.animators.get_mut(handle) else {
            return Err(Error::InvalidHandle);
        };
        if slot.instance.is_some() {
            return Err(Error::AlreadySet);
        }
        slot.instance = Some(instance);
        slot.features = features;
        slot.kind = Some(kind);
        self.animator_instances.insert(position, handle);
        Ok(())
    }

    /// Whether `animator` has an instance installed.
    pub fn has_animator_instance(&self, animator: AnimatorHandle) -> Result<bool, Error> {
        self.animators
            .get(animator)
            .map(|slot| slot.instance.is_some())
            .ok_or(Error::InvalidHandle)
    }

    /// The instance installed for `animator`.
    pub fn animator(&self, animator: AnimatorHandle) -> Result<&dyn Animator, Error> {
        self.animators
            .get(animator)
            .ok_or(Error::InvalidHandle)?
            .instance
            .as_deref()
            .ok_or(Error::NoInstance)
    }

    /// The instance installed for `animator`, mutably.
    pub fn animator_mut(&mut self, animator: AnimatorHandle) -> Result<&mut (dyn Animator + 'static), Error> {
        self.animators
            .get_mut(animator)
            .ok_or(Error::InvalidHandle)?
            .instance
            .as_deref_mut()
            .ok_or(Error::NoInstance)
    }

    /// Removes an animator together with its instance and animations.
    pub fn remove_animator(&mut self, animator: AnimatorHandle) -> Result<(), Error> {
        if !self.animators.is_valid(animator) {
            return Err(Error::InvalidHandle);
        }
        if let Some(position) = self
            .animator_instances
            .iter()
            .position(|handle| *handle == animator)
        {
            self.animator_instances.remove(position);
            if position < self.animator_generic_node_start {
                self.animator_generic_node_start -= 1;
            }
            if position < self.animator_node_start {
                self.animator_node_start -= 1;
            }
            for region in &mut self.layer_animator_regions {
                if position < region.start {
                    region.start -= 1;
                }
                if position < region.data_start {
                    region.data_start -= 1;
                }
                if position < region.style_start {
                    region.style_start -= 1;
                }
            }
        }
        self.animators.remove(animator).expect("validity checked");
        Ok(())
    }

    /// Attaches an animation to a node. The animation is pruned when the
    /// node is removed.
    pub fn attach_node_animation(
        &mut self,
        node: NodeHandle,
        animation: AnimationHandle,
    ) -> Result<(), Error> {
        if !self.nodes.is_valid(node) {
            return Err(Error::InvalidHandle);
        }
        let slot = self
            .animators
            .get_mut(animation.animator())
            .ok_or(Error::InvalidHandle)?;
        if !slot.features.contains(AnimatorFeatures::NODE_ATTACHMENT) {
            return Err(Error::IncompatibleCapabilities);
        }
        let instance = slot.instance.as_deref_mut().ok_or(Error::NoInstance)?;
        instance
            .common_mut()
            .attach_node(animation.animation(), Some(node))
    }

    /// Attaches an animation to layer data of the animator's associated
    /// layer. The animation is pruned when the data are removed.
    pub fn attach_data_animation(
        &mut self,
        data: DataHandle,
        animation: AnimationHandle,
    ) -> Result<(), Error> {
        if !self.is_data_valid(data) {
            return Err(Error::InvalidHandle);
        }
        let slot = self
            .animators
            .get_mut(animation.animator())
            .ok_or(Error::InvalidHandle)?;
        if !slot.features.contains(AnimatorFeatures::DATA_ATTACHMENT) {
            return Err(Error::IncompatibleCapabilities);
        }
        let instance = slot.instance.as_deref_mut().ok_or(Error::NoInstance)?;
        if instance.common().layer() != Some(data.layer()) {
            return Err(Error::IncompatibleCapabilities);
        }
        instance
            .common_mut()
            .attach_data(animation.animation(), Some(data.data()))
    }

    // --- Nodes ------------------------------------------------------------

    /// Number of node slots ever created, including removed ones.
    #[must_use]
    pub fn node_capacity(&self) -> usize {
        self.nodes.capacity()
    }

    /// Number of live nodes. Linear in the free-list length.
    #[must_use]
    pub fn node_used_count(&self) -> usize {
        self.nodes.used_count()
    }

    /// Whether `node` is a live node handle.
    #[must_use]
    pub fn is_node_valid(&self, node: NodeHandle) -> bool {
        self.nodes.is_valid(node)
    }

    /// Writes the per-slot node generations into `out`, indexed by node
    /// id. A handle is live iff its generation matches the slot's.
    pub fn node_generations_into(&self, out: &mut Vec<u32>) {
        self.nodes.generations_into(out);
    }

    /// Creates a node.
    ///
    /// A node with no parent is a root node and is implicitly ordered
    /// front-most among top-level nodes.
    pub fn create_node(
        &mut self,
        parent: Option<NodeHandle>,
        offset: Vec2,
        size: Size,
        flags: NodeFlags,
    ) -> Result<NodeHandle, Error> {
        if let Some(parent) = parent
            && !self.nodes.is_valid(parent)
        {
            return Err(Error::InvalidHandle);
        }
        let handle = self.nodes.allocate(Node {
            parent,
            offset,
            size,
            opacity: 1.0,
            flags,
            order: None,
        })?;
        if parent.is_none() {
            self.set_node_order(handle, None)?;
        }
        self.state |= UserInterfaceStates::NEEDS_NODE_UPDATE;
        Ok(handle)
    }

    /// The parent of `node`, `None` for root nodes.
    pub fn node_parent(&self, node: NodeHandle) -> Result<Option<NodeHandle>, Error> {
        self.nodes
            .get(node)
            .map(|n| n.parent)
            .ok_or(Error::InvalidHandle)
    }

    /// The offset of `node` relative to its parent, before layout.
    pub fn node_offset(&self, node: NodeHandle) -> Result<Vec2, Error> {
        self.nodes
            .get(node)
            .map(|n| n.offset)
            .ok_or(Error::InvalidHandle)
    }

    /// Sets the offset of `node` relative to its parent.
    pub fn set_node_offset(&mut self, node: NodeHandle, offset: Vec2) -> Result<(), Error> {
        let n = self.nodes.get_mut(node).ok_or(Error::InvalidHandle)?;
        n.offset = offset;
        self.state |= UserInterfaceStates::NEEDS_LAYOUT_UPDATE;
        Ok(())
    }

    /// The size of `node`, before layout.
    pub fn node_size(&self, node: NodeHandle) -> Result<Size, Error> {
        self.nodes
            .get(node)
            .map(|n| n.size)
            .ok_or(Error::InvalidHandle)
    }

    /// Sets the size of `node`.
    pub fn set_node_size(&mut self, node: NodeHandle, size: Size) -> Result<(), Error> {
        let n = self.nodes.get_mut(node).ok_or(Error::InvalidHandle)?;
        n.size = size;
        self.state |= UserInterfaceStates::NEEDS_LAYOUT_UPDATE;
        Ok(())
    }

    /// The local opacity of `node`.
    pub fn node_opacity(&self, node: NodeHandle) -> Result<f32, Error> {
        self.nodes
            .get(node)
            .map(|n| n.opacity)
            .ok_or(Error::InvalidHandle)
    }

    /// Sets the local opacity of `node`; the effective opacity is the
    /// product along the parent chain.
    pub fn set_node_opacity(&mut self, node: NodeHandle, opacity: f32) -> Result<(), Error> {
        let n = self.nodes.get_mut(node).ok_or(Error::InvalidHandle)?;
        n.opacity = opacity;
        self.state |= UserInterfaceStates::NEEDS_NODE_OPACITY_UPDATE;
        Ok(())
    }

    /// The flags of `node`.
    pub fn node_flags(&self, node: NodeHandle) -> Result<NodeFlags, Error> {
        self.nodes
            .get(node)
            .map(|n| n.flags)
            .ok_or(Error::InvalidHandle)
    }

    /// Replaces the flags of `node`.
    pub fn set_node_flags(&mut self, node: NodeHandle, flags: NodeFlags) -> Result<(), Error> {
        if !self.nodes.is_valid(node) {
            return Err(Error::InvalidHandle);
        }
        self.set_node_flags_internal(node, flags);
        Ok(())
    }

    /// Adds `flags` to the flags of `node`.
    pub fn add_node_flags(&mut self, node: NodeHandle, flags: NodeFlags) -> Result<(), Error> {
        let current = self.node_flags(node)?;
        self.set_node_flags_internal(node, current | flags);
        Ok(())
    }

    /// Clears `flags` from the flags of `node`.
    pub fn clear_node_flags(&mut self, node: NodeHandle, flags: NodeFlags) -> Result<(), Error> {
        let current = self.node_flags(node)?;
        self.set_node_flags_internal(node, current & !flags);
        Ok(())
    }

    fn set_node_flags_internal(&mut self, node: NodeHandle, flags: NodeFlags) {
        let n = self.nodes.get_mut(node).expect("validity checked");
        let changed = n.flags ^ flags;
        n.flags = flags;
        if changed.contains(NodeFlags::HIDDEN) {
            self.state |= UserInterfaceStates::NEEDS_NODE_UPDATE;
        }
        if changed.contains(NodeFlags::CLIP) {
            self.state |= UserInterfaceStates::NEEDS_NODE_CLIP_UPDATE;
        }
        if changed.intersects(NodeFlags::NO_EVENTS | NodeFlags::DISABLED | NodeFlags::FOCUSABLE) {
            self.state |= UserInterfaceStates::NEEDS_NODE_ENABLED_UPDATE;
        }
        if changed.contains(NodeFlags::NO_BLUR) {
            self.state |= UserInterfaceStates::NEEDS_NODE_EVENT_MASK_UPDATE;
        }
    }

    /// Removes `node`. Its children, data, layouts and animations are
    /// pruned by the next [`clean`](Self::clean).
    pub fn remove_node(&mut self, node: NodeHandle) -> Result<(), Error> {
        if !self.nodes.is_valid(node) {
            return Err(Error::InvalidHandle);
        }
        self.remove_node_internal(node);
        self.state |= UserInterfaceStates::NEEDS_NODE_CLEAN;
        Ok(())
    }

    pub(crate) fn remove_node_internal(&mut self, node: NodeHandle) {
        if self
            .nodes
            .get(node)
            .expect("caller checked validity")
            .order
            .is_some()
        {
            self.clear_node_order_internal(node);

            // Free the order slots of this node and all top-level nodes
            // nested under it; clear_node_order_internal() left a null next
            // past the last nested one.
            let mut current = Some(node);
            while let Some(handle) = current {
                let order = self
                    .nodes
                    .get(handle)
                    .expect("nested top-level handles are live")
                    .order
                    .expect("nested chain entries are ordered");
                current = self.node_order[order as usize].used().next;
                self.node_order[order as usize] = OrderSlot::Free {
                    next: self.first_free_node_order,
                };
                self.first_free_node_order = Some(order);
                self.nodes
                    .get_mut(handle)
                    .expect("nested top-level handles are live")
                    .order = None;
            }
        }

        self.nodes.remove(node).expect("caller checked validity");
    }

    // --- Top-level node order --------------------------------------------

    /// Number of node order slots ever allocated.
    #[must_use]
    pub fn node_order_capacity(&self) -> usize {
        self.node_order.len()
    }

    /// Number of node order slots in use. Linear in the free-list length.
    #[must_use]
    pub fn node_order_used_count(&self) -> usize {
        let mut free = 0;
        let mut next = self.first_free_node_order;
        while let Some(index) = next {
            free += 1;
            next = match self.node_order[index as usize] {
                OrderSlot::Free { next } => next,
                OrderSlot::Used(_) => unreachable!("free list links free slots"),
            };
        }
        self.node_order.len() - free
    }

    /// Back-most top-level node.
    #[must_use]
    pub fn node_order_first(&self) -> Option<NodeHandle> {
        self.first_node_order
    }

    /// Front-most top-level node (the last nested one of the front-most
    /// root hierarchy included).
    #[must_use]
    pub fn node_order_last(&self) -> Option<NodeHandle> {
        let first = self.first_node_order?;
        let order = self.nodes.get(first)?.order?;
        self.node_order[order as usize].used().previous
    }

    /// Whether `node` is top-level, i.e. it participates in the global
    /// draw and event order directly. Root nodes always are; other nodes
    /// become top-level via [`set_node_order`](Self::set_node_order).
    pub fn is_node_top_level(&self, node: NodeHandle) -> Result<bool, Error> {
        self.nodes
            .get(node)
            .map(|n| n.order.is_some())
            .ok_or(Error::InvalidHandle)
    }

    /// Whether `node` is top-level and currently connected to the order,
    /// i.e. visible subject to the usual rules.
    pub fn is_node_ordered(&self, node: NodeHandle) -> Result<bool, Error> {
        let n = self.nodes.get(node).ok_or(Error::InvalidHandle)?;
        Ok(match n.order {
            Some(order) => self.node_order[order as usize].used().previous.is_some(),
            None => false,
        })
    }

    /// Top-level node ordered right after `node` (drawn in front of it),
    /// `None` for the front-most one.
    pub fn node_order_next(&self, node: NodeHandle) -> Result<Option<NodeHandle>, Error> {
        let n = self.nodes.get(node).ok_or(Error::InvalidHandle)?;
        let Some(order) = n.order else {
            return Ok(None);
        };
        let next = self.node_order[order as usize].used().next;
        Ok(if next == self.first_node_order {
            None
        } else {
            next
        })
    }

    /// Top-level node ordered right before `node` (drawn behind it),
    /// `None` for the back-most one.
    pub fn node_order_previous(&self, node: NodeHandle) -> Result<Option<NodeHandle>, Error> {
        let n = self.nodes.get(node).ok_or(Error::InvalidHandle)?;
        if Some(node) == self.first_node_order {
            return Ok(None);
        }
        let Some(order) = n.order else {
            return Ok(None);
        };
        Ok(self.node_order[order as usize].used().previous)
    }

    /// Last top-level node nested under `node` in the order; `node` itself
    /// if there are none or it isn't top-level.
    pub fn node_order_last_nested(&self, node: NodeHandle) -> Result<NodeHandle, Error> {
        let n = self.nodes.get(node).ok_or(Error::InvalidHandle)?;
        let Some(order) = n.order else {
            return Ok(node);
        };
        Ok(self.node_order[order as usize]
            .used()
            .last_nested
            .unwrap_or(node))
    }

    fn allocate_node_order(&mut self) -> OrderIndex {
        if let Some(index) = self.first_free_node_order {
            self.first_free_node_order = match self.node_order[index as usize] {
                OrderSlot::Free { next } => next,
                OrderSlot::Used(_) => unreachable!("free list links free slots"),
            };
            index
        } else {
            let index = self.node_order.len() as OrderIndex;
            self.node_order.push(OrderSlot::Free { next: None });
            index
        }
    }

    fn order_of(&self, node: NodeHandle) -> OrderIndex {
        self.nodes
            .get(node)
            .expect("caller checked validity")
            .order
            .expect("caller checked top-level")
    }

    /// Walks `parent` and its ancestors, updating every order entry whose
    /// `last_nested` is `last_nested` to `replace`. Ancestors whose range
    /// ends elsewhere end further out, so the walk can stop at the first
    /// mismatch.
    fn update_parent_last_nested(
        &mut self,
        mut parent: Option<NodeHandle>,
        last_nested: NodeHandle,
        replace: NodeHandle,
    ) {
        while let Some(handle) = parent {
            let node = self.nodes.get(handle).expect("parents of live nodes are live");
            parent = node.parent;
            if let Some(order) = node.order {
                let entry = self.node_order[order as usize].used_mut();
                if entry.last_nested == Some(last_nested) {
                    entry.last_nested = Some(replace);
                } else {
                    break;
                }
            }
        }
    }

    /// Disconnects a top-level `node` (with its nested top-level range)
    /// from the order chain. Returns false if it wasn't connected. The
    /// order slot stays allocated.
    fn clear_node_order_internal(&mut self, node: NodeHandle) -> bool {
        let order = self.order_of(node);
        let entry = *self.node_order[order as usize].used();
        let last_nested = entry.last_nested.expect("connected entries know their range");
        let last_nested_order = self.order_of(last_nested);

        let Some(previous) = entry.previous else {
            debug_assert!(self.node_order[last_nested_order as usize].used().next.is_none());
            return false;
        };
        let next = self.node_order[last_nested_order as usize].used().next;

        // Splice the whole [node .. last_nested] range out. Holds also for
        // a single-entry chain, where previous == last_nested.
        let previous_order = self.order_of(previous);
        self.node_order[previous_order as usize].used_mut().next = next;
        if let Some(next) = next {
            let next_order = self.order_of(next);
            self.node_order[next_order as usize].used_mut().previous = Some(previous);
        }
        if self.first_node_order == Some(node) {
            self.first_node_order = if next == Some(node) { None } else { next };
        }

        let parent = self.nodes.get(node).expect("caller checked validity").parent;
        self.update_parent_last_nested(parent, last_nested, previous);

        let entry = self.node_order[order as usize].used_mut();
        entry.previous = None;
        let entry = self.node_order[last_nested_order as usize].used_mut();
        entry.next = None;
        true
    }

    fn closest_top_level_parent(&self, node: NodeHandle) -> NodeHandle {
        // Root nodes always have an order allocated, so this terminates.
        let mut parent = self
            .nodes
            .get(node)
            .expect("caller checked validity")
            .parent
            .expect("caller checked non-root");
        loop {
            let parent_node = self.nodes.get(parent).expect("parents of live nodes are live");
            if parent_node.order.is_some() {
                return parent;
            }
            parent = parent_node.parent.expect("roots are always top-level");
        }
    }

    /// Orders `node` in front of all other top-level nodes under the same
    /// scope, or behind `behind`.
    ///
    /// For root nodes the scope is the whole UI and `behind` has to be a
    /// root node; for other nodes the scope is the nearest top-level
    /// ancestor and `behind` has to share it. Making a node top-level while
    /// its subtree already contains other top-level nodes is rejected with
    /// [`Error::UnsupportedNestedOrder`].
    pub fn set_node_order(
        &mut self,
        node: NodeHandle,
        behind: Option<NodeHandle>,
    ) -> Result<(), Error> {
        if !self.nodes.is_valid(node) {
            return Err(Error::InvalidHandle);
        }
        let node_parent = self.nodes.get(node).expect("validity checked").parent;
        if let Some(behind) = behind {
            if !self.nodes.is_valid(behind) || behind == node {
                return Err(Error::InvalidHandle);
            }
            let behind_node = self.nodes.get(behind).expect("validity checked");
            let ordered = behind_node
                .order
                .is_some_and(|order| self.node_order[order as usize].used().previous.is_some());
            if !ordered {
                return Err(Error::InvalidHandle);
            }
            if behind_node.parent.is_none() != node_parent.is_none() {
                return Err(Error::InvalidHandle);
            }
        }

        // If the node isn't in the order yet, allocate a slot; otherwise
        // disconnect it from its previous location, reusing the slot.
        let fresh = self.nodes.get(node).expect("validity checked").order.is_none();
        if fresh {
            let order = self.allocate_node_order();
            // A root node gets ordered during its own creation, so there's
            // nothing nested yet. For a non-root node the nested range is
            // unknown at this point, marked by a null last_nested.
            self.node_order[order as usize] = OrderSlot::Used(OrderEntry {
                previous: None,
                next: None,
                last_nested: if node_parent.is_none() { Some(node) } else { None },
            });
            self.nodes.get_mut(node).expect("validity checked").order = Some(order);
        } else {
            self.clear_node_order_internal(node);
        }

        let order = self.order_of(node);
        let (previous, next) = match self.resolve_order_insertion(node, behind, node_parent, order)
        {
            Ok(links) => links,
            Err(error) => {
                // Undo a fresh allocation so the node doesn't stay in a
                // half-initialized top-level state.
                if fresh {
                    self.node_order[order as usize] = OrderSlot::Free {
                        next: self.first_free_node_order,
                    };
                    self.first_free_node_order = Some(order);
                    self.nodes.get_mut(node).expect("validity checked").order = None;
                }
                return Err(error);
            }
        };

        // Connect to the previous and next picked above.
        let last_nested = self.node_order[order as usize]
            .used()
            .last_nested
            .expect("filled in above");
        {
            let previous = previous.expect("always resolved to a handle");
            let previous_order = self.order_of(previous);
            self.node_order[previous_order as usize].used_mut().next = Some(node);
            self.node_order[order as usize].used_mut().previous = Some(previous);

            let last_nested_order = self.order_of(last_nested);
            self.node_order[last_nested_order as usize].used_mut().next = next;
            if let Some(next) = next {
                let next_order = self.order_of(next);
                self.node_order[next_order as usize].used_mut().previous = Some(last_nested);
            }
        }

        if node_parent.is_none() {
            if self.first_node_order.is_none() {
                self.first_node_order = Some(node);
            } else if self.first_node_order == behind {
                debug_assert!(behind.is_some());
                self.first_node_order = Some(node);
            }
        } else if behind.is_none() {
            // Inserted at the scope's end: ancestors' ranges that ended at
            // the previous entry now end at this node's range.
            let previous = self.node_order[order as usize]
                .used()
                .previous
                .expect("connected above");
            self.update_parent_last_nested(node_parent, previous, last_nested);
        }

        self.state |= UserInterfaceStates::NEEDS_NODE_UPDATE;
        Ok(())
    }

    /// Picks the previous/next links for inserting `node` into the order,
    /// running the nested-top-level rejection for fresh non-root nodes.
    fn resolve_order_insertion(
        &mut self,
        node: NodeHandle,
        behind: Option<NodeHandle>,
        node_parent: Option<NodeHandle>,
        order: OrderIndex,
    ) -> Result<(Option<NodeHandle>, Option<NodeHandle>), Error> {
        if node_parent.is_none() {
            // Root nodes connect to other root nodes only.
            return Ok(if let Some(behind) = behind {
                let behind_order = self.order_of(behind);
                (
                    self.node_order[behind_order as usize].used().previous,
                    Some(behind),
                )
            } else if let Some(first) = self.first_node_order {
                let first_order = self.order_of(first);
                (
                    self.node_order[first_order as usize].used().previous,
                    Some(first),
                )
            } else {
                (Some(node), Some(node))
            });
        }

        let top_level_parent = self.closest_top_level_parent(node);
        let parent_order = self.order_of(top_level_parent);
        let parent_last_nested = self.node_order[parent_order as usize]
            .used()
            .last_nested
            .expect("connected parents know their range");
        let parent_last_nested_next =
            self.node_order[self.order_of(parent_last_nested) as usize].used().next;

        let links = if let Some(behind) = behind {
            if self.closest_top_level_parent(behind) != top_level_parent {
                return Err(Error::InvalidHandle);
            }
            let behind_order = self.order_of(behind);
            (
                self.node_order[behind_order as usize].used().previous,
                Some(behind),
            )
        } else {
            (Some(parent_last_nested), parent_last_nested_next)
        };

        // A node freshly made top-level must not already contain other
        // nested top-level nodes; reconnecting those into the new position
        // is intentionally unsupported, the caller has to clear or flatten
        // their order first.
        if self.node_order[order as usize].used().last_nested.is_none() {
            let mut nested = self.node_order[parent_order as usize].used().next;
            while nested != parent_last_nested_next {
                let handle = nested.expect("range ends before a null next");
                if self.closest_top_level_parent(handle) == node {
                    return Err(Error::UnsupportedNestedOrder);
                }
                let nested_last = self.node_order[self.order_of(handle) as usize]
                    .used()
                    .last_nested
                    .expect("connected entries know their range");
                nested = self.node_order[self.order_of(nested_last) as usize].used().next;
            }
            self.node_order[order as usize].used_mut().last_nested = Some(node);
        }

        Ok(links)
    }

    /// Disconnects a top-level `node` (with its nested top-level range)
    /// from the order, hiding it. The node stays top-level and can be
    /// reconnected with [`set_node_order`](Self::set_node_order).
    pub fn clear_node_order(&mut self, node: NodeHandle) -> Result<(), Error> {
        if !self.nodes.is_valid(node) {
            return Err(Error::InvalidHandle);
        }
        if self.nodes.get(node).expect("validity checked").order.is_none() {
            return Ok(());
        }
        if !self.clear_node_order_internal(node) {
            return Ok(());
        }
        self.state |= UserInterfaceStates::NEEDS_NODE_UPDATE;
        Ok(())
    }

    /// Makes a non-root top-level `node` a regular nested node again, drawn
    /// in its parent's order. Top-level nodes nested under it keep their
    /// place in the order.
    pub fn flatten_node_order(&mut self, node: NodeHandle) -> Result<(), Error> {
        if !self.nodes.is_valid(node) {
            return Err(Error::InvalidHandle);
        }
        let n = self.nodes.get(node).expect("validity checked");
        if n.parent.is_none() {
            return Err(Error::IncompatibleCapabilities);
        }
        let Some(order) = n.order else {
            return Ok(());
        };
        let parent = n.parent;
        let entry = *self.node_order[order as usize].used();

        // Splice out only the node's own entry; nested top-level nodes stay
        // connected in place.
        if let Some(previous) = entry.previous {
            let previous_order = self.order_of(previous);
            self.node_order[previous_order as usize].used_mut().next = entry.next;
        }
        if let Some(next) = entry.next {
            let next_order = self.order_of(next);
            self.node_order[next_order as usize].used_mut().previous = entry.previous;
        }
        if let (Some(last_nested), Some(previous)) = (entry.last_nested, entry.previous) {
            self.update_parent_last_nested(parent, last_nested, previous);
        }

        self.node_order[order as usize] = OrderSlot::Free {
            next: self.first_free_node_order,
        };
        self.first_free_node_order = Some(order);
        self.nodes.get_mut(node).expect("validity checked").order = None;

        self.state |= UserInterfaceStates::NEEDS_NODE_UPDATE;
        Ok(())
    }

    // --- Event state introspection ---------------------------------------

    /// Node a primary pointer press was accepted on, if any.
    #[must_use]
    pub fn current_pressed_node(&self) -> Option<NodeHandle> {
        self.current_pressed_node
    }

    /// Node capturing pointer events, if any.
    #[must_use]
    pub fn current_captured_node(&self) -> Option<NodeHandle> {
        self.current_captured_node
    }

    /// Node the primary pointer is hovering, if any.
    #[must_use]
    pub fn current_hovered_node(&self) -> Option<NodeHandle> {
        self.current_hovered_node
    }

    /// Node receiving key and text input, if any.
    #[must_use]
    pub fn current_focused_node(&self) -> Option<NodeHandle> {
        self.current_focused_node
    }

    /// Position of the last primary pointer event, in UI coordinates.
    #[must_use]
    pub fn current_global_pointer_position(&self) -> Option<Vec2> {
        self.current_global_pointer_position
    }

    // --- Clean ------------------------------------------------------------

    /// Prunes child hierarchies of removed nodes, and data, layouts and
    /// animations assigned to removed entities. A no-op if nothing needs
    /// cleaning.
    pub fn clean(&mut self) {
        let states = self.state();
        if !states.contains(UserInterfaceStates::NEEDS_DATA_CLEAN) {
            return;
        }

        if states.contains(UserInterfaceStates::NEEDS_NODE_CLEAN) {
            self.clean_nodes_breadth_first();

            let mut generations = Vec::new();
            self.nodes.generations_into(&mut generations);

            for (_, slot) in self.layers.iter_mut() {
                if let Some(instance) = &mut slot.instance {
                    instance.clean_nodes(&generations);
                }
            }
            for (_, slot) in self.layouters.iter_mut() {
                if let Some(instance) = &mut slot.instance {
                    instance.clean_nodes(&generations);
                }
            }
            // All animators with node attachment sit in the two partitions
            // between the plain generic ones and the per-layer regions.
            let node_region_end = self
                .layer_animator_regions
                .first()
                .map_or(self.animator_instances.len(), |region| region.start);
            for position in self.animator_generic_node_start..node_region_end {
                let handle = self.animator_instances[position];
                if let Some(slot) = self.animators.get_mut(handle)
                    && let Some(instance) = &mut slot.instance
                {
                    instance.clean_nodes(&generations);
                }
            }
        }

        if states.contains(UserInterfaceStates::NEEDS_DATA_CLEAN) {
            let needs_all = self.state.contains(UserInterfaceStates::NEEDS_DATA_CLEAN);
            for id in 0..self.layers.capacity() {
                let Some(handle) = self.layers.handle_at(id) else {
                    continue;
                };
                let needs = needs_all
                    || self
                        .layers
                        .get(handle)
                        .and_then(|slot| slot.instance.as_ref())
                        .is_some_and(|instance| {
                            instance.state().contains(LayerStates::NEEDS_DATA_CLEAN)
                        });
                if !needs {
                    continue;
                }
                self.call_layer_clean_data(handle);
            }
        }

        // Keep the update states, drop the clean states. Animation advance
        // is never stored, so there's nothing of it to drop here.
        self.state = states
            & !(UserInterfaceStates::NEEDS_NODE_CLEAN | UserInterfaceStates::NEEDS_ANIMATION_ADVANCE)
            | (states & UserInterfaceStates::NEEDS_NODE_UPDATE);
    }

    /// Orders live nodes breadth-first by parent and removes every node
    /// whose parent handle went stale; children ordered after their parents
    /// are thus removed transitively.
    fn clean_nodes_breadth_first(&mut self) {
        let capacity = self.nodes.capacity();
        let mut queue: Vec<u32> = Vec::with_capacity(capacity);

        // Children grouped by parent slot, for nodes whose parent is valid
        // right now. Nodes with an already-stale parent become queue roots
        // and get removed at their visit.
        let mut children_offsets = alloc::vec![0_u32; capacity + 1];
        let mut children = alloc::vec![0_u32; capacity];
        for id in 0..capacity {
            let Some(node) = self.nodes.get_at(id) else {
                continue;
            };
            if let Some(parent) = node.parent
                && self.nodes.is_valid(parent)
            {
                children_offsets[parent.index() as usize + 1] += 1;
            }
        }
        for index in 0..capacity {
            children_offsets[index + 1] += children_offsets[index];
        }
        let mut cursors = children_offsets.clone();
        for id in 0..capacity {
            let Some(node) = self.nodes.get_at(id) else {
                continue;
            };
            match node.parent {
                Some(parent) if self.nodes.is_valid(parent) => {
                    let parent_id = parent.index() as usize;
                    children[cursors[parent_id] as usize] = id as u32;
                    cursors[parent_id] += 1;
                }
                // Roots of the walk: parentless nodes and orphans.
                _ => queue.push(id as u32),
            }
        }

        let mut head = 0;
        while head < queue.len() {
            let id = queue[head] as usize;
            head += 1;
            let Some(node) = self.nodes.get_at(id) else {
                continue;
            };
            if let Some(parent) = node.parent
                && !self.nodes.is_valid(parent)
            {
                let handle = self.nodes.handle_at(id).expect("slot is live");
                self.remove_node_internal(handle);
            }
            for index in children_offsets[id]..children_offsets[id + 1] {
                queue.push(children[index as usize]);
            }
        }
    }

    /// Calls `clean_data` on the layer with the data-attachment animators
    /// of its region, using the take-out pattern to get simultaneous
    /// mutable access.
    fn call_layer_clean_data(&mut self, layer: LayerHandle) {
        let id = layer.index() as usize;
        let region = self.layer_animator_regions[id];
        let end = self.layer_region_end(id);

        let mut taken: Vec<Box<dyn Animator>> = Vec::with_capacity(end - region.start);
        for position in region.start..end {
            let handle = self.animator_instances[position];
            if let Some(slot) = self.animators.get_mut(handle)
                && let Some(instance) = slot.instance.take()
            {
                taken.push(instance);
            }
        }
        {
            let mut refs: Vec<&mut dyn Animator> = Vec::with_capacity(taken.len());
            for boxed in taken.iter_mut() {
                refs.push(boxed.as_mut());
            }
            if let Some(slot) = self.layers.get_mut(layer)
                && let Some(instance) = &mut slot.instance
            {
                instance.clean_data(&mut refs);
            }
        }
        // Put the instances back into their slots.
        for instance in taken {
            let handle = instance.common().handle();
            if let Some(slot) = self.animators.get_mut(handle) {
                slot.instance = Some(instance);
            }
        }
    }

    // --- Animation advance ------------------------------------------------

    /// Advances all animators to `time`, which has to be monotonically
    /// non-decreasing across calls. Implies [`clean`](Self::clean).
    pub fn advance_animations(&mut self, time: Duration) -> Result<(), Error> {
        if time < self.animation_time {
            return Err(Error::TimeRegression);
        }
        self.clean();

        let states = self.state();
        if states.contains(UserInterfaceStates::NEEDS_ANIMATION_ADVANCE) {
            let mut max_capacity = 0;
            for (_, slot) in self.animators.iter() {
                if let Some(instance) = &slot.instance {
                    max_capacity = max_capacity.max(instance.common().capacity());
                }
            }
            let mut buffers = core::mem::take(&mut self.advance_buffers);
            buffers.reset(max_capacity);
            let mut nodes_remove = alloc::vec![false; self.nodes.capacity()];

            // Generic animators: the two plain partitions, then the
            // per-layer generic sub-partitions.
            let node_region_end = self
                .layer_animator_regions
                .first()
                .map_or(self.animator_instances.len(), |region| region.start);
            for position in 0..self.animator_node_start {
                self.advance_generic_animator(position, time, &mut buffers);
            }
            let mut node_animations = NodeAnimations::empty();
            for region_id in 0..self.layer_animator_regions.len() {
                let region = self.layer_animator_regions[region_id];
                for position in region.start..region.data_start {
                    self.advance_generic_animator(position, time, &mut buffers);
                }
            }

            // Node animators mutate node geometry and flags through
            // copied-out arrays, written back below.
            let capacity = self.nodes.capacity();
            let mut node_offsets = alloc::vec![Vec2::ZERO; capacity];
            let mut node_sizes = alloc::vec![Size::ZERO; capacity];
            let mut node_flags = alloc::vec![NodeFlags::empty(); capacity];
            for id in 0..capacity {
                if let Some(node) = self.nodes.get_at(id) {
                    node_offsets[id] = node.offset;
                    node_sizes[id] = node.size;
                    node_flags[id] = node.flags;
                }
            }
            for position in self.animator_node_start..node_region_end {
                let handle = self.animator_instances[position];
                let Some(slot) = self.animators.get_mut(handle) else {
                    continue;
                };
                let Some(instance) = &mut slot.instance else {
                    continue;
                };
                if !instance.state().contains(AnimatorStates::NEEDS_ADVANCE) {
                    continue;
                }
                let capacity = instance.common().capacity();
                let (needs_advance, needs_clean) = instance.update(
                    time,
                    &mut buffers.active[..capacity],
                    &mut buffers.factors[..capacity],
                    &mut buffers.remove[..capacity],
                );
                if needs_advance
                    && let Some(node_animator) = instance.as_node()
                {
                    node_animations |= node_animator.advance(
                        &buffers.active[..capacity],
                        &buffers.factors[..capacity],
                        &mut node_offsets,
                        &mut node_sizes,
                        &mut node_flags,
                        &mut nodes_remove,
                    );
                }
                if needs_clean {
                    instance.clean(&buffers.remove[..capacity]);
                }
            }
            for id in 0..capacity {
                if let Some(node) = self.nodes.get_at_mut(id) {
                    node.offset = node_offsets[id];
                    node.size = node_sizes[id];
                    node.flags = node_flags[id];
                }
            }

            if node_animations.contains(NodeAnimations::OFFSET_SIZE) {
                self.state |= UserInterfaceStates::NEEDS_LAYOUT_UPDATE;
            }
            if node_animations.contains(NodeAnimations::ENABLED) {
                self.state |= UserInterfaceStates::NEEDS_NODE_ENABLED_UPDATE;
            }
            if node_animations.contains(NodeAnimations::CLIP) {
                self.state |= UserInterfaceStates::NEEDS_NODE_CLIP_UPDATE;
            }
            if node_animations.contains(NodeAnimations::REMOVAL) {
                self.state |= UserInterfaceStates::NEEDS_NODE_CLEAN;
                for id in 0..nodes_remove.len() {
                    if nodes_remove[id]
                        && let Some(handle) = self.nodes.handle_at(id)
                    {
                        self.remove_node_internal(handle);
                    }
                }
            }

            // Data and style animators advance through their layer.
            for region_id in 0..self.layer_animator_regions.len() {
                let Some(layer) = self.layers.handle_at(region_id) else {
                    continue;
                };
                let region = self.layer_animator_regions[region_id];
                let end = self.layer_region_end(region_id);
                self.advance_layer_animators(
                    layer,
                    region.data_start..region.style_start,
                    AnimatorKind::Data,
                    time,
                    &mut buffers,
                );
                self.advance_layer_animators(
                    layer,
                    region.style_start..end,
                    AnimatorKind::Style,
                    time,
                    &mut buffers,
                );
            }

            self.advance_buffers = buffers;
        }

        self.animation_time = time;
        Ok(())
    }

    fn advance_generic_animator(
        &mut self,
        position: usize,
        time: Duration,
        buffers: &mut AdvanceBuffers,
    ) {
        let handle = self.animator_instances[position];
        let Some(slot) = self.animators.get_mut(handle) else {
            return;
        };
        let Some(instance) = &mut slot.instance else {
            return;
        };
        if !instance.state().contains(AnimatorStates::NEEDS_ADVANCE) {
            return;
        }
        let capacity = instance.common().capacity();
        let (needs_advance, needs_clean) = instance.update(
            time,
            &mut buffers.active[..capacity],
            &mut buffers.factors[..capacity],
            &mut buffers.remove[..capacity],
        );
        if needs_advance
            && let Some(generic) = instance.as_generic()
        {
            generic.advance(&buffers.active[..capacity], &buffers.factors[..capacity]);
        }
        if needs_clean {
            instance.clean(&buffers.remove[..capacity]);
        }
    }

    fn advance_layer_animators(
        &mut self,
        layer: LayerHandle,
        positions: core::ops::Range<usize>,
        kind: AnimatorKind,
        time: Duration,
        buffers: &mut AdvanceBuffers,
    ) {
        if positions.is_empty() {
            return;
        }
        let mut taken: Vec<Box<dyn Animator>> = Vec::with_capacity(positions.len());
        for position in positions {
            let handle = self.animator_instances[position];
            if let Some(slot) = self.animators.get_mut(handle)
                && let Some(instance) = slot.instance.take()
            {
                taken.push(instance);
            }
        }
        if !taken.is_empty()
            && let Some(slot) = self.layers.get_mut(layer)
            && let Some(instance) = &mut slot.instance
        {
            match kind {
                AnimatorKind::Data => {
                    let mut refs: Vec<&mut dyn crate::animator::DataAnimator> = taken
                        .iter_mut()
                        .filter_map(|boxed| boxed.as_mut().as_data())
                        .collect();
                    instance.advance_data_animations(time, buffers, &mut refs);
                }
                AnimatorKind::Style => {
                    let mut refs: Vec<&mut dyn crate::animator::StyleAnimator> = taken
                        .iter_mut()
                        .filter_map(|boxed| boxed.as_mut().as_style())
                        .collect();
                    instance.advance_style_animations(time, buffers, &mut refs);
                }
                AnimatorKind::Generic | AnimatorKind::Node => unreachable!(),
            }
        }
        for instance in taken {
            let handle = instance.common().handle();
            if let Some(slot) = self.animators.get_mut(handle) {
                slot.instance = Some(instance);
            }
        }
    }
}
