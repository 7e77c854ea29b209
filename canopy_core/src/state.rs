// Copyright 2025 the Canopy Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Dirty-state flag sets for the runtime and its collaborators.
//!
//! The [`UserInterfaceStates`] lattice is implication-closed by
//! construction: every constant's bit pattern includes the bits of
//! everything it implies, so inserting a flag eagerly closes the set and no
//! separate closure step is needed at query time. The implications are:
//!
//! ```text
//! NEEDS_NODE_CLEAN ⇒ NEEDS_NODE_UPDATE, NEEDS_DATA_CLEAN
//! NEEDS_NODE_UPDATE ⇒ NEEDS_LAYOUT_ASSIGNMENT_UPDATE, NEEDS_NODE_OPACITY_UPDATE
//! NEEDS_LAYOUT_ASSIGNMENT_UPDATE ⇒ NEEDS_LAYOUT_UPDATE
//! NEEDS_LAYOUT_UPDATE ⇒ NEEDS_NODE_CLIP_UPDATE
//! NEEDS_NODE_CLIP_UPDATE ⇒ NEEDS_NODE_ENABLED_UPDATE
//! NEEDS_NODE_ENABLED_UPDATE ⇒ NEEDS_NODE_EVENT_MASK_UPDATE, NEEDS_DATA_ATTACHMENT_UPDATE
//! NEEDS_DATA_ATTACHMENT_UPDATE ⇒ NEEDS_DATA_UPDATE
//! NEEDS_NODE_OPACITY_UPDATE ⇒ NEEDS_DATA_UPDATE
//! NEEDS_ANIMATION_ADVANCE is orthogonal
//! ```

use bitflags::bitflags;

bitflags! {
    /// What needs to be refreshed before the user interface is drawn or an
    /// event is handled.
    ///
    /// Returned by [`Ui::state`](crate::Ui::state), which combines the
    /// stored flags with flags derived from polling every layer, layouter
    /// and animator. [`Ui::clean`](crate::Ui::clean) resets the clean bits,
    /// [`Ui::update`](crate::Ui::update) the update bits;
    /// [`NEEDS_ANIMATION_ADVANCE`](Self::NEEDS_ANIMATION_ADVANCE) is never
    /// stored, it only ever comes from polling animators.
    #[derive(Copy, Clone, Debug, PartialEq, Eq, Default)]
    pub struct UserInterfaceStates: u16 {
        /// Data attached to the visible node hierarchy changed.
        const NEEDS_DATA_UPDATE = 1 << 0;
        /// Data attachments changed; implies a data update.
        const NEEDS_DATA_ATTACHMENT_UPDATE = Self::NEEDS_DATA_UPDATE.bits() | 1 << 1;
        /// The set of nodes affected by blur-related events changed.
        const NEEDS_NODE_EVENT_MASK_UPDATE = 1 << 2;
        /// The enabled / event-receiving node set changed.
        const NEEDS_NODE_ENABLED_UPDATE = Self::NEEDS_NODE_EVENT_MASK_UPDATE.bits()
            | Self::NEEDS_DATA_ATTACHMENT_UPDATE.bits()
            | 1 << 3;
        /// Clip rectangles changed.
        const NEEDS_NODE_CLIP_UPDATE = Self::NEEDS_NODE_ENABLED_UPDATE.bits() | 1 << 4;
        /// Node offsets or sizes changed, layouts have to be re-solved.
        const NEEDS_LAYOUT_UPDATE = Self::NEEDS_NODE_CLIP_UPDATE.bits() | 1 << 5;
        /// Layout assignments changed.
        const NEEDS_LAYOUT_ASSIGNMENT_UPDATE = Self::NEEDS_LAYOUT_UPDATE.bits() | 1 << 6;
        /// Node opacities changed.
        const NEEDS_NODE_OPACITY_UPDATE = Self::NEEDS_DATA_UPDATE.bits() | 1 << 7;
        /// The visible node hierarchy or the top-level order changed.
        const NEEDS_NODE_UPDATE = Self::NEEDS_LAYOUT_ASSIGNMENT_UPDATE.bits()
            | Self::NEEDS_NODE_OPACITY_UPDATE.bits()
            | 1 << 8;
        /// [`Ui::clean`](crate::Ui::clean) has to prune animations attached
        /// to removed data.
        const NEEDS_DATA_CLEAN = 1 << 9;
        /// [`Ui::clean`](crate::Ui::clean) has to prune child hierarchies of
        /// removed nodes and everything assigned to them.
        const NEEDS_NODE_CLEAN = Self::NEEDS_NODE_UPDATE.bits()
            | Self::NEEDS_DATA_CLEAN.bits()
            | 1 << 10;
        /// [`Ui::advance_animations`](crate::Ui::advance_animations) has to
        /// be called. Orthogonal to the rest of the lattice.
        const NEEDS_ANIMATION_ADVANCE = 1 << 11;
    }
}

bitflags! {
    /// Capabilities a layer advertises through
    /// [`Layer::features`](crate::Layer::features).
    #[derive(Copy, Clone, Debug, PartialEq, Eq, Default)]
    pub struct LayerFeatures: u8 {
        /// The layer draws.
        const DRAW = 1 << 0;
        /// Drawing needs blending enabled; implies [`DRAW`](Self::DRAW).
        const DRAW_USES_BLENDING = Self::DRAW.bits() | 1 << 1;
        /// Drawing needs scissor clipping; implies [`DRAW`](Self::DRAW).
        const DRAW_USES_SCISSOR = Self::DRAW.bits() | 1 << 2;
        /// The layer composites the framebuffer under its data before
        /// drawing; needs a renderer with
        /// [`RendererFeatures::COMPOSITE`](crate::RendererFeatures::COMPOSITE).
        const COMPOSITE = 1 << 3;
        /// The layer handles events.
        const EVENT = 1 << 4;
        /// Data animators can be associated with the layer.
        const ANIMATE_DATA = 1 << 5;
        /// Style animators can be associated with the layer.
        const ANIMATE_STYLES = 1 << 6;
    }
}

bitflags! {
    /// What a layer needs refreshed, reported through
    /// [`Layer::state`](crate::Layer::state) and passed back into
    /// [`Layer::update`](crate::Layer::update).
    #[derive(Copy, Clone, Debug, PartialEq, Eq, Default)]
    pub struct LayerStates: u16 {
        /// Node offsets or sizes supplied to the layer changed.
        const NEEDS_NODE_OFFSET_SIZE_UPDATE = 1 << 0;
        /// Node opacities supplied to the layer changed.
        const NEEDS_NODE_OPACITY_UPDATE = 1 << 1;
        /// The enabled-node mask supplied to the layer changed.
        const NEEDS_NODE_ENABLED_UPDATE = 1 << 2;
        /// The visible data order supplied to the layer changed.
        const NEEDS_NODE_ORDER_UPDATE = 1 << 3;
        /// Data attachments changed; implies a node order update.
        const NEEDS_ATTACHMENT_UPDATE = Self::NEEDS_NODE_ORDER_UPDATE.bits() | 1 << 4;
        /// Per-data state changed.
        const NEEDS_DATA_UPDATE = 1 << 5;
        /// State common to all data changed.
        const NEEDS_COMMON_DATA_UPDATE = 1 << 6;
        /// State shared with other layers changed.
        const NEEDS_SHARED_DATA_UPDATE = 1 << 7;
        /// Composite rectangles changed.
        const NEEDS_COMPOSITE_OFFSET_SIZE_UPDATE = 1 << 8;
        /// Data were removed, animations attached to them have to be pruned
        /// by [`Ui::clean`](crate::Ui::clean).
        const NEEDS_DATA_CLEAN = 1 << 9;
    }
}

impl LayerStates {
    /// Flags that [`Ui::update`](crate::Ui::update) resets after calling
    /// [`Layer::update`](crate::Layer::update).
    pub(crate) const UPDATE_MASK: Self = Self::NEEDS_NODE_OFFSET_SIZE_UPDATE
        .union(Self::NEEDS_NODE_OPACITY_UPDATE)
        .union(Self::NEEDS_NODE_ENABLED_UPDATE)
        .union(Self::NEEDS_ATTACHMENT_UPDATE)
        .union(Self::NEEDS_DATA_UPDATE)
        .union(Self::NEEDS_COMMON_DATA_UPDATE)
        .union(Self::NEEDS_SHARED_DATA_UPDATE)
        .union(Self::NEEDS_COMPOSITE_OFFSET_SIZE_UPDATE);
}

bitflags! {
    /// What a layouter needs refreshed, reported through
    /// [`Layouter::state`](crate::Layouter::state).
    #[derive(Copy, Clone, Debug, PartialEq, Eq, Default)]
    pub struct LayouterStates: u8 {
        /// Layouts have to be re-solved.
        const NEEDS_UPDATE = 1 << 0;
        /// Layout assignments changed; implies an update.
        const NEEDS_ASSIGNMENT_UPDATE = Self::NEEDS_UPDATE.bits() | 1 << 1;
    }
}

bitflags! {
    /// Capabilities an animator advertises through
    /// [`Animator::features`](crate::Animator::features).
    #[derive(Copy, Clone, Debug, PartialEq, Eq, Default)]
    pub struct AnimatorFeatures: u8 {
        /// Animations can be attached to nodes.
        const NODE_ATTACHMENT = 1 << 0;
        /// Animations can be attached to layer data.
        const DATA_ATTACHMENT = 1 << 1;
    }
}

bitflags! {
    /// What an animator needs, reported through
    /// [`Animator::state`](crate::Animator::state).
    #[derive(Copy, Clone, Debug, PartialEq, Eq, Default)]
    pub struct AnimatorStates: u8 {
        /// There are animations scheduled, playing or paused.
        const NEEDS_ADVANCE = 1 << 0;
    }
}

bitflags! {
    /// What node state a [`NodeAnimator`](crate::NodeAnimator) advance pass
    /// touched, so the runtime can set matching dirty bits.
    #[derive(Copy, Clone, Debug, PartialEq, Eq, Default)]
    pub struct NodeAnimations: u8 {
        /// Node offsets or sizes changed.
        const OFFSET_SIZE = 1 << 0;
        /// The enabled-related node flags changed.
        const ENABLED = 1 << 1;
        /// The clip-related node flags changed.
        const CLIP = 1 << 2;
        /// Nodes were scheduled for removal.
        const REMOVAL = 1 << 3;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lattice_is_implication_closed() {
        let s = UserInterfaceStates::NEEDS_NODE_CLEAN;
        assert!(s.contains(UserInterfaceStates::NEEDS_NODE_UPDATE));
        assert!(s.contains(UserInterfaceStates::NEEDS_DATA_CLEAN));
        assert!(s.contains(UserInterfaceStates::NEEDS_LAYOUT_ASSIGNMENT_UPDATE));
        assert!(s.contains(UserInterfaceStates::NEEDS_LAYOUT_UPDATE));
        assert!(s.contains(UserInterfaceStates::NEEDS_NODE_CLIP_UPDATE));
        assert!(s.contains(UserInterfaceStates::NEEDS_NODE_ENABLED_UPDATE));
        assert!(s.contains(UserInterfaceStates::NEEDS_NODE_EVENT_MASK_UPDATE));
        assert!(s.contains(UserInterfaceStates::NEEDS_DATA_ATTACHMENT_UPDATE));
        assert!(s.contains(UserInterfaceStates::NEEDS_NODE_OPACITY_UPDATE));
        assert!(s.contains(UserInterfaceStates::NEEDS_DATA_UPDATE));
        assert!(!s.contains(UserInterfaceStates::NEEDS_ANIMATION_ADVANCE));
    }

    #[test]
    fn opacity_implies_data_only() {
        let s = UserInterfaceStates::NEEDS_NODE_OPACITY_UPDATE;
        assert!(s.contains(UserInterfaceStates::NEEDS_DATA_UPDATE));
        assert!(!s.contains(UserInterfaceStates::NEEDS_DATA_ATTACHMENT_UPDATE));
        assert!(!s.contains(UserInterfaceStates::NEEDS_LAYOUT_UPDATE));
    }

    #[test]
    fn layer_attachment_implies_order() {
        assert!(
            LayerStates::NEEDS_ATTACHMENT_UPDATE.contains(LayerStates::NEEDS_NODE_ORDER_UPDATE)
        );
    }

    #[test]
    fn draw_variants_imply_draw() {
        assert!(LayerFeatures::DRAW_USES_BLENDING.contains(LayerFeatures::DRAW));
        assert!(LayerFeatures::DRAW_USES_SCISSOR.contains(LayerFeatures::DRAW));
    }
}
