// Copyright 2025 the Canopy Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! The visual layer: per-data style storage, interaction-driven style
//! transitions and the dynamic style allocator.

use alloc::vec::Vec;
use core::time::Duration;

use canopy_core::{
    AdvanceBuffers, AnimationHandle, AnimatorHandle, AnimatorStates, DataHandle, Error,
    FocusEvent, Layer, LayerCommon, LayerDataHandle, LayerFeatures, LayerHandle, LayerStates,
    LayerUpdate, NodeHandle, Pointer, PointerCancelEvent, PointerEvent, PointerMoveEvent,
    StyleAnimator, StyleChange, Ui, VisibilityLostEvent,
};

use crate::shared::{Shared, StyleTransition};

/// A layer whose data carry a style index kept in sync with the attached
/// node's interaction state.
///
/// Implements the event side of widget visuals: pressing, releasing,
/// hovering, focusing and disabling the node transitions the data's style
/// through the table registered on the [`Shared`] state. The *calculated*
/// style (the stored style, or its disabled counterpart while the node is
/// disabled) is what drawing code should consume after each update.
#[derive(Debug)]
pub struct VisualLayer {
    common: LayerCommon,
    shared: Shared,
    /// Per data slot; live slots hold `style < total_style_count`.
    styles: Vec<u32>,
    calculated_styles: Vec<u32>,
    dynamic_styles_used: Vec<bool>,
    dynamic_style_animations: Vec<Option<AnimationHandle>>,
    /// Animation target styles recorded at allocation, consulted by
    /// transitions while the animation is in flight.
    dynamic_style_targets: Vec<Option<u32>>,
    default_style_animator: Option<AnimatorHandle>,
    /// Last observed value of the shared disabled-transition stamp.
    to_disabled_stamp: u64,
}

impl VisualLayer {
    /// Creates a visual layer for the slot `handle`, drawing styles from
    /// `shared`.
    #[must_use]
    pub fn new(handle: LayerHandle, shared: &Shared) -> Self {
        let dynamic_count = shared.dynamic_style_count() as usize;
        Self {
            common: LayerCommon::new(handle),
            shared: shared.clone(),
            styles: Vec::new(),
            calculated_styles: Vec::new(),
            dynamic_styles_used: alloc::vec![false; dynamic_count],
            dynamic_style_animations: alloc::vec![None; dynamic_count],
            dynamic_style_targets: alloc::vec![None; dynamic_count],
            default_style_animator: None,
            to_disabled_stamp: shared.with(|state| state.to_disabled_stamp),
        }
    }

    /// The shared style state.
    #[must_use]
    pub fn shared(&self) -> &Shared {
        &self.shared
    }

    /// Creates data with an initial `style`, optionally attached to `node`.
    pub fn create(&mut self, style: u32, node: Option<NodeHandle>) -> Result<DataHandle, Error> {
        if style >= self.shared.total_style_count() {
            return Err(Error::OutOfRange);
        }
        let data = self.common.create_data(node)?;
        let index = data.index() as usize;
        if index >= self.styles.len() {
            self.styles.resize(index + 1, 0);
            self.calculated_styles.resize(index + 1, 0);
        }
        self.styles[index] = style;
        self.calculated_styles[index] = style;
        Ok(DataHandle::new(self.common.handle(), data))
    }

    /// Removes data.
    pub fn remove(&mut self, data: LayerDataHandle) -> Result<(), Error> {
        self.common.remove_data(data)
    }

    /// The stored style of `data`.
    pub fn style(&self, data: LayerDataHandle) -> Result<u32, Error> {
        if !self.common.is_data_valid(data) {
            return Err(Error::InvalidHandle);
        }
        Ok(self.styles[data.index() as usize])
    }

    /// The calculated style of `data`, as filled by the last update.
    pub fn calculated_style(&self, data: LayerDataHandle) -> Result<u32, Error> {
        if !self.common.is_data_valid(data) {
            return Err(Error::InvalidHandle);
        }
        Ok(self.calculated_styles[data.index() as usize])
    }

    /// Replaces the stored style of `data`; dynamic indices are allowed.
    pub fn set_style(&mut self, data: LayerDataHandle, style: u32) -> Result<(), Error> {
        if !self.common.is_data_valid(data) {
            return Err(Error::InvalidHandle);
        }
        if style >= self.shared.total_style_count() {
            return Err(Error::OutOfRange);
        }
        self.styles[data.index() as usize] = style;
        self.common.set_needs_update(LayerStates::NEEDS_DATA_UPDATE);
        Ok(())
    }

    /// Sets a style with the transition matching the node's current
    /// interaction state applied, so for example a hovered node ends up
    /// with the over variant of `style`. Only regular styles are allowed.
    pub fn set_transitioned_style(
        &mut self,
        ui: &Ui,
        data: LayerDataHandle,
        style: u32,
    ) -> Result<(), Error> {
        if !self.common.is_data_valid(data) {
            return Err(Error::InvalidHandle);
        }
        if style >= self.shared.style_count() {
            return Err(Error::OutOfRange);
        }
        let node = self.common.node_of(data)?;
        let hovered = node.is_some() && ui.current_hovered_node() == node;
        let transition = self.shared.with(|state| {
            if node.is_some() && ui.current_pressed_node() == node {
                state.transitions.to_pressed(hovered)
            } else if node.is_some() && ui.current_focused_node() == node {
                state.transitions.to_focused(hovered)
            } else {
                state.transitions.to_inactive(hovered)
            }
        });
        self.styles[data.index() as usize] = transition(style);
        self.common.set_needs_update(LayerStates::NEEDS_DATA_UPDATE);
        Ok(())
    }

    /// Number of dynamic styles currently allocated.
    #[must_use]
    pub fn dynamic_style_used_count(&self) -> usize {
        self.dynamic_styles_used.iter().filter(|used| **used).count()
    }

    /// Allocates a dynamic style slot, recording the driving animation and
    /// its target style if there is one. Returns `None` if the pool is
    /// exhausted.
    pub fn allocate_dynamic_style(
        &mut self,
        animation: Option<AnimationHandle>,
        target_style: Option<u32>,
    ) -> Option<u32> {
        let free = self.dynamic_styles_used.iter().position(|used| !used)?;
        self.dynamic_styles_used[free] = true;
        self.dynamic_style_animations[free] = animation;
        self.dynamic_style_targets[free] = target_style;
        Some(free as u32)
    }

    /// The animation recorded for the dynamic style at `index`.
    pub fn dynamic_style_animation(&self, index: u32) -> Result<Option<AnimationHandle>, Error> {
        self.dynamic_style_animations
            .get(index as usize)
            .copied()
            .ok_or(Error::OutOfRange)
    }

    /// Returns the dynamic style at `index` to the pool.
    pub fn recycle_dynamic_style(&mut self, index: u32) -> Result<(), Error> {
        let used = self
            .dynamic_styles_used
            .get_mut(index as usize)
            .ok_or(Error::OutOfRange)?;
        if !*used {
            return Err(Error::InvalidHandle);
        }
        *used = false;
        self.dynamic_style_animations[index as usize] = None;
        self.dynamic_style_targets[index as usize] = None;
        Ok(())
    }

    /// Registers the default style animator; transitions treat dynamic
    /// styles driven by its animations as their target style.
    pub fn set_default_style_animator(&mut self, animator: Option<AnimatorHandle>) {
        self.default_style_animator = animator;
    }

    /// The registered default style animator.
    #[must_use]
    pub fn default_style_animator(&self) -> Option<AnimatorHandle> {
        self.default_style_animator
    }

    /// The style transitions work against: the style itself, or for a
    /// dynamic style animated by the default style animator, the
    /// animation's target style.
    fn style_or_animation_target_style(&self, style: u32) -> u32 {
        let style_count = self.shared.style_count();
        if style < style_count {
            return style;
        }
        let dynamic = (style - style_count) as usize;
        if let Some(animation) = self.dynamic_style_animations.get(dynamic).copied().flatten()
            && self.default_style_animator == Some(animation.animator())
            && let Some(target) = self.dynamic_style_targets[dynamic]
        {
            return target;
        }
        style
    }

    /// Applies `transition` to the data's style if it resolves to a
    /// regular one, marking the layer dirty when the style changed.
    fn transition_style(&mut self, data_id: u32, transition: StyleTransition) {
        let index = data_id as usize;
        let style_count = self.shared.style_count();
        let current = self.style_or_animation_target_style(self.styles[index]);
        if current >= style_count {
            return;
        }
        let next = transition(current);
        debug_assert!(
            next < style_count,
            "style transition produced an out-of-range index"
        );
        if next < style_count && next != current {
            self.styles[index] = next;
            self.common.set_needs_update(LayerStates::NEEDS_DATA_UPDATE);
        }
    }

    fn is_transitionable_pointer(event: &PointerEvent) -> bool {
        !event.is_fallthrough()
            && event.is_primary()
            && matches!(
                event.pointer(),
                Pointer::MouseLeft | Pointer::Finger | Pointer::Pen
            )
    }
}

impl Layer for VisualLayer {
    fn common(&self) -> &LayerCommon {
        &self.common
    }

    fn common_mut(&mut self) -> &mut LayerCommon {
        &mut self.common
    }

    fn as_any(&self) -> &dyn core::any::Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn core::any::Any {
        self
    }

    fn features(&self) -> LayerFeatures {
        let mut features = LayerFeatures::EVENT;
        if self.shared.dynamic_style_count() != 0 {
            features |= LayerFeatures::ANIMATE_STYLES;
        }
        features
    }

    fn state(&self) -> LayerStates {
        let mut states = self.common.state();
        if self.to_disabled_stamp != self.shared.with(|state| state.to_disabled_stamp) {
            states |= LayerStates::NEEDS_DATA_UPDATE;
        }
        states
    }

    fn update(&mut self, update: &LayerUpdate<'_>) {
        let capacity = self.common.capacity();
        if self.styles.len() < capacity {
            self.styles.resize(capacity, 0);
            self.calculated_styles.resize(capacity, 0);
        }

        if !update
            .states
            .intersects(LayerStates::NEEDS_NODE_ENABLED_UPDATE | LayerStates::NEEDS_DATA_UPDATE)
        {
            return;
        }

        let (style_count, to_disabled, stamp) = self.shared.with(|state| {
            (
                state.style_count,
                state.transitions.to_disabled,
                state.to_disabled_stamp,
            )
        });

        if let Some(to_disabled) = to_disabled {
            // Disabled data get a transitioned copy so nothing has to know
            // how to transition back out of the disabled state; dynamic
            // styles pass through untouched.
            for &data_id in update.data_ids {
                let index = data_id as usize;
                let style = self.styles[index];
                let current = self.style_or_animation_target_style(style);
                let node = self
                    .common
                    .attachment_at(index)
                    .expect("updated data are attached");
                let enabled = update.nodes_enabled[node.index() as usize];
                if current < style_count && !enabled {
                    let next = to_disabled(current);
                    debug_assert!(
                        next < style_count,
                        "disabled style transition produced an out-of-range index"
                    );
                    self.calculated_styles[index] = if next < style_count { next } else { style };
                } else {
                    self.calculated_styles[index] = style;
                }
            }
        } else {
            // No disabled transition: drawing code handles disabling on its
            // own, for example by desaturating globally.
            self.calculated_styles.clone_from(&self.styles);
        }

        self.to_disabled_stamp = stamp;
    }

    fn advance_style_animations(
        &mut self,
        time: Duration,
        buffers: &mut AdvanceBuffers,
        animators: &mut [&mut dyn StyleAnimator],
    ) {
        let mut changes: Vec<StyleChange> = Vec::new();
        for animator in animators {
            if !animator.state().contains(AnimatorStates::NEEDS_ADVANCE) {
                continue;
            }
            let capacity = animator.common().capacity();
            let (needs_advance, needs_clean) = animator.update(
                time,
                &mut buffers.active[..capacity],
                &mut buffers.factors[..capacity],
                &mut buffers.remove[..capacity],
            );
            if needs_advance {
                changes.clear();
                animator.advance(
                    &buffers.active[..capacity],
                    &buffers.factors[..capacity],
                    &mut changes,
                );
                for change in &changes {
                    if self.common.is_data_valid(change.data) {
                        self.styles[change.data.index() as usize] = change.style;
                        self.common.set_needs_update(LayerStates::NEEDS_DATA_UPDATE);
                    }
                    if let Some(dynamic) = change.recycled_dynamic_style {
                        let _ = self.recycle_dynamic_style(dynamic);
                    }
                }
            }
            if needs_clean {
                animator.clean(&buffers.remove[..capacity]);
            }
        }
    }

    fn pointer_press_event(&mut self, data_id: u32, event: &mut PointerEvent) {
        if !Self::is_transitionable_pointer(event) {
            return;
        }
        // A press without a preceding move isn't hovering; pressed beats
        // focused, so the focus view is ignored here.
        let transition = self
            .shared
            .with(|state| state.transitions.to_pressed(event.is_node_hovered()));
        self.transition_style(data_id, transition);
        event.set_accepted();
    }

    fn pointer_release_event(&mut self, data_id: u32, event: &mut PointerEvent) {
        if !Self::is_transitionable_pointer(event) {
            return;
        }
        let transition = self.shared.with(|state| {
            if event.is_node_focused() {
                state.transitions.to_focused(event.is_node_hovered())
            } else {
                state.transitions.to_inactive(event.is_node_hovered())
            }
        });
        self.transition_style(data_id, transition);
        event.set_accepted();
    }

    fn pointer_move_event(&mut self, _data_id: u32, event: &mut PointerMoveEvent) {
        if event.is_fallthrough() || !event.is_primary() {
            return;
        }
        // Accepting is what makes enter and leave events flow.
        event.set_accepted();
    }

    fn pointer_enter_event(&mut self, data_id: u32, event: &mut PointerMoveEvent) {
        let transition = self.shared.with(|state| {
            if event.is_captured() {
                state.transitions.to_pressed(true)
            } else if event.is_node_focused() {
                state.transitions.to_focused(true)
            } else {
                state.transitions.to_inactive(true)
            }
        });
        self.transition_style(data_id, transition);
    }

    fn pointer_leave_event(&mut self, data_id: u32, event: &mut PointerMoveEvent) {
        let transition = self.shared.with(|state| {
            if event.is_captured() {
                state.transitions.to_pressed(false)
            } else if event.is_node_focused() {
                state.transitions.to_focused(false)
            } else {
                state.transitions.to_inactive(false)
            }
        });
        self.transition_style(data_id, transition);
    }

    fn pointer_cancel_event(&mut self, data_id: u32, _event: &mut PointerCancelEvent) {
        let transition = self.shared.with(|state| state.transitions.to_inactive(false));
        self.transition_style(data_id, transition);
    }

    fn focus_event(&mut self, data_id: u32, event: &mut FocusEvent) {
        // Pressed styles win over focused ones.
        if !event.is_node_pressed() {
            let transition = self
                .shared
                .with(|state| state.transitions.to_focused(event.is_node_hovered()));
            self.transition_style(data_id, transition);
        }
        event.set_accepted();
    }

    fn blur_event(&mut self, data_id: u32, event: &mut FocusEvent) {
        if !event.is_node_pressed() {
            let transition = self
                .shared
                .with(|state| state.transitions.to_inactive(event.is_node_hovered()));
            self.transition_style(data_id, transition);
        }
        event.set_accepted();
    }

    fn visibility_lost_event(&mut self, data_id: u32, event: &mut VisibilityLostEvent) {
        // A formerly focused node that's still pressed keeps its pressed
        // style.
        if !event.is_node_pressed() {
            let transition = self
                .shared
                .with(|state| state.transitions.to_inactive(event.is_node_hovered()));
            self.transition_style(data_id, transition);
        }
    }
}
