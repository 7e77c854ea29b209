// Copyright 2025 the Canopy Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Animator contracts and the common animation playback bookkeeping.
//!
//! An animator owns *animations*: time slices that, while active, drive
//! some mutation. The runtime only understands the playback model
//! (scheduled → playing → played out, with pause, stop and repeats); what
//! an active animation *does* is the animator kind's business:
//!
//! - [`GenericAnimator`]: arbitrary side effects from playback factors.
//! - [`NodeAnimator`]: mutates node offsets, sizes and flags directly and
//!   reports what it touched as [`NodeAnimations`].
//! - [`DataAnimator`] / [`StyleAnimator`]: attached to layer data, advanced
//!   through the owning layer so it can apply the results.
//!
//! Animators are driven by
//! [`Ui::advance_animations`](crate::Ui::advance_animations), which keeps
//! all instances in one list partitioned by kind; see the docs there.

use alloc::vec::Vec;
use core::time::Duration;

use bitflags::bitflags;
use canopy_handle::Arena;
use kurbo::{Size, Vec2};

use crate::error::Error;
use crate::handles::{AnimationDataHandle, AnimatorHandle, LayerDataHandle, LayerHandle, NodeHandle};
use crate::node::NodeFlags;
use crate::state::{AnimatorFeatures, AnimatorStates, NodeAnimations};

bitflags! {
    /// Behavior flags of one animation.
    #[derive(Copy, Clone, Debug, PartialEq, Eq, Default)]
    pub struct AnimationFlags: u8 {
        /// Keep the animation once it played out instead of removing it, so
        /// it can be played again.
        const KEEP_ONCE_PLAYED = 1 << 0;
    }
}

/// Playback state of one animation relative to the animator's current time.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum AnimationState {
    /// Starts in the future.
    Scheduled,
    /// Currently playing.
    Playing,
    /// Paused mid-playback.
    Paused,
    /// Played out or explicitly stopped.
    Stopped,
}

#[derive(Debug)]
struct Animation {
    started: Duration,
    duration: Duration,
    repeat_count: u32,
    flags: AnimationFlags,
    /// Time at which the animation was paused; factor is frozen there.
    paused: Option<Duration>,
    /// Explicit stop, takes precedence over everything else.
    stopped: bool,
    node: Option<NodeHandle>,
    data: Option<LayerDataHandle>,
}

impl Animation {
    fn state(&self, time: Duration) -> AnimationState {
        if self.stopped {
            return AnimationState::Stopped;
        }
        if self.started > time {
            return AnimationState::Scheduled;
        }
        if self.paused.is_some() {
            return AnimationState::Paused;
        }
        let elapsed = time - self.started;
        if self.repeat_count != 0
            && elapsed >= self.duration * self.repeat_count
        {
            return AnimationState::Stopped;
        }
        AnimationState::Playing
    }

    /// Playback factor in `0..=1` at `time`, with repeat wrapping.
    fn factor(&self, time: Duration) -> f32 {
        let at = self.paused.map_or(time, |paused| paused.min(time));
        if self.started >= at {
            return 0.0;
        }
        let elapsed = at - self.started;
        if self.duration.is_zero() {
            return 1.0;
        }
        if self.repeat_count != 0 && elapsed >= self.duration * self.repeat_count {
            return 1.0;
        }
        let duration = self.duration.as_secs_f64();
        let factor = (elapsed.as_secs_f64() / duration).fract();
        // An exact iteration boundary reads as a completed iteration, not a
        // fresh one, except at the very start.
        if factor == 0.0 && !elapsed.is_zero() {
            return 1.0;
        }
        factor as f32
    }
}

/// Animation arena, attachments and stored dirty state shared by every
/// animator implementation.
#[derive(Debug)]
pub struct AnimatorCommon {
    handle: AnimatorHandle,
    layer: Option<LayerHandle>,
    animations: Arena<AnimationDataHandle, Animation>,
    time: Duration,
}

impl AnimatorCommon {
    /// Creates the common state for an animator installed under `handle`.
    #[must_use]
    pub fn new(handle: AnimatorHandle) -> Self {
        Self {
            handle,
            layer: None,
            animations: Arena::new(),
            time: Duration::ZERO,
        }
    }

    /// The handle this animator was created under.
    #[must_use]
    pub fn handle(&self) -> AnimatorHandle {
        self.handle
    }

    /// The layer a data or style animator is associated with.
    #[must_use]
    pub fn layer(&self) -> Option<LayerHandle> {
        self.layer
    }

    /// Associates a data or style animator with the layer whose data it
    /// animates. Has to happen before the instance is installed.
    pub fn set_layer(&mut self, layer: LayerHandle) {
        self.layer = Some(layer);
    }

    /// Number of animation slots ever allocated, including freed ones.
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.animations.capacity()
    }

    /// Number of live animations.
    #[must_use]
    pub fn used_count(&self) -> usize {
        self.animations.used_count()
    }

    /// The animator's current time, i.e. the time of the last
    /// [`update`](Self::update).
    #[must_use]
    pub fn time(&self) -> Duration {
        self.time
    }

    /// Creates an animation playing from `started` for `duration`,
    /// `repeat_count` times (`0` repeats forever).
    pub fn create(
        &mut self,
        started: Duration,
        duration: Duration,
        flags: AnimationFlags,
        repeat_count: u32,
    ) -> Result<AnimationDataHandle, Error> {
        let handle = self.animations.allocate(Animation {
            started,
            duration,
            repeat_count,
            flags,
            paused: None,
            stopped: false,
            node: None,
            data: None,
        })?;
        Ok(handle)
    }

    /// Removes an animation.
    pub fn remove(&mut self, animation: AnimationDataHandle) -> Result<(), Error> {
        self.animations
            .remove(animation)
            .map(|_| ())
            .ok_or(Error::InvalidHandle)
    }

    /// Whether `animation` refers to a live animation of this animator.
    #[must_use]
    pub fn is_animation_valid(&self, animation: AnimationDataHandle) -> bool {
        self.animations.is_valid(animation)
    }

    /// Live animation handle at slot `index`, `None` for freed slots.
    #[must_use]
    pub fn animation_handle_at(&self, index: usize) -> Option<AnimationDataHandle> {
        self.animations.handle_at(index)
    }

    /// Playback state of `animation` at the animator's current time.
    pub fn animation_state(&self, animation: AnimationDataHandle) -> Result<AnimationState, Error> {
        self.animations
            .get(animation)
            .map(|a| a.state(self.time))
            .ok_or(Error::InvalidHandle)
    }

    /// Restarts `animation` to play from `at`. Resuming a paused animation
    /// shifts its start so the factor continues where it froze.
    pub fn play(&mut self, animation: AnimationDataHandle, at: Duration) -> Result<(), Error> {
        let a = self.animations.get_mut(animation).ok_or(Error::InvalidHandle)?;
        if let Some(paused) = a.paused.take() {
            let elapsed = paused.saturating_sub(a.started);
            a.started = at.saturating_sub(elapsed);
        } else {
            a.started = at;
        }
        a.stopped = false;
        Ok(())
    }

    /// Pauses `animation` at `at`.
    pub fn pause(&mut self, animation: AnimationDataHandle, at: Duration) -> Result<(), Error> {
        let a = self.animations.get_mut(animation).ok_or(Error::InvalidHandle)?;
        if a.paused.is_none() {
            a.paused = Some(at);
        }
        Ok(())
    }

    /// Stops `animation`; it is removed by the next advance unless it has
    /// [`AnimationFlags::KEEP_ONCE_PLAYED`].
    pub fn stop(&mut self, animation: AnimationDataHandle) -> Result<(), Error> {
        let a = self.animations.get_mut(animation).ok_or(Error::InvalidHandle)?;
        a.stopped = true;
        Ok(())
    }

    /// Attaches `animation` to a node.
    pub fn attach_node(
        &mut self,
        animation: AnimationDataHandle,
        node: Option<NodeHandle>,
    ) -> Result<(), Error> {
        let a = self.animations.get_mut(animation).ok_or(Error::InvalidHandle)?;
        a.node = node;
        Ok(())
    }

    /// Attaches `animation` to layer data.
    pub fn attach_data(
        &mut self,
        animation: AnimationDataHandle,
        data: Option<LayerDataHandle>,
    ) -> Result<(), Error> {
        let a = self.animations.get_mut(animation).ok_or(Error::InvalidHandle)?;
        a.data = data;
        Ok(())
    }

    /// The node `animation` is attached to.
    pub fn node_of(&self, animation: AnimationDataHandle) -> Result<Option<NodeHandle>, Error> {
        self.animations
            .get(animation)
            .map(|a| a.node)
            .ok_or(Error::InvalidHandle)
    }

    /// The layer data `animation` is attached to.
    pub fn data_of(&self, animation: AnimationDataHandle) -> Result<Option<LayerDataHandle>, Error> {
        self.animations
            .get(animation)
            .map(|a| a.data)
            .ok_or(Error::InvalidHandle)
    }

    /// Stored dirty state: [`AnimatorStates::NEEDS_ADVANCE`] while any
    /// animation is scheduled, playing or paused.
    #[must_use]
    pub fn state(&self) -> AnimatorStates {
        let needs = self
            .animations
            .iter()
            .any(|(_, a)| a.state(self.time) != AnimationState::Stopped);
        if needs {
            AnimatorStates::NEEDS_ADVANCE
        } else {
            AnimatorStates::empty()
        }
    }

    /// Advances the animator's clock to `time` and fills the per-slot
    /// `active`, `factors` and `remove` scratch arrays.
    ///
    /// Returns `(needs_advance, needs_clean)`: whether any animation is
    /// active (so the kind-specific advance should run) and whether any
    /// played out (so [`clean`](Self::clean) should run).
    pub fn update(
        &mut self,
        time: Duration,
        active: &mut [bool],
        factors: &mut [f32],
        remove: &mut [bool],
    ) -> (bool, bool) {
        let mut any_active = false;
        let mut any_remove = false;
        for index in 0..self.animations.capacity() {
            active[index] = false;
            remove[index] = false;
            factors[index] = 0.0;
            let Some(animation) = self.animations.get_at(index) else {
                continue;
            };
            match animation.state(time) {
                AnimationState::Scheduled | AnimationState::Paused => {}
                AnimationState::Playing => {
                    active[index] = true;
                    factors[index] = animation.factor(time);
                    any_active = true;
                }
                AnimationState::Stopped => {
                    // Animations crossing completion get one final advance
                    // at factor 1 before removal.
                    let crossed = !animation.stopped
                        && animation.state(self.time) != AnimationState::Stopped;
                    if crossed {
                        active[index] = true;
                        factors[index] = 1.0;
                        any_active = true;
                    }
                    if !animation.flags.contains(AnimationFlags::KEEP_ONCE_PLAYED) {
                        remove[index] = true;
                        any_remove = true;
                    }
                }
            }
        }
        self.time = time;
        (any_active, any_remove)
    }

    /// Removes the animations marked in `remove`.
    pub fn clean(&mut self, remove: &[bool]) {
        for (index, remove) in remove.iter().enumerate() {
            if *remove
                && let Some(handle) = self.animations.handle_at(index)
            {
                self.animations.remove(handle);
            }
        }
    }

    /// Drops animations attached to no-longer-valid nodes.
    pub fn clean_stale_nodes(&mut self, node_generations: &[u32]) {
        for index in 0..self.animations.capacity() {
            let Some(animation) = self.animations.get_at(index) else {
                continue;
            };
            let Some(node) = animation.node else {
                continue;
            };
            let stale = node_generations
                .get(node.index() as usize)
                .is_none_or(|generation| *generation != node.generation());
            if stale {
                let handle = self.animations.handle_at(index).expect("slot is live");
                self.animations.remove(handle);
            }
        }
    }

    /// Drops animations attached to no-longer-valid layer data.
    pub fn clean_stale_data(&mut self, data_generations: &[u32]) {
        for index in 0..self.animations.capacity() {
            let Some(animation) = self.animations.get_at(index) else {
                continue;
            };
            let Some(data) = animation.data else {
                continue;
            };
            let stale = data_generations
                .get(data.index() as usize)
                .is_none_or(|generation| *generation != data.generation());
            if stale {
                let handle = self.animations.handle_at(index).expect("slot is live");
                self.animations.remove(handle);
            }
        }
    }
}

/// Scratch buffers reused across animator advances, sized to the largest
/// animator capacity by [`Ui::advance_animations`](crate::Ui::advance_animations).
#[derive(Debug, Default)]
pub struct AdvanceBuffers {
    /// Per-animation: is active this advance.
    pub active: Vec<bool>,
    /// Per-animation: playback factor in `0..=1`.
    pub factors: Vec<f32>,
    /// Per-animation: should be removed by clean.
    pub remove: Vec<bool>,
}

impl AdvanceBuffers {
    pub(crate) fn reset(&mut self, capacity: usize) {
        self.active.clear();
        self.active.resize(capacity, false);
        self.factors.clear();
        self.factors.resize(capacity, 0.0);
        self.remove.clear();
        self.remove.resize(capacity, false);
    }
}

/// A style change produced by a [`StyleAnimator`] advance, applied by the
/// owning layer.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct StyleChange {
    /// The data whose style changes.
    pub data: LayerDataHandle,
    /// The new style index.
    pub style: u32,
    /// A dynamic style index to recycle, if the animation occupied one.
    pub recycled_dynamic_style: Option<u32>,
}

/// Time-driven mutator owned by the runtime.
///
/// Implementations embed an [`AnimatorCommon`] and additionally implement
/// exactly one of the kind traits, exposing it through the matching `as_*`
/// method.
pub trait Animator {
    /// The embedded common state.
    fn common(&self) -> &AnimatorCommon;

    /// The embedded common state, mutably.
    fn common_mut(&mut self) -> &mut AnimatorCommon;

    /// Capabilities of the animator. Expected to stay constant.
    fn features(&self) -> AnimatorFeatures;

    /// Dirty state of the animator, folded into
    /// [`Ui::state`](crate::Ui::state).
    fn state(&self) -> AnimatorStates {
        self.common().state()
    }

    /// Advances the clock and computes the per-animation scratch; see
    /// [`AnimatorCommon::update`].
    fn update(
        &mut self,
        time: Duration,
        active: &mut [bool],
        factors: &mut [f32],
        remove: &mut [bool],
    ) -> (bool, bool) {
        self.common_mut().update(time, active, factors, remove)
    }

    /// Removes played-out animations; the implementation drops whatever
    /// per-animation state it keeps alongside.
    fn clean(&mut self, remove: &[bool]) {
        self.common_mut().clean(remove);
    }

    /// Drops animations attached to no-longer-valid nodes; only called for
    /// animators with [`AnimatorFeatures::NODE_ATTACHMENT`].
    fn clean_nodes(&mut self, node_generations: &[u32]) {
        self.common_mut().clean_stale_nodes(node_generations);
    }

    /// The generic-animator view of this instance.
    fn as_generic(&mut self) -> Option<&mut dyn GenericAnimator> {
        None
    }

    /// The node-animator view of this instance.
    fn as_node(&mut self) -> Option<&mut dyn NodeAnimator> {
        None
    }

    /// The data-animator view of this instance.
    fn as_data(&mut self) -> Option<&mut dyn DataAnimator> {
        None
    }

    /// The style-animator view of this instance.
    fn as_style(&mut self) -> Option<&mut dyn StyleAnimator> {
        None
    }
}

/// Animator applying arbitrary side effects from playback factors.
pub trait GenericAnimator: Animator {
    /// Advances the animations marked in `active` with the matching
    /// `factors`.
    fn advance(&mut self, active: &[bool], factors: &[f32]);
}

/// Animator mutating node geometry and flags.
pub trait NodeAnimator: Animator {
    /// Advances the animations marked in `active`, mutating the
    /// node-id-indexed arrays for its attached nodes, and reports what it
    /// touched. Setting a bit in `nodes_remove` removes the node after the
    /// advance.
    fn advance(
        &mut self,
        active: &[bool],
        factors: &[f32],
        node_offsets: &mut [Vec2],
        node_sizes: &mut [Size],
        node_flags: &mut [NodeFlags],
        nodes_remove: &mut [bool],
    ) -> NodeAnimations;
}

/// Animator mutating per-data state of its associated layer, advanced
/// through [`Layer::advance_data_animations`](crate::Layer::advance_data_animations).
pub trait DataAnimator: Animator {
    /// Advances the animations marked in `active`.
    fn advance(&mut self, active: &[bool], factors: &[f32]);
}

/// Animator mutating data styles of its associated layer, advanced through
/// [`Layer::advance_style_animations`](crate::Layer::advance_style_animations).
pub trait StyleAnimator: Animator {
    /// Advances the animations marked in `active`, pushing resulting style
    /// flips into `changes` for the layer to apply.
    fn advance(&mut self, active: &[bool], factors: &[f32], changes: &mut Vec<StyleChange>);
}

impl core::fmt::Debug for dyn Animator + '_ {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "dyn Animator({:?})", self.common().handle())
    }
}
