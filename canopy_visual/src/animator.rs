// Copyright 2025 the Canopy Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Style animator driving dynamic styles towards a target style.

use alloc::vec::Vec;
use core::time::Duration;

use canopy_core::{
    AnimationDataHandle, AnimationFlags, AnimationHandle, Animator, AnimatorCommon,
    AnimatorFeatures, AnimatorHandle, Error, LayerDataHandle, LayerHandle, StyleAnimator,
    StyleChange,
};

#[derive(Copy, Clone, Debug)]
struct StyleTrack {
    target_style: u32,
    dynamic_style: Option<u32>,
}

/// Animates data of a [`VisualLayer`](crate::VisualLayer) from a dynamic
/// style towards a target regular style.
///
/// While an animation plays, the data's stored style is expected to be a
/// dynamic index whose appearance the application blends from the playback
/// factor; when the animation completes, the data flips to the target
/// style and the dynamic slot is recycled. Register the animator as the
/// layer's default style animator so in-flight interactions transition
/// against the target style.
#[derive(Debug)]
pub struct VisualStyleAnimator {
    common: AnimatorCommon,
    /// Indexed by animation slot.
    tracks: Vec<Option<StyleTrack>>,
}

impl VisualStyleAnimator {
    /// Creates a style animator for the slot `handle`, animating data of
    /// `layer`.
    #[must_use]
    pub fn new(handle: AnimatorHandle, layer: LayerHandle) -> Self {
        let mut common = AnimatorCommon::new(handle);
        common.set_layer(layer);
        Self {
            common,
            tracks: Vec::new(),
        }
    }

    /// Creates an animation on `data` towards `target_style`, occupying
    /// the dynamic style slot `dynamic_style` while it plays.
    pub fn create(
        &mut self,
        data: LayerDataHandle,
        target_style: u32,
        dynamic_style: Option<u32>,
        started: Duration,
        duration: Duration,
    ) -> Result<AnimationHandle, Error> {
        let animation = self
            .common
            .create(started, duration, AnimationFlags::empty(), 1)?;
        self.common.attach_data(animation, Some(data))?;
        let index = animation.index() as usize;
        if index >= self.tracks.len() {
            self.tracks.resize(index + 1, None);
        }
        self.tracks[index] = Some(StyleTrack {
            target_style,
            dynamic_style,
        });
        Ok(AnimationHandle::new(self.common.handle(), animation))
    }

    /// The target style of `animation`.
    pub fn target_style(&self, animation: AnimationDataHandle) -> Result<u32, Error> {
        if !self.common.is_animation_valid(animation) {
            return Err(Error::InvalidHandle);
        }
        self.tracks[animation.index() as usize]
            .map(|track| track.target_style)
            .ok_or(Error::InvalidHandle)
    }
}

impl Animator for VisualStyleAnimator {
    fn common(&self) -> &AnimatorCommon {
        &self.common
    }

    fn common_mut(&mut self) -> &mut AnimatorCommon {
        &mut self.common
    }

    fn features(&self) -> AnimatorFeatures {
        AnimatorFeatures::DATA_ATTACHMENT
    }

    fn clean(&mut self, remove: &[bool]) {
        for (index, remove) in remove.iter().enumerate() {
            if *remove && let Some(track) = self.tracks.get_mut(index) {
                *track = None;
            }
        }
        self.common.clean(remove);
    }

    fn as_style(&mut self) -> Option<&mut dyn StyleAnimator> {
        Some(self)
    }
}

impl StyleAnimator for VisualStyleAnimator {
    fn advance(&mut self, active: &[bool], factors: &[f32], changes: &mut Vec<StyleChange>) {
        for index in 0..active.len() {
            if !active[index] || factors[index] < 1.0 {
                continue;
            }
            let Some(track) = self.tracks.get(index).copied().flatten() else {
                continue;
            };
            let Some(animation) = self.common.animation_handle_at(index) else {
                continue;
            };
            let Ok(Some(data)) = self.common.data_of(animation) else {
                continue;
            };
            changes.push(StyleChange {
                data,
                style: track.target_style,
                recycled_dynamic_style: track.dynamic_style,
            });
        }
    }
}
