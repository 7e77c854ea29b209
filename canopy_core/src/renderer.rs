// Copyright 2025 the Canopy Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Renderer contract consumed by [`Ui::draw`](crate::Ui::draw).

use bitflags::bitflags;
use kurbo::Size;

bitflags! {
    /// Capabilities a renderer advertises through
    /// [`Renderer::features`](Renderer::features).
    #[derive(Copy, Clone, Debug, PartialEq, Eq, Default)]
    pub struct RendererFeatures: u8 {
        /// The renderer can hand the current framebuffer contents to
        /// compositing layers. Required as soon as any layer has
        /// [`LayerFeatures::COMPOSITE`](crate::LayerFeatures::COMPOSITE).
        const COMPOSITE = 1 << 0;
    }
}

/// Coarse renderer state targeted by [`Renderer::transition`].
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum RendererTargetState {
    /// Before any drawing in the current frame.
    Initial,
    /// Compositing layer contents are about to be read.
    Composite,
    /// Layer draws are about to be submitted.
    Draw,
    /// All drawing in the current frame is done.
    Final,
}

bitflags! {
    /// Fine-grained draw state accompanying
    /// [`RendererTargetState::Draw`] transitions.
    #[derive(Copy, Clone, Debug, PartialEq, Eq, Default)]
    pub struct RendererDrawStates: u8 {
        /// Blending is enabled for the upcoming draws.
        const BLENDING = 1 << 0;
        /// Scissor clipping is enabled for the upcoming draws.
        const SCISSOR = 1 << 1;
    }
}

/// GPU renderer state juggling, implemented by concrete back-ends.
///
/// [`Ui::draw`](crate::Ui::draw) drives the state machine Initial →
/// (Composite | Draw)* → Final; transitions to the already-current state
/// are expected to be no-ops.
pub trait Renderer {
    /// Capabilities of the renderer.
    fn features(&self) -> RendererFeatures;

    /// Called when the framebuffer size is set or changes.
    fn setup_framebuffers(&mut self, size: Size);

    /// Transitions to `target`, with `draw_states` applying to
    /// [`RendererTargetState::Draw`].
    fn transition(&mut self, target: RendererTargetState, draw_states: RendererDrawStates);
}

impl core::fmt::Debug for dyn Renderer + '_ {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str("dyn Renderer")
    }
}
