// Copyright 2025 the Canopy Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

// After you edit the crate's doc comment, run this command, then check README.md for any missing links
// cargo rdme --workspace-project=canopy_visual --heading-base-level=0

//! Canopy Visual: the style-driven visual layer base.
//!
//! A [`VisualLayer`] stores one *style index* per data and keeps it in sync
//! with the interaction state of the attached node: hovering, pressing,
//! focusing and disabling a node all transition the style through a table
//! of user-supplied transition functions. Concrete widget layers build on
//! this by interpreting the *calculated* style index when drawing.
//!
//! ## The style state machine
//!
//! Non-dynamic styles move through seven states:
//!
//! ```text
//! inactive-out  inactive-over
//! focused-out   focused-over
//! pressed-out   pressed-over
//! disabled
//! ```
//!
//! driven by seven transition functions registered on the [`Shared`] state
//! ([`StyleTransitions`]); any function left out is the identity. The
//! `disabled` state is special: it's computed during update into the
//! per-data *calculated* style, leaving the stored style untouched, so
//! re-enabling a node restores its previous appearance.
//!
//! ## Dynamic styles
//!
//! Styles at indices `style_count..style_count + dynamic_style_count` are
//! *dynamic*: allocated per layer from a fixed pool, usually by a style
//! animator blending between two static styles. Transition functions never
//! apply to dynamic styles directly; if the recorded animation belongs to
//! the layer's default [`VisualStyleAnimator`], transitions go through the
//! animation's *target* style instead so the state machine keeps flowing
//! mid-animation.
//!
//! This crate is `no_std` and uses `alloc`.

#![no_std]

extern crate alloc;

mod animator;
mod layer;
mod shared;

pub use animator::VisualStyleAnimator;
pub use layer::VisualLayer;
pub use shared::{Shared, StyleTransition, StyleTransitions};
