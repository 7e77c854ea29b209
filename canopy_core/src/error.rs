// Copyright 2025 the Canopy Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Error type shared by the runtime's fallible operations.

use canopy_handle::CapacityError;

/// Contract violations reported by [`Ui`](crate::Ui) operations.
///
/// All violations are raised to the caller at the API boundary; there is no
/// internal recovery. Whether an *event* was accepted is a separate channel
/// (the `Ok(bool)` of the event entry points) and independent of this type.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Error {
    /// An operation was given a handle whose generation no longer matches
    /// the slot it points to.
    InvalidHandle,
    /// A `create_*` call found the respective arena full. Nodes are capped
    /// at 2²⁰ slots, layers, layouters and animators at 2⁸.
    CapacityExceeded,
    /// A `set_*_instance` call for a slot that already has an instance, or a
    /// second `set_renderer_instance` call.
    AlreadySet,
    /// An instance accessor for a slot that has no instance set yet.
    NoInstance,
    /// A style index out of range, or a style transition function that
    /// returned one.
    OutOfRange,
    /// Capabilities of two collaborators don't line up: a compositing layer
    /// with a non-compositing renderer, a data or style animator without a
    /// layer to attach to, a focus event for a node that isn't focusable, or
    /// an attachment an instance doesn't support.
    IncompatibleCapabilities,
    /// [`advance_animations`](crate::Ui::advance_animations) was called with
    /// a time before [`animation_time`](crate::Ui::animation_time).
    TimeRegression,
    /// An event object whose accepted flag was already set was passed to an
    /// event entry point.
    EventAlreadyAccepted,
    /// [`set_node_order`](crate::Ui::set_node_order) was called on a node
    /// whose subtree already contains other nested top-level nodes. Clear or
    /// flatten their order first.
    UnsupportedNestedOrder,
    /// A size was zero where a non-zero size is required, or
    /// [`update`](crate::Ui::update) ran before any size was set.
    ZeroSize,
}

impl core::fmt::Display for Error {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let message = match self {
            Self::InvalidHandle => "handle generation doesn't match",
            Self::CapacityExceeded => "arena capacity exceeded",
            Self::AlreadySet => "instance already set",
            Self::NoInstance => "no instance set",
            Self::OutOfRange => "style index out of range",
            Self::IncompatibleCapabilities => "incompatible capabilities",
            Self::TimeRegression => "animation time moved backwards",
            Self::EventAlreadyAccepted => "event already accepted",
            Self::UnsupportedNestedOrder => {
                "ordering a node with nested top-level nodes isn't supported"
            }
            Self::ZeroSize => "user interface size wasn't set",
        };
        f.write_str(message)
    }
}

impl core::error::Error for Error {}

impl From<CapacityError> for Error {
    fn from(_: CapacityError) -> Self {
        Self::CapacityExceeded
    }
}
