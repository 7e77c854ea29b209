// Copyright 2025 the Canopy Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Node flags.

use bitflags::bitflags;

bitflags! {
    /// Behavior flags set on a node.
    ///
    /// [`HIDDEN`](Self::HIDDEN), [`NO_EVENTS`](Self::NO_EVENTS) and
    /// [`DISABLED`](Self::DISABLED) are inherited by the whole subtree;
    /// the other flags apply to the node itself.
    #[derive(Copy, Clone, Debug, PartialEq, Eq, Default)]
    pub struct NodeFlags: u8 {
        /// The node and its subtree aren't drawn and don't receive events.
        const HIDDEN = 1 << 0;
        /// Descendants are clipped to the node's rectangle; descendants
        /// completely outside it are culled.
        const CLIP = 1 << 1;
        /// The node and its subtree don't receive events but are still
        /// drawn.
        const NO_EVENTS = 1 << 2;
        /// The node and its subtree don't receive events and are drawn with
        /// their disabled style. Implies [`NO_EVENTS`](Self::NO_EVENTS).
        const DISABLED = Self::NO_EVENTS.bits() | 1 << 3;
        /// A primary press with a default pointer on the node moves keyboard
        /// focus to it.
        const FOCUSABLE = 1 << 4;
        /// A press outside of the node doesn't blur it.
        const NO_BLUR = 1 << 5;
        /// After an event is accepted anywhere below, the node observes it
        /// as a fall-through event and may take the interaction over.
        const FALLTHROUGH_POINTER_EVENTS = 1 << 6;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn disabled_implies_no_events() {
        assert!(NodeFlags::DISABLED.contains(NodeFlags::NO_EVENTS));
        assert!(!NodeFlags::NO_EVENTS.contains(NodeFlags::DISABLED));
    }
}
