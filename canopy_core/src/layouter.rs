// Copyright 2025 the Canopy Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Layouter contract and the common per-layouter bookkeeping.
//!
//! A layouter owns *layouts*: assignments of its geometry-solving logic to
//! nodes. During [`Ui::update`](crate::Ui::update) the runtime groups
//! assigned layouts into hierarchies, orders them by dependency level and
//! calls [`Layouter::update`] once per group so the implementation can
//! overwrite the offsets and sizes of the nodes it's responsible for.

use canopy_handle::Arena;
use kurbo::{Size, Vec2};

use crate::error::Error;
use crate::handles::{LayoutDataHandle, LayouterHandle, NodeHandle};
use crate::state::LayouterStates;

/// Layout-slot arena, node assignments and stored dirty state shared by
/// every layouter implementation.
#[derive(Debug)]
pub struct LayouterCommon {
    handle: LayouterHandle,
    layouts: Arena<LayoutDataHandle, NodeHandle>,
    states: LayouterStates,
}

impl LayouterCommon {
    /// Creates the common state for a layouter installed under `handle`.
    #[must_use]
    pub fn new(handle: LayouterHandle) -> Self {
        Self {
            handle,
            layouts: Arena::new(),
            states: LayouterStates::empty(),
        }
    }

    /// The handle this layouter was created under.
    #[must_use]
    pub fn handle(&self) -> LayouterHandle {
        self.handle
    }

    /// Number of layout slots ever allocated, including freed ones.
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.layouts.capacity()
    }

    /// Number of live layouts.
    #[must_use]
    pub fn used_count(&self) -> usize {
        self.layouts.used_count()
    }

    /// Assigns this layouter to `node`, creating a layout.
    pub fn add(&mut self, node: NodeHandle) -> Result<LayoutDataHandle, Error> {
        let handle = self.layouts.allocate(node)?;
        self.states |= LayouterStates::NEEDS_ASSIGNMENT_UPDATE;
        Ok(handle)
    }

    /// Removes a layout.
    pub fn remove(&mut self, layout: LayoutDataHandle) -> Result<(), Error> {
        self.layouts.remove(layout).ok_or(Error::InvalidHandle)?;
        self.states |= LayouterStates::NEEDS_ASSIGNMENT_UPDATE;
        Ok(())
    }

    /// Whether `layout` refers to a live layout of this layouter.
    #[must_use]
    pub fn is_layout_valid(&self, layout: LayoutDataHandle) -> bool {
        self.layouts.is_valid(layout)
    }

    /// The node `layout` is assigned to.
    pub fn node_of(&self, layout: LayoutDataHandle) -> Result<NodeHandle, Error> {
        self.layouts.get(layout).copied().ok_or(Error::InvalidHandle)
    }

    /// Node assigned to the layout slot at `index`, `None` for freed slots.
    #[must_use]
    pub fn node_at(&self, index: usize) -> Option<NodeHandle> {
        self.layouts.get_at(index).copied()
    }

    /// Marks the layouter as needing [`Layouter::update`] to be called.
    pub fn set_needs_update(&mut self, states: LayouterStates) {
        self.states |= states;
    }

    /// The stored dirty state.
    #[must_use]
    pub fn state(&self) -> LayouterStates {
        self.states
    }

    pub(crate) fn clear_states(&mut self) {
        self.states = LayouterStates::empty();
    }

    pub(crate) fn clean_stale_assignments(&mut self, node_generations: &[u32]) {
        for index in 0..self.layouts.capacity() {
            let Some(node) = self.node_at(index) else {
                continue;
            };
            let stale = node_generations
                .get(node.index() as usize)
                .is_none_or(|generation| *generation != node.generation());
            if stale {
                let handle = self.layouts.handle_at(index).expect("slot is assigned");
                self.layouts.remove(handle);
                self.states |= LayouterStates::NEEDS_ASSIGNMENT_UPDATE;
            }
        }
    }
}

/// A geometry solver assigned to nodes.
pub trait Layouter {
    /// The embedded common state.
    fn common(&self) -> &LayouterCommon;

    /// The embedded common state, mutably.
    fn common_mut(&mut self) -> &mut LayouterCommon;

    /// Dirty state of the layouter, folded into
    /// [`Ui::state`](crate::Ui::state).
    fn state(&self) -> LayouterStates {
        self.common().state()
    }

    /// Drops layouts assigned to no-longer-valid nodes. `node_generations`
    /// is indexed by node id.
    fn clean_nodes(&mut self, node_generations: &[u32]) {
        self.common_mut().clean_stale_assignments(node_generations);
    }

    /// Solves one group of layouts.
    ///
    /// `mask` is indexed by layout slot and marks every layout
    /// participating in this call; `layout_ids` are the slot indices of the
    /// group roots. `node_parents` is indexed by node id. The
    /// implementation writes solved geometry into `node_offsets` and
    /// `node_sizes` (also node-id-indexed) for the nodes of its masked
    /// layouts.
    ///
    /// A layouter that reported
    /// [`NEEDS_ASSIGNMENT_UPDATE`](LayouterStates::NEEDS_ASSIGNMENT_UPDATE)
    /// but has no visible layouts still gets one call with an empty mask so
    /// it can refresh internal caches.
    fn update(
        &mut self,
        mask: &[bool],
        layout_ids: &[u32],
        node_parents: &[Option<NodeHandle>],
        node_offsets: &mut [Vec2],
        node_sizes: &mut [Size],
    );
}

impl core::fmt::Debug for dyn Layouter + '_ {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "dyn Layouter({:?})", self.common().handle())
    }
}
