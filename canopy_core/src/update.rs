// Copyright 2025 the Canopy Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! The update pipeline: a fixed sequence of passes, each guarded by a
//! dirty bit, that turns the node hierarchy and per-layer data into the
//! derived arrays drawing and event dispatch run on.
//!
//! Pass order, matching the dirty-state lattice:
//!
//! 1. clean (implicit)
//! 2. pre-update hooks for layers with pending common/shared updates
//! 3. visible node ordering, depth-first along the top-level order
//! 4. front-to-back top-level index map
//! 5. layout collection into (node, layouter) cells with dependency levels
//! 6. layout solving, one call per (level, layouter) run
//! 7. absolute offset and opacity propagation
//! 8. clip culling into run-length encoded clip rectangles
//! 9. `NO_EVENTS` / `DISABLED` propagation masks
//! 10. per-layer data partitioning into update/draw/event/composite sets
//! 11. visibility-lost events for dangling event-current nodes
//! 12. per-layer update calls in draw order

use alloc::vec::Vec;

use kurbo::{Point, Rect, Size, Vec2};
use smallvec::SmallVec;

use crate::error::Error;
use crate::events::VisibilityLostEvent;
use crate::handles::{DataHandle, LayouterHandle, NodeHandle};
use crate::layer::{LayerDraw, LayerUpdate};
use crate::node::NodeFlags;
use crate::renderer::{RendererDrawStates, RendererTargetState};
use crate::state::{LayerFeatures, LayerStates, LayouterStates, UserInterfaceStates};
use crate::ui::{Node, OrderSlot, Ui};

impl Ui {
    /// Rebuilds all derived state so drawing and event dispatch see a
    /// consistent view. A no-op if nothing is dirty; implies
    /// [`clean`](Self::clean).
    ///
    /// Fails with [`Error::ZeroSize`] if no size was set and there is
    /// something to update.
    pub fn update(&mut self) -> Result<(), Error> {
        self.clean();

        let states = self.state();
        if !states.intersects(UserInterfaceStates::NEEDS_NODE_UPDATE) {
            return Ok(());
        }
        if self.size == Size::ZERO {
            return Err(Error::ZeroSize);
        }

        self.pre_update_layers();

        if states.contains(UserInterfaceStates::NEEDS_NODE_UPDATE) {
            order_visible_nodes(
                &self.nodes,
                &self.node_order,
                self.first_node_order,
                &mut self.visible_node_ids,
                &mut self.visible_node_children_counts,
            );

            self.front_to_back_top_level_indices.clear();
            let mut index = 0;
            while index < self.visible_node_ids.len() {
                self.front_to_back_top_level_indices.push(index as u32);
                index += self.visible_node_children_counts[index] as usize + 1;
            }
            self.front_to_back_top_level_indices.reverse();
        }

        if states.contains(UserInterfaceStates::NEEDS_LAYOUT_ASSIGNMENT_UPDATE) {
            self.collect_layouts();
        }

        if states.contains(UserInterfaceStates::NEEDS_LAYOUT_UPDATE) {
            self.solve_layouts();
            self.propagate_absolute_offsets();
        }

        if states.contains(UserInterfaceStates::NEEDS_NODE_OPACITY_UPDATE) {
            self.propagate_absolute_opacities();
        }

        if states.contains(UserInterfaceStates::NEEDS_NODE_CLIP_UPDATE) {
            self.cull_visible_nodes();
        }

        if states.contains(UserInterfaceStates::NEEDS_NODE_ENABLED_UPDATE) {
            self.propagate_event_masks();
        }

        // The partition also has to run when a layer reports a bare data
        // update before anything was ever partitioned for it.
        let needs_partition = states.contains(UserInterfaceStates::NEEDS_DATA_ATTACHMENT_UPDATE)
            || (states.contains(UserInterfaceStates::NEEDS_DATA_UPDATE)
                && self.data_to_update_layer_offsets.len() != self.layers.capacity() + 1);
        let mut visible_or_lost_mask = Vec::new();
        if needs_partition {
            visible_or_lost_mask.clone_from(&self.visible_event_node_mask);
            for node in [
                self.current_pressed_node,
                self.current_captured_node,
                self.current_hovered_node,
                self.current_focused_node,
            ]
            .into_iter()
            .flatten()
            {
                if self.nodes.is_valid(node) {
                    visible_or_lost_mask[node.index() as usize] = true;
                }
            }
            self.partition_data(&visible_or_lost_mask);
        }

        if states.contains(UserInterfaceStates::NEEDS_NODE_ENABLED_UPDATE) {
            self.emit_visibility_lost_events(&mut visible_or_lost_mask);
        }

        if states.contains(UserInterfaceStates::NEEDS_DATA_UPDATE) {
            self.update_layers(states);
        }

        self.state &= !UserInterfaceStates::NEEDS_NODE_UPDATE;
        debug_assert!(self.state.is_empty());
        Ok(())
    }

    /// Draws the whole UI through the installed renderer, compositing and
    /// drawing layer by layer in back-to-front order. Implies
    /// [`update`](Self::update).
    pub fn draw(&mut self) -> Result<(), Error> {
        if self.renderer.is_none() {
            return Err(Error::NoInstance);
        }
        self.update()?;

        self.renderer
            .as_deref_mut()
            .expect("checked above")
            .transition(RendererTargetState::Initial, RendererDrawStates::empty());

        for draw in 0..self.draw_count {
            let layer_id = self.data_to_draw_layer_ids[draw] as usize;
            let Some(slot) = self.layers.get_at_mut(layer_id) else {
                continue;
            };
            let features = slot.features;
            let Some(mut instance) = slot.instance.take() else {
                continue;
            };
            let offsets = self.data_to_update_layer_offsets[layer_id];
            let offsets_end = self.data_to_update_layer_offsets[layer_id + 1];

            if features.contains(LayerFeatures::COMPOSITE) {
                let renderer = self.renderer.as_deref_mut().expect("checked above");
                renderer.transition(RendererTargetState::Composite, RendererDrawStates::empty());
                instance.composite(
                    renderer,
                    &self.composite_rect_offsets[offsets[2]..offsets_end[2]],
                    &self.composite_rect_sizes[offsets[2]..offsets_end[2]],
                    self.data_to_draw_offsets[draw] - offsets[0],
                    self.data_to_draw_sizes[draw],
                );
            }

            let mut draw_states = RendererDrawStates::empty();
            if features.contains(LayerFeatures::DRAW_USES_BLENDING) {
                draw_states |= RendererDrawStates::BLENDING;
            }
            if features.contains(LayerFeatures::DRAW_USES_SCISSOR) {
                draw_states |= RendererDrawStates::SCISSOR;
            }
            self.renderer
                .as_deref_mut()
                .expect("checked above")
                .transition(RendererTargetState::Draw, draw_states);

            instance.draw(&LayerDraw {
                data_ids: &self.data_to_update_ids[offsets[0]..offsets_end[0]],
                offset: self.data_to_draw_offsets[draw] - offsets[0],
                count: self.data_to_draw_sizes[draw],
                clip_rect_ids: &self.data_to_update_clip_rect_ids[offsets[1]..offsets_end[1]],
                clip_rect_data_counts: &self.data_to_update_clip_rect_data_counts
                    [offsets[1]..offsets_end[1]],
                clip_rect_offset: self.data_to_draw_clip_rect_offsets[draw] - offsets[1],
                clip_rect_count: self.data_to_draw_clip_rect_sizes[draw],
                node_offsets: &self.absolute_node_offsets,
                node_sizes: &self.node_sizes,
                node_opacities: &self.absolute_node_opacities,
                nodes_enabled: &self.visible_enabled_node_mask,
                clip_rect_offsets: &self.clip_rect_offsets,
                clip_rect_sizes: &self.clip_rect_sizes,
            });

            if let Some(slot) = self.layers.get_at_mut(layer_id) {
                slot.instance = Some(instance);
            }
        }

        self.renderer
            .as_deref_mut()
            .expect("checked above")
            .transition(RendererTargetState::Final, RendererDrawStates::empty());
        Ok(())
    }

    fn pre_update_layers(&mut self) {
        let Some(first) = self.first_layer else {
            return;
        };
        let mut layer = first;
        loop {
            if let Some(slot) = self.layers.get_mut(layer)
                && let Some(instance) = &mut slot.instance
            {
                let pending = instance.state()
                    & (LayerStates::NEEDS_COMMON_DATA_UPDATE | LayerStates::NEEDS_SHARED_DATA_UPDATE);
                if !pending.is_empty() {
                    instance.pre_update(pending);
                }
            }
            match self.layers.chain_next(self.first_layer, layer) {
                Some(next) => layer = next,
                None => break,
            }
        }
    }

    /// Gathers layouter chain order, then per visible node the layouts
    /// assigned to it, assigning dependency levels and discovering
    /// top-level layouts (pass 5).
    ///
    /// A layout joins its parent node's layout group (same layouter, the
    /// parent's last-applied layout) so one layouter solves a contiguous
    /// hierarchy in one call; any other assigned layout starts a new
    /// top-level group one level further down the dependency order.
    fn collect_layouts(&mut self) {
        let node_capacity = self.nodes.capacity();

        let mut layouter_order: Vec<LayouterHandle> = Vec::new();
        if let Some(first) = self.first_layouter {
            let mut layouter = first;
            loop {
                if self
                    .layouters
                    .get(layouter)
                    .is_some_and(|slot| slot.instance.is_some())
                {
                    layouter_order.push(layouter);
                }
                match self.layouters.chain_next(self.first_layouter, layouter) {
                    Some(next) => layouter = next,
                    None => break,
                }
            }
        }
        let layouter_count = layouter_order.len();

        self.top_level_layout_offsets.clear();
        self.top_level_layout_layouter_ids.clear();
        self.top_level_layout_ids.clear();
        self.layout_masks.clear();
        self.layout_mask_offsets.clear();
        if layouter_count == 0 {
            self.top_level_layout_offsets.push(0);
            return;
        }

        // (node, layouter-order-position) cells; values are layout slot ids.
        let mut node_layouts = alloc::vec![None::<u32>; node_capacity * layouter_count];
        for (position, handle) in layouter_order.iter().enumerate() {
            let instance = self
                .layouters
                .get(*handle)
                .and_then(|slot| slot.instance.as_deref())
                .expect("collected with instances only");
            let common = instance.common();
            for slot_index in 0..common.capacity() {
                if let Some(node) = common.node_at(slot_index)
                    && self.nodes.is_valid(node)
                {
                    // A later layout assigned to the same node wins.
                    node_layouts[node.index() as usize * layouter_count + position] =
                        Some(slot_index as u32);
                }
            }
        }

        // Levels: visible nodes in pre-order, each node starting at its
        // parent's level-after-layouts.
        let mut node_next_level = alloc::vec![0_u32; node_capacity];
        let mut cell_levels = alloc::vec![None::<u32>; node_capacity * layouter_count];
        // (level, layouter position, layout id)
        let mut top_level: Vec<(u32, u32, u32)> = Vec::new();
        for &id in &self.visible_node_ids {
            let id = id as usize;
            let parent = self
                .nodes
                .get_at(id)
                .expect("visible nodes are live")
                .parent;
            let parent_id = parent.map(|p| p.index() as usize);
            let mut next_level = parent_id.map_or(0, |p| node_next_level[p]);
            let mut first_layout = true;
            for position in 0..layouter_count {
                let cell = id * layouter_count + position;
                let Some(layout_id) = node_layouts[cell] else {
                    continue;
                };
                let joins_parent = first_layout
                    && next_level != 0
                    && parent_id.is_some_and(|p| {
                        cell_levels[p * layouter_count + position] == Some(next_level - 1)
                    });
                if joins_parent {
                    cell_levels[cell] = Some(next_level - 1);
                } else {
                    cell_levels[cell] = Some(next_level);
                    top_level.push((next_level, position as u32, layout_id));
                    next_level += 1;
                }
                first_layout = false;
            }
            node_next_level[id] = next_level;
        }

        // Partition top-level layouts into (level, layouter) runs,
        // preserving discovery order inside each run.
        top_level.sort_by_key(|&(level, position, _)| (level, position));
        let mut run_lookup = hashbrown::HashMap::new();
        self.top_level_layout_offsets.push(0);
        {
            let mut index = 0;
            while index < top_level.len() {
                let (level, position, _) = top_level[index];
                let mut end = index;
                while end < top_level.len()
                    && top_level[end].0 == level
                    && top_level[end].1 == position
                {
                    self.top_level_layout_ids.push(top_level[end].2);
                    end += 1;
                }
                let layouter = layouter_order[position as usize];
                run_lookup.insert((level, position), self.top_level_layout_layouter_ids.len());
                self.top_level_layout_layouter_ids
                    .push(layouter.index() as u8);
                self.top_level_layout_offsets
                    .push(self.top_level_layout_ids.len() as u32);
                index = end;
            }
        }

        // One mask per run, sized to the run's layouter capacity, marking
        // every member layout of the run's level.
        let mut mask_offset = 0;
        for run in 0..self.top_level_layout_layouter_ids.len() {
            let layouter_id = self.top_level_layout_layouter_ids[run] as usize;
            let capacity = self
                .layouters
                .get_at(layouter_id)
                .and_then(|slot| slot.instance.as_deref())
                .map_or(0, |instance| instance.common().capacity());
            self.layout_mask_offsets.push(mask_offset);
            mask_offset += capacity;
        }
        self.layout_masks.resize(mask_offset, false);
        for &id in &self.visible_node_ids {
            let id = id as usize;
            for position in 0..layouter_count {
                let cell = id * layouter_count + position;
                let (Some(layout_id), Some(level)) = (node_layouts[cell], cell_levels[cell]) else {
                    continue;
                };
                let run = run_lookup[&(level, position as u32)];
                self.layout_masks[self.layout_mask_offsets[run] + layout_id as usize] = true;
            }
        }
    }

    /// Copies explicit node geometry, then solves layouts run by run in
    /// level order (passes 6 and 7 of the pipeline).
    fn solve_layouts(&mut self) {
        let node_capacity = self.nodes.capacity();
        self.node_offsets.clear();
        self.node_offsets.resize(node_capacity, Vec2::ZERO);
        self.node_sizes.clear();
        self.node_sizes.resize(node_capacity, Size::ZERO);
        let mut node_parents = alloc::vec![None::<NodeHandle>; node_capacity];
        for id in 0..node_capacity {
            if let Some(node) = self.nodes.get_at(id) {
                self.node_offsets[id] = node.offset;
                self.node_sizes[id] = node.size;
                node_parents[id] = node.parent;
            }
        }

        let mut called = alloc::vec![false; self.layouters.capacity()];
        for run in 0..self.top_level_layout_layouter_ids.len() {
            let layouter_id = self.top_level_layout_layouter_ids[run] as usize;
            let ids_start = self.top_level_layout_offsets[run] as usize;
            let ids_end = self.top_level_layout_offsets[run + 1] as usize;
            let Some(slot) = self.layouters.get_at_mut(layouter_id) else {
                continue;
            };
            let Some(mut instance) = slot.instance.take() else {
                continue;
            };
            let capacity = instance.common().capacity();
            let mask_start = self.layout_mask_offsets[run];
            instance.update(
                &self.layout_masks[mask_start..mask_start + capacity],
                &self.top_level_layout_ids[ids_start..ids_end],
                &node_parents,
                &mut self.node_offsets,
                &mut self.node_sizes,
            );
            called[layouter_id] = true;
            if let Some(slot) = self.layouters.get_at_mut(layouter_id) {
                slot.instance = Some(instance);
            }
        }

        // Layouters with pending assignment state but no visible layouts
        // still get an empty-mask call so they can refresh their caches.
        for layouter_id in 0..self.layouters.capacity() {
            let Some(slot) = self.layouters.get_at_mut(layouter_id) else {
                continue;
            };
            let Some(mut instance) = slot.instance.take() else {
                continue;
            };
            if !called[layouter_id]
                && instance
                    .state()
                    .contains(LayouterStates::NEEDS_ASSIGNMENT_UPDATE)
            {
                let empty_mask = alloc::vec![false; instance.common().capacity()];
                instance.update(
                    &empty_mask,
                    &[],
                    &node_parents,
                    &mut self.node_offsets,
                    &mut self.node_sizes,
                );
            }
            instance.common_mut().clear_states();
            if let Some(slot) = self.layouters.get_at_mut(layouter_id) {
                slot.instance = Some(instance);
            }
        }
    }

    fn propagate_absolute_offsets(&mut self) {
        let node_capacity = self.nodes.capacity();
        self.absolute_node_offsets.clear();
        self.absolute_node_offsets.resize(node_capacity, Vec2::ZERO);
        for &id in &self.visible_node_ids {
            let id = id as usize;
            let parent = self
                .nodes
                .get_at(id)
                .expect("visible nodes are live")
                .parent;
            let offset = self.node_offsets[id];
            self.absolute_node_offsets[id] = match parent {
                Some(parent) => self.absolute_node_offsets[parent.index() as usize] + offset,
                None => offset,
            };
        }
    }

    fn propagate_absolute_opacities(&mut self) {
        let node_capacity = self.nodes.capacity();
        self.absolute_node_opacities.clear();
        self.absolute_node_opacities.resize(node_capacity, 1.0);
        for &id in &self.visible_node_ids {
            let id = id as usize;
            let node = self.nodes.get_at(id).expect("visible nodes are live");
            let opacity = node.opacity;
            self.absolute_node_opacities[id] = match node.parent {
                Some(parent) => self.absolute_node_opacities[parent.index() as usize] * opacity,
                None => opacity,
            };
        }
    }

    /// Walks visible nodes with an explicit clip scope stack, marking which
    /// are visible for drawing and emitting run-length encoded clip
    /// rectangles (pass 8). Runs never span top-level hierarchies; children
    /// of a fully culled node are skipped wholesale.
    fn cull_visible_nodes(&mut self) {
        let node_capacity = self.nodes.capacity();
        self.visible_node_mask.clear();
        self.visible_node_mask.resize(node_capacity, false);
        self.clip_rect_offsets.clear();
        self.clip_rect_sizes.clear();
        self.clip_rect_node_counts.clear();

        let ui_rect = Rect::from_origin_size(Point::ORIGIN, self.size);
        let mut block = 0;
        while block < self.visible_node_ids.len() {
            let block_len = self.visible_node_children_counts[block] as usize + 1;
            let block_end = block + block_len;

            // (clip in effect, first index past the scope)
            let mut scopes: SmallVec<[(Rect, usize); 16]> = SmallVec::new();
            scopes.push((ui_rect, block_end));
            let mut run_clip = ui_rect;
            let mut run_count = 0_u32;

            let mut index = block;
            while index < block_end {
                while scopes.last().expect("block scope stays").1 <= index {
                    scopes.pop();
                    self.finish_clip_run(run_clip, run_count);
                    run_clip = scopes.last().expect("block scope stays").0;
                    run_count = 0;
                }

                let id = self.visible_node_ids[index] as usize;
                let subtree = self.visible_node_children_counts[index] as usize;
                let clip = scopes.last().expect("block scope stays").0;
                let rect = Rect::from_origin_size(
                    self.absolute_node_offsets[id].to_point(),
                    self.node_sizes[id],
                );
                let intersection = clip.intersect(rect);
                let visible = intersection.width() > 0.0 && intersection.height() > 0.0;
                self.visible_node_mask[id] = visible;
                run_count += 1;

                if !visible {
                    // Skip the subtree, attributing it to the current run.
                    run_count += subtree as u32;
                    index += subtree + 1;
                    continue;
                }
                let flags = self
                    .nodes
                    .get_at(id)
                    .expect("visible nodes are live")
                    .flags;
                if flags.contains(NodeFlags::CLIP) && subtree > 0 {
                    scopes.push((intersection, index + subtree + 1));
                    self.finish_clip_run(run_clip, run_count);
                    run_clip = intersection;
                    run_count = 0;
                }
                index += 1;
            }
            self.finish_clip_run(run_clip, run_count);
            block = block_end;
        }
    }

    fn finish_clip_run(&mut self, clip: Rect, count: u32) {
        if count == 0 {
            return;
        }
        self.clip_rect_offsets.push(clip.origin().to_vec2());
        self.clip_rect_sizes.push(clip.size());
        self.clip_rect_node_counts.push(count);
    }

    /// Copies the draw-visibility mask and clears event / enabled bits for
    /// subtrees rooted in `NO_EVENTS` / `DISABLED` nodes (pass 9).
    fn propagate_event_masks(&mut self) {
        self.visible_event_node_mask.clone_from(&self.visible_node_mask);
        self.visible_enabled_node_mask.clone_from(&self.visible_node_mask);
        for index in 0..self.visible_node_ids.len() {
            let id = self.visible_node_ids[index] as usize;
            let Some(node) = self.nodes.get_at(id) else {
                continue;
            };
            let subtree = self.visible_node_children_counts[index] as usize;
            if node.flags.contains(NodeFlags::NO_EVENTS) {
                for masked in index..=index + subtree {
                    self.visible_event_node_mask[self.visible_node_ids[masked] as usize] = false;
                }
            }
            if node.flags.contains(NodeFlags::DISABLED) {
                for masked in index..=index + subtree {
                    self.visible_enabled_node_mask[self.visible_node_ids[masked] as usize] = false;
                }
            }
        }
    }

    /// Partitions per-layer data against the visible set (pass 10): update
    /// lists grouped by clip run, sparse per-top-level-node draw calls,
    /// per-node event data in front-to-back order, and composite
    /// rectangles; finally compacts the draw call list.
    fn partition_data(&mut self, visible_or_lost_mask: &[bool]) {
        let node_capacity = self.nodes.capacity();
        let layer_capacity = self.layers.capacity();
        let visible_count = self.visible_node_ids.len();

        // Which clip run each visible-list position belongs to.
        let mut run_of_position = alloc::vec![0_u32; visible_count];
        {
            let mut position = 0;
            for (run, count) in self.clip_rect_node_counts.iter().enumerate() {
                for _ in 0..*count {
                    run_of_position[position] = run as u32;
                    position += 1;
                }
            }
            debug_assert_eq!(position, visible_count);
        }

        // Back-to-front block starts, and per position its block index.
        let mut block_of_position = alloc::vec![0_u32; visible_count];
        let mut block_count = 0;
        {
            let mut index = 0;
            while index < visible_count {
                let len = self.visible_node_children_counts[index] as usize + 1;
                for position in index..index + len {
                    block_of_position[position] = block_count;
                }
                block_count += 1;
                index += len;
            }
        }
        let block_count = block_count as usize;

        // Draw order position per layer id, counting draw layers only.
        let mut draw_order = alloc::vec![0_u32; layer_capacity];
        let mut draw_layer_count = 0_usize;
        if let Some(first) = self.first_layer {
            let mut layer = first;
            loop {
                let id = layer.index() as usize;
                if self.layers.get(layer).expect("chain entries are live").features
                    .contains(LayerFeatures::DRAW)
                {
                    draw_order[id] = draw_layer_count as u32;
                    draw_layer_count += 1;
                }
                match self.layers.chain_next(self.first_layer, layer) {
                    Some(next) => layer = next,
                    None => break,
                }
            }
        }

        let draw_slots = block_count * draw_layer_count;
        self.data_to_draw_layer_ids.clear();
        self.data_to_draw_layer_ids.resize(draw_slots, 0);
        self.data_to_draw_offsets.clear();
        self.data_to_draw_offsets.resize(draw_slots, 0);
        self.data_to_draw_sizes.clear();
        self.data_to_draw_sizes.resize(draw_slots, 0);
        self.data_to_draw_clip_rect_offsets.clear();
        self.data_to_draw_clip_rect_offsets.resize(draw_slots, 0);
        self.data_to_draw_clip_rect_sizes.clear();
        self.data_to_draw_clip_rect_sizes.resize(draw_slots, 0);

        self.data_to_update_ids.clear();
        self.data_to_update_clip_rect_ids.clear();
        self.data_to_update_clip_rect_data_counts.clear();
        self.composite_rect_offsets.clear();
        self.composite_rect_sizes.clear();
        self.data_to_update_layer_offsets.clear();
        self.data_to_update_layer_offsets.push([0, 0, 0]);

        self.visible_node_event_data_offsets.clear();
        self.visible_node_event_data_offsets
            .resize(node_capacity + 1, 0);

        // Per-layer data lists, counting-sorted by attached node.
        let mut node_data_offsets = alloc::vec![0_u32; node_capacity + 1];
        let mut node_data: Vec<u32> = Vec::new();

        for layer_id in 0..layer_capacity {
            let mut layer_offsets = *self
                .data_to_update_layer_offsets
                .last()
                .expect("seeded with one entry");

            let (features, data_capacity) = match self.layers.get_at(layer_id) {
                Some(slot) => (
                    slot.features,
                    slot.instance
                        .as_deref()
                        .map_or(0, |instance| instance.common().capacity()),
                ),
                None => (LayerFeatures::empty(), 0),
            };
            let has_instance = self
                .layers
                .get_at(layer_id)
                .is_some_and(|slot| slot.instance.is_some());

            if has_instance {
                // Group this layer's data by attached node.
                node_data_offsets.iter_mut().for_each(|offset| *offset = 0);
                let attachment_at = |ui: &Self, index: usize| {
                    ui.layers
                        .get_at(layer_id)
                        .and_then(|slot| slot.instance.as_deref())
                        .and_then(|instance| instance.common().attachment_at(index))
                };
                for index in 0..data_capacity {
                    if let Some(node) = attachment_at(self, index) {
                        node_data_offsets[node.index() as usize + 1] += 1;
                    }
                }
                for id in 0..node_capacity {
                    node_data_offsets[id + 1] += node_data_offsets[id];
                }
                node_data.clear();
                node_data.resize(data_capacity, 0);
                {
                    let mut cursors = node_data_offsets.clone();
                    for index in 0..data_capacity {
                        if let Some(node) = attachment_at(self, index) {
                            let id = node.index() as usize;
                            node_data[cursors[id] as usize] = index as u32;
                            cursors[id] += 1;
                        }
                    }
                }

                let is_drawing = block_count != 0 && features.contains(LayerFeatures::DRAW);
                let mut current_run = u32::MAX;
                let mut run_data_count = 0_u32;
                let mut current_block = u32::MAX;
                let mut block_data_start = 0_usize;
                let mut block_clip_start = 0_usize;

                for position in 0..visible_count {
                    let id = self.visible_node_ids[position] as usize;

                    if block_of_position[position] != current_block {
                        // Close the previous block: flush its trailing clip
                        // group first so the draw record sees it.
                        if run_data_count != 0 {
                            self.data_to_update_clip_rect_ids.push(current_run);
                            self.data_to_update_clip_rect_data_counts.push(run_data_count);
                            run_data_count = 0;
                        }
                        if is_drawing && current_block != u32::MAX {
                            self.record_block_draw(
                                current_block as usize,
                                draw_layer_count,
                                draw_order[layer_id],
                                layer_id,
                                block_data_start,
                                block_clip_start,
                            );
                        }
                        current_run = u32::MAX;
                        current_block = block_of_position[position];
                        block_data_start = self.data_to_update_ids.len();
                        block_clip_start = self.data_to_update_clip_rect_ids.len();
                    }

                    if !self.visible_node_mask[id] {
                        continue;
                    }
                    let range =
                        node_data_offsets[id] as usize..node_data_offsets[id + 1] as usize;
                    if range.is_empty() {
                        continue;
                    }
                    if run_of_position[position] != current_run {
                        if run_data_count != 0 {
                            self.data_to_update_clip_rect_ids.push(current_run);
                            self.data_to_update_clip_rect_data_counts.push(run_data_count);
                            run_data_count = 0;
                        }
                        current_run = run_of_position[position];
                    }
                    for data_index in range {
                        self.data_to_update_ids.push(node_data[data_index]);
                        run_data_count += 1;
                    }
                }
                if run_data_count != 0 {
                    self.data_to_update_clip_rect_ids.push(current_run);
                    self.data_to_update_clip_rect_data_counts.push(run_data_count);
                }
                if is_drawing && current_block != u32::MAX {
                    self.record_block_draw(
                        current_block as usize,
                        draw_layer_count,
                        draw_order[layer_id],
                        layer_id,
                        block_data_start,
                        block_clip_start,
                    );
                }

                // Event data counts, including nodes kept alive only for a
                // pending visibility-lost event.
                if features.contains(LayerFeatures::EVENT) {
                    for index in 0..data_capacity {
                        if let Some(node) = attachment_at(self, index)
                            && visible_or_lost_mask[node.index() as usize]
                        {
                            self.visible_node_event_data_offsets[node.index() as usize] += 1;
                        }
                    }
                }

                // Composite rectangles: one per newly appended data, the
                // node rectangle clipped by its run.
                if features.contains(LayerFeatures::COMPOSITE) {
                    let new_data = layer_offsets[0]..self.data_to_update_ids.len();
                    let new_runs = layer_offsets[1]..self.data_to_update_clip_rect_ids.len();
                    let mut data_cursor = new_data.start;
                    for run_entry in new_runs {
                        let run = self.data_to_update_clip_rect_ids[run_entry] as usize;
                        let clip = Rect::from_origin_size(
                            self.clip_rect_offsets[run].to_point(),
                            self.clip_rect_sizes[run],
                        );
                        for _ in 0..self.data_to_update_clip_rect_data_counts[run_entry] {
                            let data_id = self.data_to_update_ids[data_cursor] as usize;
                            data_cursor += 1;
                            let node = attachment_at(self, data_id)
                                .expect("partitioned data are attached");
                            let id = node.index() as usize;
                            let rect = Rect::from_origin_size(
                                self.absolute_node_offsets[id].to_point(),
                                self.node_sizes[id],
                            );
                            let composite = clip.intersect(rect);
                            self.composite_rect_offsets.push(composite.origin().to_vec2());
                            self.composite_rect_sizes.push(composite.size());
                        }
                    }
                    debug_assert_eq!(data_cursor, new_data.end);
                }
            }

            layer_offsets = [
                self.data_to_update_ids.len(),
                self.data_to_update_clip_rect_ids.len(),
                self.composite_rect_offsets.len(),
            ];
            self.data_to_update_layer_offsets.push(layer_offsets);
        }

        // Turn event data counts into exclusive prefix offsets; the range
        // for node `id` is [offsets[id], offsets[id + 1]).
        {
            let mut total = 0_u32;
            for offset in &mut self.visible_node_event_data_offsets {
                let next = total + *offset;
                *offset = total;
                total = next;
            }
            self.visible_node_event_data.clear();
            self.visible_node_event_data.resize(
                total as usize,
                DataHandle::new(
                    crate::handles::LayerHandle::new(0, 1),
                    crate::handles::LayerDataHandle::new(0, 1),
                ),
            );
        }

        // Fill event data per node: layers in front-to-back order, data
        // within one layer in reverse insertion order.
        if let Some(first) = self.first_layer {
            let mut cursors: Vec<u32> = self.visible_node_event_data_offsets.clone();
            let last = self
                .layers
                .chain_last(Some(first))
                .expect("non-empty chain has a last entry");
            let mut layer = last;
            loop {
                let slot = self.layers.get(layer).expect("chain entries are live");
                if slot.features.contains(LayerFeatures::EVENT)
                    && let Some(instance) = slot.instance.as_deref()
                {
                    let common = instance.common();
                    for index in (0..common.capacity()).rev() {
                        let Some(node) = common.attachment_at(index) else {
                            continue;
                        };
                        let id = node.index() as usize;
                        if !visible_or_lost_mask[id] {
                            continue;
                        }
                        let data = common
                            .data_handle_at(index)
                            .expect("attached slots are live");
                        self.visible_node_event_data[cursors[id] as usize] =
                            DataHandle::new(layer, data);
                        cursors[id] += 1;
                    }
                }
                match self.layers.chain_previous(self.first_layer, layer) {
                    Some(previous) => layer = previous,
                    None => break,
                }
            }
        }

        // Compact the sparse block-major, layer-minor draw list.
        self.draw_count = 0;
        for slot in 0..draw_slots {
            if self.data_to_draw_sizes[slot] == 0 {
                continue;
            }
            let compacted = self.draw_count;
            self.data_to_draw_layer_ids[compacted] = self.data_to_draw_layer_ids[slot];
            self.data_to_draw_offsets[compacted] = self.data_to_draw_offsets[slot];
            self.data_to_draw_sizes[compacted] = self.data_to_draw_sizes[slot];
            self.data_to_draw_clip_rect_offsets[compacted] =
                self.data_to_draw_clip_rect_offsets[slot];
            self.data_to_draw_clip_rect_sizes[compacted] = self.data_to_draw_clip_rect_sizes[slot];
            self.draw_count += 1;
        }
    }

    fn record_block_draw(
        &mut self,
        block: usize,
        draw_layer_count: usize,
        draw_position: u32,
        layer_id: usize,
        block_data_start: usize,
        block_clip_start: usize,
    ) {
        let slot = block * draw_layer_count + draw_position as usize;
        self.data_to_draw_layer_ids[slot] = layer_id as u32;
        self.data_to_draw_offsets[slot] = block_data_start;
        self.data_to_draw_sizes[slot] = self.data_to_update_ids.len() - block_data_start;
        self.data_to_draw_clip_rect_offsets[slot] = block_clip_start;
        self.data_to_draw_clip_rect_sizes[slot] =
            self.data_to_update_clip_rect_ids.len() - block_clip_start;
    }

    /// Emits `visibility_lost_event`s for event-current nodes that are no
    /// longer valid, visible, event-receiving or (for focus) focusable, and
    /// resets the corresponding current-node fields (pass 11). Each node
    /// receives the event at most once per update.
    fn emit_visibility_lost_events(&mut self, visible_or_lost_mask: &mut [bool]) {
        enum Slot {
            Pressed,
            Captured,
            Hovered,
        }
        for which in [Slot::Pressed, Slot::Captured, Slot::Hovered] {
            let node = match which {
                Slot::Pressed => self.current_pressed_node,
                Slot::Captured => self.current_captured_node,
                Slot::Hovered => self.current_hovered_node,
            };
            let Some(node) = node else {
                continue;
            };
            let valid = self.nodes.is_valid(node);
            let id = node.index() as usize;
            if valid && self.visible_event_node_mask[id] {
                continue;
            }
            if valid && visible_or_lost_mask[id] {
                let mut event = VisibilityLostEvent::new();
                self.call_visibility_lost_event_on_node(node, &mut event, false);
                visible_or_lost_mask[id] = false;
            }
            match which {
                Slot::Pressed => self.current_pressed_node = None,
                Slot::Captured => self.current_captured_node = None,
                Slot::Hovered => self.current_hovered_node = None,
            }
        }

        // Focus additionally requires the node to still be focusable; a
        // formerly focused node can still be pressed and hovered here.
        if let Some(node) = self.current_focused_node {
            let valid = self.nodes.is_valid(node);
            let id = node.index() as usize;
            let still_focusable = valid
                && self.visible_event_node_mask[id]
                && self
                    .nodes
                    .get(node)
                    .expect("validity checked")
                    .flags
                    .contains(NodeFlags::FOCUSABLE);
            if !still_focusable {
                if valid && visible_or_lost_mask[id] {
                    let mut event = VisibilityLostEvent::new();
                    self.call_visibility_lost_event_on_node(node, &mut event, true);
                    visible_or_lost_mask[id] = false;
                }
                self.current_focused_node = None;
            }
        }
    }

    /// Derives aggregate per-layer states from the UI states and calls
    /// every layer's `update` with its partition slices, in draw order
    /// (pass 12).
    fn update_layers(&mut self, states: UserInterfaceStates) {
        let Some(first) = self.first_layer else {
            return;
        };

        let mut all = LayerStates::empty();
        let mut all_composite = LayerStates::empty();
        if states.contains(UserInterfaceStates::NEEDS_LAYOUT_UPDATE) {
            all |= LayerStates::NEEDS_NODE_OFFSET_SIZE_UPDATE;
            all_composite |= LayerStates::NEEDS_COMPOSITE_OFFSET_SIZE_UPDATE;
        }
        if states.contains(UserInterfaceStates::NEEDS_NODE_CLIP_UPDATE) {
            all |= LayerStates::NEEDS_NODE_ORDER_UPDATE;
        }
        if states.contains(UserInterfaceStates::NEEDS_NODE_ENABLED_UPDATE) {
            all |= LayerStates::NEEDS_NODE_ENABLED_UPDATE;
        }
        if states.contains(UserInterfaceStates::NEEDS_NODE_OPACITY_UPDATE) {
            all |= LayerStates::NEEDS_NODE_OPACITY_UPDATE;
        }
        if states.contains(UserInterfaceStates::NEEDS_DATA_ATTACHMENT_UPDATE) {
            all |= LayerStates::NEEDS_NODE_ORDER_UPDATE;
        }

        let mut layer = first;
        loop {
            let layer_id = layer.index() as usize;
            let slot = self.layers.get_mut(layer).expect("chain entries are live");
            let features = slot.features;
            if let Some(mut instance) = slot.instance.take() {
                let mut layer_states = all | instance.state();
                if features.contains(LayerFeatures::COMPOSITE) {
                    layer_states |= all_composite;
                }
                if !layer_states.is_empty() {
                    let offsets = self.data_to_update_layer_offsets[layer_id];
                    let offsets_end = self.data_to_update_layer_offsets[layer_id + 1];
                    instance.update(&LayerUpdate {
                        states: layer_states,
                        data_ids: &self.data_to_update_ids[offsets[0]..offsets_end[0]],
                        clip_rect_ids: &self.data_to_update_clip_rect_ids
                            [offsets[1]..offsets_end[1]],
                        clip_rect_data_counts: &self.data_to_update_clip_rect_data_counts
                            [offsets[1]..offsets_end[1]],
                        node_offsets: &self.absolute_node_offsets,
                        node_sizes: &self.node_sizes,
                        node_opacities: &self.absolute_node_opacities,
                        nodes_enabled: &self.visible_enabled_node_mask,
                        clip_rect_offsets: &self.clip_rect_offsets,
                        clip_rect_sizes: &self.clip_rect_sizes,
                        composite_rect_offsets: &self.composite_rect_offsets
                            [offsets[2]..offsets_end[2]],
                        composite_rect_sizes: &self.composite_rect_sizes
                            [offsets[2]..offsets_end[2]],
                    });
                    instance.common_mut().clear_states(LayerStates::UPDATE_MASK);
                }
                if let Some(slot) = self.layers.get_mut(layer) {
                    slot.instance = Some(instance);
                }
            }
            match self.layers.chain_next(self.first_layer, layer) {
                Some(next) => layer = next,
                None => break,
            }
        }
    }
}

/// Orders the visible node hierarchy depth-first: top-level nodes in their
/// order-chain sequence, each followed by its visible non-top-level
/// descendants, children in creation order. Hidden nodes hide their whole
/// subtree, including nested top-level nodes.
fn order_visible_nodes(
    nodes: &canopy_handle::Arena<NodeHandle, Node>,
    node_order: &[OrderSlot],
    first_node_order: Option<NodeHandle>,
    visible_node_ids: &mut Vec<u32>,
    visible_node_children_counts: &mut Vec<u32>,
) {
    visible_node_ids.clear();
    visible_node_children_counts.clear();
    let Some(first) = first_node_order else {
        return;
    };

    let capacity = nodes.capacity();
    let mut visible = alloc::vec![false; capacity];

    // Children lists for non-top-level nodes; top-level nodes enter the
    // traversal through the order chain instead.
    let mut children_offsets = alloc::vec![0_u32; capacity + 1];
    let mut children = alloc::vec![0_u32; capacity];
    for id in 0..capacity {
        let Some(node) = nodes.get_at(id) else {
            continue;
        };
        if node.order.is_some() {
            continue;
        }
        let parent = node.parent.expect("non-top-level nodes have parents");
        children_offsets[parent.index() as usize + 1] += 1;
    }
    for id in 0..capacity {
        children_offsets[id + 1] += children_offsets[id];
    }
    {
        let mut cursors = children_offsets.clone();
        for id in 0..capacity {
            let Some(node) = nodes.get_at(id) else {
                continue;
            };
            if node.order.is_some() {
                continue;
            }
            let parent = node.parent.expect("non-top-level nodes have parents");
            let parent_id = parent.index() as usize;
            children[cursors[parent_id] as usize] = id as u32;
            cursors[parent_id] += 1;
        }
    }

    let mut current = Some(first);
    while let Some(handle) = current {
        let id = handle.index() as usize;
        let node = nodes.get(handle).expect("order chain entries are live");
        let order = node.order.expect("order chain entries are top-level");
        let next = node_order[order as usize].used().next;
        current = if next == Some(first) { None } else { next };

        // A nested top-level node is visible only if its parent chain was
        // reached; the containing hierarchy always comes earlier in the
        // chain, so a plain mark lookup suffices.
        let parent_visible = match node.parent {
            None => true,
            Some(parent) => visible[parent.index() as usize],
        };
        if !parent_visible || node.flags.contains(NodeFlags::HIDDEN) {
            continue;
        }

        visible[id] = true;
        let block_start = visible_node_ids.len();
        visible_node_ids.push(id as u32);
        visible_node_children_counts.push(0);

        // (position in the output, next child, past-the-end child)
        let mut stack: Vec<(usize, u32, u32)> = alloc::vec![(
            block_start,
            children_offsets[id],
            children_offsets[id + 1]
        )];
        while let Some(top) = stack.last_mut() {
            if top.1 == top.2 {
                let position = top.0;
                stack.pop();
                visible_node_children_counts[position] =
                    (visible_node_ids.len() - position - 1) as u32;
                continue;
            }
            let child = children[top.1 as usize] as usize;
            top.1 += 1;
            let child_node = nodes.get_at(child).expect("children are live");
            if child_node.flags.contains(NodeFlags::HIDDEN) {
                continue;
            }
            visible[child] = true;
            let position = visible_node_ids.len();
            visible_node_ids.push(child as u32);
            visible_node_children_counts.push(0);
            stack.push((
                position,
                children_offsets[child],
                children_offsets[child + 1],
            ));
        }
    }
}
