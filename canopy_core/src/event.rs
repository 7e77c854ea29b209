// Copyright 2025 the Canopy Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Event dispatch: hit testing, pointer capture, press/hover/focus
//! tracking and the fall-through protocol.
//!
//! All entry points lazily [`update`](Ui::update) first so dispatch runs
//! against a consistent view, scale the incoming window-relative position
//! by `size / window_size`, and return whether any data accepted the
//! event. Delivery per node walks the per-node event data list built by
//! the update pipeline: front-to-back across layers, reverse insertion
//! order within a layer.

use core::time::Duration;

use kurbo::{Point, Vec2};

use crate::error::Error;
use crate::events::{
    DispatchableEvent, FocusEvent, KeyEvent, PointerCancelEvent, PointerEvent, PointerMoveEvent,
    ScrollEvent, TextInputEvent, VisibilityLostEvent,
};
use crate::handles::NodeHandle;
use crate::layer::Layer;
use crate::node::NodeFlags;
use crate::ui::Ui;

type Hook<E> = fn(&mut dyn Layer, u32, &mut E);

impl Ui {
    /// Handles a pointer press at `position` in window coordinates.
    ///
    /// Non-primary presses go to the captured node when there is one;
    /// otherwise the front-most node under the position whose data accept
    /// the press wins. Primary presses update the pressed and captured
    /// nodes, and presses with a default pointer (left click, tap, pen)
    /// move focus to the accepted node when it's focusable. Finally the
    /// event falls through to ancestors that asked for it.
    pub fn pointer_press_event(
        &mut self,
        position: Point,
        event: &mut PointerEvent,
    ) -> Result<bool, Error> {
        if event.is_accepted() {
            return Err(Error::EventAlreadyAccepted);
        }
        self.update()?;
        let pos = self.scaled(position);
        let hook: Hook<PointerEvent> = |layer, id, event| layer.pointer_press_event(id, event);

        let called_node;
        let accepted;
        if !event.is_primary() && self.current_captured_node.is_some() {
            let captured = self.current_captured_node.expect("checked above");
            event.set_captured_flag(true);
            event.set_hovered_flag(self.position_inside(captured, pos));
            accepted = self.call_event_on_node(pos, captured, captured, event, false, hook);
            called_node = Some(captured);
        } else {
            // A primary press captures by default; handlers can opt out.
            event.set_captured_flag(event.is_primary());
            event.set_hovered_flag(true);
            called_node = self.call_event_hit(pos, event, hook);
            accepted = called_node.is_some();
        }

        // Capture changes apply before fall-through so fall-through
        // handlers get a chance to adjust them further.
        if accepted {
            self.current_captured_node = if event.is_captured() {
                called_node
            } else {
                None
            };
        }

        if event.is_primary() {
            self.current_pressed_node = if accepted { called_node } else { None };
            self.current_global_pointer_position = Some(pos);
        }

        if event.is_primary() && event.pointer().is_default() {
            let node_to_focus = called_node.filter(|node| {
                accepted
                    && self
                        .nodes
                        .get(*node)
                        .is_some_and(|n| n.flags.contains(NodeFlags::FOCUSABLE))
                    && self.visible_event_node_mask[node.index() as usize]
            });
            // A press that would merely blur keeps the focus on nodes that
            // opted out of blur-on-press-elsewhere.
            let keep_focus = node_to_focus.is_none()
                && self.current_focused_node.is_some_and(|node| {
                    self.nodes
                        .get(node)
                        .is_some_and(|n| n.flags.contains(NodeFlags::NO_BLUR))
                });
            if !keep_focus {
                if node_to_focus != self.current_focused_node
                    && let Some(previous) = self.current_focused_node
                {
                    let mut blur = FocusEvent::new(event.time());
                    self.call_focus_event_on_node(previous, &mut blur, true);
                }
                if let Some(node) = node_to_focus {
                    let mut focus = FocusEvent::new(event.time());
                    if self.call_focus_event_on_node(node, &mut focus, false) {
                        self.current_focused_node = Some(node);
                    } else {
                        // A focused node refusing a repeated focus gets
                        // blurred.
                        if self.current_focused_node == Some(node) {
                            let mut blur = FocusEvent::new(event.time());
                            self.call_focus_event_on_node(node, &mut blur, true);
                        }
                        self.current_focused_node = None;
                    }
                } else {
                    self.current_focused_node = None;
                }
            }
        }

        // Fall through either after an accepted press, or after an
        // unaccepted one on a captured node that would otherwise swallow
        // it.
        if accepted || self.current_captured_node.is_some() {
            let target = called_node.or(self.current_captured_node).expect("checked");
            self.call_fallthrough_pointer_events(target, pos, event, true, hook);
        }

        Ok(accepted)
    }

    /// Handles a pointer release at `position` in window coordinates.
    ///
    /// Goes to the captured node when there is one, with hit testing
    /// otherwise. A primary release implicitly releases capture; a
    /// non-primary release may re-set it. Focus is not touched.
    pub fn pointer_release_event(
        &mut self,
        position: Point,
        event: &mut PointerEvent,
    ) -> Result<bool, Error> {
        if event.is_accepted() {
            return Err(Error::EventAlreadyAccepted);
        }
        self.update()?;
        let pos = self.scaled(position);
        let hook: Hook<PointerEvent> = |layer, id, event| layer.pointer_release_event(id, event);

        let called_node;
        let accepted;
        if let Some(captured) = self.current_captured_node {
            event.set_captured_flag(true);
            event.set_hovered_flag(self.position_inside(captured, pos));
            accepted = self.call_event_on_node(pos, captured, captured, event, false, hook);
            called_node = if accepted { Some(captured) } else { None };
        } else {
            event.set_captured_flag(false);
            event.set_hovered_flag(true);
            called_node = self.call_event_hit(pos, event, hook);
            accepted = called_node.is_some();
        }

        if event.is_primary() {
            self.current_global_pointer_position = Some(pos);
        }

        if event.is_primary() {
            self.current_captured_node = None;
        } else if called_node.is_some() {
            self.current_captured_node = if event.is_captured() {
                called_node
            } else {
                None
            };
        }

        if accepted || self.current_captured_node.is_some() {
            if let Some(target) = called_node.or(self.current_captured_node) {
                self.call_fallthrough_pointer_events(
                    target,
                    pos,
                    event,
                    !event.is_primary(),
                    hook,
                );
            }
        }

        // Reset only after fall-through so observers still see the node as
        // pressed.
        if event.is_primary() {
            self.current_pressed_node = None;
        }

        Ok(accepted)
    }

    /// Handles a pointer move at `position` in window coordinates,
    /// generating enter and leave events when the hovered node changes.
    pub fn pointer_move_event(
        &mut self,
        position: Point,
        event: &mut PointerMoveEvent,
    ) -> Result<bool, Error> {
        if event.is_accepted() {
            return Err(Error::EventAlreadyAccepted);
        }
        self.update()?;
        let pos = self.scaled(position);
        let hook: Hook<PointerMoveEvent> = |layer, id, event| layer.pointer_move_event(id, event);

        // Relative motion is tracked for the primary pointer only.
        let relative_position = if event.is_primary() {
            self.current_global_pointer_position
                .map_or(Vec2::ZERO, |previous| pos - previous)
        } else {
            Vec2::ZERO
        };
        event.set_relative_position(relative_position);

        let called_node;
        let accepted;
        let inside_node_area;
        if let Some(captured) = self.current_captured_node {
            inside_node_area = self.position_inside(captured, pos);
            event.set_captured_flag(true);
            event.set_hovered_flag(inside_node_area);
            // A primary move may reset the capture even without accepting.
            accepted =
                self.call_event_on_node(pos, captured, captured, event, event.is_primary(), hook);
            called_node = Some(captured);
        } else {
            inside_node_area = true;
            event.set_captured_flag(false);
            event.set_hovered_flag(true);
            called_node = self.call_event_hit(pos, event, hook);
            accepted = called_node.is_some();
        }

        // Decide the new hovered node and which enter/leave calls to make;
        // only primary moves affect hover.
        let mut call_leave_on = None;
        let mut call_enter_on = None;
        if event.is_primary() {
            if self.current_captured_node.is_some() {
                let called = called_node.expect("captured moves have a called node");
                if self.current_hovered_node == Some(called) && (!inside_node_area || !accepted) {
                    call_leave_on = Some(called);
                } else if self.current_hovered_node.is_some()
                    && self.current_hovered_node != Some(called)
                {
                    call_leave_on = self.current_hovered_node;
                }
                if self.current_hovered_node != Some(called) && inside_node_area && accepted {
                    call_enter_on = Some(called);
                }
                self.current_hovered_node = if inside_node_area && accepted {
                    Some(called)
                } else {
                    None
                };
            } else if self.current_hovered_node != called_node {
                if self.current_hovered_node.is_some() {
                    call_leave_on = self.current_hovered_node;
                }
                if called_node.is_some() {
                    call_enter_on = called_node;
                }
                self.current_hovered_node = called_node;
            }
        }

        // Leave events can't affect the accept status, and can change
        // capture only when called on the captured node itself.
        if let Some(leave_node) = call_leave_on {
            event.set_accepted_flag(false);
            event.set_hovered_flag(false);
            let saved_captured = event.is_captured();
            if self.current_captured_node != Some(leave_node) {
                event.set_captured_flag(false);
            }
            event.set_relative_position(Vec2::ZERO);
            let leave_hook: Hook<PointerMoveEvent> =
                |layer, id, event| layer.pointer_leave_event(id, event);
            self.call_event_on_node(pos, leave_node, leave_node, event, true, leave_hook);
            if self.current_captured_node != Some(leave_node) {
                event.set_captured_flag(saved_captured);
            }
        }

        if let Some(enter_node) = call_enter_on {
            event.set_accepted_flag(false);
            event.set_hovered_flag(true);
            event.set_relative_position(Vec2::ZERO);
            let enter_hook: Hook<PointerMoveEvent> =
                |layer, id, event| layer.pointer_enter_event(id, event);
            self.call_event_on_node(pos, enter_node, enter_node, event, true, enter_hook);
        }

        self.current_captured_node = if event.is_captured() {
            called_node
        } else {
            None
        };

        if event.is_primary() {
            // Without capture the pressed node dies as soon as the pointer
            // leaves it; with capture it survives so the pointer can return
            // and still finish a click.
            if self.current_captured_node.is_none()
                && (called_node != self.current_pressed_node || !inside_node_area || !accepted)
            {
                self.current_pressed_node = None;
            }
            self.current_global_pointer_position = Some(pos);
        }

        if accepted || self.current_captured_node.is_some() {
            if let Some(target) = called_node.or(self.current_captured_node) {
                event.set_relative_position(relative_position);
                self.call_fallthrough_pointer_events(target, pos, event, true, hook);
            }
        }

        Ok(accepted)
    }

    /// Handles a scroll at `position` in window coordinates.
    ///
    /// Directed at the captured node when capture is active, the currently
    /// hovered node otherwise; there is no hit-testing descent.
    pub fn scroll_event(
        &mut self,
        position: Point,
        event: &mut ScrollEvent,
    ) -> Result<bool, Error> {
        if event.is_accepted() {
            return Err(Error::EventAlreadyAccepted);
        }
        self.update()?;
        let pos = self.scaled(position);
        let hook: Hook<ScrollEvent> = |layer, id, event| layer.scroll_event(id, event);

        if let Some(captured) = self.current_captured_node {
            event.set_hovered_flag(self.position_inside(captured, pos));
            return Ok(self.call_event_on_node(pos, captured, captured, event, false, hook));
        }
        if let Some(hovered) = self.current_hovered_node {
            event.set_hovered_flag(true);
            return Ok(self.call_event_on_node(pos, hovered, hovered, event, false, hook));
        }
        Ok(false)
    }

    /// Focuses `node`, or blurs the current focus when `node` is `None`.
    ///
    /// The node has to be focusable. Delivers `focus_event` to the node's
    /// data and, depending on acceptance, `blur_event` to the previously
    /// focused node.
    pub fn focus_event(
        &mut self,
        node: Option<NodeHandle>,
        event: &mut FocusEvent,
    ) -> Result<bool, Error> {
        if event.is_accepted() {
            return Err(Error::EventAlreadyAccepted);
        }
        if let Some(node) = node {
            if !self.nodes.is_valid(node) {
                return Err(Error::InvalidHandle);
            }
            if !self
                .nodes
                .get(node)
                .expect("validity checked")
                .flags
                .contains(NodeFlags::FOCUSABLE)
            {
                return Err(Error::IncompatibleCapabilities);
            }
        }
        self.update()?;

        // A node that's currently invisible or not receiving events can't
        // be focused; not even the previous focus is blurred then.
        if let Some(node) = node
            && !self.visible_event_node_mask[node.index() as usize]
        {
            return Ok(false);
        }

        let focus_accepted = match node {
            Some(node) => self.call_focus_event_on_node(node, event, false),
            None => false,
        };

        if node.is_none()
            || (focus_accepted && self.current_focused_node != node)
            || (!focus_accepted && self.current_focused_node == node)
        {
            if let Some(previous) = self.current_focused_node {
                let mut blur = FocusEvent::new(event.time());
                self.call_focus_event_on_node(previous, &mut blur, true);
            }
            self.current_focused_node = if !focus_accepted && self.current_focused_node == node {
                None
            } else {
                node
            };
        }

        Ok(focus_accepted)
    }

    /// Handles a key press.
    ///
    /// Goes to the focused node when there is one; otherwise, if a pointer
    /// position is known, to the captured or hovered node under it.
    pub fn key_press_event(&mut self, event: &mut KeyEvent) -> Result<bool, Error> {
        self.key_press_or_release_event(event, |layer, id, event| {
            layer.key_press_event(id, event);
        })
    }

    /// Handles a key release; routed like [`key_press_event`](Self::key_press_event).
    pub fn key_release_event(&mut self, event: &mut KeyEvent) -> Result<bool, Error> {
        self.key_press_or_release_event(event, |layer, id, event| {
            layer.key_release_event(id, event);
        })
    }

    fn key_press_or_release_event(
        &mut self,
        event: &mut KeyEvent,
        hook: Hook<KeyEvent>,
    ) -> Result<bool, Error> {
        if event.is_accepted() {
            return Err(Error::EventAlreadyAccepted);
        }
        self.update()?;

        if let Some(focused) = self.current_focused_node {
            return Ok(self.call_key_event_on_node(focused, event, hook));
        }
        if let Some(pos) = self.current_global_pointer_position {
            if let Some(captured) = self.current_captured_node {
                event.set_hovered_flag(self.current_hovered_node == Some(captured));
                return Ok(self.call_event_on_node(pos, captured, captured, event, false, hook));
            }
            if let Some(hovered) = self.current_hovered_node {
                event.set_hovered_flag(true);
                return Ok(self.call_event_on_node(pos, hovered, hovered, event, false, hook));
            }
        }
        Ok(false)
    }

    /// Handles text input, directed at the focused node; a no-op without
    /// focus.
    pub fn text_input_event(&mut self, event: &mut TextInputEvent) -> Result<bool, Error> {
        if event.is_accepted() {
            return Err(Error::EventAlreadyAccepted);
        }
        self.update()?;

        let Some(focused) = self.current_focused_node else {
            return Ok(false);
        };
        let id = focused.index() as usize;
        let start = self.visible_node_event_data_offsets[id] as usize;
        let end = self.visible_node_event_data_offsets[id + 1] as usize;
        let mut accepted_by_any = false;
        for index in start..end {
            let data = self.visible_node_event_data[index];
            event.set_accepted_flag(false);
            self.with_layer_instance(data.layer().index() as usize, |instance| {
                instance.text_input_event(data.data().index(), event);
            });
            if event.is_accepted() {
                accepted_by_any = true;
            }
        }
        Ok(accepted_by_any)
    }

    // --- Internals --------------------------------------------------------

    fn scaled(&self, position: Point) -> Vec2 {
        Vec2::new(
            position.x * self.size.width / self.window_size.width,
            position.y * self.size.height / self.window_size.height,
        )
    }

    fn position_inside(&self, node: NodeHandle, pos: Vec2) -> bool {
        let id = node.index() as usize;
        let offset = self.absolute_node_offsets[id];
        let size = self.node_sizes[id];
        pos.x >= offset.x
            && pos.y >= offset.y
            && pos.x < offset.x + size.width
            && pos.y < offset.y + size.height
    }

    /// Runs `f` with the layer instance at `layer_id` temporarily taken
    /// out of its slot, so the callback can coexist with other borrows of
    /// the runtime.
    fn with_layer_instance(&mut self, layer_id: usize, f: impl FnOnce(&mut dyn Layer)) {
        let Some(slot) = self.layers.get_at_mut(layer_id) else {
            return;
        };
        let Some(mut instance) = slot.instance.take() else {
            return;
        };
        f(instance.as_mut());
        if let Some(slot) = self.layers.get_at_mut(layer_id) {
            slot.instance = Some(instance);
        }
    }

    /// Delivers `event` to all event data of `node`. `target_node` is the
    /// node the original event was accepted on; it differs from `node` only
    /// for fall-through observations and is what the pressed/hovered view
    /// is computed against.
    fn call_event_on_node<E: DispatchableEvent>(
        &mut self,
        pos: Vec2,
        node: NodeHandle,
        target_node: NodeHandle,
        event: &mut E,
        remember_capture_on_unaccepted: bool,
        hook: Hook<E>,
    ) -> bool {
        // The caller may have cleared the hovered view for a position
        // outside the node, so only clear, never set, and restore after.
        let node_hovered = event.hovered_flag();
        if Some(target_node) != self.current_hovered_node {
            event.set_hovered_flag(false);
        }
        event.set_pressed_flag(Some(target_node) == self.current_pressed_node);
        // Focus is not inherited by fall-through observers, so compare the
        // called node, not the target.
        event.set_focused_flag(Some(node) == self.current_focused_node);

        let id = node.index() as usize;
        let start = self.visible_node_event_data_offsets[id] as usize;
        let end = self.visible_node_event_data_offsets[id + 1] as usize;
        let mut accepted_by_any = false;
        for index in start..end {
            let data = self.visible_node_event_data[index];
            let captured = event.captured_flag();
            event.set_local(pos - self.absolute_node_offsets[id], self.node_sizes[id]);
            event.set_accepted_flag(false);
            self.with_layer_instance(data.layer().index() as usize, |instance| {
                hook(instance, data.data().index(), event);
            });
            if event.accepted_flag() {
                accepted_by_any = true;
            } else if !remember_capture_on_unaccepted {
                // Capture changes only count from the handler that accepts;
                // reset here so later handlers don't see bogus state.
                event.set_captured_flag(captured);
            }
        }

        event.set_hovered_flag(node_hovered);
        accepted_by_any
    }

    /// Recursive hit testing: descends into direct children before trying
    /// the node itself, returns the node whose data accepted the event.
    fn call_event_recursive<E: DispatchableEvent>(
        &mut self,
        pos: Vec2,
        visible_index: usize,
        event: &mut E,
        hook: Hook<E>,
    ) -> Option<NodeHandle> {
        debug_assert!(!event.accepted_flag());
        let id = self.visible_node_ids[visible_index] as usize;
        if !self.visible_event_node_mask[id] {
            return None;
        }
        let offset = self.absolute_node_offsets[id];
        let size = self.node_sizes[id];
        if pos.x < offset.x
            || pos.y < offset.y
            || pos.x >= offset.x + size.width
            || pos.y >= offset.y + size.height
        {
            return None;
        }

        let mut child = 1;
        let subtree_end = self.visible_node_children_counts[visible_index] as usize + 1;
        while child != subtree_end {
            if let Some(called) = self.call_event_recursive(pos, visible_index + child, event, hook)
            {
                return Some(called);
            }
            child += self.visible_node_children_counts[visible_index + child] as usize + 1;
        }

        let node = self.nodes.handle_at(id).expect("visible nodes are live");
        if self.call_event_on_node(pos, node, node, event, false, hook) {
            return Some(node);
        }
        None
    }

    /// Hit testing across top-level hierarchies front-to-back.
    fn call_event_hit<E: DispatchableEvent>(
        &mut self,
        pos: Vec2,
        event: &mut E,
        hook: Hook<E>,
    ) -> Option<NodeHandle> {
        for index in 0..self.front_to_back_top_level_indices.len() {
            let visible_index = self.front_to_back_top_level_indices[index] as usize;
            if let Some(called) = self.call_event_recursive(pos, visible_index, event, hook) {
                return Some(called);
            }
        }
        None
    }

    /// Walks the parent chain of `target_node`, delivering the event as a
    /// fall-through observation to every ancestor that asked for it. An
    /// ancestor accepting takes the interaction over: the previously
    /// pressed/hovered/focused/captured nodes get a cancel, capture moves
    /// unconditionally, press and hover move for primary events, and focus
    /// survives only if the ancestor already held it.
    fn call_fallthrough_pointer_events<E: DispatchableEvent>(
        &mut self,
        mut target_node: NodeHandle,
        pos: Vec2,
        event: &mut E,
        allow_capture: bool,
        hook: Hook<E>,
    ) {
        event.set_fallthrough_flag(true);

        let mut parent = self
            .nodes
            .get(target_node)
            .and_then(|node| node.parent);
        while let Some(parent_node) = parent {
            let flags = self
                .nodes
                .get(parent_node)
                .expect("parents of live nodes are live")
                .flags;
            if flags.contains(NodeFlags::FALLTHROUGH_POINTER_EVENTS)
                && self.call_event_on_node(pos, parent_node, target_node, event, false, hook)
            {
                // Cancel previous interaction holders, each at most once,
                // and never the node that just took over. Secondary events
                // only ever cancel and move the capture.
                let holders = [
                    event.primary_flag().then_some(self.current_pressed_node).flatten(),
                    event.primary_flag().then_some(self.current_hovered_node).flatten(),
                    event.primary_flag().then_some(self.current_focused_node).flatten(),
                    self.current_captured_node,
                ];
                for index in 0..holders.len() {
                    let mut holder = holders[index];
                    for earlier in 0..index {
                        if holders[earlier] == holder {
                            holder = None;
                        }
                    }
                    let Some(holder) = holder else {
                        continue;
                    };
                    if holder == parent_node {
                        continue;
                    }
                    self.call_pointer_cancel_on_node(holder, event.time());
                }

                if event.primary_flag() {
                    self.current_pressed_node =
                        (self.current_pressed_node == Some(target_node)).then_some(parent_node);
                    self.current_hovered_node =
                        (self.current_hovered_node == Some(target_node)).then_some(parent_node);
                    if self.current_focused_node != Some(parent_node) {
                        self.current_focused_node = None;
                    }
                    // Subsequent fall-through levels see this node as the
                    // interaction holder.
                    target_node = parent_node;
                }

                self.current_captured_node = if event.captured_flag() && allow_capture {
                    Some(parent_node)
                } else {
                    None
                };
            }
            parent = self
                .nodes
                .get(parent_node)
                .and_then(|node| node.parent);
        }
    }

    fn call_pointer_cancel_on_node(&mut self, node: NodeHandle, time: Duration) {
        let id = node.index() as usize;
        let start = self.visible_node_event_data_offsets[id] as usize;
        let end = self.visible_node_event_data_offsets[id + 1] as usize;
        for index in start..end {
            let data = self.visible_node_event_data[index];
            let mut cancel = PointerCancelEvent::new(time);
            self.with_layer_instance(data.layer().index() as usize, |instance| {
                instance.pointer_cancel_event(data.data().index(), &mut cancel);
            });
        }
    }

    fn call_focus_event_on_node(
        &mut self,
        node: NodeHandle,
        event: &mut FocusEvent,
        blur: bool,
    ) -> bool {
        event.set_current(
            Some(node) == self.current_pressed_node,
            Some(node) == self.current_hovered_node,
        );
        let id = node.index() as usize;
        let start = self.visible_node_event_data_offsets[id] as usize;
        let end = self.visible_node_event_data_offsets[id + 1] as usize;
        let mut accepted_by_any = false;
        for index in start..end {
            let data = self.visible_node_event_data[index];
            event.set_accepted_flag(false);
            self.with_layer_instance(data.layer().index() as usize, |instance| {
                if blur {
                    instance.blur_event(data.data().index(), event);
                } else {
                    instance.focus_event(data.data().index(), event);
                }
            });
            if event.is_accepted() {
                accepted_by_any = true;
            }
        }
        accepted_by_any
    }

    fn call_key_event_on_node(
        &mut self,
        node: NodeHandle,
        event: &mut KeyEvent,
        hook: Hook<KeyEvent>,
    ) -> bool {
        event.set_pressed_flag(Some(node) == self.current_pressed_node);
        event.set_hovered_flag(Some(node) == self.current_hovered_node);
        event.set_focused_flag(Some(node) == self.current_focused_node);

        let id = node.index() as usize;
        let start = self.visible_node_event_data_offsets[id] as usize;
        let end = self.visible_node_event_data_offsets[id + 1] as usize;
        let mut accepted_by_any = false;
        for index in start..end {
            let data = self.visible_node_event_data[index];
            event.set_accepted_flag(false);
            self.with_layer_instance(data.layer().index() as usize, |instance| {
                hook(instance, data.data().index(), event);
            });
            if event.is_accepted() {
                accepted_by_any = true;
            }
        }
        accepted_by_any
    }

    /// Delivers a `visibility_lost_event` to all event data of `node`.
    ///
    /// Unlike regular delivery this doesn't consult the event mask: the
    /// whole point is reaching nodes that just dropped out of it.
    pub(crate) fn call_visibility_lost_event_on_node(
        &mut self,
        node: NodeHandle,
        event: &mut VisibilityLostEvent,
        can_be_pressed_or_hovering: bool,
    ) {
        event.set_current(
            can_be_pressed_or_hovering && Some(node) == self.current_pressed_node,
            can_be_pressed_or_hovering && Some(node) == self.current_hovered_node,
        );
        let id = node.index() as usize;
        let start = self.visible_node_event_data_offsets[id] as usize;
        let end = self.visible_node_event_data_offsets[id + 1] as usize;
        for index in start..end {
            let data = self.visible_node_event_data[index];
            self.with_layer_instance(data.layer().index() as usize, |instance| {
                instance.visibility_lost_event(data.data().index(), event);
            });
        }
    }
}
