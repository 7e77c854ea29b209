// Copyright 2025 the Canopy Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Event types passed into the [`Ui`](crate::Ui) entry points and on to
//! layer event hooks.
//!
//! Events are mutable objects: the dispatcher fills in the node-relative
//! position and the pressed/hovered/focused/captured view before each hook
//! call, and hooks communicate back by calling
//! [`set_accepted`](PointerEvent::set_accepted) and (where meaningful)
//! [`set_captured`](PointerEvent::set_captured). An event object is single
//! use; passing an already-accepted event to an entry point is an error.

use core::time::Duration;

use bitflags::bitflags;
use kurbo::{Size, Vec2};

/// Pointer type that generated a pointer event.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum Pointer {
    /// Left mouse button.
    MouseLeft,
    /// Middle mouse button.
    MouseMiddle,
    /// Right mouse button.
    MouseRight,
    /// Touch contact.
    Finger,
    /// Pen tip.
    Pen,
    /// Pen eraser.
    Eraser,
}

impl Pointer {
    /// Whether this pointer type activates and focuses UI elements, i.e.
    /// it's a left click, a tap or a pen touch.
    pub(crate) fn is_default(self) -> bool {
        matches!(self, Self::MouseLeft | Self::Finger | Self::Pen)
    }
}

bitflags! {
    /// Keyboard modifiers active during an event.
    #[derive(Copy, Clone, Debug, PartialEq, Eq, Default)]
    pub struct Modifiers: u8 {
        /// Shift.
        const SHIFT = 1 << 0;
        /// Control.
        const CTRL = 1 << 1;
        /// Alt / Option.
        const ALT = 1 << 2;
        /// Super / Command / Windows.
        const SUPER = 1 << 3;
    }
}

/// Key identifier for key events.
///
/// The runtime routes key events without inspecting the key, so this only
/// has to be descriptive enough for layer implementations.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum Key {
    /// Enter / Return.
    Enter,
    /// Escape.
    Escape,
    /// Tab.
    Tab,
    /// Space bar.
    Space,
    /// Backspace.
    Backspace,
    /// Delete.
    Delete,
    /// Insert.
    Insert,
    /// Home.
    Home,
    /// End.
    End,
    /// Page up.
    PageUp,
    /// Page down.
    PageDown,
    /// Up arrow.
    Up,
    /// Down arrow.
    Down,
    /// Left arrow.
    Left,
    /// Right arrow.
    Right,
    /// A printable key, identified by the unmodified character it produces.
    Character(char),
    /// Anything else.
    Unidentified,
}

/// Internal view of an event during dispatch, shared by the positioned
/// event types.
pub(crate) trait DispatchableEvent {
    fn set_local(&mut self, position: Vec2, node_size: Size);
    fn accepted_flag(&self) -> bool;
    fn set_accepted_flag(&mut self, accepted: bool);
    fn captured_flag(&self) -> bool;
    fn set_captured_flag(&mut self, captured: bool);
    fn primary_flag(&self) -> bool;
    fn hovered_flag(&self) -> bool;
    fn set_hovered_flag(&mut self, hovered: bool);
    fn set_pressed_flag(&mut self, pressed: bool);
    fn set_focused_flag(&mut self, focused: bool);
    fn set_fallthrough_flag(&mut self, _fallthrough: bool) {}
    fn time(&self) -> Duration;
}

macro_rules! dispatchable_common {
    () => {
        fn set_local(&mut self, position: Vec2, node_size: Size) {
            self.position = position;
            self.node_size = node_size;
        }

        fn accepted_flag(&self) -> bool {
            self.accepted
        }

        fn set_accepted_flag(&mut self, accepted: bool) {
            self.accepted = accepted;
        }

        fn hovered_flag(&self) -> bool {
            self.node_hovered
        }

        fn set_hovered_flag(&mut self, hovered: bool) {
            self.node_hovered = hovered;
        }

        fn set_pressed_flag(&mut self, pressed: bool) {
            self.node_pressed = pressed;
        }

        fn set_focused_flag(&mut self, focused: bool) {
            self.node_focused = focused;
        }

        fn time(&self) -> Duration {
            self.time
        }
    };
}

/// A pointer press or release.
#[derive(Clone, Debug)]
pub struct PointerEvent {
    time: Duration,
    pointer: Pointer,
    primary: bool,
    modifiers: Modifiers,
    position: Vec2,
    node_size: Size,
    accepted: bool,
    captured: bool,
    fallthrough: bool,
    node_pressed: bool,
    node_hovered: bool,
    node_focused: bool,
}

impl PointerEvent {
    /// Creates a press/release event for `pointer`.
    ///
    /// `primary` distinguishes the pointer driving the interaction (the
    /// first touch, any mouse button) from additional touches.
    #[must_use]
    pub fn new(time: Duration, pointer: Pointer, primary: bool) -> Self {
        Self {
            time,
            pointer,
            primary,
            modifiers: Modifiers::empty(),
            position: Vec2::ZERO,
            node_size: Size::ZERO,
            accepted: false,
            captured: false,
            fallthrough: false,
            node_pressed: false,
            node_hovered: false,
            node_focused: false,
        }
    }

    /// Adds keyboard modifiers.
    #[must_use]
    pub fn with_modifiers(mut self, modifiers: Modifiers) -> Self {
        self.modifiers = modifiers;
        self
    }

    /// Time the event happened at.
    #[must_use]
    pub fn time(&self) -> Duration {
        self.time
    }

    /// The pointer that was pressed or released.
    #[must_use]
    pub fn pointer(&self) -> Pointer {
        self.pointer
    }

    /// Whether this is the primary pointer of the interaction.
    #[must_use]
    pub fn is_primary(&self) -> bool {
        self.primary
    }

    /// Active keyboard modifiers.
    #[must_use]
    pub fn modifiers(&self) -> Modifiers {
        self.modifiers
    }

    /// Position relative to the node the event is being called on.
    #[must_use]
    pub fn position(&self) -> Vec2 {
        self.position
    }

    /// Size of the node the event is being called on.
    #[must_use]
    pub fn node_size(&self) -> Size {
        self.node_size
    }

    /// Whether a hook accepted the event.
    #[must_use]
    pub fn is_accepted(&self) -> bool {
        self.accepted
    }

    /// Accepts the event, stopping the search for further receivers.
    pub fn set_accepted(&mut self) {
        self.accepted = true;
    }

    /// Whether the node the event is called on captures the pointer.
    ///
    /// Defaults to the primary flag on a press and to the existing capture
    /// state otherwise.
    #[must_use]
    pub fn is_captured(&self) -> bool {
        self.captured
    }

    /// Requests or releases pointer capture for the called node.
    pub fn set_captured(&mut self, captured: bool) {
        self.captured = captured;
    }

    /// Whether this event is being observed by an ancestor with
    /// [`NodeFlags::FALLTHROUGH_POINTER_EVENTS`](crate::NodeFlags::FALLTHROUGH_POINTER_EVENTS)
    /// after initial delivery.
    #[must_use]
    pub fn is_fallthrough(&self) -> bool {
        self.fallthrough
    }

    /// Whether the target node is the currently pressed node.
    #[must_use]
    pub fn is_node_pressed(&self) -> bool {
        self.node_pressed
    }

    /// Whether the target node is currently hovered and the position is
    /// inside it.
    #[must_use]
    pub fn is_node_hovered(&self) -> bool {
        self.node_hovered
    }

    /// Whether the called node is the currently focused node.
    #[must_use]
    pub fn is_node_focused(&self) -> bool {
        self.node_focused
    }
}

impl DispatchableEvent for PointerEvent {
    dispatchable_common!();

    fn captured_flag(&self) -> bool {
        self.captured
    }

    fn set_captured_flag(&mut self, captured: bool) {
        self.captured = captured;
    }

    fn primary_flag(&self) -> bool {
        self.primary
    }

    fn set_fallthrough_flag(&mut self, fallthrough: bool) {
        self.fallthrough = fallthrough;
    }
}

/// A pointer move.
#[derive(Clone, Debug)]
pub struct PointerMoveEvent {
    time: Duration,
    pointer: Option<Pointer>,
    primary: bool,
    modifiers: Modifiers,
    position: Vec2,
    relative_position: Vec2,
    node_size: Size,
    accepted: bool,
    captured: bool,
    fallthrough: bool,
    node_pressed: bool,
    node_hovered: bool,
    node_focused: bool,
}

impl PointerMoveEvent {
    /// Creates a move event.
    ///
    /// `pointer` is the pointer that moved, if the application can tell;
    /// `primary` as in [`PointerEvent::new`].
    #[must_use]
    pub fn new(time: Duration, pointer: Option<Pointer>, primary: bool) -> Self {
        Self {
            time,
            pointer,
            primary,
            modifiers: Modifiers::empty(),
            position: Vec2::ZERO,
            relative_position: Vec2::ZERO,
            node_size: Size::ZERO,
            accepted: false,
            captured: false,
            fallthrough: false,
            node_pressed: false,
            node_hovered: false,
            node_focused: false,
        }
    }

    /// Adds keyboard modifiers.
    #[must_use]
    pub fn with_modifiers(mut self, modifiers: Modifiers) -> Self {
        self.modifiers = modifiers;
        self
    }

    /// Time the event happened at.
    #[must_use]
    pub fn time(&self) -> Duration {
        self.time
    }

    /// The pointer that moved, if known.
    #[must_use]
    pub fn pointer(&self) -> Option<Pointer> {
        self.pointer
    }

    /// Whether this is the primary pointer of the interaction.
    #[must_use]
    pub fn is_primary(&self) -> bool {
        self.primary
    }

    /// Active keyboard modifiers.
    #[must_use]
    pub fn modifiers(&self) -> Modifiers {
        self.modifiers
    }

    /// Position relative to the node the event is being called on.
    #[must_use]
    pub fn position(&self) -> Vec2 {
        self.position
    }

    /// Position relative to the previous primary pointer event. Zero for
    /// enter/leave events and for the first pointer event ever.
    #[must_use]
    pub fn relative_position(&self) -> Vec2 {
        self.relative_position
    }

    pub(crate) fn set_relative_position(&mut self, relative: Vec2) {
        self.relative_position = relative;
    }

    /// Size of the node the event is being called on.
    #[must_use]
    pub fn node_size(&self) -> Size {
        self.node_size
    }

    /// Whether a hook accepted the event.
    #[must_use]
    pub fn is_accepted(&self) -> bool {
        self.accepted
    }

    /// Accepts the event. For moves this is what keeps hover alive; enter
    /// and leave events are only generated for nodes whose data accept the
    /// move.
    pub fn set_accepted(&mut self) {
        self.accepted = true;
    }

    /// Whether the node the event is called on captures the pointer.
    #[must_use]
    pub fn is_captured(&self) -> bool {
        self.captured
    }

    /// Requests or releases pointer capture for the called node.
    pub fn set_captured(&mut self, captured: bool) {
        self.captured = captured;
    }

    /// Whether this event is a fall-through observation.
    #[must_use]
    pub fn is_fallthrough(&self) -> bool {
        self.fallthrough
    }

    /// Whether the target node is the currently pressed node.
    #[must_use]
    pub fn is_node_pressed(&self) -> bool {
        self.node_pressed
    }

    /// Whether the target node is currently hovered and the position is
    /// inside it.
    #[must_use]
    pub fn is_node_hovered(&self) -> bool {
        self.node_hovered
    }

    /// Whether the called node is the currently focused node.
    #[must_use]
    pub fn is_node_focused(&self) -> bool {
        self.node_focused
    }
}

impl DispatchableEvent for PointerMoveEvent {
    dispatchable_common!();

    fn captured_flag(&self) -> bool {
        self.captured
    }

    fn set_captured_flag(&mut self, captured: bool) {
        self.captured = captured;
    }

    fn primary_flag(&self) -> bool {
        self.primary
    }

    fn set_fallthrough_flag(&mut self, fallthrough: bool) {
        self.fallthrough = fallthrough;
    }
}

/// A scroll wheel / trackpad scroll.
#[derive(Clone, Debug)]
pub struct ScrollEvent {
    time: Duration,
    offset: Vec2,
    modifiers: Modifiers,
    position: Vec2,
    node_size: Size,
    accepted: bool,
    node_pressed: bool,
    node_hovered: bool,
    node_focused: bool,
}

impl ScrollEvent {
    /// Creates a scroll event with a scroll `offset` in steps.
    #[must_use]
    pub fn new(time: Duration, offset: Vec2) -> Self {
        Self {
            time,
            offset,
            modifiers: Modifiers::empty(),
            position: Vec2::ZERO,
            node_size: Size::ZERO,
            accepted: false,
            node_pressed: false,
            node_hovered: false,
            node_focused: false,
        }
    }

    /// Adds keyboard modifiers.
    #[must_use]
    pub fn with_modifiers(mut self, modifiers: Modifiers) -> Self {
        self.modifiers = modifiers;
        self
    }

    /// Time the event happened at.
    #[must_use]
    pub fn time(&self) -> Duration {
        self.time
    }

    /// Scroll offset in steps; positive is right and up.
    #[must_use]
    pub fn offset(&self) -> Vec2 {
        self.offset
    }

    /// Active keyboard modifiers.
    #[must_use]
    pub fn modifiers(&self) -> Modifiers {
        self.modifiers
    }

    /// Position relative to the node the event is being called on.
    #[must_use]
    pub fn position(&self) -> Vec2 {
        self.position
    }

    /// Size of the node the event is being called on.
    #[must_use]
    pub fn node_size(&self) -> Size {
        self.node_size
    }

    /// Whether a hook accepted the event.
    #[must_use]
    pub fn is_accepted(&self) -> bool {
        self.accepted
    }

    /// Accepts the event.
    pub fn set_accepted(&mut self) {
        self.accepted = true;
    }

    /// Whether the target node is the currently pressed node.
    #[must_use]
    pub fn is_node_pressed(&self) -> bool {
        self.node_pressed
    }

    /// Whether the target node is currently hovered and the position is
    /// inside it.
    #[must_use]
    pub fn is_node_hovered(&self) -> bool {
        self.node_hovered
    }

    /// Whether the called node is the currently focused node.
    #[must_use]
    pub fn is_node_focused(&self) -> bool {
        self.node_focused
    }
}

impl DispatchableEvent for ScrollEvent {
    dispatchable_common!();

    fn captured_flag(&self) -> bool {
        false
    }

    fn set_captured_flag(&mut self, _captured: bool) {}

    fn primary_flag(&self) -> bool {
        true
    }
}

/// A key press or release.
#[derive(Clone, Debug)]
pub struct KeyEvent {
    time: Duration,
    key: Key,
    modifiers: Modifiers,
    position: Vec2,
    has_position: bool,
    node_size: Size,
    accepted: bool,
    node_pressed: bool,
    node_hovered: bool,
    node_focused: bool,
}

impl KeyEvent {
    /// Creates a key event.
    #[must_use]
    pub fn new(time: Duration, key: Key) -> Self {
        Self {
            time,
            key,
            modifiers: Modifiers::empty(),
            position: Vec2::ZERO,
            has_position: false,
            node_size: Size::ZERO,
            accepted: false,
            node_pressed: false,
            node_hovered: false,
            node_focused: false,
        }
    }

    /// Adds keyboard modifiers.
    #[must_use]
    pub fn with_modifiers(mut self, modifiers: Modifiers) -> Self {
        self.modifiers = modifiers;
        self
    }

    /// Time the event happened at.
    #[must_use]
    pub fn time(&self) -> Duration {
        self.time
    }

    /// The key.
    #[must_use]
    pub fn key(&self) -> Key {
        self.key
    }

    /// Active keyboard modifiers.
    #[must_use]
    pub fn modifiers(&self) -> Modifiers {
        self.modifiers
    }

    /// Position relative to the node the event is being called on, when the
    /// event was routed through the last pointer position rather than
    /// through focus.
    #[must_use]
    pub fn position(&self) -> Option<Vec2> {
        self.has_position.then_some(self.position)
    }

    /// Size of the node the event is being called on.
    #[must_use]
    pub fn node_size(&self) -> Size {
        self.node_size
    }

    /// Whether a hook accepted the event.
    #[must_use]
    pub fn is_accepted(&self) -> bool {
        self.accepted
    }

    /// Accepts the event.
    pub fn set_accepted(&mut self) {
        self.accepted = true;
    }

    /// Whether the target node is the currently pressed node.
    #[must_use]
    pub fn is_node_pressed(&self) -> bool {
        self.node_pressed
    }

    /// Whether the target node is currently hovered.
    #[must_use]
    pub fn is_node_hovered(&self) -> bool {
        self.node_hovered
    }

    /// Whether the called node is the currently focused node.
    #[must_use]
    pub fn is_node_focused(&self) -> bool {
        self.node_focused
    }
}

impl DispatchableEvent for KeyEvent {
    fn set_local(&mut self, position: Vec2, node_size: Size) {
        self.position = position;
        self.has_position = true;
        self.node_size = node_size;
    }

    fn accepted_flag(&self) -> bool {
        self.accepted
    }

    fn set_accepted_flag(&mut self, accepted: bool) {
        self.accepted = accepted;
    }

    fn captured_flag(&self) -> bool {
        false
    }

    fn set_captured_flag(&mut self, _captured: bool) {}

    fn primary_flag(&self) -> bool {
        true
    }

    fn hovered_flag(&self) -> bool {
        self.node_hovered
    }

    fn set_hovered_flag(&mut self, hovered: bool) {
        self.node_hovered = hovered;
    }

    fn set_pressed_flag(&mut self, pressed: bool) {
        self.node_pressed = pressed;
    }

    fn set_focused_flag(&mut self, focused: bool) {
        self.node_focused = focused;
    }

    fn time(&self) -> Duration {
        self.time
    }
}

/// A text input event carrying inserted text.
#[derive(Clone, Debug)]
pub struct TextInputEvent {
    time: Duration,
    text: alloc::string::String,
    accepted: bool,
}

impl TextInputEvent {
    /// Creates a text input event.
    #[must_use]
    pub fn new(time: Duration, text: impl Into<alloc::string::String>) -> Self {
        Self {
            time,
            text: text.into(),
            accepted: false,
        }
    }

    /// Time the event happened at.
    #[must_use]
    pub fn time(&self) -> Duration {
        self.time
    }

    /// The text being inserted.
    #[must_use]
    pub fn text(&self) -> &str {
        &self.text
    }

    /// Whether a hook accepted the event.
    #[must_use]
    pub fn is_accepted(&self) -> bool {
        self.accepted
    }

    /// Accepts the event.
    pub fn set_accepted(&mut self) {
        self.accepted = true;
    }

    pub(crate) fn set_accepted_flag(&mut self, accepted: bool) {
        self.accepted = accepted;
    }
}

/// A focus gain or loss notification.
#[derive(Clone, Debug)]
pub struct FocusEvent {
    time: Duration,
    accepted: bool,
    node_pressed: bool,
    node_hovered: bool,
}

impl FocusEvent {
    /// Creates a focus event.
    #[must_use]
    pub fn new(time: Duration) -> Self {
        Self {
            time,
            accepted: false,
            node_pressed: false,
            node_hovered: false,
        }
    }

    /// Time the event happened at.
    #[must_use]
    pub fn time(&self) -> Duration {
        self.time
    }

    /// Whether a hook accepted the focus.
    #[must_use]
    pub fn is_accepted(&self) -> bool {
        self.accepted
    }

    /// Accepts the focus. An unaccepted focus event leaves the node
    /// unfocused.
    pub fn set_accepted(&mut self) {
        self.accepted = true;
    }

    /// Whether the target node is the currently pressed node.
    #[must_use]
    pub fn is_node_pressed(&self) -> bool {
        self.node_pressed
    }

    /// Whether the target node is currently hovered.
    #[must_use]
    pub fn is_node_hovered(&self) -> bool {
        self.node_hovered
    }

    pub(crate) fn set_accepted_flag(&mut self, accepted: bool) {
        self.accepted = accepted;
    }

    pub(crate) fn set_current(&mut self, pressed: bool, hovered: bool) {
        self.node_pressed = pressed;
        self.node_hovered = hovered;
    }
}

/// Notification that an in-progress pointer interaction was cancelled,
/// because a fall-through node took it over or the event stream ended.
#[derive(Clone, Debug)]
pub struct PointerCancelEvent {
    time: Duration,
}

impl PointerCancelEvent {
    /// Creates a cancel event.
    #[must_use]
    pub fn new(time: Duration) -> Self {
        Self { time }
    }

    /// Time the event happened at.
    #[must_use]
    pub fn time(&self) -> Duration {
        self.time
    }
}

/// Notification that a node that was pressed, captured, hovered or focused
/// is no longer visible, enabled or focusable.
///
/// Emitted at most once per node per [`Ui::update`](crate::Ui::update).
#[derive(Clone, Debug, Default)]
pub struct VisibilityLostEvent {
    node_pressed: bool,
    node_hovered: bool,
}

impl VisibilityLostEvent {
    /// Creates a visibility lost event.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether the node is still the currently pressed node. Only ever true
    /// for a focused node that merely stopped being focusable.
    #[must_use]
    pub fn is_node_pressed(&self) -> bool {
        self.node_pressed
    }

    /// Whether the node is still the currently hovered node. Only ever true
    /// for a focused node that merely stopped being focusable.
    #[must_use]
    pub fn is_node_hovered(&self) -> bool {
        self.node_hovered
    }

    pub(crate) fn set_current(&mut self, pressed: bool, hovered: bool) {
        self.node_pressed = pressed;
        self.node_hovered = hovered;
    }
}
