// Copyright 2025 the Canopy Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! The animator driver: generic and node animators, the advance clock and
//! dirty-state fan-out.

mod common;

use std::cell::RefCell;
use std::rc::Rc;
use std::time::Duration;

use canopy_core::{
    AnimationFlags, Animator, AnimatorCommon, AnimatorFeatures, AnimatorHandle, Error,
    GenericAnimator, NodeAnimations, NodeAnimator, NodeFlags, NodeHandle, Ui,
    UserInterfaceStates,
};
use kurbo::{Size, Vec2};

const fn secs(s: u64) -> Duration {
    Duration::from_secs(s)
}

fn ui() -> Ui {
    Ui::with_size(Size::new(100.0, 100.0)).unwrap()
}

/// Generic animator recording the factors it was advanced with.
struct PulseAnimator {
    common: AnimatorCommon,
    advanced: Rc<RefCell<Vec<f32>>>,
}

impl PulseAnimator {
    fn new(handle: AnimatorHandle) -> Self {
        Self {
            common: AnimatorCommon::new(handle),
            advanced: Rc::new(RefCell::new(Vec::new())),
        }
    }
}

impl Animator for PulseAnimator {
    fn common(&self) -> &AnimatorCommon {
        &self.common
    }

    fn common_mut(&mut self) -> &mut AnimatorCommon {
        &mut self.common
    }

    fn features(&self) -> AnimatorFeatures {
        AnimatorFeatures::empty()
    }

    fn as_generic(&mut self) -> Option<&mut dyn GenericAnimator> {
        Some(self)
    }
}

impl GenericAnimator for PulseAnimator {
    fn advance(&mut self, active: &[bool], factors: &[f32]) {
        for (index, active) in active.iter().enumerate() {
            if *active {
                self.advanced.borrow_mut().push(factors[index]);
            }
        }
    }
}

/// Node animator sliding its attached nodes to `x = 10 * factor`, removing
/// them at completion when asked to.
struct SlideAnimator {
    common: AnimatorCommon,
    remove_at_end: bool,
}

impl SlideAnimator {
    fn new(handle: AnimatorHandle) -> Self {
        Self {
            common: AnimatorCommon::new(handle),
            remove_at_end: false,
        }
    }
}

impl Animator for SlideAnimator {
    fn common(&self) -> &AnimatorCommon {
        &self.common
    }

    fn common_mut(&mut self) -> &mut AnimatorCommon {
        &mut self.common
    }

    fn features(&self) -> AnimatorFeatures {
        AnimatorFeatures::NODE_ATTACHMENT
    }

    fn as_node(&mut self) -> Option<&mut dyn NodeAnimator> {
        Some(self)
    }
}

impl NodeAnimator for SlideAnimator {
    fn advance(
        &mut self,
        active: &[bool],
        factors: &[f32],
        node_offsets: &mut [Vec2],
        _node_sizes: &mut [Size],
        _node_flags: &mut [NodeFlags],
        nodes_remove: &mut [bool],
    ) -> NodeAnimations {
        let mut animations = NodeAnimations::empty();
        for (index, active) in active.iter().enumerate() {
            if !active {
                continue;
            }
            let Some(animation) = self.common.animation_handle_at(index) else {
                continue;
            };
            let Ok(Some(node)) = self.common.node_of(animation) else {
                continue;
            };
            node_offsets[node.index() as usize].x = 10.0 * f64::from(factors[index]);
            animations |= NodeAnimations::OFFSET_SIZE;
            if self.remove_at_end && factors[index] >= 1.0 {
                nodes_remove[node.index() as usize] = true;
                animations |= NodeAnimations::REMOVAL;
            }
        }
        animations
    }
}

#[test]
fn generic_animator_advances_with_factors() {
    let mut ui = ui();
    let animator = ui.create_animator().unwrap();
    let mut instance = PulseAnimator::new(animator);
    let advanced = instance.advanced.clone();
    instance
        .common_mut()
        .create(secs(1), secs(2), AnimationFlags::empty(), 1)
        .unwrap();
    ui.set_generic_animator_instance(Box::new(instance)).unwrap();

    assert!(
        ui.state()
            .contains(UserInterfaceStates::NEEDS_ANIMATION_ADVANCE)
    );

    // Scheduled, nothing to advance yet.
    ui.advance_animations(secs(0)).unwrap();
    assert_eq!(ui.animation_time(), secs(0));
    assert!(advanced.borrow().is_empty());

    // Halfway through.
    ui.advance_animations(secs(2)).unwrap();
    assert_eq!(advanced.borrow().as_slice(), [0.5]);

    // Past the end: one final advance at factor 1, then the animation is
    // gone and the advance flag with it.
    ui.advance_animations(secs(4)).unwrap();
    assert_eq!(advanced.borrow().as_slice(), [0.5, 1.0]);
    assert!(
        !ui.state()
            .contains(UserInterfaceStates::NEEDS_ANIMATION_ADVANCE)
    );
}

#[test]
fn time_must_not_regress() {
    let mut ui = ui();
    ui.advance_animations(secs(5)).unwrap();
    assert_eq!(ui.advance_animations(secs(4)), Err(Error::TimeRegression));
    assert_eq!(ui.animation_time(), secs(5));
    ui.advance_animations(secs(5)).unwrap();
}

#[test]
fn node_animator_moves_nodes_and_dirties_layout() {
    let mut ui = ui();
    let node = ui
        .create_node(None, Vec2::ZERO, Size::new(10.0, 10.0), NodeFlags::empty())
        .unwrap();
    ui.update().unwrap();
    assert!(ui.state().is_empty());

    let animator = ui.create_animator().unwrap();
    let mut instance = SlideAnimator::new(animator);
    let animation = instance
        .common_mut()
        .create(secs(0), secs(10), AnimationFlags::empty(), 1)
        .unwrap();
    ui.set_node_animator_instance(Box::new(instance)).unwrap();
    ui.attach_node_animation(node, canopy_core::AnimationHandle::new(animator, animation))
        .unwrap();

    ui.advance_animations(secs(5)).unwrap();
    assert_eq!(ui.node_offset(node).unwrap(), Vec2::new(5.0, 0.0));
    assert!(
        ui.state()
            .contains(UserInterfaceStates::NEEDS_LAYOUT_UPDATE)
    );
    ui.update().unwrap();
    assert!(ui.state().is_empty());
}

#[test]
fn node_animator_can_remove_nodes() {
    let mut ui = ui();
    let node = ui
        .create_node(None, Vec2::ZERO, Size::new(10.0, 10.0), NodeFlags::empty())
        .unwrap();

    let animator = ui.create_animator().unwrap();
    let mut instance = SlideAnimator::new(animator);
    instance.remove_at_end = true;
    let animation = instance
        .common_mut()
        .create(secs(0), secs(1), AnimationFlags::empty(), 1)
        .unwrap();
    ui.set_node_animator_instance(Box::new(instance)).unwrap();
    ui.attach_node_animation(node, canopy_core::AnimationHandle::new(animator, animation))
        .unwrap();

    ui.advance_animations(secs(2)).unwrap();
    assert!(!ui.is_node_valid(node));
    assert!(
        ui.state()
            .contains(UserInterfaceStates::NEEDS_NODE_CLEAN)
    );
    ui.update().unwrap();
    assert!(ui.state().is_empty());
}

#[test]
fn attachment_capability_is_checked() {
    let mut ui = ui();
    let node = ui
        .create_node(None, Vec2::ZERO, Size::new(10.0, 10.0), NodeFlags::empty())
        .unwrap();

    let animator = ui.create_animator().unwrap();
    let mut instance = PulseAnimator::new(animator);
    let animation = instance
        .common_mut()
        .create(secs(0), secs(1), AnimationFlags::empty(), 1)
        .unwrap();
    ui.set_generic_animator_instance(Box::new(instance)).unwrap();

    // A generic animator without node attachment can't take one.
    assert_eq!(
        ui.attach_node_animation(node, canopy_core::AnimationHandle::new(animator, animation)),
        Err(Error::IncompatibleCapabilities)
    );
}

#[test]
fn two_step_advance_matches_single_step_final_state() {
    let mut split = ui();
    let mut direct = ui();
    for target in [&mut split, &mut direct] {
        let animator = target.create_animator().unwrap();
        let mut instance = PulseAnimator::new(animator);
        instance
            .common_mut()
            .create(secs(0), secs(4), AnimationFlags::empty(), 1)
            .unwrap();
        target
            .set_generic_animator_instance(Box::new(instance))
            .unwrap();
    }

    split.advance_animations(secs(2)).unwrap();
    split.advance_animations(secs(6)).unwrap();
    direct.advance_animations(secs(6)).unwrap();

    assert_eq!(split.animation_time(), direct.animation_time());
    assert_eq!(split.state(), direct.state());
    assert_eq!(split.animator_used_count(), direct.animator_used_count());
}
