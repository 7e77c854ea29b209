// Copyright 2025 the Canopy Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

// After you edit the crate's doc comment, run this command, then check README.md for any missing links
// cargo rdme --workspace-project=canopy_handle --heading-base-level=0

//! Canopy Handle: generational handle arenas and cyclic intrusive chains.
//!
//! This crate provides the storage primitives the rest of Canopy is built on:
//!
//! - [`define_handle!`]: packed handle newtypes carrying a slot index and a
//!   non-zero generation in a single integer.
//! - [`Arena`]: a slot table indexed by such handles, with O(1) allocation,
//!   end-of-list slot recycling and generation-based liveness checks.
//! - [`Chain`] / [`Chained`]: cyclic doubly-linked lists embedded in arena
//!   payloads, used for explicit orderings (draw order, layout order) that
//!   must survive arbitrary insertion and removal in O(1).
//!
//! ## Handles
//!
//! A handle packs an index into the low bits and a generation into the high
//! bits of a `u32` or `u16`. The generation is never zero, so `Option<H>` is
//! the same size as the raw integer and stands in for a null handle. A handle
//! is *live* while its generation matches the generation stored in the slot
//! it points to; removing the slot increments the stored generation, which
//! invalidates every outstanding handle at once.
//!
//! ## Recycling
//!
//! Freed slots go to the *tail* of the free list while allocation pops the
//! *head*, so generation churn is spread across the whole index space rather
//! than hammering the most recently freed slot. A slot whose generation
//! counter wraps around to zero is *disabled*: it is never handed out again,
//! which keeps long-dead handles from aliasing new ones.
//!
//! ```
//! use canopy_handle::{Arena, define_handle};
//!
//! define_handle! {
//!     /// Handle to a thing.
//!     pub struct ThingHandle(u32): index 20, generation 12;
//! }
//!
//! let mut arena: Arena<ThingHandle, &str> = Arena::new();
//! let a = arena.allocate("a").unwrap();
//! assert!(arena.is_valid(a));
//! assert_eq!(arena.remove(a), Some("a"));
//! assert!(!arena.is_valid(a));
//! ```
//!
//! This crate is `no_std` and uses `alloc`.

#![no_std]

extern crate alloc;

mod arena;
mod chain;
mod handle;

pub use arena::{Arena, CapacityError};
pub use chain::{Chain, Chained};
pub use handle::Handle;
