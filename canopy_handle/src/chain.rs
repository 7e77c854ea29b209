// Copyright 2025 the Canopy Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Cyclic doubly-linked chains embedded in arena payloads.

use crate::{Arena, Handle};

/// Intrusive chain links stored inside an arena payload.
///
/// While an entry is on a chain both links are `Some`; a chain with a single
/// entry links to itself. Entries not (or no longer) on a chain hold `None`
/// in both directions.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct Chain<H> {
    /// Previous entry in cyclic order.
    pub previous: Option<H>,
    /// Next entry in cyclic order.
    pub next: Option<H>,
}

impl<H> Default for Chain<H> {
    fn default() -> Self {
        Self {
            previous: None,
            next: None,
        }
    }
}

/// Payloads that embed [`Chain`] links.
pub trait Chained<H> {
    /// The embedded links.
    fn chain(&self) -> &Chain<H>;
    /// The embedded links, mutably.
    fn chain_mut(&mut self) -> &mut Chain<H>;
}

impl<H: Handle, T: Chained<H>> Arena<H, T> {
    /// Inserts `handle` into the cyclic chain rooted at `first`, in front of
    /// `before`, or at the back when `before` is `None`.
    ///
    /// `first` names the chain head (the back-most entry for draw-order
    /// chains); it is updated when the insertion displaces it. Both handles
    /// must be live; `handle` must not currently be on the chain.
    pub fn chain_insert_before(&mut self, first: &mut Option<H>, handle: H, before: Option<H>) {
        // First entry ever: the chain is just this entry linked to itself.
        let Some(first_handle) = *first else {
            let chain = self.chain_of_mut(handle);
            chain.previous = Some(handle);
            chain.next = Some(handle);
            *first = Some(handle);
            return;
        };

        let next = before.unwrap_or(first_handle);
        let previous = self
            .chain_of(next)
            .previous
            .expect("chained entries always link back");

        {
            let chain = self.chain_of_mut(handle);
            chain.previous = Some(previous);
            chain.next = Some(next);
        }
        self.chain_of_mut(next).previous = Some(handle);
        self.chain_of_mut(previous).next = Some(handle);

        // Inserting in front of the head makes the new entry the head.
        if *first == before {
            *first = Some(handle);
        }
    }

    /// Unlinks `handle` from the cyclic chain rooted at `first`.
    ///
    /// Holds also for a single-entry chain, which becomes empty. The entry's
    /// own links are cleared.
    pub fn chain_remove(&mut self, first: &mut Option<H>, handle: H) {
        let chain = *self.chain_of(handle);
        let previous = chain.previous.expect("entry must be on the chain");
        let next = chain.next.expect("entry must be on the chain");

        self.chain_of_mut(previous).next = Some(next);
        self.chain_of_mut(next).previous = Some(previous);
        if *first == Some(handle) {
            *first = if next == handle { None } else { Some(next) };
        }

        let chain = self.chain_of_mut(handle);
        chain.previous = None;
        chain.next = None;
    }

    /// Next entry after `handle` in chain order, `None` at the chain's end.
    #[must_use]
    pub fn chain_next(&self, first: Option<H>, handle: H) -> Option<H> {
        let next = self.chain_of(handle).next?;
        if Some(next) == first { None } else { Some(next) }
    }

    /// Entry before `handle` in chain order, `None` at the chain's head.
    #[must_use]
    pub fn chain_previous(&self, first: Option<H>, handle: H) -> Option<H> {
        if Some(handle) == first {
            return None;
        }
        self.chain_of(handle).previous
    }

    /// Last entry of the chain rooted at `first`.
    #[must_use]
    pub fn chain_last(&self, first: Option<H>) -> Option<H> {
        self.chain_of(first?).previous
    }

    fn chain_of(&self, handle: H) -> &Chain<H> {
        self.get(handle).expect("chain entry must be live").chain()
    }

    fn chain_of_mut(&mut self, handle: H) -> &mut Chain<H> {
        self.get_mut(handle)
            .expect("chain entry must be live")
            .chain_mut()
    }
}
