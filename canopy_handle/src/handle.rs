// Copyright 2025 the Canopy Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! The [`Handle`] trait and the [`define_handle!`] macro.

/// Packed generational handle.
///
/// A handle identifies a slot in an [`Arena`](crate::Arena). The low
/// [`INDEX_BITS`](Self::INDEX_BITS) carry the slot index, the remaining high
/// bits carry a generation in `1..GENERATION_CAP`. Generation zero is never
/// produced, which is what lets `Option<Self>` keep the size of the raw
/// integer.
///
/// Implementations are produced by [`define_handle!`](crate::define_handle);
/// this trait only exists so the arena and chain machinery can be generic
/// over them.
pub trait Handle: Copy + Eq + core::fmt::Debug {
    /// Number of bits carrying the slot index.
    const INDEX_BITS: u32;
    /// Number of bits carrying the generation.
    const GENERATION_BITS: u32;
    /// Exclusive upper bound on slot indices.
    const INDEX_CAP: u32 = 1 << Self::INDEX_BITS;
    /// Exclusive upper bound on generations; generation `0` is reserved.
    const GENERATION_CAP: u32 = 1 << Self::GENERATION_BITS;

    /// Packs an index and a generation into a handle.
    ///
    /// Panics if `index` or `generation` are out of range or if `generation`
    /// is zero. Callers inside this workspace only construct handles from
    /// arena slots, which maintain both invariants.
    fn new(index: u32, generation: u32) -> Self;

    /// The slot index carried by this handle.
    fn index(self) -> u32;

    /// The generation carried by this handle, in `1..GENERATION_CAP`.
    fn generation(self) -> u32;
}

/// Defines a packed generational handle type.
///
/// ```
/// canopy_handle::define_handle! {
///     /// Handle to a widget.
///     pub struct WidgetHandle(u32): index 20, generation 12;
/// }
///
/// use canopy_handle::Handle as _;
/// let h = WidgetHandle::new(7, 3);
/// assert_eq!(h.index(), 7);
/// assert_eq!(h.generation(), 3);
/// ```
///
/// The backing integer must be `u16` or `u32` and the bit widths must sum to
/// its width. The generated type stores the packed value in the matching
/// `NonZero` integer so that `Option<Handle>` costs nothing extra.
#[macro_export]
macro_rules! define_handle {
    ($(#[$attr:meta])* $vis:vis struct $name:ident(u32): index $index_bits:literal, generation $generation_bits:literal;) => {
        $crate::define_handle!(@impl $(#[$attr])* $vis $name, u32, core::num::NonZeroU32, $index_bits, $generation_bits);
    };
    ($(#[$attr:meta])* $vis:vis struct $name:ident(u16): index $index_bits:literal, generation $generation_bits:literal;) => {
        $crate::define_handle!(@impl $(#[$attr])* $vis $name, u16, core::num::NonZeroU16, $index_bits, $generation_bits);
    };
    (@impl $(#[$attr:meta])* $vis:vis $name:ident, $int:ty, $nz:ty, $index_bits:literal, $generation_bits:literal) => {
        $(#[$attr])*
        #[derive(Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
        $vis struct $name($nz);

        impl $name {
            /// Packs an index and a non-zero generation into a handle.
            #[track_caller]
            #[must_use]
            $vis fn new(index: u32, generation: u32) -> Self {
                <Self as $crate::Handle>::new(index, generation)
            }

            /// The slot index carried by this handle.
            #[must_use]
            $vis fn index(self) -> u32 {
                <Self as $crate::Handle>::index(self)
            }

            /// The generation carried by this handle.
            #[must_use]
            $vis fn generation(self) -> u32 {
                <Self as $crate::Handle>::generation(self)
            }

            /// The packed integer representation.
            #[must_use]
            $vis fn to_raw(self) -> $int {
                self.0.get()
            }

            /// Rebuilds a handle from [`to_raw`](Self::to_raw) output.
            ///
            /// Returns `None` if the generation half of `raw` is zero.
            #[must_use]
            $vis fn from_raw(raw: $int) -> Option<Self> {
                if (raw >> $index_bits) == 0 {
                    return None;
                }
                <$nz>::new(raw).map(Self)
            }
        }

        impl $crate::Handle for $name {
            const INDEX_BITS: u32 = $index_bits;
            const GENERATION_BITS: u32 = $generation_bits;

            #[track_caller]
            fn new(index: u32, generation: u32) -> Self {
                assert!(
                    index < (1 << $index_bits),
                    "handle index out of range"
                );
                assert!(
                    generation != 0 && generation < (1 << $generation_bits),
                    "handle generation out of range"
                );
                let raw = (generation << $index_bits) | index;
                let raw = match <$int>::try_from(raw) {
                    Ok(raw) => raw,
                    // Unreachable: both halves were range-checked above.
                    Err(_) => unreachable!(),
                };
                match <$nz>::new(raw) {
                    Some(raw) => Self(raw),
                    // Unreachable: generation is non-zero.
                    None => unreachable!(),
                }
            }

            fn index(self) -> u32 {
                u32::from(self.0.get()) & ((1 << $index_bits) - 1)
            }

            fn generation(self) -> u32 {
                u32::from(self.0.get()) >> $index_bits
            }
        }

        impl core::fmt::Debug for $name {
            fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
                write!(
                    f,
                    concat!(stringify!($name), "({}, {})"),
                    self.index(),
                    self.generation()
                )
            }
        }
    };
}
