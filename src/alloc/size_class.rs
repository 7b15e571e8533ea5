//! Size-class arithmetic.

/// Alignment of every pooled block, and the width step between size classes.
pub const ALIGN: usize = 8;

/// Largest request served from the pool. Anything above goes straight to the
/// system allocator.
pub const MAX_BYTES: usize = 128;

/// Number of size classes (and free lists).
pub const NFREELISTS: usize = MAX_BYTES / ALIGN;

const _: () = assert!(ALIGN.is_power_of_two());
const _: () = assert!(MAX_BYTES % ALIGN == 0);
// A free block stores its link in its first word.
const _: () = assert!(ALIGN >= core::mem::size_of::<usize>());

/// Rounds `bytes` up to the next multiple of [`ALIGN`].
#[inline]
pub const fn round_up(bytes: usize) -> usize {
    (bytes + ALIGN - 1) & !(ALIGN - 1)
}

/// Returns the free-list index for a request of `bytes`.
///
/// `bytes` must be in `1..=MAX_BYTES`.
#[inline]
pub const fn class_index(bytes: usize) -> usize {
    debug_assert!(bytes > 0 && bytes <= MAX_BYTES);
    round_up(bytes) / ALIGN - 1
}

/// Returns the block size served by the class at `index`.
#[inline]
pub const fn class_size(index: usize) -> usize {
    (index + 1) * ALIGN
}

/// Whether a request of `bytes` is served from the pool.
#[inline]
pub const fn is_pooled(bytes: usize) -> bool {
    bytes <= MAX_BYTES
}
