//! The boundary to the underlying system allocator.
//!
//! The pool only ever asks for "N bytes" and hands the same block back with the
//! same N. It never looks inside what it gets beyond treating it as raw bytes.

use crate::alloc::size_class::ALIGN;
use core::alloc::{GlobalAlloc, Layout};
use core::ptr::NonNull;
use std::alloc::System;

/// A source of raw memory.
///
/// Implementations must return blocks aligned to at least [`ALIGN`] bytes.
/// They are shared across threads: oversize requests reach them without the
/// pool's lock held.
pub trait SystemAlloc: Send + Sync {
    /// Requests `size` bytes. Returns `None` if the request cannot be met or
    /// `size` is zero.
    fn allocate(&self, size: usize) -> Option<NonNull<u8>>;

    /// Releases a block.
    ///
    /// # Safety
    /// `block` must have come from [`SystemAlloc::allocate`] on this allocator
    /// with the same `size`, and must not be used afterwards.
    unsafe fn release(&self, block: NonNull<u8>, size: usize);
}

/// Backs the pool with the C library's `malloc`/`free`.
#[derive(Default, Clone, Copy, Debug)]
pub struct LibcSystem;

impl SystemAlloc for LibcSystem {
    fn allocate(&self, size: usize) -> Option<NonNull<u8>> {
        if size == 0 {
            return None;
        }
        // Safety: malloc accepts any non-zero size; a null result is handled.
        NonNull::new(unsafe { libc::malloc(size) }.cast::<u8>())
    }

    unsafe fn release(&self, block: NonNull<u8>, _size: usize) {
        libc::free(block.as_ptr().cast::<libc::c_void>());
    }
}

/// Backs the pool with Rust's [`System`] allocator.
#[derive(Default, Clone, Copy, Debug)]
pub struct StdSystem;

impl StdSystem {
    #[inline]
    fn layout(size: usize) -> Option<Layout> {
        Layout::from_size_align(size, ALIGN).ok()
    }
}

impl SystemAlloc for StdSystem {
    fn allocate(&self, size: usize) -> Option<NonNull<u8>> {
        if size == 0 {
            return None;
        }
        let layout = Self::layout(size)?;
        // Safety: layout has a non-zero size.
        NonNull::new(unsafe { System.alloc(layout) })
    }

    unsafe fn release(&self, block: NonNull<u8>, size: usize) {
        if let Some(layout) = Self::layout(size) {
            System.dealloc(block.as_ptr(), layout);
        }
    }
}
