//! # `poolalloc` - Size-Class Pool Allocator
//!
//! A process-wide pool for small, short-lived allocations. Requests of up to
//! [`MAX_BYTES`] bytes are rounded up to one of [`NFREELISTS`] size classes and
//! served from per-class free lists; the free lists are restocked in batches
//! carved out of large chunks obtained from the system allocator. Larger
//! requests go to the system allocator untouched.
//!
//! ## Architecture
//!
//! 1. **Free-list bank** (`FreelistBank`):
//!    - One intrusive LIFO list per size class
//!    - The link lives in the first word of each free block
//!
//! 2. **Chunk pool**:
//!    - A bump arena refilling empty classes with batches of objects
//!    - Grows geometrically with the cumulative heap size
//!    - Under pressure: partial batches, exact-size growth, then reuse of a
//!      spare block from a larger class
//!
//! 3. **Front ends**:
//!    - [`Pool`]: unsynchronized core
//!    - [`SharedPool`]: one mutex around a `Pool`; oversize requests bypass it
//!    - [`allocate`] / [`deallocate`]: the lazily created process-wide instance
//!
//! Memory given to the pool is never returned to the system; freed blocks are
//! recycled through their class's free list for the lifetime of the process.
//!
//! ## Safety
//!
//! The pool stores no per-block headers. Callers must pass the original size
//! back on free, must not free a block twice, and must not touch a block after
//! freeing it. None of this is checked.
//!
//! ## Example
//!
//! ```rust
//! use poolalloc::{allocate, deallocate};
//!
//! let a = allocate(10).unwrap(); // 16-byte class
//! let b = allocate(10).unwrap();
//! assert_ne!(a, b);
//!
//! unsafe {
//!     deallocate(b, 10);
//!     deallocate(a, 10);
//! }
//! ```

#![warn(missing_docs, clippy::all, clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::must_use_candidate)]

pub mod alloc;

pub use alloc::{
    allocate, deallocate, global_pool, stats, LibcSystem, Pool, PoolConfig, PoolError, PoolStats,
    SharedPool, StdSystem, SystemAlloc, ALIGN, MAX_BYTES, NFREELISTS,
};

// Compile-time layout assertions
const _: () = {
    use core::mem;
    use core::ptr::NonNull;

    // A free-list link is one word and fits in the smallest block.
    assert!(mem::size_of::<Option<NonNull<u8>>>() == mem::size_of::<usize>());
    assert!(mem::size_of::<Option<NonNull<u8>>>() <= ALIGN);
    assert!(mem::align_of::<Option<NonNull<u8>>>() <= ALIGN);

    // An empty free-list bank is one word per class.
    assert!(mem::size_of::<alloc::FreelistBank>() == NFREELISTS * mem::size_of::<usize>());
};
