//! The process-wide pool.
//!
//! Built on first use and never torn down: blocks handed out stay valid until
//! the process exits.

use core::ptr::NonNull;
use std::sync::OnceLock;

use crate::alloc::error::PoolError;
use crate::alloc::pool::SharedPool;
use crate::alloc::stats::PoolStats;
use crate::alloc::system::LibcSystem;

static GLOBAL_POOL: OnceLock<SharedPool<LibcSystem>> = OnceLock::new();

/// Returns the process-wide pool, creating it on the first call.
pub fn global_pool() -> &'static SharedPool<LibcSystem> {
    GLOBAL_POOL.get_or_init(|| {
        tracing::debug!("initializing global pool");
        SharedPool::new(LibcSystem)
    })
}

/// Allocates `size` bytes from the process-wide pool.
///
/// ```
/// let block = poolalloc::allocate(24).unwrap();
/// unsafe {
///     block.as_ptr().write_bytes(0, 24);
///     poolalloc::deallocate(block, 24);
/// }
/// ```
///
/// # Errors
/// See [`Pool::allocate`](crate::alloc::Pool::allocate).
pub fn allocate(size: usize) -> Result<NonNull<u8>, PoolError> {
    global_pool().allocate(size)
}

/// Returns a block to the process-wide pool.
///
/// # Safety
/// `block` must have come from [`allocate`] with a size in the same class as
/// `size`, must not have been freed since, and must not be used afterwards.
pub unsafe fn deallocate(block: NonNull<u8>, size: usize) {
    global_pool().deallocate(block, size);
}

/// Snapshot of the process-wide pool.
pub fn stats() -> PoolStats {
    global_pool().stats()
}
