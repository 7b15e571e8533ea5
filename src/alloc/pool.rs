//! `Pool` and `SharedPool` — the allocator front ends.
//!
//! [`Pool`] is the unsynchronized core: a [`FreelistBank`] plus a chunk pool.
//! [`SharedPool`] puts one mutex around a `Pool` and lets oversize requests go
//! straight to the system allocator without touching the lock.
//!
//! # Caller contract
//!
//! The pool keeps no per-block headers and does not validate pointers. Freeing
//! a block twice, freeing it with a size from a different class, or using it
//! after it was freed is undefined behavior. That is why `deallocate` is
//! `unsafe`.

use core::ptr::NonNull;
use parking_lot::Mutex;

use crate::alloc::chunk::ChunkPool;
use crate::alloc::config::PoolConfig;
use crate::alloc::error::PoolError;
use crate::alloc::freelist::FreelistBank;
use crate::alloc::size_class::{class_index, is_pooled, round_up};
use crate::alloc::stats::{OversizeCounters, PoolStats};
use crate::alloc::system::{LibcSystem, SystemAlloc};

/// Size-class pool without internal locking.
///
/// Every operation takes `&mut self`; wrap it in [`SharedPool`] to share it.
pub struct Pool<S: SystemAlloc = LibcSystem> {
    bank: FreelistBank,
    chunks: ChunkPool<S>,
    pooled_allocs: usize,
    pooled_frees: usize,
}

// Safety: the raw pointers inside are owned exclusively by the pool and only
// touched through `&mut self`.
unsafe impl<S: SystemAlloc> Send for Pool<S> {}

impl<S: SystemAlloc> Pool<S> {
    /// Creates an empty pool with the default configuration. No memory is
    /// requested until the first allocation.
    pub fn new(system: S) -> Self {
        Self::build(system, PoolConfig::default())
    }

    /// Creates an empty pool with `config`.
    ///
    /// # Errors
    /// Returns [`PoolError::InvalidConfig`] if `config` does not validate.
    pub fn with_config(system: S, config: PoolConfig) -> Result<Self, PoolError> {
        config.validate()?;
        Ok(Self::build(system, config))
    }

    fn build(system: S, config: PoolConfig) -> Self {
        Self {
            bank: FreelistBank::new(),
            chunks: ChunkPool::new(system, config),
            pooled_allocs: 0,
            pooled_frees: 0,
        }
    }

    /// Allocates a block of at least `size` bytes aligned to
    /// [`ALIGN`](crate::alloc::ALIGN).
    ///
    /// Requests above [`MAX_BYTES`](crate::alloc::MAX_BYTES) go to the system
    /// allocator unchanged.
    ///
    /// # Errors
    /// [`PoolError::ZeroSize`] for `size == 0`, [`PoolError::OutOfMemory`] when
    /// no memory can be found.
    pub fn allocate(&mut self, size: usize) -> Result<NonNull<u8>, PoolError> {
        if size == 0 {
            return Err(PoolError::ZeroSize);
        }
        if !is_pooled(size) {
            return self
                .chunks
                .system()
                .allocate(size)
                .ok_or(PoolError::OutOfMemory { requested: size });
        }

        let index = class_index(size);
        // Safety: free-list blocks are unused and their links untouched.
        let block = match unsafe { self.bank.pop(index) } {
            Some(block) => block,
            None => self.chunks.refill(&mut self.bank, round_up(size))?,
        };
        self.pooled_allocs += 1;
        Ok(block)
    }

    /// Returns a block to the pool.
    ///
    /// # Safety
    /// `block` must have been returned by [`Pool::allocate`] on this pool for a
    /// size in the same class as `size`, and must not be used afterwards.
    pub unsafe fn deallocate(&mut self, block: NonNull<u8>, size: usize) {
        if size == 0 {
            return;
        }
        if !is_pooled(size) {
            self.chunks.system().release(block, size);
            return;
        }
        self.bank.push(class_index(size), block);
        self.pooled_frees += 1;
    }

    /// Cumulative bytes obtained from the system for the arena.
    pub fn heap_size(&self) -> usize {
        self.chunks.heap_size()
    }

    /// Virgin bytes left in the arena.
    pub fn arena_remaining(&self) -> usize {
        self.chunks.arena_remaining()
    }

    /// Takes a snapshot. Walks every free list, so the cost grows with the
    /// number of free blocks.
    pub fn stats(&self) -> PoolStats {
        PoolStats {
            heap_size: self.chunks.heap_size(),
            arena_remaining: self.chunks.arena_remaining(),
            system_chunks: self.chunks.system_chunks,
            refills: self.chunks.refills,
            scavenges: self.chunks.scavenges,
            // Safety: free-list links are only written by the bank.
            free_blocks: unsafe { self.bank.lengths() },
            pooled_allocs: self.pooled_allocs,
            pooled_frees: self.pooled_frees,
            oversize_allocs: 0,
            oversize_frees: 0,
        }
    }
}

/// A [`Pool`] behind a single mutex, safe to share between threads.
///
/// Pooled requests lock for the whole lookup/refill/growth sequence. Oversize
/// requests never take the lock.
///
/// ```
/// use poolalloc::alloc::{SharedPool, StdSystem};
///
/// let pool = SharedPool::new(StdSystem);
/// let a = pool.allocate(10).unwrap();
/// let b = pool.allocate(10).unwrap();
/// assert_ne!(a, b);
/// unsafe {
///     pool.deallocate(b, 10);
///     pool.deallocate(a, 10);
/// }
/// // LIFO reuse.
/// assert_eq!(pool.allocate(16).unwrap(), a);
/// ```
pub struct SharedPool<S: SystemAlloc + Clone = LibcSystem> {
    system: S,
    inner: Mutex<Pool<S>>,
    oversize: OversizeCounters,
}

impl<S: SystemAlloc + Clone> SharedPool<S> {
    /// Creates a shared pool with the default configuration.
    pub fn new(system: S) -> Self {
        Self {
            inner: Mutex::new(Pool::new(system.clone())),
            system,
            oversize: OversizeCounters::default(),
        }
    }

    /// Creates a shared pool with `config`.
    ///
    /// # Errors
    /// Returns [`PoolError::InvalidConfig`] if `config` does not validate.
    pub fn with_config(system: S, config: PoolConfig) -> Result<Self, PoolError> {
        Ok(Self {
            inner: Mutex::new(Pool::with_config(system.clone(), config)?),
            system,
            oversize: OversizeCounters::default(),
        })
    }

    /// Allocates a block of at least `size` bytes. See [`Pool::allocate`].
    ///
    /// # Errors
    /// See [`Pool::allocate`].
    pub fn allocate(&self, size: usize) -> Result<NonNull<u8>, PoolError> {
        if !is_pooled(size) {
            let block = self
                .system
                .allocate(size)
                .ok_or(PoolError::OutOfMemory { requested: size })?;
            self.oversize.on_alloc();
            return Ok(block);
        }
        self.inner.lock().allocate(size)
    }

    /// Returns a block to the pool. See [`Pool::deallocate`].
    ///
    /// # Safety
    /// `block` must have been returned by [`SharedPool::allocate`] on this pool
    /// for a size in the same class as `size`, and must not be used afterwards.
    pub unsafe fn deallocate(&self, block: NonNull<u8>, size: usize) {
        if !is_pooled(size) {
            self.system.release(block, size);
            self.oversize.on_free();
            return;
        }
        self.inner.lock().deallocate(block, size);
    }

    /// Takes a snapshot of the pool, including the oversize counters.
    pub fn stats(&self) -> PoolStats {
        let mut stats = self.inner.lock().stats();
        self.oversize.fill(&mut stats);
        stats
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alloc::size_class::{ALIGN, MAX_BYTES, NFREELISTS};
    use crate::alloc::system::testing::{BudgetSystem, FailingSystem};
    use crate::alloc::system::StdSystem;

    #[test]
    fn test_allocate_rounds_to_class() {
        let mut pool = Pool::new(StdSystem);
        let a = pool.allocate(10).unwrap();
        let b = pool.allocate(10).unwrap();
        let (a_addr, b_addr) = (a.as_ptr() as usize, b.as_ptr() as usize);

        assert_eq!(a_addr % ALIGN, 0);
        assert_eq!(b_addr % ALIGN, 0);
        assert!(a_addr.abs_diff(b_addr) >= 16);

        let stats = pool.stats();
        assert_eq!(stats.free_blocks[1], 18);
        assert_eq!(stats.pooled_allocs, 2);
    }

    #[test]
    fn test_lifo_reuse_within_class() {
        let mut pool = Pool::new(StdSystem);
        let a = pool.allocate(17).unwrap();
        unsafe { pool.deallocate(a, 17) };
        assert_eq!(pool.allocate(24).unwrap(), a);
    }

    #[test]
    fn test_zero_size() {
        let mut pool = Pool::new(StdSystem);
        assert_eq!(pool.allocate(0), Err(PoolError::ZeroSize));
        assert_eq!(pool.heap_size(), 0);
    }

    #[test]
    fn test_oversize_skips_the_pool() {
        let system = BudgetSystem::new(usize::MAX, usize::MAX);
        let mut pool = Pool::new(system.clone());
        let block = pool.allocate(MAX_BYTES + 1).unwrap();
        assert_eq!(system.requests(), vec![MAX_BYTES + 1]);
        unsafe { pool.deallocate(block, MAX_BYTES + 1) };

        let stats = pool.stats();
        assert_eq!(stats.heap_size, 0);
        assert_eq!(stats.total_free_blocks(), 0);
        assert_eq!(stats.pooled_allocs, 0);
    }

    #[test]
    fn test_every_class_fails_without_memory() {
        let mut pool = Pool::new(FailingSystem);
        for size in 1..=MAX_BYTES {
            assert_eq!(
                pool.allocate(size),
                Err(PoolError::OutOfMemory { requested: round_up(size) })
            );
        }
        assert_eq!(
            pool.allocate(MAX_BYTES * 4),
            Err(PoolError::OutOfMemory { requested: MAX_BYTES * 4 })
        );
    }

    #[test]
    fn test_freed_large_block_rescues_small_request() {
        // Enough budget for exactly one refill of the 128-byte class.
        let system = BudgetSystem::new(2 * 128 * 20, usize::MAX);
        let mut pool = Pool::new(system.clone());

        let mut big = Vec::new();
        for _ in 0..40 {
            big.push(pool.allocate(MAX_BYTES).unwrap());
        }
        assert_eq!(system.remaining(), 0);
        assert_eq!(pool.arena_remaining(), 0);

        let donor = big.pop().unwrap();
        unsafe { pool.deallocate(donor, MAX_BYTES) };

        // 128 bytes of donor, 16-byte objects: the arena gives out 8.
        let small = pool.allocate(16).unwrap();
        assert_eq!(small, donor);
        let stats = pool.stats();
        assert_eq!(stats.scavenges, 1);
        assert_eq!(stats.free_blocks[NFREELISTS - 1], 0);
        assert_eq!(stats.free_blocks[1], 7);
    }

    #[test]
    fn test_with_config_batch() {
        let config = PoolConfig { refill_batch: 4, ..PoolConfig::default() };
        let mut pool = Pool::with_config(StdSystem, config).unwrap();
        pool.allocate(8).unwrap();
        assert_eq!(pool.stats().free_blocks[0], 3);
        assert_eq!(pool.heap_size(), 2 * 8 * 4);

        let bad = PoolConfig { refill_batch: 0, ..PoolConfig::default() };
        assert!(Pool::with_config(StdSystem, bad).is_err());
    }

    #[test]
    fn test_shared_pool_counts_oversize() {
        let pool = SharedPool::new(StdSystem);
        let big = pool.allocate(4096).unwrap();
        let small = pool.allocate(32).unwrap();
        unsafe {
            pool.deallocate(big, 4096);
            pool.deallocate(small, 32);
        }
        let stats = pool.stats();
        assert_eq!(stats.oversize_allocs, 1);
        assert_eq!(stats.oversize_frees, 1);
        assert_eq!(stats.pooled_allocs, 1);
        assert_eq!(stats.pooled_frees, 1);
        assert_eq!(stats.live_blocks(), 0);
    }
}
