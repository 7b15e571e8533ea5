//! The chunk pool: a bump arena carved into same-size batches on demand.
//!
//! When a size class runs dry, [`ChunkPool::refill`] asks [`ChunkPool::chunk_alloc`]
//! for a batch of objects. The arena serves the whole batch if it can, a smaller
//! batch if it holds at least one object, and otherwise grows:
//!
//! 1. full batch from the arena;
//! 2. as many whole objects as the arena still holds;
//! 3. salvage the arena's tail into a smaller class, then ask the system for
//!    `2 * needed + round_up(heap_size >> growth_shift)` bytes, falling back to
//!    exactly `needed`, and finally to taking over a spare block from the
//!    nearest larger class. Only when all of that fails is the request refused.

use core::ptr::NonNull;

use crate::alloc::config::PoolConfig;
use crate::alloc::error::PoolError;
use crate::alloc::freelist::FreelistBank;
use crate::alloc::size_class::{class_index, class_size, round_up, ALIGN};
use crate::alloc::system::SystemAlloc;

/// Virgin memory `[start, end)` as offsets from `base`.
pub(crate) struct Arena {
    base: Option<NonNull<u8>>,
    start: usize,
    end: usize,
}

impl Arena {
    pub(crate) const fn empty() -> Self {
        Self {
            base: None,
            start: 0,
            end: 0,
        }
    }

    #[inline]
    pub(crate) fn remaining(&self) -> usize {
        self.end - self.start
    }

    /// Replaces the arena with `len` bytes at `base`. Whatever was left of the
    /// previous arena is dropped on the floor; salvage it first.
    pub(crate) fn reset(&mut self, base: NonNull<u8>, len: usize) {
        self.base = Some(base);
        self.start = 0;
        self.end = len;
    }

    /// Takes `bytes` off the front.
    fn carve(&mut self, bytes: usize) -> Option<NonNull<u8>> {
        if bytes > self.remaining() {
            return None;
        }
        let base = self.base?;
        // Safety: start + bytes <= end, which lies within the block at base.
        let block = unsafe { NonNull::new_unchecked(base.as_ptr().add(self.start)) };
        self.start += bytes;
        Some(block)
    }

    /// Takes everything that is left, if anything.
    fn take_rest(&mut self) -> Option<(NonNull<u8>, usize)> {
        let len = self.remaining();
        if len == 0 {
            return None;
        }
        self.carve(len).map(|block| (block, len))
    }
}

/// A contiguous run of `count` objects of `size` bytes each.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Batch {
    pub(crate) base: NonNull<u8>,
    pub(crate) size: usize,
    pub(crate) count: usize,
}

impl Batch {
    /// Address of object `i`.
    #[inline]
    pub(crate) fn object(&self, i: usize) -> NonNull<u8> {
        debug_assert!(i < self.count);
        // Safety: object i lies inside the carved run.
        unsafe { NonNull::new_unchecked(self.base.as_ptr().add(i * self.size)) }
    }
}

/// Owns the arena and grows it from the system allocator.
pub(crate) struct ChunkPool<S: SystemAlloc> {
    arena: Arena,
    heap_size: usize,
    system: S,
    config: PoolConfig,
    pub(crate) system_chunks: usize,
    pub(crate) refills: usize,
    pub(crate) scavenges: usize,
}

impl<S: SystemAlloc> ChunkPool<S> {
    pub(crate) fn new(system: S, config: PoolConfig) -> Self {
        Self {
            arena: Arena::empty(),
            heap_size: 0,
            system,
            config,
            system_chunks: 0,
            refills: 0,
            scavenges: 0,
        }
    }

    #[inline]
    pub(crate) fn heap_size(&self) -> usize {
        self.heap_size
    }

    #[inline]
    pub(crate) fn arena_remaining(&self) -> usize {
        self.arena.remaining()
    }

    #[inline]
    pub(crate) fn system(&self) -> &S {
        &self.system
    }

    #[cfg(test)]
    pub(crate) fn arena_mut(&mut self) -> &mut Arena {
        &mut self.arena
    }

    /// Restocks the class of `class_bytes` and returns one object for the
    /// caller. The rest of the batch goes onto the class's free list.
    pub(crate) fn refill(
        &mut self,
        bank: &mut FreelistBank,
        class_bytes: usize,
    ) -> Result<NonNull<u8>, PoolError> {
        let batch = self.chunk_alloc(bank, class_bytes, self.config.refill_batch)?;
        self.refills += 1;

        if batch.count > 1 {
            let index = class_index(class_bytes);
            // Safety: the objects are freshly carved and owned by nobody else.
            unsafe {
                bank.push_chain(index, (1..batch.count).map(|i| batch.object(i)));
            }
        }

        tracing::debug!(class_bytes, objects = batch.count, "refilled size class");
        Ok(batch.base)
    }

    /// Carves up to `wanted` objects of `class_bytes` from the arena, growing
    /// it if not even one object fits. Returns at least one object or fails.
    pub(crate) fn chunk_alloc(
        &mut self,
        bank: &mut FreelistBank,
        class_bytes: usize,
        wanted: usize,
    ) -> Result<Batch, PoolError> {
        debug_assert!(class_bytes > 0 && class_bytes % ALIGN == 0);
        debug_assert!(wanted > 0);

        let needed = class_bytes * wanted;
        let remaining = self.arena.remaining();

        if remaining >= needed {
            return self.carve_batch(class_bytes, wanted);
        }
        if remaining >= class_bytes {
            return self.carve_batch(class_bytes, remaining / class_bytes);
        }

        self.salvage(bank);

        let growth = round_up(self.heap_size >> self.config.growth_shift);
        let enlarged = needed.checked_mul(2).and_then(|n| n.checked_add(growth));

        let obtained = match enlarged.and_then(|size| self.obtain(size)) {
            Some(chunk) => Some(chunk),
            None => {
                tracing::warn!(
                    class_bytes,
                    enlarged = enlarged.unwrap_or(usize::MAX),
                    needed,
                    "system refused enlarged chunk, retrying with exact batch size"
                );
                self.obtain(needed)
            }
        };

        match obtained {
            Some((block, len)) => {
                self.arena.reset(block, len);
                self.heap_size += len;
                self.system_chunks += 1;
                tracing::debug!(len, heap_size = self.heap_size, "arena grown from system");
            }
            None => self.scavenge(bank, class_bytes)?,
        }

        // The arena now holds at least one object: this recursion ends in one of
        // the two carving branches above.
        self.chunk_alloc(bank, class_bytes, wanted)
    }

    fn carve_batch(&mut self, class_bytes: usize, count: usize) -> Result<Batch, PoolError> {
        let base = self
            .arena
            .carve(class_bytes * count)
            .ok_or(PoolError::OutOfMemory { requested: class_bytes })?;
        Ok(Batch {
            base,
            size: class_bytes,
            count,
        })
    }

    fn obtain(&self, size: usize) -> Option<(NonNull<u8>, usize)> {
        self.system.allocate(size).map(|block| (block, size))
    }

    /// Hands the arena's tail to the free list whose class matches its size.
    fn salvage(&mut self, bank: &mut FreelistBank) {
        if let Some((block, len)) = self.arena.take_rest() {
            debug_assert!(len % ALIGN == 0);
            let index = class_index(len);
            // Safety: the tail is virgin memory of exactly class_size(index) bytes.
            unsafe { bank.push(index, block) };
            tracing::debug!(len, index, "salvaged arena tail");
        }
    }

    /// Last resort: turns a spare block of the nearest larger class into the
    /// arena.
    fn scavenge(&mut self, bank: &mut FreelistBank, class_bytes: usize) -> Result<(), PoolError> {
        let from = bank.first_stocked_above(class_index(class_bytes));
        // Safety: blocks on a free list are unused and keep their link intact.
        let taken = from.and_then(|index| unsafe { bank.pop(index) }.map(|block| (index, block)));

        match taken {
            Some((index, block)) => {
                self.arena.reset(block, class_size(index));
                self.scavenges += 1;
                tracing::warn!(
                    class_bytes,
                    donor_bytes = class_size(index),
                    "system allocator exhausted, reusing a larger free block"
                );
                Ok(())
            }
            None => {
                tracing::error!(
                    class_bytes,
                    heap_size = self.heap_size,
                    "out of memory: system allocator exhausted and no larger block is free"
                );
                Err(PoolError::OutOfMemory { requested: class_bytes })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alloc::system::testing::{BudgetSystem, FailingSystem};
    use crate::alloc::system::StdSystem;

    fn pool<S: SystemAlloc>(system: S) -> ChunkPool<S> {
        ChunkPool::new(system, PoolConfig::default())
    }

    fn addr(p: NonNull<u8>) -> usize {
        p.as_ptr() as usize
    }

    /// Leaks a `len`-byte, 8-aligned buffer for use as an arena.
    fn leaked_block(len: usize) -> NonNull<u8> {
        let words = vec![0u64; len.div_ceil(8)].into_boxed_slice();
        NonNull::new(Box::leak(words).as_mut_ptr().cast::<u8>()).unwrap()
    }

    #[test]
    fn test_first_refill_grows_and_links_batch() {
        let mut bank = FreelistBank::new();
        let mut chunks = pool(StdSystem);

        let first = chunks.refill(&mut bank, 16).unwrap();
        assert_eq!(addr(first) % ALIGN, 0);

        // 2 * 16 * 20 + round_up(0 >> 4)
        assert_eq!(chunks.heap_size(), 640);
        assert_eq!(chunks.arena_remaining(), 320);
        assert_eq!(chunks.system_chunks, 1);

        let linked = unsafe { bank.lengths() }[class_index(16)];
        assert_eq!(linked + 1, 20);

        // Surplus objects follow the first one, contiguous and in order.
        let mut expected = addr(first) + 16;
        while let Some(block) = unsafe { bank.pop(class_index(16)) } {
            assert_eq!(addr(block), expected);
            expected += 16;
        }
        assert_eq!(expected, addr(first) + 320);
    }

    #[test]
    fn test_growth_accounts_for_heap_size() {
        let system = BudgetSystem::new(usize::MAX, usize::MAX);
        let mut bank = FreelistBank::new();
        let mut chunks = pool(system.clone());

        chunks.refill(&mut bank, 128).unwrap(); // 5120
        // Use up the arena so the next request has to grow again.
        while chunks.arena_remaining() >= 128 {
            chunks.chunk_alloc(&mut bank, 128, 20).unwrap();
        }
        chunks.chunk_alloc(&mut bank, 128, 20).unwrap();

        // 2 * 2560 + round_up(5120 >> 4)
        assert_eq!(system.requests(), vec![5120, 5120 + 320]);
        assert_eq!(chunks.heap_size(), 5120 + 5440);
    }

    #[test]
    fn test_partial_batch_never_splits_an_object() {
        let mut bank = FreelistBank::new();
        let mut chunks = pool(FailingSystem);
        chunks.arena_mut().reset(leaked_block(100), 100);

        let batch = chunks.chunk_alloc(&mut bank, 24, 20).unwrap();
        assert_eq!(batch.count, 4);
        assert_eq!(chunks.arena_remaining(), 4);
        assert_eq!(chunks.heap_size(), 0);
    }

    #[test]
    fn test_salvage_donates_half_object() {
        let system = BudgetSystem::new(usize::MAX, usize::MAX);
        let mut bank = FreelistBank::new();
        let mut chunks = pool(system.clone());
        // One and a half 32-byte objects.
        let base = leaked_block(48);
        chunks.arena_mut().reset(base, 48);

        let batch = chunks.chunk_alloc(&mut bank, 32, 20).unwrap();
        assert_eq!(batch.count, 1);
        assert_eq!(batch.base, base);
        assert_eq!(chunks.arena_remaining(), 16);
        assert!(system.requests().is_empty());

        // Not even one object left: the 16-byte tail goes to class 1 before growing.
        chunks.chunk_alloc(&mut bank, 32, 20).unwrap();
        let lengths = unsafe { bank.lengths() };
        assert_eq!(lengths[class_index(16)], 1);
        let donated = unsafe { bank.pop(class_index(16)) }.unwrap();
        assert_eq!(addr(donated), addr(base) + 32);
        assert_eq!(system.requests().len(), 1);
    }

    #[test]
    fn test_shrinks_to_exact_batch_when_enlarged_refused() {
        // Only requests up to one exact batch of 64-byte objects are honoured.
        let system = BudgetSystem::new(usize::MAX, 64 * 20);
        let mut bank = FreelistBank::new();
        let mut chunks = pool(system.clone());

        let batch = chunks.chunk_alloc(&mut bank, 64, 20).unwrap();
        assert_eq!(batch.count, 20);
        assert_eq!(system.requests(), vec![2 * 64 * 20, 64 * 20]);
        assert_eq!(chunks.heap_size(), 64 * 20);
        assert_eq!(chunks.arena_remaining(), 0);
    }

    #[test]
    fn test_scavenges_nearest_larger_class() {
        let mut bank = FreelistBank::new();
        let mut chunks = pool(FailingSystem);
        let block_48 = leaked_block(48);
        let block_96 = leaked_block(96);
        unsafe {
            bank.push(class_index(96), block_96);
            bank.push(class_index(48), block_48);
        }

        let batch = chunks.chunk_alloc(&mut bank, 16, 20).unwrap();
        // Ascending search picks the 48-byte block: three 16-byte objects.
        assert_eq!(batch.base, block_48);
        assert_eq!(batch.count, 3);
        assert_eq!(chunks.scavenges, 1);
        assert!(bank.is_empty(class_index(48)));
        assert!(!bank.is_empty(class_index(96)));
    }

    #[test]
    fn test_scavenge_ignores_smaller_classes() {
        let mut bank = FreelistBank::new();
        let mut chunks = pool(FailingSystem);
        unsafe { bank.push(class_index(8), leaked_block(8)) };

        let err = chunks.chunk_alloc(&mut bank, 64, 20).unwrap_err();
        assert_eq!(err, PoolError::OutOfMemory { requested: 64 });
        assert!(!bank.is_empty(class_index(8)));
    }

    #[test]
    fn test_total_exhaustion_reports_out_of_memory() {
        let mut bank = FreelistBank::new();
        let mut chunks = pool(FailingSystem);
        for index in 0..crate::alloc::size_class::NFREELISTS {
            let err = chunks.refill(&mut bank, class_size(index)).unwrap_err();
            assert_eq!(err, PoolError::OutOfMemory { requested: class_size(index) });
        }
        assert_eq!(chunks.heap_size(), 0);
        assert_eq!(chunks.refills, 0);
    }
}
