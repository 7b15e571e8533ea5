//! Pool statistics.

use core::sync::atomic::{AtomicUsize, Ordering};
use serde::{Deserialize, Serialize};

use crate::alloc::size_class::{class_size, NFREELISTS};

/// A point-in-time view of a pool.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoolStats {
    /// Cumulative bytes ever obtained from the system for the arena.
    pub heap_size: usize,
    /// Virgin bytes left in the current arena.
    pub arena_remaining: usize,
    /// Number of arena chunks obtained from the system.
    pub system_chunks: usize,
    /// Number of refills carved from the arena.
    pub refills: usize,
    /// Number of times a larger class's block was taken over as the arena.
    pub scavenges: usize,
    /// Free blocks per size class.
    pub free_blocks: [usize; NFREELISTS],
    /// Pooled allocations served.
    pub pooled_allocs: usize,
    /// Pooled deallocations taken back.
    pub pooled_frees: usize,
    /// Requests above the largest class handed to the system.
    pub oversize_allocs: usize,
    /// Oversize blocks released to the system.
    pub oversize_frees: usize,
}

impl PoolStats {
    /// Total free blocks over all classes.
    pub fn total_free_blocks(&self) -> usize {
        self.free_blocks.iter().sum()
    }

    /// Bytes sitting on free lists.
    pub fn free_bytes(&self) -> usize {
        self.free_blocks
            .iter()
            .enumerate()
            .map(|(index, count)| count * class_size(index))
            .sum()
    }

    /// Pooled blocks currently held by callers.
    pub fn live_blocks(&self) -> usize {
        self.pooled_allocs.saturating_sub(self.pooled_frees)
    }
}

/// Counters for the lock-free oversize path.
#[derive(Debug, Default)]
pub(crate) struct OversizeCounters {
    allocs: AtomicUsize,
    frees: AtomicUsize,
}

impl OversizeCounters {
    #[inline(always)]
    pub(crate) fn on_alloc(&self) {
        self.allocs.fetch_add(1, Ordering::Relaxed);
    }

    #[inline(always)]
    pub(crate) fn on_free(&self) {
        self.frees.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn fill(&self, stats: &mut PoolStats) {
        stats.oversize_allocs = self.allocs.load(Ordering::Relaxed);
        stats.oversize_frees = self.frees.load(Ordering::Relaxed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_derived_totals() {
        let mut free_blocks = [0; NFREELISTS];
        free_blocks[0] = 3; // 3 * 8
        free_blocks[1] = 2; // 2 * 16
        let stats = PoolStats {
            heap_size: 0,
            arena_remaining: 0,
            system_chunks: 0,
            refills: 0,
            scavenges: 0,
            free_blocks,
            pooled_allocs: 10,
            pooled_frees: 4,
            oversize_allocs: 0,
            oversize_frees: 0,
        };
        assert_eq!(stats.total_free_blocks(), 5);
        assert_eq!(stats.free_bytes(), 56);
        assert_eq!(stats.live_blocks(), 6);
    }
}
