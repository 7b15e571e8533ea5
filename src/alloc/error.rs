//! The pool's error type.

use thiserror::Error;

/// Errors reported by the pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum PoolError {
    /// The system allocator refused every fallback size and no larger size
    /// class had a spare block.
    #[error("out of memory: unable to supply {requested} bytes")]
    OutOfMemory {
        /// Size of the request that could not be satisfied, in bytes.
        requested: usize,
    },
    /// A zero-byte allocation was requested.
    #[error("zero-sized allocation requested")]
    ZeroSize,
    /// A [`PoolConfig`](crate::alloc::PoolConfig) failed validation.
    #[error("invalid pool configuration: {0}")]
    InvalidConfig(&'static str),
}
