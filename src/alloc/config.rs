//! Configuration for a pool.

use serde::{Deserialize, Serialize};

use crate::alloc::error::PoolError;

/// Objects requested from the chunk pool per refill.
pub const DEFAULT_REFILL_BATCH: usize = 20;

/// Shift applied to the cumulative heap size when sizing a growth request.
pub const DEFAULT_GROWTH_SHIFT: u32 = 4;

/// Upper bound on the refill batch. Keeps `class_bytes * batch` far from overflow.
pub const MAX_REFILL_BATCH: usize = 1 << 16;

/// Tunables for a [`Pool`](crate::alloc::Pool).
///
/// ```
/// use poolalloc::alloc::PoolConfig;
///
/// let config: PoolConfig = serde_json::from_str(r#"{ "refill_batch": 32 }"#).unwrap();
/// assert_eq!(config.refill_batch, 32);
/// assert_eq!(config.growth_shift, 4);
/// assert!(config.validate().is_ok());
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PoolConfig {
    /// How many objects a single refill tries to carve.
    pub refill_batch: usize,
    /// Growth requests add `round_up(heap_size >> growth_shift)` bytes.
    pub growth_shift: u32,
}

impl PoolConfig {
    /// Checks that the configuration is usable.
    ///
    /// # Errors
    /// Returns [`PoolError::InvalidConfig`] naming the offending field.
    pub fn validate(&self) -> Result<(), PoolError> {
        if self.refill_batch == 0 {
            return Err(PoolError::InvalidConfig("refill_batch must be at least 1"));
        }
        if self.refill_batch > MAX_REFILL_BATCH {
            return Err(PoolError::InvalidConfig("refill_batch is too large"));
        }
        if self.growth_shift >= usize::BITS {
            return Err(PoolError::InvalidConfig("growth_shift must be below the word width"));
        }
        Ok(())
    }
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            refill_batch: DEFAULT_REFILL_BATCH,
            growth_shift: DEFAULT_GROWTH_SHIFT,
        }
    }
}
