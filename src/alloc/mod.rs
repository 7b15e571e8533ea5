pub(crate) mod chunk;
pub mod config;
pub mod error;
pub mod freelist;
pub mod global;
pub mod pool;
pub mod size_class;
pub mod stats;
pub mod system;

pub use config::PoolConfig;
pub use error::PoolError;
pub use freelist::{Freelist, FreelistBank};
pub use global::{allocate, deallocate, global_pool, stats};
pub use pool::{Pool, SharedPool};
pub use size_class::{class_index, class_size, round_up, ALIGN, MAX_BYTES, NFREELISTS};
pub use stats::PoolStats;
pub use system::{LibcSystem, StdSystem, SystemAlloc};
