//! MemForge - Pooled Device Memory for Tensor Backends
//!
//! A size-classed memory pool with deferred release for numeric libraries
//! whose tensors live on pluggable compute devices. Devices supply an
//! allocate/release callback pair; the pool rounds requests to power-of-two
//! classes, recycles released blocks LIFO, recovers from device
//! out-of-memory by flushing its caches and retrying once, and hands out
//! reference-counted handles that stay safe to drop even after the pool
//! itself has been torn down.

pub mod backend;
pub mod error;
pub mod logging;
pub mod memory;

pub use backend::{AllocateFn, DeviceError, DeviceResult, HostDevice, RawBlock, ReleaseFn};
pub use error::{ErrorCategory, MemForgeError, MemForgeResult};
pub use memory::{BlockHandle, MemoryPool, PoolConfig, PoolError, PoolResult, PoolStats};
