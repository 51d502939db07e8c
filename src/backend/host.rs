//! Heap-backed device for host-resident tensors.
//!
//! The simplest device the pool can sit on: blocks come straight from the
//! global allocator, release is immediate, and there is no command queue to
//! drain. Useful on its own for CPU backends and as the reference
//! implementation of the callback contract.

use std::alloc::{alloc, dealloc, Layout};

use crate::backend::{DeviceError, DeviceResult, RawBlock};
use crate::memory::{MemoryPool, PoolConfig};

/// Host (CPU heap) device.
///
/// Allocates at a fixed alignment so pooled blocks are usable for vectorized
/// tensor kernels regardless of which size class they came from.
#[derive(Debug, Clone, Copy)]
pub struct HostDevice {
    alignment: usize,
}

impl HostDevice {
    /// Default alignment for host tensor data.
    ///
    /// One cache line covers the natural alignment of every element type the
    /// tensor layers use.
    pub const DEFAULT_ALIGNMENT: usize = 64;

    /// Create a host device with the default alignment.
    pub fn new() -> Self {
        HostDevice {
            alignment: Self::DEFAULT_ALIGNMENT,
        }
    }

    /// Create a host device with a custom alignment (must be a power of two).
    pub fn with_alignment(alignment: usize) -> Self {
        HostDevice { alignment }
    }

    /// Build a memory pool backed by this device.
    pub fn memory_pool(&self) -> MemoryPool {
        self.memory_pool_with_config(PoolConfig::new().with_label("host"))
    }

    /// Build a memory pool backed by this device with explicit pool
    /// configuration.
    pub fn memory_pool_with_config(&self, config: PoolConfig) -> MemoryPool {
        let alignment = self.alignment;
        MemoryPool::with_config(
            config,
            Box::new(move |capacity| host_allocate(capacity, alignment)),
            Box::new(move |block| host_release(block, alignment)),
        )
    }
}

impl Default for HostDevice {
    fn default() -> Self {
        Self::new()
    }
}

fn host_layout(capacity: usize, alignment: usize) -> DeviceResult<Layout> {
    Layout::from_size_align(capacity, alignment)
        .map_err(|_| DeviceError::UnsupportedCapacity(capacity))
}

fn host_allocate(capacity: usize, alignment: usize) -> DeviceResult<RawBlock> {
    let layout = host_layout(capacity, alignment)?;
    // SAFETY: layout has non-zero size; the pool never requests capacity 0.
    let ptr = unsafe { alloc(layout) };
    if ptr.is_null() {
        return Err(DeviceError::AllocationFailed(format!(
            "host allocation of {} bytes failed",
            capacity
        )));
    }
    Ok(RawBlock::new(ptr.cast(), capacity))
}

fn host_release(block: RawBlock, alignment: usize) {
    // Capacities are the pool's power-of-two classes, so the layout rebuilt
    // here is the same one host_allocate used.
    let layout = host_layout(block.capacity(), alignment)
        .expect("released block carries the layout it was allocated with");
    // SAFETY: the pool only releases blocks produced by host_allocate, each
    // exactly once.
    unsafe { dealloc(block.as_ptr().cast(), layout) };
}
