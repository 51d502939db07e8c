//! Common test utilities
//!
//! Provides a fake-pointer counting device so pool bookkeeping can be
//! exercised without touching real device memory: the device hands out
//! distinct addresses in a fake address space, counts allocation attempts,
//! successes, and releases, and can be scripted to fail the next N
//! allocation attempts to drive the out-of-memory recovery path.

// Not every test binary uses every helper.
#![allow(dead_code)]

use std::ffi::c_void;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use memforge::{DeviceError, MemoryPool, PoolConfig, RawBlock};

/// Base of the fake address space; never dereferenced.
const FAKE_BASE: usize = 0x1000;

/// Counting stub device with scriptable allocation failures.
pub struct CountingDevice {
    attempts: AtomicUsize,
    allocations: AtomicUsize,
    releases: AtomicUsize,
    fail_remaining: AtomicUsize,
    next_addr: AtomicUsize,
}

impl CountingDevice {
    pub fn new() -> Arc<Self> {
        Arc::new(CountingDevice {
            attempts: AtomicUsize::new(0),
            allocations: AtomicUsize::new(0),
            releases: AtomicUsize::new(0),
            fail_remaining: AtomicUsize::new(0),
            next_addr: AtomicUsize::new(FAKE_BASE),
        })
    }

    /// Build a pool over this device with default configuration.
    pub fn pool(self: &Arc<Self>) -> MemoryPool {
        self.pool_with_config(PoolConfig::new())
    }

    /// Build a pool over this device.
    pub fn pool_with_config(self: &Arc<Self>, config: PoolConfig) -> MemoryPool {
        let allocator = Arc::clone(self);
        let deleter = Arc::clone(self);
        MemoryPool::with_config(
            config,
            Box::new(move |capacity| allocator.allocate(capacity)),
            Box::new(move |block| deleter.release(block)),
        )
    }

    /// Make the next `count` allocation attempts fail.
    pub fn fail_next_allocations(&self, count: usize) {
        self.fail_remaining.store(count, Ordering::SeqCst);
    }

    /// Total allocation attempts, including failed ones.
    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }

    /// Successful allocations.
    pub fn allocations(&self) -> usize {
        self.allocations.load(Ordering::SeqCst)
    }

    /// Blocks released back to the device.
    pub fn releases(&self) -> usize {
        self.releases.load(Ordering::SeqCst)
    }

    fn allocate(&self, capacity: usize) -> Result<RawBlock, DeviceError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);

        let should_fail = self
            .fail_remaining
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |remaining| {
                remaining.checked_sub(1)
            })
            .is_ok();
        if should_fail {
            return Err(DeviceError::AllocationFailed(format!(
                "scripted failure for {} bytes",
                capacity
            )));
        }

        self.allocations.fetch_add(1, Ordering::SeqCst);
        let addr = self.next_addr.fetch_add(capacity.max(64), Ordering::SeqCst);
        Ok(RawBlock::new(addr as *mut c_void, capacity))
    }

    fn release(&self, _block: RawBlock) {
        self.releases.fetch_add(1, Ordering::SeqCst);
    }
}
