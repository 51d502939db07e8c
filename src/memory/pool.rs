//! Size-classed memory pool with deferred release.
//!
//! Native allocation on an accelerator is expensive and has to be ordered
//! against in-flight asynchronous kernels, so device buffers are never
//! handed straight back to the driver. Released blocks park on a per-class
//! free list instead and are served again, most recent first, to the next
//! request of the same class.
//!
//! # Strategy
//!
//! - Round every request up to a power-of-two capacity (its size class)
//! - Serve from the class's free list when possible, LIFO
//! - On device out-of-memory, return every cached block across all classes
//!   to the device and retry the allocation exactly once
//! - Defer real release to pool teardown, which drains outstanding blocks
//!   first and cached blocks second

use std::cell::RefCell;
use std::collections::HashMap;
use std::ffi::c_void;
use std::fmt;
use std::mem;
use std::sync::Arc;

use parking_lot::{ReentrantMutex, ReentrantMutexGuard};
use thiserror::Error;

use crate::backend::{AllocateFn, DeviceError, RawBlock, ReleaseFn};
use crate::memory::calculator::{self, SIZE_CLASS_COUNT};
use crate::memory::handle::BlockHandle;
use crate::memory::registry;

/// Pool error types
#[derive(Error, Debug)]
pub enum PoolError {
    /// Requested size is zero or exceeds the representable class range.
    #[error("invalid allocation size: {0} bytes")]
    InvalidSize(usize),
    /// The device allocation callback failed twice, once before and once
    /// after every cached block was returned to the device.
    #[error("device out of memory after releasing cached blocks: {0}")]
    OutOfMemory(DeviceError),
    /// A release arrived for an address this pool never supplied, or
    /// supplied and already reclaimed. Corruption signal, not recoverable.
    #[error("disposed unknown handle: address {0:#x}")]
    UnknownHandle(usize),
}

/// Pool result type
pub type PoolResult<T> = Result<T, PoolError>;

/// Pool construction options.
#[derive(Debug, Clone, Default)]
pub struct PoolConfig {
    /// Label used in log lines. Defaults to `pool-<id>`.
    pub label: Option<String>,
    /// Maximum number of released blocks cached per size class. When a
    /// class's cache is full, further released blocks go straight back to
    /// the device. `None` caches without bound.
    pub max_cached_per_class: Option<usize>,
}

impl PoolConfig {
    /// Create the default configuration (unbounded caching).
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the label used in log lines.
    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    /// Cap the number of cached blocks kept per size class.
    pub fn with_max_cached_per_class(mut self, max: usize) -> Self {
        self.max_cached_per_class = Some(max);
        self
    }
}

/// Statistics about a pool's allocation traffic.
#[derive(Debug, Clone, Copy)]
pub struct PoolStats {
    /// Bytes served by fresh device allocations
    pub bytes_allocated: usize,
    /// Bytes served from the free lists
    pub bytes_reused: usize,
    /// Blocks currently parked on free lists
    pub cached_blocks: usize,
    /// Total capacity of all cached blocks
    pub cached_bytes: usize,
    /// Blocks currently backing live handles
    pub outstanding_blocks: usize,
    /// Percentage of served bytes that came from the free lists
    pub reuse_rate_percent: f64,
}

impl fmt::Display for PoolStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "PoolStats: allocated={}KB, reused={}KB ({}%), cached={} blocks ({}KB), outstanding={}",
            self.bytes_allocated / 1024,
            self.bytes_reused / 1024,
            self.reuse_rate_percent as u32,
            self.cached_blocks,
            self.cached_bytes / 1024,
            self.outstanding_blocks
        )
    }
}

struct PoolState {
    /// One LIFO free list per size class.
    free_lists: Vec<Vec<RawBlock>>,
    /// Address of every block currently backing a live handle, with the
    /// class it was served from.
    outstanding: HashMap<usize, u32>,
    bytes_allocated: usize,
    bytes_reused: usize,
}

/// Pool state shared between the owning [`MemoryPool`] and the identity
/// registry. Handles reach it through the registry, never directly.
pub(crate) struct PoolShared {
    id: u64,
    label: String,
    max_cached_per_class: Option<usize>,
    allocate_fn: AllocateFn,
    release_fn: ReleaseFn,
    /// All bookkeeping sits behind one reentrant lock: the out-of-memory
    /// recovery path invokes the release callback while the lock is held,
    /// and a device callback is allowed to re-enter the pool from the same
    /// thread.
    state: ReentrantMutex<RefCell<PoolState>>,
}

impl fmt::Debug for PoolShared {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PoolShared")
            .field("id", &self.id)
            .field("label", &self.label)
            .finish()
    }
}

impl PoolShared {
    pub(crate) fn id(&self) -> u64 {
        self.id
    }

    fn acquire_block(&self, size: usize) -> PoolResult<RawBlock> {
        let class = calculator::size_class(size)?;
        let capacity = calculator::class_capacity(class);

        let guard = self.state.lock();

        let cached = guard.borrow_mut().free_lists[class as usize].pop();
        let block = match cached {
            Some(block) => {
                tracing::trace!(pool = %self.label, capacity, class, "reusing cached block");
                guard.borrow_mut().bytes_reused += capacity;
                block
            }
            None => {
                let block = self.allocate_fresh(&guard, capacity)?;
                tracing::trace!(pool = %self.label, capacity, class, "allocated fresh block");
                guard.borrow_mut().bytes_allocated += capacity;
                block
            }
        };

        guard.borrow_mut().outstanding.insert(block.addr(), class);
        Ok(block)
    }

    /// Fresh device allocation with pool-wide out-of-memory recovery: on
    /// failure every cached block is returned to the device and the
    /// callback retried exactly once. The second failure is the caller's.
    fn allocate_fresh(
        &self,
        guard: &ReentrantMutexGuard<'_, RefCell<PoolState>>,
        capacity: usize,
    ) -> PoolResult<RawBlock> {
        match (self.allocate_fn)(capacity) {
            Ok(block) => Ok(block),
            Err(first_failure) => {
                tracing::warn!(
                    pool = %self.label,
                    capacity,
                    error = %first_failure,
                    "device allocation failed, releasing cached blocks and retrying"
                );
                self.release_cached(guard);
                (self.allocate_fn)(capacity).map_err(PoolError::OutOfMemory)
            }
        }
    }

    /// Hand every cached block, across all classes, back to the device.
    ///
    /// The release callback runs with the state borrow dropped, so a
    /// callback that re-enters this pool on the calling thread stays legal.
    fn release_cached(&self, guard: &ReentrantMutexGuard<'_, RefCell<PoolState>>) {
        let cached: Vec<RawBlock> = {
            let mut state = guard.borrow_mut();
            state.free_lists.iter_mut().flat_map(mem::take).collect()
        };
        if !cached.is_empty() {
            tracing::debug!(pool = %self.label, count = cached.len(), "returning cached blocks to device");
        }
        for block in cached {
            (self.release_fn)(block);
        }
    }

    /// Return an outstanding block to its free list. Invoked by a handle's
    /// drop action while the pool is alive, and by drain at teardown.
    pub(crate) fn reclaim(&self, addr: usize) -> PoolResult<()> {
        let guard = self.state.lock();

        let class = guard
            .borrow_mut()
            .outstanding
            .remove(&addr)
            .ok_or(PoolError::UnknownHandle(addr))?;
        let capacity = calculator::class_capacity(class);
        let block = RawBlock::new(addr as *mut c_void, capacity);

        let overflow = {
            let mut state = guard.borrow_mut();
            let list = &mut state.free_lists[class as usize];
            match self.max_cached_per_class {
                Some(max) if list.len() >= max => Some(block),
                _ => {
                    list.push(block);
                    None
                }
            }
        };
        if let Some(block) = overflow {
            tracing::trace!(pool = %self.label, capacity, "class cache full, releasing block to device");
            (self.release_fn)(block);
        }
        Ok(())
    }

    /// Release everything this pool still holds: outstanding blocks first
    /// (handles may still be live under a garbage-collected host runtime),
    /// then the free lists.
    fn drain(&self) {
        let guard = self.state.lock();

        loop {
            let addr = guard.borrow().outstanding.keys().next().copied();
            let Some(addr) = addr else { break };
            // The address was just read out of the outstanding map.
            let _ = self.reclaim(addr);
        }
        self.release_cached(&guard);
    }
}

impl Drop for PoolShared {
    fn drop(&mut self) {
        tracing::debug!(pool = %self.label, id = self.id, "tearing down memory pool");
        self.drain();
        registry::unregister(self.id);
    }
}

/// Size-classed, deferred-release memory pool over an injected device.
///
/// Construction registers the pool in the identity registry; dropping it
/// drains every block it still holds (outstanding and cached) back to the
/// device and unregisters, after which releases from still-live handles
/// become no-ops.
pub struct MemoryPool {
    shared: Arc<PoolShared>,
}

impl MemoryPool {
    /// Create a pool over a device's allocate/release callbacks.
    pub fn new(allocate_fn: AllocateFn, release_fn: ReleaseFn) -> Self {
        Self::with_config(PoolConfig::default(), allocate_fn, release_fn)
    }

    /// Create a pool with explicit configuration.
    pub fn with_config(config: PoolConfig, allocate_fn: AllocateFn, release_fn: ReleaseFn) -> Self {
        let id = registry::next_pool_id();
        let label = config.label.unwrap_or_else(|| format!("pool-{}", id));
        let shared = Arc::new(PoolShared {
            id,
            label,
            max_cached_per_class: config.max_cached_per_class,
            allocate_fn,
            release_fn,
            state: ReentrantMutex::new(RefCell::new(PoolState {
                free_lists: vec![Vec::new(); SIZE_CLASS_COUNT],
                outstanding: HashMap::new(),
                bytes_allocated: 0,
                bytes_reused: 0,
            })),
        });
        registry::register(&shared);
        tracing::debug!(pool = %shared.label, id, "memory pool created");
        MemoryPool { shared }
    }

    /// Allocate a block of at least `size` bytes.
    ///
    /// The returned handle's capacity is the covering power of two. Fails
    /// with [`PoolError::InvalidSize`] for zero or unrepresentable sizes and
    /// [`PoolError::OutOfMemory`] when the device refuses twice.
    pub fn allocate(&self, size: usize) -> PoolResult<BlockHandle> {
        let block = self.shared.acquire_block(size)?;
        Ok(BlockHandle::new(
            block.as_ptr(),
            block.capacity(),
            self.shared.id,
        ))
    }

    /// Process-unique pool id.
    pub fn id(&self) -> u64 {
        self.shared.id
    }

    /// Label used in log lines.
    pub fn label(&self) -> &str {
        &self.shared.label
    }

    /// Snapshot of the pool's allocation statistics.
    pub fn stats(&self) -> PoolStats {
        let guard = self.shared.state.lock();
        let state = guard.borrow();

        let cached_blocks = state.free_lists.iter().map(Vec::len).sum();
        let cached_bytes = state
            .free_lists
            .iter()
            .enumerate()
            .map(|(class, list)| list.len() * calculator::class_capacity(class as u32))
            .sum();
        let served = state.bytes_allocated + state.bytes_reused;
        let reuse_rate_percent = if served > 0 {
            state.bytes_reused as f64 / served as f64 * 100.0
        } else {
            0.0
        };

        PoolStats {
            bytes_allocated: state.bytes_allocated,
            bytes_reused: state.bytes_reused,
            cached_blocks,
            cached_bytes,
            outstanding_blocks: state.outstanding.len(),
            reuse_rate_percent,
        }
    }
}

impl fmt::Debug for MemoryPool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MemoryPool")
            .field("id", &self.shared.id)
            .field("label", &self.shared.label)
            .finish()
    }
}
