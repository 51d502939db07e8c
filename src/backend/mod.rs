//! Compute device boundary for the memory pool.
//!
//! A device plugs into [`MemoryPool`](crate::memory::MemoryPool) by handing
//! it two callbacks at construction: one that allocates a raw block of a
//! given capacity and one that releases a block back to the device. The pool
//! never touches device APIs itself; everything device-specific lives behind
//! these two functions.
//!
//! # Deleter contract
//!
//! The release callback must not fail. For a synchronous device (the host
//! heap) it releases immediately. For a device driven through an
//! asynchronous command queue, releasing a buffer does NOT wait for kernels
//! that are still reading or writing it, so the callback MUST drain the
//! queue first and only then release the buffer. The pool treats the
//! callback as opaque and synchronous; it never assumes release is fast and
//! never reorders or elides a release on the device's behalf.

use std::ffi::c_void;

use thiserror::Error;

mod host;

pub use host::HostDevice;

/// Device-side error types
#[derive(Error, Debug, Clone)]
pub enum DeviceError {
    #[error("device memory allocation failed: {0}")]
    AllocationFailed(String),
    #[error("unsupported capacity: {0} bytes")]
    UnsupportedCapacity(usize),
}

/// Device result type
pub type DeviceResult<T> = Result<T, DeviceError>;

/// Allocation callback supplied by a device at pool construction.
///
/// Receives the capacity in bytes (always a power of two) and returns a
/// fresh block, or an error when the device is out of memory.
pub type AllocateFn = Box<dyn Fn(usize) -> DeviceResult<RawBlock> + Send + Sync>;

/// Release callback supplied by a device at pool construction.
///
/// Receives a block previously produced by the matching [`AllocateFn`].
/// Must not fail; see the module docs for the queue-drain obligation on
/// asynchronous devices.
pub type ReleaseFn = Box<dyn Fn(RawBlock) + Send + Sync>;

// SAFETY: RawBlock only carries a raw pointer and a length. The pool
// serializes every access to a block under its own lock, and a block is
// owned by exactly one of: the device, a pool free list, or a live handle.
unsafe impl Send for RawBlock {}
unsafe impl Sync for RawBlock {}

/// Opaque block of device memory moved across the pool/device boundary.
///
/// The pointer is whatever the device's allocation callback produced; the
/// pool never dereferences it, it only keys bookkeeping off the address.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RawBlock {
    ptr: *mut c_void,
    capacity: usize,
}

impl RawBlock {
    /// Create a block from a device pointer and its capacity in bytes.
    pub fn new(ptr: *mut c_void, capacity: usize) -> Self {
        RawBlock { ptr, capacity }
    }

    /// Get the raw device pointer.
    pub fn as_ptr(&self) -> *mut c_void {
        self.ptr
    }

    /// Get the block capacity in bytes.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Address used as the pool bookkeeping key.
    pub(crate) fn addr(&self) -> usize {
        self.ptr as usize
    }
}
