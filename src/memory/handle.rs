//! Reference-counted allocation handles.
//!
//! A [`BlockHandle`] is what the tensor layers hold instead of a raw device
//! pointer. Clones share one underlying block; when the last clone drops,
//! the block is returned to the pool that issued it. The handle deliberately
//! does not keep the pool alive: it stores the pool's id and resolves it
//! through the identity registry at release time, which is what makes it
//! safe for a handle to outlive its pool when release order is driven by a
//! garbage-collected host runtime.

use std::ffi::c_void;
use std::sync::Arc;

use crate::memory::registry;

// SAFETY: HandleInner only carries a raw pointer plus bookkeeping ids; the
// pool serializes all mutation of the block's ownership state under its own
// lock, and the handle itself never dereferences the pointer.
unsafe impl Send for HandleInner {}
unsafe impl Sync for HandleInner {}

/// Reference-counted token for one pooled allocation.
///
/// Cheap to clone; the release action fires exactly once, when the
/// refcount reaches zero, on whichever thread drops last.
#[derive(Debug, Clone)]
pub struct BlockHandle {
    inner: Arc<HandleInner>,
}

#[derive(Debug)]
struct HandleInner {
    ptr: *mut c_void,
    capacity: usize,
    pool_id: u64,
}

impl BlockHandle {
    pub(crate) fn new(ptr: *mut c_void, capacity: usize, pool_id: u64) -> Self {
        BlockHandle {
            inner: Arc::new(HandleInner {
                ptr,
                capacity,
                pool_id,
            }),
        }
    }

    /// Raw device pointer of the block.
    ///
    /// Valid while the issuing pool is alive; after pool teardown the block
    /// has been released and the pointer must not be dereferenced.
    pub fn as_ptr(&self) -> *mut c_void {
        self.inner.ptr
    }

    /// Usable capacity in bytes (the size-class capacity, not the
    /// originally requested size).
    pub fn capacity(&self) -> usize {
        self.inner.capacity
    }

    /// Id of the pool that issued this handle.
    pub fn pool_id(&self) -> u64 {
        self.inner.pool_id
    }
}

impl Drop for HandleInner {
    fn drop(&mut self) {
        match registry::resolve(self.pool_id) {
            Some(pool) => {
                if let Err(err) = pool.reclaim(self.ptr as usize) {
                    // Double release or a handle crossed pools; the pool's
                    // bookkeeping can no longer be trusted.
                    panic!("{}", err);
                }
            }
            None => {
                // Pool already torn down; its drain released this block.
                tracing::trace!(
                    pool_id = self.pool_id,
                    ptr = ?self.ptr,
                    "handle released after pool teardown, ignoring"
                );
            }
        }
    }
}
