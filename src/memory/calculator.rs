//! Size-class calculation for pooled allocations.
//!
//! Requested sizes are rounded up to the smallest power of two that covers
//! them; the exponent of that power is the block's size class. Everything
//! downstream keys off the class: free lists are bucketed per class, and a
//! block's capacity is always the class capacity, never the requested size.

use crate::memory::pool::{PoolError, PoolResult};

/// Largest representable size class (63 on 64-bit targets).
pub const MAX_SIZE_CLASS: u32 = usize::BITS - 1;

/// Number of size classes a pool tracks, one per address bit.
pub const SIZE_CLASS_COUNT: usize = usize::BITS as usize;

/// Map a requested byte size to its size class.
///
/// Returns the smallest `k` with `2^k >= size`, so `size_class(1) == 0`,
/// `size_class(100) == 7`, `size_class(1024) == 10`.
///
/// Fails with [`PoolError::InvalidSize`] when `size` is zero or exceeds the
/// largest representable power of two for the address width.
pub fn size_class(size: usize) -> PoolResult<u32> {
    if size == 0 {
        return Err(PoolError::InvalidSize(size));
    }
    let class = usize::BITS - (size - 1).leading_zeros();
    if class > MAX_SIZE_CLASS {
        return Err(PoolError::InvalidSize(size));
    }
    Ok(class)
}

/// Usable capacity of a size class in bytes.
pub fn class_capacity(class: u32) -> usize {
    1usize << class
}
