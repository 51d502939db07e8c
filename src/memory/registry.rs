//! Process-wide pool identity registry.
//!
//! A handle never owns the pool that issued it; it remembers the pool's id
//! and resolves it here when its last reference drops. A miss means the pool
//! was already torn down and its drain released the block, so the release
//! becomes a no-op. Entries are added at pool construction and removed at
//! teardown; lookups may race freely against registration of other pools.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use once_cell::sync::Lazy;
use parking_lot::Mutex;

use crate::memory::pool::PoolShared;

static NEXT_POOL_ID: AtomicU64 = AtomicU64::new(0);

static POOLS: Lazy<Mutex<HashMap<u64, Weak<PoolShared>>>> =
    Lazy::new(|| Mutex::new(HashMap::new()));

/// Reserve the next process-unique pool id.
pub(crate) fn next_pool_id() -> u64 {
    NEXT_POOL_ID.fetch_add(1, Ordering::Relaxed)
}

/// Register a freshly constructed pool under its id.
pub(crate) fn register(shared: &Arc<PoolShared>) {
    POOLS.lock().insert(shared.id(), Arc::downgrade(shared));
}

/// Remove a pool at teardown; later lookups for this id miss.
pub(crate) fn unregister(id: u64) {
    POOLS.lock().remove(&id);
}

/// Resolve a pool id to its shared state, if the pool is still alive.
///
/// The upgrade fails once the owning `MemoryPool` has started dropping,
/// even before the entry is removed, so a release racing teardown can
/// never reach a half-destroyed pool.
pub(crate) fn resolve(id: u64) -> Option<Arc<PoolShared>> {
    POOLS.lock().get(&id).and_then(Weak::upgrade)
}

#[cfg(test)]
pub(crate) fn is_registered(id: u64) -> bool {
    POOLS.lock().contains_key(&id)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_are_unique_and_monotonic() {
        let a = next_pool_id();
        let b = next_pool_id();
        assert!(b > a);
    }

    #[test]
    fn unknown_id_resolves_to_none() {
        assert!(resolve(u64::MAX).is_none());
    }
}
