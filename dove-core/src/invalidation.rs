//! Invalidation contract between the ledger and the cache registry.

use crate::identity::CacheId;

/// Marks cache types stale.
///
/// Marking is synchronous; refetching happens asynchronously in whoever
/// holds live interest in the affected entries.
pub trait Invalidator: Send + Sync {
    fn invalidate(&self, caches: &[CacheId]);
}
