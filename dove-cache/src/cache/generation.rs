//! Generations and the per-type epoch table.
//!
//! Every cache type has an epoch that only moves forward. Invalidating a type
//! bumps its epoch; an entry whose generation is behind its type's epoch is
//! stale. Dependents record the [`Stamp`] of each dependency they were built
//! from, so a dependency that was refetched (even at the same generation)
//! makes them stale too.

use dove_core::CacheId;
use serde::Serialize;
use std::collections::HashMap;

/// A point in a cache type's invalidation history.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize)]
pub struct Generation(u64);

impl Generation {
    pub const ZERO: Generation = Generation(0);

    pub fn value(&self) -> u64 {
        self.0
    }

    pub fn next(self) -> Self {
        Self(self.0 + 1)
    }

    /// Check if this generation is older than another.
    pub fn is_behind(&self, other: &Generation) -> bool {
        self.0 < other.0
    }
}

/// Identity of one settled value: the generation it was fetched at plus a
/// registry-wide settle counter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize)]
pub struct Stamp {
    pub generation: Generation,
    pub revision: u64,
}

/// Current epoch of every cache type. Types never invalidated are at zero.
#[derive(Debug, Clone, Default)]
pub struct EpochTable {
    epochs: HashMap<CacheId, Generation>,
}

impl EpochTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn current(&self, cache: CacheId) -> Generation {
        self.epochs.get(&cache).copied().unwrap_or(Generation::ZERO)
    }

    /// Advance the epoch of `cache`, returning the new value.
    pub fn bump(&mut self, cache: CacheId) -> Generation {
        let next = self.current(cache).next();
        self.epochs.insert(cache, next);
        next
    }

    pub fn is_current(&self, cache: CacheId, generation: Generation) -> bool {
        !generation.is_behind(&self.current(cache))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    const WORLD: CacheId = CacheId::new("world-cache");
    const VAULT: CacheId = CacheId::new("vault-cache");

    #[test]
    fn test_unknown_type_starts_at_zero() {
        let table = EpochTable::new();
        assert_eq!(table.current(WORLD), Generation::ZERO);
        assert!(table.is_current(WORLD, Generation::ZERO));
    }

    #[test]
    fn test_bump_is_per_type() {
        let mut table = EpochTable::new();
        let before = table.current(VAULT);
        assert_eq!(table.bump(WORLD).value(), 1);
        assert_eq!(table.bump(WORLD).value(), 2);
        assert_eq!(table.current(VAULT), before);
        assert!(!table.is_current(WORLD, Generation::ZERO.next()));
    }

    proptest! {
        #[test]
        fn prop_epochs_are_monotonic(bumps in 1usize..50) {
            let mut table = EpochTable::new();
            let mut last = table.current(WORLD);
            for _ in 0..bumps {
                let next = table.bump(WORLD);
                prop_assert!(last.is_behind(&next));
                last = next;
            }
            prop_assert_eq!(table.current(WORLD).value(), bumps as u64);
        }
    }
}
