//! Cache entries and the snapshots handed to callers.

use super::generation::{Generation, Stamp};
use super::scope_key::ScopeKey;
use super::traits::{downcast, CacheValue};
use dove_core::{CacheId, DoveError, DoveResult};
use futures_util::future::{BoxFuture, Shared};
use serde::Serialize;
use std::fmt;
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum EntryStatus {
    Pending,
    Ready,
    Failed,
}

/// Dependency stamps an entry was built from, in declaration order.
pub(crate) type Fingerprint = Vec<(CacheId, Stamp)>;

/// Point-in-time view of an entry.
#[derive(Clone)]
pub struct EntrySnapshot {
    pub key: ScopeKey,
    pub status: EntryStatus,
    pub value: Option<CacheValue>,
    pub error: Option<DoveError>,
    pub stamp: Stamp,
    /// Result of a fetch that was superseded or outlived its registry; not stored.
    detached: bool,
}

impl EntrySnapshot {
    pub(crate) fn detached(key: ScopeKey, generation: Generation, result: DoveResult<CacheValue>) -> Self {
        let (status, value, error) = split(result);
        Self {
            key,
            status,
            value,
            error,
            stamp: Stamp {
                generation,
                revision: 0,
            },
            detached: true,
        }
    }

    pub(crate) fn is_detached(&self) -> bool {
        self.detached
    }

    pub fn generation(&self) -> Generation {
        self.stamp.generation
    }

    /// The value as its concrete type, `None` unless ready.
    pub fn typed<T: Send + Sync + 'static>(&self) -> DoveResult<Option<Arc<T>>> {
        match &self.value {
            Some(value) => downcast::<T>(self.key.cache(), value).map(Some),
            None => Ok(None),
        }
    }
}

impl fmt::Debug for EntrySnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EntrySnapshot")
            .field("key", &self.key)
            .field("status", &self.status)
            .field("has_value", &self.value.is_some())
            .field("error", &self.error)
            .field("stamp", &self.stamp)
            .finish()
    }
}

pub(crate) type SettleFuture = Shared<BoxFuture<'static, EntrySnapshot>>;

/// A fetch that has started and not yet settled.
pub(crate) struct InFlight {
    pub fetch_id: u64,
    /// Epoch of the type when the fetch started.
    pub generation: Generation,
    pub fingerprint: Fingerprint,
    pub future: SettleFuture,
}

pub(crate) struct CacheEntry {
    pub status: EntryStatus,
    pub value: Option<CacheValue>,
    pub error: Option<DoveError>,
    pub stamp: Stamp,
    pub fingerprint: Fingerprint,
    pub inflight: Option<InFlight>,
    /// Drop the entry when its fetch settles; set when interest ran out mid-fetch.
    pub discard_when_settled: bool,
}

impl CacheEntry {
    pub fn new() -> Self {
        Self {
            status: EntryStatus::Pending,
            value: None,
            error: None,
            stamp: Stamp::default(),
            fingerprint: Vec::new(),
            inflight: None,
            discard_when_settled: false,
        }
    }

    pub fn is_settled(&self) -> bool {
        self.status != EntryStatus::Pending
    }

    /// Start a (re)fetch. Any previous value is withdrawn.
    pub fn begin(&mut self, inflight: InFlight) {
        self.status = EntryStatus::Pending;
        self.value = None;
        self.error = None;
        self.inflight = Some(inflight);
    }

    pub fn settle(&mut self, result: DoveResult<CacheValue>, stamp: Stamp, fingerprint: Fingerprint) {
        let (status, value, error) = split(result);
        self.status = status;
        self.value = value;
        self.error = error;
        self.stamp = stamp;
        self.fingerprint = fingerprint;
        self.inflight = None;
    }

    pub fn recorded_stamp(&self, dependency: CacheId) -> Option<Stamp> {
        self.fingerprint
            .iter()
            .find(|(id, _)| *id == dependency)
            .map(|(_, stamp)| *stamp)
    }

    pub fn snapshot(&self, key: ScopeKey) -> EntrySnapshot {
        EntrySnapshot {
            key,
            status: self.status,
            value: self.value.clone(),
            error: self.error.clone(),
            stamp: self.stamp,
            detached: false,
        }
    }
}

fn split(result: DoveResult<CacheValue>) -> (EntryStatus, Option<CacheValue>, Option<DoveError>) {
    match result {
        Ok(value) => (EntryStatus::Ready, Some(value), None),
        Err(error) => (EntryStatus::Failed, None, Some(error)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dove_core::CacheError;

    const WORLD: CacheId = CacheId::new("world-cache");

    #[test]
    fn test_settle_ready_then_failed() {
        let key = ScopeKey::shared(WORLD);
        let mut entry = CacheEntry::new();
        assert!(!entry.is_settled());

        let stamp = Stamp {
            generation: Generation::ZERO,
            revision: 1,
        };
        entry.settle(Ok(Arc::new(42u32) as CacheValue), stamp, Vec::new());
        let snapshot = entry.snapshot(key);
        assert_eq!(snapshot.status, EntryStatus::Ready);
        assert_eq!(*snapshot.typed::<u32>().unwrap().unwrap(), 42);

        entry.settle(Err(CacheError::LockPoisoned.into()), stamp, Vec::new());
        let snapshot = entry.snapshot(key);
        assert_eq!(snapshot.status, EntryStatus::Failed);
        assert!(snapshot.value.is_none());
        assert!(snapshot.error.is_some());
    }

    #[test]
    fn test_typed_rejects_wrong_type() {
        let mut entry = CacheEntry::new();
        entry.settle(Ok(Arc::new(1u8) as CacheValue), Stamp::default(), Vec::new());
        let err = entry.snapshot(ScopeKey::shared(WORLD)).typed::<String>().unwrap_err();
        assert!(format!("{}", err).contains("type mismatch"));
    }

    #[test]
    fn test_recorded_stamp_lookup() {
        let mut entry = CacheEntry::new();
        let stamp = Stamp {
            generation: Generation::ZERO.next(),
            revision: 7,
        };
        entry.settle(Ok(Arc::new(()) as CacheValue), Stamp::default(), vec![(WORLD, stamp)]);
        assert_eq!(entry.recorded_stamp(WORLD), Some(stamp));
        assert_eq!(entry.recorded_stamp(CacheId::new("other")), None);
    }
}
