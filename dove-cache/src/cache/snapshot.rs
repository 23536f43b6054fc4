//! Immutable view of cached values, used for planning transactions.

use super::traits::{downcast, CacheType, CacheValue};
use dove_core::{CacheId, DoveResult, LedgerError, Principal};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// Ready cache values keyed by type, plus the principal they belong to.
#[derive(Clone, Default)]
pub struct Snapshot {
    principal: Option<Principal>,
    values: HashMap<CacheId, CacheValue>,
}

impl Snapshot {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_principal(mut self, principal: Option<Principal>) -> Self {
        self.principal = principal;
        self
    }

    /// Add a value by hand.
    pub fn with<C: CacheType>(mut self, value: C::Value) -> Self {
        self.values.insert(C::ID, Arc::new(value) as CacheValue);
        self
    }

    pub(crate) fn insert_value(&mut self, id: CacheId, value: CacheValue) {
        self.values.insert(id, value);
    }

    pub fn principal(&self) -> Option<Principal> {
        self.principal
    }

    pub fn contains(&self, id: CacheId) -> bool {
        self.values.contains_key(&id)
    }

    pub fn get<C: CacheType>(&self) -> Option<Arc<C::Value>> {
        self.values
            .get(&C::ID)
            .and_then(|value| downcast::<C::Value>(C::ID, value).ok())
    }

    /// A value the caller cannot proceed without.
    pub fn require<C: CacheType>(&self) -> DoveResult<Arc<C::Value>> {
        self.get::<C>()
            .ok_or_else(|| LedgerError::NotReady { cache: C::ID }.into())
    }
}

impl fmt::Debug for Snapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut ids: Vec<&str> = self.values.keys().map(|id| id.as_str()).collect();
        ids.sort_unstable();
        f.debug_struct("Snapshot")
            .field("principal", &self.principal)
            .field("values", &ids)
            .finish()
    }
}
