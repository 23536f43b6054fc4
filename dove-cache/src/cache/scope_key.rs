//! Scope keys: which cache type, and for principal-scoped types, whose.
//!
//! The private inner struct means a key can only be built through the
//! constructors below, so a principal-scoped entry always carries the
//! principal it was fetched for and a shared entry never carries one.

use dove_core::{CacheId, Principal};
use std::fmt;

/// Identity of one cache entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ScopeKey {
    inner: ScopeKeyInner,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
struct ScopeKeyInner {
    cache: CacheId,
    scoped: bool,
    principal: Option<Principal>,
}

impl ScopeKey {
    /// Key of a cache type that does not depend on the signer.
    pub fn shared(cache: CacheId) -> Self {
        Self {
            inner: ScopeKeyInner {
                cache,
                scoped: false,
                principal: None,
            },
        }
    }

    /// Key of a principal-scoped cache type. `None` means no signer is active.
    pub fn for_principal(cache: CacheId, principal: Option<Principal>) -> Self {
        Self {
            inner: ScopeKeyInner {
                cache,
                scoped: true,
                principal,
            },
        }
    }

    /// Key for `cache` under the active principal.
    pub fn resolve(cache: CacheId, principal_scoped: bool, active: Option<Principal>) -> Self {
        if principal_scoped {
            Self::for_principal(cache, active)
        } else {
            Self::shared(cache)
        }
    }

    pub fn cache(&self) -> CacheId {
        self.inner.cache
    }

    pub fn principal(&self) -> Option<Principal> {
        self.inner.principal
    }

    pub fn is_principal_scoped(&self) -> bool {
        self.inner.scoped
    }

    /// Whether this key is visible while `active` is the principal.
    pub fn belongs_to(&self, active: Option<Principal>) -> bool {
        !self.inner.scoped || self.inner.principal == active
    }

    /// Stable string form, used in log fields.
    pub fn encode(&self) -> String {
        match (self.inner.scoped, self.inner.principal) {
            (false, _) => self.inner.cache.to_string(),
            (true, Some(principal)) => format!("{}@{}", self.inner.cache, principal.key().short()),
            (true, None) => format!("{}@-", self.inner.cache),
        }
    }
}

impl fmt::Display for ScopeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.encode())
    }
}
