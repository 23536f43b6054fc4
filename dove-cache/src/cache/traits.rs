//! Cache type contract and fetch context.
//!
//! A cache type is a small capability object: a stable identity, whether it is
//! principal-scoped, its dependencies, a network `fetch`, and a deterministic
//! `mock`. The registry stores each one behind an object-safe erased form,
//! keyed by identity.

use async_trait::async_trait;
use dove_core::{
    AccountKey, CacheError, CacheId, DoveResult, Principal, RemoteAccessor, DOVE_PROGRAM_ID,
};
use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

/// A cached value with its concrete type erased.
pub type CacheValue = Arc<dyn Any + Send + Sync>;

/// An edge in the dependency graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Dependency {
    pub id: CacheId,
    /// A failed optional dependency is passed to `fetch` as absent instead
    /// of failing the dependent.
    pub optional: bool,
}

impl Dependency {
    pub const fn required(id: CacheId) -> Self {
        Self {
            id,
            optional: false,
        }
    }

    pub const fn optional(id: CacheId) -> Self {
        Self { id, optional: true }
    }
}

/// A cache type.
///
/// # Implementation Requirements
///
/// - `ID` must be unique within a registry
/// - `mock` must be deterministic and must not touch the accessor
/// - a type that is not principal-scoped must not depend on one that is
#[async_trait]
pub trait CacheType: Send + Sync + 'static {
    type Value: Send + Sync + 'static;

    /// Stable type tag, e.g. `"world-cache"`.
    const ID: CacheId;

    /// Whether the value depends on the active signer.
    fn is_principal_scoped(&self) -> bool {
        false
    }

    fn dependencies(&self) -> Vec<Dependency> {
        Vec::new()
    }

    async fn fetch(&self, ctx: &FetchContext) -> DoveResult<Self::Value>;

    fn mock(&self, ctx: &FetchContext) -> Self::Value;
}

/// Object-safe form of [`CacheType`] held by the registry.
#[async_trait]
pub(crate) trait ErasedCache: Send + Sync {
    fn erased_id(&self) -> CacheId;
    fn erased_principal_scoped(&self) -> bool;
    fn erased_dependencies(&self) -> Vec<Dependency>;
    async fn erased_fetch(&self, ctx: &FetchContext) -> DoveResult<CacheValue>;
    fn erased_mock(&self, ctx: &FetchContext) -> CacheValue;
}

#[async_trait]
impl<C: CacheType> ErasedCache for C {
    fn erased_id(&self) -> CacheId {
        C::ID
    }

    fn erased_principal_scoped(&self) -> bool {
        self.is_principal_scoped()
    }

    fn erased_dependencies(&self) -> Vec<Dependency> {
        self.dependencies()
    }

    async fn erased_fetch(&self, ctx: &FetchContext) -> DoveResult<CacheValue> {
        let value = self.fetch(ctx).await?;
        Ok(Arc::new(value) as CacheValue)
    }

    fn erased_mock(&self, ctx: &FetchContext) -> CacheValue {
        Arc::new(self.mock(ctx)) as CacheValue
    }
}

/// Downcast an erased value.
pub(crate) fn downcast<T: Send + Sync + 'static>(
    cache: CacheId,
    value: &CacheValue,
) -> DoveResult<Arc<T>> {
    value
        .clone()
        .downcast::<T>()
        .map_err(|_| CacheError::TypeMismatch { cache }.into())
}

/// Settled dependency values handed to `fetch`.
#[derive(Clone)]
pub struct ResolvedDeps {
    owner: CacheId,
    values: HashMap<CacheId, Option<CacheValue>>,
}

impl ResolvedDeps {
    pub fn new(owner: CacheId) -> Self {
        Self {
            owner,
            values: HashMap::new(),
        }
    }

    pub(crate) fn insert(&mut self, id: CacheId, value: Option<CacheValue>) {
        self.values.insert(id, value);
    }

    /// A required dependency's value.
    pub fn get<C: CacheType>(&self) -> DoveResult<Arc<C::Value>> {
        match self.values.get(&C::ID) {
            Some(Some(value)) => downcast::<C::Value>(C::ID, value),
            _ => Err(CacheError::DependencyNotReady {
                cache: self.owner,
                dependency: C::ID,
            }
            .into()),
        }
    }

    /// An optional dependency's value, `None` if it failed.
    pub fn get_optional<C: CacheType>(&self) -> Option<Arc<C::Value>> {
        match self.values.get(&C::ID) {
            Some(Some(value)) => downcast::<C::Value>(C::ID, value).ok(),
            _ => None,
        }
    }
}

impl fmt::Debug for ResolvedDeps {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut present: Vec<_> = self
            .values
            .iter()
            .map(|(id, value)| (id.as_str(), value.is_some()))
            .collect();
        present.sort();
        f.debug_struct("ResolvedDeps")
            .field("owner", &self.owner)
            .field("present", &present)
            .finish()
    }
}

/// Everything a fetch may use: the accessor, the active principal and the
/// settled values of its dependencies.
#[derive(Clone)]
pub struct FetchContext {
    accessor: Arc<dyn RemoteAccessor>,
    principal: Option<Principal>,
    deps: ResolvedDeps,
    program_id: AccountKey,
    oracle_max_age: Duration,
    now: i64,
}

impl FetchContext {
    pub fn new(accessor: Arc<dyn RemoteAccessor>, owner: CacheId) -> Self {
        Self {
            accessor,
            principal: None,
            deps: ResolvedDeps::new(owner),
            program_id: DOVE_PROGRAM_ID,
            oracle_max_age: Duration::from_secs(60),
            now: chrono::Utc::now().timestamp(),
        }
    }

    pub fn with_principal(mut self, principal: Option<Principal>) -> Self {
        self.principal = principal;
        self
    }

    pub fn with_program_id(mut self, program_id: AccountKey) -> Self {
        self.program_id = program_id;
        self
    }

    pub fn with_oracle_max_age(mut self, max_age: Duration) -> Self {
        self.oracle_max_age = max_age;
        self
    }

    /// Pin the clock, in unix seconds.
    pub fn with_now(mut self, now: i64) -> Self {
        self.now = now;
        self
    }

    pub(crate) fn with_deps(mut self, deps: ResolvedDeps) -> Self {
        self.deps = deps;
        self
    }

    /// Provide a dependency value directly.
    pub fn with_dependency<C: CacheType>(mut self, value: C::Value) -> Self {
        self.deps.insert(C::ID, Some(Arc::new(value) as CacheValue));
        self
    }

    pub fn accessor(&self) -> &dyn RemoteAccessor {
        self.accessor.as_ref()
    }

    pub fn principal(&self) -> Option<Principal> {
        self.principal
    }

    pub fn program_id(&self) -> AccountKey {
        self.program_id
    }

    pub fn oracle_max_age_secs(&self) -> u64 {
        self.oracle_max_age.as_secs()
    }

    /// Unix seconds captured when the fetch started.
    pub fn unix_timestamp(&self) -> i64 {
        self.now
    }

    pub fn dependency<C: CacheType>(&self) -> DoveResult<Arc<C::Value>> {
        self.deps.get::<C>()
    }

    pub fn optional_dependency<C: CacheType>(&self) -> Option<Arc<C::Value>> {
        self.deps.get_optional::<C>()
    }
}

impl fmt::Debug for FetchContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FetchContext")
            .field("principal", &self.principal)
            .field("deps", &self.deps)
            .field("program_id", &self.program_id)
            .field("now", &self.now)
            .finish()
    }
}
