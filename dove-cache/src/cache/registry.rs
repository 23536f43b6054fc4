//! The cache registry.
//!
//! Holds every registered cache type, the dependency graph, and one entry per
//! scope key. Resolution walks dependencies first, then either returns a fresh
//! entry, joins the in-flight fetch for the current epoch, or starts a new
//! one. Fetches run on spawned tasks so they settle even if every caller has
//! gone away.
//!
//! All state sits behind one mutex that is never held across an await.

use super::entry::{CacheEntry, EntrySnapshot, EntryStatus, Fingerprint, InFlight, SettleFuture};
use super::generation::{EpochTable, Generation, Stamp};
use super::graph::DependencyGraph;
use super::scope_key::ScopeKey;
use super::snapshot::Snapshot;
use super::subscription::Subscription;
use super::traits::{downcast, CacheType, CacheValue, ErasedCache, FetchContext, ResolvedDeps};
use dove_core::{
    AccountKey, CacheError, CacheId, DoveConfig, DoveError, DoveResult, Invalidator, Principal,
    RemoteAccessor, DOVE_PROGRAM_ID,
};
use futures_util::future::{join_all, BoxFuture, FutureExt};
use std::collections::{BTreeSet, HashMap};
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, Weak};
use std::time::Duration;
use tokio::sync::broadcast;

// ============================================================================
// CONFIGURATION
// ============================================================================

/// Registry-wide settings.
#[derive(Debug, Clone, PartialEq)]
pub struct RegistryConfig {
    /// Serve every type from its deterministic mock.
    pub mock: bool,
    pub program_id: AccountKey,
    pub oracle_max_age: Duration,
    /// Buffer of the event channel; slow subscribers past this resync.
    pub event_capacity: usize,
    /// Fixed unix time handed to fetches instead of the wall clock.
    pub pinned_now: Option<i64>,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            mock: false,
            program_id: DOVE_PROGRAM_ID,
            oracle_max_age: Duration::from_secs(60),
            event_capacity: 256,
            pinned_now: None,
        }
    }
}

impl RegistryConfig {
    pub fn from_config(config: &DoveConfig) -> Self {
        Self {
            mock: config.mock_backend,
            program_id: config.program_id,
            oracle_max_age: config.oracle_max_age(),
            ..Self::default()
        }
    }

    pub fn with_mock(mut self, mock: bool) -> Self {
        self.mock = mock;
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

    pub fn with_event_capacity(mut self, capacity: usize) -> Self {
        self.event_capacity = capacity.max(1);
        self
    }

    pub fn with_pinned_now(mut self, now: i64) -> Self {
        self.pinned_now = Some(now);
        self
    }
}

// ============================================================================
// EVENTS
// ============================================================================

/// Change notifications broadcast to subscriptions.
#[derive(Debug, Clone, PartialEq)]
pub enum CacheEvent {
    /// An entry started fetching or settled.
    Updated {
        key: ScopeKey,
        status: EntryStatus,
        revision: u64,
    },
    Invalidated { caches: Vec<CacheId> },
    PrincipalChanged { principal: Option<Principal> },
    Discarded { key: ScopeKey },
    Shutdown,
}

// ============================================================================
// BUILDER
// ============================================================================

pub struct RegistryBuilder {
    accessor: Arc<dyn RemoteAccessor>,
    config: RegistryConfig,
    caches: HashMap<CacheId, Arc<dyn ErasedCache>>,
    graph: DependencyGraph,
    error: Option<DoveError>,
}

impl RegistryBuilder {
    pub fn new(accessor: Arc<dyn RemoteAccessor>) -> Self {
        Self {
            accessor,
            config: RegistryConfig::default(),
            caches: HashMap::new(),
            graph: DependencyGraph::new(),
            error: None,
        }
    }

    pub fn with_config(mut self, config: RegistryConfig) -> Self {
        self.config = config;
        self
    }

    /// Add a cache type. Registration errors surface from [`build`](Self::build).
    pub fn register<C: CacheType>(mut self, cache: C) -> Self {
        if self.error.is_some() {
            return self;
        }
        match self
            .graph
            .insert(C::ID, cache.dependencies(), cache.is_principal_scoped())
        {
            Ok(()) => {
                self.caches.insert(C::ID, Arc::new(cache));
            }
            Err(e) => self.error = Some(e),
        }
        self
    }

    /// Validate the dependency graph and build the registry.
    pub fn build(self) -> DoveResult<CacheRegistry> {
        if let Some(error) = self.error {
            return Err(error);
        }
        self.graph.validate()?;
        let (events, _) = broadcast::channel(self.config.event_capacity.max(1));
        tracing::debug!(
            types = self.caches.len(),
            mock = self.config.mock,
            "Cache registry built"
        );
        Ok(CacheRegistry {
            inner: Arc::new(RegistryInner {
                caches: self.caches,
                graph: self.graph,
                accessor: self.accessor,
                config: self.config,
                state: Mutex::new(RegistryState::default()),
                events,
            }),
        })
    }
}

// ============================================================================
// REGISTRY
// ============================================================================

struct RegistryInner {
    caches: HashMap<CacheId, Arc<dyn ErasedCache>>,
    graph: DependencyGraph,
    accessor: Arc<dyn RemoteAccessor>,
    config: RegistryConfig,
    state: Mutex<RegistryState>,
    events: broadcast::Sender<CacheEvent>,
}

#[derive(Default)]
struct RegistryState {
    entries: HashMap<ScopeKey, CacheEntry>,
    epochs: EpochTable,
    principal: Option<Principal>,
    /// Live subscriptions whose dependency closure includes the type.
    interest: HashMap<CacheId, usize>,
    next_fetch_id: u64,
    next_revision: u64,
    closed: bool,
}

/// Shared handle to the cache. Cloning is cheap.
#[derive(Clone)]
pub struct CacheRegistry {
    inner: Arc<RegistryInner>,
}

impl fmt::Debug for CacheRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CacheRegistry")
            .field("types", &self.inner.caches.len())
            .field("config", &self.inner.config)
            .finish()
    }
}

impl CacheRegistry {
    pub fn builder(accessor: Arc<dyn RemoteAccessor>) -> RegistryBuilder {
        RegistryBuilder::new(accessor)
    }

    pub fn config(&self) -> &RegistryConfig {
        &self.inner.config
    }

    pub fn graph(&self) -> &DependencyGraph {
        &self.inner.graph
    }

    pub fn contains(&self, id: CacheId) -> bool {
        self.inner.caches.contains_key(&id)
    }

    /// Every type that transitively depends on `id`.
    pub fn dependents_of(&self, id: CacheId) -> BTreeSet<CacheId> {
        self.inner.graph.dependents_of(id)
    }

    pub fn events(&self) -> broadcast::Receiver<CacheEvent> {
        self.inner.events.subscribe()
    }

    pub fn subscribe<C: CacheType>(&self) -> DoveResult<Subscription<C>> {
        Subscription::spawn(self.clone())
    }

    /// Resolve `C` under the active principal and return its value.
    pub async fn resolve<C: CacheType>(&self) -> DoveResult<Arc<C::Value>> {
        let snapshot = self.resolve_entry(C::ID).await?;
        match snapshot.status {
            EntryStatus::Ready => match &snapshot.value {
                Some(value) => downcast::<C::Value>(C::ID, value),
                None => Err(CacheError::FetchAbandoned { cache: C::ID }.into()),
            },
            _ => Err(snapshot
                .error
                .unwrap_or_else(|| CacheError::FetchAbandoned { cache: C::ID }.into())),
        }
    }

    /// Resolve an entry by type id. Completes once the entry is settled.
    pub fn resolve_entry(&self, id: CacheId) -> BoxFuture<'static, DoveResult<EntrySnapshot>> {
        let registry = self.clone();
        async move { registry.resolve_settled(id).await }.boxed()
    }

    async fn resolve_settled(&self, id: CacheId) -> DoveResult<EntrySnapshot> {
        let cache = self
            .inner
            .caches
            .get(&id)
            .cloned()
            .ok_or(CacheError::UnknownCacheType { cache: id })?;
        let dependencies = cache.erased_dependencies();

        loop {
            let resolved =
                join_all(dependencies.iter().map(|d| self.resolve_entry(d.id))).await;

            let mut deps = ResolvedDeps::new(id);
            let mut fingerprint: Fingerprint = Vec::with_capacity(dependencies.len());
            let mut failure: Option<DoveError> = None;
            for (dependency, result) in dependencies.iter().zip(resolved) {
                let snapshot = result?;
                fingerprint.push((dependency.id, snapshot.stamp));
                if snapshot.status == EntryStatus::Ready {
                    deps.insert(dependency.id, snapshot.value);
                } else if dependency.optional {
                    deps.insert(dependency.id, None);
                } else if failure.is_none() {
                    failure = Some(match snapshot.error {
                        Some(source) => CacheError::DependencyFailed {
                            cache: id,
                            dependency: dependency.id,
                            source: Box::new(source),
                        }
                        .into(),
                        None => CacheError::DependencyNotReady {
                            cache: id,
                            dependency: dependency.id,
                        }
                        .into(),
                    });
                }
            }

            let future = {
                let mut guard = self.lock_state()?;
                if guard.closed {
                    return Err(CacheError::Closed.into());
                }
                // A dependency moved while we were waiting on the others.
                if !self.fingerprint_is_current(&guard, &fingerprint) {
                    continue;
                }

                let key = self.key_for(id, guard.principal);
                let epoch = guard.epochs.current(id);
                let joined = match guard.entries.get(&key) {
                    Some(entry)
                        if entry.is_settled()
                            && !entry.stamp.generation.is_behind(&epoch)
                            && entry.fingerprint == fingerprint =>
                    {
                        return Ok(entry.snapshot(key));
                    }
                    // Only a fetch for the current epoch and inputs may be shared.
                    Some(entry) => entry
                        .inflight
                        .as_ref()
                        .filter(|f| f.generation == epoch && f.fingerprint == fingerprint)
                        .map(|f| f.future.clone()),
                    None => None,
                };
                match joined {
                    Some(future) => future,
                    None => {
                        self.start_fetch(&mut guard, &cache, key, epoch, fingerprint, deps, failure)
                    }
                }
            };

            let snapshot = future.await;
            if !snapshot.is_detached() {
                return Ok(snapshot);
            }
            tracing::debug!(cache = %id, "Fetch superseded, resolving again");
        }
    }

    /// Start a fetch for `key`, or settle it failed right away when a
    /// required dependency failed.
    #[allow(clippy::too_many_arguments)]
    fn start_fetch(
        &self,
        state: &mut RegistryState,
        cache: &Arc<dyn ErasedCache>,
        key: ScopeKey,
        epoch: Generation,
        fingerprint: Fingerprint,
        deps: ResolvedDeps,
        failure: Option<DoveError>,
    ) -> SettleFuture {
        if let Some(error) = failure {
            tracing::debug!(key = %key, error = %error, "Dependency failed, skipping fetch");
            let snapshot = self.store(state, key, Err(error), epoch, fingerprint);
            return futures_util::future::ready(snapshot).boxed().shared();
        }

        state.next_fetch_id += 1;
        let fetch_id = state.next_fetch_id;
        let config = &self.inner.config;
        let ctx = FetchContext::new(self.inner.accessor.clone(), key.cache())
            .with_principal(key.principal())
            .with_program_id(config.program_id)
            .with_oracle_max_age(config.oracle_max_age)
            .with_now(self.now())
            .with_deps(deps);

        let weak: Weak<RegistryInner> = Arc::downgrade(&self.inner);
        let mock = config.mock;
        let erased = cache.clone();
        let recorded = fingerprint.clone();
        let future: SettleFuture = async move {
            let result = if mock {
                Ok(erased.erased_mock(&ctx))
            } else {
                erased.erased_fetch(&ctx).await
            };
            match weak.upgrade() {
                Some(inner) => CacheRegistry { inner }.settle(fetch_id, key, epoch, recorded, result),
                None => EntrySnapshot::detached(key, epoch, result),
            }
        }
        .boxed()
        .shared();

        let entry = state.entries.entry(key).or_insert_with(CacheEntry::new);
        entry.begin(InFlight {
            fetch_id,
            generation: epoch,
            fingerprint,
            future: future.clone(),
        });
        let revision = entry.stamp.revision;
        tracing::debug!(key = %key, fetch_id, generation = epoch.value(), mock, "Fetch started");
        self.emit(CacheEvent::Updated {
            key,
            status: EntryStatus::Pending,
            revision,
        });

        tokio::spawn(future.clone());
        future
    }

    /// Completion of fetch `fetch_id`. Stored only if it is still the
    /// entry's current fetch.
    fn settle(
        &self,
        fetch_id: u64,
        key: ScopeKey,
        generation: Generation,
        fingerprint: Fingerprint,
        result: DoveResult<CacheValue>,
    ) -> EntrySnapshot {
        let mut guard = match self.lock_state() {
            Ok(guard) => guard,
            Err(_) => return EntrySnapshot::detached(key, generation, result),
        };
        let current = guard
            .entries
            .get(&key)
            .and_then(|entry| entry.inflight.as_ref())
            .map(|inflight| inflight.fetch_id);
        if guard.closed || current != Some(fetch_id) {
            tracing::debug!(key = %key, fetch_id, "Discarding superseded fetch result");
            return EntrySnapshot::detached(key, generation, result);
        }
        self.store(&mut guard, key, result, generation, fingerprint)
    }

    fn store(
        &self,
        state: &mut RegistryState,
        key: ScopeKey,
        result: DoveResult<CacheValue>,
        generation: Generation,
        fingerprint: Fingerprint,
    ) -> EntrySnapshot {
        state.next_revision += 1;
        let stamp = Stamp {
            generation,
            revision: state.next_revision,
        };
        let entry = state.entries.entry(key).or_insert_with(CacheEntry::new);
        entry.settle(result, stamp, fingerprint);
        let snapshot = entry.snapshot(key);
        let discard = entry.discard_when_settled
            && state.interest.get(&key.cache()).copied().unwrap_or(0) == 0;

        match &snapshot.error {
            None => tracing::debug!(key = %key, revision = stamp.revision, "Cache entry ready"),
            Some(error) => tracing::warn!(key = %key, error = %error, "Cache entry failed"),
        }
        self.emit(CacheEvent::Updated {
            key,
            status: snapshot.status,
            revision: stamp.revision,
        });

        if discard {
            state.entries.remove(&key);
            tracing::debug!(key = %key, "Discarded entry with no remaining subscribers");
            self.emit(CacheEvent::Discarded { key });
        }
        snapshot
    }

    // ========================================================================
    // STALENESS
    // ========================================================================

    fn key_for(&self, id: CacheId, principal: Option<Principal>) -> ScopeKey {
        ScopeKey::resolve(id, self.inner.graph.is_principal_scoped(id), principal)
    }

    fn entry_is_stale(&self, state: &RegistryState, key: ScopeKey) -> bool {
        let Some(entry) = state.entries.get(&key) else {
            return true;
        };
        if !entry.is_settled() {
            return true;
        }
        if entry
            .stamp
            .generation
            .is_behind(&state.epochs.current(key.cache()))
        {
            return true;
        }
        !self.fingerprint_is_current(state, &entry.fingerprint)
    }

    /// Every recorded dependency still has the same settled, fresh entry.
    fn fingerprint_is_current(&self, state: &RegistryState, fingerprint: &Fingerprint) -> bool {
        fingerprint.iter().all(|(dependency, stamp)| {
            let key = self.key_for(*dependency, state.principal);
            match state.entries.get(&key) {
                Some(entry) => {
                    entry.is_settled() && entry.stamp == *stamp && !self.entry_is_stale(state, key)
                }
                None => false,
            }
        })
    }

    /// Whether `id` needs a fetch under the active principal. Missing entries
    /// count as stale.
    pub fn is_stale(&self, id: CacheId) -> DoveResult<bool> {
        let state = self.lock_state()?;
        Ok(self.entry_is_stale(&state, self.key_for(id, state.principal)))
    }

    /// Current entry of `id` without resolving anything.
    pub fn peek_entry(&self, id: CacheId) -> DoveResult<Option<EntrySnapshot>> {
        let state = self.lock_state()?;
        let key = self.key_for(id, state.principal);
        Ok(state.entries.get(&key).map(|entry| entry.snapshot(key)))
    }

    /// The value of `C` if it is ready and fresh.
    pub fn peek<C: CacheType>(&self) -> DoveResult<Option<Arc<C::Value>>> {
        let state = self.lock_state()?;
        let key = self.key_for(C::ID, state.principal);
        if self.entry_is_stale(&state, key) {
            return Ok(None);
        }
        match state.entries.get(&key).and_then(|e| e.value.as_ref()) {
            Some(value) => downcast::<C::Value>(C::ID, value).map(Some),
            None => Ok(None),
        }
    }

    /// Current epoch of a type.
    pub fn generation(&self, id: CacheId) -> DoveResult<Generation> {
        Ok(self.lock_state()?.epochs.current(id))
    }

    /// Every ready, fresh value visible to the active principal.
    pub fn snapshot(&self) -> DoveResult<Snapshot> {
        let state = self.lock_state()?;
        let mut snapshot = Snapshot::new().with_principal(state.principal);
        for (key, entry) in &state.entries {
            if !key.belongs_to(state.principal) || self.entry_is_stale(&state, *key) {
                continue;
            }
            if let Some(value) = &entry.value {
                snapshot.insert_value(key.cache(), value.clone());
            }
        }
        Ok(snapshot)
    }

    // ========================================================================
    // PRINCIPAL AND INTEREST
    // ========================================================================

    pub fn principal(&self) -> DoveResult<Option<Principal>> {
        Ok(self.lock_state()?.principal)
    }

    /// Switch the active signer. Every principal-scoped type is invalidated
    /// and entries of the previous principal are dropped.
    pub fn set_principal(&self, principal: Option<Principal>) -> DoveResult<()> {
        let scoped: Vec<CacheId> = self.inner.graph.principal_scoped().collect();
        {
            let mut guard = self.lock_state()?;
            if guard.principal == principal {
                return Ok(());
            }
            guard.principal = principal;
            for id in &scoped {
                guard.epochs.bump(*id);
            }
            guard.entries.retain(|key, _| key.belongs_to(principal));
        }
        tracing::info!(
            principal = %principal.map(|p| p.key().short()).unwrap_or_else(|| "-".to_string()),
            "Active principal changed"
        );
        self.emit(CacheEvent::PrincipalChanged { principal });
        self.emit(CacheEvent::Invalidated { caches: scoped });
        Ok(())
    }

    pub(crate) fn acquire(&self, ids: &BTreeSet<CacheId>) -> DoveResult<()> {
        let mut guard = self.lock_state()?;
        let state = &mut *guard;
        if state.closed {
            return Err(CacheError::Closed.into());
        }
        for id in ids {
            *state.interest.entry(*id).or_insert(0) += 1;
            for (key, entry) in state.entries.iter_mut() {
                if key.cache() == *id {
                    entry.discard_when_settled = false;
                }
            }
        }
        Ok(())
    }

    /// Drop interest. Settled entries with no interest left are discarded
    /// now, pending ones when they settle.
    pub(crate) fn release(&self, ids: &BTreeSet<CacheId>) {
        let mut guard = match self.lock_state() {
            Ok(guard) => guard,
            Err(e) => {
                tracing::error!(error = %e, "Failed to release cache interest");
                return;
            }
        };
        let state = &mut *guard;
        let mut discarded = Vec::new();
        for id in ids {
            let remaining = match state.interest.get_mut(id) {
                Some(count) => {
                    *count = count.saturating_sub(1);
                    *count
                }
                None => 0,
            };
            if remaining > 0 {
                continue;
            }
            state.interest.remove(id);
            state.entries.retain(|key, entry| {
                if key.cache() != *id {
                    return true;
                }
                if entry.is_settled() {
                    discarded.push(*key);
                    false
                } else {
                    entry.discard_when_settled = true;
                    true
                }
            });
        }
        drop(guard);
        for key in discarded {
            tracing::debug!(key = %key, "Discarded entry with no remaining subscribers");
            self.emit(CacheEvent::Discarded { key });
        }
    }

    /// Number of live subscriptions that depend on `id`.
    pub fn interest(&self, id: CacheId) -> usize {
        self.lock_state()
            .map(|state| state.interest.get(&id).copied().unwrap_or(0))
            .unwrap_or(0)
    }

    pub fn entry_count(&self) -> usize {
        self.lock_state().map(|state| state.entries.len()).unwrap_or(0)
    }

    // ========================================================================
    // INVALIDATION AND LIFECYCLE
    // ========================================================================

    /// Bump the epoch of every named type.
    pub fn try_invalidate(&self, caches: &[CacheId]) -> DoveResult<()> {
        {
            let mut state = self.lock_state()?;
            for id in caches {
                let generation = state.epochs.bump(*id);
                if !self.contains(*id) {
                    tracing::warn!(cache = %id, "Invalidated an unregistered cache type");
                }
                tracing::debug!(cache = %id, generation = generation.value(), "Cache invalidated");
            }
        }
        self.emit(CacheEvent::Invalidated {
            caches: caches.to_vec(),
        });
        Ok(())
    }

    /// Stop accepting resolves and tell subscriptions to exit. In-flight
    /// fetches finish but their results are not stored.
    pub fn shutdown(&self) {
        match self.lock_state() {
            Ok(mut state) => {
                state.closed = true;
                state.entries.clear();
                state.interest.clear();
            }
            Err(e) => tracing::error!(error = %e, "Cache registry lock poisoned during shutdown"),
        }
        tracing::info!("Cache registry shut down");
        self.emit(CacheEvent::Shutdown);
    }

    pub fn is_closed(&self) -> bool {
        self.lock_state().map(|state| state.closed).unwrap_or(true)
    }

    fn now(&self) -> i64 {
        self.inner
            .config
            .pinned_now
            .unwrap_or_else(|| chrono::Utc::now().timestamp())
    }

    fn emit(&self, event: CacheEvent) {
        // No receivers is fine.
        let _ = self.inner.events.send(event);
    }

    fn lock_state(&self) -> DoveResult<MutexGuard<'_, RegistryState>> {
        self.inner
            .state
            .lock()
            .map_err(|_| CacheError::LockPoisoned.into())
    }
}

impl Invalidator for CacheRegistry {
    fn invalidate(&self, caches: &[CacheId]) {
        if let Err(e) = self.try_invalidate(caches) {
            tracing::error!(error = %e, "Failed to invalidate caches");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use dove_test_utils::MockAccessor;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Counter {
        fetches: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl CacheType for Counter {
        type Value = usize;
        const ID: CacheId = CacheId::new("counter-cache");

        async fn fetch(&self, _ctx: &FetchContext) -> DoveResult<usize> {
            Ok(self.fetches.fetch_add(1, Ordering::SeqCst) + 1)
        }

        fn mock(&self, _ctx: &FetchContext) -> usize {
            0
        }
    }

    fn registry(fetches: Arc<AtomicUsize>) -> CacheRegistry {
        CacheRegistry::builder(Arc::new(MockAccessor::new()))
            .register(Counter { fetches })
            .build()
            .unwrap()
    }

    #[tokio::test]
    async fn test_fresh_entry_is_reused() {
        let fetches = Arc::new(AtomicUsize::new(0));
        let registry = registry(fetches.clone());
        assert_eq!(*registry.resolve::<Counter>().await.unwrap(), 1);
        assert_eq!(*registry.resolve::<Counter>().await.unwrap(), 1);
        assert_eq!(fetches.load(Ordering::SeqCst), 1);
        assert!(!registry.is_stale(Counter::ID).unwrap());
    }

    #[tokio::test]
    async fn test_invalidate_bumps_epoch_and_refetches() {
        let fetches = Arc::new(AtomicUsize::new(0));
        let registry = registry(fetches.clone());
        registry.resolve::<Counter>().await.unwrap();
        assert_eq!(registry.generation(Counter::ID).unwrap(), Generation::ZERO);

        registry.invalidate(&[Counter::ID]);
        assert!(registry.is_stale(Counter::ID).unwrap());
        assert_eq!(registry.generation(Counter::ID).unwrap().value(), 1);
        assert_eq!(registry.peek::<Counter>().unwrap(), None);

        assert_eq!(*registry.resolve::<Counter>().await.unwrap(), 2);
        let entry = registry.peek_entry(Counter::ID).unwrap().unwrap();
        assert_eq!(entry.generation().value(), 1);
    }

    #[tokio::test]
    async fn test_mock_mode_skips_fetch() {
        let fetches = Arc::new(AtomicUsize::new(0));
        let registry = CacheRegistry::builder(Arc::new(MockAccessor::new()))
            .with_config(RegistryConfig::default().with_mock(true))
            .register(Counter {
                fetches: fetches.clone(),
            })
            .build()
            .unwrap();
        assert_eq!(*registry.resolve::<Counter>().await.unwrap(), 0);
        assert_eq!(fetches.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_duplicate_registration_fails_build() {
        let result = CacheRegistry::builder(Arc::new(MockAccessor::new()))
            .register(Counter {
                fetches: Arc::new(AtomicUsize::new(0)),
            })
            .register(Counter {
                fetches: Arc::new(AtomicUsize::new(0)),
            })
            .build();
        assert!(matches!(
            result,
            Err(DoveError::Cache(CacheError::DuplicateCacheType { .. }))
        ));
    }

    #[tokio::test]
    async fn test_shutdown_rejects_resolves() {
        let registry = registry(Arc::new(AtomicUsize::new(0)));
        registry.shutdown();
        assert!(registry.is_closed());
        assert_eq!(
            registry.resolve::<Counter>().await.unwrap_err(),
            DoveError::Cache(CacheError::Closed)
        );
    }

    #[test]
    fn test_config_builders() {
        let config = RegistryConfig::default()
            .with_mock(true)
            .with_event_capacity(0)
            .with_pinned_now(42)
            .with_oracle_max_age(Duration::from_secs(5));
        assert!(config.mock);
        assert_eq!(config.event_capacity, 1);
        assert_eq!(config.pinned_now, Some(42));
        assert_eq!(config.oracle_max_age.as_secs(), 5);

        let from = RegistryConfig::from_config(&DoveConfig::default_devnet());
        assert!(!from.mock);
        assert_eq!(from.program_id, DOVE_PROGRAM_ID);
    }
}
