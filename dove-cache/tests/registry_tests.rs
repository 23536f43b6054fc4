//! Registry behaviour against a seeded mock remote.
//!
//! Covers fetch deduplication, exact invalidation, dependency gating,
//! dependency-driven staleness, mock mode, principal switching and
//! superseded fetches.

use async_trait::async_trait;
use dove_cache::caches::{
    AssetCache, AuthorityCache, CollateralCache, DoveCache, DvdCache, SavingsCache,
    StabilityCache, StablecoinCache, VaultCache, WorldCache, WorldView,
};
use dove_cache::{
    register_defaults, CacheRegistry, CacheType, Dependency, EntryStatus, FetchContext,
    Generation, RegistryConfig,
};
use dove_core::{
    AccessorError, Asset, CacheError, CacheId, Collateral, DoveError, DoveResult, ErrorClass,
    Invalidator, Vault, World, DOVE_PROGRAM_ID,
};
use dove_test_utils::assertions::{assert_class, eventually};
use dove_test_utils::{fixtures, MockAccessor};
use futures_util::future::join_all;
use std::sync::Arc;
use std::time::Duration;

// ============================================================================
// SETUP
// ============================================================================

const NOW: i64 = 1_700_000_000;

fn seeded() -> Arc<MockAccessor> {
    let accessor = Arc::new(MockAccessor::new());
    fixtures::seed_protocol(&accessor, NOW);
    accessor
}

fn registry(accessor: Arc<MockAccessor>) -> CacheRegistry {
    register_defaults(
        CacheRegistry::builder(accessor)
            .with_config(RegistryConfig::default().with_pinned_now(NOW)),
    )
    .build()
    .expect("default cache graph is valid")
}

fn world_key() -> dove_core::AccountKey {
    World::derive_key(&DOVE_PROGRAM_ID)
}

fn sol_collateral_key() -> dove_core::AccountKey {
    Collateral::derive_key(&DOVE_PROGRAM_ID, &Asset::SOL.mint)
}

fn vault_key(n: u8) -> dove_core::AccountKey {
    Vault::derive_key(&DOVE_PROGRAM_ID, &fixtures::principal(n).key())
}

fn seed_vault(accessor: &MockAccessor, n: u8, debt: f64, sol: f64) {
    let owner = fixtures::principal(n);
    fixtures::seed_vault(
        accessor,
        owner,
        &fixtures::vault(owner, debt, vec![fixtures::reserve(&Asset::SOL, sol)]),
    );
}

// ============================================================================
// DEDUPLICATION
// ============================================================================

#[tokio::test]
async fn test_concurrent_resolves_share_one_fetch() {
    let accessor = seeded();
    accessor.set_read_delay(Duration::from_millis(20));
    let registry = registry(accessor.clone());

    let results = join_all((0..8).map(|_| registry.resolve::<WorldCache>())).await;

    assert!(results.iter().all(|r| r.is_ok()));
    assert_eq!(accessor.read_count(&world_key()), 1);
}

#[tokio::test]
async fn test_shared_dependency_fetched_once_for_dependents() {
    let accessor = seeded();
    seed_vault(&accessor, 1, 100.0, 10.0);
    let registry = registry(accessor.clone());
    registry.set_principal(Some(fixtures::principal(1))).unwrap();

    let (vault, dvd, savings) = tokio::join!(
        registry.resolve::<VaultCache>(),
        registry.resolve::<DvdCache>(),
        registry.resolve::<SavingsCache>(),
    );
    vault.unwrap();
    dvd.unwrap();
    savings.unwrap();
    assert_eq!(accessor.read_count(&world_key()), 1);
}

// ============================================================================
// INVALIDATION
// ============================================================================

#[tokio::test]
async fn test_invalidation_is_exact() {
    let accessor = seeded();
    seed_vault(&accessor, 1, 100.0, 10.0);
    let registry = registry(accessor.clone());
    registry.set_principal(Some(fixtures::principal(1))).unwrap();
    registry.resolve::<VaultCache>().await.unwrap();
    registry.resolve::<DvdCache>().await.unwrap();
    accessor.reset_read_counts();

    registry.invalidate(&[CollateralCache::ID]);

    assert!(registry.is_stale(CollateralCache::ID).unwrap());
    assert!(registry.is_stale(VaultCache::ID).unwrap());
    assert!(!registry.is_stale(WorldCache::ID).unwrap());
    assert!(!registry.is_stale(DvdCache::ID).unwrap());
    assert_eq!(registry.generation(CollateralCache::ID).unwrap().value(), 1);
    assert_eq!(registry.generation(WorldCache::ID).unwrap(), Generation::ZERO);

    registry.resolve::<VaultCache>().await.unwrap();
    assert_eq!(accessor.read_count(&world_key()), 0);
    assert_eq!(accessor.read_count(&sol_collateral_key()), 1);
    assert_eq!(accessor.read_count(&vault_key(1)), 1);
}

#[tokio::test]
async fn test_dependency_refetch_makes_dependent_stale() {
    let accessor = seeded();
    seed_vault(&accessor, 1, 100.0, 10.0);
    let registry = registry(accessor.clone());
    registry.set_principal(Some(fixtures::principal(1))).unwrap();
    registry.resolve::<VaultCache>().await.unwrap();
    let before = registry.peek_entry(VaultCache::ID).unwrap().unwrap();

    registry.invalidate(&[WorldCache::ID]);
    registry.resolve::<WorldCache>().await.unwrap();

    // The vault was never invalidated, but the world it was built from changed.
    assert_eq!(registry.generation(VaultCache::ID).unwrap(), Generation::ZERO);
    assert!(registry.is_stale(VaultCache::ID).unwrap());
    assert!(registry.peek::<VaultCache>().unwrap().is_none());

    registry.resolve::<VaultCache>().await.unwrap();
    let after = registry.peek_entry(VaultCache::ID).unwrap().unwrap();
    assert_eq!(accessor.read_count(&vault_key(1)), 2);
    assert!(after.stamp.revision > before.stamp.revision);
}

// ============================================================================
// DEPENDENCY GATING
// ============================================================================

#[tokio::test]
async fn test_failed_dependency_fails_dependent_without_fetch() {
    let accessor = seeded();
    seed_vault(&accessor, 1, 100.0, 10.0);
    accessor.fail_reads(
        world_key(),
        AccessorError::Transport {
            reason: "connection refused".to_string(),
        },
    );
    let registry = registry(accessor.clone());
    registry.set_principal(Some(fixtures::principal(1))).unwrap();

    let result = registry.resolve::<VaultCache>().await;
    assert_class(&result, ErrorClass::Transport);
    match result {
        Err(DoveError::Cache(CacheError::DependencyFailed {
            cache, dependency, ..
        })) => {
            assert_eq!(cache, VaultCache::ID);
            assert_eq!(dependency, WorldCache::ID);
        }
        other => panic!("expected dependency failure, got {other:?}"),
    }
    assert_eq!(accessor.read_count(&vault_key(1)), 0);

    // Failures are not retried until something is invalidated.
    accessor.clear_read_failures();
    assert!(registry.resolve::<WorldCache>().await.is_err());
    assert_eq!(accessor.read_count(&world_key()), 1);

    registry.invalidate(&[WorldCache::ID]);
    let vault = registry.resolve::<VaultCache>().await.unwrap();
    assert_eq!(vault.position.debt(), 100.0);
    assert_eq!(accessor.read_count(&vault_key(1)), 1);
}

#[tokio::test]
async fn test_dependent_waits_for_pending_dependency() {
    let accessor = seeded();
    seed_vault(&accessor, 1, 100.0, 10.0);
    let registry = registry(accessor.clone());
    registry.set_principal(Some(fixtures::principal(1))).unwrap();

    accessor.pause_reads();
    let task = {
        let registry = registry.clone();
        tokio::spawn(async move { registry.resolve::<VaultCache>().await })
    };
    assert!(eventually(|| accessor.read_count(&world_key()) == 1).await);
    tokio::time::sleep(Duration::from_millis(20)).await;
    assert_eq!(accessor.read_count(&vault_key(1)), 0);
    assert_eq!(
        registry.peek_entry(VaultCache::ID).unwrap().map(|e| e.status),
        None
    );

    accessor.resume_reads();
    let vault = task.await.unwrap().unwrap();
    assert!(vault.vault.is_some());
    assert_eq!(accessor.read_count(&vault_key(1)), 1);
}

struct Headline;

#[async_trait]
impl CacheType for Headline {
    type Value = String;
    const ID: CacheId = CacheId::new("headline-cache");

    fn dependencies(&self) -> Vec<Dependency> {
        vec![Dependency::optional(WorldCache::ID)]
    }

    async fn fetch(&self, ctx: &FetchContext) -> DoveResult<String> {
        Ok(match ctx.optional_dependency::<WorldCache>() {
            Some(world) => format!("balance {}", world.system_balance),
            None => "offline".to_string(),
        })
    }

    fn mock(&self, _ctx: &FetchContext) -> String {
        "mock".to_string()
    }
}

#[tokio::test]
async fn test_optional_dependency_failure_is_passed_as_absent() {
    let accessor = Arc::new(MockAccessor::new());
    let registry = CacheRegistry::builder(accessor)
        .register(WorldCache)
        .register(Headline)
        .build()
        .unwrap();

    // No world account seeded.
    let world = registry.resolve::<WorldCache>().await;
    assert_class(&world, ErrorClass::MissingRemoteState);
    assert_eq!(*registry.resolve::<Headline>().await.unwrap(), "offline");
}

// ============================================================================
// REGISTRATION
// ============================================================================

struct SharedSummary;

#[async_trait]
impl CacheType for SharedSummary {
    type Value = f64;
    const ID: CacheId = CacheId::new("summary-cache");

    fn dependencies(&self) -> Vec<Dependency> {
        vec![Dependency::required(VaultCache::ID)]
    }

    async fn fetch(&self, ctx: &FetchContext) -> DoveResult<f64> {
        Ok(ctx.dependency::<VaultCache>()?.position.debt())
    }

    fn mock(&self, _ctx: &FetchContext) -> f64 {
        0.0
    }
}

#[test]
fn test_shared_type_depending_on_principal_scoped_is_rejected() {
    let result = register_defaults(CacheRegistry::builder(Arc::new(MockAccessor::new())))
        .register(SharedSummary)
        .build();
    match result {
        Err(DoveError::Cache(CacheError::PrincipalScopeViolation { cache, dependency })) => {
            assert_eq!(cache, SharedSummary::ID);
            assert_eq!(dependency, VaultCache::ID);
        }
        other => panic!("expected scope violation, got {other:?}"),
    }
}

#[test]
fn test_missing_dependency_is_rejected() {
    let result = CacheRegistry::builder(Arc::new(MockAccessor::new()))
        .register(VaultCache)
        .build();
    assert!(matches!(
        result,
        Err(DoveError::Cache(CacheError::UnknownDependency { .. }))
    ));
}

#[test]
fn test_default_graph_introspection() {
    let registry = registry(Arc::new(MockAccessor::new()));
    let dependents = registry.dependents_of(WorldCache::ID);
    for id in [VaultCache::ID, SavingsCache::ID, DvdCache::ID, DoveCache::ID] {
        assert!(dependents.contains(&id), "{id} should depend on world");
    }
    assert!(!dependents.contains(&CollateralCache::ID));
    let order = registry.graph().topological_order().unwrap();
    let pos = |id| order.iter().position(|x| *x == id).unwrap();
    assert!(pos(WorldCache::ID) < pos(VaultCache::ID));
    assert!(pos(CollateralCache::ID) < pos(VaultCache::ID));
}

// ============================================================================
// MOCK MODE
// ============================================================================

#[tokio::test]
async fn test_mock_mode_is_deterministic_and_offline() {
    let build = |accessor: Arc<MockAccessor>| {
        register_defaults(
            CacheRegistry::builder(accessor)
                .with_config(RegistryConfig::default().with_mock(true)),
        )
        .build()
        .unwrap()
    };
    let accessor_a = Arc::new(MockAccessor::new());
    let accessor_b = Arc::new(MockAccessor::new());
    let a = build(accessor_a.clone());
    let b = build(accessor_b.clone());
    a.set_principal(Some(fixtures::principal(1))).unwrap();
    b.set_principal(Some(fixtures::principal(2))).unwrap();

    assert_eq!(
        a.resolve::<WorldCache>().await.unwrap(),
        b.resolve::<WorldCache>().await.unwrap()
    );
    assert_eq!(
        a.resolve::<CollateralCache>().await.unwrap(),
        b.resolve::<CollateralCache>().await.unwrap()
    );
    assert_eq!(
        a.resolve::<VaultCache>().await.unwrap(),
        b.resolve::<VaultCache>().await.unwrap()
    );
    a.resolve::<AssetCache>().await.unwrap();
    a.resolve::<StabilityCache>().await.unwrap();
    a.resolve::<StablecoinCache>().await.unwrap();
    a.resolve::<AuthorityCache>().await.unwrap();

    assert_eq!(*a.resolve::<WorldCache>().await.unwrap(), WorldView::zero());
    assert_eq!(accessor_a.total_reads(), 0);
    assert_eq!(accessor_b.total_reads(), 0);
}

// ============================================================================
// PRINCIPAL SWITCH
// ============================================================================

#[tokio::test]
async fn test_principal_switch_invalidates_scoped_entries_only() {
    let accessor = seeded();
    seed_vault(&accessor, 1, 100.0, 10.0);
    seed_vault(&accessor, 2, 40.0, 5.0);
    let registry = registry(accessor.clone());
    registry.set_principal(Some(fixtures::principal(1))).unwrap();
    let first = registry.resolve::<VaultCache>().await.unwrap();
    assert_eq!(first.position.debt(), 100.0);

    registry.set_principal(Some(fixtures::principal(2))).unwrap();
    assert!(!registry.is_stale(WorldCache::ID).unwrap());
    assert!(registry.is_stale(VaultCache::ID).unwrap());
    assert_eq!(registry.generation(VaultCache::ID).unwrap().value(), 1);
    assert_eq!(registry.generation(WorldCache::ID).unwrap(), Generation::ZERO);

    let second = registry.resolve::<VaultCache>().await.unwrap();
    assert_eq!(second.position.debt(), 40.0);
    assert_eq!(
        second.vault.as_ref().map(|v| v.owner),
        Some(fixtures::principal(2).key())
    );
    assert_eq!(accessor.read_count(&world_key()), 1);

    let entry = registry.peek_entry(VaultCache::ID).unwrap().unwrap();
    assert_eq!(entry.key.principal(), Some(fixtures::principal(2)));
}

#[tokio::test]
async fn test_no_principal_yields_empty_scoped_values() {
    let accessor = seeded();
    let registry = registry(accessor.clone());
    let vault = registry.resolve::<VaultCache>().await.unwrap();
    assert!(vault.vault.is_none());
    let dvd = registry.resolve::<DvdCache>().await.unwrap();
    assert!(!dvd.has_token_account);
}

// ============================================================================
// SUPERSEDED FETCHES
// ============================================================================

#[tokio::test]
async fn test_fetch_started_before_invalidation_is_superseded() {
    let accessor = seeded();
    let registry = registry(accessor.clone());

    accessor.pause_reads();
    let early = {
        let registry = registry.clone();
        tokio::spawn(async move { registry.resolve_entry(WorldCache::ID).await })
    };
    assert!(eventually(|| accessor.read_count(&world_key()) == 1).await);

    registry.invalidate(&[WorldCache::ID]);
    let late = {
        let registry = registry.clone();
        tokio::spawn(async move { registry.resolve_entry(WorldCache::ID).await })
    };
    assert!(eventually(|| accessor.read_count(&world_key()) == 2).await);

    accessor.resume_reads();
    let early = early.await.unwrap().unwrap();
    let late = late.await.unwrap().unwrap();

    assert_eq!(early.status, EntryStatus::Ready);
    assert_eq!(early.generation().value(), 1);
    assert_eq!(early.stamp, late.stamp);
    assert_eq!(accessor.read_count(&world_key()), 2);
    assert!(!registry.is_stale(WorldCache::ID).unwrap());
}

// ============================================================================
// FAN-OUT AND SNAPSHOTS
// ============================================================================

#[tokio::test]
async fn test_collateral_tolerates_unregistered_assets() {
    let accessor = seeded();
    let registry = registry(accessor.clone());
    let collateral = registry.resolve::<CollateralCache>().await.unwrap();
    assert_eq!(collateral.len(), 1);
    let sol = collateral.get(&Asset::SOL).unwrap();
    assert_eq!(sol.price, 100.0);
    assert!(!sol.is_price_stale);
    assert!(collateral.get(&Asset::HNT).is_none());
}

#[tokio::test]
async fn test_collateral_with_missing_oracle_fails() {
    let accessor = seeded();
    fixtures::seed_collateral(&accessor, &Asset::JUP, 1.2, NOW);
    accessor.remove_account(&Asset::JUP.pyth_oracle);
    let registry = registry(accessor);
    let result = registry.resolve::<CollateralCache>().await;
    assert!(matches!(
        result,
        Err(DoveError::Protocol(dove_core::ProtocolError::OracleUnavailable { key }))
            if key == Asset::JUP.pyth_oracle
    ));
}

#[tokio::test]
async fn test_stale_oracle_is_flagged() {
    let accessor = seeded();
    fixtures::seed_collateral(&accessor, &Asset::HNT, 5.0, NOW - 3_600);
    let registry = registry(accessor);
    let collateral = registry.resolve::<CollateralCache>().await.unwrap();
    let hnt = collateral.get(&Asset::HNT).unwrap();
    assert!(hnt.is_price_stale);
    assert_eq!(hnt.price, 5.0);
}

#[tokio::test]
async fn test_snapshot_holds_only_fresh_values() {
    let accessor = seeded();
    seed_vault(&accessor, 1, 100.0, 10.0);
    fixtures::seed_token_balance(&accessor, fixtures::principal(1), fixtures::DVD_MINT, 50.0);
    let registry = registry(accessor);
    registry.set_principal(Some(fixtures::principal(1))).unwrap();
    registry.resolve::<VaultCache>().await.unwrap();
    registry.resolve::<DvdCache>().await.unwrap();

    let snapshot = registry.snapshot().unwrap();
    assert_eq!(snapshot.principal(), Some(fixtures::principal(1)));
    assert_eq!(snapshot.require::<DvdCache>().unwrap().balance, 50.0);
    assert!(snapshot.contains(VaultCache::ID));

    registry.invalidate(&[DvdCache::ID]);
    let snapshot = registry.snapshot().unwrap();
    assert!(!snapshot.contains(DvdCache::ID));
    assert!(snapshot.contains(WorldCache::ID));
}
