//! End-to-end flows through a session: resolve, compose, submit, refetch.

use dove_cache::caches::{DvdCache, VaultCache, WorldCache};
use dove_cache::{CacheType, RegistryConfig};
use dove_client::Session;
use dove_core::{Asset, DoveConfig, ErrorClass, Vault, DOVE_PROGRAM_ID};
use dove_test_utils::{fixtures, MockAccessor, SubmitOutcome};
use std::io::Write;
use std::sync::Arc;

const NOW: i64 = 1_700_000_000;

fn config() -> DoveConfig {
    let mut config = DoveConfig::default_devnet();
    config.confirmation.poll_interval_ms = 1;
    config
}

/// Principal 1 holds 10 SOL at 100 against 100 DVD of debt.
fn seeded() -> Arc<MockAccessor> {
    let accessor = Arc::new(MockAccessor::new());
    fixtures::seed_protocol(&accessor, NOW);
    let owner = fixtures::principal(1);
    fixtures::seed_vault(
        &accessor,
        owner,
        &fixtures::vault(owner, 100.0, vec![fixtures::reserve(&Asset::SOL, 10.0)]),
    );
    accessor
}

fn session(accessor: Arc<MockAccessor>) -> Session {
    Session::with_registry_config(
        config(),
        RegistryConfig::from_config(&config()).with_pinned_now(NOW),
        accessor,
    )
    .expect("session builds")
}

#[tokio::test]
async fn test_borrow_flow_refetches_invalidated_caches() {
    let accessor = seeded();
    let session = session(accessor.clone());
    session.set_principal(Some(fixtures::principal(1))).unwrap();

    let snapshot = session
        .ready_snapshot(&[WorldCache::ID, VaultCache::ID, DvdCache::ID])
        .await
        .unwrap();
    assert_eq!(
        snapshot.require::<VaultCache>().unwrap().position.available_to_borrow(),
        700.0
    );

    let receipt = session
        .ledger()
        .borrow(750.0, &snapshot)
        .unwrap()
        .submit()
        .await
        .unwrap();
    assert!(!receipt.is_noop());

    assert!(session.registry().is_stale(VaultCache::ID).unwrap());
    assert!(session.registry().is_stale(DvdCache::ID).unwrap());
    assert!(session.registry().is_stale(WorldCache::ID).unwrap());
    assert!(session.snapshot().unwrap().get::<VaultCache>().is_none());

    let vault_key = Vault::derive_key(&DOVE_PROGRAM_ID, &fixtures::principal(1).key());
    let before = accessor.read_count(&vault_key);
    session.resolve::<VaultCache>().await.unwrap();
    assert_eq!(accessor.read_count(&vault_key), before + 1);
    session.shutdown();
}

#[tokio::test]
async fn test_rejected_borrow_leaves_cache_fresh() {
    let accessor = seeded();
    let session = session(accessor.clone());
    session.set_principal(Some(fixtures::principal(1))).unwrap();
    accessor.push_outcome(SubmitOutcome::Reject(
        "Program log: Error: vault is liquidating".to_string(),
    ));

    let snapshot = session
        .ready_snapshot(&[WorldCache::ID, VaultCache::ID, DvdCache::ID])
        .await
        .unwrap();
    let err = session
        .ledger()
        .borrow(10.0, &snapshot)
        .unwrap()
        .submit()
        .await
        .unwrap_err();

    assert_eq!(err.class(), ErrorClass::RemoteRejection);
    assert!(err.to_string().contains("Vault is liquidating"));
    assert!(!session.registry().is_stale(VaultCache::ID).unwrap());
}

#[tokio::test]
async fn test_ready_snapshot_surfaces_missing_state() {
    let accessor = Arc::new(MockAccessor::new());
    let session = session(accessor);
    let err = session.ready_snapshot(&[WorldCache::ID]).await.unwrap_err();
    assert_eq!(err.class(), ErrorClass::MissingRemoteState);
}

#[tokio::test]
async fn test_mock_session_is_offline() {
    let mut config = config();
    config.mock_backend = true;
    let session = Session::connect(config, None).unwrap();
    session.set_principal(Some(fixtures::principal(1))).unwrap();

    let results = session.resolve_all().await.unwrap();
    assert_eq!(results.len(), 10);
    assert!(results.iter().all(|(_, r)| r.is_ok()));

    let snapshot = session.snapshot().unwrap();
    let prepared = session.ledger().deposit_savings(1.0, &snapshot).unwrap();
    assert_eq!(
        prepared.instruction_names(),
        vec!["SavingsCreate", "SavingsDeposit"]
    );
    let err = prepared.submit().await.unwrap_err();
    assert_eq!(err.class(), ErrorClass::Transport);

    session.shutdown();
    assert!(session.registry().is_closed());
}

#[tokio::test]
async fn test_session_from_config_file() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    let contents = format!(
        r#"
program_id = "{}"
mock_backend = true
oracle_max_age_secs = 30

[rpc]
url = "http://127.0.0.1:8899"
request_timeout_ms = 5000
commitment = "confirmed"

[confirmation]
poll_interval_ms = 250

[amounts]
full_repay_threshold = 0.02
full_repay_sentinel = 1000000000000.0
clamp_to_available = false
"#,
        DOVE_PROGRAM_ID.to_hex()
    );
    file.write_all(contents.as_bytes()).unwrap();

    let config = DoveConfig::from_path(file.path()).unwrap();
    let session = Session::connect(config, None).unwrap();
    assert!(session.config().mock_backend);
    assert!(!session.ledger().policy().clamp_to_available);
    assert!(session.registry().config().mock);
}
