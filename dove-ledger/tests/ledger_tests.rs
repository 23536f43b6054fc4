//! Action composition and submission against a mock remote.

use dove_cache::caches::{
    AssetBalance, AssetBalances, AssetCache, CollateralInfo, CollateralMap, DoveCache, DvdCache,
    SavingsCache, SavingsView, TokenBalance, VaultCache, VaultView, WorldCache, WorldView,
};
use dove_cache::{CacheType, Snapshot};
use dove_core::{
    associated_token_address, AccountKey, Asset, CacheId, DoveError, ErrorClass, Instruction,
    LedgerError, OraclePrice, Principal, Savings, StepPhase, MAX_LTV, NATIVE_MINT,
};
use dove_ledger::{ActionKind, CollateralOracle, FlashMintLeg, Ledger, RewardStore};
use dove_test_utils::assertions::assert_class;
use dove_test_utils::{fixtures, MockAccessor, RecordingInvalidator, SubmitOutcome};
use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;

// ============================================================================
// SETUP
// ============================================================================

const NOW: i64 = 1_700_000_000;

struct Harness {
    accessor: Arc<MockAccessor>,
    invalidator: Arc<RecordingInvalidator>,
    ledger: Ledger,
}

fn harness() -> Harness {
    let accessor = Arc::new(MockAccessor::new());
    let invalidator = Arc::new(RecordingInvalidator::new());
    let ledger = Ledger::new(accessor.clone(), invalidator.clone())
        .with_poll_interval(Duration::from_millis(1));
    Harness {
        accessor,
        invalidator,
        ledger,
    }
}

fn owner() -> Principal {
    fixtures::principal(1)
}

fn world_view() -> WorldView {
    WorldView::new(
        fixtures::world(NOW),
        OraclePrice {
            price: 2.5,
            is_stale: false,
        },
        NOW,
    )
}

fn sol_collateral() -> CollateralMap {
    let mut map = CollateralMap::default();
    map.insert(CollateralInfo {
        asset: Asset::SOL,
        deposited: 50_000.0,
        decimals: 9,
        price: 100.0,
        is_price_stale: false,
        max_deposit: 1_000_000.0,
        oracle_key: Asset::SOL.pyth_oracle,
    });
    map
}

/// Vault holding `sol` SOL at price 100 with `debt` DVD borrowed.
fn vault_view(debt: f64, sol: f64) -> VaultView {
    let vault = fixtures::vault(owner(), debt, vec![fixtures::reserve(&Asset::SOL, sol)]);
    VaultView::new(vault, &sol_collateral(), MAX_LTV)
}

fn token(mint: AccountKey, balance: Option<f64>) -> TokenBalance {
    TokenBalance {
        mint,
        account: associated_token_address(&owner().key(), &mint),
        has_token_account: balance.is_some(),
        balance: balance.unwrap_or(0.0),
    }
}

fn wallet(sol_wrapped: bool) -> AssetBalances {
    let mut balances = AssetBalances::default();
    for asset in Asset::LIST {
        balances.insert(AssetBalance {
            asset,
            has_token_account: !asset.is_native || sol_wrapped,
            balance: 100.0,
        });
    }
    balances
}

/// Snapshot of a connected principal with a vault (debt 100, 10 SOL) and no
/// DVD token account.
fn snapshot() -> Snapshot {
    Snapshot::new()
        .with_principal(Some(owner()))
        .with::<WorldCache>(world_view())
        .with::<VaultCache>(vault_view(100.0, 10.0))
        .with::<DvdCache>(token(fixtures::DVD_MINT, None))
        .with::<DoveCache>(token(fixtures::DOVE_MINT, None))
        .with::<AssetCache>(wallet(false))
}

fn set(ids: &[CacheId]) -> BTreeSet<CacheId> {
    ids.iter().copied().collect()
}

// ============================================================================
// BORROW AND REPAY
// ============================================================================

#[tokio::test]
async fn test_borrow_clamps_to_capacity_and_invalidates() {
    let h = harness();
    let prepared = h.ledger.borrow(750.0, &snapshot()).unwrap();
    assert_eq!(
        prepared.instruction_names(),
        vec!["CreateAssociatedTokenAccount", "VaultBorrow"]
    );

    let receipt = prepared.submit().await.unwrap();

    let submissions = h.accessor.submissions();
    assert_eq!(submissions.len(), 1);
    match &submissions[0].steps[1].instruction {
        Instruction::VaultBorrow {
            amount,
            reserve_mints,
            dvd_mint,
            ..
        } => {
            assert_eq!(*amount, 700.0);
            assert_eq!(reserve_mints, &vec![NATIVE_MINT]);
            assert_eq!(*dvd_mint, fixtures::DVD_MINT);
        }
        other => panic!("expected VaultBorrow, got {other:?}"),
    }
    let expected = set(&[DvdCache::ID, VaultCache::ID, WorldCache::ID]);
    assert_eq!(h.invalidator.invalidated(), expected);
    assert_eq!(h.invalidator.calls().len(), 1);
    assert_eq!(receipt.action, ActionKind::Borrow);
    assert_eq!(receipt.invalidated.iter().copied().collect::<BTreeSet<_>>(), expected);
    assert!(receipt.signature.is_some());
}

#[tokio::test]
async fn test_borrow_with_existing_dvd_account_skips_precondition() {
    let h = harness();
    let snapshot = snapshot().with::<DvdCache>(token(fixtures::DVD_MINT, Some(5.0)));
    let prepared = h.ledger.borrow(10.0, &snapshot).unwrap();
    assert_eq!(prepared.instruction_names(), vec!["VaultBorrow"]);
}

#[test]
fn test_borrow_without_capacity_is_invalid() {
    let h = harness();
    let snapshot = snapshot().with::<VaultCache>(vault_view(800.0, 10.0));
    let result = h.ledger.borrow(10.0, &snapshot);
    assert!(matches!(
        result,
        Err(DoveError::Ledger(LedgerError::InvalidAmount { .. }))
    ));
}

#[test]
fn test_borrow_without_vault_is_missing_state() {
    let h = harness();
    let snapshot = snapshot().with::<VaultCache>(VaultView::empty(MAX_LTV));
    assert_class(&h.ledger.borrow(10.0, &snapshot), ErrorClass::MissingRemoteState);
}

#[tokio::test]
async fn test_repay_near_full_debt_repays_everything() {
    let h = harness();
    let snapshot = snapshot().with::<DvdCache>(token(fixtures::DVD_MINT, Some(150.0)));
    h.ledger.repay(99.99, &snapshot).unwrap().submit().await.unwrap();
    match &h.accessor.submissions()[0].steps[0].instruction {
        Instruction::VaultRepay { amount, .. } => assert_eq!(*amount, 150.0),
        other => panic!("expected VaultRepay, got {other:?}"),
    }
}

#[test]
fn test_repay_partial_is_capped_at_balance() {
    let h = harness();
    let snapshot = snapshot().with::<DvdCache>(token(fixtures::DVD_MINT, Some(30.0)));
    let prepared = h.ledger.repay(50.0, &snapshot).unwrap();
    match &prepared.steps()[0].instruction {
        Instruction::VaultRepay { amount, .. } => assert_eq!(*amount, 30.0),
        other => panic!("expected VaultRepay, got {other:?}"),
    }
}

#[test]
fn test_repay_requires_dvd_account() {
    let h = harness();
    let result = h.ledger.repay(50.0, &snapshot());
    assert_class(&result, ErrorClass::MissingRemoteState);
}

#[test]
fn test_repay_without_debt_is_noop() {
    let h = harness();
    let snapshot = snapshot()
        .with::<VaultCache>(vault_view(0.0, 10.0))
        .with::<DvdCache>(token(fixtures::DVD_MINT, Some(30.0)));
    assert!(h.ledger.repay(50.0, &snapshot).unwrap().is_noop());
}

// ============================================================================
// COLLATERAL
// ============================================================================

#[test]
fn test_native_deposit_without_vault_orders_steps() {
    let h = harness();
    let snapshot = snapshot().with::<VaultCache>(VaultView::empty(MAX_LTV));
    let prepared = h.ledger.deposit_collateral(&Asset::SOL, 2.5, &snapshot).unwrap();

    assert_eq!(
        prepared.instruction_names(),
        vec![
            "CreateAssociatedTokenAccount",
            "SystemTransfer",
            "SyncNative",
            "VaultCreate",
            "VaultCreateReserve",
            "VaultDeposit",
            "CloseAccount",
        ]
    );
    let phases: Vec<StepPhase> = prepared.steps().iter().map(|s| s.phase).collect();
    let mut sorted = phases.clone();
    sorted.sort();
    assert_eq!(phases, sorted);
    assert_eq!(phases.last(), Some(&StepPhase::Cleanup));
    match &prepared.steps()[1].instruction {
        Instruction::SystemTransfer { lamports, to, .. } => {
            assert_eq!(*lamports, 2_500_000_000);
            assert_eq!(*to, associated_token_address(&owner().key(), &NATIVE_MINT));
        }
        other => panic!("expected SystemTransfer, got {other:?}"),
    }
}

#[test]
fn test_deposit_into_existing_reserve_is_single_step() {
    let h = harness();
    let snapshot = snapshot().with::<AssetCache>(wallet(true));
    let prepared = h.ledger.deposit_collateral(&Asset::SOL, 1.0, &snapshot).unwrap();
    assert_eq!(prepared.instruction_names(), vec!["VaultDeposit"]);
}

#[test]
fn test_deposit_new_asset_creates_reserve() {
    let h = harness();
    let prepared = h.ledger.deposit_collateral(&Asset::HNT, 4.0, &snapshot()).unwrap();
    assert_eq!(
        prepared.instruction_names(),
        vec!["VaultCreateReserve", "VaultDeposit"]
    );
}

#[test]
fn test_native_withdraw_unwraps() {
    let h = harness();
    let prepared = h.ledger.withdraw_collateral(&Asset::SOL, 1.0, &snapshot()).unwrap();
    assert_eq!(
        prepared.instruction_names(),
        vec!["CreateAssociatedTokenAccount", "VaultWithdraw", "CloseAccount"]
    );
}

#[test]
fn test_withdraw_unknown_reserve_fails() {
    let h = harness();
    let result = h.ledger.withdraw_collateral(&Asset::JUP, 1.0, &snapshot());
    assert!(matches!(
        result,
        Err(DoveError::Ledger(LedgerError::MissingState { what })) if what == "Asset not in vault"
    ));
}

#[test]
fn test_buy_native_collateral_wraps_and_closes() {
    let h = harness();
    let prepared = h.ledger.buy_collateral(20.0, 0, &snapshot()).unwrap();
    assert_eq!(
        prepared.instruction_names(),
        vec![
            "CreateAssociatedTokenAccount",
            "CreateAssociatedTokenAccount",
            "VaultBuyCollateral",
            "CloseAccount"
        ]
    );
    assert!(h.ledger.buy_collateral(20.0, 4, &snapshot()).is_err());
}

#[test]
fn test_buy_native_collateral_needs_wallet_balances() {
    let h = harness();
    let snapshot = Snapshot::new()
        .with_principal(Some(owner()))
        .with::<WorldCache>(world_view())
        .with::<VaultCache>(vault_view(100.0, 10.0))
        .with::<DvdCache>(token(fixtures::DVD_MINT, Some(5.0)));
    assert_eq!(
        h.ledger.buy_collateral(20.0, 0, &snapshot).unwrap_err(),
        DoveError::from(LedgerError::NotReady {
            cache: AssetCache::ID
        })
    );
    assert!(h.accessor.submissions().is_empty());
}

// ============================================================================
// SAVINGS AND REWARDS
// ============================================================================

#[test]
fn test_savings_deposit_creates_account_once() {
    let h = harness();
    let without = snapshot().with::<SavingsCache>(SavingsView::EMPTY);
    let prepared = h.ledger.deposit_savings(10.0, &without).unwrap();
    assert_eq!(
        prepared.instruction_names(),
        vec!["SavingsCreate", "SavingsDeposit"]
    );
    assert_eq!(
        ActionKind::DepositSavings.invalidates(),
        vec![SavingsCache::ID, DvdCache::ID, WorldCache::ID]
    );
}

#[test]
fn test_savings_withdraw_clamps_to_deposit() {
    let h = harness();
    let snapshot = snapshot().with::<SavingsCache>(SavingsView {
        savings: Some(Savings {
            owner: owner().key(),
            deposited: 40.0,
            pending_rewards: 0.0,
        }),
        share: 0.01,
    });
    let prepared = h.ledger.withdraw_savings(100.0, &snapshot).unwrap();
    match &prepared.steps()[0].instruction {
        Instruction::SavingsWithdraw { amount, .. } => assert_eq!(*amount, 40.0),
        other => panic!("expected SavingsWithdraw, got {other:?}"),
    }
    let none = snapshot_without_savings();
    assert_class(&h.ledger.withdraw_savings(1.0, &none), ErrorClass::MissingRemoteState);
}

fn snapshot_without_savings() -> Snapshot {
    snapshot().with::<SavingsCache>(SavingsView::EMPTY)
}

#[tokio::test]
async fn test_claim_savings_rewards_invalidates_savings() {
    let h = harness();
    let prepared = h.ledger.claim_rewards(RewardStore::Savings, &snapshot()).unwrap();
    assert_eq!(
        prepared.instruction_names(),
        vec!["CreateAssociatedTokenAccount", "SavingsClaimRewards"]
    );
    prepared.submit().await.unwrap();
    assert_eq!(
        h.invalidator.invalidated(),
        set(&[SavingsCache::ID, WorldCache::ID, DoveCache::ID])
    );
}

// ============================================================================
// OFFERINGS, FLASH MINTS, ADMIN
// ============================================================================

#[test]
fn test_buy_offering_clamps_to_dvd_balance() {
    let h = harness();
    let snapshot = snapshot().with::<DvdCache>(token(fixtures::DVD_MINT, Some(12.0)));
    let prepared = h.ledger.buy_offering(50.0, &snapshot).unwrap();
    assert_eq!(
        prepared.instruction_names(),
        vec!["CreateAssociatedTokenAccount", "OfferingBuy"]
    );
    match &prepared.steps()[1].instruction {
        Instruction::OfferingBuy { amount, .. } => assert_eq!(*amount, 12.0),
        other => panic!("expected OfferingBuy, got {other:?}"),
    }
}

#[test]
fn test_flash_mint_legs() {
    let h = harness();
    let both = h.ledger.flash_mint(100.0, FlashMintLeg::Both, &snapshot()).unwrap();
    assert_eq!(
        both.instruction_names(),
        vec!["CreateAssociatedTokenAccount", "FlashMintBegin", "FlashMintEnd"]
    );
    let end = h.ledger.flash_mint(0.0, FlashMintLeg::End, &snapshot()).unwrap();
    assert_eq!(
        end.instruction_names(),
        vec!["CreateAssociatedTokenAccount", "FlashMintEnd"]
    );
    let end = h
        .ledger
        .flash_mint(f64::NAN, FlashMintLeg::End, &snapshot())
        .unwrap();
    assert_eq!(end.instruction_names().last(), Some(&"FlashMintEnd"));
    assert_class(
        &h.ledger.flash_mint(f64::NAN, FlashMintLeg::Begin, &snapshot()),
        ErrorClass::Invalid,
    );
    assert!(h
        .ledger
        .flash_mint(0.0, FlashMintLeg::Begin, &snapshot())
        .unwrap()
        .is_noop());
}

#[test]
fn test_create_collateral_with_user_feed() {
    let h = harness();
    let mint = AccountKey::new([42u8; 32]);
    let prepared = h
        .ledger
        .create_collateral(
            mint,
            CollateralOracle::UserFeed {
                index: 3,
                initial_price: 1.5,
            },
            10_000.0,
            &snapshot(),
        )
        .unwrap();
    assert_eq!(
        prepared.instruction_names(),
        vec![
            "CollateralCreate",
            "CollateralUpdateMaxDeposit",
            "UserFeedCreate",
            "UserFeedSetPrice",
            "CollateralSetOracle"
        ]
    );
    assert_eq!(
        ActionKind::CreateCollateral.invalidates(),
        vec![dove_cache::caches::CollateralCache::ID, AssetCache::ID]
    );
}

#[test]
fn test_admin_values_are_validated() {
    let h = harness();
    assert!(h.ledger.set_collateral_price(0, 0.0, &snapshot()).is_err());
    assert!(h
        .ledger
        .set_collateral_max_deposit(&Asset::SOL, f64::NAN, &snapshot())
        .is_err());
    assert!(h
        .ledger
        .set_collateral_max_deposit(&Asset::SOL, 0.0, &snapshot())
        .is_ok());
}

// ============================================================================
// FAIL-FAST AND NO-OPS
// ============================================================================

#[test]
fn test_missing_cache_is_not_ready() {
    let h = harness();
    let snapshot = Snapshot::new()
        .with_principal(Some(owner()))
        .with::<WorldCache>(world_view())
        .with::<DvdCache>(token(fixtures::DVD_MINT, None));
    let result = h.ledger.borrow(10.0, &snapshot);
    assert_eq!(
        result.unwrap_err(),
        DoveError::from(LedgerError::NotReady {
            cache: VaultCache::ID
        })
    );
    assert!(h.accessor.submissions().is_empty());
}

#[test]
fn test_no_principal_is_not_connected() {
    let h = harness();
    let snapshot = snapshot().with_principal(None);
    assert_eq!(
        h.ledger.borrow(10.0, &snapshot).unwrap_err(),
        DoveError::from(LedgerError::NotConnected)
    );
    assert!(h.ledger.end_offering(&snapshot).is_err());
}

#[tokio::test]
async fn test_zero_amount_is_noop_without_io() {
    let h = harness();
    let prepared = h.ledger.borrow(0.0, &snapshot()).unwrap();
    assert!(prepared.is_noop());
    let receipt = prepared.submit().await.unwrap();
    assert!(receipt.is_noop());
    assert!(receipt.invalidated.is_empty());
    assert!(h.accessor.submissions().is_empty());
    assert_eq!(h.accessor.status_polls(), 0);
    assert!(h.invalidator.calls().is_empty());
}

// ============================================================================
// SUBMISSION OUTCOMES
// ============================================================================

#[tokio::test]
async fn test_rejection_reason_is_extracted_and_nothing_invalidated() {
    let h = harness();
    h.accessor.push_outcome(SubmitOutcome::Reject(
        r#"["Program log: Instruction: VaultBorrow", "Program log: Error: ltv exceeded"]"#
            .to_string(),
    ));
    let err = h
        .ledger
        .borrow(10.0, &snapshot())
        .unwrap()
        .submit()
        .await
        .unwrap_err();
    assert_eq!(
        err,
        DoveError::from(LedgerError::Rejected {
            reason: "VaultBorrow failed: Ltv exceeded".to_string()
        })
    );
    assert_eq!(err.class(), ErrorClass::RemoteRejection);
    assert!(h.invalidator.calls().is_empty());
}

#[tokio::test]
async fn test_on_chain_failure_is_rejection() {
    let h = harness();
    h.accessor.push_outcome(SubmitOutcome::FailOnChain(
        "panicked at src/savings.rs:88:5: withdraw exceeds deposit".to_string(),
    ));
    let err = h
        .ledger
        .end_offering(&snapshot())
        .unwrap()
        .submit()
        .await
        .unwrap_err();
    assert_eq!(
        err,
        DoveError::from(LedgerError::Rejected {
            reason: "Reverted: withdraw exceeds deposit (src/savings.rs, line 88, col 5)"
                .to_string()
        })
    );
    assert!(h.invalidator.calls().is_empty());
}

#[tokio::test]
async fn test_unconfirmed_submission_expires() {
    let h = harness();
    h.accessor.push_outcome(SubmitOutcome::NeverConfirm);
    h.accessor.advance_height_per_poll(50);
    let result = tokio::time::timeout(
        Duration::from_secs(2),
        h.ledger.start_offering(&snapshot()).unwrap().submit(),
    )
    .await
    .expect("confirmation polling is bounded");
    assert_class(&result, ErrorClass::Expiry);
    assert!(h.invalidator.calls().is_empty());
    assert!(h.accessor.status_polls() >= 1);
}
