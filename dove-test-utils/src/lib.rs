//! Dove Test Utilities
//!
//! Shared test infrastructure for the Dove workspace:
//! - `MockAccessor`, an in-memory remote with read counters and scripted
//!   submission outcomes
//! - `RecordingInvalidator`
//! - Proptest generators
//! - Fixtures for protocol records
//! - Assertions on the error taxonomy

pub use dove_core::{
    AccessorError, AccountKey, AccountMeta, AccountRecord, CacheId, ConfirmationHandle,
    DoveError, DoveResult, ErrorClass, Invalidator, Principal, RemoteAccessor, Submission,
    SubmissionStatus,
};

use async_trait::async_trait;
use std::collections::{BTreeSet, HashMap, VecDeque};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::watch;

/// Blocks a submission stays valid for after it is accepted.
pub const DEFAULT_VALIDITY_WINDOW: u64 = 150;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

// ============================================================================
// MOCK ACCESSOR
// ============================================================================

/// What happens to the next submission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubmitOutcome {
    /// Accepted, then confirmed on the first status poll.
    Confirm,
    /// Rejected at submission time with this raw message.
    Reject(String),
    /// Accepted, then reported failed by the status poll.
    FailOnChain(String),
    /// Accepted, then pending forever.
    NeverConfirm,
}

#[derive(Debug, Default)]
struct MockState {
    accounts: HashMap<AccountKey, AccountMeta>,
    reads: HashMap<AccountKey, usize>,
    total_reads: usize,
    read_failures: HashMap<AccountKey, AccessorError>,
    read_delay: Option<Duration>,
    height: u64,
    height_step: u64,
    validity_window: u64,
    outcomes: VecDeque<SubmitOutcome>,
    pending: HashMap<String, SubmitOutcome>,
    submissions: Vec<Submission>,
    status_polls: usize,
}

/// In-memory remote system.
#[derive(Debug)]
pub struct MockAccessor {
    state: Mutex<MockState>,
    paused: watch::Sender<bool>,
}

impl Default for MockAccessor {
    fn default() -> Self {
        Self::new()
    }
}

impl MockAccessor {
    pub fn new() -> Self {
        let (paused, _) = watch::channel(false);
        Self {
            state: Mutex::new(MockState {
                validity_window: DEFAULT_VALIDITY_WINDOW,
                ..MockState::default()
            }),
            paused,
        }
    }

    pub fn set_account(&self, key: AccountKey, data: Vec<u8>, owner: AccountKey, lamports: u64) {
        lock(&self.state).accounts.insert(
            key,
            AccountMeta {
                data,
                owner,
                lamports,
            },
        );
    }

    /// Store an encoded record at `key`.
    pub fn set_record<R: AccountRecord>(&self, key: AccountKey, record: &R) {
        let data = match record.to_bytes() {
            Ok(data) => data,
            Err(err) => panic!("fixture record failed to encode: {err}"),
        };
        self.set_account(key, data, dove_core::DOVE_PROGRAM_ID, 1);
    }

    /// Set the native balance of a wallet account.
    pub fn set_lamports(&self, key: AccountKey, lamports: u64) {
        let mut state = lock(&self.state);
        let entry = state.accounts.entry(key).or_insert_with(|| AccountMeta {
            data: Vec::new(),
            owner: dove_core::SYSTEM_PROGRAM_ID,
            lamports: 0,
        });
        entry.lamports = lamports;
    }

    pub fn remove_account(&self, key: &AccountKey) {
        lock(&self.state).accounts.remove(key);
    }

    /// Make reads of `key` fail with `error`.
    pub fn fail_reads(&self, key: AccountKey, error: AccessorError) {
        lock(&self.state).read_failures.insert(key, error);
    }

    pub fn clear_read_failures(&self) {
        lock(&self.state).read_failures.clear();
    }

    /// Delay every read, so concurrent callers overlap.
    pub fn set_read_delay(&self, delay: Duration) {
        lock(&self.state).read_delay = Some(delay);
    }

    /// Hold every read until `resume_reads`. Reads are counted before they block.
    pub fn pause_reads(&self) {
        self.paused.send_replace(true);
    }

    pub fn resume_reads(&self) {
        self.paused.send_replace(false);
    }

    pub fn read_count(&self, key: &AccountKey) -> usize {
        lock(&self.state).reads.get(key).copied().unwrap_or(0)
    }

    pub fn total_reads(&self) -> usize {
        lock(&self.state).total_reads
    }

    pub fn reset_read_counts(&self) {
        let mut state = lock(&self.state);
        state.reads.clear();
        state.total_reads = 0;
    }

    pub fn set_height(&self, height: u64) {
        lock(&self.state).height = height;
    }

    /// Advance the height by `step` every time it is read.
    pub fn advance_height_per_poll(&self, step: u64) {
        lock(&self.state).height_step = step;
    }

    pub fn set_validity_window(&self, blocks: u64) {
        lock(&self.state).validity_window = blocks;
    }

    /// Queue the outcome of the next submission. Unqueued submissions confirm.
    pub fn push_outcome(&self, outcome: SubmitOutcome) {
        lock(&self.state).outcomes.push_back(outcome);
    }

    pub fn submissions(&self) -> Vec<Submission> {
        lock(&self.state).submissions.clone()
    }

    pub fn status_polls(&self) -> usize {
        lock(&self.state).status_polls
    }
}

#[async_trait]
impl RemoteAccessor for MockAccessor {
    async fn read_meta(&self, key: &AccountKey) -> DoveResult<Option<AccountMeta>> {
        let delay = {
            let mut state = lock(&self.state);
            *state.reads.entry(*key).or_insert(0) += 1;
            state.total_reads += 1;
            state.read_delay
        };
        let mut paused = self.paused.subscribe();
        let released = paused.wait_for(|p| !*p).await.map(|_| ());
        if released.is_err() {
            return Err(AccessorError::Transport {
                reason: "mock accessor dropped".to_string(),
            }
            .into());
        }
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        let state = lock(&self.state);
        if let Some(err) = state.read_failures.get(key) {
            return Err(err.clone().into());
        }
        Ok(state.accounts.get(key).cloned())
    }

    async fn submit(&self, submission: &Submission) -> DoveResult<ConfirmationHandle> {
        let mut state = lock(&self.state);
        state.submissions.push(submission.clone());
        let outcome = state.outcomes.pop_front().unwrap_or(SubmitOutcome::Confirm);
        if let SubmitOutcome::Reject(message) = outcome {
            return Err(AccessorError::Rejected { message }.into());
        }
        let signature = format!("mock-signature-{}", state.submissions.len());
        state.pending.insert(signature.clone(), outcome);
        Ok(ConfirmationHandle {
            signature,
            last_valid_height: state.height + state.validity_window,
        })
    }

    async fn status(&self, handle: &ConfirmationHandle) -> DoveResult<SubmissionStatus> {
        let mut state = lock(&self.state);
        state.status_polls += 1;
        match state.pending.get(&handle.signature) {
            Some(SubmitOutcome::Confirm) => Ok(SubmissionStatus::Confirmed),
            Some(SubmitOutcome::FailOnChain(reason)) => Ok(SubmissionStatus::Failed {
                reason: reason.clone(),
            }),
            Some(SubmitOutcome::NeverConfirm) | Some(SubmitOutcome::Reject(_)) | None => {
                Ok(SubmissionStatus::Pending)
            }
        }
    }

    async fn block_height(&self) -> DoveResult<u64> {
        let mut state = lock(&self.state);
        let height = state.height;
        state.height += state.height_step;
        Ok(height)
    }
}

// ============================================================================
// RECORDING INVALIDATOR
// ============================================================================

/// Invalidator that only records what it was asked to invalidate.
#[derive(Debug, Default)]
pub struct RecordingInvalidator {
    calls: Mutex<Vec<Vec<CacheId>>>,
}

impl RecordingInvalidator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn calls(&self) -> Vec<Vec<CacheId>> {
        lock(&self.calls).clone()
    }

    /// Union of every invalidated type.
    pub fn invalidated(&self) -> BTreeSet<CacheId> {
        lock(&self.calls).iter().flatten().copied().collect()
    }
}

impl Invalidator for RecordingInvalidator {
    fn invalidate(&self, caches: &[CacheId]) {
        lock(&self.calls).push(caches.to_vec());
    }
}

// ============================================================================
// PROPTEST GENERATORS
// ============================================================================

pub mod generators {
    //! Proptest strategies for Dove types.

    use dove_core::{AccountKey, Principal, Reserve};
    use proptest::prelude::*;

    pub fn arb_account_key() -> impl Strategy<Value = AccountKey> {
        any::<[u8; 32]>().prop_map(AccountKey::new)
    }

    pub fn arb_principal() -> impl Strategy<Value = Principal> {
        arb_account_key().prop_map(Principal::new)
    }

    /// Token amount, zero included.
    pub fn arb_amount() -> impl Strategy<Value = f64> {
        prop_oneof![Just(0.0), 0.01f64..1e7]
    }

    /// Strictly positive token amount.
    pub fn arb_positive_amount() -> impl Strategy<Value = f64> {
        0.01f64..1e7
    }

    pub fn arb_reserve() -> impl Strategy<Value = Reserve> {
        (arb_account_key(), 0.0f64..1e6, arb_account_key()).prop_map(
            |(mint, deposited, oracle)| Reserve {
                mint,
                deposited,
                oracle,
            },
        )
    }
}

// ============================================================================
// FIXTURES
// ============================================================================

pub mod fixtures {
    //! Protocol records and a seeded mock remote.

    use super::MockAccessor;
    use dove_core::protocol::{
        AuctionConfig, FlashMintConfig, OfferingConfig, OfferingState, StableDvd, VaultConfig,
        VestingState,
    };
    use dove_core::{
        associated_token_address, AccountKey, Asset, Book, BookConfig, Collateral, Oracle,
        OracleKind, PriceFeed, Principal, ProtocolConfig, Reserve, Savings, Schedule, Stability,
        Stablecoin, TokenAccount, TokenInfo, Vault, World, DOVE_PROGRAM_ID,
    };

    pub const DVD_MINT: AccountKey = AccountKey::from_hex_const(
        "28bda4b69282c610aaf6eb3971ecd86321933c4f59486df8b0d26156bbbf9110",
    );
    pub const DOVE_MINT: AccountKey = AccountKey::from_hex_const(
        "d854ee35642e46cb6b950864694a83d9fb7b75acf340171ab769c3e58ebc1ce3",
    );
    pub const DOVE_ORACLE: AccountKey = AccountKey::new([0xd0; 32]);

    /// Deterministic principal number `n`.
    pub fn principal(n: u8) -> Principal {
        Principal::new(AccountKey::new([n; 32]))
    }

    pub fn protocol_config() -> ProtocolConfig {
        let schedule = Schedule {
            maximum: 857.142_857,
            warmup_length: 30.0,
            distribution_length: 365.0,
        };
        ProtocolConfig {
            max_ltv: 0.8,
            dvd_interest_apy: 0.07,
            dove_oracle: Oracle {
                kind: OracleKind::UserFeed,
                key: DOVE_ORACLE,
            },
            auction: AuctionConfig {
                begin_scale: 1.5,
                decay_rate: 0.9995,
                end_scale: 0.15,
            },
            debt: BookConfig {
                interest_apy: 0.01,
                reward_schedule: schedule,
            },
            flash_mint: FlashMintConfig {
                fee: 0.0005,
                limit: 0.0,
            },
            offering: OfferingConfig {
                surplus_limit: 100_000.0,
                deficit_limit: 100_000.0,
                dvd_offering_size: 50_000.0,
                dove_offering_size: 10_000.0,
            },
            savings: BookConfig {
                interest_apy: 0.0,
                reward_schedule: schedule,
            },
            vault: VaultConfig {
                liquidation_penalty_rate: 0.05,
                liquidation_reward_cap: 1_000.0,
                liquidation_reward_rate: 0.025,
                auction_failure_reward_cap: 1_000.0,
                auction_failure_reward_rate: 0.005,
            },
        }
    }

    /// World with 10k DVD of debt and 4k of savings, created at `now`.
    pub fn world(now: i64) -> World {
        let config = protocol_config();
        World {
            authority: principal(200).key(),
            dvd: TokenInfo {
                mint: DVD_MINT,
                supply: 9_000.0,
            },
            dove: TokenInfo {
                mint: DOVE_MINT,
                supply: 50_000.0,
            },
            stable_dvd: StableDvd { circulating: 2_000.0 },
            debt: Book {
                total: 10_000.0,
                last_update: now,
                creation_time: now,
                reward_schedule: config.debt.reward_schedule,
            },
            savings: Book {
                total: 4_000.0,
                last_update: now,
                creation_time: now,
                reward_schedule: config.savings.reward_schedule,
            },
            config,
            offering: OfferingState {
                active: false,
                started_at: 0,
                filled: 0.0,
            },
            vesting: VestingState {
                recipient: principal(200).key(),
                schedule: Schedule::zero(),
                start_time: now,
                claimed: 0.0,
            },
        }
    }

    pub fn price_feed(price: f64, publish_time: i64) -> PriceFeed {
        PriceFeed {
            price,
            publish_time,
        }
    }

    pub fn collateral(asset: &Asset, deposited: f64) -> Collateral {
        Collateral {
            mint: asset.mint,
            deposited,
            decimals: 9,
            max_deposit: 1_000_000.0,
            oracle: Oracle {
                kind: OracleKind::Pyth,
                key: asset.pyth_oracle,
            },
        }
    }

    pub fn vault(owner: Principal, debt: f64, reserves: Vec<Reserve>) -> Vault {
        Vault {
            owner: owner.key(),
            debt,
            reserves,
            auction: None,
            pending_rewards: 0.0,
        }
    }

    pub fn reserve(asset: &Asset, deposited: f64) -> Reserve {
        Reserve {
            mint: asset.mint,
            deposited,
            oracle: asset.pyth_oracle,
        }
    }

    /// Seed the world, its DOVE oracle, and SOL collateral priced at 100.
    pub fn seed_protocol(accessor: &MockAccessor, now: i64) {
        accessor.set_record(World::derive_key(&DOVE_PROGRAM_ID), &world(now));
        accessor.set_record(DOVE_ORACLE, &price_feed(2.5, now));
        seed_collateral(accessor, &Asset::SOL, 100.0, now);
    }

    /// Register `asset` as collateral with an oracle price.
    pub fn seed_collateral(accessor: &MockAccessor, asset: &Asset, price: f64, now: i64) {
        accessor.set_record(
            Collateral::derive_key(&DOVE_PROGRAM_ID, &asset.mint),
            &collateral(asset, 50_000.0),
        );
        accessor.set_record(asset.pyth_oracle, &price_feed(price, now));
    }

    pub fn seed_stability(accessor: &MockAccessor, coin: &Stablecoin, deposited: f64) {
        accessor.set_record(
            Stability::derive_key(&DOVE_PROGRAM_ID, &coin.mint),
            &Stability {
                mint: coin.mint,
                deposited,
                max_deposit: 1_000_000.0,
            },
        );
    }

    pub fn seed_vault(accessor: &MockAccessor, owner: Principal, vault: &Vault) {
        accessor.set_record(Vault::derive_key(&DOVE_PROGRAM_ID, &owner.key()), vault);
    }

    pub fn seed_savings(accessor: &MockAccessor, owner: Principal, deposited: f64) {
        accessor.set_record(
            Savings::derive_key(&DOVE_PROGRAM_ID, &owner.key()),
            &Savings {
                owner: owner.key(),
                deposited,
                pending_rewards: 0.0,
            },
        );
    }

    pub fn seed_token_balance(
        accessor: &MockAccessor,
        owner: Principal,
        mint: AccountKey,
        amount: f64,
    ) {
        accessor.set_record(
            associated_token_address(&owner.key(), &mint),
            &TokenAccount {
                mint,
                owner: owner.key(),
                amount,
            },
        );
    }
}

// ============================================================================
// ASSERTIONS
// ============================================================================

pub mod assertions {
    //! Assertions on the error taxonomy.

    use dove_core::{DoveResult, ErrorClass};

    /// Assert that a result is an error of the given class.
    pub fn assert_class<T: std::fmt::Debug>(result: &DoveResult<T>, class: ErrorClass) {
        match result {
            Err(err) => assert_eq!(err.class(), class, "unexpected error class for {err}"),
            Ok(value) => panic!("Expected {class:?} error, got Ok({value:?})"),
        }
    }

    /// Poll `condition` until it holds or two seconds pass.
    pub async fn eventually<F: FnMut() -> bool>(mut condition: F) -> bool {
        let deadline = tokio::time::Instant::now() + std::time::Duration::from_secs(2);
        loop {
            if condition() {
                return true;
            }
            if tokio::time::Instant::now() >= deadline {
                return false;
            }
            tokio::time::sleep(std::time::Duration::from_millis(2)).await;
        }
    }
}
