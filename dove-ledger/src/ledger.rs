//! The ledger: composes protocol actions over a snapshot of cached state and
//! submits them.
//!
//! Composing never performs I/O. Every action reads what it needs from a
//! [`Snapshot`], returns a [`PreparedAction`], and only
//! [`PreparedAction::submit`] talks to the remote system. A confirmed
//! submission invalidates exactly the action's declared cache types.

use crate::plan::{ActionKind, Plan};
use crate::policy;
use crate::rejection::extract_reason;
use dove_cache::caches::{
    AssetCache, DoveCache, DvdCache, SavingsCache, StablecoinCache, VaultCache, WorldCache,
};
use dove_cache::Snapshot;
use dove_core::{
    associated_token_address, sol_to_lamports, user_feed_key, AccessorError, AccountKey,
    AmountPolicy, Asset, CacheId, DoveConfig, DoveError, DoveResult, Instruction, Invalidator,
    LedgerError, Oracle, OracleKind, Principal, ProtocolConfig, RemoteAccessor, Stablecoin, Step,
    Submission, Vault, DOVE_PROGRAM_ID,
};
use serde::Serialize;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

// ============================================================================
// PARAMETERS
// ============================================================================

/// Which book a reward claim draws from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RewardStore {
    Vault,
    Savings,
}

/// Which half of a flash mint to include in the submission.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlashMintLeg {
    Begin,
    End,
    Both,
}

impl FlashMintLeg {
    fn begins(&self) -> bool {
        matches!(self, FlashMintLeg::Begin | FlashMintLeg::Both)
    }

    fn ends(&self) -> bool {
        matches!(self, FlashMintLeg::End | FlashMintLeg::Both)
    }
}

/// Price source for a new collateral type.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum CollateralOracle {
    Pyth(AccountKey),
    /// Create an authority-managed feed at `index` seeded with `initial_price`.
    UserFeed { index: u8, initial_price: f64 },
}

// ============================================================================
// RECEIPTS AND PREPARED ACTIONS
// ============================================================================

/// Outcome of a submitted action.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Receipt {
    pub action: ActionKind,
    /// `None` for a no-op.
    pub submission_id: Option<Uuid>,
    pub signature: Option<String>,
    pub invalidated: Vec<CacheId>,
}

impl Receipt {
    pub fn is_noop(&self) -> bool {
        self.submission_id.is_none()
    }
}

/// A planned action, ready to submit.
pub struct PreparedAction {
    kind: ActionKind,
    submission: Option<Submission>,
    accessor: Arc<dyn RemoteAccessor>,
    invalidator: Arc<dyn Invalidator>,
    poll_interval: Duration,
}

impl PreparedAction {
    pub fn kind(&self) -> ActionKind {
        self.kind
    }

    /// True when there is nothing to submit.
    pub fn is_noop(&self) -> bool {
        self.submission.is_none()
    }

    pub fn submission(&self) -> Option<&Submission> {
        self.submission.as_ref()
    }

    pub fn steps(&self) -> &[Step] {
        self.submission
            .as_ref()
            .map(|s| s.steps.as_slice())
            .unwrap_or(&[])
    }

    pub fn instruction_names(&self) -> Vec<&'static str> {
        self.submission
            .as_ref()
            .map(Submission::instruction_names)
            .unwrap_or_default()
    }

    /// Submit, wait for confirmation, then invalidate the declared caches.
    ///
    /// Nothing is invalidated unless the submission is confirmed. A no-op
    /// returns immediately without touching the accessor.
    pub async fn submit(self) -> DoveResult<Receipt> {
        let Some(submission) = self.submission else {
            tracing::debug!(action = %self.kind, "Nothing to submit");
            return Ok(Receipt {
                action: self.kind,
                submission_id: None,
                signature: None,
                invalidated: Vec::new(),
            });
        };

        tracing::info!(
            action = %self.kind,
            submission_id = %submission.id,
            steps = submission.steps.len(),
            "Submitting action"
        );
        let handle = self
            .accessor
            .submit(&submission)
            .await
            .map_err(|e| rejected(self.kind, e))?;
        if handle.signature.is_empty() {
            return Err(LedgerError::ContractViolation {
                reason: "submit returned an empty signature".to_string(),
            }
            .into());
        }

        self.accessor
            .await_confirmation(&handle, handle.last_valid_height, self.poll_interval)
            .await
            .map_err(|e| rejected(self.kind, e))?;

        let invalidated = self.kind.invalidates();
        self.invalidator.invalidate(&invalidated);
        tracing::info!(
            action = %self.kind,
            signature = %handle.signature,
            invalidated = invalidated.len(),
            "Action confirmed"
        );
        Ok(Receipt {
            action: self.kind,
            submission_id: Some(submission.id),
            signature: Some(handle.signature),
            invalidated,
        })
    }
}

impl fmt::Debug for PreparedAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PreparedAction")
            .field("kind", &self.kind)
            .field("steps", &self.instruction_names())
            .finish()
    }
}

/// Turn rejections into readable ledger errors; everything else passes through.
fn rejected(kind: ActionKind, error: DoveError) -> DoveError {
    let raw = match &error {
        DoveError::Accessor(AccessorError::Rejected { message }) => message,
        DoveError::Accessor(AccessorError::Failed { reason }) => reason,
        _ => {
            tracing::warn!(action = %kind, error = %error, "Action failed");
            return error;
        }
    };
    let reason = extract_reason(raw);
    tracing::warn!(action = %kind, reason = %reason, "Action rejected");
    LedgerError::Rejected { reason }.into()
}

// ============================================================================
// LEDGER
// ============================================================================

#[derive(Clone)]
pub struct Ledger {
    accessor: Arc<dyn RemoteAccessor>,
    invalidator: Arc<dyn Invalidator>,
    program_id: AccountKey,
    policy: AmountPolicy,
    poll_interval: Duration,
}

impl Ledger {
    pub fn new(accessor: Arc<dyn RemoteAccessor>, invalidator: Arc<dyn Invalidator>) -> Self {
        Self {
            accessor,
            invalidator,
            program_id: DOVE_PROGRAM_ID,
            policy: AmountPolicy::default(),
            poll_interval: Duration::from_secs(1),
        }
    }

    pub fn from_config(
        accessor: Arc<dyn RemoteAccessor>,
        invalidator: Arc<dyn Invalidator>,
        config: &DoveConfig,
    ) -> Self {
        Self::new(accessor, invalidator)
            .with_program_id(config.program_id)
            .with_policy(config.amounts)
            .with_poll_interval(config.poll_interval())
    }

    pub fn with_program_id(mut self, program_id: AccountKey) -> Self {
        self.program_id = program_id;
        self
    }

    pub fn with_policy(mut self, policy: AmountPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    pub fn policy(&self) -> &AmountPolicy {
        &self.policy
    }

    fn prepare(&self, kind: ActionKind, payer: Principal, plan: Plan) -> PreparedAction {
        if plan.is_empty() {
            return self.noop(kind);
        }
        let submission = Submission::new(payer, self.program_id, plan.into_steps());
        tracing::debug!(
            action = %kind,
            payer = %payer,
            steps = ?submission.instruction_names(),
            "Action planned"
        );
        PreparedAction {
            kind,
            submission: Some(submission),
            accessor: self.accessor.clone(),
            invalidator: self.invalidator.clone(),
            poll_interval: self.poll_interval,
        }
    }

    fn noop(&self, kind: ActionKind) -> PreparedAction {
        PreparedAction {
            kind,
            submission: None,
            accessor: self.accessor.clone(),
            invalidator: self.invalidator.clone(),
            poll_interval: self.poll_interval,
        }
    }

    fn vault_key(&self, owner: &AccountKey) -> AccountKey {
        Vault::derive_key(&self.program_id, owner)
    }

    // ========================================================================
    // VAULTS
    // ========================================================================

    pub fn deposit_collateral(
        &self,
        asset: &Asset,
        amount: f64,
        snapshot: &Snapshot,
    ) -> DoveResult<PreparedAction> {
        let kind = ActionKind::DepositCollateral;
        let payer = payer(snapshot)?;
        let assets = snapshot.require::<AssetCache>()?;
        let vault = snapshot.require::<VaultCache>()?;
        let Some(amount) = policy::requested("deposit", amount)? else {
            return Ok(self.noop(kind));
        };
        let wallet = assets.get(asset).ok_or_else(|| LedgerError::MissingState {
            what: format!("Can't find asset wallet for {}", asset.symbol),
        })?;
        let owner = payer.key();
        let native_account = associated_token_address(&owner, &asset.mint);
        let wrap = asset.is_native && !wallet.has_token_account;

        let mut plan = Plan::new();
        if wrap {
            plan.precondition(create_token_account(owner, asset.mint))?;
            plan.precondition(Instruction::SystemTransfer {
                from: owner,
                to: native_account,
                lamports: sol_to_lamports(amount),
            })?;
            plan.precondition(Instruction::SyncNative {
                account: native_account,
            })?;
        }
        if vault.vault.is_none() {
            plan.precondition(Instruction::VaultCreate { owner })?;
        }
        if vault.reserve_index(&asset.mint).is_none() {
            plan.precondition(Instruction::VaultCreateReserve {
                owner,
                mint: asset.mint,
            })?;
        }
        plan.core(Instruction::VaultDeposit {
            owner,
            mint: asset.mint,
            amount,
        })?;
        if wrap {
            plan.cleanup(close_account(native_account, owner))?;
        }
        Ok(self.prepare(kind, payer, plan))
    }

    pub fn withdraw_collateral(
        &self,
        asset: &Asset,
        amount: f64,
        snapshot: &Snapshot,
    ) -> DoveResult<PreparedAction> {
        let kind = ActionKind::WithdrawCollateral;
        let payer = payer(snapshot)?;
        let vault = snapshot.require::<VaultCache>()?;
        let assets = snapshot.require::<AssetCache>()?;
        let Some(amount) = policy::requested("withdraw", amount)? else {
            return Ok(self.noop(kind));
        };
        if vault.vault.is_none() {
            return Err(missing("No vault found"));
        }
        let reserve_index = vault
            .reserve_index(&asset.mint)
            .ok_or_else(|| missing("Asset not in vault"))?;
        let owner = payer.key();
        let native_account = associated_token_address(&owner, &asset.mint);

        let mut plan = Plan::new();
        let has_account = assets.get(asset).map(|b| b.has_token_account).unwrap_or(false);
        if asset.is_native && !has_account {
            plan.precondition(create_token_account(owner, asset.mint))?;
        }
        plan.core(Instruction::VaultWithdraw {
            owner,
            reserve_mints: vault.reserve_mints.clone(),
            reserve_oracles: vault.reserve_oracles.clone(),
            reserve_index,
            amount,
        })?;
        if asset.is_native {
            plan.cleanup(close_account(native_account, owner))?;
        }
        Ok(self.prepare(kind, payer, plan))
    }

    /// Borrow DVD against the vault, capped at its available capacity.
    pub fn borrow(&self, amount: f64, snapshot: &Snapshot) -> DoveResult<PreparedAction> {
        let kind = ActionKind::Borrow;
        let payer = payer(snapshot)?;
        let world = snapshot.require::<WorldCache>()?;
        let vault = snapshot.require::<VaultCache>()?;
        let dvd = snapshot.require::<DvdCache>()?;
        if vault.vault.is_none() {
            return Err(missing("Vault not found"));
        }
        let Some(amount) = policy::requested("borrow", amount)? else {
            return Ok(self.noop(kind));
        };
        let amount = policy::clamp(
            &self.policy,
            "borrow",
            amount,
            vault.position.available_to_borrow(),
        )?;
        let owner = payer.key();
        let dvd_mint = world.world.dvd.mint;

        let mut plan = Plan::new();
        if !dvd.has_token_account {
            plan.precondition(create_token_account(owner, dvd_mint))?;
        }
        plan.core(Instruction::VaultBorrow {
            owner,
            dvd_mint,
            reserve_mints: vault.reserve_mints.clone(),
            reserve_oracles: vault.reserve_oracles.clone(),
            amount,
        })?;
        Ok(self.prepare(kind, payer, plan))
    }

    /// Repay DVD debt. Repaying nearly everything repays everything.
    pub fn repay(&self, amount: f64, snapshot: &Snapshot) -> DoveResult<PreparedAction> {
        let kind = ActionKind::Repay;
        let payer = payer(snapshot)?;
        let world = snapshot.require::<WorldCache>()?;
        let vault = snapshot.require::<VaultCache>()?;
        let dvd = snapshot.require::<DvdCache>()?;
        let debt_free = vault.vault.as_ref().map(Vault::is_debt_zero).unwrap_or(true);
        let Some(amount) = policy::requested("repay", amount)? else {
            return Ok(self.noop(kind));
        };
        if debt_free {
            return Ok(self.noop(kind));
        }
        if !dvd.has_token_account {
            return Err(missing("DVD token account not found"));
        }
        let amount =
            policy::repay_amount(&self.policy, amount, vault.position.debt(), dvd.balance)?;

        let mut plan = Plan::new();
        plan.core(Instruction::VaultRepay {
            owner: payer.key(),
            dvd_mint: world.world.dvd.mint,
            amount,
        })?;
        Ok(self.prepare(kind, payer, plan))
    }

    pub fn claim_rewards(
        &self,
        store: RewardStore,
        snapshot: &Snapshot,
    ) -> DoveResult<PreparedAction> {
        let payer = payer(snapshot)?;
        let world = snapshot.require::<WorldCache>()?;
        let dove = snapshot.require::<DoveCache>()?;
        let owner = payer.key();
        let dove_mint = world.world.dove.mint;

        let mut plan = Plan::new();
        if !dove.has_token_account {
            plan.precondition(create_token_account(owner, dove_mint))?;
        }
        let (kind, claim) = match store {
            RewardStore::Vault => (
                ActionKind::ClaimVaultRewards,
                Instruction::VaultClaimRewards { owner, dove_mint },
            ),
            RewardStore::Savings => (
                ActionKind::ClaimSavingsRewards,
                Instruction::SavingsClaimRewards { owner, dove_mint },
            ),
        };
        plan.core(claim)?;
        Ok(self.prepare(kind, payer, plan))
    }

    // ========================================================================
    // AUCTIONS
    // ========================================================================

    pub fn liquidate(&self, snapshot: &Snapshot) -> DoveResult<PreparedAction> {
        let payer = payer(snapshot)?;
        let world = snapshot.require::<WorldCache>()?;
        let vault = snapshot.require::<VaultCache>()?;
        let dvd = snapshot.require::<DvdCache>()?;
        let owner = payer.key();
        let dvd_mint = world.world.dvd.mint;

        let mut plan = Plan::new();
        if !dvd.has_token_account {
            plan.precondition(create_token_account(owner, dvd_mint))?;
        }
        plan.core(Instruction::VaultLiquidate {
            liquidator: owner,
            vault: self.vault_key(&owner),
            dvd_mint,
            reserve_mints: vault.reserve_mints.clone(),
            reserve_oracles: vault.reserve_oracles.clone(),
        })?;
        Ok(self.prepare(ActionKind::Liquidate, payer, plan))
    }

    pub fn unliquidate(&self, snapshot: &Snapshot) -> DoveResult<PreparedAction> {
        let payer = payer(snapshot)?;
        let mut plan = Plan::new();
        plan.core(Instruction::VaultUnliquidate {
            vault: self.vault_key(&payer.key()),
        })?;
        Ok(self.prepare(ActionKind::Unliquidate, payer, plan))
    }

    /// Buy collateral from the vault's running auction with `dvd_amount` DVD.
    pub fn buy_collateral(
        &self,
        dvd_amount: f64,
        reserve_index: u8,
        snapshot: &Snapshot,
    ) -> DoveResult<PreparedAction> {
        let kind = ActionKind::BuyCollateral;
        let payer = payer(snapshot)?;
        let world = snapshot.require::<WorldCache>()?;
        let dvd = snapshot.require::<DvdCache>()?;
        let vault = snapshot.require::<VaultCache>()?;
        let Some(dvd_amount) = policy::requested("dvd_amount", dvd_amount)? else {
            return Ok(self.noop(kind));
        };
        let reserve = vault
            .vault
            .as_ref()
            .and_then(|v| v.reserves.get(usize::from(reserve_index)))
            .ok_or_else(|| missing("Reserve not found"))?;
        let reserve_mint = reserve.mint;
        let asset = Asset::by_mint(&reserve_mint);
        let native = asset.map(|a| a.is_native).unwrap_or(false);
        let has_native_account = match asset {
            Some(asset) if native => {
                let assets = snapshot.require::<AssetCache>()?;
                assets.get(&asset).map(|b| b.has_token_account).unwrap_or(false)
            }
            _ => false,
        };
        let owner = payer.key();
        let dvd_mint = world.world.dvd.mint;

        let mut plan = Plan::new();
        if !dvd.has_token_account {
            plan.precondition(create_token_account(owner, dvd_mint))?;
        }
        if native && !has_native_account {
            plan.precondition(create_token_account(owner, reserve_mint))?;
        }
        plan.core(Instruction::VaultBuyCollateral {
            buyer: owner,
            vault: self.vault_key(&owner),
            dvd_mint,
            reserve_mint,
            reserve_index,
            dvd_amount,
        })?;
        if native {
            plan.cleanup(close_account(
                associated_token_address(&owner, &reserve_mint),
                owner,
            ))?;
        }
        Ok(self.prepare(kind, payer, plan))
    }

    pub fn fail_auction(&self, snapshot: &Snapshot) -> DoveResult<PreparedAction> {
        let payer = payer(snapshot)?;
        let world = snapshot.require::<WorldCache>()?;
        let owner = payer.key();
        let mut plan = Plan::new();
        plan.core(Instruction::VaultFailAuction {
            signer: owner,
            vault: self.vault_key(&owner),
            dvd_mint: world.world.dvd.mint,
        })?;
        Ok(self.prepare(ActionKind::FailAuction, payer, plan))
    }

    // ========================================================================
    // SAVINGS
    // ========================================================================

    pub fn deposit_savings(&self, amount: f64, snapshot: &Snapshot) -> DoveResult<PreparedAction> {
        let kind = ActionKind::DepositSavings;
        let payer = payer(snapshot)?;
        let world = snapshot.require::<WorldCache>()?;
        let savings = snapshot.require::<SavingsCache>()?;
        let Some(amount) = policy::requested("deposit_savings", amount)? else {
            return Ok(self.noop(kind));
        };
        let owner = payer.key();

        let mut plan = Plan::new();
        if savings.savings.is_none() {
            plan.precondition(Instruction::SavingsCreate { owner })?;
        }
        plan.core(Instruction::SavingsDeposit {
            owner,
            dvd_mint: world.world.dvd.mint,
            amount,
        })?;
        Ok(self.prepare(kind, payer, plan))
    }

    pub fn withdraw_savings(&self, amount: f64, snapshot: &Snapshot) -> DoveResult<PreparedAction> {
        let kind = ActionKind::WithdrawSavings;
        let payer = payer(snapshot)?;
        let world = snapshot.require::<WorldCache>()?;
        let savings = snapshot.require::<SavingsCache>()?;
        let Some(amount) = policy::requested("withdraw_savings", amount)? else {
            return Ok(self.noop(kind));
        };
        if savings.savings.is_none() {
            return Err(missing("No savings account found"));
        }
        let amount =
            policy::clamp(&self.policy, "withdraw_savings", amount, savings.deposited())?;

        let mut plan = Plan::new();
        plan.core(Instruction::SavingsWithdraw {
            owner: payer.key(),
            dvd_mint: world.world.dvd.mint,
            amount,
        })?;
        Ok(self.prepare(kind, payer, plan))
    }

    // ========================================================================
    // STABILITY POOLS
    // ========================================================================

    /// Swap `amount` of `coin` for DVD.
    pub fn buy_dvd(
        &self,
        coin: &Stablecoin,
        amount: f64,
        snapshot: &Snapshot,
    ) -> DoveResult<PreparedAction> {
        let kind = ActionKind::BuyDvd;
        let payer = payer(snapshot)?;
        let world = snapshot.require::<WorldCache>()?;
        let dvd = snapshot.require::<DvdCache>()?;
        let Some(amount) = policy::requested("buy_dvd", amount)? else {
            return Ok(self.noop(kind));
        };
        let owner = payer.key();
        let dvd_mint = world.world.dvd.mint;

        let mut plan = Plan::new();
        if !dvd.has_token_account {
            plan.precondition(create_token_account(owner, dvd_mint))?;
        }
        plan.core(Instruction::StabilityBuyDvd {
            owner,
            stablecoin_mint: coin.mint,
            dvd_mint,
            amount,
        })?;
        Ok(self.prepare(kind, payer, plan))
    }

    /// Swap `amount` DVD for `coin`.
    pub fn sell_dvd(
        &self,
        coin: &Stablecoin,
        amount: f64,
        snapshot: &Snapshot,
    ) -> DoveResult<PreparedAction> {
        let kind = ActionKind::SellDvd;
        let payer = payer(snapshot)?;
        let world = snapshot.require::<WorldCache>()?;
        let coins = snapshot.require::<StablecoinCache>()?;
        let Some(amount) = policy::requested("sell_dvd", amount)? else {
            return Ok(self.noop(kind));
        };
        let owner = payer.key();

        let mut plan = Plan::new();
        let has_account = coins.get(coin).map(|b| b.has_token_account).unwrap_or(false);
        if !has_account {
            plan.precondition(create_token_account(owner, coin.mint))?;
        }
        plan.core(Instruction::StabilitySellDvd {
            owner,
            dvd_mint: world.world.dvd.mint,
            stablecoin_mint: coin.mint,
            amount,
        })?;
        Ok(self.prepare(kind, payer, plan))
    }

    // ========================================================================
    // OFFERINGS, FLASH MINTS, VESTING
    // ========================================================================

    pub fn start_offering(&self, snapshot: &Snapshot) -> DoveResult<PreparedAction> {
        let payer = payer(snapshot)?;
        let world = snapshot.require::<WorldCache>()?;
        let mut plan = Plan::new();
        plan.core(Instruction::OfferingStart {
            dove_oracle: world.world.config.dove_oracle.key,
        })?;
        Ok(self.prepare(ActionKind::StartOffering, payer, plan))
    }

    /// Spend up to `amount` DVD on the running offering.
    pub fn buy_offering(&self, amount: f64, snapshot: &Snapshot) -> DoveResult<PreparedAction> {
        let kind = ActionKind::BuyOffering;
        let payer = payer(snapshot)?;
        let world = snapshot.require::<WorldCache>()?;
        let dvd = snapshot.require::<DvdCache>()?;
        let dove = snapshot.require::<DoveCache>()?;
        let Some(amount) = policy::requested("buy_offering", amount)? else {
            return Ok(self.noop(kind));
        };
        let amount = policy::clamp(&self.policy, "buy_offering", amount, dvd.balance)?;
        let owner = payer.key();
        let dvd_mint = world.world.dvd.mint;
        let dove_mint = world.world.dove.mint;

        let mut plan = Plan::new();
        if !dvd.has_token_account {
            plan.precondition(create_token_account(owner, dvd_mint))?;
        }
        if !dove.has_token_account {
            plan.precondition(create_token_account(owner, dove_mint))?;
        }
        plan.core(Instruction::OfferingBuy {
            owner,
            dvd_mint,
            dove_mint,
            amount,
        })?;
        Ok(self.prepare(kind, payer, plan))
    }

    pub fn end_offering(&self, snapshot: &Snapshot) -> DoveResult<PreparedAction> {
        let payer = payer(snapshot)?;
        let mut plan = Plan::new();
        plan.core(Instruction::OfferingEnd)?;
        Ok(self.prepare(ActionKind::EndOffering, payer, plan))
    }

    pub fn flash_mint(
        &self,
        amount: f64,
        leg: FlashMintLeg,
        snapshot: &Snapshot,
    ) -> DoveResult<PreparedAction> {
        let kind = ActionKind::FlashMint;
        let payer = payer(snapshot)?;
        let world = snapshot.require::<WorldCache>()?;
        let dvd = snapshot.require::<DvdCache>()?;
        // The end leg carries no amount.
        let amount = if leg.begins() {
            match policy::requested("flash_mint", amount)? {
                Some(amount) => Some(amount),
                None => return Ok(self.noop(kind)),
            }
        } else {
            None
        };
        let owner = payer.key();
        let dvd_mint = world.world.dvd.mint;

        let mut plan = Plan::new();
        if !dvd.has_token_account {
            plan.precondition(create_token_account(owner, dvd_mint))?;
        }
        if let (true, Some(amount)) = (leg.begins(), amount) {
            plan.core(Instruction::FlashMintBegin {
                owner,
                dvd_mint,
                amount,
            })?;
        }
        if leg.ends() {
            plan.core(Instruction::FlashMintEnd { owner, dvd_mint })?;
        }
        Ok(self.prepare(kind, payer, plan))
    }

    pub fn claim_vesting(&self, snapshot: &Snapshot) -> DoveResult<PreparedAction> {
        let payer = payer(snapshot)?;
        let world = snapshot.require::<WorldCache>()?;
        let dove = snapshot.require::<DoveCache>()?;
        let owner = payer.key();
        let dove_mint = world.world.dove.mint;

        let mut plan = Plan::new();
        if !dove.has_token_account {
            plan.precondition(create_token_account(owner, dove_mint))?;
        }
        plan.core(Instruction::VestingClaim {
            recipient: owner,
            dove_mint,
        })?;
        Ok(self.prepare(ActionKind::ClaimVesting, payer, plan))
    }

    // ========================================================================
    // ADMINISTRATION
    // ========================================================================

    pub fn update_config(
        &self,
        config: ProtocolConfig,
        snapshot: &Snapshot,
    ) -> DoveResult<PreparedAction> {
        let payer = payer(snapshot)?;
        let mut plan = Plan::new();
        plan.core(Instruction::ConfigUpdate {
            authority: payer.key(),
            config,
        })?;
        Ok(self.prepare(ActionKind::UpdateConfig, payer, plan))
    }

    pub fn create_authority(&self, snapshot: &Snapshot) -> DoveResult<PreparedAction> {
        let payer = payer(snapshot)?;
        let mut plan = Plan::new();
        plan.core(Instruction::AuthorityCreate {
            authority: payer.key(),
        })?;
        Ok(self.prepare(ActionKind::CreateAuthority, payer, plan))
    }

    /// Register `mint` as collateral with a deposit cap and a price source.
    pub fn create_collateral(
        &self,
        mint: AccountKey,
        oracle: CollateralOracle,
        max_deposit: f64,
        snapshot: &Snapshot,
    ) -> DoveResult<PreparedAction> {
        let payer = payer(snapshot)?;
        let authority = payer.key();
        let max_deposit = limit("max_deposit", max_deposit)?;

        let mut plan = Plan::new();
        plan.core(Instruction::CollateralCreate { authority, mint })?;
        plan.core(Instruction::CollateralUpdateMaxDeposit {
            authority,
            mint,
            max_deposit,
        })?;
        let oracle = match oracle {
            CollateralOracle::Pyth(key) => Oracle {
                kind: OracleKind::Pyth,
                key,
            },
            CollateralOracle::UserFeed {
                index,
                initial_price,
            } => {
                let price = price("initial_price", initial_price)?;
                plan.core(Instruction::UserFeedCreate { authority, index })?;
                plan.core(Instruction::UserFeedSetPrice {
                    authority,
                    index,
                    price,
                })?;
                Oracle {
                    kind: OracleKind::UserFeed,
                    key: user_feed_key(&self.program_id, &authority, index),
                }
            }
        };
        plan.core(Instruction::CollateralSetOracle {
            authority,
            mint,
            oracle,
        })?;
        Ok(self.prepare(ActionKind::CreateCollateral, payer, plan))
    }

    /// Point existing collateral at a Pyth feed.
    pub fn set_collateral_oracle(
        &self,
        mint: AccountKey,
        pyth_oracle: AccountKey,
        snapshot: &Snapshot,
    ) -> DoveResult<PreparedAction> {
        let payer = payer(snapshot)?;
        let mut plan = Plan::new();
        plan.core(Instruction::CollateralSetOracle {
            authority: payer.key(),
            mint,
            oracle: Oracle {
                kind: OracleKind::Pyth,
                key: pyth_oracle,
            },
        })?;
        Ok(self.prepare(ActionKind::SetCollateralOracle, payer, plan))
    }

    /// Set the price of the authority-managed feed at `index`.
    pub fn set_collateral_price(
        &self,
        index: u8,
        price_value: f64,
        snapshot: &Snapshot,
    ) -> DoveResult<PreparedAction> {
        let payer = payer(snapshot)?;
        let mut plan = Plan::new();
        plan.core(Instruction::UserFeedSetPrice {
            authority: payer.key(),
            index,
            price: price("price", price_value)?,
        })?;
        Ok(self.prepare(ActionKind::SetCollateralPrice, payer, plan))
    }

    pub fn set_collateral_max_deposit(
        &self,
        asset: &Asset,
        max_deposit: f64,
        snapshot: &Snapshot,
    ) -> DoveResult<PreparedAction> {
        let payer = payer(snapshot)?;
        let mut plan = Plan::new();
        plan.core(Instruction::CollateralUpdateMaxDeposit {
            authority: payer.key(),
            mint: asset.mint,
            max_deposit: limit("max_deposit", max_deposit)?,
        })?;
        Ok(self.prepare(ActionKind::SetCollateralMaxDeposit, payer, plan))
    }

    pub fn create_stability(
        &self,
        mint: AccountKey,
        max_deposit: f64,
        snapshot: &Snapshot,
    ) -> DoveResult<PreparedAction> {
        let payer = payer(snapshot)?;
        let authority = payer.key();
        let max_deposit = limit("max_deposit", max_deposit)?;
        let mut plan = Plan::new();
        plan.core(Instruction::StabilityCreate { authority, mint })?;
        plan.core(Instruction::StabilityUpdateMaxDeposit {
            authority,
            mint,
            max_deposit,
        })?;
        Ok(self.prepare(ActionKind::CreateStability, payer, plan))
    }

    pub fn set_stability_max_deposit(
        &self,
        coin: &Stablecoin,
        max_deposit: f64,
        snapshot: &Snapshot,
    ) -> DoveResult<PreparedAction> {
        let payer = payer(snapshot)?;
        let mut plan = Plan::new();
        plan.core(Instruction::StabilityUpdateMaxDeposit {
            authority: payer.key(),
            mint: coin.mint,
            max_deposit: limit("max_deposit", max_deposit)?,
        })?;
        Ok(self.prepare(ActionKind::SetStabilityMaxDeposit, payer, plan))
    }
}

impl fmt::Debug for Ledger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Ledger")
            .field("program_id", &self.program_id)
            .field("policy", &self.policy)
            .field("poll_interval", &self.poll_interval)
            .finish()
    }
}

// ============================================================================
// HELPERS
// ============================================================================

fn payer(snapshot: &Snapshot) -> DoveResult<Principal> {
    snapshot
        .principal()
        .ok_or_else(|| LedgerError::NotConnected.into())
}

fn missing(what: &str) -> DoveError {
    LedgerError::MissingState {
        what: what.to_string(),
    }
    .into()
}

fn create_token_account(owner: AccountKey, mint: AccountKey) -> Instruction {
    Instruction::CreateAssociatedTokenAccount {
        payer: owner,
        owner,
        mint,
    }
}

fn close_account(account: AccountKey, owner: AccountKey) -> Instruction {
    Instruction::CloseAccount {
        account,
        destination: owner,
        owner,
    }
}

/// A deposit cap: finite and not negative. Zero closes deposits.
fn limit(field: &str, value: f64) -> DoveResult<f64> {
    if value.is_finite() && value >= 0.0 {
        Ok(value)
    } else {
        Err(LedgerError::InvalidAmount {
            field: field.to_string(),
            reason: "must be a finite, non-negative number".to_string(),
        }
        .into())
    }
}

fn price(field: &str, value: f64) -> DoveResult<f64> {
    match policy::requested(field, value)? {
        Some(value) => Ok(value),
        None => Err(LedgerError::InvalidAmount {
            field: field.to_string(),
            reason: "must be positive".to_string(),
        }
        .into()),
    }
}
