//! Ordered step lists and the actions that produce them.

use dove_cache::caches::{
    AssetCache, AuthorityCache, CollateralCache, DoveCache, DvdCache, SavingsCache,
    StabilityCache, VaultCache, WorldCache,
};
use dove_cache::CacheType;
use dove_core::{CacheId, DoveResult, Instruction, LedgerError, Step, StepPhase};
use serde::Serialize;
use std::fmt;

// ============================================================================
// PLAN
// ============================================================================

/// Steps of one submission, in phase order.
///
/// A step may never be added in an earlier phase than the step before it,
/// so preconditions always precede the core and cleanup always comes last.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Plan {
    steps: Vec<Step>,
}

impl Plan {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, phase: StepPhase, instruction: Instruction) -> DoveResult<()> {
        if let Some(last) = self.steps.last() {
            if phase < last.phase {
                return Err(LedgerError::PhaseOrder {
                    step: instruction.name().to_string(),
                    phase: phase.to_string(),
                    after: last.phase.to_string(),
                }
                .into());
            }
        }
        self.steps.push(Step { phase, instruction });
        Ok(())
    }

    pub fn precondition(&mut self, instruction: Instruction) -> DoveResult<()> {
        self.push(StepPhase::Precondition, instruction)
    }

    pub fn core(&mut self, instruction: Instruction) -> DoveResult<()> {
        self.push(StepPhase::Core, instruction)
    }

    pub fn cleanup(&mut self, instruction: Instruction) -> DoveResult<()> {
        self.push(StepPhase::Cleanup, instruction)
    }

    pub fn steps(&self) -> &[Step] {
        &self.steps
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn into_steps(self) -> Vec<Step> {
        self.steps
    }
}

// ============================================================================
// ACTIONS
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionKind {
    DepositCollateral,
    WithdrawCollateral,
    Borrow,
    Repay,
    DepositSavings,
    WithdrawSavings,
    ClaimVaultRewards,
    ClaimSavingsRewards,
    Liquidate,
    Unliquidate,
    BuyCollateral,
    FailAuction,
    BuyDvd,
    SellDvd,
    StartOffering,
    BuyOffering,
    EndOffering,
    FlashMint,
    ClaimVesting,
    UpdateConfig,
    CreateAuthority,
    CreateCollateral,
    SetCollateralOracle,
    SetCollateralPrice,
    SetCollateralMaxDeposit,
    CreateStability,
    SetStabilityMaxDeposit,
}

impl ActionKind {
    /// Cache types a confirmed submission of this action makes stale.
    ///
    /// The vault entry holds the principal's debt, so it is the debt cache.
    pub fn invalidates(&self) -> Vec<CacheId> {
        match self {
            ActionKind::DepositCollateral | ActionKind::WithdrawCollateral => {
                vec![VaultCache::ID, AssetCache::ID, CollateralCache::ID]
            }
            ActionKind::Borrow | ActionKind::Repay => {
                vec![DvdCache::ID, VaultCache::ID, WorldCache::ID]
            }
            ActionKind::DepositSavings | ActionKind::WithdrawSavings => {
                vec![SavingsCache::ID, DvdCache::ID, WorldCache::ID]
            }
            ActionKind::ClaimVaultRewards => vec![VaultCache::ID, WorldCache::ID, DoveCache::ID],
            ActionKind::ClaimSavingsRewards => {
                vec![SavingsCache::ID, WorldCache::ID, DoveCache::ID]
            }
            ActionKind::Liquidate | ActionKind::Unliquidate => vec![VaultCache::ID],
            ActionKind::BuyCollateral => vec![VaultCache::ID, DvdCache::ID, AssetCache::ID],
            ActionKind::FailAuction => vec![VaultCache::ID, DvdCache::ID],
            ActionKind::BuyDvd | ActionKind::SellDvd => vec![StabilityCache::ID, DvdCache::ID],
            ActionKind::StartOffering | ActionKind::EndOffering | ActionKind::UpdateConfig => {
                vec![WorldCache::ID]
            }
            ActionKind::BuyOffering => vec![WorldCache::ID, DvdCache::ID, DoveCache::ID],
            ActionKind::FlashMint => vec![WorldCache::ID, DvdCache::ID],
            ActionKind::ClaimVesting => vec![WorldCache::ID, DoveCache::ID],
            ActionKind::CreateAuthority => vec![AuthorityCache::ID],
            ActionKind::CreateCollateral | ActionKind::SetCollateralOracle => {
                vec![CollateralCache::ID, AssetCache::ID]
            }
            ActionKind::SetCollateralPrice | ActionKind::SetCollateralMaxDeposit => {
                vec![CollateralCache::ID]
            }
            ActionKind::CreateStability => vec![StabilityCache::ID, AssetCache::ID],
            ActionKind::SetStabilityMaxDeposit => vec![StabilityCache::ID],
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            ActionKind::DepositCollateral => "deposit_collateral",
            ActionKind::WithdrawCollateral => "withdraw_collateral",
            ActionKind::Borrow => "borrow",
            ActionKind::Repay => "repay",
            ActionKind::DepositSavings => "deposit_savings",
            ActionKind::WithdrawSavings => "withdraw_savings",
            ActionKind::ClaimVaultRewards => "claim_vault_rewards",
            ActionKind::ClaimSavingsRewards => "claim_savings_rewards",
            ActionKind::Liquidate => "liquidate",
            ActionKind::Unliquidate => "unliquidate",
            ActionKind::BuyCollateral => "buy_collateral",
            ActionKind::FailAuction => "fail_auction",
            ActionKind::BuyDvd => "buy_dvd",
            ActionKind::SellDvd => "sell_dvd",
            ActionKind::StartOffering => "start_offering",
            ActionKind::BuyOffering => "buy_offering",
            ActionKind::EndOffering => "end_offering",
            ActionKind::FlashMint => "flash_mint",
            ActionKind::ClaimVesting => "claim_vesting",
            ActionKind::UpdateConfig => "update_config",
            ActionKind::CreateAuthority => "create_authority",
            ActionKind::CreateCollateral => "create_collateral",
            ActionKind::SetCollateralOracle => "set_collateral_oracle",
            ActionKind::SetCollateralPrice => "set_collateral_price",
            ActionKind::SetCollateralMaxDeposit => "set_collateral_max_deposit",
            ActionKind::CreateStability => "create_stability",
            ActionKind::SetStabilityMaxDeposit => "set_stability_max_deposit",
        }
    }
}

impl fmt::Display for ActionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

// ============================================================================
// TESTS
// ============================================================================
