//! Typed instructions and the atomic submission unit.

use crate::error::{DoveResult, ProtocolError};
use crate::identity::{
    AccountKey, Principal, ASSOCIATED_TOKEN_PROGRAM_ID, SYSTEM_PROGRAM_ID, TOKEN_PROGRAM_ID,
};
use crate::protocol::{Oracle, ProtocolConfig};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Where a step sits in a transaction. Steps are always ordered
/// precondition, then core, then cleanup.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum StepPhase {
    /// Create an account or resource the core step needs.
    Precondition,
    Core,
    /// Tear down temporaries, e.g. a wrapped native token account.
    Cleanup,
}

impl fmt::Display for StepPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            StepPhase::Precondition => "precondition",
            StepPhase::Core => "core",
            StepPhase::Cleanup => "cleanup",
        };
        f.write_str(name)
    }
}

/// A single instruction. Amounts are in token units, not base units.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Instruction {
    // token and system programs
    CreateAssociatedTokenAccount {
        payer: AccountKey,
        owner: AccountKey,
        mint: AccountKey,
    },
    SystemTransfer {
        from: AccountKey,
        to: AccountKey,
        lamports: u64,
    },
    SyncNative {
        account: AccountKey,
    },
    CloseAccount {
        account: AccountKey,
        destination: AccountKey,
        owner: AccountKey,
    },

    // vaults
    VaultCreate {
        owner: AccountKey,
    },
    VaultCreateReserve {
        owner: AccountKey,
        mint: AccountKey,
    },
    VaultDeposit {
        owner: AccountKey,
        mint: AccountKey,
        amount: f64,
    },
    VaultWithdraw {
        owner: AccountKey,
        reserve_mints: Vec<AccountKey>,
        reserve_oracles: Vec<AccountKey>,
        reserve_index: u8,
        amount: f64,
    },
    VaultBorrow {
        owner: AccountKey,
        dvd_mint: AccountKey,
        reserve_mints: Vec<AccountKey>,
        reserve_oracles: Vec<AccountKey>,
        amount: f64,
    },
    VaultRepay {
        owner: AccountKey,
        dvd_mint: AccountKey,
        amount: f64,
    },
    VaultClaimRewards {
        owner: AccountKey,
        dove_mint: AccountKey,
    },
    VaultLiquidate {
        liquidator: AccountKey,
        vault: AccountKey,
        dvd_mint: AccountKey,
        reserve_mints: Vec<AccountKey>,
        reserve_oracles: Vec<AccountKey>,
    },
    VaultUnliquidate {
        vault: AccountKey,
    },
    VaultBuyCollateral {
        buyer: AccountKey,
        vault: AccountKey,
        dvd_mint: AccountKey,
        reserve_mint: AccountKey,
        reserve_index: u8,
        dvd_amount: f64,
    },
    VaultFailAuction {
        signer: AccountKey,
        vault: AccountKey,
        dvd_mint: AccountKey,
    },

    // savings
    SavingsCreate {
        owner: AccountKey,
    },
    SavingsDeposit {
        owner: AccountKey,
        dvd_mint: AccountKey,
        amount: f64,
    },
    SavingsWithdraw {
        owner: AccountKey,
        dvd_mint: AccountKey,
        amount: f64,
    },
    SavingsClaimRewards {
        owner: AccountKey,
        dove_mint: AccountKey,
    },

    // stability pools
    StabilityCreate {
        authority: AccountKey,
        mint: AccountKey,
    },
    StabilityUpdateMaxDeposit {
        authority: AccountKey,
        mint: AccountKey,
        max_deposit: f64,
    },
    StabilityBuyDvd {
        owner: AccountKey,
        stablecoin_mint: AccountKey,
        dvd_mint: AccountKey,
        amount: f64,
    },
    StabilitySellDvd {
        owner: AccountKey,
        dvd_mint: AccountKey,
        stablecoin_mint: AccountKey,
        amount: f64,
    },

    // offerings, flash mints, vesting
    OfferingStart {
        dove_oracle: AccountKey,
    },
    OfferingBuy {
        owner: AccountKey,
        dvd_mint: AccountKey,
        dove_mint: AccountKey,
        amount: f64,
    },
    OfferingEnd,
    FlashMintBegin {
        owner: AccountKey,
        dvd_mint: AccountKey,
        amount: f64,
    },
    FlashMintEnd {
        owner: AccountKey,
        dvd_mint: AccountKey,
    },
    VestingClaim {
        recipient: AccountKey,
        dove_mint: AccountKey,
    },

    // administration
    ConfigUpdate {
        authority: AccountKey,
        config: ProtocolConfig,
    },
    AuthorityCreate {
        authority: AccountKey,
    },
    CollateralCreate {
        authority: AccountKey,
        mint: AccountKey,
    },
    CollateralUpdateMaxDeposit {
        authority: AccountKey,
        mint: AccountKey,
        max_deposit: f64,
    },
    CollateralSetOracle {
        authority: AccountKey,
        mint: AccountKey,
        oracle: Oracle,
    },
    UserFeedCreate {
        authority: AccountKey,
        index: u8,
    },
    UserFeedSetPrice {
        authority: AccountKey,
        index: u8,
        price: f64,
    },
}

impl Instruction {
    /// Program that executes this instruction.
    pub fn program(&self, dove_program: &AccountKey) -> AccountKey {
        match self {
            Instruction::CreateAssociatedTokenAccount { .. } => ASSOCIATED_TOKEN_PROGRAM_ID,
            Instruction::SystemTransfer { .. } => SYSTEM_PROGRAM_ID,
            Instruction::SyncNative { .. } | Instruction::CloseAccount { .. } => TOKEN_PROGRAM_ID,
            _ => *dove_program,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Instruction::CreateAssociatedTokenAccount { .. } => "CreateAssociatedTokenAccount",
            Instruction::SystemTransfer { .. } => "SystemTransfer",
            Instruction::SyncNative { .. } => "SyncNative",
            Instruction::CloseAccount { .. } => "CloseAccount",
            Instruction::VaultCreate { .. } => "VaultCreate",
            Instruction::VaultCreateReserve { .. } => "VaultCreateReserve",
            Instruction::VaultDeposit { .. } => "VaultDeposit",
            Instruction::VaultWithdraw { .. } => "VaultWithdraw",
            Instruction::VaultBorrow { .. } => "VaultBorrow",
            Instruction::VaultRepay { .. } => "VaultRepay",
            Instruction::VaultClaimRewards { .. } => "VaultClaimRewards",
            Instruction::VaultLiquidate { .. } => "VaultLiquidate",
            Instruction::VaultUnliquidate { .. } => "VaultUnliquidate",
            Instruction::VaultBuyCollateral { .. } => "VaultBuyCollateral",
            Instruction::VaultFailAuction { .. } => "VaultFailAuction",
            Instruction::SavingsCreate { .. } => "SavingsCreate",
            Instruction::SavingsDeposit { .. } => "SavingsDeposit",
            Instruction::SavingsWithdraw { .. } => "SavingsWithdraw",
            Instruction::SavingsClaimRewards { .. } => "SavingsClaimRewards",
            Instruction::StabilityCreate { .. } => "StabilityCreate",
            Instruction::StabilityUpdateMaxDeposit { .. } => "StabilityUpdateMaxDeposit",
            Instruction::StabilityBuyDvd { .. } => "StabilityBuyDvd",
            Instruction::StabilitySellDvd { .. } => "StabilitySellDvd",
            Instruction::OfferingStart { .. } => "OfferingStart",
            Instruction::OfferingBuy { .. } => "OfferingBuy",
            Instruction::OfferingEnd => "OfferingEnd",
            Instruction::FlashMintBegin { .. } => "FlashMintBegin",
            Instruction::FlashMintEnd { .. } => "FlashMintEnd",
            Instruction::VestingClaim { .. } => "VestingClaim",
            Instruction::ConfigUpdate { .. } => "ConfigUpdate",
            Instruction::AuthorityCreate { .. } => "AuthorityCreate",
            Instruction::CollateralCreate { .. } => "CollateralCreate",
            Instruction::CollateralUpdateMaxDeposit { .. } => "CollateralUpdateMaxDeposit",
            Instruction::CollateralSetOracle { .. } => "CollateralSetOracle",
            Instruction::UserFeedCreate { .. } => "UserFeedCreate",
            Instruction::UserFeedSetPrice { .. } => "UserFeedSetPrice",
        }
    }

    /// Encoded instruction payload.
    pub fn data(&self) -> DoveResult<Vec<u8>> {
        serde_json::to_vec(self).map_err(|e| {
            ProtocolError::Encode {
                record: "Instruction",
                reason: e.to_string(),
            }
            .into()
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Step {
    pub phase: StepPhase,
    pub instruction: Instruction,
}

/// Everything one action sends to the remote system, applied atomically.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Submission {
    pub id: Uuid,
    pub payer: Principal,
    pub program_id: AccountKey,
    pub steps: Vec<Step>,
    /// Extra keys that must co-sign, beyond the payer.
    pub extra_signers: Vec<AccountKey>,
}

impl Submission {
    pub fn new(payer: Principal, program_id: AccountKey, steps: Vec<Step>) -> Self {
        Self {
            id: Uuid::now_v7(),
            payer,
            program_id,
            steps,
            extra_signers: Vec::new(),
        }
    }

    pub fn instructions(&self) -> impl Iterator<Item = &Instruction> {
        self.steps.iter().map(|s| &s.instruction)
    }

    pub fn instruction_names(&self) -> Vec<&'static str> {
        self.instructions().map(Instruction::name).collect()
    }
}
