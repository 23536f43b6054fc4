//! Dove Core - shared types for the Dove protocol client
//!
//! Identities, the error taxonomy, configuration, protocol records, typed
//! instructions and the remote accessor contract. Every other crate in the
//! workspace depends on this one.

pub mod accessor;
pub mod asset;
pub mod config;
pub mod error;
pub mod identity;
pub mod instruction;
pub mod invalidation;
pub mod position;
pub mod protocol;

pub use accessor::{AccountMeta, ConfirmationHandle, RemoteAccessor, SubmissionStatus};
pub use asset::{
    is_negligible, lamports_to_sol, sol_to_lamports, Asset, Stablecoin, ASSET_DECIMALS,
    LAMPORTS_PER_SOL,
};
pub use config::{AmountPolicy, ConfirmationConfig, DoveConfig, RpcConfig};
pub use error::{
    AccessorError, CacheError, ConfigError, DoveError, DoveResult, ErrorClass, LedgerError,
    ProtocolError,
};
pub use identity::{
    AccountKey, CacheId, Principal, ASSOCIATED_TOKEN_PROGRAM_ID, DOVE_PROGRAM_ID, NATIVE_MINT,
    SYSTEM_PROGRAM_ID, TOKEN_2022_PROGRAM_ID, TOKEN_PROGRAM_ID,
};
pub use instruction::{Instruction, Step, StepPhase, Submission};
pub use invalidation::Invalidator;
pub use position::{Position, RiskLevel, MAX_LTV};
pub use protocol::{
    associated_token_address, user_feed_key, AccountRecord, Authority, Book, BookConfig,
    Collateral, Oracle, OracleKind, OraclePrice, PriceFeed, ProtocolConfig, Reserve, Savings,
    Schedule, Stability, TokenAccount, TokenInfo, Vault, World,
};
