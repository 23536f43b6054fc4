//! Dove Ledger - transaction composition for the Dove protocol
//!
//! Actions are planned from a [`dove_cache::Snapshot`] into phase-ordered
//! steps, submitted as one atomic unit, and on confirmation invalidate the
//! cache types they declare.

pub mod ledger;
pub mod plan;
pub mod policy;
pub mod rejection;

pub use ledger::{CollateralOracle, FlashMintLeg, Ledger, PreparedAction, Receipt, RewardStore};
pub use plan::{ActionKind, Plan};
pub use rejection::extract_reason;
