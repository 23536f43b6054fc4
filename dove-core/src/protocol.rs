//! Protocol account records and address derivation.
//!
//! Records are opaque to the cache and ledger layers: they are decoded from
//! account bytes, read through typed accessors, and never mutated locally.
//! The byte codec is JSON.

use crate::error::{DoveError, DoveResult, ProtocolError};
use crate::identity::{AccountKey, ASSOCIATED_TOKEN_PROGRAM_ID, TOKEN_PROGRAM_ID};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

const SECONDS_PER_DAY: f64 = 86_400.0;
const SECONDS_PER_YEAR: f64 = 365.0 * SECONDS_PER_DAY;

/// An account record with a byte codec.
pub trait AccountRecord: Sized + Serialize + DeserializeOwned {
    const NAME: &'static str;

    fn from_bytes(bytes: &[u8]) -> DoveResult<Self> {
        serde_json::from_slice(bytes).map_err(|e| {
            DoveError::from(ProtocolError::Decode {
                record: Self::NAME,
                reason: e.to_string(),
            })
        })
    }

    fn to_bytes(&self) -> DoveResult<Vec<u8>> {
        serde_json::to_vec(self).map_err(|e| {
            DoveError::from(ProtocolError::Encode {
                record: Self::NAME,
                reason: e.to_string(),
            })
        })
    }
}

// ============================================================================
// ORACLES
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OracleKind {
    Pyth,
    UserFeed,
}

/// Reference to a price feed account.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Oracle {
    pub kind: OracleKind,
    pub key: AccountKey,
}

/// Price feed account contents.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PriceFeed {
    pub price: f64,
    /// Unix seconds.
    pub publish_time: i64,
}

impl AccountRecord for PriceFeed {
    const NAME: &'static str = "PriceFeed";
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct OraclePrice {
    pub price: f64,
    pub is_stale: bool,
}

impl Oracle {
    /// Read the price from the feed account data.
    pub fn price(&self, feed_data: &[u8], now: i64, max_age_secs: u64) -> DoveResult<OraclePrice> {
        let feed = PriceFeed::from_bytes(feed_data)?;
        let age = now.saturating_sub(feed.publish_time);
        Ok(OraclePrice {
            price: feed.price.abs(),
            is_stale: age > max_age_secs as i64,
        })
    }
}

// ============================================================================
// BOOKS AND SCHEDULES
// ============================================================================

/// Emission schedule: linear warmup to `maximum` per day, then flat until
/// `distribution_length` days have elapsed.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Schedule {
    pub maximum: f64,
    pub warmup_length: f64,
    pub distribution_length: f64,
}

impl Schedule {
    pub const fn zero() -> Self {
        Self {
            maximum: 0.0,
            warmup_length: 0.0,
            distribution_length: 0.0,
        }
    }

    /// Emission per day at `days` since the start.
    pub fn at(&self, days: f64) -> f64 {
        if days < 0.0 || days >= self.distribution_length {
            return 0.0;
        }
        if days < self.warmup_length {
            return self.maximum * days / self.warmup_length;
        }
        self.maximum
    }

    pub fn total_emission(&self) -> f64 {
        let warmup = self.warmup_length.min(self.distribution_length);
        0.5 * warmup * self.maximum + (self.distribution_length - warmup) * self.maximum
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BookConfig {
    pub interest_apy: f64,
    pub reward_schedule: Schedule,
}

/// An interest-bearing ledger of aggregate debt or savings.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Book {
    pub total: f64,
    pub last_update: i64,
    pub creation_time: i64,
    pub reward_schedule: Schedule,
}

impl Book {
    pub const fn zero() -> Self {
        Self {
            total: 0.0,
            last_update: 0,
            creation_time: 0,
            reward_schedule: Schedule::zero(),
        }
    }

    /// Total with interest accrued up to `now`.
    pub fn project_total(&self, config: &BookConfig, now: i64) -> f64 {
        let elapsed = (now - self.last_update).max(0) as f64;
        self.total * (1.0 + config.interest_apy).powf(elapsed / SECONDS_PER_YEAR)
    }

    pub fn days_since_creation(&self, now: i64) -> f64 {
        (now - self.creation_time) as f64 / SECONDS_PER_DAY
    }
}

// ============================================================================
// WORLD
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TokenInfo {
    pub mint: AccountKey,
    pub supply: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct StableDvd {
    pub circulating: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AuctionConfig {
    pub begin_scale: f64,
    pub decay_rate: f64,
    pub end_scale: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FlashMintConfig {
    pub fee: f64,
    pub limit: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct OfferingConfig {
    pub surplus_limit: f64,
    pub deficit_limit: f64,
    pub dvd_offering_size: f64,
    pub dove_offering_size: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct VaultConfig {
    pub liquidation_penalty_rate: f64,
    pub liquidation_reward_cap: f64,
    pub liquidation_reward_rate: f64,
    pub auction_failure_reward_cap: f64,
    pub auction_failure_reward_rate: f64,
}

/// Protocol-wide parameters held by the world record.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ProtocolConfig {
    pub max_ltv: f64,
    pub dvd_interest_apy: f64,
    pub dove_oracle: Oracle,
    pub auction: AuctionConfig,
    pub debt: BookConfig,
    pub flash_mint: FlashMintConfig,
    pub offering: OfferingConfig,
    pub savings: BookConfig,
    pub vault: VaultConfig,
}

impl ProtocolConfig {
    pub fn zero() -> Self {
        let book = BookConfig {
            interest_apy: 0.0,
            reward_schedule: Schedule::zero(),
        };
        Self {
            max_ltv: 0.0,
            dvd_interest_apy: 0.0,
            dove_oracle: Oracle {
                kind: OracleKind::UserFeed,
                key: AccountKey::zero(),
            },
            auction: AuctionConfig {
                begin_scale: 0.0,
                decay_rate: 0.0,
                end_scale: 0.0,
            },
            debt: book,
            flash_mint: FlashMintConfig { fee: 0.0, limit: 0.0 },
            offering: OfferingConfig {
                surplus_limit: 0.0,
                deficit_limit: 0.0,
                dvd_offering_size: 0.0,
                dove_offering_size: 0.0,
            },
            savings: book,
            vault: VaultConfig {
                liquidation_penalty_rate: 0.0,
                liquidation_reward_cap: 0.0,
                liquidation_reward_rate: 0.0,
                auction_failure_reward_cap: 0.0,
                auction_failure_reward_rate: 0.0,
            },
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct OfferingState {
    pub active: bool,
    pub started_at: i64,
    /// DVD raised (surplus offering) or sold (deficit offering) so far.
    pub filled: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct VestingState {
    pub recipient: AccountKey,
    pub schedule: Schedule,
    pub start_time: i64,
    pub claimed: f64,
}

/// The protocol's global record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct World {
    pub authority: AccountKey,
    pub dvd: TokenInfo,
    pub dove: TokenInfo,
    pub stable_dvd: StableDvd,
    pub debt: Book,
    pub savings: Book,
    pub config: ProtocolConfig,
    pub offering: OfferingState,
    pub vesting: VestingState,
}

impl AccountRecord for World {
    const NAME: &'static str = "World";
}

impl World {
    pub fn derive_key(program: &AccountKey) -> AccountKey {
        AccountKey::derive(program, &[b"world"])
    }

    pub fn zero() -> Self {
        let token = TokenInfo {
            mint: AccountKey::zero(),
            supply: 0.0,
        };
        Self {
            authority: AccountKey::zero(),
            dvd: token,
            dove: token,
            stable_dvd: StableDvd { circulating: 0.0 },
            debt: Book::zero(),
            savings: Book::zero(),
            config: ProtocolConfig::zero(),
            offering: OfferingState {
                active: false,
                started_at: 0,
                filled: 0.0,
            },
            vesting: VestingState {
                recipient: AccountKey::zero(),
                schedule: Schedule::zero(),
                start_time: 0,
                claimed: 0.0,
            },
        }
    }
}

// ============================================================================
// USER RECORDS
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Reserve {
    pub mint: AccountKey,
    pub deposited: f64,
    pub oracle: AccountKey,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Auction {
    pub started_at: i64,
    pub reserve_index: u8,
}

/// A principal's collateral-and-debt position.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Vault {
    pub owner: AccountKey,
    pub debt: f64,
    pub reserves: Vec<Reserve>,
    pub auction: Option<Auction>,
    pub pending_rewards: f64,
}

impl AccountRecord for Vault {
    const NAME: &'static str = "Vault";
}

impl Vault {
    pub fn derive_key(program: &AccountKey, owner: &AccountKey) -> AccountKey {
        AccountKey::derive(program, &[b"vault", owner.as_bytes()])
    }

    pub fn is_debt_zero(&self) -> bool {
        self.debt <= 0.0
    }

    pub fn is_liquidating(&self) -> bool {
        self.auction.is_some()
    }

    pub fn reserve_index(&self, mint: &AccountKey) -> Option<u8> {
        self.reserves
            .iter()
            .position(|r| &r.mint == mint)
            .and_then(|i| u8::try_from(i).ok())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Savings {
    pub owner: AccountKey,
    pub deposited: f64,
    pub pending_rewards: f64,
}

impl AccountRecord for Savings {
    const NAME: &'static str = "Savings";
}

impl Savings {
    pub fn derive_key(program: &AccountKey, owner: &AccountKey) -> AccountKey {
        AccountKey::derive(program, &[b"savings", owner.as_bytes()])
    }
}

// ============================================================================
// MARKET RECORDS
// ============================================================================

/// Protocol-side record of an accepted collateral asset.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Collateral {
    pub mint: AccountKey,
    pub deposited: f64,
    pub decimals: u8,
    pub max_deposit: f64,
    pub oracle: Oracle,
}

impl AccountRecord for Collateral {
    const NAME: &'static str = "Collateral";
}

impl Collateral {
    pub fn derive_key(program: &AccountKey, mint: &AccountKey) -> AccountKey {
        AccountKey::derive(program, &[b"collateral", mint.as_bytes()])
    }
}

/// Stability pool for one stablecoin.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Stability {
    pub mint: AccountKey,
    pub deposited: f64,
    pub max_deposit: f64,
}

impl AccountRecord for Stability {
    const NAME: &'static str = "Stability";
}

impl Stability {
    pub fn derive_key(program: &AccountKey, mint: &AccountKey) -> AccountKey {
        AccountKey::derive(program, &[b"stability", mint.as_bytes()])
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Authority {
    pub key: AccountKey,
}

impl AccountRecord for Authority {
    const NAME: &'static str = "Authority";
}

impl Authority {
    pub fn derive_key(program: &AccountKey) -> AccountKey {
        AccountKey::derive(program, &[b"authority"])
    }
}

/// Address of a user-managed price feed.
pub fn user_feed_key(program: &AccountKey, authority: &AccountKey, index: u8) -> AccountKey {
    AccountKey::derive(program, &[b"user-feed", authority.as_bytes(), &[index]])
}

// ============================================================================
// TOKEN ACCOUNTS
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TokenAccount {
    pub mint: AccountKey,
    pub owner: AccountKey,
    pub amount: f64,
}

impl AccountRecord for TokenAccount {
    const NAME: &'static str = "TokenAccount";
}

/// Canonical token account address for `owner` and `mint`.
pub fn associated_token_address(owner: &AccountKey, mint: &AccountKey) -> AccountKey {
    AccountKey::derive(
        &ASSOCIATED_TOKEN_PROGRAM_ID,
        &[owner.as_bytes(), TOKEN_PROGRAM_ID.as_bytes(), mint.as_bytes()],
    )
}
