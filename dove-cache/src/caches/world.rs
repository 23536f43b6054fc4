//! Protocol-wide state and derived metrics.

use super::{read_oracle_price, read_record};
use crate::cache::{CacheType, FetchContext};
use async_trait::async_trait;
use dove_core::{CacheError, CacheId, DoveResult, OraclePrice, World};
use serde::Serialize;

/// DOVE released by the protocol, fixed.
pub const DOVE_RELEASE: f64 = 1_000_000.0;

const DAYS_PER_YEAR: f64 = 365.0;

/// The world record with reward rates and the system balance.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WorldView {
    pub world: World,
    pub dove_price: OraclePrice,
    /// Debt with interest projected to fetch time.
    pub debt_total: f64,
    pub savings_total: f64,
    /// Annual DOVE rewards on vault debt, in percent.
    pub vault_rewards_percentage: f64,
    pub savings_rewards_percentage: f64,
    pub dove_release: f64,
    /// Assets minus liabilities; negative means a deficit.
    pub system_balance: f64,
}

impl WorldView {
    pub fn new(world: World, dove_price: OraclePrice, now: i64) -> Self {
        let debt_total = world.debt.project_total(&world.config.debt, now);
        let savings_total = world.savings.project_total(&world.config.savings, now);
        let vault_rewards_percentage = rewards_percentage(
            world.debt.reward_schedule.at(world.debt.days_since_creation(now)),
            dove_price.price,
            debt_total,
        );
        let savings_rewards_percentage = rewards_percentage(
            world
                .savings
                .reward_schedule
                .at(world.savings.days_since_creation(now)),
            dove_price.price,
            savings_total,
        );
        let assets = debt_total + world.stable_dvd.circulating;
        let liabilities = savings_total + world.dvd.supply;
        Self {
            world,
            dove_price,
            debt_total,
            savings_total,
            vault_rewards_percentage,
            savings_rewards_percentage,
            dove_release: DOVE_RELEASE,
            system_balance: assets - liabilities,
        }
    }

    pub fn zero() -> Self {
        Self {
            world: World::zero(),
            dove_price: OraclePrice {
                price: 0.0,
                is_stale: false,
            },
            debt_total: 0.0,
            savings_total: 0.0,
            vault_rewards_percentage: 0.0,
            savings_rewards_percentage: 0.0,
            dove_release: DOVE_RELEASE,
            system_balance: 0.0,
        }
    }
}

/// Daily emission valued in USD over a year, as a percentage of `book_total`.
fn rewards_percentage(emission_per_day: f64, dove_price: f64, book_total: f64) -> f64 {
    if book_total > 1.0 {
        emission_per_day * DAYS_PER_YEAR * dove_price * 100.0 / book_total
    } else {
        0.0
    }
}

pub struct WorldCache;

#[async_trait]
impl CacheType for WorldCache {
    type Value = WorldView;
    const ID: CacheId = CacheId::new("world-cache");

    async fn fetch(&self, ctx: &FetchContext) -> DoveResult<WorldView> {
        let key = World::derive_key(&ctx.program_id());
        let world: World = read_record(ctx, &key).await?.ok_or_else(|| {
            CacheError::MissingRemoteState {
                cache: Self::ID,
                what: "Can't find world".to_string(),
            }
        })?;
        let dove_price = read_oracle_price(ctx, &world.config.dove_oracle).await?;
        Ok(WorldView::new(world, dove_price, ctx.unix_timestamp()))
    }

    fn mock(&self, _ctx: &FetchContext) -> WorldView {
        WorldView::zero()
    }
}
