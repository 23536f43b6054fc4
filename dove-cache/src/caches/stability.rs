//! Stability pools and the principal's stablecoin balances.

use super::read_record;
use super::token::token_balance;
use crate::cache::{fan_out, CacheType, FetchContext};
use async_trait::async_trait;
use dove_core::{AccountKey, CacheId, DoveResult, Stability, Stablecoin};
use serde::Serialize;
use std::collections::BTreeMap;

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct StabilityInfo {
    pub coin: Stablecoin,
    pub deposited: f64,
    pub max_deposit: f64,
}

impl StabilityInfo {
    /// Room left before the pool hits its deposit cap.
    pub fn remaining_capacity(&self) -> f64 {
        (self.max_deposit - self.deposited).max(0.0)
    }
}

/// Pools keyed by stablecoin mint. Coins without a pool are absent.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct StabilityPools {
    entries: BTreeMap<AccountKey, StabilityInfo>,
}

impl StabilityPools {
    pub fn insert(&mut self, info: StabilityInfo) {
        self.entries.insert(info.coin.mint, info);
    }

    pub fn get(&self, coin: &Stablecoin) -> Option<&StabilityInfo> {
        self.entries.get(&coin.mint)
    }

    pub fn iter(&self) -> impl Iterator<Item = &StabilityInfo> {
        self.entries.values()
    }
}

async fn stability_info(ctx: &FetchContext, coin: Stablecoin) -> DoveResult<Option<StabilityInfo>> {
    let key = Stability::derive_key(&ctx.program_id(), &coin.mint);
    Ok(read_record::<Stability>(ctx, &key)
        .await?
        .map(|pool| StabilityInfo {
            coin,
            deposited: pool.deposited,
            max_deposit: pool.max_deposit,
        }))
}

pub struct StabilityCache;

#[async_trait]
impl CacheType for StabilityCache {
    type Value = StabilityPools;
    const ID: CacheId = CacheId::new("stability-cache");

    async fn fetch(&self, ctx: &FetchContext) -> DoveResult<StabilityPools> {
        let result = fan_out(Stablecoin::with_stability(), |coin| stability_info(ctx, coin)).await?;
        let mut pools = StabilityPools::default();
        for (_, info) in result.present {
            pools.insert(info);
        }
        Ok(pools)
    }

    fn mock(&self, _ctx: &FetchContext) -> StabilityPools {
        let mut pools = StabilityPools::default();
        for coin in Stablecoin::with_stability() {
            pools.insert(StabilityInfo {
                coin,
                deposited: 500_000.0,
                max_deposit: 1_000_000.0,
            });
        }
        pools
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct StablecoinBalance {
    pub coin: Stablecoin,
    pub has_token_account: bool,
    pub balance: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct StablecoinBalances {
    entries: BTreeMap<AccountKey, StablecoinBalance>,
}

impl StablecoinBalances {
    pub fn insert(&mut self, balance: StablecoinBalance) {
        self.entries.insert(balance.coin.mint, balance);
    }

    pub fn get(&self, coin: &Stablecoin) -> Option<&StablecoinBalance> {
        self.entries.get(&coin.mint)
    }

    pub fn iter(&self) -> impl Iterator<Item = &StablecoinBalance> {
        self.entries.values()
    }
}

async fn stablecoin_balance(
    ctx: &FetchContext,
    coin: Stablecoin,
) -> DoveResult<Option<StablecoinBalance>> {
    let token = token_balance(ctx, coin.mint).await?;
    Ok(Some(StablecoinBalance {
        coin,
        has_token_account: token.has_token_account,
        balance: token.balance,
    }))
}

pub struct StablecoinCache;

#[async_trait]
impl CacheType for StablecoinCache {
    type Value = StablecoinBalances;
    const ID: CacheId = CacheId::new("stablecoin-cache");

    fn is_principal_scoped(&self) -> bool {
        true
    }

    async fn fetch(&self, ctx: &FetchContext) -> DoveResult<StablecoinBalances> {
        let result = fan_out(Stablecoin::LIST, |coin| stablecoin_balance(ctx, coin)).await?;
        let mut balances = StablecoinBalances::default();
        for (_, balance) in result.present {
            balances.insert(balance);
        }
        Ok(balances)
    }

    fn mock(&self, _ctx: &FetchContext) -> StablecoinBalances {
        let mut balances = StablecoinBalances::default();
        for coin in Stablecoin::LIST {
            balances.insert(StablecoinBalance {
                coin,
                has_token_account: true,
                balance: 1_000.0,
            });
        }
        balances
    }
}
