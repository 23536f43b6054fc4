//! Accepted collateral assets with their oracle prices.

use super::{read_oracle_price, read_record};
use crate::cache::{fan_out, CacheType, FetchContext};
use async_trait::async_trait;
use dove_core::{AccountKey, Asset, CacheId, Collateral, DoveResult};
use serde::Serialize;
use std::collections::BTreeMap;

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct CollateralInfo {
    pub asset: Asset,
    pub deposited: f64,
    pub decimals: u8,
    pub price: f64,
    pub is_price_stale: bool,
    pub max_deposit: f64,
    pub oracle_key: AccountKey,
}

impl CollateralInfo {
    pub fn deposited_value(&self) -> f64 {
        self.deposited * self.price
    }
}

/// Collateral records keyed by mint. Assets without a record are absent.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CollateralMap {
    entries: BTreeMap<AccountKey, CollateralInfo>,
}

impl CollateralMap {
    pub fn insert(&mut self, info: CollateralInfo) {
        self.entries.insert(info.asset.mint, info);
    }

    pub fn get(&self, asset: &Asset) -> Option<&CollateralInfo> {
        self.entries.get(&asset.mint)
    }

    pub fn by_mint(&self, mint: &AccountKey) -> Option<&CollateralInfo> {
        self.entries.get(mint)
    }

    pub fn iter(&self) -> impl Iterator<Item = &CollateralInfo> {
        self.entries.values()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Price of `mint`, zero if unknown.
    pub fn price_of(&self, mint: &AccountKey) -> f64 {
        self.entries.get(mint).map(|info| info.price).unwrap_or(0.0)
    }
}

async fn collateral_info(ctx: &FetchContext, asset: Asset) -> DoveResult<Option<CollateralInfo>> {
    let key = Collateral::derive_key(&ctx.program_id(), &asset.mint);
    let Some(collateral) = read_record::<Collateral>(ctx, &key).await? else {
        return Ok(None);
    };
    // A registered collateral without a readable oracle is an error.
    let price = read_oracle_price(ctx, &collateral.oracle).await?;
    Ok(Some(CollateralInfo {
        asset,
        deposited: collateral.deposited,
        decimals: collateral.decimals,
        price: price.price,
        is_price_stale: price.is_stale,
        max_deposit: collateral.max_deposit,
        oracle_key: collateral.oracle.key,
    }))
}

pub struct CollateralCache;

#[async_trait]
impl CacheType for CollateralCache {
    type Value = CollateralMap;
    const ID: CacheId = CacheId::new("collateral-cache");

    async fn fetch(&self, ctx: &FetchContext) -> DoveResult<CollateralMap> {
        let result = fan_out(Asset::LIST, |asset| collateral_info(ctx, asset)).await?;

        if !result.absent.is_empty() {
            tracing::debug!(
                absent = ?result.absent.iter().map(|a| a.symbol).collect::<Vec<_>>(),
                "Collateral not registered"
            );
        }
        let mut map = CollateralMap::default();
        for (_, info) in result.present {
            map.insert(info);
        }
        Ok(map)
    }

    fn mock(&self, _ctx: &FetchContext) -> CollateralMap {
        let mut map = CollateralMap::default();
        for asset in Asset::LIST {
            map.insert(CollateralInfo {
                asset,
                deposited: 1_000_000.0,
                decimals: 6,
                price: 1.0,
                is_price_stale: false,
                max_deposit: 2_000_000.0,
                oracle_key: AccountKey::zero(),
            });
        }
        map
    }
}
