//! Wallet balances of every collateral asset.

use super::token::{token_balance, TokenBalance};
use crate::cache::{fan_out, CacheType, FetchContext};
use async_trait::async_trait;
use dove_core::{lamports_to_sol, AccountKey, Asset, CacheId, DoveResult};
use serde::Serialize;
use std::collections::BTreeMap;

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct AssetBalance {
    pub asset: Asset,
    /// Whether an associated token account exists; for SOL, a wrapped account.
    pub has_token_account: bool,
    /// Spendable amount. For SOL this is wallet lamports plus any wrapped SOL.
    pub balance: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct AssetBalances {
    entries: BTreeMap<AccountKey, AssetBalance>,
}

impl AssetBalances {
    pub fn insert(&mut self, balance: AssetBalance) {
        self.entries.insert(balance.asset.mint, balance);
    }

    pub fn get(&self, asset: &Asset) -> Option<&AssetBalance> {
        self.entries.get(&asset.mint)
    }

    pub fn balance(&self, asset: &Asset) -> f64 {
        self.get(asset).map(|b| b.balance).unwrap_or(0.0)
    }

    pub fn iter(&self) -> impl Iterator<Item = &AssetBalance> {
        self.entries.values()
    }
}

async fn asset_balance(ctx: &FetchContext, asset: Asset) -> DoveResult<Option<AssetBalance>> {
    let token: TokenBalance = token_balance(ctx, asset.mint).await?;
    let mut balance = token.balance;
    if asset.is_native {
        if let Some(principal) = ctx.principal() {
            let lamports = ctx
                .accessor()
                .read_meta(&principal.key())
                .await?
                .map(|meta| meta.lamports)
                .unwrap_or(0);
            balance += lamports_to_sol(lamports);
        }
    }
    Ok(Some(AssetBalance {
        asset,
        has_token_account: token.has_token_account,
        balance,
    }))
}

pub struct AssetCache;

#[async_trait]
impl CacheType for AssetCache {
    type Value = AssetBalances;
    const ID: CacheId = CacheId::new("asset-cache");

    fn is_principal_scoped(&self) -> bool {
        true
    }

    async fn fetch(&self, ctx: &FetchContext) -> DoveResult<AssetBalances> {
        let result = fan_out(Asset::LIST, |asset| asset_balance(ctx, asset)).await?;
        let mut balances = AssetBalances::default();
        for (_, balance) in result.present {
            balances.insert(balance);
        }
        Ok(balances)
    }

    fn mock(&self, _ctx: &FetchContext) -> AssetBalances {
        let mut balances = AssetBalances::default();
        for asset in Asset::LIST {
            balances.insert(AssetBalance {
                asset,
                has_token_account: true,
                balance: 1_000.0,
            });
        }
        balances
    }
}
