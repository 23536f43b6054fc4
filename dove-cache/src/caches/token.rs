//! DVD and DOVE balances of the active principal.

use super::read_record;
use super::world::{WorldCache, WorldView};
use crate::cache::{CacheType, Dependency, FetchContext};
use async_trait::async_trait;
use dove_core::{associated_token_address, AccountKey, CacheId, DoveResult, TokenAccount};
use serde::Serialize;

/// A principal's holding of one token.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct TokenBalance {
    pub mint: AccountKey,
    /// Associated token account address; zero when no principal is active.
    pub account: AccountKey,
    pub has_token_account: bool,
    pub balance: f64,
}

impl TokenBalance {
    pub fn none(mint: AccountKey) -> Self {
        Self {
            mint,
            account: AccountKey::zero(),
            has_token_account: false,
            balance: 0.0,
        }
    }
}

/// Read the principal's associated token account for `mint`.
pub(crate) async fn token_balance(ctx: &FetchContext, mint: AccountKey) -> DoveResult<TokenBalance> {
    let Some(principal) = ctx.principal() else {
        return Ok(TokenBalance::none(mint));
    };
    let account = associated_token_address(&principal.key(), &mint);
    let record = read_record::<TokenAccount>(ctx, &account).await?;
    Ok(TokenBalance {
        mint,
        account,
        has_token_account: record.is_some(),
        balance: record.map(|r| r.amount).unwrap_or(0.0),
    })
}

pub struct DvdCache;

#[async_trait]
impl CacheType for DvdCache {
    type Value = TokenBalance;
    const ID: CacheId = CacheId::new("dvd-cache");

    fn is_principal_scoped(&self) -> bool {
        true
    }

    fn dependencies(&self) -> Vec<Dependency> {
        vec![Dependency::required(WorldCache::ID)]
    }

    async fn fetch(&self, ctx: &FetchContext) -> DoveResult<TokenBalance> {
        let world: std::sync::Arc<WorldView> = ctx.dependency::<WorldCache>()?;
        token_balance(ctx, world.world.dvd.mint).await
    }

    fn mock(&self, _ctx: &FetchContext) -> TokenBalance {
        TokenBalance::none(AccountKey::zero())
    }
}

pub struct DoveCache;

#[async_trait]
impl CacheType for DoveCache {
    type Value = TokenBalance;
    const ID: CacheId = CacheId::new("dove-cache");

    fn is_principal_scoped(&self) -> bool {
        true
    }

    fn dependencies(&self) -> Vec<Dependency> {
        vec![Dependency::required(WorldCache::ID)]
    }

    async fn fetch(&self, ctx: &FetchContext) -> DoveResult<TokenBalance> {
        let world = ctx.dependency::<WorldCache>()?;
        token_balance(ctx, world.world.dove.mint).await
    }

    fn mock(&self, _ctx: &FetchContext) -> TokenBalance {
        TokenBalance::none(AccountKey::zero())
    }
}
