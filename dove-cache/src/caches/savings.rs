//! The active principal's savings account.

use super::read_record;
use super::world::WorldCache;
use crate::cache::{CacheType, Dependency, FetchContext};
use async_trait::async_trait;
use dove_core::{CacheId, DoveResult, Savings};
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct SavingsView {
    pub savings: Option<Savings>,
    /// Fraction of all savings held by this account.
    pub share: f64,
}

impl SavingsView {
    pub const EMPTY: SavingsView = SavingsView {
        savings: None,
        share: 0.0,
    };

    pub fn deposited(&self) -> f64 {
        self.savings.map(|s| s.deposited).unwrap_or(0.0)
    }

    pub fn pending_rewards(&self) -> f64 {
        self.savings.map(|s| s.pending_rewards).unwrap_or(0.0)
    }
}

pub struct SavingsCache;

#[async_trait]
impl CacheType for SavingsCache {
    type Value = SavingsView;
    const ID: CacheId = CacheId::new("savings-cache");

    fn is_principal_scoped(&self) -> bool {
        true
    }

    fn dependencies(&self) -> Vec<Dependency> {
        vec![Dependency::required(WorldCache::ID)]
    }

    async fn fetch(&self, ctx: &FetchContext) -> DoveResult<SavingsView> {
        let world = ctx.dependency::<WorldCache>()?;
        let Some(principal) = ctx.principal() else {
            return Ok(SavingsView::EMPTY);
        };
        let key = Savings::derive_key(&ctx.program_id(), &principal.key());
        let savings = read_record::<Savings>(ctx, &key).await?;
        let share = match savings {
            Some(s) if world.savings_total > 0.0 => s.deposited / world.savings_total,
            _ => 0.0,
        };
        Ok(SavingsView { savings, share })
    }

    fn mock(&self, _ctx: &FetchContext) -> SavingsView {
        SavingsView::EMPTY
    }
}
