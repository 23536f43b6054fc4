//! The active principal's vault and its position.

use super::collateral::{CollateralCache, CollateralMap};
use super::read_record;
use super::world::{WorldCache, WorldView};
use crate::cache::{CacheType, Dependency, FetchContext};
use async_trait::async_trait;
use dove_core::{AccountKey, CacheId, DoveResult, Position, Vault};
use serde::Serialize;
use std::collections::BTreeMap;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VaultView {
    /// `None` when the principal has no vault yet or no principal is active.
    pub vault: Option<Vault>,
    pub reserve_indices: BTreeMap<AccountKey, u8>,
    /// Reserve mints and oracles in reserve order, as the program expects them.
    pub reserve_mints: Vec<AccountKey>,
    pub reserve_oracles: Vec<AccountKey>,
    pub position: Position,
}

impl VaultView {
    pub fn empty(max_ltv: f64) -> Self {
        Self {
            vault: None,
            reserve_indices: BTreeMap::new(),
            reserve_mints: Vec::new(),
            reserve_oracles: Vec::new(),
            position: Position::ZERO.with_max_ltv(max_ltv),
        }
    }

    /// Value the vault against collateral prices.
    pub fn new(vault: Vault, collateral: &CollateralMap, max_ltv: f64) -> Self {
        let mut reserve_indices = BTreeMap::new();
        let mut reserve_mints = Vec::with_capacity(vault.reserves.len());
        let mut reserve_oracles = Vec::with_capacity(vault.reserves.len());
        let mut collateral_value = 0.0;
        for (index, reserve) in vault.reserves.iter().enumerate() {
            if let Ok(index) = u8::try_from(index) {
                reserve_indices.insert(reserve.mint, index);
            }
            reserve_mints.push(reserve.mint);
            reserve_oracles.push(reserve.oracle);
            collateral_value += reserve.deposited * collateral.price_of(&reserve.mint);
        }
        let position = Position::new(collateral_value, vault.debt).with_max_ltv(max_ltv);
        Self {
            vault: Some(vault),
            reserve_indices,
            reserve_mints,
            reserve_oracles,
            position,
        }
    }

    pub fn reserve_index(&self, mint: &AccountKey) -> Option<u8> {
        self.reserve_indices.get(mint).copied()
    }

    /// Deposited amount of `mint`, zero if it has no reserve.
    pub fn deposited(&self, mint: &AccountKey) -> f64 {
        self.vault
            .as_ref()
            .and_then(|v| v.reserves.iter().find(|r| &r.mint == mint))
            .map(|r| r.deposited)
            .unwrap_or(0.0)
    }
}

pub struct VaultCache;

#[async_trait]
impl CacheType for VaultCache {
    type Value = VaultView;
    const ID: CacheId = CacheId::new("vault-cache");

    fn is_principal_scoped(&self) -> bool {
        true
    }

    fn dependencies(&self) -> Vec<Dependency> {
        vec![
            Dependency::required(WorldCache::ID),
            Dependency::required(CollateralCache::ID),
        ]
    }

    async fn fetch(&self, ctx: &FetchContext) -> DoveResult<VaultView> {
        let world: std::sync::Arc<WorldView> = ctx.dependency::<WorldCache>()?;
        let max_ltv = world.world.config.max_ltv;
        let Some(principal) = ctx.principal() else {
            return Ok(VaultView::empty(max_ltv));
        };
        let collateral = ctx.dependency::<CollateralCache>()?;
        let key = Vault::derive_key(&ctx.program_id(), &principal.key());
        Ok(match read_record::<Vault>(ctx, &key).await? {
            Some(vault) => VaultView::new(vault, &collateral, max_ltv),
            None => VaultView::empty(max_ltv),
        })
    }

    fn mock(&self, _ctx: &FetchContext) -> VaultView {
        VaultView::empty(dove_core::MAX_LTV)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::caches::collateral::CollateralInfo;
    use dove_core::Asset;
    use dove_test_utils::fixtures;

    fn sol_at(price: f64) -> CollateralMap {
        let mut map = CollateralMap::default();
        map.insert(CollateralInfo {
            asset: Asset::SOL,
            deposited: 0.0,
            decimals: 9,
            price,
            is_price_stale: false,
            max_deposit: 1e6,
            oracle_key: Asset::SOL.pyth_oracle,
        });
        map
    }

    #[test]
    fn test_position_from_reserves() {
        let vault = fixtures::vault(
            fixtures::principal(1),
            100.0,
            vec![fixtures::reserve(&Asset::SOL, 10.0)],
        );
        let view = VaultView::new(vault, &sol_at(100.0), 0.8);
        assert_eq!(view.position.collateral(), 1_000.0);
        assert_eq!(view.position.debt(), 100.0);
        assert!((view.position.available_to_borrow() - 700.0).abs() < 1e-9);
        assert_eq!(view.reserve_index(&Asset::SOL.mint), Some(0));
        assert_eq!(view.reserve_mints, vec![Asset::SOL.mint]);
        assert_eq!(view.deposited(&Asset::SOL.mint), 10.0);
        assert_eq!(view.deposited(&Asset::JUP.mint), 0.0);
    }

    #[test]
    fn test_unpriced_reserve_counts_as_zero() {
        let vault = fixtures::vault(
            fixtures::principal(1),
            0.0,
            vec![fixtures::reserve(&Asset::HNT, 50.0)],
        );
        let view = VaultView::new(vault, &sol_at(100.0), 0.8);
        assert_eq!(view.position.collateral(), 0.0);
        assert_eq!(view.reserve_index(&Asset::HNT.mint), Some(0));
    }

    #[test]
    fn test_empty_view() {
        let view = VaultView::empty(0.5);
        assert!(view.vault.is_none());
        assert_eq!(view.position.max_ltv(), 0.5);
        assert_eq!(view.reserve_index(&Asset::SOL.mint), None);
    }
}
