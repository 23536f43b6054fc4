//! Cache types for Dove protocol state.
//!
//! | Type                | Scope     | Depends on               |
//! |---------------------|-----------|--------------------------|
//! | `world-cache`       | shared    |                          |
//! | `collateral-cache`  | shared    |                          |
//! | `stability-cache`   | shared    |                          |
//! | `authority-cache`   | shared    |                          |
//! | `vault-cache`       | principal | world, collateral        |
//! | `savings-cache`     | principal | world                    |
//! | `dvd-cache`         | principal | world                    |
//! | `dove-cache`        | principal | world                    |
//! | `asset-cache`       | principal |                          |
//! | `stablecoin-cache`  | principal |                          |

pub mod assets;
pub mod authority;
pub mod collateral;
pub mod savings;
pub mod stability;
pub mod token;
pub mod vault;
pub mod world;

pub use assets::{AssetBalance, AssetBalances, AssetCache};
pub use authority::{AuthorityCache, AuthorityView};
pub use collateral::{CollateralCache, CollateralInfo, CollateralMap};
pub use savings::{SavingsCache, SavingsView};
pub use stability::{
    StabilityCache, StabilityInfo, StabilityPools, StablecoinBalance, StablecoinBalances,
    StablecoinCache,
};
pub use token::{DoveCache, DvdCache, TokenBalance};
pub use vault::{VaultCache, VaultView};
pub use world::{WorldCache, WorldView, DOVE_RELEASE};

use crate::cache::{FetchContext, RegistryBuilder};
use dove_core::{AccountKey, AccountRecord, DoveResult, Oracle, OraclePrice, ProtocolError};

/// Register every protocol cache type.
pub fn register_defaults(builder: RegistryBuilder) -> RegistryBuilder {
    builder
        .register(WorldCache)
        .register(CollateralCache)
        .register(StabilityCache)
        .register(AuthorityCache)
        .register(VaultCache)
        .register(SavingsCache)
        .register(DvdCache)
        .register(DoveCache)
        .register(AssetCache)
        .register(StablecoinCache)
}

/// Read and decode a record, `None` if the account does not exist.
pub(crate) async fn read_record<R: AccountRecord>(
    ctx: &FetchContext,
    key: &AccountKey,
) -> DoveResult<Option<R>> {
    match ctx.accessor().read(key).await? {
        Some(bytes) => R::from_bytes(&bytes).map(Some),
        None => Ok(None),
    }
}

/// Current price from an oracle account. A missing feed is an error.
pub(crate) async fn read_oracle_price(ctx: &FetchContext, oracle: &Oracle) -> DoveResult<OraclePrice> {
    let meta = ctx
        .accessor()
        .read_meta(&oracle.key)
        .await?
        .ok_or(ProtocolError::OracleUnavailable { key: oracle.key })?;
    oracle.price(&meta.data, ctx.unix_timestamp(), ctx.oracle_max_age_secs())
}
