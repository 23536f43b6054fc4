//! Collateral asset and stablecoin catalogues.

use crate::identity::{AccountKey, NATIVE_MINT};
use serde::Serialize;
use std::fmt;

/// Display precision of asset amounts; balances below one unit of this
/// precision are treated as empty.
pub const ASSET_DECIMALS: i32 = 4;

/// Returns true when a balance is too small to show or act on.
pub fn is_negligible(balance: f64) -> bool {
    !(balance >= 10f64.powi(-ASSET_DECIMALS))
}

pub const LAMPORTS_PER_SOL: u64 = 1_000_000_000;

pub fn sol_to_lamports(sol: f64) -> u64 {
    if !(sol > 0.0) {
        return 0;
    }
    (sol * LAMPORTS_PER_SOL as f64).round() as u64
}

pub fn lamports_to_sol(lamports: u64) -> f64 {
    lamports as f64 / LAMPORTS_PER_SOL as f64
}

/// A collateral asset accepted by vaults.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Asset {
    pub name: &'static str,
    pub symbol: &'static str,
    pub mint: AccountKey,
    pub pyth_oracle: AccountKey,
    /// Price used by mock caches.
    pub debug_price: f64,
    pub is_native: bool,
}

impl Asset {
    pub const SOL: Asset = Asset {
        name: "Solana",
        symbol: "SOL",
        mint: NATIVE_MINT,
        pyth_oracle: AccountKey::from_hex_const(
            "60314704340deddf371fd42472148f248e9d1a6d1a5eb2ac3acd8b7fd5d6b243",
        ),
        debug_price: 159.23,
        is_native: true,
    };

    pub const HNT: Asset = Asset {
        name: "Helium",
        symbol: "HNT",
        mint: AccountKey::from_hex_const(
            "0a732093918561f7dd7fcbec4abd8513deca1a967f7ad7a39d63b41ed893808b",
        ),
        pyth_oracle: AccountKey::from_hex_const(
            "2fcf991162df7bef8d141e22adee65d14c9a83956e7b24770a42aa56e94fa2fa",
        ),
        debug_price: 7.495,
        is_native: false,
    };

    pub const PYTH: Asset = Asset {
        name: "Pyth Network",
        symbol: "PYTH",
        mint: AccountKey::from_hex_const(
            "f5edec8471c75624ebc4079a634326d96a689e6157d79abe8f5a6f94472853bc",
        ),
        pyth_oracle: AccountKey::from_hex_const(
            "75c5c6e82f9a851c55ffc46c8092b3cdf44b5ee5aa91640e42f277643e871499",
        ),
        debug_price: 0.3566,
        is_native: false,
    };

    pub const JUP: Asset = Asset {
        name: "Jupiter",
        symbol: "JUP",
        mint: AccountKey::from_hex_const(
            "0479d9c7cc1035de7211f99eb48c09d70b2bdf5bdf9e2e56b8a1fbb5a2ea3327",
        ),
        pyth_oracle: AccountKey::from_hex_const(
            "628661ff844a6d513411aa02952b8bf902e3b2fe282639f9c96d399e52d86468",
        ),
        debug_price: 0.8971,
        is_native: false,
    };

    pub const RENDER: Asset = Asset {
        name: "Render",
        symbol: "RENDER",
        mint: AccountKey::from_hex_const(
            "0cc10f516aaae9c14ba9471f60abd392dcd786d57354abedeee7289dd40a0a0a",
        ),
        pyth_oracle: AccountKey::from_hex_const(
            "f03b0d1faa79882f142960b04b65774a7375ed417904621add600f220277f1d0",
        ),
        debug_price: 6.427,
        is_native: false,
    };

    pub const LIST: [Asset; 5] = [Asset::SOL, Asset::HNT, Asset::PYTH, Asset::JUP, Asset::RENDER];

    pub fn by_mint(mint: &AccountKey) -> Option<Asset> {
        Self::LIST.iter().copied().find(|a| &a.mint == mint)
    }

    pub fn by_symbol(symbol: &str) -> Option<Asset> {
        Self::LIST
            .iter()
            .copied()
            .find(|a| a.symbol.eq_ignore_ascii_case(symbol))
    }
}

impl fmt::Display for Asset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.symbol)
    }
}

/// A stablecoin that can be swapped against DVD.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Stablecoin {
    pub name: &'static str,
    pub symbol: &'static str,
    pub mint: AccountKey,
    /// A stability pool exists for this coin.
    pub has_stability: bool,
    pub is_2022: bool,
}

impl Stablecoin {
    pub const USDC: Stablecoin = Stablecoin {
        name: "USD Coin",
        symbol: "USDC",
        mint: AccountKey::from_hex_const(
            "c6fa7af3bedbad3a3d65f36aabc97431b1bbe4c2d2f6e0e47ca60203452f5d61",
        ),
        has_stability: true,
        is_2022: false,
    };

    pub const USDT: Stablecoin = Stablecoin {
        name: "Tether",
        symbol: "USDT",
        mint: AccountKey::from_hex_const(
            "ce010e60afedb22717bd63192f54145a3f965a33bb82d2c7029eb2ce1e208264",
        ),
        has_stability: true,
        is_2022: false,
    };

    pub const PYUSD: Stablecoin = Stablecoin {
        name: "PayPal USD",
        symbol: "PYUSD",
        mint: AccountKey::from_hex_const(
            "1792483b6c8a2a87b7471d814f9591f9395c840a9ce3d9f4d5ba7d3a4b8a749e",
        ),
        has_stability: false,
        is_2022: true,
    };

    pub const LIST: [Stablecoin; 3] = [Stablecoin::USDC, Stablecoin::USDT, Stablecoin::PYUSD];

    pub fn by_mint(mint: &AccountKey) -> Option<Stablecoin> {
        Self::LIST.iter().copied().find(|s| &s.mint == mint)
    }

    pub fn with_stability() -> impl Iterator<Item = Stablecoin> {
        Self::LIST.into_iter().filter(|s| s.has_stability)
    }
}

impl fmt::Display for Stablecoin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.symbol)
    }
}
