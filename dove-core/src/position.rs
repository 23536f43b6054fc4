//! Vault position risk model.

use serde::Serialize;

const NONE_LTV: f64 = 0.001;
const CONSERVATIVE_LTV: f64 = 0.26;
const MODERATE_LTV: f64 = 0.4;
const AGGRESSIVE_LTV: f64 = 0.7;
/// Default loan-to-value ceiling when the protocol config is not at hand.
pub const MAX_LTV: f64 = 0.8;
/// Amounts below this are treated as zero.
const DUST: f64 = 0.01;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub enum RiskLevel {
    None,
    Conservative,
    Moderate,
    Aggressive,
    Liquidation,
}

/// Collateral value and debt of a vault, both in DVD.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Position {
    collateral: f64,
    debt: f64,
    max_ltv: f64,
}

impl Position {
    pub const ZERO: Position = Position {
        collateral: 0.0,
        debt: 0.0,
        max_ltv: MAX_LTV,
    };

    pub fn new(collateral: f64, debt: f64) -> Self {
        Self {
            collateral: clean(collateral),
            debt: clean(debt),
            max_ltv: MAX_LTV,
        }
    }

    /// Use the protocol's configured ceiling instead of the default.
    pub fn with_max_ltv(mut self, max_ltv: f64) -> Self {
        if max_ltv > 0.0 && max_ltv.is_finite() {
            self.max_ltv = max_ltv;
        }
        self
    }

    pub fn with_collateral(&self, collateral: f64) -> Self {
        Self::new(collateral, self.debt).with_max_ltv(self.max_ltv)
    }

    pub fn with_debt(&self, debt: f64) -> Self {
        Self::new(self.collateral, debt).with_max_ltv(self.max_ltv)
    }

    pub fn collateral(&self) -> f64 {
        self.collateral
    }

    pub fn debt(&self) -> f64 {
        self.debt
    }

    pub fn max_ltv(&self) -> f64 {
        self.max_ltv
    }

    pub fn ltv(&self) -> f64 {
        if self.collateral > 0.0 && self.debt > 0.0 {
            self.debt / self.collateral
        } else {
            0.0
        }
    }

    pub fn risk_level(&self) -> RiskLevel {
        let ltv = self.ltv();
        if ltv < NONE_LTV {
            RiskLevel::None
        } else if ltv < CONSERVATIVE_LTV {
            RiskLevel::Conservative
        } else if ltv < MODERATE_LTV {
            RiskLevel::Moderate
        } else if ltv < AGGRESSIVE_LTV {
            RiskLevel::Aggressive
        } else {
            RiskLevel::Liquidation
        }
    }

    pub fn is_unhealthy(&self) -> bool {
        self.risk_level() == RiskLevel::Liquidation
    }

    pub fn borrow_capacity(&self) -> f64 {
        self.collateral * self.max_ltv
    }

    pub fn available_to_borrow(&self) -> f64 {
        (self.borrow_capacity() - self.debt).max(0.0)
    }

    pub fn available_to_withdraw(&self) -> f64 {
        (self.collateral - self.debt / self.max_ltv).max(0.0)
    }

    /// Collateral value at which the position becomes liquidatable.
    pub fn liquidation_point(&self) -> f64 {
        self.debt / self.max_ltv
    }

    /// How far, in percent, collateral value can fall before liquidation.
    pub fn max_collateral_drop_percentage(&self) -> f64 {
        if self.collateral == 0.0 {
            return 0.0;
        }
        ((1.0 - self.liquidation_point() / self.collateral) * 100.0).max(0.0)
    }
}

impl Default for Position {
    fn default() -> Self {
        Self::ZERO
    }
}

fn clean(amount: f64) -> f64 {
    if amount.is_nan() || amount < DUST {
        0.0
    } else {
        amount
    }
}
