//! Amount-safety rules applied while composing actions.
//!
//! Clamping is advisory. It stops the ledger from building a submission the
//! snapshot already shows must fail, but the remote state can still move
//! before the submission lands.

use dove_core::{AmountPolicy, DoveResult, LedgerError};

/// Check a caller-supplied amount. `Ok(None)` means there is nothing to do.
pub fn requested(field: &str, amount: f64) -> DoveResult<Option<f64>> {
    if !amount.is_finite() {
        return Err(invalid(field, "must be a finite number"));
    }
    if amount <= 0.0 {
        return Ok(None);
    }
    Ok(Some(amount))
}

/// Cap `amount` at `available` when the policy asks for it.
pub fn clamp(policy: &AmountPolicy, field: &str, amount: f64, available: f64) -> DoveResult<f64> {
    if !policy.clamp_to_available {
        return Ok(amount);
    }
    let clamped = amount.min(available);
    if clamped <= 0.0 {
        return Err(invalid(field, "nothing available"));
    }
    if clamped < amount {
        tracing::debug!(field, requested = amount, clamped, "Amount clamped to available");
    }
    Ok(clamped)
}

/// Amount to submit for a repay of `amount` against `outstanding` debt.
///
/// Leaving less than the threshold behind promotes the repay to the full
/// sentinel, which the program caps at the real debt. The result is then
/// capped at the wallet balance.
pub fn repay_amount(
    policy: &AmountPolicy,
    amount: f64,
    outstanding: f64,
    balance: f64,
) -> DoveResult<f64> {
    let amount = if outstanding - amount < policy.full_repay_threshold {
        policy.full_repay_sentinel
    } else {
        amount
    };
    clamp(policy, "repay", amount, balance)
}

fn invalid(field: &str, reason: &str) -> dove_core::DoveError {
    LedgerError::InvalidAmount {
        field: field.to_string(),
        reason: reason.to_string(),
    }
    .into()
}
