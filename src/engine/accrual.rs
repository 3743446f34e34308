//! Daily APR accrual arithmetic.
//!
//! All functions are pure; the distribution job feeds them pool APRs and
//! position rows and persists the results.

use crate::domain::{AdjustmentMap, Decimal, Position};
use crate::engine::PenaltyPolicy;
use thiserror::Error;

pub const DAYS_PER_YEAR: i64 = 365;

/// Decimal places kept for adjusted APRs.
pub const APR_DP: u32 = 4;
/// Decimal places kept for a daily yield.
pub const YIELD_DP: u32 = 6;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum AccrualError {
    #[error("decimal overflow computing {0}")]
    Overflow(&'static str),
}

/// `pool_apr * (1 + adjustment_pct / 100)`, rounded to [`APR_DP`].
///
/// # Errors
/// Returns [`AccrualError::Overflow`] when the product is out of range.
pub fn adjusted_apr(pool_apr: Decimal, adjustment_pct: Decimal) -> Result<Decimal, AccrualError> {
    let overflow = AccrualError::Overflow("adjusted APR");
    let factor = adjustment_pct
        .checked_div(Decimal::hundred())
        .and_then(|pct| Decimal::from_i64(1).checked_add(pct))
        .ok_or(overflow)?;
    let apr = pool_apr.checked_mul(factor).ok_or(overflow)?;
    Ok(apr.round_dp(APR_DP))
}

/// `capital * annual_apr / 100 / 365`, rounded to [`YIELD_DP`]. May be negative.
///
/// # Errors
/// Returns [`AccrualError::Overflow`] when `capital * annual_apr` is out of range.
pub fn daily_yield(capital: Decimal, annual_apr: Decimal) -> Result<Decimal, AccrualError> {
    capital
        .checked_mul(annual_apr)
        .and_then(|v| v.checked_div(Decimal::hundred()))
        .and_then(|v| v.checked_div(Decimal::from_i64(DAYS_PER_YEAR)))
        .map(|v| v.round_dp(YIELD_DP))
        .ok_or(AccrualError::Overflow("daily yield"))
}

/// Arithmetic mean rounded to 2 dp, `None` for an empty slice.
pub fn average_apr(aprs: &[Decimal]) -> Option<Decimal> {
    if aprs.is_empty() {
        return None;
    }
    let total: Decimal = aprs.iter().copied().sum();
    Some((total / Decimal::from_i64(aprs.len() as i64)).round_dp(2))
}

/// Result of accruing one position for one day.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Accrual {
    pub adjustment: Decimal,
    pub adjusted_apr: Decimal,
    /// Adjusted APR after re-applying the position's withdrawal penalty.
    pub effective_apr: Decimal,
    /// Amount credited today, never negative.
    pub daily_yield: Decimal,
    pub new_fees_earned: Decimal,
}

/// Compute today's accrual for `position` given the base pool APR.
///
/// Timeframes without a configured adjustment accrue at the base APR. A
/// position that carries a penalty never accrues below the penalty floor,
/// even when the adjusted APR itself is under it.
///
/// # Errors
/// Returns [`AccrualError::Overflow`] when the position's capital or fees are
/// too large for the arithmetic.
pub fn accrue(
    position: &Position,
    base_apr: Decimal,
    adjustments: &AdjustmentMap,
    penalty: &PenaltyPolicy,
) -> Result<Accrual, AccrualError> {
    let adjustment = adjustments
        .get(&position.timeframe)
        .copied()
        .unwrap_or_default();
    let adjusted = adjusted_apr(base_apr, adjustment)?;

    let effective_apr = if position.has_penalty() {
        penalty
            .with_penalty(position.apr_penalty)
            .apply(adjusted)
            .apr_after
            .max(penalty.min_apr_for_penalty)
    } else {
        adjusted
    };

    let daily = daily_yield(position.deposited_usdc, effective_apr)?.max(Decimal::zero());
    let new_fees_earned = position
        .fees_earned
        .checked_add(daily)
        .ok_or(AccrualError::Overflow("fees earned"))?;

    Ok(Accrual {
        adjustment,
        adjusted_apr: adjusted,
        effective_apr,
        daily_yield: daily,
        new_fees_earned,
    })
}
