//! Early fee-withdrawal APR penalty.

use crate::domain::Decimal;
use serde::Serialize;
use std::str::FromStr;

/// Flat APR penalty with a floor below which no penalty applies.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PenaltyPolicy {
    pub penalty_pct: Decimal,
    pub min_apr_for_penalty: Decimal,
}

/// Before/after values recorded on the withdrawal for audit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PenaltyOutcome {
    pub apr_before: Decimal,
    pub apr_after: Decimal,
    pub applied: bool,
    pub penalty_amount: Decimal,
}

impl PenaltyPolicy {
    pub fn new(penalty_pct: Decimal, min_apr_for_penalty: Decimal) -> Self {
        Self {
            penalty_pct,
            min_apr_for_penalty,
        }
    }

    /// Same floor, different penalty: used to re-apply the penalty a position
    /// already carries.
    pub fn with_penalty(&self, penalty_pct: Decimal) -> Self {
        Self {
            penalty_pct,
            min_apr_for_penalty: self.min_apr_for_penalty,
        }
    }

    /// Apply the penalty to `current_apr`.
    ///
    /// Only APRs strictly above the floor are penalised, and the result is
    /// clamped to the floor.
    pub fn apply(&self, current_apr: Decimal) -> PenaltyOutcome {
        if current_apr > self.min_apr_for_penalty {
            PenaltyOutcome {
                apr_before: current_apr,
                apr_after: (current_apr - self.penalty_pct).max(self.min_apr_for_penalty),
                applied: true,
                penalty_amount: self.penalty_pct,
            }
        } else {
            PenaltyOutcome {
                apr_before: current_apr,
                apr_after: current_apr,
                applied: false,
                penalty_amount: self.penalty_pct,
            }
        }
    }
}

impl Default for PenaltyPolicy {
    fn default() -> Self {
        Self {
            penalty_pct: Decimal::from_str("7.73").unwrap_or_default(),
            min_apr_for_penalty: Decimal::from_i64(30),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(s: &str) -> Decimal {
        Decimal::from_str(s).unwrap()
    }

    #[test]
    fn test_penalty_applied_above_floor() {
        let outcome = PenaltyPolicy::default().apply(d("85"));
        assert!(outcome.applied);
        assert_eq!(outcome.apr_before, d("85"));
        assert_eq!(outcome.apr_after.to_canonical_string(), "77.27");
        assert_eq!(outcome.penalty_amount, d("7.73"));
    }

    #[test]
    fn test_penalty_clamped_to_floor() {
        let outcome = PenaltyPolicy::default().apply(d("33"));
        assert!(outcome.applied);
        assert_eq!(outcome.apr_after, d("30"));
    }

    #[test]
    fn test_no_penalty_at_or_below_floor() {
        let policy = PenaltyPolicy::default();

        let at_floor = policy.apply(d("30"));
        assert!(!at_floor.applied);
        assert_eq!(at_floor.apr_after, d("30"));

        let below = policy.apply(d("12.5"));
        assert!(!below.applied);
        assert_eq!(below.apr_after, d("12.5"));
    }

    #[test]
    fn test_applied_result_never_below_floor() {
        let policy = PenaltyPolicy::new(d("50"), d("30"));
        for apr in ["30.01", "31", "45", "79.99", "80", "120"] {
            let outcome = policy.apply(d(apr));
            assert!(outcome.applied);
            assert!(
                outcome.apr_after >= policy.min_apr_for_penalty,
                "apr {} dropped below floor",
                apr
            );
        }
    }

    #[test]
    fn test_with_penalty_keeps_floor() {
        let policy = PenaltyPolicy::default().with_penalty(d("2"));
        assert_eq!(policy.min_apr_for_penalty, d("30"));
        assert_eq!(policy.apply(d("40")).apr_after, d("38"));
    }
}
