//! Per-timeframe APR adjustments (`timeframe_adjustments`).

use crate::domain::{Decimal, TimeMs, Timeframe};
use std::collections::BTreeMap;
use std::str::FromStr;

/// Percentage modifier applied to the raw pool APR for one contract duration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TimeframeAdjustment {
    pub timeframe: Timeframe,
    pub adjustment_percentage: Decimal,
    pub description: String,
    pub updated_at: Option<TimeMs>,
    pub updated_by: Option<String>,
}

/// Lookup table keyed by timeframe.
pub type AdjustmentMap = BTreeMap<Timeframe, Decimal>;

/// Values the schema is seeded with and the job falls back to when the
/// table cannot be read.
pub fn default_adjustments() -> AdjustmentMap {
    [(30, "-24.56"), (90, "-17.37"), (365, "-4.52")]
        .into_iter()
        .filter_map(|(days, pct)| Decimal::from_str(pct).ok().map(|d| (Timeframe(days), d)))
        .collect()
}

pub fn to_map(adjustments: &[TimeframeAdjustment]) -> AdjustmentMap {
    adjustments
        .iter()
        .map(|a| (a.timeframe, a.adjustment_percentage))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_adjustments() {
        let map = default_adjustments();
        assert_eq!(map.len(), 3);
        assert_eq!(map[&Timeframe(30)].to_canonical_string(), "-24.56");
        assert_eq!(map[&Timeframe(365)].to_canonical_string(), "-4.52");
    }
}
