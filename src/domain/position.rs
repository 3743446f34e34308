//! Liquidity position rows tracked in `position_history`.

use crate::domain::{Decimal, TimeMs, Timeframe, WalletAddress};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Lifecycle state of a position. Positions are never deleted, only closed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PositionStatus {
    Active,
    Closed,
}

impl PositionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PositionStatus::Active => "Active",
            PositionStatus::Closed => "Closed",
        }
    }
}

impl std::fmt::Display for PositionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PositionStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Active" => Ok(PositionStatus::Active),
            "Closed" => Ok(PositionStatus::Closed),
            other => Err(format!("unknown position status: {}", other)),
        }
    }
}

/// A stored position.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Position {
    pub id: i64,
    pub wallet_address: WalletAddress,
    pub pool_address: String,
    pub pool_name: String,
    pub token_pair: Option<String>,
    pub network: String,
    pub deposited_usdc: Decimal,
    /// APR quoted when the position was opened.
    pub apr: Decimal,
    /// APR recomputed by the daily job or lowered by a withdrawal penalty.
    pub current_apr: Option<Decimal>,
    /// Penalty carried since the first penalised withdrawal (zero when none).
    pub apr_penalty: Decimal,
    pub fees_earned: Decimal,
    pub fees_collected: Decimal,
    pub timeframe: Timeframe,
    pub status: PositionStatus,
    pub last_apr_update: Option<TimeMs>,
    pub last_accrual_date: Option<NaiveDate>,
    pub start_ms: TimeMs,
    pub closed_ms: Option<TimeMs>,
}

impl Position {
    /// APR the position currently earns, falling back to the contracted one.
    pub fn effective_apr(&self) -> Decimal {
        self.current_apr.unwrap_or(self.apr)
    }

    /// Fees accrued but not yet withdrawn.
    pub fn available_fees(&self) -> Decimal {
        (self.fees_earned - self.fees_collected).max(Decimal::zero())
    }

    pub fn is_active(&self) -> bool {
        self.status == PositionStatus::Active
    }

    pub fn has_penalty(&self) -> bool {
        self.apr_penalty.is_positive()
    }

    /// Whether the daily job already accrued this position on `date`.
    pub fn accrued_on(&self, date: NaiveDate) -> bool {
        self.last_accrual_date.is_some_and(|d| d >= date)
    }
}

/// Input for opening a position.
#[derive(Debug, Clone)]
pub struct NewPosition {
    pub wallet_address: WalletAddress,
    pub pool_address: String,
    pub pool_name: String,
    pub token_pair: Option<String>,
    pub network: String,
    pub deposited_usdc: Decimal,
    pub apr: Decimal,
    pub timeframe: Timeframe,
}
