//! Fee withdrawal requests (`fee_withdrawals`).

use crate::domain::{Decimal, TimeMs, WalletAddress};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Admin-controlled processing state of a withdrawal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WithdrawalStatus {
    Pending,
    Confirmed,
    Rejected,
}

impl WithdrawalStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            WithdrawalStatus::Pending => "pending",
            WithdrawalStatus::Confirmed => "confirmed",
            WithdrawalStatus::Rejected => "rejected",
        }
    }
}

impl std::fmt::Display for WithdrawalStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for WithdrawalStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "pending" => Ok(WithdrawalStatus::Pending),
            "confirmed" => Ok(WithdrawalStatus::Confirmed),
            "rejected" => Ok(WithdrawalStatus::Rejected),
            other => Err(format!("unknown withdrawal status: {}", other)),
        }
    }
}

/// A recorded withdrawal with its APR audit trail.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeeWithdrawal {
    pub id: i64,
    pub wallet_address: WalletAddress,
    pub position_id: i64,
    pub pool_address: String,
    pub amount: Decimal,
    pub currency: String,
    pub status: WithdrawalStatus,
    pub transaction_hash: Option<String>,
    pub notes: Option<String>,
    pub processed_by: Option<String>,
    pub processed_at: Option<TimeMs>,
    pub requested_at: TimeMs,
    pub apr_before_withdrawal: Decimal,
    pub apr_after_withdrawal: Decimal,
    pub apr_penalty_applied: bool,
    pub apr_penalty_amount: Decimal,
}

/// Input for recording a withdrawal request.
#[derive(Debug, Clone)]
pub struct NewWithdrawal {
    pub wallet_address: WalletAddress,
    pub position_id: i64,
    pub amount: Decimal,
    pub currency: String,
    pub notes: Option<String>,
}

/// Fields an admin may change after creation.
#[derive(Debug, Clone, Default)]
pub struct WithdrawalUpdate {
    pub status: Option<WithdrawalStatus>,
    pub transaction_hash: Option<String>,
    pub notes: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_parse_is_case_insensitive() {
        assert_eq!(
            WithdrawalStatus::from_str("Confirmed"),
            Ok(WithdrawalStatus::Confirmed)
        );
        assert!(WithdrawalStatus::from_str("done").is_err());
    }

    #[test]
    fn test_status_serialization() {
        let json = serde_json::to_string(&WithdrawalStatus::Rejected).unwrap();
        assert_eq!(json, "\"rejected\"");
    }
}
