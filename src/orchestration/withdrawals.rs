//! Fee withdrawal requests.

use crate::db::Repository;
use crate::domain::{Decimal, FeeWithdrawal, NewWithdrawal, TimeMs};
use crate::engine::{PenaltyOutcome, PenaltyPolicy};
use thiserror::Error;
use tracing::{info, warn};

#[derive(Debug, Error)]
pub enum WithdrawalError {
    #[error("position {0} not found")]
    PositionNotFound(i64),
    #[error("position belongs to another wallet")]
    NotOwner,
    #[error("position {0} is closed")]
    PositionClosed(i64),
    #[error("invalid amount: {0}")]
    InvalidAmount(String),
    #[error("amount {requested} exceeds available fees {available}")]
    InsufficientFees {
        requested: Decimal,
        available: Decimal,
    },
    #[error("position changed while the withdrawal was processed, retry")]
    Concurrent,
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

/// Validate and record a withdrawal, applying the APR penalty to the
/// position.
///
/// The position's current APR (or its contracted APR before the first
/// accrual) is penalised once; a position that already carries a penalty
/// keeps it rather than accumulating another.
///
/// # Errors
/// See [`WithdrawalError`].
pub async fn request_withdrawal(
    repo: &Repository,
    policy: &PenaltyPolicy,
    request: &NewWithdrawal,
    now: TimeMs,
) -> Result<FeeWithdrawal, WithdrawalError> {
    if !request.amount.is_positive() {
        return Err(WithdrawalError::InvalidAmount(
            "must be greater than zero".to_string(),
        ));
    }

    let position = repo
        .get_position(request.position_id)
        .await?
        .ok_or(WithdrawalError::PositionNotFound(request.position_id))?;

    if position.wallet_address != request.wallet_address {
        warn!(
            "Wallet {} tried to withdraw from position {} owned by {}",
            request.wallet_address, position.id, position.wallet_address
        );
        return Err(WithdrawalError::NotOwner);
    }
    if !position.is_active() {
        return Err(WithdrawalError::PositionClosed(position.id));
    }

    let available = position.available_fees();
    if request.amount > available {
        return Err(WithdrawalError::InsufficientFees {
            requested: request.amount,
            available,
        });
    }

    let current_apr = position.effective_apr();
    let (outcome, position_penalty) = if position.has_penalty() {
        let outcome = PenaltyOutcome {
            apr_before: current_apr,
            apr_after: current_apr,
            applied: false,
            penalty_amount: position.apr_penalty,
        };
        (outcome, position.apr_penalty)
    } else {
        let outcome = policy.apply(current_apr);
        let penalty = if outcome.applied {
            policy.penalty_pct
        } else {
            Decimal::zero()
        };
        (outcome, penalty)
    };

    let withdrawal = repo
        .record_withdrawal(
            request,
            &position.pool_address,
            &outcome,
            position_penalty,
            position.fees_collected,
            now,
        )
        .await?
        .ok_or(WithdrawalError::Concurrent)?;

    info!(
        "Withdrawal {} of {} {} from position {}: APR {}% -> {}% (penalty applied: {})",
        withdrawal.id,
        withdrawal.amount,
        withdrawal.currency,
        position.id,
        outcome.apr_before,
        outcome.apr_after,
        outcome.applied
    );
    Ok(withdrawal)
}
