//! Pure computation for APR accrual and withdrawal penalties.

pub mod accrual;
pub mod penalty;

pub use accrual::{accrue, adjusted_apr, average_apr, daily_yield, Accrual, AccrualError};
pub use penalty::{PenaltyOutcome, PenaltyPolicy};
