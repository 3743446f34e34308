//! Jobs and workflows that combine the repository, the pool cache and the
//! pure engine.

pub mod distribution;
pub mod scheduler;
pub mod withdrawals;

pub use distribution::{DistributionError, DistributionReport, DistributionService, SystemInfo};
pub use scheduler::{DistributionScheduler, SchedulerError, SchedulerStatus};
pub use withdrawals::{request_withdrawal, WithdrawalError};
