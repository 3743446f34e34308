//! Domain types for the WayBank yield service.
//!
//! This module provides:
//! - Lossless numeric handling via Decimal wrapper
//! - Domain primitives: TimeMs, WalletAddress, Timeframe
//! - Position, pool, fee withdrawal and timeframe adjustment records
//! - Leads and billing profiles

pub mod adjustment;
pub mod billing;
pub mod decimal;
pub mod lead;
pub mod pool;
pub mod position;
pub mod primitives;
pub mod withdrawal;

pub use adjustment::{default_adjustments, AdjustmentMap, TimeframeAdjustment};
pub use billing::{BillingDetails, BillingProfile, VerificationStatus};
pub use decimal::Decimal;
pub use lead::{Lead, LeadStatus, LeadUpdate, NewLead};
pub use pool::{chain_label, fee_tier_label, CustomPool, NewPool, SUPPORTED_FEE_TIERS};
pub use position::{NewPosition, Position, PositionStatus};
pub use primitives::{utc_date, AddressParseError, TimeMs, Timeframe, WalletAddress};
pub use withdrawal::{FeeWithdrawal, NewWithdrawal, WithdrawalStatus, WithdrawalUpdate};
