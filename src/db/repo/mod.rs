//! Repository layer for database operations.
//!
//! This module provides the `Repository` struct for all database operations.
//! Methods are organized across submodules by table:
//! - `positions.rs` - position lifecycle and daily accrual updates
//! - `pools.rs` - custom pools and their cached metrics
//! - `withdrawals.rs` - fee withdrawal requests
//! - `adjustments.rs` - per-timeframe APR adjustments
//! - `distributions.rs` - distribution run history
//! - `leads.rs` - landing-page contact requests
//! - `billing_profiles.rs` - per-wallet invoicing details

mod adjustments;
mod billing_profiles;
mod distributions;
mod leads;
mod pools;
mod positions;
mod withdrawals;

pub use distributions::DistributionRun;
pub use pools::is_unique_violation;

use crate::domain::{Decimal, TimeMs, WalletAddress};
use chrono::NaiveDate;
use sqlx::sqlite::{SqlitePool, SqliteRow};
use sqlx::Row;
use std::str::FromStr;

/// Repository for database operations.
pub struct Repository {
    pool: SqlitePool,
}

impl Repository {
    /// Create a new repository with the given connection pool.
    pub fn new(pool: SqlitePool) -> Self {
        Repository { pool }
    }

    /// Connectivity check used by the readiness endpoint.
    pub async fn ping(&self) -> Result<(), sqlx::Error> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}

fn decode_error(column: &str, err: impl std::error::Error + Send + Sync + 'static) -> sqlx::Error {
    sqlx::Error::ColumnDecode {
        index: column.to_string(),
        source: Box::new(err),
    }
}

#[derive(Debug, thiserror::Error)]
#[error("{0}")]
struct ParseColumnError(String);

pub(crate) fn decimal_col(row: &SqliteRow, column: &str) -> Result<Decimal, sqlx::Error> {
    let raw: String = row.try_get(column)?;
    Decimal::from_str(&raw).map_err(|e| decode_error(column, e))
}

pub(crate) fn opt_decimal_col(
    row: &SqliteRow,
    column: &str,
) -> Result<Option<Decimal>, sqlx::Error> {
    let raw: Option<String> = row.try_get(column)?;
    raw.map(|s| Decimal::from_str(&s).map_err(|e| decode_error(column, e)))
        .transpose()
}

pub(crate) fn opt_time_col(row: &SqliteRow, column: &str) -> Result<Option<TimeMs>, sqlx::Error> {
    let raw: Option<i64> = row.try_get(column)?;
    Ok(raw.map(TimeMs::new))
}

pub(crate) fn opt_date_col(
    row: &SqliteRow,
    column: &str,
) -> Result<Option<NaiveDate>, sqlx::Error> {
    let raw: Option<String> = row.try_get(column)?;
    raw.map(|s| NaiveDate::from_str(&s).map_err(|e| decode_error(column, e)))
        .transpose()
}

pub(crate) fn wallet_col(row: &SqliteRow, column: &str) -> Result<WalletAddress, sqlx::Error> {
    let raw: String = row.try_get(column)?;
    WalletAddress::from_str(&raw).map_err(|e| decode_error(column, e))
}

pub(crate) fn bool_col(row: &SqliteRow, column: &str) -> Result<bool, sqlx::Error> {
    Ok(row.try_get::<i64, _>(column)? != 0)
}

pub(crate) fn parse_col<T>(row: &SqliteRow, column: &str) -> Result<T, sqlx::Error>
where
    T: FromStr<Err = String>,
{
    let raw: String = row.try_get(column)?;
    T::from_str(&raw).map_err(|e| decode_error(column, ParseColumnError(e)))
}
