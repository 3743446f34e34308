//! Custom pool registry and cached pool metrics.

use crate::domain::{CustomPool, Decimal, NewPool, TimeMs};
use sqlx::sqlite::SqliteRow;
use sqlx::Row;

use super::{bool_col, opt_decimal_col, opt_time_col, Repository};

const POOL_COLUMNS: &str = r#"
    id, address, name, network, token0_symbol, token1_symbol, token0_address,
    token1_address, fee_tier, active, cached_apr, cached_tvl, metrics_updated_at, created_by
"#;

fn pool_from_row(row: &SqliteRow) -> Result<CustomPool, sqlx::Error> {
    Ok(CustomPool {
        id: row.try_get("id")?,
        address: row.try_get("address")?,
        name: row.try_get("name")?,
        network: row.try_get("network")?,
        token0_symbol: row.try_get("token0_symbol")?,
        token1_symbol: row.try_get("token1_symbol")?,
        token0_address: row.try_get("token0_address")?,
        token1_address: row.try_get("token1_address")?,
        fee_tier: row.try_get("fee_tier")?,
        active: bool_col(row, "active")?,
        cached_apr: opt_decimal_col(row, "cached_apr")?,
        cached_tvl: opt_decimal_col(row, "cached_tvl")?,
        metrics_updated_at: opt_time_col(row, "metrics_updated_at")?,
        created_by: row.try_get("created_by")?,
    })
}

/// True when `err` is a UNIQUE constraint violation.
pub fn is_unique_violation(err: &sqlx::Error) -> bool {
    match err {
        sqlx::Error::Database(db) => db.is_unique_violation(),
        _ => false,
    }
}

impl Repository {
    /// Register a pool. Addresses are stored lowercased.
    ///
    /// # Errors
    /// Returns an error if the insert fails, including a unique violation
    /// when the address is already registered.
    pub async fn insert_pool(
        &self,
        pool: &NewPool,
        now: TimeMs,
    ) -> Result<CustomPool, sqlx::Error> {
        let address = pool.address.trim().to_lowercase();
        sqlx::query(
            r#"
            INSERT INTO custom_pools
            (address, name, network, token0_symbol, token1_symbol, token0_address,
             token1_address, fee_tier, active, created_by, created_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, 1, ?, ?)
            "#,
        )
        .bind(&address)
        .bind(&pool.name)
        .bind(pool.network.trim().to_lowercase())
        .bind(&pool.token0_symbol)
        .bind(&pool.token1_symbol)
        .bind(pool.token0_address.trim().to_lowercase())
        .bind(pool.token1_address.trim().to_lowercase())
        .bind(pool.fee_tier)
        .bind(&pool.created_by)
        .bind(now.as_ms())
        .execute(&self.pool)
        .await?;

        self.get_pool_by_address(&address)
            .await?
            .ok_or(sqlx::Error::RowNotFound)
    }

    /// Look up a pool by address (case-insensitive).
    ///
    /// # Errors
    /// Returns an error if the query fails.
    pub async fn get_pool_by_address(
        &self,
        address: &str,
    ) -> Result<Option<CustomPool>, sqlx::Error> {
        let sql = format!("SELECT {} FROM custom_pools WHERE address = ?", POOL_COLUMNS);
        let row = sqlx::query(&sql)
            .bind(address.trim().to_lowercase())
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(pool_from_row).transpose()
    }

    /// Pools the distribution job averages over.
    ///
    /// # Errors
    /// Returns an error if the query fails.
    pub async fn active_pools(&self) -> Result<Vec<CustomPool>, sqlx::Error> {
        let sql = format!(
            "SELECT {} FROM custom_pools WHERE active = 1 ORDER BY id ASC",
            POOL_COLUMNS
        );
        let rows = sqlx::query(&sql).fetch_all(&self.pool).await?;
        rows.iter().map(pool_from_row).collect()
    }

    /// Every registered pool, active or not.
    ///
    /// # Errors
    /// Returns an error if the query fails.
    pub async fn list_pools(&self) -> Result<Vec<CustomPool>, sqlx::Error> {
        let sql = format!("SELECT {} FROM custom_pools ORDER BY id ASC", POOL_COLUMNS);
        let rows = sqlx::query(&sql).fetch_all(&self.pool).await?;
        rows.iter().map(pool_from_row).collect()
    }

    /// Store freshly fetched metrics as the pool's fallback values.
    ///
    /// # Errors
    /// Returns an error if the update fails.
    pub async fn update_pool_metrics(
        &self,
        id: i64,
        apr: Decimal,
        tvl: Option<Decimal>,
        now: TimeMs,
    ) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"
            UPDATE custom_pools
            SET cached_apr = ?, cached_tvl = COALESCE(?, cached_tvl), metrics_updated_at = ?
            WHERE id = ?
            "#,
        )
        .bind(apr.to_canonical_string())
        .bind(tvl.map(|t| t.to_canonical_string()))
        .bind(now.as_ms())
        .bind(id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}
