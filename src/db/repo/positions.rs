//! Position lifecycle and daily accrual operations for the repository.

use crate::domain::{
    Decimal, NewPosition, Position, PositionStatus, TimeMs, Timeframe, WalletAddress,
};
use crate::engine::Accrual;
use chrono::NaiveDate;
use sqlx::sqlite::SqliteRow;
use sqlx::Row;

use super::{
    decimal_col, opt_date_col, opt_decimal_col, opt_time_col, parse_col, wallet_col, Repository,
};

const POSITION_COLUMNS: &str = r#"
    id, wallet_address, pool_address, pool_name, token_pair, network,
    deposited_usdc, apr, current_apr, apr_penalty, fees_earned, fees_collected,
    timeframe, status, last_apr_update, last_accrual_date, start_ms, closed_ms
"#;

pub(super) fn position_from_row(row: &SqliteRow) -> Result<Position, sqlx::Error> {
    Ok(Position {
        id: row.try_get("id")?,
        wallet_address: wallet_col(row, "wallet_address")?,
        pool_address: row.try_get("pool_address")?,
        pool_name: row.try_get("pool_name")?,
        token_pair: row.try_get("token_pair")?,
        network: row.try_get("network")?,
        deposited_usdc: decimal_col(row, "deposited_usdc")?,
        apr: decimal_col(row, "apr")?,
        current_apr: opt_decimal_col(row, "current_apr")?,
        apr_penalty: decimal_col(row, "apr_penalty")?,
        fees_earned: decimal_col(row, "fees_earned")?,
        fees_collected: decimal_col(row, "fees_collected")?,
        timeframe: Timeframe(row.try_get("timeframe")?),
        status: parse_col::<PositionStatus>(row, "status")?,
        last_apr_update: opt_time_col(row, "last_apr_update")?,
        last_accrual_date: opt_date_col(row, "last_accrual_date")?,
        start_ms: TimeMs::new(row.try_get("start_ms")?),
        closed_ms: opt_time_col(row, "closed_ms")?,
    })
}

impl Repository {
    /// Open a new position and return the stored row.
    ///
    /// # Errors
    /// Returns an error if the insert fails.
    pub async fn insert_position(
        &self,
        position: &NewPosition,
        now: TimeMs,
    ) -> Result<Position, sqlx::Error> {
        let result = sqlx::query(
            r#"
            INSERT INTO position_history
            (wallet_address, pool_address, pool_name, token_pair, network,
             deposited_usdc, apr, timeframe, status, start_ms, created_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(position.wallet_address.as_str())
        .bind(&position.pool_address)
        .bind(&position.pool_name)
        .bind(&position.token_pair)
        .bind(&position.network)
        .bind(position.deposited_usdc.to_canonical_string())
        .bind(position.apr.to_canonical_string())
        .bind(position.timeframe.days())
        .bind(PositionStatus::Active.as_str())
        .bind(now.as_ms())
        .bind(now.as_ms())
        .execute(&self.pool)
        .await?;

        let id = result.last_insert_rowid();
        self.get_position(id).await?.ok_or(sqlx::Error::RowNotFound)
    }

    /// Fetch a single position by id.
    ///
    /// # Errors
    /// Returns an error if the query fails or a column cannot be decoded.
    pub async fn get_position(&self, id: i64) -> Result<Option<Position>, sqlx::Error> {
        let sql = format!("SELECT {} FROM position_history WHERE id = ?", POSITION_COLUMNS);
        let row = sqlx::query(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(position_from_row).transpose()
    }

    /// All positions owned by `wallet`, newest first.
    ///
    /// # Errors
    /// Returns an error if the query fails or a column cannot be decoded.
    pub async fn positions_by_wallet(
        &self,
        wallet: &WalletAddress,
    ) -> Result<Vec<Position>, sqlx::Error> {
        let sql = format!(
            r#"
            SELECT {} FROM position_history
            WHERE wallet_address = ?
            ORDER BY start_ms DESC, id DESC
            "#,
            POSITION_COLUMNS
        );
        let rows = sqlx::query(&sql)
            .bind(wallet.as_str())
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(position_from_row).collect()
    }

    /// Positions the daily job accrues, in id order.
    ///
    /// # Errors
    /// Returns an error if the query fails or a column cannot be decoded.
    pub async fn active_positions(&self) -> Result<Vec<Position>, sqlx::Error> {
        let sql = format!(
            "SELECT {} FROM position_history WHERE status = ? ORDER BY id ASC",
            POSITION_COLUMNS
        );
        let rows = sqlx::query(&sql)
            .bind(PositionStatus::Active.as_str())
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(position_from_row).collect()
    }

    /// Flip an active position to `Closed`. Returns false when the position
    /// does not exist or is already closed.
    ///
    /// # Errors
    /// Returns an error if the update fails.
    pub async fn close_position(&self, id: i64, now: TimeMs) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            r#"
            UPDATE position_history
            SET status = ?, closed_ms = ?
            WHERE id = ? AND status = ?
            "#,
        )
        .bind(PositionStatus::Closed.as_str())
        .bind(now.as_ms())
        .bind(id)
        .bind(PositionStatus::Active.as_str())
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() == 1)
    }

    /// Persist one day of accrual.
    ///
    /// The update only applies to an active position that has not yet
    /// accrued on `date` and still carries `expected_penalty`, the penalty the
    /// accrual was computed with. Returns false when the guard rejected it.
    ///
    /// # Errors
    /// Returns an error if the update fails.
    pub async fn accrue_position(
        &self,
        id: i64,
        accrual: &Accrual,
        expected_penalty: Decimal,
        date: NaiveDate,
        now: TimeMs,
    ) -> Result<bool, sqlx::Error> {
        let date = date.format("%Y-%m-%d").to_string();
        let result = sqlx::query(
            r#"
            UPDATE position_history
            SET fees_earned = ?, current_apr = ?, last_apr_update = ?, last_accrual_date = ?
            WHERE id = ? AND status = ? AND apr_penalty = ?
              AND (last_accrual_date IS NULL OR last_accrual_date < ?)
            "#,
        )
        .bind(accrual.new_fees_earned.to_canonical_string())
        .bind(accrual.effective_apr.to_canonical_string())
        .bind(now.as_ms())
        .bind(&date)
        .bind(id)
        .bind(PositionStatus::Active.as_str())
        .bind(expected_penalty.to_canonical_string())
        .bind(&date)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() == 1)
    }
}

#[cfg(test)]
mod tests {
    use super::super::test_support::{new_position, setup_repo, WALLET};
    use super::*;
    use std::str::FromStr;

    fn accrual(fees: &str, apr: &str) -> Accrual {
        Accrual {
            adjustment: Decimal::zero(),
            adjusted_apr: Decimal::from_str(apr).unwrap(),
            effective_apr: Decimal::from_str(apr).unwrap(),
            daily_yield: Decimal::from_str(fees).unwrap(),
            new_fees_earned: Decimal::from_str(fees).unwrap(),
        }
    }

    #[tokio::test]
    async fn test_insert_and_get_position() {
        let (repo, _temp) = setup_repo().await;
        let created = repo
            .insert_position(&new_position(WALLET, "5000", 30), TimeMs::new(1_000))
            .await
            .unwrap();

        assert_eq!(created.deposited_usdc.to_canonical_string(), "5000");
        assert_eq!(created.status, PositionStatus::Active);
        assert_eq!(created.fees_earned, Decimal::zero());
        assert_eq!(created.current_apr, None);
        assert_eq!(created.timeframe, Timeframe(30));

        let fetched = repo.get_position(created.id).await.unwrap().unwrap();
        assert_eq!(fetched, created);
        assert!(repo.get_position(999).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_positions_by_wallet_filters_owner() {
        let (repo, _temp) = setup_repo().await;
        let other = "0x2222222222222222222222222222222222222222";
        repo.insert_position(&new_position(WALLET, "100", 30), TimeMs::new(1))
            .await
            .unwrap();
        repo.insert_position(&new_position(other, "200", 90), TimeMs::new(2))
            .await
            .unwrap();

        let mine = repo
            .positions_by_wallet(&WalletAddress::from_str(WALLET).unwrap())
            .await
            .unwrap();
        assert_eq!(mine.len(), 1);
        assert_eq!(mine[0].deposited_usdc, Decimal::from_i64(100));
    }

    #[tokio::test]
    async fn test_close_position_excludes_from_active() {
        let (repo, _temp) = setup_repo().await;
        let p = repo
            .insert_position(&new_position(WALLET, "100", 30), TimeMs::new(1))
            .await
            .unwrap();

        assert!(repo.close_position(p.id, TimeMs::new(5)).await.unwrap());
        assert!(!repo.close_position(p.id, TimeMs::new(6)).await.unwrap());
        assert!(repo.active_positions().await.unwrap().is_empty());

        let closed = repo.get_position(p.id).await.unwrap().unwrap();
        assert_eq!(closed.status, PositionStatus::Closed);
        assert_eq!(closed.closed_ms, Some(TimeMs::new(5)));
    }

    #[tokio::test]
    async fn test_accrue_position_once_per_day() {
        let (repo, _temp) = setup_repo().await;
        let p = repo
            .insert_position(&new_position(WALLET, "5000", 30), TimeMs::new(1))
            .await
            .unwrap();
        let day = NaiveDate::from_ymd_opt(2026, 5, 2).unwrap();
        let zero = Decimal::zero();

        assert!(repo
            .accrue_position(p.id, &accrual("2.876712", "21"), zero, day, TimeMs::new(10))
            .await
            .unwrap());
        assert!(!repo
            .accrue_position(p.id, &accrual("5.753424", "21"), zero, day, TimeMs::new(11))
            .await
            .unwrap());

        let stored = repo.get_position(p.id).await.unwrap().unwrap();
        assert_eq!(stored.fees_earned.to_canonical_string(), "2.876712");
        assert_eq!(stored.current_apr, Some(Decimal::from_i64(21)));
        assert_eq!(stored.last_accrual_date, Some(day));
        assert_eq!(stored.last_apr_update, Some(TimeMs::new(10)));

        let next = day.succ_opt().unwrap();
        assert!(repo
            .accrue_position(p.id, &accrual("5.753424", "21"), zero, next, TimeMs::new(12))
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn test_accrue_position_rejects_stale_penalty_snapshot() {
        let (repo, _temp) = setup_repo().await;
        repo.insert_position(&new_position(WALLET, "5000", 30), TimeMs::new(1))
            .await
            .unwrap();
        let snapshot = repo.active_positions().await.unwrap().remove(0);

        // A withdrawal commits a penalty after the batch loaded its snapshot.
        let policy = crate::engine::PenaltyPolicy::default();
        let outcome = policy.apply(Decimal::from_i64(40));
        repo.record_withdrawal(
            &crate::domain::NewWithdrawal {
                wallet_address: WalletAddress::from_str(WALLET).unwrap(),
                position_id: snapshot.id,
                amount: Decimal::zero(),
                currency: "USDC".to_string(),
                notes: None,
            },
            &snapshot.pool_address,
            &outcome,
            policy.penalty_pct,
            Decimal::zero(),
            TimeMs::new(5),
        )
        .await
        .unwrap()
        .unwrap();

        let day = NaiveDate::from_ymd_opt(2026, 5, 2).unwrap();
        let written = repo
            .accrue_position(
                snapshot.id,
                &accrual("2.876712", "40"),
                snapshot.apr_penalty,
                day,
                TimeMs::new(10),
            )
            .await
            .unwrap();
        assert!(!written);

        let stored = repo.get_position(snapshot.id).await.unwrap().unwrap();
        assert_eq!(stored.current_apr, Some(Decimal::from_str("32.27").unwrap()));
        assert_eq!(stored.apr_penalty.to_canonical_string(), "7.73");
        assert_eq!(stored.fees_earned, Decimal::zero());
        assert_eq!(stored.last_accrual_date, None);
    }
}
