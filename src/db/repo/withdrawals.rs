//! Fee withdrawal persistence.

use crate::domain::{
    Decimal, FeeWithdrawal, NewWithdrawal, PositionStatus, TimeMs, WalletAddress,
    WithdrawalStatus, WithdrawalUpdate,
};
use crate::engine::PenaltyOutcome;
use sqlx::sqlite::SqliteRow;
use sqlx::Row;

use super::{bool_col, decimal_col, opt_time_col, parse_col, wallet_col, Repository};

const WITHDRAWAL_COLUMNS: &str = r#"
    id, wallet_address, position_id, pool_address, amount, currency, status,
    transaction_hash, notes, processed_by, processed_at, requested_at,
    apr_before_withdrawal, apr_after_withdrawal, apr_penalty_applied, apr_penalty_amount
"#;

fn withdrawal_from_row(row: &SqliteRow) -> Result<FeeWithdrawal, sqlx::Error> {
    Ok(FeeWithdrawal {
        id: row.try_get("id")?,
        wallet_address: wallet_col(row, "wallet_address")?,
        position_id: row.try_get("position_id")?,
        pool_address: row.try_get("pool_address")?,
        amount: decimal_col(row, "amount")?,
        currency: row.try_get("currency")?,
        status: parse_col::<WithdrawalStatus>(row, "status")?,
        transaction_hash: row.try_get("transaction_hash")?,
        notes: row.try_get("notes")?,
        processed_by: row.try_get("processed_by")?,
        processed_at: opt_time_col(row, "processed_at")?,
        requested_at: TimeMs::new(row.try_get("requested_at")?),
        apr_before_withdrawal: decimal_col(row, "apr_before_withdrawal")?,
        apr_after_withdrawal: decimal_col(row, "apr_after_withdrawal")?,
        apr_penalty_applied: bool_col(row, "apr_penalty_applied")?,
        apr_penalty_amount: decimal_col(row, "apr_penalty_amount")?,
    })
}

impl Repository {
    /// Record a withdrawal and move the amount into the position's
    /// `fees_collected` in one transaction.
    ///
    /// `expected_fees_collected` is the value the caller validated against.
    /// When another request changed it in between, nothing is written and
    /// `None` is returned.
    ///
    /// # Errors
    /// Returns an error if any statement fails; the transaction is rolled back.
    pub async fn record_withdrawal(
        &self,
        request: &NewWithdrawal,
        pool_address: &str,
        outcome: &PenaltyOutcome,
        position_penalty: Decimal,
        expected_fees_collected: Decimal,
        now: TimeMs,
    ) -> Result<Option<FeeWithdrawal>, sqlx::Error> {
        let mut tx = self.pool.begin().await?;

        let updated = sqlx::query(
            r#"
            UPDATE position_history
            SET fees_collected = ?, current_apr = ?, apr_penalty = ?
            WHERE id = ? AND wallet_address = ? AND status = ? AND fees_collected = ?
            "#,
        )
        .bind((expected_fees_collected + request.amount).to_canonical_string())
        .bind(outcome.apr_after.to_canonical_string())
        .bind(position_penalty.to_canonical_string())
        .bind(request.position_id)
        .bind(request.wallet_address.as_str())
        .bind(PositionStatus::Active.as_str())
        .bind(expected_fees_collected.to_canonical_string())
        .execute(&mut *tx)
        .await?;

        if updated.rows_affected() != 1 {
            tx.rollback().await?;
            return Ok(None);
        }

        let inserted = sqlx::query(
            r#"
            INSERT INTO fee_withdrawals
            (wallet_address, position_id, pool_address, amount, currency, status, notes,
             requested_at, apr_before_withdrawal, apr_after_withdrawal,
             apr_penalty_applied, apr_penalty_amount)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(request.wallet_address.as_str())
        .bind(request.position_id)
        .bind(pool_address)
        .bind(request.amount.to_canonical_string())
        .bind(&request.currency)
        .bind(WithdrawalStatus::Pending.as_str())
        .bind(&request.notes)
        .bind(now.as_ms())
        .bind(outcome.apr_before.to_canonical_string())
        .bind(outcome.apr_after.to_canonical_string())
        .bind(outcome.applied as i64)
        .bind(outcome.penalty_amount.to_canonical_string())
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        self.get_withdrawal(inserted.last_insert_rowid()).await
    }

    /// Fetch a withdrawal by id.
    ///
    /// # Errors
    /// Returns an error if the query fails.
    pub async fn get_withdrawal(&self, id: i64) -> Result<Option<FeeWithdrawal>, sqlx::Error> {
        let sql = format!("SELECT {} FROM fee_withdrawals WHERE id = ?", WITHDRAWAL_COLUMNS);
        let row = sqlx::query(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(withdrawal_from_row).transpose()
    }

    /// All withdrawals, newest first, optionally filtered by status.
    ///
    /// # Errors
    /// Returns an error if the query fails.
    pub async fn list_withdrawals(
        &self,
        status: Option<WithdrawalStatus>,
    ) -> Result<Vec<FeeWithdrawal>, sqlx::Error> {
        let rows = match status {
            Some(status) => {
                let sql = format!(
                    r#"
                    SELECT {} FROM fee_withdrawals
                    WHERE status = ?
                    ORDER BY requested_at DESC, id DESC
                    "#,
                    WITHDRAWAL_COLUMNS
                );
                sqlx::query(&sql)
                    .bind(status.as_str())
                    .fetch_all(&self.pool)
                    .await?
            }
            None => {
                let sql = format!(
                    "SELECT {} FROM fee_withdrawals ORDER BY requested_at DESC, id DESC",
                    WITHDRAWAL_COLUMNS
                );
                sqlx::query(&sql).fetch_all(&self.pool).await?
            }
        };
        rows.iter().map(withdrawal_from_row).collect()
    }

    /// Withdrawals requested by `wallet`, newest first.
    ///
    /// # Errors
    /// Returns an error if the query fails.
    pub async fn withdrawals_by_wallet(
        &self,
        wallet: &WalletAddress,
    ) -> Result<Vec<FeeWithdrawal>, sqlx::Error> {
        let sql = format!(
            r#"
            SELECT {} FROM fee_withdrawals
            WHERE wallet_address = ?
            ORDER BY requested_at DESC, id DESC
            "#,
            WITHDRAWAL_COLUMNS
        );
        let rows = sqlx::query(&sql)
            .bind(wallet.as_str())
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(withdrawal_from_row).collect()
    }

    /// Sum of non-rejected withdrawals for one of `wallet`'s positions.
    ///
    /// Amounts are stored as text, so the sum is taken in Rust to stay exact.
    ///
    /// # Errors
    /// Returns an error if the query fails.
    pub async fn total_withdrawn(
        &self,
        wallet: &WalletAddress,
        position_id: i64,
    ) -> Result<Decimal, sqlx::Error> {
        let rows = sqlx::query(
            r#"
            SELECT amount FROM fee_withdrawals
            WHERE wallet_address = ? AND position_id = ? AND status != ?
            "#,
        )
        .bind(wallet.as_str())
        .bind(position_id)
        .bind(WithdrawalStatus::Rejected.as_str())
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|row| decimal_col(row, "amount"))
            .sum::<Result<Decimal, sqlx::Error>>()
    }

    /// Apply an admin edit. Returns the updated row, or `None` when the id is
    /// unknown.
    ///
    /// # Errors
    /// Returns an error if the update fails.
    pub async fn update_withdrawal(
        &self,
        id: i64,
        update: &WithdrawalUpdate,
        processed_by: &str,
        now: TimeMs,
    ) -> Result<Option<FeeWithdrawal>, sqlx::Error> {
        let result = sqlx::query(
            r#"
            UPDATE fee_withdrawals
            SET status = COALESCE(?, status),
                transaction_hash = COALESCE(?, transaction_hash),
                notes = COALESCE(?, notes),
                processed_by = ?,
                processed_at = ?
            WHERE id = ?
            "#,
        )
        .bind(update.status.map(|s| s.as_str()))
        .bind(&update.transaction_hash)
        .bind(&update.notes)
        .bind(processed_by)
        .bind(now.as_ms())
        .bind(id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Ok(None);
        }
        self.get_withdrawal(id).await
    }
}
