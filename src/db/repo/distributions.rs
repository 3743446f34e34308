//! Audit history of daily distribution runs.

use crate::domain::{Decimal, TimeMs};
use chrono::NaiveDate;
use serde::Serialize;
use sqlx::sqlite::SqliteRow;
use sqlx::Row;
use std::str::FromStr;

use super::{bool_col, decimal_col, Repository};

/// One persisted (non-dry-run) distribution execution.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DistributionRun {
    pub run_id: String,
    pub run_date: NaiveDate,
    pub executed_by: String,
    pub average_pool_apr: Decimal,
    pub positions_updated: i64,
    pub positions_skipped: i64,
    pub positions_failed: i64,
    pub total_distributed: Decimal,
    pub success: bool,
    pub error_message: Option<String>,
    /// Per-timeframe breakdown as produced by the job.
    pub details: serde_json::Value,
    pub executed_at: TimeMs,
}

fn run_from_row(row: &SqliteRow) -> Result<DistributionRun, sqlx::Error> {
    let run_date: String = row.try_get("run_date")?;
    let details: String = row.try_get("details")?;
    Ok(DistributionRun {
        run_id: row.try_get("run_id")?,
        run_date: NaiveDate::from_str(&run_date).map_err(|e| sqlx::Error::ColumnDecode {
            index: "run_date".to_string(),
            source: Box::new(e),
        })?,
        executed_by: row.try_get("executed_by")?,
        average_pool_apr: decimal_col(row, "average_pool_apr")?,
        positions_updated: row.try_get("positions_updated")?,
        positions_skipped: row.try_get("positions_skipped")?,
        positions_failed: row.try_get("positions_failed")?,
        total_distributed: decimal_col(row, "total_distributed")?,
        success: bool_col(row, "success")?,
        error_message: row.try_get("error_message")?,
        details: serde_json::from_str(&details).map_err(|e| sqlx::Error::ColumnDecode {
            index: "details".to_string(),
            source: Box::new(e),
        })?,
        executed_at: TimeMs::new(row.try_get("executed_at")?),
    })
}

impl Repository {
    /// Append a run to the history.
    ///
    /// # Errors
    /// Returns an error if the insert fails.
    pub async fn record_distribution_run(&self, run: &DistributionRun) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"
            INSERT INTO distribution_runs
            (run_id, run_date, executed_by, average_pool_apr, positions_updated,
             positions_skipped, positions_failed, total_distributed, success,
             error_message, details, executed_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&run.run_id)
        .bind(run.run_date.format("%Y-%m-%d").to_string())
        .bind(&run.executed_by)
        .bind(run.average_pool_apr.to_canonical_string())
        .bind(run.positions_updated)
        .bind(run.positions_skipped)
        .bind(run.positions_failed)
        .bind(run.total_distributed.to_canonical_string())
        .bind(run.success as i64)
        .bind(&run.error_message)
        .bind(run.details.to_string())
        .bind(run.executed_at.as_ms())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Most recent runs, newest first.
    ///
    /// # Errors
    /// Returns an error if the query fails.
    pub async fn recent_distribution_runs(
        &self,
        limit: i64,
    ) -> Result<Vec<DistributionRun>, sqlx::Error> {
        let rows = sqlx::query(
            r#"
            SELECT run_id, run_date, executed_by, average_pool_apr, positions_updated,
                   positions_skipped, positions_failed, total_distributed, success,
                   error_message, details, executed_at
            FROM distribution_runs
            ORDER BY executed_at DESC, id DESC
            LIMIT ?
            "#,
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(run_from_row).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::super::test_support::setup_repo;
    use super::*;

    fn run(id: &str, executed_at: i64) -> DistributionRun {
        DistributionRun {
            run_id: id.to_string(),
            run_date: NaiveDate::from_ymd_opt(2026, 5, 2).unwrap(),
            executed_by: "scheduler".to_string(),
            average_pool_apr: Decimal::from_i64(20),
            positions_updated: 2,
            positions_skipped: 0,
            positions_failed: 0,
            total_distributed: Decimal::from_str("5.753424").unwrap(),
            success: true,
            error_message: None,
            details: serde_json::json!({"30": {"positions": 2}}),
            executed_at: TimeMs::new(executed_at),
        }
    }

    #[tokio::test]
    async fn test_record_and_list_runs() {
        let (repo, _temp) = setup_repo().await;
        repo.record_distribution_run(&run("a", 1)).await.unwrap();
        repo.record_distribution_run(&run("b", 2)).await.unwrap();
        repo.record_distribution_run(&run("c", 3)).await.unwrap();

        let recent = repo.recent_distribution_runs(2).await.unwrap();
        assert_eq!(recent.len(), 2);
        assert_eq!(recent[0].run_id, "c");
        assert_eq!(recent[1], run("b", 2));
    }

    #[tokio::test]
    async fn test_run_id_is_unique() {
        let (repo, _temp) = setup_repo().await;
        repo.record_distribution_run(&run("a", 1)).await.unwrap();
        let err = repo.record_distribution_run(&run("a", 2)).await.unwrap_err();
        assert!(super::super::is_unique_violation(&err));
    }
}
