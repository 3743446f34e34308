//! Timeframe adjustment table.

use crate::domain::{Decimal, TimeMs, Timeframe, TimeframeAdjustment};
use sqlx::Row;

use super::{decimal_col, opt_time_col, Repository};

impl Repository {
    /// All configured adjustments ordered by timeframe.
    ///
    /// # Errors
    /// Returns an error if the query fails.
    pub async fn list_adjustments(&self) -> Result<Vec<TimeframeAdjustment>, sqlx::Error> {
        let rows = sqlx::query(
            r#"
            SELECT timeframe, adjustment_percentage, description, updated_at, updated_by
            FROM timeframe_adjustments
            ORDER BY timeframe ASC
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|row| {
                Ok(TimeframeAdjustment {
                    timeframe: Timeframe(row.try_get("timeframe")?),
                    adjustment_percentage: decimal_col(row, "adjustment_percentage")?,
                    description: row.try_get("description")?,
                    updated_at: opt_time_col(row, "updated_at")?,
                    updated_by: row.try_get("updated_by")?,
                })
            })
            .collect()
    }

    /// Insert or replace the adjustment for `timeframe`.
    ///
    /// An absent description keeps the stored one (or a generated label for
    /// a new timeframe).
    ///
    /// # Errors
    /// Returns an error if the write fails.
    pub async fn upsert_adjustment(
        &self,
        timeframe: Timeframe,
        percentage: Decimal,
        description: Option<&str>,
        updated_by: &str,
        now: TimeMs,
    ) -> Result<TimeframeAdjustment, sqlx::Error> {
        let default_description = format!("{} day contract", timeframe.days());
        sqlx::query(
            r#"
            INSERT INTO timeframe_adjustments
            (timeframe, adjustment_percentage, description, updated_at, updated_by)
            VALUES (?, ?, COALESCE(?, ?), ?, ?)
            ON CONFLICT(timeframe) DO UPDATE SET
                adjustment_percentage = excluded.adjustment_percentage,
                description = COALESCE(?, timeframe_adjustments.description),
                updated_at = excluded.updated_at,
                updated_by = excluded.updated_by
            "#,
        )
        .bind(timeframe.days())
        .bind(percentage.to_canonical_string())
        .bind(description)
        .bind(&default_description)
        .bind(now.as_ms())
        .bind(updated_by)
        .bind(description)
        .execute(&self.pool)
        .await?;

        Ok(TimeframeAdjustment {
            timeframe,
            adjustment_percentage: percentage,
            description: match description {
                Some(d) => d.to_string(),
                None => self
                    .list_adjustments()
                    .await?
                    .into_iter()
                    .find(|a| a.timeframe == timeframe)
                    .map(|a| a.description)
                    .unwrap_or(default_description),
            },
            updated_at: Some(now),
            updated_by: Some(updated_by.to_string()),
        })
    }
}
