//! Daily APR distribution job.
//!
//! Averages the live APR of every active pool, derives a per-timeframe APR
//! from it and credits one day of yield to each active position.

use crate::datasource::{PoolAprCache, PoolQuery};
use crate::db::{DistributionRun, Repository};
use crate::domain::adjustment::to_map;
use crate::domain::{
    default_adjustments, utc_date, AdjustmentMap, CustomPool, Decimal, Position, TimeMs,
};
use crate::engine::{accrue, adjusted_apr, average_apr, AccrualError, PenaltyPolicy};
use chrono::{DateTime, NaiveDate, Utc};
use futures::future::join_all;
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, error, info, warn};

#[derive(Debug, Error)]
pub enum DistributionError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("failed to encode run details: {0}")]
    Encode(#[from] serde_json::Error),
    #[error(transparent)]
    Accrual(#[from] AccrualError),
}

/// Where a pool's APR came from in this run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum AprSource {
    Live,
    Cached,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PoolSnapshot {
    pub name: String,
    pub address: String,
    pub apr: Decimal,
    pub tvl: Option<Decimal>,
    pub source: AprSource,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TimeframeStats {
    pub adjustment_applied: Decimal,
    pub adjusted_apr: Decimal,
    pub positions_updated: i64,
    pub total_distributed: Decimal,
}

/// Outcome of one execution, returned to callers and stored (minus the
/// pool list) as a [`DistributionRun`].
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DistributionReport {
    pub run_id: String,
    pub success: bool,
    pub dry_run: bool,
    pub date: NaiveDate,
    pub executed_by: String,
    pub average_pool_apr: Decimal,
    pub pools: Vec<PoolSnapshot>,
    /// Keyed by timeframe in days.
    pub timeframes: BTreeMap<i64, TimeframeStats>,
    pub positions_updated: i64,
    pub positions_skipped: i64,
    pub positions_failed: i64,
    pub total_distributed: Decimal,
    pub error_message: Option<String>,
    pub executed_at: TimeMs,
}

impl DistributionReport {
    fn new(executed_by: &str, dry_run: bool, now: DateTime<Utc>) -> Self {
        Self {
            run_id: uuid::Uuid::new_v4().to_string(),
            success: false,
            dry_run,
            date: utc_date(now),
            executed_by: executed_by.to_string(),
            average_pool_apr: Decimal::zero(),
            pools: Vec::new(),
            timeframes: BTreeMap::new(),
            positions_updated: 0,
            positions_skipped: 0,
            positions_failed: 0,
            total_distributed: Decimal::zero(),
            error_message: None,
            executed_at: TimeMs::from(now),
        }
    }

    fn to_run(&self) -> Result<DistributionRun, serde_json::Error> {
        Ok(DistributionRun {
            run_id: self.run_id.clone(),
            run_date: self.date,
            executed_by: self.executed_by.clone(),
            average_pool_apr: self.average_pool_apr,
            positions_updated: self.positions_updated,
            positions_skipped: self.positions_skipped,
            positions_failed: self.positions_failed,
            total_distributed: self.total_distributed,
            success: self.success,
            error_message: self.error_message.clone(),
            details: serde_json::to_value(&self.timeframes)?,
            executed_at: self.executed_at,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TimeframeInfo {
    pub timeframe: i64,
    pub adjustment: Decimal,
    pub adjusted_apr: Decimal,
}

/// Snapshot of the inputs the next run would use.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SystemInfo {
    pub pools: Vec<PoolSnapshot>,
    pub average_apr: Decimal,
    pub timeframe_adjustments: Vec<TimeframeInfo>,
    pub active_positions_count: usize,
    pub total_active_capital: Decimal,
}

enum PositionOutcome {
    Updated(Decimal),
    Skipped,
}

pub struct DistributionService {
    repo: Arc<Repository>,
    cache: Arc<PoolAprCache>,
    penalty: PenaltyPolicy,
}

impl DistributionService {
    pub fn new(repo: Arc<Repository>, cache: Arc<PoolAprCache>, penalty: PenaltyPolicy) -> Self {
        Self {
            repo,
            cache,
            penalty,
        }
    }

    pub async fn execute(
        &self,
        executed_by: &str,
        dry_run: bool,
    ) -> Result<DistributionReport, DistributionError> {
        self.execute_at(executed_by, dry_run, Utc::now()).await
    }

    /// Run the distribution as of `now`.
    ///
    /// Positions that already accrued on `now`'s UTC date are skipped, so
    /// repeated runs on the same day credit each position at most once.
    ///
    /// # Errors
    /// Returns an error when the pool, position or adjustment tables cannot
    /// be read, or the run cannot be recorded. Individual position failures
    /// are counted in the report instead.
    pub async fn execute_at(
        &self,
        executed_by: &str,
        dry_run: bool,
        now: DateTime<Utc>,
    ) -> Result<DistributionReport, DistributionError> {
        let mut report = DistributionReport::new(executed_by, dry_run, now);
        info!(
            "Starting daily APR distribution {} for {} (by {}, dry_run={})",
            report.run_id, report.date, executed_by, dry_run
        );

        let pools = self.repo.active_pools().await?;
        if pools.is_empty() {
            warn!("No active pools, nothing to distribute");
            report.error_message = Some("no active pools".to_string());
            return self.finish(report).await;
        }

        report.pools = self.pool_aprs(&pools, dry_run, TimeMs::from(now)).await;
        let aprs: Vec<Decimal> = report.pools.iter().map(|p| p.apr).collect();
        let Some(average) = average_apr(&aprs) else {
            warn!("No pool APR available, nothing to distribute");
            report.error_message = Some("no pool APR available".to_string());
            return self.finish(report).await;
        };
        report.average_pool_apr = average;
        info!(
            "Average APR of {} pools: {}%",
            report.pools.len(),
            average
        );

        let adjustments = self.adjustments().await;
        let positions = self.repo.active_positions().await?;
        info!("Processing {} active positions", positions.len());

        for position in &positions {
            let adjustment = adjustments
                .get(&position.timeframe)
                .copied()
                .unwrap_or_default();
            let stats = report
                .timeframes
                .entry(position.timeframe.days())
                .or_insert_with(|| TimeframeStats {
                    adjustment_applied: adjustment,
                    adjusted_apr: adjusted_apr(average, adjustment).unwrap_or_default(),
                    positions_updated: 0,
                    total_distributed: Decimal::zero(),
                });

            match self
                .accrue_one(position, average, &adjustments, report.date, now, dry_run)
                .await
            {
                Ok(PositionOutcome::Updated(amount)) => {
                    stats.positions_updated += 1;
                    stats.total_distributed = stats.total_distributed.saturating_add(amount);
                    report.positions_updated += 1;
                    report.total_distributed = report.total_distributed.saturating_add(amount);
                }
                Ok(PositionOutcome::Skipped) => {
                    report.positions_skipped += 1;
                }
                Err(e) => {
                    error!("Failed to accrue position {}: {}", position.id, e);
                    report.positions_failed += 1;
                }
            }
        }

        report.success = true;
        info!(
            "Distribution {} complete: {} updated, {} skipped, {} failed, {} distributed",
            report.run_id,
            report.positions_updated,
            report.positions_skipped,
            report.positions_failed,
            report.total_distributed
        );
        for (tf, stats) in &report.timeframes {
            info!(
                "  {}d: adjusted APR {}%, {} positions, {} distributed",
                tf, stats.adjusted_apr, stats.positions_updated, stats.total_distributed
            );
        }

        self.finish(report).await
    }

    /// Dry run as of now.
    pub async fn preview(&self) -> Result<DistributionReport, DistributionError> {
        self.execute("preview", true).await
    }

    /// Current pool APRs, average and per-timeframe APRs, without writing.
    ///
    /// # Errors
    /// Returns an error when the pool or position tables cannot be read.
    pub async fn system_info(&self) -> Result<SystemInfo, DistributionError> {
        let pools = self.repo.active_pools().await?;
        let snapshots = self.pool_aprs(&pools, true, TimeMs::now()).await;
        let aprs: Vec<Decimal> = snapshots.iter().map(|p| p.apr).collect();
        let average = average_apr(&aprs).unwrap_or_default();

        let timeframe_adjustments = self
            .adjustments()
            .await
            .into_iter()
            .map(|(tf, adjustment)| TimeframeInfo {
                timeframe: tf.days(),
                adjustment,
                adjusted_apr: adjusted_apr(average, adjustment).unwrap_or_default(),
            })
            .collect();

        let positions = self.repo.active_positions().await?;
        let total_active_capital = positions.iter().map(|p| p.deposited_usdc).sum();

        Ok(SystemInfo {
            pools: snapshots,
            average_apr: average,
            timeframe_adjustments,
            active_positions_count: positions.len(),
            total_active_capital,
        })
    }

    async fn finish(
        &self,
        report: DistributionReport,
    ) -> Result<DistributionReport, DistributionError> {
        if !report.dry_run {
            self.repo.record_distribution_run(&report.to_run()?).await?;
        }
        Ok(report)
    }

    /// Fetch every pool concurrently. Failed or unmatched lookups fall back
    /// to the pool's cached APR; pools with neither are left out.
    async fn pool_aprs(
        &self,
        pools: &[CustomPool],
        dry_run: bool,
        now: TimeMs,
    ) -> Vec<PoolSnapshot> {
        let fetches = pools.iter().map(|pool| async move {
            let result = self.cache.pool_apr(&PoolQuery::from(pool)).await;
            (pool, result)
        });

        let mut snapshots = Vec::with_capacity(pools.len());
        for (pool, result) in join_all(fetches).await {
            let live = match result {
                Ok(Some(data)) => Some(data),
                Ok(None) => {
                    warn!("Pool {} ({}) not listed by the aggregator", pool.name, pool.address);
                    None
                }
                Err(e) => {
                    warn!("APR fetch failed for pool {}: {}", pool.name, e);
                    None
                }
            };

            match (live, pool.cached_apr) {
                (Some(data), _) => {
                    if !dry_run {
                        if let Err(e) = self
                            .repo
                            .update_pool_metrics(pool.id, data.apr, Some(data.tvl), now)
                            .await
                        {
                            warn!("Failed to cache metrics for pool {}: {}", pool.name, e);
                        }
                    }
                    debug!("Pool {}: {}% (TVL {})", pool.name, data.apr, data.tvl);
                    snapshots.push(PoolSnapshot {
                        name: pool.name.clone(),
                        address: pool.address.clone(),
                        apr: data.apr,
                        tvl: Some(data.tvl),
                        source: AprSource::Live,
                    });
                }
                (None, Some(cached)) => {
                    info!("Using cached APR {}% for pool {}", cached, pool.name);
                    snapshots.push(PoolSnapshot {
                        name: pool.name.clone(),
                        address: pool.address.clone(),
                        apr: cached,
                        tvl: pool.cached_tvl,
                        source: AprSource::Cached,
                    });
                }
                (None, None) => {
                    warn!("Pool {} has no APR, excluded from the average", pool.name);
                }
            }
        }
        snapshots
    }

    async fn adjustments(&self) -> AdjustmentMap {
        match self.repo.list_adjustments().await {
            Ok(rows) => to_map(&rows),
            Err(e) => {
                error!("Failed to load timeframe adjustments, using defaults: {}", e);
                default_adjustments()
            }
        }
    }

    async fn accrue_one(
        &self,
        position: &Position,
        base_apr: Decimal,
        adjustments: &AdjustmentMap,
        date: NaiveDate,
        now: DateTime<Utc>,
        dry_run: bool,
    ) -> Result<PositionOutcome, DistributionError> {
        if position.accrued_on(date) {
            debug!("Position {} already accrued on {}", position.id, date);
            return Ok(PositionOutcome::Skipped);
        }

        let accrual = accrue(position, base_apr, adjustments, &self.penalty)?;
        debug!(
            "Position {} ({}, {}): APR {}% -> +{}",
            position.id,
            position.timeframe,
            position.deposited_usdc,
            accrual.effective_apr,
            accrual.daily_yield
        );

        if dry_run {
            return Ok(PositionOutcome::Updated(accrual.daily_yield));
        }

        let written = self
            .repo
            .accrue_position(
                position.id,
                &accrual,
                position.apr_penalty,
                date,
                TimeMs::from(now),
            )
            .await?;
        if written {
            Ok(PositionOutcome::Updated(accrual.daily_yield))
        } else {
            debug!("Position {} changed since it was loaded, skipped", position.id);
            Ok(PositionOutcome::Skipped)
        }
    }
}
