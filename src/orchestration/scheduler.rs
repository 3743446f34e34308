//! Midnight (UTC) trigger for the distribution job.

use super::distribution::{DistributionError, DistributionReport, DistributionService};
use crate::domain::{utc_date, Decimal};
use chrono::{DateTime, NaiveDate, NaiveTime, TimeZone, Utc};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::{Mutex, RwLock};
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

/// Identity recorded on runs started by the timer.
pub const SCHEDULER_EXECUTOR: &str = "scheduler";

#[derive(Debug, Error)]
pub enum SchedulerError {
    #[error("a distribution run is already in progress")]
    AlreadyRunning,
    #[error(transparent)]
    Distribution(#[from] DistributionError),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LastRun {
    pub date: NaiveDate,
    pub success: bool,
    pub total_distributed: Decimal,
    pub positions_updated: i64,
    pub error: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SchedulerStatus {
    pub enabled: bool,
    pub is_running: bool,
    pub last_run: Option<LastRun>,
    pub next_run_in: String,
}

pub struct DistributionScheduler {
    service: Arc<DistributionService>,
    run_lock: Mutex<()>,
    last_run: RwLock<Option<LastRun>>,
    enabled: bool,
}

/// Time left until the next UTC midnight.
pub fn until_next_midnight(now: DateTime<Utc>) -> Duration {
    let next_day = now
        .date_naive()
        .succ_opt()
        .unwrap_or(NaiveDate::MAX)
        .and_time(NaiveTime::MIN);
    (Utc.from_utc_datetime(&next_day) - now)
        .to_std()
        .unwrap_or(Duration::ZERO)
}

/// `"{h}h {m}m"`, truncating seconds.
pub fn format_countdown(d: Duration) -> String {
    let secs = d.as_secs();
    format!("{}h {}m", secs / 3600, (secs % 3600) / 60)
}

impl DistributionScheduler {
    pub fn new(service: Arc<DistributionService>, enabled: bool) -> Self {
        Self {
            service,
            run_lock: Mutex::new(()),
            last_run: RwLock::new(None),
            enabled,
        }
    }

    pub fn service(&self) -> &Arc<DistributionService> {
        &self.service
    }

    pub fn is_running(&self) -> bool {
        self.run_lock.try_lock().is_err()
    }

    /// Execute a real (non-dry) run now.
    ///
    /// # Errors
    /// Returns [`SchedulerError::AlreadyRunning`] when another run holds the
    /// lock, or the job's own error.
    pub async fn run_now(&self, executed_by: &str) -> Result<DistributionReport, SchedulerError> {
        self.run_at(executed_by, Utc::now()).await
    }

    pub async fn run_at(
        &self,
        executed_by: &str,
        now: DateTime<Utc>,
    ) -> Result<DistributionReport, SchedulerError> {
        let _guard = self.run_lock.try_lock().map_err(|_| {
            warn!("Distribution already running, {} request skipped", executed_by);
            SchedulerError::AlreadyRunning
        })?;

        let started = std::time::Instant::now();
        let result = self.service.execute_at(executed_by, false, now).await;

        let last = match &result {
            Ok(report) => {
                if report.success {
                    info!(
                        "Distribution finished in {:.2}s: {} positions, {} distributed",
                        started.elapsed().as_secs_f64(),
                        report.positions_updated,
                        report.total_distributed
                    );
                } else {
                    error!(
                        "Distribution failed: {}",
                        report.error_message.as_deref().unwrap_or("unknown error")
                    );
                }
                LastRun {
                    date: report.date,
                    success: report.success,
                    total_distributed: report.total_distributed,
                    positions_updated: report.positions_updated,
                    error: report.error_message.clone(),
                }
            }
            Err(e) => {
                error!("Distribution aborted: {}", e);
                LastRun {
                    date: utc_date(now),
                    success: false,
                    total_distributed: Decimal::zero(),
                    positions_updated: 0,
                    error: Some(e.to_string()),
                }
            }
        };
        *self.last_run.write().await = Some(last);

        result.map_err(SchedulerError::from)
    }

    pub async fn status(&self) -> SchedulerStatus {
        self.status_at(Utc::now()).await
    }

    pub async fn status_at(&self, now: DateTime<Utc>) -> SchedulerStatus {
        SchedulerStatus {
            enabled: self.enabled,
            is_running: self.is_running(),
            last_run: self.last_run.read().await.clone(),
            next_run_in: format_countdown(until_next_midnight(now)),
        }
    }

    /// Start the midnight loop. Returns `None` when scheduling is disabled.
    pub fn spawn(self: Arc<Self>) -> Option<JoinHandle<()>> {
        if !self.enabled {
            warn!("Daily APR distribution disabled by configuration");
            return None;
        }
        info!("Daily APR distribution scheduler started");

        Some(tokio::spawn(async move {
            loop {
                let wait = until_next_midnight(Utc::now());
                info!(
                    "Next distribution in {} (midnight UTC)",
                    format_countdown(wait)
                );
                tokio::time::sleep(wait).await;

                if let Err(e) = self.run_now(SCHEDULER_EXECUTOR).await {
                    error!("Scheduled distribution failed: {}", e);
                }
                // Step past midnight before computing the next wait.
                tokio::time::sleep(Duration::from_secs(1)).await;
            }
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::datasource::{MockYieldSource, PoolAprCache, YieldSource};
    use crate::db::{init_db, Repository};
    use crate::engine::PenaltyPolicy;
    use tempfile::TempDir;

    async fn scheduler(enabled: bool) -> (DistributionScheduler, Arc<Repository>, TempDir) {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("test.db").to_string_lossy().to_string();
        let repo = Arc::new(Repository::new(init_db(&path).await.unwrap()));
        let source: Arc<dyn YieldSource> = Arc::new(MockYieldSource::new());
        let cache = Arc::new(PoolAprCache::new(source, Duration::from_secs(300)));
        let service = Arc::new(DistributionService::new(
            repo.clone(),
            cache,
            PenaltyPolicy::default(),
        ));
        (DistributionScheduler::new(service, enabled), repo, temp)
    }

    fn at(h: u32, m: u32, s: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 5, 2, h, m, s).unwrap()
    }

    #[test]
    fn test_until_next_midnight() {
        assert_eq!(
            until_next_midnight(at(0, 0, 0)),
            Duration::from_secs(24 * 3600)
        );
        assert_eq!(
            until_next_midnight(at(22, 30, 0)),
            Duration::from_secs(90 * 60)
        );
    }

    #[test]
    fn test_format_countdown() {
        assert_eq!(format_countdown(Duration::from_secs(90 * 60 + 59)), "1h 30m");
        assert_eq!(format_countdown(Duration::ZERO), "0h 0m");
    }

    #[tokio::test]
    async fn test_run_records_last_run() {
        let (s, repo, _temp) = scheduler(true).await;
        assert!(s.status_at(at(12, 0, 0)).await.last_run.is_none());

        let report = s.run_at("admin", at(12, 0, 0)).await.unwrap();
        assert!(!report.success);

        let status = s.status_at(at(12, 0, 0)).await;
        assert!(status.enabled);
        assert!(!status.is_running);
        assert_eq!(status.next_run_in, "12h 0m");
        let last = status.last_run.unwrap();
        assert!(!last.success);
        assert_eq!(last.error.as_deref(), Some("no active pools"));
        assert_eq!(repo.recent_distribution_runs(5).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_overlapping_run_is_rejected() {
        let (s, repo, _temp) = scheduler(true).await;
        let _held = s.run_lock.try_lock().unwrap();

        assert!(s.is_running());
        let err = s.run_at("admin", at(12, 0, 0)).await.unwrap_err();
        assert!(matches!(err, SchedulerError::AlreadyRunning));
        assert!(repo.recent_distribution_runs(5).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_disabled_scheduler_does_not_spawn() {
        let (s, _repo, _temp) = scheduler(false).await;
        assert!(Arc::new(s).spawn().is_none());
    }
}
