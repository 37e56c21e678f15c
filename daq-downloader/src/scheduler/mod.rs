//! Scan scheduler
//!
//! Runs the scanner over every configured dataset, on a timer and on manual
//! request. Both triggers converge on [`ScanScheduler::execute`], which
//! always moves the shared status back to idle, even if the cycle panics.
//! Each dataset runs in a task of its own, so a panic while scanning one
//! season is recorded as that season's failure and the rest still publish.
//!
//! A trigger that arrives while a cycle is in flight is rejected with
//! [`TriggerError::Busy`]; the busy check and the transition to `scanning`
//! happen under one status lock before any work is spawned.

pub mod status;

use chrono::{DateTime, Duration, NaiveTime, TimeZone, Utc};
use chrono_tz::Tz;
use daq_common::events::{EventBus, ScanEvent, ScanOutcome, ScanSource};
use std::sync::Arc;
use thiserror::Error;
use tokio::task::JoinHandle;
use tokio::time::{interval, sleep, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

pub use status::{ScanStatus, StatusStore, TriggerError};

use crate::config::{Dataset, Schedule, ScheduleSettings, SensorSettings};
use crate::registry::Registry;
use crate::scanner::{AdaptiveScanner, ScanError, ScanParams};
use crate::sensors::SensorDiscovery;
use crate::store::TelemetryStore;
use crate::window::TimeRange;

/// Failure of one dataset within a cycle
#[derive(Debug, Error)]
pub enum DatasetError {
    #[error(transparent)]
    Scan(#[from] ScanError),

    #[error("registry write failed: {0}")]
    Registry(#[from] daq_common::Error),

    #[error("scan task aborted: {0}")]
    Aborted(String),
}

/// Everything the scheduler needs besides its collaborators
#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    /// Scanned in this order
    pub datasets: Vec<Dataset>,
    pub scan: ScanParams,
    pub sensors: SensorSettings,
    pub schedule: ScheduleSettings,
    pub timezone: Tz,
}

/// Result of one dataset that completed
#[derive(Debug, Clone, PartialEq)]
pub struct DatasetSummary {
    pub dataset: String,
    pub windows: usize,
    pub total_runs: usize,
    pub sensors: usize,
}

/// Result of one full cycle
#[derive(Debug, Clone, PartialEq)]
pub struct CycleReport {
    pub source: ScanSource,
    pub completed: Vec<DatasetSummary>,
    /// `(dataset, message)` for every dataset that failed
    pub failures: Vec<(String, String)>,
    pub outcome: ScanOutcome,
}

impl CycleReport {
    /// `"WFR25: ...; WFR24: ..."`, empty when nothing failed
    pub fn error_message(&self) -> String {
        self.failures
            .iter()
            .map(|(dataset, message)| format!("{}: {}", dataset, message))
            .collect::<Vec<_>>()
            .join("; ")
    }
}

/// Cheap to clone; all clones share one status record
#[derive(Clone)]
pub struct ScanScheduler {
    inner: Arc<Inner>,
}

struct Inner {
    config: SchedulerConfig,
    scanner: AdaptiveScanner,
    sensors: SensorDiscovery,
    registry: Arc<Registry>,
    status: Arc<StatusStore>,
    events: EventBus,
}

impl ScanScheduler {
    pub fn new(
        config: SchedulerConfig,
        store: Arc<dyn TelemetryStore>,
        registry: Arc<Registry>,
        status: Arc<StatusStore>,
        events: EventBus,
    ) -> Self {
        let scanner = AdaptiveScanner::new(Arc::clone(&store), config.scan.clone());
        let sensors = SensorDiscovery::new(store, config.sensors.clone(), config.scan.probe_retries);
        Self {
            inner: Arc::new(Inner {
                config,
                scanner,
                sensors,
                registry,
                status,
                events,
            }),
        }
    }

    pub fn status(&self) -> &Arc<StatusStore> {
        &self.inner.status
    }

    /// Start a cycle in the background and return immediately
    pub async fn trigger(&self, source: ScanSource) -> Result<ScanStatus, TriggerError> {
        let started = self.begin(source).await?;
        let scheduler = self.clone();
        tokio::spawn(async move {
            scheduler.execute(source).await;
        });
        Ok(started)
    }

    /// Run a cycle to completion on the current task
    pub async fn run_now(&self, source: ScanSource) -> Result<CycleReport, TriggerError> {
        self.begin(source).await?;
        Ok(self.execute(source).await)
    }

    async fn begin(&self, source: ScanSource) -> Result<ScanStatus, TriggerError> {
        let started = self.inner.status.try_begin(source).await?;
        info!(source = %source, "Scan cycle started");
        self.inner.events.emit_lossy(ScanEvent::ScanStarted {
            source,
            timestamp: daq_common::time::now(),
        });
        Ok(started)
    }

    /// Run the cycle and record its terminal state
    ///
    /// The cycle runs in its own task so a panic surfaces as a join error
    /// here instead of leaving the status stuck at `scanning`.
    async fn execute(&self, source: ScanSource) -> CycleReport {
        let scheduler = self.clone();
        let report = match tokio::spawn(async move { scheduler.run_cycle(source).await }).await {
            Ok(report) => report,
            Err(e) => {
                error!(error = %e, "Scan cycle aborted");
                CycleReport {
                    source,
                    completed: Vec::new(),
                    failures: vec![("cycle".to_string(), format!("aborted: {}", e))],
                    outcome: ScanOutcome::Error,
                }
            }
        };

        let message = report.error_message();
        self.inner.status.finish(report.outcome, message.clone()).await;
        self.inner.events.emit_lossy(ScanEvent::ScanFinished {
            result: report.outcome,
            error: (!message.is_empty()).then(|| message.clone()),
            timestamp: daq_common::time::now(),
        });

        match report.outcome {
            ScanOutcome::Success => info!(
                source = %source,
                datasets = report.completed.len(),
                "Scan cycle finished"
            ),
            ScanOutcome::Error => warn!(
                source = %source,
                failed = report.failures.len(),
                error = %message,
                "Scan cycle finished with errors"
            ),
        }
        report
    }

    async fn run_cycle(&self, source: ScanSource) -> CycleReport {
        let mut completed = Vec::new();
        let mut failures = Vec::new();

        for dataset in &self.inner.config.datasets {
            match self.scan_isolated(dataset).await {
                Ok(summary) => {
                    self.inner.events.emit_lossy(ScanEvent::DatasetScanned {
                        dataset: summary.dataset.clone(),
                        windows: summary.windows,
                        total_runs: summary.total_runs,
                        sensors: summary.sensors,
                        timestamp: daq_common::time::now(),
                    });
                    completed.push(summary);
                }
                Err(e) => {
                    warn!(dataset = %dataset.name, error = %e, "Dataset scan failed");
                    self.inner.events.emit_lossy(ScanEvent::DatasetFailed {
                        dataset: dataset.name.clone(),
                        error: e.to_string(),
                        timestamp: daq_common::time::now(),
                    });
                    failures.push((dataset.name.clone(), e.to_string()));
                }
            }
        }

        let outcome = if failures.is_empty() {
            ScanOutcome::Success
        } else {
            ScanOutcome::Error
        };
        CycleReport {
            source,
            completed,
            failures,
            outcome,
        }
    }

    /// Scan one dataset in its own task, bounded by the per-dataset ceiling
    ///
    /// A panic fails this dataset only. A scan that overruns is aborted so
    /// it cannot publish after the cycle has moved on.
    async fn scan_isolated(&self, dataset: &Dataset) -> Result<DatasetSummary, DatasetError> {
        let ceiling = self.inner.config.schedule.dataset_timeout;
        let scheduler = self.clone();
        let target = dataset.clone();
        let mut task = tokio::spawn(async move { scheduler.scan_dataset(&target).await });

        match tokio::time::timeout(ceiling, &mut task).await {
            Ok(Ok(result)) => result,
            Ok(Err(e)) => {
                error!(dataset = %dataset.name, error = %e, "Dataset scan task aborted");
                Err(DatasetError::Aborted(e.to_string()))
            }
            Err(_) => {
                task.abort();
                Err(ScanError::DeadlineExceeded(ceiling).into())
            }
        }
    }

    /// Scan, merge, discover sensors and publish for one dataset
    async fn scan_dataset(&self, dataset: &Dataset) -> Result<DatasetSummary, DatasetError> {
        debug!(dataset = %dataset.name, range = %dataset.range, "Scanning dataset");
        let report = self.inner.scanner.scan(dataset).await?;
        let runs = self
            .inner
            .registry
            .merge_runs(&dataset.name, report.windows.clone())
            .await?;

        let hull = match (report.windows.first(), report.windows.last()) {
            (Some(first), Some(last)) => Some(TimeRange::new(first.start, last.end)),
            _ => None,
        };
        let found = self
            .inner
            .sensors
            .discover(dataset, daq_common::time::now(), hull)
            .await;
        if found.failed_chunks > 0 {
            warn!(
                dataset = %dataset.name,
                failed_chunks = found.failed_chunks,
                "Sensor discovery incomplete"
            );
        }
        match &found.searched {
            Some(window) => debug!(dataset = %dataset.name, window = %window, "Sensors found"),
            None => debug!(dataset = %dataset.name, "No sensors found in any window"),
        }
        let sensors = self
            .inner
            .registry
            .write_sensors(&dataset.name, found.names)
            .await?;

        Ok(DatasetSummary {
            dataset: dataset.name.clone(),
            windows: report.windows.len(),
            total_runs: runs.runs.len(),
            sensors: sensors.sensors.len(),
        })
    }

    /// Run one cycle now, then keep scanning on the configured schedule
    pub fn spawn_periodic(&self, cancel: CancellationToken) -> JoinHandle<()> {
        let scheduler = self.clone();
        tokio::spawn(async move {
            let timezone = scheduler.inner.config.timezone;
            match scheduler.inner.config.schedule.schedule {
                Schedule::Every(period) => {
                    info!(interval_secs = period.as_secs(), "Periodic scanning started");
                    // First tick completes immediately: startup scan
                    let mut timer = interval(period);
                    timer.set_missed_tick_behavior(MissedTickBehavior::Skip);
                    loop {
                        tokio::select! {
                            _ = cancel.cancelled() => break,
                            _ = timer.tick() => scheduler.periodic_tick().await,
                        }
                    }
                }
                Schedule::DailyAt(at) => {
                    info!(time = %at, timezone = %timezone.name(), "Daily scanning started");
                    scheduler.periodic_tick().await;
                    loop {
                        let wait = until_next_daily(at, timezone, Utc::now());
                        debug!(wait_secs = wait.as_secs(), "Next daily scan scheduled");
                        tokio::select! {
                            _ = cancel.cancelled() => break,
                            _ = sleep(wait) => scheduler.periodic_tick().await,
                        }
                    }
                }
            }
            info!("Periodic scanning stopped");
        })
    }

    async fn periodic_tick(&self) {
        if let Err(TriggerError::Busy { running, .. }) = self.run_now(ScanSource::Periodic).await {
            info!(running = %running, "Scan already in progress, skipping periodic tick");
        }
    }
}

/// Time from `now` until the next `at` wall-clock time in `timezone`
///
/// A time skipped by a DST transition fires an hour later that day.
pub fn until_next_daily(at: NaiveTime, timezone: Tz, now: DateTime<Utc>) -> std::time::Duration {
    let today = now.with_timezone(&timezone).date_naive();
    for offset in 0..=2 {
        let day = today + Duration::days(offset);
        let local = day.and_time(at);
        let candidate = timezone
            .from_local_datetime(&local)
            .earliest()
            .or_else(|| timezone.from_local_datetime(&(local + Duration::hours(1))).earliest());
        if let Some(candidate) = candidate {
            let candidate = candidate.with_timezone(&Utc);
            if candidate > now {
                return (candidate - now)
                    .to_std()
                    .unwrap_or(std::time::Duration::from_secs(60));
            }
        }
    }
    std::time::Duration::from_secs(24 * 3600)
}
