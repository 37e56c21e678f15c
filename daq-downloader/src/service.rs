//! Query façade
//!
//! The operation set external callers use. It owns no state of its own:
//! reads go to the registry and status record, scans to the scheduler, and
//! raw point queries straight to the store through a fixed, parameterized
//! statement.

use chrono::{DateTime, Utc};
use daq_common::events::ScanSource;
use serde::Serialize;
use std::sync::Arc;
use thiserror::Error;
use tracing::info;

use crate::config::Dataset;
use crate::registry::{Registry, Run, RunsDocument, SensorsDocument};
use crate::scheduler::{ScanScheduler, ScanStatus, TriggerError};
use crate::store::{PointQuery, ProbeError, SignalPoint, TelemetryStore};
use crate::window::TimeRange;

pub const DEFAULT_POINT_LIMIT: u32 = 2000;
pub const MIN_POINT_LIMIT: u32 = 10;
pub const MAX_POINT_LIMIT: u32 = 20_000;
const MAX_SIGNAL_CHARS: usize = 256;

#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("unknown season: {0}")]
    UnknownDataset(String),

    #[error("run {key} not found in season {dataset}")]
    RunNotFound { dataset: String, key: String },

    #[error("{0}")]
    InvalidQuery(String),

    #[error(transparent)]
    Busy(#[from] TriggerError),

    #[error("store query failed: {0}")]
    Store(#[from] ProbeError),

    #[error("registry error: {0}")]
    Registry(#[from] daq_common::Error),
}

/// Bounded raw point query
#[derive(Debug, Clone, PartialEq)]
pub struct SignalQuery {
    pub signal: String,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    /// `None` or `0` means the default cap
    pub limit: Option<i64>,
    /// Drop the cap entirely
    pub no_limit: bool,
}

/// Points plus the exact statement that produced them
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SignalSeries {
    pub signal: String,
    pub database: String,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub limit_applied: Option<u32>,
    pub row_count: usize,
    pub points: Vec<SignalPoint>,
    pub query_text: String,
}

#[derive(Clone)]
pub struct DataService {
    datasets: Arc<Vec<Dataset>>,
    registry: Arc<Registry>,
    scheduler: ScanScheduler,
    store: Arc<dyn TelemetryStore>,
}

impl DataService {
    pub fn new(
        datasets: Vec<Dataset>,
        registry: Arc<Registry>,
        scheduler: ScanScheduler,
        store: Arc<dyn TelemetryStore>,
    ) -> Self {
        Self {
            datasets: Arc::new(datasets),
            registry,
            scheduler,
            store,
        }
    }

    /// Configured datasets, newest first
    pub fn list_datasets(&self) -> &[Dataset] {
        &self.datasets
    }

    /// Named dataset, or the newest one when no name is given
    pub fn dataset(&self, name: Option<&str>) -> Result<&Dataset, ServiceError> {
        match name.map(str::trim).filter(|n| !n.is_empty()) {
            Some(name) => self
                .datasets
                .iter()
                .find(|d| d.name == name)
                .ok_or_else(|| ServiceError::UnknownDataset(name.to_string())),
            None => self
                .datasets
                .first()
                .ok_or_else(|| ServiceError::UnknownDataset("(none configured)".to_string())),
        }
    }

    pub async fn list_runs(&self, dataset: Option<&str>) -> Result<RunsDocument, ServiceError> {
        let dataset = self.dataset(dataset)?;
        Ok(self.registry.read_runs(&dataset.name).await?)
    }

    pub async fn list_sensors(&self, dataset: Option<&str>) -> Result<SensorsDocument, ServiceError> {
        let dataset = self.dataset(dataset)?;
        Ok(self.registry.read_sensors(&dataset.name).await?)
    }

    /// Fire-and-forget manual scan
    pub async fn trigger_scan(&self) -> Result<ScanStatus, ServiceError> {
        Ok(self.scheduler.trigger(ScanSource::Manual).await?)
    }

    pub async fn scan_status(&self) -> ScanStatus {
        self.scheduler.status().snapshot().await
    }

    pub async fn set_note(
        &self,
        dataset: Option<&str>,
        key: &str,
        text: &str,
    ) -> Result<Run, ServiceError> {
        let dataset = self.dataset(dataset)?;
        self.registry
            .set_note(&dataset.name, key, text)
            .await
            .map_err(|e| match e {
                daq_common::Error::NotFound(_) => ServiceError::RunNotFound {
                    dataset: dataset.name.clone(),
                    key: key.to_string(),
                },
                daq_common::Error::InvalidInput(msg) => ServiceError::InvalidQuery(msg),
                other => ServiceError::Registry(other),
            })
    }

    /// Execute a bounded point query for one signal
    pub async fn query_signal(
        &self,
        dataset: Option<&str>,
        query: SignalQuery,
    ) -> Result<SignalSeries, ServiceError> {
        let dataset = self.dataset(dataset)?;
        let signal = validate_signal(&query.signal)?;
        if query.start >= query.end {
            return Err(ServiceError::InvalidQuery(
                "start must be before end".to_string(),
            ));
        }
        let limit = effective_limit(query.limit, query.no_limit);

        let request = PointQuery {
            signal: signal.clone(),
            range: TimeRange::new(query.start, query.end),
            limit,
        };
        let series = self.store.fetch_points(dataset, &request).await?;
        info!(
            dataset = %dataset.name,
            signal = %signal,
            rows = series.points.len(),
            limit = ?limit,
            "Signal query served"
        );

        Ok(SignalSeries {
            signal,
            database: dataset.database.clone(),
            start: query.start,
            end: query.end,
            limit_applied: limit,
            row_count: series.points.len(),
            points: series.points,
            query_text: series.query_text,
        })
    }
}

/// Default when unset or zero, clamped to the allowed band, none if lifted
pub fn effective_limit(requested: Option<i64>, no_limit: bool) -> Option<u32> {
    if no_limit {
        return None;
    }
    let limit = match requested {
        None | Some(0) => DEFAULT_POINT_LIMIT as i64,
        Some(n) => n,
    };
    Some(limit.clamp(MIN_POINT_LIMIT as i64, MAX_POINT_LIMIT as i64) as u32)
}

fn validate_signal(raw: &str) -> Result<String, ServiceError> {
    let signal = raw.trim();
    if signal.is_empty() {
        return Err(ServiceError::InvalidQuery("signal is required".to_string()));
    }
    if signal.chars().count() > MAX_SIGNAL_CHARS {
        return Err(ServiceError::InvalidQuery(format!(
            "signal exceeds {} characters",
            MAX_SIGNAL_CHARS
        )));
    }
    if signal.chars().any(char::is_control) {
        return Err(ServiceError::InvalidQuery(
            "signal contains control characters".to_string(),
        ));
    }
    Ok(signal.to_string())
}
