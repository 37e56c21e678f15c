//! Shared fixtures for daq-downloader integration tests
//!
//! [`FakeStore`] is a scripted in-memory telemetry store: each dataset has a
//! set of intervals holding one row per second, and individual operations
//! can be made to fail or stall.

#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{DateTime, Duration, TimeZone, Utc};
use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::sync::Mutex;

use daq_downloader::config::{Dataset, FileConfig, Settings};
use daq_downloader::scanner::ScanParams;
use daq_downloader::sql;
use daq_downloader::store::{
    BinCount, PointQuery, PointSeries, ProbeError, SignalPoint, TelemetryStore,
};
use daq_downloader::window::TimeRange;

/// `2024-01-01T<hour>:00:00Z`; hours past 23 roll into following days
pub fn hour(h: i64) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap() + Duration::hours(h)
}

pub fn range(start_hour: i64, end_hour: i64) -> TimeRange {
    TimeRange::new(hour(start_hour), hour(end_hour))
}

/// Dataset stored in `iox.<name>` with an explicit candidate range
pub fn dataset(name: &str, candidate: TimeRange) -> Dataset {
    let mut ds = Dataset::for_year(name, 2024, "iox", None).unwrap();
    ds.range = candidate;
    ds
}

/// Hourly bins, no gap tolerance, one-hour floor, one retry
pub fn scan_params() -> ScanParams {
    ScanParams {
        bin_size: Duration::hours(1),
        gap_tolerance: 0,
        include_counts: true,
        chunk: Duration::days(31),
        min_granularity: Duration::hours(1),
        probe_retries: 1,
    }
}

/// Defaults with `data_dir` and the given datasets
pub fn settings(data_dir: &Path, datasets: Vec<Dataset>) -> Settings {
    let env = |key: &str| match key {
        "SCANNER_TIMEZONE" => Some("UTC".to_string()),
        "DATASET_TIMEOUT_SECONDS" => Some("5".to_string()),
        _ => None,
    };
    let mut settings = Settings::resolve(FileConfig::default(), Some(data_dir), env).unwrap();
    settings.datasets = datasets;
    settings.store.probe_retries = 1;
    settings
}

/// One recorded store call
#[derive(Debug, Clone, PartialEq)]
pub enum Call {
    Aggregate(String, TimeRange),
    Exists(String, TimeRange),
    Signals(String, TimeRange),
    Points(String, PointQuery),
}

#[derive(Default)]
struct Script {
    data: HashMap<String, Vec<TimeRange>>,
    aggregate_error: HashMap<String, ProbeError>,
    hard_failure: HashSet<String>,
    panics: HashSet<String>,
    exists_failures_left: HashMap<String, u32>,
    sensors: HashMap<String, Vec<String>>,
    stall: HashMap<String, std::time::Duration>,
}

#[derive(Default)]
pub struct FakeStore {
    script: Mutex<Script>,
    calls: Mutex<Vec<Call>>,
}

impl FakeStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rows (one per second) recorded over `range`
    pub fn with_data(self, dataset: &str, range: TimeRange) -> Self {
        self.add_data(dataset, range);
        self
    }

    pub fn add_data(&self, dataset: &str, range: TimeRange) {
        let mut script = self.script.lock().unwrap();
        script.data.entry(dataset.to_string()).or_default().push(range);
    }

    /// Aggregate queries on `dataset` fail with `error`
    pub fn failing_aggregate(self, dataset: &str, error: ProbeError) -> Self {
        self.script
            .lock()
            .unwrap()
            .aggregate_error
            .insert(dataset.to_string(), error);
        self
    }

    /// Every query on `dataset` is rejected as a bad table
    pub fn broken(self, dataset: &str) -> Self {
        self.script.lock().unwrap().hard_failure.insert(dataset.to_string());
        self
    }

    /// Every call on `dataset` panics (after the script lock is released)
    pub fn panicking(self, dataset: &str) -> Self {
        self.script.lock().unwrap().panics.insert(dataset.to_string());
        self
    }

    /// The next `count` existence probes on `dataset` fail with a transport error
    pub fn flaky_exists(self, dataset: &str, count: u32) -> Self {
        self.script
            .lock()
            .unwrap()
            .exists_failures_left
            .insert(dataset.to_string(), count);
        self
    }

    /// Every store call on `dataset` waits this long first
    pub fn stalled(self, dataset: &str, delay: std::time::Duration) -> Self {
        self.script.lock().unwrap().stall.insert(dataset.to_string(), delay);
        self
    }

    pub fn set_sensors(&self, dataset: &str, names: &[&str]) {
        self.script.lock().unwrap().sensors.insert(
            dataset.to_string(),
            names.iter().map(|n| n.to_string()).collect(),
        );
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    pub fn exists_probes(&self, dataset: &str) -> Vec<TimeRange> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                Call::Exists(name, range) if name == dataset => Some(range),
                _ => None,
            })
            .collect()
    }

    fn record(&self, call: Call) {
        self.calls.lock().unwrap().push(call);
    }

    async fn prepare(&self, dataset: &str) -> Result<(), ProbeError> {
        let (stall, broken, panics) = {
            let script = self.script.lock().unwrap();
            (
                script.stall.get(dataset).copied(),
                script.hard_failure.contains(dataset),
                script.panics.contains(dataset),
            )
        };
        if let Some(delay) = stall {
            tokio::time::sleep(delay).await;
        }
        if panics {
            panic!("store client for {} panicked", dataset);
        }
        if broken {
            return Err(ProbeError::Query {
                status: 400,
                message: format!("table iox.{} not found", dataset),
            });
        }
        Ok(())
    }

    /// Seconds of data overlapping `range`
    fn overlap_seconds(&self, dataset: &str, range: &TimeRange) -> i64 {
        let script = self.script.lock().unwrap();
        script
            .data
            .get(dataset)
            .map(|intervals| {
                intervals
                    .iter()
                    .map(|d| {
                        let start = std::cmp::max(d.start, range.start);
                        let end = std::cmp::min(d.end, range.end);
                        (end - start).num_seconds().max(0)
                    })
                    .sum()
            })
            .unwrap_or(0)
    }
}

#[async_trait]
impl TelemetryStore for FakeStore {
    async fn aggregate_count(
        &self,
        dataset: &Dataset,
        range: TimeRange,
        bin: Duration,
    ) -> Result<Vec<BinCount>, ProbeError> {
        self.record(Call::Aggregate(dataset.name.clone(), range));
        self.prepare(&dataset.name).await?;
        if let Some(err) = self.script.lock().unwrap().aggregate_error.get(&dataset.name) {
            return Err(err.clone());
        }

        let mut bins = Vec::new();
        let mut cur = range.start;
        while cur < range.end {
            let bin_range = TimeRange::new(cur, std::cmp::min(cur + bin, range.end));
            let count = self.overlap_seconds(&dataset.name, &bin_range);
            if count > 0 {
                bins.push(BinCount {
                    start: cur,
                    count: count as u64,
                });
            }
            cur += bin;
        }
        Ok(bins)
    }

    async fn exists_any(&self, dataset: &Dataset, range: TimeRange) -> Result<bool, ProbeError> {
        self.record(Call::Exists(dataset.name.clone(), range));
        self.prepare(&dataset.name).await?;
        {
            let mut script = self.script.lock().unwrap();
            if let Some(left) = script.exists_failures_left.get_mut(&dataset.name) {
                if *left > 0 {
                    *left -= 1;
                    return Err(ProbeError::Transport("connection reset".to_string()));
                }
            }
        }
        Ok(self.overlap_seconds(&dataset.name, &range) > 0)
    }

    async fn distinct_signals(
        &self,
        dataset: &Dataset,
        range: TimeRange,
    ) -> Result<Vec<String>, ProbeError> {
        self.record(Call::Signals(dataset.name.clone(), range));
        self.prepare(&dataset.name).await?;
        if self.overlap_seconds(&dataset.name, &range) == 0 {
            return Ok(Vec::new());
        }
        Ok(self
            .script
            .lock()
            .unwrap()
            .sensors
            .get(&dataset.name)
            .cloned()
            .unwrap_or_default())
    }

    async fn fetch_points(
        &self,
        dataset: &Dataset,
        query: &PointQuery,
    ) -> Result<PointSeries, ProbeError> {
        self.record(Call::Points(dataset.name.clone(), query.clone()));
        self.prepare(&dataset.name).await?;

        // One reading per minute wherever data exists
        let mut points = Vec::new();
        let mut cur = query.range.start;
        while cur <= query.range.end {
            let probe = TimeRange::new(cur, cur + Duration::seconds(1));
            if self.overlap_seconds(&dataset.name, &probe) > 0 {
                points.push(SignalPoint {
                    time: cur,
                    value: points.len() as f64,
                });
            }
            if let Some(limit) = query.limit {
                if points.len() >= limit as usize {
                    break;
                }
            }
            cur += Duration::minutes(1);
        }

        Ok(PointSeries {
            points,
            query_text: sql::signal_series(&dataset.table, &query.signal, &query.range, query.limit),
        })
    }
}
