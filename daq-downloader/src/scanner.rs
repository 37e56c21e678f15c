//! Adaptive availability scanner
//!
//! Turns a dataset's coarse candidate range into an ordered list of data
//! windows. The range is processed in fixed-size chunks; for each chunk one
//! of two strategies is selected:
//!
//! - **Aggregate**: a single grouped count per bin. Non-empty bins become
//!   windows directly.
//! - **Subdivision**: when the aggregate times out or is refused as too
//!   expensive, the chunk is bisected with cheap existence probes. Empty
//!   halves are pruned after one probe; halves with data are bisected until
//!   they reach the minimum granularity and are then accepted as windows.
//!
//! Windows from all chunks are merged into one ascending, non-overlapping list.

use chrono::Duration;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::config::{Dataset, ScannerSettings, StoreSettings};
use crate::retry::retry_transient;
use crate::store::{ProbeError, TelemetryStore};
use crate::window::{gap_span, merge_windows, windows_from_bins, TimeRange, Window};

/// Dataset-level scan failure
#[derive(Debug, Error)]
pub enum ScanError {
    /// Both strategies failed for one chunk; the dataset is abandoned
    #[error("probe failed for {range}: {source}")]
    Probe {
        range: TimeRange,
        #[source]
        source: ProbeError,
    },

    /// Dataset exceeded its soft ceiling within a cycle
    #[error("dataset scan exceeded {0:?}")]
    DeadlineExceeded(std::time::Duration),
}

/// Tunables for one scanner instance
#[derive(Debug, Clone)]
pub struct ScanParams {
    pub bin_size: Duration,
    /// Consecutive empty bins still considered part of the same run
    pub gap_tolerance: u32,
    pub include_counts: bool,
    pub chunk: Duration,
    /// Intervals at or below this length are accepted without further bisection
    pub min_granularity: Duration,
    pub probe_retries: u32,
}

impl ScanParams {
    pub fn from_settings(scanner: &ScannerSettings, store: &StoreSettings) -> Self {
        Self {
            bin_size: scanner.bin_size,
            gap_tolerance: scanner.gap_tolerance,
            include_counts: scanner.include_counts,
            chunk: Duration::try_days(scanner.initial_chunk_days).unwrap_or_else(Duration::max_value),
            min_granularity: scanner.min_granularity,
            probe_retries: store.probe_retries,
        }
    }
}

/// Outcome of scanning one dataset
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ScanReport {
    /// Ascending, non-overlapping
    pub windows: Vec<Window>,
    pub aggregate_chunks: usize,
    pub subdivided_chunks: usize,
    /// Existence probes issued during subdivision
    pub probes: usize,
}

/// Scanner bound to one store
pub struct AdaptiveScanner {
    store: Arc<dyn TelemetryStore>,
    params: ScanParams,
}

impl AdaptiveScanner {
    pub fn new(store: Arc<dyn TelemetryStore>, params: ScanParams) -> Self {
        Self { store, params }
    }

    /// Scan the dataset's whole candidate range
    pub async fn scan(&self, dataset: &Dataset) -> Result<ScanReport, ScanError> {
        self.scan_range(dataset, dataset.range).await
    }

    /// Scan an explicit range of the dataset
    pub async fn scan_range(
        &self,
        dataset: &Dataset,
        range: TimeRange,
    ) -> Result<ScanReport, ScanError> {
        let mut report = ScanReport::default();
        if range.is_empty() {
            return Ok(report);
        }

        let mut found = Vec::new();
        for chunk in range.chunks(self.params.chunk) {
            match self.aggregate_chunk(dataset, chunk).await {
                Ok(windows) => {
                    report.aggregate_chunks += 1;
                    found.extend(windows);
                }
                Err(err) if err.should_subdivide() || err.is_transient() => {
                    info!(
                        dataset = %dataset.name,
                        chunk = %chunk,
                        error = %err,
                        "Aggregate count unavailable, falling back to subdivision"
                    );
                    report.subdivided_chunks += 1;
                    found.extend(self.subdivide_chunk(dataset, chunk, &mut report.probes).await?);
                }
                Err(err) => {
                    return Err(ScanError::Probe {
                        range: chunk,
                        source: err,
                    })
                }
            }
        }

        let max_gap = gap_span(self.params.bin_size, self.params.gap_tolerance);
        report.windows = merge_windows(found, max_gap);
        debug!(
            dataset = %dataset.name,
            windows = report.windows.len(),
            aggregate_chunks = report.aggregate_chunks,
            subdivided_chunks = report.subdivided_chunks,
            probes = report.probes,
            "Dataset scan complete"
        );
        Ok(report)
    }

    async fn aggregate_chunk(
        &self,
        dataset: &Dataset,
        chunk: TimeRange,
    ) -> Result<Vec<Window>, ProbeError> {
        let bins = self
            .store
            .aggregate_count(dataset, chunk, self.params.bin_size)
            .await?;

        let counted: Vec<_> = bins
            .iter()
            .filter(|b| b.start >= chunk.start && b.start < chunk.end)
            .map(|b| (b.start, b.count))
            .collect();

        let mut windows = windows_from_bins(
            &counted,
            self.params.bin_size,
            self.params.gap_tolerance,
            self.params.include_counts,
        );
        // Last bin may overhang a chunk that is not a whole number of bins
        for window in &mut windows {
            if window.end > chunk.end {
                window.end = chunk.end;
            }
        }
        Ok(windows)
    }

    /// Bisect with existence probes until intervals reach the granularity floor
    async fn subdivide_chunk(
        &self,
        dataset: &Dataset,
        chunk: TimeRange,
        probes: &mut usize,
    ) -> Result<Vec<Window>, ScanError> {
        let mut accepted = Vec::new();

        if self.is_leaf(&chunk) {
            *probes += 1;
            if self.probe(dataset, chunk).await? {
                accepted.push(self.leaf_window(chunk));
            }
            return Ok(accepted);
        }

        // Ranges in `pending` are known (or assumed, for the chunk itself) to hold data
        let mut pending = vec![chunk];
        while let Some(range) = pending.pop() {
            let Some((left, right)) = range.bisect() else {
                accepted.push(self.leaf_window(range));
                continue;
            };

            *probes += 2;
            let (left_has, right_has) =
                tokio::try_join!(self.probe(dataset, left), self.probe(dataset, right))?;

            // Right pushed first so the left half is refined first
            for (half, has_data) in [(right, right_has), (left, left_has)] {
                if !has_data {
                    continue;
                }
                if self.is_leaf(&half) {
                    accepted.push(self.leaf_window(half));
                } else {
                    pending.push(half);
                }
            }
        }

        if accepted.is_empty() {
            debug!(dataset = %dataset.name, chunk = %chunk, "No data in chunk");
        }
        Ok(accepted)
    }

    fn is_leaf(&self, range: &TimeRange) -> bool {
        range.duration() <= self.params.min_granularity || range.bisect().is_none()
    }

    fn leaf_window(&self, range: TimeRange) -> Window {
        Window {
            start: range.start,
            end: range.end,
            bins: covering_bins(range.duration(), self.params.bin_size),
            row_count: None,
        }
    }

    async fn probe(&self, dataset: &Dataset, range: TimeRange) -> Result<bool, ScanError> {
        let store = &self.store;
        retry_transient("existence probe", self.params.probe_retries, move || {
            store.exists_any(dataset, range)
        })
        .await
        .map_err(|source| {
            warn!(dataset = %dataset.name, range = %range, error = %source, "Existence probe failed");
            ScanError::Probe { range, source }
        })
    }
}

/// Number of bins needed to cover `span`, at least one
fn covering_bins(span: Duration, bin_size: Duration) -> u32 {
    let span = span.num_seconds().max(0);
    let bin = bin_size.num_seconds().max(1);
    let bins = (span + bin - 1) / bin;
    bins.clamp(1, u32::MAX as i64) as u32
}
