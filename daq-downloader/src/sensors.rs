//! Sensor discovery
//!
//! Collects distinct signal names from recent history in fixed-size chunks.
//! When the lookback window is silent (an archived season, a logging pause)
//! the configured fallback window is searched instead; without one, the
//! tail of the span the scanner just discovered is used.

use chrono::{DateTime, Duration, Utc};
use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::config::{Dataset, SensorSettings};
use crate::retry::retry_transient;
use crate::store::TelemetryStore;
use crate::window::TimeRange;

/// Result of one discovery pass
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SensorReport {
    /// Sorted, de-duplicated
    pub names: Vec<String>,
    /// Chunks whose query failed and were skipped
    pub failed_chunks: usize,
    /// Window that produced `names`, if any produced anything
    pub searched: Option<TimeRange>,
}

pub struct SensorDiscovery {
    store: Arc<dyn TelemetryStore>,
    settings: SensorSettings,
    probe_retries: u32,
}

impl SensorDiscovery {
    pub fn new(store: Arc<dyn TelemetryStore>, settings: SensorSettings, probe_retries: u32) -> Self {
        Self {
            store,
            settings,
            probe_retries,
        }
    }

    /// Discover signal names for `dataset`
    ///
    /// `discovered` is the hull of the windows found by the scan that
    /// preceded this call; it is only used when no fallback is configured.
    pub async fn discover(
        &self,
        dataset: &Dataset,
        now: DateTime<Utc>,
        discovered: Option<TimeRange>,
    ) -> SensorReport {
        let lookback = TimeRange::new(days_before(now, self.settings.lookback_days), now);
        let mut report = self.search(dataset, lookback).await;
        if !report.names.is_empty() {
            return report;
        }

        let fallback = self.settings.fallback.or_else(|| {
            discovered.map(|span| {
                let start = std::cmp::max(span.start, days_before(span.end, self.settings.lookback_days));
                TimeRange::new(start, span.end)
            })
        });

        match fallback {
            Some(window) if !window.is_empty() && window != lookback => {
                info!(
                    dataset = %dataset.name,
                    window = %window,
                    "No sensors in lookback window, searching fallback window"
                );
                let failed = report.failed_chunks;
                report = self.search(dataset, window).await;
                report.failed_chunks += failed;
                report
            }
            _ => report,
        }
    }

    async fn search(&self, dataset: &Dataset, window: TimeRange) -> SensorReport {
        let mut names = BTreeSet::new();
        let mut failed_chunks = 0;

        let step = Duration::try_days(self.settings.window_days).unwrap_or_else(Duration::max_value);
        for chunk in window.chunks(step) {
            let store = &self.store;
            let result = retry_transient("sensor discovery", self.probe_retries, move || {
                store.distinct_signals(dataset, chunk)
            })
            .await;

            match result {
                Ok(found) => {
                    debug!(dataset = %dataset.name, chunk = %chunk, count = found.len(), "Sensor chunk");
                    names.extend(found.into_iter().map(|n| n.trim().to_string()).filter(|n| !n.is_empty()));
                }
                Err(e) => {
                    warn!(dataset = %dataset.name, chunk = %chunk, error = %e, "Sensor chunk failed, skipping");
                    failed_chunks += 1;
                }
            }
        }

        SensorReport {
            searched: (!names.is_empty()).then_some(window),
            names: names.into_iter().collect(),
            failed_chunks,
        }
    }
}

/// `end - days`, clamped to the earliest representable instant
fn days_before(end: DateTime<Utc>, days: i64) -> DateTime<Utc> {
    Duration::try_days(days)
        .and_then(|span| end.checked_sub_signed(span))
        .unwrap_or(DateTime::<Utc>::MIN_UTC)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_days_before() {
        let end = Utc.with_ymd_and_hms(2025, 3, 10, 0, 0, 0).unwrap();
        assert_eq!(days_before(end, 9), Utc.with_ymd_and_hms(2025, 3, 1, 0, 0, 0).unwrap());
        assert_eq!(days_before(end, 100_000_000), DateTime::<Utc>::MIN_UTC);
        assert_eq!(days_before(end, i64::MAX), DateTime::<Utc>::MIN_UTC);
    }
}
