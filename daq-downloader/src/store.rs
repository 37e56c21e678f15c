//! Probe Client boundary
//!
//! The scanner, sensor discovery and raw query path only ever talk to the
//! time-series store through [`TelemetryStore`]. Implementations must be
//! stateless between calls so every operation is safe to retry.

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use thiserror::Error;
use tracing::info;

use crate::config::Dataset;
use crate::window::TimeRange;

/// Typed failure of one store request
#[derive(Debug, Clone, Error, PartialEq)]
pub enum ProbeError {
    /// Request exceeded its time budget
    #[error("query timed out after {0:?}")]
    Timeout(std::time::Duration),

    /// Store refused the query as too large or too expensive
    #[error("query too expensive for the store: {0}")]
    ResourceExhausted(String),

    /// Connection-level failure before a response arrived
    #[error("transport error: {0}")]
    Transport(String),

    /// Store answered with a hard error (bad table, auth, syntax)
    #[error("store rejected query ({status}): {message}")]
    Query { status: u16, message: String },

    /// Response could not be understood
    #[error("unexpected response from store: {0}")]
    Decode(String),
}

impl ProbeError {
    /// Worth retrying the same request
    pub fn is_transient(&self) -> bool {
        matches!(self, ProbeError::Timeout(_) | ProbeError::Transport(_))
    }

    /// Aggregate failed for size/time reasons; cheap probes may still work
    pub fn should_subdivide(&self) -> bool {
        matches!(self, ProbeError::Timeout(_) | ProbeError::ResourceExhausted(_))
    }
}

/// Row count for one aggregate bin
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BinCount {
    pub start: DateTime<Utc>,
    pub count: u64,
}

/// Parameters of a bounded point query
#[derive(Debug, Clone, PartialEq)]
pub struct PointQuery {
    pub signal: String,
    pub range: TimeRange,
    pub limit: Option<u32>,
}

/// One reading
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SignalPoint {
    pub time: DateTime<Utc>,
    pub value: f64,
}

/// Result of a point query together with the statement that produced it
#[derive(Debug, Clone, PartialEq)]
pub struct PointSeries {
    pub points: Vec<SignalPoint>,
    pub query_text: String,
}

/// Query endpoint of the time-series store
#[async_trait]
pub trait TelemetryStore: Send + Sync {
    /// Grouped row count over `range` in bins of `bin`, ascending by bin start
    async fn aggregate_count(
        &self,
        dataset: &Dataset,
        range: TimeRange,
        bin: Duration,
    ) -> Result<Vec<BinCount>, ProbeError>;

    /// Cheap "does any row exist in `[start, end)`" probe
    async fn exists_any(&self, dataset: &Dataset, range: TimeRange) -> Result<bool, ProbeError>;

    /// Distinct signal names recorded in `range`
    async fn distinct_signals(
        &self,
        dataset: &Dataset,
        range: TimeRange,
    ) -> Result<Vec<String>, ProbeError>;

    /// Readings of one signal, restricted to the query's range and limit
    async fn fetch_points(
        &self,
        dataset: &Dataset,
        query: &PointQuery,
    ) -> Result<PointSeries, ProbeError>;
}

/// One existence probe over the hour before `now`, logged with its latency
///
/// Used at startup to surface an unreachable store or a bad token before
/// the first scan. An empty hour still counts as reachable.
pub async fn check_connectivity(
    store: &dyn TelemetryStore,
    dataset: &Dataset,
    now: DateTime<Utc>,
) -> Result<bool, ProbeError> {
    let range = TimeRange::new(now - Duration::hours(1), now);
    let started = std::time::Instant::now();
    let recent = store.exists_any(dataset, range).await?;
    info!(
        dataset = %dataset.name,
        elapsed_ms = started.elapsed().as_millis() as u64,
        recent_data = recent,
        "Store reachable"
    );
    Ok(recent)
}
