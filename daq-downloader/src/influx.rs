//! InfluxDB 3 SQL client
//!
//! Implements [`TelemetryStore`] over the `/api/v3/query_sql` HTTP endpoint
//! with JSON row output. Every request carries the configured timeout.

use async_trait::async_trait;
use chrono::Duration;
use serde::Serialize;
use serde_json::{Map, Value};
use std::time::Instant;

use crate::config::{Dataset, StoreSettings};
use crate::sql;
use crate::store::{BinCount, PointQuery, PointSeries, ProbeError, SignalPoint, TelemetryStore};
use crate::window::TimeRange;

const USER_AGENT: &str = concat!("daq-downloader/", env!("CARGO_PKG_VERSION"));
const QUERY_PATH: &str = "/api/v3/query_sql";

/// Error body fragments the query engine uses when a plan is too big
const EXHAUSTION_MARKERS: &[&str] = &[
    "resources exhausted",
    "resource exhausted",
    "too large",
    "memory limit",
    "exceeds the maximum",
];

#[derive(Debug, Serialize)]
struct QueryRequest<'a> {
    db: &'a str,
    q: &'a str,
    format: &'static str,
}

type Row = Map<String, Value>;

/// HTTP client for one InfluxDB 3 server
pub struct InfluxClient {
    http_client: reqwest::Client,
    base_url: String,
    token: String,
    timeout: std::time::Duration,
}

impl InfluxClient {
    pub fn new(settings: &StoreSettings) -> Result<Self, ProbeError> {
        let http_client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(settings.query_timeout)
            .build()
            .map_err(|e| ProbeError::Transport(e.to_string()))?;

        Ok(Self {
            http_client,
            base_url: settings.host.trim_end_matches('/').to_string(),
            token: settings.token.clone(),
            timeout: settings.query_timeout,
        })
    }

    /// Execute one statement and return its rows
    async fn query_rows(&self, database: &str, statement: &str) -> Result<Vec<Row>, ProbeError> {
        let url = format!("{}{}", self.base_url, QUERY_PATH);
        let started = Instant::now();

        tracing::debug!(database = %database, sql = %statement, "Querying store");

        let mut request = self.http_client.post(&url).json(&QueryRequest {
            db: database,
            q: statement,
            format: "json",
        });
        if !self.token.is_empty() {
            request = request.bearer_auth(&self.token);
        }

        let response = request.send().await.map_err(|e| self.map_transport(e))?;
        let status = response.status();

        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(classify_status(status.as_u16(), &body, self.timeout));
        }

        let body: Value = response.json().await.map_err(|e| {
            if e.is_timeout() {
                ProbeError::Timeout(self.timeout)
            } else {
                ProbeError::Decode(e.to_string())
            }
        })?;

        let rows = into_rows(body)?;
        tracing::debug!(
            database = %database,
            rows = rows.len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Store query complete"
        );
        Ok(rows)
    }

    fn map_transport(&self, err: reqwest::Error) -> ProbeError {
        if err.is_timeout() {
            ProbeError::Timeout(self.timeout)
        } else {
            ProbeError::Transport(err.to_string())
        }
    }
}

#[async_trait]
impl TelemetryStore for InfluxClient {
    async fn aggregate_count(
        &self,
        dataset: &Dataset,
        range: TimeRange,
        bin: Duration,
    ) -> Result<Vec<BinCount>, ProbeError> {
        let statement = sql::aggregate_count(&dataset.table, &range, bin);
        let rows = self.query_rows(&dataset.database, &statement).await?;
        decode_bins(&rows)
    }

    async fn exists_any(&self, dataset: &Dataset, range: TimeRange) -> Result<bool, ProbeError> {
        let statement = sql::exists_any(&dataset.table, &range);
        let rows = self.query_rows(&dataset.database, &statement).await?;
        Ok(!rows.is_empty())
    }

    async fn distinct_signals(
        &self,
        dataset: &Dataset,
        range: TimeRange,
    ) -> Result<Vec<String>, ProbeError> {
        let statement = sql::distinct_signals(&dataset.table, &range);
        let rows = self.query_rows(&dataset.database, &statement).await?;
        Ok(decode_signals(&rows))
    }

    async fn fetch_points(
        &self,
        dataset: &Dataset,
        query: &PointQuery,
    ) -> Result<PointSeries, ProbeError> {
        let statement = sql::signal_series(&dataset.table, &query.signal, &query.range, query.limit);
        let rows = self.query_rows(&dataset.database, &statement).await?;
        Ok(PointSeries {
            points: decode_points(&rows)?,
            query_text: statement,
        })
    }
}

/// Map a non-success HTTP status (and body) to a typed error
pub fn classify_status(status: u16, body: &str, timeout: std::time::Duration) -> ProbeError {
    let lowered = body.to_ascii_lowercase();
    match status {
        408 | 504 => ProbeError::Timeout(timeout),
        413 | 429 | 507 => ProbeError::ResourceExhausted(truncate(body)),
        _ if EXHAUSTION_MARKERS.iter().any(|m| lowered.contains(m)) => {
            ProbeError::ResourceExhausted(truncate(body))
        }
        _ if lowered.contains("timed out") || lowered.contains("timeout") => {
            ProbeError::Timeout(timeout)
        }
        _ => ProbeError::Query {
            status,
            message: truncate(body),
        },
    }
}

fn truncate(body: &str) -> String {
    const MAX: usize = 512;
    match body.char_indices().nth(MAX) {
        Some((idx, _)) => format!("{}...", &body[..idx]),
        None => body.to_string(),
    }
}

/// Accept a top-level array of row objects (empty body means no rows)
fn into_rows(body: Value) -> Result<Vec<Row>, ProbeError> {
    match body {
        Value::Array(items) => items
            .into_iter()
            .map(|item| match item {
                Value::Object(row) => Ok(row),
                other => Err(ProbeError::Decode(format!("row is not an object: {}", other))),
            })
            .collect(),
        Value::Null => Ok(Vec::new()),
        other => Err(ProbeError::Decode(format!("expected an array of rows, got {}", other))),
    }
}

fn field<'a>(row: &'a Row, name: &str) -> Result<&'a Value, ProbeError> {
    row.get(name)
        .ok_or_else(|| ProbeError::Decode(format!("missing column {}", name)))
}

fn as_timestamp(value: &Value) -> Result<chrono::DateTime<chrono::Utc>, ProbeError> {
    value
        .as_str()
        .and_then(daq_common::time::parse_utc)
        .ok_or_else(|| ProbeError::Decode(format!("bad timestamp: {}", value)))
}

fn as_count(value: &Value) -> Result<u64, ProbeError> {
    value
        .as_u64()
        .or_else(|| value.as_i64().map(|n| n.max(0) as u64))
        .or_else(|| value.as_str().and_then(|s| s.parse().ok()))
        .ok_or_else(|| ProbeError::Decode(format!("bad count: {}", value)))
}

pub(crate) fn decode_bins(rows: &[Row]) -> Result<Vec<BinCount>, ProbeError> {
    let mut bins = rows
        .iter()
        .map(|row| {
            Ok(BinCount {
                start: as_timestamp(field(row, "bucket")?)?,
                count: as_count(field(row, "n")?)?,
            })
        })
        .collect::<Result<Vec<_>, ProbeError>>()?;
    bins.sort_by_key(|b| b.start);
    Ok(bins)
}

pub(crate) fn decode_signals(rows: &[Row]) -> Vec<String> {
    rows.iter()
        .filter_map(|row| row.get(sql::SIGNAL_COLUMN).and_then(Value::as_str))
        .map(str::to_string)
        .collect()
}

pub(crate) fn decode_points(rows: &[Row]) -> Result<Vec<SignalPoint>, ProbeError> {
    rows.iter()
        .filter_map(|row| {
            // Null readings carry no value to plot
            let value = row.get(sql::VALUE_COLUMN).and_then(Value::as_f64)?;
            Some(field(row, "time").and_then(as_timestamp).map(|time| SignalPoint { time, value }))
        })
        .collect()
}
