//! SQL text for the time-series store
//!
//! Every statement the service sends is built here from typed parameters.
//! Identifiers are double-quoted and string values single-quoted with
//! embedded quotes doubled, so caller-supplied signal names cannot change
//! the shape of a statement.

use chrono::{DateTime, Duration, Utc};

use crate::window::TimeRange;

/// Column holding the signal name in telemetry tables
pub const SIGNAL_COLUMN: &str = "signalName";
/// Column holding the reading value in telemetry tables
pub const VALUE_COLUMN: &str = "sensorReading";
/// Cap on distinct names returned per discovery chunk
pub const DISTINCT_SIGNAL_LIMIT: u32 = 5000;

/// `abc` → `"abc"`; already-quoted input is not quoted twice
pub fn quote_identifier(identifier: &str) -> String {
    let trimmed = identifier.trim();
    let bare = trimmed
        .strip_prefix('"')
        .and_then(|s| s.strip_suffix('"'))
        .unwrap_or(trimmed);
    format!("\"{}\"", bare.replace('"', "\"\""))
}

/// `iox.WFR25` → `"iox"."WFR25"`; empty segments are dropped
pub fn quote_table(identifier: &str) -> String {
    identifier
        .split('.')
        .filter(|part| !part.trim().is_empty())
        .map(quote_identifier)
        .collect::<Vec<_>>()
        .join(".")
}

/// `it's` → `'it''s'`
pub fn quote_literal(value: &str) -> String {
    format!("'{}'", value.replace('\'', "''"))
}

/// `TIMESTAMP '2024-01-01T00:00:00+00:00'`
pub fn timestamp_literal(ts: &DateTime<Utc>) -> String {
    format!("TIMESTAMP '{}'", daq_common::time::to_offset_iso(ts))
}

/// Collapse a multi-line statement onto one line
pub fn one_line(sql: &str) -> String {
    sql.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

/// Grouped row count per bin, empty bins omitted
pub fn aggregate_count(table: &str, range: &TimeRange, bin: Duration) -> String {
    one_line(&format!(
        r#"
        SELECT
            DATE_BIN(INTERVAL '{secs} seconds', time, {origin}) AS bucket,
            COUNT(*) AS n
        FROM {table}
        WHERE time >= {start}
          AND time <  {end}
        GROUP BY bucket
        HAVING COUNT(*) > 0
        ORDER BY bucket
        "#,
        secs = bin.num_seconds(),
        origin = timestamp_literal(&range.start),
        table = quote_table(table),
        start = timestamp_literal(&range.start),
        end = timestamp_literal(&range.end),
    ))
}

/// At most one row if anything exists in the range
pub fn exists_any(table: &str, range: &TimeRange) -> String {
    one_line(&format!(
        r#"
        SELECT 1 AS present
        FROM {table}
        WHERE time >= {start}
          AND time <  {end}
        LIMIT 1
        "#,
        table = quote_table(table),
        start = timestamp_literal(&range.start),
        end = timestamp_literal(&range.end),
    ))
}

/// Distinct signal names recorded in the range
pub fn distinct_signals(table: &str, range: &TimeRange) -> String {
    one_line(&format!(
        r#"
        SELECT DISTINCT {column}
        FROM {table}
        WHERE time >= {start}
          AND time <  {end}
        LIMIT {limit}
        "#,
        column = quote_identifier(SIGNAL_COLUMN),
        table = quote_table(table),
        start = timestamp_literal(&range.start),
        end = timestamp_literal(&range.end),
        limit = DISTINCT_SIGNAL_LIMIT,
    ))
}

/// Readings of one signal, oldest first; both range ends inclusive
pub fn signal_series(table: &str, signal: &str, range: &TimeRange, limit: Option<u32>) -> String {
    let limit_clause = limit.map(|n| format!(" LIMIT {}", n)).unwrap_or_default();
    one_line(&format!(
        r#"
        SELECT time, {value}
        FROM {table}
        WHERE {signal_column} = {signal}
          AND time >= {start}
          AND time <= {end}
        ORDER BY time{limit_clause}
        "#,
        value = quote_identifier(VALUE_COLUMN),
        table = quote_table(table),
        signal_column = quote_identifier(SIGNAL_COLUMN),
        signal = quote_literal(signal),
        start = timestamp_literal(&range.start),
        end = timestamp_literal(&range.end),
    ))
}
