//! Configuration resolution for daq-downloader
//!
//! Priority: command line → environment → TOML file → compiled defaults.
//! Environment values are read through a lookup function so tests can supply
//! their own map instead of mutating the process environment.

use chrono::{DateTime, Duration, NaiveTime, TimeZone, Utc};
use chrono_tz::Tz;
use daq_common::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use tracing::warn;

use crate::window::TimeRange;

/// Config file name looked up under `<config_dir>/daq/`
pub const CONFIG_FILE_NAME: &str = "downloader.toml";

const DEFAULT_SEASON: &str = "WFR25";
const DEFAULT_SEASON_YEAR: i32 = 2025;
/// Periodic scans never run more often than this
const MIN_SCAN_INTERVAL_SECS: u64 = 30;
/// Ceiling for day-count settings (chunk, sensor window, lookback)
const MAX_SPAN_DAYS: i64 = 36_600;
/// Ceiling for bin size and minimum granularity
const MAX_BIN_DAYS: i64 = 366;
/// Ceiling for the number of empty bins bridged inside one run
const MAX_GAP_TOLERANCE: u32 = 10_000;

/// Independently scanned partition of the store ("season")
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Dataset {
    /// Season name, e.g. "WFR25"
    pub name: String,
    /// Calendar year the season belongs to
    pub year: i32,
    /// Database holding the season's table
    pub database: String,
    /// `schema.table` identifier, unquoted
    pub table: String,
    /// Display colour for dashboards, free-form
    pub color: Option<String>,
    /// Candidate range probed by the scanner
    pub range: TimeRange,
}

impl Dataset {
    /// Season covering the whole calendar year, stored in `<schema>.<name>`
    pub fn for_year(name: &str, year: i32, schema: &str, color: Option<String>) -> Result<Self> {
        let start = year_start(year)?;
        let end = year_start(year + 1)?;
        Ok(Self {
            name: name.to_string(),
            year,
            database: name.to_string(),
            table: if schema.is_empty() {
                name.to_string()
            } else {
                format!("{}.{}", schema, name)
            },
            color,
            range: TimeRange::new(start, end),
        })
    }
}

fn year_start(year: i32) -> Result<DateTime<Utc>> {
    Utc.with_ymd_and_hms(year, 1, 1, 0, 0, 0)
        .single()
        .ok_or_else(|| Error::Config(format!("Invalid season year: {}", year)))
}

/// Connection settings for the time-series store
#[derive(Debug, Clone)]
pub struct StoreSettings {
    pub host: String,
    pub token: String,
    pub schema: String,
    /// Upper bound on every store request
    pub query_timeout: std::time::Duration,
    /// Extra attempts for timeouts and connection failures on cheap probes
    pub probe_retries: u32,
}

/// Adaptive scanner tunables
#[derive(Debug, Clone)]
pub struct ScannerSettings {
    /// Width of one aggregate bin
    pub bin_size: Duration,
    /// Publish summed row counts with each run
    pub include_counts: bool,
    /// Candidate ranges are processed in slices of this many days
    pub initial_chunk_days: i64,
    /// Consecutive empty bins that still join two non-empty stretches into
    /// one run. 0 splits on any empty bin; raise it for logging with short
    /// dropouts.
    pub gap_tolerance: u32,
    /// Subdivision stops bisecting once an interval is this short
    pub min_granularity: Duration,
    /// Zone used for the local-time fields of runs
    pub timezone: Tz,
}

/// Sensor discovery windows
#[derive(Debug, Clone)]
pub struct SensorSettings {
    pub window_days: i64,
    pub lookback_days: i64,
    /// Historical window queried when the lookback finds nothing
    pub fallback: Option<TimeRange>,
}

/// When periodic scans fire
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Schedule {
    Every(std::time::Duration),
    /// Once a day at this wall-clock time in the scanner timezone
    DailyAt(NaiveTime),
}

#[derive(Debug, Clone)]
pub struct ScheduleSettings {
    pub schedule: Schedule,
    /// Soft ceiling for one dataset within a cycle
    pub dataset_timeout: std::time::Duration,
}

/// Fully resolved service settings
#[derive(Debug, Clone)]
pub struct Settings {
    pub data_dir: PathBuf,
    pub store: StoreSettings,
    /// Newest year first; this is also the scan order
    pub datasets: Vec<Dataset>,
    pub scanner: ScannerSettings,
    pub sensors: SensorSettings,
    pub schedule: ScheduleSettings,
    /// `["*"]` allows any origin
    pub allowed_origins: Vec<String>,
}

// ============================================================================
// TOML file layout
// ============================================================================

/// On-disk TOML layout; every field optional
#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FileConfig {
    pub data_dir: Option<PathBuf>,
    pub influx: InfluxSection,
    pub seasons: Vec<SeasonEntry>,
    pub scanner: ScannerSection,
    pub sensors: SensorSection,
    pub schedule: ScheduleSection,
    pub server: ServerSection,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct InfluxSection {
    pub host: Option<String>,
    pub token: Option<String>,
    pub schema: Option<String>,
    pub query_timeout_seconds: Option<u64>,
    pub probe_retries: Option<u32>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SeasonEntry {
    pub name: String,
    pub year: i32,
    pub color: Option<String>,
    pub database: Option<String>,
    pub table: Option<String>,
    /// Overrides the start of the candidate range (default Jan 1)
    pub start: Option<String>,
    /// Overrides the end of the candidate range (default Jan 1 next year)
    pub end: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ScannerSection {
    pub bin: Option<String>,
    pub include_counts: Option<bool>,
    pub initial_chunk_days: Option<i64>,
    pub gap_tolerance: Option<u32>,
    pub min_granularity_seconds: Option<i64>,
    pub timezone: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SensorSection {
    pub window_days: Option<i64>,
    pub lookback_days: Option<i64>,
    pub fallback_start: Option<String>,
    pub fallback_end: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ScheduleSection {
    pub interval_seconds: Option<u64>,
    pub daily_time: Option<String>,
    pub dataset_timeout_seconds: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ServerSection {
    pub allowed_origins: Option<Vec<String>>,
}

// ============================================================================
// Resolution
// ============================================================================

impl Settings {
    /// Resolve settings from the optional config file and the environment
    pub fn resolve<F>(file: FileConfig, data_dir_arg: Option<&Path>, env: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let env = |key: &str| env(key).filter(|v| !v.trim().is_empty());

        let data_dir =
            daq_common::config::resolve_data_dir(data_dir_arg, env("DATA_DIR"), file.data_dir.as_deref());

        let schema = env("INFLUX_SCHEMA")
            .or(file.influx.schema)
            .unwrap_or_else(|| "iox".to_string());

        let store = StoreSettings {
            host: env("INFLUX_HOST")
                .or(file.influx.host)
                .unwrap_or_else(|| "http://localhost:9000".to_string()),
            token: env("INFLUX_TOKEN").or(file.influx.token).unwrap_or_default(),
            query_timeout: std::time::Duration::from_secs(
                parse_env(&env, "QUERY_TIMEOUT_SECONDS")?
                    .or(file.influx.query_timeout_seconds)
                    .unwrap_or(30),
            ),
            probe_retries: parse_env(&env, "PROBE_RETRIES")?
                .or(file.influx.probe_retries)
                .unwrap_or(2),
            schema: schema.clone(),
        };

        let datasets = match env("SEASONS") {
            Some(raw) => parse_seasons(&raw, &schema)?,
            None if !file.seasons.is_empty() => seasons_from_file(file.seasons, &schema)?,
            None => Vec::new(),
        };
        let mut datasets = if datasets.is_empty() {
            vec![Dataset::for_year(DEFAULT_SEASON, DEFAULT_SEASON_YEAR, &schema, None)?]
        } else {
            datasets
        };
        // Newest first; stable so equal years keep configuration order
        datasets.sort_by(|a, b| b.year.cmp(&a.year));

        let timezone_name = env("SCANNER_TIMEZONE")
            .or(file.scanner.timezone)
            .unwrap_or_else(|| "America/Toronto".to_string());
        let timezone: Tz = timezone_name
            .parse()
            .map_err(|_| Error::Config(format!("Unknown timezone: {}", timezone_name)))?;

        let bin_raw = env("SCANNER_BIN")
            .or(file.scanner.bin)
            .unwrap_or_else(|| "hour".to_string());
        let bin_size = parse_span(&bin_raw)
            .ok_or_else(|| Error::Config(format!("Invalid SCANNER_BIN: {}", bin_raw)))?;

        let granularity_secs: i64 = parse_env(&env, "SCANNER_MIN_GRANULARITY_SECONDS")?
            .or(file.scanner.min_granularity_seconds)
            .unwrap_or(3600);
        let min_granularity = Duration::try_seconds(granularity_secs).ok_or_else(|| {
            Error::Config(format!(
                "Invalid SCANNER_MIN_GRANULARITY_SECONDS: {}",
                granularity_secs
            ))
        })?;

        let scanner = ScannerSettings {
            bin_size,
            include_counts: parse_env_bool(&env, "SCANNER_INCLUDE_COUNTS")?
                .or(file.scanner.include_counts)
                .unwrap_or(true),
            initial_chunk_days: parse_env(&env, "SCANNER_INITIAL_CHUNK_DAYS")?
                .or(file.scanner.initial_chunk_days)
                .unwrap_or(31),
            gap_tolerance: parse_env(&env, "SCANNER_GAP_TOLERANCE")?
                .or(file.scanner.gap_tolerance)
                .unwrap_or(0),
            min_granularity,
            timezone,
        };

        let fallback_start = env("SENSOR_FALLBACK_START").or(file.sensors.fallback_start);
        let fallback_end = env("SENSOR_FALLBACK_END").or(file.sensors.fallback_end);
        let fallback = match (fallback_start, fallback_end) {
            (Some(start), Some(end)) => Some(TimeRange::new(
                parse_timestamp("SENSOR_FALLBACK_START", &start)?,
                parse_timestamp("SENSOR_FALLBACK_END", &end)?,
            )),
            (None, None) => None,
            _ => {
                warn!("Sensor fallback window needs both start and end; ignoring");
                None
            }
        };

        let sensors = SensorSettings {
            window_days: parse_env(&env, "SENSOR_WINDOW_DAYS")?
                .or(file.sensors.window_days)
                .unwrap_or(7),
            lookback_days: parse_env(&env, "SENSOR_LOOKBACK_DAYS")?
                .or(file.sensors.lookback_days)
                .unwrap_or(30),
            fallback,
        };

        let daily_time = env("SCAN_DAILY_TIME").or(file.schedule.daily_time);
        let schedule = match daily_time {
            Some(raw) => Schedule::DailyAt(
                NaiveTime::parse_from_str(raw.trim(), "%H:%M")
                    .map_err(|_| Error::Config(format!("Invalid SCAN_DAILY_TIME (HH:MM): {}", raw)))?,
            ),
            None => {
                let secs: u64 = parse_env(&env, "SCAN_INTERVAL_SECONDS")?
                    .or(file.schedule.interval_seconds)
                    .unwrap_or(3600);
                Schedule::Every(std::time::Duration::from_secs(secs.max(MIN_SCAN_INTERVAL_SECS)))
            }
        };

        let schedule = ScheduleSettings {
            schedule,
            dataset_timeout: std::time::Duration::from_secs(
                parse_env(&env, "DATASET_TIMEOUT_SECONDS")?
                    .or(file.schedule.dataset_timeout_seconds)
                    .unwrap_or(900),
            ),
        };

        let allowed_origins = match env("ALLOWED_ORIGINS") {
            Some(raw) => parse_origins(&raw),
            None => file
                .server
                .allowed_origins
                .unwrap_or_else(|| vec!["*".to_string()]),
        };

        let settings = Self {
            data_dir,
            store,
            datasets,
            scanner,
            sensors,
            schedule,
            allowed_origins,
        };
        settings.validate()?;
        Ok(settings)
    }

    /// Reject settings the scanner cannot work with
    pub fn validate(&self) -> Result<()> {
        let max_bin = Duration::days(MAX_BIN_DAYS);
        if self.scanner.bin_size <= Duration::zero() || self.scanner.bin_size > max_bin {
            return Err(Error::Config(format!(
                "Bin size must be positive and at most {} days",
                MAX_BIN_DAYS
            )));
        }
        if self.scanner.min_granularity <= Duration::zero() || self.scanner.min_granularity > max_bin {
            return Err(Error::Config(format!(
                "Minimum granularity must be positive and at most {} days",
                MAX_BIN_DAYS
            )));
        }
        if self.scanner.gap_tolerance > MAX_GAP_TOLERANCE {
            return Err(Error::Config(format!(
                "Gap tolerance must be at most {} bins",
                MAX_GAP_TOLERANCE
            )));
        }
        for (name, days) in [
            ("Initial chunk days", self.scanner.initial_chunk_days),
            ("Sensor window days", self.sensors.window_days),
            ("Sensor lookback days", self.sensors.lookback_days),
        ] {
            if !(1..=MAX_SPAN_DAYS).contains(&days) {
                return Err(Error::Config(format!(
                    "{} must be between 1 and {}: {}",
                    name, MAX_SPAN_DAYS, days
                )));
            }
        }
        if let Some(fallback) = &self.sensors.fallback {
            if fallback.is_empty() {
                return Err(Error::Config(format!(
                    "Sensor fallback window is empty or inverted: {}",
                    fallback
                )));
            }
        }
        if self.store.query_timeout.is_zero() || self.schedule.dataset_timeout.is_zero() {
            return Err(Error::Config("Timeouts must be positive".to_string()));
        }

        let mut seen = HashSet::new();
        for dataset in &self.datasets {
            if !seen.insert(dataset.name.as_str()) {
                return Err(Error::Config(format!("Duplicate season: {}", dataset.name)));
            }
            if dataset.table.split('.').all(|part| part.trim().is_empty()) {
                return Err(Error::Config(format!("Season {} has an empty table name", dataset.name)));
            }
            if dataset.range.is_empty() {
                return Err(Error::Config(format!(
                    "Season {} has an empty candidate range",
                    dataset.name
                )));
            }
        }
        Ok(())
    }
}

/// Parse `SEASONS`: `"WFR25:2025:222 76 153,WFR26:2026"`
///
/// Entries without a numeric year are skipped with a warning.
pub fn parse_seasons(raw: &str, schema: &str) -> Result<Vec<Dataset>> {
    let mut seasons = Vec::new();
    for part in raw.split(',').map(str::trim).filter(|p| !p.is_empty()) {
        let mut fields = part.splitn(3, ':');
        let name = fields.next().unwrap_or_default().trim();
        let year = match fields.next().map(|y| y.trim().parse::<i32>()) {
            Some(Ok(year)) => year,
            _ => {
                warn!("Skipping malformed season entry: {}", part);
                continue;
            }
        };
        if name.is_empty() {
            warn!("Skipping season entry without a name: {}", part);
            continue;
        }
        let color = fields
            .next()
            .map(|c| c.trim().to_string())
            .filter(|c| !c.is_empty());
        seasons.push(Dataset::for_year(name, year, schema, color)?);
    }
    Ok(seasons)
}

fn seasons_from_file(entries: Vec<SeasonEntry>, schema: &str) -> Result<Vec<Dataset>> {
    entries
        .into_iter()
        .map(|entry| {
            let mut dataset = Dataset::for_year(&entry.name, entry.year, schema, entry.color)?;
            if let Some(database) = entry.database {
                dataset.database = database;
            }
            if let Some(table) = entry.table {
                dataset.table = table;
            }
            if let Some(start) = entry.start {
                dataset.range.start = parse_timestamp("season start", &start)?;
            }
            if let Some(end) = entry.end {
                dataset.range.end = parse_timestamp("season end", &end)?;
            }
            Ok(dataset)
        })
        .collect()
}

/// Parse a span: `minute`, `hour`, `day`, plain seconds, or `<n>s|m|h|d`
pub fn parse_span(raw: &str) -> Option<Duration> {
    let text = raw.trim().to_ascii_lowercase();
    match text.as_str() {
        "minute" => return Duration::try_minutes(1),
        "hour" => return Duration::try_hours(1),
        "day" => return Duration::try_days(1),
        _ => {}
    }

    if let Ok(secs) = text.parse::<i64>() {
        return Duration::try_seconds(secs).filter(|_| secs > 0);
    }
    if !text.is_ascii() {
        return None;
    }

    let (digits, unit) = text.split_at(text.len().checked_sub(1)?);
    let n: i64 = digits.parse().ok().filter(|n| *n > 0)?;
    match unit {
        "s" => Duration::try_seconds(n),
        "m" => Duration::try_minutes(n),
        "h" => Duration::try_hours(n),
        "d" => Duration::try_days(n),
        _ => None,
    }
}

fn parse_origins(raw: &str) -> Vec<String> {
    if raw.trim() == "*" {
        return vec!["*".to_string()];
    }
    raw.split(',')
        .map(|o| o.trim().to_string())
        .filter(|o| !o.is_empty())
        .collect()
}

fn parse_timestamp(name: &str, raw: &str) -> Result<DateTime<Utc>> {
    daq_common::time::parse_utc(raw)
        .ok_or_else(|| Error::Config(format!("Invalid {} timestamp: {}", name, raw)))
}

fn parse_env<T, F>(env: &F, key: &str) -> Result<Option<T>>
where
    T: std::str::FromStr,
    F: Fn(&str) -> Option<String>,
{
    match env(key) {
        Some(raw) => raw
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|_| Error::Config(format!("Invalid {}: {}", key, raw))),
        None => Ok(None),
    }
}

fn parse_env_bool<F>(env: &F, key: &str) -> Result<Option<bool>>
where
    F: Fn(&str) -> Option<String>,
{
    match env(key).map(|v| v.trim().to_ascii_lowercase()) {
        Some(v) if matches!(v.as_str(), "true" | "1" | "yes" | "on") => Ok(Some(true)),
        Some(v) if matches!(v.as_str(), "false" | "0" | "no" | "off") => Ok(Some(false)),
        Some(v) => Err(Error::Config(format!("Invalid {}: {}", key, v))),
        None => Ok(None),
    }
}
