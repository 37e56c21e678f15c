//! Run documents and the scan merge

use chrono::{DateTime, FixedOffset, Utc};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::window::Window;

/// Persisted, annotatable record of a discovered window
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Run {
    pub key: String,
    pub start_utc: DateTime<Utc>,
    pub end_utc: DateTime<Utc>,
    pub start_local: DateTime<FixedOffset>,
    pub end_local: DateTime<FixedOffset>,
    /// IANA zone the local fields were converted with
    pub timezone: String,
    pub bins: u32,
    pub row_count: Option<u64>,
    #[serde(default)]
    pub note: Option<String>,
    #[serde(default)]
    pub note_updated_at: Option<DateTime<Utc>>,
}

impl Run {
    /// New run for a freshly discovered window, note unset
    pub fn from_window(window: &Window, timezone: Tz) -> Self {
        Self {
            key: run_key(&window.start, &window.end),
            start_utc: window.start,
            end_utc: window.end,
            start_local: window.start.with_timezone(&timezone).fixed_offset(),
            end_local: window.end.with_timezone(&timezone).fixed_offset(),
            timezone: timezone.name().to_string(),
            bins: window.bins,
            row_count: window.row_count,
            note: None,
            note_updated_at: None,
        }
    }

    /// Overwrite discovery-derived fields from a newer scan
    fn refresh_from(&mut self, scanned: Run) {
        self.start_utc = scanned.start_utc;
        self.end_utc = scanned.end_utc;
        self.start_local = scanned.start_local;
        self.end_local = scanned.end_local;
        self.timezone = scanned.timezone;
        self.bins = scanned.bins;
        self.row_count = scanned.row_count;
    }
}

/// Contents of `<dataset>/runs.json`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RunsDocument {
    pub updated_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub runs: Vec<Run>,
}

/// Counts from one merge, for logging
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MergeSummary {
    pub added: usize,
    pub refreshed: usize,
    /// Previously known runs not seen in this scan, kept as they were
    pub retained: usize,
}

/// Stable key: first 10 hex digits of MD5 over `<start>_<end>`
///
/// Both ends are formatted as `YYYY-MM-DDTHH:MM:SS+00:00`.
pub fn run_key(start: &DateTime<Utc>, end: &DateTime<Utc>) -> String {
    let raw = format!(
        "{}_{}",
        daq_common::time::to_offset_iso(start),
        daq_common::time::to_offset_iso(end)
    );
    let digest = format!("{:x}", md5::compute(raw.as_bytes()));
    digest[..10].to_string()
}

/// Merge scan output into `doc`
///
/// Existing keys get their discovery fields refreshed with note fields kept;
/// new keys are inserted; runs missing from the scan are left alone. The
/// result is sorted ascending by start.
pub fn merge_scanned(
    doc: &mut RunsDocument,
    windows: &[Window],
    timezone: Tz,
    now: DateTime<Utc>,
) -> MergeSummary {
    let mut summary = MergeSummary::default();
    let mut index: HashMap<String, usize> = doc
        .runs
        .iter()
        .enumerate()
        .map(|(i, r)| (r.key.clone(), i))
        .collect();
    let mut seen = vec![false; doc.runs.len()];

    for window in windows {
        let scanned = Run::from_window(window, timezone);
        match index.get(&scanned.key) {
            Some(&i) => {
                if !seen[i] {
                    summary.refreshed += 1;
                    seen[i] = true;
                }
                doc.runs[i].refresh_from(scanned);
            }
            None => {
                index.insert(scanned.key.clone(), doc.runs.len());
                doc.runs.push(scanned);
                seen.push(true);
                summary.added += 1;
            }
        }
    }

    summary.retained = seen.iter().filter(|s| !**s).count();
    doc.runs.sort_by(|a, b| a.start_utc.cmp(&b.start_utc).then(a.end_utc.cmp(&b.end_utc)));
    doc.updated_at = Some(now);
    summary
}
