//! Time ranges and detected data windows

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// Half-open UTC interval `[start, end)`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TimeRange {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl TimeRange {
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        Self { start, end }
    }

    pub fn is_empty(&self) -> bool {
        self.start >= self.end
    }

    pub fn duration(&self) -> Duration {
        if self.is_empty() {
            Duration::zero()
        } else {
            self.end - self.start
        }
    }

    /// Split at the midpoint, truncated to whole seconds
    ///
    /// Returns `None` when the range is too short to yield two non-empty halves.
    pub fn bisect(&self) -> Option<(TimeRange, TimeRange)> {
        let half = Duration::seconds(self.duration().num_seconds() / 2);
        let mid = self.start + half;
        if mid <= self.start || mid >= self.end {
            return None;
        }
        Some((TimeRange::new(self.start, mid), TimeRange::new(mid, self.end)))
    }

    /// Consecutive slices of at most `step`; the last one may be shorter
    pub fn chunks(&self, step: Duration) -> Vec<TimeRange> {
        if self.is_empty() {
            return Vec::new();
        }
        if step <= Duration::zero() {
            return vec![*self];
        }

        let mut out = Vec::new();
        let mut cur = self.start;
        while cur < self.end {
            let next = cur
                .checked_add_signed(step)
                .map_or(self.end, |next| std::cmp::min(next, self.end));
            out.push(TimeRange::new(cur, next));
            cur = next;
        }
        out
    }
}

impl std::fmt::Display for TimeRange {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}, {})", self.start.to_rfc3339(), self.end.to_rfc3339())
    }
}

/// Contiguous interval with evidence of data, produced by one scan
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Window {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    /// Number of evidence cells (non-empty bins or accepted leaf intervals)
    pub bins: u32,
    /// Summed row counts; unknown when any contributing cell had no count
    pub row_count: Option<u64>,
}

impl Window {
    pub fn range(&self) -> TimeRange {
        TimeRange::new(self.start, self.end)
    }
}

/// Expand aggregate bins into windows and merge them
///
/// Zero-count bins are dropped. Up to `gap_tolerance` consecutive empty bins
/// between two non-empty ones still count as the same window.
pub fn windows_from_bins(
    bins: &[(DateTime<Utc>, u64)],
    bin_size: Duration,
    gap_tolerance: u32,
    include_counts: bool,
) -> Vec<Window> {
    let cells = bins
        .iter()
        .filter(|(_, count)| *count > 0)
        .map(|(start, count)| Window {
            start: *start,
            end: *start + bin_size,
            bins: 1,
            row_count: include_counts.then_some(*count),
        })
        .collect();

    merge_windows(cells, gap_span(bin_size, gap_tolerance))
}

/// Widest gap bridged by `gap_tolerance` empty bins
///
/// Saturates instead of wrapping when the product does not fit.
pub fn gap_span(bin_size: Duration, gap_tolerance: u32) -> Duration {
    i32::try_from(gap_tolerance)
        .ok()
        .and_then(|bins| bin_size.checked_mul(bins))
        .unwrap_or_else(Duration::max_value)
}

/// Sort and coalesce windows into a non-overlapping ascending list
///
/// Windows that overlap, touch, or are separated by at most `max_gap` merge.
pub fn merge_windows(mut windows: Vec<Window>, max_gap: Duration) -> Vec<Window> {
    windows.sort_by(|a, b| a.start.cmp(&b.start).then(a.end.cmp(&b.end)));

    let mut merged: Vec<Window> = Vec::with_capacity(windows.len());
    for window in windows {
        match merged.last_mut() {
            Some(current) if reaches(current.end, max_gap, window.start) => {
                if window.end > current.end {
                    current.end = window.end;
                }
                current.bins += window.bins;
                current.row_count = match (current.row_count, window.row_count) {
                    (Some(a), Some(b)) => Some(a + b),
                    _ => None,
                };
            }
            _ => merged.push(window),
        }
    }
    merged
}

/// `start <= end + gap`, where a sum past the calendar limit reaches anything
fn reaches(end: DateTime<Utc>, gap: Duration, start: DateTime<Utc>) -> bool {
    end.checked_add_signed(gap).map_or(true, |limit| start <= limit)
}
