//! Timestamp utilities

use chrono::{DateTime, NaiveDate, NaiveDateTime, SecondsFormat, Utc};

/// Get current UTC timestamp
pub fn now() -> DateTime<Utc> {
    Utc::now()
}

/// Format a UTC timestamp as `YYYY-MM-DDTHH:MM:SS+00:00`
///
/// This is the offset form (not `Z`) that run keys are hashed over, so it
/// must stay stable across releases.
pub fn to_offset_iso(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::AutoSi, false)
}

/// Parse a timestamp leniently and normalise it to UTC
///
/// Accepts RFC 3339 (`Z` or numeric offset), naive date-times (assumed UTC,
/// `T` or space separated, optional fraction) and bare dates (midnight UTC).
/// Returns `None` for empty or unparseable input.
pub fn parse_utc(value: &str) -> Option<DateTime<Utc>> {
    let text = value.trim();
    if text.is_empty() {
        return None;
    }

    if let Ok(dt) = DateTime::parse_from_rfc3339(text) {
        return Some(dt.with_timezone(&Utc));
    }

    for fmt in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(text, fmt) {
            return Some(naive.and_utc());
        }
    }

    NaiveDate::parse_from_str(text, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_now_returns_valid_timestamp() {
        let timestamp = now();
        assert!(timestamp.timestamp() > 946_684_800); // 2000-01-01 00:00:00 UTC
        assert!(timestamp.timestamp() < 4_102_444_800); // 2100-01-01 00:00:00 UTC
    }

    #[test]
    fn test_offset_iso_uses_numeric_offset() {
        let ts = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        assert_eq!(to_offset_iso(&ts), "2024-01-01T00:00:00+00:00");
    }

    #[test]
    fn test_parse_utc_variants() {
        let expected = Utc.with_ymd_and_hms(2025, 6, 1, 12, 30, 0).unwrap();

        assert_eq!(parse_utc("2025-06-01T12:30:00Z"), Some(expected));
        assert_eq!(parse_utc("2025-06-01T08:30:00-04:00"), Some(expected));
        assert_eq!(parse_utc("2025-06-01T12:30:00"), Some(expected));
        assert_eq!(parse_utc("2025-06-01 12:30:00.000"), Some(expected));
        assert_eq!(parse_utc(" 2025-06-01T12:30 "), Some(expected));
    }

    #[test]
    fn test_parse_utc_bare_date_is_midnight() {
        let expected = Utc.with_ymd_and_hms(2025, 6, 1, 0, 0, 0).unwrap();
        assert_eq!(parse_utc("2025-06-01"), Some(expected));
    }

    #[test]
    fn test_parse_utc_rejects_garbage() {
        assert_eq!(parse_utc(""), None);
        assert_eq!(parse_utc("   "), None);
        assert_eq!(parse_utc("yesterday"), None);
    }
}
