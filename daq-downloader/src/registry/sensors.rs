//! Sensor documents

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Contents of `<dataset>/sensors.json`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SensorsDocument {
    pub updated_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub sensors: Vec<String>,
}

impl SensorsDocument {
    /// Replace the set with `names` unless it is empty
    ///
    /// Returns whether the document changed. An empty discovery keeps the
    /// previous set so a transient schema problem never blanks the list.
    pub fn replace_unless_empty(&mut self, names: &[String], now: DateTime<Utc>) -> bool {
        let mut cleaned: Vec<String> = names
            .iter()
            .map(|n| n.trim())
            .filter(|n| !n.is_empty())
            .map(str::to_string)
            .collect();
        if cleaned.is_empty() {
            return false;
        }
        cleaned.sort();
        cleaned.dedup();

        self.sensors = cleaned;
        self.updated_at = Some(now);
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_does_not_overwrite() {
        let now = Utc::now();
        let mut doc = SensorsDocument::default();
        assert!(doc.replace_unless_empty(&["voltage".to_string(), "rpm".to_string()], now));
        assert!(!doc.replace_unless_empty(&[], now));
        assert!(!doc.replace_unless_empty(&["  ".to_string()], now));
        assert_eq!(doc.sensors, vec!["rpm", "voltage"]);
    }

    #[test]
    fn test_names_deduplicated() {
        let mut doc = SensorsDocument::default();
        doc.replace_unless_empty(&["b".to_string(), "a".to_string(), "b".to_string()], Utc::now());
        assert_eq!(doc.sensors, vec!["a", "b"]);
    }
}
