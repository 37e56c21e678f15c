//! Run/sensor registry
//!
//! Owns the per-dataset documents under the data directory:
//!
//! ```text
//! <data_dir>/<dataset>/runs.json
//! <data_dir>/<dataset>/sensors.json
//! ```
//!
//! Writers to one dataset are serialized by an in-process async mutex and,
//! across processes, by the document's file lock. Readers take no lock.

pub mod document;
pub mod runs;
pub mod sensors;

use chrono_tz::Tz;
use daq_common::{Error, Result};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{info, warn};

pub use document::JsonDocument;
pub use runs::{merge_scanned, run_key, MergeSummary, Run, RunsDocument};
pub use sensors::SensorsDocument;

use crate::window::Window;

const RUNS_FILE: &str = "runs.json";
const SENSORS_FILE: &str = "sensors.json";
const MAX_NOTE_CHARS: usize = 4000;

pub struct Registry {
    root: PathBuf,
    timezone: Tz,
    locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl Registry {
    pub fn new(root: impl Into<PathBuf>, timezone: Tz) -> Self {
        Self {
            root: root.into(),
            timezone,
            locks: Mutex::new(HashMap::new()),
        }
    }

    /// Merge scan output into the dataset's runs
    pub async fn merge_runs(&self, dataset: &str, windows: Vec<Window>) -> Result<RunsDocument> {
        let doc = self.runs_document(dataset)?;
        let timezone = self.timezone;
        let lock = self.writer_lock(dataset).await;
        let _guard = lock.lock().await;

        let (updated, summary) = blocking(move || {
            doc.update(|current| {
                let summary = merge_scanned(current, &windows, timezone, daq_common::time::now());
                Ok((current.clone(), summary))
            })
        })
        .await?;

        info!(
            dataset = %dataset,
            total = updated.runs.len(),
            added = summary.added,
            refreshed = summary.refreshed,
            retained = summary.retained,
            "Runs merged"
        );
        Ok(updated)
    }

    /// Replace the sensor set unless `names` is empty
    pub async fn write_sensors(&self, dataset: &str, names: Vec<String>) -> Result<SensorsDocument> {
        let doc = self.sensors_document(dataset)?;
        let lock = self.writer_lock(dataset).await;
        let _guard = lock.lock().await;

        let (current, replaced) = blocking(move || {
            doc.update_if(|current| Ok(current.replace_unless_empty(&names, daq_common::time::now())))
        })
        .await?;

        if replaced {
            info!(dataset = %dataset, sensors = current.sensors.len(), "Sensors written");
        } else {
            warn!(
                dataset = %dataset,
                kept = current.sensors.len(),
                "Sensor discovery returned nothing, keeping previous set"
            );
        }
        Ok(current)
    }

    /// Set a run's note; the only mutation not driven by a scan
    ///
    /// An empty note clears it. Unknown keys leave the document untouched.
    pub async fn set_note(&self, dataset: &str, key: &str, text: &str) -> Result<Run> {
        let note = text.trim();
        if note.chars().count() > MAX_NOTE_CHARS {
            return Err(Error::InvalidInput(format!(
                "Note exceeds {} characters",
                MAX_NOTE_CHARS
            )));
        }
        let note = (!note.is_empty()).then(|| note.to_string());

        let doc = self.runs_document(dataset)?;
        let lock = self.writer_lock(dataset).await;
        let _guard = lock.lock().await;

        let key = key.to_string();
        let dataset_name = dataset.to_string();
        let run = blocking(move || {
            doc.update(|current| {
                let now = daq_common::time::now();
                let run = current
                    .runs
                    .iter_mut()
                    .find(|r| r.key == key)
                    .ok_or_else(|| {
                        Error::NotFound(format!("Run {} in season {}", key, dataset_name))
                    })?;
                run.note = note;
                run.note_updated_at = Some(now);
                let run = run.clone();
                current.updated_at = Some(now);
                Ok(run)
            })
        })
        .await?;

        info!(dataset = %dataset, key = %run.key, "Run note updated");
        Ok(run)
    }

    pub async fn read_runs(&self, dataset: &str) -> Result<RunsDocument> {
        let doc = self.runs_document(dataset)?;
        blocking(move || doc.read()).await
    }

    pub async fn read_sensors(&self, dataset: &str) -> Result<SensorsDocument> {
        let doc = self.sensors_document(dataset)?;
        blocking(move || doc.read()).await
    }

    fn runs_document(&self, dataset: &str) -> Result<JsonDocument<RunsDocument>> {
        Ok(JsonDocument::new(self.dataset_dir(dataset)?.join(RUNS_FILE)))
    }

    fn sensors_document(&self, dataset: &str) -> Result<JsonDocument<SensorsDocument>> {
        Ok(JsonDocument::new(self.dataset_dir(dataset)?.join(SENSORS_FILE)))
    }

    fn dataset_dir(&self, dataset: &str) -> Result<PathBuf> {
        let valid = !dataset.is_empty()
            && dataset != "."
            && dataset != ".."
            && dataset
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'));
        if !valid {
            return Err(Error::InvalidInput(format!("Invalid season name: {:?}", dataset)));
        }
        Ok(self.root.join(dataset))
    }

    async fn writer_lock(&self, dataset: &str) -> Arc<Mutex<()>> {
        let mut locks = self.locks.lock().await;
        locks
            .entry(dataset.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }
}

/// Run blocking file work off the async workers
async fn blocking<R, F>(work: F) -> Result<R>
where
    F: FnOnce() -> Result<R> + Send + 'static,
    R: Send + 'static,
{
    tokio::task::spawn_blocking(work)
        .await
        .map_err(|e| Error::Internal(format!("Registry task failed: {}", e)))?
}
