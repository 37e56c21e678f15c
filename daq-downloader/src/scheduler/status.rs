//! Process-wide scan status record
//!
//! The in-memory copy behind an `RwLock` is authoritative; every transition
//! is also written to `scanner_status.json` so readers in other processes
//! can poll it. A failed status write is logged, never fatal.

use chrono::{DateTime, Utc};
use daq_common::events::{ScanOutcome, ScanSource};
use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;
use tokio::sync::{Mutex, RwLock};
use tracing::{info, warn};

use crate::registry::JsonDocument;

pub const STATUS_FILE: &str = "scanner_status.json";
const INTERRUPTED: &str = "interrupted by restart";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ScanStatus {
    pub scanning: bool,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
    pub source: Option<ScanSource>,
    pub last_result: Option<ScanOutcome>,
    /// Empty unless the last cycle failed
    #[serde(default)]
    pub error: String,
    pub updated_at: Option<DateTime<Utc>>,
}

/// Manual trigger refused
#[derive(Debug, Clone, Error, PartialEq)]
pub enum TriggerError {
    #[error("a {running} scan is already in progress")]
    Busy {
        running: ScanSource,
        started_at: Option<DateTime<Utc>>,
    },
}

pub struct StatusStore {
    current: RwLock<ScanStatus>,
    /// Orders file writes the same as in-memory transitions
    persist_order: Mutex<()>,
    document: Option<JsonDocument<ScanStatus>>,
}

impl StatusStore {
    /// Status kept only in memory
    pub fn in_memory() -> Self {
        Self {
            current: RwLock::new(ScanStatus::default()),
            persist_order: Mutex::new(()),
            document: None,
        }
    }

    /// Load the persisted status from `data_dir`
    ///
    /// A record still marked `scanning` belongs to a process that died mid
    /// cycle; it is closed out as an error.
    pub async fn open(data_dir: &Path) -> Self {
        let document = JsonDocument::new(data_dir.join(STATUS_FILE));
        let loaded = {
            let doc = document.clone();
            tokio::task::spawn_blocking(move || doc.read()).await
        };

        let mut status = match loaded {
            Ok(Ok(status)) => status,
            Ok(Err(e)) => {
                warn!(error = %e, "Unreadable scanner status, starting fresh");
                ScanStatus::default()
            }
            Err(e) => {
                warn!(error = %e, "Scanner status load task failed, starting fresh");
                ScanStatus::default()
            }
        };

        let stale = status.scanning;
        if stale {
            let now = daq_common::time::now();
            info!(started_at = ?status.started_at, "Closing scan left open by previous process");
            status.scanning = false;
            status.finished_at = Some(now);
            status.last_result = Some(ScanOutcome::Error);
            status.error = INTERRUPTED.to_string();
            status.updated_at = Some(now);
        }

        let store = Self {
            current: RwLock::new(status.clone()),
            persist_order: Mutex::new(()),
            document: Some(document),
        };
        if stale {
            store.persist(status).await;
        }
        store
    }

    pub async fn snapshot(&self) -> ScanStatus {
        self.current.read().await.clone()
    }

    /// `idle -> scanning`, atomically with the busy check
    pub async fn try_begin(&self, source: ScanSource) -> Result<ScanStatus, TriggerError> {
        let _order = self.persist_order.lock().await;
        let status = {
            let mut current = self.current.write().await;
            if current.scanning {
                return Err(TriggerError::Busy {
                    running: current.source.unwrap_or(source),
                    started_at: current.started_at,
                });
            }
            let now = daq_common::time::now();
            current.scanning = true;
            current.started_at = Some(now);
            current.source = Some(source);
            current.error.clear();
            current.updated_at = Some(now);
            current.clone()
        };
        self.persist(status.clone()).await;
        Ok(status)
    }

    /// `scanning -> idle` with the cycle's result
    pub async fn finish(&self, outcome: ScanOutcome, error: String) -> ScanStatus {
        let _order = self.persist_order.lock().await;
        let status = {
            let mut current = self.current.write().await;
            let now = daq_common::time::now();
            current.scanning = false;
            current.finished_at = Some(now);
            current.last_result = Some(outcome);
            current.error = error;
            current.updated_at = Some(now);
            current.clone()
        };
        self.persist(status.clone()).await;
        status
    }

    async fn persist(&self, status: ScanStatus) {
        let Some(document) = self.document.clone() else {
            return;
        };
        let result = tokio::task::spawn_blocking(move || document.replace(&status)).await;
        match result {
            Ok(Ok(())) => {}
            Ok(Err(e)) => warn!(error = %e, "Failed to persist scanner status"),
            Err(e) => warn!(error = %e, "Scanner status write task failed"),
        }
    }
}
