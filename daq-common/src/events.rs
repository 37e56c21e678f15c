//! Event types for the DAQ event system
//!
//! Provides scan lifecycle events and the EventBus used to fan them out to
//! SSE clients.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

/// What started a scan cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScanSource {
    /// Operator request through the API
    Manual,
    /// Scheduler timer
    Periodic,
}

impl std::fmt::Display for ScanSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ScanSource::Manual => write!(f, "manual"),
            ScanSource::Periodic => write!(f, "periodic"),
        }
    }
}

/// Terminal result of a scan cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScanOutcome {
    Success,
    Error,
}

impl std::fmt::Display for ScanOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ScanOutcome::Success => write!(f, "success"),
            ScanOutcome::Error => write!(f, "error"),
        }
    }
}

/// Scan lifecycle events
///
/// Serialized with a `type` tag for SSE transmission.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ScanEvent {
    /// A scan cycle began
    ScanStarted {
        source: ScanSource,
        timestamp: DateTime<Utc>,
    },

    /// One dataset finished scanning and its documents were replaced
    DatasetScanned {
        dataset: String,
        /// Windows detected by this scan
        windows: usize,
        /// Runs in the registry after merge
        total_runs: usize,
        /// Sensor names currently published
        sensors: usize,
        timestamp: DateTime<Utc>,
    },

    /// One dataset failed; the cycle continues with the next one
    DatasetFailed {
        dataset: String,
        error: String,
        timestamp: DateTime<Utc>,
    },

    /// A scan cycle reached its terminal state
    ScanFinished {
        result: ScanOutcome,
        #[serde(skip_serializing_if = "Option::is_none")]
        error: Option<String>,
        timestamp: DateTime<Utc>,
    },
}

impl ScanEvent {
    /// Event name used as the SSE `event:` field
    pub fn event_type(&self) -> &'static str {
        match self {
            ScanEvent::ScanStarted { .. } => "ScanStarted",
            ScanEvent::DatasetScanned { .. } => "DatasetScanned",
            ScanEvent::DatasetFailed { .. } => "DatasetFailed",
            ScanEvent::ScanFinished { .. } => "ScanFinished",
        }
    }
}

/// Broadcast bus for scan events
///
/// Cloning shares the underlying channel.
#[derive(Clone)]
pub struct EventBus {
    tx: broadcast::Sender<ScanEvent>,
}

impl EventBus {
    /// Creates a new EventBus with specified channel capacity
    ///
    /// Slow subscribers lag and lose the oldest events once `capacity`
    /// events are buffered.
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    /// Subscribe to all future events
    pub fn subscribe(&self) -> broadcast::Receiver<ScanEvent> {
        self.tx.subscribe()
    }

    /// Emit an event, ignoring if no subscribers are listening
    pub fn emit_lossy(&self, event: ScanEvent) {
        let _ = self.tx.send(event);
    }
}
