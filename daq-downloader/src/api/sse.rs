//! Server-Sent Events for scan progress

use axum::{
    extract::State,
    response::sse::{Event, Sse},
};
use futures::stream::Stream;
use std::convert::Infallible;

use crate::AppState;

/// GET /api/events
///
/// Streams ScanStarted, DatasetScanned, DatasetFailed and ScanFinished.
pub async fn scan_events(
    State(state): State<AppState>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    daq_common::sse::scan_event_stream("daq-downloader", &state.event_bus)
}
