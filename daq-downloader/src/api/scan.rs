//! Scan trigger and status endpoints

use axum::{
    extract::State,
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::error::ApiResult;
use crate::scheduler::ScanStatus;
use crate::AppState;

#[derive(Debug, Serialize)]
pub struct ScanAccepted {
    pub status: &'static str,
    pub started_at: Option<DateTime<Utc>>,
}

/// POST /api/scan
///
/// Returns 202 as soon as the cycle is spawned; 409 while one is running.
pub async fn trigger_scan(
    State(state): State<AppState>,
) -> ApiResult<(StatusCode, Json<ScanAccepted>)> {
    let started = state.service.trigger_scan().await?;
    tracing::info!("Manual scan scheduled");
    Ok((
        StatusCode::ACCEPTED,
        Json(ScanAccepted {
            status: "scheduled",
            started_at: started.started_at,
        }),
    ))
}

/// GET /api/scanner-status
pub async fn scanner_status(State(state): State<AppState>) -> Json<ScanStatus> {
    Json(state.service.scan_status().await)
}

pub fn scan_routes() -> Router<AppState> {
    Router::new()
        .route("/api/scan", post(trigger_scan))
        .route("/api/scanner-status", get(scanner_status))
}
