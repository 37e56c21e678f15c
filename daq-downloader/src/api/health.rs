//! Health check endpoint

use axum::{extract::State, routing::get, Json, Router};
use chrono::Utc;
use serde::Serialize;

use crate::AppState;

/// Health check response
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub module: String,
    pub version: String,
    /// Short git hash captured at build time
    pub build: String,
    pub uptime_seconds: u64,
    /// Whether a scan cycle is running right now
    pub scanning: bool,
}

/// GET /health
pub async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    let uptime = Utc::now().signed_duration_since(state.startup_time);
    let status = state.service.scan_status().await;

    Json(HealthResponse {
        status: "ok".to_string(),
        module: "daq-downloader".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        build: env!("DAQ_BUILD_REV").to_string(),
        uptime_seconds: uptime.num_seconds().max(0) as u64,
        scanning: status.scanning,
    })
}

/// Build health check routes
///
/// `/api/health` is kept for dashboards that poll the older path.
pub fn health_routes() -> Router<AppState> {
    Router::new()
        .route("/health", get(health_check))
        .route("/api/health", get(health_check))
}
