//! Season, run and sensor endpoints

use axum::{
    extract::{Path, Query, State},
    routing::{get, post},
    Json, Router,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::SeasonParam;
use crate::config::Dataset;
use crate::error::ApiResult;
use crate::registry::{Run, RunsDocument, SensorsDocument};
use crate::AppState;

/// One entry of GET /api/seasons
#[derive(Debug, Serialize)]
pub struct SeasonInfo {
    pub name: String,
    pub year: i32,
    pub database: String,
    pub color: Option<String>,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl From<&Dataset> for SeasonInfo {
    fn from(dataset: &Dataset) -> Self {
        Self {
            name: dataset.name.clone(),
            year: dataset.year,
            database: dataset.database.clone(),
            color: dataset.color.clone(),
            start: dataset.range.start,
            end: dataset.range.end,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct NoteRequest {
    pub note: String,
}

/// GET /api/seasons
pub async fn list_seasons(State(state): State<AppState>) -> Json<Vec<SeasonInfo>> {
    Json(state.service.list_datasets().iter().map(SeasonInfo::from).collect())
}

/// GET /api/runs?season=
pub async fn list_runs(
    State(state): State<AppState>,
    Query(params): Query<SeasonParam>,
) -> ApiResult<Json<RunsDocument>> {
    Ok(Json(state.service.list_runs(params.season.as_deref()).await?))
}

/// GET /api/sensors?season=
pub async fn list_sensors(
    State(state): State<AppState>,
    Query(params): Query<SeasonParam>,
) -> ApiResult<Json<SensorsDocument>> {
    Ok(Json(state.service.list_sensors(params.season.as_deref()).await?))
}

/// POST /api/runs/:key/note?season=
pub async fn save_note(
    State(state): State<AppState>,
    Path(key): Path<String>,
    Query(params): Query<SeasonParam>,
    Json(request): Json<NoteRequest>,
) -> ApiResult<Json<Run>> {
    let run = state
        .service
        .set_note(params.season.as_deref(), &key, &request.note)
        .await?;
    Ok(Json(run))
}

pub fn registry_routes() -> Router<AppState> {
    Router::new()
        .route("/api/seasons", get(list_seasons))
        .route("/api/runs", get(list_runs))
        .route("/api/sensors", get(list_sensors))
        .route("/api/runs/:key/note", post(save_note))
}
