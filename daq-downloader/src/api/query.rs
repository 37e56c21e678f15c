//! Bounded raw-data query endpoint

use axum::{
    extract::{Query, State},
    routing::post,
    Json, Router,
};
use serde::Deserialize;

use super::SeasonParam;
use crate::error::{ApiError, ApiResult};
use crate::service::{SignalQuery, SignalSeries};
use crate::AppState;

/// Body of POST /api/query
///
/// Only these parameters are accepted; the statement itself is always
/// built server-side.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct QueryRequest {
    pub signal: String,
    pub start: String,
    pub end: String,
    #[serde(default)]
    pub limit: Option<i64>,
    #[serde(default)]
    pub no_limit: bool,
}

impl QueryRequest {
    fn into_query(self) -> ApiResult<SignalQuery> {
        let start = daq_common::time::parse_utc(&self.start)
            .ok_or_else(|| ApiError::BadRequest(format!("Invalid start: {}", self.start)))?;
        let end = daq_common::time::parse_utc(&self.end)
            .ok_or_else(|| ApiError::BadRequest(format!("Invalid end: {}", self.end)))?;
        Ok(SignalQuery {
            signal: self.signal,
            start,
            end,
            limit: self.limit,
            no_limit: self.no_limit,
        })
    }
}

/// POST /api/query?season=
pub async fn query_signal(
    State(state): State<AppState>,
    Query(params): Query<SeasonParam>,
    Json(request): Json<QueryRequest>,
) -> ApiResult<Json<SignalSeries>> {
    let query = request.into_query()?;
    let series = state
        .service
        .query_signal(params.season.as_deref(), query)
        .await?;
    Ok(Json(series))
}

pub fn query_routes() -> Router<AppState> {
    Router::new().route("/api/query", post(query_signal))
}
