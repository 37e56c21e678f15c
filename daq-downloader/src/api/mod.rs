//! HTTP API handlers for daq-downloader

pub mod health;
pub mod query;
pub mod registry;
pub mod scan;
pub mod sse;

pub use health::health_routes;
pub use query::query_routes;
pub use registry::registry_routes;
pub use scan::scan_routes;
pub use sse::scan_events;

use serde::Deserialize;

/// `?season=` selector shared by the per-dataset routes
#[derive(Debug, Default, Deserialize)]
pub struct SeasonParam {
    pub season: Option<String>,
}
