//! daq-downloader library interface
//!
//! Availability scanner, run registry and query façade for the telemetry
//! store. Exposed as a library so integration tests can assemble the
//! service around an in-memory store.

pub mod api;
pub mod config;
pub mod error;
pub mod influx;
pub mod registry;
pub mod retry;
pub mod scanner;
pub mod scheduler;
pub mod sensors;
pub mod service;
pub mod sql;
pub mod store;
pub mod window;

pub use crate::error::{ApiError, ApiResult};

use axum::http::{HeaderValue, Method};
use axum::Router;
use chrono::{DateTime, Utc};
use daq_common::events::EventBus;
use std::sync::Arc;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::config::Settings;
use crate::registry::Registry;
use crate::scanner::ScanParams;
use crate::scheduler::{ScanScheduler, SchedulerConfig, StatusStore};
use crate::service::DataService;
use crate::store::TelemetryStore;

const EVENT_BUS_CAPACITY: usize = 256;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub service: DataService,
    /// Scan lifecycle events relayed over SSE
    pub event_bus: EventBus,
    pub startup_time: DateTime<Utc>,
}

impl AppState {
    pub fn new(service: DataService, event_bus: EventBus) -> Self {
        Self {
            service,
            event_bus,
            startup_time: Utc::now(),
        }
    }
}

/// Fully wired service
pub struct App {
    pub state: AppState,
    pub scheduler: ScanScheduler,
}

impl App {
    /// Wire registry, status record, scheduler and façade around `store`
    pub async fn assemble(settings: &Settings, store: Arc<dyn TelemetryStore>) -> Self {
        let registry = Arc::new(Registry::new(settings.data_dir.clone(), settings.scanner.timezone));
        let status = Arc::new(StatusStore::open(&settings.data_dir).await);
        let event_bus = EventBus::new(EVENT_BUS_CAPACITY);

        let scheduler = ScanScheduler::new(
            SchedulerConfig {
                datasets: settings.datasets.clone(),
                scan: ScanParams::from_settings(&settings.scanner, &settings.store),
                sensors: settings.sensors.clone(),
                schedule: settings.schedule.clone(),
                timezone: settings.scanner.timezone,
            },
            Arc::clone(&store),
            Arc::clone(&registry),
            status,
            event_bus.clone(),
        );

        let service = DataService::new(settings.datasets.clone(), registry, scheduler.clone(), store);

        Self {
            state: AppState::new(service, event_bus),
            scheduler,
        }
    }
}

/// Build application router
pub fn build_router(state: AppState, allowed_origins: &[String]) -> Router {
    use axum::routing::get;

    Router::new()
        .merge(api::health_routes())
        .merge(api::registry_routes())
        .merge(api::scan_routes())
        .merge(api::query_routes())
        .route("/api/events", get(api::scan_events))
        .layer(cors_layer(allowed_origins))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

fn cors_layer(allowed_origins: &[String]) -> CorsLayer {
    let layer = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers(Any);

    if allowed_origins.iter().any(|o| o == "*") {
        return layer.allow_origin(Any);
    }

    let origins: Vec<HeaderValue> = allowed_origins
        .iter()
        .filter_map(|origin| match HeaderValue::from_str(origin) {
            Ok(value) => Some(value),
            Err(_) => {
                tracing::warn!(origin = %origin, "Ignoring invalid CORS origin");
                None
            }
        })
        .collect();
    layer.allow_origin(AllowOrigin::list(origins))
}
