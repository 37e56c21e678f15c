//! daq-downloader - availability scanner and run registry
//!
//! Periodically probes the telemetry store for windows that contain data,
//! keeps the per-season run and sensor registry on disk, and serves it
//! (plus a bounded raw-data query) over HTTP.

use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::Utc;
use clap::Parser;
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use daq_downloader::config::{FileConfig, Settings, CONFIG_FILE_NAME};
use daq_downloader::influx::InfluxClient;
use daq_downloader::store::{check_connectivity, TelemetryStore};
use daq_downloader::App;

/// Grace period for an in-flight scan cycle at shutdown
const SCHEDULER_SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

/// Command-line arguments for daq-downloader
#[derive(Parser, Debug)]
#[command(name = "daq-downloader")]
#[command(about = "Telemetry availability scanner and run registry")]
#[command(version)]
struct Args {
    /// Port to listen on
    #[arg(short, long, default_value = "8000", env = "DAQ_DOWNLOADER_PORT")]
    port: u16,

    /// Address to bind
    #[arg(short, long, default_value = "0.0.0.0", env = "DAQ_DOWNLOADER_BIND")]
    bind: IpAddr,

    /// Folder holding the registry documents (overrides DATA_DIR)
    #[arg(short, long)]
    data_dir: Option<PathBuf>,

    /// TOML config file
    #[arg(short, long, env = "DAQ_CONFIG")]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "daq_downloader=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!(
        "Starting daq-downloader v{} [{}] built {} ({})",
        env!("CARGO_PKG_VERSION"),
        env!("DAQ_BUILD_REV"),
        env!("DAQ_BUILT_AT"),
        env!("DAQ_BUILD_PROFILE"),
    );

    let args = Args::parse();

    let config_path =
        daq_common::config::locate_config_file(args.config.as_deref(), None, CONFIG_FILE_NAME)?;
    let file_config: FileConfig = match &config_path {
        Some(path) => {
            info!("Config file: {}", path.display());
            daq_common::config::load_toml(path)?
        }
        None => FileConfig::default(),
    };

    let settings = Settings::resolve(file_config, args.data_dir.as_deref(), |key| {
        std::env::var(key).ok()
    })
    .context("Invalid configuration")?;

    daq_common::config::ensure_directory_exists(&settings.data_dir)
        .context("Failed to initialize data folder")?;
    info!("Data folder: {}", settings.data_dir.display());
    info!("Store: {}", settings.store.host);
    for dataset in &settings.datasets {
        info!(
            "Season {} ({}): table {} in database {}",
            dataset.name, dataset.year, dataset.table, dataset.database
        );
    }

    let store: Arc<dyn TelemetryStore> =
        Arc::new(InfluxClient::new(&settings.store).context("Failed to build store client")?);
    if let Some(newest) = settings.datasets.first() {
        if let Err(e) = check_connectivity(store.as_ref(), newest, Utc::now()).await {
            warn!(
                store = %settings.store.host,
                error = %e,
                "Store not reachable at startup; scans will keep retrying"
            );
        }
    }
    let app = App::assemble(&settings, store).await;

    let cancel = CancellationToken::new();
    let periodic = app.scheduler.spawn_periodic(cancel.clone());

    let router = daq_downloader::build_router(app.state, &settings.allowed_origins);
    let addr = SocketAddr::new(args.bind, args.port);
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind to {}", addr))?;
    info!("Listening on http://{}", addr);

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    cancel.cancel();
    if tokio::time::timeout(SCHEDULER_SHUTDOWN_GRACE, periodic).await.is_err() {
        warn!("Scan cycle still running at shutdown; it will be closed out on next start");
    }

    info!("Server shutdown complete");
    Ok(())
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, shutting down");
        },
        _ = terminate => {
            info!("Received terminate signal, shutting down");
        },
    }
}
