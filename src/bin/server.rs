//! Labsync reference server
//!
//! Serves the remote API that the sync core talks to, keeping all records in
//! memory and optionally persisting them to a JSON file.
//!
//! # Configuration
//!
//! Environment variables:
//! - `LABSYNC_SERVER_PORT`: Port to listen on (default: 5000)
//! - `LABSYNC_SERVER_DATA_DIR`: Directory for `labsync-data.json`. Without it
//!   data lives in memory only and `/api/health` reports the database as
//!   `not configured`.
//!
//! # Endpoints
//!
//! - `GET /api/health`
//! - `GET /api/sync`, `POST /api/sync`
//! - `GET/POST /api/<entity>`, `GET/PUT/DELETE /api/<entity>/<id>`
//! - `GET/PUT /api/settings`

use labsync::server::{router, AppState, ServerStorage};
use std::net::SocketAddr;
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

const DEFAULT_PORT: u16 = 5000;

/// Server configuration
#[derive(Debug, Clone)]
struct Config {
    /// Port to listen on
    port: u16,
    /// Directory to persist data in
    data_dir: Option<PathBuf>,
}

impl Config {
    /// Load configuration from environment variables
    fn from_env() -> Self {
        let port = std::env::var("LABSYNC_SERVER_PORT")
            .ok()
            .and_then(|p| p.parse().ok())
            .unwrap_or(DEFAULT_PORT);

        let data_dir = std::env::var("LABSYNC_SERVER_DATA_DIR")
            .ok()
            .filter(|dir| !dir.is_empty())
            .map(PathBuf::from);

        Self { port, data_dir }
    }
}

#[tokio::main]
async fn main() {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "labsync=info,labsync_server=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::from_env();

    let storage = match &config.data_dir {
        Some(dir) => match ServerStorage::open(dir) {
            Ok(storage) => {
                tracing::info!("Data directory: {}", dir.display());
                storage
            }
            Err(e) => {
                tracing::error!("Failed to open data directory: {}", e);
                std::process::exit(1);
            }
        },
        None => {
            tracing::warn!("LABSYNC_SERVER_DATA_DIR not set, data will not be persisted");
            ServerStorage::in_memory()
        }
    };

    let app = router(AppState::new(storage));

    // Start server
    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    tracing::info!("Starting server on {}", addr);

    let listener = match tokio::net::TcpListener::bind(addr).await {
        Ok(listener) => listener,
        Err(e) => {
            tracing::error!("Failed to bind {}: {}", addr, e);
            std::process::exit(1);
        }
    };

    if let Err(e) = axum::serve(listener, app).await {
        tracing::error!("Server error: {}", e);
        std::process::exit(1);
    }
}
