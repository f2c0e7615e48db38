//! peerwatch-api — REST API for Peerwatch.
//!
//! Thin axum layer over `HealthMonitor`. Every response uses the
//! `{ success, data, error }` envelope.
//!
//! # API Routes
//!
//! | Method | Path | Description |
//! |---|---|---|
//! | GET | `/api/v1/health` | Peers, interface configs and stats for active interfaces |
//! | GET | `/api/v1/health/stats` | Aggregate statistics |
//! | GET | `/api/v1/health/peers/{key}` | One peer |
//! | POST | `/api/v1/health/peers/{key}/probe` | Probe one peer now |
//! | POST | `/api/v1/health/cycle` | Run a full cycle now |
//! | GET | `/api/v1/health/interfaces/{name}` | Interface config |
//! | PUT | `/api/v1/health/interfaces/{name}` | Update interface config |
//! | POST | `/api/v1/health/start` | Start the background monitor |
//! | POST | `/api/v1/health/stop` | Stop the background monitor |
//!
//! Peer keys are base64 and may contain `/`; clients percent-encode them
//! in the path.

pub mod handlers;

use axum::Router;
use axum::routing::{get, post};
use peerwatch_health::HealthMonitor;

/// Shared state for API handlers.
#[derive(Clone)]
pub struct ApiState {
    pub monitor: HealthMonitor,
}

/// Build the complete API router.
pub fn build_router(monitor: HealthMonitor) -> Router {
    let api_state = ApiState { monitor };

    let api_routes = Router::new()
        .route("/health", get(handlers::get_overview))
        .route("/health/stats", get(handlers::get_stats))
        .route("/health/peers/{key}", get(handlers::get_peer))
        .route("/health/peers/{key}/probe", post(handlers::probe_peer))
        .route("/health/cycle", post(handlers::run_cycle))
        .route(
            "/health/interfaces/{name}",
            get(handlers::get_interface).put(handlers::update_interface),
        )
        .route("/health/start", post(handlers::start_monitor))
        .route("/health/stop", post(handlers::stop_monitor))
        .with_state(api_state);

    Router::new().nest("/api/v1", api_routes)
}
