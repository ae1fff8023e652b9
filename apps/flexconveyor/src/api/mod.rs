//! # FlexConveyor HTTP API Module
//!
//! This module implements the HTTP JSON API server using axum.
//!
//! ## Endpoints
//!
//! - `GET /health` - Health check
//! - `GET /topology` - Modules and connections of the served system
//! - `GET /parcels` - Sync, then list parcels (and arrivals just removed)
//! - `POST /parcels` - Create a parcel
//! - `POST /parcels/delete` - Delete a parcel
//! - `POST /parcels/step` - Move a parcel one hop towards its destination
//! - `POST /path` - Shortest path between two modules
//! - `POST /convey` - Move a parcel between two adjacent modules
//!
//! ## Configuration (Environment Variables)
//!
//! - `FLEXCONVEYOR_CORS_ORIGINS`: Comma-separated list of allowed origins, or "*" for all (default: localhost only)

mod handlers;
mod types;

// Re-export handlers and types for integration tests (via `flexconveyor::api::*`)
pub use handlers::{
    add_parcel_handler, convey_handler, delete_parcel_handler, health_handler, parcels_handler,
    path_handler, status_for, step_handler, topology_handler, with_engine,
};
pub use types::{
    AddParcelRequest, AddParcelResponse, ArrivalJson, ConveyRequest, ConveyResponse,
    DeleteParcelResponse, ErrorResponse, HealthResponse, MAX_IDENTIFIER_LENGTH, ModuleJson,
    ParcelJson, ParcelRequest, ParcelsResponse, PathRequest, PathResponse, TopologyResponse,
    validate_identifier,
};

use crate::store::Engine;
use axum::{
    Router,
    http::{HeaderValue, Method, header},
    routing::{get, post},
};
use flexconveyor_core::ConveyorError;
use std::sync::Arc;
use tokio::sync::Mutex;
use tower::ServiceBuilder;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

// =============================================================================
// SERVER STATE
// =============================================================================

/// Shared server state containing the engine.
///
/// One mutex serialises every engine call, which is the single-writer
/// discipline the engine requires.
#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<Mutex<Engine>>,
}

impl AppState {
    /// Create new app state around an opened engine.
    #[must_use]
    pub fn new(engine: Engine) -> Self {
        Self {
            engine: Arc::new(Mutex::new(engine)),
        }
    }
}

// =============================================================================
// CORS CONFIGURATION
// =============================================================================

/// Build CORS layer from environment configuration.
///
/// Reads `FLEXCONVEYOR_CORS_ORIGINS`:
/// - If "*": allows all origins
/// - If not set: defaults to localhost only
/// - Otherwise: parses comma-separated list of allowed origins
fn build_cors_layer() -> CorsLayer {
    let origins_env = std::env::var("FLEXCONVEYOR_CORS_ORIGINS").ok();

    match origins_env.as_deref() {
        Some("*") => {
            tracing::warn!("CORS: Allowing ALL origins (FLEXCONVEYOR_CORS_ORIGINS=*)");
            CorsLayer::permissive()
        }
        Some(origins) => {
            let allowed_origins: Vec<HeaderValue> = origins
                .split(',')
                .filter_map(|s| {
                    let trimmed = s.trim();
                    match trimmed.parse::<HeaderValue>() {
                        Ok(hv) => {
                            tracing::info!("CORS: Allowing origin: {}", trimmed);
                            Some(hv)
                        }
                        Err(e) => {
                            tracing::warn!("CORS: Invalid origin '{}': {}", trimmed, e);
                            None
                        }
                    }
                })
                .collect();

            if allowed_origins.is_empty() {
                tracing::warn!(
                    "CORS: No valid origins in FLEXCONVEYOR_CORS_ORIGINS, defaulting to localhost only"
                );
                build_localhost_cors()
            } else {
                CorsLayer::new()
                    .allow_origin(allowed_origins)
                    .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
                    .allow_headers([header::CONTENT_TYPE])
            }
        }
        None => {
            tracing::info!("CORS: No FLEXCONVEYOR_CORS_ORIGINS set, defaulting to localhost only");
            build_localhost_cors()
        }
    }
}

/// Build a restrictive CORS layer that only allows localhost origins.
fn build_localhost_cors() -> CorsLayer {
    let origins: Vec<HeaderValue> = [
        "http://localhost:3000",
        "http://localhost:8080",
        "http://127.0.0.1:3000",
        "http://127.0.0.1:8080",
    ]
    .into_iter()
    .filter_map(|origin| origin.parse::<HeaderValue>().ok())
    .collect();

    CorsLayer::new()
        .allow_origin(origins)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE])
}

// =============================================================================
// ROUTER CREATION
// =============================================================================

/// Create the axum router with all endpoints and middleware.
///
/// Middleware stack (outer to inner): tracing, CORS, body limit.
pub fn create_router(state: AppState) -> Router {
    let cors = build_cors_layer();

    Router::new()
        .route("/health", get(handlers::health_handler))
        .route("/topology", get(handlers::topology_handler))
        .route(
            "/parcels",
            get(handlers::parcels_handler).post(handlers::add_parcel_handler),
        )
        .route("/parcels/delete", post(handlers::delete_parcel_handler))
        .route("/parcels/step", post(handlers::step_handler))
        .route("/path", post(handlers::path_handler))
        .route("/convey", post(handlers::convey_handler))
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(cors)
                .layer(axum::extract::DefaultBodyLimit::max(64 * 1024)),
        )
        .with_state(state)
}

// =============================================================================
// SERVER STARTUP
// =============================================================================

/// Serve `state` on `addr` until Ctrl+C.
pub async fn run_server(addr: &str, state: AppState) -> Result<(), ConveyorError> {
    let router = create_router(state);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|e| ConveyorError::Io(format!("Bind failed: {}", e)))?;

    tracing::info!("FlexConveyor HTTP server listening on {}", addr);

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(|e| ConveyorError::Io(format!("Server error: {}", e)))
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!("Cannot listen for Ctrl+C: {}", e);
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutting down");
}
