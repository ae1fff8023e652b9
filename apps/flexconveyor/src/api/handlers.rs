//! # API Endpoint Handlers
//!
//! This module implements the actual HTTP endpoint handlers.
//!
//! The engine is blocking, so every handler hands its work to
//! [`with_engine`], which runs it on tokio's blocking pool under the
//! state's mutex.

use super::{
    AppState,
    types::{
        AddParcelRequest, AddParcelResponse, ArrivalJson, ConveyRequest, ConveyResponse,
        DeleteParcelResponse, ErrorResponse, HealthResponse, ParcelJson, ParcelRequest,
        ParcelsResponse, PathRequest, PathResponse, TopologyResponse,
    },
};
use crate::store::Engine;
use axum::{
    Json,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use flexconveyor_core::{ConveyorError, ErrorKind};
use serde::Serialize;
use std::sync::Arc;

// =============================================================================
// PLUMBING
// =============================================================================

/// HTTP status for an engine error.
///
/// Usage errors are the client's fault (404 when the thing named does not
/// exist), conflicts mean "resync and decide again", and connectivity
/// errors mean the store behind us failed.
#[must_use]
pub fn status_for(err: &ConveyorError) -> StatusCode {
    match err.kind() {
        ErrorKind::Usage if err.is_not_found() => StatusCode::NOT_FOUND,
        ErrorKind::Usage => StatusCode::BAD_REQUEST,
        ErrorKind::Conflict => StatusCode::CONFLICT,
        ErrorKind::Connectivity => StatusCode::BAD_GATEWAY,
    }
}

/// Run `f` against the engine on the blocking pool.
pub async fn with_engine<T, F>(state: &AppState, f: F) -> Result<T, ConveyorError>
where
    F: FnOnce(&mut Engine) -> Result<T, ConveyorError> + Send + 'static,
    T: Send + 'static,
{
    let engine = Arc::clone(&state.engine);
    tokio::task::spawn_blocking(move || {
        let mut engine = engine.blocking_lock();
        f(&mut engine)
    })
    .await
    .map_err(|e| ConveyorError::Io(format!("Engine task failed: {}", e)))?
}

fn respond<T: Serialize>(result: Result<T, ConveyorError>) -> Response {
    match result {
        Ok(body) => (StatusCode::OK, Json(body)).into_response(),
        Err(err) => {
            let status = status_for(&err);
            if status.is_server_error() {
                tracing::error!("Request failed: {}", err);
            } else {
                tracing::debug!("Request rejected: {}", err);
            }
            (status, Json(ErrorResponse::from(&err))).into_response()
        }
    }
}

// =============================================================================
// HEALTH HANDLER
// =============================================================================

/// Health check endpoint.
pub async fn health_handler() -> impl IntoResponse {
    Json(HealthResponse::default())
}

// =============================================================================
// TOPOLOGY HANDLER
// =============================================================================

/// Get the adjacency model. Built once at startup, so no store access.
pub async fn topology_handler(State(state): State<AppState>) -> Response {
    respond(with_engine(&state, |engine| Ok(TopologyResponse::from(engine.topology()))).await)
}

// =============================================================================
// PARCEL HANDLERS
// =============================================================================

/// Sync and list parcels.
pub async fn parcels_handler(State(state): State<AppState>) -> Response {
    respond(
        with_engine(&state, |engine| {
            engine.sync()?;
            Ok(ParcelsResponse {
                parcels: engine
                    .parcels()
                    .iter()
                    .map(|(id, parcel)| ParcelJson::new(id, parcel))
                    .collect(),
                arrivals: engine.arrivals().iter().map(ArrivalJson::from).collect(),
            })
        })
        .await,
    )
}

/// Create a parcel.
pub async fn add_parcel_handler(
    State(state): State<AppState>,
    Json(request): Json<AddParcelRequest>,
) -> Response {
    if let Err(err) = request.validate() {
        return respond::<()>(Err(err));
    }
    respond(
        with_engine(&state, move |engine| {
            let vocab = engine.vocabulary();
            let start = vocab.module(&request.start);
            let destination = request.destination.as_deref().map(|d| vocab.module(d));
            let parcel = engine.add_parcel(destination.as_ref(), &start)?;
            Ok(AddParcelResponse::new(&parcel))
        })
        .await,
    )
}

/// Delete a parcel and every fact about it.
pub async fn delete_parcel_handler(
    State(state): State<AppState>,
    Json(request): Json<ParcelRequest>,
) -> Response {
    if let Err(err) = request.validate() {
        return respond::<()>(Err(err));
    }
    respond(
        with_engine(&state, move |engine| {
            let parcel = engine.vocabulary().parcel(&request.parcel);
            let removed_facts = engine.delete_parcel(&parcel)?;
            Ok(DeleteParcelResponse {
                success: true,
                parcel: parcel.as_str().to_string(),
                removed_facts,
            })
        })
        .await,
    )
}

/// Move a parcel one hop towards its destination.
pub async fn step_handler(
    State(state): State<AppState>,
    Json(request): Json<ParcelRequest>,
) -> Response {
    if let Err(err) = request.validate() {
        return respond::<()>(Err(err));
    }
    respond(
        with_engine(&state, move |engine| {
            let parcel = engine.vocabulary().parcel(&request.parcel);
            let conveyance = engine.step(&parcel)?;
            Ok(ConveyResponse::new(&conveyance, engine.arrivals()))
        })
        .await,
    )
}

// =============================================================================
// PATH HANDLER
// =============================================================================

/// Shortest path between two modules.
pub async fn path_handler(
    State(state): State<AppState>,
    Json(request): Json<PathRequest>,
) -> Response {
    if let Err(err) = request.validate() {
        return respond::<()>(Err(err));
    }
    respond(
        with_engine(&state, move |engine| {
            let vocab = engine.vocabulary();
            let start = vocab.module(&request.start);
            let target = vocab.module(&request.target);
            let route = engine.find_path(&start, &target)?;
            Ok(PathResponse::new(route.as_ref()))
        })
        .await,
    )
}

// =============================================================================
// CONVEY HANDLER
// =============================================================================

/// Move whatever parcel `from` holds into `to`.
pub async fn convey_handler(
    State(state): State<AppState>,
    Json(request): Json<ConveyRequest>,
) -> Response {
    if let Err(err) = request.validate() {
        return respond::<()>(Err(err));
    }
    respond(
        with_engine(&state, move |engine| {
            let vocab = engine.vocabulary();
            let from = vocab.module(&request.from);
            let to = vocab.module(&request.to);
            let conveyance = engine.convey(&from, &to)?;
            Ok(ConveyResponse::new(&conveyance, engine.arrivals()))
        })
        .await,
    )
}
