//! Integration tests for the FlexConveyor HTTP API.
//!
//! Uses axum-test to test the API handlers without starting a real server.
//! The engine runs on an in-memory store seeded with a four-module ring.

// Allow unwrap and panic in tests - these are standard for test code
// Allow holding MutexGuard across await - tests are serialized
// intentionally to avoid env var conflicts
#![allow(clippy::unwrap_used, clippy::panic, clippy::await_holding_lock)]

use axum::http::{HeaderValue, StatusCode, header};
use axum_test::TestServer;
use flexconveyor::api::{
    AddParcelResponse, AppState, ConveyResponse, DeleteParcelResponse, ErrorResponse,
    HealthResponse, ParcelsResponse, PathResponse, TopologyResponse, create_router, status_for,
};
use flexconveyor::store::{DynStore, Engine};
use flexconveyor_core::{
    ConveyorError, ConveyorSystem, Direction, ErrorKind, MemoryStore, ModuleLayout, NullObserver,
    SystemLayout, SystemOptions, Vocabulary,
};
use serde_json::json;
use std::sync::{Arc, Mutex};

/// Mutex to serialize tests since the router reads env vars.
static ENV_TEST_MUTEX: Mutex<()> = Mutex::new(());

const CORS_VAR: &str = "FLEXCONVEYOR_CORS_ORIGINS";

// =============================================================================
// HELPER FUNCTIONS
// =============================================================================

/// Guard wrapper that holds the mutex and ensures cleanup on drop.
struct TestGuard {
    _guard: std::sync::MutexGuard<'static, ()>,
}

impl Drop for TestGuard {
    fn drop(&mut self) {
        // SAFETY: Tests run sequentially under ENV_TEST_MUTEX, so no concurrent env access.
        unsafe { std::env::remove_var(CORS_VAR) };
    }
}

/// module1 -> module2 -> module3 -> module4 -> module1, plus module2 -> module1.
fn ring_layout() -> SystemLayout {
    SystemLayout::new("exampleSystem1")
        .with_module(ModuleLayout::new("module1").with(Direction::East, "module2"))
        .with_module(
            ModuleLayout::new("module2")
                .with(Direction::South, "module3")
                .with(Direction::West, "module1"),
        )
        .with_module(ModuleLayout::new("module3").with(Direction::West, "module4"))
        .with_module(ModuleLayout::new("module4").with(Direction::North, "module1"))
}

fn ring_engine() -> Engine {
    let vocab = Vocabulary::default();
    let store: DynStore = Box::new(MemoryStore::with_facts(
        ring_layout().to_triples(&vocab).unwrap(),
    ));
    let options = SystemOptions {
        vocabulary: vocab.clone(),
        observer: Arc::new(NullObserver),
        ..SystemOptions::default()
    };
    ConveyorSystem::open(store, vocab.system("exampleSystem1"), options).unwrap()
}

/// Create a test server over the ring, with `cors` as the allowed origins.
/// Returns a guard that must be kept alive during the test.
fn create_server_with_cors(cors: Option<&str>) -> (TestServer, TestGuard) {
    let guard = ENV_TEST_MUTEX.lock().unwrap_or_else(|e| e.into_inner());
    // SAFETY: Tests run sequentially under ENV_TEST_MUTEX, so no concurrent env access.
    unsafe {
        match cors {
            Some(origins) => std::env::set_var(CORS_VAR, origins),
            None => std::env::remove_var(CORS_VAR),
        }
    }
    let router = create_router(AppState::new(ring_engine()));
    (
        TestServer::new(router).unwrap(),
        TestGuard { _guard: guard },
    )
}

fn create_test_server() -> (TestServer, TestGuard) {
    create_server_with_cors(None)
}

fn iri(local: &str) -> String {
    Vocabulary::default().expand(local)
}

async fn add_parcel(server: &TestServer, start: &str, destination: Option<&str>) -> String {
    let response = server
        .post("/parcels")
        .json(&json!({ "start": start, "destination": destination }))
        .await;
    response.assert_status_ok();
    response.json::<AddParcelResponse>().parcel
}

// =============================================================================
// HEALTH ENDPOINT TESTS
// =============================================================================

#[tokio::test]
async fn test_health_endpoint() {
    let (server, _guard) = create_test_server();

    let response = server.get("/health").await;

    response.assert_status_ok();
    let health: HealthResponse = response.json();
    assert_eq!(health.status, "ok");
    assert_eq!(health.version, env!("CARGO_PKG_VERSION"));
}

// =============================================================================
// TOPOLOGY ENDPOINT TESTS
// =============================================================================

#[tokio::test]
async fn test_topology_lists_modules_and_edges() {
    let (server, _guard) = create_test_server();

    let response = server.get("/topology").await;

    response.assert_status_ok();
    let topology: TopologyResponse = response.json();
    assert_eq!(topology.system, iri("exampleSystem1"));
    assert_eq!(topology.module_count, 4);
    assert_eq!(topology.edge_count, 5);

    let module2 = topology
        .modules
        .iter()
        .find(|m| m.short == "module2")
        .unwrap();
    assert_eq!(module2.south.as_deref(), Some(iri("module3").as_str()));
    assert_eq!(module2.west.as_deref(), Some(iri("module1").as_str()));
    assert!(module2.north.is_none());
}

#[tokio::test]
async fn test_topology_grid_positions() {
    let (server, _guard) = create_test_server();

    let topology: TopologyResponse = server.get("/topology").await.json();
    let position = |short: &str| {
        topology
            .modules
            .iter()
            .find(|m| m.short == short)
            .and_then(|m| m.position)
    };
    let origin = position("module1").unwrap();
    let east = position("module2").unwrap();
    assert_eq!([east[0] - origin[0], east[1] - origin[1]], [1, 0]);
    assert!(position("module3").is_some());
}

// =============================================================================
// PARCEL ENDPOINT TESTS
// =============================================================================

#[tokio::test]
async fn test_parcels_empty_initially() {
    let (server, _guard) = create_test_server();

    let response = server.get("/parcels").await;

    response.assert_status_ok();
    let parcels: ParcelsResponse = response.json();
    assert!(parcels.parcels.is_empty());
    assert!(parcels.arrivals.is_empty());
}

#[tokio::test]
async fn test_add_parcel_then_list() {
    let (server, _guard) = create_test_server();

    let parcel = add_parcel(&server, "module1", Some("module3")).await;
    assert_eq!(parcel, iri("parcel1"));

    let parcels: ParcelsResponse = server.get("/parcels").await.json();
    assert_eq!(parcels.parcels.len(), 1);
    assert_eq!(parcels.parcels[0].short, "parcel1");
    assert_eq!(parcels.parcels[0].position, iri("module1"));
    assert_eq!(
        parcels.parcels[0].destination.as_deref(),
        Some(iri("module3").as_str())
    );
}

#[tokio::test]
async fn test_add_parcel_accepts_absolute_identifiers() {
    let (server, _guard) = create_test_server();

    let parcel = add_parcel(&server, &iri("module4"), None).await;

    let parcels: ParcelsResponse = server.get("/parcels").await.json();
    assert_eq!(parcels.parcels[0].id, parcel);
    assert_eq!(parcels.parcels[0].position, iri("module4"));
    assert!(parcels.parcels[0].destination.is_none());
}

#[tokio::test]
async fn test_add_parcel_to_occupied_module_rejected() {
    let (server, _guard) = create_test_server();
    add_parcel(&server, "module1", None).await;

    let response = server
        .post("/parcels")
        .json(&json!({ "start": "module1" }))
        .await;

    response.assert_status_bad_request();
    let error: ErrorResponse = response.json();
    assert!(!error.success);
    assert_eq!(error.kind, ErrorKind::Usage);
}

#[tokio::test]
async fn test_add_parcel_unknown_module_not_found() {
    let (server, _guard) = create_test_server();

    let response = server
        .post("/parcels")
        .json(&json!({ "start": "module9", "destination": "module1" }))
        .await;

    response.assert_status(StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_add_parcel_empty_start_rejected() {
    let (server, _guard) = create_test_server();

    let response = server.post("/parcels").json(&json!({ "start": "  " })).await;

    response.assert_status_bad_request();
}

#[tokio::test]
async fn test_add_parcel_malformed_body_rejected() {
    let (server, _guard) = create_test_server();

    let response = server
        .post("/parcels")
        .json(&json!({ "destination": "module1" }))
        .await;

    assert!(response.status_code().is_client_error());
}

#[tokio::test]
async fn test_delete_parcel() {
    let (server, _guard) = create_test_server();
    add_parcel(&server, "module2", Some("module4")).await;

    let response = server
        .post("/parcels/delete")
        .json(&json!({ "parcel": "parcel1" }))
        .await;

    response.assert_status_ok();
    let deleted: DeleteParcelResponse = response.json();
    assert_eq!(deleted.removed_facts, 5);
    let parcels: ParcelsResponse = server.get("/parcels").await.json();
    assert!(parcels.parcels.is_empty());

    let again = server
        .post("/parcels/delete")
        .json(&json!({ "parcel": "parcel1" }))
        .await;
    again.assert_status(StatusCode::NOT_FOUND);
}

// =============================================================================
// PATH ENDPOINT TESTS
// =============================================================================

#[tokio::test]
async fn test_path_follows_edges() {
    let (server, _guard) = create_test_server();

    let response = server
        .post("/path")
        .json(&json!({ "start": "module1", "target": "module3" }))
        .await;

    response.assert_status_ok();
    let path: PathResponse = response.json();
    assert!(path.found);
    assert_eq!(path.hops, Some(2));
    assert_eq!(
        path.modules,
        vec![iri("module1"), iri("module2"), iri("module3")]
    );
}

#[tokio::test]
async fn test_path_respects_direction() {
    let (server, _guard) = create_test_server();

    // module4 -> module3 has no edge; the way round is module4 -> 1 -> 2 -> 3.
    let path: PathResponse = server
        .post("/path")
        .json(&json!({ "start": "module4", "target": "module3" }))
        .await
        .json();

    assert_eq!(path.hops, Some(3));
}

#[tokio::test]
async fn test_path_to_self_is_zero_hops() {
    let (server, _guard) = create_test_server();

    let path: PathResponse = server
        .post("/path")
        .json(&json!({ "start": "module2", "target": "module2" }))
        .await
        .json();

    assert!(path.found);
    assert_eq!(path.hops, Some(0));
    assert_eq!(path.modules, vec![iri("module2")]);
}

#[tokio::test]
async fn test_path_unknown_module_not_found() {
    let (server, _guard) = create_test_server();

    let response = server
        .post("/path")
        .json(&json!({ "start": "module1", "target": "nowhere" }))
        .await;

    response.assert_status(StatusCode::NOT_FOUND);
}

// =============================================================================
// CONVEY ENDPOINT TESTS
// =============================================================================

#[tokio::test]
async fn test_convey_moves_parcel() {
    let (server, _guard) = create_test_server();
    add_parcel(&server, "module1", None).await;

    let response = server
        .post("/convey")
        .json(&json!({ "from": "module1", "to": "module2" }))
        .await;

    response.assert_status_ok();
    let moved: ConveyResponse = response.json();
    assert_eq!(moved.direction, Direction::East);
    assert_eq!(moved.parcel, iri("parcel1"));
    assert_eq!(
        moved.message,
        "Conveying parcel1 into east direction (module1 -> module2)."
    );

    let parcels: ParcelsResponse = server.get("/parcels").await.json();
    assert_eq!(parcels.parcels[0].position, iri("module2"));
}

#[tokio::test]
async fn test_convey_without_edge_rejected() {
    let (server, _guard) = create_test_server();
    add_parcel(&server, "module1", None).await;

    let response = server
        .post("/convey")
        .json(&json!({ "from": "module1", "to": "module3" }))
        .await;

    response.assert_status_bad_request();
    let parcels: ParcelsResponse = server.get("/parcels").await.json();
    assert_eq!(parcels.parcels[0].position, iri("module1"));
}

#[tokio::test]
async fn test_convey_from_empty_module_rejected() {
    let (server, _guard) = create_test_server();

    let response = server
        .post("/convey")
        .json(&json!({ "from": "module1", "to": "module2" }))
        .await;

    response.assert_status_bad_request();
    let error: ErrorResponse = response.json();
    assert!(error.error.contains("holds no parcel"), "{}", error.error);
}

#[tokio::test]
async fn test_convey_into_destination_reports_arrival() {
    let (server, _guard) = create_test_server();
    add_parcel(&server, "module1", Some("module2")).await;

    let moved: ConveyResponse = server
        .post("/convey")
        .json(&json!({ "from": "module1", "to": "module2" }))
        .await
        .json();

    assert_eq!(moved.arrivals.len(), 1);
    assert!(moved.arrivals[0].removed);
    assert_eq!(moved.arrivals[0].module, iri("module2"));
    let parcels: ParcelsResponse = server.get("/parcels").await.json();
    assert!(parcels.parcels.is_empty());
}

// =============================================================================
// STEP ENDPOINT TESTS
// =============================================================================

#[tokio::test]
async fn test_step_walks_to_destination() {
    let (server, _guard) = create_test_server();
    add_parcel(&server, "module1", Some("module3")).await;

    let first: ConveyResponse = server
        .post("/parcels/step")
        .json(&json!({ "parcel": "parcel1" }))
        .await
        .json();
    assert_eq!(first.to, iri("module2"));
    assert!(first.arrivals.is_empty());

    let second: ConveyResponse = server
        .post("/parcels/step")
        .json(&json!({ "parcel": "parcel1" }))
        .await
        .json();
    assert_eq!(second.direction, Direction::South);
    assert_eq!(second.arrivals.len(), 1);

    let response = server
        .post("/parcels/step")
        .json(&json!({ "parcel": "parcel1" }))
        .await;
    response.assert_status(StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_step_without_destination_rejected() {
    let (server, _guard) = create_test_server();
    add_parcel(&server, "module3", None).await;

    let response = server
        .post("/parcels/step")
        .json(&json!({ "parcel": "parcel1" }))
        .await;

    response.assert_status_bad_request();
}

// =============================================================================
// ERROR MAPPING TESTS
// =============================================================================

#[test]
fn test_error_kinds_map_to_statuses() {
    let vocab = Vocabulary::default();
    assert_eq!(
        status_for(&ConveyorError::PreconditionFailed {
            missing: Vec::new()
        }),
        StatusCode::CONFLICT
    );
    assert_eq!(
        status_for(&ConveyorError::Connectivity("timeout".to_string())),
        StatusCode::BAD_GATEWAY
    );
    assert_eq!(
        status_for(&ConveyorError::UnknownModule(vocab.module("x"))),
        StatusCode::NOT_FOUND
    );
    assert_eq!(
        status_for(&ConveyorError::EmptyModule(vocab.module("x"))),
        StatusCode::BAD_REQUEST
    );
}

// =============================================================================
// CORS TESTS
// =============================================================================

#[tokio::test]
async fn test_cors_allows_configured_origin() {
    let (server, _guard) = create_server_with_cors(Some("http://dashboard.example.org"));

    let response = server
        .get("/health")
        .add_header(
            header::ORIGIN,
            "http://dashboard.example.org".parse::<HeaderValue>().unwrap(),
        )
        .await;

    response.assert_status_ok();
    assert_eq!(
        response.header(header::ACCESS_CONTROL_ALLOW_ORIGIN),
        "http://dashboard.example.org"
    );
}

#[tokio::test]
async fn test_cors_default_omits_foreign_origin() {
    let (server, _guard) = create_test_server();

    let response = server
        .get("/health")
        .add_header(
            header::ORIGIN,
            "http://dashboard.example.org".parse::<HeaderValue>().unwrap(),
        )
        .await;

    response.assert_status_ok();
    assert!(
        response
            .maybe_header(header::ACCESS_CONTROL_ALLOW_ORIGIN)
            .is_none()
    );
}
