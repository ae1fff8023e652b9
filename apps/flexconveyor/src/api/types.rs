//! # API Request/Response Types
//!
//! This module defines the JSON structures for the HTTP API. Identifiers
//! in requests may be bare local names (expanded into the configured
//! namespace) or absolute IRIs; responses always carry full identifiers
//! plus a short form for display.

use flexconveyor_core::{
    Arrival, Conveyance, ConveyorError, Direction, ErrorKind, ModuleId, ParcelId, ParcelState,
    Route, Topology,
};
use serde::{Deserialize, Serialize};

/// Longest identifier accepted from a request.
pub const MAX_IDENTIFIER_LENGTH: usize = 2048;

/// Reject empty or oversized identifiers before they reach the store.
pub fn validate_identifier(field: &str, value: &str) -> Result<(), ConveyorError> {
    if value.trim().is_empty() {
        return Err(ConveyorError::InvalidIdentifier(format!("{field} is empty")));
    }
    if value.len() > MAX_IDENTIFIER_LENGTH {
        return Err(ConveyorError::InvalidIdentifier(format!(
            "{field} length {} exceeds maximum {} bytes",
            value.len(),
            MAX_IDENTIFIER_LENGTH
        )));
    }
    Ok(())
}

// =============================================================================
// HEALTH RESPONSE
// =============================================================================

/// Health check response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
}

impl Default for HealthResponse {
    fn default() -> Self {
        Self {
            status: "ok".to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}

// =============================================================================
// ERROR RESPONSE
// =============================================================================

/// Body returned with every non-2xx status.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub success: bool,
    pub kind: ErrorKind,
    pub error: String,
}

impl From<&ConveyorError> for ErrorResponse {
    fn from(err: &ConveyorError) -> Self {
        Self {
            success: false,
            kind: err.kind(),
            error: err.to_string(),
        }
    }
}

// =============================================================================
// TOPOLOGY RESPONSE
// =============================================================================

/// One module with its outgoing connections and layout position.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModuleJson {
    pub id: String,
    pub short: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub north: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub east: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub south: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub west: Option<String>,
    /// Grid position `[x, y]` for drawing. Absent for modules that are not
    /// reachable from the first module.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub position: Option<[i64; 2]>,
}

/// The adjacency model of the served system.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TopologyResponse {
    pub system: String,
    pub module_count: usize,
    pub edge_count: usize,
    pub modules: Vec<ModuleJson>,
}

impl From<&Topology> for TopologyResponse {
    fn from(topology: &Topology) -> Self {
        let positions: std::collections::BTreeMap<ModuleId, (i64, i64)> =
            topology.grid_positions().into_iter().collect();

        let modules = topology
            .modules()
            .iter()
            .map(|module| {
                let target = |direction: Direction| {
                    topology
                        .connections(module)
                        .and_then(|c| c.get(direction))
                        .map(|m| m.as_str().to_string())
                };
                ModuleJson {
                    id: module.as_str().to_string(),
                    short: module.short().to_string(),
                    north: target(Direction::North),
                    east: target(Direction::East),
                    south: target(Direction::South),
                    west: target(Direction::West),
                    position: positions.get(module).map(|&(x, y)| [x, y]),
                }
            })
            .collect();

        Self {
            system: topology.system().as_str().to_string(),
            module_count: topology.module_count(),
            edge_count: topology.edge_count(),
            modules,
        }
    }
}

// =============================================================================
// PARCELS RESPONSE
// =============================================================================

/// A parcel at rest.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParcelJson {
    pub id: String,
    pub short: String,
    pub position: String,
    pub destination: Option<String>,
}

impl ParcelJson {
    #[must_use]
    pub fn new(parcel: &ParcelId, state: &ParcelState) -> Self {
        Self {
            id: parcel.as_str().to_string(),
            short: parcel.short().to_string(),
            position: state.position.as_str().to_string(),
            destination: state.destination.as_ref().map(|d| d.as_str().to_string()),
        }
    }
}

/// A parcel removed on arrival during the sync that served this request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArrivalJson {
    pub parcel: String,
    pub module: String,
    pub removed: bool,
}

impl From<&Arrival> for ArrivalJson {
    fn from(arrival: &Arrival) -> Self {
        Self {
            parcel: arrival.parcel.as_str().to_string(),
            module: arrival.module.as_str().to_string(),
            removed: arrival.removed,
        }
    }
}

/// Parcels after a fresh sync.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParcelsResponse {
    pub parcels: Vec<ParcelJson>,
    pub arrivals: Vec<ArrivalJson>,
}

// =============================================================================
// ADD / DELETE PARCEL
// =============================================================================

/// Create a parcel at `start`, optionally routed to `destination`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AddParcelRequest {
    pub start: String,
    #[serde(default)]
    pub destination: Option<String>,
}

impl AddParcelRequest {
    pub fn validate(&self) -> Result<(), ConveyorError> {
        validate_identifier("start", &self.start)?;
        if let Some(destination) = &self.destination {
            validate_identifier("destination", destination)?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AddParcelResponse {
    pub success: bool,
    pub parcel: String,
    pub short: String,
}

impl AddParcelResponse {
    #[must_use]
    pub fn new(parcel: &ParcelId) -> Self {
        Self {
            success: true,
            parcel: parcel.as_str().to_string(),
            short: parcel.short().to_string(),
        }
    }
}

/// Names one parcel (delete and step).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParcelRequest {
    pub parcel: String,
}

impl ParcelRequest {
    pub fn validate(&self) -> Result<(), ConveyorError> {
        validate_identifier("parcel", &self.parcel)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeleteParcelResponse {
    pub success: bool,
    pub parcel: String,
    /// Facts removed from the store.
    pub removed_facts: usize,
}

// =============================================================================
// PATH
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PathRequest {
    pub start: String,
    pub target: String,
}

impl PathRequest {
    pub fn validate(&self) -> Result<(), ConveyorError> {
        validate_identifier("start", &self.start)?;
        validate_identifier("target", &self.target)
    }
}

/// A shortest path, or `found: false` when the target is unreachable.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PathResponse {
    pub success: bool,
    pub found: bool,
    pub hops: Option<usize>,
    pub modules: Vec<String>,
}

impl PathResponse {
    #[must_use]
    pub fn new(route: Option<&Route>) -> Self {
        match route {
            Some(route) => Self {
                success: true,
                found: true,
                hops: Some(route.hops()),
                modules: route
                    .modules()
                    .iter()
                    .map(|m| m.as_str().to_string())
                    .collect(),
            },
            None => Self {
                success: true,
                found: false,
                hops: None,
                modules: Vec::new(),
            },
        }
    }
}

// =============================================================================
// CONVEY
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConveyRequest {
    pub from: String,
    pub to: String,
}

impl ConveyRequest {
    pub fn validate(&self) -> Result<(), ConveyorError> {
        validate_identifier("from", &self.from)?;
        validate_identifier("to", &self.to)
    }
}

/// A completed move (from `/convey` or `/parcels/step`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConveyResponse {
    pub success: bool,
    pub parcel: String,
    pub from: String,
    pub to: String,
    pub direction: Direction,
    /// Human-readable summary of the move.
    pub message: String,
    /// Parcels removed on arrival by the sync after the move.
    pub arrivals: Vec<ArrivalJson>,
}

impl ConveyResponse {
    #[must_use]
    pub fn new(conveyance: &Conveyance, arrivals: &[Arrival]) -> Self {
        Self {
            success: true,
            parcel: conveyance.parcel.as_str().to_string(),
            from: conveyance.from.as_str().to_string(),
            to: conveyance.to.as_str().to_string(),
            direction: conveyance.direction,
            message: conveyance.to_string(),
            arrivals: arrivals.iter().map(ArrivalJson::from).collect(),
        }
    }
}
