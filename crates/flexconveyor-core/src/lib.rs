//! # flexconveyor-core
//!
//! The graph-synchronization, parcel-lifecycle and routing engine for
//! FlexConveyor systems - THE LOGIC.
//!
//! A conveyor grid is a directed graph held authoritatively in an external
//! triple store. This crate reads that graph into an adjacency model, tracks
//! parcels across it, computes shortest routes, and moves parcels with
//! conditioned updates against the store.
//!
//! ## Components
//!
//! - `topology`: builds the adjacency model once per instance
//! - `registry`: rebuilds the parcel map and cleans up arrived parcels
//! - `router`: unit-weight Dijkstra over the adjacency model
//! - `conveyance`: validated, conditioned possession swaps
//! - `lifecycle`: parcel creation and deletion
//! - `system`: the `ConveyorSystem` façade tying them together
//!
//! ## Architectural Constraints
//!
//! - The store is injected (`StoreClient`); the core never opens a connection
//! - Telemetry goes through an injected `Observer`, never a global logger
//! - Has NO async, NO network dependencies

// =============================================================================
// MODULES
// =============================================================================

pub mod conveyance;
pub mod layout;
pub mod lifecycle;
pub mod observer;
pub mod registry;
pub mod router;
pub mod storage;
pub mod store;
pub mod system;
pub mod topology;
pub mod types;
pub mod vocabulary;

// =============================================================================
// RE-EXPORTS: Core Types (from types module)
// =============================================================================

pub use types::{
    ConveyorError, Direction, ErrorKind, ModuleId, ParcelId, ParcelMap, ParcelState, SystemId,
    Triple, short_form,
};

// =============================================================================
// RE-EXPORTS: Store Capability
// =============================================================================

pub use storage::RedbStore;
pub use store::{
    Bindings, GraphPattern, MemoryStore, StoreClient, Term, TriplePattern, UpdateReceipt,
};

// =============================================================================
// RE-EXPORTS: Engine
// =============================================================================

pub use conveyance::{Conveyance, convey};
pub use layout::{ModuleLayout, SystemLayout};
pub use lifecycle::{IdStrategy, ParcelCounter, add_parcel, delete_parcel};
pub use observer::{ConveyorEvent, NullObserver, Observer, RecordingObserver, TracingObserver};
pub use registry::{Arrival, Snapshot, sync};
pub use router::{Route, shortest_path};
pub use system::{ConveyorSystem, SystemOptions};
pub use topology::{Connections, Topology, TopologyBuilder};
pub use vocabulary::Vocabulary;
