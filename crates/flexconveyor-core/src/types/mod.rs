//! # Core Type Definitions
//!
//! This module contains all core types shared by the FlexConveyor engine:
//! - Opaque identifiers (`ModuleId`, `SystemId`, `ParcelId`)
//! - Stored facts (`Triple`)
//! - Conveyor directions (`Direction`) and their edge-slot mapping
//! - Parcel state as reconstructed from the store (`ParcelState`, `ParcelMap`)
//! - Error types (`ConveyorError`, `ErrorKind`)
//!
//! ## Identifier Semantics
//!
//! Identifiers are IRIs in the deployed system, but the engine treats them as
//! opaque strings. The short display form (`short()`) exists for humans only
//! and is never used for equality.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use thiserror::Error;

// =============================================================================
// IDENTIFIERS
// =============================================================================

/// Return the short display form of an identifier.
///
/// The short form is the substring after the last `#`, or after the last `/`
/// when the identifier has no `#`.
#[must_use]
pub fn short_form(iri: &str) -> &str {
    match iri.rfind('#') {
        Some(pos) => &iri[pos + 1..],
        None => iri.rsplit('/').next().unwrap_or(iri),
    }
}

macro_rules! opaque_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub String);

        impl $name {
            /// Create an identifier from any string-like value.
            #[must_use]
            pub fn new(id: impl Into<String>) -> Self {
                Self(id.into())
            }

            /// The full identifier.
            #[must_use]
            pub fn as_str(&self) -> &str {
                &self.0
            }

            /// The short display form. Display only, never compare on it.
            #[must_use]
            pub fn short(&self) -> &str {
                short_form(&self.0)
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $name {
            fn from(s: &str) -> Self {
                Self(s.to_string())
            }
        }

        impl From<String> for $name {
            fn from(s: String) -> Self {
                Self(s)
            }
        }
    };
}

opaque_id!(
    /// Identifier of a conveyor module (a node of the topology graph).
    ModuleId
);

opaque_id!(
    /// Identifier of a conveyor system (a named collection of modules).
    SystemId
);

opaque_id!(
    /// Identifier of a parcel, minted by the lifecycle manager.
    ParcelId
);

// =============================================================================
// FACTS
// =============================================================================

/// A single `(subject, predicate, object)` fact held by the store.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Triple {
    pub subject: String,
    pub predicate: String,
    pub object: String,
}

impl Triple {
    /// Create a new triple.
    #[must_use]
    pub fn new(
        subject: impl Into<String>,
        predicate: impl Into<String>,
        object: impl Into<String>,
    ) -> Self {
        Self {
            subject: subject.into(),
            predicate: predicate.into(),
            object: object.into(),
        }
    }

    /// Check whether this triple mentions `term` as subject or object.
    #[must_use]
    pub fn mentions(&self, term: &str) -> bool {
        self.subject == term || self.object == term
    }
}

impl fmt::Display for Triple {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "({} {} {})",
            short_form(&self.subject),
            short_form(&self.predicate),
            short_form(&self.object)
        )
    }
}

// =============================================================================
// DIRECTION
// =============================================================================

/// One of the four fixed conveying directions of a module.
///
/// This enum is the only place that maps a direction to its edge slot,
/// so adjacency storage and direction resolution cannot drift apart:
///
/// | Direction | Slot | Grid offset |
/// |-----------|------|-------------|
/// | North     | 0    | (0, 1)      |
/// | East      | 1    | (1, 0)      |
/// | South     | 2    | (0, -1)     |
/// | West      | 3    | (-1, 0)     |
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    North,
    East,
    South,
    West,
}

impl Direction {
    /// All directions in slot order.
    pub const ALL: [Direction; 4] = [
        Direction::North,
        Direction::East,
        Direction::South,
        Direction::West,
    ];

    /// Edge slot of this direction.
    #[must_use]
    pub const fn index(self) -> usize {
        match self {
            Self::North => 0,
            Self::East => 1,
            Self::South => 2,
            Self::West => 3,
        }
    }

    /// Lowercase label, as used in log lines and JSON.
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::North => "north",
            Self::East => "east",
            Self::South => "south",
            Self::West => "west",
        }
    }

    /// Unit step on the layout grid (x grows east, y grows north).
    #[must_use]
    pub const fn offset(self) -> (i64, i64) {
        match self {
            Self::North => (0, 1),
            Self::East => (1, 0),
            Self::South => (0, -1),
            Self::West => (-1, 0),
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

// =============================================================================
// PARCEL STATE
// =============================================================================

/// Where a parcel is and where it is going, as last read from the store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParcelState {
    /// The module currently possessing the parcel.
    pub position: ModuleId,
    /// The module the parcel should reach. `None` disables routing.
    pub destination: Option<ModuleId>,
}

impl ParcelState {
    /// A parcel whose position equals its destination has arrived.
    #[must_use]
    pub fn has_arrived(&self) -> bool {
        self.destination.as_ref() == Some(&self.position)
    }
}

/// Parcels by identifier, in deterministic order.
pub type ParcelMap = BTreeMap<ParcelId, ParcelState>;

// =============================================================================
// ERROR TYPES
// =============================================================================

/// Coarse error classes an embedding layer uses to decide what to do next.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// The store was unreachable or failed. Fatal for the in-flight operation.
    Connectivity,
    /// A conditioned update lost a race. Resynchronise, then decide.
    Conflict,
    /// The caller asked for something impossible. Never retried.
    Usage,
}

/// Errors that can occur in the FlexConveyor engine.
///
/// The engine never retries on its own; every error reaches the caller
/// with the identifiers involved.
#[derive(Debug, Error)]
pub enum ConveyorError {
    /// The store could not be reached or reported a failure.
    #[error("Store connectivity error: {0}")]
    Connectivity(String),

    /// A conditioned update found some of its expected facts missing.
    #[error("Precondition failed: {} expected fact(s) no longer present", missing.len())]
    PreconditionFailed { missing: Vec<Triple> },

    /// The module is not part of the adjacency model.
    #[error("Unknown module: {0}")]
    UnknownModule(ModuleId),

    /// There is no directed edge between the two modules.
    #[error("No valid direction from {from} to {to}")]
    InvalidMove { from: ModuleId, to: ModuleId },

    /// The module possesses no parcel to convey.
    #[error("Module {0} holds no parcel")]
    EmptyModule(ModuleId),

    /// The module already possesses a parcel.
    #[error("Module {module} already holds parcel {parcel}")]
    ModuleOccupied { module: ModuleId, parcel: ParcelId },

    /// No fact in the store mentions this parcel.
    #[error("Parcel {0} not found in store")]
    ParcelNotFound(ParcelId),

    /// The parcel has no destination, or its destination is unreachable.
    #[error("No route for parcel {0}")]
    NoRoute(ParcelId),

    /// A fact lookup was issued with subject, predicate and object all unbound.
    #[error("Fact lookup needs at least one bound term")]
    UnboundPattern,

    /// The identifier cannot be written to the store safely.
    #[error("Invalid identifier: {0}")]
    InvalidIdentifier(String),

    /// Stored data could not be encoded or decoded.
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// An I/O error occurred.
    #[error("I/O error: {0}")]
    Io(String),
}

impl ConveyorError {
    /// Classify this error for retry/resync decisions.
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Connectivity(_) | Self::Serialization(_) | Self::Io(_) => {
                ErrorKind::Connectivity
            }
            Self::PreconditionFailed { .. } => ErrorKind::Conflict,
            Self::UnknownModule(_)
            | Self::InvalidMove { .. }
            | Self::EmptyModule(_)
            | Self::ModuleOccupied { .. }
            | Self::ParcelNotFound(_)
            | Self::NoRoute(_)
            | Self::UnboundPattern
            | Self::InvalidIdentifier(_) => ErrorKind::Usage,
        }
    }

    /// Check whether the error means "the thing asked for does not exist".
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::UnknownModule(_) | Self::ParcelNotFound(_))
    }
}

// =============================================================================
// TESTS
// =============================================================================
