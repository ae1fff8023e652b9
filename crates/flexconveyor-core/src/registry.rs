//! # Parcel Registry
//!
//! Rebuilds the parcel map from the store and applies arrival cleanup.
//!
//! The store is the only source of truth for which parcels exist; the
//! registry keeps nothing between calls. A parcel whose position equals its
//! destination is deleted and left out of the returned map, so no caller
//! ever sees an arrived parcel at rest.
//!
//! Like the topology build, a sync is a sequence of point reads and is one
//! round trip stale the moment it returns.

use crate::lifecycle;
use crate::observer::{ConveyorEvent, Observer};
use crate::store::StoreClient;
use crate::topology::Topology;
use crate::vocabulary::Vocabulary;
use crate::{ConveyorError, ModuleId, ParcelId, ParcelMap, ParcelState};
use serde::Serialize;

/// A parcel that reached its destination during a sync.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Arrival {
    pub parcel: ParcelId,
    pub module: ModuleId,
    /// Whether the cleanup deletion succeeded. A failed deletion is retried
    /// by the next sync, which will observe the parcel again.
    pub removed: bool,
}

/// The outcome of one sync.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Snapshot {
    /// Parcels at rest, never containing an arrived parcel.
    pub parcels: ParcelMap,
    /// Parcels found at their destination, in discovery order.
    pub arrivals: Vec<Arrival>,
}

/// Read every parcel held by a module of `topology`.
///
/// Store errors during the reads abort the sync. Errors while deleting
/// arrived parcels do not: they are reported as `CleanupFailed` and the
/// parcel is still excluded from the result.
pub fn sync<S: StoreClient + ?Sized>(
    store: &S,
    topology: &Topology,
    vocab: &Vocabulary,
    observer: &dyn Observer,
) -> Result<Snapshot, ConveyorError> {
    let mut snapshot = Snapshot::default();

    for module in topology.modules() {
        let held = store.facts_get(Some(module.as_str()), Some(vocab.has_possession()), None)?;

        for fact in held {
            let parcel = ParcelId::new(fact.object);
            let destination = store
                .facts_get(Some(parcel.as_str()), Some(vocab.has_destination()), None)?
                .into_iter()
                .next()
                .map(|fact| ModuleId::new(fact.object));

            snapshot.parcels.insert(
                parcel,
                ParcelState {
                    position: module.clone(),
                    destination,
                },
            );
        }
    }

    let arrived: Vec<ParcelId> = snapshot
        .parcels
        .iter()
        .filter(|(_, state)| state.has_arrived())
        .map(|(parcel, _)| parcel.clone())
        .collect();

    for parcel in arrived {
        let Some(state) = snapshot.parcels.remove(&parcel) else {
            continue;
        };
        let removed = match lifecycle::delete_parcel(store, &parcel, observer) {
            Ok(_) => {
                observer.record(&ConveyorEvent::ParcelArrived {
                    parcel: parcel.clone(),
                    module: state.position.clone(),
                });
                true
            }
            Err(e) => {
                observer.record(&ConveyorEvent::CleanupFailed {
                    parcel: parcel.clone(),
                    reason: e.to_string(),
                });
                false
            }
        };
        snapshot.arrivals.push(Arrival {
            parcel,
            module: state.position,
            removed,
        });
    }

    observer.record(&ConveyorEvent::ParcelsSynced {
        parcels: snapshot.parcels.len(),
        arrivals: snapshot.arrivals.len(),
    });

    Ok(snapshot)
}

// =============================================================================
// TESTS
// =============================================================================
