//! # Observer Port
//!
//! The engine reports what it does through an injected `Observer` instead of
//! writing to a process-wide logger. Embedders pick the sink:
//!
//! - `TracingObserver`: structured `tracing` events (the binary's default)
//! - `NullObserver`: discards everything
//! - `RecordingObserver`: keeps events in memory, for tests

use crate::{Direction, ModuleId, ParcelId, SystemId};
use std::sync::{Mutex, PoisonError};

/// Something the engine did or refused to do.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConveyorEvent {
    /// The adjacency model was built.
    TopologyBuilt {
        system: SystemId,
        modules: usize,
        edges: usize,
    },
    /// A module is connected to a module outside the system.
    DanglingEdge {
        from: ModuleId,
        direction: Direction,
        to: ModuleId,
    },
    /// A registry sync completed.
    ParcelsSynced { parcels: usize, arrivals: usize },
    /// A parcel reached its destination and was cleaned up.
    ParcelArrived { parcel: ParcelId, module: ModuleId },
    /// Arrival cleanup could not delete a parcel.
    CleanupFailed { parcel: ParcelId, reason: String },
    ParcelAdded {
        parcel: ParcelId,
        start: ModuleId,
        destination: Option<ModuleId>,
    },
    ParcelDeleted { parcel: ParcelId, facts: usize },
    PathFound {
        start: ModuleId,
        target: ModuleId,
        hops: usize,
    },
    NoPath { start: ModuleId, target: ModuleId },
    Conveyed {
        parcel: ParcelId,
        from: ModuleId,
        to: ModuleId,
        direction: Direction,
    },
    /// A move was refused before or by the store.
    ConveyRejected {
        from: ModuleId,
        to: ModuleId,
        reason: String,
    },
}

/// Sink for engine events.
pub trait Observer: Send + Sync {
    fn record(&self, event: &ConveyorEvent);
}

/// Discards every event.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullObserver;

impl Observer for NullObserver {
    fn record(&self, _event: &ConveyorEvent) {}
}

/// Forwards events to `tracing` under the `flexconveyor_core` target.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingObserver;

impl Observer for TracingObserver {
    fn record(&self, event: &ConveyorEvent) {
        match event {
            ConveyorEvent::TopologyBuilt {
                system,
                modules,
                edges,
            } => tracing::info!(system = %system, modules, edges, "Topology built"),
            ConveyorEvent::DanglingEdge {
                from,
                direction,
                to,
            } => tracing::warn!(
                from = %from,
                direction = %direction,
                to = %to,
                "Connection leaves the system"
            ),
            ConveyorEvent::ParcelsSynced { parcels, arrivals } => {
                tracing::debug!(parcels, arrivals, "Parcels synced");
            }
            ConveyorEvent::ParcelArrived { parcel, module } => {
                tracing::info!(
                    parcel = %parcel,
                    module = %module,
                    "Parcel arrived and was removed"
                );
            }
            ConveyorEvent::CleanupFailed { parcel, reason } => {
                tracing::warn!(parcel = %parcel, reason = %reason, "Arrival cleanup failed");
            }
            ConveyorEvent::ParcelAdded {
                parcel,
                start,
                destination,
            } => tracing::info!(
                parcel = %parcel,
                start = %start,
                destination = ?destination.as_ref().map(ModuleId::as_str),
                "Parcel added"
            ),
            ConveyorEvent::ParcelDeleted { parcel, facts } => {
                tracing::info!(parcel = %parcel, facts, "Parcel deleted");
            }
            ConveyorEvent::PathFound {
                start,
                target,
                hops,
            } => tracing::debug!(start = %start, target = %target, hops, "Path found"),
            ConveyorEvent::NoPath { start, target } => {
                tracing::debug!(start = %start, target = %target, "No path");
            }
            ConveyorEvent::Conveyed {
                parcel,
                from,
                to,
                direction,
            } => tracing::info!(
                parcel = %parcel,
                from = %from,
                to = %to,
                direction = %direction,
                "Parcel conveyed"
            ),
            ConveyorEvent::ConveyRejected { from, to, reason } => {
                tracing::warn!(from = %from, to = %to, reason = %reason, "Conveyance rejected");
            }
        }
    }
}

/// Keeps every event in arrival order.
#[derive(Debug, Default)]
pub struct RecordingObserver {
    events: Mutex<Vec<ConveyorEvent>>,
}

impl RecordingObserver {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Copy of the events recorded so far.
    #[must_use]
    pub fn events(&self) -> Vec<ConveyorEvent> {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Remove and return the events recorded so far.
    pub fn take(&self) -> Vec<ConveyorEvent> {
        std::mem::take(&mut *self.events.lock().unwrap_or_else(PoisonError::into_inner))
    }
}

impl Observer for RecordingObserver {
    fn record(&self, event: &ConveyorEvent) {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(event.clone());
    }
}

impl<O: Observer + ?Sized> Observer for std::sync::Arc<O> {
    fn record(&self, event: &ConveyorEvent) {
        (**self).record(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recording_observer_keeps_order() {
        let observer = RecordingObserver::new();
        observer.record(&ConveyorEvent::ParcelsSynced {
            parcels: 1,
            arrivals: 0,
        });
        observer.record(&ConveyorEvent::NoPath {
            start: ModuleId::new("a"),
            target: ModuleId::new("b"),
        });

        let events = observer.take();
        assert_eq!(events.len(), 2);
        assert!(matches!(events[0], ConveyorEvent::ParcelsSynced { .. }));
        assert!(observer.events().is_empty());
    }

    #[test]
    fn shared_observer_records_through_arc() {
        let observer = std::sync::Arc::new(RecordingObserver::new());
        let port: std::sync::Arc<dyn Observer> = observer.clone();
        port.record(&ConveyorEvent::ParcelDeleted {
            parcel: ParcelId::new("p"),
            facts: 5,
        });
        assert_eq!(observer.events().len(), 1);
    }
}
