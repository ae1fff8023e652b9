//! # Conveyor System
//!
//! One engine instance bound to one conveyor system in one store.
//!
//! `ConveyorSystem` owns the injected store, the adjacency model built at
//! startup, the last synced parcel map and the parcel id counter. Every
//! mutating operation is followed by a sync, so the parcel map a caller
//! reads afterwards reflects the store.
//!
//! ## Concurrency
//!
//! An instance is single-writer: mutating methods take `&mut self` and the
//! instance does no locking of its own. Several instances may share one
//! store (for example through `Arc<S>`); conflicts between them surface as
//! `ConveyorError::PreconditionFailed` from `convey`.

use crate::conveyance::{self, Conveyance};
use crate::lifecycle::{self, IdStrategy, ParcelCounter};
use crate::observer::{Observer, TracingObserver};
use crate::registry::{self, Arrival};
use crate::router::{self, Route};
use crate::store::StoreClient;
use crate::topology::{Topology, TopologyBuilder};
use crate::vocabulary::Vocabulary;
use crate::{ConveyorError, ModuleId, ParcelId, ParcelMap, SystemId};
use std::sync::Arc;

/// Construction options for a `ConveyorSystem`.
#[derive(Clone)]
pub struct SystemOptions {
    pub vocabulary: Vocabulary,
    pub id_strategy: IdStrategy,
    pub observer: Arc<dyn Observer>,
}

impl Default for SystemOptions {
    fn default() -> Self {
        Self {
            vocabulary: Vocabulary::default(),
            id_strategy: IdStrategy::default(),
            observer: Arc::new(TracingObserver),
        }
    }
}

impl std::fmt::Debug for SystemOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SystemOptions")
            .field("vocabulary", &self.vocabulary)
            .field("id_strategy", &self.id_strategy)
            .finish_non_exhaustive()
    }
}

/// The FlexConveyor engine for one system.
pub struct ConveyorSystem<S> {
    store: S,
    vocab: Vocabulary,
    topology: Topology,
    parcels: ParcelMap,
    arrivals: Vec<Arrival>,
    counter: ParcelCounter,
    observer: Arc<dyn Observer>,
}

impl<S> std::fmt::Debug for ConveyorSystem<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConveyorSystem")
            .field("system", self.topology.system())
            .field("modules", &self.topology.module_count())
            .field("parcels", &self.parcels.len())
            .finish_non_exhaustive()
    }
}

impl<S: StoreClient> ConveyorSystem<S> {
    /// Build the topology of `system`, run the first sync and seed the
    /// parcel counter from it.
    ///
    /// Any store error here is returned as is; no half-initialised
    /// instance is ever handed out.
    pub fn open(store: S, system: SystemId, options: SystemOptions) -> Result<Self, ConveyorError> {
        let SystemOptions {
            vocabulary,
            id_strategy,
            observer,
        } = options;

        let topology = TopologyBuilder::new(&store, &vocabulary, &*observer).build(&system)?;
        let snapshot = registry::sync(&store, &topology, &vocabulary, &*observer)?;
        let counter = ParcelCounter::seeded(id_strategy, snapshot.parcels.len());

        Ok(Self {
            store,
            vocab: vocabulary,
            topology,
            parcels: snapshot.parcels,
            arrivals: snapshot.arrivals,
            counter,
            observer,
        })
    }

    /// Re-read parcel state from the store, cleaning up arrivals.
    pub fn sync(&mut self) -> Result<&ParcelMap, ConveyorError> {
        let snapshot = registry::sync(&self.store, &self.topology, &self.vocab, &*self.observer)?;
        self.parcels = snapshot.parcels;
        self.arrivals = snapshot.arrivals;
        Ok(&self.parcels)
    }

    /// Parcels as of the last sync.
    #[must_use]
    pub fn parcels(&self) -> &ParcelMap {
        &self.parcels
    }

    /// Parcels cleaned up by the last sync.
    #[must_use]
    pub fn arrivals(&self) -> &[Arrival] {
        &self.arrivals
    }

    #[must_use]
    pub fn topology(&self) -> &Topology {
        &self.topology
    }

    #[must_use]
    pub fn vocabulary(&self) -> &Vocabulary {
        &self.vocab
    }

    #[must_use]
    pub fn counter(&self) -> &ParcelCounter {
        &self.counter
    }

    #[must_use]
    pub fn store(&self) -> &S {
        &self.store
    }

    /// Shortest path between two modules. See [`router::shortest_path`].
    pub fn find_path(
        &self,
        start: &ModuleId,
        target: &ModuleId,
    ) -> Result<Option<Route>, ConveyorError> {
        router::shortest_path(&self.topology, start, target, &*self.observer)
    }

    /// Move the parcel held by `from` to `to`, then sync.
    pub fn convey(&mut self, from: &ModuleId, to: &ModuleId) -> Result<Conveyance, ConveyorError> {
        let conveyance = conveyance::convey(
            &self.store,
            &self.topology,
            &self.vocab,
            from,
            to,
            &*self.observer,
        )?;
        self.sync()?;
        Ok(conveyance)
    }

    /// Create a parcel at `start`, then sync.
    pub fn add_parcel(
        &mut self,
        destination: Option<&ModuleId>,
        start: &ModuleId,
    ) -> Result<ParcelId, ConveyorError> {
        let parcel = lifecycle::add_parcel(
            &self.store,
            &self.topology,
            &self.vocab,
            &mut self.counter,
            destination,
            start,
            &*self.observer,
        )?;
        self.sync()?;
        Ok(parcel)
    }

    /// Delete every fact about `parcel`, then sync.
    pub fn delete_parcel(&mut self, parcel: &ParcelId) -> Result<usize, ConveyorError> {
        let removed = lifecycle::delete_parcel(&self.store, parcel, &*self.observer)?;
        self.sync()?;
        Ok(removed)
    }

    /// Convey `parcel` one hop along a shortest path to its destination.
    ///
    /// Syncs first so the decision uses current positions. A parcel without
    /// a destination, or whose destination is unreachable, has no route.
    pub fn step(&mut self, parcel: &ParcelId) -> Result<Conveyance, ConveyorError> {
        self.sync()?;
        let state = self
            .parcels
            .get(parcel)
            .cloned()
            .ok_or_else(|| ConveyorError::ParcelNotFound(parcel.clone()))?;
        let destination = state
            .destination
            .ok_or_else(|| ConveyorError::NoRoute(parcel.clone()))?;

        let route = self
            .find_path(&state.position, &destination)?
            .ok_or_else(|| ConveyorError::NoRoute(parcel.clone()))?;
        let next = route
            .next_hop()
            .cloned()
            .ok_or_else(|| ConveyorError::NoRoute(parcel.clone()))?;

        self.convey(&state.position, &next)
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layout::{ModuleLayout, SystemLayout};
    use crate::observer::NullObserver;
    use crate::store::MemoryStore;
    use crate::Direction;

    fn options() -> SystemOptions {
        SystemOptions {
            observer: Arc::new(NullObserver),
            ..SystemOptions::default()
        }
    }

    fn line_system() -> ConveyorSystem<MemoryStore> {
        let vocab = Vocabulary::default();
        let layout = SystemLayout::new("line")
            .with_module(ModuleLayout::new("a").with(Direction::East, "b"))
            .with_module(ModuleLayout::new("b").with(Direction::East, "c"))
            .with_module(ModuleLayout::new("c"));
        let store = MemoryStore::with_facts(layout.to_triples(&vocab).expect("layout"));
        ConveyorSystem::open(store, vocab.system("line"), options()).expect("open")
    }

    #[test]
    fn open_seeds_topology_and_empty_parcels() {
        let system = line_system();
        assert_eq!(system.topology().module_count(), 3);
        assert!(system.parcels().is_empty());
        assert_eq!(system.counter().last(), 0);
    }

    #[test]
    fn step_walks_parcel_to_destination() {
        let mut system = line_system();
        let vocab = system.vocabulary().clone();
        let parcel = system
            .add_parcel(Some(&vocab.module("c")), &vocab.module("a"))
            .expect("add");

        let first = system.step(&parcel).expect("first step");
        assert_eq!(first.to, vocab.module("b"));
        assert_eq!(system.parcels()[&parcel].position, vocab.module("b"));

        system.step(&parcel).expect("second step");
        assert!(system.parcels().is_empty());
        assert_eq!(system.arrivals().len(), 1);
        assert!(system.arrivals()[0].removed);
    }

    #[test]
    fn step_without_destination_has_no_route() {
        let mut system = line_system();
        let vocab = system.vocabulary().clone();
        let parcel = system.add_parcel(None, &vocab.module("a")).expect("add");
        assert!(matches!(
            system.step(&parcel),
            Err(ConveyorError::NoRoute(_))
        ));
    }

    #[test]
    fn step_unknown_parcel_is_not_found() {
        let mut system = line_system();
        let parcel = system.vocabulary().parcel("parcel99");
        assert!(matches!(
            system.step(&parcel),
            Err(ConveyorError::ParcelNotFound(_))
        ));
    }
}
