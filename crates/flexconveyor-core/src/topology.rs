//! # Topology Builder
//!
//! Builds the adjacency model of one conveyor system from the store.
//!
//! The model is read once and never changes while an engine instance runs:
//! the physical grid is fixed, only parcel facts move. Neighbours are held
//! as identifiers looked up in the module set, never as owned links, since
//! the store remains the owner of the topology.
//!
//! ## Consistency
//!
//! The build is a sequence of point reads (one membership query, then four
//! connection lookups per module). It is not a linearizable snapshot with
//! respect to concurrent writers; in practice topology is not written at
//! runtime.

use crate::observer::{ConveyorEvent, Observer};
use crate::store::{GraphPattern, StoreClient, Term};
use crate::vocabulary::Vocabulary;
use crate::{ConveyorError, Direction, ModuleId, SystemId};
use std::collections::{BTreeMap, VecDeque};

// =============================================================================
// CONNECTIONS
// =============================================================================

/// The outgoing edges of one module, one optional slot per direction.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Connections([Option<ModuleId>; 4]);

impl Connections {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style setter, mostly for tests and layouts.
    #[must_use]
    pub fn with(mut self, direction: Direction, neighbour: impl Into<ModuleId>) -> Self {
        self.set(direction, Some(neighbour.into()));
        self
    }

    #[must_use]
    pub fn get(&self, direction: Direction) -> Option<&ModuleId> {
        self.0[direction.index()].as_ref()
    }

    pub fn set(&mut self, direction: Direction, neighbour: Option<ModuleId>) {
        self.0[direction.index()] = neighbour;
    }

    /// Present edges in slot order.
    pub fn iter(&self) -> impl Iterator<Item = (Direction, &ModuleId)> {
        Direction::ALL
            .into_iter()
            .filter_map(|direction| self.get(direction).map(|to| (direction, to)))
    }

    /// The direction whose slot points at `to`, if any.
    #[must_use]
    pub fn direction_to(&self, to: &ModuleId) -> Option<Direction> {
        self.iter()
            .find(|(_, neighbour)| *neighbour == to)
            .map(|(direction, _)| direction)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.0.iter().filter(|slot| slot.is_some()).count()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

// =============================================================================
// TOPOLOGY
// =============================================================================

/// The directed adjacency model of one system.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Topology {
    system: SystemId,
    /// Modules in discovery order.
    modules: Vec<ModuleId>,
    /// Module -> slot in `modules`.
    slots: BTreeMap<ModuleId, usize>,
    /// Connections, parallel to `modules`.
    connections: Vec<Connections>,
}

impl Topology {
    /// Assemble a topology from already known modules and connections.
    ///
    /// Later duplicates of a module are ignored.
    #[must_use]
    pub fn from_connections(
        system: SystemId,
        entries: impl IntoIterator<Item = (ModuleId, Connections)>,
    ) -> Self {
        let mut topology = Self {
            system,
            modules: Vec::new(),
            slots: BTreeMap::new(),
            connections: Vec::new(),
        };
        for (module, connections) in entries {
            if topology.slots.contains_key(&module) {
                continue;
            }
            topology.slots.insert(module.clone(), topology.modules.len());
            topology.modules.push(module);
            topology.connections.push(connections);
        }
        topology
    }

    #[must_use]
    pub fn system(&self) -> &SystemId {
        &self.system
    }

    /// Modules in the order the store listed them.
    #[must_use]
    pub fn modules(&self) -> &[ModuleId] {
        &self.modules
    }

    #[must_use]
    pub fn module_count(&self) -> usize {
        self.modules.len()
    }

    #[must_use]
    pub fn contains(&self, module: &ModuleId) -> bool {
        self.slots.contains_key(module)
    }

    /// Dense index of a module, stable for the lifetime of the topology.
    #[must_use]
    pub fn slot(&self, module: &ModuleId) -> Option<usize> {
        self.slots.get(module).copied()
    }

    #[must_use]
    pub fn module_at(&self, slot: usize) -> Option<&ModuleId> {
        self.modules.get(slot)
    }

    #[must_use]
    pub fn connections(&self, module: &ModuleId) -> Option<&Connections> {
        self.slot(module).and_then(|slot| self.connections.get(slot))
    }

    /// Outgoing edges of `module`. Empty for unknown modules.
    pub fn neighbours(&self, module: &ModuleId) -> impl Iterator<Item = (Direction, &ModuleId)> {
        self.connections(module).into_iter().flat_map(Connections::iter)
    }

    /// The direction of the edge `from -> to`, if that edge exists.
    #[must_use]
    pub fn direction_between(&self, from: &ModuleId, to: &ModuleId) -> Option<Direction> {
        self.connections(from)?.direction_to(to)
    }

    /// Total number of directed edges.
    #[must_use]
    pub fn edge_count(&self) -> usize {
        self.connections.iter().map(Connections::len).sum()
    }

    /// Edges whose target is not a module of this system.
    pub fn dangling_edges(&self) -> impl Iterator<Item = (&ModuleId, Direction, &ModuleId)> {
        self.modules
            .iter()
            .zip(&self.connections)
            .flat_map(|(from, connections)| {
                connections
                    .iter()
                    .map(move |(direction, to)| (from, direction, to))
            })
            .filter(|(_, _, to)| !self.contains(to))
    }

    /// Place modules on an integer grid, breadth first from the first module.
    ///
    /// Each edge moves one step along its direction's offset; the first
    /// position assigned to a module wins. Modules unreachable from the
    /// first module are left out.
    #[must_use]
    pub fn grid_positions(&self) -> Vec<(ModuleId, (i64, i64))> {
        let Some(origin) = self.modules.first() else {
            return Vec::new();
        };

        let mut placed: BTreeMap<&ModuleId, (i64, i64)> = BTreeMap::new();
        let mut order = Vec::new();
        let mut queue = VecDeque::new();

        placed.insert(origin, (0, 0));
        order.push((origin.clone(), (0, 0)));
        queue.push_back((origin, (0_i64, 0_i64)));

        while let Some((module, (x, y))) = queue.pop_front() {
            for (direction, neighbour) in self.neighbours(module) {
                if !self.contains(neighbour) || placed.contains_key(neighbour) {
                    continue;
                }
                let (dx, dy) = direction.offset();
                let position = (x.saturating_add(dx), y.saturating_add(dy));
                placed.insert(neighbour, position);
                order.push((neighbour.clone(), position));
                queue.push_back((neighbour, position));
            }
        }

        order
    }
}

// =============================================================================
// BUILDER
// =============================================================================

/// Reads a system's modules and connections from a store.
pub struct TopologyBuilder<'a, S: ?Sized> {
    store: &'a S,
    vocab: &'a Vocabulary,
    observer: &'a dyn Observer,
}

impl<'a, S: StoreClient + ?Sized> TopologyBuilder<'a, S> {
    #[must_use]
    pub fn new(store: &'a S, vocab: &'a Vocabulary, observer: &'a dyn Observer) -> Self {
        Self {
            store,
            vocab,
            observer,
        }
    }

    /// Build the adjacency model of `system`.
    ///
    /// Either the complete model is returned or the first store error; a
    /// partially built model never escapes.
    pub fn build(&self, system: &SystemId) -> Result<Topology, ConveyorError> {
        let members = self.store.query(&GraphPattern::single(
            Term::iri(system.as_str()),
            Term::iri(self.vocab.contains_module()),
            Term::var("module"),
        ))?;

        let mut entries = Vec::with_capacity(members.len());
        for row in &members {
            let Some(module) = row.get("module") else {
                continue;
            };
            let module = ModuleId::new(module.as_str());
            let connections = self.read_connections(&module)?;
            entries.push((module, connections));
        }

        let topology = Topology::from_connections(system.clone(), entries);

        for (from, direction, to) in topology.dangling_edges() {
            self.observer.record(&ConveyorEvent::DanglingEdge {
                from: from.clone(),
                direction,
                to: to.clone(),
            });
        }
        self.observer.record(&ConveyorEvent::TopologyBuilt {
            system: system.clone(),
            modules: topology.module_count(),
            edges: topology.edge_count(),
        });

        Ok(topology)
    }

    fn read_connections(&self, module: &ModuleId) -> Result<Connections, ConveyorError> {
        let mut connections = Connections::new();
        for direction in Direction::ALL {
            let facts = self.store.facts_get(
                Some(module.as_str()),
                Some(self.vocab.connection(direction)),
                None,
            )?;
            // At most one connection per direction; the first listed wins.
            let neighbour = facts
                .into_iter()
                .next()
                .map(|fact| ModuleId::new(fact.object));
            connections.set(direction, neighbour);
        }
        Ok(connections)
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Triple;
    use crate::observer::{NullObserver, RecordingObserver};
    use crate::store::MemoryStore;

    fn ring_store(vocab: &Vocabulary) -> MemoryStore {
        let m = |n: &str| vocab.expand(n);
        let sys = m("flexconveyor1");
        MemoryStore::with_facts([
            Triple::new(&sys, vocab.contains_module(), m("module1")),
            Triple::new(&sys, vocab.contains_module(), m("module2")),
            Triple::new(&sys, vocab.contains_module(), m("module3")),
            Triple::new(&sys, vocab.contains_module(), m("module4")),
            Triple::new(m("module1"), vocab.connection(Direction::East), m("module2")),
            Triple::new(m("module2"), vocab.connection(Direction::South), m("module3")),
            Triple::new(m("module3"), vocab.connection(Direction::West), m("module4")),
            Triple::new(m("module4"), vocab.connection(Direction::North), m("module1")),
        ])
    }

    #[test]
    fn builds_ring_in_store_order() {
        let vocab = Vocabulary::default();
        let store = ring_store(&vocab);
        let topology = TopologyBuilder::new(&store, &vocab, &NullObserver)
            .build(&vocab.system("flexconveyor1"))
            .expect("build");

        let names: Vec<_> = topology.modules().iter().map(ModuleId::short).collect();
        assert_eq!(names, vec!["module1", "module2", "module3", "module4"]);
        assert_eq!(topology.edge_count(), 4);
        assert_eq!(
            topology.direction_between(&vocab.module("module1"), &vocab.module("module2")),
            Some(Direction::East)
        );
        // Edges are directed.
        assert_eq!(
            topology.direction_between(&vocab.module("module2"), &vocab.module("module1")),
            None
        );
    }

    #[test]
    fn unknown_system_is_empty() {
        let vocab = Vocabulary::default();
        let store = ring_store(&vocab);
        let topology = TopologyBuilder::new(&store, &vocab, &NullObserver)
            .build(&vocab.system("elsewhere"))
            .expect("build");
        assert_eq!(topology.module_count(), 0);
        assert!(topology.grid_positions().is_empty());
    }

    #[test]
    fn dangling_edge_is_kept_and_reported() {
        let vocab = Vocabulary::default();
        let store = ring_store(&vocab);
        store
            .facts_add(&[Triple::new(
                vocab.expand("module2"),
                vocab.connection(Direction::East),
                vocab.expand("module9"),
            )])
            .expect("add");

        let observer = RecordingObserver::new();
        let topology = TopologyBuilder::new(&store, &vocab, &observer)
            .build(&vocab.system("flexconveyor1"))
            .expect("build");

        assert_eq!(topology.edge_count(), 5);
        assert!(!topology.contains(&vocab.module("module9")));
        let dangling = observer
            .events()
            .into_iter()
            .filter(|e| matches!(e, ConveyorEvent::DanglingEdge { .. }))
            .count();
        assert_eq!(dangling, 1);
    }

    #[test]
    fn grid_positions_follow_offsets() {
        let vocab = Vocabulary::default();
        let store = ring_store(&vocab);
        let topology = TopologyBuilder::new(&store, &vocab, &NullObserver)
            .build(&vocab.system("flexconveyor1"))
            .expect("build");

        let positions: BTreeMap<_, _> = topology
            .grid_positions()
            .into_iter()
            .map(|(m, p)| (m.short().to_string(), p))
            .collect();
        assert_eq!(positions["module1"], (0, 0));
        assert_eq!(positions["module2"], (1, 0));
        assert_eq!(positions["module3"], (1, -1));
        assert_eq!(positions["module4"], (0, -1));
    }

    #[test]
    fn from_connections_ignores_duplicates() {
        let topology = Topology::from_connections(
            SystemId::new("s"),
            [
                (ModuleId::new("a"), Connections::new().with(Direction::East, "b")),
                (ModuleId::new("b"), Connections::new()),
                (ModuleId::new("a"), Connections::new()),
            ],
        );
        assert_eq!(topology.module_count(), 2);
        assert_eq!(topology.edge_count(), 1);
        assert_eq!(topology.slot(&ModuleId::new("b")), Some(1));
    }
}
