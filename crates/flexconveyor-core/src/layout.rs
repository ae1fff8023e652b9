//! # System Layouts
//!
//! A declarative description of a conveyor system, used to seed a store
//! with modules and connections (and by tests to build systems without a
//! remote repository).
//!
//! ```toml
//! system = "flexconveyor1"
//!
//! [[module]]
//! id = "module1"
//! east = "module2"
//!
//! [[module]]
//! id = "module2"
//! south = "module3"
//! ```
//!
//! Names are expanded through `Vocabulary::expand`, so bare local names land
//! in the configured namespace and absolute identifiers are kept.

use crate::topology::{Connections, Topology};
use crate::vocabulary::{OWL_NAMED_INDIVIDUAL, RDF_TYPE, Vocabulary};
use crate::{ConveyorError, Direction, ModuleId, Triple};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// One module and its outgoing connections.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModuleLayout {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub north: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub east: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub south: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub west: Option<String>,
}

impl ModuleLayout {
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with(mut self, direction: Direction, neighbour: impl Into<String>) -> Self {
        *self.slot_mut(direction) = Some(neighbour.into());
        self
    }

    #[must_use]
    pub fn connection(&self, direction: Direction) -> Option<&str> {
        match direction {
            Direction::North => self.north.as_deref(),
            Direction::East => self.east.as_deref(),
            Direction::South => self.south.as_deref(),
            Direction::West => self.west.as_deref(),
        }
    }

    fn slot_mut(&mut self, direction: Direction) -> &mut Option<String> {
        match direction {
            Direction::North => &mut self.north,
            Direction::East => &mut self.east,
            Direction::South => &mut self.south,
            Direction::West => &mut self.west,
        }
    }
}

/// A whole system: its identifier and its modules.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SystemLayout {
    pub system: String,
    #[serde(default, rename = "module", alias = "modules")]
    pub modules: Vec<ModuleLayout>,
}

impl SystemLayout {
    #[must_use]
    pub fn new(system: impl Into<String>) -> Self {
        Self {
            system: system.into(),
            modules: Vec::new(),
        }
    }

    #[must_use]
    pub fn with_module(mut self, module: ModuleLayout) -> Self {
        self.modules.push(module);
        self
    }

    /// A `width` x `height` grid of modules named `r{row}c{col}`, each
    /// connected to its grid neighbours in every direction.
    #[must_use]
    pub fn grid(system: impl Into<String>, width: usize, height: usize) -> Self {
        let name = |row: usize, col: usize| format!("r{row}c{col}");
        let mut layout = Self::new(system);
        for row in 0..height {
            for col in 0..width {
                let mut module = ModuleLayout::new(name(row, col));
                if row > 0 {
                    module = module.with(Direction::North, name(row - 1, col));
                }
                if col + 1 < width {
                    module = module.with(Direction::East, name(row, col + 1));
                }
                if row + 1 < height {
                    module = module.with(Direction::South, name(row + 1, col));
                }
                if col > 0 {
                    module = module.with(Direction::West, name(row, col - 1));
                }
                layout.modules.push(module);
            }
        }
        layout
    }

    /// Reject empty and duplicate module identifiers.
    ///
    /// Duplicates are found after expansion, so `module1` and the absolute
    /// form of the same identifier count as one module.
    pub fn validate(&self, vocab: &Vocabulary) -> Result<(), ConveyorError> {
        if self.system.trim().is_empty() {
            return Err(ConveyorError::InvalidIdentifier(
                "system identifier is empty".to_string(),
            ));
        }
        let mut seen = BTreeSet::new();
        for module in &self.modules {
            if module.id.trim().is_empty() {
                return Err(ConveyorError::InvalidIdentifier(
                    "module identifier is empty".to_string(),
                ));
            }
            let expanded = vocab.expand(&module.id);
            if !seen.insert(expanded.clone()) {
                return Err(ConveyorError::InvalidIdentifier(format!(
                    "duplicate module {} ({})",
                    module.id, expanded
                )));
            }
        }
        Ok(())
    }

    /// The facts that describe this system in the store.
    pub fn to_triples(&self, vocab: &Vocabulary) -> Result<Vec<Triple>, ConveyorError> {
        self.validate(vocab)?;
        let system = vocab.expand(&self.system);
        let mut facts = Vec::new();

        for module in &self.modules {
            let id = vocab.expand(&module.id);
            facts.push(Triple::new(&system, vocab.contains_module(), &id));
            facts.push(Triple::new(&id, RDF_TYPE, vocab.module_class()));
            facts.push(Triple::new(&id, RDF_TYPE, OWL_NAMED_INDIVIDUAL));
            for direction in Direction::ALL {
                if let Some(neighbour) = module.connection(direction) {
                    facts.push(Triple::new(
                        &id,
                        vocab.connection(direction),
                        vocab.expand(neighbour),
                    ));
                }
            }
        }
        Ok(facts)
    }

    /// Build the adjacency model directly, without a store.
    pub fn to_topology(&self, vocab: &Vocabulary) -> Result<Topology, ConveyorError> {
        self.validate(vocab)?;
        let entries = self.modules.iter().map(|module| {
            let mut connections = Connections::new();
            for direction in Direction::ALL {
                connections.set(
                    direction,
                    module.connection(direction).map(|n| vocab.module(n)),
                );
            }
            (ModuleId::new(vocab.expand(&module.id)), connections)
        });
        Ok(Topology::from_connections(
            vocab.system(&self.system),
            entries,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn grid_has_expected_edge_count() {
        let vocab = Vocabulary::default();
        let topology = SystemLayout::grid("g", 3, 2)
            .to_topology(&vocab)
            .expect("topology");
        assert_eq!(topology.module_count(), 6);
        // Horizontal: 2 per row * 2 rows * 2 directions, vertical: 3 * 2.
        assert_eq!(topology.edge_count(), 14);
    }

    #[test]
    fn triples_cover_containment_type_and_connections() {
        let vocab = Vocabulary::default();
        let layout = SystemLayout::new("sys")
            .with_module(ModuleLayout::new("a").with(Direction::East, "b"))
            .with_module(ModuleLayout::new("b"));
        let triples = layout.to_triples(&vocab).expect("triples");
        assert_eq!(triples.len(), 7);
        assert!(triples.contains(&Triple::new(
            vocab.expand("a"),
            vocab.connection(Direction::East),
            vocab.expand("b"),
        )));
    }

    #[test]
    fn duplicate_modules_are_rejected() {
        let layout = SystemLayout::new("sys")
            .with_module(ModuleLayout::new("a"))
            .with_module(ModuleLayout::new("a"));
        assert!(matches!(
            layout.validate(&Vocabulary::default()),
            Err(ConveyorError::InvalidIdentifier(_))
        ));
    }

    #[test]
    fn local_and_absolute_names_of_one_module_are_duplicates() {
        let vocab = Vocabulary::default();
        let layout = SystemLayout::new("sys")
            .with_module(ModuleLayout::new("module1"))
            .with_module(ModuleLayout::new(vocab.expand("module1")));
        assert!(matches!(
            layout.validate(&vocab),
            Err(ConveyorError::InvalidIdentifier(_))
        ));
        assert!(layout.to_triples(&vocab).is_err());

        let distinct = SystemLayout::new("sys")
            .with_module(ModuleLayout::new("module1"))
            .with_module(ModuleLayout::new("https://example.org/other#module1"));
        assert!(distinct.validate(&vocab).is_ok());
    }
}
