//! # Store Selection
//!
//! Opens the store named by the configuration and the engine on top of it.
//!
//! | Kind | Backend |
//! |------|---------|
//! | `sparql` | [`SparqlStore`], a remote RDF4J/GraphDB repository |
//! | `redb` | `flexconveyor_core::RedbStore`, an embedded file |
//! | `memory` | `flexconveyor_core::MemoryStore`, optionally seeded from a layout |

pub mod sparql;

pub use sparql::SparqlStore;

use crate::config::{AppConfig, StoreConfig};
use flexconveyor_core::{
    ConveyorError, ConveyorSystem, MemoryStore, RedbStore, StoreClient, SystemLayout, Vocabulary,
};
use std::path::Path;

/// Any store the app can run on.
pub type DynStore = Box<dyn StoreClient + Send>;

/// The engine as the app runs it.
pub type Engine = ConveyorSystem<DynStore>;

/// Read a layout TOML file and validate it against `vocab`.
pub fn load_layout(path: &Path, vocab: &Vocabulary) -> Result<SystemLayout, ConveyorError> {
    let content = std::fs::read_to_string(path).map_err(|e| {
        ConveyorError::Io(format!("Cannot read layout '{}': {}", path.display(), e))
    })?;
    let layout: SystemLayout = toml::from_str(&content)
        .map_err(|e| ConveyorError::Serialization(format!("layout: {}", e)))?;
    layout.validate(vocab)?;
    Ok(layout)
}

/// Open the configured store.
///
/// Blocking. For `sparql` the HTTP client is created here, so call this
/// from a blocking context.
pub fn open_store(config: &StoreConfig, vocab: &Vocabulary) -> Result<DynStore, ConveyorError> {
    let store: DynStore = match config {
        StoreConfig::Sparql(sparql) => Box::new(SparqlStore::new(sparql)?),
        StoreConfig::Redb { path } => Box::new(RedbStore::open(path)?),
        StoreConfig::Memory { layout: None } => Box::new(MemoryStore::new()),
        StoreConfig::Memory { layout: Some(path) } => {
            let layout = load_layout(path, vocab)?;
            Box::new(MemoryStore::with_facts(layout.to_triples(vocab)?))
        }
    };
    tracing::debug!("Opened {} store", config.label());
    Ok(store)
}

/// Open the configured store and the engine for the configured system.
pub fn open_engine(config: &AppConfig) -> Result<Engine, ConveyorError> {
    let vocab = config.vocabulary();
    let store = open_store(&config.store, &vocab)?;
    ConveyorSystem::open(store, vocab.system(&config.system), config.system_options())
}
