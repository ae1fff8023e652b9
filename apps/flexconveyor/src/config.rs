//! # Configuration
//!
//! `flexconveyor.toml` schema and loading.
//!
//! # Precedence
//!
//! Later sources override earlier ones:
//! 1. Default values
//! 2. The config file (`--config`, else `./flexconveyor.toml` if present)
//! 3. Global CLI flags (applied by the CLI, not here)
//!
//! # Example
//!
//! ```toml
//! system = "exampleSystem1"
//! id_strategy = "store_maximum"
//!
//! [store]
//! kind = "sparql"
//! endpoint = "http://localhost:7200"
//! repository = "JMS_Usecase_2"
//! timeout_secs = 10
//!
//! [server]
//! host = "127.0.0.1"
//! port = 8080
//! ```

use flexconveyor_core::vocabulary::DEFAULT_NAMESPACE;
use flexconveyor_core::{ConveyorError, IdStrategy, SystemOptions, Vocabulary};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Config file looked up in the working directory when none is given.
pub const DEFAULT_CONFIG_FILE: &str = "flexconveyor.toml";

/// Default embedded database file.
pub const DEFAULT_DATABASE: &str = "flexconveyor.redb";

// =============================================================================
// SCHEMA
// =============================================================================

/// Top-level application configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct AppConfig {
    /// System to operate on. Bare names are expanded into `namespace`.
    pub system: String,
    /// Ontology namespace. Should end in `#` or `/`.
    pub namespace: String,
    /// How the next parcel ordinal is chosen. Defaults to `store_maximum`:
    /// every CLI command opens a fresh engine, so a session counter would
    /// be reseeded on each call.
    pub id_strategy: IdStrategy,
    pub store: StoreConfig,
    pub server: ServerConfig,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            system: "exampleSystem1".to_string(),
            namespace: DEFAULT_NAMESPACE.to_string(),
            id_strategy: IdStrategy::StoreMaximum,
            store: StoreConfig::default(),
            server: ServerConfig::default(),
        }
    }
}

impl AppConfig {
    #[must_use]
    pub fn vocabulary(&self) -> Vocabulary {
        Vocabulary::with_namespace(self.namespace.clone())
    }

    /// Engine options for this configuration, logging through `tracing`.
    #[must_use]
    pub fn system_options(&self) -> SystemOptions {
        SystemOptions {
            vocabulary: self.vocabulary(),
            id_strategy: self.id_strategy,
            ..SystemOptions::default()
        }
    }

    /// Validate the configuration values.
    pub fn validate(&self) -> Result<(), ConveyorError> {
        if self.system.trim().is_empty() {
            return Err(ConveyorError::InvalidIdentifier(
                "config: system is empty".to_string(),
            ));
        }
        if !(self.namespace.ends_with('#') || self.namespace.ends_with('/')) {
            return Err(ConveyorError::InvalidIdentifier(format!(
                "config: namespace '{}' must end in '#' or '/'",
                self.namespace
            )));
        }
        if let StoreConfig::Sparql(sparql) = &self.store {
            sparql.validate()?;
        }
        Ok(())
    }
}

/// Which store backs the engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum StoreConfig {
    /// A remote RDF4J/GraphDB repository.
    Sparql(SparqlConfig),
    /// An embedded redb file.
    Redb { path: PathBuf },
    /// A process-local store, optionally seeded from a layout file.
    Memory {
        #[serde(default)]
        layout: Option<PathBuf>,
    },
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self::Redb {
            path: PathBuf::from(DEFAULT_DATABASE),
        }
    }
}

impl StoreConfig {
    /// Short backend name, as accepted by `--store`.
    #[must_use]
    pub fn label(&self) -> &'static str {
        match self {
            Self::Sparql(_) => "sparql",
            Self::Redb { .. } => "redb",
            Self::Memory { .. } => "memory",
        }
    }
}

/// Connection settings for a remote repository.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SparqlConfig {
    /// Server base URL, e.g. `http://localhost:7200`.
    pub endpoint: String,
    pub repository: String,
    pub username: Option<String>,
    pub password: Option<String>,
    /// Per-request timeout. Expiry is reported as a connectivity error.
    pub timeout_secs: u64,
}

impl Default for SparqlConfig {
    fn default() -> Self {
        Self {
            endpoint: "http://localhost:7200".to_string(),
            repository: "JMS_Usecase_2".to_string(),
            username: None,
            password: None,
            timeout_secs: 10,
        }
    }
}

impl SparqlConfig {
    pub fn validate(&self) -> Result<(), ConveyorError> {
        if !(self.endpoint.starts_with("http://") || self.endpoint.starts_with("https://")) {
            return Err(ConveyorError::InvalidIdentifier(format!(
                "config: endpoint '{}' is not an http(s) URL",
                self.endpoint
            )));
        }
        if self.repository.trim().is_empty() {
            return Err(ConveyorError::InvalidIdentifier(
                "config: repository is empty".to_string(),
            ));
        }
        if self.timeout_secs == 0 {
            return Err(ConveyorError::InvalidIdentifier(
                "config: timeout_secs must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

/// HTTP server binding.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8080,
        }
    }
}

// =============================================================================
// LOADING
// =============================================================================

/// Parse configuration from TOML text.
pub fn parse(content: &str) -> Result<AppConfig, ConveyorError> {
    let config: AppConfig = toml::from_str(content)
        .map_err(|e| ConveyorError::Serialization(format!("config: {}", e)))?;
    config.validate()?;
    Ok(config)
}

/// Load configuration.
///
/// An explicit `path` must exist. Without one, `./flexconveyor.toml` is
/// used when present and defaults otherwise.
pub fn load(path: Option<&Path>) -> Result<AppConfig, ConveyorError> {
    let path = match path {
        Some(path) => path.to_path_buf(),
        None => {
            let default = PathBuf::from(DEFAULT_CONFIG_FILE);
            if !default.is_file() {
                tracing::debug!("No {} found, using defaults", DEFAULT_CONFIG_FILE);
                return Ok(AppConfig::default());
            }
            default
        }
    };

    let content = std::fs::read_to_string(&path).map_err(|e| {
        ConveyorError::Io(format!("Cannot read config '{}': {}", path.display(), e))
    })?;
    let config = parse(&content)?;
    tracing::debug!("Loaded configuration from {}", path.display());
    Ok(config)
}

// =============================================================================
// TESTS
// =============================================================================
