//! # FlexConveyor CLI Module
//!
//! This module implements the CLI interface for FlexConveyor.
//!
//! ## Available Commands
//!
//! - `serve` - Start the HTTP server
//! - `topology` - Show modules and connections
//! - `parcels` - Sync and list parcels
//! - `add` - Create a parcel
//! - `delete` - Delete a parcel
//! - `path` - Shortest path between two modules
//! - `convey` - Move a parcel between adjacent modules
//! - `step` - Move a parcel towards its destination
//! - `seed` - Write a system layout into the store
//! - `init` - Initialize a new embedded database

mod commands;

use crate::config::{self, AppConfig, SparqlConfig, StoreConfig};
use clap::{Parser, Subcommand, ValueEnum};
use flexconveyor_core::ConveyorError;
use std::path::PathBuf;

pub use commands::*;

// =============================================================================
// CLI STRUCTURE
// =============================================================================

/// FlexConveyor - parcel routing over a conveyor grid held in a triple store
#[derive(Parser, Debug)]
#[command(name = "flexconveyor")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Suppress banner output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Configuration file (default: ./flexconveyor.toml if present)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Store backend, overriding the configuration
    #[arg(short = 'B', long, global = true, value_enum)]
    pub store: Option<StoreKind>,

    /// Path to the embedded database (redb backend)
    #[arg(short = 'D', long, global = true)]
    pub database: Option<PathBuf>,

    /// System to operate on, overriding the configuration
    #[arg(short = 'S', long, global = true)]
    pub system: Option<String>,

    /// Output in JSON format (for programmatic access)
    #[arg(long, global = true)]
    pub json_mode: bool,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Option<Commands>,
}

/// Store backends selectable from the command line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum StoreKind {
    Sparql,
    Redb,
    Memory,
}

/// Available CLI commands.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Start HTTP server
    Serve {
        /// Host to bind to (default: from configuration)
        #[arg(short = 'H', long)]
        host: Option<String>,

        /// Port to bind to (default: from configuration)
        #[arg(short, long)]
        port: Option<u16>,
    },

    /// Show modules and connections
    Topology,

    /// Sync and list parcels
    Parcels,

    /// Create a parcel
    Add {
        /// Module the parcel starts on
        #[arg(short, long)]
        start: String,

        /// Module the parcel should be routed to
        #[arg(short, long)]
        destination: Option<String>,
    },

    /// Delete a parcel and every fact about it
    Delete {
        /// Parcel identifier or local name (e.g. parcel3)
        parcel: String,
    },

    /// Shortest path between two modules
    Path {
        #[arg(short, long)]
        start: String,

        #[arg(short, long)]
        target: String,
    },

    /// Move the parcel held by one module into an adjacent module
    Convey {
        #[arg(short, long)]
        from: String,

        #[arg(short, long)]
        to: String,
    },

    /// Move a parcel one hop along a shortest path to its destination
    Step {
        /// Parcel identifier or local name (e.g. parcel3)
        parcel: String,

        /// Keep stepping until the parcel arrives
        #[arg(long)]
        until_arrival: bool,
    },

    /// Write a system layout (TOML) into the store
    Seed {
        /// Layout file
        #[arg(short, long)]
        layout: PathBuf,
    },

    /// Initialize a new empty embedded database
    Init {
        /// Force initialization even if database exists
        #[arg(short, long)]
        force: bool,
    },
}

// =============================================================================
// CONFIGURATION RESOLUTION
// =============================================================================

impl Cli {
    /// Load the configuration file and apply the global flags on top.
    pub fn resolve_config(&self) -> Result<AppConfig, ConveyorError> {
        let config = config::load(self.config.as_deref())?;
        apply_overrides(config, self.store, self.database.clone(), self.system.clone())
    }
}

/// Apply command-line overrides to a loaded configuration.
///
/// `--database` implies the redb backend unless `--store` says otherwise.
/// Switching to `sparql` keeps an existing sparql section.
pub fn apply_overrides(
    mut config: AppConfig,
    store: Option<StoreKind>,
    database: Option<PathBuf>,
    system: Option<String>,
) -> Result<AppConfig, ConveyorError> {
    if let Some(system) = system {
        config.system = system;
    }

    let kind = store.or(database.as_ref().map(|_| StoreKind::Redb));
    match kind {
        Some(StoreKind::Redb) => {
            let path = match (database, &config.store) {
                (Some(path), _) => path,
                (None, StoreConfig::Redb { path }) => path.clone(),
                (None, _) => PathBuf::from(config::DEFAULT_DATABASE),
            };
            config.store = StoreConfig::Redb { path };
        }
        Some(StoreKind::Memory) => {
            if !matches!(config.store, StoreConfig::Memory { .. }) {
                config.store = StoreConfig::Memory { layout: None };
            }
        }
        Some(StoreKind::Sparql) => {
            if !matches!(config.store, StoreConfig::Sparql(_)) {
                config.store = StoreConfig::Sparql(SparqlConfig::default());
            }
        }
        None => {}
    }

    config.validate()?;
    Ok(config)
}

// =============================================================================
// COMMAND EXECUTION
// =============================================================================

/// Execute the CLI with parsed arguments.
pub async fn execute(cli: Cli) -> Result<(), ConveyorError> {
    let config = cli.resolve_config()?;
    let json_mode = cli.json_mode;

    match cli.command {
        Some(Commands::Serve { host, port }) => cmd_serve(config, host, port).await,
        Some(Commands::Topology) => blocking(move || cmd_topology(&config, json_mode)).await,
        Some(Commands::Parcels) | None => {
            blocking(move || cmd_parcels(&config, json_mode)).await
        }
        Some(Commands::Add { start, destination }) => {
            blocking(move || cmd_add(&config, json_mode, &start, destination.as_deref())).await
        }
        Some(Commands::Delete { parcel }) => {
            blocking(move || cmd_delete(&config, json_mode, &parcel)).await
        }
        Some(Commands::Path { start, target }) => {
            blocking(move || cmd_path(&config, json_mode, &start, &target)).await
        }
        Some(Commands::Convey { from, to }) => {
            blocking(move || cmd_convey(&config, json_mode, &from, &to)).await
        }
        Some(Commands::Step {
            parcel,
            until_arrival,
        }) => blocking(move || cmd_step(&config, json_mode, &parcel, until_arrival)).await,
        Some(Commands::Seed { layout }) => {
            blocking(move || cmd_seed(&config, json_mode, &layout)).await
        }
        Some(Commands::Init { force }) => blocking(move || cmd_init(&config, force)).await,
    }
}

/// Run a blocking command on tokio's blocking pool.
///
/// Store clients are blocking and must be created and dropped off the
/// async runtime.
pub async fn blocking<T, F>(f: F) -> Result<T, ConveyorError>
where
    F: FnOnce() -> Result<T, ConveyorError> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| ConveyorError::Io(format!("Command task failed: {}", e)))?
}
