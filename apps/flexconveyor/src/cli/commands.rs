//! # CLI Command Implementations
//!
//! This module contains the actual implementations of CLI commands.
//!
//! Everything except `cmd_serve` is blocking and is run through
//! `cli::blocking` by the dispatcher.

use super::blocking;
use crate::api::{
    self, AddParcelResponse, AppState, ArrivalJson, ConveyResponse, DeleteParcelResponse,
    ParcelJson, ParcelsResponse, PathResponse, TopologyResponse,
};
use crate::config::{AppConfig, StoreConfig};
use crate::store::{self, Engine};
use flexconveyor_core::{Conveyance, ConveyorError, RedbStore, StoreClient};
use serde::Serialize;
use std::path::Path;

fn print_json<T: Serialize>(value: &T) {
    println!(
        "{}",
        serde_json::to_string_pretty(value).unwrap_or_default()
    );
}

fn print_arrivals(engine: &Engine) {
    for arrival in engine.arrivals() {
        if arrival.removed {
            println!(
                "Parcel {} arrived at {} and was removed",
                arrival.parcel.short(),
                arrival.module.short()
            );
        } else {
            println!(
                "Parcel {} arrived at {}; cleanup failed, retried on next sync",
                arrival.parcel.short(),
                arrival.module.short()
            );
        }
    }
}

fn print_conveyance(engine: &Engine, conveyance: &Conveyance, json_mode: bool) {
    if json_mode {
        print_json(&ConveyResponse::new(conveyance, engine.arrivals()));
    } else {
        println!("{}", conveyance);
        print_arrivals(engine);
    }
}

// =============================================================================
// SERVER COMMAND
// =============================================================================

/// Start the HTTP server.
pub async fn cmd_serve(
    config: AppConfig,
    host: Option<String>,
    port: Option<u16>,
) -> Result<(), ConveyorError> {
    let host = host.unwrap_or_else(|| config.server.host.clone());
    let port = port.unwrap_or(config.server.port);

    let engine = {
        let config = config.clone();
        blocking(move || store::open_engine(&config)).await?
    };

    println!("FlexConveyor Server Starting...");
    println!();
    println!("Configuration:");
    println!("  Host:     {}", host);
    println!("  Port:     {}", port);
    println!("  Store:    {}", config.store.label());
    println!("  System:   {}", engine.topology().system());
    println!(
        "  Modules:  {} ({} connections)",
        engine.topology().module_count(),
        engine.topology().edge_count()
    );
    println!();
    println!("Endpoints:");
    println!("  GET  /health         - Health check");
    println!("  GET  /topology       - Modules and connections");
    println!("  GET  /parcels        - List parcels");
    println!("  POST /parcels        - Create a parcel");
    println!("  POST /parcels/delete - Delete a parcel");
    println!("  POST /parcels/step   - Step a parcel towards its destination");
    println!("  POST /path           - Shortest path");
    println!("  POST /convey         - Convey between adjacent modules");
    println!();
    println!("Press Ctrl+C to stop");
    println!();

    let state = AppState::new(engine);
    let addr = format!("{}:{}", host, port);
    let result = api::run_server(&addr, state.clone()).await;

    // Last handle to the engine; a remote store client must be dropped
    // off the runtime.
    blocking(move || {
        drop(state);
        Ok(())
    })
    .await?;
    result
}

// =============================================================================
// TOPOLOGY COMMAND
// =============================================================================

/// Show modules and their connections.
pub fn cmd_topology(config: &AppConfig, json_mode: bool) -> Result<(), ConveyorError> {
    let engine = store::open_engine(config)?;
    let topology = engine.topology();

    if json_mode {
        print_json(&TopologyResponse::from(topology));
        return Ok(());
    }

    println!("FlexConveyor Topology");
    println!("=====================");
    println!("System:      {}", topology.system());
    println!("Modules:     {}", topology.module_count());
    println!("Connections: {}", topology.edge_count());
    println!();
    for module in topology.modules() {
        let links: Vec<String> = topology
            .neighbours(module)
            .map(|(direction, to)| format!("{}={}", direction, to.short()))
            .collect();
        println!("  {:<16} {}", module.short(), links.join(" "));
    }
    for (from, direction, to) in topology.dangling_edges() {
        println!(
            "  warning: {} {} connection points outside the system ({})",
            from.short(),
            direction,
            to
        );
    }

    Ok(())
}

// =============================================================================
// PARCEL COMMANDS
// =============================================================================

/// Sync and list parcels.
pub fn cmd_parcels(config: &AppConfig, json_mode: bool) -> Result<(), ConveyorError> {
    let engine = store::open_engine(config)?;

    if json_mode {
        print_json(&ParcelsResponse {
            parcels: engine
                .parcels()
                .iter()
                .map(|(id, parcel)| ParcelJson::new(id, parcel))
                .collect(),
            arrivals: engine.arrivals().iter().map(ArrivalJson::from).collect(),
        });
        return Ok(());
    }

    print_arrivals(&engine);
    if engine.parcels().is_empty() {
        println!("No parcels in {}", engine.topology().system().short());
        return Ok(());
    }
    println!("{:<16} {:<16} DESTINATION", "PARCEL", "POSITION");
    for (id, parcel) in engine.parcels() {
        println!(
            "{:<16} {:<16} {}",
            id.short(),
            parcel.position.short(),
            parcel.destination.as_ref().map_or("-", |d| d.short())
        );
    }
    Ok(())
}

/// Create a parcel.
pub fn cmd_add(
    config: &AppConfig,
    json_mode: bool,
    start: &str,
    destination: Option<&str>,
) -> Result<(), ConveyorError> {
    let mut engine = store::open_engine(config)?;
    let vocab = engine.vocabulary().clone();
    let destination = destination.map(|d| vocab.module(d));
    let parcel = engine.add_parcel(destination.as_ref(), &vocab.module(start))?;

    if json_mode {
        print_json(&AddParcelResponse::new(&parcel));
    } else {
        println!("Added {}", parcel);
        print_arrivals(&engine);
    }
    Ok(())
}

/// Delete a parcel.
pub fn cmd_delete(config: &AppConfig, json_mode: bool, parcel: &str) -> Result<(), ConveyorError> {
    let mut engine = store::open_engine(config)?;
    let parcel = engine.vocabulary().parcel(parcel);
    let removed = engine.delete_parcel(&parcel)?;

    if json_mode {
        print_json(&DeleteParcelResponse {
            success: true,
            parcel: parcel.as_str().to_string(),
            removed_facts: removed,
        });
    } else {
        println!("Deleted {} ({} facts)", parcel, removed);
    }
    Ok(())
}

// =============================================================================
// ROUTING COMMANDS
// =============================================================================

/// Shortest path between two modules.
pub fn cmd_path(
    config: &AppConfig,
    json_mode: bool,
    start: &str,
    target: &str,
) -> Result<(), ConveyorError> {
    let engine = store::open_engine(config)?;
    let vocab = engine.vocabulary();
    let route = engine.find_path(&vocab.module(start), &vocab.module(target))?;

    if json_mode {
        print_json(&PathResponse::new(route.as_ref()));
        return Ok(());
    }

    match route {
        Some(route) => {
            let names: Vec<&str> = route.modules().iter().map(|m| m.short()).collect();
            println!("{} ({} hops)", names.join(" -> "), route.hops());
        }
        None => println!("No path from {} to {}", start, target),
    }
    Ok(())
}

/// Move the parcel held by `from` into `to`.
pub fn cmd_convey(
    config: &AppConfig,
    json_mode: bool,
    from: &str,
    to: &str,
) -> Result<(), ConveyorError> {
    let mut engine = store::open_engine(config)?;
    let vocab = engine.vocabulary().clone();
    let conveyance = engine.convey(&vocab.module(from), &vocab.module(to))?;
    print_conveyance(&engine, &conveyance, json_mode);
    Ok(())
}

/// Step a parcel towards its destination, once or until it arrives.
///
/// A conflict with another writer is reported, not retried.
pub fn cmd_step(
    config: &AppConfig,
    json_mode: bool,
    parcel: &str,
    until_arrival: bool,
) -> Result<(), ConveyorError> {
    let mut engine = store::open_engine(config)?;
    let parcel = engine.vocabulary().parcel(parcel);

    // A shortest path never visits a module twice.
    let budget = if until_arrival {
        engine.topology().module_count().max(1)
    } else {
        1
    };
    for _ in 0..budget {
        let conveyance = engine.step(&parcel)?;
        print_conveyance(&engine, &conveyance, json_mode);
        if !engine.parcels().contains_key(&parcel) {
            break;
        }
    }
    Ok(())
}

// =============================================================================
// STORE COMMANDS
// =============================================================================

/// Write a layout's facts into the configured store.
pub fn cmd_seed(config: &AppConfig, json_mode: bool, layout: &Path) -> Result<(), ConveyorError> {
    if matches!(config.store, StoreConfig::Memory { .. }) {
        return Err(ConveyorError::Io(
            "seeding a memory store has no lasting effect; use --store redb or sparql".to_string(),
        ));
    }
    let vocab = config.vocabulary();
    let layout = store::load_layout(layout, &vocab)?;
    let facts = layout.to_triples(&vocab)?;

    let target = store::open_store(&config.store, &vocab)?;
    target.facts_add(&facts)?;
    tracing::info!(
        "Seeded {} ({} modules, {} facts)",
        layout.system,
        layout.modules.len(),
        facts.len()
    );

    if json_mode {
        print_json(&serde_json::json!({
            "success": true,
            "system": vocab.expand(&layout.system),
            "modules": layout.modules.len(),
            "facts": facts.len(),
        }));
    } else {
        println!(
            "Seeded system {} with {} modules ({} facts)",
            layout.system,
            layout.modules.len(),
            facts.len()
        );
    }
    Ok(())
}

/// Initialize a new embedded database.
pub fn cmd_init(config: &AppConfig, force: bool) -> Result<(), ConveyorError> {
    let StoreConfig::Redb { path } = &config.store else {
        return Err(ConveyorError::Io(format!(
            "init only applies to the redb backend, not {}",
            config.store.label()
        )));
    };

    if path.exists() {
        if !force {
            return Err(ConveyorError::Io(
                "Database already exists. Use --force to overwrite.".to_string(),
            ));
        }
        std::fs::remove_file(path).map_err(|e| {
            ConveyorError::Io(format!("Cannot remove '{}': {}", path.display(), e))
        })?;
    }

    let _store = RedbStore::open(path)?;
    println!("Initialized new redb database at {:?}", path);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use flexconveyor_core::IdStrategy;

    fn redb_config(dir: &tempfile::TempDir) -> AppConfig {
        AppConfig {
            system: "ring".to_string(),
            store: StoreConfig::Redb {
                path: dir.path().join("test.redb"),
            },
            ..AppConfig::default()
        }
    }

    fn write_ring(dir: &tempfile::TempDir) -> std::path::PathBuf {
        let path = dir.path().join("ring.toml");
        std::fs::write(
            &path,
            "system = \"ring\"\n\
             [[module]]\nid = \"a\"\neast = \"b\"\n\
             [[module]]\nid = \"b\"\nsouth = \"a\"\n",
        )
        .expect("write");
        path
    }

    #[test]
    fn seed_then_add_and_step_persist_in_redb() {
        let dir = tempfile::tempdir().expect("tempdir");
        let config = redb_config(&dir);
        cmd_seed(&config, true, &write_ring(&dir)).expect("seed");

        cmd_add(&config, true, "a", Some("b")).expect("add");
        let engine = store::open_engine(&config).expect("open");
        assert_eq!(engine.parcels().len(), 1);
        drop(engine);

        cmd_step(&config, true, "parcel1", true).expect("step");
        let engine = store::open_engine(&config).expect("open");
        assert!(engine.parcels().is_empty());
    }

    #[test]
    fn separate_commands_never_mint_a_live_parcel_id() {
        for strategy in [IdStrategy::StoreMaximum, IdStrategy::SessionCounter] {
            let dir = tempfile::tempdir().expect("tempdir");
            let config = AppConfig {
                id_strategy: strategy,
                ..redb_config(&dir)
            };
            cmd_seed(&config, true, &write_ring(&dir)).expect("seed");

            cmd_add(&config, true, "a", None).expect("add parcel1");
            cmd_add(&config, true, "b", None).expect("add parcel2");
            cmd_delete(&config, true, "parcel1").expect("delete");
            cmd_add(&config, true, "a", None).expect("add again");

            let engine = store::open_engine(&config).expect("open");
            let vocab = engine.vocabulary();
            let shorts: Vec<_> = engine.parcels().keys().map(|p| p.short().to_string()).collect();
            assert_eq!(shorts, ["parcel2", "parcel3"], "{:?}", strategy);
            assert_eq!(engine.parcels()[&vocab.parcel("parcel2")].position, vocab.module("b"));
        }
    }

    #[test]
    fn init_refuses_existing_database_without_force() {
        let dir = tempfile::tempdir().expect("tempdir");
        let config = redb_config(&dir);
        cmd_init(&config, false).expect("first init");
        assert!(matches!(cmd_init(&config, false), Err(ConveyorError::Io(_))));
        cmd_init(&config, true).expect("forced init");
    }

    #[test]
    fn seed_memory_store_rejected() {
        let dir = tempfile::tempdir().expect("tempdir");
        let config = AppConfig {
            store: StoreConfig::Memory { layout: None },
            ..AppConfig::default()
        };
        assert!(matches!(
            cmd_seed(&config, true, &write_ring(&dir)),
            Err(ConveyorError::Io(_))
        ));
    }
}
