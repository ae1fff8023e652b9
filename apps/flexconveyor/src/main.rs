//! # FlexConveyor
//!
//! The main binary for the FlexConveyor parcel routing engine.
//!
//! This application provides:
//! - HTTP JSON API server (axum-based)
//! - CLI interface for topology, routing and parcel operations
//! - Store selection: remote SPARQL repository, embedded redb, or memory
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                  apps/flexconveyor (THE BINARY)                 │
//! │                                                                 │
//! │  ┌─────────────┐    ┌─────────────┐    ┌──────────────────┐    │
//! │  │   CLI       │    │   HTTP API  │    │  SparqlStore     │    │
//! │  │  (clap)     │    │   (axum)    │    │  (reqwest)       │    │
//! │  └──────┬──────┘    └──────┬──────┘    └────────┬─────────┘    │
//! │         │                  │                    │               │
//! │         └──────────────────┼────────────────────┘               │
//! │                            ▼                                    │
//! │                  ┌───────────────────┐                          │
//! │                  │ flexconveyor-core │                          │
//! │                  │   (THE LOGIC)     │                          │
//! │                  └───────────────────┘                          │
//! └─────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Usage
//!
//! ```bash
//! # Seed an embedded store and start the HTTP server
//! flexconveyor seed --layout demos/ring.toml --system ring
//! flexconveyor serve --host 0.0.0.0 --port 8080 --system ring
//!
//! # CLI operations
//! flexconveyor add --start module1 --destination module4
//! flexconveyor step parcel1 --until-arrival
//! flexconveyor path --start module1 --target module3
//! ```

use clap::Parser;
use flexconveyor::cli;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

// =============================================================================
// APPLICATION ENTRY POINT
// =============================================================================

#[tokio::main]
async fn main() {
    // FLEXCONVEYOR_LOG_FORMAT=json enables machine-parseable output.
    let log_format =
        std::env::var("FLEXCONVEYOR_LOG_FORMAT").unwrap_or_else(|_| "text".to_string());

    let filter = tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        "flexconveyor=info,flexconveyor_core=info,tower_http=debug".into()
    });

    match log_format.as_str() {
        "json" => {
            tracing_subscriber::registry()
                .with(filter)
                .with(tracing_subscriber::fmt::layer().json())
                .init();
        }
        _ => {
            tracing_subscriber::registry()
                .with(filter)
                .with(tracing_subscriber::fmt::layer())
                .init();
        }
    }

    let cli = cli::Cli::parse();

    if !cli.quiet && !cli.json_mode {
        print_banner();
    }

    if let Err(e) = cli::execute(cli).await {
        tracing::error!("Error: {}", e);
        std::process::exit(1);
    }
}

/// Print the FlexConveyor startup banner.
fn print_banner() {
    println!(
        r#"
  ┌───┬───┬───┐
  │ → │ → │ ↓ │   FlexConveyor v{}
  ├───┼───┼───┤
  │ ↑ │ ← │ ← │   Parcel routing over a conveyor grid
  └───┴───┴───┘
"#,
        env!("CARGO_PKG_VERSION")
    );
}
