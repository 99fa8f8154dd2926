//! Portal API server
//!
//! REST backend built with Tokio and Axum. The interesting part is the
//! admission stack every request passes through before a handler runs.
//!
//! # Architecture Overview
//!
//! ```text
//!                      ┌──────────────────────────────────────────────────┐
//!                      │                   PORTAL API                      │
//!                      │                                                   │
//!   Client Request     │  ┌──────────────┐   ┌────────────┐               │
//!   ───────────────────┼─▶│ panic        │──▶│ request id │               │
//!                      │  │ containment  │   │ span, log  │               │
//!                      │  └──────────────┘   └─────┬──────┘               │
//!                      │                           ▼                       │
//!                      │  ┌──────────────┐   ┌────────────┐   ┌─────────┐ │
//!                      │  │ rate limiter │──▶│ authenti-  │──▶│ handler │ │
//!                      │  │ (per client) │   │ cator      │   │ (api)   │ │
//!                      │  └──────┬───────┘   └─────┬──────┘   └─────────┘ │
//!                      │         │                 │                       │
//!                      │   sweep task        token service                 │
//!                      │   (idle buckets)    → token/user store            │
//!                      └──────────────────────────────────────────────────┘
//! ```

use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use tokio::net::TcpListener;

use portal_api::auth::MemoryStore;
use portal_api::config::{load_config, AppConfig};
use portal_api::http::HttpServer;
use portal_api::lifecycle::{signals, Shutdown};
use portal_api::observability::{logging, metrics};

#[derive(Parser)]
#[command(name = "portal-api", version, about = "Portal API server")]
struct Cli {
    /// Path to the TOML configuration file. Built-in defaults when absent.
    #[arg(short, long, value_name = "PATH")]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => load_config(path)?,
        None => AppConfig::default(),
    };

    logging::init_logging(&config.observability, config.is_development())?;
    logging::install_panic_hook();

    tracing::info!(version = env!("CARGO_PKG_VERSION"), "portal-api starting");
    tracing::info!(
        environment = %config.environment,
        bind_address = %config.listener.bind_address,
        request_timeout_secs = config.timeouts.request_secs,
        seeded_users = config.users.len(),
        "Configuration loaded"
    );

    // Initialize metrics server
    if config.observability.metrics_enabled {
        if let Ok(addr) = config.observability.metrics_address.parse() {
            metrics::init_metrics(addr);
        } else {
            tracing::error!(
                metrics_address = %config.observability.metrics_address,
                "Failed to parse metrics address"
            );
        }
    }

    let store = Arc::new(MemoryStore::with_users(&config.users));

    // Bind TCP listener
    let listener = TcpListener::bind(&config.listener.bind_address).await?;
    tracing::info!(address = %listener.local_addr()?, "Listening for connections");

    let shutdown = Shutdown::new();
    signals::spawn_signal_handler(shutdown.clone());

    let server = HttpServer::new(config, store.clone(), store);
    server.run(listener, shutdown.subscribe()).await?;

    tracing::info!("Shutdown complete");
    Ok(())
}
