//! Rewind Rooms server binary.

#![warn(missing_docs)]

mod cli;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use clap::Parser;
use cli::{Cli, Command};
use rewind_server::{GameStore, MemoryStore, ServerConfig, SessionCoordinator, SqliteStore};
use tracing::{info, instrument};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,rewind_server=debug")),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Command::Serve {
            host,
            port,
            database_url,
            config,
            memory,
        } => {
            let mut config = load_config(config)?;
            if let Some(host) = host {
                config.set_host(host);
            }
            if let Some(port) = port {
                config.set_port(port);
            }
            if let Some(url) = database_url {
                config.set_database_url(url);
            }
            if memory {
                config.set_in_memory(true);
            }
            run_server(config).await
        }
        Command::Migrate { database_url } => {
            let mut config = load_config(None)?;
            if let Some(url) = database_url {
                config.set_database_url(url);
            }
            run_migrations(&config)
        }
    }
}

/// Layers defaults, the optional file and the environment.
fn load_config(path: Option<PathBuf>) -> Result<ServerConfig> {
    let config = match path {
        Some(path) => ServerConfig::from_file(path)?,
        None => ServerConfig::default(),
    };
    Ok(config.with_env()?)
}

/// Opens the SQLite store and applies pending migrations.
fn open_sqlite(config: &ServerConfig) -> Result<SqliteStore> {
    let store = SqliteStore::new(config.database_url().clone())?;
    store.run_migrations()?;
    Ok(store)
}

#[instrument(skip(config))]
fn run_migrations(config: &ServerConfig) -> Result<()> {
    open_sqlite(config)?;
    info!(path = %config.database_url(), "Database is up to date");
    Ok(())
}

#[instrument(skip(config))]
async fn run_server(config: ServerConfig) -> Result<()> {
    let store: Arc<dyn GameStore> = if *config.in_memory() {
        info!("Using in-memory store");
        Arc::new(MemoryStore::new())
    } else {
        info!(path = %config.database_url(), "Using SQLite store");
        Arc::new(open_sqlite(&config)?)
    };

    let coordinator = SessionCoordinator::new(store);
    rewind_server::serve(&config, coordinator).await
}
