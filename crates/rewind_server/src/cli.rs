//! Command-line interface for rewind_server.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Rewind Rooms - real-time tic-tac-toe with move history
#[derive(Parser, Debug)]
#[command(name = "rewind_server")]
#[command(about = "Two-player tic-tac-toe rooms with rewindable history", long_about = None)]
#[command(version)]
pub struct Cli {
    /// Subcommand to run
    #[command(subcommand)]
    pub command: Command,
}

/// Available commands
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run the HTTP and WebSocket server
    Serve {
        /// Host to bind to
        #[arg(long)]
        host: Option<String>,

        /// Port to bind to
        #[arg(short, long)]
        port: Option<u16>,

        /// Path to the SQLite database file
        #[arg(long)]
        database_url: Option<String>,

        /// TOML config file
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Keep rooms in memory instead of SQLite
        #[arg(long)]
        memory: bool,
    },

    /// Apply pending database migrations and exit
    Migrate {
        /// Path to the SQLite database file
        #[arg(long)]
        database_url: Option<String>,
    },
}
