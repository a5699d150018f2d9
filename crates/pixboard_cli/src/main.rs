//! Pixboard CLI
//!
//! Runs the canvas server and provides operational tools.
//!
//! # Commands
//!
//! - `serve` - Run the WebSocket server
//! - `clear` / `logout` / `link` - Publish admin events to a running server
//! - `inspect` - Display snapshot, palette and queue statistics
//! - `queue` - Print the durable queue depth
//! - `purge-history` - Delete every stored placement

mod commands;

use clap::{Parser, Subcommand};
use std::net::SocketAddr;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// Pixboard shared canvas server and tools.
#[derive(Parser)]
#[command(name = "pixboard")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to the data directory
    #[arg(global = true, short, long)]
    data_dir: Option<PathBuf>,

    /// Enable verbose output
    #[arg(global = true, short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the canvas server
    Serve {
        /// Keep everything in memory (ignores --data-dir)
        #[arg(long)]
        memory: bool,

        /// WebSocket listen address (overrides PIXBOARD_BIND/PIXBOARD_PORT)
        #[arg(short, long)]
        bind: Option<SocketAddr>,

        /// Admin event listen address (overrides PIXBOARD_ADMIN_BIND)
        #[arg(long)]
        admin_bind: Option<SocketAddr>,
    },

    /// Wipe the canvas of a running server
    Clear {
        /// Admin event address of the server
        #[arg(short, long)]
        admin: Option<SocketAddr>,

        /// Who triggered the wipe
        #[arg(long)]
        by: Option<String>,

        /// Color every cell is reset to (defaults to PIXBOARD_DEFAULT_COLOR)
        #[arg(long)]
        color: Option<String>,
    },

    /// End every session of a user on a running server
    Logout {
        /// Identity whose sessions end
        user_id: String,

        /// Admin event address of the server
        #[arg(short, long)]
        admin: Option<SocketAddr>,
    },

    /// Notify clients waiting for an account link
    Link {
        /// Provider account id that was linked
        user_id: String,

        /// Correlation token chosen by the waiting client
        #[arg(short, long)]
        client_token: Option<String>,

        /// Admin event address of the server
        #[arg(short, long)]
        admin: Option<SocketAddr>,
    },

    /// Display snapshot, palette and queue statistics
    Inspect {
        /// Output format (text, json)
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// Print the durable queue depth
    Queue,

    /// Delete every stored placement (server must be stopped)
    PurgeHistory {
        /// Confirm the deletion
        #[arg(long)]
        yes: bool,
    },

    /// Show version information
    Version,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // RUST_LOG wins over --verbose
    let level = if cli.verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    match cli.command {
        Commands::Serve {
            memory,
            bind,
            admin_bind,
        } => {
            let data_dir = if memory { None } else { cli.data_dir };
            if !memory && data_dir.is_none() {
                return Err("Data directory required for serve (or pass --memory)".into());
            }
            commands::serve::run(data_dir.as_deref(), bind, admin_bind)?;
        }
        Commands::Clear { admin, by, color } => {
            commands::publish::clear(admin, by, color)?;
        }
        Commands::Logout { user_id, admin } => {
            commands::publish::logout(admin, user_id)?;
        }
        Commands::Link {
            user_id,
            client_token,
            admin,
        } => {
            commands::publish::link(admin, user_id, client_token)?;
        }
        Commands::Inspect { format } => {
            let path = cli.data_dir.ok_or("Data directory required for inspect")?;
            commands::inspect::run(&path, &format)?;
        }
        Commands::Queue => {
            let path = cli.data_dir.ok_or("Data directory required for queue")?;
            commands::queue::run(&path)?;
        }
        Commands::PurgeHistory { yes } => {
            let path = cli.data_dir.ok_or("Data directory required for purge-history")?;
            commands::purge::run(&path, yes)?;
        }
        Commands::Version => {
            println!("Pixboard CLI v{}", env!("CARGO_PKG_VERSION"));
            println!("Pixboard Core v{}", pixboard_core::VERSION);
        }
    }

    Ok(())
}
