//! # sync-cli
//!
//! Command-line client for ressync resources.
//!
//! ## Commands
//!
//! - `get`: Read a resource from the local store
//! - `set`: Write a resource to the local store
//! - `list`: Add, remove or show the keys of a list resource
//! - `watch`: Follow a resource on a WebSocket peer
//! - `status`: Show settings and store contents
//!
//! ## Example
//!
//! ```bash
//! # Write and read back a value
//! ressync set todo '{"title": "buy milk"}'
//! ressync get todo
//!
//! # Maintain a list of resources
//! ressync list add shopping todo
//! ressync list show shopping
//!
//! # Follow a value on a peer
//! ressync watch todo --url ws://127.0.0.1:9000
//! ```

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

mod commands;
mod config;

use commands::{get, list, set, status, watch};
use config::Workspace;

/// Command-line client for ressync resources.
#[derive(Parser, Debug)]
#[command(name = "ressync")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Data directory holding the store and settings
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    /// Settings file (default: <data-dir>/ressync.toml, if present)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Log debug output to stderr
    #[arg(long, short, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Print a resource's value as JSON
    Get {
        /// Resource name
        name: String,

        /// Resource type
        #[arg(long = "type", short, default_value = "resource")]
        type_name: String,
    },

    /// Write a resource's value
    Set {
        /// Resource name
        name: String,

        /// Value as JSON (anything that is not JSON is stored as a string)
        value: String,

        /// Resource type
        #[arg(long = "type", short, default_value = "resource")]
        type_name: String,
    },

    /// Manage a list resource
    List {
        #[command(subcommand)]
        action: ListAction,
    },

    /// Follow a resource on a WebSocket peer and print every value
    Watch {
        /// Resource name
        name: String,

        /// Resource type
        #[arg(long = "type", short, default_value = "resource")]
        type_name: String,

        /// Peer address (default: connection.address from settings)
        #[arg(long)]
        url: Option<String>,

        /// Exit after this many values
        #[arg(long)]
        count: Option<usize>,
    },

    /// Show settings and store contents
    Status,
}

#[derive(Subcommand, Debug)]
enum ListAction {
    /// Add a key
    Add {
        /// List name
        list: String,
        /// Key to add
        key: String,
    },

    /// Remove a key
    Remove {
        /// List name
        list: String,
        /// Key to remove
        key: String,
    },

    /// Print the keys and their values
    Show {
        /// List name
        list: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging (stderr, so stdout stays machine-readable)
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    // Determine data directory
    let data_dir = match cli.data_dir {
        Some(dir) => dir,
        None => default_data_dir()?,
    };

    // Ensure data directory exists
    tokio::fs::create_dir_all(&data_dir)
        .await
        .context("Failed to create data directory")?;

    let workspace = Workspace::open(&data_dir, cli.config.as_deref())?;

    match cli.command {
        Commands::Get { name, type_name } => {
            get::run(&workspace, &name, &type_name).await?;
        }
        Commands::Set {
            name,
            value,
            type_name,
        } => {
            set::run(&workspace, &name, &type_name, &value).await?;
        }
        Commands::List { action } => match action {
            ListAction::Add { list: name, key } => list::add(&workspace, &name, &key).await?,
            ListAction::Remove { list: name, key } => {
                list::remove(&workspace, &name, &key).await?
            }
            ListAction::Show { list: name } => list::show(&workspace, &name).await?,
        },
        Commands::Watch {
            name,
            type_name,
            url,
            count,
        } => {
            watch::run(&workspace, &name, &type_name, url, count).await?;
        }
        Commands::Status => {
            status::run(&workspace)?;
        }
    }

    Ok(())
}

/// Get the default data directory for ressync.
fn default_data_dir() -> Result<PathBuf> {
    let dirs = directories::ProjectDirs::from("io", "ressync", "ressync")
        .context("Could not determine home directory")?;
    Ok(dirs.data_dir().to_path_buf())
}
