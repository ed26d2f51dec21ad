//! Fleet governor CLI
//!
//! A command-line tool for inspecting the cycle metrics, container stats and
//! process stats the governor records into its SQLite store.

mod commands;
mod config;
mod output;

use anyhow::Result;
use clap::{Parser, Subcommand};
use commands::{metrics, stats};
use std::path::PathBuf;

/// Fleet governor CLI
#[derive(Parser)]
#[command(name = "fleetctl")]
#[command(author, version, about = "CLI for inspecting Fleet Governor metrics", long_about = None)]
pub struct Cli {
    /// Metrics database (can also be set via FLEET_DATABASE env var)
    #[arg(long, env = "FLEET_DATABASE")]
    pub database: Option<PathBuf>,

    /// Output format
    #[arg(long, short, default_value = "table")]
    pub format: output::OutputFormat,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Show the most recent cycle metrics
    Metrics {
        /// Number of cycles to show
        #[arg(long, short, default_value_t = 20)]
        limit: usize,
    },

    /// Show the most recent per-container stats
    Containers {
        /// Number of rows to show
        #[arg(long, short, default_value_t = 20)]
        limit: usize,
    },

    /// Show the most recent per-process stats
    Processes {
        /// Number of rows to show
        #[arg(long, short, default_value_t = 20)]
        limit: usize,
    },

    /// Summarize every recorded cycle
    Summary,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = config::Config::load()?;
    let database = config::database_path(cli.database, &config);
    let store = config::open_store(&database)?;

    match cli.command {
        Commands::Metrics { limit } => metrics::show_metrics(&store, limit, cli.format)?,
        Commands::Summary => metrics::show_summary(&store, &database, cli.format)?,
        Commands::Containers { limit } => stats::show_containers(&store, limit, cli.format)?,
        Commands::Processes { limit } => stats::show_processes(&store, limit, cli.format)?,
    }

    Ok(())
}
