//! CLI argument definitions using clap
//!
//! Commands:
//! - aeroquery run --plan <path> --data <path> [--config <path>] [--param name=json]...
//! - aeroquery check --plan <path> --data <path> [--config <path>]

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// aeroquery - run physical query plans against JSON documents
#[derive(Parser, Debug)]
#[command(name = "aeroquery")]
#[command(version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Execute a plan and stream its rows as JSON lines
    Run {
        /// Path to the JSON plan
        #[arg(long)]
        plan: PathBuf,

        /// Path to the JSON data file (keyspaces, documents, indexes)
        #[arg(long)]
        data: PathBuf,

        /// Path to configuration file
        #[arg(long)]
        config: Option<PathBuf>,

        /// Named parameter as name=<json value>; repeatable
        #[arg(long = "param", value_name = "NAME=JSON")]
        params: Vec<String>,
    },

    /// Build the pipeline for a plan without running it
    Check {
        /// Path to the JSON plan
        #[arg(long)]
        plan: PathBuf,

        /// Path to the JSON data file
        #[arg(long)]
        data: PathBuf,

        /// Path to configuration file
        #[arg(long)]
        config: Option<PathBuf>,
    },
}

impl Cli {
    /// Parse command line arguments
    pub fn parse_args() -> Self {
        Cli::parse()
    }
}
