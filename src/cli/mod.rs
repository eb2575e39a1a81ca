//! CLI module for aeroquery
//!
//! Provides command-line interface for:
//! - run: Execute a plan against a data file, streaming JSON lines
//! - check: Build a plan's pipeline without running it

mod args;
mod commands;
mod errors;
mod io;

pub use args::{Cli, Command};
pub use commands::{check, parse_params, run, run_command, Inputs};
pub use errors::{CliError, CliErrorCode, CliResult};
pub use io::{read_json_file, write_final, write_line};

/// Parse arguments and dispatch
pub async fn run_cli() -> CliResult<()> {
    let cli = Cli::parse_args();
    run_command(cli.command).await
}
