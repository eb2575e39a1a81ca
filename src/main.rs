//! aeroquery CLI entry point
//!
//! Parses arguments, dispatches to the CLI module, prints errors to
//! stderr and exits non-zero on failure. Result rows go to stdout; logs
//! go to stderr.

use aeroquery::cli;

#[tokio::main]
async fn main() {
    if let Err(e) = cli::run_cli().await {
        eprintln!("{}", e);
        std::process::exit(1);
    }
}
