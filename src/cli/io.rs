//! JSON I/O handling for CLI
//!
//! - Input: plan and data as JSON files
//! - Output: one JSON value per line on stdout; result rows first, then a
//!   summary object
//! - UTF-8 only

use std::fs;
use std::io::Write;
use std::path::Path;

use serde::de::DeserializeOwned;
use serde::Serialize;

use super::errors::{CliError, CliResult};

/// Read and parse a JSON file
pub fn read_json_file<T: DeserializeOwned>(path: &Path, what: &str) -> CliResult<T> {
    let content = fs::read_to_string(path).map_err(|e| {
        CliError::io_error(format!("Failed to read {} {}: {}", what, path.display(), e))
    })?;
    serde_json::from_str(&content)
        .map_err(|e| CliError::invalid_input(format!("Invalid {} JSON: {}", what, e)))
}

/// Write one value as a JSON line
pub fn write_line<W: Write, T: Serialize + ?Sized>(out: &mut W, value: &T) -> CliResult<()> {
    serde_json::to_writer(&mut *out, value)?;
    writeln!(out)?;
    Ok(())
}

/// Write one value as a JSON line and flush
pub fn write_final<W: Write, T: Serialize + ?Sized>(out: &mut W, value: &T) -> CliResult<()> {
    write_line(out, value)?;
    out.flush()?;
    Ok(())
}
