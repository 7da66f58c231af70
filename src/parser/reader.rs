//! Snapshot reader.
//!
//! Reads a malloc-tag JSON snapshot from a file, or from stdin when the path
//! is `-`, and builds a consistent [`Snapshot`] from it.

use crate::model::Snapshot;
use crate::utils::config::STDIN_PATH;
use crate::utils::error::LoadError;
use log::{debug, info};
use serde_json::Value;
use std::fs::File;
use std::io::{self, BufReader, Read};
use std::path::Path;

/// Read and load a snapshot
///
/// **Public** - main entry point for snapshot input
///
/// # Arguments
/// * `input_path` - Path to the JSON snapshot, or `-` for stdin
///
/// # Errors
/// * `LoadError::IoError` - the input cannot be read
/// * `LoadError::JsonError` - the input is not valid JSON
/// * any error from [`Snapshot::load`]
pub fn read_snapshot(input_path: impl AsRef<Path>) -> Result<Snapshot, LoadError> {
    let input_path = input_path.as_ref();

    let raw: Value = if input_path.as_os_str() == STDIN_PATH {
        debug!("Reading snapshot from stdin");
        from_reader(io::stdin().lock())?
    } else {
        debug!("Reading snapshot from: {}", input_path.display());
        from_reader(BufReader::new(File::open(input_path)?))?
    };

    let snapshot = Snapshot::load(&raw)?;
    info!(
        "Loaded malloc-tag snapshot for PID {} with {} trees",
        snapshot.pid(),
        snapshot.len()
    );
    Ok(snapshot)
}

/// Load a snapshot from JSON text
///
/// **Public** - useful for tests and in-memory use
pub fn parse_snapshot(text: &str) -> Result<Snapshot, LoadError> {
    let raw: Value = serde_json::from_str(text)?;
    Snapshot::load(&raw)
}

/// **Private** - any reader into a JSON value
fn from_reader(reader: impl Read) -> Result<Value, LoadError> {
    Ok(serde_json::from_reader(reader)?)
}
