//! JSON snapshot output.
//!
//! The written file has the shape of the input snapshot plus the derived
//! fields (totals, weights, tree sizes) and a post-processing timestamp, so
//! it can be fed back to any command of this crate.

use super::prepare_output_path;
use crate::model::Snapshot;
use crate::parser::schema::TM_POST_PROCESSED;
use crate::utils::error::OutputError;
use chrono::Utc;
use log::info;
use serde_json::Value;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

/// Write a post-processed snapshot as pretty-printed JSON
///
/// **Public** - main entry point for JSON output
///
/// # Arguments
/// * `snapshot` - Snapshot to write
/// * `output_path` - Destination file; missing parent directories are created
///
/// # Errors
/// * `OutputError::InvalidPath` - empty path, a directory, or parents that cannot be created
/// * `OutputError::WriteFailed` - I/O error while writing
/// * `OutputError::SerializationFailed` - JSON encoding error
///
/// # Example
/// ```ignore
/// let mut snapshot = read_snapshot("snapshot.json")?;
/// snapshot.apply_rules(&rules);
/// write_snapshot(&snapshot, "postprocessed.json")?;
/// ```
pub fn write_snapshot(snapshot: &Snapshot, output_path: impl AsRef<Path>) -> Result<(), OutputError> {
    let output_path = output_path.as_ref();
    info!("Writing post-processed snapshot to: {}", output_path.display());

    prepare_output_path(output_path)?;

    let mut writer = BufWriter::new(File::create(output_path)?);
    serde_json::to_writer_pretty(&mut writer, &to_output_record(snapshot))?;
    writer.flush()?;

    let size = std::fs::metadata(output_path).map(|m| m.len()).unwrap_or(0);
    info!("Snapshot written successfully ({} bytes)", size);
    Ok(())
}

/// Render the post-processed snapshot as a JSON string
///
/// **Public** - for printing to stdout and for tests
pub fn snapshot_to_string(snapshot: &Snapshot) -> Result<String, OutputError> {
    Ok(serde_json::to_string_pretty(&to_output_record(snapshot))?)
}

/// **Private** - snapshot record stamped with the post-processing time
fn to_output_record(snapshot: &Snapshot) -> Value {
    let mut record = snapshot.to_record();
    if let Value::Object(map) = &mut record {
        map.insert(
            TM_POST_PROCESSED.to_string(),
            Value::String(Utc::now().to_rfc3339()),
        );
    }
    record
}
