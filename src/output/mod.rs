//! Output writers for post-processed snapshots.
//!
//! This module handles writing data to disk in various formats:
//! - JSON snapshots (same shape as the input, plus derived fields)
//! - Graphviz DOT graphs

pub mod dot;
pub mod json;

// Re-export main functions
pub use dot::{pretty_print_bytes, render_dot, write_dot};
pub use json::{snapshot_to_string, write_snapshot};

use crate::utils::error::OutputError;
use log::debug;
use std::path::Path;

/// Reject paths no file can be written to, then create missing parent directories
///
/// **Private** - shared by every writer of this module
pub(crate) fn prepare_output_path(path: &Path) -> Result<(), OutputError> {
    if path.as_os_str().is_empty() {
        return Err(OutputError::InvalidPath("empty output path".to_string()));
    }
    if path.is_dir() {
        return Err(OutputError::InvalidPath(format!(
            "{} is a directory",
            path.display()
        )));
    }

    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() && !parent.exists() => {
            debug!("Creating output directory {}", parent.display());
            std::fs::create_dir_all(parent).map_err(|e| {
                OutputError::InvalidPath(format!("{}: {}", parent.display(), e))
            })
        }
        _ => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prepare_output_path_rejects_empty() {
        assert!(matches!(
            prepare_output_path(Path::new("")),
            Err(OutputError::InvalidPath(_))
        ));
    }

    #[test]
    fn test_prepare_output_path_rejects_directory() {
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(
            prepare_output_path(dir.path()),
            Err(OutputError::InvalidPath(_))
        ));
    }

    #[test]
    fn test_prepare_output_path_creates_parents() {
        let dir = tempfile::tempdir().unwrap();
        let nested = dir.path().join("a/b/out.json");

        prepare_output_path(&nested).unwrap();

        assert!(dir.path().join("a/b").is_dir());
        assert!(!nested.exists());
    }
}
