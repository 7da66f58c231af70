//! Input parsing: snapshots and rule files.
//!
//! This module handles:
//! - Reading malloc-tag JSON snapshots (file or stdin)
//! - Parsing post-processing rule files
//! - Field names and typed accessors of the snapshot format

pub mod reader;
pub mod rules;
pub mod schema;

// Re-export main functions
pub use reader::{parse_snapshot, read_snapshot};
pub use rules::{load_rules, parse_rules};
