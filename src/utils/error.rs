//! Error types for the entire application.
//!
//! We use `thiserror` for library-style errors with custom types,
//! and `anyhow` for application-level error propagation in main.rs and commands.

use crate::model::TreeKey;
use thiserror::Error;

/// Errors that can occur while building a snapshot from its JSON record.
///
/// All of these are structural violations of the input: there is no recovery.
#[derive(Error, Debug)]
pub enum LoadError {
    #[error("JSON deserialization failed: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("Failed to read snapshot: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Invalid snapshot format: {0}")]
    InvalidFormat(String),

    #[error("Missing required field '{field}' in {context}")]
    MissingField { context: String, field: String },

    #[error("Field '{field}' in {context} is not an unsigned integer")]
    InvalidCounter { context: String, field: String },

    #[error("Duplicate scope '{name}' below '{parent}'")]
    DuplicateScope { parent: String, name: String },

    #[error("Duplicate tree for thread ID {0}")]
    DuplicateThread(u64),

    #[error("No root scope found in tree '{0}'")]
    MissingRootScope(String),

    #[error("More than one root scope found in tree '{0}'")]
    MultipleRootScopes(String),
}

/// Errors that can occur when merging two trees of a snapshot.
#[derive(Error, Debug, PartialEq, Eq)]
pub enum AggregateError {
    #[error("Tree not found: {0}")]
    TreeNotFound(TreeKey),

    #[error("Cannot aggregate tree {0} with itself")]
    SameTree(TreeKey),

    #[error("Aggregated tree key {0} is already used by another tree")]
    KeyCollision(TreeKey),
}

/// Errors that can occur while loading post-processing rules
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read rule file: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Invalid rule file JSON: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("Rule file must contain a JSON object")]
    NotAnObject,

    #[error("In rule '{rule}': expected exactly 1 mode, found {found}")]
    ModeCount { rule: String, found: usize },

    #[error("In rule '{rule}': found unsupported mode '{mode}'")]
    UnsupportedMode { rule: String, mode: String },

    #[error("In rule '{rule}': missing or non-string field '{field}'")]
    MissingField { rule: String, field: String },

    #[error("In rule '{rule}': invalid pattern: {source}")]
    InvalidPattern {
        rule: String,
        #[source]
        source: regex::Error,
    },
}

/// Errors that can occur during file output
#[derive(Error, Debug)]
pub enum OutputError {
    #[error("Failed to write file: {0}")]
    WriteFailed(#[from] std::io::Error),

    #[error("Failed to serialize JSON: {0}")]
    SerializationFailed(#[from] serde_json::Error),

    #[error("Invalid output path: {0}")]
    InvalidPath(String),

    #[error("Unsupported output format: {0}")]
    UnsupportedFormat(String),
}
