//! Post-processing of loaded snapshots.
//!
//! This module provides:
//! - Aggregation rules (what to merge)
//! - Snapshot statistics and hot scope ranking
//!
//! The merge itself lives on [`Snapshot`](crate::model::Snapshot), which
//! owns the trees being merged.

pub mod metrics;
pub mod rules;

// Re-export main types and functions
pub use metrics::{calculate_hot_scopes, calculate_snapshot_stats, HotScope, SnapshotStats};
pub use rules::{AggregationRule, RuleKind, ThreadNameMatcher};
