//! Summary statistics and hot scopes of a snapshot.
//!
//! Hot scopes are the scopes holding the largest share of self-allocated
//! bytes across the whole process. These are the first places to look when
//! hunting memory usage.

use crate::model::{Snapshot, TreeKey, WeightedNode};
use crate::output::pretty_print_bytes;
use log::debug;
use serde::Serialize;

/// Separator between scope names in a [`HotScope`] path
pub const SCOPE_PATH_SEPARATOR: &str = ";";

/// One scope ranked by its self-allocated bytes
///
/// **Public** - returned from calculate_hot_scopes
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HotScope {
    /// Tree the scope belongs to
    pub tree: TreeKey,

    /// Scope names from the root down, joined by `;`
    pub path: String,

    pub self_allocated: u64,

    /// Self weight, as a percentage of all allocated bytes in the process
    pub self_weight: f64,
}

/// Calculate the top scopes by self-allocated bytes
///
/// **Public** - main entry point for hot scope ranking
///
/// # Arguments
/// * `snapshot` - A consistent snapshot
/// * `top_n` - Number of scopes to return (e.g., 10)
///
/// # Returns
/// Scopes sorted by self-allocated bytes, descending. Ties keep tree and
/// depth-first order.
pub fn calculate_hot_scopes(snapshot: &Snapshot, top_n: usize) -> Vec<HotScope> {
    let mut scopes = Vec::new();
    for tree in snapshot.weighted_trees() {
        collect_scopes(tree.key(), tree.root(), String::new(), &mut scopes);
    }
    debug!(
        "Ranking top {} hot scopes out of {} scopes",
        top_n,
        scopes.len()
    );

    scopes.sort_by(|a, b| b.self_allocated.cmp(&a.self_allocated));
    scopes.truncate(top_n);
    scopes
}

/// **Private** - depth-first walk building scope paths
fn collect_scopes(tree: TreeKey, node: WeightedNode<'_>, prefix: String, out: &mut Vec<HotScope>) {
    let path = if prefix.is_empty() {
        node.name().to_string()
    } else {
        format!("{}{}{}", prefix, SCOPE_PATH_SEPARATOR, node.name())
    };

    out.push(HotScope {
        tree,
        path: path.clone(),
        self_allocated: node.self_allocated(),
        self_weight: node.weight().self_percent(),
    });

    for child in node.children() {
        collect_scopes(tree, child, path.clone(), out);
    }
}

/// Size and health counters of a snapshot
///
/// **Public** - returned from calculate_snapshot_stats
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SnapshotStats {
    pub pid: u64,

    /// Number of trees in the registry
    pub tree_count: usize,

    /// Trees produced by an aggregation rule
    pub aggregated_tree_count: usize,

    /// Scope nodes across all trees
    pub node_count: usize,

    /// Depth of the deepest tree
    pub max_levels: usize,

    pub total_allocated: u64,
    pub total_freed: u64,
    pub net_tracked: u64,

    /// Sum of nPushNodeFailures over all trees
    pub push_node_failures: u64,

    /// Sum of nFreeTrackingFailed over all trees
    pub free_tracking_failures: u64,

    pub vm_size_now_bytes: u64,
    pub vm_rss_now_bytes: u64,
}

/// Calculate the statistics of a snapshot
///
/// **Public** - also available as [`Snapshot::stats`]
pub fn calculate_snapshot_stats(snapshot: &Snapshot) -> SnapshotStats {
    let totals = snapshot.totals();
    let mut stats = SnapshotStats {
        pid: snapshot.pid(),
        total_allocated: totals.allocated,
        total_freed: totals.freed,
        net_tracked: totals.net_tracked,
        vm_size_now_bytes: snapshot.vm_size_now_bytes(),
        vm_rss_now_bytes: snapshot.vm_rss_now_bytes(),
        ..Default::default()
    };

    for tree in snapshot.trees() {
        stats.tree_count += 1;
        if tree.aggregated_by().is_some() {
            stats.aggregated_tree_count += 1;
        }
        stats.node_count += tree.num_nodes();
        stats.max_levels = stats.max_levels.max(tree.num_levels());
        stats.push_node_failures = stats
            .push_node_failures
            .saturating_add(tree.push_node_failures());
        stats.free_tracking_failures = stats
            .free_tracking_failures
            .saturating_add(tree.free_tracking_failures());
    }

    stats
}

impl SnapshotStats {
    /// Check whether malloc-tag lost track of any allocation or free
    ///
    /// **Public** - a snapshot with failures under-reports memory usage
    pub fn has_tracking_failures(&self) -> bool {
        self.push_node_failures > 0 || self.free_tracking_failures > 0
    }

    /// Get human-readable summary
    ///
    /// **Public** - for logging and the `stats` command
    pub fn summary(&self) -> String {
        format!(
            "PID {} | Trees: {} ({} aggregated) | Nodes: {} | Max depth: {} | Allocated: {} | Freed: {} | Net tracked: {}",
            self.pid,
            self.tree_count,
            self.aggregated_tree_count,
            self.node_count,
            self.max_levels,
            pretty_print_bytes(self.total_allocated),
            pretty_print_bytes(self.total_freed),
            pretty_print_bytes(self.net_tracked)
        )
    }
}
