//! In-memory model of a malloc-tag snapshot.
//!
//! A [`Snapshot`] owns one [`ScopeTree`] per thread, each owning a hierarchy
//! of [`ScopeNode`]s. Weights are derived data kept beside the trees and read
//! through [`WeightedTree`] / [`WeightedNode`].

pub mod node;
pub mod snapshot;
pub mod tree;
pub mod weights;

pub use node::{AllocCounters, ScopeNode};
pub use snapshot::{AggregationOutcome, Snapshot, SnapshotTotals};
pub use tree::{ScopeTree, TreeKey};
pub use weights::{round_weight, Weight, WeightTree, WeightedNode, WeightedTree};
