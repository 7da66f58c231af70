//! Per-thread scope tree.

use super::node::ScopeNode;
use super::weights::WeightTree;
use crate::aggregator::rules::AggregationRule;
use crate::parser::schema;
use crate::utils::config::{SCOPE_PREFIX, THREAD_NAME_SEPARATOR, TREE_OUTPUT_PREFIX};
use crate::utils::error::LoadError;
use log::warn;
use serde::{Serialize, Serializer};
use serde_json::{json, Map, Value};
use std::fmt;

/// Registry key of a tree inside a [`Snapshot`](super::snapshot::Snapshot)
///
/// Loaded trees are keyed by their thread ID. A tree produced by an
/// aggregation rule no longer belongs to one thread and is keyed by the
/// index of that rule instead.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum TreeKey {
    Thread(u64),
    Aggregate(usize),
}

impl fmt::Display for TreeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TreeKey::Thread(tid) => write!(f, "TID{}", tid),
            TreeKey::Aggregate(rule) => write!(f, "rule{}", rule),
        }
    }
}

impl Serialize for TreeKey {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// The scope tree captured for one thread, plus its thread-level metadata
#[derive(Debug, Clone, PartialEq)]
pub struct ScopeTree {
    key: TreeKey,
    tid: u64,
    thread_name: String,
    push_node_failures: u64,
    free_tracking_failures: u64,
    max_tree_nodes: u64,
    vm_size_at_creation: u64,
    aggregated_by: Option<String>,
    root: ScopeNode,
}

impl ScopeTree {
    /// Build a tree from a `tree_for_*` record
    ///
    /// **Public** - used by [`Snapshot::load`](super::snapshot::Snapshot::load)
    ///
    /// Non-zero tracking failure counters are logged as warnings; the tree is
    /// still loaded.
    ///
    /// # Errors
    /// * `LoadError::MissingField` - a thread-level field is absent
    /// * `LoadError::MissingRootScope` / `LoadError::MultipleRootScopes` - not exactly one `scope_*` key
    /// * any error from [`ScopeNode::load`]
    pub fn load(raw: &Value) -> Result<Self, LoadError> {
        let obj = schema::as_object(raw, "thread tree")?;

        let tid = schema::required_u64(obj, schema::TID, "thread tree")?;
        let context = format!("tree for TID {}", tid);
        let thread_name = schema::required_text(obj, schema::THREAD_NAME, &context)?;
        let push_node_failures = schema::required_u64(obj, schema::N_PUSH_NODE_FAILURES, &context)?;
        let free_tracking_failures =
            schema::required_u64(obj, schema::N_FREE_TRACKING_FAILED, &context)?;
        let max_tree_nodes = schema::required_u64(obj, schema::N_MAX_TREE_NODES, &context)?;
        let vm_size_at_creation = schema::required_u64(obj, schema::N_VM_SIZE_AT_CREATION, &context)?;
        let aggregated_by = obj
            .get(schema::AGGREGATED_BY_RULE)
            .and_then(Value::as_str)
            .map(str::to_string);

        if push_node_failures > 0 {
            warn!(
                "Found {} malloc-tag failures in pushing new nodes inside the tree '{}'",
                push_node_failures, thread_name
            );
        }
        if free_tracking_failures > 0 {
            warn!(
                "Found {} malloc-tag failures in tracking frees inside the tree '{}'",
                free_tracking_failures, thread_name
            );
        }

        let mut root: Option<ScopeNode> = None;
        for (key, value) in obj {
            let Some(scope_name) = key.strip_prefix(SCOPE_PREFIX) else {
                continue;
            };
            if root.is_some() {
                return Err(LoadError::MultipleRootScopes(thread_name));
            }
            root = Some(ScopeNode::load(value, scope_name, 1, tid)?);
        }
        let root = root.ok_or_else(|| LoadError::MissingRootScope(thread_name.clone()))?;

        Ok(Self {
            key: TreeKey::Thread(tid),
            tid,
            thread_name,
            push_node_failures,
            free_tracking_failures,
            max_tree_nodes,
            vm_size_at_creation,
            aggregated_by,
            root,
        })
    }

    /// Serialize the tree with the given weights
    pub fn to_record(&self, weights: &WeightTree) -> Value {
        let mut record = Map::new();
        record.insert(schema::TID.into(), json!(self.tid));
        record.insert(schema::THREAD_NAME.into(), json!(self.thread_name));
        record.insert(schema::N_TREE_LEVELS.into(), json!(self.num_levels()));
        record.insert(schema::N_TREE_NODES_IN_USE.into(), json!(self.num_nodes()));
        record.insert(schema::N_MAX_TREE_NODES.into(), json!(self.max_tree_nodes));
        record.insert(schema::N_PUSH_NODE_FAILURES.into(), json!(self.push_node_failures));
        record.insert(
            schema::N_FREE_TRACKING_FAILED.into(),
            json!(self.free_tracking_failures),
        );
        record.insert(schema::N_VM_SIZE_AT_CREATION.into(), json!(self.vm_size_at_creation));
        if let Some(rule) = &self.aggregated_by {
            record.insert(schema::AGGREGATED_BY_RULE.into(), json!(rule));
        }
        record.insert(
            format!("{}{}", SCOPE_PREFIX, self.root.name()),
            self.root.to_record(weights),
        );
        Value::Object(record)
    }

    /// Key under which this tree is written in a snapshot record
    pub fn record_key(&self) -> String {
        format!("{}{}", TREE_OUTPUT_PREFIX, self.tid)
    }

    /// Merge `other` into this tree on behalf of `rule`
    ///
    /// Failure counters are summed; node capacity and VM size are high-water
    /// marks so the maximum is kept. The tree is re-keyed after the rule and
    /// its root scope takes the rule's name.
    pub fn aggregate(&mut self, other: ScopeTree, rule: &AggregationRule) {
        self.key = TreeKey::Aggregate(rule.index());
        self.root.rename(rule.name());

        self.push_node_failures = self.push_node_failures.saturating_add(other.push_node_failures);
        self.free_tracking_failures = self
            .free_tracking_failures
            .saturating_add(other.free_tracking_failures);
        self.max_tree_nodes = self.max_tree_nodes.max(other.max_tree_nodes);
        self.vm_size_at_creation = self.vm_size_at_creation.max(other.vm_size_at_creation);

        self.thread_name.push_str(THREAD_NAME_SEPARATOR);
        self.thread_name.push_str(&other.thread_name);
        self.aggregated_by = Some(rule.name().to_string());

        self.root.aggregate(other.root);
    }

    pub fn collect_allocated_and_freed(&mut self) -> (u64, u64) {
        self.root.collect_allocated_and_freed()
    }

    pub fn compute_weights_recursively(&self, grand_total_allocated: u64) -> WeightTree {
        self.root.compute_weights_recursively(grand_total_allocated)
    }

    pub fn net_tracked_bytes(&self) -> u64 {
        self.root.net_tracked_bytes()
    }

    pub fn num_levels(&self) -> usize {
        self.root.num_levels()
    }

    pub fn num_nodes(&self) -> usize {
        self.root.num_nodes()
    }

    pub fn key(&self) -> TreeKey {
        self.key
    }

    /// Thread ID of the captured thread, or of the surviving tree after aggregation
    pub fn tid(&self) -> u64 {
        self.tid
    }

    pub fn thread_name(&self) -> &str {
        &self.thread_name
    }

    pub fn push_node_failures(&self) -> u64 {
        self.push_node_failures
    }

    pub fn free_tracking_failures(&self) -> u64 {
        self.free_tracking_failures
    }

    pub fn max_tree_nodes(&self) -> u64 {
        self.max_tree_nodes
    }

    pub fn vm_size_at_creation(&self) -> u64 {
        self.vm_size_at_creation
    }

    /// Name of the rule that produced this tree, if any
    pub fn aggregated_by(&self) -> Option<&str> {
        self.aggregated_by.as_deref()
    }

    pub fn root(&self) -> &ScopeNode {
        &self.root
    }
}
