//! Whole-process snapshot: the registry of per-thread trees.
//!
//! A [`Snapshot`] can only be obtained through [`Snapshot::load`] and only
//! mutated through [`Snapshot::aggregate_trees`] and the rule entry points.
//! Each of those ends by recomputing totals and weights over every tree, so
//! whatever a reader observes is consistent.

use super::tree::{ScopeTree, TreeKey};
use super::weights::{WeightTree, WeightedTree};
use crate::aggregator::metrics::{calculate_snapshot_stats, SnapshotStats};
use crate::aggregator::rules::{AggregationRule, RuleKind, ThreadNameMatcher};
use crate::parser::schema;
use crate::utils::config::TREE_PREFIX;
use crate::utils::error::{AggregateError, LoadError};
use log::{debug, info, warn};
use serde_json::{json, Map, Value};
use std::collections::btree_map::Entry;
use std::collections::BTreeMap;

/// Byte totals across all trees of a snapshot
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SnapshotTotals {
    /// Sum of the root totals of every tree; denominator of all weights
    pub allocated: u64,
    pub freed: u64,
    /// `allocated - freed`, clamped to 0
    pub net_tracked: u64,
}

/// Result of applying one rule
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AggregationOutcome {
    /// No tree matched; nothing changed
    NoMatch,
    /// Exactly one tree matched; nothing to merge
    SingleMatch(TreeKey),
    /// Trees `merged` were folded into the tree now keyed `survivor`
    Merged {
        survivor: TreeKey,
        merged: Vec<TreeKey>,
    },
}

/// A malloc-tag snapshot of a whole process
#[derive(Debug, Clone)]
pub struct Snapshot {
    pid: u64,
    tm_start_profiling: String,
    tm_current_snapshot: String,
    bytes_alloc_before_init: u64,
    bytes_malloc_tag_self_usage: u64,
    vm_size_now_bytes: u64,
    vm_rss_now_bytes: u64,
    trees: BTreeMap<TreeKey, ScopeTree>,
    /// Keys in the order the snapshot lists its trees; an aggregated tree
    /// takes the position of its survivor
    order: Vec<TreeKey>,
    weights: BTreeMap<TreeKey, WeightTree>,
    totals: SnapshotTotals,
}

impl Snapshot {
    /// Build a snapshot from the top-level JSON record
    ///
    /// **Public** - main entry point of the model
    ///
    /// # Errors
    /// * `LoadError::MissingField` - a process-level field is absent
    /// * `LoadError::DuplicateThread` - two trees report the same thread ID
    /// * any error from [`ScopeTree::load`]
    pub fn load(raw: &Value) -> Result<Self, LoadError> {
        let obj = schema::as_object(raw, "snapshot")?;
        let context = "snapshot";

        let mut trees = BTreeMap::new();
        let mut order = Vec::new();
        for (key, value) in obj {
            if !key.starts_with(TREE_PREFIX) {
                continue;
            }
            let tree = ScopeTree::load(value)?;
            match trees.entry(tree.key()) {
                Entry::Occupied(_) => return Err(LoadError::DuplicateThread(tree.tid())),
                Entry::Vacant(slot) => {
                    debug!(
                        "Loaded tree '{}' for TID {} with {} nodes",
                        tree.thread_name(),
                        tree.tid(),
                        tree.num_nodes()
                    );
                    order.push(tree.key());
                    slot.insert(tree);
                }
            }
        }

        let mut snapshot = Self {
            pid: schema::required_u64(obj, schema::PID, context)?,
            tm_start_profiling: schema::required_text(obj, schema::TM_START_PROFILING, context)?,
            tm_current_snapshot: schema::required_text(obj, schema::TM_CURRENT_SNAPSHOT, context)?,
            bytes_alloc_before_init: schema::required_u64(
                obj,
                schema::N_BYTES_ALLOC_BEFORE_INIT,
                context,
            )?,
            bytes_malloc_tag_self_usage: schema::required_u64(
                obj,
                schema::N_BYTES_MALLOC_TAG_SELF_USAGE,
                context,
            )?,
            vm_size_now_bytes: schema::required_u64(obj, schema::VM_SIZE_NOW_BYTES, context)?,
            vm_rss_now_bytes: schema::required_u64(obj, schema::VM_RSS_NOW_BYTES, context)?,
            trees,
            order,
            weights: BTreeMap::new(),
            totals: SnapshotTotals::default(),
        };
        snapshot.recompute_all();

        Ok(snapshot)
    }

    /// Merge the tree `key_b` into the tree `key_a` and drop `key_b`
    ///
    /// The surviving tree is re-keyed after `rule`; its new key is returned.
    /// Totals and weights of the whole snapshot are recomputed before
    /// returning. On error the snapshot is left untouched.
    ///
    /// # Errors
    /// * `AggregateError::TreeNotFound` - either key is not registered
    /// * `AggregateError::SameTree` - both keys are the same
    /// * `AggregateError::KeyCollision` - a third tree already uses the rule's key
    pub fn aggregate_trees(
        &mut self,
        key_a: TreeKey,
        key_b: TreeKey,
        rule: &AggregationRule,
    ) -> Result<TreeKey, AggregateError> {
        if key_a == key_b {
            return Err(AggregateError::SameTree(key_a));
        }
        for key in [key_a, key_b] {
            if !self.trees.contains_key(&key) {
                return Err(AggregateError::TreeNotFound(key));
            }
        }
        let new_key = TreeKey::Aggregate(rule.index());
        if new_key != key_a && new_key != key_b && self.trees.contains_key(&new_key) {
            return Err(AggregateError::KeyCollision(new_key));
        }

        let donor = self
            .trees
            .remove(&key_b)
            .ok_or(AggregateError::TreeNotFound(key_b))?;
        let mut survivor = self
            .trees
            .remove(&key_a)
            .ok_or(AggregateError::TreeNotFound(key_a))?;

        debug!(
            "{} Aggregating tree {} ('{}') into tree {} ('{}')",
            rule.log_prefix(),
            key_b,
            donor.thread_name(),
            key_a,
            survivor.thread_name()
        );
        survivor.aggregate(donor, rule);
        self.order.retain(|key| *key != key_b);
        for key in self.order.iter_mut().filter(|key| **key == key_a) {
            *key = new_key;
        }
        self.trees.insert(survivor.key(), survivor);

        self.recompute_all();
        Ok(new_key)
    }

    /// Restore consistency after any change to trees or counters
    ///
    /// First pass: bottom-up totals of every tree, summed into the grand
    /// totals. Second pass: weights of every node against the grand total.
    fn recompute_all(&mut self) {
        let mut allocated = 0u64;
        let mut freed = 0u64;
        for tree in self.trees.values_mut() {
            let (a, f) = tree.collect_allocated_and_freed();
            allocated = allocated.saturating_add(a);
            freed = freed.saturating_add(f);
        }

        self.weights = self
            .trees
            .iter()
            .map(|(key, tree)| (*key, tree.compute_weights_recursively(allocated)))
            .collect();

        self.totals = SnapshotTotals {
            allocated,
            freed,
            net_tracked: allocated.saturating_sub(freed),
        };
    }

    /// Apply one post-processing rule
    ///
    /// Zero or one matching tree is a logged no-op. Otherwise every match is
    /// folded, left to right, into the first match.
    pub fn apply_aggregation_rule(&mut self, rule: &AggregationRule) -> AggregationOutcome {
        match rule.kind() {
            RuleKind::AggregateTrees(matcher) => self.aggregate_matching_trees(rule, matcher),
        }
    }

    /// Apply rules in order
    pub fn apply_rules(&mut self, rules: &[AggregationRule]) -> Vec<AggregationOutcome> {
        rules
            .iter()
            .map(|rule| self.apply_aggregation_rule(rule))
            .collect()
    }

    fn aggregate_matching_trees(
        &mut self,
        rule: &AggregationRule,
        matcher: &ThreadNameMatcher,
    ) -> AggregationOutcome {
        let prefix = rule.log_prefix();
        let matching: Vec<TreeKey> = self
            .trees()
            .filter(|tree| matcher.is_match(tree.thread_name()))
            .map(|tree| tree.key())
            .collect();

        info!(
            "{} Found trees matching the prefix [{}] with keys: [{}]",
            prefix,
            matcher.as_str(),
            matching
                .iter()
                .map(|k| k.to_string())
                .collect::<Vec<_>>()
                .join(", ")
        );

        match matching.as_slice() {
            [] => {
                info!(
                    "{} Could not find any tree matching the prefix [{}]",
                    prefix,
                    matcher.as_str()
                );
                AggregationOutcome::NoMatch
            }
            [only] => {
                info!(
                    "{} Found only 1 tree matching the prefix [{}]. Nothing to aggregate.",
                    prefix,
                    matcher.as_str()
                );
                AggregationOutcome::SingleMatch(*only)
            }
            [first, rest @ ..] => {
                let mut survivor = *first;
                let mut merged = Vec::with_capacity(rest.len());
                for donor in rest {
                    match self.aggregate_trees(survivor, *donor, rule) {
                        Ok(key) => {
                            survivor = key;
                            merged.push(*donor);
                        }
                        Err(e) => warn!("{} Skipping tree {}: {}", prefix, donor, e),
                    }
                }
                info!("{} Aggregation completed.", prefix);
                AggregationOutcome::Merged { survivor, merged }
            }
        }
    }

    /// Serialize the snapshot, weights rounded to 2 decimals
    pub fn to_record(&self) -> Value {
        let mut record = Map::new();
        record.insert(schema::PID.into(), json!(self.pid));
        record.insert(schema::TM_START_PROFILING.into(), json!(self.tm_start_profiling));
        record.insert(schema::TM_CURRENT_SNAPSHOT.into(), json!(self.tm_current_snapshot));

        for tree in self.weighted_trees() {
            record.insert(tree.record_key(), tree.to_record());
        }

        record.insert(
            schema::N_BYTES_ALLOC_BEFORE_INIT.into(),
            json!(self.bytes_alloc_before_init),
        );
        record.insert(
            schema::N_BYTES_MALLOC_TAG_SELF_USAGE.into(),
            json!(self.bytes_malloc_tag_self_usage),
        );
        record.insert(schema::VM_SIZE_NOW_BYTES.into(), json!(self.vm_size_now_bytes));
        record.insert(schema::VM_RSS_NOW_BYTES.into(), json!(self.vm_rss_now_bytes));
        record.insert(schema::N_TOTAL_ALLOCATED_BYTES.into(), json!(self.totals.allocated));
        record.insert(schema::N_TOTAL_FREED_BYTES.into(), json!(self.totals.freed));
        record.insert(schema::N_TOTAL_TRACKED_BYTES.into(), json!(self.totals.net_tracked));

        Value::Object(record)
    }

    /// Tree, node and failure counts for reporting
    pub fn stats(&self) -> SnapshotStats {
        calculate_snapshot_stats(self)
    }

    pub fn pid(&self) -> u64 {
        self.pid
    }

    pub fn tm_start_profiling(&self) -> &str {
        &self.tm_start_profiling
    }

    pub fn tm_current_snapshot(&self) -> &str {
        &self.tm_current_snapshot
    }

    pub fn bytes_alloc_before_init(&self) -> u64 {
        self.bytes_alloc_before_init
    }

    pub fn bytes_malloc_tag_self_usage(&self) -> u64 {
        self.bytes_malloc_tag_self_usage
    }

    pub fn vm_size_now_bytes(&self) -> u64 {
        self.vm_size_now_bytes
    }

    pub fn vm_rss_now_bytes(&self) -> u64 {
        self.vm_rss_now_bytes
    }

    pub fn totals(&self) -> SnapshotTotals {
        self.totals
    }

    pub fn net_tracked_bytes(&self) -> u64 {
        self.totals.net_tracked
    }

    pub fn len(&self) -> usize {
        self.trees.len()
    }

    pub fn is_empty(&self) -> bool {
        self.trees.is_empty()
    }

    /// Tree keys in snapshot order
    pub fn keys(&self) -> impl Iterator<Item = TreeKey> + '_ {
        self.order.iter().copied()
    }

    pub fn tree(&self, key: TreeKey) -> Option<&ScopeTree> {
        self.trees.get(&key)
    }

    /// Trees in snapshot order
    pub fn trees(&self) -> impl Iterator<Item = &ScopeTree> + '_ {
        self.order.iter().filter_map(move |key| self.trees.get(key))
    }

    /// Look up the tree whose thread name is exactly `name`
    pub fn tree_by_name(&self, name: &str) -> Option<&ScopeTree> {
        self.trees().find(|t| t.thread_name() == name)
    }

    pub fn weighted_tree(&self, key: TreeKey) -> Option<WeightedTree<'_>> {
        let tree = self.trees.get(&key)?;
        let weights = self.weights.get(&key)?;
        Some(WeightedTree::new(tree, weights))
    }

    /// Every tree paired with its current weights, in snapshot order
    pub fn weighted_trees(&self) -> impl Iterator<Item = WeightedTree<'_>> + '_ {
        self.order.iter().filter_map(move |key| self.weighted_tree(*key))
    }
}
