//! A single node of a per-thread call-scope tree.
//!
//! Each node holds the allocation counters attributed to one scope and owns
//! the nodes of the scopes nested inside it.

use super::weights::{Weight, WeightTree};
use crate::parser::schema;
use crate::utils::config::SCOPE_PREFIX;
use crate::utils::error::LoadError;
use serde_json::{json, Map, Value};

/// Raw allocation counters of one scope
///
/// **Public** - all fields are summable, see [`AllocCounters::accumulate`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AllocCounters {
    /// Self bytes plus the total bytes of every nested scope
    pub bytes_total_allocated: u64,
    pub bytes_total_freed: u64,

    /// Bytes attributed directly to this scope
    pub bytes_self_allocated: u64,
    pub bytes_self_freed: u64,

    /// Number of times the scope was entered and exited
    pub times_entered_and_exited: u64,

    pub calls_to_malloc: u64,
    pub calls_to_realloc: u64,
    pub calls_to_calloc: u64,
    pub calls_to_free: u64,
}

impl AllocCounters {
    /// Add every counter of `other` to `self`, saturating at `u64::MAX`
    pub fn accumulate(&mut self, other: &AllocCounters) {
        self.bytes_total_allocated = self
            .bytes_total_allocated
            .saturating_add(other.bytes_total_allocated);
        self.bytes_total_freed = self.bytes_total_freed.saturating_add(other.bytes_total_freed);
        self.bytes_self_allocated = self
            .bytes_self_allocated
            .saturating_add(other.bytes_self_allocated);
        self.bytes_self_freed = self.bytes_self_freed.saturating_add(other.bytes_self_freed);
        self.times_entered_and_exited = self
            .times_entered_and_exited
            .saturating_add(other.times_entered_and_exited);
        self.calls_to_malloc = self.calls_to_malloc.saturating_add(other.calls_to_malloc);
        self.calls_to_realloc = self.calls_to_realloc.saturating_add(other.calls_to_realloc);
        self.calls_to_calloc = self.calls_to_calloc.saturating_add(other.calls_to_calloc);
        self.calls_to_free = self.calls_to_free.saturating_add(other.calls_to_free);
    }

    fn load(obj: &Map<String, Value>, context: &str) -> Result<Self, LoadError> {
        Ok(Self {
            bytes_total_allocated: schema::required_u64(obj, schema::N_BYTES_TOTAL_ALLOCATED, context)?,
            bytes_total_freed: schema::optional_u64(obj, schema::N_BYTES_TOTAL_FREED, context)?
                .unwrap_or(0),
            bytes_self_allocated: schema::required_u64(obj, schema::N_BYTES_SELF_ALLOCATED, context)?,
            bytes_self_freed: schema::required_u64(obj, schema::N_BYTES_SELF_FREED, context)?,
            times_entered_and_exited: schema::required_u64(
                obj,
                schema::N_TIMES_ENTERED_AND_EXITED,
                context,
            )?,
            calls_to_malloc: schema::required_u64(obj, schema::N_CALLS_TO_MALLOC, context)?,
            calls_to_realloc: schema::required_u64(obj, schema::N_CALLS_TO_REALLOC, context)?,
            calls_to_calloc: schema::required_u64(obj, schema::N_CALLS_TO_CALLOC, context)?,
            calls_to_free: schema::required_u64(obj, schema::N_CALLS_TO_FREE, context)?,
        })
    }
}

/// One scope of a call-scope tree
#[derive(Debug, Clone, PartialEq)]
pub struct ScopeNode {
    name: String,
    level: u32,
    owner_tid: u64,
    counters: AllocCounters,
    children: Vec<ScopeNode>,
}

impl ScopeNode {
    /// Create a childless node
    pub fn new(name: impl Into<String>, level: u32, owner_tid: u64, counters: AllocCounters) -> Self {
        Self {
            name: name.into(),
            level,
            owner_tid,
            counters,
            children: Vec::new(),
        }
    }

    /// Build a node and all of its nested scopes from a snapshot record
    ///
    /// **Public** - used by [`ScopeTree::load`](super::tree::ScopeTree::load)
    ///
    /// # Errors
    /// * `LoadError::MissingField` / `LoadError::InvalidCounter` - a counter is absent or malformed
    /// * `LoadError::InvalidFormat` - a nested key lacks the `scope_` prefix
    /// * `LoadError::DuplicateScope` - two nested scopes share a name
    pub fn load(raw: &Value, name: &str, level: u32, owner_tid: u64) -> Result<Self, LoadError> {
        let context = format!("scope '{}'", name);
        let obj = schema::as_object(raw, &context)?;

        let counters = AllocCounters::load(obj, &context)?;
        let mut node = Self::new(name, level, owner_tid, counters);

        if let Some(nested) = obj.get(schema::NESTED_SCOPES) {
            let nested = schema::as_object(nested, &format!("nested scopes of '{}'", name))?;
            for (key, child_raw) in nested {
                let child_name = key.strip_prefix(SCOPE_PREFIX).ok_or_else(|| {
                    LoadError::InvalidFormat(format!(
                        "nested key '{}' below scope '{}' does not start with '{}'",
                        key, name, SCOPE_PREFIX
                    ))
                })?;
                let child = ScopeNode::load(child_raw, child_name, level + 1, owner_tid)?;
                node.add_child(child)?;
            }
        }

        Ok(node)
    }

    /// Attach a nested scope
    ///
    /// # Errors
    /// * `LoadError::DuplicateScope` - a child with the same name already exists
    pub fn add_child(&mut self, child: ScopeNode) -> Result<(), LoadError> {
        if self.child(&child.name).is_some() {
            return Err(LoadError::DuplicateScope {
                parent: self.name.clone(),
                name: child.name,
            });
        }
        self.children.push(child);
        Ok(())
    }

    /// Serialize this node and its nested scopes
    ///
    /// Weights are rounded here, at the output boundary, and nowhere else.
    pub fn to_record(&self, weights: &WeightTree) -> Value {
        let weight = weights.weight();
        let c = &self.counters;

        let mut nested = Map::new();
        for (child, child_weights) in self.children.iter().zip(weights.children()) {
            nested.insert(
                format!("{}{}", SCOPE_PREFIX, child.name),
                child.to_record(child_weights),
            );
        }

        let mut record = Map::new();
        record.insert(schema::N_BYTES_TOTAL_ALLOCATED.into(), json!(c.bytes_total_allocated));
        record.insert(schema::N_BYTES_TOTAL_FREED.into(), json!(c.bytes_total_freed));
        record.insert(schema::N_BYTES_SELF_ALLOCATED.into(), json!(c.bytes_self_allocated));
        record.insert(schema::N_BYTES_SELF_FREED.into(), json!(c.bytes_self_freed));
        record.insert(
            schema::N_TIMES_ENTERED_AND_EXITED.into(),
            json!(c.times_entered_and_exited),
        );
        record.insert(schema::N_WEIGHT_PERCENTAGE.into(), json!(weight.rounded_total_percent()));
        record.insert(
            schema::N_SELF_WEIGHT_PERCENTAGE.into(),
            json!(weight.rounded_self_percent()),
        );
        record.insert(schema::N_CALLS_TO_MALLOC.into(), json!(c.calls_to_malloc));
        record.insert(schema::N_CALLS_TO_REALLOC.into(), json!(c.calls_to_realloc));
        record.insert(schema::N_CALLS_TO_CALLOC.into(), json!(c.calls_to_calloc));
        record.insert(schema::N_CALLS_TO_FREE.into(), json!(c.calls_to_free));
        record.insert(schema::NESTED_SCOPES.into(), Value::Object(nested));

        Value::Object(record)
    }

    /// Merge `other` into this node
    ///
    /// Counters are summed. Children present on both sides are merged
    /// recursively; children only present in `other` are moved in as they are.
    /// Totals and weights are stale afterwards until the next recomputation.
    pub fn aggregate(&mut self, other: ScopeNode) {
        self.counters.accumulate(&other.counters);

        for donor_child in other.children {
            match self.children.iter_mut().find(|c| c.name == donor_child.name) {
                Some(existing) => existing.aggregate(donor_child),
                None => self.children.push(donor_child),
            }
        }
    }

    /// Post-order pass recomputing total allocated/freed bytes
    ///
    /// Returns the `(allocated, freed)` totals of this node after writing them.
    pub fn collect_allocated_and_freed(&mut self) -> (u64, u64) {
        let mut allocated = 0u64;
        let mut freed = 0u64;
        for child in &mut self.children {
            let (a, f) = child.collect_allocated_and_freed();
            allocated = allocated.saturating_add(a);
            freed = freed.saturating_add(f);
        }

        self.counters.bytes_total_allocated =
            allocated.saturating_add(self.counters.bytes_self_allocated);
        self.counters.bytes_total_freed = freed.saturating_add(self.counters.bytes_self_freed);

        (self.counters.bytes_total_allocated, self.counters.bytes_total_freed)
    }

    /// Compute weights of this subtree against the process-wide total
    ///
    /// The denominator is the same for every node: a weight is a share of
    /// the whole process, not of the parent.
    pub fn compute_weights_recursively(&self, grand_total_allocated: u64) -> WeightTree {
        let weight = Weight::of(
            self.counters.bytes_total_allocated,
            self.counters.bytes_self_allocated,
            grand_total_allocated,
        );
        let children = self
            .children
            .iter()
            .map(|c| c.compute_weights_recursively(grand_total_allocated))
            .collect();
        WeightTree::new(weight, children)
    }

    /// Allocated minus freed total bytes, clamped to zero
    ///
    /// Only meaningful after [`collect_allocated_and_freed`](Self::collect_allocated_and_freed).
    /// Reallocations are not fully tracked by malloc-tag, so freed bytes can
    /// exceed allocated bytes; that case reports 0.
    pub fn net_tracked_bytes(&self) -> u64 {
        self.counters
            .bytes_total_allocated
            .saturating_sub(self.counters.bytes_total_freed)
    }

    /// Self allocated bytes per visit, 0 for a never-visited scope
    pub fn average_self_bytes_per_visit(&self) -> u64 {
        match self.counters.times_entered_and_exited {
            0 => 0,
            visits => self.counters.bytes_self_allocated / visits,
        }
    }

    /// Depth of this subtree, 1 for a leaf
    pub fn num_levels(&self) -> usize {
        1 + self.children.iter().map(|c| c.num_levels()).max().unwrap_or(0)
    }

    /// Number of nodes in this subtree, including this one
    pub fn num_nodes(&self) -> usize {
        1 + self.children.iter().map(|c| c.num_nodes()).sum::<usize>()
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub(crate) fn rename(&mut self, name: impl Into<String>) {
        self.name = name.into();
    }

    pub fn level(&self) -> u32 {
        self.level
    }

    pub fn owner_tid(&self) -> u64 {
        self.owner_tid
    }

    pub fn counters(&self) -> &AllocCounters {
        &self.counters
    }

    pub fn children(&self) -> &[ScopeNode] {
        &self.children
    }

    pub fn child(&self, name: &str) -> Option<&ScopeNode> {
        self.children.iter().find(|c| c.name == name)
    }

    pub fn total_allocated(&self) -> u64 {
        self.counters.bytes_total_allocated
    }

    pub fn total_freed(&self) -> u64 {
        self.counters.bytes_total_freed
    }

    pub fn self_allocated(&self) -> u64 {
        self.counters.bytes_self_allocated
    }

    pub fn self_freed(&self) -> u64 {
        self.counters.bytes_self_freed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn leaf_record(self_alloc: u64, self_freed: u64, visits: u64) -> Value {
        json!({
            "nBytesTotalAllocated": self_alloc,
            "nBytesSelfAllocated": self_alloc,
            "nBytesSelfFreed": self_freed,
            "nTimesEnteredAndExited": visits,
            "nCallsTo_malloc": 1,
            "nCallsTo_realloc": 0,
            "nCallsTo_calloc": 0,
            "nCallsTo_free": 1,
            "nestedScopes": {}
        })
    }

    fn counters(self_alloc: u64, self_freed: u64) -> AllocCounters {
        AllocCounters {
            bytes_self_allocated: self_alloc,
            bytes_self_freed: self_freed,
            ..Default::default()
        }
    }

    #[test]
    fn test_load_nested() {
        let raw = json!({
            "nBytesTotalAllocated": 999,
            "nBytesSelfAllocated": 10,
            "nBytesSelfFreed": 5,
            "nTimesEnteredAndExited": 2,
            "nCallsTo_malloc": 3,
            "nCallsTo_realloc": 1,
            "nCallsTo_calloc": 0,
            "nCallsTo_free": 2,
            "nestedScopes": {
                "scope_b": leaf_record(40, 0, 4),
                "scope_a": leaf_record(50, 50, 0)
            }
        });

        let node = ScopeNode::load(&raw, "main", 1, 42).unwrap();
        assert_eq!(node.name(), "main");
        assert_eq!(node.level(), 1);
        assert_eq!(node.counters().bytes_total_allocated, 999);
        assert_eq!(node.children().len(), 2);

        // insertion order is kept
        assert_eq!(node.children()[0].name(), "b");
        assert_eq!(node.children()[1].name(), "a");
        assert_eq!(node.children()[0].level(), 2);
        assert_eq!(node.children()[0].owner_tid(), 42);
    }

    #[test]
    fn test_load_missing_counter() {
        let mut raw = leaf_record(1, 1, 1);
        raw.as_object_mut().unwrap().remove("nCallsTo_calloc");

        let err = ScopeNode::load(&raw, "x", 1, 1).unwrap_err();
        assert!(matches!(err, LoadError::MissingField { ref field, .. } if field == "nCallsTo_calloc"));
    }

    #[test]
    fn test_load_bad_nested_key() {
        let mut raw = leaf_record(1, 1, 1);
        raw["nestedScopes"] = json!({ "notascope": leaf_record(1, 1, 1) });

        let err = ScopeNode::load(&raw, "x", 1, 1).unwrap_err();
        assert!(matches!(err, LoadError::InvalidFormat(_)));
    }

    #[test]
    fn test_add_child_duplicate() {
        let mut node = ScopeNode::new("root", 1, 1, AllocCounters::default());
        node.add_child(ScopeNode::new("a", 2, 1, AllocCounters::default()))
            .unwrap();

        let err = node
            .add_child(ScopeNode::new("a", 2, 1, AllocCounters::default()))
            .unwrap_err();
        assert!(matches!(err, LoadError::DuplicateScope { .. }));
        assert_eq!(node.children().len(), 1);
    }

    #[test]
    fn test_collect_allocated_and_freed() {
        let mut root = ScopeNode::new("root", 1, 1, counters(10, 1));
        let mut mid = ScopeNode::new("mid", 2, 1, counters(20, 2));
        mid.add_child(ScopeNode::new("leaf", 3, 1, counters(30, 3)))
            .unwrap();
        root.add_child(mid).unwrap();
        root.add_child(ScopeNode::new("other", 2, 1, counters(40, 4)))
            .unwrap();

        assert_eq!(root.collect_allocated_and_freed(), (100, 10));
        assert_eq!(root.child("mid").unwrap().total_allocated(), 50);
        assert_eq!(root.child("mid").unwrap().total_freed(), 5);
        assert_eq!(root.child("other").unwrap().total_allocated(), 40);
    }

    #[test]
    fn test_aggregate_moves_unknown_children_and_merges_known() {
        let mut a = ScopeNode::new("root", 1, 1, counters(1, 0));
        a.add_child(ScopeNode::new("shared", 2, 1, counters(10, 0)))
            .unwrap();

        let mut b = ScopeNode::new("root", 1, 2, counters(2, 0));
        b.add_child(ScopeNode::new("shared", 2, 2, counters(5, 0)))
            .unwrap();
        b.add_child(ScopeNode::new("only_b", 2, 2, counters(7, 0)))
            .unwrap();

        a.aggregate(b);

        assert_eq!(a.self_allocated(), 3);
        assert_eq!(a.children().len(), 2);
        assert_eq!(a.child("shared").unwrap().self_allocated(), 15);
        assert_eq!(a.child("only_b").unwrap().self_allocated(), 7);
        assert_eq!(a.child("only_b").unwrap().owner_tid(), 2);
    }

    #[test]
    fn test_weights_use_global_denominator() {
        let mut root = ScopeNode::new("root", 1, 1, counters(50, 0));
        root.add_child(ScopeNode::new("child", 2, 1, counters(50, 0)))
            .unwrap();
        root.collect_allocated_and_freed();

        let weights = root.compute_weights_recursively(200);
        assert_eq!(weights.weight().total_percent(), 50.0);
        assert_eq!(weights.weight().self_percent(), 25.0);
        assert_eq!(weights.children()[0].weight().total_percent(), 25.0);
    }

    #[test]
    fn test_weights_zero_grand_total() {
        let mut root = ScopeNode::new("root", 1, 1, counters(0, 0));
        root.add_child(ScopeNode::new("child", 2, 1, counters(0, 0)))
            .unwrap();

        let weights = root.compute_weights_recursively(0);
        assert_eq!(weights.weight(), Weight::ZERO);
        assert_eq!(weights.children()[0].weight(), Weight::ZERO);
    }

    #[test]
    fn test_net_tracked_bytes_clamped() {
        // freed > allocated happens with realloc-heavy code
        let mut node = ScopeNode::new("realloc_heavy", 1, 1, counters(100, 250));
        node.collect_allocated_and_freed();
        assert_eq!(node.net_tracked_bytes(), 0);

        let mut node = ScopeNode::new("normal", 1, 1, counters(100, 30));
        node.collect_allocated_and_freed();
        assert_eq!(node.net_tracked_bytes(), 70);
    }

    #[test]
    fn test_average_self_bytes_per_visit() {
        let node = ScopeNode::load(&leaf_record(100, 0, 0), "never", 1, 1).unwrap();
        assert_eq!(node.average_self_bytes_per_visit(), 0);

        let node = ScopeNode::load(&leaf_record(100, 0, 3), "thrice", 1, 1).unwrap();
        assert_eq!(node.average_self_bytes_per_visit(), 33);
    }

    #[test]
    fn test_num_levels_and_nodes() {
        let mut root = ScopeNode::new("root", 1, 1, AllocCounters::default());
        let mut mid = ScopeNode::new("mid", 2, 1, AllocCounters::default());
        mid.add_child(ScopeNode::new("leaf", 3, 1, AllocCounters::default()))
            .unwrap();
        root.add_child(mid).unwrap();
        root.add_child(ScopeNode::new("other", 2, 1, AllocCounters::default()))
            .unwrap();

        assert_eq!(root.num_levels(), 3);
        assert_eq!(root.num_nodes(), 4);
    }

    #[test]
    fn test_to_record_round_trip() {
        let raw = json!({
            "nBytesTotalAllocated": 30,
            "nBytesSelfAllocated": 10,
            "nBytesSelfFreed": 5,
            "nTimesEnteredAndExited": 2,
            "nCallsTo_malloc": 3,
            "nCallsTo_realloc": 1,
            "nCallsTo_calloc": 4,
            "nCallsTo_free": 2,
            "nestedScopes": { "scope_child": leaf_record(20, 0, 1) }
        });

        let mut node = ScopeNode::load(&raw, "root", 1, 7).unwrap();
        node.collect_allocated_and_freed();
        let weights = node.compute_weights_recursively(90);

        let record = node.to_record(&weights);
        assert_eq!(record["nWeightPercentage"], json!(33.33));
        assert_eq!(record["nSelfWeightPercentage"], json!(11.11));

        let reloaded = ScopeNode::load(&record, "root", 1, 7).unwrap();
        assert_eq!(reloaded, node);
    }
}
