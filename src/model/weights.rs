//! Derived weight view over scope trees.
//!
//! Weights never live on [`ScopeNode`] itself: a weight is only meaningful
//! against the grand total of the whole snapshot, so it is produced by the
//! recomputation pass as a separate [`WeightTree`] mirroring the node
//! hierarchy. Readers walk the pair through [`WeightedNode`].

use super::node::ScopeNode;
use super::tree::ScopeTree;
use crate::utils::config::WEIGHT_DECIMALS;
use serde_json::Value;
use std::ops::Deref;

/// Share of the whole-process allocated bytes attributed to one node
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Weight {
    total_percent: f64,
    self_percent: f64,
}

impl Weight {
    pub const ZERO: Weight = Weight {
        total_percent: 0.0,
        self_percent: 0.0,
    };

    /// Compute the weight of a node given its total and self allocated bytes.
    ///
    /// A zero grand total yields [`Weight::ZERO`].
    pub fn of(total_allocated: u64, self_allocated: u64, grand_total_allocated: u64) -> Self {
        if grand_total_allocated == 0 {
            return Self::ZERO;
        }
        let grand = grand_total_allocated as f64;
        Self {
            total_percent: 100.0 * total_allocated as f64 / grand,
            self_percent: 100.0 * self_allocated as f64 / grand,
        }
    }

    pub fn total_percent(&self) -> f64 {
        self.total_percent
    }

    pub fn self_percent(&self) -> f64 {
        self.self_percent
    }

    pub fn rounded_total_percent(&self) -> f64 {
        round_weight(self.total_percent)
    }

    pub fn rounded_self_percent(&self) -> f64 {
        round_weight(self.self_percent)
    }
}

/// Round a percentage to the number of decimals used in every output
pub fn round_weight(value: f64) -> f64 {
    let factor = 10f64.powi(WEIGHT_DECIMALS);
    (value * factor).round() / factor
}

/// Weights of a node and, in the same order, of all its descendants
#[derive(Debug, Clone, PartialEq)]
pub struct WeightTree {
    weight: Weight,
    children: Vec<WeightTree>,
}

impl WeightTree {
    pub(crate) fn new(weight: Weight, children: Vec<WeightTree>) -> Self {
        Self { weight, children }
    }

    pub fn weight(&self) -> Weight {
        self.weight
    }

    pub fn children(&self) -> &[WeightTree] {
        &self.children
    }
}

/// A scope node paired with its freshly computed weights
#[derive(Debug, Clone, Copy)]
pub struct WeightedNode<'a> {
    node: &'a ScopeNode,
    weights: &'a WeightTree,
}

impl<'a> WeightedNode<'a> {
    /// Pair a node with the weights computed from it.
    ///
    /// `weights` must come from `node.compute_weights_recursively()` with no
    /// structural change in between.
    pub fn new(node: &'a ScopeNode, weights: &'a WeightTree) -> Self {
        debug_assert_eq!(node.children().len(), weights.children.len());
        Self { node, weights }
    }

    pub fn node(&self) -> &'a ScopeNode {
        self.node
    }

    pub fn weight(&self) -> Weight {
        self.weights.weight
    }

    pub fn weights(&self) -> &'a WeightTree {
        self.weights
    }

    /// Children in insertion order, each with its own weights
    pub fn children(&self) -> impl Iterator<Item = WeightedNode<'a>> + 'a {
        self.node
            .children()
            .iter()
            .zip(self.weights.children.iter())
            .map(|(node, weights)| WeightedNode { node, weights })
    }

    /// Look up a direct child by scope name
    pub fn child(&self, name: &str) -> Option<WeightedNode<'a>> {
        self.children().find(|c| c.node.name() == name)
    }

    /// Serialize the node with rounded weights
    pub fn to_record(&self) -> Value {
        self.node.to_record(self.weights)
    }
}

impl Deref for WeightedNode<'_> {
    type Target = ScopeNode;

    fn deref(&self) -> &ScopeNode {
        self.node
    }
}

/// A scope tree paired with the weights of its nodes
#[derive(Debug, Clone, Copy)]
pub struct WeightedTree<'a> {
    tree: &'a ScopeTree,
    weights: &'a WeightTree,
}

impl<'a> WeightedTree<'a> {
    pub(crate) fn new(tree: &'a ScopeTree, weights: &'a WeightTree) -> Self {
        Self { tree, weights }
    }

    pub fn tree(&self) -> &'a ScopeTree {
        self.tree
    }

    pub fn root(&self) -> WeightedNode<'a> {
        WeightedNode::new(self.tree.root(), self.weights)
    }

    pub fn to_record(&self) -> Value {
        self.tree.to_record(self.weights)
    }
}

impl Deref for WeightedTree<'_> {
    type Target = ScopeTree;

    fn deref(&self) -> &ScopeTree {
        self.tree
    }
}
