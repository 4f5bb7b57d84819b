//! Mapping between tree nodes and slots of a flat per-branch vector.
//!
//! Every non-root node owns the branch above it, so a tree with `n` nodes
//! has `n − 1` slots. Slots follow node-id order with the root skipped.

use crate::tree::{NodeId, TimeTree};
use clockwork_core::{ClockworkError, Result};

/// Bijection between non-root node ids and `0..node_count − 1`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RateFieldIndex {
    slot_of: Vec<Option<usize>>,
    node_of: Vec<NodeId>,
    root: NodeId,
}

impl RateFieldIndex {
    /// Build the index for `tree`.
    pub fn new(tree: &TimeTree) -> Result<Self> {
        let n = tree.node_count();
        let root = tree.root();
        let mut slot_of = vec![None; n];
        let mut node_of = Vec::with_capacity(n.saturating_sub(1));

        for i in 0..n {
            let id = tree.get_node(i).map(|node| node.id).unwrap_or(usize::MAX);
            if id >= n {
                return Err(ClockworkError::InvalidInput(format!(
                    "node id {} out of range (node count {})",
                    id, n
                )));
            }
            if id != root {
                slot_of[id] = Some(node_of.len());
                node_of.push(id);
            }
        }

        if node_of.len() + 1 != n {
            return Err(ClockworkError::Other(format!(
                "expected to map {} non-root nodes but mapped {}",
                n - 1,
                node_of.len()
            )));
        }
        Ok(Self {
            slot_of,
            node_of,
            root,
        })
    }

    /// Slot of a node's branch; `None` for the root or an unknown id.
    pub fn slot(&self, node: NodeId) -> Option<usize> {
        self.slot_of.get(node).copied().flatten()
    }

    /// Node owning `slot`. Panics if `slot >= len()`.
    pub fn node(&self, slot: usize) -> NodeId {
        self.node_of[slot]
    }

    /// Number of slots (`node_count − 1`).
    pub fn len(&self) -> usize {
        self.node_of.len()
    }

    pub fn is_empty(&self) -> bool {
        self.node_of.is_empty()
    }

    pub fn node_count(&self) -> usize {
        self.slot_of.len()
    }

    pub fn root(&self) -> NodeId {
        self.root
    }

    /// Error unless a per-branch vector named `what` has one entry per slot.
    pub fn check_dimension(&self, what: &str, found: usize) -> Result<()> {
        if found != self.len() {
            return Err(ClockworkError::dimension(what, self.len(), found));
        }
        Ok(())
    }
}
