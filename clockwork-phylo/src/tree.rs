//! Time-tree data structure.
//!
//! Uses arena-style storage: nodes live in a flat `Vec<Node>` and are
//! referenced by `NodeId` (a `usize` index). Each node carries a height
//! (age before the present); branch lengths are derived as
//! `height(parent) − height(node)`. Heights are checkpointable and every
//! change gives the tree a fresh [`ChangeStamp`].

use clockwork_core::{ChangeStamp, Checkpoint, ClockworkError, Result};

/// Index into the tree's node arena.
pub type NodeId = usize;

/// A single node in a time tree.
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Node {
    /// Index of this node in the arena.
    pub id: NodeId,
    /// Parent node (None for root).
    pub parent: Option<NodeId>,
    /// Child nodes.
    pub children: Vec<NodeId>,
    /// Age of the node, measured back from the present.
    pub height: f64,
    /// Taxon or clade label.
    pub name: Option<String>,
}

impl Node {
    /// True if this node has no children.
    pub fn is_leaf(&self) -> bool {
        self.children.is_empty()
    }

    /// True if this node has no parent.
    pub fn is_root(&self) -> bool {
        self.parent.is_none()
    }
}

/// A rooted time tree stored as an arena of nodes.
#[derive(Debug, Clone)]
pub struct TimeTree {
    nodes: Vec<Node>,
    root: NodeId,
    stored_heights: Vec<f64>,
    stamp: ChangeStamp,
    stored_stamp: ChangeStamp,
}

impl TimeTree {
    /// Create a new tree with a single unnamed root node at height 0.
    pub fn new() -> Self {
        let root = Node {
            id: 0,
            parent: None,
            children: Vec::new(),
            height: 0.0,
            name: None,
        };
        let stamp = ChangeStamp::fresh();
        Self {
            nodes: vec![root],
            root: 0,
            stored_heights: vec![0.0],
            stamp,
            stored_stamp: stamp,
        }
    }

    /// Create a tree from pre-built nodes and a root index.
    ///
    /// Checks that ids match arena positions, that parent and child links
    /// agree, and that `root` is the only parentless node.
    pub fn from_nodes(nodes: Vec<Node>, root: NodeId) -> Result<Self> {
        if nodes.is_empty() {
            return Err(ClockworkError::InvalidInput("empty node list".into()));
        }
        if root >= nodes.len() {
            return Err(ClockworkError::InvalidInput(format!(
                "root index {} out of range ({})",
                root,
                nodes.len()
            )));
        }
        for (i, node) in nodes.iter().enumerate() {
            if node.id != i {
                return Err(ClockworkError::InvalidInput(format!(
                    "node at position {} has id {}",
                    i, node.id
                )));
            }
            if !node.height.is_finite() {
                return Err(ClockworkError::InvalidInput(format!(
                    "node {} has non-finite height",
                    i
                )));
            }
            match node.parent {
                None if i != root => {
                    return Err(ClockworkError::InvalidInput(format!(
                        "node {} has no parent but is not the root",
                        i
                    )))
                }
                Some(_) if i == root => {
                    return Err(ClockworkError::InvalidInput("root has a parent".into()))
                }
                Some(p) if p >= nodes.len() || !nodes[p].children.contains(&i) => {
                    return Err(ClockworkError::InvalidInput(format!(
                        "node {} is not listed as a child of its parent",
                        i
                    )))
                }
                _ => {}
            }
            for &c in &node.children {
                if c >= nodes.len() || nodes[c].parent != Some(i) {
                    return Err(ClockworkError::InvalidInput(format!(
                        "child {} of node {} does not point back to it",
                        c, i
                    )));
                }
            }
        }
        let stored_heights = nodes.iter().map(|n| n.height).collect();
        let stamp = ChangeStamp::fresh();
        Ok(Self {
            nodes,
            root,
            stored_heights,
            stamp,
            stored_stamp: stamp,
        })
    }

    /// Add a child to `parent` and return its `NodeId`.
    pub fn add_child(&mut self, parent: NodeId, name: Option<String>, height: f64) -> Result<NodeId> {
        if parent >= self.nodes.len() {
            return Err(ClockworkError::InvalidInput(format!(
                "parent index {} out of range ({})",
                parent,
                self.nodes.len()
            )));
        }
        if !height.is_finite() {
            return Err(ClockworkError::InvalidInput("height must be finite".into()));
        }
        let id = self.nodes.len();
        self.nodes.push(Node {
            id,
            parent: Some(parent),
            children: Vec::new(),
            height,
            name,
        });
        self.nodes[parent].children.push(id);
        self.stored_heights.push(height);
        self.stamp = ChangeStamp::fresh();
        Ok(id)
    }

    /// Access a node by id.
    pub fn get_node(&self, id: NodeId) -> Option<&Node> {
        self.nodes.get(id)
    }

    /// The root node id.
    pub fn root(&self) -> NodeId {
        self.root
    }

    pub fn is_root(&self, id: NodeId) -> bool {
        id == self.root
    }

    /// Total number of nodes.
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// Number of leaf nodes.
    pub fn leaf_count(&self) -> usize {
        self.nodes.iter().filter(|n| n.is_leaf()).count()
    }

    /// All leaf node ids.
    pub fn leaves(&self) -> Vec<NodeId> {
        self.nodes
            .iter()
            .filter(|n| n.is_leaf())
            .map(|n| n.id)
            .collect()
    }

    /// Parent of `id` (None for the root). Panics if `id` is out of range.
    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.nodes[id].parent
    }

    /// Children of `id`. Panics if `id` is out of range.
    pub fn children(&self, id: NodeId) -> &[NodeId] {
        &self.nodes[id].children
    }

    /// Height of `id`. Panics if `id` is out of range.
    pub fn height(&self, id: NodeId) -> f64 {
        self.nodes[id].height
    }

    /// Time between `id` and its parent; 0 for the root.
    ///
    /// May be zero or negative if heights were set inconsistently.
    pub fn branch_length(&self, id: NodeId) -> f64 {
        match self.nodes[id].parent {
            Some(p) => self.nodes[p].height - self.nodes[id].height,
            None => 0.0,
        }
    }

    /// Move a node to a new height.
    pub fn set_height(&mut self, id: NodeId, height: f64) -> Result<()> {
        if id >= self.nodes.len() {
            return Err(ClockworkError::InvalidInput(format!(
                "node {} out of range ({})",
                id,
                self.nodes.len()
            )));
        }
        if !height.is_finite() {
            return Err(ClockworkError::InvalidInput("height must be finite".into()));
        }
        self.nodes[id].height = height;
        self.stamp = ChangeStamp::fresh();
        Ok(())
    }

    /// Multiply every height by `factor`.
    pub fn scale_heights(&mut self, factor: f64) -> Result<()> {
        if !(factor > 0.0) || !factor.is_finite() {
            return Err(ClockworkError::InvalidInput(
                "height scale factor must be positive".into(),
            ));
        }
        for node in &mut self.nodes {
            node.height *= factor;
        }
        self.stamp = ChangeStamp::fresh();
        Ok(())
    }

    /// Stamp of the current heights.
    pub fn stamp(&self) -> ChangeStamp {
        self.stamp
    }

    /// Pre-order (parent before children) traversal yielding node ids.
    pub fn iter_preorder(&self) -> PreorderIter<'_> {
        PreorderIter {
            tree: self,
            stack: vec![self.root],
        }
    }

    /// Pre-order traversal of the subtree rooted at `id` (including `id`).
    pub fn iter_subtree(&self, id: NodeId) -> PreorderIter<'_> {
        PreorderIter {
            tree: self,
            stack: vec![id],
        }
    }

    /// Parse a Newick format string into a tree.
    pub fn from_newick(input: &str) -> Result<Self> {
        crate::newick::parse(input)
    }
}

impl Default for TimeTree {
    fn default() -> Self {
        Self::new()
    }
}

impl Checkpoint for TimeTree {
    fn store(&mut self) {
        for (s, n) in self.stored_heights.iter_mut().zip(&self.nodes) {
            *s = n.height;
        }
        self.stored_stamp = self.stamp;
    }

    fn restore(&mut self) {
        for (n, &s) in self.nodes.iter_mut().zip(&self.stored_heights) {
            n.height = s;
        }
        self.stamp = self.stored_stamp;
    }
}

/// Pre-order iterator over node ids.
pub struct PreorderIter<'a> {
    tree: &'a TimeTree,
    stack: Vec<NodeId>,
}

impl<'a> Iterator for PreorderIter<'a> {
    type Item = NodeId;

    fn next(&mut self) -> Option<Self::Item> {
        let id = self.stack.pop()?;
        // Push children in reverse order so leftmost is visited first.
        for &child in self.tree.nodes[id].children.iter().rev() {
            self.stack.push(child);
        }
        Some(id)
    }
}
