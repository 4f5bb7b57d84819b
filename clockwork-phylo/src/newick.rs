//! Newick format parser for time trees.
//!
//! Supports the standard Newick grammar:
//! ```text
//! tree     = subtree ';'
//! subtree  = '(' children ')' label | label
//! children = subtree (',' subtree)*
//! label    = name? (':' length)?
//! ```
//!
//! Node heights are derived from branch lengths: the tip furthest from the
//! root sits at height 0 and every other node at
//! `max_root_to_tip − root_distance`, so ultrametric input puts all tips at
//! height 0. A missing branch length counts as 1.

use crate::tree::{Node, NodeId, TimeTree};
use clockwork_core::{ClockworkError, Result};

/// Branch length assumed when a non-root node has none.
pub const DEFAULT_BRANCH_LENGTH: f64 = 1.0;

/// Parse a Newick format string into a `TimeTree`.
pub fn parse(input: &str) -> Result<TimeTree> {
    let bytes = input.as_bytes();
    let mut parser = Parser::new(bytes);
    let (mut nodes, lengths, root) = parser.parse_tree()?;

    // Root distances in pre-order: parents are always allocated before children.
    let mut root_dist = vec![0.0f64; nodes.len()];
    let mut stack = vec![root];
    while let Some(id) = stack.pop() {
        if let Some(p) = nodes[id].parent {
            root_dist[id] = root_dist[p] + lengths[id].unwrap_or(DEFAULT_BRANCH_LENGTH);
        }
        stack.extend(nodes[id].children.iter().copied());
    }
    let max_dist = nodes
        .iter()
        .filter(|n| n.is_leaf())
        .map(|n| root_dist[n.id])
        .fold(0.0f64, f64::max);
    for node in &mut nodes {
        node.height = (max_dist - root_dist[node.id]).max(0.0);
    }
    TimeTree::from_nodes(nodes, root)
}

struct Parser<'a> {
    input: &'a [u8],
    pos: usize,
    nodes: Vec<Node>,
    lengths: Vec<Option<f64>>,
}

impl<'a> Parser<'a> {
    fn new(input: &'a [u8]) -> Self {
        Self {
            input,
            pos: 0,
            nodes: Vec::new(),
            lengths: Vec::new(),
        }
    }

    fn parse_tree(&mut self) -> Result<(Vec<Node>, Vec<Option<f64>>, NodeId)> {
        self.skip_whitespace();
        let root = self.parse_subtree(None)?;
        self.skip_whitespace();
        if self.pos >= self.input.len() || self.input[self.pos] != b';' {
            return Err(ClockworkError::Parse("expected ';' at end of Newick string".into()));
        }
        self.pos += 1;
        Ok((
            std::mem::take(&mut self.nodes),
            std::mem::take(&mut self.lengths),
            root,
        ))
    }

    fn parse_subtree(&mut self, parent: Option<NodeId>) -> Result<NodeId> {
        self.skip_whitespace();
        let id = self.alloc_node(parent);

        if self.peek() == Some(b'(') {
            self.pos += 1; // consume '('
            // Parse children
            let first_child = self.parse_subtree(Some(id))?;
            self.nodes[id].children.push(first_child);

            loop {
                self.skip_whitespace();
                if self.peek() == Some(b',') {
                    self.pos += 1;
                    let child = self.parse_subtree(Some(id))?;
                    self.nodes[id].children.push(child);
                } else {
                    break;
                }
            }
            self.skip_whitespace();
            if self.peek() != Some(b')') {
                return Err(ClockworkError::Parse("expected ')' in Newick string".into()));
            }
            self.pos += 1; // consume ')'
        }

        // Parse optional label (name:length)
        self.parse_label(id)?;
        Ok(id)
    }

    fn parse_label(&mut self, id: NodeId) -> Result<()> {
        self.skip_whitespace();
        // Parse name (everything until ':', ',', ')', ';', '(' or whitespace)
        let name = self.parse_name();
        if !name.is_empty() {
            self.nodes[id].name = Some(name);
        }
        // Parse optional branch length
        self.skip_whitespace();
        if self.peek() == Some(b':') {
            self.pos += 1;
            self.skip_whitespace();
            let len_str = self.parse_float_str();
            if len_str.is_empty() {
                return Err(ClockworkError::Parse("expected number after ':'".into()));
            }
            let len: f64 = len_str.parse().map_err(|_| {
                ClockworkError::Parse(format!("invalid branch length: '{}'", len_str))
            })?;
            if !(len >= 0.0) || !len.is_finite() {
                return Err(ClockworkError::Parse(format!(
                    "branch length must be a non-negative number, got {}",
                    len
                )));
            }
            self.lengths[id] = Some(len);
        }
        Ok(())
    }

    fn parse_name(&mut self) -> String {
        let start = self.pos;
        while self.pos < self.input.len() {
            match self.input[self.pos] {
                b':' | b',' | b')' | b'(' | b';' => break,
                b' ' | b'\t' | b'\n' | b'\r' => break,
                _ => self.pos += 1,
            }
        }
        String::from_utf8_lossy(&self.input[start..self.pos]).into_owned()
    }

    fn parse_float_str(&mut self) -> String {
        let start = self.pos;
        while self.pos < self.input.len() {
            match self.input[self.pos] {
                b'0'..=b'9' | b'.' | b'-' | b'+' | b'e' | b'E' => self.pos += 1,
                _ => break,
            }
        }
        String::from_utf8_lossy(&self.input[start..self.pos]).into_owned()
    }

    fn alloc_node(&mut self, parent: Option<NodeId>) -> NodeId {
        let id = self.nodes.len();
        self.nodes.push(Node {
            id,
            parent,
            children: Vec::new(),
            height: 0.0,
            name: None,
        });
        self.lengths.push(None);
        id
    }

    fn peek(&self) -> Option<u8> {
        self.input.get(self.pos).copied()
    }

    fn skip_whitespace(&mut self) {
        while self.pos < self.input.len() {
            match self.input[self.pos] {
                b' ' | b'\t' | b'\n' | b'\r' => self.pos += 1,
                _ => break,
            }
        }
    }
}
