//! Structured inputs: trees whose nodes carry replacement tables
//!
//! Trees are built by an external grammar collaborator. Each node may list
//! alternatives: smaller subtrees that can stand in its place, or deletion.
//! Every alternative is assumed to keep the tree valid; nothing here checks
//! grammar rules. The minimizer only needs node identity, size and a way to
//! splice an alternative in at a position.

use std::fmt;

use serde::Serialize;
use sha2::Sha256;

use crate::outcome::{ContentHash, Extent};

/// Node identifier, stable within one search
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct NodeId(pub u64);

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// One entry of a node's replacement table
#[derive(Debug, Clone, PartialEq)]
pub enum Replacement<P> {
    /// Substitute this subtree for the node
    Subtree(Node<P>),
    /// Remove the node from its parent
    Delete,
}

impl<P> Replacement<P> {
    /// Number of nodes the replacement contributes
    pub fn size(&self) -> usize {
        match self {
            Replacement::Subtree(node) => node.size(),
            Replacement::Delete => 0,
        }
    }
}

/// A tree node: payload, ordered children and replacement table
#[derive(Debug, Clone, PartialEq)]
pub struct Node<P> {
    id: NodeId,
    payload: P,
    children: Vec<Node<P>>,
    alternatives: Vec<Replacement<P>>,
}

impl<P> Node<P> {
    pub fn new(id: NodeId, payload: P, children: Vec<Node<P>>) -> Self {
        Self {
            id,
            payload,
            children,
            alternatives: Vec::new(),
        }
    }

    /// Attach a replacement table
    pub fn with_alternatives(mut self, alternatives: Vec<Replacement<P>>) -> Self {
        self.alternatives = alternatives;
        self
    }

    pub fn id(&self) -> NodeId {
        self.id
    }

    pub fn payload(&self) -> &P {
        &self.payload
    }

    pub fn children(&self) -> &[Node<P>] {
        &self.children
    }

    pub fn alternatives(&self) -> &[Replacement<P>] {
        &self.alternatives
    }

    pub fn is_leaf(&self) -> bool {
        self.children.is_empty()
    }

    /// Node count of this subtree
    pub fn size(&self) -> usize {
        1 + self.children.iter().map(Node::size).sum::<usize>()
    }

    pub fn find(&self, id: NodeId) -> Option<&Node<P>> {
        if self.id == id {
            return Some(self);
        }
        self.children.iter().find_map(|child| child.find(id))
    }

    /// Whether any node of the subtree satisfies `predicate`
    pub fn contains<F>(&self, predicate: F) -> bool
    where
        F: Fn(&Node<P>) -> bool + Copy,
    {
        predicate(self) || self.children.iter().any(|child| child.contains(predicate))
    }

    /// Node reached by following child indices from this node
    pub fn at(&self, path: &[usize]) -> Option<&Node<P>> {
        path.iter()
            .try_fold(self, |node, &index| node.children.get(index))
    }

    /// Payloads in pre-order
    pub fn payloads(&self) -> Vec<&P> {
        let mut out = vec![&self.payload];
        for child in &self.children {
            out.extend(child.payloads());
        }
        out
    }
}

impl<P: Clone> Node<P> {
    /// Copy of the tree with the node at `path` swapped for `replacement`.
    ///
    /// Returns `None` if the path does not exist or the replacement would
    /// delete the root.
    pub fn replaced_at(&self, path: &[usize], replacement: &Replacement<P>) -> Option<Node<P>> {
        let (last, parent_path) = match path.split_last() {
            Some(split) => split,
            None => {
                return match replacement {
                    Replacement::Subtree(node) => Some(node.clone()),
                    Replacement::Delete => None,
                };
            }
        };

        self.at(parent_path)?.children.get(*last)?;
        let mut tree = self.clone();
        let parent = tree.at_mut(parent_path)?;
        match replacement {
            Replacement::Subtree(node) => parent.children[*last] = node.clone(),
            Replacement::Delete => {
                parent.children.remove(*last);
            }
        }
        Some(tree)
    }

    fn at_mut(&mut self, path: &[usize]) -> Option<&mut Node<P>> {
        let mut node = self;
        for &index in path {
            node = node.children.get_mut(index)?;
        }
        Some(node)
    }
}

/// Content hash covers payloads and shape only; ids and replacement tables
/// do not change what the oracle sees.
impl<P: ContentHash> ContentHash for Node<P> {
    fn hash_content(&self, state: &mut Sha256) {
        self.payload.hash_content(state);
        self.children.as_slice().hash_content(state);
    }
}

impl<P> Extent for Node<P> {
    fn extent(&self) -> usize {
        self.size()
    }
}

/// S-expression rendering: `(+ (* 1 2) 3)`
impl<P: fmt::Display> fmt::Display for Node<P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.children.is_empty() {
            return write!(f, "{}", self.payload);
        }
        write!(f, "({}", self.payload)?;
        for child in &self.children {
            write!(f, " {}", child)?;
        }
        write!(f, ")")
    }
}

/// Hands out fresh [`NodeId`]s while a tree is assembled
#[derive(Debug, Default)]
pub struct TreeBuilder {
    next_id: u64,
}

impl TreeBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn next_id(&mut self) -> NodeId {
        let id = NodeId(self.next_id);
        self.next_id += 1;
        id
    }

    pub fn node<P>(&mut self, payload: P, children: Vec<Node<P>>) -> Node<P> {
        Node::new(self.next_id(), payload, children)
    }

    pub fn leaf<P>(&mut self, payload: P) -> Node<P> {
        self.node(payload, Vec::new())
    }
}
