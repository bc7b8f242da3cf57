use rustc_hash::FxHashMap;
use smallvec::SmallVec;

pub type NodeId = usize;

/// Relationship strength between two matches.
pub const UNRELATED: u8 = 0;
pub const ONE_WAY: u8 = 1;
pub const MUTUAL: u8 = 2;

/// One retained match.
#[derive(Debug, Clone, PartialEq)]
pub struct LeafNode {
    pub index: usize,
    /// Nonzero relationship degrees keyed by the other match's index.
    degrees: FxHashMap<usize, u8>,
}

impl LeafNode {
    pub fn new(index: usize, degrees: FxHashMap<usize, u8>) -> Self {
        Self { index, degrees }
    }

    pub fn degree(&self, other: usize) -> u8 {
        self.degrees.get(&other).copied().unwrap_or(UNRELATED)
    }

    /// Relationship degree against each index of `ordered_indexes`, in order.
    pub fn coords_array(&self, ordered_indexes: &[usize]) -> Vec<u8> {
        ordered_indexes.iter().map(|&i| self.degree(i)).collect()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Child {
    pub node: NodeId,
    /// Visit this child's leaves back to front.
    pub reversed: bool,
}

/// A merged group. Binary for real merges; the root may be n-ary when
/// unrelated groups are gathered under it.
#[derive(Debug, Clone, PartialEq)]
pub struct ClusterNode {
    pub children: SmallVec<[Child; 2]>,
    /// Average similarity between the merged children; 0 for the gathering root.
    pub linkage: f64,
    pub size: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Node {
    Leaf(LeafNode),
    Cluster(ClusterNode),
}

impl Node {
    pub fn size(&self) -> usize {
        match self {
            Node::Leaf(_) => 1,
            Node::Cluster(c) => c.size,
        }
    }
}

/// Immutable, single-rooted tree stored in an arena and addressed by
/// [`NodeId`]. Leaves are created first, so leaf ids are `0..leaf_count`.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ClusterTree {
    nodes: Vec<Node>,
    root: Option<NodeId>,
}

impl ClusterTree {
    pub(crate) fn from_parts(nodes: Vec<Node>, root: Option<NodeId>) -> Self {
        Self { nodes, root }
    }

    pub fn root(&self) -> Option<NodeId> {
        self.root
    }

    pub fn node(&self, id: NodeId) -> &Node {
        &self.nodes[id]
    }

    pub fn leaf_count(&self) -> usize {
        self.root.map(|r| self.nodes[r].size()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.root.is_none()
    }

    /// Leaves of the whole tree in display order.
    pub fn ordered_leaves(&self) -> Vec<&LeafNode> {
        match self.root {
            Some(root) => self.ordered_leaves_of(root, false),
            None => Vec::new(),
        }
    }

    pub fn ordered_leaf_indexes(&self) -> Vec<usize> {
        self.ordered_leaves().iter().map(|leaf| leaf.index).collect()
    }

    /// Leaves under `id` in display order, optionally back to front.
    pub fn ordered_leaves_of(&self, id: NodeId, reversed: bool) -> Vec<&LeafNode> {
        let mut out = Vec::with_capacity(self.nodes[id].size());
        let mut stack = vec![(id, reversed)];
        while let Some((id, reversed)) = stack.pop() {
            match &self.nodes[id] {
                Node::Leaf(leaf) => out.push(leaf),
                Node::Cluster(cluster) => {
                    // Pushed in reverse so the first child to visit pops first.
                    if reversed {
                        for child in cluster.children.iter() {
                            stack.push((child.node, !child.reversed));
                        }
                    } else {
                        for child in cluster.children.iter().rev() {
                            stack.push((child.node, child.reversed));
                        }
                    }
                }
            }
        }
        out
    }
}
