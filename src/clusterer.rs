use crate::{
    cluster_tree::{Child, ClusterNode, ClusterTree, LeafNode, Node, NodeId},
    config::ClusterConfig,
    model::ClusterableMatch,
    similarity::SimilarityGraph,
};
use fixedbitset::FixedBitSet;
use itertools::Itertools;
use rustc_hash::{FxHashMap, FxHashSet};
use smallvec::smallvec;
use std::cmp::{Ordering, Reverse};
use std::collections::BinaryHeap;
use tracing::{debug, info};

/// Cluster numbers by match index. Matches outside any cluster are absent.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ClusterNumbers {
    by_index: FxHashMap<usize, u32>,
    count: u32,
}

impl ClusterNumbers {
    pub fn get(&self, index: usize) -> Option<u32> {
        self.by_index.get(&index).copied()
    }

    /// Number of clusters; numbers run `1..=count`.
    pub fn count(&self) -> u32 {
        self.count
    }

    pub fn len(&self) -> usize {
        self.by_index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_index.is_empty()
    }
}

#[derive(Debug, Clone)]
pub struct Clustering {
    pub tree: ClusterTree,
    pub numbers: ClusterNumbers,
}

/// Merge candidate. Ordered so the heap pops the highest linkage first and,
/// on equal linkage, the pair with the smaller ids.
#[derive(Debug, Clone, Copy)]
struct Candidate {
    linkage: f64,
    a: NodeId,
    b: NodeId,
}

impl PartialEq for Candidate {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Candidate {}

impl PartialOrd for Candidate {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Candidate {
    fn cmp(&self, other: &Self) -> Ordering {
        self.linkage
            .total_cmp(&other.linkage)
            .then_with(|| (other.a, other.b).cmp(&(self.a, self.b)))
    }
}

/// Per-group state while merging.
struct Group {
    size: usize,
    /// Sum of pairwise similarities to each neighbouring group.
    links: FxHashMap<NodeId, f64>,
    /// First and last leaf position in display order.
    ends: (usize, usize),
    min_index: usize,
}

pub struct HierarchicalClusterer {
    config: ClusterConfig,
}

impl HierarchicalClusterer {
    pub fn new(config: ClusterConfig) -> Self {
        Self { config }
    }

    pub fn cluster(&self, matches: &[ClusterableMatch]) -> Clustering {
        let tree = self.build_tree(matches);
        let numbers = self.number_clusters(&tree);
        info!(
            leaves = tree.leaf_count(),
            clusters = numbers.count(),
            clustered = numbers.len(),
            "clustering complete"
        );
        Clustering { tree, numbers }
    }

    /// Average-linkage agglomeration over the sparse similarity graph.
    pub fn build_tree(&self, matches: &[ClusterableMatch]) -> ClusterTree {
        let graph = SimilarityGraph::build(matches, self.config.strong_match_centimorgans);
        let n = graph.len();
        if n == 0 {
            return ClusterTree::default();
        }

        let mut nodes: Vec<Node> = relationship_leaves(matches, &graph)
            .into_iter()
            .map(Node::Leaf)
            .collect();

        let capacity = 2 * n;
        let mut active = FixedBitSet::with_capacity(capacity);
        let mut groups: Vec<Option<Group>> = Vec::with_capacity(capacity);
        let mut heap = BinaryHeap::new();

        for pos in 0..n {
            active.insert(pos);
            let links: FxHashMap<NodeId, f64> = graph.neighbors(pos).iter().copied().collect();
            for &(other, score) in graph.neighbors(pos) {
                if pos < other && score > 0.0 {
                    heap.push(Candidate { linkage: score, a: pos, b: other });
                }
            }
            groups.push(Some(Group {
                size: 1,
                links,
                ends: (pos, pos),
                min_index: graph.index_at(pos),
            }));
        }

        let mut merges = 0usize;
        while let Some(Candidate { linkage, a, b }) = heap.pop() {
            if !active.contains(a) || !active.contains(b) {
                continue;
            }
            let (Some(ga), Some(gb)) = (groups[a].take(), groups[b].take()) else {
                continue;
            };
            active.set(a, false);
            active.set(b, false);

            let id = nodes.len();
            // Larger group on the left; on equal size the one holding the
            // smaller match index.
            let (left, gl, right, gr) = if (gb.size, Reverse(gb.min_index)) > (ga.size, Reverse(ga.min_index)) {
                (b, gb, a, ga)
            } else {
                (a, ga, b, gb)
            };
            let (left_reversed, right_reversed) = best_orientation(&graph, gl.ends, gr.ends);
            let ends = (
                if left_reversed { gl.ends.1 } else { gl.ends.0 },
                if right_reversed { gr.ends.0 } else { gr.ends.1 },
            );

            let mut links: FxHashMap<NodeId, f64> = FxHashMap::default();
            for (&k, &sum) in gl.links.iter().chain(gr.links.iter()) {
                if k != left && k != right {
                    *links.entry(k).or_insert(0.0) += sum;
                }
            }

            let size = gl.size + gr.size;
            for (&k, &sum) in links.iter().sorted_by_key(|(k, _)| **k) {
                if let Some(Some(neighbour)) = groups.get_mut(k) {
                    neighbour.links.remove(&left);
                    neighbour.links.remove(&right);
                    neighbour.links.insert(id, sum);
                    let linkage = sum / (size * neighbour.size) as f64;
                    if linkage > 0.0 {
                        heap.push(Candidate { linkage, a: k, b: id });
                    }
                }
            }

            nodes.push(Node::Cluster(ClusterNode {
                children: smallvec![
                    Child { node: left, reversed: left_reversed },
                    Child { node: right, reversed: right_reversed },
                ],
                linkage,
                size,
            }));
            groups.push(Some(Group {
                size,
                links,
                ends,
                min_index: gl.min_index.min(gr.min_index),
            }));
            active.grow(id + 1);
            active.insert(id);
            merges += 1;
        }

        let mut roots: Vec<(NodeId, usize, usize)> = active
            .ones()
            .filter_map(|id| groups[id].as_ref().map(|g| (id, g.size, g.min_index)))
            .collect();
        debug!(merges, groups = roots.len(), "agglomeration finished");

        let root = if roots.len() == 1 {
            roots[0].0
        } else {
            roots.sort_by(|x, y| y.1.cmp(&x.1).then(x.2.cmp(&y.2)));
            let id = nodes.len();
            nodes.push(Node::Cluster(ClusterNode {
                children: roots
                    .iter()
                    .map(|&(node, _, _)| Child { node, reversed: false })
                    .collect(),
                linkage: 0.0,
                size: n,
            }));
            id
        };

        ClusterTree::from_parts(nodes, Some(root))
    }

    /// Number the maximal subtrees merged at or above the cluster linkage,
    /// in leaf order. Groups below the minimum size stay unnumbered.
    pub fn number_clusters(&self, tree: &ClusterTree) -> ClusterNumbers {
        let mut numbers = ClusterNumbers::default();
        let Some(root) = tree.root() else {
            return numbers;
        };

        let mut stack = vec![(root, false)];
        while let Some((id, reversed)) = stack.pop() {
            let Node::Cluster(cluster) = tree.node(id) else {
                continue;
            };
            if cluster.linkage > 0.0 && cluster.linkage >= self.config.cluster_linkage {
                if cluster.size >= self.config.min_cluster_size {
                    numbers.count += 1;
                    for leaf in tree.ordered_leaves_of(id, reversed) {
                        numbers.by_index.insert(leaf.index, numbers.count);
                    }
                }
                continue;
            }
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
        numbers
    }
}

/// Choose child orientations so the two touching leaves are as similar as
/// possible. Ties keep the un-reversed arrangement.
fn best_orientation(graph: &SimilarityGraph, left: (usize, usize), right: (usize, usize)) -> (bool, bool) {
    let options = [(false, false), (false, true), (true, false), (true, true)];
    let mut best = (false, false);
    let mut best_score = f64::NEG_INFINITY;
    for (lr, rr) in options {
        let touching_left = if lr { left.0 } else { left.1 };
        let touching_right = if rr { right.1 } else { right.0 };
        let score = graph.similarity(touching_left, touching_right);
        if score > best_score {
            best_score = score;
            best = (lr, rr);
        }
    }
    best
}

/// One leaf per match, carrying its relationship degree to every match it
/// lists or is listed by.
fn relationship_leaves(matches: &[ClusterableMatch], graph: &SimilarityGraph) -> Vec<LeafNode> {
    let known: FxHashSet<usize> = matches.iter().map(|m| m.index).collect();
    let mut degrees: FxHashMap<usize, FxHashMap<usize, u8>> = FxHashMap::default();
    for m in matches {
        for &c in m.coords.iter().filter(|c| known.contains(c)) {
            *degrees.entry(m.index).or_default().entry(c).or_insert(0) += 1;
            *degrees.entry(c).or_default().entry(m.index).or_insert(0) += 1;
        }
    }

    (0..graph.len())
        .map(|pos| {
            let index = graph.index_at(pos);
            LeafNode::new(index, degrees.remove(&index).unwrap_or_default())
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cluster_tree::{MUTUAL, ONE_WAY, UNRELATED};
    use crate::model::Match;
    use std::sync::Arc;

    fn cm(index: usize, cm: f64, coords: &[usize]) -> ClusterableMatch {
        ClusterableMatch::new(
            index,
            Arc::new(Match::new(&format!("G{}", index), &format!("M{}", index), cm)),
            coords.iter().copied().collect(),
        )
    }

    fn clique(range: std::ops::Range<usize>, extra: &[usize]) -> Vec<ClusterableMatch> {
        let members: Vec<usize> = range.clone().chain(extra.iter().copied()).collect();
        range.map(|i| cm(i, 40.0, &members)).collect()
    }

    #[test]
    fn test_three_match_scenario() {
        let matches = vec![cm(0, 50.0, &[0, 1]), cm(1, 50.0, &[0, 1, 2]), cm(2, 50.0, &[1, 2])];
        let clustering = HierarchicalClusterer::new(ClusterConfig::default()).cluster(&matches);

        assert_eq!(clustering.tree.ordered_leaf_indexes(), vec![0, 1, 2]);
        assert_eq!(clustering.numbers.count(), 1);
        for i in 0..3 {
            assert_eq!(clustering.numbers.get(i), Some(1));
        }

        let leaves = clustering.tree.ordered_leaves();
        let order = [0, 1, 2];
        assert_eq!(leaves[0].coords_array(&order), vec![MUTUAL, MUTUAL, UNRELATED]);
        assert_eq!(leaves[1].coords_array(&order), vec![MUTUAL, MUTUAL, MUTUAL]);
        assert_eq!(leaves[2].coords_array(&order), vec![UNRELATED, MUTUAL, MUTUAL]);
    }

    #[test]
    fn test_one_way_relationship() {
        let matches = vec![cm(0, 50.0, &[0, 1]), cm(1, 50.0, &[1])];
        let tree = HierarchicalClusterer::new(ClusterConfig::default()).build_tree(&matches);
        let leaves = tree.ordered_leaves();
        let a = leaves.iter().find(|l| l.index == 0).unwrap();
        let b = leaves.iter().find(|l| l.index == 1).unwrap();
        assert_eq!(a.degree(1), ONE_WAY);
        assert_eq!(b.degree(0), ONE_WAY);
    }

    #[test]
    fn test_two_cliques_are_separate_clusters() {
        let mut matches = clique(4..8, &[]);
        matches.extend(clique(0..4, &[]));
        let clustering = HierarchicalClusterer::new(ClusterConfig::default()).cluster(&matches);

        let order = clustering.tree.ordered_leaf_indexes();
        let first: FxHashSet<usize> = order[..4].iter().copied().collect();
        assert_eq!(first, (0..4).collect());
        assert_eq!(clustering.numbers.count(), 2);
        assert_eq!(clustering.numbers.get(0), Some(1));
        assert_eq!(clustering.numbers.get(7), Some(2));
    }

    #[test]
    fn test_small_groups_get_no_number() {
        let mut matches = clique(0..2, &[]);
        matches.push(cm(2, 30.0, &[2]));
        let clustering = HierarchicalClusterer::new(ClusterConfig::default()).cluster(&matches);
        assert_eq!(clustering.numbers.count(), 0);
        assert!(clustering.numbers.get(0).is_none());
        assert_eq!(clustering.tree.leaf_count(), 3);
    }

    #[test]
    fn test_strong_match_does_not_join_clusters() {
        let mut matches = clique(0..3, &[9]);
        matches.extend(clique(3..6, &[9]));
        matches.push(cm(9, 900.0, &[0, 1, 2, 3, 4, 5, 9]));

        let separate = HierarchicalClusterer::new(ClusterConfig::default()).cluster(&matches);
        assert_eq!(separate.numbers.count(), 2);
        assert_ne!(separate.numbers.get(0), separate.numbers.get(3));

        let config = ClusterConfig {
            strong_match_centimorgans: f64::INFINITY,
            ..ClusterConfig::default()
        };
        let joined = HierarchicalClusterer::new(config).cluster(&matches);
        assert_eq!(joined.numbers.count(), 1);
    }

    #[test]
    fn test_ordering_is_deterministic() {
        let mut matches = clique(0..5, &[12]);
        matches.extend(clique(5..9, &[0]));
        matches.push(cm(9, 25.0, &[9, 1, 6]));
        matches.push(cm(10, 25.0, &[10]));
        matches.push(cm(11, 25.0, &[11, 2, 3]));
        matches.push(cm(12, 25.0, &[12, 0, 1, 2]));

        let clusterer = HierarchicalClusterer::new(ClusterConfig::default());
        let first = clusterer.cluster(&matches);
        let mut shuffled = matches.clone();
        shuffled.reverse();
        let second = clusterer.cluster(&shuffled);

        assert_eq!(first.tree.ordered_leaf_indexes(), second.tree.ordered_leaf_indexes());
        assert_eq!(first.numbers, second.numbers);

        let mut leaves = first.tree.ordered_leaf_indexes();
        leaves.sort();
        assert_eq!(leaves, (0..13).collect::<Vec<_>>());
    }

    #[test]
    fn test_cluster_numbers_increase_in_leaf_order() {
        let mut matches = clique(0..3, &[]);
        matches.extend(clique(3..7, &[]));
        matches.extend(clique(7..10, &[]));
        let clustering = HierarchicalClusterer::new(ClusterConfig::default()).cluster(&matches);

        let mut last = 0;
        for index in clustering.tree.ordered_leaf_indexes() {
            let number = clustering.numbers.get(index).unwrap();
            assert!(number >= last);
            last = number;
        }
        assert_eq!(last, 3);
    }

    #[test]
    fn test_empty_input() {
        let clustering = HierarchicalClusterer::new(ClusterConfig::default()).cluster(&[]);
        assert!(clustering.tree.is_empty());
        assert!(clustering.numbers.is_empty());
    }
}
