use crate::model::ClusterableMatch;
use rustc_hash::{FxHashMap, FxHashSet};

/// Sparse pairwise similarity between matches, addressed by position in the
/// index-sorted working set.
///
/// Two matches are similar when their coordinate sets overlap. Strong matches
/// are removed from every set before comparing, and the overlap is scored as
/// `|A ∩ B| / sqrt(|A| * |B|)`. Pairs with no overlap have no entry.
#[derive(Debug, Clone)]
pub struct SimilarityGraph {
    indexes: Vec<usize>,
    neighbors: Vec<Vec<(usize, f64)>>,
}

impl SimilarityGraph {
    pub fn build(matches: &[ClusterableMatch], strong_match_centimorgans: f64) -> Self {
        let mut sorted: Vec<&ClusterableMatch> = matches.iter().collect();
        sorted.sort_by_key(|m| m.index);

        let indexes: Vec<usize> = sorted.iter().map(|m| m.index).collect();
        let known: FxHashSet<usize> = indexes.iter().copied().collect();
        let strong: FxHashSet<usize> = sorted
            .iter()
            .filter(|m| m.shared_centimorgans() > strong_match_centimorgans)
            .map(|m| m.index)
            .collect();

        let mut norms = vec![0usize; sorted.len()];
        let mut postings: FxHashMap<usize, Vec<usize>> = FxHashMap::default();
        for (pos, m) in sorted.iter().enumerate() {
            for c in m.coords.iter().filter(|c| known.contains(c) && !strong.contains(c)) {
                norms[pos] += 1;
                postings.entry(*c).or_default().push(pos);
            }
        }

        let mut overlaps: FxHashMap<(usize, usize), u32> = FxHashMap::default();
        for positions in postings.values() {
            for (i, &a) in positions.iter().enumerate() {
                for &b in &positions[i + 1..] {
                    *overlaps.entry((a, b)).or_insert(0) += 1;
                }
            }
        }

        let mut neighbors: Vec<Vec<(usize, f64)>> = vec![Vec::new(); sorted.len()];
        for ((a, b), shared) in overlaps {
            let score = shared as f64 / ((norms[a] * norms[b]) as f64).sqrt();
            neighbors[a].push((b, score));
            neighbors[b].push((a, score));
        }
        for list in &mut neighbors {
            list.sort_by_key(|(pos, _)| *pos);
        }

        Self { indexes, neighbors }
    }

    pub fn len(&self) -> usize {
        self.indexes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.indexes.is_empty()
    }

    /// Dense index of the match at `pos`.
    pub fn index_at(&self, pos: usize) -> usize {
        self.indexes[pos]
    }

    pub fn neighbors(&self, pos: usize) -> &[(usize, f64)] {
        &self.neighbors[pos]
    }

    pub fn similarity(&self, a: usize, b: usize) -> f64 {
        let list = &self.neighbors[a];
        match list.binary_search_by_key(&b, |(pos, _)| *pos) {
            Ok(i) => list[i].1,
            Err(_) => 0.0,
        }
    }
}
