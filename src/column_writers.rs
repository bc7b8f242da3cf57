use crate::{
    clusterer::ClusterNumbers,
    model::{ClusterableMatch, Tag, TreeType},
    sink::Cell,
};
use itertools::Itertools;
use rustc_hash::{FxHashMap, FxHashSet};

/// One descriptive column written ahead of the matrix.
#[derive(Debug, Clone, PartialEq)]
pub enum ColumnWriter {
    ClusterNumber,
    Name,
    TestId,
    Link { owner_id: String, host: String },
    SharedCentimorgans,
    SharedSegments,
    LongestBlock,
    TreeUrl,
    TreeType,
    TreeSize,
    CommonAncestors,
    Starred,
    SharedAncestorHint,
    CorrelatedClusters,
    Tag(Tag),
    Note,
}

/// Per-run values some columns need beyond the match itself.
#[derive(Debug, Default)]
pub struct ColumnContext {
    pub numbers: ClusterNumbers,
    pub correlated: FxHashMap<usize, Vec<u32>>,
}

impl ColumnWriter {
    /// Columns for this run. Optional columns are only included when at least
    /// one written match has a value for them.
    pub fn select(
        matches: &[&ClusterableMatch],
        owner_id: &str,
        host: Option<&str>,
        tags: &[Tag],
    ) -> Vec<ColumnWriter> {
        let any = |f: fn(&ClusterableMatch) -> bool| matches.iter().any(|m| f(m));

        let link = match host {
            Some(host) if !owner_id.is_empty() && !host.is_empty() => Some(ColumnWriter::Link {
                owner_id: owner_id.to_string(),
                host: host.to_string(),
            }),
            _ => None,
        };

        let mut writers: Vec<ColumnWriter> = [
            Some(ColumnWriter::ClusterNumber),
            Some(ColumnWriter::Name),
            any(|m| !m.matched.test_guid.is_empty()).then_some(ColumnWriter::TestId),
            link,
            Some(ColumnWriter::SharedCentimorgans),
            any(|m| m.matched.shared_segments > 0).then_some(ColumnWriter::SharedSegments),
            any(|m| m.matched.longest_block > 0.0).then_some(ColumnWriter::LongestBlock),
            any(|m| m.matched.tree_url.as_deref().is_some_and(|u| !u.is_empty()))
                .then_some(ColumnWriter::TreeUrl),
            any(|m| m.matched.tree_type != TreeType::Undetermined).then_some(ColumnWriter::TreeType),
            any(|m| m.matched.tree_size > 0).then_some(ColumnWriter::TreeSize),
            any(|m| !m.matched.common_ancestors.is_empty()).then_some(ColumnWriter::CommonAncestors),
            any(|m| m.matched.starred).then_some(ColumnWriter::Starred),
            any(|m| m.matched.has_hint).then_some(ColumnWriter::SharedAncestorHint),
            Some(ColumnWriter::CorrelatedClusters),
        ]
        .into_iter()
        .flatten()
        .collect();

        writers.extend(
            tags.iter()
                .sorted_by(|a, b| a.label.cmp(&b.label).then(a.tag_id.cmp(&b.tag_id)))
                .cloned()
                .map(ColumnWriter::Tag),
        );
        writers.push(ColumnWriter::Note);
        writers
    }

    pub fn header(&self) -> String {
        match self {
            ColumnWriter::ClusterNumber => "Cluster Number".to_string(),
            ColumnWriter::Name => "Name".to_string(),
            ColumnWriter::TestId => "Test ID".to_string(),
            ColumnWriter::Link { .. } => "Link".to_string(),
            ColumnWriter::SharedCentimorgans => "Shared Centimorgans".to_string(),
            ColumnWriter::SharedSegments => "Shared Segments".to_string(),
            ColumnWriter::LongestBlock => "Longest Block".to_string(),
            ColumnWriter::TreeUrl => "Tree".to_string(),
            ColumnWriter::TreeType => "Tree Type".to_string(),
            ColumnWriter::TreeSize => "Tree Size".to_string(),
            ColumnWriter::CommonAncestors => "Common Ancestors".to_string(),
            ColumnWriter::Starred => "Starred".to_string(),
            ColumnWriter::SharedAncestorHint => "Shared Ancestor Hint".to_string(),
            ColumnWriter::CorrelatedClusters => "Correlated Clusters".to_string(),
            ColumnWriter::Tag(tag) => tag.label.clone(),
            ColumnWriter::Note => "Note".to_string(),
        }
    }

    pub fn value(&self, m: &ClusterableMatch, context: &ColumnContext) -> Cell {
        let matched = &m.matched;
        match self {
            ColumnWriter::ClusterNumber => context
                .numbers
                .get(m.index)
                .map(|n| Cell::Integer(n as i64))
                .unwrap_or_default(),
            ColumnWriter::Name => Cell::text(matched.name.as_str()),
            ColumnWriter::TestId => Cell::text(matched.test_guid.as_str()),
            ColumnWriter::Link { owner_id, host } => Cell::Text(format!(
                "https://{}/discoveryui-matches/compare/{}/with/{}",
                host, owner_id, matched.test_guid
            )),
            ColumnWriter::SharedCentimorgans => Cell::Number(matched.shared_centimorgans),
            ColumnWriter::SharedSegments if matched.shared_segments > 0 => {
                Cell::Integer(matched.shared_segments as i64)
            }
            ColumnWriter::LongestBlock if matched.longest_block > 0.0 => Cell::Number(matched.longest_block),
            ColumnWriter::TreeUrl => matched.tree_url.clone().map(Cell::Text).unwrap_or_default(),
            ColumnWriter::TreeType if matched.tree_type != TreeType::Undetermined => {
                Cell::text(matched.tree_type.label())
            }
            ColumnWriter::TreeSize if matched.tree_size > 0 => Cell::Integer(matched.tree_size as i64),
            ColumnWriter::CommonAncestors if !matched.common_ancestors.is_empty() => {
                Cell::Text(matched.common_ancestors.join(", "))
            }
            ColumnWriter::Starred if matched.starred => Cell::text("*"),
            ColumnWriter::SharedAncestorHint if matched.has_hint => Cell::text("*"),
            ColumnWriter::CorrelatedClusters => match context.correlated.get(&m.index) {
                Some(numbers) if !numbers.is_empty() => Cell::Text(numbers.iter().join(", ")),
                _ => Cell::Empty,
            },
            ColumnWriter::Tag(tag) if matched.tag_ids.contains(&tag.tag_id) => Cell::text("*"),
            ColumnWriter::Note => matched.note.clone().map(Cell::Text).unwrap_or_default(),
            _ => Cell::Empty,
        }
    }
}

/// For each match, the clusters other than its own that at least
/// `min_cluster_size` of its shared matches belong to. Strong matches are not
/// counted.
pub fn correlated_clusters(
    matches: &[&ClusterableMatch],
    numbers: &ClusterNumbers,
    strong_match_centimorgans: f64,
    min_cluster_size: usize,
) -> FxHashMap<usize, Vec<u32>> {
    let strong: FxHashSet<usize> = matches
        .iter()
        .filter(|m| m.shared_centimorgans() > strong_match_centimorgans)
        .map(|m| m.index)
        .collect();

    matches
        .iter()
        .filter_map(|m| {
            let own = numbers.get(m.index);
            let correlated: Vec<u32> = m
                .coords
                .iter()
                .filter(|&&c| c != m.index && !strong.contains(&c))
                .filter_map(|&c| numbers.get(c))
                .filter(|&n| Some(n) != own)
                .counts()
                .into_iter()
                .filter(|&(_, count)| count >= min_cluster_size)
                .map(|(n, _)| n)
                .sorted()
                .collect();
            (!correlated.is_empty()).then_some((m.index, correlated))
        })
        .collect()
}
