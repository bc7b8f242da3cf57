use crate::{
    IcwError,
    model::{ClusterableMatch, Coords, Match, Tag, null_as_default},
};
use bincode::{Decode, Encode};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info};

/// Durable form of a run: who the matches belong to, the matches, their dense
/// indexes and the shared-match lists found so far.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize, Encode, Decode)]
#[serde(default)]
pub struct Snapshot {
    #[serde(alias = "TestTakerTestId", deserialize_with = "null_as_default")]
    pub owner_id: String,
    #[serde(alias = "Matches", deserialize_with = "null_as_default")]
    pub matches: Vec<Match>,
    #[serde(alias = "MatchIndexes", deserialize_with = "null_as_default")]
    pub index_by_identifier: BTreeMap<String, usize>,
    /// Keyed by the same identifiers as `index_by_identifier`.
    #[serde(alias = "Icw", deserialize_with = "null_as_default")]
    pub icw: BTreeMap<String, Vec<usize>>,
    #[serde(alias = "Tags", deserialize_with = "null_as_default")]
    pub tags: Vec<Tag>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SnapshotFormat {
    Json,
    Bincode,
}

impl SnapshotFormat {
    pub fn for_path(path: &Path) -> Self {
        match path.extension().and_then(|e| e.to_str()) {
            Some(ext) if ext.eq_ignore_ascii_case("bin") => SnapshotFormat::Bincode,
            _ => SnapshotFormat::Json,
        }
    }
}

impl Snapshot {
    pub fn from_clusterable(owner_id: &str, matches: &[ClusterableMatch], tags: &[Tag]) -> Self {
        let index_by_identifier = matches
            .iter()
            .map(|m| (m.matched.test_guid.clone(), m.index))
            .collect();
        // Matches never fetched have no entry at all.
        let icw = matches
            .iter()
            .filter(|m| !m.coords.is_empty())
            .map(|m| (m.matched.test_guid.clone(), m.coords.iter().copied().collect()))
            .collect();

        Self {
            owner_id: owner_id.to_string(),
            matches: matches.iter().map(|m| m.matched.as_ref().clone()).collect(),
            index_by_identifier,
            icw,
            tags: tags.to_vec(),
        }
    }

    /// Check that matches and `index_by_identifier` are in bijection. Every
    /// match needs a non-empty identifier of its own, since both maps are
    /// keyed by it.
    pub fn validate(&self) -> Result<(), IcwError> {
        let mut seen_indexes = BTreeSet::new();
        let mut seen_ids = BTreeSet::new();
        for m in &self.matches {
            if m.test_guid.is_empty() {
                return Err(IcwError::InvalidSnapshot(format!("match {} has no identifier", m.name)));
            }
            if !seen_ids.insert(m.test_guid.as_str()) {
                return Err(IcwError::InvalidSnapshot(format!("duplicate match {}", m.test_guid)));
            }
            let index = self.index_by_identifier.get(&m.test_guid).ok_or_else(|| {
                IcwError::InvalidSnapshot(format!("match {} has no index", m.test_guid))
            })?;
            if !seen_indexes.insert(*index) {
                return Err(IcwError::InvalidSnapshot(format!("index {} used twice", index)));
            }
        }
        if self.index_by_identifier.len() != self.matches.len() {
            return Err(IcwError::InvalidSnapshot(format!(
                "{} matches but {} indexed identifiers",
                self.matches.len(),
                self.index_by_identifier.len()
            )));
        }
        Ok(())
    }

    /// Rebuild the working set with the persisted indexes. Shared-match
    /// entries pointing at unknown indexes are dropped.
    pub fn to_clusterable(&self) -> Result<Vec<ClusterableMatch>, IcwError> {
        self.validate()?;

        let known: BTreeSet<usize> = self.index_by_identifier.values().copied().collect();
        let mut orphans = 0;
        let matches = self
            .matches
            .iter()
            .map(|m| {
                let index = self.index_by_identifier[&m.test_guid];
                let coords: Coords = self
                    .icw
                    .get(&m.test_guid)
                    .map(|list| {
                        list.iter()
                            .copied()
                            .filter(|i| {
                                let ok = known.contains(i);
                                if !ok {
                                    orphans += 1;
                                }
                                ok
                            })
                            .collect()
                    })
                    .unwrap_or_default();
                ClusterableMatch::new(index, Arc::new(m.clone()), coords)
            })
            .collect();

        if orphans > 0 {
            debug!(orphans, "dropped shared-match indexes with no known match");
        }
        Ok(matches)
    }

    /// Matches that have at least one shared match besides themselves.
    pub fn matches_with_shared_matches(&self) -> usize {
        self.icw.values().filter(|list| list.len() > 1).count()
    }

    /// Average count of shared matches, excluding self, over matches that have any.
    pub fn average_shared_matches(&self) -> f64 {
        let with_shared: Vec<usize> = self
            .icw
            .values()
            .filter(|list| list.len() > 1)
            .map(|list| list.len() - 1)
            .collect();
        if with_shared.is_empty() {
            0.0
        } else {
            with_shared.iter().sum::<usize>() as f64 / with_shared.len() as f64
        }
    }

    /// Save atomically: write a sibling temp file, then rename over `path`.
    pub fn save(&self, path: &Path) -> Result<PathBuf, IcwError> {
        let bytes = match SnapshotFormat::for_path(path) {
            SnapshotFormat::Json => serde_json::to_vec(self)?,
            SnapshotFormat::Bincode => bincode::encode_to_vec(self, bincode::config::standard())?,
        };

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }

        let temp_path = temp_path_for(path);
        fs::write(&temp_path, bytes)?;
        fs::rename(&temp_path, path)?;

        info!(path = %path.display(), matches = self.matches.len(), "snapshot saved");
        Ok(path.to_path_buf())
    }

    pub fn load(path: &Path) -> Result<Self, IcwError> {
        if !path.exists() {
            return Err(IcwError::Load(format!("{} does not exist", path.display())));
        }

        let bytes = fs::read(path)
            .map_err(|e| IcwError::Load(format!("Unable to read file {}: {}", path.display(), e)))?;

        let snapshot: Snapshot = match SnapshotFormat::for_path(path) {
            SnapshotFormat::Json => serde_json::from_slice(&bytes)
                .map_err(|e| IcwError::Load(format!("Unable to read file {}: {}", path.display(), e)))?,
            SnapshotFormat::Bincode => {
                let (snapshot, _): (Snapshot, usize) =
                    bincode::decode_from_slice(&bytes, bincode::config::standard())
                        .map_err(|e| IcwError::Load(format!("Unable to read file {}: {}", path.display(), e)))?;
                snapshot
            }
        };

        info!(path = %path.display(), matches = snapshot.matches.len(), "snapshot loaded");
        Ok(snapshot)
    }
}

fn temp_path_for(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(".tmp");
    path.with_file_name(name)
}
