use crate::{
    IcwError,
    config::LoadFilter,
    model::{ClusterableMatch, Tag},
    snapshot::Snapshot,
};
use rustc_hash::FxHashSet;
use std::path::Path;
use tracing::info;

/// Reads one saved-match file format into a snapshot.
pub trait MatchesReader: Send + Sync {
    fn is_supported(&self, path: &Path) -> bool;

    /// File name without extension, used to name derived outputs.
    fn trimmed_file_name(&self, path: &Path) -> Option<String> {
        if self.is_supported(path) {
            path.file_stem().map(|s| s.to_string_lossy().to_string())
        } else {
            None
        }
    }

    fn read(&self, path: &Path) -> Result<Snapshot, IcwError>;
}

/// Files written by [`Snapshot::save`].
pub struct SavedSnapshotReader;

impl MatchesReader for SavedSnapshotReader {
    fn is_supported(&self, path: &Path) -> bool {
        matches!(
            path.extension().and_then(|e| e.to_str()).map(|e| e.to_ascii_lowercase()).as_deref(),
            Some("txt") | Some("json") | Some("bin")
        )
    }

    fn read(&self, path: &Path) -> Result<Snapshot, IcwError> {
        if !self.is_supported(path) {
            return Err(IcwError::Load(format!("{} is not a saved snapshot file", path.display())));
        }
        Snapshot::load(path)
    }
}

/// The working set produced by a load.
#[derive(Debug, Clone)]
pub struct LoadedMatches {
    pub owner_id: String,
    pub matches: Vec<ClusterableMatch>,
    pub tags: Vec<Tag>,
}

pub struct MatchesLoader {
    readers: Vec<Box<dyn MatchesReader>>,
}

impl MatchesLoader {
    pub fn new(readers: Vec<Box<dyn MatchesReader>>) -> Self {
        Self { readers }
    }

    pub fn read_snapshot(&self, path: &Path) -> Result<Snapshot, IcwError> {
        let reader = self
            .readers
            .iter()
            .find(|r| r.is_supported(path))
            .ok_or_else(|| IcwError::Load(format!("Unsupported file type: {}", path.display())))?;
        reader.read(path)
    }

    pub fn load(&self, path: &Path, filter: &LoadFilter) -> Result<LoadedMatches, IcwError> {
        let snapshot = self.read_snapshot(path)?;
        let all = snapshot.to_clusterable()?;
        let total = all.len();
        let matches = apply_filter(all, filter);

        info!(
            owner_id = %snapshot.owner_id,
            total,
            kept = matches.len(),
            "matches loaded"
        );

        Ok(LoadedMatches {
            owner_id: snapshot.owner_id,
            matches,
            tags: snapshot.tags,
        })
    }
}

impl Default for MatchesLoader {
    fn default() -> Self {
        Self::new(vec![Box::new(SavedSnapshotReader)])
    }
}

/// Drop weak matches from the working set and weak shared matches from every
/// coordinate set. Indexes are left as they were.
pub fn apply_filter(matches: Vec<ClusterableMatch>, filter: &LoadFilter) -> Vec<ClusterableMatch> {
    let kept: Vec<ClusterableMatch> = matches
        .into_iter()
        .filter(|m| m.shared_centimorgans() >= filter.min_centimorgans_to_cluster)
        .collect();

    let shareable: FxHashSet<usize> = kept
        .iter()
        .filter(|m| m.shared_centimorgans() >= filter.min_centimorgans_in_shared_matches)
        .map(|m| m.index)
        .collect();

    kept.into_iter()
        .map(|m| {
            if m.coords.iter().all(|c| *c == m.index || shareable.contains(c)) {
                m
            } else {
                let coords = m
                    .coords
                    .iter()
                    .copied()
                    .filter(|c| *c == m.index || shareable.contains(c))
                    .collect();
                m.with_coords(coords)
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Coords, Match};
    use std::sync::Arc;

    fn cm(index: usize, cm: f64, coords: &[usize]) -> ClusterableMatch {
        ClusterableMatch::new(
            index,
            Arc::new(Match::new(&format!("G{}", index), &format!("M{}", index), cm)),
            coords.iter().copied().collect::<Coords>(),
        )
    }

    #[test]
    fn test_filter_keeps_indexes_and_trims_coords() {
        let matches = vec![cm(0, 50.0, &[0, 1, 2]), cm(1, 7.0, &[0, 1]), cm(2, 3.0, &[0, 2])];
        let filter = LoadFilter {
            min_centimorgans_to_cluster: 6.0,
            min_centimorgans_in_shared_matches: 8.0,
        };
        let kept = apply_filter(matches, &filter);

        assert_eq!(kept.len(), 2);
        assert_eq!(kept[0].index, 0);
        assert_eq!(kept[0].coords, [0].into_iter().collect());
        assert_eq!(kept[1].index, 1);
        assert_eq!(kept[1].coords, [0, 1].into_iter().collect());
    }

    #[test]
    fn test_none_filter_keeps_everything() {
        let matches = vec![cm(0, 1.0, &[0, 1]), cm(1, 0.5, &[0, 1])];
        let kept = apply_filter(matches.clone(), &LoadFilter::none());
        assert_eq!(kept, matches);
    }

    #[test]
    fn test_unsupported_extension_is_load_error() {
        let loader = MatchesLoader::default();
        let result = loader.load(Path::new("matches.xlsx"), &LoadFilter::none());
        assert!(matches!(result, Err(IcwError::Load(_))));
    }

    #[test]
    fn test_trimmed_file_name() {
        let reader = SavedSnapshotReader;
        assert_eq!(reader.trimmed_file_name(Path::new("/tmp/run-1.txt")), Some("run-1".to_string()));
        assert_eq!(reader.trimmed_file_name(Path::new("/tmp/run-1.csv")), None);
    }

    #[test]
    fn test_load_round_trip_through_loader() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("saved.txt");
        let matches = vec![cm(3, 40.0, &[3, 5]), cm(5, 30.0, &[3, 5])];
        Snapshot::from_clusterable("owner", &matches, &[]).save(&path).unwrap();

        let loaded = MatchesLoader::default().load(&path, &LoadFilter::none()).unwrap();
        assert_eq!(loaded.owner_id, "owner");
        assert_eq!(loaded.matches, matches);
    }
}
