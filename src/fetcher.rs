use crate::{
    IcwError,
    model::Match,
    progress::Progress,
    snapshot::Snapshot,
    throttle::Throttle,
};
use async_trait::async_trait;
use rustc_hash::FxHashMap;

/// Identifier -> dense index for every match in the working set.
pub type IndexLookup = FxHashMap<String, usize>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FetchOptions {
    /// Also ask for shared matches below the service's shared-match floor.
    pub include_distant: bool,
    pub min_tree_level: u32,
}

impl Default for FetchOptions {
    fn default() -> Self {
        Self {
            include_distant: false,
            min_tree_level: 6,
        }
    }
}

/// Looks up the shared ("in common with") matches of one match.
///
/// Implementations must hold a permit from `throttle` around every
/// underlying request they issue, and should tick `progress` once per match.
/// Returned indexes are translated through `index_lookup`; identifiers the
/// lookup does not know are left out.
#[async_trait]
pub trait SharedMatchFetcher: Send + Sync {
    async fn fetch_shared_matches(
        &self,
        owner_id: &str,
        matched: &Match,
        options: FetchOptions,
        throttle: &Throttle,
        index_lookup: &IndexLookup,
        progress: &Progress,
    ) -> Result<Vec<usize>, IcwError>;
}

/// Serves shared matches recorded in an earlier saved run.
pub struct ReplayFetcher {
    owner_id: String,
    shared: FxHashMap<String, Vec<String>>,
}

impl ReplayFetcher {
    pub fn from_snapshot(donor: &Snapshot) -> Self {
        let identifier_by_index: FxHashMap<usize, &str> = donor
            .index_by_identifier
            .iter()
            .map(|(id, &index)| (index, id.as_str()))
            .collect();

        let shared = donor
            .icw
            .iter()
            .map(|(id, indexes)| {
                let ids = indexes
                    .iter()
                    .filter_map(|index| identifier_by_index.get(index).map(|s| s.to_string()))
                    .collect();
                (id.clone(), ids)
            })
            .collect();

        Self {
            owner_id: donor.owner_id.clone(),
            shared,
        }
    }

    /// Matches with saved shared matches.
    pub fn len(&self) -> usize {
        self.shared.len()
    }

    pub fn is_empty(&self) -> bool {
        self.shared.is_empty()
    }
}

#[async_trait]
impl SharedMatchFetcher for ReplayFetcher {
    async fn fetch_shared_matches(
        &self,
        owner_id: &str,
        matched: &Match,
        _options: FetchOptions,
        throttle: &Throttle,
        index_lookup: &IndexLookup,
        progress: &Progress,
    ) -> Result<Vec<usize>, IcwError> {
        if !self.owner_id.eq_ignore_ascii_case(owner_id) {
            return Err(IcwError::Fetch(format!(
                "saved shared matches belong to {}, not {}",
                self.owner_id, owner_id
            )));
        }

        let _permit = throttle.acquire().await?;
        let ids = self.shared.get(&matched.test_guid).ok_or_else(|| {
            IcwError::Fetch(format!("no saved shared matches for {}", matched.test_guid))
        })?;

        let indexes = ids
            .iter()
            .filter_map(|id| index_lookup.get(id).copied())
            .collect();
        progress.increment();
        Ok(indexes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    fn donor() -> Snapshot {
        let matches = vec![
            Match::new("A", "Ann", 50.0),
            Match::new("B", "Bob", 40.0),
            Match::new("C", "Cy", 30.0),
        ];
        let index_by_identifier: BTreeMap<String, usize> =
            [("A", 0), ("B", 1), ("C", 2)].into_iter().map(|(k, v)| (k.to_string(), v)).collect();
        let icw = [("A".to_string(), vec![0, 1]), ("B".to_string(), vec![0, 1, 2])]
            .into_iter()
            .collect();
        Snapshot {
            owner_id: "owner".to_string(),
            matches,
            index_by_identifier,
            icw,
            tags: vec![],
        }
    }

    #[tokio::test]
    async fn test_replay_translates_through_lookup() {
        let fetcher = ReplayFetcher::from_snapshot(&donor());
        // The caller numbers the same people differently and does not know C.
        let lookup: IndexLookup = [("A", 10), ("B", 11)].into_iter().map(|(k, v)| (k.to_string(), v)).collect();
        let throttle = Throttle::new(1);
        let progress = Progress::new();

        let mut got = fetcher
            .fetch_shared_matches("owner", &Match::new("B", "Bob", 40.0), FetchOptions::default(), &throttle, &lookup, &progress)
            .await
            .unwrap();
        got.sort();
        assert_eq!(got, vec![10, 11]);
        assert_eq!(progress.done(), 1);
        assert_eq!(throttle.available(), 1);
    }

    #[tokio::test]
    async fn test_replay_missing_entry_is_fetch_error() {
        let fetcher = ReplayFetcher::from_snapshot(&donor());
        let lookup = IndexLookup::default();
        let result = fetcher
            .fetch_shared_matches("owner", &Match::new("C", "Cy", 30.0), FetchOptions::default(), &Throttle::new(1), &lookup, &Progress::new())
            .await;
        assert!(matches!(result, Err(IcwError::Fetch(_))));
    }

    #[test]
    fn test_replay_counts_fetched_matches_only() {
        let fetcher = ReplayFetcher::from_snapshot(&donor());
        assert_eq!(fetcher.len(), 2);
        assert!(!fetcher.is_empty());

        let mut never_fetched = donor();
        never_fetched.icw.clear();
        assert!(ReplayFetcher::from_snapshot(&never_fetched).is_empty());
    }

    #[tokio::test]
    async fn test_replay_rejects_other_owner() {
        let fetcher = ReplayFetcher::from_snapshot(&donor());
        let result = fetcher
            .fetch_shared_matches("someone-else", &Match::new("A", "Ann", 50.0), FetchOptions::default(), &Throttle::new(1), &IndexLookup::default(), &Progress::new())
            .await;
        assert!(matches!(result, Err(IcwError::Fetch(_))));
    }
}
