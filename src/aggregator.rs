use crate::{
    IcwError,
    config::ThrottleConfig,
    fetcher::{FetchOptions, IndexLookup, SharedMatchFetcher},
    model::{ClusterableMatch, Coords},
    progress::Progress,
    throttle::Throttle,
};
use rustc_hash::{FxHashMap, FxHashSet};
use std::sync::Arc;
use tokio::task::JoinSet;
use tracing::{debug, info, instrument};

/// Fans shared-match lookups out over every match to extend and folds the
/// answers back into the working set by dense index.
///
/// Two independent throttles bound the run: `request_throttle` caps
/// simultaneous requests (the fetcher takes it once per request) and
/// `match_throttle` caps matches in flight end to end, so early matches
/// finish before later ones start opening requests.
pub struct IcwAggregator<F: SharedMatchFetcher + ?Sized> {
    fetcher: Arc<F>,
    request_throttle: Throttle,
    match_throttle: Throttle,
    options: FetchOptions,
    progress: Arc<Progress>,
}

impl<F: SharedMatchFetcher + ?Sized + 'static> IcwAggregator<F> {
    pub fn new(fetcher: Arc<F>, config: &ThrottleConfig) -> Self {
        Self {
            fetcher,
            request_throttle: Throttle::new(config.max_requests),
            match_throttle: Throttle::new(config.max_matches_in_flight),
            options: FetchOptions::default(),
            progress: Arc::new(Progress::new()),
        }
    }

    pub fn with_options(mut self, options: FetchOptions) -> Self {
        self.options = options;
        self
    }

    pub fn with_progress(mut self, progress: Arc<Progress>) -> Self {
        self.progress = progress;
        self
    }

    pub fn progress(&self) -> &Arc<Progress> {
        &self.progress
    }

    /// Fetch shared matches for `to_extend` and return `all` with those
    /// matches replaced. Matches not extended pass through untouched.
    ///
    /// Any failed lookup fails the whole run; no partial result is returned.
    #[instrument(skip_all, fields(owner_id = owner_id, to_extend = to_extend.len()))]
    pub async fn extend(
        &self,
        owner_id: &str,
        all: &[ClusterableMatch],
        to_extend: &[ClusterableMatch],
    ) -> Result<Vec<ClusterableMatch>, IcwError> {
        self.progress.reset(
            &format!("Downloading shared matches for {} matches...", to_extend.len()),
            to_extend.len(),
        );

        let lookup: Arc<IndexLookup> = Arc::new(
            all.iter()
                .map(|m| (m.matched.test_guid.clone(), m.index))
                .collect(),
        );
        let known: Arc<FxHashSet<usize>> = Arc::new(all.iter().map(|m| m.index).collect());
        let owner: Arc<str> = Arc::from(owner_id);

        let mut tasks = JoinSet::new();
        for m in to_extend {
            let fetcher = self.fetcher.clone();
            let request_throttle = self.request_throttle.clone();
            let match_throttle = self.match_throttle.clone();
            let progress = self.progress.clone();
            let lookup = lookup.clone();
            let known = known.clone();
            let owner = owner.clone();
            let options = self.options;
            let index = m.index;
            let matched = m.matched.clone();

            tasks.spawn(async move {
                let permit = match_throttle.acquire().await?;
                let found = fetcher
                    .fetch_shared_matches(&owner, &matched, options, &request_throttle, &lookup, &progress)
                    .await
                    .map_err(|e| match e {
                        IcwError::Fetch(_) => e,
                        other => IcwError::Fetch(format!("{}: {}", matched.test_guid, other)),
                    })?;
                permit.release();
                Ok::<_, IcwError>((index, fold_coords(index, found, &known)))
            });
        }

        let mut discovered: FxHashMap<usize, Coords> = FxHashMap::default();
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(Ok((index, coords))) => {
                    discovered.insert(index, coords);
                }
                Ok(Err(e)) => {
                    tasks.abort_all();
                    return Err(e);
                }
                Err(e) => {
                    tasks.abort_all();
                    return Err(e.into());
                }
            }
        }

        info!(fetched = discovered.len(), "shared matches downloaded");
        Ok(apply_coords(all, discovered))
    }
}

/// Collect one match's answer into a coordinate set containing its own index.
/// Indexes of matches outside the working set are dropped.
pub fn fold_coords(index: usize, found: Vec<usize>, known: &FxHashSet<usize>) -> Coords {
    let total = found.len();
    let mut coords: Coords = found.into_iter().filter(|i| known.contains(i)).collect();
    let kept = coords.len();
    if kept < total {
        debug!(index, orphans = total - kept, "dropped unknown shared-match indexes");
    }
    coords.insert(index);
    coords
}

/// Replace matches that have newly discovered coordinates, keyed by index.
pub fn apply_coords(all: &[ClusterableMatch], mut discovered: FxHashMap<usize, Coords>) -> Vec<ClusterableMatch> {
    all.iter()
        .map(|m| match discovered.remove(&m.index) {
            Some(coords) => m.with_coords(coords),
            None => m.clone(),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Match;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    fn cm(index: usize, guid: &str) -> ClusterableMatch {
        ClusterableMatch::new(index, Arc::new(Match::new(guid, guid, 50.0)), Coords::new())
    }

    struct MapFetcher {
        answers: FxHashMap<String, Result<Vec<usize>, String>>,
    }

    #[async_trait]
    impl SharedMatchFetcher for MapFetcher {
        async fn fetch_shared_matches(
            &self,
            _owner_id: &str,
            matched: &crate::model::Match,
            _options: FetchOptions,
            throttle: &Throttle,
            _index_lookup: &IndexLookup,
            progress: &Progress,
        ) -> Result<Vec<usize>, IcwError> {
            let _permit = throttle.acquire().await?;
            tokio::time::sleep(Duration::from_millis(1)).await;
            progress.increment();
            match self.answers.get(&matched.test_guid) {
                Some(Ok(v)) => Ok(v.clone()),
                Some(Err(msg)) => Err(IcwError::Fetch(msg.clone())),
                None => Ok(vec![]),
            }
        }
    }

    fn config(max_requests: usize, max_matches_in_flight: usize) -> ThrottleConfig {
        ThrottleConfig { max_requests, max_matches_in_flight }
    }

    #[tokio::test]
    async fn test_asymmetric_results_are_preserved() {
        let all = vec![cm(0, "A"), cm(1, "B")];
        let fetcher = MapFetcher {
            answers: [("A".to_string(), Ok(vec![1])), ("B".to_string(), Ok(vec![]))].into_iter().collect(),
        };
        let aggregator = IcwAggregator::new(Arc::new(fetcher), &config(4, 2));
        let updated = aggregator.extend("owner", &all, &all).await.unwrap();

        assert_eq!(updated[0].coords, [0, 1].into_iter().collect());
        assert_eq!(updated[1].coords, [1].into_iter().collect());
    }

    #[tokio::test]
    async fn test_mutual_results_contain_each_other() {
        let all = vec![cm(0, "A"), cm(1, "B"), cm(2, "C")];
        let fetcher = MapFetcher {
            answers: [("A".to_string(), Ok(vec![1])), ("B".to_string(), Ok(vec![0, 2])), ("C".to_string(), Ok(vec![1]))]
                .into_iter()
                .collect(),
        };
        let aggregator = IcwAggregator::new(Arc::new(fetcher), &config(4, 2));
        let updated = aggregator.extend("owner", &all, &all).await.unwrap();

        assert!(updated[0].coords.contains(&1));
        assert!(updated[1].coords.contains(&0));
        assert_eq!(updated[1].coords, [0, 1, 2].into_iter().collect());
        assert!(!updated[0].coords.contains(&2));
    }

    #[tokio::test]
    async fn test_unextended_matches_pass_through() {
        let mut c = cm(2, "C");
        c.coords = [2, 0].into_iter().collect();
        let all = vec![cm(0, "A"), cm(1, "B"), c.clone()];
        let fetcher = MapFetcher {
            answers: [("A".to_string(), Ok(vec![1]))].into_iter().collect(),
        };
        let aggregator = IcwAggregator::new(Arc::new(fetcher), &config(4, 2));
        let updated = aggregator.extend("owner", &all, &all[..1]).await.unwrap();

        assert_eq!(updated.len(), 3);
        assert_eq!(updated[0].coords, [0, 1].into_iter().collect());
        assert!(updated[1].coords.is_empty());
        assert_eq!(updated[2], c);
    }

    #[tokio::test]
    async fn test_orphan_indexes_are_dropped() {
        let all = vec![cm(0, "A"), cm(1, "B")];
        let fetcher = MapFetcher {
            answers: [("A".to_string(), Ok(vec![1, 99]))].into_iter().collect(),
        };
        let aggregator = IcwAggregator::new(Arc::new(fetcher), &config(4, 2));
        let updated = aggregator.extend("owner", &all, &all[..1]).await.unwrap();
        assert_eq!(updated[0].coords, [0, 1].into_iter().collect());
    }

    #[tokio::test]
    async fn test_single_failure_fails_the_run() {
        let all: Vec<_> = ["A", "B", "C", "D", "E"].iter().enumerate().map(|(i, g)| cm(i, g)).collect();
        let fetcher = MapFetcher {
            answers: [("C".to_string(), Err("503 from service".to_string()))].into_iter().collect(),
        };
        let aggregator = IcwAggregator::new(Arc::new(fetcher), &config(4, 2));
        let result = aggregator.extend("owner", &all, &all).await;
        match result {
            Err(IcwError::Fetch(msg)) => assert!(msg.contains("503")),
            other => panic!("expected fetch error, got {:?}", other.map(|v| v.len())),
        }
    }

    #[tokio::test]
    async fn test_progress_ticks_once_per_match() {
        let all: Vec<_> = (0..7).map(|i| cm(i, &format!("M{}", i))).collect();
        let fetcher = MapFetcher { answers: FxHashMap::default() };
        let aggregator = IcwAggregator::new(Arc::new(fetcher), &config(3, 2));
        aggregator.extend("owner", &all, &all).await.unwrap();
        assert_eq!(aggregator.progress().done(), 7);
        assert_eq!(aggregator.progress().total(), 7);
    }

    /// Issues several requests per match and records the peaks it sees.
    struct CountingFetcher {
        requests_per_match: usize,
        matches_in_flight: AtomicUsize,
        peak_matches: AtomicUsize,
        requests_in_flight: AtomicUsize,
        peak_requests: AtomicUsize,
    }

    impl CountingFetcher {
        fn new(requests_per_match: usize) -> Self {
            Self {
                requests_per_match,
                matches_in_flight: AtomicUsize::new(0),
                peak_matches: AtomicUsize::new(0),
                requests_in_flight: AtomicUsize::new(0),
                peak_requests: AtomicUsize::new(0),
            }
        }

        async fn one_request(&self, throttle: &Throttle) -> Result<(), IcwError> {
            let _permit = throttle.acquire().await?;
            let now = self.requests_in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak_requests.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(2)).await;
            self.requests_in_flight.fetch_sub(1, Ordering::SeqCst);
            Ok(())
        }
    }

    #[async_trait]
    impl SharedMatchFetcher for CountingFetcher {
        async fn fetch_shared_matches(
            &self,
            _owner_id: &str,
            _matched: &crate::model::Match,
            _options: FetchOptions,
            throttle: &Throttle,
            _index_lookup: &IndexLookup,
            _progress: &Progress,
        ) -> Result<Vec<usize>, IcwError> {
            let now = self.matches_in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak_matches.fetch_max(now, Ordering::SeqCst);

            let requests = (0..self.requests_per_match).map(|_| self.one_request(throttle));
            for result in futures::future::join_all(requests).await {
                result?;
            }

            self.matches_in_flight.fetch_sub(1, Ordering::SeqCst);
            Ok(vec![])
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_both_throttles_bound_concurrency() {
        let all: Vec<_> = (0..40).map(|i| cm(i, &format!("M{}", i))).collect();
        let fetcher = Arc::new(CountingFetcher::new(3));
        let aggregator = IcwAggregator::new(fetcher.clone(), &config(5, 3));
        aggregator.extend("owner", &all, &all).await.unwrap();

        assert!(fetcher.peak_matches.load(Ordering::SeqCst) <= 3);
        assert!(fetcher.peak_requests.load(Ordering::SeqCst) <= 5);
        assert!(fetcher.peak_requests.load(Ordering::SeqCst) >= 1);
    }
}
