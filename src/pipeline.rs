use crate::{
    IcwError,
    aggregator::IcwAggregator,
    clusterer::HierarchicalClusterer,
    config::{LoadFilter, RunConfig},
    correlation::CorrelationWriter,
    fetcher::SharedMatchFetcher,
    loader::MatchesLoader,
    model::ClusterableMatch,
    progress::Progress,
    sink::TabularSink,
    snapshot::Snapshot,
};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;
use tracing::{info, warn};

#[derive(Debug, Clone, PartialEq)]
pub struct ExtendSummary {
    pub output_path: PathBuf,
    /// Matches whose shared matches were fetched this run.
    pub fetched: usize,
    pub with_shared_matches: usize,
    /// Shared matches per match, not counting the match itself.
    pub average_shared_matches: f64,
}

impl ExtendSummary {
    fn new(output_path: PathBuf, fetched: usize, matches: &[ClusterableMatch]) -> Self {
        let counts: Vec<usize> = matches
            .iter()
            .map(ClusterableMatch::shared_match_count)
            .filter(|&count| count > 0)
            .collect();
        let average_shared_matches = if counts.is_empty() {
            0.0
        } else {
            counts.iter().sum::<usize>() as f64 / counts.len() as f64
        };
        Self {
            output_path,
            fetched,
            with_shared_matches: counts.len(),
            average_shared_matches,
        }
    }
}

/// Fetch shared matches for the configured identifiers and save the result
/// next to everything already known. Nothing is written if any fetch fails.
pub async fn extend_saved_data<F>(
    config: &RunConfig,
    fetcher: Arc<F>,
    progress: Arc<Progress>,
) -> Result<ExtendSummary, IcwError>
where
    F: SharedMatchFetcher + ?Sized + 'static,
{
    let start = Instant::now();

    // Unfiltered: every match read must be written back out.
    let loaded = MatchesLoader::default().load(&config.input_path, &LoadFilter::none())?;
    let to_extend: Vec<ClusterableMatch> = loaded
        .matches
        .iter()
        .filter(|m| config.should_extend(&m.matched.test_guid))
        .cloned()
        .collect();
    if to_extend.len() < config.to_extend.len() {
        warn!(
            requested = config.to_extend.len(),
            found = to_extend.len(),
            "some identifiers to extend are not in the saved data"
        );
    }

    let aggregator = IcwAggregator::new(fetcher, &config.throttle).with_progress(progress.clone());
    let updated = aggregator.extend(&loaded.owner_id, &loaded.matches, &to_extend).await?;

    progress.reset("Saving data...", 0);
    let snapshot = Snapshot::from_clusterable(&loaded.owner_id, &updated, &loaded.tags);
    let output_path = snapshot.save(&config.output_path)?;

    let summary = ExtendSummary::new(output_path, to_extend.len(), &updated);
    info!(
        elapsed_ms = start.elapsed().as_millis() as u64,
        fetched = summary.fetched,
        with_shared_matches = summary.with_shared_matches,
        average_shared_matches = format!("{:.1}", summary.average_shared_matches),
        "extension complete"
    );
    Ok(summary)
}

/// Cluster a saved run and write the correlation matrix through `sink`.
/// Returns the files written, possibly none.
pub fn cluster_saved_data<S: TabularSink>(
    config: &RunConfig,
    sink: &mut S,
    progress: Arc<Progress>,
) -> Result<Vec<PathBuf>, IcwError> {
    let start = Instant::now();
    let loaded = MatchesLoader::default().load(&config.input_path, &config.load_filter)?;

    let clustering = HierarchicalClusterer::new(config.cluster).cluster(&loaded.matches);
    let files = CorrelationWriter::new(&loaded.owner_id, config.matrix.clone(), config.cluster)
        .with_progress(progress)
        .output_correlation(sink, &config.output_path, &clustering, &loaded.matches, &loaded.tags)?;

    info!(
        elapsed_ms = start.elapsed().as_millis() as u64,
        clusters = clustering.numbers.count(),
        files = files.len(),
        "clustering run complete"
    );
    Ok(files)
}
