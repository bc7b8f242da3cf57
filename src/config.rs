use std::collections::BTreeSet;
use std::path::PathBuf;

/// Limits for one aggregation run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ThrottleConfig {
    /// Simultaneous requests against the matching service.
    pub max_requests: usize,
    /// Matches being processed end to end at once. Keep below `max_requests`.
    pub max_matches_in_flight: usize,
}

impl Default for ThrottleConfig {
    fn default() -> Self {
        Self {
            max_requests: 100,
            max_matches_in_flight: 50,
        }
    }
}

/// Which matches and relationships survive loading.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LoadFilter {
    pub min_centimorgans_to_cluster: f64,
    pub min_centimorgans_in_shared_matches: f64,
}

impl LoadFilter {
    /// Keep everything. Used when the loaded data is going to be saved again.
    pub fn none() -> Self {
        Self {
            min_centimorgans_to_cluster: 0.0,
            min_centimorgans_in_shared_matches: 0.0,
        }
    }
}

impl Default for LoadFilter {
    fn default() -> Self {
        Self {
            min_centimorgans_to_cluster: 6.0,
            min_centimorgans_in_shared_matches: 6.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ClusterConfig {
    /// Groups smaller than this get no cluster number.
    pub min_cluster_size: usize,
    /// Matches sharing more than this are left out of similarity scores;
    /// they appear in too many clusters to tell clusters apart.
    pub strong_match_centimorgans: f64,
    /// Subtrees merged at or above this linkage form a cluster.
    pub cluster_linkage: f64,
}

impl Default for ClusterConfig {
    fn default() -> Self {
        Self {
            min_cluster_size: 3,
            strong_match_centimorgans: 200.0,
            cluster_linkage: 0.25,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct MatrixConfig {
    /// The service never reports shared matches below this, so such matches
    /// are rows only, never columns.
    pub lowest_clusterable_centimorgans: f64,
    pub max_matches_per_file: usize,
    pub worksheet_name: String,
    /// Host used to build per-match links, when known.
    pub host_name: Option<String>,
}

impl Default for MatrixConfig {
    fn default() -> Self {
        Self {
            lowest_clusterable_centimorgans: 20.0,
            max_matches_per_file: 10_000,
            worksheet_name: "heatmap".to_string(),
            host_name: None,
        }
    }
}

/// Everything one command needs. Paths and the extension set always come
/// from the caller.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct RunConfig {
    pub input_path: PathBuf,
    pub output_path: PathBuf,
    /// Identifiers to (re)fetch, compared case-insensitively.
    pub to_extend: BTreeSet<String>,
    pub throttle: ThrottleConfig,
    pub load_filter: LoadFilter,
    pub cluster: ClusterConfig,
    pub matrix: MatrixConfig,
}

impl RunConfig {
    pub fn new(input_path: impl Into<PathBuf>, output_path: impl Into<PathBuf>) -> Self {
        Self {
            input_path: input_path.into(),
            output_path: output_path.into(),
            ..Self::default()
        }
    }

    pub fn with_extend<I, S>(mut self, ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.to_extend = ids.into_iter().map(|s| s.as_ref().to_uppercase()).collect();
        self
    }

    pub fn should_extend(&self, identifier: &str) -> bool {
        self.to_extend.contains(&identifier.to_uppercase())
    }
}

/// Parse a newline-separated identifier list. Blank lines and `#` comments
/// are skipped.
pub fn parse_identifier_list(text: &str) -> Vec<String> {
    text.lines()
        .map(|line| line.trim().trim_matches(|c| c == '"' || c == ','))
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .map(|line| line.to_string())
        .collect()
}
